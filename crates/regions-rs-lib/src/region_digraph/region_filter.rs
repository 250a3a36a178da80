use std::collections::{BTreeMap, BTreeSet};

use crate::filter::{Filter, FilterError};
use crate::resource::Attributes;

/// Namespace whose filters apply to every namespace.
pub const VISIBLE_ALL_NAMESPACE: &str = "org.eclipse.equinox.allow.all";
/// Namespace whose filters match bundles by `bundle-symbolic-name` and `bundle-version`.
pub const VISIBLE_BUNDLE_NAMESPACE: &str = "org.eclipse.equinox.allow.bundle";

/// Namespace to filter strings, a capability is shared when any filter of its namespace matches it.
pub type SharingPolicy = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct RegionFilter {
	policy: SharingPolicy,
	filters: BTreeMap<String, Vec<Filter>>,
}

impl RegionFilter {
	pub fn new(policy: SharingPolicy) -> Result<Self, FilterError> {
		let mut filters = BTreeMap::new();
		for (namespace, texts) in &policy {
			let parsed = texts.iter().map(|t| Filter::parse(t)).collect::<Result<Vec<_>, _>>()?;
			filters.insert(namespace.clone(), parsed);
		}
		Ok(Self { policy, filters })
	}

	pub fn policy(&self) -> &SharingPolicy { &self.policy }

	fn matches(&self, namespace: &str, attributes: &Attributes) -> bool {
		self.filters.get(namespace).map_or(false, |fs| fs.iter().any(|f| f.matches(attributes)))
	}

	pub fn is_allowed(&self, namespace: &str, attributes: &Attributes) -> bool {
		self.matches(namespace, attributes) || self.matches(VISIBLE_ALL_NAMESPACE, attributes)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::filter::ALL_FILTER;

	fn policy(pairs: &[(&str, &str)]) -> SharingPolicy {
		let mut p = SharingPolicy::new();
		for (ns, f) in pairs {
			p.entry(ns.to_string()).or_default().insert(f.to_string());
		}
		p
	}

	#[test]
	fn allow_all_covers_any_namespace() {
		let filter = RegionFilter::new(policy(&[(VISIBLE_ALL_NAMESPACE, ALL_FILTER)])).unwrap();
		assert!(filter.is_allowed("osgi.wiring.package", &Attributes::default()));
	}

	#[test]
	fn identity_only() {
		let filter = RegionFilter::new(policy(&[("osgi.identity", "(type=subsystem)")])).unwrap();
		let mut attributes = Attributes::default();
		attributes.insert("type", "subsystem");
		assert!(filter.is_allowed("osgi.identity", &attributes));
		assert!(!filter.is_allowed("osgi.wiring.package", &attributes));
	}

	#[test]
	fn invalid_filter() { assert!(RegionFilter::new(policy(&[("osgi.identity", "(type=")])).is_err()); }
}
