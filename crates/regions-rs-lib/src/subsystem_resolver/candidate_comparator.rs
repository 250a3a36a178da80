use std::cmp::Ordering;

use crate::resource::*;
use crate::version::Version;

/// Orders capabilities competing for one requirement, best first.
///
/// The system bundle comes first, then lower cost, then the namespace's own rules (names ascending, versions
/// descending), then the owning resource's symbolic name ascending and finally its owner name descending.
pub struct CandidateComparator<'a> {
	resources: &'a ResourceStore,
	cost: Box<dyn Fn(ResourceId) -> u32 + 'a>,
}

impl<'a> CandidateComparator<'a> {
	pub fn new(resources: &'a ResourceStore) -> Self {
		Self { resources, cost: Box::new(|_| 0) }
	}

	pub fn with_cost(mut self, cost: impl Fn(ResourceId) -> u32 + 'a) -> Self {
		self.cost = Box::new(cost);
		self
	}

	pub fn compare(&self, a: CapabilityRef, b: CapabilityRef) -> Ordering {
		let (ra, rb) = (self.resources.get(a.resource), self.resources.get(b.resource));
		let (ca, cb) = (self.resources.capability(a), self.resources.capability(b));

		rb.is_system_bundle().cmp(&ra.is_system_bundle())
			.then_with(|| (self.cost)(a.resource).cmp(&(self.cost)(b.resource)))
			.then_with(|| compare_namespace(ca, cb))
			.then_with(|| ra.symbolic_name().cmp(&rb.symbolic_name()))
			/* Heuristic, owner names are not versions */
			.then_with(|| rb.owner_name().cmp(&ra.owner_name()))
	}

	pub fn sort(&self, capabilities: &mut [CapabilityRef]) {
		capabilities.sort_by(|a, b| self.compare(*a, *b));
	}
}

fn version_of(capability: &Capability, attribute: &str) -> Version {
	capability.attributes().version(attribute).unwrap_or_default()
}

fn compare_namespace(a: &Capability, b: &Capability) -> Ordering {
	if a.namespace() != b.namespace() {
		return Ordering::Equal;
	}
	let name = a.namespace().as_str();
	match a.namespace() {
		Namespace::Bundle => compare_names(a.attributes().get(name), b.attributes().get(name))
			.then_with(|| version_of(b, BUNDLE_VERSION_ATTRIBUTE).cmp(&version_of(a, BUNDLE_VERSION_ATTRIBUTE))),
		Namespace::Package => compare_names(a.attributes().get(name), b.attributes().get(name))
			.then_with(|| version_of(b, VERSION_ATTRIBUTE).cmp(&version_of(a, VERSION_ATTRIBUTE)))
			.then_with(|| version_of(b, BUNDLE_VERSION_ATTRIBUTE).cmp(&version_of(a, BUNDLE_VERSION_ATTRIBUTE))),
		Namespace::Identity => compare_names(a.attributes().get(name), b.attributes().get(name))
			.then_with(|| version_of(b, VERSION_ATTRIBUTE).cmp(&version_of(a, VERSION_ATTRIBUTE))),
		_ => Ordering::Equal,
	}
}

/// Compares name attributes, list values are equal as soon as they share one element.
pub fn compare_names(a: Option<&AttributeValue>, b: Option<&AttributeValue>) -> Ordering {
	let (a, b) = match (a, b) {
		(Some(a), Some(b)) => (a, b),
		(a, b) => return a.is_some().cmp(&b.is_some()),
	};
	let (sa, sb) = (a.strings(), b.strings());
	let listed = matches!(a, AttributeValue::List(_)) || matches!(b, AttributeValue::List(_));
	if listed && sa.iter().any(|s| sb.contains(s)) {
		return Ordering::Equal;
	}
	sa.cmp(&sb)
}
