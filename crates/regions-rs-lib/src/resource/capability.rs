use std::collections::BTreeMap;

use super::{Attributes, Namespace, RESOLUTION_DIRECTIVE, RESOLUTION_OPTIONAL, RESOLUTION_DYNAMIC, FILTER_DIRECTIVE, MANDATORY_DIRECTIVE};
use crate::filter::Filter;

#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
	namespace: Namespace,
	attributes: Attributes,
	directives: BTreeMap<String, String>,
}

impl Capability {
	pub fn new(namespace: Namespace, attributes: Attributes, directives: BTreeMap<String, String>) -> Self {
		Self { namespace, attributes, directives }
	}

	pub fn namespace(&self) -> &Namespace { &self.namespace }
	pub fn attributes(&self) -> &Attributes { &self.attributes }
	pub fn directives(&self) -> &BTreeMap<String, String> { &self.directives }

	/// Attributes a requirement must name in its filter for this capability to match it.
	pub fn mandatory_attributes(&self) -> Vec<&str> {
		self.directives.get(MANDATORY_DIRECTIVE)
			.map(|m| m.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
			.unwrap_or_default()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
	namespace: Namespace,
	attributes: Attributes,
	directives: BTreeMap<String, String>,
	filter: Filter,
}

impl Requirement {
	pub fn new(namespace: Namespace, attributes: Attributes, directives: BTreeMap<String, String>, filter: Filter) -> Self {
		Self { namespace, attributes, directives, filter }
	}

	pub fn namespace(&self) -> &Namespace { &self.namespace }
	pub fn attributes(&self) -> &Attributes { &self.attributes }
	pub fn directives(&self) -> &BTreeMap<String, String> { &self.directives }
	pub fn filter(&self) -> &Filter { &self.filter }

	pub fn is_optional(&self) -> bool {
		self.directives.get(RESOLUTION_DIRECTIVE).map(String::as_str) == Some(RESOLUTION_OPTIONAL)
	}

	pub fn is_dynamic(&self) -> bool {
		self.directives.get(RESOLUTION_DIRECTIVE).map(String::as_str) == Some(RESOLUTION_DYNAMIC)
	}

	pub fn matches(&self, capability: &Capability) -> bool {
		self.namespace == capability.namespace
			&& self.filter.matches(&capability.attributes)
			&& capability.mandatory_attributes().iter().all(|a| self.filter.mentions(a))
	}
}

fn quote(value: &str) -> String {
	format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn write_clause(f: &mut std::fmt::Formatter<'_>, namespace: &Namespace, attributes: &Attributes, directives: &BTreeMap<String, String>) -> std::fmt::Result {
	write!(f, "{}", namespace)?;
	for (key, value) in attributes.iter() {
		match value.type_name() {
			Some(t) => write!(f, ";{}:{}={}", key, t, quote(&value.to_string()))?,
			None => write!(f, ";{}={}", key, quote(&value.to_string()))?,
		}
	}
	for (key, value) in directives {
		write!(f, ";{}:={}", key, quote(value))?;
	}
	Ok(())
}

impl std::fmt::Display for Capability {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write_clause(f, &self.namespace, &self.attributes, &self.directives)
	}
}

impl std::fmt::Display for Requirement {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write_clause(f, &self.namespace, &self.attributes, &self.directives)?;
		if self.filter != Filter::MatchAll {
			write!(f, ";{}:={}", FILTER_DIRECTIVE, quote(&self.filter.to_string()))?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::resource::AttributeValue;
	use crate::version::Version;

	fn package(name: &str) -> Capability {
		let mut attributes = Attributes::default();
		attributes.insert("osgi.wiring.package", name);
		attributes.insert("version", Version::new(1, 0, 0));
		Capability::new(Namespace::Package, attributes, BTreeMap::new())
	}

	#[test]
	fn capability_display() { assert_eq!(package("p").to_string(), "osgi.wiring.package;osgi.wiring.package=\"p\";version:Version=\"1.0.0\""); }

	#[test]
	fn requirement_matches_namespace() {
		let req = Requirement::new(Namespace::Bundle, Attributes::default(), BTreeMap::new(), Filter::equal("osgi.wiring.package", "p"));
		assert!(!req.matches(&package("p")));
	}

	#[test]
	fn mandatory_attribute_must_be_named() {
		let mut attributes = Attributes::default();
		attributes.insert("osgi.wiring.package", "p");
		attributes.insert("company", AttributeValue::from("acme"));
		let cap = Capability::new(Namespace::Package, attributes, [(MANDATORY_DIRECTIVE.to_string(), "company".to_string())].into());

		let plain = Requirement::new(Namespace::Package, Attributes::default(), BTreeMap::new(), Filter::equal("osgi.wiring.package", "p"));
		assert!(!plain.matches(&cap));

		let named = Requirement::new(Namespace::Package, Attributes::default(), BTreeMap::new(), Filter::parse("(&(osgi.wiring.package=p)(company=acme))").unwrap());
		assert!(named.matches(&cap));
	}
}
