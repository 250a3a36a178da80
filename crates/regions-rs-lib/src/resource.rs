//! Installable units and what they provide and require.
//!
//! Resources are kept in a [`ResourceStore`] arena and referred to by [`ResourceId`].
//! Capabilities and requirements are addressed by handles into their owning resource so they can be
//! passed around freely while the store stays the single owner.

use serde::{Serialize, Deserialize};

mod namespace;
pub use namespace::Namespace;
mod attributes;
pub use attributes::Attributes;
pub use attributes::AttributeValue;
mod capability;
pub use capability::Capability;
pub use capability::Requirement;
pub mod clause;
pub mod builder;

use crate::version::Version;

pub const TYPE_ATTRIBUTE: &str = "type";
pub const VERSION_ATTRIBUTE: &str = "version";
pub const BUNDLE_VERSION_ATTRIBUTE: &str = "bundle-version";
pub const BUNDLE_SYMBOLIC_NAME_ATTRIBUTE: &str = "bundle-symbolic-name";

pub const TYPE_BUNDLE: &str = "osgi.bundle";
pub const TYPE_FRAGMENT: &str = "osgi.fragment";
pub const TYPE_FEATURE: &str = "feature";
pub const TYPE_SUBSYSTEM: &str = "subsystem";

pub const RESOLUTION_DIRECTIVE: &str = "resolution";
pub const RESOLUTION_OPTIONAL: &str = "optional";
pub const RESOLUTION_DYNAMIC: &str = "dynamic";
pub const FILTER_DIRECTIVE: &str = "filter";
pub const MANDATORY_DIRECTIVE: &str = "mandatory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub usize);

impl std::fmt::Display for ResourceId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapabilityRef {
	pub resource: ResourceId,
	pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequirementRef {
	pub resource: ResourceId,
	pub index: usize,
}

/// Where a resource came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOrigin {
	/// A bundle built from downloaded manifest headers.
	Bundle { uri: String },
	/// A bundle already installed in the framework, id `0` is the framework itself.
	Installed { bundle_id: u64, uri: Option<String> },
	Feature { name: String, version: Version },
	Subsystem { name: String },
	/// Parsed from a batch document.
	Descriptor,
	Synthetic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
	origin: ResourceOrigin,
	capabilities: Vec<Capability>,
	requirements: Vec<Requirement>,
}

impl Resource {
	pub fn new(origin: ResourceOrigin) -> Self {
		Self { origin, capabilities: Vec::new(), requirements: Vec::new() }
	}

	pub fn origin(&self) -> &ResourceOrigin { &self.origin }
	pub fn capabilities(&self) -> &[Capability] { &self.capabilities }
	pub fn requirements(&self) -> &[Requirement] { &self.requirements }

	pub fn add_capability(&mut self, capability: Capability) -> usize {
		self.capabilities.push(capability);
		self.capabilities.len() - 1
	}

	pub fn add_requirement(&mut self, requirement: Requirement) -> usize {
		self.requirements.push(requirement);
		self.requirements.len() - 1
	}

	pub fn identity(&self) -> Option<&Capability> {
		self.capabilities.iter().find(|c| c.namespace() == &Namespace::Identity)
	}

	pub fn symbolic_name(&self) -> Option<&str> {
		self.identity().and_then(|c| c.attributes().string(Namespace::Identity.as_str()))
	}

	pub fn version(&self) -> Version {
		self.identity().and_then(|c| c.attributes().version(VERSION_ATTRIBUTE)).unwrap_or_default()
	}

	pub fn resource_type(&self) -> Option<&str> {
		self.identity().and_then(|c| c.attributes().string(TYPE_ATTRIBUTE))
	}

	pub fn is_fragment(&self) -> bool {
		self.resource_type() == Some(TYPE_FRAGMENT)
	}

	pub fn uri(&self) -> Option<&str> {
		match &self.origin {
			ResourceOrigin::Bundle { uri } => Some(uri),
			ResourceOrigin::Installed { uri, .. } => uri.as_deref(),
			_ => None,
		}
	}

	pub fn bundle_id(&self) -> Option<u64> {
		match self.origin {
			ResourceOrigin::Installed { bundle_id, .. } => Some(bundle_id),
			_ => None,
		}
	}

	pub fn is_installed(&self) -> bool { self.bundle_id().is_some() }

	pub fn is_system_bundle(&self) -> bool { self.bundle_id() == Some(0) }

	/// Name of the subsystem this resource requires, the one it has been placed in.
	pub fn owner_name(&self) -> Option<&str> {
		self.requirements.iter()
			.filter(|r| r.namespace() == &Namespace::Identity)
			.find(|r| r.attributes().string(TYPE_ATTRIBUTE) == Some(TYPE_SUBSYSTEM))
			.and_then(|r| r.attributes().string(Namespace::Identity.as_str()))
	}

	/// `symbolicName|version`, the key used to tell two copies of the same bundle apart from different bundles.
	pub fn key(&self) -> Option<String> {
		self.symbolic_name().map(|n| format!("{}|{}", n, self.version()))
	}
}

impl std::fmt::Display for Resource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.symbolic_name() {
			Some(name) => write!(f, "{}/{}", name, self.version()),
			None => match &self.origin {
				ResourceOrigin::Bundle { uri } => write!(f, "{}", uri),
				ResourceOrigin::Subsystem { name } => write!(f, "{}", name),
				other => write!(f, "{:?}", other),
			},
		}
	}
}

/// Owner of every resource created for a resolution.
#[derive(Debug, Clone, Default)]
pub struct ResourceStore {
	resources: Vec<Resource>,
}

impl ResourceStore {
	pub fn add(&mut self, resource: Resource) -> ResourceId {
		self.resources.push(resource);
		ResourceId(self.resources.len() - 1)
	}

	/// # Panics
	/// When the id did not come from this store.
	pub fn get(&self, id: ResourceId) -> &Resource {
		&self.resources[id.0]
	}

	pub(crate) fn get_mut(&mut self, id: ResourceId) -> &mut Resource {
		&mut self.resources[id.0]
	}

	pub fn capability(&self, cap: CapabilityRef) -> &Capability {
		&self.get(cap.resource).capabilities[cap.index]
	}

	pub fn requirement(&self, req: RequirementRef) -> &Requirement {
		&self.get(req.resource).requirements[req.index]
	}

	pub fn len(&self) -> usize { self.resources.len() }
	pub fn is_empty(&self) -> bool { self.resources.is_empty() }

	pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
		self.resources.iter().enumerate().map(|(i, r)| (ResourceId(i), r))
	}

	pub fn capability_refs(&self, id: ResourceId) -> impl Iterator<Item = CapabilityRef> {
		(0..self.get(id).capabilities.len()).map(move |index| CapabilityRef { resource: id, index })
	}

	pub fn requirement_refs(&self, id: ResourceId) -> impl Iterator<Item = RequirementRef> {
		(0..self.get(id).requirements.len()).map(move |index| RequirementRef { resource: id, index })
	}

	pub(crate) fn add_requirement(&mut self, id: ResourceId, requirement: Requirement) -> RequirementRef {
		let index = self.get_mut(id).add_requirement(requirement);
		RequirementRef { resource: id, index }
	}

	/// Adds an identity requirement from `requirer` on exactly `required`.
	pub(crate) fn require_resource(&mut self, requirer: ResourceId, required: ResourceId, mandatory: bool) {
		if let Some(req) = builder::requirement_on(self.get(required), mandatory) {
			self.add_requirement(requirer, req);
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn bundle(name: &str, version: &str) -> Resource {
		let mut r = Resource::new(ResourceOrigin::Bundle { uri: format!("mvn:test/{}", name) });
		r.add_capability(builder::identity_capability(name, TYPE_BUNDLE, Version::parse(version).unwrap()));
		r
	}

	#[test]
	fn key_joins_name_and_version() { assert_eq!(bundle("b1", "1.0").key().as_deref(), Some("b1|1.0.0")); }

	#[test]
	fn display_uses_identity() { assert_eq!(bundle("b1", "2").to_string(), "b1/2.0.0"); }

	#[test]
	fn system_bundle() { assert!(Resource::new(ResourceOrigin::Installed { bundle_id: 0, uri: None }).is_system_bundle()); }

	#[test]
	fn owner_name_from_subsystem_requirement() {
		let mut r = bundle("b1", "1.0");
		r.add_requirement(builder::identity_requirement("root/app", TYPE_SUBSYSTEM, None, true));
		assert_eq!(r.owner_name(), Some("root/app"));
	}

	#[test]
	fn require_resource_is_exact() {
		let mut store = ResourceStore::default();
		let a = store.add(bundle("a", "1.0"));
		let b = store.add(bundle("b", "1.2.3"));
		store.require_resource(a, b, true);
		let req = store.requirement(RequirementRef { resource: a, index: 0 });
		assert!(req.filter().matches(store.get(b).identity().unwrap().attributes()));
		assert!(!req.is_optional());
	}
}
