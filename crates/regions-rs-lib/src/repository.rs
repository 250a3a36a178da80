//! Static capability lookup over a fixed set of resources.

use std::collections::BTreeMap;

use crate::resource::{CapabilityRef, Namespace, Requirement, ResourceId, ResourceStore};

pub struct CapabilityRepository<'a> {
	store: &'a ResourceStore,
	resources: Vec<ResourceId>,
	by_namespace: BTreeMap<Namespace, Vec<CapabilityRef>>,
}

impl<'a> CapabilityRepository<'a> {
	/// Indexes the capabilities of `resources`, duplicates are indexed once.
	pub fn new(store: &'a ResourceStore, resources: impl IntoIterator<Item = ResourceId>) -> Self {
		let mut seen = std::collections::BTreeSet::new();
		let mut repository = Self { store, resources: Vec::new(), by_namespace: BTreeMap::new() };
		for id in resources {
			if !seen.insert(id) {
				continue;
			}
			repository.resources.push(id);
			for cap in store.capability_refs(id) {
				repository.by_namespace.entry(store.capability(cap).namespace().clone()).or_default().push(cap);
			}
		}
		repository
	}

	pub fn resources(&self) -> &[ResourceId] { &self.resources }

	/// Capabilities matching `requirement` in indexing order.
	pub fn find_providers(&self, requirement: &Requirement) -> Vec<CapabilityRef> {
		self.by_namespace.get(requirement.namespace())
			.into_iter()
			.flatten()
			.filter(|c| requirement.matches(self.store.capability(**c)))
			.copied()
			.collect()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::resource::builder;
	use crate::resource::{Resource, ResourceOrigin, TYPE_BUNDLE, TYPE_FEATURE};
	use crate::version::Version;

	fn store() -> (ResourceStore, Vec<ResourceId>) {
		let mut store = ResourceStore::default();
		let mut ids = Vec::new();
		for (name, kind) in [("a", TYPE_BUNDLE), ("b", TYPE_BUNDLE), ("f", TYPE_FEATURE)] {
			let mut r = Resource::new(ResourceOrigin::Synthetic);
			r.add_capability(builder::identity_capability(name, kind, Version::new(1, 0, 0)));
			ids.push(store.add(r));
		}
		(store, ids)
	}

	#[test]
	fn finds_by_filter() {
		let (store, ids) = store();
		let repository = CapabilityRepository::new(&store, ids.clone());
		let found = repository.find_providers(&builder::identity_requirement("b", TYPE_BUNDLE, None, true));
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].resource, ids[1]);
	}

	#[test]
	fn only_indexed_resources() {
		let (store, ids) = store();
		let repository = CapabilityRepository::new(&store, [ids[0], ids[0]]);
		assert_eq!(repository.resources().len(), 1);
		assert!(repository.find_providers(&builder::identity_requirement("f", TYPE_FEATURE, None, true)).is_empty());
	}
}
