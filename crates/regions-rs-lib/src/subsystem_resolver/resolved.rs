use std::collections::{BTreeMap, BTreeSet};

use super::{DependencyInfo, SubsystemTree};
use crate::filter::Filter;
use crate::region_digraph::{RegionDigraph, RegionFilter};
use crate::resolver::{Wire, Wiring};
use crate::resource::*;

fn is_subsystem_requirement(requirement: &Requirement) -> bool {
	requirement.namespace() == &Namespace::Identity && requirement.attributes().string(TYPE_ATTRIBUTE) == Some(TYPE_SUBSYSTEM)
}

fn is_subsystem_capability(capability: &Capability) -> bool {
	capability.namespace() == &Namespace::Identity && capability.attributes().string(TYPE_ATTRIBUTE) == Some(TYPE_SUBSYSTEM)
}

fn bundle_filter() -> Filter {
	Filter::and(vec![
		Filter::Present(Namespace::Identity.as_str().to_string()),
		Filter::Or(vec![Filter::equal(TYPE_ATTRIBUTE, TYPE_BUNDLE), Filter::equal(TYPE_ATTRIBUTE, TYPE_FRAGMENT)]),
	])
}

fn feature_filter() -> Filter {
	Filter::and(vec![
		Filter::Present(Namespace::Identity.as_str().to_string()),
		Filter::equal(TYPE_ATTRIBUTE, TYPE_FEATURE),
	])
}

/// Outcome of a subsystem resolution, owning the tree and digraph it was computed on.
pub struct ResolvedSubsystems {
	tree: Option<SubsystemTree>,
	digraph: RegionDigraph,
	wiring: Wiring,
}

impl ResolvedSubsystems {
	pub(super) fn new(tree: SubsystemTree, digraph: RegionDigraph, wiring: Wiring) -> Self {
		Self { tree: Some(tree), digraph, wiring }
	}

	pub(super) fn empty() -> Self {
		Self { tree: None, digraph: RegionDigraph::new(), wiring: Wiring::new() }
	}

	pub fn wiring(&self) -> &Wiring { &self.wiring }
	pub fn tree(&self) -> Option<&SubsystemTree> { self.tree.as_ref() }
	pub fn digraph(&self) -> &RegionDigraph { &self.digraph }

	pub fn resources(&self) -> Option<&ResourceStore> {
		self.tree.as_ref().map(SubsystemTree::resources)
	}

	/// Fragments report the subsystem of their host.
	///
	/// A fragment never wires its own identity requirements, so the host's wire to its subsystem is mirrored
	/// for the fragment's subsystem requirement.
	pub(super) fn associate_fragments(&mut self) {
		let Some(tree) = &self.tree else { return };
		let store = tree.resources();

		let mut added = Vec::new();
		for (resource, wires) in &self.wiring {
			if !store.get(*resource).is_fragment() {
				continue;
			}
			let Some(requirement) = store.requirement_refs(*resource).find(|r| is_subsystem_requirement(store.requirement(*r))) else { continue };
			let Some(host) = wires.first().map(|w| w.provider) else { continue };
			let Some(host_wire) = self.wiring.get(&host).into_iter().flatten().find(|w| is_subsystem_capability(store.capability(w.capability))) else { continue };
			added.push(Wire { requirement, capability: host_wire.capability, requirer: *resource, provider: host_wire.provider });
		}

		for wire in added {
			log::debug!("Fragment {} follows its host into {}", store.get(wire.requirer), store.get(wire.provider));
			self.wiring.entry(wire.requirer).or_default().push(wire);
		}
	}

	/// Subsystem name -> name of the region it is installed in, flat feature subsystems map to the nearest scoped
	/// ancestor.
	pub fn flat_subsystems_map(&self) -> BTreeMap<String, String> {
		let Some(tree) = &self.tree else { return BTreeMap::new() };
		tree.pre_order()
			.into_iter()
			.map(|id| {
				let flat = tree.ancestors(id).find(|s| !tree.get(*s).is_flat()).unwrap_or_else(|| tree.root());
				(tree.get(id).name().to_string(), tree.get(flat).name().to_string())
			})
			.collect()
	}

	/// Resolved resources with a capability matching `filter`, by flattened region.
	///
	/// A resource belongs to the subsystem it is wired to, or the subsystem it was placed in when it has no such wire.
	pub fn resource_mapping(&self, filter: &Filter) -> BTreeMap<String, BTreeSet<ResourceId>> {
		let Some(tree) = &self.tree else { return BTreeMap::new() };
		let store = tree.resources();
		let flats = self.flat_subsystems_map();
		let placements = tree.placements();

		let mut mapping: BTreeMap<String, BTreeSet<ResourceId>> = BTreeMap::new();
		for (resource, wires) in &self.wiring {
			if !store.get(*resource).capabilities().iter().any(|c| filter.matches(c.attributes())) {
				continue;
			}
			let wired = wires.iter()
				.find(|w| is_subsystem_requirement(store.requirement(w.requirement)))
				.and_then(|w| store.capability(w.capability).attributes().string(Namespace::Identity.as_str()));
			let subsystem = match wired {
				Some(name) => name,
				None => tree.get(placements.get(resource).copied().unwrap_or_else(|| tree.root())).name(),
			};
			let region = flats.get(subsystem).cloned().unwrap_or_else(|| subsystem.to_string());
			mapping.entry(region).or_default().insert(*resource);
		}
		mapping
	}

	pub fn bundles_per_region(&self) -> BTreeMap<String, BTreeSet<ResourceId>> {
		self.resource_mapping(&bundle_filter())
	}

	pub fn features_per_region(&self) -> BTreeMap<String, BTreeSet<ResourceId>> {
		self.resource_mapping(&feature_filter())
	}

	pub fn bundles(&self) -> BTreeSet<ResourceId> {
		self.bundles_per_region().into_values().flatten().collect()
	}

	pub fn features(&self) -> BTreeSet<ResourceId> {
		self.features_per_region().into_values().flatten().collect()
	}

	/// The digraph with flat subsystems merged into their region.
	///
	/// Edges between merged regions disappear, the identity namespace is dropped from the remaining policies.
	pub fn flat_digraph(&self) -> crate::Result<RegionDigraph> {
		let flats = self.flat_subsystems_map();
		let flat_names: BTreeSet<&String> = flats.values().collect();

		let mut digraph = RegionDigraph::new();
		for name in &flat_names {
			digraph.create_region(name.as_str())?;
		}
		for region in self.digraph.regions() {
			let Some(flat) = flats.get(region.name()) else { continue };
			if let Some(target) = digraph.region_mut(flat) {
				for bundle_id in region.bundle_ids() {
					target.add_bundle(*bundle_id);
				}
			}
		}

		for (tail, head, filter) in self.digraph.all_edges() {
			let (Some(tail), Some(head)) = (flats.get(tail), flats.get(head)) else { continue };
			if tail == head || digraph.edges(tail).iter().any(|(h, _)| *h == head.as_str()) {
				continue;
			}
			let mut policy = filter.policy().clone();
			policy.remove(Namespace::Identity.as_str());
			digraph.connect(tail, RegionFilter::new(policy)?, head)?;
		}
		Ok(digraph)
	}

	/// Region -> bundle location -> how to install it.
	pub fn bundle_infos(&self) -> BTreeMap<String, BTreeMap<String, DependencyInfo>> {
		let Some(tree) = &self.tree else { return BTreeMap::new() };
		let flats = self.flat_subsystems_map();

		let mut infos: BTreeMap<String, BTreeMap<String, DependencyInfo>> = BTreeMap::new();
		for id in tree.pre_order() {
			let name = tree.get(id).name();
			let region = infos.entry(flats.get(name).cloned().unwrap_or_else(|| name.to_string())).or_default();
			for (location, info) in tree.bundle_infos(id) {
				let merged = match region.get(&location) {
					Some(existing) => existing.merge(&info),
					None => info,
				};
				region.insert(location, merged);
			}
		}
		infos.retain(|_, bundles| !bundles.is_empty());
		infos
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::Arc;
	use crate::feature::{Feature, Scoping};
	use crate::resolver::{Resolver, SimpleResolver};
	use crate::subsystem_resolver::{SubsystemId, SubsystemResolveContext};
	use crate::resource::builder::{self, Headers};

	fn bundle(tree: &mut SubsystemTree, id: SubsystemId, pairs: &[(&str, &str)]) -> ResourceId {
		let headers: Headers = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		let name = headers["Bundle-SymbolicName"].clone();
		let resource = tree.add_system_resource(id, builder::build_resource(ResourceOrigin::Bundle { uri: format!("mvn:{}", name) }, &headers).unwrap());
		let owner = tree.get(id).resource();
		tree.resources_mut().require_resource(owner, resource, true);
		tree.resources_mut().require_resource(resource, owner, true);
		resource
	}

	fn resolve(tree: SubsystemTree) -> ResolvedSubsystems {
		let digraph = tree.region_digraph().unwrap();
		let wiring = SimpleResolver.resolve(&SubsystemResolveContext::new(&tree, &digraph).unwrap()).unwrap();
		let mut resolved = ResolvedSubsystems::new(tree, digraph, wiring);
		resolved.associate_fragments();
		resolved
	}

	#[test]
	fn flat_features_map_to_parent() {
		let mut tree = SubsystemTree::new("root");
		let mut scoped = Feature::new("f2", "1.0.0");
		scoped.scoping = Some(Scoping::default());
		tree.create_feature_subsystem(tree.root(), Arc::new(Feature::new("f1", "1.0.0")), "${range;[====,====]}").unwrap();
		tree.create_feature_subsystem(tree.root(), Arc::new(scoped), "${range;[====,====]}").unwrap();
		let resolved = ResolvedSubsystems::new(tree, RegionDigraph::new(), Wiring::new());

		let flats = resolved.flat_subsystems_map();
		assert_eq!(flats["root#f1-1.0.0"], "root");
		assert_eq!(flats["root#f2-1.0.0"], "root#f2-1.0.0");
		assert_eq!(flats["root"], "root");
	}

	#[test]
	fn fragment_reports_host_region() {
		let mut tree = SubsystemTree::new("root");
		let app = tree.create_subsystem(tree.root(), "app", true).unwrap();
		let host = bundle(&mut tree, app, &[("Bundle-SymbolicName", "host")]);
		let fragment = bundle(&mut tree, app, &[("Bundle-SymbolicName", "frag"), ("Fragment-Host", "host")]);

		let resolved = resolve(tree);
		assert!(resolved.wiring().contains_key(&host));
		let per_region = resolved.bundles_per_region();
		assert!(per_region["root/app"].contains(&fragment));
		assert!(per_region["root/app"].contains(&host));
		assert!(resolved.wiring()[&fragment].iter().any(|w| w.provider == resolved.tree().unwrap().get(app).resource()));
	}

	#[test]
	fn flat_digraph_merges_and_drops_identity() {
		let mut tree = SubsystemTree::new("root");
		tree.create_feature_subsystem(tree.root(), Arc::new(Feature::new("f1", "1.0.0")), "${range;[====,====]}").unwrap();
		tree.create_subsystem(tree.root(), "app", true).unwrap();
		let resolved = resolve(tree);

		let flat = resolved.flat_digraph().unwrap();
		assert_eq!(flat.regions().map(|r| r.name().to_string()).collect::<Vec<_>>(), vec!["root", "root/app"]);
		/* root -> app only carried the identity namespace */
		assert!(flat.edges("root")[0].1.policy().is_empty());
		assert!(!flat.edges("root/app")[0].1.policy().is_empty());
		assert_eq!(flat.all_edges().count(), 2);
	}

	#[test]
	fn bundle_infos_by_flat_region() {
		let mut tree = SubsystemTree::new("root");
		let f1 = tree.create_feature_subsystem(tree.root(), Arc::new(Feature::new("f1", "1.0.0")), "${range;[====,====]}").unwrap();
		let mut headers = Headers::new();
		headers.insert("Bundle-SymbolicName".into(), "b1".into());
		let b1 = tree.resources_mut().add(builder::build_resource(ResourceOrigin::Bundle { uri: "mvn:b1".into() }, &headers).unwrap());
		tree.do_add_dependency(f1, DependencyInfo { resource: b1, mandatory: true, start: true, start_level: 30 }).unwrap();
		let resolved = ResolvedSubsystems::new(tree, RegionDigraph::new(), Wiring::new());

		let infos = resolved.bundle_infos();
		assert_eq!(infos["root"]["mvn:b1"].start_level, 30);
		assert_eq!(infos.len(), 1);
	}

	#[test]
	fn empty_result() {
		let resolved = ResolvedSubsystems::empty();
		assert!(resolved.bundles().is_empty());
		assert!(resolved.flat_digraph().unwrap().regions().next().is_none());
	}
}
