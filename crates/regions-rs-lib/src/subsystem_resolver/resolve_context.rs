use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::EdgeRef;

use super::{CandidateComparator, SubsystemId, SubsystemTree};
use crate::region_digraph::{RegionDigraph, RegionFilter, VISIBLE_BUNDLE_NAMESPACE};
use crate::repository::CapabilityRepository;
use crate::resolver::{ResolutionError, ResolveContext};
use crate::resource::*;

/// Cost of reaching a provider among several from a different owner.
const FOREIGN_COST: u32 = 10;
/// Cost of reaching a provider among several placed in the requirer's own subsystem.
const OWNER_COST: u32 = 1;

/// Candidate lookup restricted by region visibility.
///
/// Every resource lives in the region of the subsystem installing it. A requirement only sees capabilities
/// whose region is reachable from its own region through edges that let the capability through.
///
/// Mandatory requirements nothing in the tree satisfies fall back to the global resources offered to the
/// nearest subsystem accepting dependencies, see [`SubsystemTree::add_global_resources`].
pub struct SubsystemResolveContext<'a> {
	tree: &'a SubsystemTree,
	digraph: &'a RegionDigraph,
	/// Resource -> subsystem placing it
	res_to_sub: BTreeMap<ResourceId, SubsystemId>,
	repository: CapabilityRepository<'a>,
	global: CapabilityRepository<'a>,
	/// Distance from the root over mandatory requirements
	distance: BTreeMap<ResourceId, u32>,
}

impl<'a> SubsystemResolveContext<'a> {
	/// Indexes the tree and computes provider distances from the root.
	///
	/// # Errors
	/// [`ResolutionError::DuplicateResource`] when a resource reachable from the root over mandatory requirements
	/// sees two copies of a bundle in one region.
	pub fn new(tree: &'a SubsystemTree, digraph: &'a RegionDigraph) -> crate::Result<Self> {
		let res_to_sub = tree.placements();
		let pre_order = tree.pre_order();
		let ordered: Vec<ResourceId> = pre_order.iter()
			.flat_map(|id| std::iter::once(tree.get(*id).resource()).chain(tree.get(*id).installable().iter().copied()))
			.collect();
		let global: Vec<ResourceId> = pre_order.iter()
			.flat_map(|id| tree.get(*id).global().iter().copied())
			.collect();

		let mut context = Self {
			tree,
			digraph,
			res_to_sub,
			repository: CapabilityRepository::new(tree.resources(), ordered),
			global: CapabilityRepository::new(tree.resources(), global),
			distance: BTreeMap::new(),
		};
		context.distance = context.compute_distances()?;
		Ok(context)
	}

	/// Resources of the tree, subsystems first.
	pub fn repository(&self) -> &CapabilityRepository<'a> { &self.repository }

	/// Global resources as offered to each subsystem accepting dependencies.
	pub fn global_repository(&self) -> &CapabilityRepository<'a> { &self.global }

	fn subsystem_of(&self, resource: ResourceId) -> SubsystemId {
		self.res_to_sub.get(&resource).copied().unwrap_or_else(|| self.tree.root())
	}

	pub fn region_of(&self, resource: ResourceId) -> &str {
		self.tree.get(self.subsystem_of(resource)).name()
	}

	pub fn cost(&self, resource: ResourceId) -> u32 {
		self.distance.get(&resource).copied().unwrap_or(u32::MAX)
	}

	fn comparator(&self) -> CandidateComparator<'_> {
		CandidateComparator::new(self.tree.resources()).with_cost(|r| self.cost(r))
	}

	/// Walks mandatory requirements out from the root, resources nothing reaches keep no distance.
	fn compute_distances(&self) -> Result<BTreeMap<ResourceId, u32>, ResolutionError> {
		let store = self.tree.resources();
		let root = self.tree.get(self.tree.root()).resource();

		let mut graph: DiGraphMap<ResourceId, u32> = DiGraphMap::new();
		graph.add_node(root);
		let mut queue = VecDeque::from([root]);
		let mut seen = BTreeSet::from([root]);
		while let Some(resource) = queue.pop_front() {
			let owner = store.get(resource).owner_name();
			for requirement in store.requirement_refs(resource) {
				let req = store.requirement(requirement);
				if req.is_optional() || req.is_dynamic() {
					continue;
				}
				let candidates = self.candidates(requirement)?;
				for capability in &candidates {
					let weight = if candidates.len() == 1 {
						0
					} else if store.get(capability.resource).owner_name() == owner {
						OWNER_COST
					} else {
						FOREIGN_COST
					};
					let lowest = graph.edge_weight(resource, capability.resource).map_or(weight, |w| weight.min(*w));
					graph.add_edge(resource, capability.resource, lowest);
					if seen.insert(capability.resource) {
						queue.push_back(capability.resource);
					}
				}
			}
		}

		Ok(petgraph::algo::dijkstra(&graph, root, None, |e| *e.weight()).into_iter().collect())
	}

	/// Whether a capability may cross an edge, directly or as part of a visible bundle.
	///
	/// Only resources with an identity can be let through as a bundle.
	fn allowed(&self, filter: &RegionFilter, capability: CapabilityRef) -> bool {
		let store = self.tree.resources();
		let cap = store.capability(capability);
		if filter.is_allowed(cap.namespace().as_str(), cap.attributes()) {
			return true;
		}
		let resource = store.get(capability.resource);
		if resource.identity().is_none() {
			return false;
		}
		let mut attributes = Attributes::default();
		if let Some(name) = resource.symbolic_name() {
			attributes.insert(BUNDLE_SYMBOLIC_NAME_ATTRIBUTE, name);
		}
		attributes.insert(BUNDLE_VERSION_ATTRIBUTE, resource.version());
		filter.is_allowed(VISIBLE_BUNDLE_NAMESPACE, &attributes)
	}

	/// Global capabilities offered to the subsystem `requirer` takes its dependencies from.
	fn global_providers(&self, requirer: ResourceId, requirement: &Requirement) -> Vec<CapabilityRef> {
		let Ok(target) = self.tree.accepting_ancestor(self.subsystem_of(requirer)) else { return Vec::new() };
		let offered = self.tree.get(target).global();
		self.global.find_providers(requirement)
			.into_iter()
			.filter(|c| offered.contains(&c.resource))
			.collect()
	}

	/// Visible providers in repository order, one bundle per identity.
	fn candidates(&self, requirement: RequirementRef) -> Result<Vec<CapabilityRef>, ResolutionError> {
		let store = self.tree.resources();
		let region = self.region_of(requirement.resource);
		if self.digraph.region(region).is_none() {
			return Ok(Vec::new());
		}

		let req = store.requirement(requirement);
		let mut found = self.repository.find_providers(req);
		if found.is_empty() && !req.is_optional() {
			found = self.global_providers(requirement.resource, req);
		}
		let visible = self.digraph.visible(
			region,
			&found,
			|r, c| r.name() == self.region_of(c.resource),
			|f, c| self.allowed(f, c),
		);
		let candidates: Vec<CapabilityRef> = found.into_iter().filter(|c| visible.contains(c)).collect();
		log::trace!("{} visible providers for {} in {}", candidates.len(), req, region);

		if candidates.len() > 1 {
			self.deduplicate(candidates)
		} else {
			Ok(candidates)
		}
	}

	/// Keeps the capabilities of a single copy of each bundle identity.
	///
	/// Copies in different regions keep the one whose region name sorts first. Copies in one region are only
	/// allowed when exactly one of them is installed already, that one is kept.
	fn deduplicate(&self, candidates: Vec<CapabilityRef>) -> Result<Vec<CapabilityRef>, ResolutionError> {
		let store = self.tree.resources();
		/* symbolicName|version -> kept copy */
		let mut kept: BTreeMap<String, ResourceId> = BTreeMap::new();

		for candidate in &candidates {
			let resource = store.get(candidate.resource);
			let Some(key) = resource.key() else { continue };
			let Some(&previous) = kept.get(&key) else {
				kept.insert(key, candidate.resource);
				continue;
			};
			if previous == candidate.resource {
				continue;
			}

			let (previous_region, region) = (self.region_of(previous), self.region_of(candidate.resource));
			let replace = if previous_region == region {
				match (store.get(previous).is_installed(), resource.is_installed()) {
					(true, false) => false,
					(false, true) => true,
					_ => return Err(ResolutionError::DuplicateResource { resource: resource.to_string(), region: region.to_string() }),
				}
			} else {
				region < previous_region
			};
			if replace {
				kept.insert(key, candidate.resource);
			}
		}

		Ok(candidates.into_iter()
			.filter(|c| match store.get(c.resource).key() {
				Some(key) => kept.get(&key) == Some(&c.resource),
				None => true,
			})
			.collect())
	}
}

impl ResolveContext for SubsystemResolveContext<'_> {
	fn resources(&self) -> &ResourceStore {
		self.tree.resources()
	}

	fn mandatory_resources(&self) -> Vec<ResourceId> {
		vec![self.tree.get(self.tree.root()).resource()]
	}

	fn find_providers(&self, requirement: RequirementRef) -> Result<Vec<CapabilityRef>, ResolutionError> {
		let mut candidates = self.candidates(requirement)?;
		self.comparator().sort(&mut candidates);
		Ok(candidates)
	}

	fn insert_hosted_capability(&self, capabilities: &mut Vec<CapabilityRef>, hosted: CapabilityRef) -> usize {
		let comparator = self.comparator();
		let index = match capabilities.binary_search_by(|c| comparator.compare(*c, hosted)) {
			Ok(i) | Err(i) => i,
		};
		capabilities.insert(index, hosted);
		index
	}

	fn is_effective(&self, requirement: RequirementRef) -> bool {
		let requirement = self.tree.resources().requirement(requirement);
		requirement.namespace() == &Namespace::Identity || !requirement.is_optional()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::sync::Arc;
	use crate::feature::{Feature, ScopeFilter, Scoping};
	use crate::resource::builder::{self, Headers};

	fn bundle(pairs: &[(&str, &str)]) -> Resource {
		let headers: Headers = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
		builder::build_resource(ResourceOrigin::Bundle { uri: "test".into() }, &headers).unwrap()
	}

	fn installed(bundle_id: u64, pairs: &[(&str, &str)]) -> Resource {
		let built = bundle(pairs);
		let mut resource = Resource::new(ResourceOrigin::Installed { bundle_id, uri: None });
		for capability in built.capabilities() {
			resource.add_capability(capability.clone());
		}
		resource
	}

	fn requirement(tree: &SubsystemTree, resource: ResourceId, namespace: Namespace) -> RequirementRef {
		tree.resources().requirement_refs(resource)
			.find(|r| tree.resources().requirement(*r).namespace() == &namespace)
			.unwrap()
	}

	/// Root exports `p` from `b1`, the scoped `f2` only imports the identity of `b1`.
	fn isolated() -> (SubsystemTree, ResourceId) {
		let mut tree = SubsystemTree::new("root");
		let mut f2 = Feature::new("f2", "1.0.0");
		f2.scoping = Some(Scoping { accept_dependencies: false, imports: vec![ScopeFilter::new("osgi.identity", "(osgi.identity=b1)")], exports: vec![] });
		let f2 = tree.create_feature_subsystem(tree.root(), Arc::new(f2), "${range;[====,====]}").unwrap();

		tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		let importer = tree.add_system_resource(f2, bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p"), ("Require-Capability", "osgi.identity;filter:=\"(osgi.identity=b1)\"")]));
		(tree, importer)
	}

	#[test]
	fn identity_only_import_hides_packages() {
		let (tree, importer) = isolated();
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		assert!(context.find_providers(requirement(&tree, importer, Namespace::Package)).unwrap().is_empty());
		let identity = context.find_providers(requirement(&tree, importer, Namespace::Identity)).unwrap();
		assert_eq!(identity.len(), 1);
		assert_eq!(context.region_of(identity[0].resource), "root");
	}

	#[test]
	fn plain_child_imports_everything() {
		let mut tree = SubsystemTree::new("root");
		let app = tree.create_subsystem(tree.root(), "app", true).unwrap();
		let exporter = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		let importer = tree.add_system_resource(app, bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]));
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		let found = context.find_providers(requirement(&tree, importer, Namespace::Package)).unwrap();
		assert_eq!(found.iter().map(|c| c.resource).collect::<Vec<_>>(), vec![exporter]);
	}

	#[test]
	fn parent_does_not_see_child_packages() {
		let mut tree = SubsystemTree::new("root");
		let app = tree.create_subsystem(tree.root(), "app", true).unwrap();
		tree.add_system_resource(app, bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		let importer = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]));
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();
		assert!(context.find_providers(requirement(&tree, importer, Namespace::Package)).unwrap().is_empty());
	}

	#[test]
	fn copies_in_sibling_regions_keep_first_region() {
		let mut tree = SubsystemTree::new("root");
		let f1 = tree.create_feature_subsystem(tree.root(), Arc::new(Feature::new("f1", "1.0.0")), "${range;[====,====]}").unwrap();
		let f2 = tree.create_feature_subsystem(tree.root(), Arc::new(Feature::new("f2", "1.0.0")), "${range;[====,====]}").unwrap();
		tree.add_system_resource(f2, bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		let kept = tree.add_system_resource(f1, bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		let importer = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]));
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		let found = context.find_providers(requirement(&tree, importer, Namespace::Package)).unwrap();
		assert_eq!(found.iter().map(|c| c.resource).collect::<Vec<_>>(), vec![kept]);
	}

	#[test]
	fn copies_with_several_capabilities_keep_first_region() {
		let mut tree = SubsystemTree::new("root");
		/* f2 comes first in the repository, f1 sorts first by region */
		let f2 = tree.create_feature_subsystem(tree.root(), Arc::new(Feature::new("f2", "1.0.0")), "${range;[====,====]}").unwrap();
		let f1 = tree.create_feature_subsystem(tree.root(), Arc::new(Feature::new("f1", "1.0.0")), "${range;[====,====]}").unwrap();
		tree.add_system_resource(f2, bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p;version=1,p;version=2")]));
		let kept = tree.add_system_resource(f1, bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p;version=1,p;version=2")]));
		let importer = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]));
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		let found = context.find_providers(requirement(&tree, importer, Namespace::Package)).unwrap();
		assert_eq!(found.len(), 2);
		assert!(found.iter().all(|c| c.resource == kept));
	}

	#[test]
	fn copies_in_one_region_fail() {
		let mut tree = SubsystemTree::new("root");
		tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		let importer = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]));
		let digraph = tree.region_digraph().unwrap();
		/* Nothing requires the importer, so distances never look its import up */
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		let found = context.find_providers(requirement(&tree, importer, Namespace::Package));
		assert!(matches!(found, Err(ResolutionError::DuplicateResource { .. })));
	}

	#[test]
	fn copies_reachable_from_root_fail_early() {
		let mut tree = SubsystemTree::new("root");
		let root = tree.root();
		tree.add_system_resource(root, bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		tree.add_system_resource(root, bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		tree.require(root, "requirement:osgi.wiring.package;filter:=\"(osgi.wiring.package=p)\"").unwrap();
		let digraph = tree.region_digraph().unwrap();

		let context = SubsystemResolveContext::new(&tree, &digraph);
		assert!(matches!(context, Err(crate::Error::Resolution(ResolutionError::DuplicateResource { .. }))));
	}

	/// Root exports `p` from `b1` and `b3`, the scoped `f2` lets bundles through by `filter`.
	fn visible_bundles(filter: &str) -> (SubsystemTree, ResourceId) {
		let mut tree = SubsystemTree::new("root");
		let mut f2 = Feature::new("f2", "1.0.0");
		f2.scoping = Some(Scoping { accept_dependencies: false, imports: vec![ScopeFilter::new(VISIBLE_BUNDLE_NAMESPACE, filter)], exports: vec![] });
		let f2 = tree.create_feature_subsystem(tree.root(), Arc::new(f2), "${range;[====,====]}").unwrap();

		tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b3"), ("Export-Package", "p")]));
		let importer = tree.add_system_resource(f2, bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]));
		(tree, importer)
	}

	#[test]
	fn visible_bundle_lets_its_packages_through() {
		let (tree, importer) = visible_bundles("(bundle-symbolic-name=b1)");
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		let found = context.find_providers(requirement(&tree, importer, Namespace::Package)).unwrap();
		let names: Vec<_> = found.iter().filter_map(|c| tree.resources().get(c.resource).symbolic_name()).collect();
		assert_eq!(names, vec!["b1"]);
	}

	#[test]
	fn resource_without_identity_is_not_a_visible_bundle() {
		let (mut tree, importer) = visible_bundles("(bundle-version>=0)");
		let mut anonymous = Resource::new(ResourceOrigin::Synthetic);
		let attributes: Attributes = [(Namespace::Package.as_str().to_string(), AttributeValue::from("p"))].into_iter().collect();
		anonymous.add_capability(Capability::new(Namespace::Package, attributes, BTreeMap::new()));
		let anonymous = tree.add_system_resource(tree.root(), anonymous);
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		let found = context.find_providers(requirement(&tree, importer, Namespace::Package)).unwrap();
		assert_eq!(found.len(), 2);
		assert!(found.iter().all(|c| c.resource != anonymous));
	}

	#[test]
	fn global_resources_fill_mandatory_gaps() {
		let mut tree = SubsystemTree::new("root");
		let app = tree.create_subsystem(tree.root(), "app", true).unwrap();
		let importer = tree.add_system_resource(app, bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]));
		let optional = tree.add_system_resource(app, bundle(&[("Bundle-SymbolicName", "b4"), ("Import-Package", "p;resolution:=optional")]));
		tree.add_global_resources(&[bundle(&[("Bundle-SymbolicName", "g1"), ("Export-Package", "p")])]);
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		let found = context.find_providers(requirement(&tree, importer, Namespace::Package)).unwrap();
		assert_eq!(found.iter().map(|c| c.resource).collect::<Vec<_>>(), tree.get(app).global().to_vec());
		assert_eq!(context.region_of(found[0].resource), "root/app");
		assert!(context.find_providers(requirement(&tree, optional, Namespace::Package)).unwrap().is_empty());
		assert_eq!(context.global_repository().resources().len(), 2);
	}

	#[test]
	fn installed_copy_wins() {
		let mut tree = SubsystemTree::new("root");
		tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		let installed = tree.add_system_resource(tree.root(), installed(12, &[("Bundle-SymbolicName", "b1"), ("Export-Package", "p")]));
		let importer = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p")]));
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		let found = context.find_providers(requirement(&tree, importer, Namespace::Package)).unwrap();
		assert_eq!(found.iter().map(|c| c.resource).collect::<Vec<_>>(), vec![installed]);
	}

	#[test]
	fn root_is_closest() {
		let (tree, importer) = isolated();
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();
		assert_eq!(context.cost(tree.get(tree.root()).resource()), 0);
		/* Nothing requires the importer */
		assert_eq!(context.cost(importer), u32::MAX);
	}

	#[test]
	fn hosted_capability_sorted_in() {
		let mut tree = SubsystemTree::new("root");
		let low = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b1"), ("Bundle-Version", "1"), ("Export-Package", "p")]));
		let high = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b2"), ("Bundle-Version", "3"), ("Export-Package", "p;version=3")]));
		let mid = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b3"), ("Export-Package", "p;version=2")]));
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();

		let package = |r: ResourceId| tree.resources().capability_refs(r).find(|c| tree.resources().capability(*c).namespace() == &Namespace::Package).unwrap();
		let mut capabilities = vec![package(high), package(low)];
		assert_eq!(context.insert_hosted_capability(&mut capabilities, package(mid)), 1);
	}

	#[test]
	fn optional_non_identity_not_effective() {
		let mut tree = SubsystemTree::new("root");
		let importer = tree.add_system_resource(tree.root(), bundle(&[("Bundle-SymbolicName", "b2"), ("Import-Package", "p;resolution:=optional")]));
		let digraph = tree.region_digraph().unwrap();
		let context = SubsystemResolveContext::new(&tree, &digraph).unwrap();
		assert!(!context.is_effective(requirement(&tree, importer, Namespace::Package)));
	}
}
