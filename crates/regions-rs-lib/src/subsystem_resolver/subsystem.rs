//! Tree of subsystems, each one becoming a region of its own.
//!
//! Subsystems live in an arena indexed by [`SubsystemId`]. Every subsystem is backed by a resource in the
//! tree's [`ResourceStore`] so that other resources can require it and be placed in it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::feature::{Feature, ScopeFilter};
use crate::filter::ALL_FILTER;
use crate::region_digraph::{RegionDigraph, RegionFilter, SharingPolicy, VISIBLE_ALL_NAMESPACE};
use crate::resource::builder;
use crate::resource::*;
use crate::version::{Version, VersionRange};

mod pre_resolve;

pub const SUBSYSTEM_FILTER: &str = "(type=subsystem)";
pub const SUBSYSTEM_OR_FEATURE_FILTER: &str = "(|(type=subsystem)(type=feature))";

/// Everything is visible.
pub fn share_all_policy() -> SharingPolicy {
	SharingPolicy::from([(VISIBLE_ALL_NAMESPACE.to_string(), BTreeSet::from([ALL_FILTER.to_string()]))])
}

/// Nothing but subsystems is visible.
pub fn share_none_policy() -> SharingPolicy {
	SharingPolicy::from([(Namespace::Identity.as_str().to_string(), BTreeSet::from([SUBSYSTEM_FILTER.to_string()]))])
}

fn scoped_policy(filters: &[ScopeFilter]) -> SharingPolicy {
	let mut policy = SharingPolicy::new();
	for filter in filters {
		policy.entry(filter.namespace.clone()).or_default().insert(filter.filter.clone());
	}
	policy.entry(Namespace::Identity.as_str().to_string()).or_default().insert(SUBSYSTEM_OR_FEATURE_FILTER.to_string());
	policy
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubsystemId(pub usize);

/// How a resource is installed by the subsystem that aggregated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyInfo {
	pub resource: ResourceId,
	pub mandatory: bool,
	pub start: bool,
	/// Zero or less is unset.
	pub start_level: i32,
}

impl DependencyInfo {
	/// Stronger flags win, as does the lower of two explicit start levels. The resource of `self` is kept.
	pub fn merge(&self, other: &DependencyInfo) -> DependencyInfo {
		let start_level = if self.start_level > 0 && other.start_level > 0 {
			self.start_level.min(other.start_level)
		} else {
			self.start_level.max(other.start_level)
		};
		DependencyInfo {
			resource: self.resource,
			mandatory: self.mandatory || other.mandatory,
			start: self.start || other.start,
			start_level,
		}
	}
}

#[derive(Debug, Clone)]
pub struct Subsystem {
	/// `parent/segment` for regions, `parent#feature-version` for features.
	name: String,
	parent: Option<SubsystemId>,
	children: Vec<SubsystemId>,
	feature: Option<Arc<Feature>>,
	accept_dependencies: bool,
	import_policy: SharingPolicy,
	export_policy: SharingPolicy,
	resource: ResourceId,
	installable: Vec<ResourceId>,
	/// Copies of the global repository this subsystem may take dependencies from.
	global: Vec<ResourceId>,
	/// `symbolicName|version` -> dependency
	dependencies: BTreeMap<String, DependencyInfo>,
	/// Optional feature requirements gathered from descendants, they only decide which subsystems exist.
	dependent_features: Vec<Requirement>,
	/// `bundle:` requirements as clauses.
	bundles: Vec<String>,
	processed: usize,
	processed_dependents: usize,
}

impl Subsystem {
	pub fn name(&self) -> &str { &self.name }
	pub fn parent(&self) -> Option<SubsystemId> { self.parent }
	pub fn children(&self) -> &[SubsystemId] { &self.children }
	pub fn feature(&self) -> Option<&Arc<Feature>> { self.feature.as_ref() }
	pub fn accept_dependencies(&self) -> bool { self.accept_dependencies }
	pub fn import_policy(&self) -> &SharingPolicy { &self.import_policy }
	pub fn export_policy(&self) -> &SharingPolicy { &self.export_policy }
	pub fn resource(&self) -> ResourceId { self.resource }
	pub fn installable(&self) -> &[ResourceId] { &self.installable }
	pub fn global(&self) -> &[ResourceId] { &self.global }
	pub fn dependencies(&self) -> &BTreeMap<String, DependencyInfo> { &self.dependencies }
	pub fn bundles(&self) -> &[String] { &self.bundles }

	/// A feature without scoping adds no isolation, its content is really installed in the nearest non flat ancestor.
	pub fn is_flat(&self) -> bool {
		self.feature.as_ref().map_or(false, |f| f.scoping.is_none())
	}
}

#[derive(Debug, Clone)]
pub struct SubsystemTree {
	subsystems: Vec<Subsystem>,
	resources: ResourceStore,
}

impl SubsystemTree {
	/// Tree with only a root, which accepts dependencies and shares nothing but subsystems.
	pub fn new(root: impl Into<String>) -> Self {
		let mut tree = Self { subsystems: Vec::new(), resources: ResourceStore::default() };
		tree.add_subsystem(root.into(), None, None, true, share_none_policy(), share_none_policy());
		tree
	}

	fn add_subsystem(&mut self, name: String, parent: Option<SubsystemId>, feature: Option<Arc<Feature>>, accept_dependencies: bool, import_policy: SharingPolicy, export_policy: SharingPolicy) -> SubsystemId {
		let mut resource = Resource::new(ResourceOrigin::Subsystem { name: name.clone() });
		resource.add_capability(builder::identity_capability(&name, TYPE_SUBSYSTEM, Version::default()));
		let resource = self.resources.add(resource);

		let id = SubsystemId(self.subsystems.len());
		self.subsystems.push(Subsystem {
			name,
			parent,
			children: Vec::new(),
			feature,
			accept_dependencies,
			import_policy,
			export_policy,
			resource,
			installable: Vec::new(),
			global: Vec::new(),
			dependencies: BTreeMap::new(),
			dependent_features: Vec::new(),
			bundles: Vec::new(),
			processed: 0,
			processed_dependents: 0,
		});
		if let Some(parent) = parent {
			self.subsystems[parent.0].children.push(id);
			self.subsystems[parent.0].installable.push(resource);
		}
		id
	}

	pub fn root(&self) -> SubsystemId { SubsystemId(0) }

	/// # Panics
	/// When the id did not come from this tree.
	pub fn get(&self, id: SubsystemId) -> &Subsystem {
		&self.subsystems[id.0]
	}

	pub fn resources(&self) -> &ResourceStore { &self.resources }

	pub(crate) fn resources_mut(&mut self) -> &mut ResourceStore { &mut self.resources }

	pub fn len(&self) -> usize { self.subsystems.len() }
	pub fn is_empty(&self) -> bool { self.subsystems.is_empty() }

	pub fn find(&self, name: &str) -> Option<SubsystemId> {
		self.subsystems.iter().position(|s| s.name == name).map(SubsystemId)
	}

	/// Child of `parent` with the full name `name`.
	pub fn child(&self, parent: SubsystemId, name: &str) -> Option<SubsystemId> {
		self.get(parent).children.iter().copied().find(|c| self.get(*c).name == name)
	}

	/// Parents before children, children in creation order.
	pub fn pre_order(&self) -> Vec<SubsystemId> {
		let mut order = Vec::with_capacity(self.subsystems.len());
		let mut stack = vec![self.root()];
		while let Some(id) = stack.pop() {
			order.push(id);
			stack.extend(self.get(id).children.iter().rev());
		}
		order
	}

	/// Children before parents.
	pub fn post_order(&self) -> Vec<SubsystemId> {
		let mut order = Vec::with_capacity(self.subsystems.len());
		let mut stack = vec![(self.root(), false)];
		while let Some((id, expanded)) = stack.pop() {
			if expanded {
				order.push(id);
			} else {
				stack.push((id, true));
				stack.extend(self.get(id).children.iter().rev().map(|c| (*c, false)));
			}
		}
		order
	}

	/// Ancestors of `id` starting with itself.
	pub fn ancestors(&self, id: SubsystemId) -> impl Iterator<Item = SubsystemId> + '_ {
		std::iter::successors(Some(id), move |s| self.get(*s).parent)
	}

	/// Creates the region subsystem `parent/segment`, the parent then requires it.
	pub fn create_subsystem(&mut self, parent: SubsystemId, segment: &str, accept_dependencies: bool) -> crate::Result<SubsystemId> {
		let parent_subsystem = self.get(parent);
		if parent_subsystem.feature.is_some() {
			return Err(crate::Error::Configuration(format!("cannot create subsystem {} inside feature subsystem {}", segment, parent_subsystem.name)));
		}
		let name = format!("{}/{}", parent_subsystem.name, segment);
		if self.child(parent, &name).is_some() {
			return Err(crate::Error::AlreadyExists(format!("subsystem {}", name)));
		}

		log::debug!("Creating subsystem {}", name);
		let parent_resource = parent_subsystem.resource;
		let requirement = builder::identity_requirement(&name, TYPE_SUBSYSTEM, None, true);
		let id = self.add_subsystem(name, Some(parent), None, accept_dependencies, share_all_policy(), share_none_policy());
		self.resources.add_requirement(parent_resource, requirement);
		Ok(id)
	}

	pub fn get_or_create_child(&mut self, parent: SubsystemId, segment: &str) -> crate::Result<SubsystemId> {
		let name = format!("{}/{}", self.get(parent).name, segment);
		match self.child(parent, &name) {
			Some(id) => Ok(id),
			None => self.create_subsystem(parent, segment, true),
		}
	}

	fn feature_subsystem_name(&self, parent: SubsystemId, feature: &Feature) -> String {
		if feature.has_version() {
			format!("{}#{}-{}", self.get(parent).name, feature.name, feature.version)
		} else {
			format!("{}#{}", self.get(parent).name, feature.name)
		}
	}

	/// Creates the subsystem installing `feature` below `parent`.
	///
	/// The feature's dependencies become optional feature requests of the nearest ancestor accepting dependencies.
	pub(crate) fn create_feature_subsystem(&mut self, parent: SubsystemId, feature: Arc<Feature>, feature_range: &str) -> crate::Result<SubsystemId> {
		let name = self.feature_subsystem_name(parent, &feature);
		log::debug!("Creating feature subsystem {}", name);

		let (accept_dependencies, import_policy, export_policy) = match &feature.scoping {
			Some(scoping) => (scoping.accept_dependencies, scoped_policy(&scoping.imports), scoped_policy(&scoping.exports)),
			None => (false, share_all_policy(), share_all_policy()),
		};
		let requirement = builder::identity_requirement(&feature.name, TYPE_FEATURE, Some(&VersionRange::exact(feature.osgi_version())), true);
		let id = self.add_subsystem(name, Some(parent), Some(feature.clone()), accept_dependencies, import_policy, export_policy);
		let resource = self.get(id).resource;
		self.resources.add_requirement(resource, requirement);

		let target = self.accepting_ancestor(id)?;
		for dependency in &feature.dependencies {
			let range = dependency.range(feature_range)?;
			let request = builder::identity_requirement(&dependency.name, TYPE_FEATURE, range.as_ref(), false);
			self.subsystems[target.0].dependent_features.push(request);
		}
		Ok(id)
	}

	/// Adds an installed resource, such as a framework bundle, to a subsystem.
	pub fn add_system_resource(&mut self, id: SubsystemId, resource: Resource) -> ResourceId {
		let resource = self.resources.add(resource);
		self.subsystems[id.0].installable.push(resource);
		resource
	}

	/// Attaches a requirement string to a subsystem.
	///
	/// `feature:name[/range]` or a bare `name[/range]` requires a feature, `requirement:<clause>` a generic requirement
	/// and `bundle:<location>[;dependency=..;start=..;start-level=..]` a bundle.
	pub fn require(&mut self, id: SubsystemId, requirement: &str) -> crate::Result<()> {
		let (kind, text) = requirement.split_once(':').unwrap_or(("feature", requirement));
		let resource = self.get(id).resource;
		match kind {
			"feature" => {
				let (name, range) = text.split_once('/').unwrap_or((text, ""));
				let range = match range.trim() {
					"" | "0.0.0" => None,
					range => Some(VersionRange::parse(range)?),
				};
				self.resources.add_requirement(resource, builder::identity_requirement(name.trim(), TYPE_FEATURE, range.as_ref(), true));
			},
			"requirement" => {
				for parsed in builder::parse_requirements(text).map_err(|e| crate::Error::Parse(e.to_string()))? {
					self.resources.add_requirement(resource, parsed);
				}
			},
			"bundle" => self.subsystems[id.0].bundles.push(text.to_string()),
			other => log::warn!("Ignoring requirement {} of unknown type {}", requirement, other),
		}
		Ok(())
	}

	pub(crate) fn accepting_ancestor(&self, id: SubsystemId) -> crate::Result<SubsystemId> {
		self.ancestors(id)
			.find(|s| self.get(*s).accept_dependencies)
			.ok_or_else(|| crate::Error::InternalState(format!("no subsystem above {} accepts dependencies", self.get(id).name)))
	}

	/// Offers `resources` to every subsystem accepting dependencies.
	///
	/// Each subsystem gets copies of its own, carrying an optional requirement on the subsystem so that a copy
	/// picked during resolution is placed there.
	pub fn add_global_resources(&mut self, resources: &[Resource]) {
		for id in self.pre_order() {
			if !self.get(id).accept_dependencies {
				continue;
			}
			for resource in resources {
				let mut copy = resource.clone();
				copy.add_requirement(builder::identity_requirement(&self.get(id).name, TYPE_SUBSYSTEM, None, false));
				let copy = self.resources.add(copy);
				self.subsystems[id.0].global.push(copy);
			}
		}
	}

	/// Adds a dependency to the nearest subsystem, starting at `id`, that accepts dependencies.
	pub fn add_dependency(&mut self, id: SubsystemId, info: DependencyInfo) -> crate::Result<()> {
		let target = self.accepting_ancestor(id)?;
		self.do_add_dependency(target, info)
	}

	fn has_identity_requirement(&self, resource: ResourceId) -> bool {
		self.resources.get(resource).requirements().iter().any(|r| r.namespace() == &Namespace::Identity)
	}

	/// Adds a dependency to this very subsystem, merging with a previous one of the same identity.
	pub fn do_add_dependency(&mut self, id: SubsystemId, info: DependencyInfo) -> crate::Result<()> {
		let key = self.resources.get(info.resource).key()
			.ok_or_else(|| crate::Error::InternalState(format!("dependency {} has no identity", self.resources.get(info.resource))))?;

		let merged = match self.get(id).dependencies.get(&key) {
			None => info,
			Some(existing) => {
				let mut merged = existing.merge(&info);
				if existing.resource != info.resource {
					/* A resource already requiring something has been placed elsewhere */
					merged.resource = if !self.has_identity_requirement(existing.resource) {
						existing.resource
					} else if !self.has_identity_requirement(info.resource) {
						info.resource
					} else {
						return Err(crate::Error::InternalState(format!("resource {} is duplicated on subsystem {}", self.resources.get(info.resource), self.get(id).name)));
					};
				}
				merged
			},
		};
		self.subsystems[id.0].dependencies.insert(key, merged);
		Ok(())
	}

	/// Subsystem each resource is placed in.
	///
	/// A subsystem's own resource belongs to itself even though it is also installable in its parent.
	pub fn placements(&self) -> BTreeMap<ResourceId, SubsystemId> {
		let mut placements = BTreeMap::new();
		for id in self.pre_order() {
			let subsystem = self.get(id);
			for resource in subsystem.installable.iter().chain(&subsystem.global) {
				placements.insert(*resource, id);
			}
		}
		for id in self.pre_order() {
			placements.insert(self.get(id).resource, id);
		}
		placements
	}

	/// One region per subsystem holding its installed bundles, linked to the parent region both ways.
	///
	/// The child imports from its parent through its import policy and the parent sees the child through its
	/// export policy.
	pub fn region_digraph(&self) -> crate::Result<RegionDigraph> {
		let mut digraph = RegionDigraph::new();
		for id in self.pre_order() {
			let subsystem = self.get(id);
			digraph.create_region(subsystem.name.clone())?;
			let ids: Vec<u64> = subsystem.installable.iter().filter_map(|r| self.resources.get(*r).bundle_id()).collect();
			if let Some(region) = digraph.region_mut(&subsystem.name) {
				for bundle_id in ids {
					region.add_bundle(bundle_id);
				}
			}
			if let Some(parent) = subsystem.parent {
				let parent = &self.get(parent).name;
				digraph.connect(&subsystem.name, RegionFilter::new(subsystem.import_policy.clone())?, parent)?;
				digraph.connect(parent, RegionFilter::new(subsystem.export_policy.clone())?, &subsystem.name)?;
			}
		}
		Ok(digraph)
	}

	/// Dependencies of a subsystem keyed by location.
	pub fn bundle_infos(&self, id: SubsystemId) -> BTreeMap<String, DependencyInfo> {
		self.get(id).dependencies.values()
			.map(|info| {
				let resource = self.resources.get(info.resource);
				let location = resource.uri().map(String::from).unwrap_or_else(|| resource.to_string());
				(location, *info)
			})
			.collect()
	}
}
