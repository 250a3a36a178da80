//! Resolving a self contained JSON document of resource descriptors.
//!
//! ```json
//! { "repository": [ { "capabilities": ["osgi.identity;osgi.identity=root"], "requirements": ["osgi.wiring.package;filter:=\"(osgi.wiring.package=p)\""] } ],
//!   "globalRepository": { "lib": { "capabilities": ["osgi.wiring.package;osgi.wiring.package=p"] } } }
//! ```
//!
//! A requirement on the identity `root` is resolved against `repository`. Mandatory requirements nothing in
//! `repository` satisfies fall back to `globalRepository`.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::filter::Filter;
use crate::repository::CapabilityRepository;
use crate::resolver::{ResolutionError, ResolveContext, Resolver, Wiring};
use crate::resource::builder;
use crate::resource::*;
use crate::subsystem_resolver::CandidateComparator;

pub const ROOT_IDENTITY: &str = "root";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptor {
	pub capabilities: Vec<String>,
	pub requirements: Vec<String>,
}

/// Descriptors either listed or keyed by an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descriptors {
	List(Vec<Descriptor>),
	Map(BTreeMap<String, Descriptor>),
}

impl Default for Descriptors {
	fn default() -> Self {
		Descriptors::List(Vec::new())
	}
}

impl Descriptor {
	/// Capabilities and requirements of `resource` as clauses a batch document reads back.
	pub fn from_resource(resource: &Resource) -> Self {
		Self {
			capabilities: resource.capabilities().iter().map(ToString::to_string).collect(),
			requirements: resource.requirements().iter().map(ToString::to_string).collect(),
		}
	}
}

impl Descriptors {
	/// `(id, descriptor)`, list entries are identified by their index.
	pub fn entries(&self) -> Vec<(String, &Descriptor)> {
		match self {
			Descriptors::List(list) => list.iter().enumerate().map(|(i, d)| (i.to_string(), d)).collect(),
			Descriptors::Map(map) => map.iter().map(|(id, d)| (id.clone(), d)).collect(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchDocument {
	pub repository: Descriptors,
	pub global_repository: Descriptors,
}

impl BatchDocument {
	pub fn load_from_path(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
	}

	pub fn from_json(text: &str) -> crate::Result<Self> {
		Ok(serde_json::from_str(text)?)
	}
}

fn descriptor_resource(id: &str, descriptor: &Descriptor) -> crate::Result<Resource> {
	let error = |source| crate::Error::Resource { uri: id.to_string(), source };
	let mut resource = Resource::new(ResourceOrigin::Descriptor);
	for text in &descriptor.capabilities {
		for capability in builder::parse_capabilities(text).map_err(error)? {
			resource.add_capability(capability);
		}
	}
	for text in &descriptor.requirements {
		for requirement in builder::parse_requirements(text).map_err(error)? {
			resource.add_requirement(requirement);
		}
	}
	Ok(resource)
}

/// Mandatory requirement on the identity `root`, whatever its type.
fn root_requirement() -> Requirement {
	let mut attributes = Attributes::default();
	attributes.insert(Namespace::Identity.as_str(), ROOT_IDENTITY);
	Requirement::new(Namespace::Identity, attributes, BTreeMap::new(), Filter::equal(Namespace::Identity.as_str(), ROOT_IDENTITY))
}

struct RepositoryResolveContext<'a> {
	store: &'a ResourceStore,
	root: ResourceId,
	primary: CapabilityRepository<'a>,
	global: CapabilityRepository<'a>,
}

impl ResolveContext for RepositoryResolveContext<'_> {
	fn resources(&self) -> &ResourceStore {
		self.store
	}

	fn mandatory_resources(&self) -> Vec<ResourceId> {
		vec![self.root]
	}

	fn find_providers(&self, requirement: RequirementRef) -> Result<Vec<CapabilityRef>, ResolutionError> {
		let requirement = self.store.requirement(requirement);
		let mut found = self.primary.find_providers(requirement);
		if found.is_empty() && !requirement.is_optional() {
			found = self.global.find_providers(requirement);
		}
		CandidateComparator::new(self.store).sort(&mut found);
		Ok(found)
	}

	fn insert_hosted_capability(&self, capabilities: &mut Vec<CapabilityRef>, hosted: CapabilityRef) -> usize {
		let comparator = CandidateComparator::new(self.store);
		let index = match capabilities.binary_search_by(|c| comparator.compare(*c, hosted)) {
			Ok(i) | Err(i) => i,
		};
		capabilities.insert(index, hosted);
		index
	}

	fn is_effective(&self, _: RequirementRef) -> bool {
		true
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireSummary {
	pub requirement: String,
	pub capability: String,
	pub requirer: String,
	pub provider: String,
}

/// Resolved document, resources are labelled by their descriptor id.
#[derive(Debug)]
pub struct BatchResolution {
	store: ResourceStore,
	labels: BTreeMap<ResourceId, String>,
	root: ResourceId,
	wiring: Wiring,
}

impl BatchResolution {
	pub fn wiring(&self) -> &Wiring { &self.wiring }
	pub fn resources(&self) -> &ResourceStore { &self.store }

	pub fn label(&self, resource: ResourceId) -> String {
		self.labels.get(&resource).cloned().unwrap_or_else(|| self.store.get(resource).to_string())
	}

	/// Descriptor id -> its wires, the synthetic root is left out.
	pub fn summary(&self) -> BTreeMap<String, Vec<WireSummary>> {
		self.wiring.iter()
			.filter(|(resource, _)| **resource != self.root)
			.map(|(resource, wires)| {
				let wires = wires.iter()
					.map(|w| WireSummary {
						requirement: self.store.requirement(w.requirement).to_string(),
						capability: self.store.capability(w.capability).to_string(),
						requirer: self.label(w.requirer),
						provider: self.label(w.provider),
					})
					.collect();
				(self.label(*resource), wires)
			})
			.collect()
	}

	pub fn to_json(&self) -> crate::Result<String> {
		Ok(serde_json::to_string_pretty(&self.summary())?)
	}
}

/// Everything a subsystem resolution was given and what came out of it.
///
/// `repository` and `globalRepository` use the descriptor form of [`BatchDocument`]. Resources in `wiring` are
/// labelled by their identity capability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDump {
	pub repository: Vec<Descriptor>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub global_repository: Vec<Descriptor>,
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub exception: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub wiring: Option<BTreeMap<String, Vec<WireSummary>>>,
}

fn dump_label(resource: &Resource) -> String {
	match resource.identity() {
		Some(identity) => identity.to_string(),
		None => resource.to_string(),
	}
}

impl ResolutionDump {
	pub fn new(store: &ResourceStore, repository: &[ResourceId], global: &[Resource], result: &Result<Wiring, ResolutionError>) -> Self {
		let label = |id: ResourceId| dump_label(store.get(id));
		let (wiring, exception) = match result {
			Ok(wiring) => {
				let wiring = wiring.iter()
					.map(|(resource, wires)| {
						let wires = wires.iter()
							.map(|w| WireSummary {
								requirement: store.requirement(w.requirement).to_string(),
								capability: store.capability(w.capability).to_string(),
								requirer: label(w.requirer),
								provider: label(w.provider),
							})
							.collect();
						(label(*resource), wires)
					})
					.collect();
				(Some(wiring), None)
			},
			Err(e) => (None, Some(e.to_string())),
		};

		Self {
			repository: repository.iter().map(|r| Descriptor::from_resource(store.get(*r))).collect(),
			global_repository: global.iter().map(Descriptor::from_resource).collect(),
			success: result.is_ok(),
			exception,
			wiring,
		}
	}

	pub fn to_json(&self) -> crate::Result<String> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	pub fn save(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
		let file = std::fs::File::create(path)?;
		serde_json::to_writer_pretty(file, self)?;
		Ok(())
	}
}

/// Resolves the `root` identity of `document` with `resolver`.
pub fn resolve(document: &BatchDocument, resolver: &dyn Resolver) -> crate::Result<BatchResolution> {
	let mut store = ResourceStore::default();
	let mut labels = BTreeMap::new();

	let mut root = Resource::new(ResourceOrigin::Synthetic);
	root.add_requirement(root_requirement());
	let root = store.add(root);

	let mut primary = vec![root];
	for (id, descriptor) in document.repository.entries() {
		let resource = store.add(descriptor_resource(&id, descriptor)?);
		labels.insert(resource, id);
		primary.push(resource);
	}
	let mut global = Vec::new();
	for (id, descriptor) in document.global_repository.entries() {
		let resource = store.add(descriptor_resource(&id, descriptor)?);
		labels.insert(resource, format!("global:{}", id));
		global.push(resource);
	}
	log::info!("Resolving {} resources with {} global fallbacks", primary.len() - 1, global.len());

	let wiring = {
		let context = RepositoryResolveContext {
			store: &store,
			root,
			primary: CapabilityRepository::new(&store, primary),
			global: CapabilityRepository::new(&store, global),
		};
		resolver.resolve(&context)?
	};
	Ok(BatchResolution { store, labels, root, wiring })
}
