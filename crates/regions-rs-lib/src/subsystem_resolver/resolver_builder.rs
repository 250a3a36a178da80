use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{ResolvedSubsystems, SubsystemResolveContext, SubsystemTree};
use crate::batch::ResolutionDump;
use crate::download::DownloadManager;
use crate::feature::{FeatureCatalog, FeatureRepository};
use crate::resolver::{Resolver, Wiring};
use crate::resource::builder;
use crate::resource::{Namespace, Resource, ResourceId, ResourceOrigin};
use crate::version::Version;

/// Namespace of the execution environment capabilities.
pub const EXECUTION_ENVIRONMENT_NAMESPACE: &str = "osgi.ee";
pub const ENVIRONMENT_IDENTITY: &str = "environment";
pub const TYPE_ENVIRONMENT: &str = "karaf.environment";

pub struct SubsystemResolverBuilder {
	repositories: Vec<FeatureRepository>,
	/// Region path -> requirement strings
	requirements: BTreeMap<String, Vec<String>>,
	/// Region path -> resources already installed there
	system_resources: BTreeMap<String, Vec<Resource>>,
	overrides: Vec<String>,
	feature_range: String,
	digraph_snapshot: Option<PathBuf>,
	global_repository: Vec<Resource>,
	/// Provide-Capability of the system bundle
	environment: Option<String>,
	resolution_dump: Option<PathBuf>,
}

impl Default for SubsystemResolverBuilder {
	fn default() -> Self {
		Self {
			repositories: Default::default(),
			requirements: Default::default(),
			system_resources: Default::default(),
			overrides: Default::default(),
			feature_range: crate::config::DEFAULT_FEATURE_RESOLUTION_RANGE.to_string(),
			digraph_snapshot: None,
			global_repository: Vec::new(),
			environment: None,
			resolution_dump: None,
		}
	}
}

impl SubsystemResolverBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder using the feature range, snapshot and dump locations of `config`.
	pub fn from_config(config: &crate::Config) -> Self {
		Self {
			feature_range: config.feature_resolution_range().to_string(),
			digraph_snapshot: config.digraph_snapshot().cloned(),
			resolution_dump: config.resolution_dump().cloned(),
			..Default::default()
		}
	}

	pub fn add_repositories(mut self, repositories: impl IntoIterator<Item = FeatureRepository>) -> Self {
		self.repositories.extend(repositories);
		self
	}

	/// Requirements of the region `region`, a `/` separated path starting with the root's name.
	///
	/// See [`SubsystemTree::require`] for the requirement syntax.
	pub fn add_requirements(mut self, region: impl Into<String>, requirements: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.requirements.entry(region.into()).or_default().extend(requirements.into_iter().map(Into::into));
		self
	}

	pub fn add_system_resources(mut self, region: impl Into<String>, resources: impl IntoIterator<Item = Resource>) -> Self {
		self.system_resources.entry(region.into()).or_default().extend(resources);
		self
	}

	pub fn overrides(mut self, overrides: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.overrides = overrides.into_iter().map(Into::into).collect();
		self
	}

	pub fn feature_range(mut self, feature_range: impl Into<String>) -> Self {
		self.feature_range = feature_range.into();
		self
	}

	pub fn digraph_snapshot(mut self, path: Option<PathBuf>) -> Self {
		self.digraph_snapshot = path;
		self
	}

	/// Resources mandatory requirements fall back to when nothing in the regions provides for them.
	pub fn global_repository(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
		self.global_repository.extend(resources);
		self
	}

	/// The system bundle's `Provide-Capability` header.
	///
	/// When no system resource provides an `osgi.ee` capability these capabilities are offered from the root by
	/// a stand-in resource. Wires to it are dropped from the result.
	pub fn environment_capabilities(mut self, provide_capability: impl Into<String>) -> Self {
		self.environment = Some(provide_capability.into());
		self
	}

	/// Writes what the resolver was given and its outcome to `path`, whether it succeeds or not.
	pub fn resolution_dump(mut self, path: Option<PathBuf>) -> Self {
		self.resolution_dump = path;
		self
	}

	/// Builds the subsystem tree out of the region paths.
	///
	/// # Errors
	/// When regions do not share one root or a path has an empty segment.
	pub fn build(self) -> crate::Result<SubsystemResolverProcessor> {
		let mut tree: Option<SubsystemTree> = None;

		for (region, requirements) in &self.requirements {
			let segments: Vec<&str> = region.split('/').collect();
			if segments.iter().any(|s| s.is_empty()) {
				return Err(crate::Error::Configuration(format!("region {} has an empty segment", region)));
			}
			let tree = tree.get_or_insert_with(|| SubsystemTree::new(segments[0]));
			let root = tree.root();
			if tree.get(root).name() != segments[0] {
				return Err(crate::Error::Configuration(format!("region {} is not below root {}", region, tree.get(root).name())));
			}

			let mut subsystem = root;
			for segment in &segments[1..] {
				subsystem = tree.get_or_create_child(subsystem, segment)?;
			}
			for requirement in requirements {
				tree.require(subsystem, requirement)?;
			}
		}

		Ok(SubsystemResolverProcessor {
			tree,
			repositories: self.repositories,
			system_resources: self.system_resources,
			overrides: self.overrides,
			feature_range: self.feature_range,
			digraph_snapshot: self.digraph_snapshot,
			global_repository: self.global_repository,
			environment: self.environment,
			resolution_dump: self.resolution_dump,
		})
	}
}

pub struct SubsystemResolverProcessor {
	tree: Option<SubsystemTree>,
	repositories: Vec<FeatureRepository>,
	system_resources: BTreeMap<String, Vec<Resource>>,
	overrides: Vec<String>,
	feature_range: String,
	digraph_snapshot: Option<PathBuf>,
	global_repository: Vec<Resource>,
	environment: Option<String>,
	resolution_dump: Option<PathBuf>,
}

fn environment_resource(provide_capability: &str) -> crate::Result<Resource> {
	let mut resource = Resource::new(ResourceOrigin::Synthetic);
	resource.add_capability(builder::identity_capability(ENVIRONMENT_IDENTITY, TYPE_ENVIRONMENT, Version::default()));
	let capabilities = builder::parse_capabilities(provide_capability)
		.map_err(|source| crate::Error::Resource { uri: ENVIRONMENT_IDENTITY.to_string(), source })?;
	for capability in capabilities {
		resource.add_capability(capability);
	}
	Ok(resource)
}

fn has_environment(tree: &SubsystemTree) -> bool {
	let store = tree.resources();
	tree.pre_order().into_iter()
		.flat_map(|id| tree.get(id).installable().iter().copied())
		.flat_map(|r| store.get(r).capabilities())
		.any(|c| c.namespace() == &Namespace::Other(EXECUTION_ENVIRONMENT_NAMESPACE.to_string()))
}

impl SubsystemResolverProcessor {
	/// `None` when no region was required.
	pub fn tree(&self) -> Option<&SubsystemTree> {
		self.tree.as_ref()
	}

	/// Expands features, lays out regions and hands everything to `resolver`.
	///
	/// Nothing is returned unless the whole resolution succeeds.
	pub fn resolve(self, resolver: &dyn Resolver, downloads: &dyn DownloadManager) -> crate::Result<ResolvedSubsystems> {
		let Some(mut tree) = self.tree else {
			log::info!("No region required, nothing to resolve");
			return Ok(ResolvedSubsystems::empty());
		};

		let catalog = FeatureCatalog::from_repositories(&self.repositories);
		log::info!("Resolving against {} features", catalog.len());
		tree.pre_resolve(&catalog, downloads, &self.overrides, &self.feature_range)?;

		for (region, resources) in self.system_resources {
			match tree.find(&region) {
				Some(id) => {
					for resource in resources {
						tree.add_system_resource(id, resource);
					}
				},
				None => log::debug!("Ignoring system resources of unknown region {}", region),
			}
		}
		let environment: Option<ResourceId> = match &self.environment {
			Some(text) if !has_environment(&tree) => {
				log::debug!("No {} capability installed, providing {}", EXECUTION_ENVIRONMENT_NAMESPACE, text);
				let root = tree.root();
				Some(tree.add_system_resource(root, environment_resource(text)?))
			},
			_ => None,
		};
		tree.add_global_resources(&self.global_repository);

		let digraph = tree.region_digraph()?;
		if let Some(path) = &self.digraph_snapshot {
			digraph.save_snapshot(path);
		}

		let mut wiring: Wiring = {
			let context = SubsystemResolveContext::new(&tree, &digraph)?;
			let result = resolver.resolve(&context);
			if let Some(path) = &self.resolution_dump {
				log::debug!("Dumping resolution to {}", path.display());
				ResolutionDump::new(tree.resources(), context.repository().resources(), &self.global_repository, &result).save(path)?;
			}
			result?
		};
		if let Some(environment) = environment {
			for wires in wiring.values_mut() {
				wires.retain(|w| w.provider != environment);
			}
		}
		log::info!("Resolved {} resources in {} regions", wiring.len(), tree.len());

		let mut resolved = ResolvedSubsystems::new(tree, digraph, wiring);
		resolved.associate_fragments();
		Ok(resolved)
	}
}
