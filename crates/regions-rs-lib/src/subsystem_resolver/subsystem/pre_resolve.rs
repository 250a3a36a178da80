use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{DependencyInfo, SubsystemId, SubsystemTree};
use crate::download::DownloadManager;
use crate::feature::{self, overrides, BundleInfo, Feature, FeatureCatalog};
use crate::resource::builder;
use crate::resource::clause;
use crate::resource::*;
use crate::version::VersionRange;

/// Bound on feature subsystems created by one expansion.
const MAX_EXPANSIONS: usize = 10_000;

/// A `bundle:` requirement attached directly to a subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DirectBundle {
	location: String,
	dependency: bool,
	start: bool,
	start_level: i32,
}

fn parse_flag(clause: &clause::Clause, name: &str, default: bool) -> crate::Result<bool> {
	match clause.attribute(name) {
		None => Ok(default),
		Some(value) => value.trim().parse().map_err(|_| crate::Error::Parse(format!("{}={} is not a boolean", name, value))),
	}
}

fn parse_direct_bundles(texts: &[String]) -> crate::Result<Vec<DirectBundle>> {
	let mut direct = Vec::new();
	for text in texts {
		for clause in clause::parse_header(text).map_err(|e| crate::Error::Parse(e.to_string()))? {
			let dependency = parse_flag(&clause, "dependency", false)?;
			let start = parse_flag(&clause, "start", true)?;
			let start_level = match clause.attribute("start-level") {
				None => 0,
				Some(value) => value.trim().parse().map_err(|_| crate::Error::Parse(format!("start-level={} is not a number", value)))?,
			};
			for location in &clause.paths {
				direct.push(DirectBundle { location: location.clone(), dependency, start, start_level });
			}
		}
	}
	Ok(direct)
}

impl SubsystemTree {
	/// Turns the tree's feature requirements into subsystems and installable resources.
	///
	/// Feature requirements are first expanded into feature subsystems until no new one appears, then every
	/// subsystem, children first, downloads its bundles and aggregates its dependencies.
	pub fn pre_resolve(&mut self, catalog: &FeatureCatalog, downloads: &dyn DownloadManager, overrides: &[String], feature_range: &str) -> crate::Result<()> {
		self.expand_features(catalog, feature_range)?;
		for id in self.post_order() {
			self.build_resources(id, downloads, overrides, feature_range)?;
		}
		log::info!("Pre-resolved {} subsystems with {} resources", self.len(), self.resources.len());
		Ok(())
	}

	fn expand_features(&mut self, catalog: &FeatureCatalog, feature_range: &str) -> crate::Result<()> {
		let mut expansions = 0;
		loop {
			let mut changed = false;
			for id in self.post_order() {
				while let Some(request) = self.next_feature_request(id) {
					changed = true;
					expansions += self.expand_request(id, &request, catalog, feature_range)?;
					if expansions > MAX_EXPANSIONS {
						return Err(crate::Error::InternalState(format!("feature expansion exceeded {} subsystems", MAX_EXPANSIONS)));
					}
				}
			}
			if !changed {
				return Ok(());
			}
		}
	}

	/// Next requirement this subsystem has not looked at, its own requirements before the gathered dependencies.
	fn next_feature_request(&mut self, id: SubsystemId) -> Option<Requirement> {
		let subsystem = &self.subsystems[id.0];
		let requirements = self.resources.get(subsystem.resource).requirements();
		if let Some(requirement) = requirements.get(subsystem.processed) {
			let requirement = requirement.clone();
			self.subsystems[id.0].processed += 1;
			return Some(requirement);
		}
		let requirement = subsystem.dependent_features.get(subsystem.processed_dependents)?.clone();
		self.subsystems[id.0].processed_dependents += 1;
		Some(requirement)
	}

	/// Creates a feature subsystem below `id` for every catalog feature the request matches, returns how many.
	fn expand_request(&mut self, id: SubsystemId, request: &Requirement, catalog: &FeatureCatalog, feature_range: &str) -> crate::Result<usize> {
		let attributes = request.attributes();
		if request.namespace() != &Namespace::Identity || attributes.string(TYPE_ATTRIBUTE) != Some(TYPE_FEATURE) {
			return Ok(0);
		}
		let Some(name) = attributes.string(Namespace::Identity.as_str()) else { return Ok(0) };
		let range = attributes.string(VERSION_ATTRIBUTE).map(VersionRange::parse).transpose()?;

		let features: Vec<Arc<Feature>> = catalog.matching(name, range.as_ref()).cloned().collect();
		if features.is_empty() {
			log::debug!("No feature matches {} in {}", request, self.get(id).name);
		}

		let mut created = 0;
		for feature in features {
			let recursive = self.ancestors(id).any(|s| self.get(s).feature.as_ref().map_or(false, |f| f.same_identity(&feature)));
			if recursive || self.child(id, &self.feature_subsystem_name(id, &feature)).is_some() {
				continue;
			}
			self.create_feature_subsystem(id, feature, feature_range)?;
			created += 1;
		}
		Ok(created)
	}

	fn build_resources(&mut self, id: SubsystemId, downloads: &dyn DownloadManager, overrides: &[String], feature_range: &str) -> crate::Result<()> {
		let feature = self.get(id).feature.clone();
		let direct = parse_direct_bundles(&self.get(id).bundles)?;
		let subsystem_resource = self.get(id).resource;

		/* (bundle, index of its conditional) */
		let infos: Vec<(&BundleInfo, Option<usize>)> = match &feature {
			Some(feature) => feature.bundles.iter().map(|b| (b, None))
				.chain(feature.conditionals.iter().enumerate().flat_map(|(i, c)| c.bundles.iter().map(move |b| (b, Some(i)))))
				.collect(),
			None => Vec::new(),
		};

		let mut locations: BTreeSet<String> = infos.iter().map(|(b, _)| b.location.clone()).collect();
		locations.extend(direct.iter().map(|d| d.location.clone()));
		if feature.is_some() {
			locations.extend(overrides::locations(overrides)?);
		}

		let mut bundles = BTreeMap::new();
		if !locations.is_empty() {
			let locations: Vec<String> = locations.into_iter().collect();
			log::debug!("Downloading {} bundles for {}", locations.len(), self.get(id).name);
			for (location, headers) in downloads.download_headers(&locations)? {
				let resource = builder::build_resource(ResourceOrigin::Bundle { uri: location.clone() }, &headers)
					.map_err(|source| crate::Error::Resource { uri: location.clone(), source })?;
				bundles.insert(location, self.resources.add(resource));
			}
			if feature.is_some() {
				overrides::apply(&self.resources, &mut bundles, overrides)?;
			}
		}

		if let Some(feature) = &feature {
			let mut conditionals = Vec::with_capacity(feature.conditionals.len());
			for conditional in &feature.conditionals {
				let resource = feature::conditional_resource(&self.resources, feature, conditional, feature_range, &bundles)?;
				let resource = self.resources.add(resource);
				self.resources.require_resource(subsystem_resource, resource, false);
				self.resources.require_resource(resource, subsystem_resource, true);
				self.subsystems[id.0].installable.push(resource);
				conditionals.push(resource);
			}

			let resource = feature::feature_resource(&self.resources, feature, feature_range, &bundles)?;
			let resource = self.resources.add(resource);
			self.resources.require_resource(resource, subsystem_resource, true);
			self.subsystems[id.0].installable.push(resource);

			let unconditional: BTreeSet<&str> = feature.bundles.iter().map(|b| b.location.as_str()).collect();
			for (info, conditional) in &infos {
				let resource = *bundles.get(&info.location)
					.ok_or_else(|| crate::Error::InternalState(format!("bundle {} of feature {} was not downloaded", info.location, feature)))?;
				let start_level = if info.start_level > 0 { info.start_level } else { feature.start_level };
				let dependency = DependencyInfo { resource, mandatory: !info.dependency && conditional.is_none(), start: info.start, start_level };

				if let Some(index) = conditional {
					if !unconditional.contains(info.location.as_str()) {
						self.resources.require_resource(resource, conditionals[*index], true);
					}
				}
				if info.dependency {
					self.add_dependency(id, dependency)?;
				} else {
					self.do_add_dependency(id, dependency)?;
				}
			}
		}

		for bundle in &direct {
			let resource = *bundles.get(&bundle.location)
				.ok_or_else(|| crate::Error::InternalState(format!("bundle {} was not downloaded", bundle.location)))?;
			let dependency = DependencyInfo { resource, mandatory: !bundle.dependency, start: bundle.start, start_level: bundle.start_level };
			if bundle.dependency {
				self.add_dependency(id, dependency)?;
			} else {
				self.do_add_dependency(id, dependency)?;
				self.resources.require_resource(subsystem_resource, resource, true);
			}
		}

		let dependencies: Vec<DependencyInfo> = self.get(id).dependencies.values().copied().collect();
		for dependency in dependencies {
			self.resources.require_resource(dependency.resource, subsystem_resource, dependency.mandatory);
			self.subsystems[id.0].installable.push(dependency.resource);
		}
		Ok(())
	}
}
