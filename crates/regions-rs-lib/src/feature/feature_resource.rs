use std::collections::BTreeMap;

use super::{Conditional, Dependency, Feature};
use crate::resource::builder;
use crate::resource::{Resource, ResourceId, ResourceOrigin, ResourceStore, TYPE_FEATURE};

fn clause_error(feature: &Feature, source: builder::ManifestError) -> crate::Error {
	crate::Error::Resource { uri: feature.to_string(), source }
}

/// Builds the resource standing in for `feature` during resolution.
///
/// It requires every non-dependency bundle (by exact identity, from `bundles`) and every non-dependency feature.
pub fn feature_resource(store: &ResourceStore, feature: &Feature, feature_range: &str, bundles: &BTreeMap<String, ResourceId>) -> crate::Result<Resource> {
	let version = feature.osgi_version();
	let mut resource = Resource::new(ResourceOrigin::Feature { name: feature.name.clone(), version: version.clone() });
	resource.add_capability(builder::identity_capability(&feature.name, TYPE_FEATURE, version));

	for info in feature.bundles.iter().filter(|b| !b.dependency) {
		let id = bundles.get(&info.location).ok_or_else(|| {
			crate::Error::InternalState(format!("bundle {} of feature {} was not downloaded", info.location, feature))
		})?;
		if let Some(req) = builder::requirement_on(store.get(*id), true) {
			resource.add_requirement(req);
		}
	}

	for dependency in feature.dependencies.iter().filter(|d| !d.dependency) {
		add_feature_requirement(&mut resource, dependency, feature_range)?;
	}

	for text in &feature.capabilities {
		for capability in builder::parse_capabilities(text).map_err(|e| clause_error(feature, e))? {
			resource.add_capability(capability);
		}
	}
	for text in &feature.requirements {
		for requirement in builder::parse_requirements(text).map_err(|e| clause_error(feature, e))? {
			resource.add_requirement(requirement);
		}
	}

	Ok(resource)
}

fn add_feature_requirement(resource: &mut Resource, dependency: &Dependency, feature_range: &str) -> crate::Result<()> {
	let range = dependency.range(feature_range)?;
	resource.add_requirement(builder::identity_requirement(&dependency.name, TYPE_FEATURE, range.as_ref(), true));
	Ok(())
}

/// Resource for the conditional part of `feature`, named `<feature>-condition-<conditions>`.
///
/// Conditions are feature names (`name[/version]`) or, prefixed with `req:`, requirement clauses.
/// The resource also requires its owning feature.
pub fn conditional_resource(store: &ResourceStore, feature: &Feature, conditional: &Conditional, feature_range: &str, bundles: &BTreeMap<String, ResourceId>) -> crate::Result<Resource> {
	let as_feature = Feature {
		name: format!("{}-condition-{}", feature.name, conditional.conditions.join("_")),
		version: feature.version.clone(),
		bundles: conditional.bundles.clone(),
		..Default::default()
	};
	let mut resource = feature_resource(store, &as_feature, feature_range, bundles)?;

	for condition in &conditional.conditions {
		match condition.strip_prefix("req:") {
			Some(clause) => {
				for requirement in builder::parse_requirements(clause).map_err(|e| clause_error(feature, e))? {
					resource.add_requirement(requirement);
				}
			},
			None => {
				let (name, version) = condition.split_once('/').unwrap_or((condition.as_str(), ""));
				add_feature_requirement(&mut resource, &Dependency::new(name, version), feature_range)?;
			},
		}
	}
	add_feature_requirement(&mut resource, &Dependency::new(&feature.name, &feature.version), feature_range)?;

	Ok(resource)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::feature::BundleInfo;
	use crate::resource::{Namespace, TYPE_BUNDLE};
	use crate::version::Version;

	fn store_with_bundle(location: &str) -> (ResourceStore, BTreeMap<String, ResourceId>) {
		let mut store = ResourceStore::default();
		let mut bundle = Resource::new(ResourceOrigin::Bundle { uri: location.into() });
		bundle.add_capability(builder::identity_capability("b1", TYPE_BUNDLE, Version::new(1, 0, 0)));
		let id = store.add(bundle);
		(store, [(location.to_string(), id)].into())
	}

	#[test]
	fn requires_bundles_and_features() {
		let (store, bundles) = store_with_bundle("mvn:b1");
		let mut feature = Feature::new("f1", "1.0.0");
		feature.bundles.push(BundleInfo::new("mvn:b1"));
		feature.dependencies.push(Dependency::new("f0", "0.0.0"));
		let r = feature_resource(&store, &feature, "${range;[====,====]}", &bundles).unwrap();
		assert_eq!(r.resource_type(), Some(TYPE_FEATURE));
		assert_eq!(r.requirements().len(), 2);
		assert!(r.requirements().iter().all(|q| q.namespace() == &Namespace::Identity && !q.is_optional()));
	}

	#[test]
	fn dependency_bundles_not_required() {
		let (store, bundles) = store_with_bundle("mvn:b1");
		let mut feature = Feature::new("f1", "1.0.0");
		feature.bundles.push(BundleInfo { dependency: true, ..BundleInfo::new("mvn:b1") });
		assert!(feature_resource(&store, &feature, "${range;[====,====]}", &bundles).unwrap().requirements().is_empty());
	}

	#[test]
	fn undownloaded_bundle_is_error() {
		let mut feature = Feature::new("f1", "1.0.0");
		feature.bundles.push(BundleInfo::new("mvn:missing"));
		assert!(feature_resource(&ResourceStore::default(), &feature, "${range;[====,====]}", &BTreeMap::new()).is_err());
	}

	#[test]
	fn conditional_name_and_requirements() {
		let (store, bundles) = store_with_bundle("mvn:b1");
		let feature = Feature::new("f1", "1.0.0");
		let conditional = Conditional { conditions: vec!["scr".into()], bundles: vec![BundleInfo::new("mvn:b1")] };
		let r = conditional_resource(&store, &feature, &conditional, "${range;[====,====]}", &bundles).unwrap();
		assert_eq!(r.symbolic_name(), Some("f1-condition-scr"));
		/* bundle, condition feature, owning feature */
		assert_eq!(r.requirements().len(), 3);
	}
}
