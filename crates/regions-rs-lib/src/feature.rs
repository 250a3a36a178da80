//! Feature model, named groups of bundles, conditionals and dependencies on other features.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::version::{Version, VersionRange};

mod feature_resource;
pub use feature_resource::feature_resource;
pub use feature_resource::conditional_resource;
pub mod overrides;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Feature {
	pub name: String,
	pub version: String,
	pub bundles: Vec<BundleInfo>,
	pub conditionals: Vec<Conditional>,
	pub dependencies: Vec<Dependency>,
	/// `None` means the feature is installed flat into the subsystem requiring it.
	pub scoping: Option<Scoping>,
	pub start_level: i32,
	/// Extra capability clauses provided by the feature.
	pub capabilities: Vec<String>,
	/// Extra requirement clauses of the feature.
	pub requirements: Vec<String>,
}

impl Feature {
	pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
		Self { name: name.into(), version: version.into(), ..Default::default() }
	}

	pub fn osgi_version(&self) -> Version {
		Version::lenient(&self.version)
	}

	pub fn has_version(&self) -> bool {
		!self.version.is_empty() && self.version != "0.0.0"
	}

	/// Same name and version, two features are interchangeable when this holds.
	pub fn same_identity(&self, other: &Feature) -> bool {
		self.name == other.name && self.osgi_version() == other.osgi_version()
	}
}

impl std::fmt::Display for Feature {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.has_version() {
			write!(f, "{}/{}", self.name, self.version)
		} else {
			write!(f, "{}", self.name)
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleInfo {
	pub location: String,
	pub start: bool,
	/// Zero or less falls back to the feature start level.
	pub start_level: i32,
	/// Installed in the nearest subsystem accepting dependencies rather than the feature's own.
	pub dependency: bool,
}

impl Default for BundleInfo {
	fn default() -> Self {
		Self { location: String::new(), start: true, start_level: 0, dependency: false }
	}
}

impl BundleInfo {
	pub fn new(location: impl Into<String>) -> Self {
		Self { location: location.into(), ..Default::default() }
	}
}

/// Bundles installed only when every condition feature is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Conditional {
	pub conditions: Vec<String>,
	pub bundles: Vec<BundleInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dependency {
	pub name: String,
	pub version: String,
	pub dependency: bool,
}

impl Dependency {
	pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
		Self { name: name.into(), version: version.into(), dependency: false }
	}

	/// Range of acceptable versions, `None` accepts any.
	///
	/// Explicit ranges are used as written, a bare version is widened with the range macro `feature_range`.
	pub fn range(&self, feature_range: &str) -> crate::Result<Option<VersionRange>> {
		let version = self.version.trim();
		if version.is_empty() || version == "0.0.0" {
			return Ok(None);
		}
		if version.starts_with('[') || version.starts_with('(') {
			return Ok(Some(VersionRange::parse(version)?));
		}
		Ok(Some(VersionRange::from_macro(feature_range, &Version::lenient(version))?))
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scoping {
	pub accept_dependencies: bool,
	pub imports: Vec<ScopeFilter>,
	pub exports: Vec<ScopeFilter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeFilter {
	pub namespace: String,
	pub filter: String,
}

impl ScopeFilter {
	pub fn new(namespace: impl Into<String>, filter: impl Into<String>) -> Self {
		Self { namespace: namespace.into(), filter: filter.into() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureRepository {
	pub uri: String,
	pub features: Vec<Feature>,
}

impl FeatureRepository {
	pub fn load_from_path(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
	}
}

/// Every known feature grouped by name.
#[derive(Debug, Clone, Default)]
pub struct FeatureCatalog {
	by_name: BTreeMap<String, Vec<Arc<Feature>>>,
}

impl FeatureCatalog {
	pub fn from_repositories<'a>(repositories: impl IntoIterator<Item = &'a FeatureRepository>) -> Self {
		let mut catalog = FeatureCatalog::default();
		for repository in repositories {
			for feature in &repository.features {
				catalog.add(feature.clone());
			}
		}
		catalog
	}

	pub fn add(&mut self, feature: Feature) {
		self.by_name.entry(feature.name.clone()).or_default().push(Arc::new(feature));
	}

	/// Features called `name` whose version lies in `range`, all of them when there is no range.
	pub fn matching<'a>(&'a self, name: &str, range: Option<&'a VersionRange>) -> impl Iterator<Item = &'a Arc<Feature>> + 'a {
		self.by_name.get(name)
			.into_iter()
			.flatten()
			.filter(move |f| range.map_or(true, |r| r.contains(&f.osgi_version())))
	}

	pub fn len(&self) -> usize { self.by_name.values().map(Vec::len).sum() }
	pub fn is_empty(&self) -> bool { self.by_name.is_empty() }
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn dependency_any_version() { assert_eq!(Dependency::new("f", "0.0.0").range("${range;[====,====]}").unwrap(), None); }

	#[test]
	fn dependency_explicit_range() {
		let range = Dependency::new("f", "[1,2)").range("${range;[====,====]}").unwrap().unwrap();
		assert!(range.contains(&Version::new(1, 5, 0)));
	}

	#[test]
	fn dependency_bare_version_uses_macro() {
		let range = Dependency::new("f", "1.2.3").range("${range;[==,=+)}").unwrap().unwrap();
		assert_eq!(range.to_string(), "[1.2.0,1.3.0)");
	}

	#[test]
	fn bundle_defaults_to_start() { assert!(serde_json::from_str::<BundleInfo>(r#"{"location": "mvn:a/b/1"}"#).unwrap().start); }

	#[test]
	fn catalog_filters_by_range() {
		let mut catalog = FeatureCatalog::default();
		catalog.add(Feature::new("f", "1.0.0"));
		catalog.add(Feature::new("f", "2.0.0"));
		let range = VersionRange::parse("[2,3)").unwrap();
		assert_eq!(catalog.matching("f", Some(&range)).count(), 1);
		assert_eq!(catalog.matching("f", None).count(), 2);
		assert_eq!(catalog.matching("g", None).count(), 0);
	}
}
