//! Various helper functions for testing
//!
//! functions in this module should use results and not use any panics to avoid confusion in callers

use regions_rs::download::{Headers, StaticDownloadManager};
use regions_rs::feature::{BundleInfo, Feature, FeatureRepository, ScopeFilter, Scoping};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
}

/// Location used for the bundle `name` at `version`.
pub fn location(name: &str, version: &str) -> String {
	format!("mvn:test/{}/{}", name, version)
}

/// Manifest headers of a bundle, `extra` holds further headers such as `Export-Package`.
pub fn manifest(name: &str, version: &str, extra: &[(&str, &str)]) -> Headers {
	let mut headers = Headers::new();
	headers.insert("Bundle-ManifestVersion".into(), "2".into());
	headers.insert("Bundle-SymbolicName".into(), name.into());
	headers.insert("Bundle-Version".into(), version.into());
	for (key, value) in extra {
		headers.insert(key.to_string(), value.to_string());
	}
	headers
}

/// Serves every manifest at its [`location`].
pub fn downloads(manifests: impl IntoIterator<Item = Headers>) -> StaticDownloadManager {
	let mut downloads = StaticDownloadManager::new();
	for headers in manifests {
		let name = headers.get("Bundle-SymbolicName").cloned().unwrap_or_default();
		let version = headers.get("Bundle-Version").cloned().unwrap_or_default();
		downloads.insert(location(&name, &version), headers);
	}
	downloads
}

/// Unscoped feature installing the given bundle locations.
pub fn feature(name: &str, version: &str, bundles: &[String]) -> Feature {
	let mut feature = Feature::new(name, version);
	feature.bundles = bundles.iter().map(|b| BundleInfo::new(b.as_str())).collect();
	feature
}

/// Scoped feature importing only what `imports` lets through, exporting nothing but its identity.
pub fn scoped_feature(name: &str, version: &str, bundles: &[String], imports: &[(&str, &str)]) -> Feature {
	let mut feature = feature(name, version, bundles);
	feature.scoping = Some(Scoping {
		accept_dependencies: false,
		imports: imports.iter().map(|(ns, f)| ScopeFilter::new(*ns, *f)).collect(),
		exports: Vec::new(),
	});
	feature
}

pub fn repository(uri: &str, features: Vec<Feature>) -> FeatureRepository {
	FeatureRepository { uri: uri.into(), features }
}

/// Writes `repository` as JSON into a fresh temporary directory, the directory lives as long as the returned handle.
pub fn write_repository(repository: &FeatureRepository) -> Result<(tempfile::TempDir, std::path::PathBuf), Error> {
	let dir = tempfile::tempdir()?;
	let path = dir.path().join("features.json");
	serde_json::to_writer_pretty(std::fs::File::create(&path)?, repository)?;
	Ok((dir, path))
}
