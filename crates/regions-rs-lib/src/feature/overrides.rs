//! Replacing bundles by newer versions of themselves.
//!
//! An override is a clause `location[;range=<range>]`. Once downloaded, the override replaces every
//! bundle with the same symbolic name whose version is older than the override's, provided the override's
//! version lies within the range. The default range is `[major.minor.0, major.(minor+1).0)` of the replaced bundle.

use std::collections::BTreeMap;

use crate::resource::clause;
use crate::resource::{ResourceId, ResourceStore};
use crate::version::{Version, VersionRange};

pub const OVERRIDE_RANGE: &str = "range";

/// Locations of every override, downloaded alongside the bundles they may replace.
pub fn locations(overrides: &[String]) -> crate::Result<Vec<String>> {
	let mut locations = Vec::new();
	for text in overrides {
		for clause in clause::parse_header(text).map_err(|e| crate::Error::Parse(e.to_string()))? {
			locations.extend(clause.paths);
		}
	}
	Ok(locations)
}

pub fn apply(store: &ResourceStore, bundles: &mut BTreeMap<String, ResourceId>, overrides: &[String]) -> crate::Result<()> {
	for text in overrides {
		for clause in clause::parse_header(text).map_err(|e| crate::Error::Parse(e.to_string()))? {
			let explicit = clause.attribute(OVERRIDE_RANGE).map(VersionRange::parse).transpose()?;
			for location in &clause.paths {
				let Some(&over) = bundles.get(location) else { continue };
				let over_resource = store.get(over);
				let Some(name) = over_resource.symbolic_name() else { continue };
				let over_version = over_resource.version();

				for (uri, id) in bundles.iter_mut() {
					let resource = store.get(*id);
					if *id == over || resource.symbolic_name() != Some(name) {
						continue;
					}
					let version = resource.version();
					let range = explicit.clone().unwrap_or_else(|| {
						VersionRange::new(Version::new(version.major(), version.minor(), 0), true, version.next_minor(), false)
					});
					if range.contains(&over_version) && version < over_version {
						log::debug!("Overriding {} with {}", uri, location);
						*id = over;
					}
				}
			}
		}
	}
	Ok(())
}
