//! Building resources out of manifest headers and capability/requirement clauses.

use std::collections::BTreeMap;

use super::*;
use super::clause::{self, Clause, ClauseError};
use crate::filter::{Filter, FilterError};
use crate::version::{Version, VersionRange, VersionError};

/// Manifest headers keyed by header name.
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
	#[error("missing Bundle-SymbolicName header")]
	MissingSymbolicName,
	#[error("invalid clause: {0}")]
	Clause(#[from] ClauseError),
	#[error("invalid version: {0}")]
	Version(#[from] VersionError),
	#[error("invalid filter: {0}")]
	Filter(#[from] FilterError),
}

pub fn identity_capability(name: &str, kind: &str, version: Version) -> Capability {
	let mut attributes = Attributes::default();
	attributes.insert(Namespace::Identity.as_str(), name);
	attributes.insert(TYPE_ATTRIBUTE, kind);
	attributes.insert(VERSION_ATTRIBUTE, version);
	Capability::new(Namespace::Identity, attributes, BTreeMap::new())
}

fn resolution(mandatory: bool) -> BTreeMap<String, String> {
	let mut directives = BTreeMap::new();
	if !mandatory {
		directives.insert(RESOLUTION_DIRECTIVE.to_string(), RESOLUTION_OPTIONAL.to_string());
	}
	directives
}

/// Requirement on any resource with the given identity name and type within `range`.
pub fn identity_requirement(name: &str, kind: &str, range: Option<&VersionRange>, mandatory: bool) -> Requirement {
	let mut attributes = Attributes::default();
	attributes.insert(Namespace::Identity.as_str(), name);
	attributes.insert(TYPE_ATTRIBUTE, kind);

	let mut filters = vec![Filter::equal(Namespace::Identity.as_str(), name), Filter::equal(TYPE_ATTRIBUTE, kind)];
	if let Some(range) = range {
		attributes.insert(VERSION_ATTRIBUTE, range.to_string());
		filters.push(range.filter(VERSION_ATTRIBUTE));
	}

	Requirement::new(Namespace::Identity, attributes, resolution(mandatory), Filter::and(filters))
}

/// Identity requirement on exactly this resource, `None` when it has no identity.
pub fn requirement_on(resource: &Resource, mandatory: bool) -> Option<Requirement> {
	let name = resource.symbolic_name()?;
	let kind = resource.resource_type()?;
	Some(identity_requirement(name, kind, Some(&VersionRange::exact(resource.version())), mandatory))
}

fn attributes_of(clause: &Clause, skip: &[&str]) -> Result<Attributes, ManifestError> {
	clause.attributes.iter()
		.filter(|a| !skip.contains(&a.name.as_str()))
		.map(|a| -> Result<_, ManifestError> { Ok((a.name.clone(), a.typed_value()?)) })
		.collect()
}

/// Parses `Provide-Capability` style clauses, the path of each clause is its namespace.
pub fn parse_capabilities(text: &str) -> Result<Vec<Capability>, ManifestError> {
	let mut capabilities = Vec::new();
	for clause in clause::parse_header(text)? {
		let attributes = attributes_of(&clause, &[])?;
		for namespace in &clause.paths {
			capabilities.push(Capability::new(Namespace::from(namespace.as_str()), attributes.clone(), clause.directives.clone()));
		}
	}
	Ok(capabilities)
}

/// Parses `Require-Capability` style clauses, a missing `filter` directive matches anything.
pub fn parse_requirements(text: &str) -> Result<Vec<Requirement>, ManifestError> {
	let mut requirements = Vec::new();
	for mut clause in clause::parse_header(text)? {
		let filter = match clause.directives.remove(FILTER_DIRECTIVE) {
			Some(f) => Filter::parse(&f)?,
			None => Filter::MatchAll,
		};
		let attributes = attributes_of(&clause, &[])?;
		for namespace in &clause.paths {
			requirements.push(Requirement::new(Namespace::from(namespace.as_str()), attributes.clone(), clause.directives.clone(), filter.clone()));
		}
	}
	Ok(requirements)
}

/// Package names in imports may end with a wildcard.
fn name_filter(attribute: &str, name: &str) -> Filter {
	if name.contains('*') {
		Filter::Substring { attribute: attribute.to_string(), pieces: name.split('*').map(String::from).collect() }
	} else {
		Filter::equal(attribute, name)
	}
}

fn range_filter(clause: &Clause, attribute: &str, target: &str) -> Result<Option<Filter>, ManifestError> {
	Ok(match clause.attribute(attribute) {
		Some(range) => Some(VersionRange::parse(range)?.filter(target)),
		None => None,
	})
}

fn wiring_requirement(namespace: Namespace, filter: Filter, clause: &Clause, resolution_override: Option<&str>) -> Requirement {
	let mut directives = clause.directives.clone();
	if let Some(r) = resolution_override {
		directives.insert(RESOLUTION_DIRECTIVE.to_string(), r.to_string());
	}
	Requirement::new(namespace, Attributes::default(), directives, filter)
}

/// Builds a bundle resource from its manifest headers.
pub fn build_resource(origin: ResourceOrigin, headers: &Headers) -> Result<Resource, ManifestError> {
	let bsn_clause = headers.get("Bundle-SymbolicName")
		.map(|h| clause::parse_header(h))
		.transpose()?
		.and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
		.ok_or(ManifestError::MissingSymbolicName)?;
	let name = bsn_clause.paths[0].clone();
	let version = headers.get("Bundle-Version").map(|v| Version::parse(v)).transpose()?.unwrap_or_default();
	let fragment_host = headers.get("Fragment-Host");

	let mut resource = Resource::new(origin);
	resource.add_capability(identity_capability(&name, if fragment_host.is_some() { TYPE_FRAGMENT } else { TYPE_BUNDLE }, version.clone()));

	match fragment_host {
		None => {
			for namespace in [Namespace::Bundle, Namespace::Host] {
				let mut attributes = Attributes::default();
				attributes.insert(namespace.as_str(), name.as_str());
				attributes.insert(BUNDLE_VERSION_ATTRIBUTE, version.clone());
				resource.add_capability(Capability::new(namespace, attributes, bsn_clause.directives.clone()));
			}
		},
		Some(host) => {
			for clause in clause::parse_header(host)? {
				let mut filters = vec![Filter::equal(Namespace::Host.as_str(), clause.paths[0].as_str())];
				filters.extend(range_filter(&clause, BUNDLE_VERSION_ATTRIBUTE, BUNDLE_VERSION_ATTRIBUTE)?);
				resource.add_requirement(wiring_requirement(Namespace::Host, Filter::and(filters), &clause, None));
			}
		},
	}

	if let Some(exports) = headers.get("Export-Package") {
		for clause in clause::parse_header(exports)? {
			let mut attributes = attributes_of(&clause, &[VERSION_ATTRIBUTE, "specification-version"])?;
			let package_version = clause.attribute(VERSION_ATTRIBUTE)
				.or_else(|| clause.attribute("specification-version"))
				.map(Version::parse)
				.transpose()?
				.unwrap_or_default();
			attributes.insert(VERSION_ATTRIBUTE, package_version);
			attributes.insert(BUNDLE_SYMBOLIC_NAME_ATTRIBUTE, name.as_str());
			attributes.insert(BUNDLE_VERSION_ATTRIBUTE, version.clone());
			for package in &clause.paths {
				let mut attributes = attributes.clone();
				attributes.insert(Namespace::Package.as_str(), package.as_str());
				resource.add_capability(Capability::new(Namespace::Package, attributes, clause.directives.clone()));
			}
		}
	}

	for (header, resolution_override) in [("Import-Package", None), ("DynamicImport-Package", Some(RESOLUTION_DYNAMIC))] {
		let Some(imports) = headers.get(header) else { continue };
		for clause in clause::parse_header(imports)? {
			for package in &clause.paths {
				let mut filters = vec![name_filter(Namespace::Package.as_str(), package)];
				filters.extend(range_filter(&clause, VERSION_ATTRIBUTE, VERSION_ATTRIBUTE)?);
				if let Some(bsn) = clause.attribute(BUNDLE_SYMBOLIC_NAME_ATTRIBUTE) {
					filters.push(Filter::equal(BUNDLE_SYMBOLIC_NAME_ATTRIBUTE, bsn));
				}
				filters.extend(range_filter(&clause, BUNDLE_VERSION_ATTRIBUTE, BUNDLE_VERSION_ATTRIBUTE)?);
				resource.add_requirement(wiring_requirement(Namespace::Package, Filter::and(filters), &clause, resolution_override));
			}
		}
	}

	if let Some(required) = headers.get("Require-Bundle") {
		for clause in clause::parse_header(required)? {
			for bundle in &clause.paths {
				let mut filters = vec![Filter::equal(Namespace::Bundle.as_str(), bundle.as_str())];
				filters.extend(range_filter(&clause, BUNDLE_VERSION_ATTRIBUTE, BUNDLE_VERSION_ATTRIBUTE)?);
				resource.add_requirement(wiring_requirement(Namespace::Bundle, Filter::and(filters), &clause, None));
			}
		}
	}

	if let Some(provided) = headers.get("Provide-Capability") {
		for capability in parse_capabilities(provided)? {
			resource.add_capability(capability);
		}
	}

	if let Some(required) = headers.get("Require-Capability") {
		for requirement in parse_requirements(required)? {
			resource.add_requirement(requirement);
		}
	}

	Ok(resource)
}
