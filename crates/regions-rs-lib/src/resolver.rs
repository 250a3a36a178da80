//! Contract between a resolution algorithm and whoever supplies candidates to it.
//!
//! A [`Resolver`] walks requirements starting from [`ResolveContext::mandatory_resources`] and asks the context
//! for providers. It returns a [`Wiring`] or fails as a whole, never partially.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::resource::{CapabilityRef, RequirementRef, ResourceId, ResourceStore};

mod simple_resolver;
pub use simple_resolver::SimpleResolver;

/// A requirement satisfied by a capability.
///
/// `provider` is usually the capability's resource, for hosted capabilities it is the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Wire {
	pub requirement: RequirementRef,
	pub capability: CapabilityRef,
	pub requirer: ResourceId,
	pub provider: ResourceId,
}

/// Every resolved resource with the wires of its requirements.
pub type Wiring = BTreeMap<ResourceId, Vec<Wire>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
	#[error("unable to resolve {resource}: missing requirement {requirement}")]
	Unsatisfied { resource: String, requirement: String },
	/// The same bundle was offered twice from one region, the candidate set is corrupt.
	#[error("resource {resource} is duplicated in region {region}")]
	DuplicateResource { resource: String, region: String },
}

pub trait ResolveContext: Sync {
	fn resources(&self) -> &ResourceStore;

	fn mandatory_resources(&self) -> Vec<ResourceId>;

	fn optional_resources(&self) -> Vec<ResourceId> {
		Vec::new()
	}

	/// Capabilities able to satisfy `requirement`, best candidate first.
	fn find_providers(&self, requirement: RequirementRef) -> Result<Vec<CapabilityRef>, ResolutionError>;

	/// Inserts a capability hosted on another resource at its sorted position and returns the position.
	fn insert_hosted_capability(&self, capabilities: &mut Vec<CapabilityRef>, hosted: CapabilityRef) -> usize;

	/// Requirements that are not effective are ignored by the resolver.
	fn is_effective(&self, requirement: RequirementRef) -> bool;

	/// Resources resolved before this resolution started.
	fn wirings(&self) -> Wiring {
		Wiring::new()
	}
}

pub trait Resolver {
	fn resolve(&self, context: &dyn ResolveContext) -> Result<Wiring, ResolutionError>;
}
