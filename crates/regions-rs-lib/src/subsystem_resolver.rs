//! Resolving features into isolated regions.
//!
//! # Usage
//! 1. Create a [`SubsystemResolverBuilder`]
//! 1. Add feature repositories, region requirements, system resources and overrides to the builder.
//! Optionally a global repository, the system bundle's environment capabilities and a resolution dump path.
//! 1. [`SubsystemResolverBuilder::build()`] to get a [`SubsystemResolverProcessor`] holding the subsystem tree.
//! 1. [`SubsystemResolverProcessor::resolve()`] with a [`crate::resolver::Resolver`] and a [`crate::download::DownloadManager`]
//! to get [`ResolvedSubsystems`].
//! 1. Query [`ResolvedSubsystems::bundles_per_region()`] and friends for what to install where.
//!
//! Region paths such as `root/app` become a tree of subsystems. Every required feature becomes a subsystem of its own
//! below the subsystem requiring it, unscoped features are "flat" and end up installed into their parent's region.

mod candidate_comparator;
pub use candidate_comparator::CandidateComparator;
pub use candidate_comparator::compare_names;
pub mod subsystem;
pub use subsystem::Subsystem;
pub use subsystem::SubsystemId;
pub use subsystem::SubsystemTree;
pub use subsystem::DependencyInfo;
mod resolve_context;
pub use resolve_context::SubsystemResolveContext;
mod resolver_builder;
pub use resolver_builder::SubsystemResolverBuilder;
pub use resolver_builder::SubsystemResolverProcessor;
mod resolved;
pub use resolved::ResolvedSubsystems;
