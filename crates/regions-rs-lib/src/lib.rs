pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;

pub mod version;
pub mod filter;
pub mod resource;
pub mod feature;
pub mod download;
pub mod repository;

pub mod region_digraph;
pub use region_digraph::RegionDigraph;

pub mod resolver;
pub mod subsystem_resolver;
pub mod batch;
