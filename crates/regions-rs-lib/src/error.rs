//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("parsing error: {0}")]
	Parse(String),
	#[error("invalid filter: {0}")]
	Filter(#[from] crate::filter::FilterError),
	#[error("invalid version: {0}")]
	Version(#[from] crate::version::VersionError),
	#[error("configuration error: {0}")]
	Configuration(String),
	#[error("unable to build resource from {uri}: {source}")]
	Resource {
		uri: String,
		source: crate::resource::builder::ManifestError,
	},
	#[error("downloader failed: {0}")]
	Download(#[from] crate::download::DownloadError),
	#[error("resolution failed: {0}")]
	Resolution(#[from] crate::resolver::ResolutionError),
	#[error("internal state error: {0}")]
	InternalState(String),
	#[error("already exists: {0}")]
	AlreadyExists(String),
}
