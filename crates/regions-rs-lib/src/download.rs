//! Retrieving bundle manifests.
//!
//! Subsystems hand a whole batch of locations to a [`DownloadManager`] and wait for all of them.
//! Any single failure fails the batch.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

pub use crate::resource::builder::Headers;

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("zip error: {0}")]
	Zip(#[from] zip::result::ZipError),
	#[error("download task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
	#[error("{0} not found")]
	NotFound(String),
	#[error("{0} has no manifest")]
	MissingManifest(String),
}

pub trait DownloadManager: Sync {
	/// Fetches the manifest headers of every location, keyed by location.
	fn download_headers(&self, locations: &[String]) -> Result<BTreeMap<String, Headers>, DownloadError>;
}

/// Reads `Key: Value` manifest lines, lines starting with a space continue the previous value.
pub fn parse_manifest(text: &str) -> Headers {
	let mut headers = Headers::new();
	let mut current: Option<(String, String)> = None;
	for line in text.lines() {
		if let Some(continuation) = line.strip_prefix(' ') {
			if let Some((_, value)) = current.as_mut() {
				value.push_str(continuation);
			}
			continue;
		}
		if let Some((key, value)) = current.take() {
			headers.insert(key, value);
		}
		if let Some((key, value)) = line.split_once(':') {
			current = Some((key.trim().to_string(), value.strip_prefix(' ').unwrap_or(value).to_string()));
		}
	}
	if let Some((key, value)) = current {
		headers.insert(key, value);
	}
	headers
}

/// Extracts the manifest headers from a bundle archive.
pub fn manifest_headers(location: &str, archive: &[u8]) -> Result<Headers, DownloadError> {
	let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive))?;
	let mut text = String::new();
	match zip.by_name(MANIFEST_PATH) {
		Ok(mut file) => { file.read_to_string(&mut text)?; },
		Err(zip::result::ZipError::FileNotFound) => return Err(DownloadError::MissingManifest(location.to_string())),
		Err(e) => return Err(e.into()),
	}
	Ok(parse_manifest(&text))
}

fn local_path(location: &str) -> &str {
	location.strip_prefix("file://")
		.or_else(|| location.strip_prefix("file:"))
		.unwrap_or(location)
}

async fn fetch_headers(client: &reqwest::Client, location: &str) -> Result<Headers, DownloadError> {
	if location.starts_with("http://") || location.starts_with("https://") {
		log::debug!("Downloading {}", location);
		let response = client.get(location).send().await?.error_for_status()?;
		let archive = response.bytes().await?;
		return manifest_headers(location, &archive);
	}

	let path = std::path::Path::new(local_path(location));
	if path.is_dir() {
		/* Exploded bundle */
		let text = tokio::fs::read_to_string(path.join(MANIFEST_PATH)).await?;
		return Ok(parse_manifest(&text));
	}
	match tokio::fs::read(path).await {
		Ok(archive) => manifest_headers(location, &archive),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DownloadError::NotFound(location.to_string())),
		Err(e) => Err(e.into()),
	}
}

/// Downloads concurrently on its own runtime, must not be called from inside another tokio runtime.
pub struct TokioDownloadManager {
	runtime: tokio::runtime::Runtime,
	client: reqwest::Client,
}

impl TokioDownloadManager {
	pub fn new(config: &crate::Config) -> Result<Self, DownloadError> {
		let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
		let client = reqwest::Client::builder()
			.https_only(config.https_only())
			.build()?;
		Ok(Self { runtime, client })
	}
}

impl DownloadManager for TokioDownloadManager {
	fn download_headers(&self, locations: &[String]) -> Result<BTreeMap<String, Headers>, DownloadError> {
		let unique: BTreeSet<String> = locations.iter().cloned().collect();
		log::info!("Fetching {} manifests", unique.len());

		self.runtime.block_on(async {
			let mut set = tokio::task::JoinSet::new();
			for location in unique {
				let client = self.client.clone();
				set.spawn(async move {
					let headers = fetch_headers(&client, &location).await;
					(location, headers)
				});
			}

			let mut downloaded = BTreeMap::new();
			while let Some(joined) = set.join_next().await {
				let (location, headers) = joined?;
				match headers {
					Ok(h) => { downloaded.insert(location, h); },
					Err(e) => {
						log::error!("Failed to fetch {}: {}", location, e);
						return Err(e);
					},
				}
			}
			Ok(downloaded)
		})
	}
}

/// Serves headers registered up front, for offline use and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDownloadManager {
	headers: BTreeMap<String, Headers>,
}

impl StaticDownloadManager {
	pub fn new() -> Self { Self::default() }

	pub fn insert(&mut self, location: impl Into<String>, headers: Headers) {
		self.headers.insert(location.into(), headers);
	}

	pub fn with(mut self, location: impl Into<String>, headers: Headers) -> Self {
		self.insert(location, headers);
		self
	}
}

impl DownloadManager for StaticDownloadManager {
	fn download_headers(&self, locations: &[String]) -> Result<BTreeMap<String, Headers>, DownloadError> {
		locations.iter()
			.map(|l| match self.headers.get(l) {
				Some(h) => Ok((l.clone(), h.clone())),
				None => Err(DownloadError::NotFound(l.clone())),
			})
			.collect()
	}
}
