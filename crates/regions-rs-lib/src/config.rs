use serde::{Serialize, Deserialize};

/// Default mask used to widen bare feature dependency versions, exact match.
pub const DEFAULT_FEATURE_RESOLUTION_RANGE: &str = "${range;[====,====]}";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	data_dir: std::path::PathBuf,
	feature_resolution_range: String,
	https_only: bool,
	digraph_snapshot: Option<std::path::PathBuf>,
	resolution_dump: Option<std::path::PathBuf>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			data_dir: {
				#[cfg(target_os = "windows")]
				let path = std::env::var("APPDATA").map(std::path::PathBuf::from).unwrap_or_default();

				#[cfg(not(target_os = "windows"))]
				let path = if let Ok(e) = std::env::var("XDG_DATA_HOME") {
					std::path::PathBuf::from(e)
				} else {
					std::env::var("HOME").map(|h| std::path::PathBuf::from(h).join(".local/share")).unwrap_or_default()
				};

				path.join("regions-rs")
			},
			feature_resolution_range: DEFAULT_FEATURE_RESOLUTION_RANGE.to_string(),
			https_only: false,
			digraph_snapshot: None,
			resolution_dump: None,
		}
	}
}

impl Config {
	/// Reads `config.json` from the default data directory.
	pub fn load_from_disk() -> crate::Result<Self> {
		Self::load_from_path(Config::default().data_dir.join("config.json"))
	}

	pub fn load_from_path(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path)?;
		Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
	}

	pub fn save_to_disk(&self) -> crate::Result<()> {
		std::fs::create_dir_all(&self.data_dir)?;
		let file = std::fs::File::create(self.data_dir.join("config.json"))?;
		serde_json::to_writer_pretty(file, self)?;
		Ok(())
	}

	pub fn data_dir(&self) -> &std::path::PathBuf {
		&self.data_dir
	}
	/// returns if the directory is valid or not.
	pub fn set_data_dir(&mut self, data_dir: std::path::PathBuf) -> bool {
		if data_dir.is_dir() {
			self.data_dir = data_dir;
			true
		} else {
			false
		}
	}

	pub fn feature_resolution_range(&self) -> &str {
		&self.feature_resolution_range
	}
	pub fn set_feature_resolution_range(&mut self, range: impl Into<String>) {
		self.feature_resolution_range = range.into();
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	/// Where the region digraph is written after each resolve, if anywhere.
	pub fn digraph_snapshot(&self) -> Option<&std::path::PathBuf> {
		self.digraph_snapshot.as_ref()
	}
	pub fn set_digraph_snapshot(&mut self, path: Option<std::path::PathBuf>) {
		self.digraph_snapshot = path;
	}

	/// Where the resolver input and outcome are dumped as JSON, if anywhere.
	pub fn resolution_dump(&self) -> Option<&std::path::PathBuf> {
		self.resolution_dump.as_ref()
	}
	pub fn set_resolution_dump(&mut self, path: Option<std::path::PathBuf>) {
		self.resolution_dump = path;
	}
}
