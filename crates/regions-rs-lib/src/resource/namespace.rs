use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Namespace {
	/// `osgi.identity`
	Identity,
	/// `osgi.wiring.bundle`
	Bundle,
	/// `osgi.wiring.host`
	Host,
	/// `osgi.wiring.package`
	Package,
	Other(String),
}

impl Namespace {
	pub fn as_str(&self) -> &str {
		match self {
			Namespace::Identity => "osgi.identity",
			Namespace::Bundle => "osgi.wiring.bundle",
			Namespace::Host => "osgi.wiring.host",
			Namespace::Package => "osgi.wiring.package",
			Namespace::Other(s) => s,
		}
	}
}

impl From<&str> for Namespace {
	fn from(value: &str) -> Self {
		match value {
			"osgi.identity" => Namespace::Identity,
			"osgi.wiring.bundle" => Namespace::Bundle,
			"osgi.wiring.host" => Namespace::Host,
			"osgi.wiring.package" => Namespace::Package,
			other => Namespace::Other(other.to_string()),
		}
	}
}

impl From<String> for Namespace {
	fn from(value: String) -> Self { Namespace::from(value.as_str()) }
}

impl From<Namespace> for String {
	fn from(value: Namespace) -> Self { value.as_str().to_string() }
}

impl std::fmt::Display for Namespace {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}
