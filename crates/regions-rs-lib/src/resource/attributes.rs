use std::collections::BTreeMap;

use crate::version::Version;

/// Typed attribute value, filters coerce their operand to this type before comparing.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
	String(String),
	Version(Version),
	Long(i64),
	Double(f64),
	List(Vec<AttributeValue>),
}

impl AttributeValue {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			AttributeValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_version(&self) -> Option<Version> {
		match self {
			AttributeValue::Version(v) => Some(v.clone()),
			AttributeValue::String(s) => Some(Version::lenient(s)),
			_ => None,
		}
	}

	/// Every string held by this value, a single string yields itself.
	pub fn strings(&self) -> Vec<&str> {
		match self {
			AttributeValue::String(s) => vec![s.as_str()],
			AttributeValue::List(items) => items.iter().flat_map(AttributeValue::strings).collect(),
			_ => vec![],
		}
	}

	/// Type suffix used when writing the value in a clause, `None` for plain strings.
	pub fn type_name(&self) -> Option<String> {
		match self {
			AttributeValue::String(_) => None,
			AttributeValue::Version(_) => Some("Version".into()),
			AttributeValue::Long(_) => Some("Long".into()),
			AttributeValue::Double(_) => Some("Double".into()),
			AttributeValue::List(items) => {
				let inner = items.first().and_then(AttributeValue::type_name).unwrap_or_else(|| "String".into());
				Some(format!("List<{}>", inner))
			},
		}
	}
}

impl std::fmt::Display for AttributeValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AttributeValue::String(s) => write!(f, "{}", s),
			AttributeValue::Version(v) => write!(f, "{}", v),
			AttributeValue::Long(n) => write!(f, "{}", n),
			AttributeValue::Double(n) => write!(f, "{}", n),
			AttributeValue::List(items) => {
				let items: Vec<String> = items.iter().map(ToString::to_string).collect();
				write!(f, "{}", items.join(","))
			},
		}
	}
}

impl From<&str> for AttributeValue {
	fn from(value: &str) -> Self { AttributeValue::String(value.to_string()) }
}

impl From<String> for AttributeValue {
	fn from(value: String) -> Self { AttributeValue::String(value) }
}

impl From<Version> for AttributeValue {
	fn from(value: Version) -> Self { AttributeValue::Version(value) }
}

impl From<i64> for AttributeValue {
	fn from(value: i64) -> Self { AttributeValue::Long(value) }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
	pub fn get(&self, key: &str) -> Option<&AttributeValue> {
		self.0.get(key)
	}

	/// Attribute keys are matched case insensitively by filters.
	pub fn get_ignore_case(&self, key: &str) -> Option<&AttributeValue> {
		self.0.get(key).or_else(|| {
			self.0.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v)
		})
	}

	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
		self.0.insert(key.into(), value.into());
	}

	pub fn string(&self, key: &str) -> Option<&str> {
		self.get(key).and_then(AttributeValue::as_str)
	}

	pub fn version(&self, key: &str) -> Option<Version> {
		self.get(key).and_then(AttributeValue::as_version)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
		self.0.iter()
	}

	pub fn len(&self) -> usize { self.0.len() }
	pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl FromIterator<(String, AttributeValue)> for Attributes {
	fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
		Attributes(iter.into_iter().collect())
	}
}
