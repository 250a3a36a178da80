//! OSGi style versions and version ranges.
//!
//! A [`Version`] is `major.minor.micro.qualifier` where missing numeric parts are zero.
//! A [`VersionRange`] is either an interval such as `[1.0,2.0)` or a bare version meaning "at least".

use serde::{Serialize, Deserialize};

use crate::filter::{Filter, Operator};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
	#[error("invalid version \"{0}\"")]
	InvalidVersion(String),
	#[error("invalid version range \"{0}\"")]
	InvalidRange(String),
	#[error("invalid range macro \"{0}\"")]
	InvalidMacro(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Version {
	major: u64,
	minor: u64,
	micro: u64,
	qualifier: String,
}

impl Version {
	pub fn new(major: u64, minor: u64, micro: u64) -> Self {
		Self { major, minor, micro, qualifier: String::new() }
	}

	pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
		self.qualifier = qualifier.into();
		self
	}

	pub fn major(&self) -> u64 { self.major }
	pub fn minor(&self) -> u64 { self.minor }
	pub fn micro(&self) -> u64 { self.micro }
	pub fn qualifier(&self) -> &str { &self.qualifier }

	/// Strict parse, an empty string is `0.0.0`.
	pub fn parse(s: &str) -> Result<Self, VersionError> {
		let s = s.trim();
		if s.is_empty() {
			return Ok(Version::default());
		}

		let invalid = || VersionError::InvalidVersion(s.to_string());
		let mut parts = s.splitn(4, '.');
		let mut numbers = [0u64; 3];
		for n in numbers.iter_mut() {
			match parts.next() {
				Some(p) => *n = p.parse::<u64>().map_err(|_| invalid())?,
				None => break,
			}
		}
		let qualifier = parts.next().unwrap_or_default();
		if !qualifier.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
			return Err(invalid());
		}

		Ok(Version {
			major: numbers[0],
			minor: numbers[1],
			micro: numbers[2],
			qualifier: qualifier.to_string(),
		})
	}

	/// Best effort parse for versions written by hand, `1.0-SNAPSHOT` becomes `1.0.0.SNAPSHOT`.
	/// Never fails, anything unparseable ends up in the qualifier.
	pub fn lenient(s: &str) -> Self {
		if let Ok(v) = Version::parse(s) {
			return v;
		}

		let s = s.trim();
		let mut numbers = [0u64; 3];
		let mut rest = s;
		for n in numbers.iter_mut() {
			let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
			if digits == 0 {
				break;
			}
			*n = rest[..digits].parse().unwrap_or(0);
			rest = &rest[digits..];
			match rest.strip_prefix('.') {
				Some(r) if r.starts_with(|c: char| c.is_ascii_digit()) => rest = r,
				_ => break,
			}
		}

		let qualifier: String = rest.trim_start_matches(|c| matches!(c, '.' | '-' | '_'))
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
			.collect();

		Version { major: numbers[0], minor: numbers[1], micro: numbers[2], qualifier }
	}

	/// The first version of the next minor line, used as the default ceiling for overrides.
	pub fn next_minor(&self) -> Self {
		Version::new(self.major, self.minor + 1, 0)
	}
}

impl std::fmt::Display for Version {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
		if !self.qualifier.is_empty() {
			write!(f, ".{}", self.qualifier)?;
		}
		Ok(())
	}
}

impl std::str::FromStr for Version {
	type Err = VersionError;
	fn from_str(s: &str) -> Result<Self, Self::Err> { Version::parse(s) }
}

impl TryFrom<String> for Version {
	type Error = VersionError;
	fn try_from(value: String) -> Result<Self, Self::Error> { Version::parse(&value) }
}

impl From<Version> for String {
	fn from(value: Version) -> Self { value.to_string() }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct VersionRange {
	floor: Version,
	floor_inclusive: bool,
	ceiling: Option<Version>,
	ceiling_inclusive: bool,
}

impl Default for VersionRange {
	fn default() -> Self { VersionRange::at_least(Version::default()) }
}

impl VersionRange {
	pub fn at_least(floor: Version) -> Self {
		Self { floor, floor_inclusive: true, ceiling: None, ceiling_inclusive: false }
	}

	pub fn exact(version: Version) -> Self {
		Self { floor: version.clone(), floor_inclusive: true, ceiling: Some(version), ceiling_inclusive: true }
	}

	pub fn new(floor: Version, floor_inclusive: bool, ceiling: Version, ceiling_inclusive: bool) -> Self {
		Self { floor, floor_inclusive, ceiling: Some(ceiling), ceiling_inclusive }
	}

	pub fn floor(&self) -> &Version { &self.floor }
	pub fn ceiling(&self) -> Option<&Version> { self.ceiling.as_ref() }

	pub fn is_exact(&self) -> bool {
		self.floor_inclusive && self.ceiling_inclusive && self.ceiling.as_ref() == Some(&self.floor)
	}

	pub fn parse(s: &str) -> Result<Self, VersionError> {
		let s = s.trim();
		let invalid = || VersionError::InvalidRange(s.to_string());

		let floor_inclusive = match s.chars().next() {
			Some('[') => true,
			Some('(') => false,
			_ => return Ok(VersionRange::at_least(Version::parse(s).map_err(|_| invalid())?)),
		};
		let ceiling_inclusive = match s.chars().last() {
			Some(']') => true,
			Some(')') => false,
			_ => return Err(invalid()),
		};
		if s.len() < 2 {
			return Err(invalid());
		}

		let (floor, ceiling) = s[1..s.len() - 1].split_once(',').ok_or_else(invalid)?;
		let floor = Version::parse(floor).map_err(|_| invalid())?;
		let ceiling = Version::parse(ceiling).map_err(|_| invalid())?;
		if ceiling < floor {
			return Err(invalid());
		}

		Ok(VersionRange { floor, floor_inclusive, ceiling: Some(ceiling), ceiling_inclusive })
	}

	pub fn contains(&self, version: &Version) -> bool {
		let above_floor = if self.floor_inclusive { version >= &self.floor } else { version > &self.floor };
		let below_ceiling = match &self.ceiling {
			None => true,
			Some(c) if self.ceiling_inclusive => version <= c,
			Some(c) => version < c,
		};
		above_floor && below_ceiling
	}

	/// Filter constraining `attribute` to this range.
	pub fn filter(&self, attribute: &str) -> Filter {
		let compare = |operator, version: &Version| Filter::Compare {
			attribute: attribute.to_string(),
			operator,
			value: version.to_string(),
		};

		if self.is_exact() {
			return compare(Operator::Equal, &self.floor);
		}

		let floor = if self.floor_inclusive {
			compare(Operator::GreaterEqual, &self.floor)
		} else {
			Filter::Not(Box::new(compare(Operator::LessEqual, &self.floor)))
		};
		match &self.ceiling {
			None => floor,
			Some(c) if self.ceiling_inclusive => Filter::And(vec![floor, compare(Operator::LessEqual, c)]),
			Some(c) => Filter::And(vec![floor, Filter::Not(Box::new(compare(Operator::GreaterEqual, c)))]),
		}
	}

	pub fn to_filter(&self, attribute: &str) -> String {
		self.filter(attribute).to_string()
	}

	/// Expands a range macro such as `${range;[==,=+)}` around `version`.
	///
	/// Each mask character applies to one version segment: `=` keeps it, `+` increments it,
	/// `-` decrements it and `~` drops it along with everything after.
	/// Anything that isn't a macro is parsed as a plain range.
	pub fn from_macro(mask: &str, version: &Version) -> Result<Self, VersionError> {
		let mask = mask.trim();
		if !mask.starts_with("${") {
			return VersionRange::parse(mask);
		}

		let re = regex::Regex::new(r"^\$\{range;([\[\(])([=+~-]{0,4}),([=+~-]{0,4})([\]\)])\}$")
			.map_err(|_| VersionError::InvalidMacro(mask.to_string()))?;
		let captures = re.captures(mask).ok_or_else(|| VersionError::InvalidMacro(mask.to_string()))?;

		let floor = apply_mask(&captures[2], version);
		let ceiling = apply_mask(&captures[3], version);
		if ceiling < floor {
			return Err(VersionError::InvalidMacro(mask.to_string()));
		}

		Ok(VersionRange {
			floor,
			floor_inclusive: &captures[1] == "[",
			ceiling: Some(ceiling),
			ceiling_inclusive: &captures[4] == "]",
		})
	}
}

fn apply_mask(mask: &str, version: &Version) -> Version {
	let source = [version.major, version.minor, version.micro];
	let mut numbers = [0u64; 3];
	let mut qualifier = String::new();

	for (i, c) in mask.chars().enumerate() {
		if c == '~' {
			break;
		}
		if i < 3 {
			numbers[i] = match c {
				'+' => source[i] + 1,
				'-' => source[i].saturating_sub(1),
				_ => source[i],
			};
		} else if c == '=' {
			qualifier = version.qualifier.clone();
		}
	}

	Version { major: numbers[0], minor: numbers[1], micro: numbers[2], qualifier }
}

impl std::fmt::Display for VersionRange {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.ceiling {
			None => write!(f, "{}", self.floor),
			Some(c) => write!(f, "{}{},{}{}",
				if self.floor_inclusive { '[' } else { '(' },
				self.floor,
				c,
				if self.ceiling_inclusive { ']' } else { ')' },
			),
		}
	}
}

impl std::str::FromStr for VersionRange {
	type Err = VersionError;
	fn from_str(s: &str) -> Result<Self, Self::Err> { VersionRange::parse(s) }
}

impl TryFrom<String> for VersionRange {
	type Error = VersionError;
	fn try_from(value: String) -> Result<Self, Self::Error> { VersionRange::parse(&value) }
}

impl From<VersionRange> for String {
	fn from(value: VersionRange) -> Self { value.to_string() }
}
