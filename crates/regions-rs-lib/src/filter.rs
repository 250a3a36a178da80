//! LDAP style filters, `(&(osgi.wiring.package=org.foo)(version>=1.0.0))`.
//!
//! Only the operators requirement and sharing policy filters use are supported:
//! `& | ! = <= >= ~=`, presence (`attr=*`) and substrings (`attr=a*b`).
//! Values are coerced to the type of the attribute they are compared against.

use crate::resource::{Attributes, AttributeValue};
use crate::version::Version;

/// Matches everything whether or not the `all` attribute exists.
pub const ALL_FILTER: &str = "(|(!(all=*))(all=*))";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {position} in \"{filter}\"")]
pub struct FilterError {
	pub filter: String,
	pub position: usize,
	pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
	Equal,
	Approx,
	GreaterEqual,
	LessEqual,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter {
	#[default] MatchAll,
	And(Vec<Filter>),
	Or(Vec<Filter>),
	Not(Box<Filter>),
	Compare { attribute: String, operator: Operator, value: String },
	Present(String),
	/// Pieces between wildcards, an empty first or last piece means the value is unanchored on that side.
	Substring { attribute: String, pieces: Vec<String> },
}

impl Filter {
	pub fn parse(filter: &str) -> Result<Self, FilterError> {
		let mut parser = Parser { source: filter, chars: filter.chars().collect(), pos: 0 };
		parser.skip_whitespace();
		let parsed = parser.filter()?;
		parser.skip_whitespace();
		if parser.pos != parser.chars.len() {
			return Err(parser.error("trailing characters"));
		}
		Ok(parsed)
	}

	/// Shorthand for an equality comparison.
	pub fn equal(attribute: impl Into<String>, value: impl Into<String>) -> Self {
		Filter::Compare { attribute: attribute.into(), operator: Operator::Equal, value: value.into() }
	}

	/// Conjunction that collapses to the single operand when there is only one.
	pub fn and(mut filters: Vec<Filter>) -> Self {
		filters.retain(|f| *f != Filter::MatchAll);
		match filters.len() {
			0 => Filter::MatchAll,
			1 => filters.remove(0),
			_ => Filter::And(filters),
		}
	}

	pub fn matches(&self, attributes: &Attributes) -> bool {
		match self {
			Filter::MatchAll => true,
			Filter::And(filters) => filters.iter().all(|f| f.matches(attributes)),
			Filter::Or(filters) => filters.iter().any(|f| f.matches(attributes)),
			Filter::Not(filter) => !filter.matches(attributes),
			Filter::Present(attribute) => attributes.get_ignore_case(attribute).is_some(),
			Filter::Compare { attribute, operator, value } => match attributes.get_ignore_case(attribute) {
				Some(lhs) => compare(lhs, *operator, value),
				None => false,
			},
			Filter::Substring { attribute, pieces } => match attributes.get_ignore_case(attribute) {
				Some(lhs) => substring(lhs, pieces),
				None => false,
			},
		}
	}

	/// Whether this filter constrains `attribute` in a conjunctive position.
	pub fn mentions(&self, attribute: &str) -> bool {
		match self {
			Filter::Compare { attribute: a, .. } | Filter::Present(a) | Filter::Substring { attribute: a, .. } => a.eq_ignore_ascii_case(attribute),
			Filter::And(filters) => filters.iter().any(|f| f.mentions(attribute)),
			_ => false,
		}
	}
}

fn compare(lhs: &AttributeValue, operator: Operator, rhs: &str) -> bool {
	match lhs {
		AttributeValue::String(s) => match operator {
			Operator::Equal => s == rhs,
			Operator::Approx => normalize(s) == normalize(rhs),
			Operator::GreaterEqual => s.as_str() >= rhs,
			Operator::LessEqual => s.as_str() <= rhs,
		},
		AttributeValue::Version(v) => match Version::parse(rhs) {
			Ok(r) => match operator {
				Operator::Equal | Operator::Approx => *v == r,
				Operator::GreaterEqual => *v >= r,
				Operator::LessEqual => *v <= r,
			},
			Err(_) => false,
		},
		AttributeValue::Long(n) => match rhs.trim().parse::<i64>() {
			Ok(r) => match operator {
				Operator::Equal | Operator::Approx => *n == r,
				Operator::GreaterEqual => *n >= r,
				Operator::LessEqual => *n <= r,
			},
			Err(_) => false,
		},
		AttributeValue::Double(n) => match rhs.trim().parse::<f64>() {
			Ok(r) => match operator {
				Operator::Equal | Operator::Approx => *n == r,
				Operator::GreaterEqual => *n >= r,
				Operator::LessEqual => *n <= r,
			},
			Err(_) => false,
		},
		AttributeValue::List(items) => items.iter().any(|i| compare(i, operator, rhs)),
	}
}

fn substring(lhs: &AttributeValue, pieces: &[String]) -> bool {
	match lhs {
		AttributeValue::String(s) => {
			let mut rest = s.as_str();
			let last = pieces.len().saturating_sub(1);
			for (i, piece) in pieces.iter().enumerate() {
				if i == 0 {
					match rest.strip_prefix(piece.as_str()) {
						Some(r) => rest = r,
						None => return false,
					}
				} else if i == last {
					return rest.ends_with(piece.as_str());
				} else {
					match rest.find(piece.as_str()) {
						Some(idx) => rest = &rest[idx + piece.len()..],
						None => return false,
					}
				}
			}
			true
		},
		AttributeValue::List(items) => items.iter().any(|i| substring(i, pieces)),
		_ => false,
	}
}

fn normalize(s: &str) -> String {
	s.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect()
}

struct Parser<'a> {
	source: &'a str,
	chars: Vec<char>,
	pos: usize,
}

impl<'a> Parser<'a> {
	fn error(&self, message: &str) -> FilterError {
		FilterError { filter: self.source.to_string(), position: self.pos, message: message.to_string() }
	}

	fn peek(&self) -> Option<char> {
		self.chars.get(self.pos).copied()
	}

	fn skip_whitespace(&mut self) {
		while self.peek().map_or(false, char::is_whitespace) {
			self.pos += 1;
		}
	}

	fn expect(&mut self, c: char) -> Result<(), FilterError> {
		if self.peek() == Some(c) {
			self.pos += 1;
			Ok(())
		} else {
			Err(self.error(&format!("expected '{}'", c)))
		}
	}

	fn filter(&mut self) -> Result<Filter, FilterError> {
		self.expect('(')?;
		self.skip_whitespace();
		let filter = match self.peek() {
			Some('&') => { self.pos += 1; Filter::And(self.list()?) },
			Some('|') => { self.pos += 1; Filter::Or(self.list()?) },
			Some('!') => {
				self.pos += 1;
				self.skip_whitespace();
				Filter::Not(Box::new(self.filter()?))
			},
			Some(_) => self.item()?,
			None => return Err(self.error("unexpected end of filter")),
		};
		self.skip_whitespace();
		self.expect(')')?;
		Ok(filter)
	}

	fn list(&mut self) -> Result<Vec<Filter>, FilterError> {
		let mut filters = Vec::new();
		self.skip_whitespace();
		while self.peek() == Some('(') {
			filters.push(self.filter()?);
			self.skip_whitespace();
		}
		Ok(filters)
	}

	fn item(&mut self) -> Result<Filter, FilterError> {
		let start = self.pos;
		while let Some(c) = self.peek() {
			if matches!(c, '=' | '<' | '>' | '~' | '(' | ')') {
				break;
			}
			self.pos += 1;
		}
		let attribute: String = self.chars[start..self.pos].iter().collect::<String>().trim().to_string();
		if attribute.is_empty() {
			return Err(self.error("missing attribute name"));
		}

		let operator = match (self.peek(), self.chars.get(self.pos + 1).copied()) {
			(Some('='), _) => { self.pos += 1; Operator::Equal },
			(Some('<'), Some('=')) => { self.pos += 2; Operator::LessEqual },
			(Some('>'), Some('=')) => { self.pos += 2; Operator::GreaterEqual },
			(Some('~'), Some('=')) => { self.pos += 2; Operator::Approx },
			_ => return Err(self.error("invalid operator")),
		};

		let pieces = self.value()?;
		if operator == Operator::Equal && pieces.len() > 1 {
			if pieces.len() == 2 && pieces.iter().all(String::is_empty) {
				return Ok(Filter::Present(attribute));
			}
			return Ok(Filter::Substring { attribute, pieces });
		}
		if pieces.len() > 1 {
			return Err(self.error("wildcard only allowed with '='"));
		}

		let value = pieces.into_iter().next().unwrap_or_default();
		Ok(Filter::Compare { attribute, operator, value })
	}

	/// Reads a value up to the closing parenthesis, splitting on unescaped wildcards.
	fn value(&mut self) -> Result<Vec<String>, FilterError> {
		let mut pieces = vec![String::new()];
		loop {
			match self.peek() {
				None => return Err(self.error("unterminated value")),
				Some(')') => break,
				Some('(') => return Err(self.error("unescaped '('")),
				Some('*') => { pieces.push(String::new()); self.pos += 1; },
				Some('\\') => {
					self.pos += 1;
					match self.peek() {
						Some(c) => { push(&mut pieces, c); self.pos += 1; },
						None => return Err(self.error("dangling escape")),
					}
				},
				Some(c) => { push(&mut pieces, c); self.pos += 1; },
			}
		}
		Ok(pieces)
	}
}

fn push(pieces: &mut [String], c: char) {
	if let Some(p) = pieces.last_mut() {
		p.push(c);
	}
}

fn escape(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for c in value.chars() {
		if matches!(c, '(' | ')' | '*' | '\\') {
			out.push('\\');
		}
		out.push(c);
	}
	out
}

impl std::fmt::Display for Filter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Filter::MatchAll => write!(f, "{}", ALL_FILTER),
			Filter::And(filters) => {
				write!(f, "(&")?;
				for filter in filters { write!(f, "{}", filter)?; }
				write!(f, ")")
			},
			Filter::Or(filters) => {
				write!(f, "(|")?;
				for filter in filters { write!(f, "{}", filter)?; }
				write!(f, ")")
			},
			Filter::Not(filter) => write!(f, "(!{})", filter),
			Filter::Present(attribute) => write!(f, "({}=*)", attribute),
			Filter::Compare { attribute, operator, value } => {
				let op = match operator {
					Operator::Equal => "=",
					Operator::Approx => "~=",
					Operator::GreaterEqual => ">=",
					Operator::LessEqual => "<=",
				};
				write!(f, "({}{}{})", attribute, op, escape(value))
			},
			Filter::Substring { attribute, pieces } => {
				let pieces: Vec<String> = pieces.iter().map(|p| escape(p)).collect();
				write!(f, "({}={})", attribute, pieces.join("*"))
			},
		}
	}
}

impl std::str::FromStr for Filter {
	type Err = FilterError;
	fn from_str(s: &str) -> Result<Self, Self::Err> { Filter::parse(s) }
}

#[cfg(test)]
mod test {
	use super::*;

	fn attrs(pairs: &[(&str, AttributeValue)]) -> Attributes {
		let mut a = Attributes::default();
		for (k, v) in pairs {
			a.insert(*k, v.clone());
		}
		a
	}

	#[test]
	fn all_filter_matches_empty() { assert!(Filter::parse(ALL_FILTER).unwrap().matches(&Attributes::default())); }

	#[test]
	fn equality() {
		let a = attrs(&[("osgi.identity", AttributeValue::from("b1"))]);
		assert!(Filter::parse("(osgi.identity=b1)").unwrap().matches(&a));
		assert!(!Filter::parse("(osgi.identity=b2)").unwrap().matches(&a));
	}

	#[test]
	fn version_coercion() {
		let a = attrs(&[("version", AttributeValue::Version(Version::new(1, 5, 0)))]);
		assert!(Filter::parse("(&(version>=1.0)(!(version>=2.0)))").unwrap().matches(&a));
		assert!(!Filter::parse("(version>=1.6)").unwrap().matches(&a));
	}

	#[test]
	fn missing_attribute_fails() { assert!(!Filter::parse("(type=subsystem)").unwrap().matches(&Attributes::default())); }

	#[test]
	fn presence() {
		let a = attrs(&[("all", AttributeValue::from("x"))]);
		assert_eq!(Filter::parse("(all=*)").unwrap(), Filter::Present("all".into()));
		assert!(Filter::parse("(all=*)").unwrap().matches(&a));
	}

	#[test]
	fn substring_match() {
		let a = attrs(&[("osgi.wiring.package", AttributeValue::from("org.example.api"))]);
		assert!(Filter::parse("(osgi.wiring.package=org.*.api)").unwrap().matches(&a));
		assert!(!Filter::parse("(osgi.wiring.package=com.*)").unwrap().matches(&a));
	}

	#[test]
	fn list_any_element() {
		let a = attrs(&[("objectClass", AttributeValue::List(vec!["a".into(), "b".into()]))]);
		assert!(Filter::parse("(objectClass=b)").unwrap().matches(&a));
	}

	#[test]
	fn approx_ignores_case_and_whitespace() {
		let a = attrs(&[("name", AttributeValue::from("Hello World"))]);
		assert!(Filter::parse("(name~=helloworld)").unwrap().matches(&a));
	}

	#[test]
	fn escaped_paren() {
		let f = Filter::parse(r"(name=a\(b\))").unwrap();
		assert!(f.matches(&attrs(&[("name", AttributeValue::from("a(b)"))])));
	}

	#[test]
	fn display_round_trip() {
		let text = "(&(osgi.identity=b1)(|(type=osgi.bundle)(type=osgi.fragment))(!(version>=2.0.0)))";
		assert_eq!(Filter::parse(text).unwrap().to_string(), text);
	}

	#[test]
	fn unbalanced_is_error() { assert!(Filter::parse("(&(a=b)").is_err()); }

	#[test]
	fn mentions_conjunct() { assert!(Filter::parse("(&(a=b)(c=d))").unwrap().mentions("c")); }
}
