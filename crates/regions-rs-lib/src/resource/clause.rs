//! Manifest header clause syntax.
//!
//! `path;path;attr=value;attr:Type=value;directive:=value, path2;...`
//! Values may be quoted to protect `,` and `;`.

use std::collections::BTreeMap;

use super::AttributeValue;
use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClauseError {
	#[error("unterminated quote in \"{0}\"")]
	UnterminatedQuote(String),
	#[error("clause \"{0}\" has no path")]
	MissingPath(String),
	#[error("unknown attribute type \"{0}\"")]
	UnknownType(String),
	#[error("invalid {kind} value \"{value}\"")]
	InvalidValue { kind: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
	pub name: String,
	/// Declared type such as `Version` or `List<String>`, `None` for strings.
	pub kind: Option<String>,
	pub value: String,
}

impl Attribute {
	pub fn typed_value(&self) -> Result<AttributeValue, ClauseError> {
		typed_value(self.kind.as_deref(), &self.value)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Clause {
	pub paths: Vec<String>,
	pub attributes: Vec<Attribute>,
	pub directives: BTreeMap<String, String>,
}

impl Clause {
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.iter().find(|a| a.name == name).map(|a| a.value.as_str())
	}
}

/// Splits on `separator` outside of double quotes, escapes inside quotes are kept.
fn split_unquoted(s: &str, separator: char) -> Result<Vec<&str>, ClauseError> {
	let mut parts = Vec::new();
	let mut start = 0;
	let mut quoted = false;
	let mut escaped = false;
	for (i, c) in s.char_indices() {
		if escaped {
			escaped = false;
			continue;
		}
		match c {
			'\\' if quoted => escaped = true,
			'"' => quoted = !quoted,
			c if c == separator && !quoted => {
				parts.push(&s[start..i]);
				start = i + c.len_utf8();
			},
			_ => {},
		}
	}
	if quoted {
		return Err(ClauseError::UnterminatedQuote(s.to_string()));
	}
	parts.push(&s[start..]);
	Ok(parts)
}

fn unquote(value: &str) -> String {
	let value = value.trim();
	match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
		Some(inner) => {
			let mut out = String::with_capacity(inner.len());
			let mut chars = inner.chars();
			while let Some(c) = chars.next() {
				if c == '\\' {
					if let Some(n) = chars.next() {
						out.push(n);
					}
				} else {
					out.push(c);
				}
			}
			out
		},
		None => value.to_string(),
	}
}

/// Position of the first `=` outside of quotes.
fn find_assignment(part: &str) -> Option<usize> {
	let mut quoted = false;
	for (i, c) in part.char_indices() {
		match c {
			'"' => quoted = !quoted,
			'=' if !quoted => return Some(i),
			_ => {},
		}
	}
	None
}

pub fn parse_header(header: &str) -> Result<Vec<Clause>, ClauseError> {
	let mut clauses = Vec::new();
	for text in split_unquoted(header, ',')? {
		if text.trim().is_empty() {
			continue;
		}

		let mut clause = Clause::default();
		for part in split_unquoted(text, ';')? {
			let part = part.trim();
			if part.is_empty() {
				continue;
			}
			match find_assignment(part) {
				Some(eq) if eq > 0 && part[..eq].ends_with(':') => {
					let name = part[..eq - 1].trim().to_string();
					clause.directives.insert(name, unquote(&part[eq + 1..]));
				},
				Some(eq) => {
					let (name, kind) = match part[..eq].split_once(':') {
						Some((n, t)) => (n.trim().to_string(), Some(t.trim().to_string())),
						None => (part[..eq].trim().to_string(), None),
					};
					clause.attributes.push(Attribute { name, kind, value: unquote(&part[eq + 1..]) });
				},
				None => clause.paths.push(unquote(part)),
			}
		}

		if clause.paths.is_empty() {
			return Err(ClauseError::MissingPath(text.trim().to_string()));
		}
		clauses.push(clause);
	}
	Ok(clauses)
}

fn scalar(kind: &str, value: &str) -> Result<AttributeValue, ClauseError> {
	let invalid = || ClauseError::InvalidValue { kind: kind.to_string(), value: value.to_string() };
	let value = value.trim();
	match kind {
		"String" => Ok(AttributeValue::String(value.to_string())),
		"Version" => Version::parse(value).map(AttributeValue::Version).map_err(|_| invalid()),
		"Long" => value.parse().map(AttributeValue::Long).map_err(|_| invalid()),
		"Double" => value.parse().map(AttributeValue::Double).map_err(|_| invalid()),
		other => Err(ClauseError::UnknownType(other.to_string())),
	}
}

pub fn typed_value(kind: Option<&str>, value: &str) -> Result<AttributeValue, ClauseError> {
	match kind {
		None => Ok(AttributeValue::String(value.to_string())),
		Some("List") => typed_value(Some("List<String>"), value),
		Some(k) => match k.strip_prefix("List<").and_then(|k| k.strip_suffix('>')) {
			Some(inner) => value.split(',')
				.map(|v| scalar(inner.trim(), v))
				.collect::<Result<Vec<_>, _>>()
				.map(AttributeValue::List),
			None => scalar(k, value),
		},
	}
}
