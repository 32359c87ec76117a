//! Metadata filters for vector search.
//!
//! A filter arrives either as a structured [`ContentFilter`] or as the expression string the web
//! client sends, for example
//! `content_type == 'text' and date_created BETWEEN 1700000000 AND 1710000000`.
//! Clauses are joined by `and`. Strings compare with `==` or `=`; dates are unix seconds and take
//! `<`, `<=`, `>`, `>=`, `=`, `==`, `!=`, or `BETWEEN a AND b`.

use std::{fmt, iter::Peekable, str::FromStr, vec::IntoIter};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, models::ChunkPayload};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentFilter {
	#[serde(default)]
	pub content_type: Option<String>,
	#[serde(default)]
	pub date_created: Option<TimeRange>,
	#[serde(default)]
	pub date_updated: Option<TimeRange>,
	#[serde(default)]
	pub user_created: Option<String>,
	#[serde(default)]
	pub user_updated: Option<String>,
}
impl ContentFilter {
	pub fn is_empty(&self) -> bool {
		self == &Self::default()
	}

	/// Whether a stored chunk satisfies every clause.
	pub fn matches(&self, payload: &ChunkPayload) -> bool {
		let meta = &payload.meta;

		same(&self.content_type, &meta.content_type)
			&& same(&self.user_created, &meta.user_created)
			&& same(&self.user_updated, &meta.user_updated)
			&& in_range(&self.date_created, meta.date_created)
			&& in_range(&self.date_updated, meta.date_updated)
	}

	fn set_text(&mut self, field: TextField, value: String) -> Result<()> {
		let slot = match field {
			TextField::ContentType => &mut self.content_type,
			TextField::UserCreated => &mut self.user_created,
			TextField::UserUpdated => &mut self.user_updated,
		};

		if slot.is_some() {
			return Err(invalid(format!("{} is constrained more than once.", field.name())));
		}

		*slot = Some(value);

		Ok(())
	}

	fn range_mut(&mut self, field: DateField) -> &mut TimeRange {
		let slot = match field {
			DateField::Created => &mut self.date_created,
			DateField::Updated => &mut self.date_updated,
		};

		slot.get_or_insert_with(TimeRange::default)
	}
}
impl FromStr for ContentFilter {
	type Err = Error;

	fn from_str(expression: &str) -> Result<Self> {
		let mut tokens = tokenize(expression)?.into_iter().peekable();
		let mut filter = Self::default();

		// The web client may emit a leading `and` when the first clause is a BETWEEN.
		skip_and(&mut tokens);

		while tokens.peek().is_some() {
			parse_clause(&mut tokens, &mut filter)?;

			match tokens.next() {
				None => break,
				Some(token) if is_and(&token) =>
					if tokens.peek().is_none() {
						return Err(invalid("Filter ends with a dangling `and`."));
					},
				Some(token) => return Err(invalid(format!("Expected `and`, found {token}."))),
			}
		}

		Ok(filter)
	}
}

/// Bounds on a unix-seconds date field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeRange {
	#[serde(default)]
	pub gt: Option<i64>,
	#[serde(default)]
	pub gte: Option<i64>,
	#[serde(default)]
	pub lt: Option<i64>,
	#[serde(default)]
	pub lte: Option<i64>,
	/// Excluded value.
	#[serde(default)]
	pub ne: Option<i64>,
}
impl TimeRange {
	pub fn has_bounds(&self) -> bool {
		self.gt.is_some() || self.gte.is_some() || self.lt.is_some() || self.lte.is_some()
	}

	pub fn contains(&self, value: i64) -> bool {
		self.gt.is_none_or(|bound| value > bound)
			&& self.gte.is_none_or(|bound| value >= bound)
			&& self.lt.is_none_or(|bound| value < bound)
			&& self.lte.is_none_or(|bound| value <= bound)
			&& self.ne.is_none_or(|excluded| value != excluded)
	}

	fn set(&mut self, field: DateField, op: Op, value: i64) -> Result<()> {
		let slots = match op {
			Op::Gt => vec![&mut self.gt],
			Op::Gte => vec![&mut self.gte],
			Op::Lt => vec![&mut self.lt],
			Op::Lte => vec![&mut self.lte],
			Op::Ne => vec![&mut self.ne],
			Op::Eq => vec![&mut self.gte, &mut self.lte],
		};

		for slot in slots {
			if slot.is_some() {
				return Err(invalid(format!("{} has more than one {op} bound.", field.name())));
			}

			*slot = Some(value);
		}

		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
	Ident(String),
	Number(i64),
	Text(String),
	Op(Op),
}
impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Ident(word) => write!(f, "`{word}`"),
			Self::Number(value) => write!(f, "{value}"),
			Self::Text(value) => write!(f, "'{value}'"),
			Self::Op(op) => write!(f, "`{op}`"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
	Eq,
	Ne,
	Gt,
	Gte,
	Lt,
	Lte,
}
impl fmt::Display for Op {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Eq => "==",
			Self::Ne => "!=",
			Self::Gt => ">",
			Self::Gte => ">=",
			Self::Lt => "<",
			Self::Lte => "<=",
		})
	}
}

#[derive(Debug, Clone, Copy)]
enum TextField {
	ContentType,
	UserCreated,
	UserUpdated,
}
impl TextField {
	fn name(self) -> &'static str {
		match self {
			Self::ContentType => "content_type",
			Self::UserCreated => "user_created",
			Self::UserUpdated => "user_updated",
		}
	}
}

#[derive(Debug, Clone, Copy)]
enum DateField {
	Created,
	Updated,
}
impl DateField {
	fn name(self) -> &'static str {
		match self {
			Self::Created => "date_created",
			Self::Updated => "date_updated",
		}
	}
}

enum Field {
	Text(TextField),
	Date(DateField),
}
impl FromStr for Field {
	type Err = Error;

	fn from_str(name: &str) -> Result<Self> {
		match name {
			"content_type" => Ok(Self::Text(TextField::ContentType)),
			"user_created" => Ok(Self::Text(TextField::UserCreated)),
			"user_updated" => Ok(Self::Text(TextField::UserUpdated)),
			"date_created" => Ok(Self::Date(DateField::Created)),
			"date_updated" => Ok(Self::Date(DateField::Updated)),
			_ => Err(invalid(format!("Cannot filter on field `{name}`."))),
		}
	}
}

type Tokens = Peekable<IntoIter<Token>>;

fn parse_clause(tokens: &mut Tokens, filter: &mut ContentFilter) -> Result<()> {
	let field = match tokens.next() {
		Some(Token::Ident(name)) => name.parse::<Field>()?,
		Some(token) => return Err(invalid(format!("Expected a field name, found {token}."))),
		None => return Err(invalid("Expected a field name.")),
	};

	match field {
		Field::Text(field) => {
			match tokens.next() {
				Some(Token::Op(Op::Eq)) => {},
				Some(token) =>
					return Err(invalid(format!(
						"{} only supports `==`, found {token}.",
						field.name()
					))),
				None => return Err(invalid(format!("{} is missing an operator.", field.name()))),
			}

			let value = match tokens.next() {
				Some(Token::Text(value)) => value,
				Some(Token::Number(value)) => value.to_string(),
				_ => return Err(invalid(format!("{} expects a quoted value.", field.name()))),
			};

			filter.set_text(field, value)
		},
		Field::Date(field) => match tokens.next() {
			Some(Token::Op(op)) => {
				let value = expect_number(tokens, field)?;

				filter.range_mut(field).set(field, op, value)
			},
			Some(Token::Ident(word)) if word.eq_ignore_ascii_case("between") => {
				let low = expect_number(tokens, field)?;

				if !tokens.next().is_some_and(|token| is_and(&token)) {
					return Err(invalid(format!("{} BETWEEN is missing `AND`.", field.name())));
				}

				let high = expect_number(tokens, field)?;
				let range = filter.range_mut(field);

				range.set(field, Op::Gte, low)?;
				range.set(field, Op::Lte, high)
			},
			_ => Err(invalid(format!("{} is missing an operator.", field.name()))),
		},
	}
}

fn expect_number(tokens: &mut Tokens, field: DateField) -> Result<i64> {
	match tokens.next() {
		Some(Token::Number(value)) => Ok(value),
		_ => Err(invalid(format!("{} expects unix seconds.", field.name()))),
	}
}

fn skip_and(tokens: &mut Tokens) {
	while tokens.next_if(is_and).is_some() {}
}

fn is_and(token: &Token) -> bool {
	matches!(token, Token::Ident(word) if word.eq_ignore_ascii_case("and"))
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
	let mut tokens = Vec::new();
	let mut chars = expression.char_indices().peekable();

	while let Some(&(start, ch)) = chars.peek() {
		if ch.is_whitespace() {
			chars.next();

			continue;
		}
		if ch == '\'' || ch == '"' {
			chars.next();

			let mut value = String::new();
			let mut closed = false;

			for (_, next) in chars.by_ref() {
				if next == ch {
					closed = true;

					break;
				}

				value.push(next);
			}

			if !closed {
				return Err(invalid(format!("Unterminated string starting at byte {start}.")));
			}

			tokens.push(Token::Text(value));

			continue;
		}
		if ch.is_ascii_digit() || ch == '-' {
			let mut end = start;

			while let Some(&(index, next)) = chars.peek() {
				if !(next.is_ascii_digit() || (index == start && next == '-')) {
					break;
				}

				end = index + next.len_utf8();
				chars.next();
			}

			let literal = &expression[start..end];
			let value = literal
				.parse::<i64>()
				.map_err(|_| invalid(format!("Invalid number `{literal}`.")))?;

			tokens.push(Token::Number(value));

			continue;
		}
		if ch.is_alphabetic() || ch == '_' {
			let mut end = start;

			while let Some(&(index, next)) = chars.peek() {
				if !(next.is_alphanumeric() || next == '_') {
					break;
				}

				end = index + next.len_utf8();
				chars.next();
			}

			tokens.push(Token::Ident(expression[start..end].to_string()));

			continue;
		}

		chars.next();

		let followed_by_eq = chars.next_if(|&(_, next)| next == '=').is_some();
		let op = match (ch, followed_by_eq) {
			('=', _) => Op::Eq,
			('!', true) => Op::Ne,
			('<', false) => Op::Lt,
			('<', true) => Op::Lte,
			('>', false) => Op::Gt,
			('>', true) => Op::Gte,
			_ => return Err(invalid(format!("Unexpected `{ch}` at byte {start}."))),
		};

		tokens.push(Token::Op(op));
	}

	Ok(tokens)
}

fn same(expected: &Option<String>, actual: &Option<String>) -> bool {
	expected.as_ref().is_none_or(|expected| actual.as_ref() == Some(expected))
}

fn in_range(range: &Option<TimeRange>, value: Option<i64>) -> bool {
	match (range, value) {
		(None, _) => true,
		(Some(range), Some(value)) => range.contains(value),
		(Some(_), None) => false,
	}
}

fn invalid(message: impl Into<String>) -> Error {
	Error::InvalidArgument(message.into())
}
