//! Cursor pagination: pages, queries, and the shared cursor-advance algorithm.
//!
//! List endpoints accept `cursor` and `limit` query parameters. A page body is either the
//! `{"items": [...], "next_cursor": ...}` envelope or a bare JSON array whose continuation is
//! announced through a `Link: <...?cursor=X>; rel="next"` header. An absent cursor ends the
//! sequence. A page that hands back the cursor it was fetched with fails with
//! [`ProtocolError::NonProgressingCursor`].

mod items;

pub use items::*;

// self
use crate::{
	_prelude::*,
	error::ProtocolError,
	http::{RequestDescriptor, Response},
	view,
};

/// Query parameter carrying the cursor.
pub const CURSOR_PARAM: &str = "cursor";
/// Query parameter carrying the page size.
pub const LIMIT_PARAM: &str = "limit";

const LINK_HEADER: &str = "Link";

/// Opaque server-issued position in a paginated sequence.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);
impl Cursor {
	/// Wraps a raw cursor.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw cursor.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for Cursor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Cursor({})", self.0)
	}
}
impl Display for Cursor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Base request plus the traversal position.
///
/// A cursor is only meaningful for the base request that produced it; each traversal owns its
/// own query.
#[derive(Clone, Debug)]
pub struct PagedQuery {
	base: RequestDescriptor,
	cursor: Option<Cursor>,
	limit: Option<u32>,
}
impl PagedQuery {
	/// Starts at the beginning of the sequence described by `base`.
	pub fn new(base: RequestDescriptor) -> Self {
		Self { base, cursor: None, limit: None }
	}

	/// Requests pages of at most `limit` items (the server may clamp it).
	pub fn with_limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);

		self
	}

	/// Resumes from a previously issued cursor.
	pub fn with_cursor(mut self, cursor: Cursor) -> Self {
		self.cursor = Some(cursor);

		self
	}

	/// Current position; `None` means the first page.
	pub fn cursor(&self) -> Option<&Cursor> {
		self.cursor.as_ref()
	}

	/// Requested page size.
	pub fn limit(&self) -> Option<u32> {
		self.limit
	}

	/// Base request without cursor or limit.
	pub fn base(&self) -> &RequestDescriptor {
		&self.base
	}

	/// Request for the page at the current position.
	pub fn request(&self) -> RequestDescriptor {
		let mut request = self.base.clone();

		if let Some(limit) = self.limit {
			request = request.set_query(LIMIT_PARAM, limit);
		}
		if let Some(cursor) = &self.cursor {
			request = request.set_query(CURSOR_PARAM, cursor.as_str());
		}

		request
	}

	fn at(&self, cursor: Cursor) -> Self {
		Self { base: self.base.clone(), cursor: Some(cursor), limit: self.limit }
	}
}

/// Immutable snapshot of one fetched page.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
	items: Vec<T>,
	next_cursor: Option<Cursor>,
	fetched_with: Option<Cursor>,
}
impl<T> Page<T> {
	/// Builds a page fetched with `fetched_with` (`None` for the first page).
	pub fn new(items: Vec<T>, next_cursor: Option<Cursor>, fetched_with: Option<Cursor>) -> Self {
		Self { items, next_cursor, fetched_with }
	}

	/// Items in server order.
	pub fn data(&self) -> &[T] {
		&self.items
	}

	/// Iterates over the items.
	pub fn iter(&self) -> std::slice::Iter<'_, T> {
		self.items.iter()
	}

	/// Cursor of the following page, if any.
	pub fn cursor(&self) -> Option<&Cursor> {
		self.next_cursor.as_ref()
	}

	/// Returns `true` when no page follows.
	pub fn is_last(&self) -> bool {
		self.next_cursor.is_none()
	}

	/// Number of items on this page.
	pub fn len(&self) -> usize {
		self.items.len()
	}

	/// Returns `true` for a page without items; later pages may still follow.
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Consumes the page, returning its items.
	pub fn into_items(self) -> Vec<T> {
		self.items
	}

	/// Query for the following page, or `None` at the end of the sequence.
	pub fn next_query(&self, query: &PagedQuery) -> Result<Option<PagedQuery>, ProtocolError> {
		let Some(next) = &self.next_cursor else {
			return Ok(None);
		};

		if self.fetched_with.as_ref() == Some(next) {
			return Err(ProtocolError::NonProgressingCursor { cursor: next.as_str().into() });
		}

		Ok(Some(query.at(next.clone())))
	}
}
impl<T> Page<T>
where
	T: DeserializeOwned,
{
	/// Decodes a list response fetched with `fetched_with`.
	pub fn from_response(
		response: &Response,
		fetched_with: Option<Cursor>,
	) -> Result<Self, ProtocolError> {
		match view::decode::<serde_json::Value>("page", &response.body)? {
			serde_json::Value::Array(items) => {
				let items = view::decode_value("page items", serde_json::Value::Array(items))?;
				let next_cursor = match response.header(LINK_HEADER) {
					Some(link) => next_cursor_from_link(link)?,
					None => None,
				};

				Ok(Self::new(items, next_cursor, fetched_with))
			},
			value @ serde_json::Value::Object(_) => {
				let envelope: Envelope<T> = view::decode_value("page", value)?;
				let next_cursor = envelope.next_cursor.filter(|cursor| !cursor.as_str().is_empty());

				Ok(Self::new(envelope.items, next_cursor, fetched_with))
			},
			other => Err(ProtocolError::UnexpectedShape {
				what: "page",
				message: format!("expected an object or an array, found {}", json_kind(&other)),
			}),
		}
	}
}
impl<T> IntoIterator for Page<T> {
	type IntoIter = std::vec::IntoIter<T>;
	type Item = T;

	fn into_iter(self) -> Self::IntoIter {
		self.items.into_iter()
	}
}
impl<'a, T> IntoIterator for &'a Page<T> {
	type IntoIter = std::slice::Iter<'a, T>;
	type Item = &'a T;

	fn into_iter(self) -> Self::IntoIter {
		self.items.iter()
	}
}

#[derive(Deserialize)]
struct Envelope<T> {
	items: Vec<T>,
	#[serde(default)]
	next_cursor: Option<Cursor>,
}

/// Extracts the `cursor` parameter of the `rel="next"` entry of a `Link` header.
fn next_cursor_from_link(link: &str) -> Result<Option<Cursor>, ProtocolError> {
	for entry in link.split(',') {
		let mut parts = entry.split(';');
		let Some(target) = parts.next().map(str::trim) else {
			continue;
		};
		let is_next = parts.any(|param| {
			let param = param.trim();

			param == "rel=\"next\"" || param == "rel=next"
		});

		if !is_next {
			continue;
		}

		let target = target
			.strip_prefix('<')
			.and_then(|rest| rest.strip_suffix('>'))
			.ok_or(ProtocolError::InvalidHeader { name: LINK_HEADER })?;
		let url = Url::parse(target)
			.or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(target)))
			.map_err(|_| ProtocolError::InvalidHeader { name: LINK_HEADER })?;
		let cursor = url
			.query_pairs()
			.find(|(key, _)| key == CURSOR_PARAM)
			.map(|(_, value)| value.into_owned())
			.filter(|value| !value.is_empty())
			.ok_or(ProtocolError::InvalidHeader { name: LINK_HEADER })?;

		return Ok(Some(Cursor::new(cursor)));
	}

	Ok(None)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
	match value {
		serde_json::Value::Null => "null",
		serde_json::Value::Bool(_) => "a boolean",
		serde_json::Value::Number(_) => "a number",
		serde_json::Value::String(_) => "a string",
		serde_json::Value::Array(_) => "an array",
		serde_json::Value::Object(_) => "an object",
	}
}
