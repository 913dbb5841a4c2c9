use std::fmt;

use bytes::{Buf, Bytes};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::protocol::ValidationError;
use crate::protocol::chunk::latin1_bytes;

/// Represents an item in an HTTP message payload stream.
///
/// Payload encoders consume these: data chunks, then a single EOF that
/// produces whatever terminator the framing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

/// The value of an outgoing header: a single value, or a list rendered
/// line by line (or `"; "`-joined for `Cookie`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingValue {
    Single(String),
    Multiple(Vec<String>),
}

impl OutgoingValue {
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            OutgoingValue::Single(value) => std::slice::from_ref(value),
            OutgoingValue::Multiple(values) => values,
        };
        slice.iter().map(String::as_str)
    }

    pub(crate) fn push(&mut self, value: OutgoingValue) {
        let existing = match self {
            OutgoingValue::Single(single) => vec![std::mem::take(single)],
            OutgoingValue::Multiple(values) => std::mem::take(values),
        };
        let mut merged = existing;
        match value {
            OutgoingValue::Single(single) => merged.push(single),
            OutgoingValue::Multiple(values) => merged.extend(values),
        }
        *self = OutgoingValue::Multiple(merged);
    }
}

impl fmt::Display for OutgoingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutgoingValue::Single(value) => f.write_str(value),
            OutgoingValue::Multiple(values) => f.write_str(&values.join(", ")),
        }
    }
}

impl From<&str> for OutgoingValue {
    fn from(value: &str) -> Self {
        OutgoingValue::Single(value.to_owned())
    }
}

impl From<String> for OutgoingValue {
    fn from(value: String) -> Self {
        OutgoingValue::Single(value)
    }
}

impl From<u64> for OutgoingValue {
    fn from(value: u64) -> Self {
        OutgoingValue::Single(value.to_string())
    }
}

impl From<usize> for OutgoingValue {
    fn from(value: usize) -> Self {
        OutgoingValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for OutgoingValue {
    fn from(values: Vec<String>) -> Self {
        OutgoingValue::Multiple(values)
    }
}

impl From<Vec<&str>> for OutgoingValue {
    fn from(values: Vec<&str>) -> Self {
        OutgoingValue::Multiple(values.into_iter().map(str::to_owned).collect())
    }
}

impl<const N: usize> From<[&str; N]> for OutgoingValue {
    fn from(values: [&str; N]) -> Self {
        OutgoingValue::Multiple(values.into_iter().map(str::to_owned).collect())
    }
}

/// What the consumer learns when the header block is sent: the start line split
/// into status and reason, and every rendered field line in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentHead {
    pub(crate) start_line: String,
    pub(crate) status: Option<u16>,
    pub(crate) reason: Option<String>,
    pub(crate) fields: Vec<(String, String)>,
}

impl SentHead {
    /// The start line without its trailing CRLF.
    pub fn start_line(&self) -> &str {
        &self.start_line
    }

    /// The status code, for responses.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The reason phrase, for responses.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Rendered field lines as `(name, value)`, names in the case they were set with.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// All values of `name` joined with `", "`, like a fetch `Headers` lookup.
    pub fn get(&self, name: &str) -> Option<String> {
        let values = self.get_all(name);
        if values.is_empty() { None } else { Some(values.join(", ")) }
    }

    /// Every value of `name`, one entry per rendered line.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields.iter().filter(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str()).collect()
    }

    /// Builds an [`HeaderMap`] keeping repeated fields as separate entries.
    ///
    /// # Errors
    ///
    /// Fails if a rendered field cannot be represented by the `http` crate.
    pub fn to_header_map(&self) -> Result<HeaderMap, ValidationError> {
        let mut map = HeaderMap::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| ValidationError::invalid_token("Header name", name))?;
            let header_value = HeaderValue::from_maybe_shared(latin1_bytes(value))
                .map_err(|_| ValidationError::invalid_char("header content", Some(name)))?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head() -> SentHead {
        SentHead {
            start_line: "HTTP/1.1 200 OK".into(),
            status: Some(200),
            reason: Some("OK".into()),
            fields: vec![
                ("Set-Cookie".into(), "a=1".into()),
                ("Content-Type".into(), "text/plain".into()),
                ("set-cookie".into(), "b=2".into()),
            ],
        }
    }

    #[test]
    fn joined_and_distinct_lookup() {
        let head = head();
        assert_eq!(head.get("set-cookie").as_deref(), Some("a=1, b=2"));
        assert_eq!(head.get_all("Set-Cookie"), vec!["a=1", "b=2"]);
        assert_eq!(head.get("content-type").as_deref(), Some("text/plain"));
        assert_eq!(head.get("x-missing"), None);
    }

    #[test]
    fn header_map_keeps_every_line() {
        let map = head().to_header_map().unwrap();
        let cookies: Vec<_> = map.get_all(http::header::SET_COOKIE).iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn outgoing_value_push_promotes_to_list() {
        let mut value = OutgoingValue::from("a");
        value.push("b".into());
        value.push(["c", "d"].into());
        assert_eq!(value, OutgoingValue::from(vec!["a", "b", "c", "d"]));
        assert_eq!(value.to_string(), "a, b, c, d");
    }
}
