//! Field name and field value checks shared by the header and trailer paths.
//!
//! refer: <https://www.rfc-editor.org/rfc/rfc9110.html#name-field-values>

use http::HeaderName;

use crate::ensure;
use crate::protocol::ValidationError;

/// Returns true if `name` is a non-empty RFC 9110 token.
#[inline]
pub fn is_http_token(name: &str) -> bool {
    // `HeaderName` accepts exactly the tchar set, upper case included
    HeaderName::from_bytes(name.as_bytes()).is_ok()
}

/// Returns true if `value` contains a character that is not allowed in a field value.
///
/// Allowed are horizontal tab, visible ASCII, space, and obs-text (`0x80..=0xFF`).
/// Characters beyond latin-1 cannot be put on the wire and are rejected too.
pub fn has_invalid_header_char(value: &str) -> bool {
    value.chars().any(|c| !matches!(c, '\t' | '\x20'..='\x7e' | '\u{80}'..='\u{ff}'))
}

pub fn validate_header_name(what: &'static str, name: &str) -> Result<(), ValidationError> {
    ensure!(is_http_token(name), ValidationError::invalid_token(what, name));
    Ok(())
}

pub fn validate_header_value(what: &'static str, name: &str, value: &str) -> Result<(), ValidationError> {
    ensure!(!has_invalid_header_char(value), ValidationError::invalid_char(what, Some(name)));
    Ok(())
}

/// Case-insensitive search for `token` delimited by non-word characters,
/// the way `close` is found in `Connection` and `chunked` in `Transfer-Encoding`.
pub fn contains_token(value: &str, token: &str) -> bool {
    value.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')).any(|part| part.eq_ignore_ascii_case(token))
}
