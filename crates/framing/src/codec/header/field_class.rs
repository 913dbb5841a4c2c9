//! Static classification of well-known field names.
//!
//! The class decides what happens when a field shows up more than once in a
//! header section. The table is read-only and looked up case-insensitively.

/// How repeated occurrences of a field are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    /// Only the first occurrence is kept.
    NoDuplicates,
    /// Occurrences are joined with `", "`.
    CommaJoined,
    /// Occurrences are joined with `"; "`.
    SemicolonJoined,
    /// Occurrences are kept as a list.
    Array,
    /// Not in the table: first occurrence wins, first-seen casing is kept.
    Unknown,
}

/// A classified field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownField {
    pub class: FieldClass,
    /// Canonical key the folded value is stored under.
    pub key: &'static str,
}

const KNOWN_FIELDS: &[KnownField] = &[
    known(FieldClass::NoDuplicates, "age"),
    known(FieldClass::NoDuplicates, "authorization"),
    known(FieldClass::NoDuplicates, "content-length"),
    known(FieldClass::NoDuplicates, "content-type"),
    known(FieldClass::NoDuplicates, "etag"),
    known(FieldClass::NoDuplicates, "expires"),
    known(FieldClass::NoDuplicates, "from"),
    known(FieldClass::NoDuplicates, "host"),
    known(FieldClass::NoDuplicates, "if-modified-since"),
    known(FieldClass::NoDuplicates, "if-unmodified-since"),
    known(FieldClass::NoDuplicates, "last-modified"),
    known(FieldClass::NoDuplicates, "location"),
    known(FieldClass::NoDuplicates, "max-forwards"),
    known(FieldClass::NoDuplicates, "proxy-authorization"),
    known(FieldClass::NoDuplicates, "referer"),
    known(FieldClass::NoDuplicates, "retry-after"),
    known(FieldClass::NoDuplicates, "server"),
    known(FieldClass::NoDuplicates, "user-agent"),
    known(FieldClass::CommaJoined, "accept"),
    known(FieldClass::CommaJoined, "accept-encoding"),
    known(FieldClass::CommaJoined, "accept-language"),
    known(FieldClass::CommaJoined, "cache-control"),
    known(FieldClass::CommaJoined, "connection"),
    known(FieldClass::CommaJoined, "content-encoding"),
    known(FieldClass::CommaJoined, "date"),
    known(FieldClass::CommaJoined, "expect"),
    known(FieldClass::CommaJoined, "if-match"),
    known(FieldClass::CommaJoined, "if-none-match"),
    known(FieldClass::CommaJoined, "origin"),
    known(FieldClass::CommaJoined, "transfer-encoding"),
    known(FieldClass::CommaJoined, "upgrade"),
    known(FieldClass::CommaJoined, "vary"),
    known(FieldClass::CommaJoined, "x-forwarded-for"),
    known(FieldClass::CommaJoined, "x-forwarded-host"),
    known(FieldClass::CommaJoined, "x-forwarded-proto"),
    known(FieldClass::SemicolonJoined, "cookie"),
    known(FieldClass::Array, "set-cookie"),
];

const fn known(class: FieldClass, key: &'static str) -> KnownField {
    KnownField { class, key }
}

/// Looks up `name` in the table, ignoring ASCII case.
pub fn lookup(name: &str) -> Option<KnownField> {
    KNOWN_FIELDS.iter().find(|field| field.key.len() == name.len() && field.key.eq_ignore_ascii_case(name)).copied()
}

/// Returns the merge rule for `name`.
pub fn classify(name: &str) -> FieldClass {
    lookup(name).map_or(FieldClass::Unknown, |field| field.class)
}

/// `Cookie` is the one field whose list values are joined on the way out.
#[inline]
pub fn is_cookie_field(name: &str) -> bool {
    name.eq_ignore_ascii_case("cookie")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_ignores_case() {
        assert_eq!(classify("Set-Cookie"), FieldClass::Array);
        assert_eq!(classify("SET-COOKIE"), FieldClass::Array);
        assert_eq!(classify("cookie"), FieldClass::SemicolonJoined);
        assert_eq!(classify("Accept"), FieldClass::CommaJoined);
        assert_eq!(classify("Content-Type"), FieldClass::NoDuplicates);
        assert_eq!(classify("X-Request-Id"), FieldClass::Unknown);
    }

    #[test]
    fn canonical_key_is_lower_case() {
        assert_eq!(lookup("User-Agent").map(|f| f.key), Some("user-agent"));
        assert_eq!(lookup("X-Custom"), None);
    }

    #[test]
    fn table_has_no_duplicate_keys() {
        for (i, a) in KNOWN_FIELDS.iter().enumerate() {
            for b in &KNOWN_FIELDS[i + 1..] {
                assert_ne!(a.key, b.key);
            }
        }
    }

    #[test]
    fn cookie_field() {
        assert!(is_cookie_field("Cookie"));
        assert!(!is_cookie_field("Set-Cookie"));
    }
}
