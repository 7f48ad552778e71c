use thiserror::Error;

use crate::http::headers::{DEPRECATED_HEADERS, HeaderSet, PSEUDO_MARKER};

/// Protocol errors found in an inbound header frame.
///
/// These never reach application code: the owning message resets its stream
/// with [`ResetReason::ProtocolError`](crate::transport::ResetReason) instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("deprecated header found: {0}")]
    DeprecatedHeader(String),

    #[error("header name too short: {0:?}")]
    NameTooShort(String),

    #[error("header name contains uppercase characters: {0}")]
    UppercaseName(String),

    #[error("invalid or missing special header field {0}")]
    InvalidPseudoHeader(&'static str),
}

pub struct Validator;

impl Validator {
    /// Applies the header rules in order; the first violation wins.
    pub fn validate_headers(headers: &HeaderSet) -> Result<(), ValidationError> {
        if let Some(name) = DEPRECATED_HEADERS.iter().find(|name| headers.contains(name)) {
            return Err(ValidationError::DeprecatedHeader(name.to_string()));
        }

        for name in headers.names() {
            let bare = name.strip_prefix(PSEUDO_MARKER).unwrap_or(name);
            if bare.len() <= 1 {
                return Err(ValidationError::NameTooShort(name.to_string()));
            }
            if name.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(ValidationError::UppercaseName(name.to_string()));
            }
        }

        Ok(())
    }

    /// Returns the value of a required pseudo-header, which must be a
    /// non-empty string.
    pub fn require_pseudo_header<'a>(
        headers: &'a HeaderSet,
        name: &'static str,
    ) -> Result<&'a str, ValidationError> {
        match headers.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ValidationError::InvalidPseudoHeader(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::headers::{METHOD, PATH};

    fn set(pairs: &[(&str, &str)]) -> HeaderSet {
        pairs.iter().copied().collect()
    }

    #[test]
    fn accepts_well_formed_headers() {
        let headers = set(&[(":method", "GET"), (":path", "/"), ("accept", "text/html")]);
        assert_eq!(Validator::validate_headers(&headers), Ok(()));
    }

    #[test]
    fn rejects_every_deprecated_header() {
        for name in DEPRECATED_HEADERS {
            let headers = set(&[(":method", "GET"), (name, "x")]);
            assert_eq!(
                Validator::validate_headers(&headers),
                Err(ValidationError::DeprecatedHeader(name.to_string()))
            );
        }
    }

    #[test]
    fn deprecated_check_runs_before_name_rules() {
        let headers = set(&[("X", "1"), ("upgrade", "h2c")]);
        assert!(matches!(
            Validator::validate_headers(&headers),
            Err(ValidationError::DeprecatedHeader(_))
        ));
    }

    #[test]
    fn short_names_are_measured_without_the_marker() {
        assert!(matches!(
            Validator::validate_headers(&set(&[(":a", "1")])),
            Err(ValidationError::NameTooShort(_))
        ));
        assert!(matches!(
            Validator::validate_headers(&set(&[("x", "1")])),
            Err(ValidationError::NameTooShort(_))
        ));
        assert_eq!(Validator::validate_headers(&set(&[("te-x", "1")])), Ok(()));
    }

    #[test]
    fn rejects_uppercase_names() {
        assert_eq!(
            Validator::validate_headers(&set(&[("Accept", "*/*")])),
            Err(ValidationError::UppercaseName("Accept".to_string()))
        );
    }

    #[test]
    fn pseudo_headers_must_be_non_empty() {
        let headers = set(&[(":method", "GET"), (":path", "")]);
        assert_eq!(Validator::require_pseudo_header(&headers, METHOD), Ok("GET"));
        assert_eq!(
            Validator::require_pseudo_header(&headers, PATH),
            Err(ValidationError::InvalidPseudoHeader(PATH))
        );
        assert_eq!(
            Validator::require_pseudo_header(&HeaderSet::new(), METHOD),
            Err(ValidationError::InvalidPseudoHeader(METHOD))
        );
    }
}
