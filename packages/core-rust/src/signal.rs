//! Three-part error signal sent back to a requester in place of a reply body.
//!
//! Mirrors the service-error convention of the bus: a status-code-like string,
//! a short symbolic description, and a free-text body.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Status codes carried in [`ErrorSignal::code`].
pub mod codes {
    /// The request body could not be decoded.
    pub const BAD_REQUEST: &str = "403";
    /// Any fault after decoding succeeded.
    pub const INTERNAL: &str = "500";
}

/// Symbolic descriptions carried in [`ErrorSignal::description`].
pub mod descriptions {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const RETRIEVE_BALANCE: &str = "INTERNAL_ERROR - retrieve bal";
    pub const ENCODE_JSON: &str = "INTERNAL_ERROR - encode json";
    pub const PUBLISH: &str = "INTERNAL_ERROR - publish";
    pub const TIMEOUT: &str = "INTERNAL_ERROR - timeout";
    pub const OVERLOADED: &str = "INTERNAL_ERROR - overloaded";
    pub const SHUTTING_DOWN: &str = "INTERNAL_ERROR - shutting down";
    pub const UNKNOWN_ENDPOINT: &str = "INTERNAL_ERROR - unknown endpoint";
}

/// Fixed body for lookup failures. Backend detail is never forwarded.
pub const LOOKUP_FAILURE_BODY: &str = "client_balance error";

/// Error reply: `(code, description, body)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSignal {
    pub code: String,
    pub description: String,
    #[serde(with = "body_as_string")]
    pub body: Bytes,
}

impl ErrorSignal {
    #[must_use]
    pub fn new(code: &str, description: &str, body: impl Into<Bytes>) -> Self {
        Self {
            code: code.to_string(),
            description: description.to_string(),
            body: body.into(),
        }
    }

    /// `403 / BAD_REQUEST` with the decoder's error text as body.
    #[must_use]
    pub fn bad_request(detail: &str) -> Self {
        Self::new(
            codes::BAD_REQUEST,
            descriptions::BAD_REQUEST,
            detail.to_string(),
        )
    }

    /// `500` with the given `INTERNAL_ERROR - <reason>` description.
    #[must_use]
    pub fn internal(description: &str, detail: &str) -> Self {
        Self::new(codes::INTERNAL, description, detail.to_string())
    }

    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        self.code == codes::BAD_REQUEST
    }

    /// Body interpreted as UTF-8, lossily.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl std::fmt::Display for ErrorSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.code, self.description, self.body_text())
    }
}

mod body_as_string {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&String::from_utf8_lossy(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        String::deserialize(d).map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_uses_403() {
        let signal = ErrorSignal::bad_request("expected value at line 1 column 1");
        assert_eq!(signal.code, "403");
        assert_eq!(signal.description, "BAD_REQUEST");
        assert!(signal.is_bad_request());
        assert_eq!(signal.body_text(), "expected value at line 1 column 1");
    }

    #[test]
    fn lookup_failure_does_not_carry_backend_detail() {
        let signal = ErrorSignal::internal(descriptions::RETRIEVE_BALANCE, LOOKUP_FAILURE_BODY);
        assert_eq!(signal.code, "500");
        assert_eq!(signal.description, "INTERNAL_ERROR - retrieve bal");
        assert_eq!(&signal.body[..], b"client_balance error");
        assert!(!signal.is_bad_request());
    }

    #[test]
    fn display_joins_all_three_parts() {
        let signal = ErrorSignal::internal(descriptions::PUBLISH, "bus closed");
        assert_eq!(signal.to_string(), "500 INTERNAL_ERROR - publish: bus closed");
    }

    #[test]
    fn serializes_body_as_text() {
        let signal = ErrorSignal::bad_request("oops");
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json["body"], "oops");
        assert_eq!(json["code"], "403");
    }
}
