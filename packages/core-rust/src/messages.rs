//! Request and response bodies for the `balance` endpoint.
//!
//! Both travel as JSON. The request carries the customer under the wire name
//! `client_id`; the response carries a single signed integer `balance`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Errors from turning a raw request body into a [`BalanceRequest`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The body is not valid JSON, or `client_id` is missing or not a string.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// `client_id` was present but empty.
    #[error("client_id must be a non-empty string")]
    EmptyCustomerId,
}

/// Inbound query for a single customer's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRequest {
    #[serde(rename = "client_id")]
    pub customer_id: String,
}

impl BalanceRequest {
    /// Creates a request for the given customer.
    #[must_use]
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
        }
    }

    /// Parses and validates a raw request body.
    ///
    /// No format checks are applied to the identifier beyond non-emptiness.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Json`] for malformed or mistyped bodies and
    /// [`DecodeError::EmptyCustomerId`] when `client_id` is `""`.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let request: Self = serde_json::from_slice(payload)?;
        if request.customer_id.is_empty() {
            return Err(DecodeError::EmptyCustomerId);
        }
        Ok(request)
    }

    /// Serializes the request to its wire form.
    ///
    /// # Errors
    ///
    /// Propagates the `serde_json` error; unreachable for string fields.
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Result of a successful balance lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

impl BalanceResponse {
    /// Serializes the response to its wire form.
    ///
    /// # Errors
    ///
    /// Propagates the `serde_json` error. Integer payloads never fail in
    /// practice, but callers treat the error as an internal fault.
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Parses a response body, as received by a requester or subscriber.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed bodies.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn decodes_client_id_into_customer_id() {
        let req = BalanceRequest::decode(br#"{"client_id":"cust-42"}"#).unwrap();
        assert_eq!(req.customer_id, "cust-42");
    }

    #[test]
    fn ignores_unknown_fields() {
        let req = BalanceRequest::decode(br#"{"client_id":"c1","extra":true}"#).unwrap();
        assert_eq!(req, BalanceRequest::new("c1"));
    }

    #[test]
    fn rejects_non_json_body() {
        let err = BalanceRequest::decode(b"not-json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn rejects_missing_client_id() {
        let err = BalanceRequest::decode(b"{}").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn rejects_mistyped_client_id() {
        let err = BalanceRequest::decode(br#"{"client_id":42}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn rejects_empty_client_id() {
        let err = BalanceRequest::decode(br#"{"client_id":""}"#).unwrap_err();
        assert!(matches!(err, DecodeError::EmptyCustomerId));
    }

    #[test]
    fn request_encodes_with_wire_field_name() {
        let bytes = BalanceRequest::new("cust-42").encode().unwrap();
        assert_eq!(&bytes[..], br#"{"client_id":"cust-42"}"#);
    }

    #[test]
    fn response_encodes_as_plain_integer() {
        let bytes = BalanceResponse { balance: 1500 }.encode().unwrap();
        assert_eq!(&bytes[..], br#"{"balance":1500}"#);
    }

    #[test]
    fn response_allows_negative_balance() {
        let bytes = BalanceResponse { balance: -20 }.encode().unwrap();
        assert_eq!(BalanceResponse::decode(&bytes).unwrap().balance, -20);
    }

    proptest! {
        #[test]
        fn decode_never_panics(payload in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = BalanceRequest::decode(&payload);
        }

        #[test]
        fn any_non_empty_id_is_accepted(id in "\\PC+") {
            let body = serde_json::to_vec(&serde_json::json!({ "client_id": id })).unwrap();
            let req = BalanceRequest::decode(&body).unwrap();
            prop_assert_eq!(req.customer_id, id);
        }
    }
}
