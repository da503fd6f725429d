//! Subject naming and matching.
//!
//! Subjects are dot-separated tokens. Subscription patterns may use `*` to
//! match exactly one token and a trailing `>` to match one or more tokens.

/// Prefix of the per-customer notification subject.
pub const BALANCE_NOTIFICATION_PREFIX: &str = "customer.balance";

/// Queue group used for endpoint subscriptions so that multiple service
/// instances share the request load.
pub const DEFAULT_QUEUE_GROUP: &str = "q";

/// Subject on which balance results for `customer_id` are broadcast.
#[must_use]
pub fn notification_subject(customer_id: &str) -> String {
    format!("{BALANCE_NOTIFICATION_PREFIX}.{customer_id}")
}

/// Subject an endpoint listens on: `<group>.<endpoint>`, or just the endpoint
/// name when registered outside a group.
#[must_use]
pub fn endpoint_subject(group: Option<&str>, endpoint: &str) -> String {
    match group {
        Some(group) if !group.is_empty() => format!("{group}.{endpoint}"),
        _ => endpoint.to_string(),
    }
}

/// Whether `token` can appear as a single literal subject token.
#[must_use]
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token != "*"
        && token != ">"
        && !token
            .chars()
            .any(|c| c == '.' || c.is_whitespace() || c.is_control())
}

/// Whether a literal subject (no wildcards) is well formed.
#[must_use]
pub fn is_valid_subject(subject: &str) -> bool {
    subject.split('.').all(is_valid_token)
}

/// Whether `subject` is matched by the subscription `pattern`.
#[must_use]
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return pattern_tokens.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
