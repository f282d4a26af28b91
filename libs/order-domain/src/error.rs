//! Closed error taxonomy shared by every component in the pipeline.
//!
//! Rather than letting `sqlx::Error` leak into callers and forcing each
//! worker to re-derive "should I retry this?", every repository method
//! returns a `DomainError` already classified into one of five buckets.
//! That classification, not the concrete variant name, is what callers
//! branch on.

use thiserror::Error;
use uuid::Uuid;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    /// Malformed command input. Fail fast, report to caller, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Uniqueness violation translated into a business outcome. Not retried.
    #[error("duplicate event id: {0}")]
    DuplicateEventId(Uuid),

    #[error("order already exists: {0}")]
    DuplicateOrder(Uuid),

    /// Row expected to exist did not.
    #[error("not found: {0}")]
    NotFound(String),

    /// Database unavailable, pool exhausted, deadline exceeded. Retried by the
    /// caller (relay backoff, or consumer redelivery).
    #[error("transient database error: {0}")]
    Transient(#[source] sqlx::Error),

    /// Irrecoverable without operator intervention (payload undecodable,
    /// constraint we can't route around). Caller transitions to terminal state.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Campaign-quota rejection. Terminal per message; offset still commits.
    #[error("policy reject: {0}")]
    PolicyReject(PolicyRejectReason),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRejectReason {
    NoActivePromotion,
    OrderBelowMinValue,
    CustomerAlreadyRewarded,
    PromotionCustomerLimit,
    PromotionTotalExhausted,
}

impl std::fmt::Display for PolicyRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PolicyRejectReason::NoActivePromotion => "no active promotion",
            PolicyRejectReason::OrderBelowMinValue => "order below minimum value for promotion",
            PolicyRejectReason::CustomerAlreadyRewarded => "customer already received promotion",
            PolicyRejectReason::PromotionCustomerLimit => "promotion customer limit reached",
            PolicyRejectReason::PromotionTotalExhausted => "promotion total rewards exhausted",
        };
        write!(f, "{s}")
    }
}

/// Classify a raw `sqlx::Error` the way every repository method does before
/// returning: unique-violation becomes a `Conflict`-flavored variant at the
/// call site, everything else transient-vs-not based on the driver error.
pub fn classify_sqlx(err: sqlx::Error) -> DomainError {
    if is_unique_violation(&err) {
        // Callers that expect a specific conflict (duplicate event id, duplicate
        // order) match on the constraint name themselves; this fallback only
        // fires for a violation nothing upstream anticipated.
        return DomainError::Permanent(format!("unexpected uniqueness violation: {err}"));
    }
    DomainError::Transient(err)
}

/// PostgreSQL unique_violation is SQLSTATE 23505.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.code().as_deref() == Some("23505"))
        .unwrap_or(false)
}

pub fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeDbError(&'static str);

    impl std::fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "fake db error {}", self.0)
        }
    }

    impl std::error::Error for FakeDbError {}

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "fake"
        }
        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(self.0))
        }
        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }
        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }
        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn test_is_unique_violation_matches_23505() {
        let err = sqlx::Error::Database(Box::new(FakeDbError("23505")));
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_is_unique_violation_rejects_other_codes() {
        let err = sqlx::Error::Database(Box::new(FakeDbError("40001")));
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn test_classify_sqlx_routes_unique_violation_to_permanent() {
        let err = sqlx::Error::Database(Box::new(FakeDbError("23505")));
        match classify_sqlx(err) {
            DomainError::Permanent(msg) => assert!(msg.contains("uniqueness violation")),
            other => panic!("expected Permanent, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_sqlx_routes_other_codes_to_transient() {
        let err = sqlx::Error::Database(Box::new(FakeDbError("53300")));
        match classify_sqlx(err) {
            DomainError::Transient(_) => {}
            other => panic!("expected Transient, got {other:?}"),
        }
    }

    #[test]
    fn test_policy_reject_reason_display() {
        assert_eq!(
            PolicyRejectReason::PromotionCustomerLimit.to_string(),
            "promotion customer limit reached"
        );
    }
}
