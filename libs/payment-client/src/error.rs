use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    /// Deadline exceeded, service unavailable, internal error — safe to
    /// retry on the caller's own backoff schedule.
    #[error("transient payment RPC error: {0}")]
    Transient(String),

    /// Invalid argument, failed precondition — retrying verbatim would
    /// reproduce the same rejection. Caller transitions the outbox entry
    /// straight to `failed`.
    #[error("permanent payment RPC error: {0}")]
    Permanent(String),

    #[error("circuit open, payment service rejected without dialing")]
    CircuitOpen,
}

impl PaymentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Transient(_) | PaymentError::CircuitOpen)
    }
}

/// Translate a tonic status into the transient/permanent split the outbox
/// relay retries on. Mirrors the gRPC status-code convention the rest of the
/// stack already follows for inter-service calls.
pub fn classify_status(status: &tonic::Status) -> PaymentError {
    use tonic::Code;
    match status.code() {
        Code::DeadlineExceeded
        | Code::Unavailable
        | Code::ResourceExhausted
        | Code::Aborted
        | Code::Internal
        | Code::Unknown => PaymentError::Transient(status.message().to_string()),
        _ => PaymentError::Permanent(status.message().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::{Code, Status};

    #[test]
    fn test_transient_codes_classify_as_transient() {
        for code in [
            Code::DeadlineExceeded,
            Code::Unavailable,
            Code::ResourceExhausted,
            Code::Aborted,
            Code::Internal,
            Code::Unknown,
        ] {
            let status = Status::new(code, "downstream hiccup");
            assert!(
                matches!(classify_status(&status), PaymentError::Transient(_)),
                "{code:?} should classify as transient"
            );
        }
    }

    #[test]
    fn test_permanent_codes_classify_as_permanent() {
        for code in [Code::InvalidArgument, Code::FailedPrecondition, Code::NotFound] {
            let status = Status::new(code, "bad request");
            assert!(
                matches!(classify_status(&status), PaymentError::Permanent(_)),
                "{code:?} should classify as permanent"
            );
        }
    }

    #[test]
    fn test_circuit_open_is_transient() {
        assert!(PaymentError::CircuitOpen.is_transient());
    }
}
