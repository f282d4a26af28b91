//! Payment RPC client (C4): a thin, circuit-broken wrapper around the
//! generated `PaymentService` tonic client. The outbox relay is the only
//! caller; everything here exists to turn a raw `tonic::Status` into the
//! transient-vs-permanent split the relay's retry loop needs, without the
//! relay having to know anything about gRPC status codes itself.

pub mod config;
pub mod error;
pub mod trace;

pub mod pb {
    tonic::include_proto!("order.payment.v1");
}

use pb::payment_service_client::PaymentServiceClient;
use pb::{PayRequest as PbPayRequest, PayResponse as PbPayResponse};
use resilience::CircuitBreaker;
use tonic::transport::Channel;
use tonic::Request;
use uuid::Uuid;

pub use config::PaymentClientConfig;
pub use error::PaymentError;

#[derive(Debug, Clone)]
pub struct PayRequest {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub amount: f64,
    pub status: String,
    pub event_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct PayResponse {
    pub payment_id: String,
    pub status: String,
}

pub struct PaymentClient {
    client: PaymentServiceClient<Channel>,
    circuit_breaker: CircuitBreaker,
    deadline: std::time::Duration,
}

impl PaymentClient {
    pub async fn connect(config: &PaymentClientConfig) -> Result<Self, PaymentError> {
        let channel = Channel::from_shared(config.target_url.clone())
            .map_err(|e| PaymentError::Permanent(format!("invalid payment service url: {e}")))?
            .connect()
            .await
            .map_err(|e| PaymentError::Transient(format!("failed to dial payment service: {e}")))?;

        let presets = resilience::presets::grpc_config();
        Ok(Self {
            client: PaymentServiceClient::new(channel),
            circuit_breaker: CircuitBreaker::new(presets.circuit_breaker),
            deadline: config.rpc_deadline,
        })
    }

    /// Authorize payment for one order. `event_id` (the outbox entry's id)
    /// doubles as the idempotency key, so a retried call after a timed-out
    /// first attempt is recognized by the payment service as the same
    /// request rather than charged twice.
    pub async fn pay(&self, req: PayRequest) -> Result<PayResponse, PaymentError> {
        let deadline = self.deadline;
        let mut client = self.client.clone();

        self.circuit_breaker
            .call(|| async move {
                let mut tonic_req = Request::new(PbPayRequest {
                    order_id: req.order_id.to_string(),
                    customer_id: req.customer_id.to_string(),
                    amount: req.amount,
                    status: req.status.clone(),
                    event_id: req.event_id.to_string(),
                });
                tonic_req.set_timeout(deadline);
                trace::inject_trace_context(tonic_req.metadata_mut());

                client
                    .pay(tonic_req)
                    .await
                    .map(|r| r.into_inner())
                    .map_err(|status| error::classify_status(&status))
            })
            .await
            .map_err(|cb_err| match cb_err {
                resilience::CircuitBreakerError::Open => PaymentError::CircuitOpen,
                resilience::CircuitBreakerError::CallFailed(msg) => {
                    // CircuitBreaker::call only keeps the Display rendering of the
                    // inner error, not the PaymentError itself, so recover the
                    // transient/permanent split from the message prefix our own
                    // Display impl always writes.
                    if msg.starts_with("permanent payment RPC error:") {
                        PaymentError::Permanent(msg)
                    } else {
                        PaymentError::Transient(msg)
                    }
                }
            })
            .map(|r: PbPayResponse| PayResponse {
                payment_id: r.payment_id,
                status: r.status,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        assert!(PaymentError::Transient("x".into()).is_transient());
        assert!(PaymentError::CircuitOpen.is_transient());
        assert!(!PaymentError::Permanent("x".into()).is_transient());
    }
}
