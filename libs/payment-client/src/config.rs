use std::time::Duration;

/// Grounded on `grpc-clients`' `GrpcConfig::from_env` — one URL env var with a
/// development-friendly default, plus a numeric timeout override.
#[derive(Debug, Clone)]
pub struct PaymentClientConfig {
    pub target_url: String,
    pub rpc_deadline: Duration,
}

impl PaymentClientConfig {
    pub fn from_env() -> Self {
        let target_url = std::env::var("PAYMENT_SERVICE_URL")
            .unwrap_or_else(|_| "http://payment-service:9090".to_string());
        let rpc_deadline = std::env::var("RPC_DEADLINE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_secs(5));

        Self {
            target_url,
            rpc_deadline,
        }
    }
}
