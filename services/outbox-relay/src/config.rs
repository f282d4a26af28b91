use std::time::Duration;

/// Relay tuning knobs, one env var each, with sensible production defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_limit: i64,
    pub fanout: usize,
    pub max_attempts: i32,
    pub rpc_deadline: Duration,
    pub query_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval: secs_env("POLL_INTERVAL", 5),
            batch_limit: int_env("BATCH_LIMIT", 10),
            fanout: int_env("FANOUT", 5) as usize,
            max_attempts: int_env("MAX_ATTEMPTS", 5) as i32,
            rpc_deadline: secs_env("RPC_DEADLINE", 5),
            query_timeout: secs_env("QUERY_TIMEOUT", 60),
            shutdown_grace: secs_env("SHUTDOWN_GRACE", 10),
        }
    }
}

fn secs_env(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default_secs),
    )
}

fn int_env(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
