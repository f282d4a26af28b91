pub mod config;
pub mod dispatch;
pub mod relay;

pub use config::RelayConfig;
pub use dispatch::{CompositeDispatcher, DeliveryError, OutboxDispatcher};
pub use relay::OutboxRelay;
