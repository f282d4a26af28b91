use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("kafka client error: {0}")]
    Client(#[from] rdkafka::error::KafkaError),

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("message had no payload")]
    EmptyPayload,

    #[error("message payload was not valid utf-8")]
    InvalidUtf8,
}
