use async_trait::async_trait;
use common_kafka::consumer::{InboundMessage, SingleTopicConsumer};
use rdkafka::error::KafkaError;

/// Where the pipeline pulls messages from, one at a time.
///
/// A fetched message stays owned by the caller until it calls `acknowledge`
/// (consumed for good) or `release` (fetch it again next time).
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self) -> Result<InboundMessage, KafkaError>;
    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), KafkaError>;
    async fn release(&self, message: &InboundMessage) -> Result<(), KafkaError>;
}

#[async_trait]
impl RecordSource for SingleTopicConsumer {
    async fn fetch(&self) -> Result<InboundMessage, KafkaError> {
        self.recv().await
    }

    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), KafkaError> {
        self.commit(message).await
    }

    async fn release(&self, message: &InboundMessage) -> Result<(), KafkaError> {
        self.rewind(message).await
    }
}
