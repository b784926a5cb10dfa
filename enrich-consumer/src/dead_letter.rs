use async_trait::async_trait;
use common_kafka::config::KafkaConfig;
use common_kafka::context::KafkaContext;
use common_kafka::producer::create_kafka_producer;
use enrich_common::record::{FailedRecord, RawRecord};
use rdkafka::producer::FutureRecord;
use tracing::debug;

use crate::error::PublishError;

/// Publishes rejected records, with the reason attached, to the dead-letter topic.
#[async_trait]
pub trait DeadLetterRouter: Send + Sync {
    async fn route(&self, original: &RawRecord, reason: &str) -> Result<(), PublishError>;
}

/// Dead-letter publishing over Kafka.
///
/// Every call builds its own producer and drops it once delivery is settled, so a
/// broken dead-letter path never touches the pipeline's consumer.
pub struct KafkaDeadLetterRouter {
    config: KafkaConfig,
    topic: String,
}

impl KafkaDeadLetterRouter {
    pub fn new(config: KafkaConfig, topic: &str) -> Self {
        Self {
            config,
            topic: topic.to_owned(),
        }
    }
}

#[async_trait]
impl DeadLetterRouter for KafkaDeadLetterRouter {
    async fn route(&self, original: &RawRecord, reason: &str) -> Result<(), PublishError> {
        let failed = FailedRecord::new(original, reason);
        let payload = serde_json::to_string(&failed)?;

        let producer = create_kafka_producer(&self.config, KafkaContext::default())
            .map_err(PublishError::Connect)?;

        let delivery = producer
            .send_result(FutureRecord::<(), str>::to(&self.topic).payload(&payload))
            .map_err(|(error, _)| PublishError::Produce(error))?;

        match delivery.await {
            // Canceled when the producer gave up before the broker answered
            Err(_) => Err(PublishError::Canceled),
            Ok(Err((error, _))) => Err(PublishError::Produce(error)),
            Ok(Ok((partition, offset))) => {
                debug!(
                    topic = %self.topic,
                    partition, offset, "published failed record"
                );
                Ok(())
            }
        }
    }
}
