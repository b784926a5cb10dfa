use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Message, Offset, TopicPartitionList};
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use crate::config::{ConsumerConfig, KafkaConfig};
use crate::context::KafkaContext;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// A message detached from the consumer, so it can be held across awaits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

/// Consumer subscribed to one topic, with offsets committed explicitly per message.
///
/// Nothing is committed on our behalf: a message only counts as consumed once
/// `commit` is called for it. `rewind` moves the in-memory position back so an
/// uncommitted message is fetched again. Both block on the broker, so they run on
/// the blocking pool and give up after `kafka_consumer_commit_timeout_ms`.
pub struct SingleTopicConsumer {
    consumer: Arc<StreamConsumer<KafkaContext>>,
    topic: String,
    commit_timeout: Duration,
}

impl SingleTopicConsumer {
    pub fn new(
        common_config: &KafkaConfig,
        consumer_config: &ConsumerConfig,
        context: KafkaContext,
    ) -> Result<Self, KafkaError> {
        let mut client_config = common_config.client_config();
        client_config
            .set("group.id", &consumer_config.kafka_consumer_group)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set(
                "auto.offset.reset",
                &consumer_config.kafka_consumer_offset_reset,
            );

        debug!("rdkafka consumer configuration: {:?}", client_config);
        let consumer: StreamConsumer<KafkaContext> = client_config.create_with_context(context)?;

        // Fail at startup rather than on the first fetch if brokers are unreachable
        let topic = consumer_config.kafka_consumer_topic.clone();
        consumer.fetch_metadata(Some(&topic), METADATA_TIMEOUT)?;
        consumer.subscribe(&[topic.as_str()])?;

        info!(
            topic = %topic,
            group_id = %consumer_config.kafka_consumer_group,
            "kafka consumer subscribed"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            topic,
            commit_timeout: Duration::from_millis(consumer_config.kafka_consumer_commit_timeout_ms),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message. Does not advance the committed offset.
    pub async fn recv(&self) -> Result<InboundMessage, KafkaError> {
        let message = self.consumer.recv().await?;

        Ok(InboundMessage {
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec),
        })
    }

    /// Commit the group position past `message`, waiting for the broker.
    pub async fn commit(&self, message: &InboundMessage) -> Result<(), KafkaError> {
        let mut list = TopicPartitionList::new();
        list.add_partition_offset(
            &self.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;

        let consumer = self.consumer.clone();
        with_deadline(self.commit_timeout, move || consumer.commit(&list, CommitMode::Sync))
            .await
            .unwrap_or_else(|reason| {
                debug!(reason, "commit did not complete");
                Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::OperationTimedOut))
            })
    }

    /// Move the fetch position back to `message`, so the next `recv` returns it again.
    pub async fn rewind(&self, message: &InboundMessage) -> Result<(), KafkaError> {
        let consumer = self.consumer.clone();
        let topic = self.topic.clone();
        let (partition, offset) = (message.partition, message.offset);
        let timeout = self.commit_timeout;

        with_deadline(timeout, move || {
            consumer.seek(&topic, partition, Offset::Offset(offset), timeout)
        })
        .await
        .unwrap_or_else(|reason| Err(KafkaError::Seek(reason.to_owned())))
    }
}

/// Run a blocking client call on the blocking pool and stop waiting for it after
/// `deadline`. The outer error names why no result came back.
async fn with_deadline<F>(
    deadline: Duration,
    call: F,
) -> Result<Result<(), KafkaError>, &'static str>
where
    F: FnOnce() -> Result<(), KafkaError> + Send + 'static,
{
    match tokio::time::timeout(deadline, spawn_blocking(call)).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(_)) => Err("blocking task failed"),
        Err(_) => Err("timed out"),
    }
}
