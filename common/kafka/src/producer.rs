use rdkafka::error::KafkaError;
use rdkafka::producer::FutureProducer;
use tracing::debug;

use crate::config::KafkaConfig;
use crate::context::KafkaContext;

/// Build a producer for `config`. No broker round trip happens here; connection
/// problems surface on the first delivery.
pub fn create_kafka_producer(
    config: &KafkaConfig,
    context: KafkaContext,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = config.client_config();
    client_config
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set("compression.codec", &config.kafka_compression_codec);

    debug!("rdkafka producer configuration: {:?}", client_config);
    client_config.create_with_context(context)
}
