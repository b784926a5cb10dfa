use rdkafka::mocking::MockCluster;
use rdkafka::producer::DefaultProducerContext;

use crate::config::KafkaConfig;

/// Start an in-process mock cluster and a config pointing at it.
/// The cluster shuts down when dropped, so keep it alive for the test's duration.
pub fn create_mock_kafka() -> (MockCluster<'static, DefaultProducerContext>, KafkaConfig) {
    let cluster = MockCluster::new(1).expect("failed to create mock brokers");

    let config = KafkaConfig {
        kafka_hosts: cluster.bootstrap_servers(),
        kafka_tls: false,
        kafka_producer_linger_ms: 0,
        kafka_message_timeout_ms: 5000,
        kafka_compression_codec: "none".to_string(),
    };

    (cluster, config)
}
