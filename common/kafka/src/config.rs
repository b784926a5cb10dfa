use envconfig::Envconfig;
use rdkafka::ClientConfig;

#[derive(Envconfig, Clone, Debug)]
pub struct KafkaConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying a produce

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd
}

impl KafkaConfig {
    /// Settings shared by every client we create against this cluster.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.kafka_hosts)
            .set("statistics.interval.ms", "10000");

        if self.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };
        client_config
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct ConsumerConfig {
    pub kafka_consumer_group: String,
    pub kafka_consumer_topic: String,

    // "earliest" replays whatever the group has not committed yet on a fresh deploy
    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest

    #[envconfig(default = "5000")]
    pub kafka_consumer_commit_timeout_ms: u64, // Deadline for a commit or a seek
}

impl ConsumerConfig {
    /// Group and topic depend on the service, so they have no derive default.
    /// Services call this before loading their config to fill in their own.
    pub fn set_defaults(consumer_group: &str, consumer_topic: &str) {
        if std::env::var("KAFKA_CONSUMER_GROUP").is_err() {
            std::env::set_var("KAFKA_CONSUMER_GROUP", consumer_group);
        };
        if std::env::var("KAFKA_CONSUMER_TOPIC").is_err() {
            std::env::set_var("KAFKA_CONSUMER_TOPIC", consumer_topic);
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_settings_only_when_enabled() {
        let mut config = KafkaConfig {
            kafka_hosts: "kafka:9092".to_string(),
            kafka_tls: false,
            kafka_producer_linger_ms: 0,
            kafka_message_timeout_ms: 1000,
            kafka_compression_codec: "none".to_string(),
        };

        let plain = config.client_config();
        assert_eq!(plain.get("bootstrap.servers"), Some("kafka:9092"));
        assert_eq!(plain.get("security.protocol"), None);

        config.kafka_tls = true;
        let tls = config.client_config();
        assert_eq!(tls.get("security.protocol"), Some("ssl"));
    }
}
