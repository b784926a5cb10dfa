use health::HealthHandle;
use rdkafka::consumer::ConsumerContext;
use rdkafka::{ClientContext, Statistics};

/// Client context shared by our producers and consumers.
///
/// librdkafka calls `stats` from its own thread every `statistics.interval.ms`,
/// which makes it a good liveness signal for the client itself.
#[derive(Default)]
pub struct KafkaContext {
    liveness: Option<HealthHandle>,
}

impl From<HealthHandle> for KafkaContext {
    fn from(liveness: HealthHandle) -> Self {
        KafkaContext {
            liveness: Some(liveness),
        }
    }
}

impl ClientContext for KafkaContext {
    fn stats(&self, stats: Statistics) {
        if let Some(liveness) = &self.liveness {
            liveness.report_healthy();
        }

        metrics::gauge!("kafka_client_reply_queue_depth").set(stats.replyq as f64);
        metrics::gauge!("kafka_client_message_count").set(stats.msg_cnt as f64);
    }
}

impl ConsumerContext for KafkaContext {}
