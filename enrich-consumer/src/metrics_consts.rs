pub const MESSAGES_RECEIVED: &str = "enrichment_messages_received_total";
pub const RECORDS_PERSISTED: &str = "enrichment_records_persisted_total";
pub const RECORDS_DEAD_LETTERED: &str = "enrichment_records_dead_lettered_total";
pub const DEAD_LETTER_PUBLISH_FAILURES: &str = "enrichment_dead_letter_publish_failures_total";
pub const DEAD_LETTER_LOST: &str = "enrichment_dead_letter_lost_total";
pub const LOOKUP_FAILURES: &str = "enrichment_lookup_failures_total";
pub const STORE_FAILURES: &str = "enrichment_store_failures_total";
pub const CYCLE_FAILURES: &str = "enrichment_cycle_failures_total";
pub const CYCLE_DURATION: &str = "enrichment_cycle_duration_seconds";
