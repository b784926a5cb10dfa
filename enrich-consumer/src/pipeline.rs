use std::sync::Arc;
use std::time::{Duration, Instant};

use common_kafka::consumer::InboundMessage;
use enrich_common::record::{EnrichedRecord, RawRecord};
use enrich_common::store::{RecordId, RecordStore, StoreError};
use health::{ComponentStatus, HealthHandle};
use metrics::{counter, histogram};
use rdkafka::error::KafkaError;
use serde_json::Value;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dead_letter::DeadLetterRouter;
use crate::error::{LookupError, PipelineError};
use crate::lookup::{Enricher, LookupKind};
use crate::metrics_consts::{
    CYCLE_DURATION, CYCLE_FAILURES, DEAD_LETTER_LOST, DEAD_LETTER_PUBLISH_FAILURES,
    LOOKUP_FAILURES, MESSAGES_RECEIVED, RECORDS_DEAD_LETTERED, RECORDS_PERSISTED, STORE_FAILURES,
};
use crate::source::RecordSource;
use crate::validator::Validator;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub store_timeout: Duration,
    pub dead_letter_publish_attempts: u32,
    pub dead_letter_retry_interval: Duration,
    pub restart_backoff: Duration,
    /// 0 means the supervisor never gives up.
    pub max_consecutive_failures: u32,
    pub liveness_interval: Duration,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            store_timeout: config.store_timeout.0,
            dead_letter_publish_attempts: config.dead_letter_publish_attempts,
            dead_letter_retry_interval: config.dead_letter_retry_interval.0,
            restart_backoff: config.restart_backoff.0,
            max_consecutive_failures: config.max_consecutive_failures,
            liveness_interval: config.liveness_interval.0,
        }
    }
}

/// How a successfully completed cycle ended. Both variants are acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Persisted(RecordId),
    /// `delivered` is false when every publish attempt failed and the failed record was lost.
    DeadLettered { delivered: bool },
}

/// The fetch, validate, enrich, persist, acknowledge loop.
///
/// One message is in flight at a time. A message is acknowledged once it is stored
/// or dead-lettered; the only exit without acknowledging is a storage failure, which
/// rewinds the source so the same message comes back on the next cycle. If that
/// rewind fails, `run` stops rather than acknowledge anything past the message.
pub struct Pipeline {
    source: Arc<dyn RecordSource>,
    validator: Validator,
    enricher: Arc<dyn Enricher>,
    router: Arc<dyn DeadLetterRouter>,
    store: Arc<dyn RecordStore>,
    config: PipelineConfig,
    liveness: HealthHandle,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn RecordSource>,
        validator: Validator,
        enricher: Arc<dyn Enricher>,
        router: Arc<dyn DeadLetterRouter>,
        store: Arc<dyn RecordStore>,
        config: PipelineConfig,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            source,
            validator,
            enricher,
            router,
            store,
            config,
            liveness,
        }
    }

    /// Supervise cycles until `cancel` fires or too many cycles fail in a row.
    ///
    /// Cancellation is only observed between cycles and while waiting for a message,
    /// so a message being processed is always carried through to the end.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let mut consecutive_failures: u32 = 0;

        loop {
            let Some(fetched) = self.wait_for_message(&cancel).await else {
                break;
            };

            let started = Instant::now();
            let result = self.handle(fetched).await;
            histogram!(CYCLE_DURATION).record(started.elapsed().as_secs_f64());
            self.liveness.report_healthy();

            let Err(error) = result else {
                consecutive_failures = 0;
                continue;
            };

            consecutive_failures += 1;
            counter!(CYCLE_FAILURES, "stage" => error.stage()).increment(1);
            error!(
                error = %error,
                consecutive_failures, "pipeline cycle failed"
            );

            let limit = self.config.max_consecutive_failures;
            if error.is_fatal() || (limit != 0 && consecutive_failures >= limit) {
                self.liveness.report_status(ComponentStatus::Unhealthy);
                return Err(error);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.restart_backoff) => {},
            }
        }

        info!("pipeline stopped");
        Ok(())
    }

    /// Fetch the next message, reporting liveness while the topic is idle.
    /// Returns `None` once `cancel` fires.
    async fn wait_for_message(
        &self,
        cancel: &CancellationToken,
    ) -> Option<Result<InboundMessage, KafkaError>> {
        let fetch = self.source.fetch();
        tokio::pin!(fetch);
        let period = self.config.liveness_interval.max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                fetched = &mut fetch => return Some(fetched),
                _ = heartbeat.tick() => self.liveness.report_healthy(),
            }
        }
    }

    /// Run exactly one cycle.
    pub async fn process_next(&self) -> Result<CycleOutcome, PipelineError> {
        let fetched = self.source.fetch().await;
        self.handle(fetched).await
    }

    async fn handle(
        &self,
        fetched: Result<InboundMessage, KafkaError>,
    ) -> Result<CycleOutcome, PipelineError> {
        let message = fetched.map_err(PipelineError::Fetch)?;
        counter!(MESSAGES_RECEIVED).increment(1);
        debug!(
            partition = message.partition,
            offset = message.offset,
            "fetched message"
        );

        let outcome = match self.route_or_persist(&message).await {
            Ok(outcome) => outcome,
            Err(error) => {
                if let Err(rewind) = self.source.release(&message).await {
                    return Err(PipelineError::Release {
                        offset: message.offset,
                        error: rewind,
                    });
                }
                return Err(error);
            }
        };

        self.source
            .acknowledge(&message)
            .await
            .map_err(PipelineError::Acknowledge)?;

        Ok(outcome)
    }

    async fn route_or_persist(
        &self,
        message: &InboundMessage,
    ) -> Result<CycleOutcome, PipelineError> {
        let raw = match decode(message.payload.as_deref()) {
            Ok(raw) => raw,
            Err((partial, reason)) => return Ok(self.reject(&partial, &reason).await),
        };

        let record = match self.validator.validate(raw.clone()) {
            Ok(record) => record,
            Err(error) => return Ok(self.reject(&raw, &error.to_string()).await),
        };

        let enriched = self.enrich(&record).await;
        let id = self.persist(&enriched).await?;

        Ok(CycleOutcome::Persisted(id))
    }

    /// Dead-letter `original`. Publishing is retried a bounded number of times; after
    /// that the failed record is dropped, and the source message is still acknowledged.
    async fn reject(&self, original: &RawRecord, reason: &str) -> CycleOutcome {
        info!(reason, "routing record to dead-letter topic");

        let attempts = self.config.dead_letter_publish_attempts.max(1);
        for attempt in 1..=attempts {
            match self.router.route(original, reason).await {
                Ok(()) => {
                    counter!(RECORDS_DEAD_LETTERED).increment(1);
                    return CycleOutcome::DeadLettered { delivered: true };
                }
                Err(error) => {
                    counter!(DEAD_LETTER_PUBLISH_FAILURES).increment(1);
                    warn!(attempt, error = %error, "dead-letter publish failed");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.dead_letter_retry_interval).await;
            }
        }

        counter!(DEAD_LETTER_LOST).increment(1);
        error!(
            reason,
            attempts, "giving up on dead-letter publish, failed record is lost"
        );
        CycleOutcome::DeadLettered { delivered: false }
    }

    /// Look up all three attributes at once. Each lookup is its own task and the
    /// record is only assembled after all of them have finished.
    async fn enrich(&self, record: &RawRecord) -> EnrichedRecord {
        let age = {
            let enricher = self.enricher.clone();
            let name = record.name.clone();
            tokio::spawn(async move { enricher.age(&name).await })
        };
        let gender = {
            let enricher = self.enricher.clone();
            let name = record.name.clone();
            tokio::spawn(async move { enricher.gender(&name).await })
        };
        let nationality = {
            let enricher = self.enricher.clone();
            let name = record.name.clone();
            tokio::spawn(async move { enricher.nationality(&name).await })
        };

        let (age, gender, nationality) = tokio::join!(age, gender, nationality);

        EnrichedRecord {
            age: settle(LookupKind::Age, age),
            gender: settle(LookupKind::Gender, gender),
            nationality: settle(LookupKind::Nationality, nationality),
            ..EnrichedRecord::unenriched(record)
        }
    }

    async fn persist(&self, record: &EnrichedRecord) -> Result<RecordId, StoreError> {
        let inserted = tokio::time::timeout(self.config.store_timeout, self.store.insert(record))
            .await
            .unwrap_or(Err(StoreError::Timeout { command: "INSERT" }));

        match inserted {
            Ok(id) => {
                counter!(RECORDS_PERSISTED).increment(1);
                info!(id, "stored enriched record");
                Ok(id)
            }
            Err(error) => {
                counter!(STORE_FAILURES).increment(1);
                error!(error = %error, "failed to store enriched record");
                Err(error)
            }
        }
    }
}

/// On failure, returns whatever identity fields could still be read along with the reason.
fn decode(payload: Option<&[u8]>) -> Result<RawRecord, (RawRecord, String)> {
    let Some(payload) = payload else {
        let reason = "malformed payload: message has no payload".to_owned();
        return Err((RawRecord::default(), reason));
    };

    serde_json::from_slice(payload)
        .map_err(|e| (identity_fields(payload), format!("malformed payload: {}", e)))
}

/// Pull the string identity fields out of a JSON object that did not decode as a whole,
/// e.g. because `age` arrived as a string.
fn identity_fields(payload: &[u8]) -> RawRecord {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(payload) else {
        return RawRecord::default();
    };
    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned()
    };

    RawRecord {
        name: text("name"),
        surname: text("surname"),
        patronymic: text("patronymic"),
        ..Default::default()
    }
}

/// A failed lookup becomes the attribute's empty value.
fn settle<T: Default>(kind: LookupKind, joined: Result<Result<T, LookupError>, JoinError>) -> T {
    let error = match joined {
        Ok(Ok(value)) => return value,
        Ok(Err(error)) => error.to_string(),
        Err(error) => format!("{} lookup task failed: {}", kind, error),
    };

    counter!(LOOKUP_FAILURES, "kind" => kind.as_str()).increment(1);
    warn!(%kind, error = %error, "lookup failed, leaving attribute empty");
    T::default()
}
