use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An identity record as it travels through the input and dead-letter topics.
///
/// The wire format always carries every field. Enrichment fields and `err`
/// are only meaningful on re-emitted records, and default to empty on input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub surname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub patronymic: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub age: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gender: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nationality: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub err: String,
}

/// A validated record with its demographic attributes, ready to be stored.
///
/// A zero `age` or an empty `gender`/`nationality` means that lookup failed.
/// That degrades the record but never keeps it out of storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub name: String,
    pub surname: String,
    #[serde(default)]
    pub patronymic: String,
    #[serde(default)]
    pub age: i32,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub nationality: String,
}

impl EnrichedRecord {
    /// Start from the identity fields of `raw`, with no attributes filled in yet.
    pub fn unenriched(raw: &RawRecord) -> Self {
        Self {
            name: raw.name.clone(),
            surname: raw.surname.clone(),
            patronymic: raw.patronymic.clone(),
            ..Default::default()
        }
    }
}

/// A rejected record on its way to the dead-letter topic. Never stored.
///
/// Serializes exactly like a `RawRecord`, with `err` holding the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FailedRecord(RawRecord);

impl FailedRecord {
    pub const UNSPECIFIED_REASON: &'static str = "unspecified failure";

    /// Keep everything the original carried and attach `reason`, which is never left empty.
    pub fn new(original: &RawRecord, reason: &str) -> Self {
        let reason = if reason.trim().is_empty() {
            Self::UNSPECIFIED_REASON
        } else {
            reason
        };
        FailedRecord(RawRecord {
            err: reason.to_owned(),
            ..original.clone()
        })
    }

    pub fn reason(&self) -> &str {
        &self.0.err
    }

    pub fn record(&self) -> &RawRecord {
        &self.0
    }
}

/// A stored record and the identifier the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersistedRow {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub patronymic: String,
    pub age: i32,
    pub gender: String,
    pub nationality: String,
}

impl PersistedRow {
    pub fn new(id: i64, record: EnrichedRecord) -> Self {
        Self {
            id,
            name: record.name,
            surname: record.surname,
            patronymic: record.patronymic,
            age: record.age,
            gender: record.gender,
            nationality: record.nationality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_messages_may_omit_or_null_fields() {
        let record: RawRecord =
            serde_json::from_value(json!({"name": "Иван", "surname": "Петров", "age": null}))
                .unwrap();

        assert_eq!(record.name, "Иван");
        assert_eq!(record.surname, "Петров");
        assert_eq!(record.patronymic, "");
        assert_eq!(record.age, 0);
        assert_eq!(record.err, "");
    }

    #[test]
    fn failed_record_keeps_original_fields_and_reason() {
        let original = RawRecord {
            surname: "Петров".to_owned(),
            ..Default::default()
        };

        let failed = FailedRecord::new(&original, "missing required fields");

        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "name": "",
                "surname": "Петров",
                "patronymic": "",
                "age": 0,
                "gender": "",
                "nationality": "",
                "err": "missing required fields",
            })
        );
    }

    #[test]
    fn failed_record_reason_is_never_empty() {
        let failed = FailedRecord::new(&RawRecord::default(), "  ");
        assert_eq!(failed.reason(), FailedRecord::UNSPECIFIED_REASON);
    }

    #[test]
    fn unenriched_drops_attributes_from_the_wire() {
        let raw = RawRecord {
            name: "Иван".to_owned(),
            surname: "Петров".to_owned(),
            patronymic: "Сергеевич".to_owned(),
            age: 40,
            gender: "male".to_owned(),
            nationality: "RU".to_owned(),
            err: "stale".to_owned(),
        };

        let record = EnrichedRecord::unenriched(&raw);

        assert_eq!(record.name, "Иван");
        assert_eq!(record.patronymic, "Сергеевич");
        assert_eq!(record.age, 0);
        assert_eq!(record.gender, "");
        assert_eq!(record.nationality, "");
    }
}
