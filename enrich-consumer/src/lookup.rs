use std::fmt;
use std::time;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{ClientBuildError, LookupError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Age,
    Gender,
    Nationality,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::Age => "age",
            LookupKind::Gender => "gender",
            LookupKind::Nationality => "nationality",
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Demographic lookups keyed by given name only.
///
/// The three calls are independent: callers run them concurrently and treat
/// any error as the attribute being absent.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn age(&self, name: &str) -> Result<i32, LookupError>;
    async fn gender(&self, name: &str) -> Result<String, LookupError>;
    async fn nationality(&self, name: &str) -> Result<String, LookupError>;
}

#[derive(Deserialize)]
struct AgeResponse {
    age: Option<i32>,
}

#[derive(Deserialize)]
struct GenderResponse {
    gender: Option<String>,
}

#[derive(Deserialize)]
struct NationalityResponse {
    #[serde(default)]
    country: Vec<CountryProbability>,
    nationality: Option<String>,
}

#[derive(Deserialize)]
struct CountryProbability {
    country_id: String,
    #[serde(default)]
    probability: f64,
}

impl NationalityResponse {
    fn most_likely(self) -> Option<String> {
        self.country
            .into_iter()
            .filter(|c| !c.country_id.is_empty())
            .max_by(|a, b| a.probability.total_cmp(&b.probability))
            .map(|c| c.country_id)
            .or(self.nationality)
            .filter(|n| !n.is_empty())
    }
}

/// `Enricher` over the agify, genderize and nationalize HTTP APIs, or anything
/// answering `GET <url>?name=<name>` with the same JSON shapes.
#[derive(Clone)]
pub struct EnrichmentClient {
    client: reqwest::Client,
    age_url: Url,
    gender_url: Url,
    nationality_url: Url,
}

impl EnrichmentClient {
    /// Every request made by this client is bounded by `request_timeout`.
    pub fn new(
        age_url: &str,
        gender_url: &str,
        nationality_url: &str,
        request_timeout: time::Duration,
    ) -> Result<Self, ClientBuildError> {
        let parse = |kind, url: &str| {
            Url::parse(url).map_err(|error| ClientBuildError::InvalidUrl { kind, error })
        };

        let client = reqwest::Client::builder()
            .user_agent("FIO enrichment consumer")
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            age_url: parse(LookupKind::Age, age_url)?,
            gender_url: parse(LookupKind::Gender, gender_url)?,
            nationality_url: parse(LookupKind::Nationality, nationality_url)?,
        })
    }

    fn url_for(&self, kind: LookupKind, name: &str) -> Url {
        let mut url = match kind {
            LookupKind::Age => self.age_url.clone(),
            LookupKind::Gender => self.gender_url.clone(),
            LookupKind::Nationality => self.nationality_url.clone(),
        };
        url.query_pairs_mut().append_pair("name", name);
        url
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        kind: LookupKind,
        name: &str,
    ) -> Result<T, LookupError> {
        let url = self.url_for(kind, name);
        debug!(%kind, %url, "sending lookup");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| LookupError::Request { kind, error })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status { kind, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| LookupError::Request { kind, error })?;

        serde_json::from_slice(&body).map_err(|error| LookupError::Decode { kind, error })
    }
}

#[async_trait]
impl Enricher for EnrichmentClient {
    async fn age(&self, name: &str) -> Result<i32, LookupError> {
        let kind = LookupKind::Age;
        let response: AgeResponse = self.fetch(kind, name).await?;
        response.age.ok_or(LookupError::Missing { kind })
    }

    async fn gender(&self, name: &str) -> Result<String, LookupError> {
        let kind = LookupKind::Gender;
        let response: GenderResponse = self.fetch(kind, name).await?;
        response
            .gender
            .filter(|g| !g.is_empty())
            .ok_or(LookupError::Missing { kind })
    }

    async fn nationality(&self, name: &str) -> Result<String, LookupError> {
        let kind = LookupKind::Nationality;
        let response: NationalityResponse = self.fetch(kind, name).await?;
        response.most_likely().ok_or(LookupError::Missing { kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer, timeout: time::Duration) -> EnrichmentClient {
        EnrichmentClient::new(
            &server.url("/age"),
            &server.url("/gender"),
            &server.url("/nationality"),
            timeout,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn decodes_each_attribute() {
        let server = MockServer::start_async().await;
        let age = server
            .mock_async(|when, then| {
                when.method(GET).path("/age").query_param("name", "Иван");
                then.status(200)
                    .json_body(json!({"count": 12, "name": "Иван", "age": 42}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gender").query_param("name", "Иван");
                then.status(200).json_body(
                    json!({"count": 12, "name": "Иван", "gender": "male", "probability": 0.99}),
                );
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/nationality").query_param("name", "Иван");
                then.status(200).json_body(json!({
                    "count": 12,
                    "name": "Иван",
                    "country": [
                        {"country_id": "UA", "probability": 0.31},
                        {"country_id": "RU", "probability": 0.52},
                        {"country_id": "BY", "probability": 0.05},
                    ]
                }));
            })
            .await;

        let client = client(&server, time::Duration::from_secs(5));

        assert_eq!(client.age("Иван").await.unwrap(), 42);
        assert_eq!(client.gender("Иван").await.unwrap(), "male");
        assert_eq!(client.nationality("Иван").await.unwrap(), "RU");
        age.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn flat_nationality_is_accepted() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/nationality");
                then.status(200)
                    .json_body(json!({"name": "Иван", "nationality": "RU"}));
            })
            .await;

        let client = client(&server, time::Duration::from_secs(5));
        assert_eq!(client.nationality("Иван").await.unwrap(), "RU");
    }

    #[tokio::test]
    async fn null_attributes_are_missing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/age");
                then.status(200).json_body(json!({"name": "Абв", "age": null}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/nationality");
                then.status(200).json_body(json!({"name": "Абв", "country": []}));
            })
            .await;

        let client = client(&server, time::Duration::from_secs(5));

        assert!(matches!(
            client.age("Абв").await,
            Err(LookupError::Missing {
                kind: LookupKind::Age
            })
        ));
        assert!(matches!(
            client.nationality("Абв").await,
            Err(LookupError::Missing {
                kind: LookupKind::Nationality
            })
        ));
    }

    #[tokio::test]
    async fn shape_mismatch_and_bad_status_are_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/age");
                then.status(200).body("not json");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gender");
                then.status(429).body("slow down");
            })
            .await;

        let client = client(&server, time::Duration::from_secs(5));

        let err = client.age("Иван").await.unwrap_err();
        assert!(matches!(err, LookupError::Decode { .. }));
        assert_eq!(err.kind(), LookupKind::Age);

        let err = client.gender("Иван").await.unwrap_err();
        assert!(matches!(
            err,
            LookupError::Status { status, .. } if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        ));
    }

    #[tokio::test]
    async fn slow_services_time_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/gender");
                then.status(200)
                    .delay(time::Duration::from_millis(500))
                    .json_body(json!({"gender": "male"}));
            })
            .await;

        let client = client(&server, time::Duration::from_millis(50));

        let err = client.gender("Иван").await.unwrap_err();
        assert!(matches!(err, LookupError::Request { .. }));
    }

    #[test]
    fn rejects_invalid_urls() {
        let result = EnrichmentClient::new(
            "not a url",
            "http://localhost/gender",
            "http://localhost/nationality",
            time::Duration::from_secs(1),
        );

        assert!(matches!(
            result,
            Err(ClientBuildError::InvalidUrl {
                kind: LookupKind::Age,
                ..
            })
        ));
    }
}
