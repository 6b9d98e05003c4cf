//! HTTP client for the parsing/matching service.
//!
//! One service exposes three JSON endpoints:
//! - `POST /parse` with the raw document body and its `Content-Type`
//! - `POST /match` with `{record, requirement}`
//! - `POST /profile` with `{handle}`

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::traits::{DocumentParser, Matcher, ProfileAnalyzer};
use super::types::{CollaboratorError, MatchOutcome, ParsedDocument, ProfileInsight};
use crate::metrics::{observe_external_call, PARSER_TOKENS};

const SERVICE: &str = "parsing_service";

/// Client for the parsing service. Implements [`DocumentParser`], [`Matcher`]
/// and [`ProfileAnalyzer`].
pub struct HttpParsingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpParsingClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CollaboratorError> {
        let started = Instant::now();
        let result = self.execute(request).await;
        observe_external_call(
            SERVICE,
            operation,
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CollaboratorError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CollaboratorError::Timeout(self.timeout)
            } else {
                CollaboratorError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ServiceError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    error: String,
}

#[derive(Debug, Serialize)]
struct MatchRequest<'a> {
    record: &'a serde_json::Value,
    requirement: &'a str,
}

#[derive(Debug, Deserialize)]
struct MatchResponse {
    score: f64,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProfileRequest<'a> {
    handle: &'a str,
}

#[async_trait]
impl DocumentParser for HttpParsingClient {
    async fn parse(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<ParsedDocument, CollaboratorError> {
        let request = self
            .post("/parse")
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes.to_vec());

        let parsed: ParsedDocument = self.send("parse", request).await?;
        if !parsed.record.is_object() {
            return Err(CollaboratorError::Malformed(
                "parser record is not a JSON object".to_string(),
            ));
        }

        PARSER_TOKENS
            .with_label_values(&["input"])
            .inc_by(u64::from(parsed.usage.input_tokens));
        PARSER_TOKENS
            .with_label_values(&["output"])
            .inc_by(u64::from(parsed.usage.output_tokens));

        Ok(parsed)
    }
}

#[async_trait]
impl Matcher for HttpParsingClient {
    async fn score(
        &self,
        record: &serde_json::Value,
        requirement: &str,
    ) -> Result<MatchOutcome, CollaboratorError> {
        let request = self.post("/match").json(&MatchRequest {
            record,
            requirement,
        });

        let response: MatchResponse = self.send("match", request).await?;
        if !response.score.is_finite() || !(0.0..=100.0).contains(&response.score) {
            return Err(CollaboratorError::Malformed(format!(
                "match score out of range: {}",
                response.score
            )));
        }

        Ok(MatchOutcome {
            score: response.score.round() as u8,
            rationale: response.rationale,
        })
    }
}

#[async_trait]
impl ProfileAnalyzer for HttpParsingClient {
    async fn analyze(&self, handle: &str) -> Result<ProfileInsight, CollaboratorError> {
        let request = self.post("/profile").json(&ProfileRequest { handle });
        self.send("profile", request).await
    }
}
