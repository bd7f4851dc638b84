use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};
use snafu::prelude::*;

use crate::errors::{CustomResult, NetworkSnafu};
use crate::modules::helpers::de;

pub const BASE_API_URL: &str = "https://api.fpvscores.com/rh/0.1.0/";
const SERVICE: &str = "FPVScores";
const FULL_SYNC_TIMEOUT: Duration = Duration::from_secs(600);

/// # ResultsMirror
/// secondary service that mirrors the whole event for live results
#[async_trait]
pub trait ResultsMirror: Send + Sync {
    /// upload the full event export, returns the event id assigned by the mirror
    async fn run_full_sync(&self, export: &Value) -> CustomResult<Option<String>>;
    /// public url of a mirrored event
    async fn get_event_url(&self, event_id: &str) -> CustomResult<Option<String>>;
    /// whether the RaceSync api key is linked to an organization on the mirror
    async fn check_linked_org(&self, api_key: &str) -> CustomResult<bool>;
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SyncResponse {
    #[serde(default, deserialize_with = "de::opt_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    message: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    event_uuid: Option<String>,
}

pub struct FpvScoresApi {
    http_client: reqwest::Client,
    base_url: String,
}

impl FpvScoresApi {
    pub fn new(base_url: &str, timeout: Duration) -> CustomResult<FpvScoresApi> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("rhconnect"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context(NetworkSnafu { service: SERVICE })?;

        Ok(FpvScoresApi {
            http_client,
            base_url: base_url.to_string(),
        })
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}?action={}", self.base_url, action)
    }

    async fn post(&self, action: &str, payload: &Value, timeout: Option<Duration>) -> CustomResult<(u16, String)> {
        let mut request = self.http_client.post(self.action_url(action)).json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let request_send = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(target: "fpvscores_api:post", "Connection with FPVScores failed: {}", error);
                return Err(error).context(NetworkSnafu { service: SERVICE });
            }
        };
        debug!(target: "fpvscores_api:post", "FPVScores response time: {:?}", request_send.elapsed());

        let status = response.status().as_u16();
        let body = response.text().await.context(NetworkSnafu { service: SERVICE })?;

        Ok((status, body))
    }
}

/// # parse sync response
/// the mirror answers with an object or a list holding one object
fn parse_sync_response(body: &str) -> Option<SyncResponse> {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(error) => {
            error!(target: "fpvscores_api:parse_sync_response", "Failed to parse server response: {} Response: {}", error, body);
            return None;
        }
    };

    let parsed = match parsed {
        Value::Array(mut list) if !list.is_empty() => list.swap_remove(0),
        other => other,
    };

    serde_json::from_value(parsed).ok()
}

#[async_trait]
impl ResultsMirror for FpvScoresApi {
    async fn run_full_sync(&self, export: &Value) -> CustomResult<Option<String>> {
        info!(target: "fpvscores_api:run_full_sync", "Running a full push to FPVScores");
        let (_, body) = self.post("full_manual_import", export, Some(FULL_SYNC_TIMEOUT)).await?;

        let response = match parse_sync_response(&body) {
            Some(response) => response,
            None => return Ok(None),
        };

        match (response.status.as_deref(), &response.message) {
            (Some("error"), Some(message)) => error!(target: "fpvscores_api:run_full_sync", "FPVScores: {}", message),
            (_, Some(message)) => info!(target: "fpvscores_api:run_full_sync", "FPVScores: {}", message),
            _ => warn!(target: "fpvscores_api:run_full_sync", "FPVScores: Unexpected response format"),
        }

        Ok(response.event_uuid)
    }

    async fn get_event_url(&self, event_id: &str) -> CustomResult<Option<String>> {
        let (status, body) = self
            .post("fpvs_get_event_url", &json!({ "event_uuid": event_id }), None)
            .await?;

        if status == 200 && body.trim() != "no event found" {
            info!(target: "fpvscores_api:get_event_url", "FPVScores event URL: {}", body);
            return Ok(Some(body.trim().to_string()));
        }

        Ok(None)
    }

    async fn check_linked_org(&self, api_key: &str) -> CustomResult<bool> {
        let (status, body) = self
            .post("mgp_api_check", &json!({ "mgp_api_key": api_key }), None)
            .await?;

        if status != 200 {
            return Ok(false);
        }

        // the answer may be preceded by diagnostic lines
        let last_line = body.lines().last().unwrap_or_default();
        Ok(serde_json::from_str::<Value>(last_line)
            .ok()
            .and_then(|data| data.get("exist").map(de::value_to_string))
            .as_deref()
            == Some("true"))
    }
}
