use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use snafu::prelude::*;

use crate::errors::{CustomResult, InvalidRaceIdSnafu, NetworkSnafu, ParseSnafu};
use crate::modules::helpers::de;

pub const BASE_API_URL: &str = "https://www.multigp.com/mgp/multigpwebservice";
const SERVICE: &str = "RaceSync";

/// # RemoteClient
/// the calls the toolkit makes against the RaceSync race-management service.
/// `Ok(None)` / `Ok(false)` means the service answered with a failed status,
/// `Err` means the service could not be reached or answered garbage.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// verify the api key and remember it for every following call
    async fn pull_chapter(&self, api_key: &str) -> CustomResult<Option<String>>;
    /// races of the chapter keyed by race id
    async fn pull_races(&self) -> CustomResult<Option<BTreeMap<String, String>>>;
    async fn pull_race_data(&self, race_id: &str) -> CustomResult<Option<RaceData>>;
    /// rounds starting from `round_num`, used for ZippyQ
    async fn pull_additional_rounds(&self, race_id: &str, round_num: u32) -> CustomResult<Option<AdditionalRounds>>;
    async fn push_slot_and_score(&self, task: &PushTask) -> CustomResult<bool>;
    async fn push_overall_results(&self, race_id: &str, rankings: &[Ranking]) -> CustomResult<bool>;
}

/// # RaceSyncApi
/// http implementation of [`RemoteClient`]
pub struct RaceSyncApi {
    http_client: reqwest::Client,
    base_url: String,
    api_key: RwLock<Option<String>>,
    chapter_id: RwLock<Option<String>>,
}

impl RaceSyncApi {
    pub fn new(base_url: &str, timeout: Duration) -> CustomResult<RaceSyncApi> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context(NetworkSnafu { service: SERVICE })?;

        Ok(RaceSyncApi {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: RwLock::new(None),
            chapter_id: RwLock::new(None),
        })
    }

    fn api_key(&self) -> Option<String> {
        self.api_key
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn chapter_id(&self) -> Option<String> {
        self.chapter_id
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// # request and parse
    /// send a request to RaceSync and parse the json answer
    ///
    /// ## Arguments
    /// * `method` - the http method
    /// * `url` - the endpoint
    /// * `payload` - the json body, the api key is added to it
    ///
    /// ## Returns
    /// * `Option<Value>` - the parsed answer, `None` when the status is false
    async fn request_and_parse(&self, method: Method, url: &str, mut payload: Value) -> CustomResult<Option<Value>> {
        if let Value::Object(body) = &mut payload {
            body.insert("apiKey".to_string(), json!(self.api_key()));
        }

        let request_send = Instant::now();
        let response = match self
            .http_client
            .request(method, url)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(target: "racesync_api:request", "Connection with RaceSync failed: {}", error);
                return Err(error).context(NetworkSnafu { service: SERVICE });
            }
        };
        debug!(target: "racesync_api:request", "RaceSync response time: {:?}", request_send.elapsed());

        let body = response.text().await.context(NetworkSnafu { service: SERVICE })?;
        let parsed: Value = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(error) => {
                error!(target: "racesync_api:request", "Error parsing data from RaceSync: {}", error);
                return Err(error).context(ParseSnafu { service: SERVICE });
            }
        };

        if parsed.get("status").and_then(Value::as_bool).unwrap_or(false) {
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    fn parse_data<T: for<'de> Deserialize<'de>>(parsed: Value) -> CustomResult<Option<T>> {
        match parsed.get("data") {
            Some(data) => serde_json::from_value(data.clone())
                .map(Some)
                .context(ParseSnafu { service: SERVICE }),
            None => Ok(None),
        }
    }
}

/// # validate race id
/// race ids are placed in urls, only plain identifiers are accepted
pub fn validate_race_id(race_id: &str) -> CustomResult<&str> {
    let valid = Regex::new(r"^[A-Za-z0-9_-]+$")
        .map(|re| re.is_match(race_id))
        .unwrap_or(false);
    ensure!(valid, InvalidRaceIdSnafu { race_id });

    Ok(race_id)
}

#[async_trait]
impl RemoteClient for RaceSyncApi {
    async fn pull_chapter(&self, api_key: &str) -> CustomResult<Option<String>> {
        *self.api_key.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(api_key.to_string());

        let url = format!("{}/chapter/findChapterFromApiKey", self.base_url);
        let parsed = match self.request_and_parse(Method::POST, &url, json!({})).await? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        let chapter_id = parsed.get("chapterId").map(de::value_to_string);
        *self.chapter_id.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = chapter_id;

        Ok(parsed.get("chapterName").map(de::value_to_string))
    }

    async fn pull_races(&self) -> CustomResult<Option<BTreeMap<String, String>>> {
        let chapter_id = match self.chapter_id() {
            Some(chapter_id) => chapter_id,
            None => {
                warn!(target: "racesync_api:pull_races", "Chapter not verified, pull the chapter first");
                return Ok(None);
            }
        };

        let url = format!("{}/race/listForChapter?chapterId={}", self.base_url, chapter_id);
        let parsed = match self.request_and_parse(Method::POST, &url, json!({})).await? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        let races: Vec<ChildRace> = Self::parse_data(parsed)?.unwrap_or_default();
        Ok(Some(races.into_iter().map(|race| (race.id, race.name)).collect()))
    }

    async fn pull_race_data(&self, race_id: &str) -> CustomResult<Option<RaceData>> {
        let url = format!("{}/race/view?id={}", self.base_url, validate_race_id(race_id)?);
        let parsed = match self.request_and_parse(Method::POST, &url, json!({})).await? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        let race_data: Option<RaceData> = Self::parse_data(parsed)?;
        if let Some(race) = &race_data {
            info!(target: "racesync_api:pull_race_data", "Pulled data for {}", race.chapter_name.as_deref().unwrap_or(&race.name));
        }

        Ok(race_data)
    }

    async fn pull_additional_rounds(&self, race_id: &str, round_num: u32) -> CustomResult<Option<AdditionalRounds>> {
        let url = format!(
            "{}/race/getAdditionalRounds?id={}&startFromRound={}",
            self.base_url,
            validate_race_id(race_id)?,
            round_num
        );
        let parsed = match self.request_and_parse(Method::POST, &url, json!({})).await? {
            Some(parsed) => parsed,
            None => return Ok(None),
        };

        Self::parse_data(parsed)
    }

    async fn push_slot_and_score(&self, task: &PushTask) -> CustomResult<bool> {
        let url = format!(
            "{}/race/assignslot/id/{}/cycle/{}/heat/{}/slot/{}",
            self.base_url,
            validate_race_id(&task.race_id)?,
            task.round,
            task.heat,
            task.slot
        );
        let payload = json!({ "data": task.payload });

        Ok(self.request_and_parse(Method::PUT, &url, payload).await?.is_some())
    }

    async fn push_overall_results(&self, race_id: &str, rankings: &[Ranking]) -> CustomResult<bool> {
        let url = format!(
            "{}/race/captureOverallRaceResult?id={}",
            self.base_url,
            validate_race_id(race_id)?
        );
        let payload = json!({
            "data": { "raceId": race_id, "bracketResults": rankings },
        });

        Ok(self.request_and_parse(Method::PUT, &url, payload).await?.is_some())
    }
}

/************ WIRE TYPES ************/

/// a single unit of work for the push pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushTask {
    pub race_id: String,
    pub round: u32,
    pub heat: u32,
    pub slot: u32,
    pub payload: SlotScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SlotScore {
    #[serde(rename = "pilotId")]
    pub pilot_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(rename = "totalLaps")]
    pub total_laps: u32,
    #[serde(rename = "totalTime", skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    #[serde(rename = "fastestLapTime", skip_serializing_if = "Option::is_none")]
    pub fastest_lap_time: Option<f64>,
    #[serde(rename = "fastest3ConsecutiveLapsTime", skip_serializing_if = "Option::is_none")]
    pub fastest_3_consecutive_laps_time: Option<f64>,
    #[serde(rename = "fastest2ConsecutiveLapsTime", skip_serializing_if = "Option::is_none")]
    pub fastest_2_consecutive_laps_time: Option<f64>,
    #[serde(rename = "liveTimeEventUrl", skip_serializing_if = "Option::is_none")]
    pub live_time_event_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    #[serde(rename = "orderNumber")]
    pub order_number: u32,
    #[serde(rename = "pilotId")]
    pub pilot_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RaceEntry {
    #[serde(rename = "pilotId", default, deserialize_with = "de::opt_string")]
    pub pilot_id: Option<String>,
    #[serde(rename = "firstName", default, deserialize_with = "de::null_default")]
    pub first_name: String,
    #[serde(rename = "lastName", default, deserialize_with = "de::null_default")]
    pub last_name: String,
    #[serde(rename = "userName", default, deserialize_with = "de::null_default")]
    pub user_name: String,
    #[serde(rename = "profilePictureUrl", default, deserialize_with = "de::opt_string")]
    pub profile_picture_url: Option<String>,
    #[serde(rename = "velocidroneUid", default, deserialize_with = "de::opt_string")]
    pub velocidrone_uid: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub band: Option<String>,
    #[serde(default, deserialize_with = "de::opt_u32")]
    pub channel: Option<u32>,
    #[serde(default, deserialize_with = "de::opt_u32")]
    pub frequency: Option<u32>,
}

impl RaceEntry {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScheduledHeat {
    #[serde(default, deserialize_with = "de::null_default")]
    pub entries: Vec<RaceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Round {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub heats: Vec<ScheduledHeat>,
    #[serde(rename = "currentRound", default, deserialize_with = "de::opt_u32")]
    pub current_round: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schedule {
    /// absent when the race has no round data
    #[serde(default)]
    pub rounds: Option<Vec<Round>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChildRace {
    #[serde(deserialize_with = "de::string")]
    pub id: String,
    #[serde(default, deserialize_with = "de::null_default")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RaceData {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "de::null_default")]
    pub content: String,
    #[serde(rename = "chapterName", default, deserialize_with = "de::opt_string")]
    pub chapter_name: Option<String>,
    #[serde(rename = "scoringFormat", default, deserialize_with = "de::string")]
    pub scoring_format: String,
    #[serde(rename = "scoringDisabled", default, deserialize_with = "de::flag")]
    pub scoring_disabled: bool,
    #[serde(rename = "disableSlotAutoPopulation", default, deserialize_with = "de::flag")]
    pub disable_slot_auto_population: bool,
    #[serde(rename = "raceType", default, deserialize_with = "de::string")]
    pub race_type: String,
    #[serde(default, deserialize_with = "de::null_default")]
    pub entries: Vec<RaceEntry>,
    #[serde(default, deserialize_with = "de::null_default")]
    pub schedule: Schedule,
    #[serde(rename = "childRaceCount", default, deserialize_with = "de::u32_value")]
    pub child_race_count: u32,
    #[serde(default, deserialize_with = "de::null_default")]
    pub races: Vec<ChildRace>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AdditionalRounds {
    #[serde(default, deserialize_with = "de::null_default")]
    pub rounds: Vec<Round>,
}

impl AdditionalRounds {
    /// the round the service considers current, read from the first round
    pub fn current_round(&self) -> Option<u32> {
        self.rounds.first().and_then(|round| round.current_round)
    }
}
