#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use racesync_toolkit::errors::CustomResult;
use racesync_toolkit::modules::coordinator::Coordinator;
use racesync_toolkit::modules::fpvscores_api::ResultsMirror;
use racesync_toolkit::modules::host::{Notifier, SystemVerification};
use racesync_toolkit::modules::racesync_api::{
    AdditionalRounds, PushTask, RaceData, Ranking, RemoteClient,
};

/// RaceSync stand-in that serves canned races and records every push
#[derive(Default)]
pub struct MockRemote {
    pub races: Mutex<HashMap<String, RaceData>>,
    /// additional rounds keyed by the requested start round
    pub rounds: Mutex<HashMap<u32, AdditionalRounds>>,
    pub round_requests: Mutex<Vec<u32>>,
    pub pushes: Mutex<Vec<PushTask>>,
    pub rankings: Mutex<Vec<(String, Vec<Ranking>)>>,
    pub failing_slots: Mutex<HashSet<u32>>,
    pub push_delay: Option<Duration>,
    /// when set, round pulls wait for a permit
    pub rounds_gate: Option<Arc<Semaphore>>,
    /// when set, slot pushes wait for a permit
    pub push_gate: Option<Arc<Semaphore>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockRemote {
    pub fn add_race(&self, race_id: &str, data: Value) {
        let race_data: RaceData = serde_json::from_value(data).unwrap();
        self.races.lock().unwrap().insert(race_id.to_string(), race_data);
    }

    pub fn add_rounds(&self, start_round: u32, data: Value) {
        let rounds: AdditionalRounds = serde_json::from_value(data).unwrap();
        self.rounds.lock().unwrap().insert(start_round, rounds);
    }

    pub fn pushes(&self) -> Vec<PushTask> {
        self.pushes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn pull_chapter(&self, api_key: &str) -> CustomResult<Option<String>> {
        if api_key == "valid-key" {
            Ok(Some("Test Chapter".to_string()))
        } else {
            Ok(None)
        }
    }

    async fn pull_races(&self) -> CustomResult<Option<BTreeMap<String, String>>> {
        Ok(Some(
            self.races
                .lock()
                .unwrap()
                .iter()
                .map(|(race_id, race)| (race_id.clone(), race.name.clone()))
                .collect(),
        ))
    }

    async fn pull_race_data(&self, race_id: &str) -> CustomResult<Option<RaceData>> {
        Ok(self.races.lock().unwrap().get(race_id).cloned())
    }

    async fn pull_additional_rounds(&self, _race_id: &str, round_num: u32) -> CustomResult<Option<AdditionalRounds>> {
        if let Some(gate) = &self.rounds_gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.round_requests.lock().unwrap().push(round_num);
        Ok(self.rounds.lock().unwrap().get(&round_num).cloned())
    }

    async fn push_slot_and_score(&self, task: &PushTask) -> CustomResult<bool> {
        if let Some(gate) = &self.push_gate {
            let _permit = gate.acquire().await.unwrap();
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if let Some(delay) = self.push_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.pushes.lock().unwrap().push(task.clone());
        Ok(!self.failing_slots.lock().unwrap().contains(&task.slot))
    }

    async fn push_overall_results(&self, race_id: &str, rankings: &[Ranking]) -> CustomResult<bool> {
        self.rankings
            .lock()
            .unwrap()
            .push((race_id.to_string(), rankings.to_vec()));
        Ok(true)
    }
}

/// results mirror that hands out a fixed event
#[derive(Default)]
pub struct MockMirror {
    pub syncs: AtomicUsize,
}

#[async_trait]
impl ResultsMirror for MockMirror {
    async fn run_full_sync(&self, _export: &Value) -> CustomResult<Option<String>> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(Some("evt-9".to_string()))
    }

    async fn get_event_url(&self, event_id: &str) -> CustomResult<Option<String>> {
        Ok(Some(format!("https://fpvscores.com/event/{}", event_id)))
    }

    async fn check_linked_org(&self, _api_key: &str) -> CustomResult<bool> {
        Ok(true)
    }
}

#[derive(Default)]
pub struct Recorder {
    pub messages: Mutex<Vec<String>>,
    pub alerts: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn has_message(&self, needle: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|message| message.contains(needle))
    }

    pub fn has_alert(&self, needle: &str) -> bool {
        self.alerts.lock().unwrap().iter().any(|alert| alert.contains(needle))
    }
}

impl Notifier for Recorder {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}

pub struct Verification {
    pub integrity: bool,
    pub status: Vec<(String, bool)>,
    pub captured: Mutex<Vec<String>>,
}

impl Verification {
    pub fn passing() -> Verification {
        Verification {
            integrity: true,
            status: vec![("Timer version".to_string(), true)],
            captured: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(check: &str) -> Verification {
        Verification {
            integrity: false,
            status: vec![(check.to_string(), false)],
            captured: Mutex::new(Vec::new()),
        }
    }
}

impl SystemVerification for Verification {
    fn integrity_check(&self) -> bool {
        self.integrity
    }

    fn system_status(&self) -> Vec<(String, bool)> {
        self.status.clone()
    }

    fn capture_race_results(&self, race_id: &str) -> bool {
        self.captured.lock().unwrap().push(race_id.to_string());
        true
    }
}

pub struct Harness {
    pub remote: Arc<MockRemote>,
    pub notifier: Arc<Recorder>,
    pub coordinator: Coordinator,
}

pub fn harness(remote: MockRemote, mirror: Option<Arc<MockMirror>>, verification: Verification) -> Harness {
    let remote = Arc::new(remote);
    let notifier = Arc::new(Recorder::default());
    let coordinator = Coordinator::new(
        remote.clone(),
        mirror.map(|mirror| mirror as Arc<dyn ResultsMirror>),
        notifier.clone(),
        Arc::new(verification),
        4,
    );

    Harness {
        remote,
        notifier,
        coordinator,
    }
}

const FREQUENCIES: [u32; 4] = [5658, 5695, 5732, 5769];

pub fn entry(pilot_id: u32, seat: usize) -> Value {
    json!({
        "pilotId": pilot_id.to_string(),
        "firstName": "Pilot",
        "lastName": format!("No{}", pilot_id),
        "userName": format!("pilot{}", pilot_id),
        "band": "R",
        "channel": (seat + 1).to_string(),
        "frequency": FREQUENCIES[seat % FREQUENCIES.len()],
    })
}

/// heats of consecutive RaceSync pilot ids, starting at 101
pub fn scheduled_heats(heats: usize, pilots_per_heat: usize) -> Value {
    let heats: Vec<Value> = (0..heats)
        .map(|heat| {
            let entries: Vec<Value> = (0..pilots_per_heat)
                .map(|seat| entry((101 + heat * pilots_per_heat + seat) as u32, seat))
                .collect();
            json!({ "entries": entries })
        })
        .collect();

    Value::Array(heats)
}

/// a race with a two round schedule of two heats of three pilots
pub fn predefined_race(name: &str) -> Value {
    let heats = scheduled_heats(2, 3);
    let entries: Vec<Value> = heats
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|heat| heat["entries"].as_array().unwrap().clone())
        .collect();

    json!({
        "id": "100",
        "name": name,
        "content": "Spring series",
        "scoringFormat": "0",
        "raceType": "1",
        "disableSlotAutoPopulation": "0",
        "childRaceCount": "0",
        "entries": entries,
        "schedule": {
            "rounds": [
                { "name": "Round 1", "heats": heats.clone() },
                { "name": "Round 2", "heats": heats },
            ]
        }
    })
}

pub fn zippyq_race(name: &str) -> Value {
    json!({
        "id": "300",
        "name": name,
        "content": "",
        "scoringFormat": "0",
        "raceType": "1",
        "disableSlotAutoPopulation": "1",
        "childRaceCount": "0",
        "entries": [],
        "schedule": { "rounds": [] }
    })
}

/// a ZippyQ round of one heat, RaceSync reports `current_round` as current
pub fn zippyq_round(current_round: u32, first_pilot: u32) -> Value {
    json!({
        "rounds": [{
            "name": format!("Round {}", current_round),
            "currentRound": current_round.to_string(),
            "heats": [{
                "entries": [entry(first_pilot, 0), entry(first_pilot + 1, 1), entry(first_pilot + 2, 2)]
            }]
        }]
    })
}
