use std::collections::BTreeMap;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::errors::{BusySnafu, CustomResult, IntegritySnafu, MissingPilotIdSnafu, NotFoundSnafu};
use crate::macros::store::require_entity;
use crate::modules::fpvscores_api::ResultsMirror;
use crate::modules::helpers::math::Math;
use crate::modules::host::{failed_status_check, Notifier, SystemVerification};
use crate::modules::importer::{event_races, EventRace};
use crate::modules::models::general::{option_enabled, options, Store};
use crate::modules::models::heat::Heat;
use crate::modules::models::pilot::Pilot;
use crate::modules::models::race_class::{RaceClass, RoundType, SyncMode};
use crate::modules::models::saved_race::{PilotResult, SavedRace};
use crate::modules::racesync_api::{PushTask, Ranking, RemoteClient, SlotScore};

pub const DEFAULT_PUSH_POOL_SIZE: usize = 10;

/// how local races are mapped onto RaceSync rounds and heats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingStrategy {
    /// round = heat group + 1, heat = position inside the group
    GroupedHeats,
    /// round = local round, heat = position of the heat in the class
    CountedHeats,
    /// round = stamped ZippyQ round, heat = 1
    ZippyQ,
    /// round = position of the race, heat = 1
    Incremental,
}

/// a saved race with its RaceSync round and heat
#[derive(Debug, Clone, PartialEq)]
pub struct NumberedRace {
    pub race: SavedRace,
    pub round: u32,
    pub heat: u32,
}

impl NumberingStrategy {
    pub fn for_class<S: Store>(conn: &S, race_class: &RaceClass) -> CustomResult<NumberingStrategy> {
        Ok(match RaceClass::sync_mode(conn, race_class.id)? {
            Some(SyncMode::ZippyQ) => NumberingStrategy::ZippyQ,
            Some(SyncMode::Bracket) => NumberingStrategy::Incremental,
            _ if race_class.round_type == RoundType::Grouped => NumberingStrategy::GroupedHeats,
            _ => NumberingStrategy::CountedHeats,
        })
    }

    /// # number races
    /// assign the RaceSync round and heat to every saved race. the numbering
    /// only depends on the races passed in, so repeated calls agree.
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `races` - the saved races of one class ordered by id
    ///
    /// ## Returns
    /// * `Vec<NumberedRace>` - the races in dispatch order
    pub fn number_races<S: Store>(&self, conn: &S, races: &[SavedRace]) -> CustomResult<Vec<NumberedRace>> {
        match self {
            NumberingStrategy::GroupedHeats => number_by_group(conn, races),
            NumberingStrategy::CountedHeats => Ok(number_by_heat(races)),
            NumberingStrategy::ZippyQ => number_by_zippyq_round(conn, races),
            NumberingStrategy::Incremental => Ok(number_incrementally(races)),
        }
    }
}

fn number_by_group<S: Store>(conn: &S, races: &[SavedRace]) -> CustomResult<Vec<NumberedRace>> {
    let mut groups: BTreeMap<u32, Vec<SavedRace>> = BTreeMap::new();
    for race in races {
        match conn.heat_by_id(race.heat_id)? {
            Some(heat) => groups.entry(heat.group_id).or_default().push(race.clone()),
            None => warn!(target: "exporter:number_by_group", "Heat {} of race {} not found, skipping", race.heat_id, race.id),
        }
    }

    let mut numbered = Vec::new();
    for (group_id, mut group) in groups {
        group.sort_by_key(|race| race.heat_id);
        for (index, race) in group.into_iter().enumerate() {
            numbered.push(NumberedRace {
                race,
                round: group_id + 1,
                heat: index as u32 + 1,
            });
        }
    }

    Ok(numbered)
}

fn number_by_heat(races: &[SavedRace]) -> Vec<NumberedRace> {
    let mut buckets: Vec<(i32, Vec<&SavedRace>)> = Vec::new();
    for race in races {
        match buckets.iter_mut().find(|(heat_id, _)| *heat_id == race.heat_id) {
            Some((_, bucket)) => bucket.push(race),
            None => buckets.push((race.heat_id, vec![race])),
        }
    }

    buckets
        .into_iter()
        .enumerate()
        .flat_map(|(index, (_, bucket))| {
            bucket.into_iter().map(move |race| NumberedRace {
                race: race.clone(),
                round: race.round_id,
                heat: index as u32 + 1,
            })
        })
        .collect()
}

fn number_by_zippyq_round<S: Store>(conn: &S, races: &[SavedRace]) -> CustomResult<Vec<NumberedRace>> {
    let mut numbered = Vec::new();
    for race in races {
        if let Some(round) = Heat::zippyq_round(conn, race.heat_id)? {
            numbered.push(NumberedRace {
                race: race.clone(),
                round,
                heat: 1,
            });
        }
    }

    Ok(numbered)
}

fn number_incrementally(races: &[SavedRace]) -> Vec<NumberedRace> {
    let mut sorted = races.to_vec();
    sorted.sort_by_key(|race| race.id);

    sorted
        .into_iter()
        .enumerate()
        .map(|(index, race)| NumberedRace {
            race,
            round: index as u32 + 1,
            heat: 1,
        })
        .collect()
}

/// # slot score
/// the payload pushed for one pilot, a pilot without result only reports 0 laps
pub fn slot_score(racesync_id: &str, result: Option<&PilotResult>, live_url: Option<&str>) -> SlotScore {
    let mut score = SlotScore {
        pilot_id: racesync_id.to_string(),
        live_time_event_url: live_url.map(str::to_string),
        ..Default::default()
    };

    if let Some(result) = result {
        score.score = result.points;
        score.total_laps = result.laps;
        score.total_time = Some(Math::millis_to_seconds(result.total_time));
        score.fastest_lap_time = Some(Math::millis_to_seconds(result.fastest_lap.unwrap_or(0.0)));

        if let Some(consecutives) = result.consecutives {
            match result.consecutives_base {
                3 => score.fastest_3_consecutive_laps_time = Some(Math::millis_to_seconds(consecutives)),
                2 => score.fastest_2_consecutive_laps_time = Some(Math::millis_to_seconds(consecutives)),
                _ => {}
            }
        }
    }

    score
}

/// # race push tasks
/// one task per pilot captured for the race, in ascending pilot id.
/// pilots without RaceSync id are skipped.
///
/// ## Arguments
/// * `conn` - the store
/// * `notifier` - where skipped pilots are reported
/// * `numbered` - the race with its RaceSync round and heat
/// * `race_id` - the RaceSync race
/// * `live_url` - the live results url sent along with every slot
pub fn race_push_tasks<S: Store>(
    conn: &S,
    notifier: &dyn Notifier,
    numbered: &NumberedRace,
    race_id: &str,
    live_url: Option<&str>,
) -> CustomResult<Vec<PushTask>> {
    let race_pilots = SavedRace::race_pilots(conn, numbered.race.id)?;
    let results = conn.race_results(numbered.race.id)?;
    let mut tasks = Vec::new();

    for (pilot_id, node_index) in race_pilots {
        let racesync_id = match Pilot::racesync_id(conn, pilot_id)? {
            Some(racesync_id) => racesync_id,
            None => {
                let callsign = conn
                    .pilot_by_id(pilot_id)?
                    .map(|pilot| pilot.callsign)
                    .unwrap_or_else(|| pilot_id.to_string());
                let message = format!(
                    "{} does not have a RaceSync Pilot ID. Pilot's results will not be pushed...",
                    callsign
                );
                warn!(target: "exporter:race_push_tasks", "{}, skipped", MissingPilotIdSnafu { pilot_id }.build());
                notifier.notify(&message);
                continue;
            }
        };

        let result = results.iter().find(|result| result.pilot_id == pilot_id);
        tasks.push(PushTask {
            race_id: race_id.to_string(),
            round: numbered.round,
            heat: numbered.heat,
            slot: node_index + 1,
            payload: slot_score(racesync_id.trim(), result, live_url),
        });
    }

    Ok(tasks)
}

/// # build push tasks
/// number every saved race of a class and flatten the pilots into tasks
pub fn build_push_tasks<S: Store>(
    conn: &S,
    notifier: &dyn Notifier,
    race_id: &str,
    class_id: i32,
    live_url: Option<&str>,
) -> CustomResult<Vec<PushTask>> {
    let race_class = require_entity!(conn.race_class_by_id(class_id)?, "race class", class_id, "exporter:build_push_tasks");

    let strategy = NumberingStrategy::for_class(conn, &race_class)?;
    let races = conn.races_by_class(class_id)?;
    info!(target: "exporter:build_push_tasks", "Numbering {} races of {} with {:?}", races.len(), race_class.name, strategy);

    let mut tasks = Vec::new();
    for numbered in strategy.number_races(conn, &races)? {
        tasks.extend(race_push_tasks(conn, notifier, &numbered, race_id, live_url)?);
    }

    Ok(tasks)
}

/// # qualifier push checks
/// every system status check must pass before qualifier data leaves the timer
pub fn qualifier_push_checks<S: Store>(
    conn: &mut S,
    notifier: &dyn Notifier,
    verification: &dyn SystemVerification,
) -> CustomResult<()> {
    conn.set_option(options::CONSECUTIVES_COUNT, "3")?;

    if let Some(check) = failed_status_check(verification) {
        let message = format!("Stopping Results push - {}", check);
        notifier.notify(&message);
        warn!(target: "exporter:qualifier_push_checks", "{}", message);
        return IntegritySnafu { reason: check }.fail();
    }

    Ok(())
}

/// # ResultsExporter
/// pushes results and rankings to RaceSync. slot pushes run in parallel,
/// bounded by the push pool size.
pub struct ResultsExporter {
    remote: Arc<dyn RemoteClient>,
    mirror: Option<Arc<dyn ResultsMirror>>,
    push_permits: Arc<Semaphore>,
    active_push: Mutex<()>,
}

impl ResultsExporter {
    pub fn new(remote: Arc<dyn RemoteClient>, mirror: Option<Arc<dyn ResultsMirror>>, pool_size: usize) -> ResultsExporter {
        ResultsExporter {
            remote,
            mirror,
            push_permits: Arc::new(Semaphore::new(pool_size.max(1))),
            active_push: Mutex::new(()),
        }
    }

    pub fn is_pushing(&self) -> bool {
        self.active_push.try_lock().is_err()
    }

    /// # push slot scores
    /// push every task, at most `pool_size` at a time
    ///
    /// ## Arguments
    /// * `tasks` - the tasks in dispatch order
    ///
    /// ## Returns
    /// * `Vec<bool>` - one status per task in dispatch order
    pub async fn push_slot_scores(&self, tasks: Vec<PushTask>) -> Vec<bool> {
        let mut statuses = vec![false; tasks.len()];
        let mut join_set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let permit = match self.push_permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(error) => {
                    error!(target: "exporter:push_slot_scores", "Push pool closed: {}", error);
                    break;
                }
            };
            let remote = self.remote.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let status = match remote.push_slot_and_score(&task).await {
                    Ok(status) => status,
                    Err(error) => {
                        warn!(
                            target: "exporter:push_slot_scores",
                            "Push of round {} heat {} slot {} failed: {}",
                            task.round, task.heat, task.slot, error
                        );
                        false
                    }
                };
                (index, status)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, status)) => statuses[index] = status,
                Err(error) => error!(target: "exporter:push_slot_scores", "Push task failed: {}", error),
            }
        }

        statuses
    }

    async fn slot_score(&self, notifier: &dyn Notifier, tasks: Vec<PushTask>) -> bool {
        let statuses = self.push_slot_scores(tasks).await;

        if !statuses.iter().all(|status| *status) {
            notifier.alert("Results push to RaceSync FAILED.");
            return false;
        }

        true
    }

    /// # push class results
    /// push every saved race of a class to a RaceSync race
    ///
    /// ## Returns
    /// * `bool` - whether every slot was accepted
    pub async fn push_class_results<S: Store>(
        &self,
        conn: &S,
        notifier: &dyn Notifier,
        race_id: &str,
        class_id: i32,
        live_url: Option<&str>,
    ) -> CustomResult<bool> {
        let tasks = build_push_tasks(conn, notifier, race_id, class_id, live_url)?;
        if !self.slot_score(notifier, tasks).await {
            return Ok(false);
        }

        notifier.notify("Results successfully pushed to RaceSync.");
        Ok(true)
    }

    /// # push zippyq race
    /// push the results of a single saved ZippyQ race
    ///
    /// ## Returns
    /// * `bool` - false when the race is not a stamped ZippyQ race or the push failed
    pub async fn push_zippyq_race<S: Store>(
        &self,
        conn: &mut S,
        notifier: &dyn Notifier,
        verification: &dyn SystemVerification,
        saved_race_id: i32,
    ) -> CustomResult<bool> {
        let race = require_entity!(conn.race_by_id(saved_race_id)?, "saved race", saved_race_id, "exporter:push_zippyq_race");

        let mode = RaceClass::sync_mode(conn, race.class_id)?;
        let round = match Heat::zippyq_round(conn, race.heat_id)? {
            Some(round) if mode == Some(SyncMode::ZippyQ) => round,
            _ => return Ok(false),
        };

        if option_enabled(conn, options::QUALIFIER_EVENT)? {
            qualifier_push_checks(conn, notifier, verification)?;
        }

        let race_id = match RaceClass::racesync_race_id(conn, race.class_id)? {
            Some(race_id) => race_id,
            None => return Ok(false),
        };

        notifier.notify("Automatically uploading ZippyQ data to RaceSync...");
        let live_url = self.mirror_event_url(conn).await;
        let numbered = NumberedRace { race, round, heat: 1 };
        let tasks = race_push_tasks(conn, notifier, &numbered, &race_id, live_url.as_deref())?;

        if !self.slot_score(notifier, tasks).await {
            return Ok(false);
        }

        notifier.notify("ZippyQ data successfully pushed to RaceSync.");
        Ok(true)
    }

    /// # push class rankings
    /// push the overall ranking of a class, falling back to its leaderboard
    pub async fn push_class_rankings<S: Store>(
        &self,
        conn: &S,
        notifier: &dyn Notifier,
        race_id: &str,
        class_id: i32,
    ) -> CustomResult<bool> {
        let ranked_pilots = match conn.class_ranking(class_id)? {
            Some(ranked_pilots) => ranked_pilots,
            None => return Ok(false),
        };

        let mut rankings = Vec::new();
        for ranked in ranked_pilots {
            match Pilot::racesync_id(conn, ranked.pilot_id)?.and_then(|id| id.trim().parse::<i64>().ok()) {
                Some(pilot_id) => rankings.push(Ranking {
                    order_number: ranked.position,
                    pilot_id,
                }),
                None => warn!(
                    target: "exporter:push_class_rankings",
                    "Pilot {} does not have a RaceSync Pilot ID. Skipping...", ranked.pilot_id
                ),
            }
        }

        if self.remote.push_overall_results(race_id, &rankings).await? {
            notifier.notify("Rankings pushed to RaceSync");
            return Ok(true);
        }

        notifier.notify("Failed to push rankings to RaceSync");
        Ok(false)
    }

    /// # mirror linked
    /// whether the api key belongs to an organization on the results mirror
    pub async fn mirror_linked(&self, api_key: &str) -> CustomResult<bool> {
        match &self.mirror {
            Some(mirror) => mirror.check_linked_org(api_key).await,
            None => Ok(false),
        }
    }

    async fn mirror_event_url<S: Store>(&self, conn: &S) -> Option<String> {
        let mirror = self.mirror.as_ref()?;
        let event_id = conn
            .option(options::MIRROR_EVENT_ID)
            .ok()
            .flatten()
            .filter(|event_id| !event_id.is_empty())?;

        match mirror.get_event_url(&event_id).await {
            Ok(event_url) => event_url,
            Err(error) => {
                warn!(target: "exporter:mirror_event_url", "{}", error);
                None
            }
        }
    }

    /// # run mirror sync
    /// upload the event to the results mirror before pushing, qualifier events
    /// always mirror
    ///
    /// ## Returns
    /// * `Option<String>` - the live results url of the mirrored event
    async fn run_mirror_sync<S: Store>(&self, conn: &mut S, notifier: &dyn Notifier, qualifier: bool) -> CustomResult<Option<String>> {
        let mirror = match &self.mirror {
            Some(mirror) => mirror.clone(),
            None => return Ok(None),
        };

        if !qualifier && !option_enabled(conn, options::PUSH_MIRROR)? {
            return Ok(None);
        }
        if qualifier {
            conn.set_option(options::PUSH_MIRROR, "1")?;
        }

        notifier.notify("Running a full push to FPVScores. This may take a minute or two...");
        if let Some(event_id) = mirror.run_full_sync(&conn.event_export()?).await? {
            conn.set_option(options::MIRROR_EVENT_ID, &event_id)?;
        }

        match conn.option(options::MIRROR_EVENT_ID)?.filter(|event_id| !event_id.is_empty()) {
            Some(event_id) => mirror.get_event_url(&event_id).await,
            None => {
                notifier.notify("FPVScores event not found, stopping results push");
                NotFoundSnafu { entity: "FPVScores event", id: "" }.fail()
            }
        }
    }

    /// # push event results
    /// push the results of every race of the imported event, followed by the
    /// rankings. refused while another push is running.
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `notifier` - where user facing messages go
    /// * `verification` - system checks required for qualifier events
    ///
    /// ## Returns
    /// * `bool` - whether results and rankings were accepted
    pub async fn push_event_results<S: Store>(
        &self,
        conn: &mut S,
        notifier: &dyn Notifier,
        verification: &dyn SystemVerification,
    ) -> CustomResult<bool> {
        let _guard = match self.active_push.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                notifier.notify("Already working on pushing results. Please wait...");
                return BusySnafu { action: "Results push" }.fail();
            }
        };

        let qualifier = option_enabled(conn, options::QUALIFIER_EVENT)?;
        let races = event_races(conn)?;
        let mut targets = Vec::new();

        if qualifier {
            qualifier_push_checks(conn, notifier, verification)?;
            for race in &races {
                match RaceClass::find_by_racesync_id(conn, &race.race_id)? {
                    Some(race_class) => targets.push((race.race_id.clone(), race_class.id)),
                    None => {
                        notifier.notify("Imported Global Qualifier class not found... aborting results push");
                        return NotFoundSnafu { entity: "qualifier class", id: race.race_id.as_str() }.fail();
                    }
                }
            }
        } else {
            for (index, race) in races.iter().enumerate() {
                match selected_class(conn, options::RESULTS_SELECT_PREFIX, index)? {
                    Some(class_id) => targets.push((race.race_id.clone(), class_id)),
                    None => {
                        notifier.notify(&format!("Choose a class to upload results for {}", race.name));
                        return Ok(false);
                    }
                }
            }
        }

        let live_url = self.run_mirror_sync(conn, notifier, qualifier).await?;
        notifier.notify("Starting to push results to RaceSync...");

        for (race_id, class_id) in &targets {
            if !self.push_class_results(conn, notifier, race_id, *class_id, live_url.as_deref()).await? {
                return Ok(false);
            }
        }

        self.push_event_rankings(conn, notifier, verification, qualifier, &races).await
    }

    async fn push_event_rankings<S: Store>(
        &self,
        conn: &S,
        notifier: &dyn Notifier,
        verification: &dyn SystemVerification,
        qualifier: bool,
        races: &[EventRace],
    ) -> CustomResult<bool> {
        let mut pushed = true;

        for (index, race) in races.iter().enumerate() {
            if qualifier {
                if !verification.capture_race_results(&race.race_id) {
                    notifier.notify("Failed to process Global Qualifier race results");
                    return Ok(false);
                }
                notifier.notify("Successfully processed Global Qualifier race results");
            } else if let Some(class_id) = selected_class(conn, options::RANKS_SELECT_PREFIX, index)? {
                pushed &= self.push_class_rankings(conn, notifier, &race.race_id, class_id).await?;
            }
        }

        Ok(pushed)
    }
}

fn selected_class<S: Store>(conn: &S, prefix: &str, index: usize) -> CustomResult<Option<i32>> {
    Ok(conn
        .option(&format!("{}{}", prefix, index))?
        .and_then(|class_id| class_id.trim().parse::<i32>().ok()))
}
