use log::{info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::errors::{AlreadyExistsSnafu, CustomResult, IntegritySnafu, NotFoundSnafu, ParseSnafu, SeatCapacitySnafu};
use crate::models::{NewHeat, NewRaceClass, SlotAssignment};
use crate::modules::host::{failed_status_check, Notifier, SystemVerification};
use crate::modules::models::frequency::{FrequencyProfile, FrequencySet};
use crate::modules::models::general::{attributes, attrs, options, Store};
use crate::modules::models::heat::Heat;
use crate::modules::models::pilot::Pilot;
use crate::modules::models::race_class::{HeatAdvance, RaceClass, RaceType, RoundType, SyncMode};
use crate::modules::models::race_format::{RaceFormat, RaceSyncFormat};
use crate::modules::racesync_api::{RaceData, RemoteClient, Round, ScheduledHeat};

/// a RaceSync race that is part of the imported event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventRace {
    #[serde(rename = "racesync_id")]
    pub race_id: String,
    pub name: String,
}

/// # event races
/// the RaceSync races of the imported event in import order
pub fn event_races<S: Store>(conn: &S) -> CustomResult<Vec<EventRace>> {
    match conn.option(options::EVENT_RACES)? {
        Some(serialized) if !serialized.trim().is_empty() => {
            serde_json::from_str(&serialized).context(ParseSnafu { service: "event races" })
        }
        _ => Ok(Vec::new()),
    }
}

/// # run seat check
/// no scheduled heat may hold more pilots than the timer has seats. runs
/// before anything of the schedule is written.
///
/// ## Arguments
/// * `conn` - the store
/// * `notifier` - where the user facing message goes
/// * `rounds` - the scheduled rounds
pub fn run_seat_check<S: Store>(conn: &S, notifier: &dyn Notifier, rounds: &[Round]) -> CustomResult<()> {
    let required = rounds
        .iter()
        .flat_map(|round| round.heats.iter())
        .map(|heat| heat.entries.len())
        .max()
        .unwrap_or(0);
    let available = conn.seat_count()?;

    if required > available {
        let message = "Attempted to import race with more slots than available nodes. \
                       Please decrease the number of slots used on RaceSync";
        notifier.notify(message);
        warn!(target: "importer:run_seat_check", "{} ({} > {})", message, required, available);
        return SeatCapacitySnafu { required, available }.fail();
    }

    Ok(())
}

/// # setup class heats
/// build one heat per scheduled heat, seat the pilots and attach a matching
/// frequency profile to every heat
///
/// ## Arguments
/// * `conn` - the store
/// * `class_id` - the class the heats are added to
/// * `heats` - the scheduled heats
/// * `heat_name` - name for every heat, numbered "Heat N" when `None`
///
/// ## Returns
/// * `Option<Heat>` - the last heat created
pub fn setup_class_heats<S: Store>(
    conn: &mut S,
    class_id: i32,
    heats: &[ScheduledHeat],
    heat_name: Option<&str>,
) -> CustomResult<Option<Heat>> {
    let seat_count = conn.seat_count()?;
    let mut assignments = Vec::new();
    let mut last_heat = None;

    for (heat_index, scheduled) in heats.iter().enumerate() {
        let name = match heat_name {
            Some(name) => name.to_string(),
            None => format!("Heat {}", heat_index + 1),
        };
        let heat = conn.insert_heat(NewHeat { class_id, name })?;
        let slots = conn.slots_by_heat(heat.id)?;

        for (seat, entry) in scheduled.entries.iter().enumerate() {
            if entry.pilot_id.is_none() {
                continue;
            }

            let slot = match slots.get(seat) {
                Some(slot) => slot,
                None => {
                    return SeatCapacitySnafu {
                        required: scheduled.entries.len(),
                        available: slots.len(),
                    }
                    .fail()
                }
            };

            let pilot_id = Pilot::ensure_exists(conn, entry, false)?;
            assignments.push(SlotAssignment {
                slot_id: slot.id,
                pilot_id: Some(pilot_id),
            });
        }

        let frequency_set = FrequencySet::from_entries(&scheduled.entries, seat_count);
        let profile_id = FrequencyProfile::ensure_exists(conn, &frequency_set)?;
        conn.alter_heat(heat.id, None, &attrs(&[(attributes::HEAT_PROFILE_ID, profile_id)]))?;

        last_heat = Some(heat);
    }

    conn.alter_slots(&assignments)?;

    Ok(last_heat)
}

fn scheduled_rounds(race_data: &RaceData) -> Option<&[Round]> {
    race_data
        .schedule
        .rounds
        .as_deref()
        .filter(|rounds| !rounds.is_empty())
}

/// # validate race
/// run every check of [`import_class`] that can fail without writing to the
/// store, so a rejected event leaves nothing behind
///
/// ## Arguments
/// * `conn` - the store
/// * `notifier` - where user facing messages go
/// * `race_data` - the race downloaded from RaceSync
pub fn validate_race<S: Store>(conn: &S, notifier: &dyn Notifier, race_data: &RaceData) -> CustomResult<()> {
    if let Err(error) = RaceSyncFormat::from_scoring_code(&race_data.scoring_format, &race_data.race_type) {
        notifier.notify("Unrecognized RaceSync Format. Stopping Import");
        warn!(target: "importer:validate_race", "{}", error);
        return Err(error);
    }

    if race_data.disable_slot_auto_population {
        return Ok(());
    }

    match scheduled_rounds(race_data) {
        Some(rounds) => run_seat_check(conn, notifier, rounds),
        None => Ok(()),
    }
}

fn stamp_class<S: Store>(conn: &mut S, class_id: i32, race_id: &str, mode: SyncMode, qualifier: bool) -> CustomResult<()> {
    let qualifier = if qualifier { "1" } else { "0" };
    conn.alter_race_class(
        class_id,
        &attrs(&[
            (attributes::CLASS_RACE_ID, race_id),
            (attributes::CLASS_MODE, mode.code()),
            (attributes::CLASS_QUALIFIER, qualifier),
        ]),
    )
}

/// # import class
/// set up a class from a RaceSync race. the race is validated with
/// [`validate_race`] before anything is written.
///
/// ## Arguments
/// * `conn` - the store
/// * `notifier` - where user facing messages go
/// * `race_id` - the RaceSync race id
/// * `race_data` - the race downloaded from RaceSync
///
/// ## Returns
/// * `RaceClass` - the created class
pub fn import_class<S: Store>(
    conn: &mut S,
    notifier: &dyn Notifier,
    race_id: &str,
    race_data: &RaceData,
) -> CustomResult<RaceClass> {
    validate_race(conn, notifier, race_data)?;

    let (format_id, race_format) = RaceFormat::from_race_data(conn, race_data)?;

    for entry in race_data.entries.iter().filter(|entry| entry.pilot_id.is_some()) {
        Pilot::ensure_exists(conn, entry, true)?;
    }

    let mut new_class = NewRaceClass {
        name: race_data.name.clone(),
        description: race_data.content.clone(),
        format_id,
        round_type: RoundType::Grouped,
        rounds: 0,
        heat_advance: HeatAdvance::NextHeat,
    };
    let scheduled_mode = match RaceType::from_code(&race_data.race_type) {
        RaceType::Bracket => SyncMode::Bracket,
        _ => SyncMode::PredefinedHeats,
    };
    let race_class = if race_data.disable_slot_auto_population {
        let zippyq_races = conn
            .option(options::ZIPPYQ_RACES)?
            .and_then(|count| count.trim().parse::<u32>().ok())
            .unwrap_or(0);

        new_class.round_type = RoundType::Counted;
        new_class.rounds = 1;
        new_class.heat_advance = HeatAdvance::None;

        let race_class = conn.insert_race_class(new_class)?;
        stamp_class(conn, race_class.id, race_id, SyncMode::ZippyQ, race_format.qualifier)?;
        conn.set_option(options::ZIPPYQ_RACES, &(zippyq_races + 1).to_string())?;
        info!(target: "importer:import_class", "Imported ZippyQ class {}", race_class.name);

        race_class
    } else if let Some(rounds) = scheduled_rounds(race_data) {
        new_class.rounds = rounds.len() as u32;
        let race_class = conn.insert_race_class(new_class)?;
        stamp_class(conn, race_class.id, race_id, scheduled_mode, race_format.qualifier)?;
        setup_class_heats(conn, race_class.id, &rounds[0].heats, None)?;
        info!(target: "importer:import_class", "Imported class {} with {} heats", race_class.name, rounds[0].heats.len());

        race_class
    } else {
        let race_class = conn.insert_race_class(new_class)?;
        stamp_class(conn, race_class.id, race_id, scheduled_mode, race_format.qualifier)?;
        info!(target: "importer:import_class", "Imported class {} without schedule", race_class.name);

        race_class
    };

    Ok(race_class)
}

/// # import pilots
/// create or refresh every pilot registered for a RaceSync race
///
/// ## Returns
/// * `usize` - the number of pilots imported
pub async fn import_pilots<S: Store>(
    conn: &mut S,
    remote: &dyn RemoteClient,
    notifier: &dyn Notifier,
    race_id: &str,
) -> CustomResult<usize> {
    let race_data = match remote.pull_race_data(race_id).await? {
        Some(race_data) => race_data,
        None => {
            notifier.notify("Bad race data");
            return NotFoundSnafu { entity: "RaceSync race", id: race_id }.fail();
        }
    };

    let mut imported = 0;
    for entry in race_data.entries.iter().filter(|entry| entry.pilot_id.is_some()) {
        Pilot::ensure_exists(conn, entry, true)?;
        imported += 1;
    }

    notifier.notify("Pilots imported");
    Ok(imported)
}

/// # import event
/// import a RaceSync race, or every child race of an event, into an empty
/// store and record the event options
///
/// ## Arguments
/// * `conn` - the store, must not hold races, heats or classes
/// * `remote` - the RaceSync client
/// * `notifier` - where user facing messages go
/// * `verification` - system checks required for qualifier events
/// * `race_id` - the RaceSync race or event id
///
/// ## Returns
/// * `Vec<RaceClass>` - the created classes in import order
pub async fn import_event<S: Store>(
    conn: &mut S,
    remote: &dyn RemoteClient,
    notifier: &dyn Notifier,
    verification: &dyn SystemVerification,
    race_id: &str,
) -> CustomResult<Vec<RaceClass>> {
    let occupied = !conn.races()?.is_empty()
        || !conn.heats()?.is_empty()
        || !conn.race_classes()?.is_empty()
        || conn.option(options::RACE_ID)?.map_or(false, |selected| !selected.is_empty());
    if occupied {
        let message = "Archive Race, Heat, and Class data before importing a new event";
        notifier.alert(message);
        return AlreadyExistsSnafu { details: message }.fail();
    }

    let race_data = match remote.pull_race_data(race_id).await? {
        Some(race_data) => race_data,
        None => return NotFoundSnafu { entity: "RaceSync race", id: race_id }.fail(),
    };

    let qualifier = RaceType::from_code(&race_data.race_type) == RaceType::Qualifier;
    if qualifier {
        info!(target: "importer:import_event", "Importing qualifier race");
        if let Some(check) = failed_status_check(verification) {
            let message = format!("Global Qualifier not imported - {}", check);
            notifier.notify(&message);
            warn!(target: "importer:import_event", "{}", message);
            return IntegritySnafu { reason: check }.fail();
        }
    }

    // every race of the event is downloaded and validated before the first write
    let mut pending = Vec::new();
    if race_data.child_race_count > 0 {
        for child in &race_data.races {
            let child_data = match remote.pull_race_data(&child.id).await? {
                Some(child_data) => child_data,
                None => return NotFoundSnafu { entity: "RaceSync race", id: child.id.as_str() }.fail(),
            };
            let event_race = EventRace {
                race_id: child.id.clone(),
                name: child.name.clone(),
            };
            pending.push((event_race, child_data));
        }
    } else {
        let event_race = EventRace {
            race_id: race_id.to_string(),
            name: race_data.name.clone(),
        };
        pending.push((event_race, race_data.clone()));
    }

    for (_, data) in &pending {
        validate_race(conn, notifier, data)?;
    }

    let mut classes = Vec::new();
    let mut races = Vec::new();
    for (event_race, data) in pending {
        classes.push(import_class(conn, notifier, &event_race.race_id, &data)?);
        races.push(event_race);
    }

    let serialized = serde_json::to_string(&races).context(ParseSnafu { service: "event races" })?;
    conn.set_option(options::RACE_ID, race_id)?;
    conn.set_option(options::EVENT_NAME, &race_data.name)?;
    conn.set_option(options::EVENT_DESCRIPTION, &race_data.content)?;
    conn.set_option(options::QUALIFIER_EVENT, if qualifier { "1" } else { "0" })?;
    conn.set_option(options::EVENT_RACES, &serialized)?;

    notifier.notify("RaceSync event imported.");
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::modules::memory_store::MemoryStore;
    use crate::modules::racesync_api::{RaceEntry, Schedule};

    struct Silent;

    impl Notifier for Silent {
        fn notify(&self, _message: &str) {}
        fn alert(&self, _message: &str) {}
    }

    fn entry(pilot_id: &str, frequency: u32) -> RaceEntry {
        RaceEntry {
            pilot_id: Some(pilot_id.to_string()),
            first_name: "Pilot".to_string(),
            last_name: pilot_id.to_string(),
            user_name: format!("pilot{}", pilot_id),
            band: Some("R".to_string()),
            frequency: Some(frequency),
            ..Default::default()
        }
    }

    fn round(entries: Vec<Vec<RaceEntry>>) -> Round {
        Round {
            heats: entries.into_iter().map(|entries| ScheduledHeat { entries }).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn seat_check_rejects_oversized_heats() {
        let store = MemoryStore::new(2);
        let rounds = vec![round(vec![vec![entry("1", 5658), entry("2", 5695), entry("3", 5732)]])];

        assert!(run_seat_check(&store, &Silent, &rounds).is_err());
        assert!(run_seat_check(&store, &Silent, &[]).is_ok());
    }

    #[test]
    fn seat_check_covers_every_heat() {
        let store = MemoryStore::new(2);
        let rounds = vec![round(vec![
            vec![entry("1", 5658), entry("2", 5695)],
            vec![entry("3", 5658), entry("4", 5695), entry("5", 5732)],
        ])];

        match run_seat_check(&store, &Silent, &rounds) {
            Err(Error::SeatCapacityError { required, available }) => {
                assert_eq!((required, available), (3, 2));
            }
            other => panic!("unexpected seat check result: {:?}", other),
        }
    }

    #[test]
    fn oversized_later_heat_writes_nothing() {
        let mut store = MemoryStore::new(2);
        let race_data = RaceData {
            name: "Open".to_string(),
            scoring_format: "0".to_string(),
            entries: vec![entry("1", 5658)],
            schedule: Schedule {
                rounds: Some(vec![round(vec![
                    vec![entry("1", 5658)],
                    vec![entry("2", 5658), entry("3", 5695), entry("4", 5732)],
                ])]),
            },
            ..Default::default()
        };

        assert!(validate_race(&store, &Silent, &race_data).is_err());
        assert!(import_class(&mut store, &Silent, "100", &race_data).is_err());
        assert!(store.race_classes().unwrap().is_empty());
        assert!(store.heats().unwrap().is_empty());
        assert!(store.race_formats().unwrap().is_empty());
        assert!(store.pilot_by_id(1).unwrap().is_none());
    }

    #[test]
    fn unrecognized_format_writes_nothing() {
        let mut store = MemoryStore::new(4);
        let race_data = RaceData {
            name: "Bad".to_string(),
            scoring_format: "9".to_string(),
            entries: vec![entry("1", 5658)],
            ..Default::default()
        };

        assert!(import_class(&mut store, &Silent, "100", &race_data).is_err());
        assert!(store.race_classes().unwrap().is_empty());
        assert!(store.race_formats().unwrap().is_empty());
        assert!(store.pilot_by_id(1).unwrap().is_none());
    }

    #[test]
    fn zippyq_races_get_an_empty_counted_class() {
        let mut store = MemoryStore::new(4);
        let race_data = RaceData {
            name: "ZippyQ Night".to_string(),
            scoring_format: "0".to_string(),
            disable_slot_auto_population: true,
            ..Default::default()
        };

        let race_class = import_class(&mut store, &Silent, "200", &race_data).unwrap();

        assert_eq!(race_class.round_type, RoundType::Counted);
        assert_eq!(race_class.rounds, 1);
        assert_eq!(race_class.heat_advance, HeatAdvance::None);
        assert_eq!(RaceClass::sync_mode(&store, race_class.id).unwrap(), Some(SyncMode::ZippyQ));
        assert_eq!(store.option(options::ZIPPYQ_RACES).unwrap().as_deref(), Some("1"));
        assert!(store.heats().unwrap().is_empty());
    }

    #[test]
    fn bracket_races_are_tagged() {
        let mut store = MemoryStore::new(4);
        let race_data = RaceData {
            name: "Finals".to_string(),
            scoring_format: "1".to_string(),
            race_type: "3".to_string(),
            ..Default::default()
        };

        let race_class = import_class(&mut store, &Silent, "300", &race_data).unwrap();

        assert_eq!(race_class.rounds, 0);
        assert_eq!(RaceClass::sync_mode(&store, race_class.id).unwrap(), Some(SyncMode::Bracket));
        assert_eq!(RaceClass::racesync_race_id(&store, race_class.id).unwrap().as_deref(), Some("300"));
    }

    #[test]
    fn heats_without_pilot_ids_keep_their_frequencies() {
        let mut store = MemoryStore::new(3);
        let mut open_seat = entry("1", 5732);
        open_seat.pilot_id = None;
        let heats = vec![ScheduledHeat {
            entries: vec![entry("7", 5658), open_seat],
        }];
        let race_class = store
            .insert_race_class(NewRaceClass {
                name: "Open".to_string(),
                description: String::new(),
                format_id: 0,
                round_type: RoundType::Grouped,
                rounds: 1,
                heat_advance: HeatAdvance::NextHeat,
            })
            .unwrap();

        let heat = setup_class_heats(&mut store, race_class.id, &heats, None).unwrap().unwrap();

        assert_eq!(heat.name, "Heat 1");
        assert_eq!(Heat::assigned_pilots(&store, heat.id).unwrap().len(), 1);
        let profile = &store.frequency_profiles().unwrap()[0];
        assert_eq!(profile.frequencies, r#"{"b":["R","R",null],"c":[null,null,null],"f":[5658,5732,0]}"#);
        assert_eq!(
            store.heat_attribute(heat.id, attributes::HEAT_PROFILE_ID).unwrap(),
            Some(profile.id.to_string())
        );
    }
}
