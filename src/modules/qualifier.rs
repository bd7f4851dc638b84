use log::{info, warn};

use crate::errors::CustomResult;
use crate::models::UpdateRaceClass;
use crate::modules::eligibility::Eligibility;
use crate::modules::host::Notifier;
use crate::modules::models::general::{attributes, option_enabled, options, Store};
use crate::modules::models::race_class::RaceClass;
use crate::modules::models::race_format::{RaceFormat, RaceSyncFormat};

/// rounds every Global Qualifier class is flown with
pub const QUALIFIER_ROUNDS: u32 = 10;

/// where the timer got a lap from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapSource {
    Realtime,
    Manual,
    Recalculated,
    Automatic,
    /// laps injected through the host api by another plugin
    Api,
}

fn is_qualifier_format<S: Store>(conn: &S, format_id: i32) -> CustomResult<bool> {
    Ok(conn.race_format_attribute(format_id, attributes::FORMAT_QUALIFIER)?.as_deref() == Some("1"))
}

fn matches_settings(race_format: &RaceFormat, target: &RaceSyncFormat) -> bool {
    race_format.name == target.name
        && race_format.race_time_sec == target.race_time_sec
        && race_format.win_condition == target.win_condition
        && race_format.unlimited_time == target.unlimited_time
        && race_format.start_behavior == target.start_behavior
        && race_format.team_racing_mode == target.team_racing_mode
}

/// # verify format
/// put an edited qualifier format back to the Global Qualifier settings.
/// formats without the qualifier attribute are left alone.
///
/// ## Arguments
/// * `conn` - the store
/// * `format_id` - the altered format
///
/// ## Returns
/// * `bool` - whether the format was rewritten
pub fn verify_format<S: Store>(conn: &mut S, format_id: i32) -> CustomResult<bool> {
    if !is_qualifier_format(conn, format_id)? {
        return Ok(false);
    }

    let race_format = match conn.race_format_by_id(format_id)? {
        Some(race_format) => race_format,
        None => return Ok(false),
    };

    let target = RaceSyncFormat::global_qualifier();
    if matches_settings(&race_format, &target) {
        return Ok(false);
    }

    conn.update_race_format(format_id, &target)?;
    info!(target: "qualifier:verify_format", "Restored Global Qualifier settings of format {}", format_id);

    Ok(true)
}

/// # verify class
/// put an edited qualifier class back to its Global Qualifier name, format,
/// round count and ranking
///
/// ## Arguments
/// * `conn` - the store
/// * `class_id` - the altered class
///
/// ## Returns
/// * `bool` - whether the class was rewritten
pub fn verify_class<S: Store>(conn: &mut S, class_id: i32) -> CustomResult<bool> {
    if !RaceClass::is_qualifier(conn, class_id)? {
        return Ok(false);
    }

    let race_class = match conn.race_class_by_id(class_id)? {
        Some(race_class) => race_class,
        None => return Ok(false),
    };

    let target = RaceSyncFormat::global_qualifier();
    let untouched = race_class.name == target.name
        && race_class.win_condition.is_empty()
        && is_qualifier_format(conn, race_class.format_id)?;
    if untouched {
        return Ok(false);
    }

    let format_id = RaceFormat::ensure_exists(conn, &target)?;
    conn.update_race_class(
        class_id,
        UpdateRaceClass {
            name: target.name.clone(),
            format_id,
            rounds: QUALIFIER_ROUNDS,
            win_condition: String::new(),
        },
    )?;
    info!(target: "qualifier:verify_class", "Restored Global Qualifier settings of class {}", class_id);

    Ok(true)
}

/// # verify classes
/// run [`verify_class`] over every class, used after a format was deleted
///
/// ## Returns
/// * `Vec<i32>` - the ids of the rewritten classes
pub fn verify_classes<S: Store>(conn: &mut S) -> CustomResult<Vec<i32>> {
    let mut rewritten = Vec::new();

    for race_class in conn.race_classes()? {
        if verify_class(conn, race_class.id)? {
            rewritten.push(race_class.id);
        }
    }

    Ok(rewritten)
}

/// # verify lap
/// laps from other plugins are not accepted while a qualifier event is active
pub fn verify_lap<S: Store>(conn: &S, notifier: &dyn Notifier, source: LapSource) -> CustomResult<Eligibility> {
    if source != LapSource::Api || !option_enabled(conn, options::QUALIFIER_EVENT)? {
        return Ok(Eligibility::Allow);
    }

    let reason = "Lap detection through additional plugins is not allowed for Global Qualifiers";
    notifier.alert(reason);
    warn!(target: "qualifier:verify_lap", "{}", reason);

    Ok(Eligibility::Deny(reason.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewRaceClass;
    use crate::modules::memory_store::MemoryStore;
    use crate::modules::models::general::attrs;
    use crate::modules::models::race_class::{HeatAdvance, RoundType};
    use crate::modules::models::race_format::WinCondition;

    struct Silent;

    impl Notifier for Silent {
        fn notify(&self, _message: &str) {}
        fn alert(&self, _message: &str) {}
    }

    fn qualifier_class(store: &mut MemoryStore) -> (i32, i32) {
        let format_id = RaceFormat::ensure_exists(store, &RaceSyncFormat::global_qualifier()).unwrap();
        let race_class = store
            .insert_race_class(NewRaceClass {
                name: RaceSyncFormat::global_qualifier().name,
                description: String::new(),
                format_id,
                round_type: RoundType::Grouped,
                rounds: QUALIFIER_ROUNDS,
                heat_advance: HeatAdvance::NextHeat,
            })
            .unwrap();
        store
            .alter_race_class(race_class.id, &attrs(&[(attributes::CLASS_QUALIFIER, "1")]))
            .unwrap();

        (race_class.id, format_id)
    }

    #[test]
    fn edited_qualifier_format_is_restored() {
        let mut store = MemoryStore::new(4);
        let (_, format_id) = qualifier_class(&mut store);
        let edited = RaceSyncFormat {
            race_time_sec: 90,
            win_condition: WinCondition::MostProgress,
            ..RaceSyncFormat::global_qualifier()
        };
        store.update_race_format(format_id, &edited).unwrap();

        assert!(verify_format(&mut store, format_id).unwrap());
        let restored = store.race_format_by_id(format_id).unwrap().unwrap();
        assert_eq!(restored.race_time_sec, 120);
        assert_eq!(restored.win_condition, WinCondition::FastestConsecutive);
        assert!(!verify_format(&mut store, format_id).unwrap());
    }

    #[test]
    fn plain_formats_may_be_edited() {
        let mut store = MemoryStore::new(4);
        let format_id = RaceFormat::ensure_exists(&mut store, &RaceSyncFormat::fastest()).unwrap();
        let edited = RaceSyncFormat {
            race_time_sec: 60,
            ..RaceSyncFormat::fastest()
        };
        store.update_race_format(format_id, &edited).unwrap();

        assert!(!verify_format(&mut store, format_id).unwrap());
        assert_eq!(store.race_format_by_id(format_id).unwrap().unwrap().race_time_sec, 60);
    }

    #[test]
    fn edited_qualifier_class_is_restored() {
        let mut store = MemoryStore::new(4);
        let (class_id, format_id) = qualifier_class(&mut store);
        let other_format = RaceFormat::ensure_exists(&mut store, &RaceSyncFormat::aggregate()).unwrap();
        store
            .update_race_class(
                class_id,
                UpdateRaceClass {
                    name: "Renamed".to_string(),
                    format_id: other_format,
                    rounds: 3,
                    win_condition: "best_x_rounds".to_string(),
                },
            )
            .unwrap();

        assert_eq!(verify_classes(&mut store).unwrap(), vec![class_id]);
        let restored = store.race_class_by_id(class_id).unwrap().unwrap();
        assert_eq!(restored.name, "RaceSync: Global Qualifier");
        assert_eq!(restored.format_id, format_id);
        assert_eq!(restored.rounds, QUALIFIER_ROUNDS);
        assert!(restored.win_condition.is_empty());
        assert!(!verify_class(&mut store, class_id).unwrap());
    }

    #[test]
    fn api_laps_are_refused_during_qualifiers() {
        let mut store = MemoryStore::new(4);

        assert!(verify_lap(&store, &Silent, LapSource::Api).unwrap().is_allowed());

        store.set_option(options::QUALIFIER_EVENT, "1").unwrap();
        assert!(!verify_lap(&store, &Silent, LapSource::Api).unwrap().is_allowed());
        assert!(verify_lap(&store, &Silent, LapSource::Realtime).unwrap().is_allowed());
    }
}
