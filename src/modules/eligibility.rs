use log::warn;

use crate::errors::CustomResult;
use crate::modules::host::{Notifier, SystemVerification};
use crate::modules::models::general::{options, Store};
use crate::modules::models::heat::Heat;
use crate::modules::models::race_class::{RaceClass, SyncMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Allow,
    Deny(String),
}

impl Eligibility {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Eligibility::Allow)
    }
}

fn callsign<S: Store>(conn: &S, pilot_id: i32) -> CustomResult<String> {
    Ok(conn
        .pilot_by_id(pilot_id)?
        .map(|pilot| pilot.callsign)
        .unwrap_or_else(|| pilot_id.to_string()))
}

/// seats of the heat hold distinct pilots, at least one and three for qualifiers
fn pilot_checks<S: Store>(conn: &S, heat: &Heat, qualifier: bool) -> CustomResult<Option<String>> {
    let mut heat_pilots: Vec<i32> = Vec::new();

    for pilot_id in Heat::assigned_pilots(conn, heat.id)? {
        if heat_pilots.contains(&pilot_id) {
            return Ok(Some(format!(
                "{} occupies more than one slot in current heat",
                callsign(conn, pilot_id)?
            )));
        }
        heat_pilots.push(pilot_id);
    }

    if heat_pilots.is_empty() {
        return Ok(Some(format!("No pilots assigned to {}", heat.name)));
    }

    if qualifier && heat_pilots.len() < 3 {
        return Ok(Some("GQ Rules: At least 3 pilots are required to start the race".to_string()));
    }

    Ok(None)
}

/// no heat may start while an earlier heat has not flown, and no heat may
/// run ahead of another heat of the class
fn sequential_round_check<S: Store>(conn: &S, heat: &Heat) -> CustomResult<Option<String>> {
    let completed = conn.heat_max_round(heat.id)?;

    for other in conn.heats_by_class(heat.class_id)? {
        if other.id == heat.id {
            continue;
        }

        let other_completed = conn.heat_max_round(other.id)?;
        if other.id < heat.id && other_completed == 0 {
            return Ok(Some(format!(
                "Complete round 1 of {} before starting {}",
                other.name, heat.name
            )));
        }

        if completed > other_completed {
            return Ok(Some(format!(
                "Run {} before starting {}'s next round",
                other.name, heat.name
            )));
        }
    }

    Ok(None)
}

fn repeat_check<S: Store>(conn: &S, heat: &Heat) -> CustomResult<Option<String>> {
    if conn.heat_max_round(heat.id)? > 0 {
        return Ok(Some("RaceSync Race Type: Round cannot be repeated".to_string()));
    }

    Ok(None)
}

/// walking back from the newest heat, no earlier heat may be left unflown
fn zippyq_order_check<S: Store>(conn: &S, heat: &Heat) -> CustomResult<Option<String>> {
    for other in conn.heats_by_class(heat.class_id)?.iter().rev() {
        let completed = conn.heat_max_round(other.id)?;

        if other.id < heat.id && completed == 0 {
            return Ok(Some(format!(
                "ZippyQ: Complete {} before starting {}",
                other.name, heat.name
            )));
        }

        if completed != 0 {
            break;
        }
    }

    Ok(None)
}

/// # check heat
/// decide whether a heat of an imported class may start. checks run in a
/// fixed order and the first failure is alerted and returned.
///
/// ## Arguments
/// * `conn` - the store
/// * `notifier` - where the deny reason is alerted
/// * `verification` - integrity attestation for qualifier classes
/// * `heat_id` - the heat about to start
///
/// ## Returns
/// * `Eligibility` - `Allow` for heats outside of imported classes
pub fn check_heat<S: Store>(
    conn: &S,
    notifier: &dyn Notifier,
    verification: &dyn SystemVerification,
    heat_id: i32,
) -> CustomResult<Eligibility> {
    if conn.option(options::RACE_ID)?.map_or(true, |race_id| race_id.is_empty()) {
        return Ok(Eligibility::Allow);
    }

    let heat = match conn.heat_by_id(heat_id)? {
        Some(heat) => heat,
        None => return Ok(Eligibility::Allow),
    };

    if RaceClass::racesync_race_id(conn, heat.class_id)?.is_none() {
        return Ok(Eligibility::Allow);
    }

    let qualifier = RaceClass::is_qualifier(conn, heat.class_id)?;
    let mut reason = pilot_checks(conn, &heat, qualifier)?;

    if reason.is_none() {
        reason = match RaceClass::sync_mode(conn, heat.class_id)? {
            Some(SyncMode::ZippyQ) => match repeat_check(conn, &heat)? {
                Some(reason) => Some(reason),
                None => zippyq_order_check(conn, &heat)?,
            },
            Some(SyncMode::Bracket) => repeat_check(conn, &heat)?,
            Some(SyncMode::PredefinedHeats) | None => sequential_round_check(conn, &heat)?,
        };
    }

    if reason.is_none() && qualifier && !verification.integrity_check() {
        reason = Some(
            "Your system's codebase has been modified and is not approved to run Global Qualifier races"
                .to_string(),
        );
    }

    match reason {
        Some(reason) => {
            notifier.alert(&reason);
            warn!(target: "eligibility:check_heat", "Heat {} denied: {}", heat.id, reason);
            Ok(Eligibility::Deny(reason))
        }
        None => Ok(Eligibility::Allow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewHeat, NewRaceClass};
    use crate::modules::memory_store::MemoryStore;
    use crate::modules::models::general::{attributes, attrs};
    use crate::modules::models::race_class::{HeatAdvance, RoundType};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Alerts(Mutex<Vec<String>>);

    impl Notifier for Alerts {
        fn notify(&self, _message: &str) {}
        fn alert(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    struct Attestation(bool);

    impl SystemVerification for Attestation {
        fn integrity_check(&self) -> bool {
            self.0
        }
        fn system_status(&self) -> Vec<(String, bool)> {
            Vec::new()
        }
        fn capture_race_results(&self, _race_id: &str) -> bool {
            true
        }
    }

    fn imported_class(store: &mut MemoryStore, mode: SyncMode, qualifier: bool, heats: usize) -> Vec<i32> {
        store.set_option(options::RACE_ID, "500").unwrap();
        let race_class = store
            .insert_race_class(NewRaceClass {
                name: "Imported".to_string(),
                description: String::new(),
                format_id: 1,
                round_type: RoundType::Grouped,
                rounds: 2,
                heat_advance: HeatAdvance::NextHeat,
            })
            .unwrap();
        store
            .alter_race_class(
                race_class.id,
                &attrs(&[
                    (attributes::CLASS_RACE_ID, "500"),
                    (attributes::CLASS_MODE, mode.code()),
                    (attributes::CLASS_QUALIFIER, if qualifier { "1" } else { "0" }),
                ]),
            )
            .unwrap();

        (0..heats)
            .map(|index| {
                let heat = store
                    .insert_heat(NewHeat {
                        class_id: race_class.id,
                        name: format!("Heat {}", index + 1),
                    })
                    .unwrap();
                for seat in 0..3 {
                    store
                        .seat_pilot(heat.id, seat, Some((index * 3) as i32 + seat as i32 + 1))
                        .unwrap();
                }
                heat.id
            })
            .collect()
    }

    #[test]
    fn duplicate_pilot_is_denied() {
        let mut store = MemoryStore::new(4);
        let heats = imported_class(&mut store, SyncMode::PredefinedHeats, false, 1);
        store.seat_pilot(heats[0], 3, Some(1)).unwrap();
        let alerts = Alerts::default();

        let eligibility = check_heat(&store, &alerts, &Attestation(true), heats[0]).unwrap();

        assert!(!eligibility.is_allowed());
        assert_eq!(alerts.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn heats_outside_imported_events_are_allowed() {
        let store = MemoryStore::new(4);

        assert_eq!(check_heat(&store, &Alerts::default(), &Attestation(false), 1).unwrap(), Eligibility::Allow);
    }

    #[test]
    fn empty_heat_is_denied() {
        let mut store = MemoryStore::new(4);
        let heats = imported_class(&mut store, SyncMode::PredefinedHeats, false, 1);
        for seat in 0..3 {
            store.seat_pilot(heats[0], seat, None).unwrap();
        }

        assert!(!check_heat(&store, &Alerts::default(), &Attestation(true), heats[0]).unwrap().is_allowed());
    }

    #[test]
    fn predefined_heats_run_in_order() {
        let mut store = MemoryStore::new(4);
        let heats = imported_class(&mut store, SyncMode::PredefinedHeats, false, 2);
        let alerts = Alerts::default();

        assert!(!check_heat(&store, &alerts, &Attestation(true), heats[1]).unwrap().is_allowed());
        assert!(check_heat(&store, &alerts, &Attestation(true), heats[0]).unwrap().is_allowed());

        store.save_race(heats[0], 1, Vec::new()).unwrap();
        assert!(check_heat(&store, &alerts, &Attestation(true), heats[1]).unwrap().is_allowed());
        // heat 1 may not start round 2 before heat 2 finished round 1
        assert_eq!(
            check_heat(&store, &alerts, &Attestation(true), heats[0]).unwrap(),
            Eligibility::Deny("Run Heat 2 before starting Heat 1's next round".to_string())
        );
    }

    #[test]
    fn predefined_heats_start_the_next_round_once_every_heat_flew() {
        let mut store = MemoryStore::new(4);
        let heats = imported_class(&mut store, SyncMode::PredefinedHeats, false, 2);
        let alerts = Alerts::default();
        store.save_race(heats[0], 1, Vec::new()).unwrap();
        store.save_race(heats[1], 1, Vec::new()).unwrap();

        assert!(check_heat(&store, &alerts, &Attestation(true), heats[1]).unwrap().is_allowed());
        assert!(check_heat(&store, &alerts, &Attestation(true), heats[0]).unwrap().is_allowed());

        store.save_race(heats[0], 2, Vec::new()).unwrap();
        assert!(check_heat(&store, &alerts, &Attestation(true), heats[1]).unwrap().is_allowed());
        assert!(alerts.0.lock().unwrap().is_empty());
    }

    #[test]
    fn zippyq_heats_are_not_repeated() {
        let mut store = MemoryStore::new(4);
        let heats = imported_class(&mut store, SyncMode::ZippyQ, false, 2);
        let alerts = Alerts::default();

        assert!(!check_heat(&store, &alerts, &Attestation(true), heats[1]).unwrap().is_allowed());
        store.save_race(heats[0], 1, Vec::new()).unwrap();
        assert!(!check_heat(&store, &alerts, &Attestation(true), heats[0]).unwrap().is_allowed());
        assert!(check_heat(&store, &alerts, &Attestation(true), heats[1]).unwrap().is_allowed());
    }

    #[test]
    fn qualifier_classes_need_attestation() {
        let mut store = MemoryStore::new(4);
        let heats = imported_class(&mut store, SyncMode::ZippyQ, true, 1);

        assert!(!check_heat(&store, &Alerts::default(), &Attestation(false), heats[0]).unwrap().is_allowed());
        assert!(check_heat(&store, &Alerts::default(), &Attestation(true), heats[0]).unwrap().is_allowed());
    }

    #[test]
    fn qualifier_classes_need_three_pilots() {
        let mut store = MemoryStore::new(4);
        let heats = imported_class(&mut store, SyncMode::ZippyQ, true, 1);
        store.seat_pilot(heats[0], 2, None).unwrap();

        let eligibility = check_heat(&store, &Alerts::default(), &Attestation(true), heats[0]).unwrap();

        assert_eq!(
            eligibility,
            Eligibility::Deny("GQ Rules: At least 3 pilots are required to start the race".to_string())
        );
    }
}
