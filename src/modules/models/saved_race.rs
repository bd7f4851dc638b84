use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::errors::{CustomResult, ParseSnafu};
use crate::modules::models::general::{attributes, attrs, Store};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SavedRace {
    pub id: i32,
    pub class_id: i32,
    pub heat_id: i32,
    pub round_id: u32,
}

/// result of one pilot in a saved race, times in milliseconds
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct PilotResult {
    pub pilot_id: i32,
    pub laps: u32,
    pub total_time: f64,
    pub fastest_lap: Option<f64>,
    pub consecutives: Option<f64>,
    /// number of laps the consecutive time covers
    pub consecutives_base: u32,
    pub points: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RankedPilot {
    pub pilot_id: i32,
    pub position: u32,
}

/// pilot id to seat index of the pilots that flew a race
pub type RacePilots = BTreeMap<i32, u32>;

impl SavedRace {
    /// # race pilots
    /// the pilots captured when the race was saved
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `race_id` - the saved race
    ///
    /// ## Returns
    /// * `RacePilots` - empty when nothing was captured
    pub fn race_pilots<S: Store>(conn: &S, race_id: i32) -> CustomResult<RacePilots> {
        match conn.race_attribute(race_id, attributes::RACE_PILOTS)? {
            Some(serialized) if !serialized.trim().is_empty() => {
                serde_json::from_str(&serialized).context(ParseSnafu { service: "race pilots" })
            }
            _ => Ok(RacePilots::new()),
        }
    }

    pub fn set_race_pilots<S: Store>(conn: &mut S, race_id: i32, race_pilots: &RacePilots) -> CustomResult<()> {
        let serialized = serde_json::to_string(race_pilots).context(ParseSnafu { service: "race pilots" })?;
        conn.alter_race(race_id, &attrs(&[(attributes::RACE_PILOTS, serialized)]))
    }

    /// # capture race pilots
    /// store the seats of the race's heat on the saved race
    pub fn capture_race_pilots<S: Store>(conn: &mut S, race: &SavedRace) -> CustomResult<RacePilots> {
        let race_pilots: RacePilots = conn
            .slots_by_heat(race.heat_id)?
            .iter()
            .filter_map(|slot| slot.pilot_id.map(|pilot_id| (pilot_id, slot.node_index)))
            .collect();

        Self::set_race_pilots(conn, race.id, &race_pilots)?;
        Ok(race_pilots)
    }

    /// # remove pilot
    /// exclude a pilot from every future push of the race
    ///
    /// ## Returns
    /// * `bool` - whether the pilot was part of the race
    pub fn remove_pilot<S: Store>(conn: &mut S, race_id: i32, pilot_id: i32) -> CustomResult<bool> {
        let mut race_pilots = Self::race_pilots(conn, race_id)?;
        if race_pilots.remove(&pilot_id).is_none() {
            return Ok(false);
        }

        Self::set_race_pilots(conn, race_id, &race_pilots)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_pilots_serialize_with_string_keys() {
        let race_pilots: RacePilots = [(12, 0), (3, 2)].into_iter().collect();
        let serialized = serde_json::to_string(&race_pilots).unwrap();

        assert_eq!(serialized, r#"{"3":2,"12":0}"#);
        assert_eq!(serde_json::from_str::<RacePilots>(&serialized).unwrap(), race_pilots);
    }
}
