use serde::{Deserialize, Serialize};

use crate::errors::CustomResult;
use crate::modules::models::general::{attributes, Store};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundType {
    /// every run of a heat counts up the round
    Counted,
    /// heats are run in groups, one group per round
    Grouped,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatAdvance {
    None,
    NextHeat,
}

/// how the class schedule is kept in sync with RaceSync
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    PredefinedHeats,
    ZippyQ,
    Bracket,
}

impl SyncMode {
    pub fn code(&self) -> &'static str {
        match self {
            SyncMode::PredefinedHeats => "0",
            SyncMode::ZippyQ => "1",
            SyncMode::Bracket => "2",
        }
    }

    pub fn from_code(code: &str) -> Option<SyncMode> {
        match code {
            "0" => Some(SyncMode::PredefinedHeats),
            "1" => Some(SyncMode::ZippyQ),
            "2" => Some(SyncMode::Bracket),
            _ => None,
        }
    }
}

/// race type code sent by RaceSync
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceType {
    Standard,
    Qualifier,
    Bracket,
}

impl RaceType {
    pub fn from_code(code: &str) -> RaceType {
        match code.trim() {
            "2" => RaceType::Qualifier,
            "3" => RaceType::Bracket,
            _ => RaceType::Standard,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RaceClass {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub format_id: i32,
    pub round_type: RoundType,
    pub rounds: u32,
    pub heat_advance: HeatAdvance,
    /// ranking method, empty when the class is ranked by its leaderboard
    pub win_condition: String,
}

impl RaceClass {
    /// # racesync race id
    /// the RaceSync race the class was imported from
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `class_id` - the class to look up
    ///
    /// ## Returns
    /// * `Option<String>` - the race id, `None` for classes created by hand
    pub fn racesync_race_id<S: Store>(conn: &S, class_id: i32) -> CustomResult<Option<String>> {
        Ok(conn
            .race_class_attribute(class_id, attributes::CLASS_RACE_ID)?
            .filter(|race_id| !race_id.is_empty()))
    }

    pub fn sync_mode<S: Store>(conn: &S, class_id: i32) -> CustomResult<Option<SyncMode>> {
        Ok(conn
            .race_class_attribute(class_id, attributes::CLASS_MODE)?
            .and_then(|code| SyncMode::from_code(&code)))
    }

    pub fn is_qualifier<S: Store>(conn: &S, class_id: i32) -> CustomResult<bool> {
        Ok(conn
            .race_class_attribute(class_id, attributes::CLASS_QUALIFIER)?
            .as_deref()
            == Some("1"))
    }

    /// # find by racesync race id
    /// the first class imported from the given RaceSync race
    pub fn find_by_racesync_id<S: Store>(conn: &S, race_id: &str) -> CustomResult<Option<RaceClass>> {
        for race_class in conn.race_classes()? {
            if Self::racesync_race_id(conn, race_class.id)?.as_deref() == Some(race_id) {
                return Ok(Some(race_class));
            }
        }

        Ok(None)
    }
}
