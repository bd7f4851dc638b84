use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::{CustomResult, UnrecognizedFormatSnafu};
use crate::models::NewRaceFormat;
use crate::modules::models::general::{attributes, attrs, options, Store};
use crate::modules::models::race_class::RaceType;
use crate::modules::racesync_api::RaceData;

pub const POINTS_LIST: &str = "10,6,4,2,1,0";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinCondition {
    MostProgress,
    FastestLap,
    FastestConsecutive,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBehavior {
    Holeshot,
    FirstLap,
    StaggeredStart,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RaceFormat {
    pub id: i32,
    pub name: String,
    pub win_condition: WinCondition,
    pub race_time_sec: u32,
    pub unlimited_time: bool,
    pub start_behavior: StartBehavior,
    pub team_racing_mode: bool,
    pub points_list: Option<String>,
}

/// the settings a RaceSync scoring format maps to
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RaceSyncFormat {
    pub name: String,
    pub win_condition: WinCondition,
    pub qualifier: bool,
    pub race_time_sec: u32,
    pub unlimited_time: bool,
    pub start_behavior: StartBehavior,
    pub team_racing_mode: bool,
}

impl RaceSyncFormat {
    fn standard(name: &str, win_condition: WinCondition, qualifier: bool) -> RaceSyncFormat {
        RaceSyncFormat {
            name: name.to_string(),
            win_condition,
            qualifier,
            race_time_sec: 120,
            unlimited_time: false,
            start_behavior: StartBehavior::Holeshot,
            team_racing_mode: false,
        }
    }

    pub fn aggregate() -> RaceSyncFormat {
        Self::standard("RaceSync: Aggregate Laps", WinCondition::MostProgress, false)
    }

    pub fn fastest() -> RaceSyncFormat {
        Self::standard("RaceSync: Fastest Lap", WinCondition::FastestLap, false)
    }

    pub fn consecutive() -> RaceSyncFormat {
        Self::standard("RaceSync: Fastest Consecutive Laps", WinCondition::FastestConsecutive, false)
    }

    pub fn global_qualifier() -> RaceSyncFormat {
        Self::standard("RaceSync: Global Qualifier", WinCondition::FastestConsecutive, true)
    }

    /// # from scoring code
    /// translate the RaceSync scoring format code
    ///
    /// ## Arguments
    /// * `scoring_format` - the scoring code of the race
    /// * `race_type` - the race type code of the race
    ///
    /// ## Returns
    /// * `(RaceSyncFormat, u32)` - the format and the consecutive lap base
    pub fn from_scoring_code(scoring_format: &str, race_type: &str) -> CustomResult<(RaceSyncFormat, u32)> {
        let (format, consecutives) = match scoring_format.trim() {
            "0" => (Self::aggregate(), 3),
            "1" => (Self::fastest(), 3),
            "2" => (Self::consecutive(), 3),
            "6" => (Self::consecutive(), 2),
            code => return UnrecognizedFormatSnafu { code }.fail(),
        };

        if RaceType::from_code(race_type) == RaceType::Qualifier {
            return Ok((Self::global_qualifier(), consecutives));
        }

        Ok((format, consecutives))
    }
}

impl RaceFormat {
    /// # ensure exists
    /// find the local format matching a RaceSync format, create it when missing.
    /// qualifier formats only match formats carrying the qualifier attribute.
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `target` - the format to match
    ///
    /// ## Returns
    /// * `i32` - the id of the matched or created format
    pub fn ensure_exists<S: Store>(conn: &mut S, target: &RaceSyncFormat) -> CustomResult<i32> {
        for race_format in conn.race_formats()? {
            if race_format.name != target.name {
                continue;
            }

            if !target.qualifier {
                return Ok(race_format.id);
            }

            let qualifier = conn.race_format_attribute(race_format.id, attributes::FORMAT_QUALIFIER)?;
            if qualifier.as_deref() == Some("1") {
                return Ok(race_format.id);
            }
        }

        let race_format = conn.insert_race_format(NewRaceFormat {
            name: target.name.clone(),
            win_condition: target.win_condition,
            race_time_sec: target.race_time_sec,
            unlimited_time: target.unlimited_time,
            start_behavior: target.start_behavior,
            team_racing_mode: target.team_racing_mode,
            staging_delay_tones: 2,
            staging_fixed_tones: 3,
        })?;
        let qualifier = if target.qualifier { "1" } else { "0" };
        conn.alter_race_format(race_format.id, &attrs(&[(attributes::FORMAT_QUALIFIER, qualifier)]))?;
        info!(target: "race_format:ensure_exists", "Created race format {}", target.name);

        Ok(race_format.id)
    }

    /// # from race data
    /// translate the scoring settings of a RaceSync race into a local format.
    /// an unknown scoring code fails before anything is written.
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `race_data` - the race downloaded from RaceSync
    ///
    /// ## Returns
    /// * `(i32, RaceSyncFormat)` - the local format id and the matched format
    pub fn from_race_data<S: Store>(conn: &mut S, race_data: &RaceData) -> CustomResult<(i32, RaceSyncFormat)> {
        let (format, consecutives) = RaceSyncFormat::from_scoring_code(&race_data.scoring_format, &race_data.race_type)?;
        conn.set_option(options::CONSECUTIVES_COUNT, &consecutives.to_string())?;

        let format_id = Self::ensure_exists(conn, &format)?;
        if race_data.scoring_disabled {
            conn.set_race_format_points(format_id, None)?;
        } else {
            conn.set_race_format_points(format_id, Some(POINTS_LIST))?;
        }

        Ok((format_id, format))
    }
}
