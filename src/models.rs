use serde::{Deserialize, Serialize};

use crate::modules::models::race_class::{HeatAdvance, RoundType};
use crate::modules::models::race_format::{StartBehavior, WinCondition};

#[derive(Serialize, Debug, Clone, Deserialize, PartialEq)]
pub struct NewPilot {
    pub name: String,
    pub callsign: String,
}

#[derive(Serialize, Debug, Clone, Deserialize, PartialEq)]
pub struct NewRaceFormat {
    pub name: String,
    pub win_condition: WinCondition,
    pub race_time_sec: u32,
    pub unlimited_time: bool,
    pub start_behavior: StartBehavior,
    pub team_racing_mode: bool,
    pub staging_delay_tones: u32,
    pub staging_fixed_tones: u32,
}

#[derive(Serialize, Debug, Clone, Deserialize, PartialEq)]
pub struct NewRaceClass {
    pub name: String,
    pub description: String,
    pub format_id: i32,
    pub round_type: RoundType,
    pub rounds: u32,
    pub heat_advance: HeatAdvance,
}

#[derive(Serialize, Debug, Clone, Deserialize, PartialEq)]
pub struct UpdateRaceClass {
    pub name: String,
    pub format_id: i32,
    pub rounds: u32,
    pub win_condition: String,
}

#[derive(Serialize, Debug, Clone, Deserialize, PartialEq)]
pub struct NewHeat {
    pub class_id: i32,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct SlotAssignment {
    pub slot_id: i32,
    pub pilot_id: Option<i32>,
}
