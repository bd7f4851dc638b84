use std::collections::BTreeMap;

use crate::errors::CustomResult;
use crate::models::{NewHeat, NewPilot, NewRaceClass, NewRaceFormat, SlotAssignment, UpdateRaceClass};
use crate::modules::models::frequency::FrequencyProfile;
use crate::modules::models::heat::{Heat, Slot};
use crate::modules::models::pilot::Pilot;
use crate::modules::models::race_class::RaceClass;
use crate::modules::models::race_format::{RaceFormat, RaceSyncFormat};
use crate::modules::models::saved_race::{PilotResult, RankedPilot, SavedRace};

/// key/value attribute bag attached to a stored entity
pub type Attributes = BTreeMap<String, String>;

/// attribute keys written by the toolkit
pub mod attributes {
    pub const PILOT_RACESYNC_ID: &str = "racesync_pilot_id";
    pub const PILOT_PHOTO_URL: &str = "PilotDetailPhotoURL";
    pub const PILOT_VELO_UID: &str = "velo_uid";

    pub const FORMAT_QUALIFIER: &str = "gq_format";

    pub const CLASS_RACE_ID: &str = "racesync_race_id";
    pub const CLASS_MODE: &str = "racesync_mode";
    pub const CLASS_QUALIFIER: &str = "gq_class";

    pub const HEAT_PROFILE_ID: &str = "heat_profile_id";
    pub const HEAT_ZIPPYQ_ROUND: &str = "zippyq_round_num";
    pub const HEAT_DOWNLOADED_ZIPPYQ: &str = "downloaded_zippyq";

    pub const RACE_PILOTS: &str = "race_pilots";
}

/// host option keys read or written by the toolkit
pub mod options {
    pub const RACE_ID: &str = "racesync_race_id";
    pub const EVENT_RACES: &str = "racesync_event_races";
    pub const EVENT_NAME: &str = "eventName";
    pub const EVENT_DESCRIPTION: &str = "eventDescription";
    pub const QUALIFIER_EVENT: &str = "global_qualifier_event";
    pub const ZIPPYQ_RACES: &str = "zippyq_races";
    pub const AUTO_ZIPPYQ: &str = "auto_zippyq";
    pub const ACTIVE_IMPORT: &str = "active_import";
    pub const ACTIVE_HEAT: &str = "current_heat";
    pub const CURRENT_PROFILE: &str = "currentProfile";
    pub const CONSECUTIVES_COUNT: &str = "consecutivesCount";
    pub const PUSH_MIRROR: &str = "push_fpvs";
    pub const MIRROR_EVENT_ID: &str = "event_uuid_toolkit";
    pub const RESULTS_SELECT_PREFIX: &str = "results_select_";
    pub const RANKS_SELECT_PREFIX: &str = "ranks_select_";
}

/// # Store
/// the host's entity store. every call is synchronous and the store is only
/// expected to be atomic per record, so callers keep multi-step writes
/// idempotent.
pub trait Store {
    /************ OPTIONS ************/
    fn option(&self, key: &str) -> CustomResult<Option<String>>;
    fn set_option(&mut self, key: &str, value: &str) -> CustomResult<()>;
    /// number of physical seats (receiver nodes) on the timer
    fn seat_count(&self) -> CustomResult<usize>;

    /************ PILOTS ************/
    fn pilot_by_id(&self, pilot_id: i32) -> CustomResult<Option<Pilot>>;
    fn pilot_ids_by_attribute(&self, key: &str, value: &str) -> CustomResult<Vec<i32>>;
    fn insert_pilot(&mut self, new_pilot: NewPilot) -> CustomResult<Pilot>;
    fn pilot_attribute(&self, pilot_id: i32, key: &str) -> CustomResult<Option<String>>;
    fn alter_pilot(&mut self, pilot_id: i32, attributes: &Attributes) -> CustomResult<()>;

    /************ FORMATS ************/
    fn race_formats(&self) -> CustomResult<Vec<RaceFormat>>;
    fn race_format_by_id(&self, format_id: i32) -> CustomResult<Option<RaceFormat>>;
    fn insert_race_format(&mut self, new_format: NewRaceFormat) -> CustomResult<RaceFormat>;
    /// overwrite the name and race settings of a format
    fn update_race_format(&mut self, format_id: i32, settings: &RaceSyncFormat) -> CustomResult<()>;
    fn race_format_attribute(&self, format_id: i32, key: &str) -> CustomResult<Option<String>>;
    fn alter_race_format(&mut self, format_id: i32, attributes: &Attributes) -> CustomResult<()>;
    /// set the position points list, `None` disables points for the format
    fn set_race_format_points(&mut self, format_id: i32, points_list: Option<&str>) -> CustomResult<()>;

    /************ FREQUENCY PROFILES ************/
    fn frequency_profiles(&self) -> CustomResult<Vec<FrequencyProfile>>;
    fn insert_frequency_profile(&mut self, name: &str, frequencies: &str) -> CustomResult<FrequencyProfile>;

    /************ CLASSES ************/
    fn race_classes(&self) -> CustomResult<Vec<RaceClass>>;
    fn race_class_by_id(&self, class_id: i32) -> CustomResult<Option<RaceClass>>;
    fn insert_race_class(&mut self, new_class: NewRaceClass) -> CustomResult<RaceClass>;
    fn update_race_class(&mut self, class_id: i32, update: UpdateRaceClass) -> CustomResult<()>;
    fn race_class_attribute(&self, class_id: i32, key: &str) -> CustomResult<Option<String>>;
    fn alter_race_class(&mut self, class_id: i32, attributes: &Attributes) -> CustomResult<()>;

    /************ HEATS ************/
    fn heats(&self) -> CustomResult<Vec<Heat>>;
    fn heat_by_id(&self, heat_id: i32) -> CustomResult<Option<Heat>>;
    /// heats of a class ordered by id
    fn heats_by_class(&self, class_id: i32) -> CustomResult<Vec<Heat>>;
    /// insert a heat together with one empty slot per seat
    fn insert_heat(&mut self, new_heat: NewHeat) -> CustomResult<Heat>;
    fn heat_attribute(&self, heat_id: i32, key: &str) -> CustomResult<Option<String>>;
    fn alter_heat(&mut self, heat_id: i32, name: Option<&str>, attributes: &Attributes) -> CustomResult<()>;
    /// number of completed rounds for the heat
    fn heat_max_round(&self, heat_id: i32) -> CustomResult<u32>;
    /// slots of a heat ordered by seat index
    fn slots_by_heat(&self, heat_id: i32) -> CustomResult<Vec<Slot>>;
    fn alter_slots(&mut self, assignments: &[SlotAssignment]) -> CustomResult<()>;

    /************ SAVED RACES ************/
    fn races(&self) -> CustomResult<Vec<SavedRace>>;
    fn race_by_id(&self, race_id: i32) -> CustomResult<Option<SavedRace>>;
    /// saved races of a class ordered by id
    fn races_by_class(&self, class_id: i32) -> CustomResult<Vec<SavedRace>>;
    fn race_results(&self, race_id: i32) -> CustomResult<Vec<PilotResult>>;
    fn race_attribute(&self, race_id: i32, key: &str) -> CustomResult<Option<String>>;
    fn alter_race(&mut self, race_id: i32, attributes: &Attributes) -> CustomResult<()>;
    /// overall class ranking, falling back to the primary leaderboard when the
    /// class has no ranking method. `None` when neither is available.
    fn class_ranking(&self, class_id: i32) -> CustomResult<Option<Vec<RankedPilot>>>;
    /// full event export consumed by the results mirror
    fn event_export(&self) -> CustomResult<serde_json::Value>;
}

/// # attributes from pairs
/// build an attribute bag from key/value pairs
///
/// ## Arguments
/// * `pairs` - the key value pairs
///
/// ## Returns
/// * `Attributes` - the attribute bag
pub fn attrs<K: ToString, V: ToString>(pairs: &[(K, V)]) -> Attributes {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// # option flag
/// read an option holding "1" / "0"
pub fn option_enabled<S: Store>(conn: &S, key: &str) -> CustomResult<bool> {
    Ok(conn.option(key)?.as_deref() == Some("1"))
}
