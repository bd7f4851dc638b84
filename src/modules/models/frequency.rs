use log::info;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::errors::{CustomResult, ParseSnafu};
use crate::modules::models::general::{options, Store};
use crate::modules::racesync_api::RaceEntry;

const PROFILE_NAME: &str = "RaceSync Profile";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FrequencyProfile {
    pub id: i32,
    pub name: String,
    /// serialized [`FrequencySet`]
    pub frequencies: String,
}

/// band, channel and frequency per seat
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FrequencySet {
    pub b: Vec<Option<String>>,
    pub c: Vec<Option<u32>>,
    pub f: Vec<u32>,
}

impl FrequencySet {
    /// # from entries
    /// build the set of a scheduled heat, unused seats are padded
    ///
    /// ## Arguments
    /// * `entries` - the scheduled pilots of the heat in seat order
    /// * `seat_count` - the number of seats on the timer
    pub fn from_entries(entries: &[RaceEntry], seat_count: usize) -> FrequencySet {
        let mut frequency_set = FrequencySet::default();

        for entry in entries {
            frequency_set.b.push(entry.band.clone());
            frequency_set.c.push(entry.channel);
            frequency_set.f.push(entry.frequency.unwrap_or(0));
        }

        while frequency_set.f.len() < seat_count {
            frequency_set.b.push(None);
            frequency_set.c.push(None);
            frequency_set.f.push(0);
        }

        frequency_set
    }

    pub fn serialize(&self) -> CustomResult<String> {
        serde_json::to_string(self).context(ParseSnafu { service: "frequency profile" })
    }
}

impl FrequencyProfile {
    /// # ensure exists
    /// find a profile with identical content or create a new numbered one.
    /// the matched or created profile becomes the active profile.
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `frequency_set` - the frequencies to match
    ///
    /// ## Returns
    /// * `i32` - the id of the matched or created profile
    pub fn ensure_exists<S: Store>(conn: &mut S, frequency_set: &FrequencySet) -> CustomResult<i32> {
        let serialized = frequency_set.serialize()?;
        let profiles = conn.frequency_profiles()?;

        if let Some(profile) = profiles.iter().find(|profile| profile.frequencies == serialized) {
            conn.set_option(options::CURRENT_PROFILE, &profile.id.to_string())?;
            return Ok(profile.id);
        }

        let mut index = 1;
        while profiles.iter().any(|profile| profile.name == format!("{} {}", PROFILE_NAME, index)) {
            index += 1;
        }

        let profile = conn.insert_frequency_profile(&format!("{} {}", PROFILE_NAME, index), &serialized)?;
        conn.set_option(options::CURRENT_PROFILE, &profile.id.to_string())?;
        info!(target: "frequency:ensure_exists", "Created frequency profile {}", profile.name);

        Ok(profile.id)
    }
}
