use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::{CustomResult, NotFoundSnafu};
use crate::models::NewPilot;
use crate::modules::models::general::{attributes, attrs, Store};
use crate::modules::racesync_api::RaceEntry;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pilot {
    pub id: i32,
    pub name: String,
    pub callsign: String,
}

impl Pilot {
    pub fn get_by_racesync_id<S: Store>(conn: &S, racesync_id: &str) -> CustomResult<Option<Pilot>> {
        match conn.pilot_ids_by_attribute(attributes::PILOT_RACESYNC_ID, racesync_id)?.first() {
            Some(pilot_id) => conn.pilot_by_id(*pilot_id),
            None => Ok(None),
        }
    }

    /// # racesync id
    /// the RaceSync pilot id stored on a local pilot
    pub fn racesync_id<S: Store>(conn: &S, pilot_id: i32) -> CustomResult<Option<String>> {
        Ok(conn
            .pilot_attribute(pilot_id, attributes::PILOT_RACESYNC_ID)?
            .filter(|racesync_id| !racesync_id.trim().is_empty()))
    }

    /// # ensure exists
    /// match a RaceSync pilot with a local pilot by RaceSync id, creating the
    /// pilot when no match is found. new pilots and refreshed pilots get the
    /// RaceSync id, photo and Velocidrone id stamped in one write.
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `entry` - the pilot as sent by RaceSync
    /// * `refresh` - rewrite the attributes of an already matched pilot
    ///
    /// ## Returns
    /// * `i32` - the id of the matched or created pilot
    pub fn ensure_exists<S: Store>(conn: &mut S, entry: &RaceEntry, refresh: bool) -> CustomResult<i32> {
        let racesync_id = match &entry.pilot_id {
            Some(racesync_id) => racesync_id.clone(),
            None => {
                return NotFoundSnafu {
                    entity: "RaceSync pilot id",
                    id: entry.display_name(),
                }
                .fail()
            }
        };

        let pilot_id = match Self::get_by_racesync_id(conn, &racesync_id)? {
            Some(pilot) if !refresh => return Ok(pilot.id),
            Some(pilot) => {
                debug!(target: "pilot:ensure_exists", "Refreshing pilot {}", pilot.callsign);
                pilot.id
            }
            None => {
                let pilot = conn.insert_pilot(NewPilot {
                    name: entry.display_name(),
                    callsign: entry.user_name.clone(),
                })?;
                info!(target: "pilot:ensure_exists", "Created pilot {} ({})", pilot.callsign, racesync_id);
                pilot.id
            }
        };

        let mut pilot_attributes = attrs(&[(attributes::PILOT_RACESYNC_ID, racesync_id.as_str())]);
        if let Some(photo_url) = &entry.profile_picture_url {
            pilot_attributes.insert(attributes::PILOT_PHOTO_URL.to_string(), photo_url.clone());
        }
        if let Some(velo_uid) = &entry.velocidrone_uid {
            pilot_attributes.insert(attributes::PILOT_VELO_UID.to_string(), velo_uid.clone());
        }
        conn.alter_pilot(pilot_id, &pilot_attributes)?;

        Ok(pilot_id)
    }
}
