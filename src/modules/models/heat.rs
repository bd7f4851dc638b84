use serde::{Deserialize, Serialize};

use crate::errors::CustomResult;
use crate::modules::models::general::{attributes, Store};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Heat {
    pub id: i32,
    pub class_id: i32,
    pub name: String,
    pub group_id: u32,
}

/// a seat of a heat, RaceSync numbers slots from 1 so slot = node_index + 1
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Slot {
    pub id: i32,
    pub heat_id: i32,
    pub node_index: u32,
    pub pilot_id: Option<i32>,
}

impl Heat {
    /// # zippyq round
    /// the RaceSync round stamped on the heat, `None` when missing or zero
    pub fn zippyq_round<S: Store>(conn: &S, heat_id: i32) -> CustomResult<Option<u32>> {
        Ok(conn
            .heat_attribute(heat_id, attributes::HEAT_ZIPPYQ_ROUND)?
            .and_then(|round| round.trim().parse::<u32>().ok())
            .filter(|round| *round > 0))
    }

    pub fn is_downloaded<S: Store>(conn: &S, heat_id: i32) -> CustomResult<bool> {
        Ok(conn
            .heat_attribute(heat_id, attributes::HEAT_DOWNLOADED_ZIPPYQ)?
            .as_deref()
            == Some("1"))
    }

    /// # assigned pilots
    /// pilot ids in seat order, empty seats left out
    pub fn assigned_pilots<S: Store>(conn: &S, heat_id: i32) -> CustomResult<Vec<i32>> {
        Ok(conn
            .slots_by_heat(heat_id)?
            .iter()
            .filter_map(|slot| slot.pilot_id)
            .collect())
    }
}
