use log::{info, warn};
use tokio::sync::Mutex;

use crate::errors::{BusySnafu, CustomResult, NoMoreRoundsSnafu, NotFoundSnafu};
use crate::macros::store::require_entity;
use crate::modules::host::Notifier;
use crate::modules::importer::{run_seat_check, setup_class_heats};
use crate::modules::models::general::{attributes, attrs, option_enabled, options, Store};
use crate::modules::models::heat::Heat;
use crate::modules::models::race_class::{RaceClass, SyncMode};
use crate::modules::racesync_api::{AdditionalRounds, RemoteClient};

/// # last round
/// the ZippyQ round stamped on the last heat of the class, 0 without heats
pub fn last_round<S: Store>(conn: &S, class_id: i32) -> CustomResult<u32> {
    match conn.heats_by_class(class_id)?.last() {
        Some(heat) => Ok(Heat::zippyq_round(conn, heat.id)?.unwrap_or(0)),
        None => Ok(0),
    }
}

/// # assign zippyq round
/// number a heat that was added by hand after the previous heat of its class.
/// downloaded heats keep the round RaceSync assigned.
///
/// ## Arguments
/// * `conn` - the store
/// * `heat_id` - the added heat
///
/// ## Returns
/// * `Option<u32>` - the assigned round, `None` for downloaded heats
pub fn assign_zippyq_round<S: Store>(conn: &mut S, heat_id: i32) -> CustomResult<Option<u32>> {
    let heat = require_entity!(conn.heat_by_id(heat_id)?, "heat", heat_id, "zippyq:assign_zippyq_round");

    if Heat::is_downloaded(conn, heat_id)? {
        return Ok(None);
    }

    let previous_round = match conn
        .heats_by_class(heat.class_id)?
        .iter()
        .rev()
        .find(|class_heat| class_heat.id != heat_id)
    {
        Some(previous) => Heat::zippyq_round(conn, previous.id)?.unwrap_or(0),
        None => 0,
    };
    let round_num = previous_round + 1;

    let name = match RaceClass::sync_mode(conn, heat.class_id)? {
        Some(SyncMode::ZippyQ) => Some(format!("Round {}", round_num)),
        _ => None,
    };
    conn.alter_heat(heat_id, name.as_deref(), &attrs(&[(attributes::HEAT_ZIPPYQ_ROUND, round_num)]))?;

    Ok(Some(round_num))
}

/// # activate imported heat
/// make a freshly imported heat the active heat when the user asked for it
pub fn activate_imported_heat<S: Store>(conn: &mut S, heat: &Heat) -> CustomResult<bool> {
    if !option_enabled(conn, options::ACTIVE_IMPORT)? {
        return Ok(false);
    }

    conn.set_option(options::ACTIVE_HEAT, &heat.id.to_string())?;
    Ok(true)
}

/// # ZippyQFetcher
/// downloads ZippyQ rounds one at a time. a single fetch may be in flight
/// for the whole process, a second fetch fails with a busy error.
#[derive(Debug, Default)]
pub struct ZippyQFetcher {
    fetch_lock: Mutex<()>,
}

impl ZippyQFetcher {
    pub fn new() -> ZippyQFetcher {
        ZippyQFetcher::default()
    }

    pub fn is_busy(&self) -> bool {
        self.fetch_lock.try_lock().is_err()
    }

    /// # fetch next round
    /// download the round after the last stamped round of a ZippyQ class
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `remote` - the RaceSync client
    /// * `notifier` - where user facing messages go
    /// * `class_id` - the ZippyQ class
    ///
    /// ## Returns
    /// * `Heat` - the heat created for the round
    pub async fn fetch_next_round<S: Store>(
        &self,
        conn: &mut S,
        remote: &dyn RemoteClient,
        notifier: &dyn Notifier,
        class_id: i32,
    ) -> CustomResult<Heat> {
        let _guard = match self.fetch_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                notifier.alert("ZippyQ: Import already in progress");
                return BusySnafu { action: "ZippyQ import" }.fail();
            }
        };

        let race_id = match RaceClass::racesync_race_id(conn, class_id)? {
            Some(race_id) => race_id,
            None => {
                notifier.notify("ZippyQ class not found");
                return NotFoundSnafu { entity: "ZippyQ class", id: class_id.to_string() }.fail();
            }
        };

        let requested = last_round(conn, class_id)? + 1;
        self.import_round(conn, remote, notifier, class_id, &race_id, requested).await
    }

    async fn pull_rounds(
        remote: &dyn RemoteClient,
        notifier: &dyn Notifier,
        race_id: &str,
        round_num: u32,
    ) -> CustomResult<AdditionalRounds> {
        let data = match remote.pull_additional_rounds(race_id, round_num).await? {
            Some(data) => data,
            None => {
                notifier.notify("Data not found when attempting to import ZippyQ round");
                return NoMoreRoundsSnafu { race_id }.fail();
            }
        };

        if data.rounds.is_empty() {
            notifier.notify("Additional ZippyQ rounds not found");
            return NoMoreRoundsSnafu { race_id }.fail();
        }

        Ok(data)
    }

    async fn import_round<S: Store>(
        &self,
        conn: &mut S,
        remote: &dyn RemoteClient,
        notifier: &dyn Notifier,
        class_id: i32,
        race_id: &str,
        requested: u32,
    ) -> CustomResult<Heat> {
        let mut data = Self::pull_rounds(remote, notifier, race_id, requested).await?;
        let mut round_num = requested;

        if let Some(current_round) = data.current_round() {
            if current_round != requested {
                warn!(target: "zippyq:import_round", "Requested round {} but RaceSync is at round {}", requested, current_round);
                data = Self::pull_rounds(remote, notifier, race_id, current_round).await?;
                round_num = current_round;
            }
        }

        run_seat_check(conn, notifier, &data.rounds)?;

        let round = &data.rounds[0];
        let heat = match setup_class_heats(conn, class_id, &round.heats, round.name.as_deref())? {
            Some(heat) => heat,
            None => {
                notifier.notify("Additional ZippyQ rounds not found");
                return NoMoreRoundsSnafu { race_id }.fail();
            }
        };

        let name = format!("Round {}", round_num);
        conn.alter_heat(
            heat.id,
            Some(&name),
            &attrs(&[
                (attributes::HEAT_ZIPPYQ_ROUND, round_num.to_string()),
                (attributes::HEAT_DOWNLOADED_ZIPPYQ, "1".to_string()),
            ]),
        )?;

        let message = format!("ZippyQ Round {} imported.", round_num);
        notifier.notify(&message);
        info!(target: "zippyq:import_round", "{}", message);

        Ok(Heat { name, ..heat })
    }
}
