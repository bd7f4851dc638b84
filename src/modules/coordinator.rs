use std::sync::Arc;

use log::{info, warn};

use crate::errors::{CustomResult, Error};
use crate::macros::store::require_entity;
use crate::models::SlotAssignment;
use crate::modules::eligibility::{check_heat, Eligibility};
use crate::modules::exporter::ResultsExporter;
use crate::modules::fpvscores_api::ResultsMirror;
use crate::modules::host::{Notifier, SystemVerification};
use crate::modules::importer::{event_races, import_event, import_pilots};
use crate::modules::models::general::{attributes, option_enabled, options, Store};
use crate::modules::models::heat::Heat;
use crate::modules::models::race_class::{RaceClass, SyncMode};
use crate::modules::models::saved_race::{RacePilots, SavedRace};
use crate::modules::qualifier::{verify_class, verify_classes, verify_format, verify_lap, LapSource};
use crate::modules::racesync_api::{validate_race_id, RemoteClient};
use crate::modules::zippyq::{activate_imported_heat, assign_zippyq_round, ZippyQFetcher};

/// # Coordinator
/// wires the host's triggers to the importer, the ZippyQ fetcher, the
/// exporter and the eligibility gate
pub struct Coordinator {
    remote: Arc<dyn RemoteClient>,
    notifier: Arc<dyn Notifier>,
    verification: Arc<dyn SystemVerification>,
    fetcher: ZippyQFetcher,
    exporter: ResultsExporter,
}

impl Coordinator {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        mirror: Option<Arc<dyn ResultsMirror>>,
        notifier: Arc<dyn Notifier>,
        verification: Arc<dyn SystemVerification>,
        push_pool_size: usize,
    ) -> Coordinator {
        Coordinator {
            exporter: ResultsExporter::new(remote.clone(), mirror, push_pool_size),
            remote,
            notifier,
            verification,
            fetcher: ZippyQFetcher::new(),
        }
    }

    pub fn fetcher(&self) -> &ZippyQFetcher {
        &self.fetcher
    }

    pub fn exporter(&self) -> &ResultsExporter {
        &self.exporter
    }

    /// # verify credentials
    /// check the api key against RaceSync
    ///
    /// ## Returns
    /// * `Option<String>` - the chapter name, `None` for an unknown key
    pub async fn verify_credentials(&self, api_key: &str) -> CustomResult<Option<String>> {
        if api_key.trim().is_empty() {
            warn!(target: "coordinator:verify_credentials", "A RaceSync API key has not been entered into the system");
            return Ok(None);
        }

        let chapter_name = match self.remote.pull_chapter(api_key).await? {
            Some(chapter_name) => chapter_name,
            None => {
                warn!(target: "coordinator:verify_credentials", "RaceSync API key cannot be verified.");
                return Ok(None);
            }
        };
        info!(target: "coordinator:verify_credentials", "API key for {} has been recognized", chapter_name);

        match self.exporter.mirror_linked(api_key).await {
            Ok(true) => self.notifier.notify(&format!("{} is linked to FPVScores", chapter_name)),
            Ok(false) => {}
            Err(error) => warn!(target: "coordinator:verify_credentials", "FPVScores link not checked: {}", error),
        }

        Ok(Some(chapter_name))
    }

    pub async fn on_schedule_import_requested<S: Store>(&self, conn: &mut S, race_id: &str) -> CustomResult<Vec<RaceClass>> {
        let race_id = validate_race_id(race_id)?;
        import_event(conn, self.remote.as_ref(), self.notifier.as_ref(), self.verification.as_ref(), race_id).await
    }

    pub async fn import_pilots<S: Store>(&self, conn: &mut S, race_id: &str) -> CustomResult<usize> {
        let race_id = validate_race_id(race_id)?;
        import_pilots(conn, self.remote.as_ref(), self.notifier.as_ref(), race_id).await
    }

    /// # store race pilots
    /// capture who flew a saved race. races of non-qualifier classes saved
    /// during a qualifier event keep an empty list.
    pub fn store_race_pilots<S: Store>(&self, conn: &mut S, race: &SavedRace) -> CustomResult<RacePilots> {
        let qualifier_class = RaceClass::is_qualifier(conn, race.class_id)?;

        if !qualifier_class && option_enabled(conn, options::QUALIFIER_EVENT)? {
            self.notifier.notify(
                "Warning: Saving non-valid Global Qualifier race results. \
                 Use the imported class to generate valid results.",
            );
            let race_pilots = RacePilots::new();
            SavedRace::set_race_pilots(conn, race.id, &race_pilots)?;
            return Ok(race_pilots);
        }

        SavedRace::capture_race_pilots(conn, race)
    }

    /// # on results saved
    /// capture the race pilots, then for ZippyQ classes push the race and
    /// download the next round
    ///
    /// ## Returns
    /// * `Option<Heat>` - the heat of an automatically downloaded round
    pub async fn on_results_saved<S: Store>(&self, conn: &mut S, saved_race_id: i32) -> CustomResult<Option<Heat>> {
        let race = require_entity!(conn.race_by_id(saved_race_id)?, "saved race", saved_race_id, "coordinator:on_results_saved");

        self.store_race_pilots(conn, &race)?;

        if RaceClass::sync_mode(conn, race.class_id)? != Some(SyncMode::ZippyQ) {
            return Ok(None);
        }

        if let Err(error) = self
            .exporter
            .push_zippyq_race(conn, self.notifier.as_ref(), self.verification.as_ref(), race.id)
            .await
        {
            warn!(target: "coordinator:on_results_saved", "ZippyQ push failed: {}", error);
        }

        match self.on_zippyq_fetch_requested(conn, race.class_id, false).await {
            Ok(heat) => Ok(heat),
            Err(error @ Error::NetworkError { .. }) => Err(error),
            Err(error) => {
                warn!(target: "coordinator:on_results_saved", "Next ZippyQ round not downloaded: {}", error);
                Ok(None)
            }
        }
    }

    /// # on race starting
    /// the host stops the race on `Deny`
    pub fn on_race_starting<S: Store>(&self, conn: &S, heat_id: i32) -> CustomResult<Eligibility> {
        check_heat(conn, self.notifier.as_ref(), self.verification.as_ref(), heat_id)
    }

    /// # on zippyq fetch requested
    /// download the next ZippyQ round of a class. automatic requests are only
    /// served for ZippyQ classes with automatic downloads enabled.
    ///
    /// ## Arguments
    /// * `conn` - the store
    /// * `class_id` - the ZippyQ class
    /// * `manual` - whether the user asked for the round
    ///
    /// ## Returns
    /// * `Option<Heat>` - the created heat, `None` when an automatic request was not served
    pub async fn on_zippyq_fetch_requested<S: Store>(&self, conn: &mut S, class_id: i32, manual: bool) -> CustomResult<Option<Heat>> {
        if !manual {
            let zippyq_class = RaceClass::sync_mode(conn, class_id)? == Some(SyncMode::ZippyQ);
            if !zippyq_class || !option_enabled(conn, options::AUTO_ZIPPYQ)? || self.fetcher.is_busy() {
                return Ok(None);
            }
            self.notifier.notify("Automatically downloading next ZippyQ round...");
        }

        let heat = self
            .fetcher
            .fetch_next_round(conn, self.remote.as_ref(), self.notifier.as_ref(), class_id)
            .await?;
        activate_imported_heat(conn, &heat)?;

        Ok(Some(heat))
    }

    /// # on format altered
    /// restore the Global Qualifier settings of an edited qualifier format
    pub fn on_format_altered<S: Store>(&self, conn: &mut S, format_id: i32) -> CustomResult<bool> {
        let restored = verify_format(conn, format_id)?;
        if restored {
            self.notifier.notify("Global Qualifier format settings cannot be changed");
        }

        Ok(restored)
    }

    /// # on class altered
    /// restore the Global Qualifier settings of an edited qualifier class
    pub fn on_class_altered<S: Store>(&self, conn: &mut S, class_id: i32) -> CustomResult<bool> {
        let restored = verify_class(conn, class_id)?;
        if restored {
            self.notifier.notify("Global Qualifier class settings cannot be changed");
        }

        Ok(restored)
    }

    /// a deleted format may have been the format of a qualifier class
    pub fn on_format_deleted<S: Store>(&self, conn: &mut S) -> CustomResult<Vec<i32>> {
        verify_classes(conn)
    }

    /// # on lap recorded
    /// the host stops the race on `Deny`
    pub fn on_lap_recorded<S: Store>(&self, conn: &S, source: LapSource) -> CustomResult<Eligibility> {
        verify_lap(conn, self.notifier.as_ref(), source)
    }

    pub fn on_heat_added<S: Store>(&self, conn: &mut S, heat_id: i32) -> CustomResult<Option<u32>> {
        assign_zippyq_round(conn, heat_id)
    }

    /// # on heat activated
    /// switch to the frequency profile stored on the heat
    ///
    /// ## Returns
    /// * `bool` - whether the active profile changed
    pub fn on_heat_activated<S: Store>(&self, conn: &mut S, heat_id: i32) -> CustomResult<bool> {
        match conn
            .heat_attribute(heat_id, attributes::HEAT_PROFILE_ID)?
            .filter(|profile_id| !profile_id.is_empty())
        {
            Some(profile_id) => {
                conn.set_option(options::CURRENT_PROFILE, &profile_id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// # return pack
    /// take a pilot out of a saved race, their result is never pushed for it
    pub fn return_pack<S: Store>(&self, conn: &mut S, saved_race_id: i32, pilot_id: i32) -> CustomResult<bool> {
        let race = require_entity!(conn.race_by_id(saved_race_id)?, "saved race", saved_race_id, "coordinator:return_pack");

        let cleared: Vec<_> = conn
            .slots_by_heat(race.heat_id)?
            .into_iter()
            .filter(|slot| slot.pilot_id == Some(pilot_id))
            .map(|slot| SlotAssignment {
                slot_id: slot.id,
                pilot_id: None,
            })
            .collect();
        conn.alter_slots(&cleared)?;

        let removed = SavedRace::remove_pilot(conn, saved_race_id, pilot_id)?;
        let callsign = conn
            .pilot_by_id(pilot_id)?
            .map(|pilot| pilot.callsign)
            .unwrap_or_else(|| pilot_id.to_string());
        self.notifier.notify(&format!("Pack returned to {}", callsign));

        Ok(removed)
    }

    pub async fn push_event_results<S: Store>(&self, conn: &mut S) -> CustomResult<bool> {
        self.exporter
            .push_event_results(conn, self.notifier.as_ref(), self.verification.as_ref())
            .await
    }

    /// # reset event
    /// forget the imported event, used when the host archives its event
    pub fn reset_event<S: Store>(&self, conn: &mut S) -> CustomResult<()> {
        for index in 0..event_races(conn)?.len() {
            conn.set_option(&format!("{}{}", options::RESULTS_SELECT_PREFIX, index), "")?;
            conn.set_option(&format!("{}{}", options::RANKS_SELECT_PREFIX, index), "")?;
        }

        conn.set_option(options::PUSH_MIRROR, "0")?;
        conn.set_option(options::MIRROR_EVENT_ID, "")?;
        conn.set_option(options::RACE_ID, "")?;
        conn.set_option(options::AUTO_ZIPPYQ, "0")?;
        conn.set_option(options::ACTIVE_IMPORT, "0")?;
        conn.set_option(options::ZIPPYQ_RACES, "0")?;
        conn.set_option(options::QUALIFIER_EVENT, "0")?;
        conn.set_option(options::EVENT_RACES, "[]")?;
        info!(target: "coordinator:reset_event", "Event metadata reset");

        Ok(())
    }
}
