use std::env;
use std::sync::Arc;

use log::{error, info};

use racesync_toolkit::errors::CustomResult;
use racesync_toolkit::modules::coordinator::Coordinator;
use racesync_toolkit::modules::fpvscores_api::FpvScoresApi;
use racesync_toolkit::modules::helpers::config::Settings;
use racesync_toolkit::modules::helpers::logging::setup_logging;
use racesync_toolkit::modules::host::{LogNotifier, UnverifiedSystem};
use racesync_toolkit::modules::memory_store::MemoryStore;
use racesync_toolkit::modules::models::general::Store;
use racesync_toolkit::modules::racesync_api::RaceSyncApi;

/// import a RaceSync event into an in-memory store and print the result
async fn preview(settings: &Settings, race_id: &str) -> CustomResult<()> {
    let api = Arc::new(RaceSyncApi::new(&settings.racesync_api_url, settings.request_timeout)?);
    let mirror = Arc::new(FpvScoresApi::new(&settings.fpvscores_api_url, settings.request_timeout)?);
    let coordinator = Coordinator::new(
        api,
        Some(mirror),
        Arc::new(LogNotifier),
        Arc::new(UnverifiedSystem),
        settings.push_pool_size,
    );

    let api_key = settings.racesync_api_key.clone().unwrap_or_default();
    if coordinator.verify_credentials(&api_key).await?.is_none() {
        return Ok(());
    }

    let mut store = MemoryStore::new(settings.seat_count);
    let pilots = coordinator.import_pilots(&mut store, race_id).await?;
    let classes = coordinator.on_schedule_import_requested(&mut store, race_id).await?;
    info!(target: "preview_schedule", "Imported {} pilots into {} classes", pilots, classes.len());

    for race_class in classes {
        println!("{} ({} rounds)", race_class.name, race_class.rounds);
        for heat in store.heats_by_class(race_class.id)? {
            let callsigns: Vec<String> = store
                .slots_by_heat(heat.id)?
                .into_iter()
                .map(|slot| match slot.pilot_id {
                    Some(pilot_id) => store
                        .pilot_by_id(pilot_id)
                        .ok()
                        .flatten()
                        .map(|pilot| pilot.callsign)
                        .unwrap_or_else(|| pilot_id.to_string()),
                    None => "-".to_string(),
                })
                .collect();
            println!("  {}: {}", heat.name, callsigns.join(", "));
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(error) = setup_logging() {
        eprintln!("Failed to set up logging: {}", error);
        return;
    }

    let race_id = match env::args().nth(1) {
        Some(race_id) => race_id,
        None => {
            error!(target: "preview_schedule", "usage: preview_schedule <race id>");
            return;
        }
    };

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            error!(target: "preview_schedule", "{}", error);
            return;
        }
    };

    if let Err(error) = preview(&settings, &race_id).await {
        error!(target: "preview_schedule", "Preview of race {} failed: {}", race_id, error);
    }
}
