use log::{error, info};

use racesync_toolkit::modules::helpers::config::Settings;
use racesync_toolkit::modules::helpers::logging::setup_logging;
use racesync_toolkit::modules::racesync_api::{RaceSyncApi, RemoteClient};

#[tokio::main]
async fn main() {
    if let Err(error) = setup_logging() {
        eprintln!("Failed to set up logging: {}", error);
        return;
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            error!(target: "list_races", "{}", error);
            return;
        }
    };

    let api_key = match &settings.racesync_api_key {
        Some(api_key) => api_key.clone(),
        None => {
            error!(target: "list_races", "RACESYNC_API_KEY must be set");
            return;
        }
    };

    let api = match RaceSyncApi::new(&settings.racesync_api_url, settings.request_timeout) {
        Ok(api) => api,
        Err(error) => {
            error!(target: "list_races", "{}", error);
            return;
        }
    };

    match api.pull_chapter(&api_key).await {
        Ok(Some(chapter_name)) => info!(target: "list_races", "Races of {}", chapter_name),
        Ok(None) => {
            error!(target: "list_races", "RaceSync API key cannot be verified.");
            return;
        }
        Err(error) => {
            error!(target: "list_races", "{}", error);
            return;
        }
    }

    match api.pull_races().await {
        Ok(Some(races)) => {
            for (race_id, name) in races {
                println!("{:>10}  {}", race_id, name);
            }
        }
        Ok(None) => info!(target: "list_races", "No races found"),
        Err(error) => error!(target: "list_races", "{}", error),
    }
}
