pub mod racesync_api;
pub mod fpvscores_api;
pub mod host;

pub mod importer;
pub mod zippyq;
pub mod exporter;
pub mod eligibility;
pub mod qualifier;
pub mod coordinator;

pub mod memory_store;

pub mod models {
    pub mod general;
    pub mod pilot;
    pub mod race_format;
    pub mod frequency;
    pub mod race_class;
    pub mod heat;
    pub mod saved_race;
}

pub mod helpers {
    pub mod de;
    pub mod math;

    pub mod config;
    pub mod logging;
}
