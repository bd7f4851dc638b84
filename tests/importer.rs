mod common;

use serde_json::json;

use common::{entry, harness, predefined_race, scheduled_heats, zippyq_race, MockRemote, Verification};
use racesync_toolkit::errors::Error;
use racesync_toolkit::modules::importer::event_races;
use racesync_toolkit::modules::memory_store::MemoryStore;
use racesync_toolkit::modules::models::general::{attributes, options, Store};
use racesync_toolkit::modules::models::heat::Heat;
use racesync_toolkit::modules::models::race_class::{RaceClass, SyncMode};

#[tokio::test]
async fn predefined_schedule_is_imported() {
    let remote = MockRemote::default();
    remote.add_race("100", predefined_race("Spring Cup"));
    let h = harness(remote, None, Verification::passing());
    let mut store = MemoryStore::new(4);

    let classes = h.coordinator.on_schedule_import_requested(&mut store, "100").await.unwrap();

    assert_eq!(classes.len(), 1);
    let race_class = &classes[0];
    assert_eq!(race_class.rounds, 2);
    assert_eq!(RaceClass::sync_mode(&store, race_class.id).unwrap(), Some(SyncMode::PredefinedHeats));

    let heats = store.heats_by_class(race_class.id).unwrap();
    assert_eq!(heats.iter().map(|heat| heat.name.as_str()).collect::<Vec<_>>(), vec!["Heat 1", "Heat 2"]);
    for heat in &heats {
        assert_eq!(Heat::assigned_pilots(&store, heat.id).unwrap().len(), 3);
    }

    // both heats fly the same frequencies and share one profile
    let profiles = store.frequency_profiles().unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].name, "RaceSync Profile 1");
    assert_eq!(store.option(options::CURRENT_PROFILE).unwrap(), Some(profiles[0].id.to_string()));
    assert_eq!(
        store.heat_attribute(heats[1].id, attributes::HEAT_PROFILE_ID).unwrap(),
        Some(profiles[0].id.to_string())
    );

    assert_eq!(store.option(options::RACE_ID).unwrap().as_deref(), Some("100"));
    assert_eq!(store.option(options::EVENT_NAME).unwrap().as_deref(), Some("Spring Cup"));
    let races = event_races(&store).unwrap();
    assert_eq!(races.len(), 1);
    assert_eq!(races[0].race_id, "100");
    assert!(h.notifier.has_message("RaceSync event imported."));
}

#[tokio::test]
async fn pilot_import_is_idempotent() {
    let remote = MockRemote::default();
    remote.add_race("100", predefined_race("Spring Cup"));
    let h = harness(remote, None, Verification::passing());
    let mut store = MemoryStore::new(4);

    assert_eq!(h.coordinator.import_pilots(&mut store, "100").await.unwrap(), 6);
    assert_eq!(h.coordinator.import_pilots(&mut store, "100").await.unwrap(), 6);
    h.coordinator.on_schedule_import_requested(&mut store, "100").await.unwrap();

    assert!(store.pilot_by_id(6).unwrap().is_some());
    assert!(store.pilot_by_id(7).unwrap().is_none());
    assert_eq!(store.pilot_ids_by_attribute(attributes::PILOT_RACESYNC_ID, "103").unwrap(), vec![3]);
}

#[tokio::test]
async fn pilot_import_refreshes_attributes() {
    let remote = MockRemote::default();
    let mut race = predefined_race("Spring Cup");
    race["entries"][0]["profilePictureUrl"] = json!("https://img/old.png");
    remote.add_race("100", race.clone());
    let h = harness(remote, None, Verification::passing());
    let mut store = MemoryStore::new(4);

    h.coordinator.import_pilots(&mut store, "100").await.unwrap();
    let pilot_id = store.pilot_ids_by_attribute(attributes::PILOT_RACESYNC_ID, "101").unwrap()[0];
    assert_eq!(
        store.pilot_attribute(pilot_id, attributes::PILOT_PHOTO_URL).unwrap().as_deref(),
        Some("https://img/old.png")
    );
    assert_eq!(store.pilot_attribute(pilot_id, attributes::PILOT_VELO_UID).unwrap(), None);

    race["entries"][0]["profilePictureUrl"] = json!("https://img/new.png");
    race["entries"][0]["velocidroneUid"] = json!("velo-77");
    h.remote.add_race("100", race);
    h.coordinator.import_pilots(&mut store, "100").await.unwrap();

    assert_eq!(store.pilot_ids_by_attribute(attributes::PILOT_RACESYNC_ID, "101").unwrap(), vec![pilot_id]);
    assert_eq!(
        store.pilot_attribute(pilot_id, attributes::PILOT_PHOTO_URL).unwrap().as_deref(),
        Some("https://img/new.png")
    );
    assert_eq!(
        store.pilot_attribute(pilot_id, attributes::PILOT_VELO_UID).unwrap().as_deref(),
        Some("velo-77")
    );
}

#[tokio::test]
async fn second_import_is_refused() {
    let remote = MockRemote::default();
    remote.add_race("100", predefined_race("Spring Cup"));
    let h = harness(remote, None, Verification::passing());
    let mut store = MemoryStore::new(4);

    h.coordinator.on_schedule_import_requested(&mut store, "100").await.unwrap();
    let result = h.coordinator.on_schedule_import_requested(&mut store, "100").await;

    assert!(matches!(result, Err(Error::AlreadyExistsError { .. })));
    assert!(h.notifier.has_alert("Archive Race, Heat, and Class data"));
    assert_eq!(store.race_classes().unwrap().len(), 1);
}

#[tokio::test]
async fn oversized_heats_abort_before_the_class_is_written() {
    let remote = MockRemote::default();
    remote.add_race("100", predefined_race("Spring Cup"));
    let h = harness(remote, None, Verification::passing());
    let mut store = MemoryStore::new(2);

    let result = h.coordinator.on_schedule_import_requested(&mut store, "100").await;

    assert!(matches!(result, Err(Error::SeatCapacityError { required: 3, available: 2 })));
    assert!(store.race_classes().unwrap().is_empty());
    assert!(store.heats().unwrap().is_empty());
    assert_eq!(store.option(options::RACE_ID).unwrap(), None);
}

#[tokio::test]
async fn oversized_later_heat_leaves_the_store_untouched() {
    let remote = MockRemote::default();
    let mut race = predefined_race("Spring Cup");
    let oversized: Vec<_> = (0..5).map(|seat| entry(120 + seat as u32, seat)).collect();
    race["schedule"]["rounds"][0]["heats"] = json!([
        {"entries": [entry(101, 0), entry(102, 1)]},
        {"entries": oversized}
    ]);
    remote.add_race("100", race);
    remote.add_race("101", predefined_race("Spring Cup"));
    let h = harness(remote, None, Verification::passing());
    let mut store = MemoryStore::new(4);

    let result = h.coordinator.on_schedule_import_requested(&mut store, "100").await;

    assert!(matches!(result, Err(Error::SeatCapacityError { required: 5, available: 4 })));
    assert!(store.race_classes().unwrap().is_empty());
    assert!(store.heats().unwrap().is_empty());
    assert!(store.pilot_by_id(1).unwrap().is_none());

    // nothing was left behind, so another import is not refused
    let classes = h.coordinator.on_schedule_import_requested(&mut store, "101").await.unwrap();
    assert_eq!(classes.len(), 1);
}

#[tokio::test]
async fn rejected_child_race_imports_no_sibling() {
    let remote = MockRemote::default();
    remote.add_race(
        "200",
        json!({
            "id": "200",
            "name": "Summer Event",
            "scoringFormat": "0",
            "raceType": "1",
            "childRaceCount": 2,
            "races": [{"id": "201", "name": "Open"}, {"id": "202", "name": "Spec"}]
        }),
    );
    remote.add_race("201", predefined_race("Open"));
    let mut crowded = predefined_race("Spec");
    crowded["schedule"]["rounds"][1]["heats"] = scheduled_heats(1, 6);
    remote.add_race("202", crowded);
    let h = harness(remote, None, Verification::passing());
    let mut store = MemoryStore::new(4);

    let result = h.coordinator.on_schedule_import_requested(&mut store, "200").await;

    assert!(matches!(result, Err(Error::SeatCapacityError { required: 6, available: 4 })));
    assert!(store.race_classes().unwrap().is_empty());
    assert!(store.race_formats().unwrap().is_empty());
    assert_eq!(store.option(options::RACE_ID).unwrap(), None);
}

#[tokio::test]
async fn event_children_become_classes() {
    let remote = MockRemote::default();
    remote.add_race(
        "200",
        json!({
            "id": "200",
            "name": "Summer Event",
            "scoringFormat": "0",
            "raceType": "1",
            "childRaceCount": 2,
            "races": [{"id": "201", "name": "Open"}, {"id": 202, "name": "Spec"}]
        }),
    );
    remote.add_race("201", predefined_race("Open"));
    remote.add_race("202", zippyq_race("Spec"));
    let h = harness(remote, None, Verification::passing());
    let mut store = MemoryStore::new(4);

    let classes = h.coordinator.on_schedule_import_requested(&mut store, "200").await.unwrap();

    assert_eq!(classes.len(), 2);
    assert_eq!(RaceClass::racesync_race_id(&store, classes[0].id).unwrap().as_deref(), Some("201"));
    assert_eq!(RaceClass::sync_mode(&store, classes[1].id).unwrap(), Some(SyncMode::ZippyQ));
    assert_eq!(store.option(options::ZIPPYQ_RACES).unwrap().as_deref(), Some("1"));
    assert_eq!(store.option(options::RACE_ID).unwrap().as_deref(), Some("200"));

    let races = event_races(&store).unwrap();
    assert_eq!(races.iter().map(|race| race.name.as_str()).collect::<Vec<_>>(), vec!["Open", "Spec"]);
}

#[tokio::test]
async fn qualifier_import_needs_passing_status_checks() {
    let remote = MockRemote::default();
    let mut race = predefined_race("Global Qualifier");
    race["raceType"] = json!("2");
    remote.add_race("100", race);
    let h = harness(remote, None, Verification::failing("Timer version"));
    let mut store = MemoryStore::new(4);

    let result = h.coordinator.on_schedule_import_requested(&mut store, "100").await;

    assert!(matches!(result, Err(Error::IntegrityError { .. })));
    assert!(h.notifier.has_message("Global Qualifier not imported - Timer version"));
    assert!(store.race_classes().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_race_ids_are_rejected() {
    let h = harness(MockRemote::default(), None, Verification::passing());
    let mut store = MemoryStore::new(4);

    let result = h.coordinator.on_schedule_import_requested(&mut store, "../100").await;

    assert!(matches!(result, Err(Error::InvalidRaceIdError { .. })));
}

#[tokio::test]
async fn credentials_are_verified() {
    let h = harness(MockRemote::default(), None, Verification::passing());

    assert_eq!(
        h.coordinator.verify_credentials("valid-key").await.unwrap().as_deref(),
        Some("Test Chapter")
    );
    assert_eq!(h.coordinator.verify_credentials("other").await.unwrap(), None);
    assert_eq!(h.coordinator.verify_credentials("  ").await.unwrap(), None);
}

#[tokio::test]
async fn linked_mirror_is_reported() {
    let h = harness(
        MockRemote::default(),
        Some(std::sync::Arc::new(common::MockMirror::default())),
        Verification::passing(),
    );

    h.coordinator.verify_credentials("valid-key").await.unwrap();

    assert!(h.notifier.has_message("Test Chapter is linked to FPVScores"));
}
