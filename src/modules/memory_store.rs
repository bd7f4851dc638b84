use std::collections::BTreeMap;

use serde_json::json;

use crate::errors::CustomResult;
use crate::macros::store::not_found;
use crate::models::{NewHeat, NewPilot, NewRaceClass, NewRaceFormat, SlotAssignment, UpdateRaceClass};
use crate::modules::models::frequency::FrequencyProfile;
use crate::modules::models::general::{Attributes, Store};
use crate::modules::models::heat::{Heat, Slot};
use crate::modules::models::pilot::Pilot;
use crate::modules::models::race_class::RaceClass;
use crate::modules::models::race_format::{RaceFormat, RaceSyncFormat};
use crate::modules::models::saved_race::{PilotResult, RankedPilot, SavedRace};

/// # MemoryStore
/// an in-memory [`Store`], used for dry runs and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    seat_count: usize,
    options: BTreeMap<String, String>,
    pilots: Vec<Pilot>,
    pilot_attributes: BTreeMap<i32, Attributes>,
    race_formats: Vec<RaceFormat>,
    format_attributes: BTreeMap<i32, Attributes>,
    frequency_profiles: Vec<FrequencyProfile>,
    race_classes: Vec<RaceClass>,
    class_attributes: BTreeMap<i32, Attributes>,
    heats: Vec<Heat>,
    heat_attributes: BTreeMap<i32, Attributes>,
    slots: Vec<Slot>,
    races: Vec<SavedRace>,
    race_attributes: BTreeMap<i32, Attributes>,
    results: BTreeMap<i32, Vec<PilotResult>>,
    rankings: BTreeMap<i32, Vec<RankedPilot>>,
}

fn next_id(len: usize) -> i32 {
    len as i32 + 1
}

fn attribute(bags: &BTreeMap<i32, Attributes>, id: i32, key: &str) -> Option<String> {
    bags.get(&id).and_then(|bag| bag.get(key)).cloned()
}

impl MemoryStore {
    pub fn new(seat_count: usize) -> MemoryStore {
        MemoryStore {
            seat_count,
            ..Default::default()
        }
    }

    /// move a heat into a heat group
    pub fn set_heat_group(&mut self, heat_id: i32, group_id: u32) -> CustomResult<()> {
        match self.heats.iter_mut().find(|heat| heat.id == heat_id) {
            Some(heat) => {
                heat.group_id = group_id;
                Ok(())
            }
            None => not_found!("heat", heat_id),
        }
    }

    /// seat a pilot in a heat
    pub fn seat_pilot(&mut self, heat_id: i32, node_index: u32, pilot_id: Option<i32>) -> CustomResult<()> {
        match self
            .slots
            .iter_mut()
            .find(|slot| slot.heat_id == heat_id && slot.node_index == node_index)
        {
            Some(slot) => {
                slot.pilot_id = pilot_id;
                Ok(())
            }
            None => not_found!("slot", format!("{}:{}", heat_id, node_index)),
        }
    }

    /// save a race of a heat together with its results
    pub fn save_race(&mut self, heat_id: i32, round_id: u32, results: Vec<PilotResult>) -> CustomResult<SavedRace> {
        let class_id = match self.heats.iter().find(|heat| heat.id == heat_id) {
            Some(heat) => heat.class_id,
            None => return not_found!("heat", heat_id),
        };

        let race = SavedRace {
            id: next_id(self.races.len()),
            class_id,
            heat_id,
            round_id,
        };
        self.races.push(race.clone());
        self.results.insert(race.id, results);

        Ok(race)
    }

    pub fn set_class_ranking(&mut self, class_id: i32, ranking: Vec<RankedPilot>) {
        self.rankings.insert(class_id, ranking);
    }

    /// leaderboard of the class, most laps then lowest time
    fn leaderboard(&self, class_id: i32) -> Vec<RankedPilot> {
        let mut totals: BTreeMap<i32, (u32, f64)> = BTreeMap::new();
        for race in self.races.iter().filter(|race| race.class_id == class_id) {
            for result in self.results.get(&race.id).into_iter().flatten() {
                let total = totals.entry(result.pilot_id).or_insert((0, 0.0));
                total.0 += result.laps;
                total.1 += result.total_time;
            }
        }

        let mut ordered: Vec<(i32, (u32, f64))> = totals.into_iter().collect();
        ordered.sort_by(|a, b| {
            b.1 .0
                .cmp(&a.1 .0)
                .then(a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
        });

        ordered
            .into_iter()
            .enumerate()
            .map(|(index, (pilot_id, _))| RankedPilot {
                pilot_id,
                position: index as u32 + 1,
            })
            .collect()
    }
}

impl Store for MemoryStore {
    fn option(&self, key: &str) -> CustomResult<Option<String>> {
        Ok(self.options.get(key).cloned())
    }

    fn set_option(&mut self, key: &str, value: &str) -> CustomResult<()> {
        self.options.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn seat_count(&self) -> CustomResult<usize> {
        Ok(self.seat_count)
    }

    fn pilot_by_id(&self, pilot_id: i32) -> CustomResult<Option<Pilot>> {
        Ok(self.pilots.iter().find(|pilot| pilot.id == pilot_id).cloned())
    }

    fn pilot_ids_by_attribute(&self, key: &str, value: &str) -> CustomResult<Vec<i32>> {
        Ok(self
            .pilots
            .iter()
            .filter(|pilot| attribute(&self.pilot_attributes, pilot.id, key).as_deref() == Some(value))
            .map(|pilot| pilot.id)
            .collect())
    }

    fn insert_pilot(&mut self, new_pilot: NewPilot) -> CustomResult<Pilot> {
        let pilot = Pilot {
            id: next_id(self.pilots.len()),
            name: new_pilot.name,
            callsign: new_pilot.callsign,
        };
        self.pilots.push(pilot.clone());

        Ok(pilot)
    }

    fn pilot_attribute(&self, pilot_id: i32, key: &str) -> CustomResult<Option<String>> {
        Ok(attribute(&self.pilot_attributes, pilot_id, key))
    }

    fn alter_pilot(&mut self, pilot_id: i32, attributes: &Attributes) -> CustomResult<()> {
        if !self.pilots.iter().any(|pilot| pilot.id == pilot_id) {
            return not_found!("pilot", pilot_id);
        }
        self.pilot_attributes
            .entry(pilot_id)
            .or_default()
            .extend(attributes.clone());

        Ok(())
    }

    fn race_formats(&self) -> CustomResult<Vec<RaceFormat>> {
        Ok(self.race_formats.clone())
    }

    fn race_format_by_id(&self, format_id: i32) -> CustomResult<Option<RaceFormat>> {
        Ok(self
            .race_formats
            .iter()
            .find(|race_format| race_format.id == format_id)
            .cloned())
    }

    fn insert_race_format(&mut self, new_format: NewRaceFormat) -> CustomResult<RaceFormat> {
        let race_format = RaceFormat {
            id: next_id(self.race_formats.len()),
            name: new_format.name,
            win_condition: new_format.win_condition,
            race_time_sec: new_format.race_time_sec,
            unlimited_time: new_format.unlimited_time,
            start_behavior: new_format.start_behavior,
            team_racing_mode: new_format.team_racing_mode,
            points_list: None,
        };
        self.race_formats.push(race_format.clone());

        Ok(race_format)
    }

    fn update_race_format(&mut self, format_id: i32, settings: &RaceSyncFormat) -> CustomResult<()> {
        match self
            .race_formats
            .iter_mut()
            .find(|race_format| race_format.id == format_id)
        {
            Some(race_format) => {
                race_format.name = settings.name.clone();
                race_format.win_condition = settings.win_condition;
                race_format.race_time_sec = settings.race_time_sec;
                race_format.unlimited_time = settings.unlimited_time;
                race_format.start_behavior = settings.start_behavior;
                race_format.team_racing_mode = settings.team_racing_mode;
                Ok(())
            }
            None => not_found!("race format", format_id),
        }
    }

    fn race_format_attribute(&self, format_id: i32, key: &str) -> CustomResult<Option<String>> {
        Ok(attribute(&self.format_attributes, format_id, key))
    }

    fn alter_race_format(&mut self, format_id: i32, attributes: &Attributes) -> CustomResult<()> {
        if self.race_format_by_id(format_id)?.is_none() {
            return not_found!("race format", format_id);
        }
        self.format_attributes
            .entry(format_id)
            .or_default()
            .extend(attributes.clone());

        Ok(())
    }

    fn set_race_format_points(&mut self, format_id: i32, points_list: Option<&str>) -> CustomResult<()> {
        match self
            .race_formats
            .iter_mut()
            .find(|race_format| race_format.id == format_id)
        {
            Some(race_format) => {
                race_format.points_list = points_list.map(str::to_string);
                Ok(())
            }
            None => not_found!("race format", format_id),
        }
    }

    fn frequency_profiles(&self) -> CustomResult<Vec<FrequencyProfile>> {
        Ok(self.frequency_profiles.clone())
    }

    fn insert_frequency_profile(&mut self, name: &str, frequencies: &str) -> CustomResult<FrequencyProfile> {
        let profile = FrequencyProfile {
            id: next_id(self.frequency_profiles.len()),
            name: name.to_string(),
            frequencies: frequencies.to_string(),
        };
        self.frequency_profiles.push(profile.clone());

        Ok(profile)
    }

    fn race_classes(&self) -> CustomResult<Vec<RaceClass>> {
        Ok(self.race_classes.clone())
    }

    fn race_class_by_id(&self, class_id: i32) -> CustomResult<Option<RaceClass>> {
        Ok(self
            .race_classes
            .iter()
            .find(|race_class| race_class.id == class_id)
            .cloned())
    }

    fn insert_race_class(&mut self, new_class: NewRaceClass) -> CustomResult<RaceClass> {
        let race_class = RaceClass {
            id: next_id(self.race_classes.len()),
            name: new_class.name,
            description: new_class.description,
            format_id: new_class.format_id,
            round_type: new_class.round_type,
            rounds: new_class.rounds,
            heat_advance: new_class.heat_advance,
            win_condition: String::new(),
        };
        self.race_classes.push(race_class.clone());

        Ok(race_class)
    }

    fn update_race_class(&mut self, class_id: i32, update: UpdateRaceClass) -> CustomResult<()> {
        match self.race_classes.iter_mut().find(|race_class| race_class.id == class_id) {
            Some(race_class) => {
                race_class.name = update.name;
                race_class.format_id = update.format_id;
                race_class.rounds = update.rounds;
                race_class.win_condition = update.win_condition;
                Ok(())
            }
            None => not_found!("race class", class_id),
        }
    }

    fn race_class_attribute(&self, class_id: i32, key: &str) -> CustomResult<Option<String>> {
        Ok(attribute(&self.class_attributes, class_id, key))
    }

    fn alter_race_class(&mut self, class_id: i32, attributes: &Attributes) -> CustomResult<()> {
        if self.race_class_by_id(class_id)?.is_none() {
            return not_found!("race class", class_id);
        }
        self.class_attributes
            .entry(class_id)
            .or_default()
            .extend(attributes.clone());

        Ok(())
    }

    fn heats(&self) -> CustomResult<Vec<Heat>> {
        Ok(self.heats.clone())
    }

    fn heat_by_id(&self, heat_id: i32) -> CustomResult<Option<Heat>> {
        Ok(self.heats.iter().find(|heat| heat.id == heat_id).cloned())
    }

    fn heats_by_class(&self, class_id: i32) -> CustomResult<Vec<Heat>> {
        Ok(self
            .heats
            .iter()
            .filter(|heat| heat.class_id == class_id)
            .cloned()
            .collect())
    }

    fn insert_heat(&mut self, new_heat: NewHeat) -> CustomResult<Heat> {
        let heat = Heat {
            id: next_id(self.heats.len()),
            class_id: new_heat.class_id,
            name: new_heat.name,
            group_id: 0,
        };
        self.heats.push(heat.clone());

        for node_index in 0..self.seat_count {
            let slot = Slot {
                id: next_id(self.slots.len()),
                heat_id: heat.id,
                node_index: node_index as u32,
                pilot_id: None,
            };
            self.slots.push(slot);
        }

        Ok(heat)
    }

    fn heat_attribute(&self, heat_id: i32, key: &str) -> CustomResult<Option<String>> {
        Ok(attribute(&self.heat_attributes, heat_id, key))
    }

    fn alter_heat(&mut self, heat_id: i32, name: Option<&str>, attributes: &Attributes) -> CustomResult<()> {
        let heat = match self.heats.iter_mut().find(|heat| heat.id == heat_id) {
            Some(heat) => heat,
            None => return not_found!("heat", heat_id),
        };
        if let Some(name) = name {
            heat.name = name.to_string();
        }
        self.heat_attributes
            .entry(heat_id)
            .or_default()
            .extend(attributes.clone());

        Ok(())
    }

    fn heat_max_round(&self, heat_id: i32) -> CustomResult<u32> {
        Ok(self
            .races
            .iter()
            .filter(|race| race.heat_id == heat_id)
            .map(|race| race.round_id)
            .max()
            .unwrap_or(0))
    }

    fn slots_by_heat(&self, heat_id: i32) -> CustomResult<Vec<Slot>> {
        let mut slots: Vec<Slot> = self
            .slots
            .iter()
            .filter(|slot| slot.heat_id == heat_id)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.node_index);

        Ok(slots)
    }

    fn alter_slots(&mut self, assignments: &[SlotAssignment]) -> CustomResult<()> {
        for assignment in assignments {
            match self.slots.iter_mut().find(|slot| slot.id == assignment.slot_id) {
                Some(slot) => slot.pilot_id = assignment.pilot_id,
                None => return not_found!("slot", assignment.slot_id),
            }
        }

        Ok(())
    }

    fn races(&self) -> CustomResult<Vec<SavedRace>> {
        Ok(self.races.clone())
    }

    fn race_by_id(&self, race_id: i32) -> CustomResult<Option<SavedRace>> {
        Ok(self.races.iter().find(|race| race.id == race_id).cloned())
    }

    fn races_by_class(&self, class_id: i32) -> CustomResult<Vec<SavedRace>> {
        Ok(self
            .races
            .iter()
            .filter(|race| race.class_id == class_id)
            .cloned()
            .collect())
    }

    fn race_results(&self, race_id: i32) -> CustomResult<Vec<PilotResult>> {
        Ok(self.results.get(&race_id).cloned().unwrap_or_default())
    }

    fn race_attribute(&self, race_id: i32, key: &str) -> CustomResult<Option<String>> {
        Ok(attribute(&self.race_attributes, race_id, key))
    }

    fn alter_race(&mut self, race_id: i32, attributes: &Attributes) -> CustomResult<()> {
        if self.race_by_id(race_id)?.is_none() {
            return not_found!("saved race", race_id);
        }
        self.race_attributes
            .entry(race_id)
            .or_default()
            .extend(attributes.clone());

        Ok(())
    }

    fn class_ranking(&self, class_id: i32) -> CustomResult<Option<Vec<RankedPilot>>> {
        if let Some(ranking) = self.rankings.get(&class_id) {
            return Ok(Some(ranking.clone()));
        }

        let leaderboard = self.leaderboard(class_id);
        if leaderboard.is_empty() {
            Ok(None)
        } else {
            Ok(Some(leaderboard))
        }
    }

    fn event_export(&self) -> CustomResult<serde_json::Value> {
        Ok(json!({
            "event_name": self.options.get(crate::modules::models::general::options::EVENT_NAME),
            "pilots": self.pilots,
            "classes": self.race_classes,
            "formats": self.race_formats,
            "heats": self.heats,
            "slots": self.slots,
            "races": self.races,
            "results": self.results,
        }))
    }
}
