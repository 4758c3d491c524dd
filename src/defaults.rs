use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::model::{BuildingModel, BuildingType, ClimateZone, ScheduleId};
use crate::path::{FieldPath, Segment};
use crate::schedule::{Schedule, LIBRARY_NAMES};
use crate::validate::PlausibilityLimits;

/// Default values keyed by climate zone, building type and field pattern,
/// plus the plausibility limits used by validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefaultPolicy {
    #[serde(default)]
    pub entries: Vec<DefaultEntry>,
    #[serde(default)]
    pub limits: PlausibilityLimits,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefaultEntry {
    /// Applies to every climate zone when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub climate_zone: Option<ClimateZone>,
    /// Applies to every building type when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_type: Option<BuildingType>,
    /// Path pattern; `[*]` matches any index or key.
    pub field: FieldPath,
    /// Serialized form of the default value.
    pub value: Value,
}

impl DefaultEntry {
    pub fn new(field: FieldPath, value: Value) -> Self {
        DefaultEntry {
            climate_zone: None,
            building_type: None,
            field,
            value,
        }
    }

    pub fn for_building(mut self, building_type: BuildingType) -> Self {
        self.building_type = Some(building_type);
        self
    }

    pub fn for_climate(mut self, climate_zone: ClimateZone) -> Self {
        self.climate_zone = Some(climate_zone);
        self
    }

    fn applies_to(&self, climate: Option<&ClimateZone>, building: Option<BuildingType>) -> bool {
        self.climate_zone
            .as_ref()
            .map_or(true, |zone| Some(zone) == climate)
            && self
                .building_type
                .map_or(true, |kind| Some(kind) == building)
    }

    /// Entries keyed on more context win; then those with fewer wildcards.
    fn specificity(&self) -> (usize, std::cmp::Reverse<usize>) {
        (
            usize::from(self.climate_zone.is_some()) + usize::from(self.building_type.is_some()),
            std::cmp::Reverse(self.field.wildcard_count()),
        )
    }
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DefaultPolicy {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let string = fs::read_to_string(path)
            .with_context(|| format!("Failed to read default policy {}", path.display()))?;
        Self::from_json(&string)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(json5::from_str(json)?)
    }

    /// Built-in table for the supported building types.
    pub fn builtin() -> Self {
        let metadata = FieldPath::root().field("metadata");
        let settings = FieldPath::root().field("settings");
        let zones = FieldPath::root().field("zones").any();
        let materials = FieldPath::root().field("materials").any();
        let hvac = FieldPath::root().field("hvac_systems").any();

        let mut entries = vec![
            DefaultEntry::new(metadata.field("north_axis"), json!(0.0)),
            DefaultEntry::new(metadata.field("terrain"), json!("suburbs")),
            DefaultEntry::new(settings.field("timestep"), json!(4)),
            DefaultEntry::new(
                settings.field("run_period"),
                json!({ "begin": "1/1", "end": "12/31" }),
            ),
            DefaultEntry::new(zones.field("multiplier"), json!(1)),
            DefaultEntry::new(materials.field("roughness"), json!("medium_rough")),
            DefaultEntry::new(materials.field("thermal_absorptance"), json!(0.9)),
            DefaultEntry::new(materials.field("solar_absorptance"), json!(0.7)),
            DefaultEntry::new(materials.field("visible_absorptance"), json!(0.7)),
            DefaultEntry::new(materials.field("visible_transmittance"), json!(0.6)),
            DefaultEntry::new(hvac.field("availability_schedule"), json!("AlwaysOn")),
            DefaultEntry::new(hvac.field("heating_setpoint"), json!(21.0)),
            DefaultEntry::new(hvac.field("cooling_setpoint"), json!(24.0)),
            DefaultEntry::new(hvac.field("outdoor_air_per_person"), json!(0.00944)),
            DefaultEntry::new(hvac.field("cooling_cop"), json!(3.0)),
            DefaultEntry::new(hvac.field("heating_coil"), json!("electric")),
            DefaultEntry::new(hvac.field("gas_burner_efficiency"), json!(0.8)),
            DefaultEntry::new(hvac.field("reheat_coil"), json!("electric")),
            DefaultEntry::new(hvac.field("minimum_flow_fraction"), json!(0.3)),
            DefaultEntry::new(hvac.field("supply_air_temperature"), json!(12.8)),
            DefaultEntry::new(hvac.field("heating_setpoint"), json!(20.0))
                .for_building(BuildingType::Residential),
            DefaultEntry::new(hvac.field("cooling_setpoint"), json!(25.0))
                .for_building(BuildingType::Residential),
            DefaultEntry::new(hvac.field("heating_setpoint"), json!(15.0))
                .for_building(BuildingType::Warehouse),
            DefaultEntry::new(hvac.field("cooling_setpoint"), json!(28.0))
                .for_building(BuildingType::Warehouse),
            DefaultEntry::new(settings.field("timestep"), json!(6))
                .for_building(BuildingType::Warehouse),
        ];

        // Internal loads per building type: people/m², lighting W/m², equipment W/m².
        let loads = [
            (BuildingType::Office, 0.0538, "OfficeOccupancy", 10.76, "OfficeLighting", 10.76),
            (BuildingType::Retail, 0.162, "OfficeOccupancy", 16.1, "OfficeLighting", 2.7),
            (BuildingType::School, 0.25, "OfficeOccupancy", 12.9, "OfficeLighting", 5.4),
            (BuildingType::Warehouse, 0.005, "OfficeOccupancy", 8.0, "OfficeLighting", 2.0),
            (
                BuildingType::Residential,
                0.02,
                "ResidentialOccupancy",
                5.0,
                "ResidentialOccupancy",
                4.0,
            ),
        ];
        for (building_type, people, occupancy, lighting, lights_schedule, equipment) in loads {
            entries.extend([
                DefaultEntry::new(
                    zones.field("people"),
                    json!({
                        "people_per_area": people,
                        "schedule": occupancy,
                        "activity_schedule": "DefaultActivity",
                    }),
                )
                .for_building(building_type),
                DefaultEntry::new(
                    zones.field("lighting"),
                    json!({ "power_density": lighting, "schedule": lights_schedule }),
                )
                .for_building(building_type),
                DefaultEntry::new(
                    zones.field("equipment"),
                    json!({ "power_density": equipment, "schedule": occupancy }),
                )
                .for_building(building_type),
            ]);
        }

        // Hot climates keep a higher cooling setpoint.
        for code in ["0A", "0B", "1A", "1B"] {
            if let Ok(zone) = code.parse::<ClimateZone>() {
                entries.push(
                    DefaultEntry::new(hvac.field("cooling_setpoint"), json!(25.0))
                        .for_climate(zone.clone()),
                );
                entries.push(
                    DefaultEntry::new(hvac.field("cooling_setpoint"), json!(26.0))
                        .for_climate(zone)
                        .for_building(BuildingType::Residential),
                );
            }
        }

        DefaultPolicy {
            entries,
            limits: PlausibilityLimits::default(),
        }
    }

    /// Most specific entry for a concrete path; the earlier entry wins a tie.
    pub fn lookup(
        &self,
        climate: Option<&ClimateZone>,
        building: Option<BuildingType>,
        path: &FieldPath,
    ) -> Option<&DefaultEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.applies_to(climate, building) && path.matches(&entry.field))
            .fold(None, |best: Option<&DefaultEntry>, entry| match best {
                Some(best) if best.specificity() >= entry.specificity() => Some(best),
                _ => Some(entry),
            })
    }
}

/// Fill absent fields from the policy. Explicit and already defaulted values
/// are never touched, so applying the same policy twice changes nothing.
///
/// A policy value that does not fit its field is skipped with a warning;
/// the field then stays absent and validation reports it.
pub fn apply_defaults(model: &BuildingModel, policy: &DefaultPolicy) -> BuildingModel {
    let climate = model.metadata.climate_zone.value();
    let building = model.metadata.building_type.get();

    let mut json = match serde_json::to_value(model) {
        Ok(json) => json,
        Err(e) => {
            warn!("Could not serialize model for defaulting: {e}");
            return model.clone();
        }
    };

    let mut chosen: BTreeMap<FieldPath, &DefaultEntry> = BTreeMap::new();
    for entry in policy
        .entries
        .iter()
        .filter(|entry| entry.applies_to(climate, building))
    {
        for path in absent_matches(&json, &entry.field) {
            match chosen.get(&path) {
                Some(best) if best.specificity() >= entry.specificity() => {}
                _ => {
                    chosen.insert(path, entry);
                }
            }
        }
    }

    let mut defaulted = model.clone();
    if !chosen.is_empty() {
        let mut all = json.clone();
        for (path, entry) in &chosen {
            write_default(&mut all, path, &entry.value);
        }
        defaulted = match serde_json::from_value(all) {
            Ok(model) => model,
            Err(_) => {
                // Find the entries that do not fit and apply the rest.
                for (path, entry) in &chosen {
                    let mut candidate = json.clone();
                    write_default(&mut candidate, path, &entry.value);
                    match serde_json::from_value::<BuildingModel>(candidate) {
                        Ok(_) => write_default(&mut json, path, &entry.value),
                        Err(e) => warn!("Default for {path} does not fit the field: {e}"),
                    }
                }
                match serde_json::from_value(json) {
                    Ok(model) => model,
                    Err(e) => {
                        warn!("Defaults could not be applied: {e}");
                        model.clone()
                    }
                }
            }
        };
    }
    debug!(count = chosen.len(), "applied defaults");

    materialize_library_schedules(&mut defaulted);
    defaulted
}

/// Concrete paths matching `pattern` whose value is missing or null and
/// whose parent object exists.
fn absent_matches(json: &Value, pattern: &FieldPath) -> Vec<FieldPath> {
    let Some((Segment::Field(leaf), parents)) = pattern.segments().split_last() else {
        return Vec::new();
    };
    let mut found = Vec::new();
    expand(json, FieldPath::root(), parents, &mut |path, parent| {
        if let Value::Object(object) = parent {
            if object.get(leaf).map_or(true, Value::is_null) {
                found.push(path.field(leaf));
            }
        }
    });
    found
}

fn expand(
    value: &Value,
    path: FieldPath,
    rest: &[Segment],
    visit: &mut dyn FnMut(FieldPath, &Value),
) {
    let Some((segment, rest)) = rest.split_first() else {
        visit(path, value);
        return;
    };
    match (segment, value) {
        (Segment::Field(name) | Segment::Key(name), Value::Object(object)) => {
            if let Some(child) = object.get(name) {
                let child_path = match segment {
                    Segment::Field(_) => path.field(name),
                    _ => path.key(name),
                };
                expand(child, child_path, rest, visit);
            }
        }
        (Segment::Index(index), Value::Array(items)) => {
            if let Some(child) = items.get(*index) {
                expand(child, path.index(*index), rest, visit);
            }
        }
        (Segment::Wildcard, Value::Array(items)) => {
            for (index, child) in items.iter().enumerate() {
                expand(child, path.index(index), rest, visit);
            }
        }
        (Segment::Wildcard, Value::Object(object)) => {
            for (key, child) in object {
                expand(child, path.key(key), rest, visit);
            }
        }
        _ => {}
    }
}

fn write_default(json: &mut Value, path: &FieldPath, value: &Value) {
    let Some((Segment::Field(leaf), parents)) = path.segments().split_last() else {
        return;
    };
    let mut current = json;
    for segment in parents {
        let next = match (segment, current) {
            (Segment::Field(name) | Segment::Key(name), Value::Object(object)) => {
                object.get_mut(name)
            }
            (Segment::Index(index), Value::Array(items)) => items.get_mut(*index),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Value::Object(object) = current {
        let mut wrapped = Map::new();
        wrapped.insert("default".into(), value.clone());
        object.insert(leaf.clone(), Value::Object(wrapped));
    }
}

/// Referenced library schedules that the model does not define yet.
fn materialize_library_schedules(model: &mut BuildingModel) {
    let mut referenced: Vec<ScheduleId> = Vec::new();
    for zone in &model.zones {
        if let Some(people) = zone.people.value() {
            referenced.push(people.schedule.clone());
            referenced.push(people.activity_schedule.clone());
        }
        for load in [zone.lighting.value(), zone.equipment.value()]
            .into_iter()
            .flatten()
        {
            referenced.push(load.schedule.clone());
        }
    }
    for system in &model.hvac_systems {
        if let Some(schedule) = system.availability_schedule.value() {
            referenced.push(schedule.clone());
        }
    }
    for id in referenced {
        if id.scope.is_none()
            && LIBRARY_NAMES.contains(&id.name.as_str())
            && !model.schedules.contains_key(&id)
        {
            debug!("adding library schedule {id}");
            let name = id.name.clone();
            model.schedules.insert(id, Schedule::Library { name });
        }
    }
}
