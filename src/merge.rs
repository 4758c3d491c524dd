//! Merging one dialogue answer into a copy of a model.
//!
//! An answer is a JSON value for a [`FieldPath`]. It is written into the
//! serialized model and the result deserialized again, so the value is type
//! checked by the same serde definitions that load models from files. The
//! input model is never modified; a rejected answer leaves no trace.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{BoundaryCondition, BuildingModel, Field, HvacSystem};
use crate::path::{FieldPath, Segment};

/// Returns the model with `value` stored at `path` as an explicit value.
///
/// Two paths get structural treatment:
/// - `zones[i].hvac_system` with a system id attaches the zone to that system
///   and detaches it from any other; with an object it creates a new system
///   serving only this zone. Zones written as a whole attach to the system
///   they name the same way.
/// - `surfaces["x"].boundary_condition` with `{ surface_ref: "y" }` also
///   points `y` back at `x` when `y` has no boundary condition yet.
pub fn merge_answer(model: &BuildingModel, path: &FieldPath, value: Value) -> Result<BuildingModel> {
    let reject = |reason: String| Error::AnswerRejected {
        path: path.clone(),
        reason,
    };
    if value.is_null() {
        return Err(reject("an answer needs a value".into()));
    }

    if let Some(zone) = hvac_assignment(path) {
        return assign_hvac(model, zone, value).map_err(reject);
    }

    let mut json = serde_json::to_value(model).map_err(|e| reject(e.to_string()))?;
    write(&mut json, path, value).map_err(reject)?;
    let mut merged: BuildingModel =
        serde_json::from_value(json).map_err(|e| reject(e.to_string()))?;

    let written = serde_json::to_value(&merged).map_err(|e| reject(e.to_string()))?;
    if read(&written, path).map_or(true, Value::is_null) {
        return Err(reject("the model has no such field".into()));
    }

    if let Some(surface) = boundary_assignment(path) {
        pair_back(&mut merged, surface);
    }
    attach_reassigned_zones(model, &mut merged);
    debug!(%path, "merged answer");
    Ok(merged)
}

/// Index of the zone for paths of the form `zones[i].hvac_system`.
fn hvac_assignment(path: &FieldPath) -> Option<usize> {
    match path.segments() {
        [Segment::Field(zones), Segment::Index(index), Segment::Field(field)]
            if zones == "zones" && field == "hvac_system" =>
        {
            Some(*index)
        }
        _ => None,
    }
}

/// Surface id for paths of the form `surfaces["x"].boundary_condition`.
fn boundary_assignment(path: &FieldPath) -> Option<&str> {
    match path.segments() {
        [Segment::Field(surfaces), Segment::Key(id), Segment::Field(field)]
            if surfaces == "surfaces" && field == "boundary_condition" =>
        {
            Some(id.as_str())
        }
        _ => None,
    }
}

fn assign_hvac(
    model: &BuildingModel,
    zone_index: usize,
    value: Value,
) -> Result<BuildingModel, String> {
    let zone_name = model
        .zones
        .get(zone_index)
        .map(|zone| zone.name.clone())
        .ok_or_else(|| format!("there is no zone {zone_index}"))?;
    let mut merged = model.clone();

    let id = match value {
        Value::String(id) => {
            if merged.hvac_system(&id).is_none() {
                return Err(format!("HVAC system {id:?} does not exist"));
            }
            id
        }
        Value::Object(mut object) => {
            object
                .entry("id")
                .or_insert_with(|| Value::String(format!("{zone_name} HVAC")));
            object.insert("serving_zones".into(), Value::Array(Vec::new()));
            let system: HvacSystem =
                serde_json::from_value(Value::Object(object)).map_err(|e| e.to_string())?;
            if merged.hvac_system(&system.id).is_some() {
                return Err(format!("HVAC system {:?} already exists", system.id));
            }
            let id = system.id.clone();
            merged.hvac_systems.push(system);
            id
        }
        other => return Err(format!("expected a system id or a system, got {other}")),
    };

    attach(&mut merged, &zone_name, &id);
    merged.zones[zone_index].hvac_system = Field::Explicit(id);
    Ok(merged)
}

/// Makes `id` the only system serving `zone`.
fn attach(model: &mut BuildingModel, zone: &str, id: &str) {
    for system in &mut model.hvac_systems {
        if system.id == id {
            system.serving_zones.insert(zone.to_string());
        } else {
            system.serving_zones.remove(zone);
        }
    }
    debug!(zone, system = id, "attached zone to HVAC system");
}

/// Zones whose `hvac_system` differs from `before` join that system.
fn attach_reassigned_zones(before: &BuildingModel, merged: &mut BuildingModel) {
    let changed: Vec<(String, String)> = merged
        .zones
        .iter()
        .filter_map(|zone| {
            let id = zone.hvac_system.value()?;
            let previous = before
                .zone(&zone.name)
                .and_then(|zone| zone.hvac_system.value());
            (previous != Some(id)).then(|| (zone.name.clone(), id.clone()))
        })
        .collect();
    for (zone, id) in changed {
        attach(merged, &zone, &id);
    }
}

fn pair_back(model: &mut BuildingModel, surface: &str) {
    let Some(BoundaryCondition::SurfaceRef(partner)) = model
        .surfaces
        .get(surface)
        .and_then(|surface| surface.boundary_condition.value())
        .cloned()
    else {
        return;
    };
    if let Some(other) = model.surfaces.get_mut(&partner) {
        if other.boundary_condition.is_absent() {
            other.boundary_condition =
                Field::Explicit(BoundaryCondition::SurfaceRef(surface.to_string()));
            debug!(surface, partner, "paired surface back");
        }
    }
}

/// A field that holds a defaulted value, `{ default: v }`, is edited as `v`.
fn unwrap_default(value: &mut Value) {
    if let Value::Object(object) = value {
        if object.len() == 1 {
            if let Some(inner) = object.remove("default") {
                *value = inner;
            }
        }
    }
}

/// Child of `value` at `segment`, created when missing. Containers on the
/// way are created to suit the following segment; one past the end of a
/// list appends.
fn child_mut<'v>(
    value: &'v mut Value,
    segment: &Segment,
    next: Option<&Segment>,
) -> Result<&'v mut Value, String> {
    let container = || match next {
        Some(Segment::Index(_)) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    };
    let child = match segment {
        Segment::Field(name) | Segment::Key(name) => {
            if value.is_null() {
                *value = Value::Object(Map::new());
            }
            let Value::Object(object) = value else {
                return Err(format!("{name:?} is not inside an object"));
            };
            object.entry(name.clone()).or_insert(Value::Null)
        }
        Segment::Index(index) => {
            if value.is_null() {
                *value = Value::Array(Vec::new());
            }
            let Value::Array(items) = value else {
                return Err(format!("[{index}] is not inside a list"));
            };
            if *index == items.len() {
                items.push(Value::Null);
            }
            items
                .get_mut(*index)
                .ok_or_else(|| format!("[{index}] is past the end of the list"))?
        }
        Segment::Wildcard => return Err("an answer needs a concrete path".into()),
    };
    if next.is_some() && child.is_null() {
        *child = container();
    }
    if let Some(Segment::Field(_)) = next {
        unwrap_default(child);
    }
    Ok(child)
}

fn write(json: &mut Value, path: &FieldPath, value: Value) -> Result<(), String> {
    let segments = path.segments();
    if segments.is_empty() {
        return Err("an answer cannot replace the whole model".into());
    }
    let mut current = json;
    for (i, segment) in segments.iter().enumerate() {
        current = child_mut(current, segment, segments.get(i + 1))?;
    }
    *current = value;
    Ok(())
}

fn read<'v>(json: &'v Value, path: &FieldPath) -> Option<&'v Value> {
    let mut current = json;
    for segment in path.segments() {
        if let Value::Object(object) = current {
            if let (1, Some(inner)) = (object.len(), object.get("default")) {
                if matches!(segment, Segment::Field(_)) {
                    current = inner;
                }
            }
        }
        current = match (segment, current) {
            (Segment::Field(name) | Segment::Key(name), Value::Object(object)) => object.get(name)?,
            (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}
