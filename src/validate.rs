use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uom::si::{
    area::square_meter, heat_flux_density::watt_per_square_meter,
    heat_transfer::watt_per_square_meter_kelvin, length::meter, volume::cubic_meter,
};

use crate::error::ValidationError;
use crate::idf;
use crate::model::*;
use crate::path::FieldPath;
use crate::schedule::{
    library_schedule, MonthDay, Schedule, SchedulePeriod, ScheduleTypeLimits, TimeOfDay,
    LIBRARY_NAMES,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueClass {
    Completeness,
    ReferentialIntegrity,
    Consistency,
    Range,
    Identifier,
    Unsupported,
    Plausibility,
    Reachability,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    MissingRequired,
    MissingOptional,
    DanglingReference,
    AsymmetricSurfacePair,
    HvacMismatch,
    SurfaceOwnership,
    DuplicateId,
    OutOfRange,
    DegenerateGeometry,
    InvalidSchedule,
    InvalidIdentifier,
    LongIdentifier,
    UnsupportedField,
    ConflictingObject,
    ImplausibleValue,
    Unreferenced,
}

impl IssueCode {
    pub fn class(self) -> IssueClass {
        match self {
            IssueCode::MissingRequired | IssueCode::MissingOptional => IssueClass::Completeness,
            IssueCode::DanglingReference => IssueClass::ReferentialIntegrity,
            IssueCode::AsymmetricSurfacePair
            | IssueCode::HvacMismatch
            | IssueCode::SurfaceOwnership
            | IssueCode::DuplicateId
            | IssueCode::ConflictingObject => IssueClass::Consistency,
            IssueCode::OutOfRange | IssueCode::DegenerateGeometry | IssueCode::InvalidSchedule => {
                IssueClass::Range
            }
            IssueCode::InvalidIdentifier | IssueCode::LongIdentifier => IssueClass::Identifier,
            IssueCode::UnsupportedField => IssueClass::Unsupported,
            IssueCode::ImplausibleValue => IssueClass::Plausibility,
            IssueCode::Unreferenced => IssueClass::Reachability,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: FieldPath,
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
}

impl ValidationIssue {
    pub fn class(&self) -> IssueClass {
        self.code.class()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Issues in authoring order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(Severity::Warning)
    }

    fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.severity == severity)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn issues_at<'a>(
        &'a self,
        path: &'a FieldPath,
    ) -> impl Iterator<Item = &'a ValidationIssue> + 'a {
        self.issues.iter().filter(move |issue| &issue.path == path)
    }

    pub fn completion_state(&self) -> CompletionState {
        let paths_with = |code| {
            self.issues
                .iter()
                .filter(move |issue| issue.code == code)
                .map(|issue| issue.path.clone())
                .unique()
                .collect()
        };
        CompletionState {
            missing_required: paths_with(IssueCode::MissingRequired),
            missing_optional: paths_with(IssueCode::MissingOptional),
            violations: self
                .issues
                .iter()
                .filter(|issue| {
                    !matches!(
                        issue.code,
                        IssueCode::MissingRequired | IssueCode::MissingOptional
                    )
                })
                .cloned()
                .collect(),
        }
    }

    /// Fail with every Error-severity issue, or pass the report through.
    pub fn into_result(self) -> Result<ValidationReport, ValidationError> {
        if self.has_errors() {
            Err(ValidationError {
                issues: self.errors().cloned().collect(),
            })
        } else {
            Ok(self)
        }
    }
}

/// Derived summary of what a model still lacks. Never authored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionState {
    pub missing_required: Vec<FieldPath>,
    pub missing_optional: Vec<FieldPath>,
    pub violations: Vec<ValidationIssue>,
}

impl CompletionState {
    /// No missing required fields and no Error-severity violations.
    pub fn is_resolved(&self) -> bool {
        self.missing_required.is_empty() && !self.violations.iter().any(ValidationIssue::is_error)
    }
}

/// Thresholds for unusual-but-legal values. They come from policy data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlausibilityLimits {
    /// Exterior construction U-value ranges; the entry for the model's
    /// climate zone wins over the one without a zone.
    #[serde(default = "default_u_value_limits")]
    pub u_value: Vec<UValueLimit>,
    /// Allowed relative difference between a zone's floor area and the
    /// area of its floor surfaces.
    #[serde(default = "default_floor_area_tolerance")]
    pub floor_area_tolerance: f64,
    #[serde(default = "default_max_identifier_length")]
    pub max_identifier_length: usize,
}

/// U-value range in W/(m²·K).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UValueLimit {
    #[serde(default)]
    pub climate_zone: Option<ClimateZone>,
    pub min: f64,
    pub max: f64,
}

fn default_u_value_limits() -> Vec<UValueLimit> {
    vec![UValueLimit {
        climate_zone: None,
        min: 0.1,
        max: 6.0,
    }]
}

fn default_floor_area_tolerance() -> f64 {
    0.1
}

fn default_max_identifier_length() -> usize {
    100
}

impl Default for PlausibilityLimits {
    fn default() -> Self {
        PlausibilityLimits {
            u_value: default_u_value_limits(),
            floor_area_tolerance: default_floor_area_tolerance(),
            max_identifier_length: default_max_identifier_length(),
        }
    }
}

impl PlausibilityLimits {
    pub fn u_value_for(&self, climate_zone: Option<&ClimateZone>) -> Option<&UValueLimit> {
        climate_zone
            .and_then(|zone| {
                self.u_value
                    .iter()
                    .find(|limit| limit.climate_zone.as_ref() == Some(zone))
            })
            .or_else(|| self.u_value.iter().find(|limit| limit.climate_zone.is_none()))
    }
}

pub fn validate(model: &BuildingModel) -> ValidationReport {
    validate_with(model, &PlausibilityLimits::default())
}

/// Check a possibly partial model. Never fails; everything found is an issue.
pub fn validate_with(model: &BuildingModel, limits: &PlausibilityLimits) -> ValidationReport {
    let mut validator = Validator {
        model,
        limits,
        owners: model.surface_owners(),
        issues: Vec::new(),
    };
    validator.run();
    debug!(
        issues = validator.issues.len(),
        errors = validator
            .issues
            .iter()
            .filter(|issue| issue.is_error())
            .count(),
        "validated model"
    );
    ValidationReport {
        issues: validator.issues,
    }
}

/// Problem with a name used as an IDF identifier, if any.
pub fn identifier_problem(name: &str, allow_slash: bool) -> Option<&'static str> {
    if name.is_empty() {
        Some("is empty")
    } else if name.trim() != name {
        Some("has leading or trailing whitespace")
    } else if name.contains(|c| matches!(c, ',' | ';' | '!')) {
        Some("contains ',', ';' or '!'")
    } else if !allow_slash && name.contains('/') {
        Some("contains '/'")
    } else if name.chars().any(char::is_control) {
        Some("contains control characters")
    } else {
        None
    }
}

struct Validator<'a> {
    model: &'a BuildingModel,
    limits: &'a PlausibilityLimits,
    owners: BTreeMap<&'a str, Vec<&'a str>>,
    issues: Vec<ValidationIssue>,
}

impl<'a> Validator<'a> {
    fn run(&mut self) {
        self.metadata();
        self.settings();
        self.zones();
        self.unowned_surfaces();
        self.constructions();
        self.materials();
        self.schedules();
        self.hvac_systems();
        self.extra_objects();
        self.reachability();
    }

    fn push(&mut self, path: FieldPath, severity: Severity, code: IssueCode, message: String) {
        self.issues.push(ValidationIssue {
            path,
            severity,
            code,
            message,
        });
    }

    fn error(&mut self, path: FieldPath, code: IssueCode, message: impl Into<String>) {
        self.push(path, Severity::Error, code, message.into());
    }

    fn warning(&mut self, path: FieldPath, code: IssueCode, message: impl Into<String>) {
        self.push(path, Severity::Warning, code, message.into());
    }

    fn required<T>(&mut self, path: FieldPath, field: &'a Field<T>) -> Option<&'a T> {
        if field.is_absent() {
            let message = format!("{path} is required");
            self.error(path, IssueCode::MissingRequired, message);
        }
        field.value()
    }

    fn optional<T>(&mut self, path: FieldPath, field: &'a Field<T>) -> Option<&'a T> {
        if field.is_absent() {
            let message = format!("{path} is not set and has no default");
            self.warning(path, IssueCode::MissingOptional, message);
        }
        field.value()
    }

    /// Range check; `expected` describes the valid range.
    fn check(&mut self, path: FieldPath, ok: bool, value: impl std::fmt::Display, expected: &str) {
        if !ok {
            self.error(
                path,
                IssueCode::OutOfRange,
                format!("{value} is out of range, expected {expected}"),
            );
        }
    }

    fn positive(&mut self, path: FieldPath, value: f64) {
        self.check(path, value.is_finite() && value > 0.0, value, "a positive number");
    }

    fn fraction(&mut self, path: FieldPath, value: f64) {
        self.check(path, (0.0..=1.0).contains(&value), value, "a value in [0, 1]");
    }

    fn identifier(&mut self, path: FieldPath, name: &str, allow_slash: bool) {
        if let Some(problem) = identifier_problem(name, allow_slash) {
            self.error(
                path,
                IssueCode::InvalidIdentifier,
                format!("identifier {name:?} {problem}"),
            );
        } else if name.chars().count() > self.limits.max_identifier_length {
            self.warning(
                path,
                IssueCode::LongIdentifier,
                format!(
                    "identifier {name:?} is longer than {} characters",
                    self.limits.max_identifier_length
                ),
            );
        }
    }

    fn scoped_identifier(&mut self, path: FieldPath, scope: Option<&str>, name: &str) {
        self.identifier(path.clone(), name, false);
        if let Some(scope) = scope {
            if self.model.zone(scope).is_none() {
                self.error(
                    path,
                    IssueCode::DanglingReference,
                    format!("owning zone {scope:?} does not exist"),
                );
            }
        }
    }

    fn duplicates<'n>(&mut self, path: &FieldPath, names: impl Iterator<Item = &'n str>) {
        let mut seen = HashMap::new();
        for (index, name) in names.enumerate() {
            if let Some(first) = seen.insert(name.to_lowercase(), index) {
                self.error(
                    path.index(index),
                    IssueCode::DuplicateId,
                    format!("{name:?} collides with entry {first}"),
                );
            }
        }
    }

    /// Map keys that differ only in case become the same IDF name.
    fn key_collisions<'k, K: std::fmt::Display + 'k>(
        &mut self,
        path: &FieldPath,
        keys: impl Iterator<Item = &'k K>,
    ) {
        let mut seen: HashMap<String, String> = HashMap::new();
        for key in keys {
            let name = key.to_string();
            match seen.get(&name.to_lowercase()) {
                Some(first) => {
                    let message = format!("{name:?} collides with {first:?}");
                    self.error(path.key(&name), IssueCode::DuplicateId, message);
                }
                None => {
                    seen.insert(name.to_lowercase(), name);
                }
            }
        }
    }

    fn construction_ref(&mut self, path: FieldPath, id: &ConstructionId) {
        if !self.model.constructions.contains_key(id) {
            self.error(
                path,
                IssueCode::DanglingReference,
                format!("construction {id} does not exist"),
            );
        }
    }

    fn schedule_ref(&mut self, path: FieldPath, id: &ScheduleId) {
        if !self.model.schedules.contains_key(id) {
            self.error(
                path,
                IssueCode::DanglingReference,
                format!("schedule {id} does not exist"),
            );
        }
    }

    fn metadata(&mut self) {
        let path = FieldPath::root().field("metadata");
        let model = self.model;
        let metadata = &model.metadata;
        if let Some(project_id) = self.required(path.field("project_id"), &metadata.project_id) {
            self.identifier(path.field("project_id"), project_id, true);
        }
        self.required(path.field("climate_zone"), &metadata.climate_zone);
        self.required(path.field("building_type"), &metadata.building_type);
        if let Some(&north_axis) = self.optional(path.field("north_axis"), &metadata.north_axis) {
            self.check(
                path.field("north_axis"),
                north_axis.is_finite(),
                north_axis,
                "a finite angle",
            );
        }
        self.optional(path.field("terrain"), &metadata.terrain);
    }

    fn settings(&mut self) {
        let path = FieldPath::root().field("settings");
        let model = self.model;
        let settings = &model.settings;
        if let Some(&timestep) = self.optional(path.field("timestep"), &settings.timestep) {
            self.check(
                path.field("timestep"),
                (1..=60).contains(&timestep) && 60 % timestep == 0,
                timestep,
                "a divisor of 60",
            );
        }
        if let Some(run_period) = self.optional(path.field("run_period"), &settings.run_period) {
            let run_path = path.field("run_period");
            for (name, date) in [("begin", run_period.begin), ("end", run_period.end)] {
                self.check(run_path.field(name), date.ordinal().is_some(), date, "a valid date");
            }
        }
        if let Some(location) = self.optional(path.field("location"), &settings.location) {
            let location_path = path.field("location");
            self.identifier(location_path.field("name"), &location.name, true);
            self.check(
                location_path.field("latitude"),
                (-90.0..=90.0).contains(&location.latitude),
                location.latitude,
                "degrees in [-90, 90]",
            );
            self.check(
                location_path.field("longitude"),
                (-180.0..=180.0).contains(&location.longitude),
                location.longitude,
                "degrees in [-180, 180]",
            );
            self.check(
                location_path.field("time_zone"),
                (-12.0..=14.0).contains(&location.time_zone),
                location.time_zone,
                "hours in [-12, 14]",
            );
            self.check(
                location_path.field("elevation"),
                location.elevation.is_finite(),
                location.elevation,
                "a finite elevation",
            );
        }
    }

    fn zones(&mut self) {
        let model = self.model;
        let zones_path = FieldPath::root().field("zones");
        if self.model.zones.is_empty() {
            self.error(
                zones_path.clone(),
                IssueCode::MissingRequired,
                "the building has no zones",
            );
        }
        self.duplicates(&zones_path, model.zones.iter().map(|zone| zone.name.as_str()));
        for (index, zone) in model.zones.iter().enumerate() {
            self.zone(zones_path.index(index), zone);
        }
    }

    fn zone(&mut self, path: FieldPath, zone: &'a Zone) {
        let model = self.model;
        self.identifier(path.field("name"), &zone.name, false);

        if let Some(floor_area) = self.required(path.field("floor_area"), &zone.floor_area) {
            self.positive(path.field("floor_area"), floor_area.get::<square_meter>());
        }
        if let Some(volume) = self.optional(path.field("volume"), &zone.volume) {
            self.positive(path.field("volume"), volume.get::<cubic_meter>());
        }
        if let Some(height) = self.optional(path.field("ceiling_height"), &zone.ceiling_height) {
            self.positive(path.field("ceiling_height"), height.get::<meter>());
        }
        if let Some(&multiplier) = self.optional(path.field("multiplier"), &zone.multiplier) {
            self.check(path.field("multiplier"), multiplier >= 1, multiplier, "at least 1");
        }
        if let Some(zone_list) = &zone.zone_list {
            self.identifier(path.field("zone_list"), zone_list, false);
        }

        let surfaces_path = path.field("surfaces");
        if zone.surfaces.is_empty() {
            self.error(
                surfaces_path.clone(),
                IssueCode::MissingRequired,
                format!("zone {:?} has no surfaces", zone.name),
            );
        }
        self.duplicates(&surfaces_path, zone.surfaces.iter().map(String::as_str));
        for (index, surface) in zone.surfaces.iter().enumerate() {
            if !model.surfaces.contains_key(surface) {
                self.error(
                    surfaces_path.index(index),
                    IssueCode::DanglingReference,
                    format!("surface {surface:?} does not exist"),
                );
            }
        }

        if let Some(hvac_id) = self.required(path.field("hvac_system"), &zone.hvac_system) {
            match model.hvac_system(hvac_id) {
                None => self.error(
                    path.field("hvac_system"),
                    IssueCode::DanglingReference,
                    format!("HVAC system {hvac_id:?} does not exist"),
                ),
                Some(system) if !system.serving_zones.contains(&zone.name) => self.error(
                    path.field("hvac_system"),
                    IssueCode::HvacMismatch,
                    format!("HVAC system {hvac_id:?} does not list zone {:?}", zone.name),
                ),
                Some(_) => {}
            }
        }

        for (index, mass) in zone.internal_mass.iter().enumerate() {
            let mass_path = path.field("internal_mass").index(index);
            self.construction_ref(mass_path.field("construction"), &mass.construction);
            self.positive(mass_path.field("area"), mass.area.get::<square_meter>());
        }
        if let Some(people) = self.optional(path.field("people"), &zone.people) {
            let people_path = path.field("people");
            self.check(
                people_path.field("people_per_area"),
                people.people_per_area.is_finite() && people.people_per_area >= 0.0,
                people.people_per_area,
                "a non-negative density",
            );
            self.schedule_ref(people_path.field("schedule"), &people.schedule);
            self.schedule_ref(
                people_path.field("activity_schedule"),
                &people.activity_schedule,
            );
        }
        for name in ["lighting", "equipment"] {
            let field = if name == "lighting" {
                &zone.lighting
            } else {
                &zone.equipment
            };
            if let Some(load) = self.optional(path.field(name), field) {
                let density = load.power_density.get::<watt_per_square_meter>();
                self.check(
                    path.field(name).field("power_density"),
                    density.is_finite() && density >= 0.0,
                    density,
                    "a non-negative power density",
                );
                self.schedule_ref(path.field(name).field("schedule"), &load.schedule);
            }
        }

        self.floor_area_plausibility(&path, zone);

        for surface_id in &zone.surfaces {
            let first_owner = self
                .owners
                .get(surface_id.as_str())
                .and_then(|owners| owners.first())
                .copied();
            if first_owner != Some(zone.name.as_str()) {
                continue;
            }
            if let Some((id, surface)) = model.surfaces.get_key_value(surface_id) {
                self.surface(id, surface);
            }
        }
    }

    fn floor_area_plausibility(&mut self, path: &FieldPath, zone: &Zone) {
        let Some(floor_area) = zone.floor_area.get() else {
            return;
        };
        let floor_surfaces: f64 = zone
            .surfaces
            .iter()
            .filter_map(|id| self.model.surfaces.get(id))
            .filter(|surface| surface.surface_type.get() == Some(SurfaceType::Floor))
            .map(|surface| surface.area().get::<square_meter>())
            .sum();
        let declared = floor_area.get::<square_meter>();
        if floor_surfaces > 0.0
            && declared > 0.0
            && ((floor_surfaces - declared) / declared).abs() > self.limits.floor_area_tolerance
        {
            self.warning(
                path.field("floor_area"),
                IssueCode::ImplausibleValue,
                format!(
                    "floor area {declared} m² differs from floor surface area {floor_surfaces:.2} m²"
                ),
            );
        }
    }

    fn unowned_surfaces(&mut self) {
        let model = self.model;
        self.key_collisions(&FieldPath::root().field("surfaces"), model.surfaces.keys());
        for (id, surface) in &model.surfaces {
            if !self.owners.contains_key(id.as_str()) {
                self.surface(id, surface);
            }
        }
    }

    fn surface(&mut self, id: &'a SurfaceId, surface: &'a Surface) {
        let path = FieldPath::root().field("surfaces").key(id);
        self.identifier(path.clone(), id, true);

        let owners = self.owners.get(id.as_str()).cloned().unwrap_or_default();
        match owners.as_slice() {
            [] => self.error(
                path.clone(),
                IssueCode::SurfaceOwnership,
                format!("surface {id:?} is not listed by any zone"),
            ),
            [_] => {}
            owners => {
                let message = format!("surface {id:?} is listed by zones {}", owners.join(", "));
                self.error(path.clone(), IssueCode::SurfaceOwnership, message)
            }
        }

        self.required(path.field("surface_type"), &surface.surface_type);
        if let Some(construction) = self.required(path.field("construction"), &surface.construction)
        {
            self.construction_ref(path.field("construction"), construction);
        }

        let boundary = self.required(path.field("boundary_condition"), &surface.boundary_condition);
        if let Some(BoundaryCondition::SurfaceRef(partner)) = boundary {
            let boundary_path = path.field("boundary_condition");
            if partner == id {
                self.error(
                    boundary_path,
                    IssueCode::AsymmetricSurfacePair,
                    format!("surface {id:?} refers to itself"),
                );
            } else {
                match self.model.surfaces.get(partner) {
                    None => self.error(
                        boundary_path,
                        IssueCode::DanglingReference,
                        format!("partner surface {partner:?} does not exist"),
                    ),
                    Some(other) => {
                        let back = matches!(
                            other.boundary_condition.value(),
                            Some(BoundaryCondition::SurfaceRef(back)) if back == id
                        );
                        if !back {
                            self.error(
                                boundary_path,
                                IssueCode::AsymmetricSurfacePair,
                                format!("partner surface {partner:?} does not refer back to {id:?}"),
                            );
                        }
                    }
                }
            }
        }

        let vertices_path = path.field("vertices");
        match surface.vertices.len() {
            0 => self.error(
                vertices_path,
                IssueCode::MissingRequired,
                format!("surface {id:?} has no vertices"),
            ),
            1 | 2 => self.error(
                vertices_path,
                IssueCode::DegenerateGeometry,
                format!("surface {id:?} has fewer than 3 vertices"),
            ),
            _ if surface
                .vertices
                .iter()
                .any(|vertex| vertex.iter().any(|c| !c.is_finite())) =>
            {
                self.error(
                    vertices_path,
                    IssueCode::OutOfRange,
                    format!("surface {id:?} has non-finite coordinates"),
                )
            }
            _ if surface.area().get::<square_meter>() < 1e-6 => self.error(
                vertices_path,
                IssueCode::DegenerateGeometry,
                format!("surface {id:?} has zero area"),
            ),
            _ => {}
        }

        if let Some(&view_factor) = surface.view_factor_to_ground.value() {
            self.fraction(path.field("view_factor_to_ground"), view_factor);
        }

        if boundary == Some(&BoundaryCondition::Outdoors) {
            self.u_value_plausibility(&path, surface);
        }
    }

    fn u_value_plausibility(&mut self, path: &FieldPath, surface: &Surface) {
        let Some(construction) = surface.construction.value() else {
            return;
        };
        let Some(u_value) = self.model.construction_u_value(construction) else {
            return;
        };
        let Some(limit) = self
            .limits
            .u_value_for(self.model.metadata.climate_zone.value())
        else {
            return;
        };
        let u_value = u_value.get::<watt_per_square_meter_kelvin>();
        if !(limit.min..=limit.max).contains(&u_value) {
            self.warning(
                path.field("construction"),
                IssueCode::ImplausibleValue,
                format!(
                    "U-value {u_value:.3} W/(m²·K) of {construction} is outside the typical range {}..{}",
                    limit.min, limit.max
                ),
            );
        }
    }

    fn constructions(&mut self) {
        let model = self.model;
        let constructions_path = FieldPath::root().field("constructions");
        self.key_collisions(&constructions_path, model.constructions.keys());
        for (id, construction) in &model.constructions {
            let path = constructions_path.key(id);
            self.scoped_identifier(path.clone(), id.scope.as_deref(), &id.name);
            if construction.layers.is_empty() {
                self.error(
                    path.field("layers"),
                    IssueCode::MissingRequired,
                    format!("construction {id} has no layers"),
                );
            }
            for (index, layer) in construction.layers.iter().enumerate() {
                if !self.model.materials.contains_key(layer) {
                    self.error(
                        path.field("layers").index(index),
                        IssueCode::DanglingReference,
                        format!("material {layer} does not exist"),
                    );
                }
            }
        }
    }

    fn materials(&mut self) {
        let model = self.model;
        let materials_path = FieldPath::root().field("materials");
        self.key_collisions(&materials_path, model.materials.keys());
        for (id, material) in &model.materials {
            let path = materials_path.key(id);
            self.scoped_identifier(path.clone(), id.scope.as_deref(), &id.name);
            match material {
                Material::Standard(material) => {
                    self.optional(path.field("roughness"), &material.roughness);
                    if let Some(thickness) = self.required(path.field("thickness"), &material.thickness)
                    {
                        self.positive(path.field("thickness"), thickness.get::<meter>());
                    }
                    if let Some(conductivity) =
                        self.required(path.field("conductivity"), &material.conductivity)
                    {
                        self.positive(path.field("conductivity"), conductivity.value);
                    }
                    if let Some(density) = self.required(path.field("density"), &material.density) {
                        self.positive(path.field("density"), density.value);
                    }
                    if let Some(specific_heat) =
                        self.required(path.field("specific_heat"), &material.specific_heat)
                    {
                        self.positive(path.field("specific_heat"), specific_heat.value);
                    }
                    for (name, field) in [
                        ("thermal_absorptance", &material.thermal_absorptance),
                        ("solar_absorptance", &material.solar_absorptance),
                        ("visible_absorptance", &material.visible_absorptance),
                    ] {
                        if let Some(&value) = self.optional(path.field(name), field) {
                            self.fraction(path.field(name), value);
                        }
                    }
                }
                Material::NoMass(material) => {
                    self.optional(path.field("roughness"), &material.roughness);
                    if let Some(&resistance) =
                        self.required(path.field("thermal_resistance"), &material.thermal_resistance)
                    {
                        self.positive(path.field("thermal_resistance"), resistance);
                    }
                }
                Material::SimpleGlazing(material) => {
                    if let Some(u_factor) = self.required(path.field("u_factor"), &material.u_factor)
                    {
                        self.positive(
                            path.field("u_factor"),
                            u_factor.get::<watt_per_square_meter_kelvin>(),
                        );
                    }
                    if let Some(&shgc) = self.required(path.field("shgc"), &material.shgc) {
                        self.fraction(path.field("shgc"), shgc);
                    }
                    if let Some(&transmittance) = self.optional(
                        path.field("visible_transmittance"),
                        &material.visible_transmittance,
                    ) {
                        self.fraction(path.field("visible_transmittance"), transmittance);
                    }
                }
            }
        }
    }

    fn schedules(&mut self) {
        let model = self.model;
        let schedules_path = FieldPath::root().field("schedules");
        self.key_collisions(&schedules_path, model.schedules.keys());
        for (id, schedule) in &model.schedules {
            let path = schedules_path.key(id);
            self.scoped_identifier(path.clone(), id.scope.as_deref(), &id.name);
            if !matches!(schedule, Schedule::Library { .. })
                && id.scope.is_none()
                && library_schedule(&id.name).as_ref() == Some(schedule)
            {
                self.error(
                    path.clone(),
                    IssueCode::ConflictingObject,
                    format!(
                        "{:?} repeats the library schedule; store it as the library schedule",
                        id.name
                    ),
                );
            }
            match schedule {
                Schedule::Library { name } => {
                    if library_schedule(name).is_none() {
                        self.error(
                            path.field("name"),
                            IssueCode::DanglingReference,
                            format!(
                                "{name:?} is not a library schedule (known: {})",
                                LIBRARY_NAMES.join(", ")
                            ),
                        );
                    } else if &id.name != name {
                        self.error(
                            path.clone(),
                            IssueCode::InvalidIdentifier,
                            format!("library schedule {name:?} must be stored under its own name"),
                        );
                    }
                }
                Schedule::Constant { type_limits, value } => {
                    if !type_limits.accepts(*value) {
                        self.error(
                            path.field("value"),
                            IssueCode::OutOfRange,
                            format!("{value} is outside {} limits", type_limits.idf_name()),
                        );
                    }
                }
                Schedule::Compact {
                    type_limits,
                    periods,
                } => self.compact_schedule(&path, *type_limits, periods),
            }
        }
    }

    fn compact_schedule(
        &mut self,
        path: &FieldPath,
        type_limits: ScheduleTypeLimits,
        periods: &[SchedulePeriod],
    ) {
        let periods_path = path.field("periods");
        if periods.is_empty() {
            self.error(
                periods_path.clone(),
                IssueCode::InvalidSchedule,
                "schedule has no periods",
            );
            return;
        }
        let mut previous_day = 0;
        for (index, period) in periods.iter().enumerate() {
            let period_path = periods_path.index(index);
            match period.through.ordinal() {
                None => self.error(
                    period_path.field("through"),
                    IssueCode::InvalidSchedule,
                    format!("{} is not a date", period.through),
                ),
                Some(day) if day <= previous_day => self.error(
                    period_path.field("through"),
                    IssueCode::InvalidSchedule,
                    format!("period through {} overlaps the previous one", period.through),
                ),
                Some(day) => previous_day = day,
            }

            let until_path = period_path.field("until");
            if period.until.is_empty() {
                self.error(
                    until_path.clone(),
                    IssueCode::InvalidSchedule,
                    "day profile is empty",
                );
                continue;
            }
            if period.until[0].time == TimeOfDay(0) {
                self.error(
                    until_path.index(0),
                    IssueCode::InvalidSchedule,
                    "first interval ends at 00:00",
                );
            }
            for (position, (a, b)) in period.until.iter().tuple_windows().enumerate() {
                if b.time <= a.time {
                    self.error(
                        until_path.index(position + 1),
                        IssueCode::InvalidSchedule,
                        format!("until {} does not follow {}", b.time, a.time),
                    );
                }
            }
            if let Some(last) = period.until.last() {
                if last.time != TimeOfDay::END_OF_DAY {
                    self.error(
                        until_path.index(period.until.len() - 1),
                        IssueCode::InvalidSchedule,
                        format!("day profile ends at {} instead of 24:00", last.time),
                    );
                }
            }
            for (position, entry) in period.until.iter().enumerate() {
                if !type_limits.accepts(entry.value) {
                    self.error(
                        until_path.index(position).field("value"),
                        IssueCode::OutOfRange,
                        format!("{} is outside {} limits", entry.value, type_limits.idf_name()),
                    );
                }
            }
        }
        if let Some(last) = periods.last() {
            if last.through != MonthDay::YEAR_END {
                self.error(
                    periods_path.index(periods.len() - 1).field("through"),
                    IssueCode::InvalidSchedule,
                    format!("last period ends on {} instead of 12/31", last.through),
                );
            }
        }
    }

    fn hvac_systems(&mut self) {
        let model = self.model;
        let systems_path = FieldPath::root().field("hvac_systems");
        self.duplicates(
            &systems_path,
            model.hvac_systems.iter().map(|system| system.id.as_str()),
        );
        for (index, system) in model.hvac_systems.iter().enumerate() {
            self.hvac_system(systems_path.index(index), system);
        }
    }

    fn hvac_system(&mut self, path: FieldPath, system: &'a HvacSystem) {
        self.identifier(path.field("id"), &system.id, false);

        for zone_name in &system.serving_zones {
            match self.model.zone(zone_name) {
                None => self.error(
                    path.field("serving_zones"),
                    IssueCode::DanglingReference,
                    format!("served zone {zone_name:?} does not exist"),
                ),
                Some(zone) if zone.hvac_system.value() != Some(&system.id) => self.error(
                    path.field("serving_zones"),
                    IssueCode::HvacMismatch,
                    format!("zone {zone_name:?} is not attached to {:?}", system.id),
                ),
                Some(_) => {}
            }
        }
        let referenced = !system.serving_zones.is_empty()
            || self
                .model
                .zones
                .iter()
                .any(|zone| zone.hvac_system.value() == Some(&system.id));

        if let HvacKind::RadiantLoop { .. } = system.kind {
            if referenced {
                self.error(
                    path,
                    IssueCode::UnsupportedField,
                    format!("radiant loop {:?} has no IDF template", system.id),
                );
            } else {
                self.warning(
                    path,
                    IssueCode::UnsupportedField,
                    format!(
                        "radiant loop {:?} has no IDF template and is dropped at encode",
                        system.id
                    ),
                );
            }
            return;
        }
        if !referenced {
            self.warning(
                path.clone(),
                IssueCode::ImplausibleValue,
                format!("HVAC system {:?} serves no zone and is dropped at encode", system.id),
            );
        }

        if let Some(schedule) =
            self.optional(path.field("availability_schedule"), &system.availability_schedule)
        {
            self.schedule_ref(path.field("availability_schedule"), schedule);
        }
        let heating = self.required(path.field("heating_setpoint"), &system.heating_setpoint);
        let cooling = self.required(path.field("cooling_setpoint"), &system.cooling_setpoint);
        for (name, setpoint) in [("heating_setpoint", heating), ("cooling_setpoint", cooling)] {
            if let Some(&setpoint) = setpoint {
                self.check(
                    path.field(name),
                    (-50.0..=60.0).contains(&setpoint),
                    setpoint,
                    "°C in [-50, 60]",
                );
            }
        }
        if let (Some(&heating), Some(&cooling)) = (heating, cooling) {
            if heating >= cooling {
                self.error(
                    path.field("cooling_setpoint"),
                    IssueCode::OutOfRange,
                    format!("cooling setpoint {cooling} must be above heating setpoint {heating}"),
                );
            }
        }

        match &system.kind {
            HvacKind::Simple {
                outdoor_air_per_person,
            } => self.outdoor_air(&path, outdoor_air_per_person),
            HvacKind::PackagedUnit {
                cooling_cop,
                heating_coil,
                gas_burner_efficiency,
                outdoor_air_per_person,
            } => {
                if let Some(&cop) = self.optional(path.field("cooling_cop"), cooling_cop) {
                    self.positive(path.field("cooling_cop"), cop);
                }
                let coil = self.optional(path.field("heating_coil"), heating_coil);
                if coil == Some(&HeatingCoil::HotWater) {
                    self.error(
                        path.field("heating_coil"),
                        IssueCode::UnsupportedField,
                        "hot water heating coils need a plant loop, which is not modelled",
                    );
                }
                if let Some(&efficiency) = gas_burner_efficiency.value() {
                    self.check(
                        path.field("gas_burner_efficiency"),
                        efficiency > 0.0 && efficiency <= 1.0,
                        efficiency,
                        "a value in (0, 1]",
                    );
                } else if coil == Some(&HeatingCoil::Gas) {
                    self.optional(path.field("gas_burner_efficiency"), gas_burner_efficiency);
                }
                self.outdoor_air(&path, outdoor_air_per_person);
            }
            HvacKind::Vav {
                reheat_coil,
                minimum_flow_fraction,
                supply_air_temperature,
            } => {
                if self.optional(path.field("reheat_coil"), reheat_coil)
                    == Some(&ReheatCoil::HotWater)
                {
                    self.error(
                        path.field("reheat_coil"),
                        IssueCode::UnsupportedField,
                        "hot water reheat needs a plant loop, which is not modelled",
                    );
                }
                if let Some(&fraction) =
                    self.optional(path.field("minimum_flow_fraction"), minimum_flow_fraction)
                {
                    self.fraction(path.field("minimum_flow_fraction"), fraction);
                }
                if let Some(&temperature) =
                    self.optional(path.field("supply_air_temperature"), supply_air_temperature)
                {
                    self.check(
                        path.field("supply_air_temperature"),
                        (4.0..=30.0).contains(&temperature),
                        temperature,
                        "°C in [4, 30]",
                    );
                }
            }
            HvacKind::RadiantLoop { .. } => {}
        }
    }

    fn outdoor_air(&mut self, path: &FieldPath, field: &'a Field<f64>) {
        if let Some(&rate) = self.optional(path.field("outdoor_air_per_person"), field) {
            self.check(
                path.field("outdoor_air_per_person"),
                rate.is_finite() && rate >= 0.0,
                rate,
                "a non-negative flow rate",
            );
        }
    }

    fn extra_objects(&mut self) {
        let model = self.model;
        let path = FieldPath::root().field("extra_objects");
        for (index, object) in model.extra_objects.iter().enumerate() {
            if idf::is_typed_class(&object.class) {
                self.error(
                    path.index(index),
                    IssueCode::ConflictingObject,
                    format!(
                        "{} objects are generated from the model and cannot be passed through",
                        object.class
                    ),
                );
            } else if let Some(problem) = identifier_problem(&object.class, false) {
                self.error(
                    path.index(index).field("class"),
                    IssueCode::InvalidIdentifier,
                    format!("class name {:?} {problem}", object.class),
                );
            }
            if let Some(field) = object
                .fields
                .iter()
                .find(|field| {
                    field.contains(|c| matches!(c, ',' | ';' | '!')) || field.trim() != field.as_str()
                })
            {
                self.error(
                    path.index(index).field("fields"),
                    IssueCode::InvalidIdentifier,
                    format!("field {field:?} contains ',', ';' or '!' or surrounding whitespace"),
                );
            }
        }
    }

    /// Info for constructions, materials and schedules nothing reaches from
    /// the zones and HVAC systems.
    fn reachability(&mut self) {
        let references = ReferenceGraph::new(self.model);
        let reachable = references.reachable();
        let model = self.model;

        for id in model.constructions.keys() {
            if !reachable.contains(&Node::Construction(id)) {
                self.push(
                    FieldPath::root().field("constructions").key(id),
                    Severity::Info,
                    IssueCode::Unreferenced,
                    format!("construction {id} is not used"),
                );
            }
        }
        for id in model.materials.keys() {
            if !reachable.contains(&Node::Material(id)) {
                self.push(
                    FieldPath::root().field("materials").key(id),
                    Severity::Info,
                    IssueCode::Unreferenced,
                    format!("material {id} is not used"),
                );
            }
        }
        for id in model.schedules.keys() {
            if !reachable.contains(&Node::Schedule(id)) {
                self.push(
                    FieldPath::root().field("schedules").key(id),
                    Severity::Info,
                    IssueCode::Unreferenced,
                    format!("schedule {id} is not used"),
                );
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Node<'a> {
    Zone(&'a str),
    Surface(&'a str),
    Construction(&'a ConstructionId),
    Material(&'a MaterialId),
    Schedule(&'a ScheduleId),
    Hvac(&'a str),
}

/// Which entity refers to which, over entities that exist.
struct ReferenceGraph<'a> {
    graph: DiGraph<Node<'a>, ()>,
    nodes: HashMap<Node<'a>, NodeIndex>,
    roots: Vec<NodeIndex>,
}

impl<'a> ReferenceGraph<'a> {
    fn new(model: &'a BuildingModel) -> Self {
        let mut references = ReferenceGraph {
            graph: DiGraph::new(),
            nodes: HashMap::new(),
            roots: Vec::new(),
        };

        let entities = model
            .zones
            .iter()
            .map(|zone| Node::Zone(&zone.name))
            .chain(model.hvac_systems.iter().map(|system| Node::Hvac(&system.id)))
            .chain(model.surfaces.keys().map(|id| Node::Surface(id)))
            .chain(model.constructions.keys().map(Node::Construction))
            .chain(model.materials.keys().map(Node::Material))
            .chain(model.schedules.keys().map(Node::Schedule));
        for node in entities {
            let index = references.graph.add_node(node);
            references.nodes.entry(node).or_insert(index);
            if matches!(node, Node::Zone(_) | Node::Hvac(_)) {
                references.roots.push(index);
            }
        }

        for zone in &model.zones {
            let from = Node::Zone(&zone.name);
            for surface in &zone.surfaces {
                references.link(from, Node::Surface(surface));
            }
            for mass in &zone.internal_mass {
                references.link(from, Node::Construction(&mass.construction));
            }
            if let Some(people) = zone.people.value() {
                references.link(from, Node::Schedule(&people.schedule));
                references.link(from, Node::Schedule(&people.activity_schedule));
            }
            for load in [zone.lighting.value(), zone.equipment.value()]
                .into_iter()
                .flatten()
            {
                references.link(from, Node::Schedule(&load.schedule));
            }
            if let Some(hvac) = zone.hvac_system.value() {
                references.link(from, Node::Hvac(hvac));
            }
        }
        for (id, surface) in &model.surfaces {
            if let Some(construction) = surface.construction.value() {
                references.link(Node::Surface(id), Node::Construction(construction));
            }
        }
        for (id, construction) in &model.constructions {
            for layer in &construction.layers {
                references.link(Node::Construction(id), Node::Material(layer));
            }
        }
        for system in &model.hvac_systems {
            if let Some(schedule) = system.availability_schedule.value() {
                references.link(Node::Hvac(&system.id), Node::Schedule(schedule));
            }
        }
        references
    }

    fn link(&mut self, from: Node<'a>, to: Node<'a>) {
        if let (Some(&a), Some(&b)) = (self.nodes.get(&from), self.nodes.get(&to)) {
            self.graph.add_edge(a, b, ());
        }
    }

    fn reachable(&self) -> BTreeSet<Node<'a>> {
        let mut reachable = BTreeSet::new();
        let Some((&first, rest)) = self.roots.split_first() else {
            return reachable;
        };
        let mut dfs = Dfs::new(&self.graph, first);
        for &root in std::iter::once(&first).chain(rest) {
            dfs.move_to(root);
            while let Some(index) = dfs.next(&self.graph) {
                reachable.insert(self.graph[index]);
            }
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::minimal_model;
    use crate::schedule::TimeValue;
    use assert_matches::assert_matches;
    use nalgebra::Point3;
    use test_strategy::proptest;
    use uom::si::f64::{Area, HeatTransfer};

    fn codes_at(report: &ValidationReport, path: &str) -> Vec<IssueCode> {
        let path: FieldPath = path.parse().unwrap();
        report.issues_at(&path).map(|issue| issue.code).collect()
    }

    #[test]
    fn minimal_model_has_no_errors() {
        let report = validate(&minimal_model());
        assert!(
            !report.has_errors(),
            "{:?}",
            report.errors().collect::<Vec<_>>()
        );
    }

    #[test]
    fn empty_model_reports_gaps_without_failing() {
        let report = validate(&BuildingModel::default());
        let state = report.completion_state();
        assert_eq!(
            state.missing_required,
            vec![
                "metadata.project_id".parse().unwrap(),
                "metadata.climate_zone".parse().unwrap(),
                "metadata.building_type".parse().unwrap(),
                "zones".parse().unwrap(),
            ]
        );
        assert!(!state.is_resolved());
    }

    #[test]
    fn missing_hvac_is_the_only_required_gap() {
        let mut model = minimal_model();
        model.zones[0].hvac_system = Field::Absent;
        model.hvac_systems.clear();
        let state = validate(&model).completion_state();
        assert_eq!(
            state.missing_required,
            vec!["zones[0].hvac_system".parse().unwrap()]
        );
    }

    #[test]
    fn dangling_construction() {
        let mut model = minimal_model();
        model.surfaces.get_mut("Office Wall").unwrap().construction =
            Field::Explicit(ConstructionId::new("Nope"));
        let report = validate(&model);
        let issue = report
            .errors()
            .find(|issue| issue.code == IssueCode::DanglingReference)
            .unwrap();
        assert_eq!(issue.class(), IssueClass::ReferentialIntegrity);
        assert_eq!(
            issue.path,
            "surfaces[\"Office Wall\"].construction".parse().unwrap()
        );
    }

    #[test]
    fn asymmetric_surface_pair() {
        let mut model = minimal_model();
        let mut partner = model.surfaces["Office Wall"].clone();
        partner.boundary_condition = Field::Explicit(BoundaryCondition::Outdoors);
        model.surfaces.insert("Other".into(), partner);
        model.zones[0].surfaces.push("Other".into());
        model
            .surfaces
            .get_mut("Office Wall")
            .unwrap()
            .boundary_condition = Field::Explicit(BoundaryCondition::SurfaceRef("Other".into()));

        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "surfaces[\"Office Wall\"].boundary_condition"),
            vec![IssueCode::AsymmetricSurfacePair]
        );

        model.surfaces.get_mut("Other").unwrap().boundary_condition =
            Field::Explicit(BoundaryCondition::SurfaceRef("Office Wall".into()));
        assert!(!validate(&model).has_errors());
    }

    #[test]
    fn self_referencing_surface() {
        let mut model = minimal_model();
        model
            .surfaces
            .get_mut("Office Wall")
            .unwrap()
            .boundary_condition =
            Field::Explicit(BoundaryCondition::SurfaceRef("Office Wall".into()));
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "surfaces[\"Office Wall\"].boundary_condition"),
            vec![IssueCode::AsymmetricSurfacePair]
        );
    }

    #[proptest]
    fn asymmetric_pairs_always_error(
        #[strategy(proptest::sample::select(vec![
            BoundaryCondition::Outdoors,
            BoundaryCondition::Ground,
            BoundaryCondition::Adiabatic,
            BoundaryCondition::SurfaceRef("Third".into()),
        ]))]
        partner_boundary: BoundaryCondition,
    ) {
        let mut model = minimal_model();
        let mut partner = model.surfaces["Office Wall"].clone();
        partner.boundary_condition = Field::Explicit(partner_boundary);
        model.surfaces.insert("Other".into(), partner);
        model.zones[0].surfaces.push("Other".into());
        model
            .surfaces
            .get_mut("Office Wall")
            .unwrap()
            .boundary_condition = Field::Explicit(BoundaryCondition::SurfaceRef("Other".into()));
        let report = validate(&model);
        assert!(report
            .errors()
            .any(|issue| issue.code == IssueCode::AsymmetricSurfacePair));
    }

    #[test]
    fn zone_and_hvac_must_agree() {
        let mut model = minimal_model();
        model.hvac_systems[0].serving_zones.clear();
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "zones[0].hvac_system"),
            vec![IssueCode::HvacMismatch]
        );
    }

    #[test]
    fn surface_in_two_zones() {
        let mut model = minimal_model();
        let mut second = Zone::new("Second");
        second.floor_area = Field::Explicit(Area::new::<square_meter>(10.0));
        second.surfaces.push("Office Wall".into());
        second.hvac_system = Field::Explicit("Ideal".into());
        model.hvac_systems[0].serving_zones.insert("Second".into());
        model.zones.push(second);

        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "surfaces[\"Office Wall\"]"),
            vec![IssueCode::SurfaceOwnership]
        );
    }

    #[test]
    fn unowned_surface() {
        let mut model = minimal_model();
        let orphan = model.surfaces["Office Wall"].clone();
        model.surfaces.insert("Orphan".into(), orphan);
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "surfaces[\"Orphan\"]"),
            vec![IssueCode::SurfaceOwnership]
        );
    }

    #[test]
    fn non_positive_floor_area() {
        let mut model = minimal_model();
        model.zones[0].floor_area = Field::Explicit(Area::new::<square_meter>(-1.0));
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "zones[0].floor_area"),
            vec![IssueCode::OutOfRange]
        );
    }

    #[test]
    fn fraction_schedule_out_of_range() {
        let mut model = minimal_model();
        model.schedules.insert(
            ScheduleId::new("Bad"),
            Schedule::Constant {
                type_limits: ScheduleTypeLimits::Fraction,
                value: 1.5,
            },
        );
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "schedules[\"Bad\"].value"),
            vec![IssueCode::OutOfRange]
        );
    }

    #[test]
    fn compact_schedule_with_gap_at_year_end() {
        let mut model = minimal_model();
        model.schedules.insert(
            ScheduleId::new("Short"),
            Schedule::Compact {
                type_limits: ScheduleTypeLimits::Fraction,
                periods: vec![SchedulePeriod {
                    through: MonthDay::new(6, 30),
                    until: vec![
                        TimeValue {
                            time: TimeOfDay::hm(12, 0),
                            value: 0.5,
                        },
                        TimeValue {
                            time: TimeOfDay::hm(8, 0),
                            value: 0.5,
                        },
                    ],
                }],
            },
        );
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "schedules[\"Short\"].periods[0].until[1]"),
            vec![IssueCode::InvalidSchedule, IssueCode::InvalidSchedule]
        );
        assert_eq!(
            codes_at(&report, "schedules[\"Short\"].periods[0].through"),
            vec![IssueCode::InvalidSchedule]
        );
    }

    #[test]
    fn heating_above_cooling() {
        let mut model = minimal_model();
        model.hvac_systems[0].heating_setpoint = Field::Explicit(26.0);
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "hvac_systems[0].cooling_setpoint"),
            vec![IssueCode::OutOfRange]
        );
    }

    #[test]
    fn referenced_radiant_loop_is_unsupported() {
        let mut model = minimal_model();
        model.hvac_systems[0].kind = HvacKind::RadiantLoop {
            supply_water_temperature: Field::Explicit(35.0),
        };
        let report = validate(&model);
        assert_matches!(
            report.issues_at(&"hvac_systems[0]".parse().unwrap()).next(),
            Some(ValidationIssue { severity: Severity::Error, code: IssueCode::UnsupportedField, .. })
        );
    }

    #[test]
    fn unreferenced_radiant_loop_is_a_warning() {
        let mut model = minimal_model();
        model.hvac_systems.push(HvacSystem::new(
            "Loop",
            HvacKind::RadiantLoop {
                supply_water_temperature: Field::Absent,
            },
        ));
        let report = validate(&model);
        assert!(!report.has_errors());
        assert_matches!(
            report.issues_at(&"hvac_systems[1]".parse().unwrap()).next(),
            Some(ValidationIssue { severity: Severity::Warning, code: IssueCode::UnsupportedField, .. })
        );
    }

    #[test]
    fn invalid_identifiers() {
        let mut model = minimal_model();
        model.metadata.project_id = Field::Explicit("a,b".into());
        model.materials.insert(
            MaterialId::new("x".repeat(101)),
            Material::NoMass(NoMassMaterial {
                roughness: Field::Absent,
                thermal_resistance: Field::Explicit(1.0),
            }),
        );
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "metadata.project_id"),
            vec![IssueCode::InvalidIdentifier]
        );
        assert!(report
            .warnings()
            .any(|issue| issue.code == IssueCode::LongIdentifier));
    }

    #[test]
    fn scope_must_name_a_zone() {
        let mut model = minimal_model();
        model.constructions.insert(
            ConstructionId::scoped("Lab", "Wall"),
            Construction {
                layers: vec![MaterialId::new("Insulation")],
            },
        );
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "constructions[\"Lab/Wall\"]"),
            vec![IssueCode::DanglingReference, IssueCode::Unreferenced]
        );
    }

    #[test]
    fn implausible_u_value_is_a_warning() {
        let mut model = minimal_model();
        model.materials.insert(
            MaterialId::new("Insulation"),
            Material::NoMass(NoMassMaterial {
                roughness: Field::Explicit(Roughness::Smooth),
                thermal_resistance: Field::Explicit(50.0),
            }),
        );
        let report = validate(&model);
        assert!(!report.has_errors());
        assert_eq!(
            codes_at(&report, "surfaces[\"Office Wall\"].construction"),
            vec![IssueCode::ImplausibleValue]
        );
    }

    #[test]
    fn u_value_limits_by_climate_zone() {
        let limits = PlausibilityLimits {
            u_value: vec![
                UValueLimit {
                    climate_zone: None,
                    min: 0.1,
                    max: 6.0,
                },
                UValueLimit {
                    climate_zone: Some("7".parse().unwrap()),
                    min: 0.1,
                    max: 0.2,
                },
            ],
            ..Default::default()
        };
        let mut model = minimal_model();
        assert!(validate_with(&model, &limits).warnings().all(|issue| issue.code
            != IssueCode::ImplausibleValue));
        model.metadata.climate_zone = Field::Explicit("7".parse().unwrap());
        let u = model
            .construction_u_value(&ConstructionId::new("Wall"))
            .unwrap();
        assert!(u > HeatTransfer::new::<watt_per_square_meter_kelvin>(0.2));
        assert!(validate_with(&model, &limits)
            .warnings()
            .any(|issue| issue.code == IssueCode::ImplausibleValue));
    }

    #[test]
    fn floor_area_mismatch_is_a_warning() {
        let mut model = minimal_model();
        let mut floor = model.surfaces["Office Wall"].clone();
        floor.surface_type = Field::Explicit(SurfaceType::Floor);
        floor.boundary_condition = Field::Explicit(BoundaryCondition::Ground);
        floor.vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
            Point3::new(10.0, 10.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
        ];
        model.surfaces.insert("Floor".into(), floor);
        model.zones[0].surfaces.push("Floor".into());
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "zones[0].floor_area"),
            vec![IssueCode::ImplausibleValue]
        );
    }

    #[test]
    fn unreferenced_entities_are_info() {
        let mut model = minimal_model();
        model.constructions.insert(
            ConstructionId::new("Spare"),
            Construction {
                layers: vec![MaterialId::new("Insulation")],
            },
        );
        let report = validate(&model);
        assert_matches!(
            report.issues_at(&"constructions[\"Spare\"]".parse().unwrap()).next(),
            Some(ValidationIssue { severity: Severity::Info, code: IssueCode::Unreferenced, .. })
        );
        assert!(report
            .issues_at(&"materials[\"Insulation\"]".parse().unwrap())
            .next()
            .is_none());
    }

    #[test]
    fn library_body_under_library_name() {
        let mut model = minimal_model();
        let body = library_schedule("AlwaysOn").unwrap();
        model.schedules.insert(ScheduleId::new("AlwaysOn"), body);
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, r#"schedules["AlwaysOn"]"#),
            vec![IssueCode::ConflictingObject]
        );

        let mut model = minimal_model();
        model.schedules.insert(
            ScheduleId::new("AlwaysOn"),
            Schedule::Constant {
                type_limits: ScheduleTypeLimits::OnOff,
                value: 0.0,
            },
        );
        assert!(codes_at(&validate(&model), r#"schedules["AlwaysOn"]"#).is_empty());
    }

    #[test]
    fn keys_differing_in_case_collide() {
        let mut model = minimal_model();
        let wall = model.constructions[&ConstructionId::new("Wall")].clone();
        model.constructions.insert(ConstructionId::new("wall"), wall);
        let insulation = model.materials[&MaterialId::new("Insulation")].clone();
        model
            .materials
            .insert(MaterialId::new("INSULATION"), insulation);
        model.schedules.insert(
            ScheduleId::new("alwayson"),
            Schedule::Constant {
                type_limits: ScheduleTypeLimits::OnOff,
                value: 0.0,
            },
        );

        let report = validate(&model);
        let duplicates: Vec<_> = report
            .errors()
            .filter(|issue| issue.code == IssueCode::DuplicateId)
            .map(|issue| issue.path.to_string())
            .collect();
        assert_eq!(
            duplicates,
            [
                r#"constructions["wall"]"#,
                r#"materials["Insulation"]"#,
                r#"schedules["alwayson"]"#,
            ]
        );
    }

    #[test]
    fn pass_through_cannot_shadow_generated_objects() {
        let mut model = minimal_model();
        model
            .extra_objects
            .push(crate::idf::IdfObject::new("Zone", ["Sneaky"]));
        let report = validate(&model);
        assert_eq!(
            codes_at(&report, "extra_objects[0]"),
            vec![IssueCode::ConflictingObject]
        );
    }

    #[test]
    fn issues_follow_authoring_order() {
        let mut model = minimal_model();
        model.hvac_systems[0].heating_setpoint = Field::Absent;
        model.zones[0].floor_area = Field::Absent;
        model.metadata.project_id = Field::Absent;
        let state = validate(&model).completion_state();
        assert_eq!(
            state.missing_required,
            vec![
                "metadata.project_id".parse().unwrap(),
                "zones[0].floor_area".parse().unwrap(),
                "hvac_systems[0].heating_setpoint".parse().unwrap(),
            ]
        );
    }

    #[proptest]
    fn generated_models_have_no_errors(model: BuildingModel) {
        let report = validate(&model);
        assert!(
            !report.has_errors(),
            "{:?}",
            report.errors().collect::<Vec<_>>()
        );
    }
}
