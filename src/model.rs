use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uom::si::{
    area::square_meter,
    f64::{
        Area, HeatFluxDensity, HeatTransfer, Length, MassDensity, SpecificHeatCapacity,
        ThermalConductivity, Volume,
    },
    heat_transfer::watt_per_square_meter_kelvin,
};

use crate::idf::IdfObject;
use crate::schedule::{MonthDay, Schedule};
use crate::tools::{idf_keywords, series_heat_transfer};

#[cfg(test)]
use proptest::{
    arbitrary::{any, Arbitrary},
    prelude::prop,
    strategy::{BoxedStrategy, Strategy},
};
#[cfg(test)]
use uom::si::{
    heat_flux_density::watt_per_square_meter, length::meter,
    mass_density::kilogram_per_cubic_meter, specific_heat_capacity::joule_per_kilogram_kelvin,
    thermal_conductivity::watt_per_meter_kelvin, volume::cubic_meter,
};

pub type ZoneId = String;
pub type SurfaceId = String;
pub type HvacId = String;

/// Value of a field together with where it came from.
///
/// `Absent` and `Explicit(empty)` are different things: only absent fields
/// are gaps, and only absent fields are ever defaulted.
#[derive(Clone, Debug, PartialEq)]
pub enum Field<T> {
    Absent,
    Explicit(T),
    Defaulted(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Absent
    }
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Absent => None,
            Field::Explicit(value) | Field::Defaulted(value) => Some(value),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, Field::Explicit(_))
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Field::Defaulted(_))
    }

    /// Forget provenance: a defaulted value becomes an explicit one.
    pub fn settle(&mut self) {
        if let Field::Defaulted(_) = self {
            if let Field::Defaulted(value) = std::mem::take(self) {
                *self = Field::Explicit(value);
            }
        }
    }
}

impl<T: Copy> Field<T> {
    pub fn get(&self) -> Option<T> {
        self.value().copied()
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Explicit(value)
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::Absent, Field::Explicit)
    }
}

/// Serialized form: explicit values as themselves, defaulted values as
/// `{ default: value }`, absent values as null or a missing key.
#[derive(Serialize)]
struct DefaultedRef<'a, T> {
    default: &'a T,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DefaultedRepr<T> {
    default: T,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldRepr<T> {
    Defaulted(DefaultedRepr<T>),
    Explicit(T),
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Absent => serializer.serialize_none(),
            Field::Explicit(value) => value.serialize(serializer),
            Field::Defaulted(value) => DefaultedRef { default: value }.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<FieldRepr<T>>::deserialize(deserializer)? {
            None => Field::Absent,
            Some(FieldRepr::Explicit(value)) => Field::Explicit(value),
            Some(FieldRepr::Defaulted(DefaultedRepr { default })) => Field::Defaulted(default),
        })
    }
}

/// Declare an id type made of an optional owning-zone scope and a local name,
/// written `Scope/Name` or just `Name`.
macro_rules! scoped_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name {
            pub scope: Option<ZoneId>,
            pub name: String,
        }

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self {
                    scope: None,
                    name: name.into(),
                }
            }

            pub fn scoped(scope: impl Into<ZoneId>, name: impl Into<String>) -> Self {
                Self {
                    scope: Some(scope.into()),
                    name: name.into(),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match &self.scope {
                    Some(scope) => write!(f, "{}/{}", scope, self.name),
                    None => write!(f, "{}", self.name),
                }
            }
        }

        impl FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s.is_empty() {
                    return Err(format!("empty {}", stringify!($name)));
                }
                Ok(match s.split_once('/') {
                    Some((scope, name)) => Self::scoped(scope, name),
                    None => Self::new(s),
                })
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }
    };
}

scoped_id!(
    /// Key of [`BuildingModel::constructions`].
    ConstructionId
);
scoped_id!(
    /// Key of [`BuildingModel::materials`].
    MaterialId
);
scoped_id!(
    /// Key of [`BuildingModel::schedules`].
    ScheduleId
);

/// ASHRAE climate zone code such as `4A` or `7`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClimateZone(String);

impl ClimateZone {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ClimateZone {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        let mut chars = code.chars();
        let valid = matches!(chars.next(), Some('0'..='8'))
            && matches!(chars.next(), None | Some('A' | 'B' | 'C'))
            && chars.next().is_none();
        if valid {
            Ok(ClimateZone(code))
        } else {
            Err(format!("{s:?} is not an ASHRAE climate zone"))
        }
    }
}

impl TryFrom<String> for ClimateZone {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClimateZone> for String {
    fn from(value: ClimateZone) -> Self {
        value.0
    }
}

impl fmt::Display for ClimateZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingType {
    Office,
    Residential,
    Retail,
    School,
    Warehouse,
}

impl fmt::Display for BuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BuildingType::Office => "office",
            BuildingType::Residential => "residential",
            BuildingType::Retail => "retail",
            BuildingType::School => "school",
            BuildingType::Warehouse => "warehouse",
        };
        f.write_str(text)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
    Country,
    Suburbs,
    City,
    Ocean,
    Urban,
}

idf_keywords!(Terrain {
    Country => "Country",
    Suburbs => "Suburbs",
    City => "City",
    Ocean => "Ocean",
    Urban => "Urban",
});

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceType {
    Floor,
    Wall,
    Ceiling,
    Roof,
}

idf_keywords!(SurfaceType {
    Floor => "Floor",
    Wall => "Wall",
    Ceiling => "Ceiling",
    Roof => "Roof",
});

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Roughness {
    VeryRough,
    Rough,
    MediumRough,
    MediumSmooth,
    Smooth,
    VerySmooth,
}

idf_keywords!(Roughness {
    VeryRough => "VeryRough",
    Rough => "Rough",
    MediumRough => "MediumRough",
    MediumSmooth => "MediumSmooth",
    Smooth => "Smooth",
    VerySmooth => "VerySmooth",
});

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatingCoil {
    Electric,
    Gas,
    HotWater,
}

idf_keywords!(HeatingCoil {
    Electric => "Electric",
    Gas => "Gas",
    HotWater => "HotWater",
});

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReheatCoil {
    None,
    Electric,
    HotWater,
}

idf_keywords!(ReheatCoil {
    None => "None",
    Electric => "Electric",
    HotWater => "HotWater",
});

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingModel {
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub settings: SimulationSettings,
    /// Authoring order is emission order.
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub surfaces: BTreeMap<SurfaceId, Surface>,
    #[serde(default)]
    pub constructions: BTreeMap<ConstructionId, Construction>,
    #[serde(default)]
    pub materials: BTreeMap<MaterialId, Material>,
    #[serde(default)]
    pub schedules: BTreeMap<ScheduleId, Schedule>,
    #[serde(default)]
    pub hvac_systems: Vec<HvacSystem>,
    /// IDF objects with no typed counterpart, passed through verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_objects: Vec<IdfObject>,
}

impl BuildingModel {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let string = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model {}", path.display()))?;
        Self::from_json(&string)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(json5::from_str(json)?)
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.name == name)
    }

    pub fn zone_index(&self, name: &str) -> Option<usize> {
        self.zones.iter().position(|zone| zone.name == name)
    }

    pub fn hvac_system(&self, id: &str) -> Option<&HvacSystem> {
        self.hvac_systems.iter().find(|system| system.id == id)
    }

    pub fn hvac_index(&self, id: &str) -> Option<usize> {
        self.hvac_systems.iter().position(|system| system.id == id)
    }

    /// Zones listing each surface, in zone order.
    pub fn surface_owners(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut owners: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for zone in &self.zones {
            for surface in &zone.surfaces {
                owners.entry(surface.as_str()).or_default().push(&zone.name);
            }
        }
        owners
    }

    /// Overall U-value of a construction including standard surface films,
    /// or `None` if any layer is unresolved or incomplete.
    pub fn construction_u_value(&self, id: &ConstructionId) -> Option<HeatTransfer> {
        let construction = self.constructions.get(id)?;
        if let [single] = construction.layers.as_slice() {
            if let Some(Material::SimpleGlazing(glazing)) = self.materials.get(single) {
                return glazing.u_factor.get();
            }
        }
        let layers = construction
            .layers
            .iter()
            .map(|layer| self.materials.get(layer)?.heat_transfer())
            .collect::<Option<Vec<_>>>()?;
        series_heat_transfer(
            [
                HeatTransfer::new::<watt_per_square_meter_kelvin>(1.0 / INSIDE_FILM_RESISTANCE),
                HeatTransfer::new::<watt_per_square_meter_kelvin>(1.0 / OUTSIDE_FILM_RESISTANCE),
            ]
            .into_iter()
            .chain(layers),
        )
    }

    /// Turn every defaulted value into an explicit one.
    /// Decoding an encoded model yields exactly this.
    pub fn settle(&mut self) {
        self.metadata.settle();
        self.settings.settle();
        self.zones.iter_mut().for_each(Zone::settle);
        self.surfaces.values_mut().for_each(Surface::settle);
        self.materials.values_mut().for_each(Material::settle);
        self.hvac_systems.iter_mut().for_each(HvacSystem::settle);
    }

    pub fn settled(&self) -> BuildingModel {
        let mut model = self.clone();
        model.settle();
        model
    }
}

/// Standard interior surface film resistance [m²·K/W].
const INSIDE_FILM_RESISTANCE: f64 = 0.13;
/// Standard exterior surface film resistance [m²·K/W].
const OUTSIDE_FILM_RESISTANCE: f64 = 0.04;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub project_id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub climate_zone: Field<ClimateZone>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub building_type: Field<BuildingType>,
    /// Degrees clockwise from true north.
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub north_axis: Field<f64>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub terrain: Field<Terrain>,
}

impl Metadata {
    fn settle(&mut self) {
        self.project_id.settle();
        self.climate_zone.settle();
        self.building_type.settle();
        self.north_axis.settle();
        self.terrain.settle();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Timesteps per hour.
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub timestep: Field<u32>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub run_period: Field<RunPeriod>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub location: Field<SiteLocation>,
}

impl SimulationSettings {
    fn settle(&mut self) {
        self.timestep.settle();
        self.run_period.settle();
        self.location.settle();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunPeriod {
    pub begin: MonthDay,
    pub end: MonthDay,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SiteLocation {
    pub name: String,
    /// Degrees, north positive.
    pub latitude: f64,
    /// Degrees, east positive.
    pub longitude: f64,
    /// Hours from GMT.
    pub time_zone: f64,
    /// Meters above sea level.
    pub elevation: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: ZoneId,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub floor_area: Field<Area>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub volume: Field<Volume>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub ceiling_height: Field<Length>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub multiplier: Field<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_list: Option<String>,
    /// Emission order of the zone's surfaces.
    #[serde(default)]
    pub surfaces: Vec<SurfaceId>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub hvac_system: Field<HvacId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal_mass: Vec<InternalMass>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub people: Field<PeopleLoad>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub lighting: Field<PowerDensityLoad>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub equipment: Field<PowerDensityLoad>,
}

impl Zone {
    pub fn new(name: impl Into<ZoneId>) -> Self {
        Zone {
            name: name.into(),
            floor_area: Field::Absent,
            volume: Field::Absent,
            ceiling_height: Field::Absent,
            multiplier: Field::Absent,
            zone_list: None,
            surfaces: Vec::new(),
            hvac_system: Field::Absent,
            internal_mass: Vec::new(),
            people: Field::Absent,
            lighting: Field::Absent,
            equipment: Field::Absent,
        }
    }

    fn settle(&mut self) {
        self.floor_area.settle();
        self.volume.settle();
        self.ceiling_height.settle();
        self.multiplier.settle();
        self.hvac_system.settle();
        self.people.settle();
        self.lighting.settle();
        self.equipment.settle();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InternalMass {
    pub construction: ConstructionId,
    pub area: Area,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeopleLoad {
    /// People per square meter of floor.
    pub people_per_area: f64,
    pub schedule: ScheduleId,
    pub activity_schedule: ScheduleId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerDensityLoad {
    pub power_density: HeatFluxDensity,
    pub schedule: ScheduleId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCondition {
    Outdoors,
    Ground,
    Adiabatic,
    /// Interzone surface; the partner must point back.
    SurfaceRef(SurfaceId),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub surface_type: Field<SurfaceType>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub construction: Field<ConstructionId>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub boundary_condition: Field<BoundaryCondition>,
    /// Counterclockwise seen from outside, starting at the upper left corner.
    #[serde(default)]
    pub vertices: Vec<Point3<f64>>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub view_factor_to_ground: Field<f64>,
}

impl Surface {
    /// Polygon area by Newell's method.
    pub fn area(&self) -> Area {
        let normal = self
            .vertices
            .iter()
            .zip(self.vertices.iter().cycle().skip(1))
            .fold(Vector3::zeros(), |acc: Vector3<f64>, (a, b)| {
                acc + a.coords.cross(&b.coords)
            });
        Area::new::<square_meter>(normal.norm() / 2.0)
    }

    fn settle(&mut self) {
        self.surface_type.settle();
        self.construction.settle();
        self.boundary_condition.settle();
        self.view_factor_to_ground.settle();
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Construction {
    /// Outside to inside.
    #[serde(default)]
    pub layers: Vec<MaterialId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Material {
    Standard(StandardMaterial),
    NoMass(NoMassMaterial),
    SimpleGlazing(GlazingMaterial),
}

impl Material {
    /// Conductance of the layer alone, if its defining fields are set.
    pub fn heat_transfer(&self) -> Option<HeatTransfer> {
        match self {
            Material::Standard(material) => {
                Some(material.conductivity.get()? / material.thickness.get()?)
            }
            Material::NoMass(material) => Some(HeatTransfer::new::<watt_per_square_meter_kelvin>(
                1.0 / material.thermal_resistance.get()?,
            )),
            Material::SimpleGlazing(material) => material.u_factor.get(),
        }
    }

    fn settle(&mut self) {
        match self {
            Material::Standard(material) => {
                material.roughness.settle();
                material.thickness.settle();
                material.conductivity.settle();
                material.density.settle();
                material.specific_heat.settle();
                material.thermal_absorptance.settle();
                material.solar_absorptance.settle();
                material.visible_absorptance.settle();
            }
            Material::NoMass(material) => {
                material.roughness.settle();
                material.thermal_resistance.settle();
            }
            Material::SimpleGlazing(material) => {
                material.u_factor.settle();
                material.shgc.settle();
                material.visible_transmittance.settle();
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardMaterial {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub roughness: Field<Roughness>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub thickness: Field<Length>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub conductivity: Field<ThermalConductivity>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub density: Field<MassDensity>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub specific_heat: Field<SpecificHeatCapacity>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub thermal_absorptance: Field<f64>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub solar_absorptance: Field<f64>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub visible_absorptance: Field<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NoMassMaterial {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub roughness: Field<Roughness>,
    /// [m²·K/W]
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub thermal_resistance: Field<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlazingMaterial {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub u_factor: Field<HeatTransfer>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub shgc: Field<f64>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub visible_transmittance: Field<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HvacSystem {
    pub id: HvacId,
    #[serde(default)]
    pub serving_zones: BTreeSet<ZoneId>,
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub availability_schedule: Field<ScheduleId>,
    /// Constant thermostat heating setpoint [°C].
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub heating_setpoint: Field<f64>,
    /// Constant thermostat cooling setpoint [°C].
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub cooling_setpoint: Field<f64>,
    #[serde(flatten)]
    pub kind: HvacKind,
}

impl HvacSystem {
    pub fn new(id: impl Into<HvacId>, kind: HvacKind) -> Self {
        HvacSystem {
            id: id.into(),
            serving_zones: BTreeSet::new(),
            availability_schedule: Field::Absent,
            heating_setpoint: Field::Absent,
            cooling_setpoint: Field::Absent,
            kind,
        }
    }

    fn settle(&mut self) {
        self.availability_schedule.settle();
        self.heating_setpoint.settle();
        self.cooling_setpoint.settle();
        match &mut self.kind {
            HvacKind::Simple {
                outdoor_air_per_person,
            } => outdoor_air_per_person.settle(),
            HvacKind::PackagedUnit {
                cooling_cop,
                heating_coil,
                gas_burner_efficiency,
                outdoor_air_per_person,
            } => {
                cooling_cop.settle();
                heating_coil.settle();
                gas_burner_efficiency.settle();
                outdoor_air_per_person.settle();
            }
            HvacKind::Vav {
                reheat_coil,
                minimum_flow_fraction,
                supply_air_temperature,
            } => {
                reheat_coil.settle();
                minimum_flow_fraction.settle();
                supply_air_temperature.settle();
            }
            HvacKind::RadiantLoop {
                supply_water_temperature,
            } => supply_water_temperature.settle(),
        }
    }
}

/// Each kind carries only its own fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HvacKind {
    /// Ideal loads air system.
    Simple {
        /// [m³/s per person]
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        outdoor_air_per_person: Field<f64>,
    },
    /// Packaged terminal air conditioner.
    PackagedUnit {
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        cooling_cop: Field<f64>,
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        heating_coil: Field<HeatingCoil>,
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        gas_burner_efficiency: Field<f64>,
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        outdoor_air_per_person: Field<f64>,
    },
    /// Packaged variable air volume system with per-zone terminal boxes.
    Vav {
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        reheat_coil: Field<ReheatCoil>,
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        minimum_flow_fraction: Field<f64>,
        /// Cooling coil design setpoint [°C].
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        supply_air_temperature: Field<f64>,
    },
    /// Hydronic radiant loop. Has no IDF template representation.
    RadiantLoop {
        /// [°C]
        #[serde(default, skip_serializing_if = "Field::is_absent")]
        supply_water_temperature: Field<f64>,
    },
}

impl HvacKind {
    pub fn name(&self) -> &'static str {
        match self {
            HvacKind::Simple { .. } => "simple",
            HvacKind::PackagedUnit { .. } => "packaged_unit",
            HvacKind::Vav { .. } => "vav",
            HvacKind::RadiantLoop { .. } => "radiant_loop",
        }
    }
}

#[cfg(test)]
const NAME_REGEX: &str = "[A-Z][a-z]{2,6}";

#[cfg(test)]
impl Arbitrary for Material {
    type Parameters = ();
    type Strategy = BoxedStrategy<Material>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        let roughness = prop::sample::select(vec![
            Roughness::VeryRough,
            Roughness::Rough,
            Roughness::MediumRough,
            Roughness::MediumSmooth,
            Roughness::Smooth,
            Roughness::VerySmooth,
        ]);
        let standard = (
            prop::option::of(roughness.clone()),
            1e-3f64..0.5,
            1e-2f64..5.0,
            1f64..3000.0,
            100f64..2000.0,
            prop::option::of(0.1f64..0.99),
        )
            .prop_map(|tuple| {
                Material::Standard(StandardMaterial {
                    roughness: tuple.0.into(),
                    thickness: Length::new::<meter>(tuple.1).into(),
                    conductivity: ThermalConductivity::new::<watt_per_meter_kelvin>(tuple.2)
                        .into(),
                    density: MassDensity::new::<kilogram_per_cubic_meter>(tuple.3).into(),
                    specific_heat: SpecificHeatCapacity::new::<joule_per_kilogram_kelvin>(
                        tuple.4,
                    )
                    .into(),
                    thermal_absorptance: tuple.5.into(),
                    solar_absorptance: Field::Absent,
                    visible_absorptance: Field::Absent,
                })
            });
        let no_mass = (prop::option::of(roughness), 0.01f64..10.0).prop_map(|tuple| {
            Material::NoMass(NoMassMaterial {
                roughness: tuple.0.into(),
                thermal_resistance: tuple.1.into(),
            })
        });
        let glazing = (0.5f64..5.0, 0.1f64..0.9, prop::option::of(0.1f64..0.9)).prop_map(
            |tuple| {
                Material::SimpleGlazing(GlazingMaterial {
                    u_factor: HeatTransfer::new::<watt_per_square_meter_kelvin>(tuple.0).into(),
                    shgc: tuple.1.into(),
                    visible_transmittance: tuple.2.into(),
                })
            },
        );
        prop::strategy::Union::new(vec![standard.boxed(), no_mass.boxed(), glazing.boxed()])
            .boxed()
    }
}

/// Surface of a generated zone: type, construction index, boundary, width, height.
#[cfg(test)]
type SurfaceSpec = (SurfaceType, usize, BoundaryCondition, f64, f64);

#[cfg(test)]
impl Arbitrary for HvacKind {
    type Parameters = ();
    type Strategy = BoxedStrategy<HvacKind>;

    /// Only kinds with an IDF representation.
    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        let simple = prop::option::of(0.001f64..0.02).prop_map(|oa| HvacKind::Simple {
            outdoor_air_per_person: oa.into(),
        });
        let packaged = (
            2f64..5.0,
            prop::sample::select(vec![HeatingCoil::Electric, HeatingCoil::Gas]),
            prop::option::of(0.7f64..0.95),
        )
            .prop_map(|tuple| HvacKind::PackagedUnit {
                cooling_cop: tuple.0.into(),
                heating_coil: tuple.1.into(),
                gas_burner_efficiency: tuple.2.into(),
                outdoor_air_per_person: Field::Absent,
            });
        let vav = (
            prop::sample::select(vec![ReheatCoil::None, ReheatCoil::Electric]),
            prop::option::of(0.1f64..0.5),
            prop::option::of(10f64..15.0),
        )
            .prop_map(|tuple| HvacKind::Vav {
                reheat_coil: tuple.0.into(),
                minimum_flow_fraction: tuple.1.into(),
                supply_air_temperature: tuple.2.into(),
            });
        prop::strategy::Union::new(vec![simple.boxed(), packaged.boxed(), vav.boxed()]).boxed()
    }
}

#[cfg(test)]
impl Arbitrary for BuildingModel {
    type Parameters = ();
    type Strategy = BoxedStrategy<BuildingModel>;

    /// Complete models without Error-severity issues.
    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        let surface = (
            prop::sample::select(vec![
                SurfaceType::Floor,
                SurfaceType::Wall,
                SurfaceType::Ceiling,
                SurfaceType::Roof,
            ]),
            any::<prop::sample::Index>(),
            prop::sample::select(vec![
                BoundaryCondition::Outdoors,
                BoundaryCondition::Ground,
                BoundaryCondition::Adiabatic,
            ]),
            0.5f64..30.0,
            0.5f64..10.0,
        )
            .prop_map(|(surface_type, index, boundary, width, height)| {
                (surface_type, index.index(usize::MAX), boundary, width, height)
            });
        let zone = (
            1f64..1000.0,
            prop::option::of(10f64..3000.0),
            prop::option::of(1u32..10),
            prop::collection::vec(surface, 1..5),
        );

        (
            NAME_REGEX,
            prop::collection::btree_map(NAME_REGEX, Material::arbitrary(), 1..5),
            prop::collection::vec(zone, 1..4),
            prop::collection::vec(
                (any::<bool>(), prop::collection::vec(any::<prop::sample::Index>(), 1..4)),
                1..4,
            ),
            HvacKind::arbitrary(),
            (15f64..21.0, 23f64..28.0),
            prop::option::of(Schedule::arbitrary()),
            prop::option::of(prop::sample::select(vec![1u32, 2, 4, 6, 12, 60])),
            prop::option::of(-180f64..180.0),
        )
            .prop_map(
                |(
                    project,
                    materials,
                    zones,
                    constructions,
                    hvac_kind,
                    (heating, cooling),
                    occupancy,
                    timestep,
                    north_axis,
                )| {
                    let material_ids: Vec<MaterialId> =
                        materials.keys().cloned().map(MaterialId::new).collect();
                    let materials = material_ids
                        .iter()
                        .cloned()
                        .zip(materials.into_values())
                        .collect();

                    let constructions: BTreeMap<ConstructionId, Construction> = constructions
                        .into_iter()
                        .enumerate()
                        .map(|(i, (scoped, layers))| {
                            let name = format!("Construction{i}");
                            let id = if scoped {
                                ConstructionId::scoped("Zone0", name)
                            } else {
                                ConstructionId::new(name)
                            };
                            let layers = layers
                                .iter()
                                .map(|index| index.get(&material_ids).clone())
                                .collect();
                            (id, Construction { layers })
                        })
                        .collect();
                    let construction_ids: Vec<_> = constructions.keys().cloned().collect();

                    let mut schedules = BTreeMap::from([(
                        ScheduleId::new("AlwaysOn"),
                        Schedule::always_on(),
                    )]);
                    if let Some(occupancy) = occupancy {
                        schedules.insert(ScheduleId::new("Occupancy"), occupancy);
                    }

                    let mut hvac = HvacSystem::new("Central", hvac_kind);
                    hvac.heating_setpoint = heating.into();
                    hvac.cooling_setpoint = cooling.into();
                    hvac.availability_schedule = ScheduleId::new("AlwaysOn").into();

                    let mut surfaces = BTreeMap::new();
                    let zones = zones
                        .into_iter()
                        .enumerate()
                        .map(|(i, (floor_area, volume, multiplier, zone_surfaces))| {
                            let mut zone = Zone::new(format!("Zone{i}"));
                            zone.floor_area = Area::new::<square_meter>(floor_area).into();
                            zone.volume = volume.map(Volume::new::<cubic_meter>).into();
                            zone.multiplier = multiplier.into();
                            zone.hvac_system = Field::Explicit("Central".into());
                            if schedules.contains_key(&ScheduleId::new("Occupancy")) {
                                zone.lighting = Field::Explicit(PowerDensityLoad {
                                    power_density: HeatFluxDensity::new::<watt_per_square_meter>(
                                        8.0,
                                    ),
                                    schedule: ScheduleId::new("Occupancy"),
                                });
                            }
                            for (j, (surface_type, index, boundary, width, height)) in
                                zone_surfaces.into_iter().enumerate()
                            {
                                let id = format!("Zone{i} Surface{j}");
                                zone.surfaces.push(id.clone());
                                surfaces.insert(
                                    id,
                                    Surface {
                                        surface_type: surface_type.into(),
                                        construction: construction_ids
                                            [index % construction_ids.len()]
                                        .clone()
                                        .into(),
                                        boundary_condition: boundary.into(),
                                        vertices: vec![
                                            Point3::new(0.0, 0.0, height),
                                            Point3::new(0.0, 0.0, 0.0),
                                            Point3::new(width, 0.0, 0.0),
                                            Point3::new(width, 0.0, height),
                                        ],
                                        view_factor_to_ground: Field::Absent,
                                    },
                                );
                            }
                            hvac.serving_zones.insert(zone.name.clone());
                            zone
                        })
                        .collect();

                    BuildingModel {
                        metadata: Metadata {
                            project_id: Field::Explicit(project),
                            climate_zone: Field::Explicit("4A".parse().unwrap()),
                            building_type: Field::Explicit(BuildingType::Office),
                            north_axis: north_axis.into(),
                            terrain: Field::Absent,
                        },
                        settings: SimulationSettings {
                            timestep: timestep.into(),
                            ..Default::default()
                        },
                        zones,
                        surfaces,
                        constructions,
                        materials,
                        schedules,
                        hvac_systems: vec![hvac],
                        extra_objects: Vec::new(),
                    }
                },
            )
            .boxed()
    }
}
