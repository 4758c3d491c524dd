use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use multimap::MultiMap;
use nalgebra::Point3;
use tracing::{debug, info, warn};
use uom::si::{
    area::square_meter,
    f64::{
        Area, HeatFluxDensity, HeatTransfer, Length, MassDensity, SpecificHeatCapacity,
        ThermalConductivity, Volume,
    },
    heat_flux_density::watt_per_square_meter,
    heat_transfer::watt_per_square_meter_kelvin,
    length::meter,
    mass_density::kilogram_per_cubic_meter,
    specific_heat_capacity::joule_per_kilogram_kelvin,
    thermal_conductivity::watt_per_meter_kelvin,
    volume::cubic_meter,
};

use crate::error::{Error, Result};
use crate::model::{
    BoundaryCondition, BuildingModel, BuildingType, Construction, ConstructionId, Field,
    GlazingMaterial, HeatingCoil, HvacKind, HvacSystem, InternalMass, Material, MaterialId,
    NoMassMaterial, PeopleLoad, PowerDensityLoad, ReheatCoil, Roughness, RunPeriod, ScheduleId,
    SiteLocation, StandardMaterial, Surface, SurfaceType, Terrain, Zone,
};
use crate::path::FieldPath;
use crate::schedule::{
    library_schedule, MonthDay, Schedule, SchedulePeriod, ScheduleTypeLimits, TimeOfDay,
    TimeValue, LIBRARY_NAMES,
};

use super::templates::{
    all_template_sets, is_boilerplate, template_classes, template_set, TemplateSet,
};
use super::{class_def, ClassDef, ClassKind, IdfDocument, IdfError, IdfObject, IDF_VERSION};

/// Rebuild a model from an IDF document.
///
/// Inverse of [`super::encode`] up to provenance: defaulted values come back
/// explicit, and the climate zone and building type, which IDF does not
/// carry, come back absent. Objects of classes without a typed counterpart
/// are kept as pass-through objects, except template boilerplate of any
/// building type.
pub fn decode(document: &IdfDocument) -> Result<BuildingModel> {
    decode_with(document, None)
}

/// [`decode`] for a file generated for `building_type`. Only the template
/// objects of that type count as boilerplate, and the type is kept.
pub fn decode_as(document: &IdfDocument, building_type: BuildingType) -> Result<BuildingModel> {
    let mut model = decode_with(document, Some(building_type))?;
    model.metadata.building_type = Field::Explicit(building_type);
    Ok(model)
}

fn decode_with(
    document: &IdfDocument,
    building_type: Option<BuildingType>,
) -> Result<BuildingModel> {
    let templates = match building_type {
        Some(building_type) => vec![template_set(building_type)],
        None => all_template_sets(),
    };
    let mut decoder = Decoder::default();
    decoder.run(document, &templates)?;
    info!(
        zones = decoder.model.zones.len(),
        surfaces = decoder.model.surfaces.len(),
        pass_through = decoder.model.extra_objects.len(),
        "decoded IDF"
    );
    Ok(decoder.model)
}

/// Typed access to the fields of one object.
struct Reader<'a> {
    object: &'a IdfObject,
    definition: &'static ClassDef,
}

impl<'a> Reader<'a> {
    fn class(&self) -> String {
        self.definition.name.to_string()
    }

    fn name(&self) -> String {
        self.object.name().to_string()
    }

    fn index(&self, label: &str) -> usize {
        self.definition.index_of(label).unwrap_or(usize::MAX)
    }

    fn missing(&self, field: impl Into<String>) -> IdfError {
        IdfError::MissingField {
            class: self.class(),
            name: self.name(),
            field: field.into(),
        }
    }

    fn unsupported(&self, field: impl Into<String>, value: &str) -> IdfError {
        IdfError::Unsupported {
            class: self.class(),
            name: self.name(),
            field: field.into(),
            value: value.to_string(),
        }
    }

    fn duplicate(&self) -> IdfError {
        IdfError::Duplicate {
            class: self.class(),
            name: self.name(),
        }
    }

    fn text(&self, label: &str) -> Option<&'a str> {
        self.object.field(self.index(label))
    }

    fn required(&self, label: &str) -> Result<&'a str, IdfError> {
        self.text(label).ok_or_else(|| self.missing(label))
    }

    /// Blank, `autosize` and `autocalculate` read as `None`.
    fn number_at(&self, index: usize) -> Result<Option<f64>, IdfError> {
        let Some(text) = self.object.field(index) else {
            return Ok(None);
        };
        if text.eq_ignore_ascii_case("autosize") || text.eq_ignore_ascii_case("autocalculate") {
            return Ok(None);
        }
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => Err(IdfError::BadNumber {
                class: self.class(),
                name: self.name(),
                field: self.definition.label(index),
                value: text.to_string(),
            }),
        }
    }

    fn number(&self, label: &str) -> Result<Option<f64>, IdfError> {
        self.number_at(self.index(label))
    }

    fn required_number(&self, label: &str) -> Result<f64, IdfError> {
        self.number(label)?.ok_or_else(|| self.missing(label))
    }

    fn integer(&self, label: &str) -> Result<Option<u32>, IdfError> {
        let Some(text) = self.text(label) else {
            return Ok(None);
        };
        text.parse().map(Some).map_err(|_| IdfError::BadNumber {
            class: self.class(),
            name: self.name(),
            field: label.to_string(),
            value: text.to_string(),
        })
    }

    fn required_integer(&self, label: &str) -> Result<u32, IdfError> {
        self.integer(label)?.ok_or_else(|| self.missing(label))
    }

    fn keyword<T>(
        &self,
        label: &str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, IdfError> {
        self.text(label)
            .map(|text| parse(text).ok_or_else(|| self.unsupported(label, text)))
            .transpose()
    }

    fn id<T: FromStr>(&self, label: &str) -> Result<Option<T>, IdfError> {
        self.text(label)
            .map(|text| text.parse().map_err(|_| self.unsupported(label, text)))
            .transpose()
    }

    fn required_id<T: FromStr>(&self, label: &str) -> Result<T, IdfError> {
        self.id(label)?.ok_or_else(|| self.missing(label))
    }
}

fn type_limits_from_name(name: &str) -> Option<ScheduleTypeLimits> {
    ScheduleTypeLimits::ALL
        .into_iter()
        .find(|limits| limits.idf_name().eq_ignore_ascii_case(name))
}

fn strip_prefix_ignore_case<'t>(text: &'t str, prefix: &str) -> Option<&'t str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| text[prefix.len()..].trim())
}

fn unknown_zone(path: FieldPath, object: &IdfObject, zone: &str) -> Error {
    Error::ReferentialIntegrity {
        path,
        message: format!(
            "{} {:?} names unknown zone {zone:?}",
            object.class,
            object.name()
        ),
    }
}

#[derive(Default)]
struct Decoder<'d> {
    model: BuildingModel,
    /// Objects that belong to a zone, by zone name, in document order.
    zone_objects: MultiMap<&'d str, &'d IdfObject>,
    zone_lists: Vec<Reader<'d>>,
    /// Constant setpoints by thermostat name, in document order.
    thermostats: Vec<(&'d str, Option<f64>, Option<f64>)>,
    vav_systems: HashMap<&'d str, (Option<ScheduleId>, Option<f64>)>,
}

impl<'d> Decoder<'d> {
    fn run(&mut self, document: &'d IdfDocument, templates: &[TemplateSet]) -> Result<()> {
        for object in document.objects_of("Zone") {
            if let Some(definition) = class_def(&object.class) {
                self.zone(Reader { object, definition })?;
            }
        }

        let boilerplate: HashSet<&str> = template_classes()
            .filter(|class| {
                let objects: Vec<_> = document.objects_of(class).collect();
                is_boilerplate(templates, class, &objects)
            })
            .collect();
        debug!(?boilerplate, "template classes recognised");

        for object in &document.objects {
            let Some(definition) = class_def(&object.class) else {
                self.model.extra_objects.push(object.clone());
                continue;
            };
            if definition.kind == ClassKind::Template {
                if !boilerplate.contains(definition.name) {
                    self.model.extra_objects.push(object.clone());
                }
                continue;
            }
            let reader = Reader { object, definition };
            match definition.name {
                "Version" => {
                    let version = reader.text("Version Identifier").unwrap_or_default();
                    if version != IDF_VERSION {
                        warn!(version, expected = IDF_VERSION, "IDF version differs");
                    }
                }
                "Building" => self.building(reader)?,
                "Timestep" => self.model.settings.timestep = reader.integer(definition.fields[0])?.into(),
                "Site:Location" => self.location(reader)?,
                "RunPeriod" => self.run_period(reader)?,
                "ScheduleTypeLimits" | "Zone" => {}
                "Schedule:Constant" | "Schedule:Compact" => self.schedule(reader)?,
                "Material" | "Material:NoMass" | "WindowMaterial:SimpleGlazingSystem" => {
                    self.material(reader)?
                }
                "Construction" => self.construction(reader)?,
                "ZoneList" => self.zone_lists.push(reader),
                "HVACTemplate:Thermostat" => self.thermostat(reader)?,
                "HVACTemplate:System:PackagedVAV" => {
                    let name = reader.required("Name")?;
                    let availability = reader.id("System Availability Schedule Name")?;
                    let supply = reader.number("Cooling Coil Design Setpoint")?;
                    self.vav_systems.insert(name, (availability, supply));
                }
                _ => {
                    let label = if definition.name.starts_with("HVACTemplate:Zone")
                        || definition.name == "BuildingSurface:Detailed"
                    {
                        "Zone Name"
                    } else if definition.name == "InternalMass" {
                        "Zone or ZoneList Name"
                    } else {
                        "Zone or ZoneList or Space or SpaceList Name"
                    };
                    let zone = reader.required(label)?;
                    if self.model.zone(zone).is_none() {
                        let path = if definition.name == "BuildingSurface:Detailed" {
                            FieldPath::root().field("surfaces").key(object.name())
                        } else {
                            FieldPath::root().field("zones")
                        };
                        return Err(unknown_zone(path, object, zone));
                    }
                    self.zone_objects.insert(zone, object);
                }
            }
        }

        let mut systems: Vec<HvacSystem> = Vec::new();
        for index in 0..self.model.zones.len() {
            let name = self.model.zones[index].name.clone();
            let objects = self
                .zone_objects
                .get_vec(name.as_str())
                .cloned()
                .unwrap_or_default();
            for object in objects {
                if let Some(definition) = class_def(&object.class) {
                    self.zone_member(index, Reader { object, definition }, &mut systems)?;
                }
            }
        }
        self.apply_zone_lists()?;
        self.finish_hvac(systems);
        Ok(())
    }

    fn building(&mut self, reader: Reader) -> Result<(), IdfError> {
        let metadata = &mut self.model.metadata;
        metadata.project_id = reader.text("Name").map(String::from).into();
        metadata.north_axis = reader.number("North Axis")?.into();
        metadata.terrain = reader.keyword("Terrain", Terrain::from_idf_keyword)?.into();
        Ok(())
    }

    fn location(&mut self, reader: Reader) -> Result<(), IdfError> {
        self.model.settings.location = Field::Explicit(SiteLocation {
            name: reader.required("Name")?.to_string(),
            latitude: reader.required_number("Latitude")?,
            longitude: reader.required_number("Longitude")?,
            time_zone: reader.required_number("Time Zone")?,
            elevation: reader.required_number("Elevation")?,
        });
        Ok(())
    }

    fn run_period(&mut self, reader: Reader) -> Result<(), IdfError> {
        self.model.settings.run_period = Field::Explicit(RunPeriod {
            begin: MonthDay::new(
                reader.required_integer("Begin Month")?,
                reader.required_integer("Begin Day of Month")?,
            ),
            end: MonthDay::new(
                reader.required_integer("End Month")?,
                reader.required_integer("End Day of Month")?,
            ),
        });
        Ok(())
    }

    fn schedule(&mut self, reader: Reader) -> Result<(), IdfError> {
        let id: ScheduleId = reader.required_id("Name")?;
        let label = "Schedule Type Limits Name";
        let type_limits = reader
            .keyword(label, type_limits_from_name)?
            .ok_or_else(|| reader.missing(label))?;

        let schedule = if reader.definition.name == "Schedule:Constant" {
            Schedule::Constant {
                type_limits,
                value: reader.required_number("Hourly Value")?,
            }
        } else {
            Schedule::Compact {
                type_limits,
                periods: compact_periods(&reader)?,
            }
        };

        let schedule = if id.scope.is_none()
            && LIBRARY_NAMES.contains(&id.name.as_str())
            && library_schedule(&id.name).as_ref() == Some(&schedule)
        {
            Schedule::Library {
                name: id.name.clone(),
            }
        } else {
            schedule
        };

        if self.model.schedules.insert(id, schedule).is_some() {
            return Err(reader.duplicate());
        }
        Ok(())
    }

    fn material(&mut self, reader: Reader) -> Result<(), IdfError> {
        let id: MaterialId = reader.required_id("Name")?;
        let material = match reader.definition.name {
            "Material" => Material::Standard(StandardMaterial {
                roughness: reader.keyword("Roughness", Roughness::from_idf_keyword)?.into(),
                thickness: reader.number("Thickness")?.map(Length::new::<meter>).into(),
                conductivity: reader
                    .number("Conductivity")?
                    .map(ThermalConductivity::new::<watt_per_meter_kelvin>)
                    .into(),
                density: reader
                    .number("Density")?
                    .map(MassDensity::new::<kilogram_per_cubic_meter>)
                    .into(),
                specific_heat: reader
                    .number("Specific Heat")?
                    .map(SpecificHeatCapacity::new::<joule_per_kilogram_kelvin>)
                    .into(),
                thermal_absorptance: reader.number("Thermal Absorptance")?.into(),
                solar_absorptance: reader.number("Solar Absorptance")?.into(),
                visible_absorptance: reader.number("Visible Absorptance")?.into(),
            }),
            "Material:NoMass" => Material::NoMass(NoMassMaterial {
                roughness: reader.keyword("Roughness", Roughness::from_idf_keyword)?.into(),
                thermal_resistance: reader.number("Thermal Resistance")?.into(),
            }),
            _ => Material::SimpleGlazing(GlazingMaterial {
                u_factor: reader
                    .number("U-Factor")?
                    .map(HeatTransfer::new::<watt_per_square_meter_kelvin>)
                    .into(),
                shgc: reader.number("Solar Heat Gain Coefficient")?.into(),
                visible_transmittance: reader.number("Visible Transmittance")?.into(),
            }),
        };
        if self.model.materials.insert(id, material).is_some() {
            return Err(IdfError::Duplicate {
                class: "material".into(),
                name: reader.name(),
            });
        }
        Ok(())
    }

    fn construction(&mut self, reader: Reader) -> Result<(), IdfError> {
        let id: ConstructionId = reader.required_id("Name")?;
        let layers = reader
            .object
            .fields
            .iter()
            .skip(1)
            .filter(|layer| !layer.is_empty())
            .map(|layer| layer.parse().map_err(|_| reader.unsupported("Layer", layer)))
            .collect::<Result<Vec<MaterialId>, _>>()?;
        if self
            .model
            .constructions
            .insert(id, Construction { layers })
            .is_some()
        {
            return Err(reader.duplicate());
        }
        Ok(())
    }

    fn zone(&mut self, reader: Reader) -> Result<(), IdfError> {
        let name = reader.required("Name")?;
        if self.model.zone(name).is_some() {
            return Err(reader.duplicate());
        }
        let mut zone = Zone::new(name);
        zone.multiplier = reader.integer("Multiplier")?.into();
        zone.ceiling_height = reader.number("Ceiling Height")?.map(Length::new::<meter>).into();
        zone.volume = reader.number("Volume")?.map(Volume::new::<cubic_meter>).into();
        zone.floor_area = reader.number("Floor Area")?.map(Area::new::<square_meter>).into();
        self.model.zones.push(zone);
        Ok(())
    }

    fn thermostat(&mut self, reader: Reader<'d>) -> Result<(), IdfError> {
        for label in [
            "Heating Setpoint Schedule Name",
            "Cooling Setpoint Schedule Name",
        ] {
            if let Some(schedule) = reader.text(label) {
                return Err(reader.unsupported(label, schedule));
            }
        }
        self.thermostats.push((
            reader.required("Name")?,
            reader.number("Constant Heating Setpoint")?,
            reader.number("Constant Cooling Setpoint")?,
        ));
        Ok(())
    }

    /// Surfaces, loads and HVAC terminals of the zone at `index`.
    fn zone_member(
        &mut self,
        index: usize,
        reader: Reader,
        systems: &mut Vec<HvacSystem>,
    ) -> Result<(), IdfError> {
        let zone_name = self.model.zones[index].name.clone();
        match reader.definition.name {
            "BuildingSurface:Detailed" => {
                let (id, surface) = surface(&reader)?;
                if self.model.surfaces.contains_key(&id) {
                    return Err(reader.duplicate());
                }
                self.model.zones[index].surfaces.push(id.clone());
                self.model.surfaces.insert(id, surface);
            }
            "InternalMass" => {
                let mass = InternalMass {
                    construction: reader.required_id("Construction Name")?,
                    area: Area::new::<square_meter>(reader.required_number("Surface Area")?),
                };
                self.model.zones[index].internal_mass.push(mass);
            }
            "People" => {
                let label = "Number of People Calculation Method";
                let method = reader.required(label)?;
                if !method.eq_ignore_ascii_case("People/Area") {
                    return Err(reader.unsupported(label, method));
                }
                let people = PeopleLoad {
                    people_per_area: reader.required_number("People per Floor Area")?,
                    schedule: reader.required_id("Number of People Schedule Name")?,
                    activity_schedule: reader.required_id("Activity Level Schedule Name")?,
                };
                let zone = &mut self.model.zones[index];
                if !zone.people.is_absent() {
                    return Err(reader.duplicate());
                }
                zone.people = Field::Explicit(people);
            }
            "Lights" | "ElectricEquipment" => {
                let label = "Design Level Calculation Method";
                let method = reader.required(label)?;
                if !method.eq_ignore_ascii_case("Watts/Area") {
                    return Err(reader.unsupported(label, method));
                }
                let load = PowerDensityLoad {
                    power_density: HeatFluxDensity::new::<watt_per_square_meter>(
                        reader.required_number("Watts per Floor Area")?,
                    ),
                    schedule: reader.required_id("Schedule Name")?,
                };
                let zone = &mut self.model.zones[index];
                let field = if reader.definition.name == "Lights" {
                    &mut zone.lighting
                } else {
                    &mut zone.equipment
                };
                if !field.is_absent() {
                    return Err(reader.duplicate());
                }
                *field = Field::Explicit(load);
            }
            _ => {
                let (id, availability, kind) = zone_hvac(&reader)?;
                let zone = &mut self.model.zones[index];
                if !zone.hvac_system.is_absent() {
                    return Err(reader.duplicate());
                }
                zone.hvac_system = Field::Explicit(id.clone());
                let position = match systems.iter().position(|system| system.id == id) {
                    Some(position) => position,
                    None => {
                        let mut system = HvacSystem::new(id.clone(), kind.clone());
                        system.availability_schedule = availability.into();
                        systems.push(system);
                        systems.len() - 1
                    }
                };
                let system = &mut systems[position];
                if system.kind.name() != kind.name() {
                    return Err(reader.unsupported("Template Thermostat Name", &id));
                }
                system.serving_zones.insert(zone_name);
            }
        }
        Ok(())
    }

    fn apply_zone_lists(&mut self) -> Result<()> {
        for reader in std::mem::take(&mut self.zone_lists) {
            let list = reader.required("Name")?;
            for member in reader.object.fields.iter().skip(1).filter(|f| !f.is_empty()) {
                let Some(index) = self.model.zone_index(member) else {
                    return Err(unknown_zone(
                        FieldPath::root().field("zones"),
                        reader.object,
                        member,
                    ));
                };
                self.model.zones[index].zone_list = Some(list.to_string());
            }
        }
        Ok(())
    }

    /// Setpoints and system-level fields, then thermostat order.
    fn finish_hvac(&mut self, mut systems: Vec<HvacSystem>) {
        for system in &mut systems {
            match self
                .thermostats
                .iter()
                .find(|(name, _, _)| *name == system.id)
            {
                Some(&(_, heating, cooling)) => {
                    system.heating_setpoint = heating.into();
                    system.cooling_setpoint = cooling.into();
                }
                None => warn!(system = %system.id, "no thermostat for HVAC system"),
            }
            if let HvacKind::Vav {
                supply_air_temperature,
                ..
            } = &mut system.kind
            {
                if let Some((availability, supply)) = self.vav_systems.get(system.id.as_str()) {
                    system.availability_schedule = availability.clone().into();
                    *supply_air_temperature = (*supply).into();
                }
            }
        }
        let order = |system: &HvacSystem| {
            self.thermostats
                .iter()
                .position(|(name, _, _)| *name == system.id)
                .unwrap_or(usize::MAX)
        };
        systems.sort_by_key(order);
        self.model.hvac_systems = systems;
    }
}

fn surface(reader: &Reader) -> Result<(String, Surface), IdfError> {
    let id = reader.required("Name")?.to_string();
    let label = "Outside Boundary Condition";
    let boundary = match reader.text(label) {
        None => None,
        Some(text) => Some(match text.to_ascii_lowercase().as_str() {
            "outdoors" => BoundaryCondition::Outdoors,
            "ground" => BoundaryCondition::Ground,
            "adiabatic" => BoundaryCondition::Adiabatic,
            "surface" => BoundaryCondition::SurfaceRef(
                reader
                    .required("Outside Boundary Condition Object")?
                    .to_string(),
            ),
            _ => return Err(reader.unsupported(label, text)),
        }),
    };

    let first = reader.definition.fields.len();
    let coordinates = reader.object.fields.len().saturating_sub(first);
    if coordinates % 3 != 0 {
        return Err(reader.missing(reader.definition.label(reader.object.fields.len())));
    }
    let vertices = (first..reader.object.fields.len())
        .step_by(3)
        .map(|index| -> Result<Point3<f64>, IdfError> {
            let coordinate = |offset: usize| -> Result<f64, IdfError> {
                reader
                    .number_at(index + offset)?
                    .ok_or_else(|| reader.missing(reader.definition.label(index + offset)))
            };
            Ok(Point3::new(coordinate(0)?, coordinate(1)?, coordinate(2)?))
        })
        .collect::<Result<Vec<_>, IdfError>>()?;

    Ok((
        id,
        Surface {
            surface_type: reader
                .keyword("Surface Type", SurfaceType::from_idf_keyword)?
                .into(),
            construction: reader.id("Construction Name")?.into(),
            boundary_condition: boundary.into(),
            vertices,
            view_factor_to_ground: reader.number("View Factor to Ground")?.into(),
        },
    ))
}

fn compact_periods(reader: &Reader) -> Result<Vec<SchedulePeriod>, IdfError> {
    let mut periods: Vec<SchedulePeriod> = Vec::new();
    let mut pending: Option<TimeOfDay> = None;
    let tokens = reader
        .object
        .fields
        .iter()
        .enumerate()
        .skip(reader.definition.fields.len())
        .filter(|(_, token)| !token.is_empty());

    for (index, token) in tokens {
        let bad = || reader.unsupported(reader.definition.label(index), token);
        if let Some(date) = strip_prefix_ignore_case(token, "Through:") {
            periods.push(SchedulePeriod {
                through: date.parse().map_err(|_| bad())?,
                until: Vec::new(),
            });
        } else if let Some(days) = strip_prefix_ignore_case(token, "For:") {
            let repeated = periods.last().map_or(true, |period| !period.until.is_empty());
            if !days.eq_ignore_ascii_case("AllDays") || repeated {
                return Err(bad());
            }
        } else if let Some(time) = strip_prefix_ignore_case(token, "Until:") {
            if pending.is_some() || periods.is_empty() {
                return Err(bad());
            }
            pending = Some(time.parse().map_err(|_| bad())?);
        } else {
            let time = pending.take().ok_or_else(bad)?;
            let value = reader
                .number_at(index)?
                .ok_or_else(|| reader.missing(reader.definition.label(index)))?;
            if let Some(period) = periods.last_mut() {
                period.until.push(TimeValue { time, value });
            }
        }
    }
    if pending.is_some() {
        return Err(reader.missing(reader.definition.label(reader.object.fields.len())));
    }
    Ok(periods)
}

/// System id, availability schedule and kind named by a zone HVAC template.
fn zone_hvac(reader: &Reader) -> Result<(String, Option<ScheduleId>, HvacKind), IdfError> {
    let availability_label = "System Availability Schedule Name";
    Ok(match reader.definition.name {
        "HVACTemplate:Zone:IdealLoadsAirSystem" => (
            reader.required("Template Thermostat Name")?.to_string(),
            reader.id(availability_label)?,
            HvacKind::Simple {
                outdoor_air_per_person: reader.number("Outdoor Air Flow Rate per Person")?.into(),
            },
        ),
        "HVACTemplate:Zone:PTAC" => (
            reader.required("Template Thermostat Name")?.to_string(),
            reader.id(availability_label)?,
            HvacKind::PackagedUnit {
                cooling_cop: reader.number("Cooling Coil Gross Rated Cooling COP")?.into(),
                heating_coil: reader
                    .keyword("Heating Coil Type", HeatingCoil::from_idf_keyword)?
                    .into(),
                gas_burner_efficiency: reader.number("Gas Heating Coil Efficiency")?.into(),
                outdoor_air_per_person: reader.number("Outdoor Air Flow Rate per Person")?.into(),
            },
        ),
        _ => {
            let label = "Zone Minimum Air Flow Input Method";
            if let Some(method) = reader.text(label) {
                if !method.eq_ignore_ascii_case("Constant") {
                    return Err(reader.unsupported(label, method));
                }
            }
            (
                reader.required("Template VAV System Name")?.to_string(),
                None,
                HvacKind::Vav {
                    reheat_coil: reader
                        .keyword("Reheat Coil Type", ReheatCoil::from_idf_keyword)?
                        .into(),
                    minimum_flow_fraction: reader
                        .number("Constant Minimum Air Flow Fraction")?
                        .into(),
                    supply_air_temperature: Field::Absent,
                },
            )
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{minimal_model, two_zone_model};
    use crate::idf::encode;
    use crate::validate::{validate, IssueCode};
    use assert_matches::assert_matches;
    use proptest::prop_assert_eq;
    use test_strategy::proptest;

    /// Decoded model with the context IDF does not carry copied over.
    fn round_trip(model: &BuildingModel) -> BuildingModel {
        let text = encode(model).unwrap().to_string();
        let building_type = model
            .metadata
            .building_type
            .get()
            .unwrap_or(BuildingType::Office);
        let mut decoded = decode_as(&text.parse().unwrap(), building_type).unwrap();
        decoded.metadata.climate_zone = model.metadata.climate_zone.clone();
        decoded.metadata.building_type = model.metadata.building_type.clone();
        decoded
    }

    #[test]
    fn minimal_model_round_trip() {
        let model = minimal_model();
        assert_eq!(round_trip(&model), model.settled());
    }

    #[test]
    fn two_zone_model_round_trip() {
        let model = two_zone_model();
        let decoded = round_trip(&model);
        assert_eq!(decoded, model.settled());
        assert_ne!(
            decoded.constructions[&ConstructionId::scoped("Office", "Wall")],
            decoded.constructions[&ConstructionId::scoped("Lab", "Wall")]
        );
        assert_eq!(
            decoded.schedules[&ScheduleId::new("OfficeOccupancy")],
            Schedule::Library {
                name: "OfficeOccupancy".into()
            }
        );
    }

    #[test]
    fn defaulted_values_come_back_explicit() {
        let mut model = minimal_model();
        model.metadata.terrain = Field::Defaulted(Terrain::Suburbs);
        let decoded = round_trip(&model);
        assert_eq!(decoded.metadata.terrain, Field::Explicit(Terrain::Suburbs));
    }

    #[test]
    fn dense_text_decodes_the_same() {
        let model = two_zone_model();
        let document = encode(&model).unwrap();
        let pretty = decode(&document.to_string().parse().unwrap()).unwrap();
        let dense = decode(&document.to_dense_string().parse().unwrap()).unwrap();
        assert_eq!(pretty, dense);
    }

    #[proptest]
    fn decode_inverts_encode(model: BuildingModel) {
        prop_assert_eq!(round_trip(&model), model.settled());
    }

    #[proptest]
    fn encoding_is_stable(model: BuildingModel) {
        let first = encode(&model).unwrap();
        let again = encode(&round_trip(&model)).unwrap();
        prop_assert_eq!(first.to_string(), again.to_string());
    }

    fn hand_written() -> &'static str {
        "
        Version,23.2;
        Building,Shed,0,Country;
        Zone,
          Shed,                    !- Name
          0,0,0,0,                 !- North and origin
          ,                        !- Type
          1,                       !- Multiplier
          autocalculate,           !- Ceiling Height
          autocalculate,           !- Volume
          12;                      !- Floor Area
        Material:NoMass,Board,Rough,1.5;
        Construction,Board Wall,Board;
        BuildingSurface:Detailed,Shed Floor,floor,Board Wall,Shed,,ground,,NoSun,NoWind,,4,
          0,0,0, 0,3,0, 4,3,0, 4,0,0;
        Schedule:Compact,Heating Hours,Fraction,
          Through: 12/31, For: AllDays, Until: 06:00, 0, Until: 24:00, 1;
        HVACTemplate:Zone:IdealLoadsAirSystem,Shed,Shed Thermostat,Heating Hours;
        HVACTemplate:Thermostat,Shed Thermostat,,18,,30;
        Output:SQLite,SimpleAndTabular;
        "
    }

    #[test]
    fn decode_hand_written_file() {
        let model = decode(&hand_written().parse().unwrap()).unwrap();
        assert_eq!(model.metadata.project_id, Field::Explicit("Shed".into()));
        assert_eq!(model.metadata.terrain, Field::Explicit(Terrain::Country));

        let zone = &model.zones[0];
        assert_eq!(zone.volume, Field::Absent);
        assert_eq!(zone.floor_area, Field::Explicit(Area::new::<square_meter>(12.0)));
        assert_eq!(zone.surfaces, vec!["Shed Floor".to_string()]);
        assert_eq!(zone.hvac_system, Field::Explicit("Shed Thermostat".into()));

        let floor = &model.surfaces["Shed Floor"];
        assert_eq!(floor.surface_type, Field::Explicit(SurfaceType::Floor));
        assert_eq!(floor.boundary_condition, Field::Explicit(BoundaryCondition::Ground));
        assert_eq!(floor.vertices.len(), 4);

        assert_matches!(
            &model.schedules[&ScheduleId::new("Heating Hours")],
            Schedule::Compact { periods, .. } => {
                assert_eq!(periods.len(), 1);
                assert_eq!(periods[0].until.len(), 2);
            }
        );
        assert_eq!(model.hvac_systems[0].heating_setpoint, Field::Explicit(18.0));
        assert_eq!(
            model.extra_objects,
            vec![IdfObject::new("Output:SQLite", ["SimpleAndTabular"])]
        );

        // Context the file does not carry is the only thing left to ask.
        let missing: Vec<_> = validate(&model)
            .issues
            .iter()
            .filter(|issue| issue.code == IssueCode::MissingRequired)
            .map(|issue| issue.path.to_string())
            .collect();
        assert_eq!(missing, ["metadata.climate_zone", "metadata.building_type"]);
    }

    #[test]
    fn vav_in_energyplus_field_order() {
        let text = "
            Zone,Office;
            HVACTemplate:Zone:VAV,Office,Rooftop,Rooftop,autosize,,,Constant,0.25,,,,,,,HotWater;
            HVACTemplate:Thermostat,Rooftop,,20,,24;
            HVACTemplate:System:PackagedVAV,Rooftop,,autosize,autosize,StayOff,,TwoSpeedDX,,,12.5;
        ";
        let model = decode(&text.parse().unwrap()).unwrap();
        assert_eq!(
            model.hvac_systems[0].kind,
            HvacKind::Vav {
                reheat_coil: Field::Explicit(ReheatCoil::HotWater),
                minimum_flow_fraction: Field::Explicit(0.25),
                supply_air_temperature: Field::Explicit(12.5),
            }
        );
    }

    #[test]
    fn vav_with_scheduled_minimum_flow_is_unsupported() {
        let text = "Zone,Office;\nHVACTemplate:Zone:VAV,Office,Rooftop,Rooftop,,,,Scheduled;";
        let error = decode(&text.parse().unwrap()).unwrap_err();
        assert_matches!(error, Error::Idf(IdfError::Unsupported { field, value, .. }) => {
            assert_eq!(field, "Zone Minimum Air Flow Input Method");
            assert_eq!(value, "Scheduled");
        });
    }

    #[test]
    fn surface_in_unknown_zone() {
        let text = "Zone,Office;\nBuildingSurface:Detailed,Roof,Roof,R,Attic,,Outdoors;";
        let error = decode(&text.parse().unwrap()).unwrap_err();
        assert_matches!(error, Error::ReferentialIntegrity { path, message } => {
            assert_eq!(path.to_string(), r#"surfaces["Roof"]"#);
            message.find("Attic").expect("message should name the zone");
        });
    }

    #[test]
    fn zone_list_with_unknown_zone() {
        let text = "Zone,Office;\nZoneList,All,Office,Lab;";
        let error = decode(&text.parse().unwrap()).unwrap_err();
        assert_matches!(error, Error::ReferentialIntegrity { .. });
    }

    #[test]
    fn bad_number() {
        let text = "Material:NoMass,Board,Rough,thick;";
        let error = decode(&text.parse().unwrap()).unwrap_err();
        assert_matches!(
            error,
            Error::Idf(IdfError::BadNumber { field, value, .. }) => {
                assert_eq!(field, "Thermal Resistance");
                assert_eq!(value, "thick");
            }
        );
    }

    #[test]
    fn people_by_count_is_unsupported() {
        let text = "Zone,Office;\nPeople,Office People,Office,Occupancy,People,10;";
        let error = decode(&text.parse().unwrap()).unwrap_err();
        assert_matches!(error, Error::Idf(IdfError::Unsupported { value, .. }) => {
            assert_eq!(value, "People");
        });
    }

    #[test]
    fn duplicate_material() {
        let text = "Material:NoMass,Board,Rough,1;\nMaterial:NoMass,Board,Smooth,2;";
        let error = decode(&text.parse().unwrap()).unwrap_err();
        assert_matches!(error, Error::Idf(IdfError::Duplicate { .. }));
    }

    #[test]
    fn library_name_with_other_body_is_user_defined() {
        let text = "Schedule:Constant,AlwaysOn,Fraction,0.5;";
        let model = decode(&text.parse().unwrap()).unwrap();
        assert_eq!(
            model.schedules[&ScheduleId::new("AlwaysOn")],
            Schedule::Constant {
                type_limits: ScheduleTypeLimits::Fraction,
                value: 0.5
            }
        );
    }

    #[test]
    fn template_of_another_building_type_survives() {
        let mut model = minimal_model();
        model.extra_objects.push(IdfObject::new(
            "SimulationControl",
            ["Yes", "No", "No", "No", "Yes"],
        ));
        let decoded = round_trip(&model);
        assert_eq!(decoded.extra_objects, model.extra_objects);
        assert_eq!(decoded, model.settled());
    }

    #[test]
    fn edited_template_class_is_passed_through() {
        let mut document = encode(&minimal_model()).unwrap();
        for object in &mut document.objects {
            if object.is("SimulationControl") {
                object.fields[2] = "Yes".into();
            }
        }
        let model = decode(&document).unwrap();
        assert_matches!(model.extra_objects.as_slice(), [object] => {
            assert!(object.is("SimulationControl"));
        });
    }
}
