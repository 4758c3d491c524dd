use std::collections::BTreeSet;

use tracing::{debug, info, warn};
use uom::si::{
    area::square_meter, heat_flux_density::watt_per_square_meter,
    heat_transfer::watt_per_square_meter_kelvin, length::meter,
    mass_density::kilogram_per_cubic_meter, specific_heat_capacity::joule_per_kilogram_kelvin,
    thermal_conductivity::watt_per_meter_kelvin, volume::cubic_meter,
};

use crate::error::Result;
use crate::model::{
    BoundaryCondition, BuildingModel, BuildingType, Field, HvacKind, HvacSystem, Material, Zone,
};
use crate::schedule::{Schedule, ScheduleTypeLimits};
use crate::validate::{validate, IssueCode};

use super::templates::{template_set, TemplateSet};
use super::{class_def, IdfDocument, IdfObject};

/// EnergyPlus version the generated files target.
pub const IDF_VERSION: &str = "23.2";

/// Produce the IDF document for a model without Error-severity issues.
///
/// Output is deterministic: equal models give identical documents.
pub fn encode(model: &BuildingModel) -> Result<IdfDocument> {
    let report = validate(model).into_result()?;
    for issue in report.warnings() {
        if matches!(
            issue.code,
            IssueCode::UnsupportedField | IssueCode::ImplausibleValue
        ) {
            warn!(path = %issue.path, "{}", issue.message);
        }
    }

    let building_type = model
        .metadata
        .building_type
        .get()
        .unwrap_or(BuildingType::Office);
    let mut encoder = Encoder {
        model,
        templates: template_set(building_type),
        objects: Vec::new(),
    };
    encoder.run();
    info!(
        objects = encoder.objects.len(),
        templates = encoder.templates.name,
        "encoded model"
    );
    Ok(IdfDocument {
        objects: encoder.objects,
    })
}

struct Encoder<'a> {
    model: &'a BuildingModel,
    templates: TemplateSet,
    objects: Vec<IdfObject>,
}

fn number(value: f64) -> String {
    format!("{value}")
}

/// Blank for absent fields.
fn optional<T>(field: &Field<T>, format: impl Fn(&T) -> String) -> String {
    field.value().map(format).unwrap_or_default()
}

fn optional_number(field: &Field<f64>) -> String {
    optional(field, |&value| number(value))
}

impl<'a> Encoder<'a> {
    fn run(&mut self) {
        self.push("Version", vec![IDF_VERSION.to_string()]);
        self.template("SimulationControl");
        self.building();
        self.settings();
        self.template("GlobalGeometryRules");
        self.schedules();
        self.materials();
        self.constructions();
        let model = self.model;
        for zone in &model.zones {
            self.zone(zone);
        }
        self.zone_lists();
        self.hvac_systems();
        for class in [
            "Output:VariableDictionary",
            "Output:Table:SummaryReports",
            "OutputControl:Table:Style",
            "Output:Variable",
        ] {
            self.template(class);
        }
        self.objects.extend(model.extra_objects.iter().cloned());
    }

    /// Push an object, dropping trailing blank fields.
    fn push(&mut self, class: &str, mut fields: Vec<String>) {
        while fields.last().map_or(false, String::is_empty) {
            fields.pop();
        }
        self.objects.push(IdfObject::new(class, fields));
    }

    /// Push an object whose fields are placed by label, leaving the slots
    /// in between blank.
    fn push_labelled(&mut self, class: &str, values: Vec<(&str, String)>) {
        let Some(definition) = class_def(class) else {
            warn!(class, "no layout for class");
            return;
        };
        let mut fields = vec![String::new(); definition.fields.len()];
        for (label, value) in values {
            match definition.index_of(label) {
                Some(index) => fields[index] = value,
                None => warn!(class, label, "no such field"),
            }
        }
        self.push(class, fields);
    }

    /// Template objects of a class, unless pass-through objects replace them.
    fn template(&mut self, class: &str) {
        if self.model.extra_objects.iter().any(|object| object.is(class)) {
            debug!(class, "template replaced by pass-through objects");
            return;
        }
        let objects: Vec<_> = self.templates.objects_of(class).cloned().collect();
        self.objects.extend(objects);
    }

    fn building(&mut self) {
        let model = self.model;
        let metadata = &model.metadata;
        self.push(
            "Building",
            vec![
                optional(&metadata.project_id, String::clone),
                optional_number(&metadata.north_axis),
                optional(&metadata.terrain, |terrain| terrain.idf_keyword().to_string()),
            ],
        );
    }

    fn settings(&mut self) {
        let model = self.model;
        let settings = &model.settings;
        if let Some(timestep) = settings.timestep.get() {
            self.push("Timestep", vec![timestep.to_string()]);
        }
        if let Some(location) = settings.location.value() {
            self.push(
                "Site:Location",
                vec![
                    location.name.clone(),
                    number(location.latitude),
                    number(location.longitude),
                    number(location.time_zone),
                    number(location.elevation),
                ],
            );
        }
        if let Some(run_period) = settings.run_period.value() {
            self.push(
                "RunPeriod",
                vec![
                    "Run Period 1".to_string(),
                    run_period.begin.month.to_string(),
                    run_period.begin.day.to_string(),
                    String::new(),
                    run_period.end.month.to_string(),
                    run_period.end.day.to_string(),
                ],
            );
        }
    }

    fn schedules(&mut self) {
        let model = self.model;
        let resolved: Vec<_> = model
            .schedules
            .iter()
            .filter_map(|(id, schedule)| Some((id, schedule.resolved()?)))
            .collect();

        let used: BTreeSet<ScheduleTypeLimits> = resolved
            .iter()
            .filter_map(|(_, schedule)| schedule.type_limits())
            .collect();
        for limits in used {
            let fields = match limits {
                ScheduleTypeLimits::Fraction => vec!["0", "1", "Continuous"],
                ScheduleTypeLimits::OnOff => vec!["0", "1", "Discrete"],
                ScheduleTypeLimits::Temperature => vec!["-100", "200", "Continuous"],
                ScheduleTypeLimits::Any => vec![],
            };
            self.push(
                "ScheduleTypeLimits",
                std::iter::once(limits.idf_name())
                    .chain(fields)
                    .map(String::from)
                    .collect(),
            );
        }

        for (id, schedule) in resolved {
            match schedule {
                Schedule::Constant { type_limits, value } => self.push(
                    "Schedule:Constant",
                    vec![
                        id.to_string(),
                        type_limits.idf_name().to_string(),
                        number(value),
                    ],
                ),
                Schedule::Compact {
                    type_limits,
                    periods,
                } => {
                    let mut fields = vec![id.to_string(), type_limits.idf_name().to_string()];
                    for period in periods {
                        fields.push(format!("Through: {}", period.through));
                        fields.push("For: AllDays".to_string());
                        for entry in period.until {
                            fields.push(format!("Until: {}", entry.time));
                            fields.push(number(entry.value));
                        }
                    }
                    self.push("Schedule:Compact", fields);
                }
                Schedule::Library { .. } => {}
            }
        }
    }

    fn materials(&mut self) {
        let model = self.model;
        for (id, material) in &model.materials {
            match material {
                Material::Standard(material) => self.push(
                    "Material",
                    vec![
                        id.to_string(),
                        optional(&material.roughness, |r| r.idf_keyword().to_string()),
                        optional(&material.thickness, |v| number(v.get::<meter>())),
                        optional(&material.conductivity, |v| {
                            number(v.get::<watt_per_meter_kelvin>())
                        }),
                        optional(&material.density, |v| {
                            number(v.get::<kilogram_per_cubic_meter>())
                        }),
                        optional(&material.specific_heat, |v| {
                            number(v.get::<joule_per_kilogram_kelvin>())
                        }),
                        optional_number(&material.thermal_absorptance),
                        optional_number(&material.solar_absorptance),
                        optional_number(&material.visible_absorptance),
                    ],
                ),
                Material::NoMass(material) => self.push(
                    "Material:NoMass",
                    vec![
                        id.to_string(),
                        optional(&material.roughness, |r| r.idf_keyword().to_string()),
                        optional_number(&material.thermal_resistance),
                    ],
                ),
                Material::SimpleGlazing(material) => self.push(
                    "WindowMaterial:SimpleGlazingSystem",
                    vec![
                        id.to_string(),
                        optional(&material.u_factor, |v| {
                            number(v.get::<watt_per_square_meter_kelvin>())
                        }),
                        optional_number(&material.shgc),
                        optional_number(&material.visible_transmittance),
                    ],
                ),
            }
        }
    }

    fn constructions(&mut self) {
        let model = self.model;
        for (id, construction) in &model.constructions {
            self.push(
                "Construction",
                std::iter::once(id.to_string())
                    .chain(construction.layers.iter().map(ToString::to_string))
                    .collect(),
            );
        }
    }

    /// The zone followed by everything that names it.
    fn zone(&mut self, zone: &Zone) {
        let model = self.model;
        self.push(
            "Zone",
            vec![
                zone.name.clone(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                optional(&zone.multiplier, ToString::to_string),
                optional(&zone.ceiling_height, |v| number(v.get::<meter>())),
                optional(&zone.volume, |v| number(v.get::<cubic_meter>())),
                optional(&zone.floor_area, |v| number(v.get::<square_meter>())),
            ],
        );

        for id in &zone.surfaces {
            let Some(surface) = model.surfaces.get(id) else {
                continue;
            };
            let (boundary, partner, exposed) = match surface.boundary_condition.value() {
                Some(BoundaryCondition::Outdoors) => ("Outdoors", "", true),
                Some(BoundaryCondition::Ground) => ("Ground", "", false),
                Some(BoundaryCondition::Adiabatic) => ("Adiabatic", "", false),
                Some(BoundaryCondition::SurfaceRef(other)) => ("Surface", other.as_str(), false),
                None => ("", "", false),
            };
            let mut fields = vec![
                id.clone(),
                optional(&surface.surface_type, |t| t.idf_keyword().to_string()),
                optional(&surface.construction, ToString::to_string),
                zone.name.clone(),
                String::new(),
                boundary.to_string(),
                partner.to_string(),
                if exposed { "SunExposed" } else { "NoSun" }.to_string(),
                if exposed { "WindExposed" } else { "NoWind" }.to_string(),
                optional_number(&surface.view_factor_to_ground),
                surface.vertices.len().to_string(),
            ];
            for vertex in &surface.vertices {
                fields.extend([number(vertex.x), number(vertex.y), number(vertex.z)]);
            }
            self.push("BuildingSurface:Detailed", fields);
        }

        for (index, mass) in zone.internal_mass.iter().enumerate() {
            self.push_labelled(
                "InternalMass",
                vec![
                    ("Name", format!("{} Mass {}", zone.name, index + 1)),
                    ("Construction Name", mass.construction.to_string()),
                    ("Zone or ZoneList Name", zone.name.clone()),
                    ("Surface Area", number(mass.area.get::<square_meter>())),
                ],
            );
        }

        if let Some(people) = zone.people.value() {
            self.push(
                "People",
                vec![
                    format!("{} People", zone.name),
                    zone.name.clone(),
                    people.schedule.to_string(),
                    "People/Area".to_string(),
                    String::new(),
                    number(people.people_per_area),
                    String::new(),
                    "0.3".to_string(),
                    String::new(),
                    people.activity_schedule.to_string(),
                ],
            );
        }
        for (class, suffix, load) in [
            ("Lights", "Lights", &zone.lighting),
            ("ElectricEquipment", "Equipment", &zone.equipment),
        ] {
            if let Some(load) = load.value() {
                self.push(
                    class,
                    vec![
                        format!("{} {suffix}", zone.name),
                        zone.name.clone(),
                        load.schedule.to_string(),
                        "Watts/Area".to_string(),
                        String::new(),
                        number(load.power_density.get::<watt_per_square_meter>()),
                    ],
                );
            }
        }

        if let Some(system) = zone.hvac_system.value().and_then(|id| model.hvac_system(id)) {
            self.zone_hvac(zone, system);
        }
    }

    fn zone_hvac(&mut self, zone: &Zone, system: &HvacSystem) {
        let mut fields = vec![("Zone Name", zone.name.clone())];
        let outdoor_air = |rate: &Field<f64>| {
            let method = if rate.is_absent() { "" } else { "Flow/Person" };
            [
                ("Outdoor Air Method", method.to_string()),
                ("Outdoor Air Flow Rate per Person", optional_number(rate)),
            ]
        };
        let availability = (
            "System Availability Schedule Name",
            optional(&system.availability_schedule, ToString::to_string),
        );
        let class = match &system.kind {
            HvacKind::Simple {
                outdoor_air_per_person,
            } => {
                fields.push(("Template Thermostat Name", system.id.clone()));
                fields.push(availability);
                fields.extend(outdoor_air(outdoor_air_per_person));
                "HVACTemplate:Zone:IdealLoadsAirSystem"
            }
            HvacKind::PackagedUnit {
                cooling_cop,
                heating_coil,
                gas_burner_efficiency,
                outdoor_air_per_person,
            } => {
                fields.push(("Template Thermostat Name", system.id.clone()));
                fields.push(availability);
                fields.extend(outdoor_air(outdoor_air_per_person));
                fields.extend([
                    ("Cooling Coil Gross Rated Cooling COP", optional_number(cooling_cop)),
                    (
                        "Heating Coil Type",
                        optional(heating_coil, |coil| coil.idf_keyword().to_string()),
                    ),
                    ("Gas Heating Coil Efficiency", optional_number(gas_burner_efficiency)),
                ]);
                "HVACTemplate:Zone:PTAC"
            }
            HvacKind::Vav {
                reheat_coil,
                minimum_flow_fraction,
                ..
            } => {
                let method = if minimum_flow_fraction.is_absent() { "" } else { "Constant" };
                fields.extend([
                    ("Template VAV System Name", system.id.clone()),
                    ("Template Thermostat Name", system.id.clone()),
                    ("Zone Minimum Air Flow Input Method", method.to_string()),
                    (
                        "Constant Minimum Air Flow Fraction",
                        optional_number(minimum_flow_fraction),
                    ),
                    (
                        "Reheat Coil Type",
                        optional(reheat_coil, |coil| coil.idf_keyword().to_string()),
                    ),
                ]);
                "HVACTemplate:Zone:VAV"
            }
            HvacKind::RadiantLoop { .. } => return,
        };
        self.push_labelled(class, fields);
    }

    fn zone_lists(&mut self) {
        let model = self.model;
        let mut lists: Vec<(&str, Vec<String>)> = Vec::new();
        for zone in &model.zones {
            let Some(list) = zone.zone_list.as_deref() else {
                continue;
            };
            match lists.iter_mut().find(|(name, _)| *name == list) {
                Some((_, members)) => members.push(zone.name.clone()),
                None => lists.push((list, vec![zone.name.clone()])),
            }
        }
        for (name, members) in lists {
            self.push(
                "ZoneList",
                std::iter::once(name.to_string()).chain(members).collect(),
            );
        }
    }

    /// Thermostats and system-level objects of the systems that serve zones.
    fn hvac_systems(&mut self) {
        let model = self.model;
        for system in &model.hvac_systems {
            if system.serving_zones.is_empty() || matches!(system.kind, HvacKind::RadiantLoop { .. })
            {
                warn!(system = %system.id, kind = system.kind.name(), "HVAC system dropped at encode");
                continue;
            }
            self.push(
                "HVACTemplate:Thermostat",
                vec![
                    system.id.clone(),
                    String::new(),
                    optional_number(&system.heating_setpoint),
                    String::new(),
                    optional_number(&system.cooling_setpoint),
                ],
            );
            if let HvacKind::Vav {
                supply_air_temperature,
                ..
            } = &system.kind
            {
                self.push_labelled(
                    "HVACTemplate:System:PackagedVAV",
                    vec![
                        ("Name", system.id.clone()),
                        (
                            "System Availability Schedule Name",
                            optional(&system.availability_schedule, ToString::to_string),
                        ),
                        ("Cooling Coil Design Setpoint", optional_number(supply_air_temperature)),
                    ],
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fixtures::{minimal_model, two_zone_model};
    use crate::model::{ConstructionId, HeatingCoil};
    use crate::path::FieldPath;
    use assert_matches::assert_matches;
    use itertools::Itertools;

    fn objects<'d>(document: &'d IdfDocument, class: &'d str) -> Vec<&'d IdfObject> {
        document.objects_of(class).collect()
    }

    #[test]
    fn minimal_model_layout() {
        let document = encode(&minimal_model()).unwrap();
        let classes: Vec<_> = document
            .objects
            .iter()
            .map(|object| object.class.as_str())
            .dedup()
            .collect();
        assert_eq!(
            classes,
            vec![
                "Version",
                "SimulationControl",
                "Building",
                "GlobalGeometryRules",
                "ScheduleTypeLimits",
                "Schedule:Constant",
                "Material:NoMass",
                "Construction",
                "Zone",
                "BuildingSurface:Detailed",
                "HVACTemplate:Zone:IdealLoadsAirSystem",
                "HVACTemplate:Thermostat",
                "Output:VariableDictionary",
                "Output:Table:SummaryReports",
                "OutputControl:Table:Style",
                "Output:Variable",
            ]
        );
        assert_eq!(
            objects(&document, "Building")[0].fields,
            vec!["minimal".to_string()]
        );
        let ideal = objects(&document, "HVACTemplate:Zone:IdealLoadsAirSystem")[0];
        assert_eq!(ideal.fields.len(), 22);
        assert_eq!(ideal.fields[..3], ["Office", "Ideal", "AlwaysOn"]);
        assert!(ideal.fields[3..20].iter().all(String::is_empty));
        assert_eq!(ideal.fields[20], "Flow/Person");
        assert_eq!(ideal.get("Outdoor Air Flow Rate per Person"), Some("0.01"));
        assert_eq!(
            objects(&document, "HVACTemplate:Thermostat")[0].fields,
            vec!["Ideal", "", "20", "", "25"]
        );
    }

    #[test]
    fn surface_fields() {
        let document = encode(&minimal_model()).unwrap();
        assert_eq!(
            objects(&document, "BuildingSurface:Detailed")[0].fields,
            vec![
                "Office Wall", "Wall", "Wall", "Office", "", "Outdoors", "", "SunExposed",
                "WindExposed", "", "4", "0", "0", "3", "0", "0", "0", "5", "0", "0", "5", "0", "3",
            ]
        );
    }

    #[test]
    fn zone_scoped_constructions_stay_distinct() {
        let document = encode(&two_zone_model()).unwrap();
        let constructions: Vec<_> = objects(&document, "Construction")
            .into_iter()
            .map(|object| object.fields.clone())
            .collect();
        assert_eq!(
            constructions,
            vec![
                vec!["Partition", "Gypsum"],
                vec!["Lab/Wall", "Concrete"],
                vec!["Office/Wall", "Brick", "Insulation"],
            ]
        );
        let walls: Vec<_> = objects(&document, "BuildingSurface:Detailed")
            .into_iter()
            .filter(|object| object.name().ends_with("Wall"))
            .map(|object| object.get("Construction Name"))
            .collect();
        assert_eq!(walls, vec![Some("Office/Wall"), Some("Lab/Wall")]);
    }

    #[test]
    fn vav_and_zone_list() {
        let document = encode(&two_zone_model()).unwrap();
        let terminals = objects(&document, "HVACTemplate:Zone:VAV");
        assert_eq!(terminals.len(), 2);
        for (terminal, zone) in terminals.iter().zip(["Office", "Lab"]) {
            assert_eq!(terminal.fields.len(), 15);
            assert_eq!(terminal.fields[..3], [zone, "Rooftop", "Rooftop"]);
            assert_eq!(terminal.fields[3], "");
            assert_eq!(terminal.fields[6..8], ["Constant", "0.3"]);
            assert_eq!(terminal.fields[14], "Electric");
        }
        let system = objects(&document, "HVACTemplate:System:PackagedVAV")[0];
        assert_eq!(system.fields.len(), 10);
        assert_eq!(system.fields[..3], ["Rooftop", "AlwaysOn", ""]);
        assert_eq!(system.fields[9], "12.8");
        assert_eq!(
            objects(&document, "ZoneList")[0].fields,
            vec!["Teaching", "Office", "Lab"]
        );
    }

    #[test]
    fn packaged_unit_fields() {
        let mut model = minimal_model();
        model.hvac_systems[0].kind = HvacKind::PackagedUnit {
            cooling_cop: Field::Explicit(3.2),
            heating_coil: Field::Explicit(HeatingCoil::Gas),
            gas_burner_efficiency: Field::Explicit(0.8),
            outdoor_air_per_person: Field::Explicit(0.01),
        };
        let document = encode(&model).unwrap();
        let ptac = objects(&document, "HVACTemplate:Zone:PTAC")[0];
        assert_eq!(ptac.fields.len(), 26);
        assert_eq!(ptac.fields[..3], ["Office", "Ideal", ""]);
        assert_eq!(ptac.fields[7..9], ["Flow/Person", "0.01"]);
        assert_eq!(ptac.fields[11], "AlwaysOn");
        assert_eq!(ptac.fields[21..23], ["3.2", "Gas"]);
        assert_eq!(ptac.fields[25], "0.8");
    }

    #[test]
    fn internal_mass_leaves_space_blank() {
        let document = encode(&two_zone_model()).unwrap();
        assert_eq!(
            objects(&document, "InternalMass")[0].fields,
            vec!["Office Mass 1", "Office/Wall", "Office", "", "12.5"]
        );
    }

    #[test]
    fn compact_schedule_fields() {
        let document = encode(&two_zone_model()).unwrap();
        let lights = objects(&document, "Schedule:Compact")
            .into_iter()
            .find(|object| object.name() == "Lab/Lights")
            .unwrap();
        assert_eq!(
            lights.fields,
            vec![
                "Lab/Lights",
                "Fraction",
                "Through: 6/30",
                "For: AllDays",
                "Until: 08:00",
                "0.1",
                "Until: 24:00",
                "0.8",
                "Through: 12/31",
                "For: AllDays",
                "Until: 24:00",
                "0.5",
            ]
        );
    }

    #[test]
    fn pass_through_objects_replace_templates_and_come_last() {
        let document = encode(&two_zone_model()).unwrap();
        let variables = objects(&document, "Output:Variable");
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].get("Reporting Frequency"), Some("Timestep"));
        let tail: Vec<_> = document.objects[document.objects.len() - 2..]
            .iter()
            .map(|object| object.class.as_str())
            .collect();
        assert_eq!(tail, vec!["Output:Variable", "Output:Diagnostics"]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let model = two_zone_model();
        assert_eq!(
            encode(&model).unwrap().to_string(),
            encode(&model.clone()).unwrap().to_string()
        );
    }

    #[test]
    fn dangling_construction_blocks_encoding() {
        let mut model = minimal_model();
        model
            .surfaces
            .get_mut("Office Wall")
            .unwrap()
            .construction = Field::Explicit(ConstructionId::new("Missing"));
        let error = encode(&model).unwrap_err();
        assert_matches!(error, Error::Validation(error) => {
            let expected: FieldPath = r#"surfaces["Office Wall"].construction"#.parse().unwrap();
            assert!(error.paths().any(|path| path == &expected));
            assert!(error
                .issues
                .iter()
                .any(|issue| issue.code == IssueCode::DanglingReference));
        });
    }

    #[test]
    fn unserved_system_is_dropped() {
        let mut model = minimal_model();
        let mut spare = model.hvac_systems[0].clone();
        spare.id = "Spare".into();
        spare.serving_zones.clear();
        model.hvac_systems.push(spare);
        let document = encode(&model).unwrap();
        assert_eq!(objects(&document, "HVACTemplate:Thermostat").len(), 1);
    }
}
