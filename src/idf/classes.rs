/// Whether objects of a class are generated from the model or seeded from templates.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Typed,
    Template,
}

/// Positional layout of an IDF class.
#[derive(Debug)]
pub struct ClassDef {
    pub name: &'static str,
    pub kind: ClassKind,
    pub fields: &'static [&'static str],
    /// Repeating group after `fields`; `{n}` is replaced by the group number.
    pub extensible: &'static [&'static str],
    /// Number of the first repeating group.
    pub first_group: usize,
}

impl ClassDef {
    const fn typed(name: &'static str, fields: &'static [&'static str]) -> Self {
        ClassDef {
            name,
            kind: ClassKind::Typed,
            fields,
            extensible: &[],
            first_group: 1,
        }
    }

    const fn template(name: &'static str, fields: &'static [&'static str]) -> Self {
        ClassDef {
            name,
            kind: ClassKind::Template,
            fields,
            extensible: &[],
            first_group: 1,
        }
    }

    const fn repeating(
        self,
        extensible: &'static [&'static str],
        first_group: usize,
    ) -> Self {
        ClassDef {
            extensible,
            first_group,
            ..self
        }
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|field| field.eq_ignore_ascii_case(label))
    }

    pub fn label(&self, index: usize) -> String {
        if let Some(label) = self.fields.get(index) {
            return (*label).to_string();
        }
        if self.extensible.is_empty() {
            return format!("Field {}", index + 1);
        }
        let offset = index - self.fields.len();
        let group = offset / self.extensible.len() + self.first_group;
        self.extensible[offset % self.extensible.len()].replace("{n}", &group.to_string())
    }
}

pub const CLASSES: &[ClassDef] = &[
    ClassDef::typed("Version", &["Version Identifier"]),
    ClassDef::template(
        "SimulationControl",
        &[
            "Do Zone Sizing Calculation",
            "Do System Sizing Calculation",
            "Do Plant Sizing Calculation",
            "Run Simulation for Sizing Periods",
            "Run Simulation for Weather File Run Periods",
        ],
    ),
    ClassDef::typed("Building", &["Name", "North Axis", "Terrain"]),
    ClassDef::typed("Timestep", &["Number of Timesteps per Hour"]),
    ClassDef::typed(
        "Site:Location",
        &["Name", "Latitude", "Longitude", "Time Zone", "Elevation"],
    ),
    ClassDef::typed(
        "RunPeriod",
        &[
            "Name",
            "Begin Month",
            "Begin Day of Month",
            "Begin Year",
            "End Month",
            "End Day of Month",
            "End Year",
        ],
    ),
    ClassDef::template(
        "GlobalGeometryRules",
        &[
            "Starting Vertex Position",
            "Vertex Entry Direction",
            "Coordinate System",
        ],
    ),
    ClassDef::typed(
        "ScheduleTypeLimits",
        &[
            "Name",
            "Lower Limit Value",
            "Upper Limit Value",
            "Numeric Type",
        ],
    ),
    ClassDef::typed(
        "Schedule:Constant",
        &["Name", "Schedule Type Limits Name", "Hourly Value"],
    ),
    ClassDef::typed("Schedule:Compact", &["Name", "Schedule Type Limits Name"])
        .repeating(&["Field {n}"], 1),
    ClassDef::typed(
        "Material",
        &[
            "Name",
            "Roughness",
            "Thickness",
            "Conductivity",
            "Density",
            "Specific Heat",
            "Thermal Absorptance",
            "Solar Absorptance",
            "Visible Absorptance",
        ],
    ),
    ClassDef::typed(
        "Material:NoMass",
        &["Name", "Roughness", "Thermal Resistance"],
    ),
    ClassDef::typed(
        "WindowMaterial:SimpleGlazingSystem",
        &[
            "Name",
            "U-Factor",
            "Solar Heat Gain Coefficient",
            "Visible Transmittance",
        ],
    ),
    ClassDef::typed("Construction", &["Name", "Outside Layer"]).repeating(&["Layer {n}"], 2),
    ClassDef::typed(
        "Zone",
        &[
            "Name",
            "Direction of Relative North",
            "X Origin",
            "Y Origin",
            "Z Origin",
            "Type",
            "Multiplier",
            "Ceiling Height",
            "Volume",
            "Floor Area",
        ],
    ),
    ClassDef::typed(
        "BuildingSurface:Detailed",
        &[
            "Name",
            "Surface Type",
            "Construction Name",
            "Zone Name",
            "Space Name",
            "Outside Boundary Condition",
            "Outside Boundary Condition Object",
            "Sun Exposure",
            "Wind Exposure",
            "View Factor to Ground",
            "Number of Vertices",
        ],
    )
    .repeating(
        &[
            "Vertex {n} X-coordinate",
            "Vertex {n} Y-coordinate",
            "Vertex {n} Z-coordinate",
        ],
        1,
    ),
    ClassDef::typed(
        "InternalMass",
        &[
            "Name",
            "Construction Name",
            "Zone or ZoneList Name",
            "Space or SpaceList Name",
            "Surface Area",
        ],
    ),
    ClassDef::typed(
        "People",
        &[
            "Name",
            "Zone or ZoneList or Space or SpaceList Name",
            "Number of People Schedule Name",
            "Number of People Calculation Method",
            "Number of People",
            "People per Floor Area",
            "Floor Area per Person",
            "Fraction Radiant",
            "Sensible Heat Fraction",
            "Activity Level Schedule Name",
        ],
    ),
    ClassDef::typed(
        "Lights",
        &[
            "Name",
            "Zone or ZoneList or Space or SpaceList Name",
            "Schedule Name",
            "Design Level Calculation Method",
            "Lighting Level",
            "Watts per Floor Area",
        ],
    ),
    ClassDef::typed(
        "ElectricEquipment",
        &[
            "Name",
            "Zone or ZoneList or Space or SpaceList Name",
            "Schedule Name",
            "Design Level Calculation Method",
            "Design Level",
            "Watts per Floor Area",
        ],
    ),
    ClassDef::typed(
        "HVACTemplate:Zone:IdealLoadsAirSystem",
        &[
            "Zone Name",
            "Template Thermostat Name",
            "System Availability Schedule Name",
            "Maximum Heating Supply Air Temperature",
            "Minimum Cooling Supply Air Temperature",
            "Maximum Heating Supply Air Humidity Ratio",
            "Minimum Cooling Supply Air Humidity Ratio",
            "Heating Limit",
            "Maximum Heating Air Flow Rate",
            "Maximum Sensible Heating Capacity",
            "Cooling Limit",
            "Maximum Cooling Air Flow Rate",
            "Maximum Total Cooling Capacity",
            "Heating Availability Schedule Name",
            "Cooling Availability Schedule Name",
            "Dehumidification Control Type",
            "Cooling Sensible Heat Ratio",
            "Dehumidification Setpoint",
            "Humidification Control Type",
            "Humidification Setpoint",
            "Outdoor Air Method",
            "Outdoor Air Flow Rate per Person",
        ],
    ),
    ClassDef::typed(
        "HVACTemplate:Zone:PTAC",
        &[
            "Zone Name",
            "Template Thermostat Name",
            "Cooling Supply Air Flow Rate",
            "Heating Supply Air Flow Rate",
            "No Load Supply Air Flow Rate",
            "Zone Heating Sizing Factor",
            "Zone Cooling Sizing Factor",
            "Outdoor Air Method",
            "Outdoor Air Flow Rate per Person",
            "Outdoor Air Flow Rate per Zone Floor Area",
            "Outdoor Air Flow Rate per Zone",
            "System Availability Schedule Name",
            "Supply Fan Operating Mode Schedule Name",
            "Supply Fan Placement",
            "Supply Fan Total Efficiency",
            "Supply Fan Delta Pressure",
            "Supply Fan Motor Efficiency",
            "Cooling Coil Type",
            "Cooling Coil Availability Schedule Name",
            "Cooling Coil Gross Rated Total Capacity",
            "Cooling Coil Gross Rated Sensible Heat Ratio",
            "Cooling Coil Gross Rated Cooling COP",
            "Heating Coil Type",
            "Heating Coil Availability Schedule Name",
            "Heating Coil Capacity",
            "Gas Heating Coil Efficiency",
        ],
    ),
    ClassDef::typed(
        "HVACTemplate:Zone:VAV",
        &[
            "Zone Name",
            "Template VAV System Name",
            "Template Thermostat Name",
            "Supply Air Maximum Flow Rate",
            "Zone Heating Sizing Factor",
            "Zone Cooling Sizing Factor",
            "Zone Minimum Air Flow Input Method",
            "Constant Minimum Air Flow Fraction",
            "Fixed Minimum Air Flow Rate",
            "Minimum Air Flow Fraction Schedule Name",
            "Outdoor Air Method",
            "Outdoor Air Flow Rate per Person",
            "Outdoor Air Flow Rate per Zone Floor Area",
            "Outdoor Air Flow Rate per Zone",
            "Reheat Coil Type",
        ],
    ),
    ClassDef::typed("ZoneList", &["Name"]).repeating(&["Zone {n} Name"], 1),
    ClassDef::typed(
        "HVACTemplate:Thermostat",
        &[
            "Name",
            "Heating Setpoint Schedule Name",
            "Constant Heating Setpoint",
            "Cooling Setpoint Schedule Name",
            "Constant Cooling Setpoint",
        ],
    ),
    ClassDef::typed(
        "HVACTemplate:System:PackagedVAV",
        &[
            "Name",
            "System Availability Schedule Name",
            "Supply Fan Maximum Flow Rate",
            "Supply Fan Minimum Flow Rate",
            "Night Cycle Control",
            "Night Cycle Control Zone Name",
            "Cooling Coil Type",
            "Cooling Coil Availability Schedule Name",
            "Cooling Coil Setpoint Schedule Name",
            "Cooling Coil Design Setpoint",
        ],
    ),
    ClassDef::template("Output:VariableDictionary", &["Key Field", "Sort Option"]),
    ClassDef::template("Output:Table:SummaryReports", &[]).repeating(&["Report {n} Name"], 1),
    ClassDef::template(
        "OutputControl:Table:Style",
        &["Column Separator", "Unit Conversion"],
    ),
    ClassDef::template(
        "Output:Variable",
        &["Key Value", "Variable Name", "Reporting Frequency"],
    ),
];

pub fn class_def(name: &str) -> Option<&'static ClassDef> {
    CLASSES
        .iter()
        .find(|definition| definition.name.eq_ignore_ascii_case(name.trim()))
}

/// Classes generated from the typed model; they cannot be passed through.
pub fn is_typed_class(name: &str) -> bool {
    class_def(name).map_or(false, |definition| definition.kind == ClassKind::Typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Zone", 9, "Floor Area")]
    #[test_case("Construction", 1, "Outside Layer")]
    #[test_case("Construction", 2, "Layer 2")]
    #[test_case("Construction", 4, "Layer 4")]
    #[test_case("BuildingSurface:Detailed", 11, "Vertex 1 X-coordinate")]
    #[test_case("BuildingSurface:Detailed", 15, "Vertex 2 Y-coordinate")]
    #[test_case("Output:Table:SummaryReports", 0, "Report 1 Name")]
    #[test_case("Building", 7, "Field 8")]
    fn labels(class: &str, index: usize, label: &str) {
        assert_eq!(class_def(class).unwrap().label(index), label);
    }

    #[test_case("HVACTemplate:Zone:IdealLoadsAirSystem", "Maximum Heating Supply Air Temperature", 3)]
    #[test_case("HVACTemplate:Zone:IdealLoadsAirSystem", "Outdoor Air Method", 20)]
    #[test_case("HVACTemplate:Zone:IdealLoadsAirSystem", "Outdoor Air Flow Rate per Person", 21)]
    #[test_case("HVACTemplate:Zone:PTAC", "Cooling Supply Air Flow Rate", 2)]
    #[test_case("HVACTemplate:Zone:PTAC", "Outdoor Air Method", 7)]
    #[test_case("HVACTemplate:Zone:PTAC", "System Availability Schedule Name", 11)]
    #[test_case("HVACTemplate:Zone:PTAC", "Cooling Coil Gross Rated Cooling COP", 21)]
    #[test_case("HVACTemplate:Zone:PTAC", "Heating Coil Type", 22)]
    #[test_case("HVACTemplate:Zone:PTAC", "Gas Heating Coil Efficiency", 25)]
    #[test_case("HVACTemplate:Zone:VAV", "Supply Air Maximum Flow Rate", 3)]
    #[test_case("HVACTemplate:Zone:VAV", "Zone Minimum Air Flow Input Method", 6)]
    #[test_case("HVACTemplate:Zone:VAV", "Constant Minimum Air Flow Fraction", 7)]
    #[test_case("HVACTemplate:Zone:VAV", "Reheat Coil Type", 14)]
    #[test_case("HVACTemplate:System:PackagedVAV", "Supply Fan Maximum Flow Rate", 2)]
    #[test_case("HVACTemplate:System:PackagedVAV", "Cooling Coil Design Setpoint", 9)]
    #[test_case("InternalMass", "Space or SpaceList Name", 3)]
    #[test_case("InternalMass", "Surface Area", 4)]
    fn energyplus_field_order(class: &str, label: &str, index: usize) {
        assert_eq!(class_def(class).unwrap().index_of(label), Some(index));
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(class_def("zonelist").unwrap().name, "ZoneList");
        assert!(is_typed_class("building"));
        assert!(!is_typed_class("Output:Variable"));
        assert!(!is_typed_class("Output:Diagnostics"));
    }

    #[test]
    fn class_names_are_unique() {
        for (i, a) in CLASSES.iter().enumerate() {
            for b in &CLASSES[i + 1..] {
                assert!(!a.name.eq_ignore_ascii_case(b.name), "{}", a.name);
            }
        }
    }
}
