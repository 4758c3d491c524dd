//! Models shared by the unit tests of several modules.

use crate::model::BuildingModel;

/// One zone, one outdoor wall, a single-layer construction and a
/// fully specified HVAC system.
pub fn minimal_model() -> BuildingModel {
    BuildingModel::from_json(
        r#"{
            metadata: {
                project_id: "minimal",
                climate_zone: "4A",
                building_type: "office",
            },
            zones: [
                { name: "Office", floor_area: 20, surfaces: ["Office Wall"], hvac_system: "Ideal" },
            ],
            surfaces: {
                "Office Wall": {
                    surface_type: "wall",
                    construction: "Wall",
                    boundary_condition: "outdoors",
                    vertices: [[0, 0, 3], [0, 0, 0], [5, 0, 0], [5, 0, 3]],
                },
            },
            constructions: { Wall: { layers: ["Insulation"] } },
            materials: {
                Insulation: { kind: "no_mass", roughness: "smooth", thermal_resistance: 3 },
            },
            schedules: { AlwaysOn: { type: "library", name: "AlwaysOn" } },
            hvac_systems: [
                {
                    id: "Ideal",
                    kind: "simple",
                    serving_zones: ["Office"],
                    availability_schedule: "AlwaysOn",
                    heating_setpoint: 20,
                    cooling_setpoint: 25,
                    outdoor_air_per_person: 0.01,
                },
            ],
        }"#,
    )
    .unwrap()
}

/// Two zones that each own a construction called `Wall` with different
/// layers, joined by an interzone surface pair.
pub fn two_zone_model() -> BuildingModel {
    BuildingModel::from_json(
        r#"{
            metadata: {
                project_id: "two zones",
                climate_zone: "5B",
                building_type: "school",
                north_axis: 15,
                terrain: "city",
            },
            settings: {
                timestep: 6,
                run_period: { begin: "1/1", end: "12/31" },
                location: { name: "Denver", latitude: 39.74, longitude: -104.99, time_zone: -7, elevation: 1609 },
            },
            zones: [
                {
                    name: "Office",
                    floor_area: 25,
                    volume: 75,
                    multiplier: 1,
                    zone_list: "Teaching",
                    surfaces: ["Office Wall", "Office Partition"],
                    hvac_system: "Rooftop",
                    internal_mass: [ { construction: "Office/Wall", area: 12.5 } ],
                    people: { people_per_area: 0.1, schedule: "OfficeOccupancy", activity_schedule: "DefaultActivity" },
                    lighting: { power_density: 9.5, schedule: "Lab/Lights" },
                },
                {
                    name: "Lab",
                    floor_area: 30,
                    ceiling_height: 3.2,
                    zone_list: "Teaching",
                    surfaces: ["Lab Wall", "Lab Partition"],
                    hvac_system: "Rooftop",
                    equipment: { power_density: 20, schedule: "OfficeOccupancy" },
                },
            ],
            surfaces: {
                "Office Wall": {
                    surface_type: "wall",
                    construction: "Office/Wall",
                    boundary_condition: "outdoors",
                    vertices: [[0, 0, 3], [0, 0, 0], [5, 0, 0], [5, 0, 3]],
                    view_factor_to_ground: 0.5,
                },
                "Office Partition": {
                    surface_type: "wall",
                    construction: "Partition",
                    boundary_condition: { surface_ref: "Lab Partition" },
                    vertices: [[5, 0, 3], [5, 0, 0], [5, 5, 0], [5, 5, 3]],
                },
                "Lab Wall": {
                    surface_type: "wall",
                    construction: "Lab/Wall",
                    boundary_condition: "outdoors",
                    vertices: [[10, 5, 3], [10, 5, 0], [10, 0, 0], [10, 0, 3]],
                },
                "Lab Partition": {
                    surface_type: "wall",
                    construction: "Partition",
                    boundary_condition: { surface_ref: "Office Partition" },
                    vertices: [[5, 5, 3], [5, 5, 0], [5, 0, 0], [5, 0, 3]],
                },
            },
            constructions: {
                "Office/Wall": { layers: ["Brick", "Insulation"] },
                "Lab/Wall": { layers: ["Concrete"] },
                Partition: { layers: ["Gypsum"] },
            },
            materials: {
                Brick: {
                    kind: "standard", roughness: "rough", thickness: 0.1, conductivity: 0.9,
                    density: 1920, specific_heat: 790, thermal_absorptance: 0.9,
                    solar_absorptance: 0.7, visible_absorptance: 0.7,
                },
                Insulation: { kind: "no_mass", roughness: "medium_rough", thermal_resistance: 2.5 },
                Concrete: {
                    kind: "standard", roughness: "medium_rough", thickness: 0.2, conductivity: 1.7,
                    density: 2300, specific_heat: 900,
                },
                Gypsum: {
                    kind: "standard", thickness: 0.0127, conductivity: 0.16,
                    density: 800, specific_heat: 1090,
                },
            },
            schedules: {
                AlwaysOn: { type: "library", name: "AlwaysOn" },
                OfficeOccupancy: { type: "library", name: "OfficeOccupancy" },
                DefaultActivity: { type: "library", name: "DefaultActivity" },
                "Lab/Lights": {
                    type: "compact",
                    type_limits: "fraction",
                    periods: [
                        { through: "6/30", until: [ { time: "08:00", value: 0.1 }, { time: "24:00", value: 0.8 } ] },
                        { through: "12/31", until: [ { time: "24:00", value: 0.5 } ] },
                    ],
                },
            },
            hvac_systems: [
                {
                    id: "Rooftop",
                    kind: "vav",
                    serving_zones: ["Office", "Lab"],
                    availability_schedule: "AlwaysOn",
                    heating_setpoint: 21,
                    cooling_setpoint: 24,
                    reheat_coil: "electric",
                    minimum_flow_fraction: 0.3,
                    supply_air_temperature: 12.8,
                },
            ],
            extra_objects: [
                { class: "Output:Variable", fields: ["*", "Zone Mean Air Temperature", "Timestep"] },
                { class: "Output:Diagnostics", fields: ["DisplayExtraWarnings"] },
            ],
        }"#,
    )
    .unwrap()
}
