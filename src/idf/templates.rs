//! Boilerplate objects every generated IDF carries, chosen by building type.
//!
//! Template objects have no typed counterpart in the model. A set is
//! recognised on decode when all objects of a template class match it, so
//! an untouched file decodes without any pass-through objects. Which sets
//! are candidates depends on whether the building type is known.

use crate::model::BuildingType;

use super::{ClassKind, IdfObject, CLASSES};

#[derive(Clone, Debug, PartialEq)]
pub struct TemplateSet {
    pub name: &'static str,
    pub objects: Vec<IdfObject>,
}

impl TemplateSet {
    pub fn objects_of<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a IdfObject> + 'a {
        self.objects.iter().filter(move |object| object.is(class))
    }
}

pub fn template_set(building_type: BuildingType) -> TemplateSet {
    match building_type {
        BuildingType::Office | BuildingType::Retail | BuildingType::School => commercial(),
        BuildingType::Residential => residential(),
        BuildingType::Warehouse => warehouse(),
    }
}

pub fn all_template_sets() -> Vec<TemplateSet> {
    vec![commercial(), residential(), warehouse()]
}

/// Names of the template classes, in emission order.
pub fn template_classes() -> impl Iterator<Item = &'static str> {
    CLASSES
        .iter()
        .filter(|definition| definition.kind == ClassKind::Template)
        .map(|definition| definition.name)
}

/// True if `objects` are exactly the `class` objects of one of `sets`.
pub fn is_boilerplate(sets: &[TemplateSet], class: &str, objects: &[&IdfObject]) -> bool {
    sets.iter().any(|set| {
        let expected: Vec<_> = set.objects_of(class).collect();
        !expected.is_empty()
            && expected.len() == objects.len()
            && expected
                .iter()
                .zip(objects)
                .all(|(a, b)| a.fields == b.fields)
    })
}

fn common(simulation_control: [&str; 5], variables: &[(&str, &str)]) -> Vec<IdfObject> {
    let mut objects = vec![
        IdfObject::new("SimulationControl", simulation_control),
        IdfObject::new(
            "GlobalGeometryRules",
            ["UpperLeftCorner", "Counterclockwise", "Relative"],
        ),
        IdfObject::new("Output:VariableDictionary", ["IDF"]),
        IdfObject::new("Output:Table:SummaryReports", ["AllSummary"]),
        IdfObject::new("OutputControl:Table:Style", ["CommaAndHTML"]),
    ];
    objects.extend(
        variables
            .iter()
            .map(|&(name, frequency)| IdfObject::new("Output:Variable", ["*", name, frequency])),
    );
    objects
}

fn commercial() -> TemplateSet {
    TemplateSet {
        name: "commercial",
        objects: common(
            ["Yes", "Yes", "No", "No", "Yes"],
            &[
                ("Zone Mean Air Temperature", "Hourly"),
                ("Zone Air System Sensible Heating Energy", "Hourly"),
                ("Zone Air System Sensible Cooling Energy", "Hourly"),
                ("Zone Lights Electricity Energy", "Hourly"),
            ],
        ),
    }
}

fn residential() -> TemplateSet {
    TemplateSet {
        name: "residential",
        objects: common(
            ["Yes", "Yes", "No", "No", "Yes"],
            &[
                ("Zone Mean Air Temperature", "Hourly"),
                ("Zone People Occupant Count", "Hourly"),
                ("Zone Air System Sensible Heating Energy", "Hourly"),
                ("Zone Air System Sensible Cooling Energy", "Hourly"),
            ],
        ),
    }
}

fn warehouse() -> TemplateSet {
    TemplateSet {
        name: "warehouse",
        objects: common(
            ["Yes", "No", "No", "No", "Yes"],
            &[
                ("Zone Mean Air Temperature", "Daily"),
                ("Zone Air System Sensible Heating Energy", "Daily"),
            ],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(BuildingType::Office, "commercial")]
    #[test_case(BuildingType::School, "commercial")]
    #[test_case(BuildingType::Residential, "residential")]
    #[test_case(BuildingType::Warehouse, "warehouse")]
    fn set_by_building_type(building_type: BuildingType, name: &str) {
        assert_eq!(template_set(building_type).name, name);
    }

    #[test]
    fn every_template_object_has_a_template_class() {
        let classes: Vec<_> = template_classes().collect();
        for set in all_template_sets() {
            for object in &set.objects {
                assert!(
                    classes.iter().any(|class| object.is(class)),
                    "{}",
                    object.class
                );
            }
        }
    }

    #[test]
    fn boilerplate_needs_the_whole_class() {
        let set = template_set(BuildingType::Office);
        let sets = [set.clone()];
        let variables: Vec<_> = set.objects_of("Output:Variable").collect();
        assert!(is_boilerplate(&sets, "Output:Variable", &variables));
        assert!(!is_boilerplate(&sets, "Output:Variable", &variables[1..]));

        let custom = IdfObject::new(
            "Output:Variable",
            ["*", "Site Outdoor Air Drybulb Temperature", "Hourly"],
        );
        let mut extended = variables.clone();
        extended.push(&custom);
        assert!(!is_boilerplate(&sets, "Output:Variable", &extended));
    }

    #[test]
    fn any_set_is_recognised() {
        let set = template_set(BuildingType::Warehouse);
        let control: Vec<_> = set.objects_of("SimulationControl").collect();
        assert!(is_boilerplate(&all_template_sets(), "simulationcontrol", &control));
    }

    #[test]
    fn other_building_types_are_not_boilerplate() {
        let warehouse = template_set(BuildingType::Warehouse);
        let control: Vec<_> = warehouse.objects_of("SimulationControl").collect();
        let office = [template_set(BuildingType::Office)];
        assert!(!is_boilerplate(&office, "SimulationControl", &control));
    }
}
