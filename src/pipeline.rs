//! End-to-end flow: suggestions, dialogue, defaults, final validation,
//! encoding and simulation.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::oneshot;
use tracing::info;

use crate::config::PipelineConfig;
use crate::defaults::{apply_defaults, DefaultPolicy};
use crate::error::Result;
use crate::idf::{encode, IdfDocument};
use crate::model::BuildingModel;
use crate::registry::{SessionId, SessionRegistry};
use crate::simulation::{
    EnergyPlusEngine, SimulationDispatchError, SimulationDispatcher, SimulationEngine,
    SimulationOutcome, SimulationSummary,
};
use crate::suggestion::{seed_model, SuggestionSet};
use crate::validate::validate_with;

/// Receives the metrics of every finished simulation.
pub trait RecommendationSink: Send + Sync {
    fn receive(&self, model: &BuildingModel, summary: &SimulationSummary);
}

/// A model that passed the final validation, with its IDF form.
#[derive(Clone, Debug, PartialEq)]
pub struct FinalModel {
    pub model: Arc<BuildingModel>,
    pub document: IdfDocument,
}

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    policy: Arc<DefaultPolicy>,
    registry: SessionRegistry,
    dispatcher: SimulationDispatcher,
    sink: Option<Box<dyn RecommendationSink>>,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig, policy: DefaultPolicy, engine: Box<dyn SimulationEngine>) -> Self {
        let policy = Arc::new(policy);
        let dispatcher = SimulationDispatcher::new(engine, config.energyplus.timeout());
        PipelineOrchestrator {
            registry: SessionRegistry::new(Arc::clone(&policy)),
            config,
            policy,
            dispatcher,
            sink: None,
        }
    }

    /// EnergyPlus as configured, with the policy file if one is set.
    pub fn from_config(config: PipelineConfig) -> anyhow::Result<Self> {
        let policy = match &config.policy_file {
            Some(path) => DefaultPolicy::load(path)?,
            None => DefaultPolicy::builtin(),
        };
        let engine = EnergyPlusEngine::new(&config.energyplus.executable);
        Ok(Self::new(config, policy, Box::new(engine)))
    }

    pub fn with_sink(mut self, sink: Box<dyn RecommendationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<DefaultPolicy> {
        &self.policy
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Seed a model from confident suggestions and open a dialogue on it.
    pub fn start(&self, suggestions: SuggestionSet) -> SessionId {
        let seeded = seed_model(suggestions, self.config.confidence_threshold);
        let id = self
            .registry
            .start_session_with_hints(seeded.model, seeded.hints);
        info!(session = %id, "started pipeline");
        id
    }

    /// Apply defaults, validate with the policy limits and encode.
    pub fn finalize(&self, model: &BuildingModel) -> Result<FinalModel> {
        let model = apply_defaults(model, &self.policy);
        validate_with(&model, &self.policy.limits).into_result()?;
        let document = encode(&model)?;
        Ok(FinalModel {
            model: Arc::new(model),
            document,
        })
    }

    /// Close the session and finalize its model.
    pub fn complete(&self, id: SessionId) -> Result<FinalModel> {
        let model = self.registry.close_session(id)?;
        self.finalize(&model)
    }

    /// Timestamped run directory under the output root.
    pub fn run_directory(&self) -> PathBuf {
        self.config
            .output_root
            .join(Local::now().format("%Y%m%d_%H%M%S_%3f").to_string())
    }

    /// Simulate a finalized model with the weather of its climate zone and
    /// pass the summary to the sink.
    pub async fn simulate(
        &self,
        model: &FinalModel,
        cancel: oneshot::Receiver<()>,
    ) -> Result<SimulationOutcome> {
        let climate_zone = model.model.metadata.climate_zone.value().ok_or_else(|| {
            SimulationDispatchError::NoWeatherForClimate("(unset)".into())
        })?;
        let weather = self
            .config
            .weather_file(climate_zone)
            .ok_or_else(|| SimulationDispatchError::NoWeatherForClimate(climate_zone.to_string()))?;

        let outcome = self
            .dispatcher
            .dispatch(&model.document, weather, &self.run_directory(), cancel)
            .await?;
        if let Some(sink) = &self.sink {
            sink.receive(&model.model, &outcome.summary);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::fixtures::minimal_model;
    use crate::model::Field;
    use crate::session::SessionState;
    use crate::simulation::tests::{ScriptEngine, TABLE};
    use crate::simulation::TABLE_FILE_NAME;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Arc<Mutex<Vec<(String, SimulationSummary)>>>);

    impl RecommendationSink for Collect {
        fn receive(&self, model: &BuildingModel, summary: &SimulationSummary) {
            let project = model.metadata.project_id.value().cloned().unwrap_or_default();
            self.0.lock().unwrap().push((project, summary.clone()));
        }
    }

    /// Orchestrator whose engine copies the sample table into the run directory.
    fn orchestrator(dir: &Path) -> PipelineOrchestrator {
        let table = dir.join("table.csv");
        std::fs::write(&table, TABLE).unwrap();
        let weather = dir.join("baltimore.epw");
        std::fs::write(&weather, "LOCATION,Baltimore\n").unwrap();

        let mut config = PipelineConfig::default();
        config.output_root = dir.join("output");
        config.weather.insert("4A".parse().unwrap(), weather);
        let engine = ScriptEngine {
            script: format!(r#"cp "$2" "$1/{TABLE_FILE_NAME}""#),
            args: vec![table],
        };
        PipelineOrchestrator::new(config, DefaultPolicy::builtin(), Box::new(engine))
    }

    fn suggestions() -> SuggestionSet {
        SuggestionSet::from_json(
            r#"{
                suggestions: [
                    {
                        path: "metadata",
                        value: { project_id: "seeded", climate_zone: "4A", building_type: "office" },
                        confidence: 0.9,
                    },
                    {
                        path: "zones[0]",
                        value: { name: "Office", floor_area: 20, surfaces: ["Office Wall"] },
                        confidence: 0.9,
                    },
                    {
                        path: 'surfaces["Office Wall"]',
                        value: {
                            surface_type: "wall",
                            construction: "Wall",
                            boundary_condition: "outdoors",
                            vertices: [[0, 0, 3], [0, 0, 0], [5, 0, 0], [5, 0, 3]],
                        },
                        confidence: 0.8,
                    },
                    { path: 'constructions["Wall"]', value: { layers: ["Insulation"] }, confidence: 0.8 },
                    {
                        path: 'materials["Insulation"]',
                        value: { kind: "no_mass", roughness: "smooth", thermal_resistance: 3 },
                        confidence: 0.75,
                    },
                    { path: "zones[0].hvac_system", value: { kind: "simple" }, confidence: 0.3 },
                ],
            }"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn suggestions_to_simulation() {
        let dir = tempfile::tempdir().unwrap();
        let received = Collect::default();
        let log = Arc::clone(&received.0);
        let pipeline = orchestrator(dir.path()).with_sink(Box::new(received));

        let id = pipeline.start(suggestions());
        let gap = pipeline.registry().next_question(id).unwrap().unwrap();
        assert_eq!(gap.path.to_string(), "zones[0].hvac_system");
        assert_eq!(gap.hints.len(), 1);

        let answer = gap.hints[0].value.clone();
        let state = pipeline.registry().submit_answer(id, gap.path, answer).unwrap();
        assert_eq!(state, SessionState::Resolved);

        let model = pipeline.complete(id).unwrap();
        assert_eq!(model.document.objects[0].class, "Version");
        assert!(model.document.objects_of("Zone").any(|zone| zone.name() == "Office"));

        let (_cancel, receiver) = oneshot::channel();
        let outcome = pipeline.simulate(&model, receiver).await.unwrap();
        assert!(outcome.run.output_dir.starts_with(dir.path().join("output")));
        assert_eq!(outcome.run.exit_code, Some(0));

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "seeded");
        assert_eq!(log[0].1, outcome.summary);
    }

    #[test]
    fn finalize_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = orchestrator(dir.path());
        let mut model = minimal_model();
        model.hvac_systems[0].heating_setpoint = Field::Absent;

        let finalized = pipeline.finalize(&model).unwrap();
        assert!(finalized.model.hvac_systems[0].heating_setpoint.is_defaulted());
        assert_eq!(finalized.document, encode(&finalized.model).unwrap());
    }

    #[test]
    fn finalize_refuses_incomplete_models() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = orchestrator(dir.path());
        let mut model = minimal_model();
        model.metadata.climate_zone = Field::Absent;
        assert_matches!(pipeline.finalize(&model), Err(Error::Validation(error)) => {
            assert!(error.paths().any(|path| path.to_string() == "metadata.climate_zone"));
        });
    }

    #[test]
    fn unfinished_session_cannot_complete() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = orchestrator(dir.path());
        let id = pipeline.start(suggestions());
        assert_matches!(pipeline.complete(id), Err(Error::Validation(_)));
        assert_eq!(
            pipeline
                .registry()
                .submit_answer(id, "zones[0].hvac_system".parse().unwrap(), json!({ "kind": "simple" }))
                .unwrap(),
            SessionState::Resolved
        );
    }

    #[tokio::test]
    async fn climate_without_weather() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = orchestrator(dir.path());
        let mut model = minimal_model();
        model.metadata.climate_zone = Field::Explicit("7".parse().unwrap());
        let finalized = pipeline.finalize(&model).unwrap();

        let (_cancel, receiver) = oneshot::channel();
        assert_matches!(
            pipeline.simulate(&finalized, receiver).await,
            Err(Error::SimulationFailed(SimulationDispatchError::NoWeatherForClimate(zone))) => {
                assert_eq!(zone, "7");
            }
        );
    }
}
