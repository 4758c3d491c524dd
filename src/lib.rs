//! Building model pipeline: a canonical building model with validation and
//! defaulting, an EnergyPlus IDF codec, a gap resolution dialogue and
//! simulation dispatch.

pub mod config;
pub mod defaults;
pub mod error;
pub mod idf;
pub mod logging;
pub mod merge;
pub mod model;
pub mod path;
pub mod pipeline;
pub mod registry;
pub mod schedule;
pub mod session;
pub mod simulation;
pub mod suggestion;
pub mod validate;

mod tools;

#[cfg(test)]
mod fixtures;

pub use config::PipelineConfig;
pub use defaults::{apply_defaults, DefaultPolicy};
pub use error::{Error, Result, ValidationError};
pub use idf::{decode, decode_as, encode, IdfDocument, IdfError};
pub use model::{BuildingModel, Field};
pub use path::FieldPath;
pub use pipeline::{FinalModel, PipelineOrchestrator, RecommendationSink};
pub use registry::{SessionId, SessionRegistry};
pub use session::{Gap, GapResolutionSession, SessionState};
pub use simulation::{SimulationDispatchError, SimulationOutcome, SimulationSummary};
pub use suggestion::{Suggestion, SuggestionSet};
pub use validate::{validate, CompletionState, ValidationReport};
