use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{info, warn};

use building_pipeline::model::BuildingType;
use building_pipeline::{
    decode, decode_as, logging, BuildingModel, Gap, IdfDocument, PipelineConfig,
    PipelineOrchestrator, SessionId, SessionState, SuggestionSet,
};

#[derive(Parser)]
#[command(name = "building-pipeline", about = "Turn building descriptions into EnergyPlus input files")]
struct Args {
    #[arg(long, default_value = "config.json5")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill the gaps of a model in a dialogue on stdin and write its IDF.
    Build {
        /// Attribute suggestions to seed the model with.
        #[arg(long)]
        suggestions: Option<PathBuf>,
        /// Partial model to start from instead of suggestions.
        #[arg(long, conflicts_with = "suggestions")]
        model: Option<PathBuf>,
        #[arg(long, default_value = "model.idf")]
        out: PathBuf,
        /// Run the simulation engine on the result.
        #[arg(long)]
        simulate: bool,
    },
    /// Read an IDF file into a model and print it as JSON.
    Import {
        idf: PathBuf,
        /// Building type the file was generated for, e.g. `warehouse`.
        #[arg(long, value_parser = parse_building_type)]
        building_type: Option<BuildingType>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = if args.config.exists() {
        PipelineConfig::load(&args.config)?
    } else {
        PipelineConfig::default()
    };
    if let Some(log_file) = logging::init(&config.logging)? {
        info!(log_file = %log_file.display(), "logging to file");
    }

    match args.command {
        Command::Build {
            suggestions,
            model,
            out,
            simulate,
        } => build(config, suggestions, model, &out, simulate).await,
        Command::Import { idf, building_type } => import(&idf, building_type).await,
    }
}

async fn build(
    config: PipelineConfig,
    suggestions: Option<PathBuf>,
    model: Option<PathBuf>,
    out: &Path,
    simulate: bool,
) -> anyhow::Result<()> {
    let pipeline = PipelineOrchestrator::from_config(config)?;
    let id = match (suggestions, model) {
        (Some(path), _) => pipeline.start(SuggestionSet::load(path)?),
        (None, Some(path)) => pipeline.registry().start_session(BuildingModel::load(path)?),
        (None, None) => pipeline.start(SuggestionSet::default()),
    };

    dialogue(&pipeline, id).await?;
    let model = pipeline.complete(id)?;
    tokio::fs::write(out, model.document.to_string())
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Written: {}", out.display());

    if simulate {
        let (cancel, receiver) = oneshot::channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling the simulation");
                let _ = cancel.send(());
            }
        });
        let outcome = pipeline.simulate(&model, receiver).await?;
        println!("Results in {}", outcome.run.output_dir.display());
        println!("{}", serde_json::to_string_pretty(&outcome.summary)?);
    }
    Ok(())
}

fn ask(gap: &Gap) {
    println!();
    println!("{} ({:?}): {}", gap.path, gap.code, gap.message);
    for hint in &gap.hints {
        println!("  suggested: {} (confidence {:.2})", hint.value, hint.confidence);
    }
    println!("Answer with a JSON5 value, empty line for the first suggestion, 'undo' or 'quit':");
}

/// A JSON5 value, or the line as a plain string.
fn parse_answer(line: &str) -> Value {
    json5::from_str(line).unwrap_or_else(|_| Value::String(line.to_string()))
}

async fn dialogue(pipeline: &PipelineOrchestrator, id: SessionId) -> anyhow::Result<()> {
    let registry = pipeline.registry();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(gap) = registry.next_question(id)? {
        ask(&gap);
        let Some(line) = lines.next_line().await? else {
            bail!("input ended with {} still open", gap.path);
        };
        let line = line.trim();
        let value = match line {
            "quit" => bail!("dialogue aborted"),
            "undo" => {
                match registry.with_session(id, |session| session.undo())? {
                    Ok(state) => println!("Undone, session is {state:?}"),
                    Err(e) => println!("{e}"),
                }
                continue;
            }
            "" => match gap.hints.first() {
                Some(hint) => hint.value.clone(),
                None => continue,
            },
            answer => parse_answer(answer),
        };
        match registry.submit_answer(id, gap.path.clone(), value) {
            Ok(SessionState::Resolved) => println!("Nothing blocks the model any more."),
            Ok(_) => {}
            Err(e) => println!("{e}"),
        }
    }
    Ok(())
}

fn parse_building_type(text: &str) -> Result<BuildingType, serde_json::Error> {
    serde_json::from_value(Value::String(text.to_ascii_lowercase()))
}

async fn import(path: &Path, building_type: Option<BuildingType>) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document: IdfDocument = text.parse()?;
    let model = match building_type {
        Some(building_type) => decode_as(&document, building_type)?,
        None => decode(&document)?,
    };
    println!("{}", serde_json::to_string_pretty(&model)?);
    Ok(())
}
