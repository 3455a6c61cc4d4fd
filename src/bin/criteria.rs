#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use score_criteria::gateway::API_KEY_ENV;
use score_criteria::{
    resolve_selection, CacheConfig, Criteria, CriteriaController, EditorSession,
    MemoryCriteriaStore, MergeOutcome, ScoreParsing, TaxonomyCache, UniformAdapter,
};

#[derive(Parser)]
#[command(name = "criteria", version, about = "Minimum-score criteria CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch dimensions and traits and print the grouped options as JSON
    Options {
        #[arg(long, env = "UNIFORM_PROJECT_ID")]
        project: String,
        #[arg(long, env = "UNIFORM_API_KEY", hide_env_values = true, default_value = "")]
        api_key: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Resolve a selection id to its option
    Resolve {
        #[arg(long, env = "UNIFORM_PROJECT_ID")]
        project: String,
        #[arg(long, env = "UNIFORM_API_KEY", hide_env_values = true, default_value = "")]
        api_key: String,
        #[arg(long)]
        dim: String,
    },
    /// Show the editor state for a criteria file
    Show {
        #[arg(long)]
        criteria: PathBuf,
        #[arg(long, env = "UNIFORM_PROJECT_ID")]
        project: String,
        #[arg(long, env = "UNIFORM_API_KEY", hide_env_values = true, default_value = "")]
        api_key: String,
    },
    /// Apply edits to a criteria file
    Edit {
        #[arg(long)]
        criteria: PathBuf,
        /// New dimension or trait id (empty clears it)
        #[arg(long)]
        dim: Option<String>,
        /// New minimum score (empty clears it)
        #[arg(long, allow_hyphen_values = true)]
        min_score: Option<String>,
        /// Reject non-numeric minimum scores instead of storing NaN
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        read_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Options {
            project,
            api_key,
            out,
        } => {
            let session = open_session(&project, &api_key, Criteria::default())?;
            session.refresh().await;
            let view = session.view();
            for error in &view.errors {
                eprintln!("warning: {error}");
            }
            match out {
                Some(path) => write_json(&path, view.groups.as_ref())?,
                None => println!("{}", serde_json::to_string_pretty(view.groups.as_ref())?),
            }
        }
        Commands::Resolve {
            project,
            api_key,
            dim,
        } => {
            let session = open_session(&project, &api_key, Criteria::default())?;
            session.refresh().await;
            let groups = session.groups();
            match resolve_selection(Some(dim.as_str()), &groups) {
                Some(option) => println!("{}", serde_json::to_string_pretty(option)?),
                None => return Err(format!("no option with id {dim:?}").into()),
            }
        }
        Commands::Show {
            criteria,
            project,
            api_key,
        } => {
            let value = read_criteria(&criteria)?;
            let session = open_session(&project, &api_key, value)?;
            session.refresh().await;
            println!("{}", serde_json::to_string_pretty(&session.view())?);
        }
        Commands::Edit {
            criteria,
            dim,
            min_score,
            strict,
            read_only,
        } => {
            let store = MemoryCriteriaStore::new("", read_criteria(&criteria)?);
            store.set_read_only(read_only);
            let parsing = if strict {
                ScoreParsing::Strict
            } else {
                ScoreParsing::Lenient
            };
            let controller = CriteriaController::with_parsing(store, parsing);

            let mut outcome = MergeOutcome::ReadOnly;
            if let Some(dim) = dim {
                outcome = controller.apply_dimension_change(Some(dim.as_str()))?;
            }
            if let Some(raw) = min_score {
                outcome = controller.apply_min_score_change(&raw)?;
            }

            match outcome {
                MergeOutcome::Applied(value) => {
                    write_json(&criteria, &value)?;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                MergeOutcome::ReadOnly => eprintln!("criteria unchanged"),
            }
        }
    }

    Ok(())
}

fn open_session(
    project: &str,
    api_key: &str,
    value: Criteria,
) -> Result<EditorSession<MemoryCriteriaStore>, Box<dyn std::error::Error>> {
    let adapter = UniformAdapter::from_env()?;
    let cache = TaxonomyCache::with_config(Arc::new(adapter), CacheConfig::default());
    let controller = CriteriaController::new(MemoryCriteriaStore::new(project, value));
    let session = EditorSession::new(cache, controller, api_key);
    if !session.credentials().is_enabled() {
        eprintln!("warning: project id or {API_KEY_ENV} missing; no data will be fetched");
    }
    Ok(session)
}

fn read_criteria(path: &PathBuf) -> Result<Criteria, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Ok(Criteria::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize + ?Sized>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
