//! Setaccio command-line tool.
//!
//! Inspects how rich parameters are parsed and resolved, and applies fix
//! schedules to rows from JSON files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use setaccio_kernel::EngineConfig;
use setaccio_kernel::error::DirectiveKind;
use setaccio_kernel::gather::{NoFetchers, QueryContext, handler_name};
use setaccio_kernel::reshape::{FixSet, Meta, PostProcessor, ValueFilterRegistry};
use setaccio_kernel::richparam::{Whitelist, parse_rich_param, resolve_includes};

#[derive(Debug, Parser)]
#[command(name = "setaccio", version, about = "Inspect the Setaccio query language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a rich parameter and print the directive.
    Parse { input: String },

    /// Resolve an include parameter against a whitelist.
    Includes {
        input: String,
        /// JSON object of includable names.
        #[arg(long)]
        whitelist: PathBuf,
    },

    /// Print the handler key serving each field of a parameter.
    Handlers { kind: Kind, input: String },

    /// Apply a fix schedule to rows. Nested fetches are unavailable.
    Reshape {
        /// JSON array of rows.
        #[arg(long)]
        rows: PathBuf,
        /// JSON object of path → fix.
        #[arg(long)]
        fixes: PathBuf,
        /// Model name reported in the metadata.
        #[arg(long, default_value = "Row")]
        model: String,
        /// Current user handed to value filters.
        #[arg(long)]
        user: Option<Uuid>,
        #[arg(long, default_value = "")]
        language: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Filter,
    Include,
    Order,
}

impl From<Kind> for DirectiveKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Filter => DirectiveKind::Filter,
            Kind::Include => DirectiveKind::Include,
            Kind::Order => DirectiveKind::Order,
        }
    }
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let config = EngineConfig::from_env().context("failed to load configuration")?;
    info!(
        max_nesting_depth = config.max_nesting_depth,
        filter_mode = %config.filter_mode,
        "Configuration loaded"
    );

    let output = run(Cli::parse().command)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("failed to render output")?
    );
    Ok(())
}

fn run(command: Command) -> Result<Value> {
    match command {
        Command::Parse { input } => Ok(serde_json::to_value(parse_rich_param(&input))?),
        Command::Includes { input, whitelist } => {
            let whitelist: Whitelist = read_json(&whitelist)?;
            Ok(serde_json::to_value(resolve_includes(&input, &whitelist))?)
        }
        Command::Handlers { kind, input } => {
            let kind = DirectiveKind::from(kind);
            let names: serde_json::Map<String, Value> = parse_rich_param(&input)
                .fields()
                .map(|field| (field.to_string(), Value::String(handler_name(kind, field))))
                .collect();
            Ok(Value::Object(names))
        }
        Command::Reshape {
            rows,
            fixes,
            model,
            user,
            language,
        } => {
            let mut rows: Vec<Value> = read_json(&rows)?;
            let fixes: FixSet = read_json(&fixes)?;
            let filters = ValueFilterRegistry::with_builtins();
            let ctx = QueryContext {
                current_user: user,
                language: language.clone(),
                depth: 0,
            };
            let mut meta = Meta::new(&model, "", &language);

            PostProcessor::new(&NoFetchers, &filters, &ctx)
                .apply(&mut rows, &fixes, &mut meta)
                .context("failed to apply fixes")?;
            info!(rows = rows.len(), fixes = fixes.len(), "Rows reshaped");
            Ok(json!({ "data": rows, "meta": meta }))
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
