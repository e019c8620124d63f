//! Insight CLI: load datasets, ask questions, draw charts, serve the HTTP API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use percolate_insight::chart::{ChartSelection, ResultVisualizer, SvgRenderer};
use percolate_insight::otel::{init_tracing, LogFormat};
use percolate_insight::server::{serve, AppState};
use percolate_insight::{
    IngestionSession, InsightConfig, NormalizedQuery, Pipeline, QueryExecutor, QueryResult,
    SchemaStore, TranslateRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Ask questions of CSV datasets in plain language", long_about = None)]
struct Cli {
    /// YAML or JSON config file
    #[arg(long, global = true, env = "INSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV file as a relation
    Ingest {
        /// CSV file; its base name becomes the relation name
        file: PathBuf,

        /// Add to the current dataset instead of starting a new ingestion cycle
        #[arg(long)]
        append: bool,
    },

    /// List relations
    Tables,

    /// List the attributes of a relation
    Columns {
        relation: String,
    },

    /// Ask a question about a relation
    Ask {
        relation: String,

        /// Natural language question
        question: String,

        /// Also draw the result (bar, pie or both)
        #[arg(long)]
        chart: Option<ChartSelection>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Execute a SQL query directly
    Sql {
        query: String,

        /// Print the result as JSON (usable as `chart --input`)
        #[arg(long)]
        json: bool,
    },

    /// Draw charts from a saved result (`{columns, rows}` JSON)
    Chart {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "both")]
        kind: ChartSelection,
    },

    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Deserialize)]
struct SavedResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("insight", LogFormat::from_env())?;

    let mut config = InsightConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command {
        Commands::Ingest { file, append } => {
            let store = SchemaStore::open(&config.database_path)?;
            if append {
                let source = store.ingest(&file)?;
                println!(
                    "{} Loaded {} rows into {}",
                    "✓".green(),
                    source.row_count,
                    source.relation.bold()
                );
            } else {
                let session =
                    store.ingest_cycle(IngestionSession::new(), &file, config.baseline().as_ref())?;
                for source in session.sources() {
                    println!(
                        "{} Loaded {} rows into {} ({})",
                        "✓".green(),
                        source.row_count,
                        source.relation.bold(),
                        source.path.display()
                    );
                }
            }
        }

        Commands::Tables => {
            let store = SchemaStore::open(&config.database_path)?;
            let relations = store.list_relations()?;
            if relations.is_empty() {
                println!("{}", "No relations loaded".yellow());
            }
            for relation in relations {
                println!("  • {}", relation);
            }
        }

        Commands::Columns { relation } => {
            let store = SchemaStore::open(&config.database_path)?;
            let described = store.describe(&relation)?;
            for attribute in &described.attributes {
                println!(
                    "  • {} {}",
                    attribute.name,
                    attribute.attribute_type.to_string().dimmed()
                );
            }
        }

        Commands::Ask {
            relation,
            question,
            chart,
            json,
        } => {
            let model = Arc::new(config.llm_client()?);
            let pipeline = Pipeline::from_config(&config, model)?;
            let request = TranslateRequest { relation, question };

            let (query, result) = match pipeline.translate(&request).await {
                Ok(answer) => answer,
                Err(e) => {
                    eprintln!("{} {}", "✗".red(), e.user_message());
                    return Err(e).context("question could not be answered");
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&answer_json(&query, &result))?);
            } else {
                println!("{} {}", "→".cyan(), query.as_str().bright_white());
                print_result(&result);
            }

            if let Some(selection) = chart {
                draw(&config.artifact_dir, result.columns(), result.rows(), selection)?;
            }
        }

        Commands::Sql { query, json } => {
            let store = SchemaStore::open(&config.database_path)?;
            let executor = QueryExecutor::new(config.statement_policy);
            let query = NormalizedQuery::new(query)?;
            let result = executor.execute(&query, &store)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&answer_json(&query, &result))?);
            } else {
                print_result(&result);
            }
        }

        Commands::Chart { input, kind } => {
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("cannot read {}", input.display()))?;
            let saved: SavedResult = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a {{columns, rows}} document", input.display()))?;
            draw(&config.artifact_dir, &saved.columns, &saved.rows, kind)?;
        }

        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }

            let model = Arc::new(config.llm_client()?);
            let pipeline = Pipeline::from_config(&config, model)?;
            let state = AppState::new(pipeline, &config.artifact_dir);
            serve(state, &config.bind_addr(), config.upload_limit_bytes()).await?;
        }
    }

    Ok(())
}

fn answer_json(query: &NormalizedQuery, result: &QueryResult) -> Value {
    json!({
        "query": query.as_str(),
        "columns": result.columns(),
        "rows": result.rows(),
    })
}

fn print_result(result: &QueryResult) {
    println!("{}", result.columns().join(" | ").bold());
    for row in result.rows() {
        let cells: Vec<String> = row
            .iter()
            .map(percolate_insight::chart::display_value)
            .collect();
        println!("{}", cells.join(" | "));
    }
    println!("{}", format!("({} rows)", result.row_count()).dimmed());
}

fn draw(
    artifact_dir: &Path,
    columns: &[String],
    rows: &[Vec<Value>],
    selection: ChartSelection,
) -> anyhow::Result<()> {
    let visualizer = ResultVisualizer::new(Arc::new(SvgRenderer::new(artifact_dir)));
    let outcome = visualizer.render(columns, rows, selection)?;

    for artifact in &outcome.artifacts {
        println!("{} {} chart: {}", "✓".green(), artifact.kind, artifact.path.display());
    }
    for (kind, error) in &outcome.failures {
        println!("{} {} chart: {}", "✗".red(), kind, error);
    }

    if outcome.is_total_failure() {
        anyhow::bail!("no chart was produced");
    }
    Ok(())
}
