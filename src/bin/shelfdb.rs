use clap::{Parser, Subcommand};
use shelfdb::Database;
use shelfdb::cli::{self as prog_cli, Command, OutputMode};
use shelfdb::collection::Collection;
use shelfdb::config::{AppConfig, ConfigLayer};
use shelfdb::logger;
use shelfdb::query::telemetry;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "shelfdb", version, about = "Query a books collection with Mongo-style JSON", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Data file holding the collection (NDJSON, JSON array or CSV)")]
    data: Option<PathBuf>,
    #[arg(long, help = "Collection name")]
    collection: Option<String>,
    #[arg(long, value_enum, help = "Output format")]
    output: Option<OutputMode>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Find documents matching a filter")]
    Find {
        #[arg(default_value = "{}", help = "Filter JSON, e.g. '{\"genre\":\"Fiction\"}'")]
        filter: String,
        #[arg(long, help = "Projection JSON, e.g. '{\"title\":1,\"_id\":0}'")]
        project: Option<String>,
        #[arg(long, help = "Sort JSON, e.g. '{\"price\":-1}'")]
        sort: Option<String>,
        #[arg(long)]
        skip: Option<usize>,
        #[arg(long, help = "Maximum documents; 0 means no limit")]
        limit: Option<usize>,
    },
    #[command(about = "Count documents matching a filter")]
    Count {
        #[arg(default_value = "{}")]
        filter: String,
    },
    #[command(name = "update-one", about = "Update the first matching document")]
    UpdateOne { filter: String, update: String },
    #[command(name = "update-many", about = "Update every matching document")]
    UpdateMany { filter: String, update: String },
    #[command(name = "delete-one", about = "Delete the first matching document")]
    DeleteOne { filter: String },
    #[command(name = "delete-many", about = "Delete every matching document")]
    DeleteMany { filter: String },
    #[command(about = "Run an aggregation pipeline (JSON array of stages)")]
    Aggregate { pipeline: String },
    #[command(name = "create-index", about = "Create an index, e.g. '{\"author\":1,\"published_year\":-1}'")]
    CreateIndex {
        keys: String,
        #[arg(long)]
        name: Option<String>,
    },
    #[command(name = "drop-index", about = "Drop an index by name")]
    DropIndex { name: String },
    #[command(name = "list-indexes", about = "List indexes")]
    ListIndexes,
    #[command(about = "Explain a find")]
    Explain {
        filter: String,
        #[arg(long, help = "queryPlanner or executionStats (default)")]
        verbosity: Option<String>,
    },
    #[command(about = "Import documents from a file")]
    Import {
        file: PathBuf,
        #[arg(long, help = "ndjson | json | csv (default: detect)")]
        format: Option<String>,
        #[arg(long)]
        skip_errors: bool,
    },
    #[command(about = "Export documents to a file")]
    Export {
        file: PathBuf,
        #[arg(long, help = "ndjson | json | csv (default: from extension)")]
        format: Option<String>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    #[command(about = "Run the sixteen example statements on a sample catalogue")]
    Demo,
}

impl From<Commands> for Command {
    fn from(c: Commands) -> Self {
        match c {
            Commands::Find { filter, project, sort, skip, limit } => {
                Self::Find { filter_json: filter, projection_json: project, sort_json: sort, skip, limit }
            }
            Commands::Count { filter } => Self::Count { filter_json: filter },
            Commands::UpdateOne { filter, update } => Self::UpdateOne { filter_json: filter, update_json: update },
            Commands::UpdateMany { filter, update } => Self::UpdateMany { filter_json: filter, update_json: update },
            Commands::DeleteOne { filter } => Self::DeleteOne { filter_json: filter },
            Commands::DeleteMany { filter } => Self::DeleteMany { filter_json: filter },
            Commands::Aggregate { pipeline } => Self::Aggregate { pipeline_json: pipeline },
            Commands::CreateIndex { keys, name } => Self::CreateIndex { keys_json: keys, name },
            Commands::DropIndex { name } => Self::DropIndex { name },
            Commands::ListIndexes => Self::ListIndexes,
            Commands::Explain { filter, verbosity } => Self::Explain { filter_json: filter, verbosity },
            Commands::Import { file, format, skip_errors } => Self::Import { file, format, skip_errors },
            Commands::Export { file, format, filter, limit } => {
                Self::Export { file, format, filter_json: filter, limit }
            }
            Commands::Demo => Self::Demo,
        }
    }
}

fn execute(cli: Cli) -> Result<(), Box<dyn Error>> {
    let flags = ConfigLayer {
        data_file: cli.data,
        collection: cli.collection,
        output: cli.output,
        ..ConfigLayer::default()
    };
    let cfg = AppConfig::load(cli.config.as_deref(), flags)?;
    if let Some(dir) = cfg.log_dir.as_deref()
        && let Err(e) = logger::configure_logging(Some(dir), cfg.log_level.as_deref(), cfg.log_retention, cfg.dev_log)
    {
        eprintln!("warning: logging disabled: {e}");
    }
    if let Some(ms) = cfg.slow_query_ms {
        telemetry::set_slow_query_ms(ms);
    }
    telemetry::set_audit_enabled(cfg.audit);
    let cmd = Command::from(cli.command);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if cmd == Command::Demo {
        let scratch = Arc::new(Collection::new(cfg.collection.as_str()));
        return prog_cli::run_with_format(&scratch, cmd, cfg.output, &mut out);
    }

    let db = Database::new();
    let col = db.load_collection_file(&cfg.collection, &cfg.data_file)?;
    db.load_index_metadata(&cfg.index_metadata_file())?;
    let (save_data, save_indexes) = (cmd.mutates_data(), cmd.mutates_indexes());
    prog_cli::run_with_format(&col, cmd, cfg.output, &mut out)?;
    if save_data {
        db.save_collection_file(&cfg.collection, &cfg.data_file)?;
    }
    if save_indexes {
        db.save_index_metadata(&cfg.index_metadata_file())?;
    }
    log::debug!("{}", telemetry::metrics_text().trim_end());
    Ok(())
}

fn main() {
    if let Err(e) = execute(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
