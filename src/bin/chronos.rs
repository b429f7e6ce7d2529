use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use chronos::{
    CancelToken, EngineConfig, ExportFormat, ExportRequest, HistogramOptions, TableRequest,
    TimelineService,
};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "chronos", version, about = "Timeline tables, charts and exports")]
struct Cli {
    /// JSON engine configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one page of the filtered table
    Query {
        filename: String,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long)]
        size: Option<i64>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// JSON object of column name to substring
        #[arg(long)]
        col_filters: Option<String>,
        #[arg(long)]
        sort_col: Option<String>,
        #[arg(long, default_value = "asc")]
        sort_dir: String,
    },
    /// Print the full-file histogram
    Histogram {
        filename: String,
        #[arg(long)]
        exclude: Option<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        col_filters: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Print the histogram of selected sequence ids
    Subset {
        filename: String,
        /// Comma separated sequence ids
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// Export the filtered view as one file
    Export(ExportArgs),
    /// Export the filtered view as a zip of size-bounded parts
    Split(ExportArgs),
    /// Convert an upload into a timeline file
    Import {
        source: PathBuf,
        /// Artifact type tag for non-report uploads
        #[arg(long)]
        artifact_type: Option<String>,
    },
}

#[derive(clap::Args)]
struct ExportArgs {
    filename: String,
    #[arg(long, default_value = "csv")]
    format: String,
    /// JSON array of `{ field, type, value }` clauses
    #[arg(long)]
    filters: Option<String>,
    #[arg(long, value_delimiter = ',')]
    ids: Vec<String>,
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    end: Option<String>,
    #[arg(long)]
    drop_empty_columns: bool,
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,
}

impl ExportArgs {
    fn into_request(self) -> Result<ExportRequest> {
        let filters = match self.filters.as_deref() {
            Some(raw) => serde_json::from_str::<Vec<Value>>(raw)?,
            None => Vec::new(),
        };
        Ok(ExportRequest {
            filename: self.filename,
            filters,
            selected_ids: self.ids.into_iter().map(Value::String).collect(),
            format: self.format.parse::<ExportFormat>()?,
            query: self.query,
            start_time: self.start,
            end_time: self.end,
            drop_empty_columns: self.drop_empty_columns,
            visible_columns: self.columns,
        })
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    let service = TimelineService::new(config);
    let cancel = CancelToken::new();

    let payload = match run(&service, cli.command, &cancel) {
        Ok(payload) => payload,
        Err(err) => {
            let payload = match err.downcast_ref::<chronos::Error>() {
                Some(err) => err.to_payload(),
                None => serde_json::json!({ "error": err.to_string() }),
            };
            print_json(&payload)?;
            std::process::exit(1);
        }
    };
    print_json(&payload)
}

fn run(service: &TimelineService, command: Commands, cancel: &CancelToken) -> Result<Value> {
    let payload = match command {
        Commands::Query {
            filename,
            page,
            size,
            query,
            start,
            end,
            col_filters,
            sort_col,
            sort_dir,
        } => {
            let request = TableRequest {
                page: Some(page),
                size,
                query,
                start,
                end,
                col_filters,
                sort_col,
                sort_dir: Some(sort_dir),
            };
            serde_json::to_value(service.query_table(&filename, &request, cancel)?)?
        }
        Commands::Histogram {
            filename,
            exclude,
            query,
            col_filters,
            start,
            end,
        } => {
            let options = HistogramOptions {
                exclude,
                query,
                col_filters,
                start,
                end,
            };
            service.histogram(&filename, &options, cancel)?.to_payload()
        }
        Commands::Subset { filename, ids } => {
            let ids: Vec<Value> = ids.into_iter().map(Value::String).collect();
            service.histogram_subset(&filename, &ids, cancel)?.to_payload()
        }
        Commands::Export(args) => {
            let request = args.into_request()?;
            serde_json::to_value(service.export(&request, cancel)?)?
        }
        Commands::Split(args) => {
            let request = args.into_request()?;
            serde_json::to_value(service.export_split(&request, cancel)?)?
        }
        Commands::Import {
            source,
            artifact_type,
        } => {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let staged = service.stage_upload(&name, File::open(&source)?)?;
            serde_json::to_value(service.convert_upload(
                &staged,
                artifact_type.as_deref(),
                cancel,
            )?)?
        }
    };
    Ok(payload)
}

fn print_json(payload: &Value) -> Result<()> {
    let mut out = io::BufWriter::new(io::stdout());
    serde_json::to_writer_pretty(&mut out, payload)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
