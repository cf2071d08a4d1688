//! CLI Entry Point for rig_daq
//!
//! Provides a command-line interface for:
//! - Acquiring frames from the rig into a new session
//! - Listing, filtering, sorting and summarising stored sessions and frames
//! - Exporting the (filtered) tables to CSV
//! - Correcting or deleting individual frames
//!
//! # Usage
//!
//! ```bash
//! rig_daq acquire --operator Ivanov --frames 10 --comment "morning run"
//! rig_daq frames --filter research=3 --range temperature=18..22 --sort time
//! rig_daq export --out export/ --range time=09:00:00..12:00:00
//! rig_daq update-frame 12 --set pressure=101.3
//! rig_daq --json sessions --filter user=Ivanov
//! rig_daq show-config
//! ```
//!
//! The plant is simulated by `MockPlant`; latency is set with
//! `acquisition.mock_read_delay_ms`.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rig_daq::acquisition::{AcquisitionReport, AcquisitionRequest, AcquisitionRun};
use rig_daq::channel::ChannelRegistry;
use rig_daq::config::{Settings, DEFAULT_CONFIG_PATH};
use rig_daq::filter::{FilterMode, FilterSet, SortOrder};
use rig_daq::log_capture::LogBuffer;
use rig_daq::logging::{self, LoggingConfig};
use rig_daq::plant::MockPlant;
use rig_daq::record::value::{parse_number, parse_time};
use rig_daq::record::{FrameUpdate, Table};
use rig_daq::stats::FilteredView;
use rig_daq::storage::{export_tables, InMemoryRepository, Repository, SqliteRepository};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Chance that a simulated stable channel returns a shifted value.
const GLITCH_PROBABILITY: f64 = 0.02;

#[derive(Parser)]
#[command(name = "rig_daq")]
#[command(about = "Test rig frame acquisition and review", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire frames into a new session
    Acquire {
        /// Operator name
        #[arg(long)]
        operator: String,

        /// Number of frames to store
        #[arg(long, default_value_t = 1)]
        frames: usize,

        /// Session comment
        #[arg(long, default_value = "")]
        comment: String,

        /// Keep results in memory instead of the database
        #[arg(long)]
        dry_run: bool,
    },

    /// List sessions
    Sessions(ViewArgs),

    /// List frames with mean and variance of every measured column
    Frames(ViewArgs),

    /// Write sessions.csv and frames.csv
    Export {
        /// Target directory (defaults to storage.export_dir)
        #[arg(long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Delete one frame
    DeleteFrame {
        /// Frame id
        id: i64,
    },

    /// Edit one frame
    UpdateFrame {
        /// Frame id
        id: i64,

        /// Column assignment, e.g. `pressure=101.3`, `time=10:15:00`, `research=2`
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        assignments: Vec<(String, String)>,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Args, Debug, Clone, Default)]
struct ViewArgs {
    /// Exact-match filter `column=value` (repeatable)
    #[arg(long = "filter", value_parser = parse_assignment)]
    filters: Vec<(String, String)>,

    /// Inclusive range filter `column=min..max`, either side may be empty (repeatable)
    #[arg(long = "range", value_parser = parse_range)]
    ranges: Vec<RangeArg>,

    /// Sort by column
    #[arg(long)]
    sort: Option<String>,

    /// Sort descending
    #[arg(long)]
    desc: bool,
}

#[derive(Debug, Clone)]
struct RangeArg {
    column: String,
    min: Option<String>,
    max: Option<String>,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected column=value, got '{raw}'"))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn parse_range(raw: &str) -> Result<RangeArg, String> {
    let (column, bounds) = parse_assignment(raw)?;
    let (min, max) = bounds
        .split_once("..")
        .ok_or_else(|| format!("expected column=min..max, got '{raw}'"))?;
    let side = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
    Ok(RangeArg {
        column,
        min: side(min),
        max: side(max),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let log_buffer = LogBuffer::new();
    logging::init(LoggingConfig::from_settings(&settings)?.with_capture(log_buffer.clone()))?;
    let registry = Arc::new(ChannelRegistry::from_settings(&settings)?);

    match cli.command {
        Commands::Acquire {
            operator,
            frames,
            comment,
            dry_run,
        } => {
            let request = AcquisitionRequest::new(operator, frames, comment);
            acquire(&settings, registry, &request, dry_run, cli.json, &log_buffer).await
        }
        Commands::Sessions(view) => {
            let repo = open_repository(&settings, &registry)?;
            let table = Table::sessions(&repo.load_sessions()?);
            let view = filtered_view(table, &view, true)?;
            if cli.json {
                print_json(&view_to_json(&view, false))
            } else {
                print_view(&view, false);
                Ok(())
            }
        }
        Commands::Frames(view) => {
            let repo = open_repository(&settings, &registry)?;
            let table = Table::frames(&registry.layout(), &repo.load_frames()?);
            let view = filtered_view(table, &view, true)?;
            if cli.json {
                print_json(&view_to_json(&view, true))
            } else {
                print_view(&view, true);
                Ok(())
            }
        }
        Commands::Export { out, view } => {
            let repo = open_repository(&settings, &registry)?;
            let sessions = Table::sessions(&repo.load_sessions()?);
            let frames = Table::frames(&registry.layout(), &repo.load_frames()?);
            check_columns_exist(&view, &[&sessions, &frames])?;
            let sessions = filtered_view(sessions, &view, false)?.visible_table();
            let frames = filtered_view(frames, &view, false)?.visible_table();
            let dir = out.unwrap_or_else(|| settings.storage.export_dir.clone());
            let summary = export_tables(&dir, &sessions, &frames)?;
            if cli.json {
                return print_json(&summary);
            }
            println!(
                "Exported {} sessions to {} and {} frames to {}",
                summary.session_rows,
                summary.sessions_path.display(),
                summary.frame_rows,
                summary.frames_path.display()
            );
            Ok(())
        }
        Commands::DeleteFrame { id } => {
            let mut repo = open_repository(&settings, &registry)?;
            repo.delete_frame(id)?;
            println!("Deleted frame {id}");
            repo.close()?;
            Ok(())
        }
        Commands::UpdateFrame { id, assignments } => {
            let mut repo = open_repository(&settings, &registry)?;
            let update = build_update(&repo, &registry, id, &assignments)?;
            let record = repo.update_frame(id, &update)?;
            println!(
                "Updated frame {} (research {}, time {})",
                record.id,
                record.session_id,
                record.captured_at.format("%H:%M:%S")
            );
            repo.close()?;
            Ok(())
        }
        Commands::ShowConfig => {
            let rendered =
                toml::to_string_pretty(&settings).context("rendering configuration as TOML")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

async fn acquire(
    settings: &Settings,
    registry: Arc<ChannelRegistry>,
    request: &AcquisitionRequest,
    dry_run: bool,
    json: bool,
    log_buffer: &LogBuffer,
) -> Result<()> {
    let plant = MockPlant::for_registry(&registry, rand::random(), GLITCH_PROBABILITY)
        .with_read_delay(Duration::from_millis(settings.acquisition.mock_read_delay_ms));
    let run = AcquisitionRun::new(registry.clone(), plant, &settings.acquisition);

    let cancel = run.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling acquisition");
            cancel.cancel();
        }
    });

    let report = if dry_run {
        let mut repo = InMemoryRepository::new(registry.field_count());
        run.execute(request, &mut repo).await?
    } else {
        let mut repo = open_repository(settings, &registry)?;
        let result = run.execute(request, &mut repo).await;
        repo.close()?;
        result?
    };

    if json {
        return print_json(&report);
    }
    print_report(&report, dry_run);
    if !log_buffer.is_empty() {
        println!("{} warning(s) logged during the run", log_buffer.len());
    }
    Ok(())
}

fn open_repository(settings: &Settings, registry: &ChannelRegistry) -> Result<SqliteRepository> {
    let path = &settings.storage.database_path;
    SqliteRepository::open(path, &registry.layout())
        .with_context(|| format!("opening database {}", path.display()))
}

/// Every filtered or sorted column must exist in at least one of `tables`.
fn check_columns_exist(args: &ViewArgs, tables: &[&Table]) -> Result<()> {
    let columns = args
        .filters
        .iter()
        .map(|(c, _)| c)
        .chain(args.ranges.iter().map(|r| &r.column))
        .chain(args.sort.iter());
    for column in columns {
        if !tables.iter().any(|t| t.schema.index_of(column).is_some()) {
            bail!("unknown column '{column}'");
        }
    }
    Ok(())
}

/// Apply filter and sort arguments. With `strict` unset, arguments naming a column
/// the table lacks are skipped.
fn filtered_view(table: Table, args: &ViewArgs, strict: bool) -> Result<FilteredView> {
    let ranged: Vec<&str> = args.ranges.iter().map(|r| r.column.as_str()).collect();
    let exact: Vec<&str> = args.filters.iter().map(|(c, _)| c.as_str()).collect();
    let has = |column: &str| table.schema.index_of(column).is_some();

    // a column is filtered the way the operator asked for it
    let overrides = ranged
        .iter()
        .map(|c| (*c, FilterMode::Range))
        .chain(exact.iter().map(|c| (*c, FilterMode::Exact)))
        .filter(|(c, _)| strict || has(*c));
    let mut filters = FilterSet::new(table.schema.clone(), overrides)?;

    for (column, value) in &args.filters {
        if strict || has(column) {
            filters.set_exact(column, value)?;
        }
    }
    for range in &args.ranges {
        if strict || has(&range.column) {
            filters.set_range(&range.column, range.min.as_deref(), range.max.as_deref())?;
        }
    }

    let sort_column = args
        .sort
        .as_deref()
        .filter(|c| strict || has(*c))
        .map(str::to_string);

    let mut view = FilteredView::with_filters(table, filters)?;
    if let Some(column) = sort_column {
        let order = if args.desc {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        view.sort_by(&column, order)?;
    }
    Ok(view)
}

fn build_update(
    repo: &SqliteRepository,
    registry: &ChannelRegistry,
    id: i64,
    assignments: &[(String, String)],
) -> Result<FrameUpdate> {
    let layout = registry.layout();
    let mut update = FrameUpdate::default();
    let mut values: Option<Vec<f64>> = None;

    for (column, raw) in assignments {
        match column.as_str() {
            "research" => {
                update.session_id = Some(
                    raw.parse()
                        .with_context(|| format!("research must be an integer, got '{raw}'"))?,
                );
            }
            "time" => {
                update.captured_at = Some(
                    parse_time(raw).ok_or_else(|| anyhow!("time must be HH:MM:SS, got '{raw}'"))?,
                );
            }
            key => {
                let index = layout
                    .iter()
                    .position(|f| f.key == key)
                    .ok_or_else(|| anyhow!("unknown column '{key}'"))?;
                if values.is_none() {
                    let current = repo
                        .load_frames()?
                        .into_iter()
                        .find(|f| f.id == id)
                        .ok_or_else(|| anyhow!("frame {id} not found"))?;
                    values = Some(current.values);
                }
                let value = if raw == "-" {
                    f64::NAN
                } else {
                    parse_number(raw).ok_or_else(|| anyhow!("{key} must be a number, got '{raw}'"))?
                };
                if let Some(slot) = values.as_mut().and_then(|v| v.get_mut(index)) {
                    *slot = value;
                }
            }
        }
    }
    update.values = values;
    info!(frame = id, "applying {} change(s)", assignments.len());
    Ok(update)
}

fn print_report(report: &AcquisitionReport, dry_run: bool) {
    let target = if dry_run { " (dry run, not stored)" } else { "" };
    println!(
        "Session {} ({}, {}): {} frame(s) acquired{target}",
        report.session.id,
        report.session.operator,
        report.session.date.format("%d.%m.%Y"),
        report.frame_ids.len()
    );
    if report.stability_retries > 0 {
        println!(
            "{} sweep(s) discarded by stability checks",
            report.stability_retries
        );
    }
    for alert in &report.alerts {
        println!("ALERT: {alert}");
    }
}

fn print_view(view: &FilteredView, with_stats: bool) {
    let headers: Vec<String> = view
        .table()
        .schema
        .headers()
        .into_iter()
        .map(str::to_string)
        .collect();
    let rows: Vec<Vec<String>> = view
        .visible_rows()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("{}", line(&headers));
    for row in &rows {
        println!("{}", line(row));
    }
    println!(
        "{} of {} row(s) shown",
        view.visible_count(),
        view.table().rows.len()
    );

    if with_stats {
        for (column, stats) in view.statistics() {
            println!("{column}: {stats}");
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Visible rows keyed by column, plus statistics when asked for.
fn view_to_json(view: &FilteredView, with_stats: bool) -> Value {
    let keys: Vec<&str> = view
        .table()
        .schema
        .columns()
        .iter()
        .map(|c| c.key.as_str())
        .collect();
    let rows: Vec<Value> = view
        .visible_rows()
        .map(|row| {
            let object: Map<String, Value> = keys
                .iter()
                .zip(row)
                .map(|(key, cell)| (key.to_string(), json!(cell)))
                .collect();
            Value::Object(object)
        })
        .collect();

    let mut out = json!({
        "total": view.table().rows.len(),
        "visible": view.visible_count(),
        "rows": rows,
    });
    if with_stats {
        out["statistics"] = json!(view.statistics());
    }
    out
}
