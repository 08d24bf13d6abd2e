//! wafermap CLI
//!
//! Ingests spectrum exports into an HDF5 store, lists recorded positions,
//! summarizes assembled grids and writes the canonical compacted store.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use thiserror::Error;
use wafermap_core::{Category, GeometryConfig, ScanIndex, TreeNode};
use wafermap_grid::{
    full_dataset, list_positions, measurement_grid, units_of, CanonicalGrid, EdgePolicy, GridConfig,
    GriddedDataset, MismatchPolicy,
};
use wafermap_ingest::{IngestConfig, NormalizeConfig, SpxDocument};
use wafermap_io::{collect_spx_files, compact_file, ingest_files, with_store, FailurePolicy};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] wafermap_io::Error),

    #[error("core error: {0}")]
    Core(#[from] wafermap_core::Error),

    #[error("ingest error: {0}")]
    Ingest(#[from] wafermap_ingest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Measurement category selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CategoryArg {
    /// Energy-dispersive X-ray spectroscopy
    Edx,
    /// Magneto-optic Kerr effect
    Moke,
    /// X-ray diffraction
    Xrd,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Edx => Category::Edx,
            CategoryArg::Moke => Category::Moke,
            CategoryArg::Xrd => Category::Xrd,
        }
    }
}

/// Edge cutoff comparator.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum EdgeArg {
    /// |x| + |y| >= cutoff is excluded
    Inclusive,
    /// |x| + |y| > cutoff is excluded
    Exclusive,
}

/// Scan index to wafer position mapping (mm).
#[derive(Debug, Args)]
struct GeometryArgs {
    /// Step between scans along x
    #[arg(long, default_value = "5.0")]
    step_x: f64,

    /// Step between scans along y
    #[arg(long, default_value = "5.0")]
    step_y: f64,

    /// Position of the first scan along x
    #[arg(long, default_value = "-40.0", allow_hyphen_values = true)]
    start_x: f64,

    /// Position of the first scan along y
    #[arg(long, default_value = "-40.0", allow_hyphen_values = true)]
    start_y: f64,
}

impl GeometryArgs {
    fn config(&self) -> GeometryConfig {
        GeometryConfig::new()
            .with_step(self.step_x, self.step_y)
            .with_start(self.start_x, self.start_y)
    }
}

/// High-throughput wafer characterization data tool.
#[derive(Parser)]
#[command(name = "wafermap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest EDX spectrum exports (.spx files or directories) into a store
    Ingest {
        /// HDF5 store, created if missing
        store: PathBuf,

        /// Input .spx files or directories holding them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        geometry: GeometryArgs,

        /// Continue with the next file when one fails
        #[arg(long)]
        skip_failed: bool,
    },

    /// List the positions recorded for a category
    Positions {
        /// HDF5 store
        store: PathBuf,

        /// Measurement category
        #[arg(short, long, value_enum, default_value = "edx")]
        category: CategoryArg,
    },

    /// Assemble a grid and print a JSON summary
    Grid {
        /// HDF5 store
        store: PathBuf,

        /// Measurement grid of one category
        #[arg(short, long, value_enum, conflicts_with = "full")]
        category: Option<CategoryArg>,

        /// Dataset-wide composition grid
        #[arg(long)]
        full: bool,

        /// Keep positions on the wafer edge
        #[arg(long)]
        keep_edges: bool,

        /// Edge cutoff comparator (defaults per grid kind)
        #[arg(long, value_enum)]
        edge_policy: Option<EdgeArg>,

        /// Manhattan distance of the wafer edge (mm)
        #[arg(long, default_value = "60.0")]
        edge_cutoff: f64,

        /// Fail on axis length mismatches instead of dropping the value
        #[arg(long)]
        strict_axes: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Re-grid a store onto the canonical coordinate set
    Compact {
        /// Source HDF5 store
        store: PathBuf,

        /// Output HDF5 file (overwritten)
        output: PathBuf,

        /// First coordinate on both axes (mm)
        #[arg(long, default_value = "-40.0", allow_hyphen_values = true)]
        start: f64,

        /// Last coordinate on both axes (mm)
        #[arg(long, default_value = "40.0", allow_hyphen_values = true)]
        stop: f64,

        /// Coordinate step (mm)
        #[arg(long, default_value = "5.0")]
        step: f64,
    },

    /// Show information about a spectrum export
    Info {
        /// Input .spx file
        input: PathBuf,

        #[command(flatten)]
        geometry: GeometryArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if let Err(err) = run(cli.command) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Ingest {
            store,
            inputs,
            geometry,
            skip_failed,
        } => {
            let files = expand_inputs(&inputs)?;
            if files.is_empty() {
                return Err(CliError::Usage("no .spx files found in inputs".to_string()));
            }
            let config = IngestConfig::new().with_geometry(geometry.config());
            let policy = if skip_failed {
                FailurePolicy::Skip
            } else {
                FailurePolicy::Stop
            };
            let report = ingest_files(&store, &files, &config, policy)?;

            for scan in &report.ingested {
                println!("{} -> {} at {}", scan.scan, scan.group, scan.position);
            }
            for (path, reason) in &report.failed {
                println!("FAILED {}: {}", path.display(), reason);
            }
            println!(
                "Ingested {} of {} files into {}",
                report.ingested.len(),
                files.len(),
                store.display()
            );
        }

        Commands::Positions { store, category } => {
            let category = Category::from(category);
            let (positions, units) = with_store(&store, |s| {
                let positions = list_positions(s, category)?;
                let units = units_of(s, category).ok();
                Ok((positions, units))
            })?;
            let output = json!({
                "category": category,
                "units": units.map(|u| json!({ "x": u.x, "y": u.y })),
                "positions": positions,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Grid {
            store,
            category,
            full,
            keep_edges,
            edge_policy,
            edge_cutoff,
            strict_axes,
            pretty,
        } => {
            let mut config = if full {
                GridConfig::composition()
            } else {
                GridConfig::measurement()
            };
            config = config
                .with_exclude_edges(!keep_edges)
                .with_edge_cutoff(edge_cutoff);
            if let Some(policy) = edge_policy {
                config = config.with_edge_policy(match policy {
                    EdgeArg::Inclusive => EdgePolicy::Inclusive,
                    EdgeArg::Exclusive => EdgePolicy::Exclusive,
                });
            }
            if strict_axes {
                config = config.with_mismatch_policy(MismatchPolicy::Error);
            }

            let dataset = match (full, category) {
                (true, _) => with_store(&store, |s| full_dataset(s, &config))?,
                (false, Some(category)) => {
                    with_store(&store, |s| measurement_grid(s, category.into(), &config))?
                }
                (false, None) => {
                    return Err(CliError::Usage(
                        "either --category or --full is required".to_string(),
                    ))
                }
            };

            let summary = grid_summary(&dataset);
            let json = if pretty {
                serde_json::to_string_pretty(&summary)?
            } else {
                serde_json::to_string(&summary)?
            };
            println!("{json}");
        }

        Commands::Compact {
            store,
            output,
            start,
            stop,
            step,
        } => {
            if step <= 0.0 || stop < start {
                return Err(CliError::Usage(format!(
                    "invalid canonical grid: start {start}, stop {stop}, step {step}"
                )));
            }
            let grid = CanonicalGrid::new(start, stop, step);
            let summary = compact_file(&store, &output, &grid)?;
            println!("Coordinates: {}", summary.coordinates);
            for (category, count) in &summary.measured {
                let filled = summary.filled.get(category).copied().unwrap_or(0);
                println!("{category}: {count} measured, {filled} filled with NaN");
            }
            println!("Wrote {}", output.display());
        }

        Commands::Info { input, geometry } => {
            println!("File: {}", input.display());
            match ScanIndex::from_path(&input) {
                Ok(scan) => {
                    println!("Scan: {scan}");
                    println!("Position: {}", geometry.config().position(scan));
                }
                Err(err) => println!("Scan: unknown ({err})"),
            }

            let document = SpxDocument::read(&input, &NormalizeConfig::default())?;
            println!("Channels: {}", document.channels.len());
            println!("Tree:");
            print_tree(&document.tree, 1);
        }
    }

    Ok(())
}

/// Expands directories into their sorted `.spx` files.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(collect_spx_files(input)?);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            return Err(CliError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", input.display()),
            )));
        }
    }
    log::debug!("{} input files", files.len());
    Ok(files)
}

fn print_tree(tree: &wafermap_core::NormalizedTree, depth: usize) {
    for (key, node) in tree.iter() {
        match node {
            TreeNode::Leaf(Some(text)) => println!("{:indent$}{key} = {text}", "", indent = depth * 2),
            TreeNode::Leaf(None) => println!("{:indent$}{key}", "", indent = depth * 2),
            TreeNode::Branch(child) => {
                println!("{:indent$}{key}/", "", indent = depth * 2);
                print_tree(child, depth + 1);
            }
        }
    }
}

fn grid_summary(dataset: &GriddedDataset) -> Value {
    let fields: serde_json::Map<String, Value> = dataset
        .fields()
        .map(|(name, field)| {
            let extra = field.extra_axis.as_ref().map(|axis| {
                json!({
                    "name": axis.name,
                    "len": axis.len(),
                    "first": axis.values.first(),
                    "last": axis.values.last(),
                })
            });
            let summary = json!({
                "shape": field.data.shape(),
                "units": field.units,
                "present": field.count_present(),
                "extra_axis": extra,
            });
            (name.to_string(), summary)
        })
        .collect();

    json!({
        "x": { "values": dataset.x.values, "units": dataset.x.units },
        "y": { "values": dataset.y.values, "units": dataset.y.units },
        "dropped": dataset.dropped(),
        "fields": fields,
    })
}
