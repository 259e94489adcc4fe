//! Scene Exporter CLI
//!
//! Export a JSON scene description to glTF or a JSON scene document.

use clap::{Parser, Subcommand, ValueEnum};
use scene_exporter::{
    available_versions, export_scene, AnimationClip, AxisTarget, CancelToken, ExportOptions,
    ExportStatus, FileEncoding, MemoryScene, SourceGraph, TimeRange, UnitTarget,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scene-exporter")]
#[command(author, version, about = "Export animated 3D scene graphs", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a scene file
    Export {
        /// Input JSON scene description
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Node to export from (overrides the options file)
        #[arg(long)]
        start_node: Option<String>,

        /// First frame to export
        #[arg(long, default_value = "1")]
        start: i64,

        /// Last frame to export (defaults to --start, a static export)
        #[arg(long)]
        end: Option<i64>,

        /// Animation clip as name:start:end (repeatable)
        #[arg(long, value_parser = parse_clip)]
        clip: Vec<AnimationClip>,

        /// Bundle patterns to export instead of a start node (e.g. "@hero*")
        #[arg(long)]
        bundles: Option<String>,

        /// Write a text document instead of binary
        #[arg(long)]
        ascii: bool,

        /// Format version, e.g. "glTF | 2.0"
        #[arg(long = "format-version")]
        format_version: Option<String>,

        /// Convert to this axis system
        #[arg(long, value_enum)]
        axis: Option<AxisArg>,

        /// Convert to this unit
        #[arg(long, value_enum)]
        unit: Option<UnitArg>,

        /// Embed textures in the output
        #[arg(long)]
        embed_media: bool,

        /// Bake deforming geometry to vertex caches
        #[arg(long)]
        vertex_caches: bool,

        /// JSON options file applied before the flags above
        #[arg(long)]
        options: Option<PathBuf>,

        /// Print phase timings
        #[arg(long)]
        timings: bool,
    },

    /// List the available format versions
    Versions,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum AxisArg {
    YUpRh,
    YUpLh,
    ZUpRh,
}

impl From<AxisArg> for AxisTarget {
    fn from(arg: AxisArg) -> Self {
        match arg {
            AxisArg::YUpRh => AxisTarget::YUpRightHanded,
            AxisArg::YUpLh => AxisTarget::YUpLeftHanded,
            AxisArg::ZUpRh => AxisTarget::ZUpRightHanded,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum UnitArg {
    Mm,
    Cm,
    Dm,
    M,
    Km,
    In,
    Yd,
    Mi,
}

impl From<UnitArg> for UnitTarget {
    fn from(arg: UnitArg) -> Self {
        match arg {
            UnitArg::Mm => UnitTarget::Mm,
            UnitArg::Cm => UnitTarget::Cm,
            UnitArg::Dm => UnitTarget::Dm,
            UnitArg::M => UnitTarget::M,
            UnitArg::Km => UnitTarget::Km,
            UnitArg::In => UnitTarget::In,
            UnitArg::Yd => UnitTarget::Yd,
            UnitArg::Mi => UnitTarget::Mi,
        }
    }
}

fn parse_clip(s: &str) -> Result<AnimationClip, String> {
    AnimationClip::parse(s)
        .ok_or_else(|| format!("Invalid clip format: '{}'. Use name:start:end", s))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "debug"
    } else {
        "warn,scene_exporter=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {
        Commands::Export {
            input,
            output,
            start_node,
            start,
            end,
            clip,
            bundles,
            ascii,
            format_version,
            axis,
            unit,
            embed_media,
            vertex_caches,
            options,
            timings,
        } => {
            let scene = MemoryScene::load(&input)?;
            println!("Loaded {} nodes from {}", scene.node_count(), input.display());

            let mut opts = match options {
                Some(path) => ExportOptions::load(path)?,
                None => ExportOptions::default(),
            };
            if let Some(path) = start_node {
                opts = opts.with_start_node(path);
            }
            if let Some(patterns) = bundles {
                opts = opts.with_bundles(patterns);
            }
            if ascii {
                opts = opts.with_encoding(FileEncoding::Ascii);
            }
            if let Some(version) = format_version {
                opts = opts.with_version(version);
            }
            if let Some(axis) = axis {
                opts = opts.with_axis_conversion(axis.into());
            }
            if let Some(unit) = unit {
                opts = opts.with_unit_conversion(unit.into());
            }
            for c in clip {
                opts = opts.with_clip(c);
            }
            if embed_media {
                opts = opts.with_embedded_media(true);
            }
            if vertex_caches {
                opts = opts.with_vertex_caches(true);
            }
            if timings {
                opts = opts.with_timings(true);
            }

            let end = end.unwrap_or(start);
            let range = TimeRange::new(scene.time_from_frame(start), scene.time_from_frame(end));

            let report = export_scene(&scene, &output, range, opts, &CancelToken::new())?;
            for warning in &report.warnings {
                eprintln!("Warning: {}", warning);
            }

            match report.status {
                ExportStatus::Written => {
                    println!("Exported to {}", report.output_path.display());
                    println!("  Nodes: {}", report.node_count);
                    println!("  Meshes: {}", report.mesh_count);
                    println!("  Materials: {}", report.material_count);
                    println!("  Animation stacks: {}", report.stack_count);
                    println!("  Curves: {}", report.curve_count);
                    if report.vertex_cache_count > 0 {
                        println!("  Vertex caches: {}", report.vertex_cache_count);
                    }
                }
                ExportStatus::Cancelled => println!("Export cancelled"),
                ExportStatus::Failed => {
                    for error in &report.errors {
                        eprintln!("Error: {}", error);
                    }
                }
            }
            if let Some(timings) = &report.timings {
                println!("{}", timings);
            }

            Ok(ExitCode::from(report.status.exit_code() as u8))
        }
        Commands::Versions => {
            for version in available_versions() {
                println!("{}", version);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
