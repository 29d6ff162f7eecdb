//! curaslice CLI - slice 3D models to G-code with CuraEngine
//!
//! Runs jobs through the same dispatcher and worker a service would use,
//! with the external CuraEngine executable as the engine.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use curaslice_engine::{synthesize, GcodeMetadata, Override, ProcessEngineFactory, SliceConfig};
use curaslice_mesh::{decode_stl, DecoderRegistry};
use curaslice_queue::{spawn, JobEvent, Slicer, WorkerConfig};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod settings;

#[derive(Parser)]
#[command(name = "curaslice")]
#[command(about = "Slice 3D models to G-code with CuraEngine", long_about = None)]
struct Cli {
    /// Enable verbose logging and engine output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Slice a model file
    Slice {
        /// Input model (.stl, or any format a registered decoder handles)
        input: PathBuf,
        /// Output G-code file (default: input with .gcode extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// CuraEngine executable
        #[arg(long)]
        engine: Option<PathBuf>,
        /// Kill the engine after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Printer definition file (.def.json)
        #[arg(long)]
        printer: Option<PathBuf>,
        /// Extruder definition file, once per extruder in index order
        #[arg(long)]
        extruder: Vec<PathBuf>,
        #[command(flatten)]
        settings: SettingArgs,
    },
    /// Print the engine arguments a configuration produces
    Args {
        #[command(flatten)]
        settings: SettingArgs,
    },
    /// Display information about a binary STL file
    Inspect {
        /// Path to the STL file
        file: PathBuf,
    },
}

#[derive(Args)]
struct SettingArgs {
    /// Printer setting override
    #[arg(
        short = 's',
        long = "set",
        value_name = "KEY=VALUE",
        value_parser = settings::parse_printer_setting
    )]
    set: Vec<Override>,
    /// Extruder setting override
    #[arg(
        short = 'x',
        long = "extruder-set",
        value_name = "N:KEY=VALUE",
        value_parser = settings::parse_extruder_setting
    )]
    extruder_set: Vec<Override>,
    /// Raw engine command, used verbatim instead of the generated one
    #[arg(long, conflicts_with_all = ["set", "extruder_set"])]
    command: Option<String>,
}

impl SettingArgs {
    fn overrides(&self) -> Vec<Override> {
        self.set.iter().chain(&self.extruder_set).cloned().collect()
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact();
    match EnvFilter::try_from_default_env() {
        Ok(filter) => builder.with_env_filter(filter).init(),
        Err(_) => builder.with_max_level(level).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Slice {
            input,
            output,
            config,
            engine,
            timeout,
            printer,
            extruder,
            settings: setting_args,
        } => {
            let mut worker_config = match config {
                Some(path) => WorkerConfig::load(&path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => WorkerConfig::default(),
            };
            if let Some(engine) = engine {
                worker_config.engine.binary = engine;
            }
            if timeout.is_some() {
                worker_config.engine.timeout_secs = timeout;
            }

            let definition = settings::load_definition(printer.as_deref(), &extruder)?;
            let mut builder = SliceConfig::builder()
                .definition(definition)
                .overrides(setting_args.overrides())
                .verbose(cli.verbose);
            if let Some(command) = setting_args.command {
                builder = builder.command(command);
            }
            let config = builder.build()?;

            let output = output.unwrap_or_else(|| input.with_extension("gcode"));
            slice_file(&input, &output, config, &worker_config).await?;
        }
        Commands::Args {
            settings: setting_args,
        } => {
            let args = synthesize(
                setting_args.command.as_deref(),
                &setting_args.overrides(),
                cli.verbose,
            )?;
            println!("{}", args.join(" "));
        }
        Commands::Inspect { file } => {
            inspect_stl(&file)?;
        }
    }

    Ok(())
}

async fn slice_file(
    input: &Path,
    output: &Path,
    config: SliceConfig,
    worker_config: &WorkerConfig,
) -> Result<()> {
    let mut file =
        std::fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .with_context(|| format!("{} has no file extension", input.display()))?
        .to_string();

    let factory = ProcessEngineFactory::new(worker_config.engine.clone());
    let builtins = worker_config.builtins()?;
    let (dispatcher, worker) = spawn(
        factory,
        builtins,
        Arc::new(DecoderRegistry::new()),
        worker_config,
    )
    .context("failed to start worker")?;

    let mut slicer = Slicer::new(dispatcher, config);
    let mut handle = slicer.submit(&mut file, &extension).await?;
    info!(job = %handle.id(), input = %input.display(), "slicing");

    let mut stderr = std::io::stderr();
    while let Some(event) = handle.next_event().await {
        match event {
            JobEvent::Progress(p) => {
                let _ = write!(stderr, "\r{:>5.1}%", p.progress * 100.0);
                let _ = stderr.flush();
            }
            JobEvent::Warning { message, .. } => warn!("{}", message),
        }
    }
    let _ = writeln!(stderr);

    let result = handle.wait().await;
    slicer.destroy().await?;
    drop(slicer);
    worker
        .join()
        .map_err(|_| anyhow!("worker thread panicked"))?;

    let out = result?
        .into_slice()
        .context("worker returned no G-code")?;
    std::fs::write(output, &out.gcode)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {} ({} bytes)", output.display(), out.gcode.len());
    print_metadata(&out.metadata);
    Ok(())
}

fn print_metadata(meta: &GcodeMetadata) {
    if let Some(generator) = &meta.generator {
        println!("  Generator:   {}", generator);
    }
    if let Some(flavor) = &meta.flavor {
        println!("  Flavor:      {}", flavor);
    }
    if let Some(seconds) = meta.print_time_seconds {
        let total = seconds.round() as u64;
        println!(
            "  Print time:  {}h {:02}m {:02}s",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        );
    }
    if !meta.filament_used_m.is_empty() {
        let used: Vec<String> = meta
            .filament_used_m
            .iter()
            .map(|m| format!("{:.2}m", m))
            .collect();
        println!("  Filament:    {}", used.join(", "));
    }
    if let Some(layers) = meta.layer_count {
        println!("  Layers:      {}", layers);
    }
    if let (Some(min), Some(max)) = (meta.bounds_min, meta.bounds_max) {
        println!(
            "  Bounds:      [{:.2}, {:.2}, {:.2}] - [{:.2}, {:.2}, {:.2}]",
            min[0], min[1], min[2], max[0], max[1], max[2]
        );
    }
}

fn inspect_stl(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mesh = decode_stl(&bytes)?;

    println!("File: {}", path.display());
    println!("  Triangles:   {}", mesh.face_count());
    println!("  Size:        {} bytes", bytes.len());
    match mesh.bounds() {
        Some((min, max)) => println!(
            "  Bounds:      [{:.3}, {:.3}, {:.3}] - [{:.3}, {:.3}, {:.3}]",
            min[0], min[1], min[2], max[0], max[1], max[2]
        ),
        None => println!("  Bounds:      (empty)"),
    }
    Ok(())
}
