use anyhow::Result;
use clap::Parser;
use scanbench::{
    BackendKind, CameraPlatform, DecodeScript, EngineSuite, EventBusError, EventFilter,
    RunOutcome, ScanbenchConfig, ScannerHarness, ScriptStep, SimulatedCamera,
    SimulatedCameraOptions, ZoomRange,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "scanbench")]
#[command(about = "Camera barcode scanning harness comparing EAN detection backends")]
#[command(version)]
#[command(long_about = "Runs scripted scan sessions against interchangeable EAN-13/EAN-8 \
decoding backends on a simulated camera. Each session acquires the camera, raises zoom while \
the backend keeps missing, records the first decode in the scan history and releases the camera.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "scanbench.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without scanning")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Backend to mount
    #[arg(short, long, value_enum, default_value_t = BackendKind::Native)]
    backend: BackendKind,

    /// Run every backend in tab order
    #[arg(long, conflicts_with = "backend")]
    all: bool,

    /// Barcode value the scripted engine decodes
    #[arg(long, default_value = "4006381333931")]
    code: String,

    /// Misses reported before each decode
    #[arg(long, default_value_t = 0)]
    misses: usize,

    /// Interval between scripted engine reports in milliseconds
    #[arg(long, default_value_t = 50)]
    cadence_ms: u64,

    /// Scans per backend; rounds after the first use "Scan again"
    #[arg(long, default_value_t = 1)]
    rounds: u32,

    /// Simulate a denied camera permission
    #[arg(long)]
    deny_camera: bool,

    /// Simulate a camera without zoom control
    #[arg(long, conflicts_with = "max_zoom")]
    no_zoom: bool,

    /// Maximum zoom reported by the simulated camera
    #[arg(long, default_value_t = 3.0)]
    max_zoom: f64,

    /// Print the scan history as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Print zoom changes and failures as they happen
    #[arg(long)]
    events: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting scanbench v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ScanbenchConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match config.validate() {
        Ok(()) if args.validate_config => {
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    let camera = Arc::new(simulated_camera(&args));
    let script = DecodeScript::new(Duration::from_millis(args.cadence_ms));
    let harness = ScannerHarness::new(
        config,
        EngineSuite::scripted(script.clone()),
        Arc::clone(&camera) as Arc<dyn CameraPlatform>,
    )?;

    let event_printer = args.events.then(|| {
        let mut receiver = harness.subscribe_events(
            EventFilter::EventTypes(vec!["zoom_changed", "failed"]),
            "cli",
        );
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => println!("  > {}", event.description()),
                    Err(EventBusError::Lagged { .. }) => continue,
                    Err(EventBusError::ChannelClosed) => break,
                }
            }
        })
    });

    let backends: Vec<BackendKind> = if args.all {
        BackendKind::ALL.to_vec()
    } else {
        vec![args.backend]
    };

    'backends: for backend in backends {
        for round in 0..args.rounds {
            if round == 0 {
                harness.select(backend).await?;
            } else {
                harness.scan_again().await?;
            }
            queue_round(&script, &args);

            match harness.run_until_settled().await {
                RunOutcome::Settled(session) => {
                    let outcome = match (&session.result, &session.error_message) {
                        (Some(value), _) => format!("detected {}", value),
                        (None, Some(message)) => format!("failed: {}", message),
                        (None, None) => format!("{:?}", session.state),
                    };
                    println!(
                        "{:<14} round {}: {} (zoom {:.1}x of {:.1}x)",
                        backend.label(),
                        round + 1,
                        outcome,
                        session.zoom_level,
                        session.max_zoom
                    );
                }
                RunOutcome::Interrupted(reason) => {
                    info!("Run interrupted: {:?}", reason);
                    break 'backends;
                }
                RunOutcome::Closed => break,
            }
        }
    }

    if let Some(printer) = event_printer {
        printer.abort();
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&harness.history().entries())?);
    } else {
        println!();
        println!("Scan history ({} entries):", harness.history().len());
        for entry in harness.history().entries() {
            println!(
                "  {}  {:<14} {}",
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.scanner,
                entry.value
            );
        }
    }

    let exit_code = harness.shutdown().await?;
    info!("scanbench exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn simulated_camera(args: &Args) -> SimulatedCamera {
    if args.deny_camera {
        return SimulatedCamera::denying_permission();
    }
    if args.no_zoom {
        return SimulatedCamera::without_zoom();
    }
    SimulatedCamera::new(SimulatedCameraOptions {
        zoom: Some(ZoomRange {
            min: 1.0,
            max: args.max_zoom,
            step: 0.1,
        }),
        ..SimulatedCameraOptions::default()
    })
}

/// Steps are queued once the session is running so a stopping engine
/// cannot consume them.
fn queue_round(script: &DecodeScript, args: &Args) {
    script.push_misses(args.misses);
    script.push(ScriptStep::Decode(args.code.clone()));
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scanbench={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Scanbench Configuration File");
    println!("# Every option may also be set as SCANBENCH_<SECTION>__<KEY>");
    println!();
    println!("{}", toml::to_string_pretty(&ScanbenchConfig::default())?);
    Ok(())
}
