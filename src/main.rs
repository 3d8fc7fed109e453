use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use devcam::{
    CaptureDesign, CaptureEngine, DevcamConfig, MockBackend, MockScript, SessionController,
    Surface,
};

#[derive(Parser, Debug)]
#[command(name = "devcam")]
#[command(about = "Manual camera control engine for capturing declarative exposure sequences")]
#[command(version)]
#[command(long_about = "Executes capture designs: ordered sequences of exposures whose \
parameters are literal values or scale factors against the scene's auto-exposure/auto-focus \
result. Runs headless against the built-in synthetic camera backend; hardware backends plug \
in through the CameraBackend trait.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "devcam.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without capturing")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Capture a design by name from the configured design directory
    #[arg(long, value_name = "NAME", help = "Capture the named design file")]
    design: Option<String>,

    /// Capture a fully-automatic burst of N frames instead of a design file
    #[arg(long, value_name = "N", help = "Capture an N-frame fully-automatic burst")]
    burst: Option<usize>,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", DevcamConfig::default_toml());
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting devcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match DevcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    // Bring the synthetic camera up to a ready session.
    let backend = MockBackend::new(MockScript::default());
    let controller = Arc::new(SessionController::new(
        Arc::new(backend),
        config.device.camera_id.clone(),
        Duration::from_millis(config.device.open_timeout_ms),
    ));
    controller
        .register_preview_surfaces(vec![Surface::preview(0)])
        .await?;
    controller
        .register_output_surfaces(vec![Surface::output(1)])
        .await?;
    controller.start().await?;

    let engine = CaptureEngine::new(controller.clone(), config.capture.clone());

    let summary = match (&args.design, args.burst) {
        (Some(name), _) => {
            devcam::capture_design_by_name(&engine, &config.capture, name).await?
        }
        (None, Some(n)) => {
            let design = CaptureDesign::burst(n);
            info!("Capturing {}-frame automatic burst '{}'", n, design.name());
            engine.capture(&design).await?
        }
        (None, None) => {
            eprintln!("Nothing to capture; pass --design <name> or --burst <n>");
            controller.stop().await?;
            return Ok(());
        }
    };

    println!(
        "Captured {} of {} frames ({} failed):",
        summary.saved.len(),
        summary.expected,
        summary.failed
    );
    for frame in &summary.saved {
        println!("  {}", frame.filename);
    }

    engine.close().await;
    controller.stop().await?;
    Ok(())
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
        .unwrap_or_else(|_| EnvFilter::new(format!("devcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}
