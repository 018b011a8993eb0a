use anyhow::Result;
use clap::Parser;
use coopguard::{
    install_signal_handlers, CoopguardConfig, EventBus, KeyboardInputHandler, Monitor,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "coopguard")]
#[command(about = "Unattended coop monitor that raises buzzer and SMS alerts on suspected theft")]
#[command(version)]
#[command(long_about = "Watches a camera feed together with an external object tracker, flags \
people moving fast near hens, and alerts through a GPIO buzzer and a GSM modem. Keeps running \
through camera dropouts and reports prolonged outages.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "coopguard.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the monitor")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - acquire hardware, then release it and exit
    #[arg(long, help = "Initialize all components, then shut down without monitoring")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for rotated log files")]
    log_dir: Option<String>,

    /// Accept operator keys on the controlling terminal
    #[arg(long, help = "Enable keyboard controls: 's' stops the alarm, 'q' quits")]
    keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting Coopguard v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match CoopguardConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let event_bus = EventBus::default();
    let monitor = Monitor::from_config(&config, event_bus.clone())
        .await
        .map_err(|e| {
            error!("Failed to initialize monitor: {}", e);
            e
        })?;

    if args.dry_run {
        info!("Dry run mode - components initialized, shutting down");
        monitor.shutdown().await;
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    let token = CancellationToken::new();
    install_signal_handlers(token.clone(), event_bus.clone());

    let mut keyboard = if args.keyboard {
        let mut handler =
            KeyboardInputHandler::new(monitor.dispatcher(), event_bus.clone(), token.clone());
        handler.start()?;
        Some(handler)
    } else {
        None
    };

    let result = monitor.run(token).await;

    if let Some(handler) = keyboard.as_mut() {
        handler.stop().await;
    }

    result.map_err(|e| {
        error!("Monitor error during execution: {}", e);
        e
    })?;

    info!("Coopguard exited cleanly");
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
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
        .unwrap_or_else(|_| EnvFilter::new(format!("coopguard={}", log_level)));

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

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "coopguard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Coopguard Configuration File");
    println!("# This is the default configuration with all available options.");
    println!("# modem.phone must be set before the monitor will start.");
    println!();
    print!("{}", toml::to_string_pretty(&CoopguardConfig::default())?);
    Ok(())
}
