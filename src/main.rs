//! Pi-Kinect streamer: probe a capture device and relay its frames over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pi_kinect::capture::{BackendSelection, DeviceProbe};
use pi_kinect::pipeline::{CaptureLoop, FrameBuffer, StreamStatistics, SHUTDOWN_TIMEOUT};
use pi_kinect::server::{self, AppState};
use pi_kinect::{utils, Config};

#[derive(Parser, Debug)]
#[command(name = "pi-kinect")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe for a device and serve its frames over HTTP (default)
    Stream(StreamArgs),
    /// Report which capture backends work on this machine, then exit
    Probe,
}

#[derive(Args, Debug, Default)]
struct StreamArgs {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    port: Option<u16>,

    /// Preferred /dev/videoN index for the generic camera backend
    #[arg(long, value_name = "INDEX")]
    camera: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    init_tracing(&config, cli.debug);

    match cli.command.unwrap_or(Command::Stream(StreamArgs::default())) {
        Command::Stream(args) => {
            apply_overrides(&mut config, args);
            config.validate()?;
            run_stream(config).await
        }
        Command::Probe => run_probe(config).await,
    }
}

fn init_tracing(config: &Config, debug: bool) {
    let default_level = if debug { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
}

fn apply_overrides(config: &mut Config, args: StreamArgs) {
    if let Some(host) = args.host {
        config.network.host = host;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(index) = args.camera {
        config.camera.index = index;
    }
}

async fn run_stream(config: Config) -> Result<()> {
    info!("Pi-Kinect Launching...");

    let probe_config = config.clone();
    let (selection, capabilities) = tokio::task::spawn_blocking(move || {
        let mut probe = DeviceProbe::new(&probe_config);
        let selection = probe.probe(&probe_config);
        (selection, probe.capabilities().clone())
    })
    .await?;

    let buffer = Arc::new(FrameBuffer::new());
    let stats = Arc::new(StreamStatistics::new());
    let state = Arc::new(AppState {
        buffer: buffer.clone(),
        stats: stats.clone(),
        config: config.clone(),
        capabilities,
        backend: selection.kind(),
        backend_detail: selection.diagnostic().to_string(),
    });

    let capture = CaptureLoop::new(selection, buffer, stats, &config).spawn()?;

    let served = match server::bind(&config.bind_address()).await {
        Ok(listener) => server::serve(listener, state, shutdown_signal()).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &served {
        error!("HTTP server failed: {}", e);
    }

    info!("Stopping capture...");
    match tokio::task::spawn_blocking(move || capture.shutdown(SHUTDOWN_TIMEOUT)).await? {
        Ok(()) => info!("Capture stopped"),
        Err(e) => warn!("{}", e),
    }

    served?;
    info!("Pi-Kinect shutting down");
    Ok(())
}

async fn run_probe(config: Config) -> Result<()> {
    let report = tokio::task::spawn_blocking(move || {
        let mut probe = DeviceProbe::new(&config);
        let mut selection = probe.probe(&config);
        let attempts = probe.attempts().to_vec();
        let capabilities = probe.capabilities().clone();
        let selected = (selection.kind(), selection.diagnostic().to_string());
        if let BackendSelection::Active { backend, .. } = &mut selection {
            if let Err(e) = backend.close() {
                warn!("Failed to release {} backend: {}", backend.kind(), e);
            }
        }
        let devices: Vec<_> = utils::list_video_devices()
            .iter()
            .map(|path| (path.clone(), utils::describe_video_device(path)))
            .collect();
        (selected, attempts, capabilities, devices)
    })
    .await?;
    let ((selected, diagnostic), attempts, capabilities, devices) = report;

    println!(
        "native binding:  {}",
        if capabilities.native_binding_available { "compiled in" } else { "not compiled in" }
    );
    println!(
        "system library:  {}",
        capabilities
            .system_library_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not found".into())
    );

    println!("\nbackends:");
    for attempt in &attempts {
        match &attempt.outcome {
            Ok(detail) => println!("  [ok]   {:<16} {}", attempt.backend, detail),
            Err(reason) => println!("  [fail] {:<16} {}", attempt.backend, reason),
        }
    }
    match selected {
        Some(kind) => println!("\nselected: {} ({})", kind, diagnostic),
        None => println!("\nselected: none ({})", diagnostic),
    }

    println!("\nvideo devices:");
    if devices.is_empty() {
        println!("  (none)");
    }
    for (path, info) in devices {
        match info {
            Some(info) => println!(
                "  {} - {} [{}]{}",
                path.display(),
                info.card,
                info.formats.join(", "),
                if info.capture { "" } else { " (no capture)" }
            ),
            None => println!("  {} - unavailable", path.display()),
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
