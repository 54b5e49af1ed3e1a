use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use camera_store::{CameraConfig, NewNvr};
use camera_supervisor::{StopOutcome, Supervisor};
use clap::{Parser, Subcommand, ValueEnum};
use config_manager::ProxyConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// ONVIF Proxy - one virtual ONVIF camera per NVR channel
///
/// - Scans an NVR's media profiles into camera records
/// - Gives every camera its own virtual interface, ports and discovery identity
/// - Forwards RTSP and snapshot traffic to the NVR untouched
#[derive(Parser)]
#[command(name = "onvif-proxy")]
#[command(about = "Expose NVR channels as individual ONVIF cameras")]
#[command(version)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/onvif-proxy/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start cameras and serve until Ctrl-C
    Run {
        /// Cameras to start (default: every camera marked running)
        #[arg(long = "camera")]
        cameras: Vec<i64>,
    },
    /// Probe the local networks for ONVIF devices
    Discover,
    /// Manage NVRs
    #[command(subcommand)]
    Nvr(NvrCommand),
    /// Manage the virtual interface pool
    #[command(subcommand)]
    Interface(InterfaceCommand),
    /// Create cameras from an NVR's media profiles
    Scan { nvr_id: i64 },
    /// Manage virtual cameras
    #[command(subcommand)]
    Camera(CameraCommand),
    /// Save a snapshot of a camera
    Snapshot { camera_id: i64, output: PathBuf },
}

#[derive(Subcommand)]
enum NvrCommand {
    Add {
        #[arg(long)]
        host: String,
        #[arg(long, default_value_t = 80)]
        port: u16,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        pass: Option<String>,
    },
    List,
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum InterfaceCommand {
    /// Register a provisioned virtual interface
    Add {
        #[arg(long)]
        mac: String,
        #[arg(long)]
        name: String,
    },
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum CameraCommand {
    List,
    Rename { id: i64, name: String },
    Discovery { id: i64, state: Toggle },
    Delete { id: i64 },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = ProxyConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let supervisor = Supervisor::from_config(&config).context("Failed to open camera database")?;

    match cli.command {
        Command::Run { cameras } => run(&supervisor, &cameras).await,
        Command::Discover => discover(&supervisor).await,
        Command::Nvr(cmd) => nvr(&supervisor, cmd),
        Command::Interface(cmd) => interface(&supervisor, cmd),
        Command::Scan { nvr_id } => scan(&supervisor, nvr_id).await,
        Command::Camera(cmd) => camera(&supervisor, cmd).await,
        Command::Snapshot { camera_id, output } => snapshot(&supervisor, camera_id, &output).await,
    }
}

async fn run(supervisor: &Supervisor, cameras: &[i64]) -> Result<()> {
    let results = if cameras.is_empty() {
        supervisor.start_all_marked().await?
    } else {
        let mut results = Vec::with_capacity(cameras.len());
        for &id in cameras {
            results.push((id, supervisor.start(id).await));
        }
        results
    };

    for (id, result) in &results {
        match result {
            Ok(report) if report.is_degraded() => {
                println!("Camera {} running (degraded: {:?})", id, report.degraded)
            }
            Ok(_) => println!("Camera {} running", id),
            Err(e) => println!("Camera {} failed: {}", id, e),
        }
    }
    if supervisor.running_ids().await.is_empty() {
        bail!("No camera is running");
    }

    println!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    supervisor.stop_all().await;
    Ok(())
}

async fn discover(supervisor: &Supervisor) -> Result<()> {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let devices = supervisor.discover_network(&cancel).await?;
    if devices.is_empty() {
        println!("No ONVIF devices found");
    }
    for d in devices {
        println!(
            "{}  {}  {}",
            d.source.ip(),
            d.uuid,
            d.xaddrs.join(" ")
        );
        if let Some(scopes) = d.scopes {
            println!("    {}", scopes);
        }
    }
    Ok(())
}

fn nvr(supervisor: &Supervisor, cmd: NvrCommand) -> Result<()> {
    match cmd {
        NvrCommand::Add {
            host,
            port,
            user,
            pass,
        } => {
            let nvr = supervisor.with_store(|s| {
                s.add_nvr(&NewNvr {
                    hostname: host,
                    port,
                    username: user,
                    password: pass,
                })
            })?;
            println!("Added NVR {} ({}:{})", nvr.id, nvr.hostname, nvr.port);
        }
        NvrCommand::List => {
            for n in supervisor.with_store(|s| s.list_nvrs())? {
                println!(
                    "{:>4}  {}:{}  {}",
                    n.id,
                    n.hostname,
                    n.port,
                    n.username.as_deref().unwrap_or("-")
                );
            }
        }
        NvrCommand::Remove { id } => {
            if !supervisor.with_store(|s| s.delete_nvr(id))? {
                bail!("NVR {} not found", id);
            }
            println!("Removed NVR {}", id);
        }
    }
    Ok(())
}

fn interface(supervisor: &Supervisor, cmd: InterfaceCommand) -> Result<()> {
    match cmd {
        InterfaceCommand::Add { mac, name } => {
            let iface = supervisor.with_store(|s| s.add_interface(&mac, &name))?;
            println!("Added interface {} ({} {})", iface.id, iface.mac_address, iface.interface_name);
        }
        InterfaceCommand::List => {
            for i in supervisor.with_store(|s| s.list_interfaces())? {
                let camera = i
                    .assigned_camera_id
                    .map(|c| format!("camera {}", c))
                    .unwrap_or_default();
                println!(
                    "{:>4}  {}  {:<12} {:<10} {}",
                    i.id,
                    i.mac_address,
                    i.interface_name,
                    i.status.as_str(),
                    camera
                );
            }
        }
    }
    Ok(())
}

fn print_camera(c: &CameraConfig) {
    let snapshot = c
        .snapshot_proxy_port
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".into());
    println!(
        "{:>4}  {:<24} {:<8} ports {}/{}/{}  discovery {}  {}",
        c.id,
        c.custom_name,
        c.status.as_str(),
        c.server_port,
        c.rtsp_proxy_port,
        snapshot,
        if c.discovery_enabled { "on" } else { "off" },
        c.mac_address.as_deref().unwrap_or("-")
    );
}

async fn scan(supervisor: &Supervisor, nvr_id: i64) -> Result<()> {
    let created = supervisor
        .scan(nvr_id)
        .await
        .with_context(|| format!("Scan of NVR {} failed", nvr_id))?;
    if created.is_empty() {
        println!("No cameras found");
    }
    for c in &created {
        print_camera(c);
    }
    Ok(())
}

async fn camera(supervisor: &Supervisor, cmd: CameraCommand) -> Result<()> {
    match cmd {
        CameraCommand::List => {
            for c in supervisor.with_store(|s| s.list_cameras())? {
                print_camera(&c);
            }
        }
        CameraCommand::Rename { id, name } => {
            supervisor.with_store(|s| s.rename_camera(id, &name))?;
            println!("Camera {} renamed to '{}'", id, name);
        }
        CameraCommand::Discovery { id, state } => {
            let enabled = matches!(state, Toggle::On);
            supervisor.set_discovery(id, enabled).await?;
            println!("Camera {} discovery {}", id, if enabled { "on" } else { "off" });
        }
        CameraCommand::Delete { id } => {
            // Only cameras started by this process can be stopped here
            if supervisor.stop(id).await? == StopOutcome::Stopped {
                println!("Stopped camera {}", id);
            }
            supervisor.delete(id).await?;
            println!("Deleted camera {}", id);
        }
    }
    Ok(())
}

async fn snapshot(supervisor: &Supervisor, camera_id: i64, output: &std::path::Path) -> Result<()> {
    let snap = supervisor.get_snapshot(camera_id).await?;
    std::fs::write(output, &snap.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    if snap.placeholder {
        println!("NVR snapshot unavailable, wrote placeholder to {}", output.display());
    } else {
        println!("Wrote {} bytes to {}", snap.bytes.len(), output.display());
    }
    Ok(())
}
