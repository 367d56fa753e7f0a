use clap::{Parser, Subcommand};
use ipfwd::capture::{AfPacketSocket, AfPacketTransport};
use ipfwd::config;
use ipfwd::dataplane::Router;
use ipfwd::protocol::ethernet::MAX_FRAME_SIZE;
use ipfwd::telemetry::init_logging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ipfwd")]
#[command(about = "A software IPv4 router with ARP resolution and ICMP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the router
    Run {
        /// Path to router.toml
        #[arg(short, long, default_value = "router.toml")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the configuration and routing table without starting
    Validate {
        /// Path to router.toml
        #[arg(short, long, default_value = "router.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Config {
            action: ConfigAction::Validate { config },
        }) => cmd_config_validate(&config),
        Some(Commands::Run { config }) => cmd_run(&config),
        None => cmd_run(Path::new("router.toml")),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config_path: &Path) -> Result<(), String> {
    use tokio::runtime::Runtime;

    let cfg = config::load(config_path)
        .map_err(|e| format!("Failed to load {}: {}", config_path.display(), e))?;

    // RUST_LOG still wins over the [logging] section
    init_logging(cfg.logging.as_ref());
    info!("Loaded {}", config_path.display());

    let validation = config::validate(&cfg);
    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }
    if validation.has_errors() {
        validation.print_diagnostics();
        return Err("Validation failed".to_string());
    }

    let interfaces = config::build_interfaces(&cfg, config::sysfs_mac)
        .map_err(|e| format!("Failed to configure interfaces: {}", e))?;
    let routes = config::build_routes(&cfg, config_path.parent())
        .map_err(|e| format!("Failed to load routes: {}", e))?;

    for iface in &interfaces {
        info!("  {} configured: MAC={}, IP={}", iface.name, iface.mac, iface.ip);
    }
    for route in &routes {
        info!(
            "  route {}/{} via {} dev {}",
            route.destination, route.mask, route.gateway, route.interface
        );
    }

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        // Sockets register with the reactor, so bind inside the runtime
        let mut transport = AfPacketTransport::new();
        let mut sockets = Vec::new();
        for iface in &interfaces {
            info!("Binding to interface {}...", iface.name);
            let socket = AfPacketSocket::bind(&iface.name).map_err(|e| {
                format!(
                    "Failed to bind to {}: {}. Run with root privileges.",
                    iface.name, e
                )
            })?;
            let socket = Arc::new(socket);
            transport.add(Arc::clone(&socket));
            sockets.push(socket);
        }

        let router = Router::new(
            interfaces,
            routes,
            Arc::new(transport),
            cfg.arp.router_options(),
        )
        .map_err(|e| format!("Failed to create router: {}", e))?;
        let router = Arc::new(router);

        let sweeper = router
            .initialize()
            .map_err(|e| format!("Failed to start ARP sweeper: {}", e))?;

        let mut tasks = Vec::new();
        for socket in sockets {
            let router = Arc::clone(&router);
            tasks.push(tokio::spawn(async move {
                let mut buf = vec![0u8; MAX_FRAME_SIZE];
                loop {
                    match socket.recv(&mut buf).await {
                        Ok(rx) => router.handle_frame(socket.name(), &mut buf[..rx.len]),
                        Err(e) => error!(interface = socket.name(), "Receive error: {}", e),
                    }
                }
            }));
        }

        info!("Router started, processing packets...");

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for shutdown signal: {}", e);
        }
        info!("Shutting down");

        for task in &tasks {
            task.abort();
        }
        sweeper.shutdown();

        let snapshot = router.metrics().snapshot();
        info!(
            forwarded = snapshot.packets_forwarded,
            dropped = snapshot.packets_dropped,
            arp_requests = snapshot.arp_requests_sent,
            arp_failures = snapshot.arp_resolution_failures,
            icmp_errors = snapshot.icmp_errors_sent,
            echo_replies = snapshot.icmp_echo_replies,
            "final counters"
        );
        for (name, stats) in &snapshot.interfaces {
            info!(
                interface = %name,
                rx_packets = stats.rx_packets,
                tx_packets = stats.tx_packets,
                rx_errors = stats.rx_errors,
                tx_errors = stats.tx_errors,
                "interface counters"
            );
        }

        Ok(())
    })
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed".to_string());
    }

    // The routing table file is only read here, so parse it as part of validation
    let routes = config::build_routes(&cfg, config_path.parent())
        .map_err(|e| format!("Invalid routes: {}", e))?;

    println!(
        "[INFO] Configuration is valid ({} interfaces, {} routes)",
        cfg.interfaces.len(),
        routes.len()
    );
    Ok(())
}
