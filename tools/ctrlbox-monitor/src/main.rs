// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ctrlbox-monitor - watch controllers come and go
//!
//! Discovers serial, TCP and process controllers, keeps a connection open
//! to each one and prints connect/disconnect events.
//!
//! # Usage
//!
//! ```bash
//! # Serial devices under /dev (ttyACM*, ttyUSB*)
//! ctrlbox-monitor
//!
//! # A known TCP controller, no serial scan
//! ctrlbox-monitor --no-serial --tcp 10.0.0.5:4000
//!
//! # A simulator started as a local process
//! ctrlbox-monitor --process ./sim --arg --headless
//!
//! # Using configuration file
//! ctrlbox-monitor --config monitor.toml
//! ```

mod config;

use clap::{Parser, Subcommand};
use colored::*;
use config::{ConfigError, MonitorConfig, ProcessConfig, TcpConfig};
use ctrlbox::{
    build_device_discovery, build_process_discovery, build_tcp_server_discovery,
    ConnectionEvent, DeviceDiscovery, DiscoveryFacade, LineProtocol, ManagedDiscovery,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Controller connection monitor
#[derive(Parser, Debug)]
#[command(name = "ctrlbox-monitor")]
#[command(about = "Watch serial, TCP and process controllers come and go")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device name prefix (can repeat)
    #[arg(long = "serial-prefix", conflicts_with = "config")]
    serial_prefix: Vec<String>,

    /// Disable the serial device scan
    #[arg(long, conflicts_with = "config")]
    no_serial: bool,

    /// Known TCP controller, HOST:PORT (can repeat)
    #[arg(long, conflicts_with = "config")]
    tcp: Vec<String>,

    /// Service subtype of TCP controllers
    #[arg(long, default_value = "ctrlbox")]
    service_type: String,

    /// Controller executable to run
    #[arg(long, conflicts_with = "config")]
    process: Option<PathBuf>,

    /// Argument passed to the controller executable (can repeat)
    #[arg(long = "arg", allow_hyphen_values = true, requires = "process")]
    arg: Vec<String>,

    /// Working directory of the controller executable
    #[arg(long, requires = "process")]
    cwd: Option<PathBuf>,

    /// Seconds between connection attempts
    #[arg(long)]
    retry_period: Option<u64>,

    /// Milliseconds between two updates
    #[arg(long)]
    update_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "monitor.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;

    // RUST_LOG still wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    run(&config)
}

fn build_config(args: &Args) -> Result<MonitorConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::from_file(path)?,
        None => {
            let mut config = MonitorConfig::default();
            config.service_type = args.service_type.clone();
            config.serial.enabled = !args.no_serial;
            if !args.serial_prefix.is_empty() {
                config.serial.prefixes = args.serial_prefix.clone();
            }
            config.tcp = args
                .tcp
                .iter()
                .map(|address| TcpConfig::parse(address))
                .collect::<Result<_, _>>()?;
            if let Some(path) = &args.process {
                config.process.push(ProcessConfig {
                    path: path.clone(),
                    args: args.arg.clone(),
                    cwd: args.cwd.clone(),
                });
            }
            config
        }
    };

    // explicit flags override the file
    if let Some(secs) = args.retry_period {
        config.retry_period_secs = secs;
    }
    if let Some(ms) = args.update_interval {
        config.update_interval_ms = ms;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run(config: &MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let sniffer = LineProtocol::sniffer(|line: &str| log::info!("[MONITOR] < {}", line));

    let mut discoveries: Vec<Box<dyn ManagedDiscovery>> = Vec::new();
    if config.serial.enabled {
        let devices =
            DeviceDiscovery::new(config.serial.dir.clone(), config.serial.prefixes.clone());
        discoveries.push(Box::new(build_device_discovery(sniffer.clone(), devices)));
    }
    if !config.tcp.is_empty() {
        let known = config.tcp.iter().map(TcpConfig::endpoint).collect();
        discoveries.push(Box::new(build_tcp_server_discovery(
            sniffer.clone(),
            &config.service_type,
            known,
        )));
    }
    for process in &config.process {
        discoveries.push(Box::new(build_process_discovery(
            sniffer.clone(),
            process.path.clone(),
            process.args.clone(),
            process.cwd.clone(),
        )));
    }

    eprintln!("{} ctrlbox monitor v{}", ">>>".green().bold(), env!("CARGO_PKG_VERSION"));
    if config.serial.enabled {
        eprintln!(
            "  {} {} ({})",
            "Serial:".cyan(),
            config.serial.dir.display(),
            config.serial.prefixes.join(", ")
        );
    }
    for tcp in &config.tcp {
        eprintln!("  {} {}:{}", "TCP:".cyan(), tcp.host, tcp.port);
    }
    for process in &config.process {
        eprintln!("  {} {}", "Process:".cyan(), process.path.display());
    }
    eprintln!("Press Ctrl+C to stop...");
    eprintln!();

    let mut facade = DiscoveryFacade::new(discoveries, config.manager_config());
    facade.add_listener(print_event);

    let interval = config.update_interval();
    while running.load(Ordering::SeqCst) {
        facade.update();
        std::thread::sleep(interval);
    }

    eprintln!("\nShutting down...");
    facade.manager().shutdown();
    facade.update();
    Ok(())
}

fn print_event(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::ConnectorConnected { resource } => {
            println!("{} {} {}", "+".green().bold(), "connected   ".green(), resource);
        }
        ConnectionEvent::ConnectorDisconnected { resource } => {
            println!("{} {} {}", "-".red().bold(), "disconnected".red(), resource);
        }
    }
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = MonitorConfig::default();
    config.tcp.push(TcpConfig {
        host: "192.168.1.50".into(),
        port: 4000,
    });
    config.process.push(ProcessConfig {
        path: PathBuf::from("/opt/controller/bin/simulator"),
        args: vec!["--headless".into()],
        cwd: Some(PathBuf::from("/opt/controller")),
    });

    let toml_str = toml::to_string_pretty(&config)?;

    let content = format!(
        r#"# ctrlbox monitor configuration
# Generated by ctrlbox-monitor gen-config

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match MonitorConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!(
                "Serial: {}",
                if config.serial.enabled {
                    config.serial.prefixes.join(", ")
                } else {
                    "disabled".to_string()
                }
            );
            println!("TCP controllers: {}", config.tcp.len());
            for (i, tcp) in config.tcp.iter().enumerate() {
                println!("  [{}] {}:{}", i, tcp.host, tcp.port);
            }
            println!("Processes: {}", config.process.len());
            for (i, process) in config.process.iter().enumerate() {
                println!("  [{}] {}", i, process.path.display());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Configuration invalid".red().bold(), e);
            std::process::exit(1);
        }
    }
}
