// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! hdds-mesh - mesh multicast event tool
//!
//! Publishes events, prints events matching a prefix, or shows the node's
//! mesh-local address.

use clap::{Parser, Subcommand};
use colored::*;
use hdds_mesh::config::MeshConfig;
use hdds_mesh::{mesh_loop, EventHandler, MeshPublish, PollOutcome, SubscriptionScope};
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Mesh publish/subscribe tool
#[derive(Parser, Debug)]
#[command(name = "hdds-mesh")]
#[command(version = "0.1.0")]
#[command(about = "Publish and listen to mesh multicast events")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Mesh network interface (default from HDDS_MESH_IFACE or th1)
    #[arg(short, long, global = true)]
    iface: Option<String>,

    /// IPv6 multicast group
    #[arg(short, long, global = true)]
    group: Option<Ipv6Addr>,

    /// UDP port
    #[arg(short, long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Publish one event (or several with --count)
    Publish {
        /// Event name, e.g. temp/room1
        topic: String,

        /// Event payload
        #[arg(default_value = "")]
        data: String,

        /// Number of times to publish
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,

        /// Interval between publications in milliseconds
        #[arg(long, default_value = "1000")]
        interval: u64,
    },
    /// Print events whose name starts with a prefix
    Listen {
        /// Event name prefix (empty matches every event)
        #[arg(default_value = "")]
        prefix: String,

        /// Subscribe for all devices instead of this device only
        #[arg(long)]
        all_devices: bool,

        /// Device id attached to the subscription
        #[arg(long)]
        device_id: Option<String>,

        /// Stop after this many seconds (0 = until Ctrl+C)
        #[arg(short, long, default_value = "0")]
        duration: u64,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "10")]
        poll_ms: u64,
    },
    /// Show the mesh-local IPv6 address of this node
    Address,
}

fn main() {
    // Initialize logger for RUST_LOG-based debug output
    env_logger::init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn config_from(args: &Args) -> MeshConfig {
    let mut config = MeshConfig::from_env();
    if let Some(iface) = &args.iface {
        config = config.interface(iface.as_str());
    }
    if let Some(group) = args.group {
        config = config.group(group.to_string());
    }
    if let Some(port) = args.port {
        config = config.port(port);
    }
    config
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut mesh = MeshPublish::with_config(config_from(args));

    match &args.mode {
        Mode::Publish {
            topic,
            data,
            count,
            interval,
        } => run_publish(&mut mesh, topic, data, *count, *interval, running),
        Mode::Listen {
            prefix,
            all_devices,
            device_id,
            duration,
            poll_ms,
        } => {
            let scope = if *all_devices {
                SubscriptionScope::AllDevices
            } else {
                SubscriptionScope::MyDevices
            };
            run_listen(
                &mut mesh,
                prefix,
                scope,
                device_id.as_deref(),
                *duration,
                *poll_ms,
                running,
            )
        }
        Mode::Address => run_address(&mesh),
    }
}

fn run_publish(
    mesh: &mut MeshPublish,
    topic: &str,
    data: &str,
    count: u32,
    interval_ms: u64,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = mesh.config();
    eprintln!(
        "{} Publishing to [{}]:{} via {}",
        ">>>".green().bold(),
        config.group,
        config.port,
        config.interface
    );

    for i in 0..count {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        mesh.publish(topic, data)?;
        println!("{} {} {}", "pub".cyan(), topic.bold(), data);

        if i + 1 < count {
            std::thread::sleep(Duration::from_millis(interval_ms));
        }
    }

    mesh.shutdown();
    Ok(())
}

fn run_listen(
    mesh: &mut MeshPublish,
    prefix: &str,
    scope: SubscriptionScope,
    device_id: Option<&str>,
    duration_secs: u64,
    poll_ms: u64,
    running: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let received = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&received);
    let handler = EventHandler::new(move |event, data| {
        counter.fetch_add(1, Ordering::Relaxed);
        println!("{} {} {}", "evt".green(), event.bold(), data);
    });

    mesh.subscribe_scoped(prefix, handler, scope, device_id)?;

    let config = mesh.config();
    eprintln!(
        "{} Listening on [{}]:{} via {} (prefix '{}')",
        ">>>".green().bold(),
        config.group,
        config.port,
        config.interface,
        prefix
    );
    eprintln!("{}", "    Press Ctrl+C to stop".dimmed());

    let start = Instant::now();
    let deadline = (duration_secs > 0).then(|| Duration::from_secs(duration_secs));
    let mut unmatched = 0u64;

    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| start.elapsed() >= d) {
            break;
        }
        match mesh_loop(mesh) {
            Ok(PollOutcome::Dispatched(0)) => unmatched += 1,
            Ok(PollOutcome::Dispatched(_)) => {}
            Ok(PollOutcome::NoData) | Ok(PollOutcome::Inactive) => {
                std::thread::sleep(Duration::from_millis(poll_ms));
            }
            Err(e) => {
                log::warn!("[mesh] {}", e);
                std::thread::sleep(Duration::from_millis(poll_ms));
            }
        }
    }

    mesh.shutdown();
    eprintln!(
        "\n{} {} event(s) received, {} unmatched, {:.1}s",
        "Done:".bold(),
        received.load(Ordering::Relaxed),
        unmatched,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn run_address(mesh: &MeshPublish) -> Result<(), Box<dyn std::error::Error>> {
    let addr = mesh.local_address();
    if addr.is_unspecified() {
        eprintln!(
            "{} no preferred mesh-local address on {}",
            "!".yellow().bold(),
            mesh.config().interface
        );
    }
    println!("{}", addr);
    Ok(())
}
