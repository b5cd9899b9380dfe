//! j1939-sim CLI Entry Point
//!
//! Loads a vehicle profile and runs the deterministic multi-ECU
//! simulation headlessly for its configured duration.

use std::path::PathBuf;

use clap::Parser;
use j1939_sim::can::{VirtualCanBus, VirtualCanPort};
use j1939_sim::config::VehicleProfile;
use j1939_sim::ecus::{DiagnosticToolEcu, EngineEcu, TransmissionEcu};
use j1939_sim::sim::{EcuRunner, Scheduler};

/// Run a J1939 multi-ECU simulation over a virtual CAN bus.
#[derive(Parser, Debug)]
#[command(name = "j1939-sim", version, about, long_about = None)]
struct Args {
    /// Vehicle profile path (TOML)
    #[arg(short, long, default_value = "vehicle.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if args.verbose {
        println!("j1939-sim v{}", env!("CARGO_PKG_VERSION"));
        println!("Profile: {:?}", args.config);
    }

    run_headless(&args);
}

fn run_headless(args: &Args) {
    if !args.config.exists() {
        eprintln!("Warning: vehicle profile not found: {:?}", args.config);
        eprintln!("Creating example profile...");
        create_example_profile(&args.config);
        return;
    }

    let text = match std::fs::read_to_string(&args.config) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Failed to read {:?}: {e}", args.config);
            return;
        }
    };

    let profile = match VehicleProfile::from_toml(&text) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Invalid vehicle profile: {e}");
            return;
        }
    };

    println!("Loaded profile {:?}", profile.name);

    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    rt.block_on(async {
        let bus = VirtualCanBus::new(profile.bus.interface.clone());
        let mut scheduler = Scheduler::new(profile.simulation.tick_ms);

        for ecu_cfg in &profile.ecus {
            if !ecu_cfg.enabled {
                continue;
            }
            let port = VirtualCanPort::connect(bus.clone()).await;
            match ecu_cfg.name.as_str() {
                "engine" => scheduler.register(Box::new(EcuRunner::new(port, EngineEcu::new()))),
                "transmission" => {
                    scheduler.register(Box::new(EcuRunner::new(port, TransmissionEcu::new())))
                }
                "diagnostic_tool" => {
                    scheduler.register(Box::new(EcuRunner::new(port, DiagnosticToolEcu::new())))
                }
                other => eprintln!("Skipping unknown ECU: {other}"),
            }
        }

        scheduler
            .start_all()
            .await
            .expect("component start should not fail at startup");

        println!(
            "Simulation running for {}ms (tick={}ms). Press Ctrl+C to stop early.",
            profile.simulation.duration_ms, profile.simulation.tick_ms
        );

        tokio::select! {
            _ = scheduler.run_for(profile.simulation.duration_ms) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
            }
        }

        scheduler
            .stop_all()
            .await
            .expect("component stop should not fail at shutdown");

        for (name, err) in scheduler.errors() {
            eprintln!("Component {name} reported: {err}");
        }
        println!("Simulation finished at t={}ms", scheduler.now_ms());
    });
}

fn create_example_profile(path: &PathBuf) {
    let example = r#"name = "demo-truck"

[bus]
interface = "vcan0"
bitrate = 250000

[[ecus]]
name = "engine"

[[ecus]]
name = "transmission"

[[ecus]]
name = "diagnostic_tool"

[simulation]
tick_ms = 10
duration_ms = 5000
"#;

    if let Err(e) = std::fs::write(path, example) {
        eprintln!("Failed to create profile: {e}");
    } else {
        println!("Example profile created: {:?}", path);
    }
}
