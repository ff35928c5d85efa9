//! vermon-watch
//!
//! Builds a pipeline from a config file and feeds it numeric deltas read
//! from stdin, one per line. Notifications are logged through `tracing`.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vermon::{Config, DeliveryConfig, DeliveryQueue, Factory, LogSink, PipelineChange, Sink};

/// Command line options
#[derive(Default)]
struct Args {
    /// Config file; the built-in default profile is used without one
    config: Option<PathBuf>,
    /// Profile to build instead of the active one
    profile: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "--profile" | "-p" => {
                if i + 1 < args.len() {
                    parsed.profile = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    eprintln!("error: --profile requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("vermon-watch - feed sensor deltas through a vermon pipeline");
                println!();
                println!("USAGE:");
                println!("    vermon-watch [OPTIONS] < deltas");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <PATH>       JSON config file [default: built-in profile]");
                println!("    -p, --profile <NAME>      Profile to build [default: active profile]");
                println!("    -h, --help                Print help information");
                println!();
                println!("Set RUST_LOG to control verbosity (e.g. RUST_LOG=vermon=debug).");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    parsed
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(profile) = &args.profile {
        config.select(profile)?;
    }

    let pipeline = Factory::build(config.active_profile())?;
    let queue = DeliveryQueue::new(DeliveryConfig::default(), vec![Arc::new(LogSink) as Arc<dyn Sink>])?;
    let listeners: Vec<_> = pipeline
        .notifiers()
        .into_iter()
        .map(|n| {
            let id = n.forward_to(&queue);
            (n, id)
        })
        .collect();

    info!(
        profile = %config.active_name(),
        environment = %pipeline.environment().name(),
        "vermon-watch v{}",
        env!("CARGO_PKG_VERSION")
    );
    pipeline.start();

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(delta) = line.parse::<f64>() else {
            warn!(input = %line, "not a number, skipping");
            continue;
        };
        match pipeline.add_change(delta) {
            PipelineChange::Single(outcome) if !outcome.is_committed() => {
                info!(delta, outcome = ?outcome, "change not committed");
            }
            _ => {}
        }
    }

    for (notifier, id) in listeners {
        notifier.off(id);
    }
    info!(delivered = queue.delivered(), dropped = queue.dropped(), "stdin closed, shutting down");
    queue.shutdown();
    Ok(())
}
