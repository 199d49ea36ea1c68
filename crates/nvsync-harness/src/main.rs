use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use nvsync_harness::{parse_script, replay, Harness, HarnessSettings};

#[derive(Parser, Debug)]
#[command(name = "nvsync-harness", version, about = "Replay a viewer configuration script against the in-memory engine")]
struct Cli {
    /// JSON array of harness commands
    script: PathBuf,

    /// Harness settings (log filter, load latency, failing loads)
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => match HarnessSettings::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Failed to read settings {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => HarnessSettings::default(),
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(settings.log_filter.as_str()))
        .init();

    let steps = match std::fs::read_to_string(&cli.script)
        .map_err(|e| e.to_string())
        .and_then(|json| parse_script(&json).map_err(|e| e.to_string()))
    {
        Ok(steps) => steps,
        Err(e) => {
            log::error!("Failed to read script {}: {}", cli.script.display(), e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("replaying {} steps from {}", steps.len(), cli.script.display());

    let harness = Harness::from_settings(&settings);
    let outcomes = replay(&harness, &steps).await;

    let mut failed = false;
    for outcome in &outcomes {
        failed |= !outcome.is_ok();
        match serde_json::to_string(outcome) {
            Ok(line) => println!("{}", line),
            Err(e) => log::error!("step {}: {}", outcome.step, e),
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
