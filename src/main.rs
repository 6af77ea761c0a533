use std::{env, fs::File, io, path::PathBuf, time::Duration};

use log::info;

use preview_trainer::{
    bootstrap::{self, Interrupts},
    controller::TerminalSurface,
    mock::{MockArtifact, MockSpec},
    TrainerConfig,
};

/// Logs go to `TRAINER_LOG` when set, so they don't scribble over the preview screen.
fn init_logging() -> io::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Ok(path) = env::var("TRAINER_LOG") {
        builder.target(env_logger::Target::Pipe(Box::new(File::create(path)?)));
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> io::Result<()> {
    init_logging()?;

    let cfg = match env::args().nth(1) {
        Some(path) => TrainerConfig::from_json_file(path)?,
        None => TrainerConfig::default(),
    };

    let save_dir: PathBuf = env::var("SAVE_DIR")
        .unwrap_or_else(|_| "mock-model".into())
        .into();
    let spec = MockSpec {
        target: env::var("TARGET_ITER").ok().and_then(|v| v.parse().ok()),
        step_latency: env::var("STEP_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(MockSpec::default().step_latency),
        ..MockSpec::default()
    };

    let artifact = MockArtifact::open(&save_dir, spec).map_err(io::Error::other)?;

    let outcome = bootstrap::run(
        artifact,
        cfg,
        Vec::new(),
        TerminalSurface::new(),
        Interrupts::ctrl_c(),
    )
    .await?;

    info!(
        steps = outcome.metrics.steps,
        checkpoints = outcome.metrics.checkpoints,
        backups = outcome.metrics.backups;
        "done ({:?})", outcome.mode
    );
    Ok(())
}
