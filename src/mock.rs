use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use image::{Rgb, RgbImage};
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    artifact::{StepReport, Trainable},
    msg::{LossHistory, LossVector, Preview},
};

const STATE_FILE: &str = "mock_state.json";
const BACKUP_DIR: &str = "backups";

/// Knobs for [`MockArtifact`].
#[derive(Debug, Clone)]
pub struct MockSpec {
    /// Stop training at this iteration.
    pub target: Option<u64>,
    /// Simulated wall time of one step.
    pub step_latency: Duration,
    /// Number of loss components tracked per iteration.
    pub components: usize,
    /// Side length of the square preview images.
    pub preview_size: u32,
    pub seed: u64,
}

impl Default for MockSpec {
    fn default() -> Self {
        Self {
            target: None,
            step_latency: Duration::from_millis(50),
            components: 2,
            preview_size: 96,
            seed: 7,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SavedState {
    iteration: u64,
    loss_history: LossHistory,
}

/// A stand-in trainable artifact: noisy, exponentially decaying losses and
/// synthetic preview images that sharpen as training goes on.
///
/// Checkpoints are JSON files under an optional save directory, so a run can be
/// resumed (or started already past its target).
pub struct MockArtifact {
    spec: MockSpec,
    state: SavedState,
    save_dir: Option<PathBuf>,
    rng: StdRng,
    phase: f32,
}

impl MockArtifact {
    /// Creates a fresh artifact that never touches the disk.
    pub fn new(spec: MockSpec) -> Self {
        Self {
            rng: StdRng::seed_from_u64(spec.seed),
            spec,
            state: SavedState::default(),
            save_dir: None,
            phase: 0.0,
        }
    }

    /// Creates an artifact saving under `dir`, resuming from its last checkpoint if any.
    ///
    /// # Errors
    /// Returns an error if an existing checkpoint cannot be read or parsed.
    pub fn open(dir: impl AsRef<Path>, spec: MockSpec) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(STATE_FILE);

        let mut artifact = Self::new(spec);
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            artifact.state = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            info!("resuming mock model at iteration {}", artifact.state.iteration);
        }
        artifact.save_dir = Some(dir);
        Ok(artifact)
    }

    fn losses_at(&mut self, iteration: u64) -> LossVector {
        (0..self.spec.components)
            .map(|c| {
                let scale = 1.0 + c as f32 * 0.5;
                let decay = (-(iteration as f32) / (400.0 * scale)).exp();
                let noise = self.rng.random_range(-0.02..0.02);
                (scale * decay + 0.05 + noise).max(0.0)
            })
            .collect()
    }

    fn write_state(&self, path: &Path) -> anyhow::Result<()> {
        let raw = serde_json::to_string(&self.state)?;
        fs::write(path, raw).with_context(|| format!("writing {}", path.display()))
    }

    fn render(&self, label: &str, hue: usize) -> Preview {
        let size = self.spec.preview_size.max(1);
        let sharpness = 1.0 - (-(self.state.iteration as f32) / 500.0).exp();
        let center = size as f32 / 2.0;

        let image = RgbImage::from_fn(size, size, |x, y| {
            let dx = (x as f32 - center) / center;
            let dy = (y as f32 - center) / center;
            let ring = ((dx * dx + dy * dy).sqrt() * 8.0 + self.phase).sin();
            let v = (0.5 + 0.5 * ring * sharpness).clamp(0.0, 1.0);
            let mut px = [(v * 80.0) as u8; 3];
            px[hue % 3] = (v * 255.0) as u8;
            Rgb(px)
        });

        Preview::new(label, image)
    }
}

impl Trainable for MockArtifact {
    fn current_iteration(&self) -> u64 {
        self.state.iteration
    }

    fn target_iteration(&self) -> Option<u64> {
        self.spec.target
    }

    fn perform_step(&mut self) -> anyhow::Result<StepReport> {
        let started = Instant::now();
        thread::sleep(self.spec.step_latency);

        self.state.iteration += 1;
        let losses = self.losses_at(self.state.iteration);
        self.state.loss_history.push(losses);
        self.phase += 0.1;

        Ok(StepReport {
            iteration: self.state.iteration,
            elapsed: started.elapsed(),
        })
    }

    fn loss_history(&self) -> &[LossVector] {
        &self.state.loss_history
    }

    fn checkpoint(&mut self) -> anyhow::Result<()> {
        let Some(dir) = &self.save_dir else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;
        self.write_state(&dir.join(STATE_FILE))
    }

    fn backup_checkpoint(&mut self) -> anyhow::Result<()> {
        let Some(dir) = &self.save_dir else {
            return Ok(());
        };
        let backups = dir.join(BACKUP_DIR);
        fs::create_dir_all(&backups)?;
        self.write_state(&backups.join(format!("{:06}.json", self.state.iteration)))
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        info!("mock model released at iteration {}", self.state.iteration);
        Ok(())
    }

    fn render_previews(&mut self) -> anyhow::Result<Vec<Preview>> {
        Ok(vec![self.render("rings", 1), self.render("rings (alt)", 2)])
    }

    fn advance_inference_only(&mut self) -> anyhow::Result<()> {
        self.phase += self.rng.random_range(0.5..1.5);
        Ok(())
    }
}
