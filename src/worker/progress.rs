//! Human-readable progress lines written to the log, not to the event channel.

use std::{fmt::Write, time::Duration};

use crate::msg::LossVector;

/// Formats `[#000123][0123ms][0.1234][0.5678]`, switching to seconds for slow steps.
pub fn step_line(iteration: u64, elapsed: Duration, losses: &[f32]) -> String {
    let mut line = if elapsed < Duration::from_secs(10) {
        format!("[#{iteration:06}][{:04.0}ms]", elapsed.as_secs_f64() * 1000.0)
    } else {
        format!("[#{iteration:06}][{:.4}s]", elapsed.as_secs_f64())
    };

    for loss in losses {
        let _ = write!(line, "[{loss:.4}]");
    }
    line
}

/// Per-component mean over a slice of loss vectors.
///
/// Vectors shorter than the first one only contribute to the components they have.
pub fn mean_losses(history: &[LossVector]) -> LossVector {
    let Some(width) = history.first().map(Vec::len) else {
        return Vec::new();
    };

    let mut sums = vec![0.0_f64; width];
    let mut counts = vec![0_usize; width];

    for losses in history {
        for (i, loss) in losses.iter().take(width).enumerate() {
            sums[i] += f64::from(*loss);
            counts[i] += 1;
        }
    }

    sums.iter()
        .zip(&counts)
        .map(|(sum, &n)| if n == 0 { 0.0 } else { (sum / n as f64) as f32 })
        .collect()
}

/// Slice of `history` covering iterations `(from, to]`, clamped to what exists.
pub fn history_range(history: &[LossVector], from: u64, to: u64) -> &[LossVector] {
    let len = history.len();
    let end = (to as usize).min(len);
    let start = (from as usize).min(end);
    &history[start..end]
}
