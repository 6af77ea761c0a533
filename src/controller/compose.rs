use image::{imageops, RgbImage};

use crate::msg::LossHistory;

use super::view::ControllerView;

/// Everything a surface needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedFrame {
    /// Key hints and the selected preview's caption, one entry per line.
    pub header: Vec<String>,
    pub iteration: u64,
    /// Loss history restricted to the selected window, oldest first.
    pub loss_history: LossHistory,
    /// Window the history was cut to; `0` means the whole run.
    pub history_window: usize,
    /// The selected preview, already fitted to the height limit.
    pub image: Option<RgbImage>,
}

/// Builds the frame for the current view.
///
/// # Args
/// * `view` - Controller state.
/// * `max_height` - Preview images taller than this are scaled down, keeping the aspect ratio.
pub fn compose(view: &ControllerView, max_height: u32) -> ComposedFrame {
    let mut header = vec![
        "[s] save  [b] backup  [Enter] save and quit".to_string(),
        "[p] update preview  [Space] next preview  [l] history range".to_string(),
    ];

    let image = match view.selected_preview() {
        Some(preview) => {
            header.push(format!(
                "Preview: \"{}\" [{}/{}]",
                preview.label,
                view.selected() + 1,
                view.previews().len()
            ));
            Some(fit_height(&preview.image, max_height))
        }
        None => {
            header.push("No preview available".to_string());
            None
        }
    };

    ComposedFrame {
        header,
        iteration: view.iteration(),
        loss_history: view.windowed_history().to_vec(),
        history_window: view.history_window(),
        image,
    }
}

/// Scales `image` down so it is at most `max_height` pixels tall.
pub fn fit_height(image: &RgbImage, max_height: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if h <= max_height || max_height == 0 {
        return image.clone();
    }

    let new_w = ((w as u64 * max_height as u64) / h as u64).max(1) as u32;
    imageops::resize(image, new_w, max_height, imageops::FilterType::Triangle)
}
