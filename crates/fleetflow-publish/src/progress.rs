use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// デーモンの準備完了待ちのスピナー
pub struct EngineProgress {
    progress_bar: ProgressBar,
}

impl EngineProgress {
    pub fn new(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));

        Self { progress_bar: pb }
    }

    pub fn finish_ready(&self, attempts: u32) {
        self.progress_bar.finish_with_message(format!(
            "Docker daemon ready ✓ (attempt {})",
            attempts
        ));
    }

    pub fn finish_not_ready(&self, attempts: u32) {
        self.progress_bar.finish_with_message(format!(
            "Docker daemon did not respond after {} attempts",
            attempts
        ));
    }
}
