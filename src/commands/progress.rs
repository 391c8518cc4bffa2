//! Progress reporting with indicatif progress bars

use cartflash_flash::{Task, TaskStatus};
use indicatif::{ProgressBar, ProgressStyle};

/// Create a progress bar with a phase label
fn create_progress_bar_with_phase(
    total: u64,
    phase: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// [`Task`] that draws one progress bar per operation
///
/// Work units are bytes. The bar is created on `on_task_start` and
/// finished with a message matching the final status. The CLI never
/// cancels a running operation.
pub struct IndicatifProgress {
    phase: &'static str,
    bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new(phase: &'static str) -> Self {
        Self { phase, bar: None }
    }
}

impl Task for IndicatifProgress {
    fn on_task_start(&mut self, expected_work: u64) {
        let pb = create_progress_bar_with_phase(expected_work, self.phase)
            .unwrap_or_else(|_| ProgressBar::new(expected_work));
        self.bar = Some(pb);
    }

    fn on_task_update(&mut self, _status: TaskStatus, work: u64) {
        if let Some(pb) = &self.bar {
            pb.inc(work);
        }
    }

    fn on_task_end(&mut self, status: TaskStatus, work: u64) {
        if let Some(pb) = self.bar.take() {
            pb.set_position(work);
            match status {
                TaskStatus::Completed => {
                    pb.finish_with_message(format!("{} complete", self.phase))
                }
                TaskStatus::Cancelled => {
                    pb.abandon_with_message(format!("{} cancelled", self.phase))
                }
                _ => pb.abandon_with_message(format!("{} failed!", self.phase)),
            }
        }
    }

    fn is_task_cancelled(&self) -> bool {
        false
    }
}
