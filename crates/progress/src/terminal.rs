// crates/progress/src/terminal.rs
//! `indicatif` rendering of [`PanelView`]s.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use playbook_types::JobId;

use crate::panel::PanelView;

const TICK: Duration = Duration::from_millis(100);

fn working_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner} {prefix} [{bar:30}] {pos:>3}% {msg}")
        .expect("valid spinner template")
        .progress_chars("=> ")
}

fn finished_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {msg}")
        .expect("valid finished template")
}

fn finished_message(view: &PanelView) -> Option<String> {
    match view {
        PanelView::Succeeded { title, action } => {
            Some(format!("\u{2713} {title} complete · {}", action.label()))
        }
        PanelView::Failed { title, error, action } => {
            Some(format!("\u{2717} {title}: {error} · {}", action.label()))
        }
        _ => None,
    }
}

/// Draws one job's panel as a single progress line.
pub struct TerminalPanel {
    bar: ProgressBar,
    finished: bool,
}

impl TerminalPanel {
    /// Panel drawing to stderr.
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(100))
    }

    /// Panel that draws nowhere, for tests and non-interactive output.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.set_length(100);
        bar.set_style(working_style());
        Self {
            bar,
            finished: false,
        }
    }

    pub fn update(&mut self, view: &PanelView) {
        if self.finished {
            return;
        }
        apply(&self.bar, view);
        self.finished = self.bar.is_finished();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl Default for TerminalPanel {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(bar: &ProgressBar, view: &PanelView) {
    match view {
        PanelView::Hidden => bar.finish_and_clear(),
        PanelView::Working {
            title,
            progress,
            message,
        } => {
            bar.set_prefix(title.clone());
            bar.set_position(u64::from(*progress));
            bar.set_message(message.clone());
            bar.enable_steady_tick(TICK);
        }
        PanelView::Succeeded { .. } | PanelView::Failed { .. } => {
            bar.disable_steady_tick();
            bar.set_style(finished_style());
            let message = finished_message(view).unwrap_or_default();
            if matches!(view, PanelView::Succeeded { .. }) {
                bar.set_position(100);
                bar.finish_with_message(message);
            } else {
                bar.abandon_with_message(message);
            }
        }
    }
}

/// Draws several jobs, one line each, plus an overall progress line.
pub struct TerminalBoard {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: HashMap<JobId, ProgressBar>,
}

impl TerminalBoard {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(100));
        overall.set_style(
            ProgressStyle::default_bar()
                .template("  overall [{bar:30}] {pos:>3}% {msg}")
                .expect("valid overall template")
                .progress_chars("=> "),
        );
        Self {
            multi,
            overall,
            bars: HashMap::new(),
        }
    }

    /// Draw `view` on the line belonging to `job_id`, adding the line if needed.
    pub fn update_job(&mut self, job_id: &JobId, view: &PanelView) {
        let bar = self.bars.entry(job_id.clone()).or_insert_with(|| {
            let bar = self.multi.insert_before(&self.overall, ProgressBar::new(100));
            bar.set_style(working_style());
            bar
        });
        if !bar.is_finished() {
            apply(bar, view);
        }
    }

    pub fn set_overall(&self, overall_progress: f64, active_count: usize) {
        self.overall
            .set_position(overall_progress.round().clamp(0.0, 100.0) as u64);
        self.overall.set_message(format!("{active_count} running"));
    }

    pub fn job_bar(&self, job_id: &JobId) -> Option<&ProgressBar> {
        self.bars.get(job_id)
    }

    pub fn overall_bar(&self) -> &ProgressBar {
        &self.overall
    }

    pub fn finish(&self) {
        self.overall.finish();
    }
}

impl Default for TerminalBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::PanelAction;

    fn working(progress: u8) -> PanelView {
        PanelView::Working {
            title: "Competitive compare".into(),
            progress,
            message: "Comparing pricing tiers".into(),
        }
    }

    #[test]
    fn test_panel_tracks_progress() {
        let mut panel = TerminalPanel::hidden();
        panel.update(&working(42));

        assert_eq!(panel.bar().position(), 42);
        assert_eq!(panel.bar().message(), "Comparing pricing tiers");
        assert_eq!(panel.bar().prefix(), "Competitive compare");
        assert!(!panel.is_finished());
    }

    #[test]
    fn test_panel_success_finishes() {
        let mut panel = TerminalPanel::hidden();
        panel.update(&working(90));
        panel.update(&PanelView::Succeeded {
            title: "Competitive compare".into(),
            action: PanelAction::ViewResults,
        });

        assert!(panel.is_finished());
        assert_eq!(panel.bar().position(), 100);
        assert!(panel.bar().message().contains("View Results"));

        // Nothing changes once finished.
        panel.update(&working(10));
        assert_eq!(panel.bar().position(), 100);
    }

    #[test]
    fn test_panel_failure_keeps_error() {
        let mut panel = TerminalPanel::hidden();
        panel.update(&PanelView::Failed {
            title: "Roadmap intel".into(),
            error: "Job timed out".into(),
            action: PanelAction::Dismiss,
        });

        assert!(panel.is_finished());
        let message = panel.bar().message();
        assert!(message.contains("Job timed out"));
        assert!(message.contains("Dismiss"));
    }

    #[test]
    fn test_board_adds_one_line_per_job() {
        let mut board = TerminalBoard::hidden();
        let a = JobId::new("a");
        let b = JobId::new("b");
        board.update_job(&a, &working(20));
        board.update_job(&b, &working(60));
        board.update_job(&a, &working(30));
        board.set_overall(45.0, 2);

        assert_eq!(board.job_bar(&a).map(|bar| bar.position()), Some(30));
        assert_eq!(board.job_bar(&b).map(|bar| bar.position()), Some(60));
        assert_eq!(board.overall_bar().position(), 45);
        assert_eq!(board.overall_bar().message(), "2 running");
        assert!(board.job_bar(&JobId::new("c")).is_none());
    }
}
