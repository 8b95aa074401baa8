// crates/progress/src/panel.rs
//! Pure view model of a dismissible job progress panel.

use playbook_jobs::PollerState;
use playbook_types::{JobSnapshot, JobStatus, DEFAULT_FAILURE_MESSAGE};
use serde::Serialize;

/// Everything the panel needs to draw itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelProps {
    pub is_visible: bool,
    pub title: String,
    /// 0–100.
    pub progress: u8,
    pub progress_message: String,
    pub status: JobStatus,
    pub error: Option<String>,
}

impl PanelProps {
    /// Props for a single-job poller. A recorded error (timeout, fetch
    /// failure) shows as a failure even if the last snapshot was still running.
    pub fn from_poller_state(title: impl Into<String>, state: &PollerState) -> Self {
        let status = match (&state.error, &state.job) {
            (Some(_), Some(job)) if job.status == JobStatus::Cancelled => JobStatus::Cancelled,
            (Some(_), _) => JobStatus::Failed,
            (None, Some(job)) => job.status,
            (None, None) => JobStatus::Pending,
        };

        Self {
            is_visible: state.is_polling || state.job.is_some() || state.error.is_some(),
            title: title.into(),
            progress: state.progress,
            progress_message: state.progress_message.clone(),
            status,
            error: state.error.clone(),
        }
    }

    /// Props for one job of a multi-job poller.
    pub fn from_snapshot(title: impl Into<String>, snapshot: &JobSnapshot) -> Self {
        let error = match snapshot.status {
            JobStatus::Failed | JobStatus::Cancelled => Some(snapshot.failure_message()),
            _ => None,
        };

        Self {
            is_visible: true,
            title: title.into(),
            progress: snapshot.progress_pct,
            progress_message: snapshot.progress_message.clone().unwrap_or_default(),
            status: snapshot.status,
            error,
        }
    }
}

/// Action button offered in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelAction {
    ViewResults,
    Dismiss,
}

impl PanelAction {
    pub fn label(self) -> &'static str {
        match self {
            PanelAction::ViewResults => "View Results",
            PanelAction::Dismiss => "Dismiss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PanelView {
    Hidden,
    /// Spinner plus message.
    Working {
        title: String,
        progress: u8,
        message: String,
    },
    Succeeded {
        title: String,
        action: PanelAction,
    },
    Failed {
        title: String,
        error: String,
        action: PanelAction,
    },
}

impl PanelView {
    /// The action the view offers, if any.
    pub fn action(&self) -> Option<PanelAction> {
        match self {
            PanelView::Succeeded { action, .. } | PanelView::Failed { action, .. } => Some(*action),
            _ => None,
        }
    }
}

pub fn render(props: &PanelProps) -> PanelView {
    if !props.is_visible {
        return PanelView::Hidden;
    }

    match props.status {
        JobStatus::Pending | JobStatus::InProgress => PanelView::Working {
            title: props.title.clone(),
            progress: props.progress.min(100),
            message: props.progress_message.clone(),
        },
        JobStatus::Completed => PanelView::Succeeded {
            title: props.title.clone(),
            action: PanelAction::ViewResults,
        },
        JobStatus::Failed | JobStatus::Cancelled => PanelView::Failed {
            title: props.title.clone(),
            error: props
                .error
                .clone()
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            action: PanelAction::Dismiss,
        },
    }
}

type Handler = Box<dyn FnMut() + Send>;

/// Holds the caller's handlers for the panel's actions. No other state.
#[derive(Default)]
pub struct ProgressPanel {
    on_view_results: Option<Handler>,
    on_dismiss: Option<Handler>,
}

impl ProgressPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_view_results(mut self, handler: impl FnMut() + Send + 'static) -> Self {
        self.on_view_results = Some(Box::new(handler));
        self
    }

    pub fn on_dismiss(mut self, handler: impl FnMut() + Send + 'static) -> Self {
        self.on_dismiss = Some(Box::new(handler));
        self
    }

    /// Trigger `action` if `view` offers it. "View Results" runs the
    /// completion handler and then dismisses. Returns whether anything ran.
    pub fn activate(&mut self, view: &PanelView, action: PanelAction) -> bool {
        if view.action() != Some(action) {
            return false;
        }

        if action == PanelAction::ViewResults {
            if let Some(handler) = self.on_view_results.as_mut() {
                handler();
            }
        }
        if let Some(handler) = self.on_dismiss.as_mut() {
            handler();
        }
        true
    }
}
