// crates/cli/src/watch.rs
//! Drive the pollers and draw their state until every job is terminal.

use std::collections::HashMap;

use playbook_jobs::{JobOutcome, JobPoller, MultiJobPoller, MultiPollerState, PollError, PollEvent};
use playbook_progress::{
    render, PanelAction, PanelProps, PanelView, ProgressPanel, TerminalBoard, TerminalPanel,
};
use playbook_types::{JobId, JobStatus};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Watch one job on `poller` until it finishes. Returns whether it completed.
pub async fn watch_one(
    poller: &JobPoller,
    job_id: JobId,
    title: &str,
    panel: &mut TerminalPanel,
) -> bool {
    let mut state_rx = poller.watch();
    let wait = poller.start(job_id.clone()).wait();
    tokio::pin!(wait);

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break None;
                }
                let props = PanelProps::from_poller_state(title, &state_rx.borrow_and_update());
                panel.update(&render(&props));
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(%job_id, "Interrupted, no longer tracking job");
                poller.stop();
                break None;
            }
        }
    };

    let view = render(&PanelProps::from_poller_state(title, &poller.state()));
    panel.update(&view);

    match outcome {
        Some(JobOutcome::Completed(snapshot)) => {
            let summary = snapshot.result_summary.clone();
            let mut actions = ProgressPanel::new().on_view_results(move || {
                if let Some(summary) = &summary {
                    println!("{summary:#}");
                }
            });
            actions.activate(&view, PanelAction::ViewResults);
            info!(%job_id, "Job completed");
            true
        }
        Some(JobOutcome::Failed { error, .. }) => {
            warn!(%job_id, %error, "Job did not complete");
            false
        }
        None => false,
    }
}

/// Watch every id in `job_ids` on one shared loop. Returns whether all of
/// them completed.
///
/// Events only decorate the board. Whether watching is over, and how each
/// job ended, is read from the poller's state, which a lagging receiver
/// cannot lose.
pub async fn watch_many(
    poller: &MultiJobPoller,
    job_ids: Vec<JobId>,
    board: &mut TerminalBoard,
) -> bool {
    let mut events = poller.subscribe();
    let mut state_rx = poller.watch();

    let mut tracked = Vec::new();
    for job_id in job_ids {
        if poller.add_job(job_id.clone()) {
            tracked.push(job_id);
        } else {
            warn!(%job_id, "Job listed twice, tracking it once");
        }
    }

    // Failure text per job, kept for jobs whose snapshot is gone (timeouts).
    let mut errors: HashMap<JobId, String> = HashMap::new();
    while poller.active_count() > 0 {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let PollEvent::Failed(error) = event.event {
                        board.update_job(&event.job_id, &failed_view(&event.job_id, error.to_string()));
                        errors.insert(event.job_id, error.to_string());
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress display fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                draw(board, &state);
            }
            _ = tokio::signal::ctrl_c() => {
                warn!(remaining = poller.active_count(), "Interrupted, no longer tracking jobs");
                poller.reset_all();
                break;
            }
        }
    }

    let state = poller.state();
    draw(board, &state);
    let mut completed = 0usize;
    for job_id in &tracked {
        match state.jobs.get(job_id) {
            Some(snapshot) if snapshot.status == JobStatus::Completed => completed += 1,
            Some(snapshot) if snapshot.is_terminal() => {}
            _ => {
                let error = errors
                    .remove(job_id)
                    .unwrap_or_else(|| PollError::Timeout.to_string());
                board.update_job(job_id, &failed_view(job_id, error));
            }
        }
    }
    board.finish();

    info!(completed, total = tracked.len(), "Finished watching jobs");
    completed == tracked.len()
}

fn draw(board: &mut TerminalBoard, state: &MultiPollerState) {
    for (job_id, snapshot) in &state.jobs {
        let props = PanelProps::from_snapshot(job_id.as_str(), snapshot);
        board.update_job(job_id, &render(&props));
    }
    board.set_overall(state.overall_progress, state.active_count);
}

fn failed_view(job_id: &JobId, error: String) -> PanelView {
    PanelView::Failed {
        title: job_id.to_string(),
        error,
        action: PanelAction::Dismiss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use playbook_client::{ClientConfig, HttpJobClient};
    use playbook_jobs::PollerConfig;

    fn client(server: &mockito::ServerGuard) -> Arc<HttpJobClient> {
        Arc::new(
            HttpJobClient::new(&ClientConfig {
                api_url: server.url(),
                ..ClientConfig::default()
            })
            .unwrap(),
        )
    }

    fn fast_config() -> PollerConfig {
        PollerConfig::default()
            .with_interval(Duration::from_millis(50))
            .with_timeout(Duration::from_millis(600))
    }

    #[tokio::test]
    async fn test_watch_one_completed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/rep-1")
            .with_status(200)
            .with_body(r#"{"id":"rep-1","job_type":"report","status":"completed","progress_pct":100}"#)
            .create_async()
            .await;

        let poller = JobPoller::new(client(&server), fast_config());
        let mut panel = TerminalPanel::hidden();
        let ok = watch_one(&poller, JobId::new("rep-1"), "Strategy report", &mut panel).await;

        assert!(ok);
        assert!(panel.is_finished());
        assert_eq!(panel.bar().position(), 100);
    }

    #[tokio::test]
    async fn test_watch_one_failed_job() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/rep-2")
            .with_status(200)
            .with_body(
                r#"{"id":"rep-2","job_type":"report","status":"failed","error_message":"LLM quota exceeded"}"#,
            )
            .create_async()
            .await;

        let poller = JobPoller::new(client(&server), fast_config());
        let mut panel = TerminalPanel::hidden();
        let ok = watch_one(&poller, JobId::new("rep-2"), "Strategy report", &mut panel).await;

        assert!(!ok);
        assert!(panel.bar().message().contains("LLM quota exceeded"));
    }

    #[tokio::test]
    async fn test_watch_many_reports_partial_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/jobs/ok")
            .with_status(200)
            .with_body(r#"{"id":"ok","job_type":"analysis","status":"completed","progress_pct":100}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/jobs/down")
            .with_status(503)
            .create_async()
            .await;

        let poller = MultiJobPoller::new(client(&server), fast_config());
        let mut board = TerminalBoard::hidden();
        let ok = watch_many(
            &poller,
            vec![JobId::new("ok"), JobId::new("down"), JobId::new("ok")],
            &mut board,
        )
        .await;

        assert!(!ok);
        assert_eq!(board.job_bar(&JobId::new("ok")).map(|bar| bar.position()), Some(100));
        let down = board.job_bar(&JobId::new("down")).unwrap();
        assert!(down.message().contains("Job timed out"));
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_many_survives_lagged_events() {
        let mut server = mockito::Server::new_async().await;
        let ids: Vec<String> = (1..=6).map(|n| format!("job-{n}")).collect();
        for id in &ids {
            server
                .mock("GET", format!("/api/jobs/{id}").as_str())
                .with_status(200)
                .with_body(format!(
                    r#"{{"id":"{id}","job_type":"insight","status":"completed","progress_pct":100}}"#
                ))
                .create_async()
                .await;
        }

        let config = PollerConfig {
            event_capacity: 2,
            ..fast_config()
        };
        let poller = MultiJobPoller::new(client(&server), config);
        let mut board = TerminalBoard::hidden();
        let ok = tokio::time::timeout(
            Duration::from_secs(5),
            watch_many(&poller, ids.iter().map(JobId::new).collect(), &mut board),
        )
        .await
        .expect("watch_many did not return");

        assert!(ok);
        assert_eq!(poller.active_count(), 0);
        for id in &ids {
            assert_eq!(board.job_bar(&JobId::new(id.as_str())).map(|bar| bar.position()), Some(100));
        }
    }
}
