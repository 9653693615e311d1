//! Cancellable Auto-Match Task
//!
//! Runs the optimizer on Tokio's blocking pool and streams events back:
//!
//! ```text
//! MatchTask::spawn(request) ──► spawn_blocking(auto_match_with)
//!        │                              │ progress (best effort)
//!        ▼                              ▼
//!   MatchHandle ◄──── mpsc ──── Progress* → Completed | Cancelled | Failed
//! ```
//!
//! Cancellation is cooperative: the token is polled at iteration
//! boundaries, so a cancel lands after the current iteration finishes.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{auto_match_with, check_request, MatchRun};
use crate::config::MatchSettings;
use crate::error::{EngineError, EngineResult};
use crate::types::{DiagnosticSeries, FlowRegimeSegment, MatchOutcome, ModelParameters, TestConfig};

/// Buffered events; progress beyond this is dropped rather than stalling the fit
const EVENT_CAPACITY: usize = 64;

// ============================================================================
// Request / Events
// ============================================================================

/// Everything a background match needs, owned.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub series: DiagnosticSeries,
    pub initial: ModelParameters,
    pub segments: Vec<FlowRegimeSegment>,
    pub test: TestConfig,
    pub settings: MatchSettings,
}

/// Events emitted by a running match
#[derive(Debug, Clone)]
pub enum MatchEvent {
    /// An accepted step
    Progress {
        iteration: usize,
        residual: f64,
        parameters: ModelParameters,
    },
    Completed(MatchOutcome),
    /// `best` is `Some` only when an improved parameter set was computed
    Cancelled { best: Option<ModelParameters> },
    Failed(EngineError),
}

impl MatchEvent {
    /// True for the last event of a run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MatchEvent::Progress { .. })
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a running match
pub struct MatchHandle {
    cancel: CancellationToken,
    events: mpsc::Receiver<MatchEvent>,
    join: JoinHandle<()>,
}

impl MatchHandle {
    /// Request cancellation at the next iteration boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the run has ended and all events are read.
    pub async fn next_event(&mut self) -> Option<MatchEvent> {
        self.events.recv().await
    }

    /// Wait for the terminal event, discarding progress.
    pub async fn finish(mut self) -> Option<MatchEvent> {
        while let Some(event) = self.events.recv().await {
            if event.is_terminal() {
                return Some(event);
            }
        }
        debug!(finished = self.join.is_finished(), "Match channel closed without a result");
        None
    }

    /// Like `finish`, but cancels the run once `limit` has elapsed.
    pub async fn finish_within(mut self, limit: Duration) -> Option<MatchEvent> {
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) if event.is_terminal() => return Some(event),
                    Some(_) => continue,
                    None => return None,
                },
                () = &mut deadline, if !self.cancel.is_cancelled() => {
                    info!(limit_secs = limit.as_secs_f64(), "Match time limit reached, cancelling");
                    self.cancel.cancel();
                }
            }
        }
    }
}

// ============================================================================
// Task
// ============================================================================

/// Spawner for background matches
pub struct MatchTask;

impl MatchTask {
    /// Validate the request and start the fit on the blocking pool.
    ///
    /// Must be called from within a Tokio runtime. Invalid inputs are
    /// rejected here rather than reported as a `Failed` event.
    pub fn spawn(request: MatchRequest) -> EngineResult<MatchHandle> {
        Self::spawn_with_token(request, CancellationToken::new())
    }

    /// `spawn` with a caller-owned token, e.g. a child of a session token.
    pub fn spawn_with_token(request: MatchRequest, cancel: CancellationToken) -> EngineResult<MatchHandle> {
        check_request(&request.series, &request.initial, &request.test, &request.settings)?;

        let (tx, events) = mpsc::channel(EVENT_CAPACITY);
        let token = cancel.clone();

        let join = tokio::task::spawn_blocking(move || {
            let progress_tx = tx.clone();
            let result = auto_match_with(
                &request.series,
                &request.initial,
                &request.segments,
                &request.test,
                &request.settings,
                || token.is_cancelled(),
                |report| {
                    let _ = progress_tx.try_send(MatchEvent::Progress {
                        iteration: report.iteration,
                        residual: report.residual,
                        parameters: report.parameters,
                    });
                },
            );

            let event = match result {
                Ok(MatchRun::Completed(outcome)) => MatchEvent::Completed(outcome),
                Ok(MatchRun::Cancelled { best }) => MatchEvent::Cancelled { best },
                Err(e) => MatchEvent::Failed(e),
            };
            if tx.blocking_send(event).is_err() {
                debug!("Match handle dropped before the result was delivered");
            }
        });

        Ok(MatchHandle { cancel, events, join })
    }
}
