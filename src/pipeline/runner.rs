//! The five-step pipeline runner.
//!
//! Steps run strictly in sequence; after every transition an immutable
//! snapshot of the step list goes out on the stream channel. The renderer
//! session is closed on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::extract::Extractor;
use crate::normalize;
use crate::pipeline::{
    sample, StepState, StepStatus, StreamRecord, PROGRESS_CHECKPOINTS, STEP_NAMES,
};
use crate::render::{RenderBackend, RenderSession};

const STEP_ACQUIRE: usize = 0;
const STEP_LOAD: usize = 1;
const STEP_EXTRACT: usize = 2;
const STEP_NORMALIZE: usize = 3;
const STEP_FINALIZE: usize = 4;

const CANCELLED: &str = "pipeline cancelled";

/// Run one extraction pipeline, emitting progress and exactly one final
/// record on `tx`. All failures surface as stream records, never as a
/// returned error.
pub async fn run_pipeline(
    backend: Arc<dyn RenderBackend>,
    config: Arc<AppConfig>,
    tx: mpsc::Sender<StreamRecord>,
    cancel: CancellationToken,
) {
    Runner::new(backend, config, tx, cancel).run().await;
}

struct Runner {
    backend: Arc<dyn RenderBackend>,
    config: Arc<AppConfig>,
    tx: mpsc::Sender<StreamRecord>,
    cancel: CancellationToken,
    steps: Vec<StepStatus>,
}

impl Runner {
    fn new(
        backend: Arc<dyn RenderBackend>,
        config: Arc<AppConfig>,
        tx: mpsc::Sender<StreamRecord>,
        cancel: CancellationToken,
    ) -> Self {
        let steps = STEP_NAMES.iter().map(|name| StepStatus::pending(name)).collect();
        Self {
            backend,
            config,
            tx,
            cancel,
            steps,
        }
    }

    async fn run(mut self) {
        let run_id = Uuid::new_v4();
        info!(%run_id, url = %self.config.source.url, "starting extraction pipeline");

        // Step 1: acquire renderer.
        let started = self.start(STEP_ACQUIRE);
        self.broadcast(PROGRESS_CHECKPOINTS[STEP_ACQUIRE]).await;
        let launch_result = self.backend.launch().await;
        let mut session: Box<dyn RenderSession> = match launch_result {
            Ok(session) => {
                self.succeed(
                    STEP_ACQUIRE,
                    started,
                    json!({ "method": self.backend.method_name() }),
                );
                session
            }
            Err(e) if e.is_unavailable() => {
                warn!(error = %e, "renderer unavailable, falling back to sample data");
                self.fail(STEP_ACQUIRE, started, &e.to_string());
                self.broadcast(100).await;
                self.send_final(StreamRecord::Final {
                    success: false,
                    events: Some(sample::sample_events()),
                    successful_method_name: None,
                    error: Some(sample::UNAVAILABLE_ERROR.to_string()),
                })
                .await;
                return;
            }
            Err(e) => {
                self.abort(STEP_ACQUIRE, started, e.to_string(), None).await;
                return;
            }
        };

        // Step 2: load and wait.
        if self.cancelled_abort(STEP_LOAD, Some(&mut session)).await {
            return;
        }
        let started = self.start(STEP_LOAD);
        self.broadcast(PROGRESS_CHECKPOINTS[STEP_LOAD]).await;

        let url = self.config.source.url.clone();
        let container_selector = self.config.source.container_selector.clone();
        let renderer = &self.config.renderer;
        let navigation_timeout = Duration::from_millis(renderer.navigation_timeout_ms);
        let selector_timeout = Duration::from_millis(renderer.selector_timeout_ms);
        let settle_delay = Duration::from_millis(renderer.settle_delay_ms);

        let load = async {
            session.open_page(&url, navigation_timeout).await?;
            session
                .wait_for_selector(&container_selector, selector_timeout)
                .await?;
            // Late-binding scripts keep mutating the DOM briefly after the
            // container appears.
            session.wait_fixed(settle_delay).await;
            Ok::<(), crate::render::RenderError>(())
        };
        let load_result: Result<(), String> = tokio::select! {
            _ = self.cancel.cancelled() => Err(CANCELLED.to_string()),
            result = load => result.map_err(|e| e.to_string()),
        };
        match load_result {
            Ok(()) => self.succeed(STEP_LOAD, started, json!({ "url": url })),
            Err(message) => {
                self.abort(STEP_LOAD, started, message, Some(&mut session))
                    .await;
                return;
            }
        }

        // Step 3: extract.
        if self.cancelled_abort(STEP_EXTRACT, Some(&mut session)).await {
            return;
        }
        let started = self.start(STEP_EXTRACT);
        self.broadcast(PROGRESS_CHECKPOINTS[STEP_EXTRACT]).await;

        let content_result = session.content().await;
        let html = match content_result {
            Ok(html) => html,
            Err(e) => {
                self.abort(STEP_EXTRACT, started, e.to_string(), Some(&mut session))
                    .await;
                return;
            }
        };
        let extractor_result = Extractor::from_config(&self.config.source);
        let extractor = match extractor_result {
            Ok(extractor) => extractor,
            Err(e) => {
                self.abort(STEP_EXTRACT, started, e.to_string(), Some(&mut session))
                    .await;
                return;
            }
        };
        let fragments = match extractor.extract(&html) {
            Ok(fragments) => fragments,
            Err(e) => {
                self.abort(STEP_EXTRACT, started, e.to_string(), Some(&mut session))
                    .await;
                return;
            }
        };
        debug!(fragments = fragments.len(), "extraction complete");
        self.succeed(
            STEP_EXTRACT,
            started,
            json!({ "fragments": fragments.len() }),
        );

        // Step 4: normalize.
        if self
            .cancelled_abort(STEP_NORMALIZE, Some(&mut session))
            .await
        {
            return;
        }
        let started = self.start(STEP_NORMALIZE);
        self.broadcast(PROGRESS_CHECKPOINTS[STEP_NORMALIZE]).await;

        let origin_result = self.config.source.origin();
        let origin = match origin_result {
            Ok(origin) => origin,
            Err(e) => {
                self.abort(STEP_NORMALIZE, started, e.to_string(), Some(&mut session))
                    .await;
                return;
            }
        };
        let events = normalize::normalize(&fragments, &origin);
        let total: usize = events.values().map(Vec::len).sum();
        self.succeed(
            STEP_NORMALIZE,
            started,
            json!({ "events": total, "dates": events.len() }),
        );

        // Step 5: finalize. The grouped structure is already sorted and
        // frozen by construction, so this step cannot fail once reached.
        if self
            .cancelled_abort(STEP_FINALIZE, Some(&mut session))
            .await
        {
            return;
        }
        let started = self.start(STEP_FINALIZE);
        self.broadcast(PROGRESS_CHECKPOINTS[STEP_FINALIZE]).await;
        self.succeed(STEP_FINALIZE, started, json!({ "events": total }));

        close_session(&mut session).await;
        self.broadcast(100).await;
        info!(%run_id, events = total, dates = events.len(), "pipeline complete");
        self.send_final(StreamRecord::Final {
            success: true,
            events: Some(events),
            successful_method_name: Some(self.backend.method_name().to_string()),
            error: None,
        })
        .await;
    }

    /// Mark the step running and return its start instant.
    fn start(&mut self, step: usize) -> Instant {
        self.steps[step].state = StepState::Running;
        Instant::now()
    }

    fn succeed(&mut self, step: usize, started: Instant, result: serde_json::Value) {
        let status = &mut self.steps[step];
        status.state = StepState::Success;
        status.result = Some(result);
        status.duration_ms = Some(started.elapsed().as_millis() as u64);
    }

    fn fail(&mut self, step: usize, started: Instant, error: &str) {
        let status = &mut self.steps[step];
        status.state = StepState::Failed;
        status.error = Some(error.to_string());
        status.duration_ms = Some(started.elapsed().as_millis() as u64);
    }

    /// Generic failure path: fail the step, release the session, broadcast
    /// the terminal progress snapshot, emit the final record.
    async fn abort(
        &mut self,
        step: usize,
        started: Instant,
        error: String,
        session: Option<&mut Box<dyn RenderSession>>,
    ) {
        warn!(step = STEP_NAMES[step], error = %error, "pipeline step failed");
        self.fail(step, started, &error);
        if let Some(session) = session {
            close_session(session).await;
        }
        self.broadcast(100).await;
        self.send_final(StreamRecord::Final {
            success: false,
            events: None,
            successful_method_name: None,
            error: Some(error),
        })
        .await;
    }

    /// Between-step cancellation check. Fails the upcoming step and tears
    /// the pipeline down when the token has fired.
    async fn cancelled_abort(
        &mut self,
        step: usize,
        session: Option<&mut Box<dyn RenderSession>>,
    ) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        let started = self.start(step);
        self.abort(step, started, CANCELLED.to_string(), session)
            .await;
        true
    }

    /// Broadcast an immutable snapshot of the step list.
    async fn broadcast(&self, progress: u8) {
        let record = StreamRecord::Progress {
            progress,
            methods: self.steps.clone(),
        };
        if self.tx.send(record).await.is_err() {
            debug!("stream receiver dropped, progress record discarded");
        }
    }

    async fn send_final(&self, record: StreamRecord) {
        if self.tx.send(record).await.is_err() {
            debug!("stream receiver dropped, final record discarded");
        }
    }
}

/// Close failures are logged, never allowed to mask the original error.
async fn close_session(session: &mut Box<dyn RenderSession>) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "failed to close renderer session");
    }
}
