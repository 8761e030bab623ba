//! Playback controller.
//!
//! All inputs that change what is on air funnel into `StationCore` as
//! `StationEvent`s, processed one at a time:
//!
//! ```text
//!   Idle ──start()──► Playing{session} ──TranscoderExited{session}──► Advancing
//!                         ▲                                              │
//!                         └────────────── next track started ◄───────────┘
//! ```
//!
//! An exit carrying any other session id is stale and ignored. When every
//! track in the catalog has failed in a row, the controller parks in
//! `Advancing` and schedules a `Retry` after a back-off.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use airwave_proto::catalog::Catalog;
use airwave_proto::order::{Cursor, PlaybackOrder};
use airwave_proto::protocol::TrackMetadata;
use airwave_proto::state::StationState;

use crate::metadata::MetadataResolver;
use crate::transcoder::{ExitOutcome, SessionId, TranscoderError, TranscoderManager};

#[derive(Debug)]
pub enum StationEvent {
    /// A transcoder session ended (naturally, by error, or killed).
    TranscoderExited {
        session: SessionId,
        outcome: ExitOutcome,
    },
    /// Back-off elapsed after the whole catalog failed.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing { session: SessionId },
    Advancing,
}

pub struct StationCore {
    catalog: Catalog,
    cursor: Cursor,
    rng: StdRng,
    phase: Phase,
    transcoder: TranscoderManager,
    resolver: Arc<dyn MetadataResolver>,
    state: Arc<StationState>,
    event_tx: mpsc::Sender<StationEvent>,
    /// Consecutive tracks that failed to launch or exited with an error.
    failure_streak: usize,
    failure_backoff: Duration,
}

impl StationCore {
    pub fn new(
        catalog: Catalog,
        order: PlaybackOrder,
        transcoder: TranscoderManager,
        resolver: Arc<dyn MetadataResolver>,
        state: Arc<StationState>,
        event_tx: mpsc::Sender<StationEvent>,
        failure_backoff: Duration,
    ) -> Self {
        let cursor = Cursor::new(catalog.len(), order);
        Self {
            catalog,
            cursor,
            rng: StdRng::from_entropy(),
            phase: Phase::Idle,
            transcoder,
            resolver,
            state,
            event_tx,
            failure_streak: 0,
            failure_backoff,
        }
    }

    /// Replace the random source, for reproducible shuffles.
    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[cfg(test)]
    pub fn current_index(&self) -> usize {
        self.cursor.current()
    }

    /// `Idle → Playing`. No-op once started.
    pub async fn start(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }
        let first = self.cursor.initial(&mut self.rng);
        info!(
            "station: starting with {} tracks ({:?} order)",
            self.catalog.len(),
            self.cursor.order()
        );
        self.play_from(first).await;
    }

    pub async fn handle_event(&mut self, event: StationEvent) {
        match event {
            StationEvent::TranscoderExited { session, outcome } => {
                match self.phase {
                    Phase::Playing { session: live } if live == session => {}
                    _ => {
                        debug!("station: ignoring stale exit of session {}", session);
                        return;
                    }
                }

                if outcome.succeeded() {
                    self.failure_streak = 0;
                } else {
                    self.failure_streak += 1;
                    warn!(
                        "station: session {} ended with {:?} after {:.1?}",
                        session, outcome.status, outcome.elapsed
                    );
                }

                self.phase = Phase::Advancing;
                if self.failure_streak >= self.catalog.len() {
                    self.schedule_retry();
                    return;
                }
                let next = self.cursor.advance(&mut self.rng);
                self.play_from(next).await;
            }
            StationEvent::Retry => {
                if self.phase != Phase::Advancing {
                    return;
                }
                info!("station: retrying after back-off");
                self.failure_streak = 0;
                let next = self.cursor.advance(&mut self.rng);
                self.play_from(next).await;
            }
        }
    }

    /// Start the controller and process events forever.
    pub async fn run(mut self, mut events: mpsc::Receiver<StationEvent>) -> anyhow::Result<()> {
        self.start().await;
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        self.shutdown().await;
        Ok(())
    }

    /// Kill the live session.
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.transcoder.stop().await {
            info!("station: stopped session {}", session);
        }
        self.phase = Phase::Idle;
    }

    /// Activate `idx`; on launch failure keep advancing until something
    /// plays or the whole catalog has failed.
    async fn play_from(&mut self, first: usize) {
        let mut idx = first;
        loop {
            match self.activate(idx).await {
                Ok(session) => {
                    self.phase = Phase::Playing { session };
                    return;
                }
                Err(e) => {
                    error!("station: {}", e);
                    self.failure_streak += 1;
                    if self.failure_streak >= self.catalog.len() {
                        self.schedule_retry();
                        return;
                    }
                    idx = self.cursor.advance(&mut self.rng);
                }
            }
        }
    }

    async fn activate(&mut self, idx: usize) -> Result<SessionId, TranscoderError> {
        let (Some(track), Some(path)) = (self.catalog.get(idx), self.catalog.path_of(idx)) else {
            unreachable!("cursor {} outside a catalog of {}", idx, self.catalog.len());
        };
        let track = track.to_string();

        let metadata = self.resolve_metadata(&path).await;
        info!(
            "station: now playing [{}] {} by {} ({})",
            idx, metadata.title, metadata.artist, track
        );
        self.state
            .set_now_playing(idx, track, path.clone(), metadata)
            .await;

        self.transcoder.start(&path).await
    }

    async fn resolve_metadata(&self, path: &Path) -> TrackMetadata {
        let resolver = Arc::clone(&self.resolver);
        let owned = path.to_path_buf();
        match tokio::task::spawn_blocking(move || resolver.resolve(&owned)).await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                warn!("station: {}; using placeholder metadata", e);
                TrackMetadata::default()
            }
            Err(e) => {
                warn!("station: metadata task for {:?} failed: {}", path, e);
                TrackMetadata::default()
            }
        }
    }

    fn schedule_retry(&mut self) {
        self.phase = Phase::Advancing;
        error!(
            "station: {} tracks failed in a row, retrying in {:?}",
            self.failure_streak, self.failure_backoff
        );
        let tx = self.event_tx.clone();
        let delay = self.failure_backoff;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(StationEvent::Retry).await;
        });
    }
}
