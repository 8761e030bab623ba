//! External transcoder process management.
//!
//! Architecture:
//!
//! ```text
//!   TranscoderManager::start(track)
//!         │   (SIGKILLs the previous session before spawning)
//!         ├── pump task     ← reads stdout chunks → BroadcastHub::publish
//!         │                   on EOF / kill: wait() → StationEvent::TranscoderExited
//!         └── stderr task   ← forwards ffmpeg diagnostics to tracing
//! ```
//!
//! Every session carries a `SessionId`. Only the active session may publish,
//! and each session reports its exit exactly once, tagged with its id, so the
//! controller can discard notifications from sessions it already replaced.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, trace, warn};

use airwave_proto::config::TranscoderConfig;

use crate::core::StationEvent;
use crate::hub::BroadcastHub;

/// Read size for transcoder stdout. Roughly a quarter second of 128 kbps MP3.
const CHUNK_SIZE: usize = 4096;

/// Identity of one transcoder run. Ids increase monotonically and are never
/// reused; `0` is reserved for "no session".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscoderError {
    #[error("session {session}: failed to launch {program:?}: {source}")]
    Launch {
        session: SessionId,
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("session {session}: transcoder stdout was not captured")]
    NoStdout { session: SessionId },
}

impl TranscoderError {
    #[cfg(test)]
    pub fn session(&self) -> SessionId {
        match self {
            TranscoderError::Launch { session, .. } => *session,
            TranscoderError::NoStdout { session } => *session,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone)]
pub struct ExitOutcome {
    /// `None` if the exit status could not be collected.
    pub status: Option<ExitStatus>,
    pub elapsed: Duration,
    /// The session was terminated by `start`/`stop` rather than ending itself.
    pub killed: bool,
    pub bytes: u64,
}

impl ExitOutcome {
    pub fn succeeded(&self) -> bool {
        self.killed || self.status.map_or(false, |s| s.success())
    }
}

/// Builds the process for one track. Stdio and kill-on-drop are set by the
/// manager.
pub trait CommandFactory: Send + Sync {
    fn command(&self, track: &Path) -> Command;
}

impl<F> CommandFactory for F
where
    F: Fn(&Path) -> Command + Send + Sync,
{
    fn command(&self, track: &Path) -> Command {
        self(track)
    }
}

/// `ffmpeg -re -i <track> ... -f mp3 -`: decode anything, emit MP3 on stdout
/// at playback speed.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    binary: PathBuf,
    bitrate_kbps: Option<u32>,
}

impl FfmpegCommand {
    pub fn new(binary: PathBuf, bitrate_kbps: Option<u32>) -> Self {
        Self {
            binary,
            bitrate_kbps,
        }
    }

    /// Resolve the binary from config, then `FFMPEG_PATH` / beside the exe /
    /// `PATH`. Falls back to the bare name so a missing binary surfaces as a
    /// launch error per session rather than at startup.
    pub fn from_config(config: &TranscoderConfig) -> Self {
        let binary = config
            .binary
            .clone()
            .or_else(airwave_proto::platform::find_ffmpeg_binary)
            .unwrap_or_else(|| {
                warn!("transcoder: ffmpeg not found beside the executable or on PATH");
                PathBuf::from("ffmpeg")
            });
        Self::new(binary, config.bitrate_kbps)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl CommandFactory for FfmpegCommand {
    fn command(&self, track: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-re", "-i"])
            .arg(track)
            .args(["-vn", "-map_metadata", "-1"]);
        if let Some(kbps) = self.bitrate_kbps {
            cmd.arg("-b:a").arg(format!("{}k", kbps));
        }
        cmd.args(["-f", "mp3", "-"]);
        cmd
    }
}

/// Sent to a pump to kill its process. The pump answers on it once SIGKILL
/// has been sent; it is dropped unanswered if the process was already reaped.
type KillRequest = oneshot::Sender<()>;

struct LiveSession {
    id: SessionId,
    track: PathBuf,
    kill_tx: oneshot::Sender<KillRequest>,
}

/// Owns at most one running transcoder.
pub struct TranscoderManager {
    factory: Arc<dyn CommandFactory>,
    hub: Arc<BroadcastHub>,
    events: mpsc::Sender<StationEvent>,
    /// Raw id of the session allowed to publish; 0 when none.
    active: Arc<AtomicU64>,
    next_session: u64,
    live: Option<LiveSession>,
}

impl TranscoderManager {
    pub fn new(
        factory: Arc<dyn CommandFactory>,
        hub: Arc<BroadcastHub>,
        events: mpsc::Sender<StationEvent>,
    ) -> Self {
        Self {
            factory,
            hub,
            events,
            active: Arc::new(AtomicU64::new(0)),
            next_session: 0,
            live: None,
        }
    }

    /// The session currently allowed to publish, if any.
    #[cfg(test)]
    pub fn current(&self) -> Option<SessionId> {
        self.live.as_ref().map(|s| s.id)
    }

    /// Kill whatever is running and start transcoding `track`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&mut self, track: &Path) -> Result<SessionId, TranscoderError> {
        self.stop().await;

        self.next_session += 1;
        let session = SessionId(self.next_session);

        let mut cmd = self.factory.command(track);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let program = cmd.as_std().get_program().to_string_lossy().into_owned();

        let mut child = cmd.spawn().map_err(|source| TranscoderError::Launch {
            session,
            program: program.clone(),
            source,
        })?;

        // Dropping `child` on the error path kills it.
        let stdout = child
            .stdout
            .take()
            .ok_or(TranscoderError::NoStdout { session })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(session, stderr));
        }

        self.active.store(session.0, Ordering::SeqCst);
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(pump(
            session,
            child,
            stdout,
            Arc::clone(&self.hub),
            Arc::clone(&self.active),
            kill_rx,
            self.events.clone(),
        ));

        info!("transcoder: session {} started for {:?}", session, track);
        self.live = Some(LiveSession {
            id: session,
            track: track.to_path_buf(),
            kill_tx,
        });
        Ok(session)
    }

    /// Forcibly terminate the live session. Returns its id, if there was one.
    ///
    /// Resolves once the process has been sent SIGKILL (or has already been
    /// reaped). Reaping and the exit report stay with the pump.
    pub async fn stop(&mut self) -> Option<SessionId> {
        self.active.store(0, Ordering::SeqCst);
        let live = self.live.take()?;
        debug!("transcoder: killing session {} ({:?})", live.id, live.track);
        let (ack_tx, ack_rx) = oneshot::channel();
        // A closed channel means the pump is gone and the process reaped.
        if live.kill_tx.send(ack_tx).is_ok() {
            let _ = ack_rx.await;
        }
        Some(live.id)
    }
}

impl Drop for TranscoderManager {
    fn drop(&mut self) {
        self.active.store(0, Ordering::SeqCst);
        // Dropping `kill_tx` is itself a kill request.
        self.live.take();
    }
}

/// Copy stdout into the hub until EOF or a kill request, then reap the
/// process and report the exit once.
async fn pump(
    session: SessionId,
    mut child: Child,
    stdout: ChildStdout,
    hub: Arc<BroadcastHub>,
    active: Arc<AtomicU64>,
    mut kill_rx: oneshot::Receiver<KillRequest>,
    events: mpsc::Sender<StationEvent>,
) {
    let started = Instant::now();
    let mut chunks = ReaderStream::with_capacity(stdout, CHUNK_SIZE);
    let mut bytes = 0u64;

    // A dropped sender counts as a kill request too.
    let kill_request = loop {
        tokio::select! {
            biased;
            request = &mut kill_rx => break Some(request.ok()),
            next = chunks.next() => match next {
                Some(Ok(chunk)) => {
                    if active.load(Ordering::SeqCst) != session.0 {
                        continue;
                    }
                    bytes += chunk.len() as u64;
                    let report = hub.publish(chunk);
                    if report.dropped > 0 || report.removed > 0 {
                        trace!(
                            "transcoder: session {} chunk reached {}, skipped {} full, removed {} closed",
                            session, report.delivered, report.dropped, report.removed
                        );
                    }
                }
                Some(Err(e)) => {
                    warn!("transcoder: session {} stdout read error: {}", session, e);
                    break None;
                }
                None => break None,
            },
        }
    };

    // Stdout may close before the process exits; a kill can still arrive
    // while it is being reaped.
    let (killed, status) = match kill_request {
        Some(ack) => {
            kill_now(session, &mut child, ack);
            (true, child.wait().await)
        }
        None => tokio::select! {
            status = child.wait() => (false, status),
            request = &mut kill_rx => {
                kill_now(session, &mut child, request.ok());
                (true, child.wait().await)
            }
        },
    };
    let status = match status {
        Ok(status) => Some(status),
        Err(e) => {
            warn!("transcoder: session {} wait failed: {}", session, e);
            None
        }
    };

    let outcome = ExitOutcome {
        status,
        elapsed: started.elapsed(),
        killed,
        bytes,
    };
    debug!(
        "transcoder: session {} exited (status={:?}, killed={}, {} bytes in {:.1?})",
        session, outcome.status, outcome.killed, outcome.bytes, outcome.elapsed
    );

    if events
        .send(StationEvent::TranscoderExited { session, outcome })
        .await
        .is_err()
    {
        debug!("transcoder: controller gone, dropping exit of {}", session);
    }
}

fn kill_now(session: SessionId, child: &mut Child, ack: Option<KillRequest>) {
    if let Err(e) = child.start_kill() {
        debug!("transcoder: session {} kill failed: {}", session, e);
    }
    if let Some(ack) = ack {
        let _ = ack.send(());
    }
}

async fn forward_stderr(session: SessionId, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => {
                warn!("transcoder[{}]: {}", session, line.trim());
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                debug!("transcoder[{}]: stderr read error: {}", session, e);
                break;
            }
        }
    }
}
