use crate::protocol::{NowPlaying, TrackMetadata};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Process-wide station state shared between the playback controller
/// (writer) and the HTTP handlers (readers). Readers may see a track that
/// lags the audio by a moment.
pub struct StationState {
    now_playing: Arc<RwLock<Option<NowPlaying>>>,
    started_at: Instant,
}

impl StationState {
    pub fn new() -> Self {
        Self {
            now_playing: Arc::new(RwLock::new(None)),
            started_at: Instant::now(),
        }
    }

    /// Metadata of the current track, or the placeholder before the first one.
    pub async fn current_metadata(&self) -> TrackMetadata {
        self.now_playing
            .read()
            .await
            .as_ref()
            .map(|np| np.metadata.clone())
            .unwrap_or_default()
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.read().await.clone()
    }

    /// Overwrite the current track in full.
    pub async fn set_now_playing(
        &self,
        index: usize,
        track: String,
        path: PathBuf,
        metadata: TrackMetadata,
    ) {
        *self.now_playing.write().await = Some(NowPlaying {
            index,
            track,
            path,
            metadata,
        });
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for StationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_placeholder_before_first_track() {
        let state = StationState::new();
        assert_eq!(state.current_metadata().await, TrackMetadata::default());
        assert!(state.now_playing().await.is_none());
    }

    #[tokio::test]
    async fn test_set_now_playing_overwrites() {
        let state = StationState::new();
        let meta = TrackMetadata {
            title: "Hey Jude".into(),
            artist: "The Beatles".into(),
            ..TrackMetadata::default()
        };
        state
            .set_now_playing(3, "b/hey.mp3".into(), PathBuf::from("/m/b/hey.mp3"), meta.clone())
            .await;
        assert_eq!(state.current_metadata().await, meta);

        state
            .set_now_playing(4, "c.mp3".into(), PathBuf::from("/m/c.mp3"), TrackMetadata::default())
            .await;
        let np = state.now_playing().await.unwrap();
        assert_eq!(np.index, 4);
        assert_eq!(np.track, "c.mp3");
        assert_eq!(np.path, PathBuf::from("/m/c.mp3"));
        assert_eq!(np.metadata, TrackMetadata::default());
    }

    #[test]
    fn test_path_is_not_serialized() {
        let np = NowPlaying {
            index: 0,
            track: "a.mp3".into(),
            path: PathBuf::from("/m/a.mp3"),
            metadata: TrackMetadata::default(),
        };
        let json = serde_json::to_value(&np).unwrap();
        assert!(json.get("path").is_none());
        assert_eq!(json["track"], "a.mp3");
    }
}
