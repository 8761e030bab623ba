use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const UNKNOWN_TITLE: &str = "Unknown";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_GENRE: &str = "Unknown Genre";

/// Descriptive metadata of the track currently on air, as served by
/// `GET /metadata`. `length` is the duration in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub length: f64,
}

impl Default for TrackMetadata {
    /// The placeholder snapshot used before the first track and whenever
    /// tag extraction fails.
    fn default() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            genre: UNKNOWN_GENRE.to_string(),
            length: 0.0,
        }
    }
}

/// Embedded cover art with its declared MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct Artwork {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Track currently selected by the playback controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NowPlaying {
    /// Index into the catalog.
    pub index: usize,
    /// Catalog identifier, `/`-separated and relative to the catalog root.
    pub track: String,
    /// File on disk. Not part of the JSON.
    #[serde(skip)]
    pub path: PathBuf,
    pub metadata: TrackMetadata,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
    /// Seconds since the station started.
    pub uptime: f64,
    pub listeners: usize,
    pub current_track: Option<String>,
    /// Audio chunks handed to the hub since startup.
    pub chunks_published: u64,
    pub bytes_published: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_metadata_json() {
        let json = serde_json::to_value(TrackMetadata::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "title": "Unknown",
                "artist": "Unknown Artist",
                "album": "Unknown Album",
                "genre": "Unknown Genre",
                "length": 0.0,
            })
        );
    }
}
