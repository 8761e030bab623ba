//! Track tag lookup using lofty.
//!
//! Only the currently playing track is ever resolved, once per activation
//! (plus on demand for `/albumcover`), so nothing is cached here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lofty::picture::{Picture, PictureType};
use lofty::prelude::*;

use airwave_proto::protocol::{
    Artwork, TrackMetadata, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_GENRE, UNKNOWN_TITLE,
};

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read tags from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: lofty::error::LoftyError,
    },
}

/// Looks up descriptive metadata and cover art for a track. Implementations
/// do blocking file I/O; callers run them on the blocking pool.
pub trait MetadataResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> Result<TrackMetadata, MetadataError>;

    /// `Ok(None)` when the file carries no picture.
    fn artwork(&self, path: &Path) -> Result<Option<Artwork>, MetadataError>;
}

/// Reads ID3/Vorbis/MP4 tags from the audio file itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagResolver;

impl TagResolver {
    fn read(path: &Path) -> Result<lofty::file::TaggedFile, MetadataError> {
        lofty::read_from_path(path).map_err(|source| MetadataError::Read {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl MetadataResolver for TagResolver {
    fn resolve(&self, path: &Path) -> Result<TrackMetadata, MetadataError> {
        let tagged_file = Self::read(path)?;
        let duration = tagged_file.properties().duration();
        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag());

        let metadata = match tag {
            Some(tag) => metadata_from_parts(
                tag.title().as_deref(),
                tag.artist().as_deref(),
                tag.album().as_deref(),
                tag.genre().as_deref(),
                duration,
            ),
            None => metadata_from_parts(None, None, None, None, duration),
        };
        Ok(metadata)
    }

    fn artwork(&self, path: &Path) -> Result<Option<Artwork>, MetadataError> {
        let tagged_file = Self::read(path)?;
        let pictures: Vec<&Picture> = tagged_file
            .tags()
            .iter()
            .flat_map(|tag| tag.pictures())
            .collect();
        Ok(pick_artwork(&pictures))
    }
}

/// Fill in placeholders for missing or blank tag values.
fn metadata_from_parts(
    title: Option<&str>,
    artist: Option<&str>,
    album: Option<&str>,
    genre: Option<&str>,
    duration: Duration,
) -> TrackMetadata {
    fn or_unknown(value: Option<&str>, fallback: &str) -> String {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    TrackMetadata {
        title: or_unknown(title, UNKNOWN_TITLE),
        artist: or_unknown(artist, UNKNOWN_ARTIST),
        album: or_unknown(album, UNKNOWN_ALBUM),
        genre: or_unknown(genre, UNKNOWN_GENRE),
        length: duration.as_secs_f64(),
    }
}

/// Front cover if there is one, otherwise the first picture.
fn pick_artwork(pictures: &[&Picture]) -> Option<Artwork> {
    let picture = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())?;

    let mime_type = picture
        .mime_type()
        .map(|m| m.as_str().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "image/jpeg".to_string());

    Some(Artwork {
        mime_type,
        data: picture.data().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofty::picture::MimeType;

    fn picture(kind: PictureType, mime: Option<MimeType>, data: &[u8]) -> Picture {
        Picture::new_unchecked(kind, mime, None, data.to_vec())
    }

    #[test]
    fn test_missing_fields_fall_back() {
        let meta = metadata_from_parts(Some("Song"), None, Some("  "), None, Duration::ZERO);
        assert_eq!(meta.title, "Song");
        assert_eq!(meta.artist, "Unknown Artist");
        assert_eq!(meta.album, "Unknown Album");
        assert_eq!(meta.genre, "Unknown Genre");
        assert_eq!(meta.length, 0.0);
    }

    #[test]
    fn test_duration_in_seconds() {
        let meta = metadata_from_parts(
            Some("A"),
            Some("B"),
            Some("C"),
            Some("Jazz"),
            Duration::from_millis(185_500),
        );
        assert_eq!(meta.genre, "Jazz");
        assert!((meta.length - 185.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_front_cover_preferred() {
        let back = picture(PictureType::CoverBack, Some(MimeType::Png), b"back");
        let front = picture(PictureType::CoverFront, Some(MimeType::Jpeg), b"front");
        let art = pick_artwork(&[&back, &front]).unwrap();
        assert_eq!(art.data, b"front");
        assert_eq!(art.mime_type, "image/jpeg");
    }

    #[test]
    fn test_first_picture_when_no_front_cover() {
        let other = picture(PictureType::Other, Some(MimeType::Png), b"png");
        let art = pick_artwork(&[&other]).unwrap();
        assert_eq!(art.mime_type, "image/png");
        assert_eq!(art.data, b"png");
    }

    #[test]
    fn test_no_pictures() {
        assert!(pick_artwork(&[]).is_none());
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let resolver = TagResolver;
        assert!(resolver.resolve(&path).is_err());
        assert!(resolver.artwork(&path).is_err());
        assert!(resolver.resolve(&dir.path().join("missing.mp3")).is_err());
    }
}
