use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::Accessor;

/// Tag data extracted from a single audio file, with spec-mandated
/// fallbacks already applied: a file with no usable tag still yields a
/// complete, displayable [`TrackTags`] rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub track_no: Option<u32>,
    pub duration_secs: Option<u32>,
}

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_ALBUM: &str = "Unknown Album";

#[derive(Debug, thiserror::Error)]
pub enum TagReadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file has an audio-looking extension but lofty could not probe
    /// a container out of it at all. Distinct from a merely untagged file,
    /// which still reads successfully with fallback values.
    #[error("unrecognized audio container: {0}")]
    Unrecognized(String),
}

/// Reads tags from `path`, falling back to the file stem for `title` and
/// to placeholder strings for `artist`/`album` when a tag field, or the
/// tag itself, is absent. Only a file lofty can't probe at all is an
/// error; a file it probes but finds untagged still succeeds.
pub fn read_tags(path: &Path) -> Result<TrackTags, TagReadError> {
    let file = File::open(path).map_err(|source| TagReadError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let probe = Probe::new(&mut reader)
        .guess_file_type()
        .map_err(|_| TagReadError::Unrecognized(path.display().to_string()))?;

    let tagged_file = probe
        .read()
        .map_err(|_| TagReadError::Unrecognized(path.display().to_string()))?;

    let fallback_title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unknown Title".to_string());

    let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
        return Ok(TrackTags {
            artist: UNKNOWN_ARTIST.to_string(),
            album: UNKNOWN_ALBUM.to_string(),
            title: fallback_title,
            track_no: None,
            duration_secs: Some(tagged_file.properties().duration().as_secs() as u32),
        });
    };

    let artist = tag
        .artist()
        .map(|s| s.into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());

    let album = tag
        .album()
        .map(|s| s.into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ALBUM.to_string());

    let title = tag
        .title()
        .map(|s| s.into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(fallback_title);

    let track_no = tag.track();
    let duration_secs = Some(tagged_file.properties().duration().as_secs() as u32);

    Ok(TrackTags {
        artist,
        album,
        title,
        track_no,
        duration_secs,
    })
}
