//! Metadata tagging for downloaded audio files.
//!
//! Embeds title/artist/album/track/date tags and front-cover art via lofty,
//! which maps the logical fields onto the right atoms for each container.
//! Cover art is fetched into a guarded temp file that is deleted on every
//! exit path.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag, TagType};
use reqwest::{Client, StatusCode};
use tempfile::{Builder, NamedTempFile};
use thiserror::Error;
use tracing::warn;

use crate::resolver::ResolvedJob;
use crate::tidal::USER_AGENT;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const COVER_HOST: &str = "https://resources.tidal.com/images";
const COVER_SIZE: &str = "1280x1280";

#[derive(Debug, Error)]
pub enum TaggerError {
    #[error("cover art request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cover art request returned {0}")]
    CoverStatus(StatusCode),

    #[error("tag write failed: {0}")]
    Tag(#[from] lofty::error::LoftyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no writable tag for {0:?}")]
    NoWritableTag(TagType),
}

/// Writes tags and cover art onto freshly downloaded files. One instance is
/// shared by all download workers.
#[derive(Clone)]
pub struct Tagger {
    client: Client,
}

impl Tagger {
    pub fn new() -> Result<Self, TaggerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Tag the audio file at `audio_path` with the job's metadata.
    ///
    /// An unparseable lossless file is skipped with a warning instead of
    /// failing the job; a half-written download must not take the worker
    /// down. For the AAC container a parse failure propagates.
    pub async fn tag(&self, job: &ResolvedJob, audio_path: &Path) -> Result<(), TaggerError> {
        // The guard holds the temp file alive until tagging is done; drop
        // removes it from disk on success and failure alike.
        let cover = match &job.cover_id {
            Some(cover_id) => Some(self.fetch_cover(cover_id).await?),
            None => None,
        };
        let cover_bytes = match &cover {
            Some(file) => Some(std::fs::read(file.path())?),
            None => None,
        };

        apply_tags(job, audio_path, cover_bytes)
    }

    async fn fetch_cover(&self, cover_id: &str) -> Result<NamedTempFile, TaggerError> {
        let url = cover_url(cover_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TaggerError::CoverStatus(status));
        }

        let bytes = response.bytes().await?;
        let mut cover = Builder::new().suffix(".jpg").tempfile()?;
        cover.write_all(&bytes)?;
        Ok(cover)
    }
}

/// Cover asset URL for a catalog cover identifier, which encodes its resource
/// path with dashes.
fn cover_url(cover_id: &str) -> String {
    format!(
        "{}/{}/{}.jpg",
        COVER_HOST,
        cover_id.replace('-', "/"),
        COVER_SIZE
    )
}

fn apply_tags(
    job: &ResolvedJob,
    audio_path: &Path,
    cover: Option<Vec<u8>>,
) -> Result<(), TaggerError> {
    let mut tagged_file = match read_from_path(audio_path) {
        Ok(file) => file,
        Err(err) if job.extension == ".flac" => {
            warn!(
                "Skipping metadata for invalid FLAC file '{}': {}",
                audio_path.display(),
                err
            );
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let Some(tag) = tagged_file.tag_mut(tag_type) else {
        return Err(TaggerError::NoWritableTag(tag_type));
    };

    tag.set_title(job.title.clone());
    tag.set_album(job.album.clone());
    // The artist field carries every credited artist; the album artist stays
    // the single naming-choice artist so directory grouping and tags agree.
    tag.set_artist(job.tidal_artists.clone());
    tag.insert_text(ItemKey::AlbumArtist, job.artist.clone());

    tag.set_track(job.track_number);
    if job.number_of_tracks > 0 {
        tag.set_track_total(job.number_of_tracks);
    }
    if !job.release_date.is_empty() {
        tag.insert_text(ItemKey::RecordingDate, job.release_date.clone());
    }

    if let Some(data) = cover {
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            None,
            data,
        ));
    }

    tagged_file.save_to_path(audio_path, WriteOptions::default())?;
    Ok(())
}
