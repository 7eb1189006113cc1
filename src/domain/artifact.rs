//! Artifacts produced by the pipeline stages.
//!
//! Each field of [`RunArtifacts`] is written at most once per run, and only
//! by the stage that owns it.

use std::fmt;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Still image returned by the image stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    /// Raw image bytes (serialized as base64)
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,

    /// MIME type of the encoded image
    pub mime_type: String,
}

impl ImageAsset {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Decode a base64 payload as returned by the image service
    pub fn from_base64(
        encoded: &str,
        mime_type: impl Into<String>,
    ) -> Result<Self, base64::DecodeError> {
        Ok(Self::new(STANDARD.decode(encoded.trim())?, mime_type))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Opaque locator of a generated video on the remote service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoLocator(String);

impl VideoLocator {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Video downloaded to local storage and ready for playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableVideo {
    /// Where the bytes were written
    pub path: PathBuf,

    /// Size in bytes
    pub size_bytes: u64,

    /// When the download finished
    pub fetched_at: DateTime<Utc>,
}

impl PlayableVideo {
    pub fn new(path: PathBuf, size_bytes: u64) -> Self {
        Self {
            path,
            size_bytes,
            fetched_at: Utc::now(),
        }
    }
}

/// Outputs accumulated over one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifacts {
    image: Option<ImageAsset>,
    video_reference: Option<VideoLocator>,
    playable_video: Option<PlayableVideo>,
}

impl RunArtifacts {
    pub fn image(&self) -> Option<&ImageAsset> {
        self.image.as_ref()
    }

    pub fn video_reference(&self) -> Option<&VideoLocator> {
        self.video_reference.as_ref()
    }

    pub fn playable_video(&self) -> Option<&PlayableVideo> {
        self.playable_video.as_ref()
    }

    pub(crate) fn set_image(&mut self, image: ImageAsset) -> Result<(), ArtifactError> {
        set_once(&mut self.image, image, "image")
    }

    pub(crate) fn set_video_reference(
        &mut self,
        locator: VideoLocator,
    ) -> Result<(), ArtifactError> {
        set_once(&mut self.video_reference, locator, "video reference")
    }

    pub(crate) fn set_playable_video(&mut self, video: PlayableVideo) -> Result<(), ArtifactError> {
        set_once(&mut self.playable_video, video, "playable video")
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, name: &'static str) -> Result<(), ArtifactError> {
    if slot.is_some() {
        return Err(ArtifactError::AlreadySet(name));
    }
    *slot = Some(value);
    Ok(())
}

/// Artifact bookkeeping errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    #[error("Artifact already set for this run: {0}")]
    AlreadySet(&'static str),

    #[error("Artifact '{artifact}' cannot be recorded while run is {state}")]
    OutOfPhase {
        artifact: &'static str,
        state: super::RunState,
    },
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
