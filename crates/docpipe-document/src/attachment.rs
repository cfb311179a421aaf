//! Binary attachments
//!
//! Auxiliary payloads such as embedded audio travel with the document as
//! base64 strings, so the snapshot stays transport-safe in any text-based
//! interchange format.

use crate::error::DocumentError;
use crate::span::Span;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Attachment kind used for audio payloads
pub const AUDIO_KIND: &str = "audio";

/// Sampling parameters of an audio payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Channel count
    pub channels: u16,
    /// Samples per second
    pub sample_rate: u32,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// 16 kHz mono, 16-bit PCM
    pub const SPEECH_16K_MONO: AudioFormat = AudioFormat {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
    };
}

/// Metadata carried next to the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    /// Audio parameters, for audio payloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioFormat>,
    /// Range of the document text this payload is synchronised with
    pub range: Span,
}

/// Binary payload attached to a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Position within the document, assigned on insertion
    #[serde(default)]
    pub id: u32,
    /// Attachment kind (e.g. `"audio"`)
    pub kind: String,
    /// Base64-encoded payload
    pub encoded: String,
    /// Payload metadata
    pub metadata: AttachmentMetadata,
}

impl Attachment {
    /// Create attachment from raw bytes
    #[must_use]
    pub fn from_bytes(kind: impl Into<String>, data: &[u8], range: Span) -> Self {
        Self {
            id: 0,
            kind: kind.into(),
            encoded: STANDARD.encode(data),
            metadata: AttachmentMetadata { audio: None, range },
        }
    }

    /// Create audio attachment
    #[must_use]
    pub fn audio(data: &[u8], format: AudioFormat, range: Span) -> Self {
        let mut attachment = Self::from_bytes(AUDIO_KIND, data, range);
        attachment.metadata.audio = Some(format);
        attachment
    }

    /// Decode the payload
    ///
    /// # Errors
    /// Returns `DocumentError::InvalidPayload` if the string is not base64
    pub fn decode(&self) -> Result<Vec<u8>, DocumentError> {
        STANDARD
            .decode(self.encoded.as_bytes())
            .map_err(|e| DocumentError::InvalidPayload {
                id: self.id,
                reason: e.to_string(),
            })
    }

    /// Check if this is an audio attachment
    #[inline]
    #[must_use]
    pub fn is_audio(&self) -> bool {
        self.kind == AUDIO_KIND
    }
}
