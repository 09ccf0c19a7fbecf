mod consts;

pub use consts::*;

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Inline media payload: a base64 body tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    mime_type: String,
    data: Base64EncodedAudioBytes,
}

impl Blob {
    pub fn new(mime_type: impl Into<String>, data: Base64EncodedAudioBytes) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Whether the payload carries PCM audio (`audio/pcm`, with or without a rate parameter).
    pub fn is_pcm_audio(&self) -> bool {
        self.mime_type
            .split(';')
            .next()
            .is_some_and(|base| base.trim().eq_ignore_ascii_case(PCM_MIME_TYPE))
    }

    /// Sample rate declared in the MIME tag, e.g. `audio/pcm;rate=24000`.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }
}
