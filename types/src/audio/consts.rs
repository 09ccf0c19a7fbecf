use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::str::FromStr;

pub const PCM_MIME_TYPE: &str = "audio/pcm";

/// Microphone frames are sent as 16 kHz mono PCM16.
pub const INPUT_SAMPLE_RATE: u32 = 16000;
/// Synthesized speech arrives as 24 kHz mono PCM16.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("{};rate={}", PCM_MIME_TYPE, sample_rate)
}

/// Prebuilt voices of the Live API.
#[derive(Debug, Clone, PartialEq)]
pub enum Voice {
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Custom(String),
}

impl Voice {
    pub fn as_str(&self) -> &str {
        match self {
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Kore => "Kore",
            Voice::Fenrir => "Fenrir",
            Voice::Aoede => "Aoede",
            Voice::Custom(s) => s,
        }
    }
}

impl Serialize for Voice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "puck" => Voice::Puck,
            "charon" => Voice::Charon,
            "kore" => Voice::Kore,
            "fenrir" => Voice::Fenrir,
            "aoede" => Voice::Aoede,
            _ => Voice::Custom(s.to_string()),
        })
    }
}

impl<'de> Deserialize<'de> for Voice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Voice::from_str(&s).unwrap_or_else(|never| match never {}))
    }
}
