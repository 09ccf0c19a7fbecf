use crate::audio::Voice;
use crate::tools::Tool;

/// First message of every Live session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model name, ex: "models/gemini-2.0-flash-exp"
    model: String,

    generation_config: GenerationConfig,

    /// The system instructions steering every model turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,

    /// Tools(Functions) available to the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

impl Setup {
    pub fn builder(model: &str) -> SetupBuilder {
        SetupBuilder::new(model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation_config
    }

    pub fn system_instruction(&self) -> Option<&Content> {
        self.system_instruction.as_ref()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// ex: ["AUDIO"]
    response_modalities: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl GenerationConfig {
    pub fn response_modalities(&self) -> &[String] {
        &self.response_modalities
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.speech_config
            .as_ref()
            .map(|c| &c.voice_config.prebuilt_voice_config.voice_name)
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: Voice,
}

/// A content block made of text parts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Content {
    parts: Vec<TextPart>,
}

impl Content {
    pub fn text(text: &str) -> Self {
        Self {
            parts: vec![TextPart {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct TextPart {
    text: String,
}

pub struct SetupBuilder {
    setup: Setup,
}

impl SetupBuilder {
    pub fn new(model: &str) -> Self {
        Self {
            setup: Setup {
                model: model.to_string(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: None,
                    temperature: None,
                },
                system_instruction: None,
                tools: vec![],
            },
        }
    }

    pub fn with_response_modalities(mut self, modalities: Vec<String>) -> Self {
        self.setup.generation_config.response_modalities = modalities;
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.setup.generation_config.speech_config = Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
            },
        });
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.setup.generation_config.temperature = Some(temperature);
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.setup.system_instruction = Some(Content::text(instructions));
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.setup.tools = tools;
        self
    }

    pub fn build(self) -> Setup {
        self.setup
    }
}
