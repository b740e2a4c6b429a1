//! Session parameters handed verbatim to the duplex transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Result, VocalinkError};

// ── Audio format ───────────────────────────────────────────────────

/// Encoding of the outbound audio frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Pcm,
    Wav,
    Mp3,
    Opus,
    Aac,
}

impl AudioFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pcm => "pcm",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
        }
    }
}

// ── Session parameters ─────────────────────────────────────────────

/// Configuration for one recognition/translation session.
///
/// `extra` carries free-form service parameters (semantic punctuation,
/// max sentence silence, disfluency removal, ...) and is flattened into
/// the wire-level parameter object untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParams {
    /// Model identifier for the remote service.
    pub model: String,
    /// Outbound audio encoding.
    pub format: AudioFormat,
    /// Outbound audio sample rate in Hz.
    pub sample_rate: u32,
    /// Source language code, or "auto" for detection.
    pub source_language: String,
    /// Target translation languages; `None` disables translation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_languages: Option<Vec<String>>,
    /// Hot-word vocabulary resource id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary_id: Option<String>,
    /// Phrase resource id (legacy hot-word tables).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrase_id: Option<String>,
    /// Free-form service parameters, flattened on the wire.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl SessionParams {
    pub fn new(model: impl Into<String>, source_language: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            format: AudioFormat::default(),
            sample_rate: 16_000,
            source_language: source_language.into(),
            target_languages: None,
            vocabulary_id: None,
            phrase_id: None,
            extra: HashMap::new(),
        }
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_target_languages<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_languages = Some(langs.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_vocabulary_id(mut self, id: impl Into<String>) -> Self {
        self.vocabulary_id = Some(id.into());
        self
    }

    pub fn with_phrase_id(mut self, id: impl Into<String>) -> Self {
        self.phrase_id = Some(id.into());
        self
    }

    /// Attach a free-form service parameter.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether the session requests translation output.
    pub fn translation_enabled(&self) -> bool {
        self.target_languages
            .as_ref()
            .is_some_and(|langs| !langs.is_empty())
    }

    /// Fail fast on null-equivalent required parameters.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(VocalinkError::invalid_argument("model must not be empty"));
        }
        if self.source_language.trim().is_empty() {
            return Err(VocalinkError::invalid_argument(
                "source_language must not be empty",
            ));
        }
        if self.sample_rate == 0 {
            return Err(VocalinkError::invalid_argument("sample_rate must be > 0"));
        }
        if let Some(langs) = &self.target_languages {
            if langs.iter().any(|l| l.trim().is_empty()) {
                return Err(VocalinkError::invalid_argument(
                    "target language codes must not be empty",
                ));
            }
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
