//! Domain result types produced by a streaming session.
//!
//! One [`SessionResult`] per surfaced inbound event: an incremental (partial)
//! or sentence-final transcription, optionally with translations and usage
//! counters. [`ResultPack`] accumulates the sentence-final results of a whole
//! batch-mode file transfer.

use serde::{Deserialize, Serialize};

// ── Per-event payloads ─────────────────────────────────────────────

/// One recognized sentence, partial or final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Zero-based sentence index within the session.
    #[serde(default)]
    pub sentence_id: u64,
    /// Sentence start offset in the audio stream, milliseconds.
    #[serde(default)]
    pub begin_time: u64,
    /// Sentence end offset; set once the sentence is final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    pub text: String,
    /// Whether the service declared this sentence complete.
    #[serde(rename = "sentence_end", default)]
    pub is_sentence_end: bool,
}

/// Translation of the current sentence into one target language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub lang: String,
    pub text: String,
    #[serde(rename = "sentence_end", default)]
    pub is_sentence_end: bool,
}

/// Usage counters attached by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Audio duration billed so far, milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

// ── Session result ─────────────────────────────────────────────────

/// One inbound recognition/translation event, as surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    /// Correlation token of the session that produced this result.
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<Transcript>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translations: Option<Vec<Translation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl SessionResult {
    /// Whether this event closes the current sentence.
    pub fn is_sentence_end(&self) -> bool {
        if let Some(t) = &self.transcription {
            return t.is_sentence_end;
        }
        self.translations
            .as_ref()
            .is_some_and(|ts| ts.iter().any(|t| t.is_sentence_end))
    }

    /// Translation for a specific target language, if present.
    pub fn translation(&self, lang: &str) -> Option<&Translation> {
        self.translations
            .as_ref()
            .and_then(|ts| ts.iter().find(|t| t.lang == lang))
    }

    /// A lifecycle marker carries no recognition payload at all. The
    /// dispatcher suppresses these instead of surfacing them.
    pub(crate) fn is_lifecycle_marker(&self) -> bool {
        self.transcription.is_none() && self.translations.is_none()
    }
}

// ── Batch accumulator ──────────────────────────────────────────────

/// Ordered per-sentence results of a whole-file batch call.
///
/// The three vectors are index-aligned: entry `i` holds the i-th sentence's
/// transcription, its translations (`None` when translation is disabled),
/// and its usage record.
#[derive(Debug, Clone, Default)]
pub struct ResultPack {
    /// Correlation token of the session that produced this pack.
    pub request_id: String,
    pub transcriptions: Vec<Transcript>,
    pub translations: Vec<Option<Vec<Translation>>>,
    pub usages: Vec<Option<Usage>>,
}

impl ResultPack {
    /// Number of completed sentences accumulated so far.
    pub fn sentence_count(&self) -> usize {
        self.transcriptions.len()
    }

    /// Record a sentence-final result. Non-final results are ignored.
    pub(crate) fn absorb(&mut self, result: &SessionResult) {
        if !result.is_sentence_end() {
            return;
        }
        let Some(transcript) = &result.transcription else {
            return;
        };
        self.transcriptions.push(transcript.clone());
        self.translations.push(result.translations.clone());
        self.usages.push(result.usage);
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(text: &str) -> SessionResult {
        SessionResult {
            request_id: "r1".into(),
            transcription: Some(Transcript {
                sentence_id: 0,
                begin_time: 0,
                end_time: None,
                text: text.into(),
                is_sentence_end: false,
            }),
            translations: None,
            usage: None,
        }
    }

    fn sentence_final(id: u64, text: &str) -> SessionResult {
        SessionResult {
            request_id: "r1".into(),
            transcription: Some(Transcript {
                sentence_id: id,
                begin_time: id * 1000,
                end_time: Some(id * 1000 + 900),
                text: text.into(),
                is_sentence_end: true,
            }),
            translations: Some(vec![Translation {
                lang: "en".into(),
                text: format!("{text} (en)"),
                is_sentence_end: true,
            }]),
            usage: Some(Usage { duration_ms: 900 }),
        }
    }

    #[test]
    fn sentence_end_follows_transcription() {
        assert!(!partial("he").is_sentence_end());
        assert!(sentence_final(0, "hello").is_sentence_end());
    }

    #[test]
    fn translation_lookup_by_language() {
        let result = sentence_final(0, "hello");
        assert!(result.translation("en").is_some());
        assert!(result.translation("fr").is_none());
    }

    #[test]
    fn lifecycle_marker_has_no_payload() {
        let marker = SessionResult {
            request_id: "r1".into(),
            transcription: None,
            translations: None,
            usage: Some(Usage { duration_ms: 1200 }),
        };
        assert!(marker.is_lifecycle_marker());
        assert!(!partial("x").is_lifecycle_marker());
    }

    #[test]
    fn transcript_wire_field_is_sentence_end() {
        let json = r#"{"sentence_id": 2, "begin_time": 100, "text": "hi", "sentence_end": true}"#;
        let t: Transcript = serde_json::from_str(json).unwrap();
        assert!(t.is_sentence_end);
        assert_eq!(t.sentence_id, 2);
        assert_eq!(t.end_time, None);
    }

    #[test]
    fn pack_absorbs_only_final_sentences() {
        let mut pack = ResultPack::default();
        pack.absorb(&partial("he"));
        pack.absorb(&sentence_final(0, "hello"));
        pack.absorb(&partial("wor"));
        pack.absorb(&sentence_final(1, "world"));

        assert_eq!(pack.sentence_count(), 2);
        assert_eq!(pack.transcriptions[1].text, "world");
        assert_eq!(pack.translations.len(), 2);
        assert_eq!(pack.usages[0], Some(Usage { duration_ms: 900 }));
    }

    #[test]
    fn pack_keeps_none_translation_when_disabled() {
        let mut result = sentence_final(0, "hello");
        result.translations = None;
        let mut pack = ResultPack::default();
        pack.absorb(&result);
        assert_eq!(pack.translations, vec![None]);
    }
}
