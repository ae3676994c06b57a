//! Per-request pipeline output record

use serde::{Deserialize, Serialize};

/// Result of one end-to-end speech request.
///
/// Partial success is preferred over total failure: a recognized but
/// untranslatable utterance still carries its transcription, so the
/// error field and the text fields are not mutually exclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Transcribed text (empty when no speech was recognized)
    pub text: String,
    /// Translated text (empty when translation was not requested)
    #[serde(default)]
    pub translated_text: String,
    /// Error descriptor, present when a stage failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineOutput {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_omitted_when_absent() {
        let output = PipelineOutput {
            text: "hello".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&output).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["text"], "hello");
        assert_eq!(json["translated_text"], "");
    }

    #[test]
    fn test_failed_carries_message() {
        let output = PipelineOutput::failed("no audio");
        assert_eq!(output.error.as_deref(), Some("no audio"));
        assert!(output.text.is_empty());
    }
}
