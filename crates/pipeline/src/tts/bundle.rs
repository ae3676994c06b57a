//! Voice bundle layout
//!
//! One bundle per language under the checkpoint root:
//!
//! ```text
//! <root>/<lang>/fastpitch/{model.onnx, config.json, speakers.json}
//! <root>/<lang>/hifigan/{model.onnx, config.json}
//! ```
//!
//! A bundle is usable only when both halves are present; partial
//! bundles are rejected at resolve time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use vaani_core::{Error, Result};

/// Resolved file locations for one language's voice
#[derive(Debug, Clone)]
pub struct VoiceBundle {
    pub lang: String,
    pub acoustic_model: PathBuf,
    pub acoustic_config: PathBuf,
    pub speakers_file: PathBuf,
    pub vocoder_model: PathBuf,
    pub vocoder_config: PathBuf,
}

impl VoiceBundle {
    /// Locate the bundle for `lang` under `root`, verifying that every
    /// required file exists.
    pub fn resolve(root: &Path, lang: &str) -> Result<Self> {
        let lang_dir = root.join(lang);
        if !lang_dir.is_dir() {
            return Err(Error::Synthesis(format!(
                "no voice for '{lang}' at {}",
                lang_dir.display()
            )));
        }

        let acoustic_dir = lang_dir.join("fastpitch");
        let vocoder_dir = lang_dir.join("hifigan");
        let bundle = Self {
            lang: lang.to_string(),
            acoustic_model: acoustic_dir.join("model.onnx"),
            acoustic_config: acoustic_dir.join("config.json"),
            speakers_file: acoustic_dir.join("speakers.json"),
            vocoder_model: vocoder_dir.join("model.onnx"),
            vocoder_config: vocoder_dir.join("config.json"),
        };

        for path in [
            &bundle.acoustic_model,
            &bundle.acoustic_config,
            &bundle.speakers_file,
            &bundle.vocoder_model,
            &bundle.vocoder_config,
        ] {
            if !path.exists() {
                return Err(Error::Synthesis(format!(
                    "incomplete voice bundle for '{lang}': missing {}",
                    path.display()
                )));
            }
        }

        Ok(bundle)
    }

    /// Whether `root/<lang>` holds a complete bundle
    pub fn is_complete(root: &Path, lang: &str) -> bool {
        Self::resolve(root, lang).is_ok()
    }

    /// Speaker registry: voice style name to model speaker id
    pub fn load_speakers(&self) -> Result<HashMap<String, i64>> {
        let text = std::fs::read_to_string(&self.speakers_file)
            .map_err(|e| Error::Synthesis(format!("{}: {e}", self.speakers_file.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Synthesis(format!("{}: {e}", self.speakers_file.display())))
    }
}

#[cfg(test)]
pub(crate) fn write_test_bundle(root: &Path, lang: &str) {
    let fastpitch = root.join(lang).join("fastpitch");
    let hifigan = root.join(lang).join("hifigan");
    std::fs::create_dir_all(&fastpitch).unwrap();
    std::fs::create_dir_all(&hifigan).unwrap();
    std::fs::write(fastpitch.join("model.onnx"), b"onnx").unwrap();
    std::fs::write(fastpitch.join("config.json"), "{}").unwrap();
    std::fs::write(fastpitch.join("speakers.json"), r#"{"male": 0, "female": 1}"#).unwrap();
    std::fs::write(hifigan.join("model.onnx"), b"onnx").unwrap();
    std::fs::write(hifigan.join("config.json"), "{}").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_bundle_resolves() {
        let root = tempfile::tempdir().unwrap();
        write_test_bundle(root.path(), "hi");

        let bundle = VoiceBundle::resolve(root.path(), "hi").unwrap();
        assert_eq!(bundle.lang, "hi");
        assert!(bundle.acoustic_model.ends_with("hi/fastpitch/model.onnx"));
        assert!(VoiceBundle::is_complete(root.path(), "hi"));

        let speakers = bundle.load_speakers().unwrap();
        assert_eq!(speakers.get("male"), Some(&0));
        assert_eq!(speakers.get("female"), Some(&1));
    }

    #[test]
    fn test_partial_bundle_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        write_test_bundle(root.path(), "ta");
        std::fs::remove_file(root.path().join("ta/hifigan/model.onnx")).unwrap();

        let err = VoiceBundle::resolve(root.path(), "ta").unwrap_err();
        assert!(matches!(err, Error::Synthesis(_)));
        assert!(!VoiceBundle::is_complete(root.path(), "ta"));
    }

    #[test]
    fn test_missing_language_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        assert!(VoiceBundle::resolve(root.path(), "kn").is_err());
    }
}
