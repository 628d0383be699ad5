//! Synthesis request parameters

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::effects::Overrides;
use crate::voice::{PROSODY_KEYS, Prosody, lenient_f32};
use crate::{Error, Result};

/// Query keys that select what to synthesize rather than tune an effect
pub const CONTROL_KEYS: [&str; 4] = ["text", "voice", "voice_id", "preset"];

/// Everything needed to open one stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    /// Voice id; empty selects the configured default
    pub voice: String,
    /// Preset name; empty or unknown streams unprocessed audio
    pub preset: String,
    pub overrides: Overrides,
    pub prosody: Prosody,
}

impl SynthesisRequest {
    #[must_use]
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    #[must_use]
    pub const fn with_prosody(mut self, prosody: Prosody) -> Self {
        self.prosody = prosody;
        self
    }

    /// Build a request from flat string pairs such as a URL query
    ///
    /// Keys other than the control and prosody keys are override candidates;
    /// values that do not parse as numbers are dropped.
    #[must_use]
    pub fn from_flat(pairs: &HashMap<String, String>) -> Self {
        let text = pairs.get("text").cloned().unwrap_or_default();
        let voice = pairs
            .get("voice")
            .or_else(|| pairs.get("voice_id"))
            .cloned()
            .unwrap_or_default();
        let preset = pairs.get("preset").cloned().unwrap_or_default();

        let as_json: Map<String, Value> = pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        let candidates: Map<String, Value> = as_json
            .iter()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            text,
            voice,
            preset,
            overrides: parse_overrides(&candidates),
            prosody: Prosody::from_map(&as_json),
        }
    }

    /// Reject requests with nothing to say
    ///
    /// # Errors
    ///
    /// Returns `Config` if the text is empty or whitespace
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::Config("text must not be empty".to_string()));
        }
        Ok(())
    }
}

fn is_reserved(key: &str) -> bool {
    CONTROL_KEYS.contains(&key) || PROSODY_KEYS.contains(&key)
}

/// Keep the numeric entries of a JSON object as effect overrides
#[must_use]
pub fn parse_overrides(map: &Map<String, Value>) -> Overrides {
    map.iter()
        .filter_map(|(key, value)| {
            let parsed = lenient_f32(value);
            if parsed.is_none() {
                tracing::debug!(key = %key, "dropping unparsable override");
            }
            parsed.map(|v| (key.clone(), v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_overrides_drops_garbage() {
        let value = json!({"drive_db": 20, "mix": "0.5", "wet": "very", "room_size": [1]});
        let overrides = parse_overrides(value.as_object().unwrap());

        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides.get("drive_db"), Some(&20.0));
        assert_eq!(overrides.get("mix"), Some(&0.5));
    }

    #[test]
    fn test_from_flat_splits_keys() {
        let pairs: HashMap<String, String> = [
            ("text", "hello"),
            ("voice", "en-test"),
            ("preset", "robot"),
            ("drive_db", "6"),
            ("speaker", "2"),
            ("bogus", "x"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let request = SynthesisRequest::from_flat(&pairs);
        assert_eq!(request.text, "hello");
        assert_eq!(request.voice, "en-test");
        assert_eq!(request.preset, "robot");
        assert_eq!(request.overrides.len(), 1);
        assert_eq!(request.overrides.get("drive_db"), Some(&6.0));
        assert_eq!(request.prosody.speaker, Some(2));
    }

    #[test]
    fn test_validate_rejects_blank_text() {
        assert!(SynthesisRequest::new("  \n", "v").validate().is_err());
        assert!(SynthesisRequest::new("hi", "v").validate().is_ok());
    }
}
