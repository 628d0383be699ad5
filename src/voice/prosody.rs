//! Optional prosody controls forwarded to the voice backend

use serde::Serialize;
use serde_json::{Map, Value};

/// Request keys that carry prosody rather than effect overrides
pub const PROSODY_KEYS: [&str; 4] = ["speaker", "length_scale", "noise_scale", "noise_w"];

/// Prosody controls; `None` leaves the backend default in place
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Prosody {
    pub speaker: Option<i64>,
    pub length_scale: Option<f32>,
    pub noise_scale: Option<f32>,
    pub noise_w: Option<f32>,
}

impl Prosody {
    /// Read prosody fields from a JSON object
    ///
    /// Numbers and numeric strings are accepted; anything else becomes `None`.
    #[must_use]
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            speaker: map.get("speaker").and_then(lenient_i64),
            length_scale: map.get("length_scale").and_then(lenient_f32),
            noise_scale: map.get("noise_scale").and_then(lenient_f32),
            noise_w: map.get("noise_w").and_then(lenient_f32),
        }
    }

    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.speaker.is_none()
            && self.length_scale.is_none()
            && self.noise_scale.is_none()
            && self.noise_w.is_none()
    }
}

/// Parse a finite float from a JSON number or string
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn lenient_f32(value: &Value) -> Option<f32> {
    let parsed = match value {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Parse an integer from a JSON number or string
#[must_use]
pub fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
