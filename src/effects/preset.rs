//! Named character presets

use std::fmt;

use super::{
    Biquad, Chorus, Compressor, Delay, Distortion, EffectStage, Gain, Overrides, PitchShift,
    Reverb, param,
};

/// Bumped whenever a preset's stages or defaults change
pub const PRESET_VERSION: u32 = 1;

/// Character voice presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Wizard,
    Robot,
    Fairy,
    Goblin,
}

const WIZARD_DEFAULTS: &[(&str, f32)] = &[
    ("gain_db", -2.0),
    ("pitch_semitones", -2.0),
    ("lowpass_hz", 9000.0),
    ("room_size", 0.90),
    ("wet", 0.28),
    ("dry", 0.72),
    ("damping", 0.35),
    ("width", 1.0),
    ("thr_db", -18.0),
    ("ratio", 3.0),
    ("attack_ms", 8.0),
    ("release_ms", 120.0),
];

const ROBOT_DEFAULTS: &[(&str, f32)] = &[
    ("hp_hz", 300.0),
    ("lp_hz", 3200.0),
    ("delay_s", 0.012),
    ("feedback", 0.20),
    ("mix", 0.25),
    ("drive_db", 12.0),
    ("thr_db", -16.0),
    ("ratio", 4.0),
];

const FAIRY_DEFAULTS: &[(&str, f32)] = &[
    ("gain_db", -1.0),
    ("pitch_semitones", 4.0),
    ("chorus_rate_hz", 1.6),
    ("chorus_depth", 0.4),
    ("chorus_delay_ms", 7.0),
    ("chorus_fb", 0.15),
    ("chorus_mix", 0.35),
    ("hp_hz", 160.0),
    ("room_size", 0.65),
    ("wet", 0.18),
    ("dry", 0.82),
    ("damping", 0.30),
    ("width", 1.0),
    ("thr_db", -20.0),
    ("ratio", 2.0),
];

const GOBLIN_DEFAULTS: &[(&str, f32)] = &[
    ("pitch_semitones", -4.0),
    ("lowpass_hz", 6500.0),
    ("drive_db", 18.0),
    ("thr_db", -22.0),
    ("ratio", 3.5),
    ("room_size", 0.4),
    ("wet", 0.10),
    ("dry", 0.90),
];

/// Compressor timing when a preset does not expose it
const DEFAULT_ATTACK_MS: f32 = 1.0;
const DEFAULT_RELEASE_MS: f32 = 100.0;

/// Reverb shape when a preset does not expose it
const DEFAULT_DAMPING: f32 = 0.5;
const DEFAULT_WIDTH: f32 = 1.0;

impl Preset {
    pub const ALL: [Self; 4] = [Self::Wizard, Self::Robot, Self::Fairy, Self::Goblin];

    /// Find a preset by name, ignoring case and surrounding whitespace
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Wizard => "wizard",
            Self::Robot => "robot",
            Self::Fairy => "fairy",
            Self::Goblin => "goblin",
        }
    }

    /// Override keys this preset reads, with their defaults
    #[must_use]
    pub const fn defaults(self) -> &'static [(&'static str, f32)] {
        match self {
            Self::Wizard => WIZARD_DEFAULTS,
            Self::Robot => ROBOT_DEFAULTS,
            Self::Fairy => FAIRY_DEFAULTS,
            Self::Goblin => GOBLIN_DEFAULTS,
        }
    }

    fn default_for(self, key: &str) -> f32 {
        self.defaults()
            .iter()
            .find(|(k, _)| *k == key)
            .map_or(0.0, |(_, v)| *v)
    }

    /// Instantiate the ordered stage list with overrides applied
    #[must_use]
    pub fn stages(self, overrides: &Overrides) -> Vec<Box<dyn EffectStage>> {
        for key in overrides.keys() {
            if !self.defaults().iter().any(|(k, _)| k == key) {
                tracing::debug!(preset = self.name(), key = %key, "ignoring unknown override");
            }
        }

        let p = |key: &str| param(overrides, key, self.default_for(key));

        match self {
            Self::Wizard => vec![
                Box::new(Gain::new(p("gain_db"))),
                Box::new(PitchShift::new(p("pitch_semitones"))),
                Box::new(Biquad::lowpass(p("lowpass_hz"))),
                Box::new(Reverb::new(
                    p("room_size"),
                    p("damping"),
                    p("wet"),
                    p("dry"),
                    p("width"),
                )),
                Box::new(Compressor::new(
                    p("thr_db"),
                    p("ratio"),
                    p("attack_ms"),
                    p("release_ms"),
                )),
            ],
            Self::Robot => vec![
                Box::new(Biquad::highpass(p("hp_hz"))),
                Box::new(Biquad::lowpass(p("lp_hz"))),
                Box::new(Delay::new(p("delay_s"), p("feedback"), p("mix"))),
                Box::new(Distortion::new(p("drive_db"))),
                Box::new(Compressor::new(
                    p("thr_db"),
                    p("ratio"),
                    DEFAULT_ATTACK_MS,
                    DEFAULT_RELEASE_MS,
                )),
            ],
            Self::Fairy => vec![
                Box::new(Gain::new(p("gain_db"))),
                Box::new(PitchShift::new(p("pitch_semitones"))),
                Box::new(Chorus::new(
                    p("chorus_rate_hz"),
                    p("chorus_depth"),
                    p("chorus_delay_ms"),
                    p("chorus_fb"),
                    p("chorus_mix"),
                )),
                Box::new(Biquad::highpass(p("hp_hz"))),
                Box::new(Reverb::new(
                    p("room_size"),
                    p("damping"),
                    p("wet"),
                    p("dry"),
                    p("width"),
                )),
                Box::new(Compressor::new(
                    p("thr_db"),
                    p("ratio"),
                    DEFAULT_ATTACK_MS,
                    DEFAULT_RELEASE_MS,
                )),
            ],
            Self::Goblin => vec![
                Box::new(PitchShift::new(p("pitch_semitones"))),
                Box::new(Biquad::lowpass(p("lowpass_hz"))),
                Box::new(Distortion::new(p("drive_db"))),
                Box::new(Compressor::new(
                    p("thr_db"),
                    p("ratio"),
                    DEFAULT_ATTACK_MS,
                    DEFAULT_RELEASE_MS,
                )),
                Box::new(Reverb::new(
                    p("room_size"),
                    DEFAULT_DAMPING,
                    p("wet"),
                    p("dry"),
                    DEFAULT_WIDTH,
                )),
            ],
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
