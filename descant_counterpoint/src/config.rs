// Data-driven engine and session configuration.
//
// Every tunable constant of the generator lives here: the weighted interval
// table, retry budget, pitch windows, crossing/tritone fallbacks, rule
// weights, and the session-level history and context caps. The engine never
// hard-codes these; tests inject alternate tables to force specific paths.
//
// All structs deserialize from JSON with every field optional, so a config
// file only needs the values it overrides.
//
// See also: `engine.rs` (reads `EngineConfig`), `rules.rs` (reads
// `RuleWeights`), `session.rs` (owns `SessionConfig`).

use crate::interval::Pitch;
use crate::model::KeySignature;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or validating a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Largest interval size accepted in an interval table (two octaves).
pub const MAX_INTERVAL: i16 = 24;
/// Largest separation or fallback offset accepted (one octave).
pub const MAX_OFFSET: i16 = 12;

/// One entry of a weighted interval table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntervalWeight {
    /// Interval size in semitones, applied above or below the input pitch.
    pub semitones: i16,
    /// Relative weight. Tables need not sum to 1.
    pub weight: f32,
}

impl IntervalWeight {
    pub const fn new(semitones: i16, weight: f32) -> Self {
        IntervalWeight { semitones, weight }
    }
}

/// Inclusive pitch window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchRange {
    pub low: Pitch,
    pub high: Pitch,
}

impl PitchRange {
    pub const fn new(low: Pitch, high: Pitch) -> Self {
        PitchRange { low, high }
    }

    pub fn contains(&self, pitch: Pitch) -> bool {
        pitch >= self.low && pitch <= self.high
    }

    pub fn clamp(&self, pitch: Pitch) -> Pitch {
        pitch.clamp(self.low, self.high)
    }
}

/// Weights and thresholds for the rule checker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleWeights {
    /// Dissonance weight in phrase-aware evaluation.
    pub dissonance: f32,
    /// Dissonance weight in the interval-status evaluation.
    pub dissonance_status: f32,
    pub parallel_perfect: f32,
    pub hidden_perfect: f32,
    pub phrase_ending: f32,
    /// Score lost per unit of violation severity.
    pub severity_cost: f32,
    /// Phrase-ending rule applies only when history is longer than this.
    pub phrase_end_min_history: usize,
}

impl Default for RuleWeights {
    fn default() -> Self {
        RuleWeights {
            dissonance: 0.7,
            dissonance_status: 1.0,
            parallel_perfect: 0.9,
            hidden_perfect: 0.6,
            phrase_ending: 0.5,
            severity_cost: 0.3,
            phrase_end_min_history: 4,
        }
    }
}

/// Tunables for `CounterpointEngine`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Consonant intervals drawn during generation.
    pub intervals: Vec<IntervalWeight>,
    /// Retry budget for the constrained-random draw.
    pub max_attempts: u32,
    /// Window a raw candidate must land in before rule checks.
    pub candidate_range: PitchRange,
    /// Final clamp applied to every generated pitch.
    pub output_range: PitchRange,
    /// Minimum distance from the input on the configured side.
    pub min_separation: i16,
    /// Offset forced when the candidate is closer than `min_separation`.
    pub crossing_fallback: i16,
    /// Offset forced when the clamped result is a tritone.
    pub tritone_fallback: i16,
    pub history_capacity: usize,
    /// Interval table used by `suggest_alternative_note`.
    pub alternative_intervals: Vec<IntervalWeight>,
    /// Base weight of stepwise neighbours of the last generated pitch.
    pub step_neighbor_weight: f32,
    /// Probability assumed when the scoring model returns nothing.
    pub neutral_probability: f32,
    pub rules: RuleWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            intervals: vec![
                IntervalWeight::new(3, 0.25),  // minor 3rd
                IntervalWeight::new(4, 0.25),  // major 3rd
                IntervalWeight::new(7, 0.10),  // perfect 5th
                IntervalWeight::new(8, 0.20),  // minor 6th
                IntervalWeight::new(9, 0.15),  // major 6th
                IntervalWeight::new(12, 0.05), // octave
            ],
            max_attempts: 8,
            candidate_range: PitchRange::new(24, 96),
            output_range: PitchRange::new(36, 84),
            min_separation: 3,
            crossing_fallback: 7,
            tritone_fallback: 4,
            history_capacity: 32,
            alternative_intervals: vec![
                IntervalWeight::new(3, 1.0),
                IntervalWeight::new(4, 1.0),
                IntervalWeight::new(8, 0.9),
                IntervalWeight::new(9, 0.9),
                IntervalWeight::new(12, 0.8),
                IntervalWeight::new(7, 0.6),
                IntervalWeight::new(0, 0.5),
            ],
            step_neighbor_weight: 0.7,
            neutral_probability: 0.5,
            rules: RuleWeights::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let total: f32 = self
            .intervals
            .iter()
            .map(|i| i.weight)
            .filter(|w| w.is_finite() && *w > 0.0)
            .sum();
        if total <= 0.0 {
            return Err(ConfigError::Invalid(
                "interval table needs at least one positive weight".into(),
            ));
        }
        for (label, table) in [
            ("intervals", &self.intervals),
            ("alternative_intervals", &self.alternative_intervals),
        ] {
            if let Some(bad) = table.iter().find(|e| !(0..=MAX_INTERVAL).contains(&e.semitones)) {
                return Err(ConfigError::Invalid(format!(
                    "{label}: interval {} outside 0..={MAX_INTERVAL}",
                    bad.semitones
                )));
            }
        }
        for (label, offset) in [
            ("min_separation", self.min_separation),
            ("crossing_fallback", self.crossing_fallback),
            ("tritone_fallback", self.tritone_fallback),
        ] {
            if !(0..=MAX_OFFSET).contains(&offset) {
                return Err(ConfigError::Invalid(format!(
                    "{label}: {offset} outside 0..={MAX_OFFSET}"
                )));
            }
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        for (label, range) in [
            ("candidate_range", self.candidate_range),
            ("output_range", self.output_range),
        ] {
            if range.low > range.high {
                return Err(ConfigError::Invalid(format!(
                    "{label}: low {} above high {}",
                    range.low, range.high
                )));
            }
            if range.low < 0 || range.high > 127 {
                return Err(ConfigError::Invalid(format!(
                    "{label}: {}..={} outside MIDI 0..=127",
                    range.low, range.high
                )));
            }
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid("history_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

/// Tunables for a `Session`: engine config plus the caller-side windows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub engine: EngineConfig,
    /// Display/explanation history kept by the session, independent of the
    /// engine's parallel-motion lookback.
    pub display_history_capacity: usize,
    /// Notes visible to the scoring model.
    pub context_capacity: usize,
    /// How many recent context notes the occlusion pass masks.
    pub occlusion_window: usize,
    /// Generated notes are force-released after this long without a note-on.
    pub stuck_note_timeout_secs: f64,
    pub key: KeySignature,
    /// Seed for the engine's PRNG. `None` derives one from the clock.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            engine: EngineConfig::default(),
            display_history_capacity: 64,
            context_capacity: 32,
            occlusion_window: 5,
            stuck_note_timeout_secs: 5.0,
            key: KeySignature::default(),
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(data)?;
        config.engine.validate()?;
        if config.display_history_capacity == 0 || config.context_capacity == 0 {
            return Err(ConfigError::Invalid(
                "session history and context capacities must be non-zero".into(),
            ));
        }
        let timeout = config.stuck_note_timeout_secs;
        if timeout.is_nan() || timeout <= 0.0 {
            return Err(ConfigError::Invalid(
                "stuck_note_timeout_secs must be positive".into(),
            ));
        }
        Ok(config)
    }
}
