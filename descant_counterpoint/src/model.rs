// Scoring model boundary: what the model sees and what it reports back.
//
// A `ScoringModel` receives a context window (recent input notes with their
// sounding intervals) and a set of candidate pitches, and returns one
// `Rationale` per candidate carrying a probability in [0, 1] and an ordered
// list of influences over the context. Callers match results by
// `candidate_pitch`; implementations may reorder. A model that cannot answer
// returns an empty list and callers fall back to a neutral probability.
//
// `MockModel` is the deterministic stand-in: probabilities come from a
// `VoiceRng` seeded from the request shape, and influences weight the most
// recent five context notes linearly down from 1.0.
//
// See also: `engine.rs` (alternative ranking), `explain.rs` (rationales and
// occlusion re-scoring).

use crate::interval::Pitch;
use crate::rules::Violation;
use descant_prng::VoiceRng;
use serde::{Deserialize, Serialize};

/// One note as the scoring model sees it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextNote {
    pub pitch: Pitch,
    pub start_sec: f64,
    /// Equal to `start_sec` while the note is still sounding.
    pub end_sec: f64,
}

/// How much one context note mattered to a candidate's probability.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Influence {
    pub pitch: Pitch,
    pub start_sec: f64,
    pub end_sec: f64,
    /// Importance in [0, 1].
    pub weight: f32,
}

impl Influence {
    /// True if this influence refers to `note` (same pitch, onset within 10ms).
    pub fn refers_to(&self, note: &ContextNote) -> bool {
        self.pitch == note.pitch && (self.start_sec - note.start_sec).abs() < 0.01
    }
}

/// Why a pitch was chosen or rejected. A read-only snapshot for display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub candidate_pitch: Pitch,
    pub probability: f32,
    pub summary: String,
    pub detail: String,
    /// Most recent context first.
    pub influences: Vec<Influence>,
    pub triggered_rules: Vec<Violation>,
}

impl Rationale {
    /// Rationale with no model evidence behind it.
    pub fn neutral(candidate_pitch: Pitch, probability: f32) -> Self {
        Rationale {
            candidate_pitch,
            probability,
            summary: String::new(),
            detail: String::new(),
            influences: Vec::new(),
            triggered_rules: Vec::new(),
        }
    }
}

/// Tonal centre passed through to the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    /// Pitch class of the tonic, 0 = C.
    pub root: u8,
    pub major: bool,
}

impl Default for KeySignature {
    fn default() -> Self {
        KeySignature { root: 0, major: true }
    }
}

/// Pluggable candidate scorer.
///
/// Must return at most one `Rationale` per candidate, with probabilities in
/// [0, 1] and influences that only reference notes from `context`. Called
/// repeatedly during occlusion, so it must be cheap and must not block;
/// failure is an empty result. Shared between the engine and the
/// explanation engine, which may live on the note-delivery thread.
pub trait ScoringModel: Send + Sync {
    fn score_candidates(
        &self,
        context: &[ContextNote],
        candidates: &[Pitch],
        key: KeySignature,
    ) -> Vec<Rationale>;
}

/// Deterministic stand-in for a learned model.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockModel;

impl MockModel {
    const BASE_SEED: u64 = 12345;
    const MAX_INFLUENCES: usize = 5;
    const INFLUENCE_DECAY: f32 = 0.18;
}

impl ScoringModel for MockModel {
    fn score_candidates(
        &self,
        context: &[ContextNote],
        candidates: &[Pitch],
        _key: KeySignature,
    ) -> Vec<Rationale> {
        // Same request shape, same probabilities.
        let seed = Self::BASE_SEED + context.len() as u64 + candidates.len() as u64;
        let mut rng = VoiceRng::new(seed);

        candidates
            .iter()
            .map(|&candidate| {
                let influences = context
                    .iter()
                    .rev()
                    .take(Self::MAX_INFLUENCES)
                    .enumerate()
                    .map(|(rank, note)| Influence {
                        pitch: note.pitch,
                        start_sec: note.start_sec,
                        end_sec: note.end_sec,
                        weight: (1.0 - rank as f32 * Self::INFLUENCE_DECAY).max(0.0),
                    })
                    .collect();
                Rationale {
                    candidate_pitch: candidate,
                    probability: rng.range_f32(0.05, 0.95),
                    summary: "Mock: favors recent context and diatonic steps.".to_string(),
                    detail: String::new(),
                    influences,
                    triggered_rules: Vec::new(),
                }
            })
            .collect()
    }
}
