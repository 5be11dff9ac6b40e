// Explanation engine: builds a displayable rationale for a generated pitch.
//
// Combines three sources:
// - Rule outcomes from `RuleChecker::evaluate` over the caller's history.
// - Model probability and influences for the chosen pitch, requested
//   alongside a fixed set of neighbouring consonances and fourths.
// - Occlusion: each of the most recent context notes is masked in turn and
//   the candidate re-scored; the probability drop is added to that note's
//   influence weight. Black-box, so it works with any `ScoringModel`.
//
// Holds no note state. Every call reads only the history and context it is
// given.

use crate::engine::NotePair;
use crate::interval::Pitch;
use crate::model::{ContextNote, KeySignature, Rationale, ScoringModel};
use crate::rules::{RuleChecker, Violation};
use std::sync::Arc;

/// Offsets around the input pitch offered to the model on every explanation.
pub const CANDIDATE_OFFSETS: [i16; 10] = [-9, -8, -5, -4, -3, 3, 4, 5, 8, 9];

pub fn candidate_set(input: Pitch) -> Vec<Pitch> {
    CANDIDATE_OFFSETS.iter().map(|&o| input + o).collect()
}

pub struct ExplanationEngine {
    rules: RuleChecker,
    model: Arc<dyn ScoringModel>,
    occlusion_window: usize,
    neutral_probability: f32,
}

impl ExplanationEngine {
    pub fn new(rules: RuleChecker, model: Arc<dyn ScoringModel>, occlusion_window: usize) -> Self {
        ExplanationEngine {
            rules,
            model,
            occlusion_window,
            neutral_probability: 0.5,
        }
    }

    /// Probability used when the model returns nothing.
    pub fn with_neutral_probability(mut self, probability: f32) -> Self {
        self.neutral_probability = probability;
        self
    }

    /// Rule outcomes alone, for tutor-style display.
    pub fn evaluate_rules(
        &self,
        history: &[NotePair],
        input: Pitch,
        generated: Pitch,
        now: f64,
        in_phrase: bool,
    ) -> Vec<Violation> {
        self.rules.evaluate(history, input, generated, now, in_phrase)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn explain_choice(
        &self,
        history: &[NotePair],
        context: &[ContextNote],
        input: Pitch,
        generated: Pitch,
        key: KeySignature,
        now: f64,
        in_phrase: bool,
    ) -> Rationale {
        let violations = self.rules.evaluate(history, input, generated, now, in_phrase);

        let mut candidates = candidate_set(input);
        if !candidates.contains(&generated) {
            candidates.push(generated);
        }
        let scored = self.model.score_candidates(context, &candidates, key);
        let mut chosen = scored
            .iter()
            .find(|r| r.candidate_pitch == generated)
            .or_else(|| scored.first())
            .cloned()
            .unwrap_or_else(|| Rationale::neutral(generated, self.neutral_probability));

        chosen.summary = format!(
            "Model favors consonant contrary motion; context length={}",
            context.len()
        );
        chosen.detail = "Top influences are most recent notes; diatonic bias applied.".to_string();
        chosen.triggered_rules.extend(violations);

        self.refine_by_occlusion(context, &mut chosen, key);
        chosen
    }

    /// Mask each of the last `occlusion_window` context notes and credit the
    /// probability drop to the matching influence. Weights stay in [0, 1].
    pub fn refine_by_occlusion(
        &self,
        context: &[ContextNote],
        rationale: &mut Rationale,
        key: KeySignature,
    ) {
        if context.len() < 2 {
            return;
        }

        let candidate = [rationale.candidate_pitch];
        let masked_count = self.occlusion_window.min(context.len());
        for k in 0..masked_count {
            let idx = context.len() - 1 - k;
            let erased = context[idx];
            let masked: Vec<ContextNote> = context
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != idx)
                .map(|(_, n)| *n)
                .collect();

            let rescored = self.model.score_candidates(&masked, &candidate, key);
            let Some(masked_probability) = rescored
                .iter()
                .find(|r| r.candidate_pitch == rationale.candidate_pitch)
                .or_else(|| rescored.first())
                .map(|r| r.probability)
            else {
                continue;
            };

            let delta = rationale.probability - masked_probability;
            if let Some(inf) = rationale.influences.iter_mut().find(|inf| inf.refers_to(&erased)) {
                inf.weight = (inf.weight + delta).clamp(0.0, 1.0);
            }
        }
    }
}
