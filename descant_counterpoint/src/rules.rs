// Rule checker: classifies an (input, generated) pair against recent history.
//
// Two evaluation flavours share the same checks:
//
// - `evaluate` (phrase-aware, feeds explanations): dissonance, parallel
//   perfects, hidden perfects, and the phrase-ending rule. Returns only the
//   violations that fired, possibly none.
// - `evaluate_interval` (status report, feeds the tutor display and
//   `evaluate_score`): always leads with one entry describing the current
//   interval, either `Consonance` (severity 0) or `DissonanceOnStrongBeat`,
//   followed by any parallel-perfect violation.
//
// History is the slice of pairs *before* the candidate; motion is measured
// from `history.last()`. The checker is stateless apart from its weights.
//
// See also: `interval.rs` for the classifiers, `config.rs` for `RuleWeights`.

use crate::config::RuleWeights;
use crate::engine::NotePair;
use crate::interval::{self, Pitch};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    ParallelFifth,
    ParallelOctave,
    DissonanceOnStrongBeat,
    HiddenFifthOctave,
    /// Informational status entry, not a fault.
    Consonance,
    /// Generic rule, currently the phrase-ending requirement.
    Other,
}

impl ViolationKind {
    /// Short label for analysis text.
    pub fn label(self) -> &'static str {
        match self {
            ViolationKind::ParallelFifth => "Parallel 5th",
            ViolationKind::ParallelOctave => "Parallel octave",
            ViolationKind::DissonanceOnStrongBeat => "Dissonance",
            ViolationKind::HiddenFifthOctave => "Hidden fifth/octave",
            ViolationKind::Consonance => "Consonance",
            ViolationKind::Other => "Rule violation",
        }
    }

    /// True for kinds that represent an actual fault.
    pub fn is_fault(self) -> bool {
        self != ViolationKind::Consonance
    }
}

/// One rule outcome. Built fresh per evaluation and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    /// 0 for informational entries, 1 for hard faults.
    pub severity: f32,
    pub input_pitch: Pitch,
    pub generated_pitch: Pitch,
    /// Generated pitch of the preceding pair, for motion-based rules.
    pub previous_generated: Option<Pitch>,
    pub time: f64,
    pub description: String,
    pub suggestion: String,
    pub weight: f32,
}

#[derive(Clone, Debug, Default)]
pub struct RuleChecker {
    weights: RuleWeights,
}

impl RuleChecker {
    pub fn new(weights: RuleWeights) -> Self {
        RuleChecker { weights }
    }

    pub fn weights(&self) -> &RuleWeights {
        &self.weights
    }

    /// Phrase-aware evaluation. `in_phrase = false` enables the
    /// phrase-ending rule once history is long enough.
    pub fn evaluate(
        &self,
        history: &[NotePair],
        input: Pitch,
        generated: Pitch,
        now: f64,
        in_phrase: bool,
    ) -> Vec<Violation> {
        let mut out = Vec::new();
        let current = interval::semitones(input, generated);

        if !interval::is_consonant(current) {
            out.push(self.dissonance(input, generated, now, self.weights.dissonance));
        }

        if let Some(prev) = history.last() {
            out.extend(self.parallel_perfect(prev, input, generated, now));

            let prev_interval = prev.interval();
            let dir_in = interval::motion(prev.input_pitch, input);
            let dir_gen = interval::motion(prev.generated_pitch, generated);
            if !interval::is_perfect(prev_interval)
                && interval::is_perfect(current)
                && dir_in == dir_gen
                && dir_in != 0
            {
                out.push(Violation {
                    kind: ViolationKind::HiddenFifthOctave,
                    severity: 1.0,
                    input_pitch: input,
                    generated_pitch: generated,
                    previous_generated: Some(prev.generated_pitch),
                    time: now,
                    description: format!(
                        "Hidden/direct motion to perfect interval: {} → {}.",
                        interval::name(prev_interval.into()),
                        interval::name(current.into())
                    ),
                    suggestion:
                        "Avoid approaching perfect intervals in similar motion; use contrary motion."
                            .to_string(),
                    weight: self.weights.hidden_perfect,
                });
            }
        }

        if !in_phrase
            && history.len() > self.weights.phrase_end_min_history
            && !interval::is_perfect(current)
        {
            out.push(Violation {
                kind: ViolationKind::Other,
                severity: 1.0,
                input_pitch: input,
                generated_pitch: generated,
                previous_generated: history.last().map(|p| p.generated_pitch),
                time: now,
                description: "Final sonority should be perfect (unison, fifth, or octave)."
                    .to_string(),
                suggestion: "End on a perfect consonance.".to_string(),
                weight: self.weights.phrase_ending,
            });
        }

        out
    }

    /// Status evaluation. The first entry always reports the current
    /// interval, so the result is never empty.
    pub fn evaluate_interval(
        &self,
        history: &[NotePair],
        input: Pitch,
        generated: Pitch,
        now: f64,
    ) -> Vec<Violation> {
        let mut out = Vec::with_capacity(2);
        let current = interval::semitones(input, generated);

        if interval::is_consonant(current) {
            out.push(Violation {
                kind: ViolationKind::Consonance,
                severity: 0.0,
                input_pitch: input,
                generated_pitch: generated,
                previous_generated: None,
                time: now,
                description: format!(
                    "Consonant interval: {} is acceptable.",
                    interval::name(current.into())
                ),
                suggestion: String::new(),
                weight: 0.0,
            });
        } else {
            out.push(self.dissonance(input, generated, now, self.weights.dissonance_status));
        }

        if let Some(prev) = history.last() {
            out.extend(self.parallel_perfect(prev, input, generated, now));
        }

        out
    }

    /// `1 - severity_cost * Σ severity` over `evaluate_interval`, clamped to [0, 1].
    pub fn evaluate_score(
        &self,
        history: &[NotePair],
        input: Pitch,
        generated: Pitch,
        now: f64,
    ) -> f32 {
        let violations = self.evaluate_interval(history, input, generated, now);
        score_from(&violations, self.weights.severity_cost)
    }

    pub fn interval_name(&self, semitones: i32) -> &'static str {
        interval::name(semitones)
    }

    fn dissonance(&self, input: Pitch, generated: Pitch, now: f64, weight: f32) -> Violation {
        let name = interval::name(interval::semitones(input, generated).into());
        Violation {
            kind: ViolationKind::DissonanceOnStrongBeat,
            severity: 1.0,
            input_pitch: input,
            generated_pitch: generated,
            previous_generated: None,
            time: now,
            description: format!("Dissonant interval: {name} is not allowed in strict counterpoint."),
            suggestion: "Use consonant intervals: unison, 3rd, 5th, 6th, or octave.".to_string(),
            weight,
        }
    }

    /// Perfect interval to perfect interval with both voices moving the same way.
    fn parallel_perfect(
        &self,
        prev: &NotePair,
        input: Pitch,
        generated: Pitch,
        now: f64,
    ) -> Option<Violation> {
        let prev_class = interval::class(prev.interval());
        let curr_class = interval::class(interval::semitones(input, generated));
        let dir_in = interval::motion(prev.input_pitch, input);
        let dir_gen = interval::motion(prev.generated_pitch, generated);

        let both_perfect = matches!(prev_class, 0 | 7) && matches!(curr_class, 0 | 7);
        if !both_perfect || dir_in != dir_gen || dir_in == 0 {
            return None;
        }

        let kind = if prev_class == 0 && curr_class == 0 {
            ViolationKind::ParallelOctave
        } else {
            ViolationKind::ParallelFifth
        };
        Some(Violation {
            kind,
            severity: 1.0,
            input_pitch: input,
            generated_pitch: generated,
            previous_generated: Some(prev.generated_pitch),
            time: now,
            description: format!(
                "Parallel motion between perfect intervals: {} → {}.",
                interval::name(prev_class.into()),
                interval::name(curr_class.into())
            ),
            suggestion: "Avoid parallel 5ths/8ves; use contrary or oblique motion instead."
                .to_string(),
            weight: self.weights.parallel_perfect,
        })
    }
}

/// Aggregate consonance score for a set of violations.
pub fn score_from(violations: &[Violation], severity_cost: f32) -> f32 {
    let penalty: f32 = violations.iter().map(|v| severity_cost * v.severity).sum();
    (1.0 - penalty).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(input: Pitch, generated: Pitch, t: f64) -> NotePair {
        NotePair::new(input, generated, t)
    }

    fn kinds(v: &[Violation]) -> Vec<ViolationKind> {
        v.iter().map(|x| x.kind).collect()
    }

    #[test]
    fn test_tritone_status_is_dissonance() {
        let checker = RuleChecker::default();
        let history = vec![pair(60, 66, 0.0)];
        let out = checker.evaluate_interval(&history, 60, 66, 0.5);
        assert_eq!(out[0].kind, ViolationKind::DissonanceOnStrongBeat);
        assert_eq!(out[0].severity, 1.0);
        assert_eq!(out[0].weight, 1.0);
        assert!(out[0].description.contains("tritone"));
    }

    #[test]
    fn test_status_never_empty() {
        let checker = RuleChecker::default();
        let out = checker.evaluate_interval(&[], 60, 64, 0.0);
        assert_eq!(kinds(&out), vec![ViolationKind::Consonance]);
        assert_eq!(out[0].severity, 0.0);
        assert_eq!(out[0].weight, 0.0);
    }

    #[test]
    fn test_parallel_fifths_flagged() {
        let checker = RuleChecker::default();
        // C/G up to D/A: fifth to fifth, both voices rising.
        let history = vec![pair(60, 67, 0.0)];
        let out = checker.evaluate(&history, 62, 69, 0.5, true);
        assert_eq!(kinds(&out), vec![ViolationKind::ParallelFifth]);
        assert_eq!(out[0].weight, 0.9);
        assert_eq!(out[0].previous_generated, Some(67));

        let status = checker.evaluate_interval(&history, 62, 69, 0.5);
        assert_eq!(
            kinds(&status),
            vec![ViolationKind::Consonance, ViolationKind::ParallelFifth]
        );
    }

    #[test]
    fn test_parallel_octaves_flagged() {
        let checker = RuleChecker::default();
        let history = vec![pair(60, 72, 0.0)];
        let out = checker.evaluate(&history, 59, 71, 0.5, true);
        assert_eq!(kinds(&out), vec![ViolationKind::ParallelOctave]);
    }

    #[test]
    fn test_contrary_motion_into_fifth_is_clean() {
        let checker = RuleChecker::default();
        let history = vec![pair(60, 67, 0.0)];
        // Input falls, generated rises into an octave.
        let out = checker.evaluate(&history, 59, 71, 0.5, true);
        assert!(out.is_empty(), "got {:?}", kinds(&out));
    }

    #[test]
    fn test_static_voices_are_not_parallel() {
        let checker = RuleChecker::default();
        let history = vec![pair(60, 67, 0.0)];
        let out = checker.evaluate(&history, 60, 67, 0.5, true);
        assert!(out.is_empty());
    }

    #[test]
    fn test_hidden_fifth_flagged() {
        let checker = RuleChecker::default();
        // Major third up into a fifth by similar motion.
        let history = vec![pair(60, 64, 0.0)];
        let out = checker.evaluate(&history, 62, 69, 0.5, true);
        assert_eq!(kinds(&out), vec![ViolationKind::HiddenFifthOctave]);
        assert_eq!(out[0].weight, 0.6);
    }

    #[test]
    fn test_phrase_ending_requires_perfect_interval() {
        let checker = RuleChecker::default();
        let history: Vec<NotePair> = (0..5).map(|i| pair(60, 64, i as f64)).collect();

        let out = checker.evaluate(&history, 60, 64, 5.0, false);
        assert_eq!(kinds(&out), vec![ViolationKind::Other]);
        assert_eq!(out[0].weight, 0.5);

        assert!(checker.evaluate(&history, 60, 64, 5.0, true).is_empty());
        assert!(checker.evaluate(&history[..4], 60, 64, 5.0, false).is_empty());
        assert!(checker.evaluate(&history, 60, 72, 5.0, false).is_empty());
    }

    #[test]
    fn test_phrase_dissonance_weight() {
        let checker = RuleChecker::default();
        let out = checker.evaluate(&[], 60, 61, 0.0, true);
        assert_eq!(kinds(&out), vec![ViolationKind::DissonanceOnStrongBeat]);
        assert_eq!(out[0].weight, 0.7);
    }

    #[test]
    fn test_checks_are_independent() {
        let checker = RuleChecker::default();
        let history: Vec<NotePair> = (0..6).map(|i| pair(60, 64, i as f64)).collect();
        // Tritone after a third, outside a phrase: dissonance and phrase ending both fire.
        let out = checker.evaluate(&history, 60, 66, 6.0, false);
        assert_eq!(
            kinds(&out),
            vec![ViolationKind::DissonanceOnStrongBeat, ViolationKind::Other]
        );
    }

    #[test]
    fn test_score_decreases_with_severity() {
        let checker = RuleChecker::default();
        let history = vec![pair(60, 67, 0.0)];

        let clean = checker.evaluate_score(&[], 60, 64, 0.0);
        let dissonant = checker.evaluate_score(&[], 60, 66, 0.0);
        let parallel = checker.evaluate_score(&history, 62, 69, 0.5);
        assert!((clean - 1.0).abs() < 1e-6);
        assert!((dissonant - 0.7).abs() < 1e-6);
        assert!((parallel - 0.7).abs() < 1e-6);

        let mut violations = Vec::new();
        let mut last = score_from(&violations, 0.3);
        for _ in 0..6 {
            violations.push(checker.dissonance(60, 61, 0.0, 1.0));
            let next = score_from(&violations, 0.3);
            assert!(next <= last);
            assert!((0.0..=1.0).contains(&next));
            last = next;
        }
        assert_eq!(last, 0.0);
    }

    #[test]
    fn test_interval_name_delegates() {
        let checker = RuleChecker::default();
        assert_eq!(checker.interval_name(7), "perfect 5th");
        assert_eq!(checker.interval_name(7 + 24), "perfect 5th");
    }
}
