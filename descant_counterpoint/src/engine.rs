// Counterpoint engine: turns each incoming note into a generated second voice.
//
// The engine owns two pieces of state:
// - `history`: a bounded FIFO of (input, generated, timestamp) pairs. The
//   previous pair for motion checks is always read from its tail, so there is
//   no separate "last note" bookkeeping to drift out of sync.
// - `active`: input pitch → generated pitch for notes still sounding.
//
// Generation is a bounded constrained-random search:
//   1. Draw a consonant interval from the weighted table and place it on the
//      configured side of the input (octave-folded or flipped if it leaves the
//      candidate window).
//   2. Reject tritones and parallel fifths/octaves against the previous pair.
//   3. After `max_attempts` draws the last candidate is kept regardless.
//   4. Enforce minimum separation, clamp to the output window, and replace a
//      surviving tritone with a third.
//
// All calls are synchronous and single-threaded; the caller serializes note
// events. Randomness comes from an owned `VoiceRng`, so a seed fixes the line.
//
// See also: `rules.rs` (scores alternatives), `model.rs` (scoring model
// handle), `session.rs` (routes note events here).

use crate::config::EngineConfig;
use crate::interval::{self, Pitch};
use crate::model::{KeySignature, ScoringModel};
use crate::rules::RuleChecker;
use descant_prng::VoiceRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// One recorded note-on: what came in, what was generated, and when.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotePair {
    pub input_pitch: Pitch,
    pub generated_pitch: Pitch,
    pub timestamp: f64,
}

impl NotePair {
    pub fn new(input_pitch: Pitch, generated_pitch: Pitch, timestamp: f64) -> Self {
        NotePair {
            input_pitch,
            generated_pitch,
            timestamp,
        }
    }

    /// Signed distance from input to generated pitch.
    pub fn interval(&self) -> i16 {
        interval::semitones(self.input_pitch, self.generated_pitch)
    }
}

/// Preferred melodic direction for the generated voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Motion {
    Up,
    Down,
}

/// Result of one `generate_counterpoint` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Generated {
    pub pitch: Pitch,
    pub velocity: f32,
    /// Generated pitch that was still sounding for the same input pitch and
    /// has been dropped from the active map. The caller must release it.
    pub displaced: Option<Pitch>,
    /// Draws used, 1..=max_attempts.
    pub attempts: u32,
    /// False when the attempt budget ran out without a rule-valid draw.
    pub accepted: bool,
    /// Contrary to the input's motion, or a coin flip when it did not move.
    pub motion: Motion,
}

/// Outcome of the bounded search, before bookkeeping.
#[derive(Clone, Copy, Debug)]
struct Search {
    pitch: Pitch,
    attempts: u32,
    accepted: bool,
    motion: Motion,
}

pub struct CounterpointEngine {
    config: EngineConfig,
    rules: RuleChecker,
    model: Arc<dyn ScoringModel>,
    rng: VoiceRng,
    history: VecDeque<NotePair>,
    active: BTreeMap<Pitch, Pitch>,
    generate_above: bool,
    key: KeySignature,
}

impl CounterpointEngine {
    pub fn new(config: EngineConfig, model: Arc<dyn ScoringModel>, seed: u64) -> Self {
        let rules = RuleChecker::new(config.rules.clone());
        let history = VecDeque::with_capacity(config.history_capacity + 1);
        CounterpointEngine {
            config,
            rules,
            model,
            rng: VoiceRng::new(seed),
            history,
            active: BTreeMap::new(),
            generate_above: true,
            key: KeySignature::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleChecker {
        &self.rules
    }

    pub fn history(&self) -> &VecDeque<NotePair> {
        &self.history
    }

    pub fn last_pair(&self) -> Option<&NotePair> {
        self.history.back()
    }

    /// Currently sounding input → generated pitches.
    pub fn active_pairs(&self) -> &BTreeMap<Pitch, Pitch> {
        &self.active
    }

    pub fn generate_above(&self) -> bool {
        self.generate_above
    }

    /// Takes effect on the next generation call.
    pub fn set_generate_above(&mut self, above: bool) {
        self.generate_above = above;
    }

    pub fn set_key(&mut self, key: KeySignature) {
        self.key = key;
    }

    /// Generate the counterpoint pitch for a note-on and record it.
    pub fn generate_counterpoint(&mut self, input: Pitch, velocity: f32, now: f64) -> Generated {
        let displaced = self.active.remove(&input);
        if let Some(stale) = displaced {
            log::debug!("input {input} re-triggered while {stale} still sounding; releasing {stale}");
        }

        let search = self.generate_valid_counterpoint(input);

        self.history.push_back(NotePair::new(input, search.pitch, now));
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
        self.active.insert(input, search.pitch);

        log::debug!(
            "generated counterpoint: input={input} -> {} ({}, {} attempt(s), {} active)",
            search.pitch,
            interval::name(interval::semitones(input, search.pitch).into()),
            search.attempts,
            self.active.len()
        );

        Generated {
            pitch: search.pitch,
            velocity,
            displaced,
            attempts: search.attempts,
            accepted: search.accepted,
            motion: search.motion,
        }
    }

    /// Release the generated pitch paired with `input`. `None` means there
    /// was no mapping (stray note-off), which is not an error.
    pub fn note_off_for_input(&mut self, input: Pitch) -> Option<Pitch> {
        let released = self.active.remove(&input);
        if released.is_none() {
            log::debug!("note-off for {input} has no active pairing");
        }
        released
    }

    /// Drop every active pairing, returning the generated pitches to release.
    /// History is kept.
    pub fn release_all(&mut self) -> Vec<Pitch> {
        std::mem::take(&mut self.active).into_values().collect()
    }

    /// Clear history and active pairings, returning the pitches to release.
    pub fn reset(&mut self) -> Vec<Pitch> {
        self.history.clear();
        self.release_all()
    }

    /// Pick a replacement when `rejected` cannot be used.
    ///
    /// Candidates are the alternative-interval pitches on both sides of the
    /// input plus stepwise neighbours of the last generated pitch. Each is
    /// scored `rule score × model probability × base weight`; the first
    /// maximum wins. Falls back to `input` when nothing qualifies.
    pub fn suggest_alternative_note(&self, input: Pitch, rejected: Pitch, now: f64) -> Pitch {
        let range = self.config.candidate_range;
        let mut candidates: Vec<(Pitch, f32)> = Vec::new();

        for entry in &self.config.alternative_intervals {
            for pitch in [input + entry.semitones, input - entry.semitones] {
                if range.contains(pitch) {
                    candidates.push((pitch, entry.weight));
                }
            }
        }

        if let Some(last) = self.history.back() {
            for step in 1..=2 {
                for pitch in [last.generated_pitch + step, last.generated_pitch - step] {
                    if range.contains(pitch) {
                        candidates.push((pitch, self.config.step_neighbor_weight));
                    }
                }
            }
        }

        let history: Vec<NotePair> = self.history.iter().copied().collect();
        let mut best = input;
        let mut best_score = -1.0f32;

        for (pitch, base_weight) in candidates {
            if pitch == rejected || interval::is_tritone(interval::semitones(input, pitch)) {
                continue;
            }
            let rule_score = self.rules.evaluate_score(&history, input, pitch, now);
            let probability = self.model_probability(pitch);
            let combined = rule_score * probability * base_weight;
            if combined > best_score {
                best_score = combined;
                best = pitch;
            }
        }

        log::debug!("suggested alternative for {input} (rejected {rejected}): {best} (score {best_score:.3})");
        best
    }

    fn model_probability(&self, pitch: Pitch) -> f32 {
        let scored = self.model.score_candidates(&[], &[pitch], self.key);
        scored
            .iter()
            .find(|r| r.candidate_pitch == pitch)
            .or_else(|| scored.first())
            .map_or(self.config.neutral_probability, |r| r.probability)
    }

    fn generate_valid_counterpoint(&mut self, input: Pitch) -> Search {
        let previous = self.history.back().copied();
        let motion = self.preferred_motion(previous, input);
        let weights: Vec<f32> = self.config.intervals.iter().map(|e| e.weight).collect();

        let mut candidate = input;
        let mut attempts = 0;
        let mut accepted = false;

        while attempts < self.config.max_attempts {
            attempts += 1;
            let size = self.draw_interval(&weights);
            candidate = self.place(input, size);

            if interval::is_tritone(interval::semitones(input, candidate)) {
                log::debug!("tritone {input}/{candidate}, retrying (attempt {attempts})");
                continue;
            }
            if previous.is_some_and(|prev| repeats_parallel_perfect(&prev, input, candidate)) {
                log::debug!("parallel perfect {input}/{candidate}, retrying (attempt {attempts})");
                continue;
            }
            accepted = true;
            break;
        }

        if !accepted {
            log::warn!(
                "no rule-valid counterpoint for {input} in {attempts} attempts; keeping {candidate}"
            );
        }

        let separated = self.separate(input, candidate);
        let mut pitch = self.config.output_range.clamp(separated);
        if pitch != separated {
            log::debug!("clamped {separated} to {pitch}");
        }
        pitch = self.resolve_tritone(input, pitch);

        Search {
            pitch,
            attempts,
            accepted,
            motion,
        }
    }

    /// Contrary to the input's motion when it moved, otherwise a coin flip.
    fn preferred_motion(&mut self, previous: Option<NotePair>, input: Pitch) -> Motion {
        match previous.map(|p| interval::motion(p.input_pitch, input)) {
            Some(1) => Motion::Down,
            Some(-1) => Motion::Up,
            _ => {
                if self.rng.coin_flip() {
                    Motion::Up
                } else {
                    Motion::Down
                }
            }
        }
    }

    fn draw_interval(&mut self, weights: &[f32]) -> i16 {
        let index = self.rng.weighted_index(weights).unwrap_or(0);
        self.config.intervals.get(index).map_or(0, |e| e.semitones)
    }

    /// Apply `size` on the configured side, folding by an octave and then
    /// flipping sides if the result leaves the candidate window.
    fn place(&self, input: Pitch, size: i16) -> Pitch {
        let range = self.config.candidate_range;
        let (toward, away) = if self.generate_above {
            (size, -size)
        } else {
            (-size, size)
        };

        let mut pitch = input + toward;
        if range.contains(pitch) {
            return pitch;
        }
        if self.generate_above && pitch > range.high {
            pitch -= 12;
        } else if !self.generate_above && pitch < range.low {
            pitch += 12;
        }
        if range.contains(pitch) {
            return pitch;
        }
        input + away
    }

    /// Keep the generated voice at least `min_separation` on its own side.
    fn separate(&self, input: Pitch, pitch: Pitch) -> Pitch {
        let gap = self.config.min_separation;
        let fallback = self.config.crossing_fallback;
        if self.generate_above && pitch - input < gap {
            log::debug!("voice crossing prevention: {pitch} pushed to {}", input + fallback);
            input + fallback
        } else if !self.generate_above && input - pitch < gap {
            log::debug!("voice crossing prevention: {pitch} pushed to {}", input - fallback);
            input - fallback
        } else {
            pitch
        }
    }

    /// Replace a tritone surviving the clamp with a third on the configured
    /// side. When the clamp pins that third back onto a tritone, step one
    /// semitone inside the window, which lands on a fifth.
    fn resolve_tritone(&self, input: Pitch, pitch: Pitch) -> Pitch {
        if !interval::is_tritone(interval::semitones(input, pitch)) {
            return pitch;
        }
        let range = self.config.output_range;
        let third = self.config.tritone_fallback;
        let mut fixed = range.clamp(if self.generate_above {
            input + third
        } else {
            input - third
        });
        if interval::is_tritone(interval::semitones(input, fixed)) {
            fixed = if fixed >= range.high { fixed - 1 } else { fixed + 1 };
            fixed = range.clamp(fixed);
        }
        log::warn!("final tritone check failed for {input}/{pitch}; using {fixed}");
        fixed
    }
}

/// Same perfect interval class as the previous pair, reached with both
/// voices moving the same way.
fn repeats_parallel_perfect(prev: &NotePair, input: Pitch, candidate: Pitch) -> bool {
    let prev_class = interval::class(prev.interval());
    let curr_class = interval::class(interval::semitones(input, candidate));
    let dir_in = interval::motion(prev.input_pitch, input);
    let dir_gen = interval::motion(prev.generated_pitch, candidate);
    dir_in != 0 && dir_in == dir_gen && prev_class == curr_class && matches!(curr_class, 0 | 7)
}
