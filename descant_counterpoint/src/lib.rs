// Descant: a real-time counterpoint voice for a live monophonic line.
//
// Each incoming note-on gets a generated second-voice pitch chosen by a
// bounded constrained-random search over consonant intervals, and every
// choice can be explained: rule outcomes, model probability, and which
// recent notes mattered most.
//
// Architecture:
// - interval.rs: Semitone classifiers (consonant, perfect, tritone, names)
// - config.rs: JSON-loadable engine/session tunables and rule weights
// - rules.rs: Rule checker (dissonance, parallel/hidden perfects, phrase end)
// - model.rs: Scoring model boundary (`ScoringModel`) and deterministic mock
// - engine.rs: Counterpoint generation, note pairing, alternative suggestion
// - explain.rs: Rationale building and occlusion-based influence refinement
// - session.rs: Note-event routing (generator and tutor modes), watchdog
// - journal.rs: JSON-lines record of rationales and violations
//
// Single-threaded by construction: callers serialize note events through one
// `Session` (or one `CounterpointEngine`).

pub mod config;
pub mod engine;
pub mod explain;
pub mod interval;
pub mod journal;
pub mod model;
pub mod rules;
pub mod session;
