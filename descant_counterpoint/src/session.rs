// Session: routes note events to the engine and collects what flows out.
//
// The session is the single delivery path for note events. It owns the
// engine, the explanation engine, and the caller-side windows the engine does
// not keep itself:
// - `display_history`: a longer (input, generated) record for rule display
//   and explanations. Independent of the engine's short motion lookback.
// - `context`: the notes the scoring model may see, with onset and release
//   times.
//
// Two modes:
// - Generator: every note-on produces a generated note-on plus a rationale;
//   the matching note-off releases it. A re-triggered input first releases
//   its stale generated pitch.
// - Tutor: nothing is generated. When exactly two input notes are held, the
//   lower is treated as the input voice and the upper as the second voice,
//   and the interval is checked against the display history.
//
// `tick` is a stuck-note watchdog for hosts that drop note-offs.

use crate::config::SessionConfig;
use crate::engine::{CounterpointEngine, NotePair};
use crate::explain::ExplanationEngine;
use crate::interval::{self, Pitch};
use crate::model::{ContextNote, Rationale, ScoringModel};
use crate::rules::{Violation, ViolationKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Generator,
    Tutor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteEventKind {
    On,
    Off,
}

/// Inbound note event from the MIDI delivery path. Pitches are assumed to be
/// valid MIDI numbers; the delivery path is responsible for that.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    pub pitch: u8,
    pub velocity: f32,
    /// Seconds on the caller's clock.
    pub time: f64,
}

impl NoteEvent {
    pub fn on(pitch: u8, velocity: f32, time: f64) -> Self {
        NoteEvent {
            kind: NoteEventKind::On,
            pitch,
            velocity,
            time,
        }
    }

    pub fn off(pitch: u8, time: f64) -> Self {
        NoteEvent {
            kind: NoteEventKind::Off,
            pitch,
            velocity: 0.0,
            time,
        }
    }
}

/// Outbound generated-voice message for the audio and display collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum OutboundNote {
    On { pitch: u8, velocity: f32 },
    Off { pitch: u8 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub text: String,
    pub has_violation: bool,
    pub violations: Vec<Violation>,
    pub rationale: Option<Rationale>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Response {
    pub notes: Vec<OutboundNote>,
    pub analysis: Option<Analysis>,
}

pub struct Session {
    config: SessionConfig,
    mode: Mode,
    engine: CounterpointEngine,
    explainer: ExplanationEngine,
    display_history: VecDeque<NotePair>,
    context: VecDeque<ContextNote>,
    held: BTreeSet<Pitch>,
    in_phrase: bool,
    last_note_on: f64,
}

impl Session {
    /// Start in generator mode. One model instance serves both the engine
    /// and the explanation engine.
    pub fn new(config: SessionConfig, model: Arc<dyn ScoringModel>) -> Self {
        let seed = config.seed.unwrap_or_else(clock_seed);
        let mut engine = CounterpointEngine::new(config.engine.clone(), Arc::clone(&model), seed);
        engine.set_key(config.key);
        let explainer =
            ExplanationEngine::new(engine.rules().clone(), model, config.occlusion_window)
                .with_neutral_probability(config.engine.neutral_probability);
        log::info!("session started (seed {seed})");

        Session {
            display_history: VecDeque::with_capacity(config.display_history_capacity + 1),
            context: VecDeque::with_capacity(config.context_capacity + 1),
            config,
            mode: Mode::Generator,
            engine,
            explainer,
            held: BTreeSet::new(),
            in_phrase: false,
            last_note_on: 0.0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switch modes. Leaving generator mode releases any generated notes
    /// that are still sounding.
    pub fn set_mode(&mut self, mode: Mode) -> Vec<OutboundNote> {
        if mode == self.mode {
            return Vec::new();
        }
        log::info!("mode {:?} -> {:?}", self.mode, mode);
        let released = if self.mode == Mode::Generator {
            note_offs(self.engine.release_all())
        } else {
            Vec::new()
        };
        self.held.clear();
        self.mode = mode;
        released
    }

    pub fn set_generate_above(&mut self, above: bool) {
        self.engine.set_generate_above(above);
    }

    pub fn in_phrase(&self) -> bool {
        self.in_phrase
    }

    pub fn set_in_phrase(&mut self, in_phrase: bool) {
        self.in_phrase = in_phrase;
    }

    pub fn engine(&self) -> &CounterpointEngine {
        &self.engine
    }

    pub fn display_history(&self) -> &VecDeque<NotePair> {
        &self.display_history
    }

    pub fn context(&self) -> &VecDeque<ContextNote> {
        &self.context
    }

    pub fn handle(&mut self, event: NoteEvent) -> Response {
        let pitch = Pitch::from(event.pitch);
        match (event.kind, self.mode) {
            (NoteEventKind::On, Mode::Generator) => self.generate(pitch, event.velocity, event.time),
            (NoteEventKind::On, Mode::Tutor) => self.tutor_note_on(pitch, event.time),
            (NoteEventKind::Off, Mode::Generator) => {
                self.close_context_note(pitch, event.time);
                let notes = self
                    .engine
                    .note_off_for_input(pitch)
                    .map(|p| vec![OutboundNote::Off { pitch: to_midi(p) }])
                    .unwrap_or_default();
                Response {
                    notes,
                    analysis: None,
                }
            }
            (NoteEventKind::Off, Mode::Tutor) => {
                self.close_context_note(pitch, event.time);
                self.held.remove(&pitch);
                Response::default()
            }
        }
    }

    /// Clear everything learned in the current phrase and release all
    /// sounding generated notes.
    pub fn reset_phrase(&mut self) -> Vec<OutboundNote> {
        log::info!("phrase reset");
        self.display_history.clear();
        self.context.clear();
        self.held.clear();
        self.in_phrase = false;
        note_offs(self.engine.reset())
    }

    /// Release all generated notes if no note-on arrived within the
    /// stuck-note timeout. Restarts the timer when it fires.
    pub fn tick(&mut self, now: f64) -> Vec<OutboundNote> {
        if now - self.last_note_on <= self.config.stuck_note_timeout_secs {
            return Vec::new();
        }
        self.last_note_on = now;
        let released = self.engine.release_all();
        if !released.is_empty() {
            log::warn!("releasing {} stuck generated note(s)", released.len());
        }
        note_offs(released)
    }

    fn generate(&mut self, input: Pitch, velocity: f32, now: f64) -> Response {
        self.last_note_on = now;
        self.push_context(input, now);

        let generated = self.engine.generate_counterpoint(input, velocity, now);
        let mut notes = Vec::with_capacity(2);
        if let Some(stale) = generated.displaced {
            notes.push(OutboundNote::Off { pitch: to_midi(stale) });
        }
        notes.push(OutboundNote::On {
            pitch: to_midi(generated.pitch),
            velocity,
        });

        let history: Vec<NotePair> = self.display_history.iter().copied().collect();
        let context: Vec<ContextNote> = self.context.iter().copied().collect();
        let rationale = self.explainer.explain_choice(
            &history,
            &context,
            input,
            generated.pitch,
            self.config.key,
            now,
            self.in_phrase,
        );
        self.push_display(NotePair::new(input, generated.pitch, now));

        let has_violation = rationale
            .triggered_rules
            .iter()
            .any(|v| v.kind.is_fault() && v.kind != ViolationKind::Other);
        let text = format!(
            "Current interval: {}",
            interval::name(interval::semitones(input, generated.pitch).into())
        );

        Response {
            notes,
            analysis: Some(Analysis {
                text,
                has_violation,
                violations: rationale.triggered_rules.clone(),
                rationale: Some(rationale),
            }),
        }
    }

    fn tutor_note_on(&mut self, pitch: Pitch, now: f64) -> Response {
        self.last_note_on = now;
        self.push_context(pitch, now);
        self.held.insert(pitch);
        if self.held.len() != 2 {
            return Response::default();
        }

        let (Some(&lower), Some(&upper)) = (self.held.first(), self.held.last()) else {
            return Response::default();
        };
        let history: Vec<NotePair> = self.display_history.iter().copied().collect();
        let violations = self.engine.rules().evaluate_interval(&history, lower, upper, now);
        self.push_display(NotePair::new(lower, upper, now));

        let current = format!(
            "Current interval: {}\n",
            interval::name(interval::semitones(lower, upper).into())
        );
        let has_violation = violations
            .iter()
            .any(|v| v.kind.is_fault() && v.kind != ViolationKind::Other);
        let text = if has_violation {
            let label = violations
                .iter()
                .find(|v| v.kind.is_fault())
                .map_or("Rule violation", |v| v.kind.label());
            format!("Violations detected: {label}\n{current}")
        } else {
            current
        };

        Response {
            notes: Vec::new(),
            analysis: Some(Analysis {
                text,
                has_violation,
                violations,
                rationale: None,
            }),
        }
    }

    fn push_display(&mut self, pair: NotePair) {
        self.display_history.push_back(pair);
        while self.display_history.len() > self.config.display_history_capacity {
            self.display_history.pop_front();
        }
    }

    fn push_context(&mut self, pitch: Pitch, now: f64) {
        self.context.push_back(ContextNote {
            pitch,
            start_sec: now,
            end_sec: now,
        });
        while self.context.len() > self.config.context_capacity {
            self.context.pop_front();
        }
    }

    /// Set the release time of the most recent still-open note at `pitch`.
    fn close_context_note(&mut self, pitch: Pitch, now: f64) {
        if let Some(note) = self
            .context
            .iter_mut()
            .rev()
            .find(|n| n.pitch == pitch && n.end_sec == n.start_sec)
        {
            note.end_sec = now.max(note.start_sec);
        }
    }
}

fn to_midi(pitch: Pitch) -> u8 {
    pitch.clamp(0, 127) as u8
}

fn note_offs(pitches: Vec<Pitch>) -> Vec<OutboundNote> {
    pitches
        .into_iter()
        .map(|p| OutboundNote::Off { pitch: to_midi(p) })
        .collect()
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockModel;

    fn session() -> Session {
        let config = SessionConfig {
            seed: Some(42),
            ..SessionConfig::default()
        };
        Session::new(config, Arc::new(MockModel))
    }

    fn generated_on(resp: &Response) -> u8 {
        resp.notes
            .iter()
            .find_map(|n| match n {
                OutboundNote::On { pitch, .. } => Some(*pitch),
                OutboundNote::Off { .. } => None,
            })
            .expect("generator note-on emits a note")
    }

    #[test]
    fn test_session_can_move_to_delivery_thread() {
        fn assert_send<T: Send>() {}
        assert_send::<Session>();
        assert_send::<CounterpointEngine>();
        assert_send::<ExplanationEngine>();

        let mut s = session();
        let pitch = std::thread::spawn(move || {
            let resp = s.handle(NoteEvent::on(60, 100.0, 0.0));
            generated_on(&resp)
        })
        .join()
        .unwrap();
        assert!((36..=84).contains(&pitch));
    }

    #[test]
    fn test_generator_round_trip() {
        let mut s = session();
        let on = s.handle(NoteEvent::on(60, 100.0, 0.0));
        let pitch = generated_on(&on);
        let analysis = on.analysis.unwrap();
        assert!(analysis.text.starts_with("Current interval: "));
        assert_eq!(analysis.rationale.unwrap().candidate_pitch, Pitch::from(pitch));

        let off = s.handle(NoteEvent::off(60, 0.4));
        assert_eq!(off.notes, vec![OutboundNote::Off { pitch }]);
        assert_eq!(s.context()[0].end_sec, 0.4);

        // Stray note-off: nothing to release.
        let stray = s.handle(NoteEvent::off(60, 0.5));
        assert!(stray.notes.is_empty());
    }

    #[test]
    fn test_retrigger_releases_stale_note_first() {
        let mut s = session();
        let first = generated_on(&s.handle(NoteEvent::on(60, 100.0, 0.0)));
        let again = s.handle(NoteEvent::on(60, 100.0, 0.5));
        assert_eq!(again.notes[0], OutboundNote::Off { pitch: first });
        assert!(matches!(again.notes[1], OutboundNote::On { .. }));
    }

    #[test]
    fn test_tutor_flags_parallel_fifths() {
        let mut s = session();
        s.set_mode(Mode::Tutor);

        assert!(s.handle(NoteEvent::on(60, 90.0, 0.0)).analysis.is_none());
        let first = s.handle(NoteEvent::on(67, 90.0, 0.1)).analysis.unwrap();
        assert!(!first.has_violation);
        assert_eq!(first.text, "Current interval: perfect 5th\n");

        s.handle(NoteEvent::off(60, 0.5));
        s.handle(NoteEvent::off(67, 0.5));
        s.handle(NoteEvent::on(62, 90.0, 1.0));
        let second = s.handle(NoteEvent::on(69, 90.0, 1.1));
        let analysis = second.analysis.unwrap();
        assert!(second.notes.is_empty());
        assert!(analysis.has_violation);
        assert_eq!(
            analysis.text,
            "Violations detected: Parallel 5th\nCurrent interval: perfect 5th\n"
        );
        assert_eq!(s.display_history().len(), 2);
    }

    #[test]
    fn test_tutor_reports_dissonance() {
        let mut s = session();
        s.set_mode(Mode::Tutor);
        s.handle(NoteEvent::on(60, 90.0, 0.0));
        let analysis = s.handle(NoteEvent::on(66, 90.0, 0.0)).analysis.unwrap();
        assert!(analysis.text.starts_with("Violations detected: Dissonance\n"));
        assert!(analysis.text.ends_with("Current interval: tritone\n"));
    }

    #[test]
    fn test_leaving_generator_releases_notes() {
        let mut s = session();
        let pitch = generated_on(&s.handle(NoteEvent::on(60, 100.0, 0.0)));
        assert_eq!(s.set_mode(Mode::Tutor), vec![OutboundNote::Off { pitch }]);
        assert!(s.set_mode(Mode::Tutor).is_empty());
    }

    #[test]
    fn test_reset_phrase_clears_state() {
        let mut s = session();
        let a = generated_on(&s.handle(NoteEvent::on(60, 100.0, 0.0)));
        let b = generated_on(&s.handle(NoteEvent::on(64, 100.0, 0.2)));
        s.set_in_phrase(true);

        let released = s.reset_phrase();
        assert_eq!(
            released,
            vec![OutboundNote::Off { pitch: a }, OutboundNote::Off { pitch: b }]
        );
        assert!(s.display_history().is_empty());
        assert!(s.context().is_empty());
        assert!(s.engine().history().is_empty());
        assert!(!s.in_phrase());
    }

    #[test]
    fn test_watchdog_releases_stuck_notes() {
        let mut s = session();
        let pitch = generated_on(&s.handle(NoteEvent::on(60, 100.0, 10.0)));
        assert!(s.tick(12.0).is_empty());
        assert_eq!(s.tick(15.5), vec![OutboundNote::Off { pitch }]);
        assert!(s.tick(16.0).is_empty());
        assert!(s.handle(NoteEvent::off(60, 16.5)).notes.is_empty());
    }

    #[test]
    fn test_windows_are_bounded() {
        let config = SessionConfig {
            seed: Some(1),
            display_history_capacity: 3,
            context_capacity: 2,
            ..SessionConfig::default()
        };
        let mut s = Session::new(config, Arc::new(MockModel));
        for (i, p) in [60u8, 62, 64, 65, 67].into_iter().enumerate() {
            let t = i as f64;
            s.handle(NoteEvent::on(p, 100.0, t));
            s.handle(NoteEvent::off(p, t + 0.5));
        }
        assert_eq!(s.display_history().len(), 3);
        let ctx: Vec<Pitch> = s.context().iter().map(|n| n.pitch).collect();
        assert_eq!(ctx, vec![65, 67]);
        assert!(s.context().iter().all(|n| n.end_sec > n.start_sec));
    }
}
