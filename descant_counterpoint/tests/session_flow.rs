// End-to-end flow through a session: a melody in generator mode, tutor
// dyads, stray events, and the journal, using only the public API.

use descant_counterpoint::config::SessionConfig;
use descant_counterpoint::interval;
use descant_counterpoint::journal::Journal;
use descant_counterpoint::model::MockModel;
use descant_counterpoint::rules::ViolationKind;
use descant_counterpoint::session::{Mode, NoteEvent, OutboundNote, Session};
use std::sync::Arc;

const MELODY: [u8; 12] = [60, 62, 64, 65, 67, 69, 71, 72, 71, 69, 67, 60];

fn session(seed: u64) -> Session {
    let config = SessionConfig {
        seed: Some(seed),
        ..SessionConfig::default()
    };
    Session::new(config, Arc::new(MockModel))
}

/// Replay the melody and return (input, generated) for every note.
fn play(s: &mut Session, melody: &[u8]) -> Vec<(u8, u8)> {
    let mut out = Vec::new();
    for (i, &p) in melody.iter().enumerate() {
        let t = i as f64 * 0.5;
        let on = s.handle(NoteEvent::on(p, 96.0, t));
        let generated = on
            .notes
            .iter()
            .find_map(|n| match n {
                OutboundNote::On { pitch, velocity } => {
                    assert_eq!(*velocity, 96.0);
                    Some(*pitch)
                }
                OutboundNote::Off { .. } => None,
            })
            .unwrap();
        let off = s.handle(NoteEvent::off(p, t + 0.45));
        assert_eq!(off.notes, vec![OutboundNote::Off { pitch: generated }]);
        out.push((p, generated));
    }
    out
}

#[test]
fn melody_above_stays_consonant_and_in_range() {
    for seed in 0..20 {
        let mut s = session(seed);
        for (input, generated) in play(&mut s, &MELODY) {
            assert!((36..=84).contains(&generated));
            assert!(generated > input, "seed {seed}: {generated} not above {input}");
            let iv = generated as i16 - input as i16;
            assert!(!interval::is_tritone(iv));
        }
        assert!(s.engine().active_pairs().is_empty());
        assert_eq!(s.display_history().len(), MELODY.len());
    }
}

#[test]
fn melody_below_stays_below() {
    let mut s = session(9);
    s.set_generate_above(false);
    for (input, generated) in play(&mut s, &MELODY) {
        assert!(generated < input, "{generated} not below {input}");
        assert!(input - generated >= 3);
    }
}

#[test]
fn same_seed_reproduces_the_line() {
    let a = play(&mut session(1234), &MELODY);
    let b = play(&mut session(1234), &MELODY);
    assert_eq!(a, b);
}

#[test]
fn rationales_reference_only_visible_context() {
    let mut s = session(5);
    for (i, &p) in MELODY.iter().enumerate() {
        let t = i as f64 * 0.5;
        let resp = s.handle(NoteEvent::on(p, 90.0, t));
        let rationale = resp.analysis.unwrap().rationale.unwrap();
        assert!((0.0..=1.0).contains(&rationale.probability));
        assert!(rationale.influences.len() <= 5);
        for inf in &rationale.influences {
            assert!((0.0..=1.0).contains(&inf.weight));
            assert!(s.context().iter().any(|n| inf.refers_to(n)));
        }
        s.handle(NoteEvent::off(p, t + 0.4));
    }
}

#[test]
fn overlapping_and_stray_events_are_tolerated() {
    let mut s = session(77);
    // Legato: next note-on before the previous note-off.
    let a = s.handle(NoteEvent::on(60, 90.0, 0.0));
    let b = s.handle(NoteEvent::on(64, 90.0, 0.4));
    assert_eq!(s.engine().active_pairs().len(), 2);
    assert!(a.notes.len() == 1 && b.notes.len() == 1);

    assert_eq!(s.handle(NoteEvent::off(60, 0.5)).notes.len(), 1);
    assert_eq!(s.handle(NoteEvent::off(64, 0.9)).notes.len(), 1);
    // Echoed note-offs find nothing.
    assert!(s.handle(NoteEvent::off(64, 1.0)).notes.is_empty());
    assert!(s.handle(NoteEvent::off(50, 1.0)).notes.is_empty());
}

#[test]
fn tutor_mode_walks_through_rule_outcomes() {
    let mut s = session(3);
    s.set_mode(Mode::Tutor);

    let mut dyad = |lower: u8, upper: u8, t: f64| {
        s.handle(NoteEvent::on(lower, 80.0, t));
        let resp = s.handle(NoteEvent::on(upper, 80.0, t + 0.01));
        s.handle(NoteEvent::off(lower, t + 0.4));
        s.handle(NoteEvent::off(upper, t + 0.4));
        assert!(resp.notes.is_empty());
        resp.analysis.unwrap()
    };

    let third = dyad(60, 64, 0.0);
    assert_eq!(third.violations[0].kind, ViolationKind::Consonance);
    assert!(!third.has_violation);

    let octave = dyad(62, 74, 0.5);
    assert!(!octave.has_violation);

    let parallel = dyad(64, 76, 1.0);
    assert!(parallel.has_violation);
    assert!(parallel
        .violations
        .iter()
        .any(|v| v.kind == ViolationKind::ParallelOctave));

    let second = dyad(64, 65, 1.5);
    assert!(second.text.contains("Dissonance"));
    assert!(second.text.contains("minor 2nd"));
}

#[test]
fn journal_captures_generator_output() {
    let mut s = session(8);
    let mut journal = Journal::new(Vec::new());
    for (i, &p) in MELODY.iter().take(6).enumerate() {
        let t = i as f64 * 0.5;
        let resp = s.handle(NoteEvent::on(p, 90.0, t));
        let rationale = resp.analysis.unwrap().rationale.unwrap();
        journal.append_rationale(&rationale).unwrap();
        s.handle(NoteEvent::off(p, t + 0.4));
    }
    let lines = journal.lines();
    let text = String::from_utf8(journal.into_inner()).unwrap();
    assert_eq!(text.lines().count(), lines);
    let rationales = text
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
        .filter(|v| v["type"] == "rationale")
        .count();
    assert_eq!(rationales, 6);
}
