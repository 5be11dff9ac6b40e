// Descant CLI: replays a note sequence through a counterpoint session.
//
// Each pitch becomes a note-on/note-off pair spaced `--spacing` seconds
// apart. Generator mode prints the generated pitch and its rationale; tutor
// mode takes the pitches two at a time as held dyads and prints the rule
// analysis. Rationales and violations can be journaled as JSON lines.
//
// Usage:
//   cargo run -p descant_counterpoint -- [PITCH...] [--seed N] [--below]
//     [--tutor] [--config PATH] [--log PATH] [--spacing SECS]
//
// Set RUST_LOG=debug to see every rejected draw.

use descant_counterpoint::config::SessionConfig;
use descant_counterpoint::journal::{Journal, JournalEntry};
use descant_counterpoint::model::MockModel;
use descant_counterpoint::session::{Mode, NoteEvent, OutboundNote, Response, Session};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_LINE: [u8; 9] = [60, 62, 64, 65, 67, 65, 64, 62, 60];
const VALUE_FLAGS: [&str; 4] = ["--seed", "--config", "--log", "--spacing"];

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config = match parse_flag::<String>(&args, "--config") {
        Some(path) => match SessionConfig::load(Path::new(&path)) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading {path}: {e}");
                std::process::exit(1);
            }
        },
        None => SessionConfig::default(),
    };
    if let Some(seed) = parse_flag(&args, "--seed") {
        config.seed = Some(seed);
    }
    let spacing: f64 = parse_flag(&args, "--spacing").unwrap_or(0.5);
    let below = args.iter().any(|a| a == "--below");
    let tutor = args.iter().any(|a| a == "--tutor");

    let mut pitches = positional_pitches(&args);
    if pitches.is_empty() {
        pitches = DEFAULT_LINE.to_vec();
    }

    let mut journal = match parse_flag::<String>(&args, "--log") {
        Some(path) => match File::create(&path) {
            Ok(f) => Some(Journal::new(BufWriter::new(f))),
            Err(e) => {
                eprintln!("Error creating log {path}: {e}");
                std::process::exit(1);
            }
        },
        None => None,
    };

    println!("=== Descant Counterpoint ===");
    println!("Mode: {}", if tutor { "tutor" } else { "generator" });
    if !tutor {
        println!("Voice: {}", if below { "below" } else { "above" });
    }
    if let Some(seed) = config.seed {
        println!("Seed: {seed}");
    }
    println!("Notes: {}", pitches.len());
    println!();

    let mut session = Session::new(config, Arc::new(MockModel));
    session.set_generate_above(!below);
    if tutor {
        session.set_mode(Mode::Tutor);
    }

    let mut responses = Vec::new();
    if tutor {
        for (i, dyad) in pitches.chunks(2).enumerate() {
            let t = i as f64 * spacing;
            for &p in dyad {
                responses.push((p, session.handle(NoteEvent::on(p, 100.0, t))));
            }
            for &p in dyad {
                session.handle(NoteEvent::off(p, t + spacing * 0.9));
            }
        }
    } else {
        for (i, &p) in pitches.iter().enumerate() {
            let t = i as f64 * spacing;
            responses.push((p, session.handle(NoteEvent::on(p, 100.0, t))));
            session.handle(NoteEvent::off(p, t + spacing * 0.9));
        }
    }

    for (input, response) in &responses {
        print_response(*input, response);
        if let (Some(journal), Some(analysis)) = (journal.as_mut(), &response.analysis) {
            let written = match &analysis.rationale {
                Some(r) => journal.append_rationale(r),
                None => analysis
                    .violations
                    .iter()
                    .try_for_each(|v| journal.append(&JournalEntry::Violation(v))),
            };
            if let Err(e) = written {
                eprintln!("Error writing log: {e}");
                std::process::exit(1);
            }
        }
    }

    if let Some(mut journal) = journal {
        if let Err(e) = journal.flush() {
            eprintln!("Error flushing log: {e}");
            std::process::exit(1);
        }
        println!();
        println!("Journal: {} line(s) written", journal.lines());
    }
}

fn print_response(input: u8, response: &Response) {
    let Some(analysis) = &response.analysis else {
        return;
    };
    let generated = response.notes.iter().find_map(|n| match n {
        OutboundNote::On { pitch, .. } => Some(*pitch),
        OutboundNote::Off { .. } => None,
    });
    match generated {
        Some(g) => println!("{} -> {}  {}", pitch_name(input), pitch_name(g), analysis.text.trim_end()),
        None => println!("{}  {}", pitch_name(input), analysis.text.trim_end().replace('\n', "; ")),
    }
    if let Some(r) = &analysis.rationale {
        println!("    p={:.2}  {}", r.probability, r.summary);
        for inf in r.influences.iter().take(3) {
            println!(
                "    influence {:>4} @ {:.2}s  weight {:.2}",
                pitch_name(inf.pitch.clamp(0, 127) as u8),
                inf.start_sec,
                inf.weight
            );
        }
    }
    for v in analysis.violations.iter().filter(|v| v.kind.is_fault()) {
        println!("    ! {}: {}", v.kind.label(), v.description);
    }
}

fn pitch_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = ["C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B"];
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NAMES[(pitch % 12) as usize], octave)
}

fn positional_pitches(args: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        match arg.parse::<u8>() {
            Ok(p) if p <= 127 => out.push(p),
            _ => eprintln!("Ignoring '{arg}': not a MIDI pitch"),
        }
    }
    out
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
