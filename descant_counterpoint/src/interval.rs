// Interval classification between the input voice and the generated voice.
//
// Pure functions over signed semitone distances. Every classifier reduces the
// distance with `abs() % 12` first, so octave-compound intervals classify the
// same as their simple form and direction never matters.
//
// The consonant set here is {0, 3, 4, 7, 8, 9}: the perfect fourth is treated
// as a dissonance against the input voice, which is stricter than the
// four-voice scoring in older Palestrina-style generators.

/// MIDI pitch number. Signed so candidate arithmetic below 0 needs no casts;
/// callers keep real pitches inside 0..=127.
pub type Pitch = i16;

/// Signed distance from `from` to `to` in semitones. Positive means `to` is higher.
pub fn semitones(from: Pitch, to: Pitch) -> i16 {
    to - from
}

/// Interval class 0..=11 (absolute distance mod 12).
pub fn class(semitones: i16) -> u8 {
    (semitones.unsigned_abs() % 12) as u8
}

/// Unison, fifth, or octave.
pub fn is_perfect(semitones: i16) -> bool {
    matches!(class(semitones), 0 | 7)
}

pub fn is_consonant(semitones: i16) -> bool {
    matches!(class(semitones), 0 | 3 | 4 | 7 | 8 | 9)
}

pub fn is_tritone(semitones: i16) -> bool {
    class(semitones) == 6
}

/// Direction of melodic motion: 1 up, -1 down, 0 static.
pub fn motion(from: Pitch, to: Pitch) -> i8 {
    match to.cmp(&from) {
        std::cmp::Ordering::Greater => 1,
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
    }
}

/// Human-readable interval name. Negative and compound inputs are reduced
/// with a Euclidean modulo first, so any integer maps to a name.
pub fn name(semitones: i32) -> &'static str {
    match semitones.rem_euclid(12) {
        0 => "unison",
        1 => "minor 2nd",
        2 => "major 2nd",
        3 => "minor 3rd",
        4 => "major 3rd",
        5 => "perfect 4th",
        6 => "tritone",
        7 => "perfect 5th",
        8 => "minor 6th",
        9 => "major 6th",
        10 => "minor 7th",
        _ => "major 7th",
    }
}
