// Pitch classes, diatonic modes, keys and chord tones.
//
// Everything here is pure lookup: a key symbol resolves to a seven-note
// scale, a progression plus a bar index resolves to the chord sounding in that
// bar. Scale degrees are plain integers that may run below 0 or past 6; they
// wrap into the neighbouring octaves, which is what the melodic walks need.

use crate::error::{GenError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the twelve pitch classes, C = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PitchClass(u8);

impl PitchClass {
    pub const NAMES: [&'static str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];

    pub fn new(raw: u8) -> Self {
        PitchClass(raw % 12)
    }

    pub fn of_midi(pitch: u8) -> Self {
        PitchClass(pitch % 12)
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self.0 as usize]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Split a leading note name (letter plus optional accidental) off `input`.
fn split_root(input: &str) -> Option<(PitchClass, &str)> {
    let mut it = input.chars();
    let letter = it.next()?;
    let base_pc: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut pc = base_pc;
    let mut rest = it.as_str();
    if let Some(acc) = it.clone().next() {
        match acc {
            '#' | '♯' => {
                pc += 1;
                it.next();
                rest = it.as_str();
            }
            'b' | '♭' => {
                pc -= 1;
                it.next();
                rest = it.as_str();
            }
            _ => {}
        }
    }

    Some((PitchClass::new(pc.rem_euclid(12) as u8), rest))
}

impl FromStr for PitchClass {
    type Err = GenError;

    fn from_str(input: &str) -> Result<Self> {
        match split_root(input.trim()) {
            Some((pc, "")) => Ok(pc),
            _ => Err(GenError::UnknownKey(input.to_string())),
        }
    }
}

/// Seven-note modes usable for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    HarmonicMinor,
}

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Major,
        Mode::Minor,
        Mode::Dorian,
        Mode::Phrygian,
        Mode::Lydian,
        Mode::Mixolydian,
        Mode::HarmonicMinor,
    ];

    /// Semitones above the root for degrees 0..7.
    pub fn intervals(self) -> [u8; 7] {
        match self {
            Mode::Major => [0, 2, 4, 5, 7, 9, 11],
            Mode::Minor => [0, 2, 3, 5, 7, 8, 10],
            Mode::Dorian => [0, 2, 3, 5, 7, 9, 10],
            Mode::Phrygian => [0, 1, 3, 5, 7, 8, 10],
            Mode::Lydian => [0, 2, 4, 6, 7, 9, 11],
            Mode::Mixolydian => [0, 2, 4, 5, 7, 9, 10],
            Mode::HarmonicMinor => [0, 2, 3, 5, 7, 8, 11],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
            Mode::Dorian => "dorian",
            Mode::Phrygian => "phrygian",
            Mode::Lydian => "lydian",
            Mode::Mixolydian => "mixolydian",
            Mode::HarmonicMinor => "harmonic_minor",
        }
    }

    /// Mode named by a key-symbol suffix such as `m`, `min`, `maj`, `dorian`.
    fn from_suffix(suffix: &str) -> Option<Mode> {
        if suffix == "M" {
            return Some(Mode::Major);
        }
        let s = suffix.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let mode = match s.as_str() {
            "m" | "min" | "minor" | "aeolian" => Mode::Minor,
            "maj" | "major" | "ionian" => Mode::Major,
            "dor" | "dorian" => Mode::Dorian,
            "phr" | "phrygian" => Mode::Phrygian,
            "lyd" | "lydian" => Mode::Lydian,
            "mix" | "mixolydian" => Mode::Mixolydian,
            "harm" | "harmonic" | "harmonic_minor" => Mode::HarmonicMinor,
            _ => return None,
        };
        Some(mode)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A concrete key: root pitch class plus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDefinition {
    pub root: PitchClass,
    pub mode: Mode,
}

impl ScaleDefinition {
    pub fn new(root: PitchClass, mode: Mode) -> Self {
        ScaleDefinition { root, mode }
    }

    /// The seven diatonic pitch classes, degree order.
    pub fn pitch_classes(&self) -> [PitchClass; 7] {
        let ivs = self.mode.intervals();
        let mut out = [PitchClass(0); 7];
        for (slot, iv) in out.iter_mut().zip(ivs) {
            *slot = PitchClass::new(self.root.as_u8() + iv);
        }
        out
    }

    pub fn contains_pitch(&self, pitch: u8) -> bool {
        let pc = PitchClass::of_midi(pitch);
        self.pitch_classes().contains(&pc)
    }

    pub fn degree_pitch_class(&self, degree: i32) -> PitchClass {
        let iv = self.mode.intervals()[degree.rem_euclid(7) as usize];
        PitchClass::new(self.root.as_u8() + iv)
    }

    /// MIDI pitch of `degree` counted from the root in `octave` (C4 = 60).
    /// `None` when the result falls outside 0..=127.
    pub fn degree_to_midi(&self, degree: i32, octave: i32) -> Option<u8> {
        let base = (octave + 1) * 12 + self.root.as_u8() as i32;
        let iv = self.mode.intervals()[degree.rem_euclid(7) as usize] as i32;
        let pitch = base + degree.div_euclid(7) * 12 + iv;
        u8::try_from(pitch).ok().filter(|p| *p <= 127)
    }

    /// Short label used in file names, e.g. `F_minor`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.root, self.mode)
    }
}

impl fmt::Display for ScaleDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.root, self.mode)
    }
}

/// Resolve a key symbol (`F`, `Am`, `F# minor`, `D:dorian`). A bare root
/// takes `default_mode`.
pub fn resolve_key(symbol: &str, default_mode: Mode) -> Result<ScaleDefinition> {
    let trimmed = symbol.trim();
    let (root, rest) =
        split_root(trimmed).ok_or_else(|| GenError::UnknownKey(symbol.to_string()))?;
    let suffix = rest.trim_start_matches([':', ' ', '_']).trim();
    if suffix.is_empty() {
        return Ok(ScaleDefinition::new(root, default_mode));
    }
    let mode = Mode::from_suffix(suffix).ok_or_else(|| GenError::UnknownKey(symbol.to_string()))?;
    Ok(ScaleDefinition::new(root, mode))
}

fn default_chord_size() -> u8 {
    3
}

/// Chord roots as scale degrees, one per bar, cycled when the loop is longer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progression {
    pub degrees: Vec<u8>,
    /// 3 = triads, 4 = sevenths.
    #[serde(default = "default_chord_size")]
    pub chord_size: u8,
}

impl Progression {
    pub fn new(degrees: Vec<u8>, chord_size: u8) -> Self {
        Progression {
            degrees,
            chord_size,
        }
    }

    pub fn root_degree(&self, bar_index: usize) -> Option<i32> {
        if self.degrees.is_empty() {
            return None;
        }
        Some(self.degrees[bar_index % self.degrees.len()] as i32)
    }

    /// Degrees of the chord in `bar_index`, stacked in diatonic thirds.
    pub fn chord_degrees(&self, bar_index: usize) -> Vec<i32> {
        match self.root_degree(bar_index) {
            Some(root) => (0..self.chord_size as i32).map(|k| root + 2 * k).collect(),
            None => Vec::new(),
        }
    }
}

/// Pitch classes of the chord sounding in `bar_index`.
pub fn chord_tones(
    scale: &ScaleDefinition,
    progression: &Progression,
    bar_index: usize,
) -> Vec<PitchClass> {
    progression
        .chord_degrees(bar_index)
        .into_iter()
        .map(|d| scale.degree_pitch_class(d))
        .collect()
}
