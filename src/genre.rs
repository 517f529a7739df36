// Genre profiles and the registry that serves them.
//
// A profile is tuning data: tempo range, default key, drum activation
// probabilities per grid slot, velocity envelopes, chord progressions and the
// shape of the melodic walks. The built-in table ships as JSON next to this
// file; callers can load their own table instead. Nothing in the generators
// hard-codes a genre.

use crate::error::{GenError, Result};
use crate::pattern::{DrumLane, Timing, TICKS_PER_BEAT};
use crate::theory::{self, Mode, PitchClass, Progression, ScaleDefinition};
use crate::walk::Contour;
use serde::{Deserialize, Serialize};
use std::path::Path;

const BUILTIN_GENRES: &str = include_str!("genres.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub beats_per_bar: u8,
    pub slots_per_beat: u8,
}

impl Default for Meter {
    fn default() -> Self {
        Meter {
            beats_per_bar: 4,
            slots_per_beat: 4,
        }
    }
}

/// Base velocity ranges: accent slots (downbeats, backbeats) and the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityEnvelope {
    #[serde(default)]
    pub accent_steps: Vec<usize>,
    pub accent: (u8, u8),
    pub normal: (u8, u8),
}

impl VelocityEnvelope {
    pub fn range_for(&self, slot: usize) -> (u8, u8) {
        if self.accent_steps.contains(&slot) {
            self.accent
        } else {
            self.normal
        }
    }
}

/// One drum voice: activation probability for every slot of a bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneTemplate {
    pub lane: DrumLane,
    pub steps: Vec<f64>,
    pub velocity: VelocityEnvelope,
    /// Lane silenced on any slot where this one fires (open hat over closed).
    #[serde(default)]
    pub choke: Option<DrumLane>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumanizeBounds {
    /// Largest timing offset, as a fraction of one grid cell.
    pub max_offset: f64,
    pub max_velocity_jitter: u8,
}

impl HumanizeBounds {
    /// Half-cell drum notes stay clear of their neighbours up to this offset.
    pub const MAX_OFFSET_LIMIT: f64 = 0.25;

    pub fn max_offset_ticks(&self, timing: &Timing) -> u32 {
        (self.max_offset * timing.grid_ticks() as f64).floor() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BassStyle {
    /// Slots within a bar where the bass speaks.
    pub steps: Vec<usize>,
    /// Chance a non-downbeat hit plays the fifth instead of the root.
    #[serde(default)]
    pub fifth_chance: f64,
    #[serde(default = "default_bass_octave")]
    pub octave: i32,
    #[serde(default = "default_bass_velocity")]
    pub velocity: (u8, u8),
}

fn default_bass_octave() -> i32 {
    2
}

fn default_bass_velocity() -> (u8, u8) {
    (90, 105)
}

/// Shape of a constrained melodic walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelodyStyle {
    /// Chance a free slot starts a note rather than a rest.
    pub note_chance: f64,
    /// (length in grid slots, weight)
    pub durations: Vec<(u32, u32)>,
    /// Weight multiplier for chord tones on strong beats.
    pub chord_tone_weight: u32,
    /// Largest step between consecutive notes, in scale degrees.
    pub max_leap: i32,
    /// Extra weight for repeating the previous note.
    #[serde(default)]
    pub repeat_weight: u32,
    pub octave: i32,
    /// Degrees above the register's root the walk may climb to.
    #[serde(default = "default_span")]
    pub span: i32,
    /// Slots to wait before the first note of every bar's phrase.
    #[serde(default)]
    pub phase_slots: usize,
    /// Base velocity ranges: on strong beats, other beats, off-beat slots.
    #[serde(default = "default_melody_velocity")]
    pub velocity: [(u8, u8); 3],
    #[serde(default)]
    pub contour: Contour,
    /// Weight multiplier for steps toward the contour target.
    #[serde(default = "default_contour_pull")]
    pub contour_pull: u32,
}

fn default_span() -> i32 {
    9
}

fn default_contour_pull() -> u32 {
    3
}

fn default_melody_velocity() -> [(u8, u8); 3] {
    [(88, 100), (78, 92), (65, 82)]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreProfile {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub tempo_range: (u32, u32),
    pub default_bpm: u32,
    pub default_key: String,
    pub default_mode: Mode,
    #[serde(default)]
    pub meter: Meter,
    /// Delay of off-beat slots, as a fraction of a grid cell, applied when
    /// humanizing.
    #[serde(default)]
    pub swing: f64,
    pub humanize: HumanizeBounds,
    pub drums: Vec<LaneTemplate>,
    #[serde(default)]
    pub progressions: Vec<Progression>,
    /// Slots within a bar where the chord is (re)struck.
    #[serde(default = "default_chord_steps")]
    pub chord_steps: Vec<usize>,
    #[serde(default = "default_chord_octave")]
    pub chord_octave: i32,
    #[serde(default = "default_chord_velocity")]
    pub chord_velocity: (u8, u8),
    pub bass: BassStyle,
    pub melody: MelodyStyle,
    pub counter: MelodyStyle,
}

fn default_chord_steps() -> Vec<usize> {
    vec![0]
}

fn default_chord_octave() -> i32 {
    4
}

fn default_chord_velocity() -> (u8, u8) {
    (62, 78)
}

impl GenreProfile {
    pub fn timing(&self) -> Timing {
        Timing::new(self.meter.beats_per_bar, self.meter.slots_per_beat)
    }

    pub fn lane(&self, lane: DrumLane) -> Option<&LaneTemplate> {
        self.drums.iter().find(|t| t.lane == lane)
    }

    pub fn tempo_in_range(&self, bpm: u32) -> bool {
        let (lo, hi) = self.tempo_range;
        (lo..=hi).contains(&bpm)
    }

    pub fn default_scale(&self) -> Result<ScaleDefinition> {
        let root: PitchClass = self.default_key.parse()?;
        Ok(ScaleDefinition::new(root, self.default_mode))
    }

    pub fn matches(&self, normalized: &str) -> bool {
        normalize_name(&self.name) == normalized
            || self.aliases.iter().any(|a| normalize_name(a) == normalized)
    }

    /// Reject tables the generators cannot work with.
    pub fn validate(&self) -> Result<()> {
        let bad = |what: String| GenError::Config(format!("{}: {what}", self.name));

        if normalize_name(&self.name).is_empty() {
            return Err(GenError::Config("genre with empty name".into()));
        }
        let (lo, hi) = self.tempo_range;
        if lo == 0 || lo > hi {
            return Err(bad(format!("tempo range {lo}..{hi}")));
        }
        if !self.tempo_in_range(self.default_bpm) {
            return Err(bad(format!("default bpm {} outside range", self.default_bpm)));
        }
        self.default_scale()
            .map_err(|_| bad(format!("default key {:?}", self.default_key)))?;

        let Meter {
            beats_per_bar,
            slots_per_beat,
        } = self.meter;
        if !(1..=16).contains(&beats_per_bar)
            || slots_per_beat == 0
            || TICKS_PER_BEAT % slots_per_beat as u16 != 0
        {
            return Err(bad(format!("meter {beats_per_bar} beats x {slots_per_beat} slots")));
        }
        let slots = self.timing().slots_per_bar();

        let h = self.humanize;
        if !(0.0..=HumanizeBounds::MAX_OFFSET_LIMIT).contains(&h.max_offset) {
            return Err(bad(format!("humanize offset {}", h.max_offset)));
        }
        if !(0.0..=h.max_offset).contains(&self.swing) {
            return Err(bad(format!("swing {} exceeds humanize offset", self.swing)));
        }

        for required in DrumLane::REQUIRED {
            if self.lane(required).is_none() {
                return Err(bad(format!("missing drum lane {}", required.name())));
            }
        }
        for (i, t) in self.drums.iter().enumerate() {
            if self.drums[..i].iter().any(|o| o.lane == t.lane) {
                return Err(bad(format!("duplicate drum lane {}", t.lane.name())));
            }
            if t.steps.len() != slots {
                return Err(bad(format!(
                    "{} has {} steps, bar has {slots}",
                    t.lane.name(),
                    t.steps.len()
                )));
            }
            if t.steps.iter().any(|p| !(0.0..=1.0).contains(p)) {
                return Err(bad(format!("{} probability outside 0..1", t.lane.name())));
            }
            for (lo, hi) in [t.velocity.accent, t.velocity.normal] {
                if lo == 0 || lo > hi || hi > 127 {
                    return Err(bad(format!("{} velocity {lo}..{hi}", t.lane.name())));
                }
            }
            if t.velocity.accent_steps.iter().any(|s| *s >= slots) {
                return Err(bad(format!("{} accent step past bar end", t.lane.name())));
            }
            if let Some(choked) = t.choke {
                if choked == t.lane || self.lane(choked).is_none() {
                    return Err(bad(format!("{} chokes {}", t.lane.name(), choked.name())));
                }
            }
        }

        for p in &self.progressions {
            if p.degrees.is_empty() || p.degrees.iter().any(|d| *d > 6) {
                return Err(bad(format!("progression {:?}", p.degrees)));
            }
            if !(3..=4).contains(&p.chord_size) {
                return Err(bad(format!("chord size {}", p.chord_size)));
            }
        }
        check_steps(&self.chord_steps, slots).map_err(|e| bad(format!("chord steps: {e}")))?;
        check_steps(&self.bass.steps, slots).map_err(|e| bad(format!("bass steps: {e}")))?;
        if !(0.0..=1.0).contains(&self.bass.fifth_chance) {
            return Err(bad("bass fifth chance outside 0..1".into()));
        }
        for (label, (lo, hi)) in [("bass", self.bass.velocity), ("chord", self.chord_velocity)] {
            if lo == 0 || lo > hi || hi > 127 {
                return Err(bad(format!("{label} velocity {lo}..{hi}")));
            }
        }

        for (label, style) in [("melody", &self.melody), ("counter", &self.counter)] {
            if !(0.0..=1.0).contains(&style.note_chance) {
                return Err(bad(format!("{label} note chance outside 0..1")));
            }
            if style.durations.iter().map(|(_, w)| w).sum::<u32>() == 0
                || style.durations.iter().any(|(len, _)| *len == 0)
            {
                return Err(bad(format!("{label} durations")));
            }
            if style.max_leap < 1
                || style.chord_tone_weight == 0
                || style.contour_pull == 0
                || style.span < 1
            {
                return Err(bad(format!("{label} walk bounds")));
            }
            if style.phase_slots >= slots {
                return Err(bad(format!("{label} phase past bar end")));
            }
            for (lo, hi) in style.velocity {
                if lo == 0 || lo > hi || hi > 127 {
                    return Err(bad(format!("{label} velocity {lo}..{hi}")));
                }
            }
        }
        Ok(())
    }
}

fn check_steps(steps: &[usize], slots: usize) -> std::result::Result<(), String> {
    if steps.is_empty() {
        return Err("empty".into());
    }
    if steps.windows(2).any(|w| w[0] >= w[1]) {
        return Err(format!("{steps:?} not strictly ascending"));
    }
    if steps.iter().any(|s| *s >= slots) {
        return Err(format!("{steps:?} past bar end"));
    }
    Ok(())
}

/// Lowercase, trim, treat `_` and `-` as spaces, collapse runs of spaces.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Deserialize)]
struct GenreTable {
    genres: Vec<GenreProfile>,
}

/// Read-only lookup tables for genres and keys.
///
/// Built once and shared by reference; nothing mutates it after
/// construction, so concurrent generation calls can read it freely.
#[derive(Debug, Clone)]
pub struct Registry {
    genres: Vec<GenreProfile>,
}

impl Registry {
    /// The genre table compiled into the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_GENRES)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let table: GenreTable =
            serde_json::from_str(text).map_err(|e| GenError::Config(e.to_string()))?;
        Self::from_profiles(table.genres)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| GenError::io(path, e))?;
        Self::from_json(&text)
    }

    pub fn from_profiles(genres: Vec<GenreProfile>) -> Result<Self> {
        if genres.is_empty() {
            return Err(GenError::Config("no genres defined".into()));
        }
        for (i, g) in genres.iter().enumerate() {
            g.validate()?;
            let name = normalize_name(&g.name);
            if genres[..i].iter().any(|o| o.matches(&name)) {
                return Err(GenError::Config(format!("duplicate genre {:?}", g.name)));
            }
        }
        Ok(Registry { genres })
    }

    pub fn resolve_genre(&self, name: &str) -> Result<&GenreProfile> {
        let wanted = normalize_name(name);
        self.genres
            .iter()
            .find(|g| g.matches(&wanted))
            .ok_or_else(|| GenError::UnknownGenre(name.to_string()))
    }

    /// Resolve `symbol` in the context of `genre`: a bare root takes the
    /// genre's default mode.
    pub fn resolve_key(&self, symbol: &str, genre: &GenreProfile) -> Result<ScaleDefinition> {
        theory::resolve_key(symbol, genre.default_mode)
    }

    pub fn genres(&self) -> impl Iterator<Item = &GenreProfile> {
        self.genres.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builtin().expect("built-in genre table must load")
    }

    #[test]
    fn test_builtin_genres_load() {
        let reg = registry();
        let names: Vec<&str> = reg.genres().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["trap", "drill", "hip hop", "rnb", "melodic"]);
    }

    #[test]
    fn test_resolve_genre_normalizes_names() {
        let reg = registry();
        assert_eq!(reg.resolve_genre("Hip_Hop").unwrap().name, "hip hop");
        assert_eq!(reg.resolve_genre("  TRAP ").unwrap().name, "trap");
        assert_eq!(reg.resolve_genre("boom bap").unwrap().name, "hip hop");
        assert!(matches!(
            reg.resolve_genre("unknown_genre"),
            Err(GenError::UnknownGenre(_))
        ));
    }

    #[test]
    fn test_trap_defaults() {
        let reg = registry();
        let trap = reg.resolve_genre("trap").unwrap();
        assert_eq!(trap.tempo_range, (130, 150));
        assert_eq!(trap.default_bpm, 140);
        let scale = trap.default_scale().unwrap();
        assert_eq!(scale.root, PitchClass::new(5));
        assert_eq!(scale.mode, Mode::Minor);
        assert!(trap.tempo_in_range(140));
        assert!(!trap.tempo_in_range(40));
    }

    #[test]
    fn test_resolve_key_uses_genre_mode() {
        let reg = registry();
        let rnb = reg.resolve_genre("rnb").unwrap();
        assert_eq!(reg.resolve_key("C", rnb).unwrap().mode, Mode::Dorian);
        assert_eq!(reg.resolve_key("Cmaj", rnb).unwrap().mode, Mode::Major);
    }

    #[test]
    fn test_rejects_profile_missing_kick() {
        let mut trap = registry().resolve_genre("trap").unwrap().clone();
        trap.drums.retain(|t| t.lane != DrumLane::Kick);
        assert!(matches!(
            Registry::from_profiles(vec![trap]),
            Err(GenError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_short_step_table() {
        let mut trap = registry().resolve_genre("trap").unwrap().clone();
        trap.drums[0].steps.truncate(8);
        assert!(Registry::from_profiles(vec![trap]).is_err());
    }

    #[test]
    fn test_rejects_choke_of_missing_lane() {
        let mut trap = registry().resolve_genre("trap").unwrap().clone();
        let open = trap.drums.iter_mut().find(|t| t.lane == DrumLane::OpenHat).unwrap();
        assert_eq!(open.choke, Some(DrumLane::ClosedHat));
        open.choke = Some(DrumLane::Shaker);
        assert!(matches!(
            Registry::from_profiles(vec![trap]),
            Err(GenError::Config(_))
        ));
    }

    #[test]
    fn test_melody_contours() {
        use crate::walk::Contour;
        let reg = registry();
        let contour = |name| reg.resolve_genre(name).unwrap().melody.contour;
        assert_eq!(contour("trap"), Contour::Descending);
        assert_eq!(contour("drill"), Contour::Flat);
        assert_eq!(contour("hip hop"), Contour::Arch);
        assert_eq!(contour("rnb"), Contour::Arch);
        assert_eq!(contour("melodic"), Contour::Rising);
        assert_eq!(reg.resolve_genre("trap").unwrap().counter.contour, Contour::Free);
    }

    #[test]
    fn test_rejects_duplicate_genre() {
        let trap = registry().resolve_genre("trap").unwrap().clone();
        assert!(Registry::from_profiles(vec![trap.clone(), trap]).is_err());
    }

    #[test]
    fn test_from_json_reports_parse_errors() {
        assert!(matches!(
            Registry::from_json("{\"genres\": 3}"),
            Err(GenError::Config(_))
        ));
    }
}
