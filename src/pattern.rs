// Timed note events and the patterns that hold them.
//
// A Pattern is one generator's output: drum lanes or melodic voices laid out
// on a shared tick timeline. Events keep the order the generator produced them
// in (bar, slot, lane); the encoder sorts by tick when it writes.

use crate::error::{GenError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ticks per quarter note, shared by generators and the file header.
pub const TICKS_PER_BEAT: u16 = 480;

/// Time layout of a pattern: resolution, meter and the rhythmic grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub ticks_per_beat: u16,
    pub beats_per_bar: u8,
    /// Grid slots per beat; 4 means a sixteenth-note grid.
    pub slots_per_beat: u8,
}

impl Timing {
    pub fn new(beats_per_bar: u8, slots_per_beat: u8) -> Self {
        Timing {
            ticks_per_beat: TICKS_PER_BEAT,
            beats_per_bar,
            slots_per_beat,
        }
    }

    pub fn grid_ticks(&self) -> u32 {
        self.ticks_per_beat as u32 / self.slots_per_beat.max(1) as u32
    }

    pub fn slots_per_bar(&self) -> usize {
        self.beats_per_bar as usize * self.slots_per_beat as usize
    }

    pub fn bar_ticks(&self) -> u32 {
        self.ticks_per_beat as u32 * self.beats_per_bar as u32
    }

    pub fn slot_tick(&self, bar: u32, slot: usize) -> u32 {
        bar * self.bar_ticks() + slot as u32 * self.grid_ticks()
    }
}

/// General MIDI percussion voices used by the drum templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumLane {
    Kick,
    Snare,
    Clap,
    ClosedHat,
    OpenHat,
    Rim,
    Shaker,
}

impl DrumLane {
    /// Lanes every genre template must declare.
    pub const REQUIRED: [DrumLane; 3] = [DrumLane::Kick, DrumLane::Snare, DrumLane::ClosedHat];

    /// GM drum map note number (channel 10).
    pub fn gm_note(self) -> u8 {
        match self {
            DrumLane::Kick => 36,
            DrumLane::Snare => 38,
            DrumLane::Clap => 39,
            DrumLane::ClosedHat => 42,
            DrumLane::OpenHat => 46,
            DrumLane::Rim => 37,
            DrumLane::Shaker => 70,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DrumLane::Kick => "kick",
            DrumLane::Snare => "snare",
            DrumLane::Clap => "clap",
            DrumLane::ClosedHat => "closed_hat",
            DrumLane::OpenHat => "open_hat",
            DrumLane::Rim => "rim",
            DrumLane::Shaker => "shaker",
        }
    }
}

/// Melodic voices the harmonic generator can produce.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    Melody,
    Chords,
    Bass,
    Counter,
}

impl Voice {
    pub const ALL: [Voice; 4] = [Voice::Melody, Voice::Chords, Voice::Bass, Voice::Counter];

    /// At most one sounding note per tick.
    pub fn is_monophonic(self) -> bool {
        !matches!(self, Voice::Chords)
    }

    pub fn name(self) -> &'static str {
        match self {
            Voice::Melody => "melody",
            Voice::Chords => "chords",
            Voice::Bass => "bass",
            Voice::Counter => "counter",
        }
    }

    /// MIDI channel index (0-based), clear of the GM drum channel.
    pub fn channel(self) -> u8 {
        match self {
            Voice::Melody => 0,
            Voice::Chords => 1,
            Voice::Bass => 2,
            Voice::Counter => 3,
        }
    }

    /// GM program: square lead, electric piano, synth bass, vibraphone.
    pub fn program(self) -> u8 {
        match self {
            Voice::Melody => 80,
            Voice::Chords => 4,
            Voice::Bass => 38,
            Voice::Counter => 11,
        }
    }
}

/// A lane of a pattern: one drum voice or one melodic voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lane {
    Drum(DrumLane),
    Voice(Voice),
}

impl Lane {
    pub fn is_monophonic(self) -> bool {
        match self {
            Lane::Drum(_) => false,
            Lane::Voice(v) => v.is_monophonic(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Lane::Drum(d) => d.name(),
            Lane::Voice(v) => v.name(),
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteEvent {
    pub lane: Lane,
    pub pitch: u8,
    pub velocity: u8,
    pub start_tick: u32,
    pub duration_ticks: u32,
}

impl NoteEvent {
    pub fn end_tick(&self) -> u32 {
        self.start_tick + self.duration_ticks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Drum,
    Melody,
}

impl PatternKind {
    pub fn name(self) -> &'static str {
        match self {
            PatternKind::Drum => "drums",
            PatternKind::Melody => "melody",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub timing: Timing,
    pub bar_count: u32,
    pub events: Vec<NoteEvent>,
    /// Lanes the generator was asked for, whether or not they sounded.
    declared: BTreeSet<Lane>,
}

impl Pattern {
    pub fn new(kind: PatternKind, timing: Timing, bar_count: u32) -> Self {
        Pattern {
            kind,
            timing,
            bar_count,
            events: Vec::new(),
            declared: BTreeSet::new(),
        }
    }

    /// Keep `lane` in the pattern even if it ends up with no events.
    pub fn declare_lane(&mut self, lane: Lane) {
        self.declared.insert(lane);
    }

    pub fn length_ticks(&self) -> u32 {
        self.bar_count * self.timing.bar_ticks()
    }

    /// Declared lanes plus any lane carrying events, in lane order.
    pub fn lanes(&self) -> Vec<Lane> {
        let mut lanes = self.declared.clone();
        lanes.extend(self.events.iter().map(|e| e.lane));
        lanes.into_iter().collect()
    }

    pub fn lane_events(&self, lane: Lane) -> impl Iterator<Item = &NoteEvent> + '_ {
        self.events.iter().filter(move |e| e.lane == lane)
    }

    /// Check the event invariants: MIDI ranges, pattern bounds and
    /// monophony of single-note lanes.
    pub fn validate(&self) -> Result<()> {
        let length = self.length_ticks();
        for e in &self.events {
            if e.pitch > 127 || e.velocity == 0 || e.velocity > 127 {
                return Err(GenError::invalid(
                    "pattern",
                    format!("{} event out of MIDI range: {e:?}", e.lane),
                ));
            }
            if e.duration_ticks == 0 || e.end_tick() > length {
                return Err(GenError::invalid(
                    "pattern",
                    format!("{} event outside 0..{length}: {e:?}", e.lane),
                ));
            }
        }

        for lane in self.lanes().into_iter().filter(|l| l.is_monophonic()) {
            let mut spans: Vec<(u32, u32)> = self
                .lane_events(lane)
                .map(|e| (e.start_tick, e.end_tick()))
                .collect();
            spans.sort_unstable();
            if let Some(w) = spans.windows(2).find(|w| w[1].0 < w[0].1) {
                return Err(GenError::invalid(
                    "pattern",
                    format!("{lane} notes overlap at tick {}", w[1].0),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(lane: Lane, start: u32, dur: u32) -> NoteEvent {
        NoteEvent {
            lane,
            pitch: 60,
            velocity: 90,
            start_tick: start,
            duration_ticks: dur,
        }
    }

    #[test]
    fn test_timing_grid() {
        let t = Timing::new(4, 4);
        assert_eq!(t.grid_ticks(), 120);
        assert_eq!(t.slots_per_bar(), 16);
        assert_eq!(t.bar_ticks(), 1920);
        assert_eq!(t.slot_tick(1, 4), 2400);
    }

    #[test]
    fn test_validate_catches_melody_overlap() {
        let mut p = Pattern::new(PatternKind::Melody, Timing::new(4, 4), 1);
        p.events.push(note(Lane::Voice(Voice::Melody), 0, 480));
        p.events.push(note(Lane::Voice(Voice::Melody), 240, 240));
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_allows_stacked_chords() {
        let mut p = Pattern::new(PatternKind::Melody, Timing::new(4, 4), 1);
        p.events.push(note(Lane::Voice(Voice::Chords), 0, 1920));
        p.events.push(note(Lane::Voice(Voice::Chords), 0, 1920));
        p.events.push(note(Lane::Voice(Voice::Melody), 0, 960));
        p.events.push(note(Lane::Voice(Voice::Melody), 960, 960));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_event_past_end() {
        let mut p = Pattern::new(PatternKind::Drum, Timing::new(4, 4), 1);
        p.events.push(note(Lane::Drum(DrumLane::Kick), 1900, 60));
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_lanes_sorted_and_unique() {
        let mut p = Pattern::new(PatternKind::Drum, Timing::new(4, 4), 1);
        p.events.push(note(Lane::Drum(DrumLane::Snare), 0, 60));
        p.events.push(note(Lane::Drum(DrumLane::Kick), 0, 60));
        p.events.push(note(Lane::Drum(DrumLane::Kick), 480, 60));
        assert_eq!(
            p.lanes(),
            vec![Lane::Drum(DrumLane::Kick), Lane::Drum(DrumLane::Snare)]
        );
    }

    #[test]
    fn test_declared_lane_survives_without_events() {
        let mut p = Pattern::new(PatternKind::Melody, Timing::new(4, 4), 1);
        p.declare_lane(Lane::Voice(Voice::Counter));
        p.events.push(note(Lane::Voice(Voice::Melody), 0, 480));
        assert_eq!(
            p.lanes(),
            vec![Lane::Voice(Voice::Melody), Lane::Voice(Voice::Counter)]
        );
        assert!(p.validate().is_ok());
    }
}
