// Standard MIDI File encoding and decoding.
//
// Layout: format 1, one conductor track (title, tempo, time signature) and one
// track per lane. Every track ends at the loop length so hosts see the full
// bar count even when the last bar is quiet. Encoding is a pure function of the
// composition; nothing time-dependent goes into the bytes.

use crate::compose::Composition;
use crate::error::{GenError, Result};
use crate::pattern::{Lane, NoteEvent, Pattern, PatternKind, Timing};
use midly::num::u4;
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, TrackEvent, TrackEventKind};
use std::collections::{HashMap, VecDeque};

/// Fixed label carried in the title of every file and in the melodic track
/// names of full loops.
pub const TITLE_LABEL: &str = "San3_DaD3aL Boi";

/// GM percussion channel (10th channel, 0-based).
pub const DRUM_CHANNEL: u8 = 9;

pub fn bpm_to_us_per_quarter(bpm: u32) -> u32 {
    60_000_000u32 / bpm.max(1)
}

fn us_per_quarter_to_bpm(us: u32) -> u32 {
    (60_000_000f64 / us.max(1) as f64).round() as u32
}

fn event_order_key(kind: &TrackEventKind) -> u8 {
    match kind {
        TrackEventKind::Midi { message, .. } => match message {
            MidiMessage::NoteOff { .. } => 0,
            MidiMessage::NoteOn { .. } => 1,
            _ => 2,
        },
        TrackEventKind::Meta(_) => 3,
        TrackEventKind::SysEx(_) | TrackEventKind::Escape(_) => 4,
    }
}

fn lane_channel(lane: Lane) -> u8 {
    match lane {
        Lane::Drum(_) => DRUM_CHANNEL,
        Lane::Voice(v) => v.channel(),
    }
}

/// Title meta text: label, generation id and genre.
pub fn title(comp: &Composition) -> String {
    format!("{TITLE_LABEL} | {} | {}", comp.id, comp.genre.to_uppercase())
}

fn track_name(lane: Lane, tagged: bool) -> String {
    match lane {
        Lane::Voice(v) if tagged => format!("{TITLE_LABEL} {}", v.name()),
        _ => lane.name().to_string(),
    }
}

/// Turn absolute-tick events into a track: header events first, then the
/// sorted body, then end-of-track at `end_tick`.
fn finish_track<'a>(
    head: Vec<TrackEventKind<'a>>,
    mut body: Vec<(u32, TrackEventKind<'a>)>,
    end_tick: u32,
) -> Vec<TrackEvent<'a>> {
    body.sort_by(|(ta, ea), (tb, eb)| {
        ta.cmp(tb)
            .then_with(|| event_order_key(ea).cmp(&event_order_key(eb)))
    });

    let mut track: Vec<TrackEvent> = head
        .into_iter()
        .map(|kind| TrackEvent {
            delta: 0.into(),
            kind,
        })
        .collect();
    let mut last_tick: u32 = 0;
    for (tick, kind) in body {
        let delta = tick.saturating_sub(last_tick);
        last_tick = tick;
        track.push(TrackEvent {
            delta: delta.into(),
            kind,
        });
    }
    track.push(TrackEvent {
        delta: end_tick.saturating_sub(last_tick).into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

fn lane_track<'a>(pattern: &Pattern, lane: Lane, name: &'a str) -> Vec<TrackEvent<'a>> {
    let channel: u4 = lane_channel(lane).into();
    let mut head = vec![TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes()))];
    if let Lane::Voice(v) = lane {
        head.push(TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: v.program().into(),
            },
        });
    }

    let mut body = Vec::new();
    for e in pattern.lane_events(lane) {
        body.push((
            e.start_tick,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key: e.pitch.into(),
                    vel: e.velocity.into(),
                },
            },
        ));
        body.push((
            e.end_tick(),
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key: e.pitch.into(),
                    vel: 0.into(),
                },
            },
        ));
    }
    finish_track(head, body, pattern.length_ticks())
}

/// Encode `patterns` (all from `comp`) as parallel tracks of one file.
pub fn encode(comp: &Composition, patterns: &[&Pattern]) -> Result<Vec<u8>> {
    let first = patterns
        .first()
        .ok_or_else(|| GenError::invalid("patterns", "nothing to encode"))?;
    let timing: Timing = first.timing;
    let length = patterns.iter().map(|p| p.length_ticks()).max().unwrap_or(0);

    let tagged = comp.pattern(PatternKind::Drum).is_some()
        && comp.pattern(PatternKind::Melody).is_some();
    let title_text = title(comp);
    let lanes: Vec<(&Pattern, Lane, String)> = patterns
        .iter()
        .flat_map(|p| {
            p.lanes()
                .into_iter()
                .map(move |lane| (*p, lane, track_name(lane, tagged)))
        })
        .collect();

    let conductor = vec![
        TrackEventKind::Meta(MetaMessage::TrackName(title_text.as_bytes())),
        TrackEventKind::Meta(MetaMessage::Tempo(bpm_to_us_per_quarter(comp.bpm).into())),
        TrackEventKind::Meta(MetaMessage::TimeSignature(timing.beats_per_bar, 2, 24, 8)),
    ];
    let mut tracks = Vec::with_capacity(lanes.len() + 1);
    tracks.push(finish_track(conductor, Vec::new(), length));
    for (pattern, lane, name) in &lanes {
        tracks.push(lane_track(pattern, *lane, name));
    }

    let header = Header::new(
        Format::Parallel,
        midly::Timing::Metrical(timing.ticks_per_beat.into()),
    );
    let smf = Smf { header, tracks };
    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)
        .map_err(|e| GenError::Malformed(format!("encode failed: {e}")))?;
    Ok(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DecodedNote {
    pub channel: u8,
    pub pitch: u8,
    pub velocity: u8,
    pub start_tick: u32,
    pub duration_ticks: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedTrack {
    pub name: Option<String>,
    pub program: Option<u8>,
    pub notes: Vec<DecodedNote>,
    /// Absolute tick of the end-of-track event.
    pub end_tick: u32,
}

/// What a file says about itself, for verification and inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFile {
    pub ticks_per_beat: u16,
    pub track_count: usize,
    pub tempo_us: Option<u32>,
    pub bpm: Option<u32>,
    /// (numerator, denominator)
    pub time_signature: Option<(u8, u8)>,
    pub tracks: Vec<DecodedTrack>,
}

impl DecodedFile {
    /// Name of the first track, where the title lives.
    pub fn title(&self) -> Option<&str> {
        self.tracks.first().and_then(|t| t.name.as_deref())
    }

    pub fn track(&self, name: &str) -> Option<&DecodedTrack> {
        self.tracks.iter().find(|t| t.name.as_deref() == Some(name))
    }

    /// Every note of every track, sorted.
    pub fn notes(&self) -> Vec<DecodedNote> {
        let mut all: Vec<DecodedNote> = self.tracks.iter().flat_map(|t| t.notes.clone()).collect();
        all.sort_unstable();
        all
    }
}

pub fn decode(bytes: &[u8]) -> Result<DecodedFile> {
    let smf = Smf::parse(bytes).map_err(|e| GenError::Malformed(e.to_string()))?;
    let ticks_per_beat = match smf.header.timing {
        midly::Timing::Metrical(ppq) => ppq.as_int(),
        midly::Timing::Timecode(..) => {
            return Err(GenError::Malformed("timecode timing is not supported".into()))
        }
    };

    let mut out = DecodedFile {
        ticks_per_beat,
        track_count: smf.tracks.len(),
        tempo_us: None,
        bpm: None,
        time_signature: None,
        tracks: Vec::with_capacity(smf.tracks.len()),
    };

    for events in &smf.tracks {
        let mut track = DecodedTrack::default();
        let mut open: HashMap<(u8, u8), VecDeque<(u32, u8)>> = HashMap::new();
        let mut tick: u32 = 0;
        for ev in events {
            tick += ev.delta.as_int();
            match ev.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                    track.name = Some(String::from_utf8_lossy(raw).into_owned());
                }
                TrackEventKind::Meta(MetaMessage::Tempo(us)) => {
                    let us = us.as_int();
                    out.tempo_us.get_or_insert(us);
                    out.bpm.get_or_insert(us_per_quarter_to_bpm(us));
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, pow, _, _)) => {
                    out.time_signature
                        .get_or_insert((num, 1u8.checked_shl(pow as u32).unwrap_or(0)));
                }
                TrackEventKind::Meta(MetaMessage::EndOfTrack) => track.end_tick = tick,
                TrackEventKind::Midi { channel, message } => {
                    let ch = channel.as_int();
                    match message {
                        MidiMessage::ProgramChange { program } => {
                            track.program = Some(program.as_int());
                        }
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open.entry((ch, key.as_int()))
                                .or_default()
                                .push_back((tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let pitch = key.as_int();
                            let started = open.get_mut(&(ch, pitch)).and_then(|q| q.pop_front());
                            let Some((start, velocity)) = started else {
                                return Err(GenError::Malformed(format!(
                                    "note-off without note-on: channel {ch} pitch {pitch} at {tick}"
                                )));
                            };
                            track.notes.push(DecodedNote {
                                channel: ch,
                                pitch,
                                velocity,
                                start_tick: start,
                                duration_ticks: tick - start,
                            });
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        if open.values().any(|q| !q.is_empty()) {
            return Err(GenError::Malformed(format!(
                "unterminated notes in track {:?}",
                track.name
            )));
        }
        track.notes.sort_unstable_by_key(|n| (n.start_tick, n.pitch));
        out.tracks.push(track);
    }
    Ok(out)
}

/// Key of a generated event as it should decode.
pub fn expected_note(e: &NoteEvent) -> DecodedNote {
    DecodedNote {
        channel: lane_channel(e.lane),
        pitch: e.pitch,
        velocity: e.velocity,
        start_tick: e.start_tick,
        duration_ticks: e.duration_ticks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{compose, GenerationMode, GenerationRequest};
    use crate::genre::Registry;

    fn full_trap() -> Composition {
        let mut req = GenerationRequest::new(GenerationMode::Full, "trap");
        req.seed = Some(99);
        compose(&Registry::builtin().unwrap(), &req).unwrap()
    }

    #[test]
    fn test_tempo_conversion() {
        assert_eq!(bpm_to_us_per_quarter(120), 500_000);
        assert_eq!(bpm_to_us_per_quarter(140), 428_571);
        assert_eq!(us_per_quarter_to_bpm(428_571), 140);
        assert_eq!(bpm_to_us_per_quarter(0), 60_000_000);
    }

    #[test]
    fn test_note_off_sorts_before_note_on() {
        let off = TrackEventKind::Midi {
            channel: 0.into(),
            message: MidiMessage::NoteOff {
                key: 60.into(),
                vel: 0.into(),
            },
        };
        let on = TrackEventKind::Midi {
            channel: 0.into(),
            message: MidiMessage::NoteOn {
                key: 60.into(),
                vel: 90.into(),
            },
        };
        let track = finish_track(Vec::new(), vec![(480, on), (480, off)], 960);
        assert!(matches!(
            track[0].kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { .. },
                ..
            }
        ));
        assert_eq!(track[0].delta.as_int(), 480);
        assert_eq!(track[1].delta.as_int(), 0);
        assert_eq!(track[2].delta.as_int(), 480);
    }

    #[test]
    fn test_layout_of_full_loop() {
        let comp = full_trap();
        let all: Vec<&Pattern> = comp.patterns.iter().collect();
        let bytes = encode(&comp, &all).unwrap();
        let file = decode(&bytes).unwrap();

        let lanes: usize = comp.patterns.iter().map(|p| p.lanes().len()).sum();
        assert_eq!(file.track_count, lanes + 1);
        assert_eq!(file.ticks_per_beat, 480);
        assert_eq!(file.bpm, Some(140));
        assert_eq!(file.time_signature, Some((4, 4)));
        let title = file.title().unwrap();
        assert!(title.starts_with(TITLE_LABEL));
        assert!(title.contains(&comp.id.to_string()));

        let melody = file.track("San3_DaD3aL Boi melody").unwrap();
        assert_eq!(melody.program, Some(80));
        assert!(file.track("kick").is_some());
        for t in &file.tracks {
            assert_eq!(t.end_tick, 8 * 1920);
        }
    }

    #[test]
    fn test_drum_only_tracks_untagged() {
        let mut req = GenerationRequest::new(GenerationMode::Drum, "drill");
        req.seed = Some(1);
        let comp = compose(&Registry::builtin().unwrap(), &req).unwrap();
        let bytes = encode(&comp, &[&comp.patterns[0]]).unwrap();
        let file = decode(&bytes).unwrap();
        assert!(file.tracks[1..]
            .iter()
            .all(|t| !t.name.as_deref().unwrap_or("").contains(TITLE_LABEL)));
        assert!(file.notes().iter().all(|n| n.channel == DRUM_CHANNEL));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not a midi file"), Err(GenError::Malformed(_))));
    }

    #[test]
    fn test_encode_needs_a_pattern() {
        let comp = full_trap();
        assert!(encode(&comp, &[]).is_err());
    }
}
