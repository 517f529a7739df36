// Melodic and harmonic voices over a diatonic scale.
//
// One progression is chosen per call; bar `b` plays the chord at
// `b mod len`. Bass and chords follow the chord on fixed slots. Melody and
// counter-melody are constrained walks (see `walk`) that lean toward the
// bar's chord tones on strong beats and follow the genre's contour. Each voice
// draws from its own stream, so adding or dropping a voice never changes the
// others. Every requested voice keeps its lane, even when its walk rests
// throughout.

use crate::error::{GenError, Result};
use crate::genre::{GenreProfile, MelodyStyle};
use crate::pattern::{Lane, NoteEvent, Pattern, PatternKind, Timing, Voice};
use crate::seed::{rng_for, Stream};
use crate::theory::{Progression, ScaleDefinition};
use crate::walk::{next_degree, weighted_choice, BeatStrength, WalkConstraints};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use tracing::debug;

pub fn generate_harmony(
    scale: &ScaleDefinition,
    profile: &GenreProfile,
    bar_count: u32,
    voices: &[Voice],
    seed: u64,
) -> Result<Pattern> {
    if bar_count == 0 {
        return Err(GenError::invalid("bars", "bar count must be at least 1"));
    }
    // Voice order is fixed, whatever order the caller listed them in.
    let voices: BTreeSet<Voice> = voices.iter().copied().collect();
    if voices.is_empty() {
        return Err(GenError::invalid("voices", "no voice requested"));
    }
    if profile.progressions.is_empty() {
        return Err(GenError::invalid(
            "voices",
            format!("genre {} has no chord progressions", profile.name),
        ));
    }

    let mut pick = rng_for(seed, Stream::Harmony);
    let progression = &profile.progressions[pick.gen_range(0..profile.progressions.len())];

    let builder = VoiceGen {
        scale,
        profile,
        progression,
        timing: profile.timing(),
        bar_count,
    };
    let mut pattern = Pattern::new(PatternKind::Melody, builder.timing, bar_count);
    let mut melody_onsets = BTreeSet::new();

    for voice in voices {
        pattern.declare_lane(Lane::Voice(voice));
        let mut rng = rng_for(seed, Stream::Voice(voice));
        let events = match voice {
            Voice::Bass => builder.bass(&mut rng)?,
            Voice::Chords => builder.chords(&mut rng)?,
            Voice::Melody => {
                let events = builder.walk(Voice::Melody, &profile.melody, &BTreeSet::new(), &mut rng)?;
                melody_onsets.extend(events.iter().map(|e| e.start_tick));
                events
            }
            Voice::Counter => builder.walk(Voice::Counter, &profile.counter, &melody_onsets, &mut rng)?,
        };
        debug!(voice = voice.name(), notes = events.len(), "voice generated");
        pattern.events.extend(events);
    }

    debug!(
        genre = %profile.name,
        key = %scale,
        progression = ?progression.degrees,
        bars = bar_count,
        "harmony generated"
    );
    Ok(pattern)
}

struct VoiceGen<'a> {
    scale: &'a ScaleDefinition,
    profile: &'a GenreProfile,
    progression: &'a Progression,
    timing: Timing,
    bar_count: u32,
}

impl VoiceGen<'_> {
    fn pitch(&self, voice: Voice, degree: i32, octave: i32) -> Result<u8> {
        self.scale.degree_to_midi(degree, octave).ok_or_else(|| {
            GenError::invalid(
                "register",
                format!("{} degree {degree} in octave {octave} is outside MIDI range", voice.name()),
            )
        })
    }

    fn note(&self, voice: Voice, pitch: u8, velocity: u8, start: u32, end: u32) -> NoteEvent {
        NoteEvent {
            lane: Lane::Voice(voice),
            pitch,
            velocity,
            start_tick: start,
            duration_ticks: end - start,
        }
    }

    /// Segments `(start_slot, end_slot)` of a bar cut at `steps`.
    fn segments<'s>(&self, steps: &'s [usize]) -> impl Iterator<Item = (usize, usize)> + 's {
        let slots = self.timing.slots_per_bar();
        steps
            .iter()
            .enumerate()
            .map(move |(i, &s)| (s, steps.get(i + 1).copied().unwrap_or(slots)))
    }

    /// Chord root on the downbeat, root or fifth on the other bass steps, each
    /// held until the next one.
    fn bass(&self, rng: &mut ChaCha8Rng) -> Result<Vec<NoteEvent>> {
        let style = &self.profile.bass;
        let (lo, hi) = style.velocity;
        let mut out = Vec::new();
        for bar in 0..self.bar_count {
            let Some(root) = self.progression.root_degree(bar as usize) else {
                continue;
            };
            for (start, end) in self.segments(&style.steps) {
                let degree = if start != 0 && rng.gen::<f64>() < style.fifth_chance {
                    root + 4
                } else {
                    root
                };
                let pitch = self.pitch(Voice::Bass, degree, style.octave)?;
                out.push(self.note(
                    Voice::Bass,
                    pitch,
                    rng.gen_range(lo..=hi),
                    self.timing.slot_tick(bar, start),
                    self.timing.slot_tick(bar, end),
                ));
            }
        }
        Ok(out)
    }

    /// The full chord struck together on every chord step. Roots in the upper
    /// half of the scale are voiced an octave down to keep the stack centred.
    fn chords(&self, rng: &mut ChaCha8Rng) -> Result<Vec<NoteEvent>> {
        let (lo, hi) = self.profile.chord_velocity;
        let mut out = Vec::new();
        for bar in 0..self.bar_count {
            let degrees = self.progression.chord_degrees(bar as usize);
            let shift = match degrees.first() {
                Some(root) if *root > 3 => -7,
                _ => 0,
            };
            for (start, end) in self.segments(&self.profile.chord_steps) {
                for degree in &degrees {
                    let pitch = self.pitch(Voice::Chords, degree + shift, self.profile.chord_octave)?;
                    out.push(self.note(
                        Voice::Chords,
                        pitch,
                        rng.gen_range(lo..=hi),
                        self.timing.slot_tick(bar, start),
                        self.timing.slot_tick(bar, end),
                    ));
                }
            }
        }
        Ok(out)
    }

    /// One constrained walk across the whole loop. Rests take one or two
    /// slots; notes never start on a tick in `avoid` and are clipped to the
    /// pattern end.
    fn walk(
        &self,
        voice: Voice,
        style: &MelodyStyle,
        avoid: &BTreeSet<u32>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<NoteEvent>> {
        let slots = self.timing.slots_per_bar();
        let per_beat = self.timing.slots_per_beat.max(1) as usize;
        let total = slots * self.bar_count as usize;
        let tick_of = |slot: usize| (slot / slots) as u32 * self.timing.bar_ticks()
            + (slot % slots) as u32 * self.timing.grid_ticks();

        let mut out = Vec::new();
        let mut history: Vec<i32> = Vec::new();
        let mut slot = 0;
        while slot < total {
            let bar = slot / slots;
            let in_bar = slot % slots;
            if in_bar < style.phase_slots {
                slot = bar * slots + style.phase_slots;
                continue;
            }
            if avoid.contains(&tick_of(slot)) {
                slot += 1;
                continue;
            }
            if rng.gen::<f64>() >= style.note_chance {
                slot += rng.gen_range(1..=2);
                continue;
            }

            let strength = if in_bar % per_beat == 0 {
                BeatStrength::Strong
            } else {
                BeatStrength::Weak
            };
            let chord = self.progression.chord_degrees(bar);
            let constraints = WalkConstraints {
                chord_degrees: &chord,
                max_leap: style.max_leap,
                span: style.span,
                chord_tone_weight: style.chord_tone_weight,
                repeat_weight: style.repeat_weight,
                target: style.contour.target(slot as f64 / total as f64, style.span),
                contour_pull: style.contour_pull,
            };
            let degree = next_degree(&history, strength, &constraints, rng);
            history.push(degree);

            let len = weighted_choice(rng, &style.durations).unwrap_or(1) as usize;
            let end = (slot + len.max(1)).min(total);

            let (lo, hi) = if in_bar % (2 * per_beat) == 0 {
                style.velocity[0]
            } else if in_bar % per_beat == 0 {
                style.velocity[1]
            } else {
                style.velocity[2]
            };
            let pitch = self.pitch(voice, degree, style.octave)?;
            out.push(self.note(voice, pitch, rng.gen_range(lo..=hi), tick_of(slot), tick_of(end)));
            slot = end;
        }
        Ok(out)
    }
}
