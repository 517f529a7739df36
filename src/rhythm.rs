// Drum pattern generation.
//
// Every (bar, slot, lane) draws once against the lane's activation
// probability, and every hit draws its base velocity from the lane's envelope.
// Both draws come from the drums stream. A lane with a choke silences its
// target on the slots where it fires. Humanization draws from a separate
// stream, so the same seed yields the same hits with or without it.

use crate::error::{GenError, Result};
use crate::genre::GenreProfile;
use crate::pattern::{DrumLane, Lane, NoteEvent, Pattern, PatternKind};
use crate::seed::{rng_for, Stream};
use rand::Rng;
use tracing::debug;

pub fn generate_drums(
    profile: &GenreProfile,
    bar_count: u32,
    humanize: bool,
    seed: u64,
) -> Result<Pattern> {
    if bar_count == 0 {
        return Err(GenError::invalid("bars", "bar count must be at least 1"));
    }
    let timing = profile.timing();
    let slots = timing.slots_per_bar();
    for lane in DrumLane::REQUIRED {
        if profile.lane(lane).is_none() {
            return Err(GenError::invalid(
                "drum template",
                format!("{} has no {} lane", profile.name, lane.name()),
            ));
        }
    }
    if let Some(t) = profile.drums.iter().find(|t| t.steps.len() != slots) {
        return Err(GenError::invalid(
            "drum template",
            format!("{} lane has {} steps, bar has {slots}", t.lane.name(), t.steps.len()),
        ));
    }

    let mut hits = rng_for(seed, Stream::Drums);
    let mut feel = rng_for(seed, Stream::DrumFeel);

    let grid = timing.grid_ticks();
    let note_ticks = (grid / 2).max(1);
    let max_offset = profile.humanize.max_offset_ticks(&timing) as i64;
    let swing = (profile.swing * grid as f64).round() as i64;
    let jitter = profile.humanize.max_velocity_jitter as i32;

    let mut pattern = Pattern::new(PatternKind::Drum, timing, bar_count);
    for template in &profile.drums {
        pattern.declare_lane(Lane::Drum(template.lane));
    }
    let last_start = (pattern.length_ticks() - note_ticks) as i64;

    let mut fired = Vec::with_capacity(profile.drums.len());
    for bar in 0..bar_count {
        for slot in 0..slots {
            fired.clear();
            for template in &profile.drums {
                if hits.gen::<f64>() >= template.steps[slot] {
                    continue;
                }
                let (lo, hi) = template.velocity.range_for(slot);
                fired.push((template, hits.gen_range(lo..=hi)));
            }
            let choked: Vec<DrumLane> = fired.iter().filter_map(|(t, _)| t.choke).collect();

            for &(template, base) in &fired {
                if choked.contains(&template.lane) {
                    continue;
                }
                let mut velocity = base;
                let mut start = timing.slot_tick(bar, slot) as i64;

                if humanize {
                    let dv = feel.gen_range(-jitter..=jitter);
                    velocity = (velocity as i32 + dv).clamp(1, 127) as u8;
                    let push = if slot % 2 == 1 { swing } else { 0 };
                    let offset =
                        (feel.gen_range(-max_offset..=max_offset) + push).clamp(-max_offset, max_offset);
                    start = (start + offset).clamp(0, last_start);
                }

                pattern.events.push(NoteEvent {
                    lane: Lane::Drum(template.lane),
                    pitch: template.lane.gm_note(),
                    velocity,
                    start_tick: start as u32,
                    duration_ticks: note_ticks,
                });
            }
        }
    }

    debug!(
        genre = %profile.name,
        bars = bar_count,
        humanize,
        hits = pattern.events.len(),
        "drum pattern generated"
    );
    Ok(pattern)
}
