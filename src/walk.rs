// Weighted next-note selection for the melodic walks.
//
// `next_degree` is a pure function of the note history, the beat strength,
// the constraints and the rng. It never touches ticks or MIDI, so it can be
// tested on its own.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Pick one value from `(value, weight)` pairs. `None` when every weight is 0.
pub fn weighted_choice<R: Rng, T: Copy>(rng: &mut R, items: &[(T, u32)]) -> Option<T> {
    let total: u32 = items.iter().map(|(_, w)| *w).sum();
    if total == 0 {
        return None;
    }
    let mut x = rng.gen_range(0..total);
    for (v, w) in items {
        if x < *w {
            return Some(*v);
        }
        x -= *w;
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatStrength {
    /// Onset on a beat: the walk leans toward chord tones.
    Strong,
    Weak,
}

/// Direction a melodic line tends toward over the whole loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contour {
    /// No target; the walk wanders.
    #[default]
    Free,
    /// Hover around the middle of the range.
    Flat,
    Rising,
    Descending,
    /// Climb to the top of the range by the midpoint, then fall back.
    Arch,
}

impl Contour {
    /// Target degree at `progress` (0.0 at the loop start, 1.0 at its end).
    pub fn target(self, progress: f64, span: i32) -> Option<i32> {
        let p = progress.clamp(0.0, 1.0);
        let span = span.max(0) as f64;
        let at = |x: f64| Some((x * span).round() as i32);
        match self {
            Contour::Free => None,
            Contour::Flat => at(0.5),
            Contour::Rising => at(p),
            Contour::Descending => at(1.0 - p),
            Contour::Arch => at(1.0 - (2.0 * p - 1.0).abs()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WalkConstraints<'a> {
    /// Scale degrees of the current chord (any octave).
    pub chord_degrees: &'a [i32],
    pub max_leap: i32,
    /// The walk stays within degrees `0..=span` of its register.
    pub span: i32,
    pub chord_tone_weight: u32,
    pub repeat_weight: u32,
    /// Degree the contour is pulling toward at this point of the loop.
    pub target: Option<i32>,
    /// Weight multiplier for steps that close on `target`.
    pub contour_pull: u32,
}

impl WalkConstraints<'_> {
    pub fn is_chord_tone(&self, degree: i32) -> bool {
        let d = degree.rem_euclid(7);
        self.chord_degrees.iter().any(|c| c.rem_euclid(7) == d)
    }
}

/// Next scale degree of a walk.
///
/// Candidates are the degrees within `max_leap` of the previous note; nearer
/// steps weigh more, on strong beats chord tones are multiplied by
/// `chord_tone_weight`, and steps toward the contour target by `contour_pull`.
/// An empty history starts on a chord tone near the middle
/// of the range.
pub fn next_degree<R: Rng>(
    history: &[i32],
    strength: BeatStrength,
    constraints: &WalkConstraints<'_>,
    rng: &mut R,
) -> i32 {
    let span = constraints.span.max(0);
    let mid = span / 2;

    let Some(&prev) = history.last() else {
        let starts: Vec<(i32, u32)> = (0..=span)
            .filter(|d| constraints.is_chord_tone(*d))
            .map(|d| (d, (span + 1 - 2 * (d - mid).abs()).max(1) as u32))
            .collect();
        return weighted_choice(rng, &starts).unwrap_or(mid);
    };

    let prev = prev.clamp(0, span);
    let leap = constraints.max_leap.max(1);
    let mut candidates: Vec<(i32, u32)> = Vec::with_capacity(2 * leap as usize + 1);
    for step in -leap..=leap {
        let degree = prev + step;
        if !(0..=span).contains(&degree) {
            continue;
        }
        let mut weight = (leap + 1 - step.abs()) as u32;
        if step == 0 {
            weight += constraints.repeat_weight;
        }
        if strength == BeatStrength::Strong && constraints.is_chord_tone(degree) {
            weight *= constraints.chord_tone_weight.max(1);
        }
        if let Some(t) = constraints.target {
            if (degree - t).abs() < (prev - t).abs() {
                weight *= constraints.contour_pull.max(1);
            }
        }
        candidates.push((degree, weight));
    }
    weighted_choice(rng, &candidates).unwrap_or(prev)
}
