// Request validation and pattern assembly.
//
// `compose` is the only entry point callers need: it resolves the request
// against the registry, rejects bad parameters before any generation work,
// runs the generators the mode asks for and re-checks every pattern. Either a
// complete Composition comes back or an error does.

use crate::error::{GenError, Result};
use crate::genre::{GenreProfile, Registry};
use crate::harmony::generate_harmony;
use crate::pattern::{Pattern, PatternKind, Voice};
use crate::rhythm::generate_drums;
use crate::seed::{time_seed, GenerationId};
use crate::theory::ScaleDefinition;
use tracing::{info, info_span};

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 300;
pub const MAX_BARS: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GenerationMode {
    /// Drums only.
    Drum,
    /// Melodic voices only.
    Melody,
    /// Drums and melodic voices on one timeline.
    Full,
}

impl GenerationMode {
    pub fn name(self) -> &'static str {
        match self {
            GenerationMode::Drum => "drum",
            GenerationMode::Melody => "melody",
            GenerationMode::Full => "full",
        }
    }

    fn wants_drums(self) -> bool {
        matches!(self, GenerationMode::Drum | GenerationMode::Full)
    }

    fn wants_melody(self) -> bool {
        matches!(self, GenerationMode::Melody | GenerationMode::Full)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub mode: GenerationMode,
    pub genre: String,
    /// Key symbol; the genre default when `None`.
    pub key: Option<String>,
    /// Tempo; the genre default when `None`.
    pub bpm: Option<u32>,
    pub bars: u32,
    pub humanize: bool,
    /// Time-derived when `None`.
    pub seed: Option<u64>,
    pub voices: Vec<Voice>,
    /// Allow a tempo outside the genre's range (still within MIN_BPM..=MAX_BPM).
    pub tempo_override: bool,
}

impl GenerationRequest {
    pub fn new(mode: GenerationMode, genre: impl Into<String>) -> Self {
        GenerationRequest {
            mode,
            genre: genre.into(),
            key: None,
            bpm: None,
            bars: 8,
            humanize: false,
            seed: None,
            voices: vec![Voice::Melody, Voice::Chords, Voice::Bass],
            tempo_override: false,
        }
    }

    /// Request that regenerates the loop behind `id`. Key, tempo, bars and
    /// voices are not part of the id and must match the first request.
    pub fn recall(mode: GenerationMode, id: &GenerationId) -> Self {
        let mut req = GenerationRequest::new(mode, id.genre());
        req.seed = Some(id.seed());
        req
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub id: GenerationId,
    pub seed: u64,
    /// Canonical genre name.
    pub genre: String,
    pub scale: ScaleDefinition,
    pub bpm: u32,
    pub bar_count: u32,
    /// Drum pattern first when present, then the melodic one.
    pub patterns: Vec<Pattern>,
}

impl Composition {
    pub fn pattern(&self, kind: PatternKind) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.kind == kind)
    }
}

struct Resolved<'r> {
    profile: &'r GenreProfile,
    scale: ScaleDefinition,
    bpm: u32,
}

fn validate<'r>(registry: &'r Registry, req: &GenerationRequest) -> Result<Resolved<'r>> {
    let profile = registry.resolve_genre(&req.genre)?;
    let scale = match &req.key {
        Some(symbol) => registry.resolve_key(symbol, profile)?,
        None => profile.default_scale()?,
    };

    if !(1..=MAX_BARS).contains(&req.bars) {
        return Err(GenError::invalid(
            "bars",
            format!("{} is outside 1..={MAX_BARS}", req.bars),
        ));
    }

    let bpm = req.bpm.unwrap_or(profile.default_bpm);
    if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return Err(GenError::invalid(
            "bpm",
            format!("{bpm} is outside {MIN_BPM}..={MAX_BPM}"),
        ));
    }
    if !req.tempo_override && !profile.tempo_in_range(bpm) {
        let (lo, hi) = profile.tempo_range;
        return Err(GenError::invalid(
            "bpm",
            format!("{bpm} is outside the {} range {lo}..={hi}", profile.name),
        ));
    }

    if req.mode.wants_melody() {
        if req.voices.is_empty() {
            return Err(GenError::invalid("voices", "no voice requested"));
        }
        if profile.progressions.is_empty() {
            return Err(GenError::invalid(
                "voices",
                format!("genre {} has no chord progressions", profile.name),
            ));
        }
    }

    Ok(Resolved {
        profile,
        scale,
        bpm,
    })
}

/// Validate `req` and generate its patterns.
pub fn compose(registry: &Registry, req: &GenerationRequest) -> Result<Composition> {
    let Resolved {
        profile,
        scale,
        bpm,
    } = validate(registry, req)?;

    let seed = req.seed.unwrap_or_else(time_seed);
    let id = GenerationId::new(&profile.name, seed);
    let span = info_span!("compose", %id, mode = req.mode.name());
    let _guard = span.enter();

    let mut patterns = Vec::with_capacity(2);
    if req.mode.wants_drums() {
        patterns.push(generate_drums(profile, req.bars, req.humanize, seed)?);
    }
    if req.mode.wants_melody() {
        patterns.push(generate_harmony(&scale, profile, req.bars, &req.voices, seed)?);
    }
    for p in &patterns {
        p.validate()?;
    }

    info!(
        genre = %profile.name,
        key = %scale,
        bpm,
        bars = req.bars,
        patterns = patterns.len(),
        notes = patterns.iter().map(|p| p.events.len()).sum::<usize>(),
        "composition ready"
    );

    Ok(Composition {
        id,
        seed,
        genre: profile.name.clone(),
        scale,
        bpm,
        bar_count: req.bars,
        patterns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Lane;

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    fn trap(mode: GenerationMode) -> GenerationRequest {
        let mut req = GenerationRequest::new(mode, "trap");
        req.seed = Some(0xC0FFEE);
        req
    }

    #[test]
    fn test_full_mode_shares_timeline() {
        let comp = compose(&registry(), &trap(GenerationMode::Full)).unwrap();
        assert_eq!(comp.patterns.len(), 2);
        assert_eq!(comp.bpm, 140);
        assert_eq!(comp.patterns[0].kind, PatternKind::Drum);
        assert_eq!(comp.patterns[1].kind, PatternKind::Melody);
        for p in &comp.patterns {
            assert_eq!(p.bar_count, 8);
            assert_eq!(p.length_ticks(), comp.patterns[0].length_ticks());
        }
        assert_eq!(comp.id.to_string(), "TRAP-0000000000c0ffee");
    }

    #[test]
    fn test_defaults_come_from_genre() {
        let comp = compose(&registry(), &GenerationRequest::new(GenerationMode::Melody, "rnb")).unwrap();
        assert_eq!(comp.bpm, 85);
        assert_eq!(comp.scale.to_string(), "A# dorian");
        assert_eq!(comp.genre, "rnb");
    }

    #[test]
    fn test_tempo_validation() {
        let reg = registry();
        let mut req = trap(GenerationMode::Full);
        req.bpm = Some(40);
        assert!(matches!(
            compose(&reg, &req),
            Err(GenError::InvalidParameter { param: "bpm", .. })
        ));

        req.tempo_override = true;
        assert_eq!(compose(&reg, &req).unwrap().bpm, 40);

        req.bpm = Some(301);
        assert!(matches!(
            compose(&reg, &req),
            Err(GenError::InvalidParameter { param: "bpm", .. })
        ));

        // Drum-only requests honour the genre range too.
        let mut drums = trap(GenerationMode::Drum);
        drums.bpm = Some(90);
        assert!(compose(&reg, &drums).is_err());
    }

    #[test]
    fn test_bar_limits() {
        let reg = registry();
        for bars in [0, MAX_BARS + 1] {
            let mut req = trap(GenerationMode::Drum);
            req.bars = bars;
            assert!(matches!(
                compose(&reg, &req),
                Err(GenError::InvalidParameter { param: "bars", .. })
            ));
        }
    }

    #[test]
    fn test_lookup_errors() {
        let reg = registry();
        let req = GenerationRequest::new(GenerationMode::Full, "polka");
        assert!(matches!(compose(&reg, &req), Err(GenError::UnknownGenre(_))));

        let mut req = trap(GenerationMode::Melody);
        req.key = Some("X#".into());
        assert!(matches!(compose(&reg, &req), Err(GenError::UnknownKey(_))));
    }

    #[test]
    fn test_melody_needs_voices() {
        let mut req = trap(GenerationMode::Melody);
        req.voices.clear();
        assert!(matches!(
            compose(&registry(), &req),
            Err(GenError::InvalidParameter { param: "voices", .. })
        ));
        // Drum mode ignores the voice list.
        let mut req = trap(GenerationMode::Drum);
        req.voices.clear();
        assert!(compose(&registry(), &req).is_ok());
    }

    #[test]
    fn test_recall_regenerates_same_loop() {
        let reg = registry();
        let mut first = GenerationRequest::new(GenerationMode::Full, "hip hop");
        first.humanize = true;
        let a = compose(&reg, &first).unwrap();

        let id: GenerationId = a.id.to_string().parse().unwrap();
        let mut again = GenerationRequest::recall(GenerationMode::Full, &id);
        again.humanize = true;
        let b = compose(&reg, &again).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_drum_mode_has_no_voices() {
        let comp = compose(&registry(), &trap(GenerationMode::Drum)).unwrap();
        assert_eq!(comp.patterns.len(), 1);
        assert!(comp.patterns[0]
            .lanes()
            .iter()
            .all(|l| matches!(l, Lane::Drum(_))));
    }
}
