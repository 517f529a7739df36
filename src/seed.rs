// Seeds, per-concern RNG streams and generation identifiers.
//
// One u64 seed drives a whole generation call. Each concern draws from its own
// ChaCha stream so that, for example, turning humanization on never shifts the
// base drum hits.

use crate::error::{GenError, Result};
use crate::genre::normalize_name;
use crate::pattern::Voice;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::str::FromStr;

/// Independent random streams derived from one seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Drums,
    /// Humanization offsets and velocity jitter.
    DrumFeel,
    /// Progression choice.
    Harmony,
    Voice(Voice),
}

impl Stream {
    fn index(self) -> u64 {
        match self {
            Stream::Drums => 0,
            Stream::DrumFeel => 1,
            Stream::Harmony => 2,
            Stream::Voice(Voice::Melody) => 3,
            Stream::Voice(Voice::Chords) => 4,
            Stream::Voice(Voice::Bass) => 5,
            Stream::Voice(Voice::Counter) => 6,
        }
    }
}

pub fn rng_for(seed: u64, stream: Stream) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream.index());
    rng
}

/// Seed taken from the wall clock. Only the outer edge calls this; the
/// generators always receive an explicit seed.
pub fn time_seed() -> u64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .map(|n| n as u64)
        .unwrap_or_else(|| now.timestamp_micros() as u64)
}

/// Identifier shared by every pattern of one composition, e.g.
/// `TRAP-0000000000c0ffee`. It carries the genre and seed, so parsing one back
/// is enough to regenerate the same loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationId {
    genre: String,
    seed: u64,
}

impl GenerationId {
    pub fn new(genre: &str, seed: u64) -> Self {
        GenerationId {
            genre: normalize_name(genre),
            seed,
        }
    }

    /// Normalized genre name (`hip hop`).
    pub fn genre(&self) -> &str {
        &self.genre
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn parse(text: &str) -> Result<Self> {
        let bad = || GenError::invalid("generation id", format!("{text:?}"));
        let (genre, hex) = text.trim().rsplit_once('-').ok_or_else(bad)?;
        if hex.len() != 16
            || !hex.bytes().all(|b| b.is_ascii_hexdigit())
            || normalize_name(genre).is_empty()
        {
            return Err(bad());
        }
        let seed = u64::from_str_radix(hex, 16).map_err(|_| bad())?;
        Ok(GenerationId::new(genre, seed))
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.genre.to_uppercase().replace(' ', "_");
        write!(f, "{tag}-{:016x}", self.seed)
    }
}

impl FromStr for GenerationId {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self> {
        GenerationId::parse(s)
    }
}
