//! Seeded, genre-aware drum and melody loop generation with Standard MIDI File
//! output.
//!
//! ```no_run
//! use loop_seed_gen::{compose, write_composition, GenerationMode, GenerationRequest, Layout, Registry};
//!
//! let registry = Registry::builtin()?;
//! let mut req = GenerationRequest::new(GenerationMode::Full, "trap");
//! req.seed = Some(0xC0FFEE);
//! let comp = compose(&registry, &req)?;
//! write_composition(&comp, "out".as_ref(), Layout::SeparateFiles)?;
//! # Ok::<(), loop_seed_gen::GenError>(())
//! ```

pub mod compose;
pub mod error;
pub mod genre;
pub mod harmony;
pub mod output;
pub mod pattern;
pub mod rhythm;
pub mod seed;
pub mod smf;
pub mod theory;
pub mod walk;

pub use compose::{compose, Composition, GenerationMode, GenerationRequest};
pub use error::{GenError, Result};
pub use genre::{GenreProfile, Registry};
pub use output::{write_composition, FileKind, GeneratedFile, Layout};
pub use pattern::{DrumLane, Lane, NoteEvent, Pattern, PatternKind, Timing, Voice};
pub use seed::GenerationId;
pub use theory::{chord_tones, resolve_key, Mode, PitchClass, Progression, ScaleDefinition};
