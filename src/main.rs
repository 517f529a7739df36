use anyhow::Context;
use clap::Parser;
use loop_seed_gen::{
    compose, write_composition, GenerationId, GenerationMode, GenerationRequest, Layout, Registry,
    Voice,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "loop-seed-gen",
    version,
    about = "Seeded genre-aware drum and melody MIDI loop generator"
)]
struct Cli {
    /// What to generate
    #[arg(long, value_enum, default_value_t = GenerationMode::Full)]
    mode: GenerationMode,

    /// Genre name or alias (see --list-genres)
    #[arg(short, long, default_value = "trap")]
    genre: String,

    /// Key, e.g. F, Am, "F# dorian". A bare root takes the genre's mode.
    /// Genre default if omitted.
    #[arg(short, long)]
    key: Option<String>,

    /// Tempo in BPM (genre default if omitted)
    #[arg(long)]
    bpm: Option<u32>,

    /// Bars
    #[arg(long, default_value_t = 8u32)]
    bars: u32,

    /// Nudge drum timing and velocity (swing included)
    #[arg(long, default_value_t = false)]
    humanize: bool,

    /// RNG seed (same seed => same MIDI). Time-derived if omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Melodic voices, comma separated
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [Voice::Melody, Voice::Chords, Voice::Bass]
    )]
    voices: Vec<Voice>,

    /// Accept a tempo outside the genre's range (40..=300 still applies)
    #[arg(long, default_value_t = false)]
    allow_tempo_override: bool,

    /// Output directory
    #[arg(short, long, default_value = "out")]
    out: PathBuf,

    /// Write drums and melody as tracks of one file
    #[arg(long, default_value_t = false)]
    single_file: bool,

    /// Regenerate a loop from its generation id (replaces --genre and --seed)
    #[arg(long)]
    recall: Option<GenerationId>,

    /// Genre table (JSON) to use instead of the built-in one
    #[arg(long)]
    genres: Option<PathBuf>,

    /// List the available genres and exit
    #[arg(long, default_value_t = false)]
    list_genres: bool,
}

fn request(cli: &Cli) -> GenerationRequest {
    let mut req = match &cli.recall {
        Some(id) => GenerationRequest::recall(cli.mode, id),
        None => {
            let mut req = GenerationRequest::new(cli.mode, &cli.genre);
            req.seed = cli.seed;
            req
        }
    };
    req.key = cli.key.clone();
    req.bpm = cli.bpm;
    req.bars = cli.bars;
    req.humanize = cli.humanize;
    req.voices = cli.voices.clone();
    req.tempo_override = cli.allow_tempo_override;
    req
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let registry = match &cli.genres {
        Some(path) => Registry::from_path(path)
            .with_context(|| format!("loading genre table {}", path.display()))?,
        None => Registry::builtin().context("built-in genre table")?,
    };

    if cli.list_genres {
        for g in registry.genres() {
            let (lo, hi) = g.tempo_range;
            println!(
                "{:<10} {} {:<8} {lo}-{hi} bpm (default {})  aliases: {}",
                g.name,
                g.default_key,
                g.default_mode.name(),
                g.default_bpm,
                g.aliases.join(", ")
            );
        }
        return Ok(());
    }

    let req = request(&cli);
    let comp = compose(&registry, &req).context("generation failed")?;

    let layout = if cli.single_file {
        Layout::SingleFile
    } else {
        Layout::SeparateFiles
    };
    let files = write_composition(&comp, &cli.out, layout)?;
    for f in &files {
        eprintln!("Wrote {} ({})", f.path.display(), f.kind);
    }
    println!("{}", comp.id);
    Ok(())
}
