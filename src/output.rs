// Placing encoded compositions on disk.
//
// Everything is encoded in memory before the first byte hits the disk. Each
// file goes through a temp file in the destination directory that is renamed
// into place once complete; if a later file fails, the files this call
// created are removed again. Files that already existed under the same name
// are left in place with their new contents.

use crate::compose::Composition;
use crate::error::{GenError, Result};
use crate::pattern::{Pattern, PatternKind};
use crate::seed::GenerationId;
use crate::smf;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// One file per pattern (drums, melody).
    #[default]
    SeparateFiles,
    /// All patterns as tracks of one file.
    SingleFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Drum,
    Melody,
    /// Drums and melody in one file.
    Loop,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileKind::Drum => "drum",
            FileKind::Melody => "melody",
            FileKind::Loop => "loop",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub kind: FileKind,
    pub path: PathBuf,
    pub generation_id: GenerationId,
}

fn genre_slug(genre: &str) -> String {
    genre.replace(' ', "_")
}

/// File name for `kind`, e.g. `drums_TRAP-0000000000c0ffee_trap_140bpm.mid`.
pub fn file_name(comp: &Composition, kind: FileKind) -> String {
    let id = &comp.id;
    let genre = genre_slug(&comp.genre);
    let key = comp.scale.label();
    let bpm = comp.bpm;
    match kind {
        FileKind::Drum => format!("drums_{id}_{genre}_{bpm}bpm.mid"),
        FileKind::Melody => format!("melody_{id}_{genre}_{key}_{bpm}bpm.mid"),
        FileKind::Loop => format!("loop_{id}_{genre}_{key}_{bpm}bpm.mid"),
    }
}

fn plan(comp: &Composition, dir: &Path, layout: Layout) -> Result<Vec<(FileKind, PathBuf, Vec<u8>)>> {
    let mut files = Vec::new();
    match layout {
        Layout::SingleFile => {
            let all: Vec<&Pattern> = comp.patterns.iter().collect();
            let kind = match all.as_slice() {
                [only] if only.kind == PatternKind::Drum => FileKind::Drum,
                [only] if only.kind == PatternKind::Melody => FileKind::Melody,
                _ => FileKind::Loop,
            };
            files.push((kind, dir.join(file_name(comp, kind)), smf::encode(comp, &all)?));
        }
        Layout::SeparateFiles => {
            for p in &comp.patterns {
                let kind = match p.kind {
                    PatternKind::Drum => FileKind::Drum,
                    PatternKind::Melody => FileKind::Melody,
                };
                files.push((kind, dir.join(file_name(comp, kind)), smf::encode(comp, &[p])?));
            }
        }
    }
    Ok(files)
}

/// Write `bytes` to `path` through a temp file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| GenError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| GenError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| GenError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| GenError::io(path, e.error))?;
    Ok(())
}

/// Encode `comp` and write it under `dir`. Either every file is written or
/// none of the files this call created is left behind.
pub fn write_composition(comp: &Composition, dir: &Path, layout: Layout) -> Result<Vec<GeneratedFile>> {
    let files = plan(comp, dir, layout)?;
    fs::create_dir_all(dir).map_err(|e| GenError::io(dir, e))?;

    let mut written: Vec<GeneratedFile> = Vec::with_capacity(files.len());
    let mut created: Vec<PathBuf> = Vec::new();
    for (kind, path, bytes) in files {
        let existed = path.exists();
        if let Err(e) = write_atomic(&path, &bytes) {
            for done in &created {
                if let Err(rm) = fs::remove_file(done) {
                    warn!(path = %done.display(), error = %rm, "could not remove partial output");
                }
            }
            return Err(e);
        }
        if !existed {
            created.push(path.clone());
        }
        info!(%kind, path = %path.display(), bytes = bytes.len(), "wrote");
        written.push(GeneratedFile {
            kind,
            path,
            generation_id: comp.id.clone(),
        });
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{compose, GenerationMode, GenerationRequest};
    use crate::genre::Registry;

    fn comp(mode: GenerationMode) -> Composition {
        let mut req = GenerationRequest::new(mode, "hip hop");
        req.seed = Some(0xC0FFEE);
        compose(&Registry::builtin().unwrap(), &req).unwrap()
    }

    #[test]
    fn test_file_names() {
        let c = comp(GenerationMode::Full);
        assert_eq!(
            file_name(&c, FileKind::Drum),
            "drums_HIP_HOP-0000000000c0ffee_hip_hop_90bpm.mid"
        );
        assert_eq!(
            file_name(&c, FileKind::Melody),
            "melody_HIP_HOP-0000000000c0ffee_hip_hop_A_minor_90bpm.mid"
        );
    }

    #[test]
    fn test_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let c = comp(GenerationMode::Full);
        let files = write_composition(&c, dir.path(), Layout::SeparateFiles).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].kind, FileKind::Drum);
        assert_eq!(files[1].kind, FileKind::Melody);
        for f in &files {
            assert!(f.path.exists());
            assert_eq!(f.generation_id, c.id);
        }
        // No temp files left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_single_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let c = comp(GenerationMode::Full);
        let files = write_composition(&c, dir.path(), Layout::SingleFile).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].kind, FileKind::Loop);
        let decoded = smf::decode(&fs::read(&files[0].path).unwrap()).unwrap();
        let lanes: usize = c.patterns.iter().map(|p| p.lanes().len()).sum();
        assert_eq!(decoded.track_count, lanes + 1);
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        fs::write(&blocker, b"x").unwrap();
        let c = comp(GenerationMode::Drum);
        let err = write_composition(&c, &blocker.join("out"), Layout::SeparateFiles).unwrap_err();
        assert!(matches!(err, GenError::Io { .. }));
    }

    #[test]
    fn test_failed_write_removes_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let c = comp(GenerationMode::Full);
        // A directory squatting on the melody file name makes the rename fail.
        fs::create_dir(dir.path().join(file_name(&c, FileKind::Melody))).unwrap();

        let err = write_composition(&c, dir.path(), Layout::SeparateFiles).unwrap_err();
        assert!(matches!(err, GenError::Io { .. }));
        assert!(!dir.path().join(file_name(&c, FileKind::Drum)).exists());
    }

    #[test]
    fn test_failed_write_keeps_earlier_files() {
        let dir = tempfile::tempdir().unwrap();
        let c = comp(GenerationMode::Full);
        let drums = dir.path().join(file_name(&c, FileKind::Drum));
        write_composition(&c, dir.path(), Layout::SeparateFiles).unwrap();
        let before = fs::read(&drums).unwrap();

        let melody = dir.path().join(file_name(&c, FileKind::Melody));
        fs::remove_file(&melody).unwrap();
        fs::create_dir(&melody).unwrap();
        assert!(write_composition(&c, dir.path(), Layout::SeparateFiles).is_err());
        assert_eq!(fs::read(&drums).unwrap(), before);
    }
}
