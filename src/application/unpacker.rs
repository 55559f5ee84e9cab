use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::policy::{DestinationStrategy, ExtractionFilter};
use crate::domain::Category;

#[derive(Debug, Error)]
pub enum UnpackError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{path} is not an archive")]
    NotAnArchive { path: PathBuf },

    #[error("archive {path} contains no files")]
    Empty { path: PathBuf },

    #[error("archive {path} has {count} member(s) with paths outside the install folder")]
    UnsafeEntries { path: PathBuf, count: usize },

    #[error("archive {path} contains no .{extension} files")]
    NoMatchingEntries {
        path: PathBuf,
        extension: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Rar,
    SevenZip,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "zip" => Some(ArchiveKind::Zip),
            "rar" => Some(ArchiveKind::Rar),
            "7z" => Some(ArchiveKind::SevenZip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpackOutcome {
    /// Members were written under `destination` and the archive was deleted.
    Extracted {
        destination: PathBuf,
        files: Vec<PathBuf>,
    },
    /// Recognized but unsupported container; left untouched.
    Unsupported(ArchiveKind),
}

/// Install the contents of a downloaded archive according to its category's policy.
///
/// The archive is deleted only after every selected member was written. On
/// error it stays on disk so the user can retry or inspect it.
pub fn unpack(
    archive_path: &Path,
    destination: &Path,
    category: Category,
) -> Result<UnpackOutcome, UnpackError> {
    match ArchiveKind::from_path(archive_path) {
        Some(ArchiveKind::Zip) => {}
        Some(kind) => {
            warn!(archive = %archive_path.display(), ?kind, "archive format not supported, leaving as-is");
            return Ok(UnpackOutcome::Unsupported(kind));
        }
        None => {
            return Err(UnpackError::NotAnArchive {
                path: archive_path.to_path_buf(),
            })
        }
    }

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| UnpackError::Io { path, source }
    };
    let zip_err = |source| UnpackError::Zip {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(io_err(archive_path))?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;

    let mut members = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(zip_err)?;
        if !entry.is_dir() {
            members.push(Member {
                index: i,
                name: entry.name().to_string(),
                relative: entry.enclosed_name(),
            });
        }
    }

    if members.is_empty() {
        return Err(UnpackError::Empty {
            path: archive_path.to_path_buf(),
        });
    }

    let policy = category.policy();
    let target = match policy.destination {
        DestinationStrategy::SubfolderWhenFlat if is_flat(&members) => {
            let stem = archive_path
                .file_stem()
                .map(|s| s.to_os_string())
                .unwrap_or_else(|| "mod".into());
            destination.join(stem)
        }
        _ => destination.to_path_buf(),
    };

    let selected: Vec<_> = members
        .iter()
        .filter(|member| policy.filter.accepts(&member.name))
        .collect();

    if selected.is_empty() {
        if let ExtractionFilter::Extension(extension) = policy.filter {
            return Err(UnpackError::NoMatchingEntries {
                path: archive_path.to_path_buf(),
                extension,
            });
        }
    }

    // Nothing is written unless every selected member can be placed safely.
    let unsafe_members: Vec<&str> = selected
        .iter()
        .filter(|member| member.relative.is_none())
        .map(|member| member.name.as_str())
        .collect();
    if !unsafe_members.is_empty() {
        warn!(archive = %archive_path.display(), members = ?unsafe_members, "archive members escape the install folder");
        return Err(UnpackError::UnsafeEntries {
            path: archive_path.to_path_buf(),
            count: unsafe_members.len(),
        });
    }

    debug!(
        archive = %archive_path.display(),
        target = %target.display(),
        %category,
        members = members.len(),
        selected = selected.len(),
        "unpacking archive"
    );

    fs::create_dir_all(&target).map_err(io_err(&target))?;

    let mut files = Vec::with_capacity(selected.len());
    for member in selected {
        let Some(relative) = &member.relative else {
            continue;
        };
        let mut entry = archive.by_index(member.index).map_err(zip_err)?;

        let out_path = target.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut out_file = File::create(&out_path).map_err(io_err(&out_path))?;
        io::copy(&mut entry, &mut out_file).map_err(io_err(&out_path))?;
        files.push(out_path);
    }

    drop(archive);
    fs::remove_file(archive_path).map_err(io_err(archive_path))?;

    info!(
        archive = %archive_path.display(),
        target = %target.display(),
        extracted = files.len(),
        "archive unpacked"
    );

    Ok(UnpackOutcome::Extracted {
        destination: target,
        files,
    })
}

struct Member {
    index: usize,
    name: String,
    /// `None` when the stored path would escape the target folder.
    relative: Option<PathBuf>,
}

/// True when no member sits inside a folder.
fn is_flat(members: &[Member]) -> bool {
    !members
        .iter()
        .any(|member| member.name.contains('/') || member.name.contains('\\'))
}
