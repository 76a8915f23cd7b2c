//! Archive extraction for `.zip`, `.tar`, `.tar.gz` and `.tgz` skill bundles.
//!
//! Every entry path is sanitised before it is written so an archive cannot
//! place files outside the destination directory.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{Result, SkillError};

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Detect the archive format from a file name.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Extract `archive` into `dest`, creating `dest` if needed.
///
/// This is blocking; async callers should use `spawn_blocking`.
pub fn extract_archive(archive: &Path, kind: ArchiveKind, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    tracing::debug!(
        archive = %archive.display(),
        dest = %dest.display(),
        ?kind,
        "extracting archive"
    );

    let result = match kind {
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::Tar => extract_tar(File::open(archive)?, archive, dest),
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(File::open(archive)?), archive, dest),
    };

    result.map_err(|e| match e {
        SkillError::Archive { .. } => e,
        other => SkillError::Archive {
            path: archive.to_path_buf(),
            reason: other.to_string(),
        },
    })
}

/// If `dir` contains exactly one entry and it is a directory, return that
/// directory; otherwise return `dir`.
///
/// Hosted repository archives wrap their contents in a single
/// `<repo>-<ref>/` folder.
pub fn unwrap_single_root(dir: &Path) -> Result<PathBuf> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        if let Some(only) = entries.pop() {
            return Ok(only.path());
        }
    }
    Ok(dir.to_path_buf())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| SkillError::Archive {
        path: archive.to_path_buf(),
        reason: format!("read zip archive: {e}"),
    })?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| SkillError::Archive {
            path: archive.to_path_buf(),
            reason: format!("read zip entry {i}: {e}"),
        })?;
        let raw = entry.name().replace('\\', "/");
        let Some(rel) = sanitize_entry_path(Path::new(&raw), archive)? else {
            continue;
        };
        let out = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out)?;
        io::copy(&mut entry, &mut out_file)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode().filter(|m| m & 0o777 != 0) {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode & 0o777))?;
        }
    }
    Ok(())
}

fn extract_tar<R: io::Read>(reader: R, archive_path: &Path, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.into_owned();
        let Some(rel) = sanitize_entry_path(&raw_path, archive_path)? else {
            continue;
        };
        let out = dest.join(rel);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            std::fs::create_dir_all(&out)?;
        } else if entry_type.is_file() {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            entry.unpack(&out)?;
        } else {
            tracing::debug!(path = %raw_path.display(), "skipping non-regular tar entry");
        }
    }
    Ok(())
}

/// Strip `.` components and reject absolute, prefixed, or `..` paths.
///
/// Returns `Ok(None)` for entries that resolve to the archive root itself.
fn sanitize_entry_path(path: &Path, archive: &Path) -> Result<Option<PathBuf>> {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                return Err(SkillError::Archive {
                    path: archive.to_path_buf(),
                    reason: format!("entry escapes destination: {}", path.display()),
                });
            }
            Component::CurDir => {}
            Component::Normal(part) => cleaned.push(part),
        }
    }
    Ok((!cleaned.as_os_str().is_empty()).then_some(cleaned))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(gz);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn detect_kinds() {
        assert_eq!(ArchiveKind::detect(Path::new("a.zip")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect(Path::new("a.TGZ")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("a.tar.gz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("a.tar")), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::detect(Path::new("a.md")), None);
    }

    #[test]
    fn extract_zip_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("bundle.zip");
        write_zip(
            &archive,
            &[("demo/SKILL.md", "---\nname: demo\n---\n"), ("demo/run.sh", "echo")],
        );

        let dest = tmp.path().join("out");
        extract_archive(&archive, ArchiveKind::Zip, &dest).unwrap();
        assert!(dest.join("demo/SKILL.md").is_file());
        assert!(dest.join("demo/run.sh").is_file());
        assert_eq!(unwrap_single_root(&dest).unwrap(), dest.join("demo"));
    }

    #[test]
    fn extract_tar_gz_bundle() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("bundle.tgz");
        write_tar_gz(&archive, &[("SKILL.md", "body"), ("scripts/a.js", "x")]);

        let dest = tmp.path().join("out");
        extract_archive(&archive, ArchiveKind::TarGz, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "body");
        assert!(dest.join("scripts/a.js").is_file());
        // Two entries at the top level: no unwrapping.
        assert_eq!(unwrap_single_root(&dest).unwrap(), dest);
    }

    #[test]
    fn zip_traversal_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", "nope")]);

        let dest = tmp.path().join("out");
        let err = extract_archive(&archive, ArchiveKind::Zip, &dest).unwrap_err();
        assert!(matches!(err, SkillError::Archive { .. }));
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[test]
    fn corrupt_zip_is_an_archive_error() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip").unwrap();

        let err = extract_archive(&archive, ArchiveKind::Zip, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, SkillError::Archive { .. }));
    }
}
