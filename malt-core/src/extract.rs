// malt-core/src/extract.rs
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use malt_common::error::{MaltError, Result};
use tar::Archive;
use tracing::debug;
use xz2::read::XzDecoder;

/// Unpack a verified source archive into `dest` and return the source
/// root to run install steps from. The archive type is detected from the
/// file's magic bytes, with the file extension as fallback.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<PathBuf> {
    let archive_type = detect_archive_type(archive_path)?;
    debug!(
        "Extracting {} (type '{}') into {}",
        archive_path.display(),
        archive_type,
        dest.display()
    );
    fs::create_dir_all(dest)?;

    let file = File::open(archive_path).map_err(|e| {
        MaltError::Generic(format!(
            "Failed to open archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    match archive_type.as_str() {
        "gz" | "tgz" => unpack_tar(GzDecoder::new(file), dest, archive_path)?,
        "bz2" | "tbz" | "tbz2" => unpack_tar(BzDecoder::new(file), dest, archive_path)?,
        "xz" | "txz" => unpack_tar(XzDecoder::new(file), dest, archive_path)?,
        "tar" => unpack_tar(file, dest, archive_path)?,
        other => {
            return Err(MaltError::Generic(format!(
                "Unsupported archive type '{}' for {}",
                other,
                archive_path.display()
            )))
        }
    }

    determine_source_root(dest)
}

fn detect_archive_type(archive_path: &Path) -> Result<String> {
    if let Some(kind) = infer::get_from_path(archive_path)? {
        return Ok(kind.extension().to_string());
    }
    archive_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| {
            MaltError::Generic(format!(
                "Cannot determine archive type of {}",
                archive_path.display()
            ))
        })
}

fn unpack_tar<R: Read>(reader: R, dest: &Path, archive_path_for_log: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    // Archive::unpack refuses entries that escape dest (absolute paths,
    // `..` components), so no extra path sanitizing is needed here.
    archive.unpack(dest).map_err(|e| {
        MaltError::Generic(format!(
            "Failed to extract {}: {}",
            archive_path_for_log.display(),
            e
        ))
    })
}

/// Source tarballs usually wrap everything in a single versioned
/// directory. If the unpacked tree has exactly one subdirectory and no
/// loose files, that subdirectory is the source root.
fn determine_source_root(build_dir: &Path) -> Result<PathBuf> {
    let mut subdirs = Vec::new();
    let mut has_files = false;
    for entry in fs::read_dir(build_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if entry.path().is_dir() {
            subdirs.push(entry.path());
        } else {
            has_files = true;
        }
    }

    if subdirs.len() == 1 && !has_files {
        debug!(
            "Source root appears to be single subdirectory: {}",
            subdirs[0].display()
        );
        Ok(subdirs.remove(0))
    } else {
        debug!(
            "Source root appears to be the main build directory: {}",
            build_dir.display()
        );
        Ok(build_dir.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn make_tarball(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("src.tar.gz");
        let file = File::create(&path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn strips_single_top_level_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let tarball = make_tarball(
            scratch.path(),
            &[("pkg-1.0/Makefile", "all:\n"), ("pkg-1.0/main.c", "int main;")],
        );
        let dest = scratch.path().join("build");
        let root = extract_archive(&tarball, &dest).unwrap();
        assert_eq!(root, dest.join("pkg-1.0"));
        assert!(root.join("Makefile").is_file());
    }

    #[test]
    fn flat_archive_root_is_build_dir() {
        let scratch = tempfile::tempdir().unwrap();
        let tarball = make_tarball(scratch.path(), &[("Makefile", "all:\n")]);
        let dest = scratch.path().join("build");
        let root = extract_archive(&tarball, &dest).unwrap();
        assert_eq!(root, dest);
        let mut content = String::new();
        File::open(root.join("Makefile"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "all:\n");
    }
}
