//! `.tar.gz` packing and unpacking.
//!
//! These are blocking helpers; async callers wrap them in
//! `tokio::task::spawn_blocking`.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Archives the directory `root` into `dest`.
///
/// Entries are stored under the root's own directory name, so unpacking
/// `release-06-01-24.tar.gz` recreates `output/...`.
pub fn create_archive(root: &Path, dest: &Path) -> io::Result<u64> {
    let arcname = root
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "archive root has no name"))?;
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let encoder = GzEncoder::new(File::create(dest)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(arcname, root)?;
    builder.into_inner()?.finish()?;

    let size = std::fs::metadata(dest)?.len();
    tracing::info!(root = %root.display(), archive = %dest.display(), bytes = size, "Created archive");
    Ok(size)
}

/// Unpacks all of `archive` into `into`.
pub fn extract_all(archive: &Path, into: &Path) -> io::Result<()> {
    std::fs::create_dir_all(into)?;
    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    tar.unpack(into)?;
    tracing::debug!(archive = %archive.display(), into = %into.display(), "Extracted archive");
    Ok(())
}

fn without_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .skip(1)
        .collect()
}

/// Extracts one member into `into`, returning where it was written.
///
/// `member` is relative to the archive's top-level directory, e.g.
/// `release/built_with_change_types.tsv` matches
/// `output/release/built_with_change_types.tsv`. The file keeps its own name.
pub fn extract_member(archive: &Path, member: &Path, into: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(into)?;
    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));

    for entry in tar.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        if without_root(&entry_path) != member {
            continue;
        }
        let name = member
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "member has no file name"))?;
        let dest = into.join(name);
        entry.unpack(&dest)?;
        return Ok(dest);
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found in {}", member.display(), archive.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release_tree(root: &Path) {
        std::fs::create_dir_all(root.join("release/metadata")).unwrap();
        std::fs::write(root.join("release/built_with_change_types.tsv"), "a\tb\n1\t2\n").unwrap();
        std::fs::write(root.join("release/metadata/version.json"), r#"{"date": "2024-01-15"}"#).unwrap();
    }

    #[test]
    fn test_round_trip_keeps_root_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        release_tree(&root);
        let archive = dir.path().join("release-01-15-24.tar.gz");

        assert!(create_archive(&root, &archive).unwrap() > 0);

        let unpacked = dir.path().join("unpacked");
        extract_all(&archive, &unpacked).unwrap();
        assert!(unpacked.join("output/release/metadata/version.json").is_file());
    }

    #[test]
    fn test_extract_member() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        release_tree(&root);
        let archive = dir.path().join("previous.tar.gz");
        create_archive(&root, &archive).unwrap();

        let into = dir.path().join("extracted");
        let table = extract_member(&archive, Path::new("release/built_with_change_types.tsv"), &into).unwrap();
        assert_eq!(table, into.join("built_with_change_types.tsv"));
        assert_eq!(std::fs::read_to_string(&table).unwrap(), "a\tb\n1\t2\n");

        let err = extract_member(&archive, Path::new("release/missing.tsv"), &into).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_without_root() {
        assert_eq!(
            without_root(Path::new("./output/release/x.tsv")),
            PathBuf::from("release/x.tsv")
        );
    }
}
