//! md5 checksum tables.

use md5::{Digest, Md5};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use walkdir::WalkDir;

/// Hex md5 of a file's contents.
pub fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Writes `<md5>  <relative path>` lines for every file under `root`,
/// sorted by path. The table itself is skipped if it lives inside `root`.
pub fn write_md5sums(root: &Path, out: &Path) -> io::Result<usize> {
    let mut lines = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() || entry.path() == out {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        lines.push((rel.to_string_lossy().into_owned(), md5_file(entry.path())?));
    }
    lines.sort();

    let mut text = String::new();
    for (rel, digest) in &lines {
        let _ = writeln!(text, "{digest}  {rel}");
    }
    std::fs::write(out, text)?;
    tracing::info!(root = %root.display(), files = lines.len(), "Wrote md5 checksums");
    Ok(lines.len())
}
