//! File writes that never leave a half-written file behind.

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

/// Write `bytes` to `path` through a sibling temporary file and a rename.
///
/// Readers see either the old content or the new one. Concurrent writers of
/// the same path leave one complete file (last write wins).
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
    let tmp = path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));

    let written = fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));
    if written.is_err() {
        fs::remove_file(&tmp).ok();
    }
    written
}
