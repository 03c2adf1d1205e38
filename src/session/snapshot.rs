// Key file checksums captured into the session snapshot

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

/// SHA-256 of a file as lowercase hex
pub fn checksum_file(path: &Path) -> io::Result<String> {
    let content = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&content)))
}

/// Hash every key file relative to `root`.
///
/// A missing key file maps to `None`. An unreadable root, or a key file that
/// exists but cannot be read, is an error.
pub fn checksum_key_files(
    root: &Path,
    key_files: &[String],
) -> io::Result<BTreeMap<String, Option<String>>> {
    std::fs::read_dir(root)?;

    let mut checksums = BTreeMap::new();
    for key_file in key_files {
        let path = root.join(key_file);
        let checksum = match checksum_file(&path) {
            Ok(sum) => Some(sum),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(io::Error::new(
                    e.kind(),
                    format!("{}: {}", path.display(), e),
                ))
            }
        };
        checksums.insert(key_file.clone(), checksum);
    }

    Ok(checksums)
}
