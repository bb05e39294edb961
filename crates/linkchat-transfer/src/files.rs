//! Placement of received files on the local file system.
//!
//! A received file is written to a hidden temp file next to its final
//! destination, then renamed once `FileEnd` arrives:
//!
//! ```text
//! files_directory/.photo.jpg.3fa9c1d2e4b5a6f7.part   ← while receiving
//! files_directory/photo.jpg                          ← after FileEnd
//! files_directory/photo (1).jpg                      ← if photo.jpg exists
//! ```

use std::path::{Path, PathBuf};

use rand::Rng;

/// Used when the peer announces a name with no usable last component.
const FALLBACK_NAME: &str = "file";

/// Reduces a peer-supplied file name to its last path component.
///
/// Both `/` and `\` count as separators, so `../../etc/passwd` and
/// `C:\Users\x\a.txt` become `passwd` and `a.txt`.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match last {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        other => other.to_string(),
    }
}

/// A fresh, hidden temp path for receiving `name` inside `dir`.
pub fn temp_path(dir: &Path, name: &str) -> PathBuf {
    let suffix: [u8; 8] = rand::rng().random();
    let hex: String = suffix.iter().map(|b| format!("{b:02x}")).collect();
    dir.join(format!(".{name}.{hex}.part"))
}

/// The first path in `dir` for `name` that does not exist yet.
///
/// `a.txt` is tried first, then `a (1).txt`, `a (2).txt`, and so on.
pub async fn unique_destination(dir: &Path, name: &str) -> PathBuf {
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };

    let mut candidate = dir.join(name);
    let mut n = 1u32;
    while tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        candidate = dir.join(format!("{stem} ({n}){ext}"));
        n += 1;
    }
    candidate
}
