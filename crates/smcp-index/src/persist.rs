//! Whole-file rewrites through a sibling temp file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use smcp_core::Result;

/// Write `bytes` to `path` by writing `<path>.tmp` and renaming it into place.
///
/// Readers never observe a half-written file; a crash leaves either the old
/// contents or the new ones, plus possibly a stray `.tmp`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
