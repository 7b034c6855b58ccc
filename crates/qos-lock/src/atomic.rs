use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Replace `path` with `contents` in one `rename(2)`.
///
/// The temp file is created in the target's directory with a unique name,
/// so concurrent writers never share a scratch file and readers observe
/// either the old or the new content, never a torn write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("Failed to write temp file for {}", path.display()))?;
    tmp.flush()
        .with_context(|| format!("Failed to flush temp file for {}", path.display()))?;
    tmp.persist(path).map_err(|e| e.error).with_context(|| {
        format!("Failed to atomically replace {}", path.display())
    })?;
    Ok(())
}
