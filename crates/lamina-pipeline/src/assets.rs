//! Output cleaning and verbatim asset copying.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::BuildError;

/// Remove previous output. With `dry_run`, only log what would be removed.
pub fn clean_output(output_dir: &Path, dry_run: bool) -> Result<usize, BuildError> {
    if !output_dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    let entries = fs::read_dir(output_dir).map_err(|e| BuildError::read(output_dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| BuildError::read(output_dir, e))?;
        let path = entry.path();
        count += 1;

        if dry_run {
            tracing::info!("clean (dry run): would remove {}", path.display());
            continue;
        }

        if path.is_dir() {
            fs::remove_dir_all(&path).map_err(BuildError::write)?;
        } else {
            fs::remove_file(&path).map_err(BuildError::write)?;
        }
    }

    Ok(count)
}

/// Copy the asset directory to the output root, unfiltered.
pub fn copy_assets(assets_dir: &Path, output_dir: &Path) -> Result<usize, BuildError> {
    if !assets_dir.exists() {
        tracing::debug!("no asset directory at {}", assets_dir.display());
        return Ok(0);
    }

    let mut copied = 0;

    for entry in WalkDir::new(assets_dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let relative = path.strip_prefix(assets_dir).unwrap_or(path);
        let dest = output_dir.join(relative);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(BuildError::write)?;
        }
        fs::copy(path, &dest).map_err(BuildError::write)?;
        copied += 1;
    }

    Ok(copied)
}
