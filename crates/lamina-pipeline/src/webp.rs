//! WebP pre-generation, independent of the bundling pipeline.
//!
//! Mirrors every `.jpg`/`.png` under the source images directory into the
//! output images directory as a `.webp` sibling, preserving subdirectory
//! structure. Behavior is fixed by constants; the first failed conversion
//! aborts the whole run.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::BuildError;
use crate::images::encode_webp;

/// Fixed encoding quality for pre-generated WebP variants.
pub const WEBP_QUALITY: f32 = 50.0;

/// Convert every `.jpg`/`.png` under `source_dir` into a `.webp` under
/// `output_dir`, keeping relative subpaths. Returns the produced files in
/// traversal order.
pub fn generate_webp_tree(source_dir: &Path, output_dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut produced = Vec::new();

    for entry in WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let matches_glob = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "jpg" || e == "png");
        if !matches_glob {
            continue;
        }

        let relative = path.strip_prefix(source_dir).unwrap_or(path);
        let dest = output_dir.join(relative).with_extension("webp");

        // Deliberately unguarded per file: any failure propagates and
        // aborts the remaining conversions.
        encode_webp(path, &dest, WEBP_QUALITY)?;
        produced.push(dest);
    }

    Ok(produced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_png(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbaImage::from_pixel(6, 6, image::Rgba([10, 200, 40, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn mirrors_subdirectories_with_webp_extension() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src/images");
        let out = temp.path().join("dist/images");

        write_png(&src.join("sub/icon.png"));
        write_png(&src.join("logo.png"));
        fs::write(src.join("notes.txt"), "ignored").unwrap();

        let produced = generate_webp_tree(&src, &out).unwrap();

        assert_eq!(produced.len(), 2);
        assert!(out.join("sub/icon.webp").is_file());
        assert!(out.join("logo.webp").is_file());
        assert!(!out.join("notes.webp").exists());
    }

    #[test]
    fn corrupt_input_aborts_the_run() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src/images");
        let out = temp.path().join("dist/images");

        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("broken.png"), b"not a png").unwrap();
        write_png(&src.join("zz-good.png"));

        let err = generate_webp_tree(&src, &out).unwrap_err();
        assert!(matches!(err, BuildError::Image { .. }));
        // The failure aborts before later files are converted.
        assert!(!out.join("zz-good.webp").exists());
    }
}
