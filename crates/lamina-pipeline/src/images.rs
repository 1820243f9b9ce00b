//! Raster image handling: the url pass, production minification, and
//! WebP variants of emitted files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageEncoder;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::{image_output_name, INLINE_IMAGE_LIMIT};
use crate::error::BuildError;

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Resolves image references to output URLs.
///
/// Files under the inline limit become `data:` URIs; larger files are
/// emitted once under `images/` with any prefix up to an `images/` path
/// segment stripped.
pub struct ImageStore {
    output_dir: PathBuf,
    limit: u64,
    resolved: HashMap<PathBuf, String>,
}

impl ImageStore {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            limit: INLINE_IMAGE_LIMIT,
            resolved: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_limit(output_dir: PathBuf, limit: u64) -> Self {
        Self {
            output_dir,
            limit,
            resolved: HashMap::new(),
        }
    }

    /// URL for a source image, emitting it if needed.
    pub fn url_for(&mut self, source: &Path) -> Result<String, BuildError> {
        if let Some(url) = self.resolved.get(source) {
            return Ok(url.clone());
        }

        let bytes = fs::read(source).map_err(|e| BuildError::read(source, e))?;

        let url = if (bytes.len() as u64) < self.limit {
            format!("data:{};base64,{}", mime_for(source), BASE64.encode(&bytes))
        } else {
            let name = image_output_name(source);
            let out = self.output_dir.join("images").join(&name);
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent).map_err(BuildError::write)?;
            }
            fs::write(&out, &bytes).map_err(BuildError::write)?;
            format!("images/{name}")
        };

        self.resolved.insert(source.to_path_buf(), url.clone());
        Ok(url)
    }

    /// Number of files written under `images/`.
    pub fn emitted_count(&self) -> usize {
        self.resolved
            .values()
            .filter(|u| !u.starts_with("data:"))
            .count()
    }
}

/// Swappable lossy image minification backend.
pub trait ImageMinifier: Send + Sync {
    /// Recompress a file in place. Returns the new byte size.
    fn minify(&self, path: &Path, quality_min: u8, quality_max: u8) -> Result<u64, BuildError>;
}

/// Built-in minifier backed by the `image` crate's encoders.
///
/// PNGs are re-encoded at the strongest compression level with adaptive
/// filtering; JPEGs are re-encoded at the top of the requested quality
/// range.
pub struct ReencodeMinifier;

impl ImageMinifier for ReencodeMinifier {
    fn minify(&self, path: &Path, _quality_min: u8, quality_max: u8) -> Result<u64, BuildError> {
        let img = image::open(path).map_err(|e| BuildError::Image {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut buf: Vec<u8> = Vec::new();
        let is_jpeg = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("jpg") | Some("jpeg")
        );

        if is_jpeg {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality_max);
            img.write_with_encoder(encoder)
        } else {
            let encoder =
                PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive);
            encoder.write_image(
                img.to_rgba8().as_raw(),
                img.width(),
                img.height(),
                image::ExtendedColorType::Rgba8,
            )
        }
        .map_err(|e| BuildError::Image {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        // Only keep the recompressed file if it actually got smaller.
        let original = fs::metadata(path).map_err(|e| BuildError::read(path, e))?.len();
        if (buf.len() as u64) < original {
            fs::write(path, &buf).map_err(BuildError::write)?;
            Ok(buf.len() as u64)
        } else {
            Ok(original)
        }
    }
}

fn emitted_images(output_dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    WalkDir::new(output_dir.join("images"))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| extensions.contains(&x))
        })
        .map(|e| e.into_path())
        .collect()
}

/// Production step: recompress every emitted PNG.
pub fn minify_emitted(
    output_dir: &Path,
    minifier: &dyn ImageMinifier,
    quality_min: u8,
    quality_max: u8,
) -> Result<usize, BuildError> {
    let targets = emitted_images(output_dir, &["png"]);

    targets
        .par_iter()
        .map(|path| {
            let size = minifier.minify(path, quality_min, quality_max)?;
            tracing::debug!("minified {} -> {} bytes", path.display(), size);
            Ok(())
        })
        .collect::<Result<Vec<()>, BuildError>>()?;

    Ok(targets.len())
}

/// Write a `.webp` sibling for every emitted JPEG/PNG. The originals stay
/// in place; pages and stylesheets keep referencing them.
pub fn convert_emitted_to_webp(output_dir: &Path, quality: f32) -> Result<usize, BuildError> {
    let targets = emitted_images(output_dir, &["jpg", "jpeg", "png"]);

    targets
        .par_iter()
        .map(|path| encode_webp(path, &path.with_extension("webp"), quality))
        .collect::<Result<Vec<()>, BuildError>>()?;

    Ok(targets.len())
}

/// Encode one image file as WebP at the given quality.
pub fn encode_webp(source: &Path, dest: &Path, quality: f32) -> Result<(), BuildError> {
    let img = image::open(source).map_err(|e| BuildError::Image {
        path: source.display().to_string(),
        message: e.to_string(),
    })?;

    let rgba = img.to_rgba8();
    let encoded = webp::Encoder::from_rgba(rgba.as_raw(), img.width(), img.height())
        .encode(quality);

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(BuildError::write)?;
    }
    fs::write(dest, &*encoded).map_err(BuildError::write)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([120, 30, 200, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn small_images_become_data_uris() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src/images/icon.png");
        write_png(&src, 4, 4);

        let mut store = ImageStore::new(temp.path().join("dist"));
        let url = store.url_for(&src).unwrap();

        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(store.emitted_count(), 0);
    }

    #[test]
    fn large_images_are_emitted_with_subdirectory_preserved() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src/images/sub/photo.png");
        write_png(&src, 4, 4);

        // Force emission regardless of actual encoded size.
        let mut store = ImageStore::with_limit(temp.path().join("dist"), 1);
        let url = store.url_for(&src).unwrap();

        assert_eq!(url, "images/sub/photo.png");
        assert!(temp.path().join("dist/images/sub/photo.png").is_file());
    }

    #[test]
    fn url_pass_is_memoized() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src/images/icon.png");
        write_png(&src, 4, 4);

        let mut store = ImageStore::new(temp.path().join("dist"));
        let first = store.url_for(&src).unwrap();
        let second = store.url_for(&src).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn webp_conversion_writes_sibling_and_keeps_original() {
        let temp = tempdir().unwrap();
        let emitted = temp.path().join("dist/images/pic.png");
        write_png(&emitted, 8, 8);

        let converted = convert_emitted_to_webp(&temp.path().join("dist"), 60.0).unwrap();

        assert_eq!(converted, 1);
        assert!(temp.path().join("dist/images/pic.webp").is_file());
        // The original stays; emitted pages still reference it.
        assert!(emitted.is_file());
    }

    #[test]
    fn minify_step_keeps_file_decodable() {
        let temp = tempdir().unwrap();
        let emitted = temp.path().join("dist/images/pic.png");
        write_png(&emitted, 16, 16);

        minify_emitted(&temp.path().join("dist"), &ReencodeMinifier, 70, 80).unwrap();

        let img = image::open(&emitted).unwrap();
        assert_eq!(img.width(), 16);
    }
}
