//! Stylesheet pipeline: Sass compilation, concatenation, url rewriting,
//! browser-target lowering, unused-selector removal, and minification.
//!
//! Everything discovered through the module graph ends up in one extracted
//! stylesheet; nothing is inline-injected into script output.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::Regex;
use std::sync::LazyLock;

use crate::config::StyleOptions;
use crate::error::BuildError;
use crate::graph::normalize;
use crate::images::ImageStore;

fn version(major: u32) -> Option<u32> {
    Some(major << 16)
}

/// Fixed browser target set for prefixing and feature lowering.
fn browser_targets() -> Targets {
    Targets {
        browsers: Some(Browsers {
            chrome: version(60),
            edge: version(16),
            firefox: version(60),
            ie: version(11),
            safari: version(11),
            ..Browsers::default()
        }),
        ..Targets::default()
    }
}

/// Compile one stylesheet source to plain CSS.
fn compile_sheet(path: &Path) -> Result<String, BuildError> {
    let is_sass = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == "scss" || e == "sass");

    if is_sass {
        grass::from_path(path, &grass::Options::default()).map_err(|e| BuildError::Style {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    } else {
        std::fs::read_to_string(path).map_err(|e| BuildError::read(path, e))
    }
}

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(\s*['"]?([^'")]+?)['"]?\s*\)"#).expect("url regex"));

/// Rewrite `url(...)` references through the image store.
///
/// `images/...` resolves through the alias; relative references resolve
/// against the stylesheet's directory. External and data URLs pass through.
fn rewrite_urls(
    css: &str,
    sheet_path: &Path,
    images_dir: &Path,
    store: &mut ImageStore,
) -> Result<String, BuildError> {
    let mut out = String::with_capacity(css.len());
    let mut last = 0;

    for caps in URL_RE.captures_iter(css) {
        let whole = caps.get(0).expect("capture 0");
        let reference = caps.get(1).expect("capture 1").as_str();

        if reference.starts_with("data:")
            || reference.starts_with("http")
            || reference.starts_with("//")
            || reference.starts_with('#')
        {
            continue;
        }

        let target = if let Some(rest) = reference.strip_prefix("images/") {
            images_dir.join(rest)
        } else {
            sheet_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(reference)
        };
        let target = normalize(&target);

        if !target.is_file() {
            tracing::warn!(
                "stylesheet {} references missing image {}",
                sheet_path.display(),
                reference
            );
            continue;
        }

        let url = store.url_for(&target)?;
        // The extracted stylesheet lives in css/, one level below the
        // output root where emitted images land.
        let href = if url.starts_with("data:") {
            url
        } else {
            format!("../{url}")
        };
        out.push_str(&css[last..whole.start()]);
        out.push_str(&format!("url({href})"));
        last = whole.end();
    }

    out.push_str(&css[last..]);
    Ok(out)
}

/// Compile, concatenate, and rewrite every discovered stylesheet.
pub fn collect_css(
    sheets: &[PathBuf],
    images_dir: &Path,
    store: &mut ImageStore,
) -> Result<String, BuildError> {
    let mut css = String::new();
    for sheet in sheets {
        let compiled = compile_sheet(sheet)?;
        css.push_str(&rewrite_urls(&compiled, sheet, images_dir, store)?);
        css.push('\n');
    }
    Ok(css)
}

/// Lower, optionally purge, and optionally minify a stylesheet.
pub fn transform_css(
    css: &str,
    options: &StyleOptions,
    unused_symbols: HashSet<String>,
) -> Result<String, BuildError> {
    let mut sheet =
        StyleSheet::parse(css, ParserOptions::default()).map_err(|e| BuildError::Style {
            path: "style.css".to_string(),
            message: e.to_string(),
        })?;

    sheet
        .minify(MinifyOptions {
            targets: browser_targets(),
            unused_symbols,
        })
        .map_err(|e| BuildError::Style {
            path: "style.css".to_string(),
            message: e.to_string(),
        })?;

    let out = sheet
        .to_css(PrinterOptions {
            minify: options.minify,
            targets: browser_targets(),
            ..PrinterOptions::default()
        })
        .map_err(|e| BuildError::Style {
            path: "style.css".to_string(),
            message: e.to_string(),
        })?;

    Ok(out.code)
}

/// Stylesheet lint pass. Parse diagnostics are logged as warnings and the
/// build continues regardless.
pub fn lint_css(css: &str) {
    let warnings = Arc::new(RwLock::new(Vec::new()));
    let options = ParserOptions {
        error_recovery: true,
        warnings: Some(warnings.clone()),
        ..ParserOptions::default()
    };

    match StyleSheet::parse(css, options) {
        Ok(_) => {
            if let Ok(found) = warnings.read() {
                for warning in found.iter() {
                    tracing::warn!("stylelint: {}", warning);
                }
            }
        }
        Err(e) => tracing::warn!("stylelint: {}", e),
    }
}

static CLASS_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:class|id)\s*=\s*["']([^"']+)["']"#).expect("attr regex"));

static CSS_SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.#]([A-Za-z_][A-Za-z0-9_-]*)").expect("symbol regex"));

/// Class and id names referenced by an HTML document.
pub fn html_symbols(html: &str) -> HashSet<String> {
    let mut symbols = HashSet::new();
    for caps in CLASS_ATTR_RE.captures_iter(html) {
        for name in caps[1].split_whitespace() {
            symbols.insert(name.to_string());
        }
    }
    symbols
}

/// Class and id names a stylesheet selects on.
pub fn css_symbols(css: &str) -> HashSet<String> {
    CSS_SYMBOL_RE
        .captures_iter(css)
        .map(|c| c[1].to_string())
        .collect()
}

/// Symbols the stylesheet selects on but no template uses.
pub fn unused_symbols(css: &str, used: &HashSet<String>) -> HashSet<String> {
    css_symbols(css)
        .into_iter()
        .filter(|s| !used.contains(s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn dev_options() -> StyleOptions {
        StyleOptions {
            minify: false,
            purge_unused: true,
        }
    }

    #[test]
    fn compiles_scss_and_concatenates() {
        let temp = tempdir().unwrap();
        let sheet = temp.path().join("src/css/style.scss");
        fs::create_dir_all(sheet.parent().unwrap()).unwrap();
        fs::write(&sheet, "$c: rebeccapurple;\nbody { color: $c; }\n").unwrap();

        let mut store = ImageStore::new(temp.path().join("dist"));
        let css = collect_css(
            &[sheet],
            &temp.path().join("src/images"),
            &mut store,
        )
        .unwrap();

        assert!(css.contains("rebeccapurple") || css.contains("#639"));
        assert!(!css.contains("$c"));
    }

    #[test]
    fn rewrites_image_urls_to_data_uris() {
        let temp = tempdir().unwrap();
        let icon = temp.path().join("src/images/icon.png");
        fs::create_dir_all(icon.parent().unwrap()).unwrap();
        image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]))
            .save(&icon)
            .unwrap();

        let sheet = temp.path().join("src/css/style.css");
        fs::create_dir_all(sheet.parent().unwrap()).unwrap();
        fs::write(&sheet, "body { background: url(images/icon.png); }\n").unwrap();

        let mut store = ImageStore::new(temp.path().join("dist"));
        let css = collect_css(
            std::slice::from_ref(&sheet),
            &temp.path().join("src/images"),
            &mut store,
        )
        .unwrap();

        assert!(css.contains("url(data:image/png;base64,"));
    }

    #[test]
    fn emitted_image_urls_resolve_relative_to_the_stylesheet() {
        let temp = tempdir().unwrap();
        let photo = temp.path().join("src/images/photo.png");
        fs::create_dir_all(photo.parent().unwrap()).unwrap();
        image::RgbaImage::from_pixel(4, 4, image::Rgba([50, 60, 70, 255]))
            .save(&photo)
            .unwrap();

        let sheet = temp.path().join("src/css/style.css");
        fs::create_dir_all(sheet.parent().unwrap()).unwrap();
        fs::write(&sheet, "body { background: url(images/photo.png); }\n").unwrap();

        // Force emission so the url points at a file, not a data URI.
        let mut store = ImageStore::with_limit(temp.path().join("dist"), 1);
        let css = collect_css(
            std::slice::from_ref(&sheet),
            &temp.path().join("src/images"),
            &mut store,
        )
        .unwrap();

        // From dist/css/style.css the emitted file is one level up.
        assert!(css.contains("url(../images/photo.png)"));
        assert!(temp.path().join("dist/images/photo.png").is_file());
    }

    #[test]
    fn minifies_when_requested() {
        let css = "body {\n  color: #ff0000;\n}\n";
        let out = transform_css(
            css,
            &StyleOptions {
                minify: true,
                purge_unused: false,
            },
            HashSet::new(),
        )
        .unwrap();

        assert!(!out.contains('\n'));
        assert!(out.contains("body"));
    }

    #[test]
    fn purges_selectors_unused_by_templates() {
        let css = ".kept { color: red; }\n.dropped { color: blue; }\n";
        let used: HashSet<String> = ["kept".to_string()].into_iter().collect();
        let unused = unused_symbols(css, &used);

        let out = transform_css(css, &dev_options(), unused).unwrap();

        assert!(out.contains(".kept"));
        assert!(!out.contains(".dropped"));
    }

    #[test]
    fn collects_symbols_from_html() {
        let html = r#"<div class="hero card" id="top"><span class='hero'></span></div>"#;
        let symbols = html_symbols(html);

        assert!(symbols.contains("hero"));
        assert!(symbols.contains("card"));
        assert!(symbols.contains("top"));
        assert_eq!(symbols.len(), 3);
    }

    #[test]
    fn vendor_prefixing_applies_for_old_targets() {
        let css = "body { user-select: none; }\n";
        let out = transform_css(css, &dev_options(), HashSet::new()).unwrap();

        assert!(out.contains("-webkit-user-select") || out.contains("-moz-user-select"));
    }
}
