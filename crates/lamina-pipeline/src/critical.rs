//! Post-build critical-CSS inlining.
//!
//! After pages and the extracted stylesheet exist, each generated HTML file
//! gets the subset of the stylesheet it needs inlined in a `<style>`
//! element, and the whole page is minified. The extraction backend is a
//! trait so a layout-aware engine can replace the built-in one.

use std::collections::HashSet;

use crate::config::{StyleOptions, Viewport};
use crate::error::BuildError;
use crate::html::minify_html;
use crate::styles::{css_symbols, html_symbols, transform_css};

/// Swappable critical-CSS backend.
pub trait CriticalCssExtractor: Send + Sync {
    /// Return the minimal stylesheet needed to render `html` at the given
    /// viewport.
    fn extract(&self, html: &str, css: &str, viewport: Viewport) -> Result<String, BuildError>;
}

/// Built-in extractor based on selector usage.
///
/// Keeps every rule whose class/id symbols the page references. The
/// viewport is accepted for interface compatibility; selector usage does
/// not depend on geometry.
pub struct SelectorUsageExtractor;

impl CriticalCssExtractor for SelectorUsageExtractor {
    fn extract(&self, html: &str, css: &str, _viewport: Viewport) -> Result<String, BuildError> {
        let used = html_symbols(html);
        let unused: HashSet<String> = css_symbols(css)
            .into_iter()
            .filter(|s| !used.contains(s))
            .collect();

        transform_css(
            css,
            &StyleOptions {
                minify: true,
                purge_unused: true,
            },
            unused,
        )
    }
}

/// Inline the critical stylesheet into a page and minify the result.
pub fn inline_critical(
    html: &str,
    css: &str,
    viewport: Viewport,
    extractor: &dyn CriticalCssExtractor,
) -> Result<String, BuildError> {
    let critical = extractor.extract(html, css, viewport)?;

    let style = format!("<style>{critical}</style>");
    let inlined = match html.find("</head>") {
        Some(pos) => format!("{}{}{}", &html[..pos], style, &html[pos..]),
        None => format!("{style}{html}"),
    };

    Ok(minify_html(&inlined))
}
