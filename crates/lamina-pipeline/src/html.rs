//! HTML page generation: template rendering, image reference rewriting,
//! chunk tag injection, an optional lint pass, and mode-gated minification.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use minijinja::{context, Environment};
use regex::Regex;

use crate::error::BuildError;
use crate::graph::normalize;
use crate::images::ImageStore;

/// Template engine over the `src/html/` directory.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    pub fn new(html_dir: &Path) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(html_dir));
        Self { env }
    }

    /// Render a template by filename.
    pub fn render(&self, template: &str, title: &str) -> Result<String, BuildError> {
        let tmpl = self
            .env
            .get_template(template)
            .map_err(|e| BuildError::Template(e.to_string()))?;

        tmpl.render(context! { title => title })
            .map_err(|e| BuildError::Template(e.to_string()))
    }
}

static SRC_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src\s*=\s*["']([^"']+)["']"#).expect("src regex"));

/// Rewrite `<img src>`-style references through the image store.
pub fn rewrite_images(
    html: &str,
    html_dir: &Path,
    images_dir: &Path,
    store: &mut ImageStore,
) -> Result<String, BuildError> {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for caps in SRC_ATTR_RE.captures_iter(html) {
        let whole = caps.get(0).expect("capture 0");
        let reference = caps.get(1).expect("capture 1").as_str();

        if reference.starts_with("data:")
            || reference.starts_with("http")
            || reference.starts_with("//")
            || reference.starts_with("js/")
        {
            continue;
        }

        let target = if let Some(rest) = reference.strip_prefix("images/") {
            images_dir.join(rest)
        } else {
            html_dir.join(reference)
        };
        let target = normalize(&target);

        let is_image = target
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e, "jpg" | "jpeg" | "png" | "gif"));
        if !is_image || !target.is_file() {
            continue;
        }

        let url = store.url_for(&target)?;
        out.push_str(&html[last..whole.start()]);
        out.push_str(&format!("src=\"{url}\""));
        last = whole.end();
    }

    out.push_str(&html[last..]);
    Ok(out)
}

/// Inject the stylesheet link and chunk script tags into a rendered page.
///
/// Scripts go just before `</body>` in the given chunk order; the link goes
/// just before `</head>`. Pages without those elements get the tags
/// appended.
pub fn inject_tags(html: &str, chunks: &[String], has_css: bool, defer: bool) -> String {
    let mut out = html.to_string();

    if has_css {
        let link = "<link rel=\"stylesheet\" href=\"css/style.css\">";
        out = match out.find("</head>") {
            Some(pos) => format!("{}{}{}", &out[..pos], link, &out[pos..]),
            None => format!("{link}{out}"),
        };
    }

    let mut scripts = String::new();
    for chunk in chunks {
        let defer_attr = if defer { " defer" } else { "" };
        scripts.push_str(&format!(
            "<script src=\"js/{chunk}.bundle.js\"{defer_attr}></script>"
        ));
    }

    match out.find("</body>") {
        Some(pos) => format!("{}{}{}", &out[..pos], scripts, &out[pos..]),
        None => format!("{out}{scripts}"),
    }
}

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));

static BETWEEN_TAGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("between-tags regex"));

static RUNS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\n]+").expect("runs regex"));

/// Collapse whitespace and strip comments, production only.
pub fn minify_html(html: &str) -> String {
    let stripped = COMMENT_RE.replace_all(html, "");
    let collapsed = BETWEEN_TAGS_RE.replace_all(&stripped, "><");
    RUNS_RE.replace_all(&collapsed, " ").trim().to_string()
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?([a-zA-Z][a-zA-Z0-9-]*)[^>]*?(/?)>").expect("tag regex"));

/// Lint pass: warn about unbalanced tags. Never blocks the build.
pub fn lint_html(html: &str, name: &str) {
    let mut stack: Vec<String> = Vec::new();
    let without_comments = COMMENT_RE.replace_all(html, "");

    for caps in TAG_RE.captures_iter(&without_comments) {
        let whole = caps.get(0).expect("capture 0").as_str();
        let tag = caps[1].to_ascii_lowercase();
        let self_closed = &caps[2] == "/";

        if VOID_ELEMENTS.contains(&tag.as_str()) || self_closed {
            continue;
        }

        if whole.starts_with("</") {
            match stack.pop() {
                Some(open) if open == tag => {}
                Some(open) => {
                    tracing::warn!("htmllint {name}: expected </{open}>, found </{tag}>");
                    return;
                }
                None => {
                    tracing::warn!("htmllint {name}: unexpected </{tag}>");
                    return;
                }
            }
        } else {
            stack.push(tag);
        }
    }

    for open in stack.iter().rev() {
        tracing::warn!("htmllint {name}: unclosed <{open}>");
    }
}

/// Chunk names filtered down to those that were actually emitted.
pub fn available_chunks(wanted: &[String], emitted: &HashSet<String>) -> Vec<String> {
    wanted
        .iter()
        .filter(|c| emitted.contains(*c))
        .cloned()
        .collect()
}
