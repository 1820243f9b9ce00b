//! Build flags, profiles, and the plan factory.
//!
//! The pipeline is driven by a [`BuildPlan`]: entries, generated pages, and
//! an ordered list of named [`Step`]s. [`plan`] is a pure function from
//! `(Profile, BuildFlags)` to a plan, so the same inputs always produce a
//! structurally equal plan.

use std::path::{Path, PathBuf};

/// Flags selecting build behavior, all defaulting to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildFlags {
    /// Production mode: minify scripts/styles/HTML, optimize images,
    /// drop source maps.
    pub production: bool,

    /// Request output-directory cleaning before the build.
    pub clean: bool,

    /// Emit a bundle-size report.
    pub analyze: bool,
}

/// Configuration profile.
///
/// The three historical pipeline generations are kept as separate profiles
/// instead of being merged into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Single `main` entry, no vendor split, WebP conversion of emitted
    /// images in production.
    Basic,

    /// `main` + `sub` entries with a shared vendor chunk and two generated
    /// pages.
    MultiPage,

    /// Like [`Profile::MultiPage`] but with TypeScript entries, a transform
    /// cache, deferred script tags, and critical-CSS inlining.
    TypeScript,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Basic => "basic",
            Profile::MultiPage => "multi",
            Profile::TypeScript => "typescript",
        }
    }
}

/// Source and output locations for a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    /// Project root; all other paths are resolved beneath it.
    pub root: PathBuf,

    /// Output directory (`dist`).
    pub output_dir: PathBuf,

    /// Static asset directory copied verbatim to the output root.
    pub assets_dir: PathBuf,
}

impl SitePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            output_dir: root.join("dist"),
            assets_dir: root.join("assets"),
            root,
        }
    }

    pub fn src_dir(&self) -> PathBuf {
        self.root.join("src")
    }

    pub fn html_dir(&self) -> PathBuf {
        self.src_dir().join("html")
    }

    /// Target of the `css` import alias.
    pub fn css_dir(&self) -> PathBuf {
        self.src_dir().join("css")
    }

    /// Target of the `images` import alias.
    pub fn images_dir(&self) -> PathBuf {
        self.src_dir().join("images")
    }

    pub fn node_modules_dir(&self) -> PathBuf {
        self.root.join("node_modules")
    }

    /// Content-hash cache for transpiled modules.
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".cache").join("lamina")
    }
}

impl Default for SitePaths {
    fn default() -> Self {
        Self::new(".")
    }
}

/// A named entry module compiled to `js/<name>.bundle.js`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    /// Module path relative to the project root.
    pub module: PathBuf,
}

impl Entry {
    fn new(name: &str, module: &str) -> Self {
        Self {
            name: name.to_string(),
            module: PathBuf::from(module),
        }
    }

    /// Output path of this entry's chunk, relative to the output dir.
    pub fn bundle_path(&self) -> String {
        format!("js/{}.bundle.js", self.name)
    }
}

/// A generated HTML page wired to a subset of chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpec {
    /// Output filename, e.g. `index.html`.
    pub filename: String,

    /// Template filename under `src/html/`.
    pub template: String,

    /// Chunk names whose script tags are injected, in load order.
    pub chunks: Vec<String>,
}

impl PageSpec {
    fn new(filename: &str, template: &str, chunks: &[&str]) -> Self {
        Self {
            filename: filename.to_string(),
            template: template.to_string(),
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Fixed viewport for critical-CSS extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Viewport the critical-CSS step is computed against.
pub const CRITICAL_VIEWPORT: Viewport = Viewport {
    width: 375,
    height: 565,
};

/// Files at or above this byte size are emitted under `images/`; smaller
/// ones become data URIs.
pub const INLINE_IMAGE_LIMIT: u64 = 8192;

/// A named cross-cutting build step. The plan lists steps in execution
/// order; absent steps simply do not run.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Remove previous output. With `dry_run`, only log what would go.
    Clean { dry_run: bool },

    /// Generate HTML pages from templates.
    Pages,

    /// Write the extracted stylesheet to `css/style.css`.
    ExtractCss,

    /// Copy the asset directory to the output root, unfiltered.
    CopyAssets,

    /// Stylesheet lint pass; warnings only.
    LintStyles,

    /// Lossy recompression of emitted PNGs, production only.
    MinifyImages { quality_min: u8, quality_max: u8 },

    /// Write `.webp` siblings of emitted JPEG/PNG files, keeping the
    /// originals.
    ConvertWebp { quality: f32 },

    /// Inline per-page critical CSS and minify the whole page.
    CriticalCss { viewport: Viewport },

    /// Write a per-chunk size report.
    Analyze,
}

/// How entry modules are bundled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    /// Minify chunk output (production).
    pub minify: bool,

    /// Drop `console.*` calls during minification.
    pub drop_console: bool,

    /// Append an inline source map to each chunk (development).
    pub source_maps: bool,

    /// Split `node_modules`-resolved modules into a shared `vendor` chunk.
    pub vendor_split: bool,

    /// Cache transpiled module output keyed by content hash.
    pub transform_cache: bool,

    /// Extension resolution order for extensionless specifiers.
    pub resolve_extensions: Vec<&'static str>,
}

/// How discovered stylesheets are processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOptions {
    /// Minify the extracted stylesheet (production).
    pub minify: bool,

    /// Drop selectors that no template in `src/html/` uses.
    pub purge_unused: bool,
}

/// HTML generation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOptions {
    /// Collapse whitespace and strip comments (production).
    pub minify: bool,

    /// Inject `defer` on generated script tags.
    pub defer_scripts: bool,
}

/// Complete, ordered description of one build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPlan {
    pub profile: Profile,
    pub flags: BuildFlags,
    pub entries: Vec<Entry>,
    pub pages: Vec<PageSpec>,
    pub bundle: BundleOptions,
    pub styles: StyleOptions,
    pub page_options: PageOptions,
    pub steps: Vec<Step>,
}

impl BuildPlan {
    /// Whether a step of the same kind as `probe` is present.
    pub fn has_step(&self, probe: &Step) -> bool {
        self.steps
            .iter()
            .any(|s| std::mem::discriminant(s) == std::mem::discriminant(probe))
    }
}

/// Map a profile and flags to the full build plan.
pub fn plan(profile: Profile, flags: BuildFlags) -> BuildPlan {
    let entries = match profile {
        Profile::Basic => vec![Entry::new("main", "src/js/main.js")],
        Profile::MultiPage => vec![
            Entry::new("main", "src/js/main.js"),
            Entry::new("sub", "src/js/sub.js"),
        ],
        Profile::TypeScript => vec![
            Entry::new("main", "src/ts/main.ts"),
            Entry::new("sub", "src/ts/sub.ts"),
        ],
    };

    let pages = match profile {
        Profile::Basic => vec![PageSpec::new("index.html", "template.html", &["main"])],
        Profile::MultiPage | Profile::TypeScript => vec![
            PageSpec::new("index.html", "template.html", &["vendor", "main"]),
            PageSpec::new("index2.html", "template2.html", &["vendor", "sub"]),
        ],
    };

    let bundle = BundleOptions {
        minify: flags.production,
        drop_console: flags.production,
        source_maps: !flags.production,
        vendor_split: profile != Profile::Basic,
        transform_cache: profile == Profile::TypeScript,
        resolve_extensions: match profile {
            Profile::TypeScript => vec!["ts", "js"],
            _ => vec!["js"],
        },
    };

    let styles = StyleOptions {
        minify: flags.production,
        purge_unused: profile != Profile::Basic,
    };

    let page_options = PageOptions {
        minify: flags.production,
        defer_scripts: profile == Profile::TypeScript,
    };

    let mut steps = Vec::new();

    match profile {
        // The earliest profile always carries the clean step, but it only
        // deletes for real in production.
        Profile::Basic => steps.push(Step::Clean {
            dry_run: !flags.production,
        }),
        _ if flags.clean => steps.push(Step::Clean { dry_run: false }),
        _ => {}
    }

    steps.push(Step::Pages);
    steps.push(Step::ExtractCss);
    steps.push(Step::CopyAssets);
    steps.push(Step::LintStyles);

    if flags.production {
        steps.push(Step::MinifyImages {
            quality_min: 70,
            quality_max: 80,
        });
        if profile == Profile::Basic {
            steps.push(Step::ConvertWebp { quality: 60.0 });
        }
    }

    if profile == Profile::TypeScript {
        steps.push(Step::CriticalCss {
            viewport: CRITICAL_VIEWPORT,
        });
    }

    if flags.analyze {
        steps.push(Step::Analyze);
    }

    BuildPlan {
        profile,
        flags,
        entries,
        pages,
        bundle,
        styles,
        page_options,
        steps,
    }
}

/// Strip any prefix up to and including an `images/` segment, preserving
/// the remaining subpath. Falls back to the bare filename.
pub fn image_output_name(source: &Path) -> String {
    let mut components: Vec<&str> = Vec::new();
    let mut seen_images = false;

    for comp in source.components() {
        if let std::path::Component::Normal(os) = comp {
            if let Some(s) = os.to_str() {
                if seen_images {
                    components.push(s);
                } else if s == "images" {
                    seen_images = true;
                }
            }
        }
    }

    if components.is_empty() {
        source
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("image")
            .to_string()
    } else {
        components.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_is_deterministic() {
        let flags = BuildFlags {
            production: true,
            clean: true,
            analyze: false,
        };

        assert_eq!(
            plan(Profile::TypeScript, flags),
            plan(Profile::TypeScript, flags)
        );
        assert_eq!(plan(Profile::Basic, flags), plan(Profile::Basic, flags));
    }

    #[test]
    fn production_toggles_minification_and_source_maps() {
        let dev = plan(Profile::MultiPage, BuildFlags::default());
        assert!(!dev.bundle.minify);
        assert!(dev.bundle.source_maps);
        assert!(!dev.styles.minify);
        assert!(!dev.has_step(&Step::MinifyImages {
            quality_min: 0,
            quality_max: 0
        }));

        let prod = plan(
            Profile::MultiPage,
            BuildFlags {
                production: true,
                ..Default::default()
            },
        );
        assert!(prod.bundle.minify);
        assert!(!prod.bundle.source_maps);
        assert!(prod.styles.minify);
        assert!(prod.has_step(&Step::MinifyImages {
            quality_min: 0,
            quality_max: 0
        }));
    }

    #[test]
    fn clean_step_follows_flag_in_later_profiles() {
        let without = plan(Profile::MultiPage, BuildFlags::default());
        assert!(!without.has_step(&Step::Clean { dry_run: false }));

        let with = plan(
            Profile::MultiPage,
            BuildFlags {
                clean: true,
                ..Default::default()
            },
        );
        assert!(with.steps.contains(&Step::Clean { dry_run: false }));
    }

    #[test]
    fn basic_profile_always_cleans_dry_run_in_dev() {
        let dev = plan(Profile::Basic, BuildFlags::default());
        assert!(dev.steps.contains(&Step::Clean { dry_run: true }));

        let prod = plan(
            Profile::Basic,
            BuildFlags {
                production: true,
                ..Default::default()
            },
        );
        assert!(prod.steps.contains(&Step::Clean { dry_run: false }));
    }

    #[test]
    fn webp_conversion_only_in_basic_production() {
        let basic = plan(
            Profile::Basic,
            BuildFlags {
                production: true,
                ..Default::default()
            },
        );
        assert!(basic.has_step(&Step::ConvertWebp { quality: 0.0 }));

        let multi = plan(
            Profile::MultiPage,
            BuildFlags {
                production: true,
                ..Default::default()
            },
        );
        assert!(!multi.has_step(&Step::ConvertWebp { quality: 0.0 }));
    }

    #[test]
    fn typescript_profile_adds_critical_css_and_defer() {
        let ts = plan(Profile::TypeScript, BuildFlags::default());
        assert!(ts.has_step(&Step::CriticalCss {
            viewport: CRITICAL_VIEWPORT
        }));
        assert!(ts.page_options.defer_scripts);
        assert_eq!(ts.bundle.resolve_extensions, vec!["ts", "js"]);

        let multi = plan(Profile::MultiPage, BuildFlags::default());
        assert!(!multi.has_step(&Step::CriticalCss {
            viewport: CRITICAL_VIEWPORT
        }));
        assert!(!multi.page_options.defer_scripts);
    }

    #[test]
    fn entries_map_to_bundle_paths() {
        let p = plan(Profile::MultiPage, BuildFlags::default());
        let paths: Vec<String> = p.entries.iter().map(|e| e.bundle_path()).collect();
        assert_eq!(paths, vec!["js/main.bundle.js", "js/sub.bundle.js"]);
    }

    #[test]
    fn analyze_step_is_flag_gated() {
        let off = plan(Profile::TypeScript, BuildFlags::default());
        assert!(!off.has_step(&Step::Analyze));

        let on = plan(
            Profile::TypeScript,
            BuildFlags {
                analyze: true,
                ..Default::default()
            },
        );
        assert!(on.has_step(&Step::Analyze));
    }

    #[test]
    fn image_names_strip_prefix_up_to_images_segment() {
        assert_eq!(
            image_output_name(Path::new("src/images/sub/icon.png")),
            "sub/icon.png"
        );
        assert_eq!(
            image_output_name(Path::new("src/images/logo.jpg")),
            "logo.jpg"
        );
        assert_eq!(image_output_name(Path::new("other/pic.gif")), "pic.gif");
    }
}
