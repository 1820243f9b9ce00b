//! Pipeline orchestration.
//!
//! Runs one build: clean, graph the entries, emit chunks, then execute the
//! plan's remaining steps in order. The output tree is a deterministic
//! function of the source tree and the plan.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use crate::analyze::write_report;
use crate::assets::{clean_output, copy_assets};
use crate::bundle::assemble_chunks;
use crate::cache::TransformCache;
use crate::config::{BuildPlan, SitePaths, Step};
use crate::critical::{inline_critical, CriticalCssExtractor, SelectorUsageExtractor};
use crate::error::BuildError;
use crate::graph::ModuleGraph;
use crate::html::{available_chunks, inject_tags, lint_html, rewrite_images, TemplateEngine};
use crate::images::{convert_emitted_to_webp, minify_emitted, ImageMinifier, ImageStore, ReencodeMinifier};
use crate::styles::{collect_css, html_symbols, lint_css, transform_css, unused_symbols};

/// Result of one build.
#[derive(Debug)]
pub struct BuildSummary {
    pub chunks: usize,
    pub pages: usize,
    /// Image files emitted under `images/`.
    pub images: usize,
    pub duration_ms: u64,
    pub output_dir: PathBuf,
}

/// One configured build pipeline.
pub struct Pipeline {
    plan: BuildPlan,
    paths: SitePaths,
    title: String,
    minifier: Box<dyn ImageMinifier>,
    critical: Box<dyn CriticalCssExtractor>,
}

impl Pipeline {
    pub fn new(plan: BuildPlan, paths: SitePaths, title: impl Into<String>) -> Self {
        Self {
            plan,
            paths,
            title: title.into(),
            minifier: Box::new(ReencodeMinifier),
            critical: Box::new(SelectorUsageExtractor),
        }
    }

    /// Swap the image minification backend.
    pub fn with_minifier(mut self, minifier: Box<dyn ImageMinifier>) -> Self {
        self.minifier = minifier;
        self
    }

    /// Swap the critical-CSS backend.
    pub fn with_critical_extractor(mut self, extractor: Box<dyn CriticalCssExtractor>) -> Self {
        self.critical = extractor;
        self
    }

    /// Run the build.
    pub fn build(&self) -> Result<BuildSummary, BuildError> {
        let start = Instant::now();
        let out = self.paths.output_dir.clone();

        // Cleaning runs before anything is emitted.
        for step in &self.plan.steps {
            if let Step::Clean { dry_run } = step {
                let seen = clean_output(&out, *dry_run)?;
                tracing::info!(
                    "clean: {} {} entries",
                    if *dry_run { "would remove" } else { "removed" },
                    seen
                );
            }
        }

        fs::create_dir_all(out.join("js")).map_err(BuildError::write)?;

        // Module phase: graph, chunks, stylesheets, referenced images.
        let cache = self
            .plan
            .bundle
            .transform_cache
            .then(|| TransformCache::new(self.paths.cache_dir()));

        let graph = ModuleGraph::build(
            &self.plan.entries,
            &self.paths,
            &self.plan.bundle,
            cache.as_ref(),
        )?;

        let mut store = ImageStore::new(out.clone());
        let chunks = assemble_chunks(&graph, &self.plan.bundle, &mut store)?;

        for chunk in &chunks {
            let path = out.join(chunk.output_path());
            fs::write(&path, &chunk.code).map_err(BuildError::write)?;
            tracing::info!("emitted {} ({} bytes)", chunk.output_path(), chunk.code.len());
        }

        let css_raw = collect_css(&graph.stylesheets, &self.paths.images_dir(), &mut store)?;
        let has_css = !graph.stylesheets.is_empty();

        // Render templates up front; the template symbol set scopes the
        // unused-selector purge.
        let engine = TemplateEngine::new(&self.paths.html_dir());
        let emitted_chunks: HashSet<String> = chunks.iter().map(|c| c.name.clone()).collect();

        let mut template_symbols: HashSet<String> = HashSet::new();
        let mut rendered: Vec<(String, String)> = Vec::new();

        for page in &self.plan.pages {
            let html = engine.render(&page.template, &self.title)?;
            lint_html(&html, &page.template);
            template_symbols.extend(html_symbols(&html));

            let html = rewrite_images(
                &html,
                &self.paths.html_dir(),
                &self.paths.images_dir(),
                &mut store,
            )?;

            let html = inject_tags(
                &html,
                &available_chunks(&page.chunks, &emitted_chunks),
                has_css,
                self.plan.page_options.defer_scripts,
            );

            let html = if self.plan.page_options.minify {
                crate::html::minify_html(&html)
            } else {
                html
            };

            rendered.push((page.filename.clone(), html));
        }

        let mut final_css = String::new();

        // Cross-cutting steps in plan order.
        for step in &self.plan.steps {
            match step {
                Step::Clean { .. } => {}

                Step::Pages => {
                    for (filename, html) in &rendered {
                        fs::write(out.join(filename), html).map_err(BuildError::write)?;
                        tracing::info!("generated {}", filename);
                    }
                }

                Step::ExtractCss => {
                    if !has_css {
                        continue;
                    }
                    let unused = if self.plan.styles.purge_unused {
                        unused_symbols(&css_raw, &template_symbols)
                    } else {
                        HashSet::new()
                    };
                    final_css = transform_css(&css_raw, &self.plan.styles, unused)?;

                    fs::create_dir_all(out.join("css")).map_err(BuildError::write)?;
                    fs::write(out.join("css/style.css"), &final_css)
                        .map_err(BuildError::write)?;
                    tracing::info!("extracted css/style.css ({} bytes)", final_css.len());
                }

                Step::CopyAssets => {
                    let copied = copy_assets(&self.paths.assets_dir, &out)?;
                    tracing::info!("copied {} asset files", copied);
                }

                Step::LintStyles => {
                    if has_css {
                        lint_css(&css_raw);
                    }
                }

                Step::MinifyImages {
                    quality_min,
                    quality_max,
                } => {
                    let count =
                        minify_emitted(&out, self.minifier.as_ref(), *quality_min, *quality_max)?;
                    tracing::info!("minified {} images", count);
                }

                Step::ConvertWebp { quality } => {
                    let converted = convert_emitted_to_webp(&out, *quality)?;
                    tracing::info!("converted {} images to webp", converted);
                }

                Step::CriticalCss { viewport } => {
                    if final_css.is_empty() {
                        continue;
                    }
                    for (filename, _) in &rendered {
                        let path = out.join(filename);
                        let html =
                            fs::read_to_string(&path).map_err(|e| BuildError::read(&path, e))?;
                        let inlined =
                            inline_critical(&html, &final_css, *viewport, self.critical.as_ref())?;
                        fs::write(&path, inlined).map_err(BuildError::write)?;
                        tracing::info!("inlined critical css into {}", filename);
                    }
                }

                Step::Analyze => {
                    let path = write_report(&out, &chunks, &graph)?;
                    tracing::info!("bundle report at {}", path.display());
                }
            }
        }

        Ok(BuildSummary {
            chunks: chunks.len(),
            pages: rendered.len(),
            images: store.emitted_count(),
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir: out,
        })
    }

}
