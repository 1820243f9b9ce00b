//! Module graph construction.
//!
//! Walks each entry's static imports, classifying every resolved file as a
//! script, stylesheet, or image. Scripts are parsed for the byte spans of
//! their import/export statements so the bundler can rewrite them without
//! re-parsing; stylesheets are collected in discovery order for extraction;
//! images are handled by the url pass at bundle time.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use oxc_allocator::Allocator;
use oxc_ast::ast::{ImportDeclarationSpecifier, Statement};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

use crate::cache::TransformCache;
use crate::config::{BundleOptions, SitePaths};
use crate::error::BuildError;
use crate::transform;

/// What an import specifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    Script(PathBuf),
    Stylesheet(PathBuf),
    Image(PathBuf),
}

/// One import statement in a script module.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub specifier: String,
    /// Byte range of the whole statement.
    pub span: (usize, usize),
    /// Local name of the default binding, if any.
    pub default_binding: Option<String>,
    pub target: ImportTarget,
}

/// A rewrite the bundler applies to an export statement.
#[derive(Debug, Clone, Copy)]
pub enum ExportEdit {
    /// `export function f() {}`: keep the declaration, drop the keyword.
    StripKeyword { stmt_start: usize, decl_start: usize },

    /// `export { a, b }` and re-export forms: drop the statement.
    Remove { start: usize, end: usize },

    /// `export default <expr>`: bind the expression to a module-local name.
    Default { stmt_start: usize, decl_start: usize },
}

/// A script module ready for bundling.
#[derive(Debug, Clone)]
pub struct ScriptModule {
    pub path: PathBuf,
    /// JS source after any transpilation.
    pub source: String,
    pub imports: Vec<ImportRecord>,
    pub export_edits: Vec<ExportEdit>,
    /// Resolved through `node_modules/`.
    pub vendor: bool,
}

/// Dependency graph over all entries.
#[derive(Debug)]
pub struct ModuleGraph {
    pub modules: HashMap<PathBuf, ScriptModule>,
    /// Per entry: dependency-first module order.
    pub entry_order: Vec<(String, Vec<PathBuf>)>,
    /// Stylesheets in first-discovery order.
    pub stylesheets: Vec<PathBuf>,
}

impl ModuleGraph {
    /// Build the graph for the given entries.
    pub fn build(
        entries: &[crate::config::Entry],
        paths: &SitePaths,
        options: &BundleOptions,
        cache: Option<&TransformCache>,
    ) -> Result<Self, BuildError> {
        let mut builder = GraphBuilder {
            paths,
            options,
            cache,
            modules: HashMap::new(),
            stylesheets: Vec::new(),
        };

        let mut entry_order = Vec::new();

        for entry in entries {
            let entry_path = normalize(&paths.root.join(&entry.module));
            let mut order = Vec::new();
            let mut visiting = Vec::new();
            builder.visit(&entry_path, &mut order, &mut visiting)?;
            entry_order.push((entry.name.clone(), order));
        }

        Ok(ModuleGraph {
            modules: builder.modules,
            entry_order,
            stylesheets: builder.stylesheets,
        })
    }
}

struct GraphBuilder<'a> {
    paths: &'a SitePaths,
    options: &'a BundleOptions,
    cache: Option<&'a TransformCache>,
    modules: HashMap<PathBuf, ScriptModule>,
    stylesheets: Vec<PathBuf>,
}

impl GraphBuilder<'_> {
    /// Depth-first, dependencies before dependents.
    fn visit(
        &mut self,
        path: &Path,
        order: &mut Vec<PathBuf>,
        visiting: &mut Vec<PathBuf>,
    ) -> Result<(), BuildError> {
        if order.iter().any(|p| p == path) {
            return Ok(());
        }
        if visiting.iter().any(|p| p == path) {
            tracing::warn!("circular import involving {}", path.display());
            return Ok(());
        }

        visiting.push(path.to_path_buf());

        if !self.modules.contains_key(path) {
            let module = self.load(path)?;
            self.modules.insert(path.to_path_buf(), module);
        }

        let targets: Vec<ImportTarget> = self.modules[path]
            .imports
            .iter()
            .map(|i| i.target.clone())
            .collect();

        for target in targets {
            match target {
                ImportTarget::Script(dep) => self.visit(&dep, order, visiting)?,
                ImportTarget::Stylesheet(sheet) => {
                    if !self.stylesheets.contains(&sheet) {
                        self.stylesheets.push(sheet);
                    }
                }
                // Emitted (or inlined) by the bundler's url pass.
                ImportTarget::Image(_) => {}
            }
        }

        visiting.pop();
        order.push(path.to_path_buf());
        Ok(())
    }

    /// Read, lint, transpile if TypeScript, and parse one module.
    fn load(&mut self, path: &Path) -> Result<ScriptModule, BuildError> {
        let raw = fs::read_to_string(path).map_err(|e| BuildError::read(path, e))?;

        transform::lint(&raw, path);

        let is_ts = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "ts");

        let source = if is_ts {
            self.transpile_cached(&raw, path)?
        } else {
            raw
        };

        let (imports, export_edits) = self.parse_records(&source, path)?;

        let vendor = path.starts_with(self.paths.node_modules_dir());

        Ok(ScriptModule {
            path: path.to_path_buf(),
            source,
            imports,
            export_edits,
            vendor,
        })
    }

    fn transpile_cached(&self, source: &str, path: &Path) -> Result<String, BuildError> {
        if let Some(cache) = self.cache {
            let key = TransformCache::key(source);
            if let Some(hit) = cache.get(&key) {
                tracing::debug!("cache hit for {}", path.display());
                return Ok(hit);
            }
            let out = transform::transpile_ts(source, path)?;
            cache.put(&key, &out);
            return Ok(out);
        }
        transform::transpile_ts(source, path)
    }

    /// Collect import/export statement spans and resolve import targets.
    fn parse_records(
        &self,
        source: &str,
        path: &Path,
    ) -> Result<(Vec<ImportRecord>, Vec<ExportEdit>), BuildError> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();

        if ret.panicked {
            return Err(BuildError::Parse {
                path: path.display().to_string(),
                message: ret
                    .errors
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "parser panicked".to_string()),
            });
        }

        let mut imports = Vec::new();
        let mut export_edits = Vec::new();

        for stmt in &ret.program.body {
            match stmt {
                Statement::ImportDeclaration(decl) => {
                    let specifier = decl.source.value.to_string();
                    let target = self.resolve(&specifier, path)?;

                    let default_binding = decl.specifiers.as_ref().and_then(|specs| {
                        specs.iter().find_map(|s| match s {
                            ImportDeclarationSpecifier::ImportDefaultSpecifier(d) => {
                                Some(d.local.name.to_string())
                            }
                            _ => None,
                        })
                    });

                    imports.push(ImportRecord {
                        specifier,
                        span: (decl.span.start as usize, decl.span.end as usize),
                        default_binding,
                        target,
                    });
                }
                Statement::ExportNamedDeclaration(decl) => {
                    if let Some(source_lit) = &decl.source {
                        // Re-export: pull the dependency in, drop the statement.
                        let specifier = source_lit.value.to_string();
                        let target = self.resolve(&specifier, path)?;
                        imports.push(ImportRecord {
                            specifier,
                            span: (decl.span.start as usize, decl.span.end as usize),
                            default_binding: None,
                            target,
                        });
                    } else if let Some(inner) = &decl.declaration {
                        export_edits.push(ExportEdit::StripKeyword {
                            stmt_start: decl.span.start as usize,
                            decl_start: inner.span().start as usize,
                        });
                    } else {
                        export_edits.push(ExportEdit::Remove {
                            start: decl.span.start as usize,
                            end: decl.span.end as usize,
                        });
                    }
                }
                Statement::ExportDefaultDeclaration(decl) => {
                    export_edits.push(ExportEdit::Default {
                        stmt_start: decl.span.start as usize,
                        decl_start: decl.declaration.span().start as usize,
                    });
                }
                Statement::ExportAllDeclaration(decl) => {
                    let specifier = decl.source.value.to_string();
                    let target = self.resolve(&specifier, path)?;
                    imports.push(ImportRecord {
                        specifier,
                        span: (decl.span.start as usize, decl.span.end as usize),
                        default_binding: None,
                        target,
                    });
                }
                _ => {}
            }
        }

        Ok((imports, export_edits))
    }

    /// Resolve an import specifier to a file, applying the `images`/`css`
    /// aliases, relative resolution, and `node_modules` lookup.
    fn resolve(&self, specifier: &str, importer: &Path) -> Result<ImportTarget, BuildError> {
        let unresolved = || BuildError::Resolve {
            specifier: specifier.to_string(),
            importer: importer.display().to_string(),
        };

        let candidate = if let Some(rest) = specifier.strip_prefix("images/") {
            self.paths.images_dir().join(rest)
        } else if let Some(rest) = specifier.strip_prefix("css/") {
            self.paths.css_dir().join(rest)
        } else if specifier.starts_with("./") || specifier.starts_with("../") {
            importer
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(specifier)
        } else {
            return self.resolve_bare(specifier).ok_or_else(unresolved);
        };

        let candidate = normalize(&candidate);
        self.finish_file(&candidate).ok_or_else(unresolved)
    }

    /// Bare specifier: look under `node_modules/`.
    fn resolve_bare(&self, specifier: &str) -> Option<ImportTarget> {
        let base = self.paths.node_modules_dir().join(specifier);

        if base.is_dir() {
            if let Ok(manifest) = fs::read_to_string(base.join("package.json")) {
                if let Ok(pkg) = serde_json::from_str::<serde_json::Value>(&manifest) {
                    if let Some(main) = pkg.get("main").and_then(|m| m.as_str()) {
                        let main_path = normalize(&base.join(main));
                        if let Some(t) = self.finish_file(&main_path) {
                            return Some(t);
                        }
                    }
                }
            }
            return self.finish_file(&base.join("index.js"));
        }

        self.finish_file(&base)
    }

    /// Try the candidate as-is, then with the configured extension order,
    /// then as a directory index.
    fn finish_file(&self, candidate: &Path) -> Option<ImportTarget> {
        if candidate.is_file() {
            return Some(classify(candidate));
        }

        for ext in &self.options.resolve_extensions {
            let with_ext = candidate.with_extension(ext);
            if with_ext.is_file() {
                return Some(classify(&with_ext));
            }
        }

        let index = candidate.join("index.js");
        if index.is_file() {
            return Some(classify(&index));
        }

        None
    }
}

fn classify(path: &Path) -> ImportTarget {
    match path.extension().and_then(|e| e.to_str()) {
        Some("css") | Some("scss") | Some("sass") => ImportTarget::Stylesheet(path.to_path_buf()),
        Some("jpg") | Some("jpeg") | Some("png") | Some("gif") => {
            ImportTarget::Image(path.to_path_buf())
        }
        _ => ImportTarget::Script(path.to_path_buf()),
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{plan, BuildFlags, Entry, Profile};
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn entry(name: &str, module: &str) -> Entry {
        Entry {
            name: name.to_string(),
            module: PathBuf::from(module),
        }
    }

    #[test]
    fn orders_dependencies_before_dependents() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(
            &root.join("src/js/main.js"),
            "import { helper } from './util.js';\nhelper();\n",
        );
        write(&root.join("src/js/util.js"), "export function helper() {}\n");

        let paths = SitePaths::new(root);
        let p = plan(Profile::Basic, BuildFlags::default());
        let graph =
            ModuleGraph::build(&[entry("main", "src/js/main.js")], &paths, &p.bundle, None)
                .unwrap();

        let (_, order) = &graph.entry_order[0];
        assert_eq!(order.len(), 2);
        assert!(order[0].ends_with("util.js"));
        assert!(order[1].ends_with("main.js"));
    }

    #[test]
    fn collects_stylesheets_via_alias() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(
            &root.join("src/js/main.js"),
            "import 'css/style.scss';\nconsole.log('hi');\n",
        );
        write(&root.join("src/css/style.scss"), "body { color: red; }\n");

        let paths = SitePaths::new(root);
        let p = plan(Profile::Basic, BuildFlags::default());
        let graph =
            ModuleGraph::build(&[entry("main", "src/js/main.js")], &paths, &p.bundle, None)
                .unwrap();

        assert_eq!(graph.stylesheets.len(), 1);
        assert!(graph.stylesheets[0].ends_with("src/css/style.scss"));
    }

    #[test]
    fn marks_node_modules_as_vendor() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(
            &root.join("src/js/main.js"),
            "import lib from 'somelib';\nlib();\n",
        );
        write(
            &root.join("node_modules/somelib/index.js"),
            "export default function lib() {}\n",
        );

        let paths = SitePaths::new(root);
        let p = plan(Profile::MultiPage, BuildFlags::default());
        let graph =
            ModuleGraph::build(&[entry("main", "src/js/main.js")], &paths, &p.bundle, None)
                .unwrap();

        let vendor_count = graph.modules.values().filter(|m| m.vendor).count();
        assert_eq!(vendor_count, 1);
    }

    #[test]
    fn typescript_resolves_ts_before_js() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(
            &root.join("src/ts/main.ts"),
            "import { x } from './dep';\nconsole.log(x);\n",
        );
        write(&root.join("src/ts/dep.ts"), "export const x: number = 1;\n");
        write(&root.join("src/ts/dep.js"), "export const x = 'js';\n");

        let paths = SitePaths::new(root);
        let p = plan(Profile::TypeScript, BuildFlags::default());
        let graph =
            ModuleGraph::build(&[entry("main", "src/ts/main.ts")], &paths, &p.bundle, None)
                .unwrap();

        assert!(graph
            .modules
            .keys()
            .any(|k| k.extension().is_some_and(|e| e == "ts")));
    }

    #[test]
    fn missing_import_is_a_resolve_error() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(&root.join("src/js/main.js"), "import './nope.js';\n");

        let paths = SitePaths::new(root);
        let p = plan(Profile::Basic, BuildFlags::default());
        let err = ModuleGraph::build(&[entry("main", "src/js/main.js")], &paths, &p.bundle, None)
            .unwrap_err();

        assert!(matches!(err, BuildError::Resolve { .. }));
    }

    #[test]
    fn normalize_collapses_parents() {
        assert_eq!(
            normalize(Path::new("src/js/../css/style.css")),
            PathBuf::from("src/css/style.css")
        );
    }
}
