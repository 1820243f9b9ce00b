//! Chunk assembly.
//!
//! Modules are stitched dependency-first into one flat scope per chunk:
//! import/export statements are rewritten out using the byte spans the
//! graph recorded, image imports become bound url strings, and the result
//! is minified (production) or re-printed with an inline source map
//! (development).

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::config::BundleOptions;
use crate::error::BuildError;
use crate::graph::{ExportEdit, ImportTarget, ModuleGraph, ScriptModule};
use crate::images::ImageStore;
use crate::transform;

/// One emitted script bundle.
#[derive(Debug)]
pub struct Chunk {
    pub name: String,
    pub code: String,
    /// Modules stitched into this chunk, in order.
    pub modules: Vec<PathBuf>,
}

impl Chunk {
    /// Output path relative to the output dir.
    pub fn output_path(&self) -> String {
        format!("js/{}.bundle.js", self.name)
    }
}

/// Assemble all chunks for the graph: one per entry, plus a shared
/// `vendor` chunk when splitting is enabled and vendor modules exist.
pub fn assemble_chunks(
    graph: &ModuleGraph,
    options: &BundleOptions,
    store: &mut ImageStore,
) -> Result<Vec<Chunk>, BuildError> {
    let mut chunks = Vec::new();

    if options.vendor_split {
        let mut vendor_modules: Vec<PathBuf> = Vec::new();
        for (_, order) in &graph.entry_order {
            for path in order {
                if graph.modules[path].vendor && !vendor_modules.contains(path) {
                    vendor_modules.push(path.clone());
                }
            }
        }

        if !vendor_modules.is_empty() {
            chunks.push(build_chunk("vendor", &vendor_modules, graph, options, store)?);
        }
    }

    for (name, order) in &graph.entry_order {
        let modules: Vec<PathBuf> = order
            .iter()
            .filter(|p| !(options.vendor_split && graph.modules[*p].vendor))
            .cloned()
            .collect();

        chunks.push(build_chunk(name, &modules, graph, options, store)?);
    }

    Ok(chunks)
}

fn build_chunk(
    name: &str,
    modules: &[PathBuf],
    graph: &ModuleGraph,
    options: &BundleOptions,
    store: &mut ImageStore,
) -> Result<Chunk, BuildError> {
    let mut stitched = String::new();

    for path in modules {
        let module = &graph.modules[path];
        stitched.push_str(&rewrite_module(module, store)?);
        stitched.push('\n');
    }

    let bundle_name = format!("{name}.bundle.js");

    let code = if options.minify {
        transform::minify(&stitched, &bundle_name, options.drop_console)?
    } else if options.source_maps {
        let (code, map) = transform::codegen_with_map(&stitched, &bundle_name)?;
        match map {
            Some(json) => format!(
                "{code}\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}\n",
                BASE64.encode(json.as_bytes())
            ),
            None => code,
        }
    } else {
        stitched
    };

    Ok(Chunk {
        name: name.to_string(),
        code,
        modules: modules.to_vec(),
    })
}

/// Replacement of one byte range of a module's source.
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Name a module's default export is bound to in flat scope.
///
/// Derived from the module path so the name is stable across chunks: an
/// entry chunk can reference a default export defined in the vendor chunk.
fn default_export_name(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("__default_{}", &digest[..8])
}

/// Rewrite one module's import/export statements for flat concatenation.
fn rewrite_module(module: &ScriptModule, store: &mut ImageStore) -> Result<String, BuildError> {
    let mut edits: Vec<Edit> = Vec::new();

    for import in &module.imports {
        let text = match (&import.target, &import.default_binding) {
            (ImportTarget::Image(image_path), Some(binding)) => {
                let url = store.url_for(image_path)?;
                format!("var {binding} = \"{url}\";")
            }
            (ImportTarget::Script(dep), Some(binding)) => {
                format!("var {binding} = {};", default_export_name(dep))
            }
            // Named script imports are satisfied by chunk order; stylesheet
            // imports by the extraction step.
            _ => String::new(),
        };
        edits.push(Edit {
            start: import.span.0,
            end: import.span.1,
            text,
        });
    }

    for edit in &module.export_edits {
        match *edit {
            ExportEdit::StripKeyword {
                stmt_start,
                decl_start,
            } => edits.push(Edit {
                start: stmt_start,
                end: decl_start,
                text: String::new(),
            }),
            ExportEdit::Remove { start, end } => edits.push(Edit {
                start,
                end,
                text: String::new(),
            }),
            ExportEdit::Default {
                stmt_start,
                decl_start,
            } => edits.push(Edit {
                start: stmt_start,
                end: decl_start,
                text: format!("var {} = ", default_export_name(&module.path)),
            }),
        }
    }

    edits.sort_by(|a, b| b.start.cmp(&a.start));

    let mut source = module.source.clone();
    for edit in edits {
        source.replace_range(edit.start..edit.end, &edit.text);
    }

    Ok(source)
}
