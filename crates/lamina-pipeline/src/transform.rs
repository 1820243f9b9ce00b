//! Script transforms: lint diagnostics, TypeScript transpilation,
//! minification, and source-map generation.
//!
//! Each function owns its allocator and parses fresh, so callers deal in
//! plain strings.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{TransformOptions, Transformer};

use crate::error::BuildError;

fn source_type_for(path: &Path) -> SourceType {
    SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs())
}

/// Parse a module and log its diagnostics as warnings.
///
/// The lint pass never blocks the build; a module that fails to parse
/// outright is reported by the bundling stage instead.
pub fn lint(source: &str, path: &Path) {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(path)).parse();

    for err in &ret.errors {
        tracing::warn!("lint {}: {}", path.display(), err);
    }
}

/// Strip TypeScript syntax and downlevel the module to plain JS.
pub fn transpile_ts(source: &str, path: &Path) -> Result<String, BuildError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::ts()).parse();

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

    let mut program = ret.program;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();

    let options = TransformOptions::default();
    let transformer_ret =
        Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);

    if !transformer_ret.errors.is_empty() {
        return Err(BuildError::Transform {
            path: path.display().to_string(),
            message: transformer_ret.errors[0].to_string(),
        });
    }

    Ok(Codegen::new().build(&program).code)
}

/// Minify a finished chunk, optionally dropping `console.*` calls.
pub fn minify(source: &str, name: &str, drop_console: bool) -> Result<String, BuildError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();

    if ret.panicked {
        return Err(BuildError::Parse {
            path: name.to_string(),
            message: ret
                .errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "parser panicked".to_string()),
        });
    }

    let mut program = ret.program;

    let options = MinifierOptions {
        mangle: None,
        compress: Some(CompressOptions {
            drop_console,
            ..CompressOptions::default()
        }),
    };
    let _ = Minifier::new(options).build(&allocator, &mut program);

    let code = Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        })
        .build(&program)
        .code;

    Ok(code)
}

/// Re-print a chunk with a source map and return `(code, map_json)`.
pub fn codegen_with_map(source: &str, name: &str) -> Result<(String, Option<String>), BuildError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::mjs()).parse();

    if ret.panicked {
        return Err(BuildError::Parse {
            path: name.to_string(),
            message: ret
                .errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "parser panicked".to_string()),
        });
    }

    let out = Codegen::new()
        .with_options(CodegenOptions {
            source_map_path: Some(std::path::PathBuf::from(name)),
            ..CodegenOptions::default()
        })
        .build(&ret.program);

    let map = out.map.map(|m| m.to_json_string());
    Ok((out.code, map))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpiles_type_annotations_away() {
        let ts = "const greet = (name: string): string => `hi ${name}`;\nexport { greet };\n";
        let js = transpile_ts(ts, Path::new("src/ts/main.ts")).unwrap();

        assert!(!js.contains(": string"));
        assert!(js.contains("greet"));
    }

    #[test]
    fn minifies_and_drops_console() {
        let src = "function add(a, b) {\n  console.log('adding');\n  return a + b;\n}\nadd(1, 2);\n";
        let out = minify(src, "main.bundle.js", true).unwrap();

        assert!(!out.contains("console.log"));
        assert!(out.len() < src.len());
    }

    #[test]
    fn minify_keeps_console_when_not_dropping() {
        let src = "console.log('kept');\n";
        let out = minify(src, "main.bundle.js", false).unwrap();

        assert!(out.contains("console.log"));
    }

    #[test]
    fn emits_a_source_map() {
        let (code, map) = codegen_with_map("var a = 1;\n", "main.bundle.js").unwrap();

        assert!(code.contains("var a"));
        let map = map.expect("map requested");
        assert!(map.contains("\"mappings\""));
    }

    #[test]
    fn bad_syntax_is_a_parse_error() {
        let err = minify("function {", "broken.js", false).unwrap_err();
        assert!(matches!(err, BuildError::Parse { .. }));
    }
}
