//! Bundle-size report, gated behind the `analyze` flag.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::bundle::Chunk;
use crate::error::BuildError;
use crate::graph::ModuleGraph;

#[derive(Debug, Serialize)]
pub struct ModuleReport {
    pub path: String,
    pub bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct ChunkReport {
    pub name: String,
    pub output: String,
    pub bytes: usize,
    pub modules: Vec<ModuleReport>,
}

/// Write `report.json` into the output directory and log a summary.
pub fn write_report(
    output_dir: &Path,
    chunks: &[Chunk],
    graph: &ModuleGraph,
) -> Result<PathBuf, BuildError> {
    let report: Vec<ChunkReport> = chunks
        .iter()
        .map(|chunk| ChunkReport {
            name: chunk.name.clone(),
            output: chunk.output_path(),
            bytes: chunk.code.len(),
            modules: chunk
                .modules
                .iter()
                .map(|m| ModuleReport {
                    path: m.display().to_string(),
                    bytes: graph.modules.get(m).map(|s| s.source.len()).unwrap_or(0),
                })
                .collect(),
        })
        .collect();

    for chunk in &report {
        tracing::info!(
            "chunk {} -> {} ({} bytes, {} modules)",
            chunk.name,
            chunk.output,
            chunk.bytes,
            chunk.modules.len()
        );
    }

    let json = serde_json::to_string_pretty(&report).map_err(BuildError::write)?;
    let path = output_dir.join("report.json");
    fs::write(&path, json).map_err(BuildError::write)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn writes_chunk_sizes() {
        let temp = tempdir().unwrap();
        let chunks = vec![Chunk {
            name: "main".to_string(),
            code: "console.log(1);".to_string(),
            modules: vec![PathBuf::from("src/js/main.js")],
        }];
        let graph = ModuleGraph {
            modules: HashMap::new(),
            entry_order: vec![],
            stylesheets: vec![],
        };

        let path = write_report(temp.path(), &chunks, &graph).unwrap();
        let json = fs::read_to_string(path).unwrap();

        assert!(json.contains("js/main.bundle.js"));
        assert!(json.contains("\"bytes\": 15"));
    }
}
