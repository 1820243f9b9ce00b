//! Standalone WebP pre-generation tool.
//!
//! Converts every `.jpg`/`.png` under `src/images/` into a `.webp` sibling
//! under `dist/images/`, preserving subdirectories. Paths and quality are
//! fixed; run it from the project root. Any failed conversion aborts the
//! run with a non-zero exit.

use std::path::Path;

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use lamina_pipeline::webp::generate_webp_tree;

const SOURCE_DIR: &str = "src/images";
const OUTPUT_DIR: &str = "dist/images";

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::new("info"))
        .with_target(false)
        .init();

    let source = Path::new(SOURCE_DIR);
    if !source.is_dir() {
        anyhow::bail!("No image directory at {}", SOURCE_DIR);
    }

    let produced = generate_webp_tree(source, Path::new(OUTPUT_DIR))?;

    for path in &produced {
        tracing::info!("wrote {}", path.display());
    }
    tracing::info!("Converted {} images", produced.len());

    Ok(())
}
