//! Site build command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

use lamina_pipeline::{plan, BuildFlags, Pipeline, Profile, SitePaths};

/// Configuration file structure (site.toml).
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    site: SiteConfig,
    #[serde(default)]
    build: BuildSettings,
}

#[derive(Debug, Deserialize)]
struct SiteConfig {
    #[serde(default = "default_root")]
    root: String,
    #[serde(default = "default_output")]
    output: String,
    #[serde(default = "default_title")]
    title: String,
}

// An absent config file must behave like an empty one, so Default goes
// through the same functions serde uses for missing fields.
impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            output: default_output(),
            title: default_title(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BuildSettings {
    #[serde(default = "default_profile")]
    profile: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            profile: default_profile(),
        }
    }
}

fn default_root() -> String {
    ".".to_string()
}
fn default_output() -> String {
    "dist".to_string()
}
fn default_title() -> String {
    "Site".to_string()
}
fn default_profile() -> String {
    "multi".to_string()
}

/// Load configuration from site.toml if it exists.
/// Returns an error if the config file exists but is malformed.
fn load_config(path: &Path) -> Result<ConfigFile> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        tracing::info!("Loaded config from {}", path.display());
        return Ok(config);
    }
    Ok(ConfigFile::default())
}

fn parse_profile(name: &str) -> Result<Profile> {
    match name {
        "basic" => Ok(Profile::Basic),
        "multi" => Ok(Profile::MultiPage),
        "typescript" | "ts" => Ok(Profile::TypeScript),
        other => anyhow::bail!("Unknown profile '{}' (expected basic, multi, or typescript)", other),
    }
}

/// Run the build command.
pub async fn run(
    config: &Path,
    production: bool,
    clean: bool,
    analyze: bool,
    profile: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let file_config = load_config(config)?;

    let profile = parse_profile(profile.as_deref().unwrap_or(&file_config.build.profile))?;
    let flags = BuildFlags {
        production,
        clean,
        analyze,
    };

    tracing::info!(
        "Building ({} profile, {} mode)...",
        profile.as_str(),
        if production { "production" } else { "development" }
    );

    let mut paths = SitePaths::new(&file_config.site.root);
    paths.output_dir = output.unwrap_or_else(|| {
        Path::new(&file_config.site.root).join(&file_config.site.output)
    });

    let pipeline = Pipeline::new(plan(profile, flags), paths, file_config.site.title.as_str());
    let summary = tokio::task::spawn_blocking(move || pipeline.build()).await??;

    tracing::info!(
        "Built {} pages, {} chunks, {} images in {}ms",
        summary.pages,
        summary.chunks,
        summary.images,
        summary.duration_ms
    );

    tracing::info!("Output: {}", summary.output_dir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let config = load_config(Path::new("does-not-exist.toml")).unwrap();
        assert_eq!(config.site.root, ".");
        assert_eq!(config.site.output, "dist");
        assert_eq!(config.site.title, "Site");
        assert_eq!(config.build.profile, "multi");
        assert!(parse_profile(&config.build.profile).is_ok());
    }

    #[test]
    fn partial_config_keeps_defaults_for_the_rest() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("site.toml");
        fs::write(&path, "[site]\ntitle = \"My Site\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.site.title, "My Site");
        assert_eq!(config.site.output, "dist");
    }

    #[test]
    fn malformed_config_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("site.toml");
        fs::write(&path, "[site\n").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn profile_names_parse() {
        assert_eq!(parse_profile("basic").unwrap(), Profile::Basic);
        assert_eq!(parse_profile("multi").unwrap(), Profile::MultiPage);
        assert_eq!(parse_profile("ts").unwrap(), Profile::TypeScript);
        assert!(parse_profile("bogus").is_err());
    }
}
