//! Front-end asset pipeline for lamina sites.
//!
//! Bundles JavaScript/TypeScript entries, extracts and optimizes styles,
//! generates HTML pages from templates, and emits referenced images.

pub mod analyze;
pub mod assets;
pub mod builder;
pub mod bundle;
pub mod cache;
pub mod config;
pub mod critical;
pub mod error;
pub mod graph;
pub mod html;
pub mod images;
pub mod styles;
pub mod transform;
pub mod webp;

pub use builder::{BuildSummary, Pipeline};
pub use config::{plan, BuildFlags, BuildPlan, Profile, SitePaths};
pub use error::BuildError;
