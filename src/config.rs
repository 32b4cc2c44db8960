//! Project configuration – conventional directory layout and environment
//! toggles consumed by the orchestrator.

use std::path::{Path, PathBuf};

/// Environment variable toggling CSS/bundle pre-compilation (default: on).
pub const PRECOMPILE_ENV: &str = "PDF_PRESS_PRECOMPILE";

/// Environment variable enabling verbose pipeline logging.
pub const DEBUG_ENV: &str = "PDF_PRESS_DEBUG";

/// Resolved layout of the consuming project.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Root of the consuming project.
    pub project_root: PathBuf,
    /// Templates root; every direct `.tsx` child is a template candidate.
    pub templates_dir: PathBuf,
}

impl ProjectConfig {
    /// Conventional layout: `<root>/templates` with styles in
    /// `<root>/templates/styles`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let templates_dir = project_root.join("templates");
        Self {
            project_root,
            templates_dir,
        }
    }

    /// Override the templates directory (resolved against the project root
    /// when relative).
    pub fn with_templates_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.templates_dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.project_root.join(dir)
        };
        self
    }

    /// Optional styles subdirectory inside the templates root.
    pub fn styles_dir(&self) -> PathBuf {
        self.templates_dir.join("styles")
    }

    /// Optional conventional root stylesheet inside the templates root.
    pub fn root_stylesheet(&self) -> PathBuf {
        self.templates_dir.join("styles.css")
    }

    /// Cache directory under the project's dependency cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.project_root
            .join("node_modules")
            .join(".cache")
            .join("pdf-press")
    }

    /// Fixed manifest location.
    pub fn manifest_path(&self) -> PathBuf {
        self.cache_dir().join("manifest.json")
    }

    /// Generated CSS module location.
    pub fn css_module_path(&self) -> PathBuf {
        self.cache_dir().join("css.mjs")
    }

    /// Per-template bundle output path.
    pub fn bundle_path(&self, id: &str) -> PathBuf {
        self.cache_dir().join("bundles").join(format!("{id}.js"))
    }
}

/// Whether pre-compilation is enabled. Defaults to true; `0`, `false`, or
/// `off` disable it.
pub fn precompile_enabled() -> bool {
    match std::env::var(PRECOMPILE_ENV) {
        Ok(value) => !matches!(value.trim(), "0" | "false" | "off"),
        Err(_) => true,
    }
}

/// Whether verbose debug logging was requested via the environment.
pub fn debug_enabled() -> bool {
    matches!(std::env::var(DEBUG_ENV).as_deref(), Ok("1") | Ok("true") | Ok("on"))
}
