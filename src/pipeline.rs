//! Pipeline – one full pre-compilation pass over a project: discover
//! templates, extract classes, compile CSS, bundle client templates, and
//! persist the manifest.
//!
//! Within a pass CSS compilation always runs before bundling. Artifacts are
//! overwritten wholesale; there is no incremental CSS patching.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::bundle::{BundleOptions, ClientBundler, TemplateEntry};
use crate::config::{self, ProjectConfig};
use crate::css::CssCompiler;
use crate::error::{PressError, Result};
use crate::exports;
use crate::extract::extract_classes;
use crate::manifest::{
    css_module_source, manifest_module_source, now_millis, Manifest, ManifestEntry, ManifestStore,
};

/// Source extensions scanned for class tokens.
pub const SOURCE_EXTENSIONS: &[&str] = &["tsx", "jsx", "ts", "js"];

/// Outcome of one compilation pass, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileSummary {
    pub templates: usize,
    pub classes: usize,
    pub css_bytes: usize,
}

/// Owns the process-scoped pipeline state: the compiler-handle cache, the
/// manifest store, and the bundler. One instance per project; independent
/// pipelines can coexist in one process.
pub struct Pipeline {
    config: ProjectConfig,
    css: CssCompiler,
    bundler: ClientBundler,
    store: ManifestStore,
    inline_bundles: bool,
}

impl Pipeline {
    pub fn new(config: ProjectConfig) -> Self {
        let css = CssCompiler::with_default_engine(config.styles_dir());
        let store = ManifestStore::new(config.clone());
        Self {
            config,
            css,
            bundler: ClientBundler::with_default_bundler(),
            store,
            inline_bundles: false,
        }
    }

    /// Embed bundle code into the manifest for serverless targets that
    /// cannot read bundle files at request time.
    pub fn with_inline_bundles(mut self, inline: bool) -> Self {
        self.inline_bundles = inline;
        self
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Full pass: CSS first, then client bundles, then the manifest.
    pub fn compile_all(&mut self) -> Result<CompileSummary> {
        if !config::precompile_enabled() {
            log::info!("pre-compilation disabled via {}", config::PRECOMPILE_ENV);
            return Ok(CompileSummary::default());
        }

        let templates = self.discover_templates()?;
        let tokens = self.collect_classes()?;
        let classes = tokens.len();
        let css_bytes = self.compile_css(&tokens)?;

        if templates.is_empty() {
            log::warn!(
                "no template files found in '{}'; wrote empty css module",
                self.config.templates_dir.display()
            );
            return Ok(CompileSummary {
                templates: 0,
                classes,
                css_bytes,
            });
        }

        let mut manifest = Manifest::new();
        for template in &templates {
            let source =
                std::fs::read_to_string(template).map_err(|e| PressError::io(template, e))?;
            if !exports::has_default_export(&source) {
                log::debug!("skipping '{}': no default export", template.display());
                continue;
            }
            let id = template
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("template")
                .to_string();

            let code = self.bundler.bundle(&BundleOptions {
                template: Some(TemplateEntry {
                    source: template.clone(),
                    props: json!({}),
                }),
                components: None,
            })?;

            let bundle_path = self.config.bundle_path(&id);
            if let Some(parent) = bundle_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PressError::io(parent, e))?;
            }
            std::fs::write(&bundle_path, &code).map_err(|e| PressError::io(&bundle_path, e))?;

            manifest.insert(ManifestEntry {
                id,
                source_path: template.clone(),
                bundle_path,
                bundled_at: now_millis(),
                code: self.inline_bundles.then_some(code),
            });
        }

        self.store.save(&manifest)?;
        let module_path = self.config.cache_dir().join("manifest.mjs");
        std::fs::write(&module_path, manifest_module_source(&manifest))
            .map_err(|e| PressError::io(&module_path, e))?;

        log::info!(
            "compiled {} template(s), {} class(es), {} bytes of css",
            manifest.templates.len(),
            classes,
            css_bytes
        );
        Ok(CompileSummary {
            templates: manifest.templates.len(),
            classes,
            css_bytes,
        })
    }

    /// CSS-only pass, used when a pure stylesheet change arrives.
    pub fn compile_css_only(&mut self) -> Result<usize> {
        let tokens = self.collect_classes()?;
        self.compile_css(&tokens)
    }

    fn compile_css(&mut self, tokens: &BTreeSet<String>) -> Result<usize> {
        let base = std::fs::read_to_string(self.config.root_stylesheet()).ok();
        let css = self.css.compile(base.as_deref(), tokens)?;

        let module_path = self.config.css_module_path();
        if let Some(parent) = module_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PressError::io(parent, e))?;
        }
        std::fs::write(&module_path, css_module_source(&css))
            .map_err(|e| PressError::io(&module_path, e))?;
        Ok(css.len())
    }

    /// Direct `.tsx` children of the templates root, sorted for stable ids.
    fn discover_templates(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.config.templates_dir;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };
        let mut templates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PressError::io(dir, e))?;
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("tsx") {
                templates.push(path);
            }
        }
        templates.sort();
        Ok(templates)
    }

    /// Union of class tokens across the whole templates tree.
    fn collect_classes(&self) -> Result<BTreeSet<String>> {
        let mut tokens = BTreeSet::new();
        let mut stack = vec![self.config.templates_dir.clone()];
        while let Some(dir) = stack.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            for entry in entries {
                let entry = entry.map_err(|e| PressError::io(&dir, e))?;
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if is_source_file(&path) {
                    let source =
                        std::fs::read_to_string(&path).map_err(|e| PressError::io(&path, e))?;
                    tokens.append(&mut extract_classes(&source));
                }
            }
        }
        Ok(tokens)
    }
}

/// True for extensions the class extractor understands.
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_with_template(source: &str) -> (tempfile::TempDir, ProjectConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig::new(dir.path());
        std::fs::create_dir_all(&config.templates_dir).unwrap();
        std::fs::write(config.templates_dir.join("invoice.tsx"), source).unwrap();
        (dir, config)
    }

    #[test]
    fn full_pass_writes_css_module_bundle_and_manifest() {
        let (_dir, config) = project_with_template(
            "export default function Invoice() { return <div className=\"p-6 font-bold\"/>; }",
        );
        let mut pipeline = Pipeline::new(config.clone());
        let summary = pipeline.compile_all().unwrap();

        assert_eq!(summary.templates, 1);
        assert_eq!(summary.classes, 2);
        assert!(summary.css_bytes > 0);

        let css_module = std::fs::read_to_string(config.css_module_path()).unwrap();
        assert!(css_module.contains("export const css ="));
        assert!(css_module.contains("font-weight: 700"));

        let manifest = ManifestStore::new(config).load().unwrap();
        let entry = &manifest.templates["invoice"];
        assert!(entry.bundle_path.is_file());
        assert!(entry.bundled_at > 0);
        let bundle = std::fs::read_to_string(&entry.bundle_path).unwrap();
        assert!(bundle.contains(crate::bundle::MOUNT_CONTAINER_ID));
    }

    #[test]
    fn inline_bundles_embed_code_in_the_manifest() {
        let (_dir, config) =
            project_with_template("export default function Invoice() { return null; }");
        let mut pipeline = Pipeline::new(config.clone()).with_inline_bundles(true);
        pipeline.compile_all().unwrap();

        let manifest = ManifestStore::new(config).load().unwrap();
        let entry = &manifest.templates["invoice"];
        assert!(entry
            .code
            .as_deref()
            .is_some_and(|c| c.contains("__pdfPressMount")));
    }

    #[test]
    fn zero_templates_warns_and_writes_empty_css_module() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig::new(dir.path());
        std::fs::create_dir_all(&config.templates_dir).unwrap();

        let mut pipeline = Pipeline::new(config.clone());
        let summary = pipeline.compile_all().unwrap();
        assert_eq!(summary.templates, 0);
        assert!(config.css_module_path().is_file());
    }

    #[test]
    fn nested_files_contribute_classes_but_not_templates() {
        let (_dir, config) = project_with_template(
            "export default function Invoice() { return <div className=\"p-6\"/>; }",
        );
        let nested = config.templates_dir.join("partials");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            nested.join("row.tsx"),
            "export default function Row() { return <div className=\"text-sm\"/>; }",
        )
        .unwrap();

        let mut pipeline = Pipeline::new(config.clone());
        let summary = pipeline.compile_all().unwrap();
        // Only the direct child is a template; both files contribute classes.
        assert_eq!(summary.templates, 1);
        assert_eq!(summary.classes, 2);

        let manifest = ManifestStore::new(config).load().unwrap();
        assert!(manifest.templates.contains_key("invoice"));
        assert!(!manifest.templates.contains_key("row"));
    }

    #[test]
    fn templates_without_default_export_are_skipped() {
        let (_dir, config) = project_with_template("export function Helper() { return null; }");
        let mut pipeline = Pipeline::new(config.clone());
        let summary = pipeline.compile_all().unwrap();
        assert_eq!(summary.templates, 0);
        let manifest = ManifestStore::new(config).load().unwrap();
        assert!(manifest.templates.is_empty());
    }

    #[test]
    fn css_only_pass_rewrites_the_css_module() {
        let (_dir, config) = project_with_template(
            "export default function Invoice() { return <div className=\"mb-4\"/>; }",
        );
        let mut pipeline = Pipeline::new(config.clone());
        let bytes = pipeline.compile_css_only().unwrap();
        assert!(bytes > 0);
        let css_module = std::fs::read_to_string(config.css_module_path()).unwrap();
        assert!(css_module.contains("margin-bottom: 16px"));
        // No manifest was written.
        assert!(ManifestStore::new(config).load().is_none());
    }
}
