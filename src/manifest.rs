//! Manifest store – persisted mapping from template id to its compiled
//! bundle, plus the in-memory cache used in serverless contexts where
//! filesystem access at request time is unreliable.
//!
//! The store is the single owner of both representations. Corruption is
//! non-fatal: a missing or unparsable manifest is a cache miss and callers
//! fall back to recompilation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::ProjectConfig;
use crate::error::{PressError, Result};

/// Wire-format version of the manifest file.
pub const MANIFEST_VERSION: &str = "1";

/// Virtual-module id for the generated CSS module. Must not begin with `.`
/// so host bundlers treat it as an alias, not a relative path.
pub const VIRTUAL_CSS_MODULE: &str = "pdf-press/css";

/// Virtual-module id for the generated manifest module.
pub const VIRTUAL_MANIFEST_MODULE: &str = "pdf-press/manifest";

/// One compiled template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    pub source_path: PathBuf,
    pub bundle_path: PathBuf,
    /// Milliseconds since the Unix epoch at bundle time.
    pub bundled_at: u64,
    /// Inlined bundle code for serverless targets; always preferred over
    /// reading `bundle_path` from disk when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// The persisted mapping from template id to compiled bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub templates: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            templates: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, entry: ManifestEntry) {
        self.templates.insert(entry.id.clone(), entry);
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Pluggable dynamic-resolution hook: environments that expose the manifest
/// as an importable module (rather than a file) install one of these so the
/// store can be populated without touching the filesystem.
pub trait ManifestLoader: Send {
    fn load(&self) -> Option<Manifest>;
}

/// Filesystem-backed manifest store with an in-memory cache.
pub struct ManifestStore {
    config: ProjectConfig,
    cached: Mutex<Option<Manifest>>,
    loader: Option<Box<dyn ManifestLoader>>,
}

impl ManifestStore {
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
            loader: None,
        }
    }

    /// Attach a dynamic-resolution loader tried by [`Self::get_dynamic`]
    /// before any filesystem access.
    pub fn with_loader(mut self, loader: Box<dyn ManifestLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Install the in-memory cache. Called once per process by generated
    /// bootstrap code that statically imports the manifest, so serverless
    /// packagers can trace and include it.
    pub fn set(&self, manifest: Manifest) {
        *self.cached.lock().expect("manifest cache poisoned") = Some(manifest);
    }

    /// Read the manifest file. `None` on missing or corrupt content.
    pub fn load(&self) -> Option<Manifest> {
        let path = self.config.manifest_path();
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                log::warn!("manifest at '{}' is unparsable ({e}); treating as cache miss", path.display());
                None
            }
        }
    }

    /// Bundle text for a template id: in-memory cache first, then the
    /// manifest file plus a bundle-file read.
    pub fn get(&self, id: &str) -> Option<String> {
        if let Some(manifest) = self.cached.lock().expect("manifest cache poisoned").as_ref() {
            return bundle_text(manifest, id);
        }
        let manifest = self.load()?;
        let text = bundle_text(&manifest, id);
        self.set(manifest);
        text
    }

    /// Same lookup, but consult the dynamic-resolution loader first (the
    /// request-serving path; build-time callers may use either).
    pub fn get_dynamic(&self, id: &str) -> Option<String> {
        if self.cached.lock().expect("manifest cache poisoned").is_none() {
            if let Some(loader) = &self.loader {
                if let Some(manifest) = loader.load() {
                    self.set(manifest);
                }
            }
        }
        self.get(id)
    }

    /// Persist the manifest (full overwrite; the last writer wins).
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        let path = self.config.manifest_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PressError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| PressError::Config(format!("manifest serialization failed: {e}")))?;
        std::fs::write(&path, json).map_err(|e| PressError::io(&path, e))?;
        self.set(manifest.clone());
        Ok(())
    }
}

/// Resolve a template id to bundle text. Inlined code always beats a
/// filesystem read of `bundle_path` – the bundle file may not exist at
/// request time in serverless deployments.
fn bundle_text(manifest: &Manifest, id: &str) -> Option<String> {
    let entry = manifest.templates.get(id)?;
    if let Some(code) = &entry.code {
        return Some(code.clone());
    }
    std::fs::read_to_string(&entry.bundle_path).ok()
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Source text of the generated CSS module: a `css` string constant plus a
/// default export aliasing it.
pub fn css_module_source(css: &str) -> String {
    let literal = serde_json::to_string(css).unwrap_or_else(|_| "\"\"".to_string());
    format!("export const css = {literal};\nexport default css;\n")
}

/// Source text of the generated manifest module, consumed through the
/// virtual-module alias by serverless bootstrap code.
pub fn manifest_module_source(manifest: &Manifest) -> String {
    let json = serde_json::to_string(manifest).unwrap_or_else(|_| "{}".to_string());
    format!("export const manifest = {json};\nexport default manifest;\n")
}
