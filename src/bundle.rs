//! Client bundler – synthesizes a browser entry point for a template that
//! needs client-side rendering and drives the JS bundler to produce one
//! self-contained script.
//!
//! The entry mounts the component into a fixed container element, waits two
//! animation-frame boundaries so the rendering runtime can flush, then
//! signals a global ready flag that downstream pagination tooling polls.
//! Server-only packages and Node built-ins are shimmed with empty modules –
//! the bundle runs inside a headless browser page, not Node.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{PressError, Result};
use crate::exports;

/// Id of the DOM container the entry mounts into.
pub const MOUNT_CONTAINER_ID: &str = "pdf-press-root";

/// Global flag set once rendering has flushed.
pub const READY_FLAG: &str = "__pdfPressReady";

/// Packages that must never resolve inside a browser bundle.
pub const SERVER_ONLY_PACKAGES: &[&str] = &[
    "react-dom/server",
    "pdf-press/server",
    "next/headers",
    "server-only",
];

/// Node built-in module names shimmed with empty modules.
pub const NODE_BUILTINS: &[&str] = &[
    "assert", "buffer", "child_process", "crypto", "events", "fs", "http", "https", "net", "os",
    "path", "stream", "tls", "url", "util", "worker_threads", "zlib",
];

/// Preferred entry mode: one template source with a default export.
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    pub source: PathBuf,
    pub props: serde_json::Value,
}

/// Entry-mode selection. Exactly one of the two fields must be set.
#[derive(Debug, Clone, Default)]
pub struct BundleOptions {
    /// Template-entry mode (preferred).
    pub template: Option<TemplateEntry>,
    /// Fallback component-entry mode: ambiguous component selection,
    /// retained only for sources without a usable default export.
    pub components: Option<Vec<PathBuf>>,
}

/// A synthesized entry module handed to the bundler.
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub source: String,
    pub resolve_dir: PathBuf,
}

/// Black-box interface to the JS bundler: browser platform, single
/// self-contained output file.
pub trait JsBundler {
    fn build(&self, entry: &BundleEntry) -> Result<String>;
}

/// Bundles client templates via a [`JsBundler`].
pub struct ClientBundler {
    bundler: Box<dyn JsBundler>,
}

impl ClientBundler {
    pub fn new(bundler: Box<dyn JsBundler>) -> Self {
        Self { bundler }
    }

    /// Built-in flat bundler (recursive relative-import inlining).
    pub fn with_default_bundler() -> Self {
        Self::new(Box::new(FlatBundler))
    }

    /// Produce self-contained browser-script text for the selected entry.
    pub fn bundle(&self, options: &BundleOptions) -> Result<String> {
        let entry = match (&options.template, &options.components) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(PressError::Config(
                    "exactly one of template-entry or component-entry mode must be supplied"
                        .to_string(),
                ));
            }
            (Some(template), None) => template_entry(template)?,
            (None, Some(sources)) => {
                if sources.is_empty() {
                    return Err(PressError::Config(
                        "component-entry mode requires at least one source file".to_string(),
                    ));
                }
                log::warn!(
                    "bundling via fallback component-entry mode; component selection from {} \
                     source(s) is ambiguous",
                    sources.len()
                );
                component_entry(sources)?
            }
        };

        let attempted = entry_paths(options);
        self.bundler.build(&entry).map_err(|e| PressError::Bundle {
            path: attempted,
            message: e.to_string(),
        })
    }
}

fn entry_paths(options: &BundleOptions) -> String {
    if let Some(template) = &options.template {
        return template.source.display().to_string();
    }
    options
        .components
        .iter()
        .flatten()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Shared mount-and-signal tail of every synthesized entry.
fn mount_sequence(component_expr: &str, props_literal: &str) -> String {
    format!(
        r#"const props = {props_literal};

function __pdfPressMount() {{
  const container = document.getElementById("{MOUNT_CONTAINER_ID}");
  const root = createRoot(container);
  root.render(createElement({component_expr}, props));
  requestAnimationFrame(() => {{
    requestAnimationFrame(() => {{
      window.{READY_FLAG} = true;
      if (typeof window.onPdfPressReady === "function") {{
        window.onPdfPressReady();
      }}
    }});
  }});
}}

if (document.readyState === "loading") {{
  document.addEventListener("DOMContentLoaded", __pdfPressMount);
}} else {{
  __pdfPressMount();
}}
"#
    )
}

fn template_entry(template: &TemplateEntry) -> Result<BundleEntry> {
    let resolve_dir = template
        .source
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = template
        .source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PressError::Config(format!(
                "template source '{}' has no usable file name",
                template.source.display()
            ))
        })?;
    let props_literal = serde_json::to_string(&template.props)
        .map_err(|e| PressError::Config(format!("props are not serializable: {e}")))?;

    let mut source = String::new();
    let _ = writeln!(source, "import __PdfPressTemplate from \"./{file_name}\";");
    source.push_str("import { createElement } from \"react\";\n");
    source.push_str("import { createRoot } from \"react-dom/client\";\n\n");
    source.push_str(&mount_sequence("__PdfPressTemplate", &props_literal));

    Ok(BundleEntry { source, resolve_dir })
}

fn component_entry(sources: &[PathBuf]) -> Result<BundleEntry> {
    let first = &sources[0];
    let resolve_dir = first
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut source = String::new();
    for (i, path) in sources.iter().enumerate() {
        let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
            PressError::Config(format!("source '{}' has no usable file name", path.display()))
        })?;
        let _ = writeln!(source, "import * as __pdfPressMod{i} from \"./{file_name}\";");
    }
    source.push_str("import { createElement } from \"react\";\n");
    source.push_str("import { createRoot } from \"react-dom/client\";\n\n");

    // Default export of the first module wins; otherwise its first named
    // export. With several sources listed, which component renders is
    // ambiguous; callers are warned above.
    let first_named = std::fs::read_to_string(first)
        .ok()
        .and_then(|text| exports::list_exports(&text).into_iter().next());
    let component_expr = match first_named {
        Some(name) => format!("__pdfPressMod0.default ?? __pdfPressMod0.{name}"),
        None => "__pdfPressMod0.default ?? Object.values(__pdfPressMod0)[0]".to_string(),
    };
    let picker = format!("const __PdfPressComponent = {component_expr};\n\n");
    source.push_str(&picker);
    source.push_str(&mount_sequence("__PdfPressComponent", "{}"));

    Ok(BundleEntry { source, resolve_dir })
}

// ---------------------------------------------------------------------------
// Built-in flat bundler
// ---------------------------------------------------------------------------

fn import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^\s*import\s+(?:\*\s+as\s+([A-Za-z_$][\w$]*)|\{([^}]*)\}|([A-Za-z_$][\w$]*))\s+from\s+['"]([^'"]+)['"];?\s*$"#,
        )
        .expect("valid regex")
    })
}

/// Minimal reference bundler: recursively inlines relative imports, stubs
/// server-only/Node-builtin specifiers with empty modules, and hoists the
/// remaining bare imports to the top of the output. Production deployments
/// plug a real bundler in through [`JsBundler`].
pub struct FlatBundler;

impl JsBundler for FlatBundler {
    fn build(&self, entry: &BundleEntry) -> Result<String> {
        let mut visited = HashSet::new();
        let mut hoisted = Vec::new();
        let body = inline_module(&entry.source, &entry.resolve_dir, &mut visited, &mut hoisted)?;

        let mut out = String::new();
        for import in &hoisted {
            out.push_str(import);
            out.push('\n');
        }
        if !hoisted.is_empty() {
            out.push('\n');
        }
        out.push_str(&body);
        Ok(out)
    }
}

fn is_shimmed(spec: &str) -> bool {
    SERVER_ONLY_PACKAGES.contains(&spec)
        || NODE_BUILTINS.contains(&spec)
        || spec.strip_prefix("node:").is_some()
}

fn inline_module(
    source: &str,
    dir: &Path,
    visited: &mut HashSet<PathBuf>,
    hoisted: &mut Vec<String>,
) -> Result<String> {
    let mut out = String::new();
    let mut last_end = 0;

    for caps in import_re().captures_iter(source) {
        let whole = caps.get(0).expect("match 0 always present");
        let spec = caps.get(4).map(|m| m.as_str()).unwrap_or("");
        out.push_str(&source[last_end..whole.start()]);
        last_end = whole.end();

        let namespace = caps.get(1).map(|m| m.as_str());
        let named = caps.get(2).map(|m| m.as_str());
        let default = caps.get(3).map(|m| m.as_str());

        if is_shimmed(spec) {
            // Empty shim so resolution cannot fail inside the browser page.
            match (namespace, named, default) {
                (Some(name), _, _) | (_, _, Some(name)) => {
                    let _ = writeln!(out, "const {name} = {{}}; /* shim: {spec} */");
                }
                (_, Some(list), _) => {
                    let _ = writeln!(out, "const {{{list}}} = {{}}; /* shim: {spec} */");
                }
                _ => {}
            }
            continue;
        }

        if spec.starts_with("./") || spec.starts_with("../") {
            let resolved = resolve_relative(dir, spec).ok_or_else(|| PressError::Bundle {
                path: spec.to_string(),
                message: format!("cannot resolve relative import from '{}'", dir.display()),
            })?;
            if !visited.insert(resolved.clone()) {
                let _ = writeln!(out, "/* already inlined: {spec} */");
                continue;
            }
            let text = std::fs::read_to_string(&resolved)
                .map_err(|e| PressError::Bundle {
                    path: resolved.display().to_string(),
                    message: e.to_string(),
                })?;
            let module_dir = resolved.parent().unwrap_or(dir).to_path_buf();
            let inlined = inline_module(&text, &module_dir, visited, hoisted)?;
            let (stripped, default_binding) = strip_exports(&inlined, visited.len());

            let _ = writeln!(out, "// ---- inlined: {spec} ----");
            out.push_str(&stripped);
            if !stripped.ends_with('\n') {
                out.push('\n');
            }

            // Wire the import clause to the inlined bindings.
            if let Some(binding) = default {
                match &default_binding {
                    Some(db) => {
                        let _ = writeln!(out, "const {binding} = {db};");
                    }
                    None => {
                        return Err(PressError::Bundle {
                            path: resolved.display().to_string(),
                            message: "module has no default export".to_string(),
                        });
                    }
                }
            }
            if let Some(ns) = namespace {
                let names = exports::list_exports(&text);
                let mut fields: Vec<String> = names.clone();
                if let Some(db) = &default_binding {
                    fields.insert(0, format!("default: {db}"));
                }
                let _ = writeln!(out, "const {ns} = {{ {} }};", fields.join(", "));
            }
            // Named imports bind directly to the now-local declarations.
            continue;
        }

        // Bare specifier (react, react-dom/client, …): hoist untouched; the
        // host page provides these via an import map or a prior script tag.
        let statement = whole.as_str().trim().to_string();
        if !hoisted.contains(&statement) {
            hoisted.push(statement);
        }
    }

    out.push_str(&source[last_end..]);
    Ok(out)
}

fn resolve_relative(dir: &Path, spec: &str) -> Option<PathBuf> {
    let base = dir.join(spec);
    let mut candidates = vec![base.clone()];
    for ext in ["tsx", "ts", "jsx", "js"] {
        candidates.push(PathBuf::from(format!("{}.{ext}", base.display())));
        candidates.push(base.join(format!("index.{ext}")));
    }
    candidates.into_iter().find(|c| c.is_file())
}

/// Rewrite a module's export declarations into plain local declarations.
/// Returns the rewritten text and the binding name holding the module's
/// default export, if any.
fn strip_exports(source: &str, unique: usize) -> (String, Option<String>) {
    static DEFAULT_FN: OnceLock<Regex> = OnceLock::new();
    static DEFAULT_CLASS: OnceLock<Regex> = OnceLock::new();
    static DEFAULT_EXPR: OnceLock<Regex> = OnceLock::new();
    static NAMED: OnceLock<Regex> = OnceLock::new();
    static BRACES: OnceLock<Regex> = OnceLock::new();

    let default_fn = DEFAULT_FN.get_or_init(|| {
        Regex::new(r"export\s+default\s+((?:async\s+)?function\s+([A-Za-z_$][\w$]*))")
            .expect("valid regex")
    });
    let default_class = DEFAULT_CLASS.get_or_init(|| {
        Regex::new(r"export\s+default\s+(class\s+([A-Za-z_$][\w$]*))").expect("valid regex")
    });
    let default_expr = DEFAULT_EXPR
        .get_or_init(|| Regex::new(r"(?m)^\s*export\s+default\s+([^;\n]+);?\s*$").expect("valid regex"));
    let named = NAMED.get_or_init(|| {
        Regex::new(r"\bexport\s+(async\s+function|function|class|const|let|var)\b")
            .expect("valid regex")
    });
    let braces = BRACES.get_or_init(|| {
        Regex::new(r#"(?m)^\s*export\s*\{[^}]*\}\s*(?:from\s*['"][^'"]*['"])?;?\s*$"#)
            .expect("valid regex")
    });

    let mut default_binding = None;
    let mut text = source.to_string();

    if let Some(caps) = default_fn.captures(&text) {
        default_binding = Some(caps[2].to_string());
        text = default_fn.replacen(&text, 1, "$1").into_owned();
    } else if let Some(caps) = default_class.captures(&text) {
        default_binding = Some(caps[2].to_string());
        text = default_class.replacen(&text, 1, "$1").into_owned();
    } else if default_expr.is_match(&text) {
        let binding = format!("__pdfPressDefault{unique}");
        let replacement = format!("const {binding} = $1;");
        text = default_expr.replacen(&text, 1, replacement.as_str()).into_owned();
        default_binding = Some(binding);
    }

    text = named.replace_all(&text, "$1").into_owned();
    text = braces.replace_all(&text, "").into_owned();

    (text, default_binding)
}
