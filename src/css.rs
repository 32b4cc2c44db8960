//! CSS compiler – drives the CSS engine to turn a base stylesheet plus a set
//! of extracted class tokens into final CSS text.
//!
//! The engine itself is a black box behind the [`CssEngine`] trait. This
//! module is responsible for driving it correctly: resolving `@import`
//! references in the base stylesheet, discovering the base stylesheet when
//! none is given, and memoizing a per-base compiler handle so repeated
//! compilations against unchanged resolved input reuse warm state.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{PressError, Result};

/// Minimal base stylesheet used when no conventional stylesheet exists:
/// pull in the engine defaults and nothing else.
pub const FALLBACK_BASE_STYLESHEET: &str = "@import \"tailwindcss\";\n";

/// Conventional base-stylesheet filename under the templates styles dir.
pub const BASE_STYLESHEET_NAME: &str = "tailwind.css";

/// Black-box interface to the underlying CSS engine.
pub trait CssEngine {
    /// The engine's own entry-stylesheet import id (e.g. `tailwindcss`).
    fn entry_id(&self) -> &str;

    /// Content of the engine's entry stylesheet (defaults/preflight).
    fn entry_stylesheet(&self) -> String;

    /// Root of the engine's installed package, used as a last-resort base
    /// for resolving stylesheet imports. `None` for built-in engines.
    fn package_root(&self) -> Option<PathBuf>;

    /// Produce final CSS for the resolved base stylesheet plus class set.
    /// `Err` carries the engine's failure message.
    fn build(
        &mut self,
        resolved_base: &str,
        classes: &BTreeSet<String>,
    ) -> std::result::Result<String, String>;
}

/// Warm-start state retained per distinct resolved stylesheet.
struct CompilerHandle {
    resolved_base: String,
}

/// Drives a [`CssEngine`], caching one compiler handle per base-stylesheet
/// content so unchanged bases skip import resolution on recompilation.
pub struct CssCompiler {
    engine: Box<dyn CssEngine>,
    styles_dir: PathBuf,
    handles: HashMap<u64, CompilerHandle>,
}

impl CssCompiler {
    pub fn new(engine: Box<dyn CssEngine>, styles_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            styles_dir: styles_dir.into(),
            handles: HashMap::new(),
        }
    }

    /// Built-in utility engine against the given styles directory.
    pub fn with_default_engine(styles_dir: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(UtilityEngine), styles_dir)
    }

    /// Compile final CSS text for the given class tokens.
    ///
    /// `base` is the base stylesheet text; when `None` the conventional
    /// location (`<styles_dir>/tailwind.css`) is tried, falling back to a
    /// minimal engine-defaults import.
    ///
    /// Imports are re-resolved on every call, so edits to imported
    /// stylesheets land in the next compilation. The warm-start handle is
    /// keyed by the resolved content, not the base text alone.
    pub fn compile(&mut self, base: Option<&str>, classes: &BTreeSet<String>) -> Result<String> {
        let base_text = match base {
            Some(text) => text.to_string(),
            None => self.discover_base_stylesheet(),
        };

        let resolved = resolve_imports(&base_text, &*self.engine, &self.styles_dir)?;
        let key = {
            let mut hasher = DefaultHasher::new();
            resolved.hash(&mut hasher);
            hasher.finish()
        };

        if !self.handles.contains_key(&key) {
            log::debug!("css: created compiler handle ({} resolved bytes)", resolved.len());
            self.handles.insert(key, CompilerHandle { resolved_base: resolved });
        }
        let resolved = self.handles[&key].resolved_base.clone();

        self.engine.build(&resolved, classes).map_err(PressError::Css)
    }

    fn discover_base_stylesheet(&self) -> String {
        let conventional = self.styles_dir.join(BASE_STYLESHEET_NAME);
        match std::fs::read_to_string(&conventional) {
            Ok(text) => text,
            Err(_) => {
                log::debug!(
                    "css: no base stylesheet at '{}', using engine defaults",
                    conventional.display()
                );
                FALLBACK_BASE_STYLESHEET.to_string()
            }
        }
    }
}

/// Resolve every `@import "<id>";` line in a base stylesheet.
///
/// Resolution order per id: the engine's own entry id (expands to the engine
/// defaults), http(s) URLs (skipped – already handled at the HTML layer),
/// then local paths against the styles dir, with a `.css` suffix appended,
/// and finally against the engine package root. Anything else raises
/// [`PressError::StylesheetNotFound`].
fn resolve_imports(base: &str, engine: &dyn CssEngine, styles_dir: &Path) -> Result<String> {
    static IMPORT_RE: OnceLock<Regex> = OnceLock::new();
    let import_re = IMPORT_RE.get_or_init(|| {
        Regex::new(r#"@import\s+(?:"([^"]+)"|'([^']+)')\s*;"#).expect("valid regex")
    });

    let mut out = String::new();
    let mut last_end = 0;
    for caps in import_re.captures_iter(base) {
        let whole = caps.get(0).expect("match 0 always present");
        let id = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("");
        out.push_str(&base[last_end..whole.start()]);
        out.push_str(&resolve_stylesheet_id(id, engine, styles_dir)?);
        last_end = whole.end();
    }
    out.push_str(&base[last_end..]);
    Ok(out)
}

fn resolve_stylesheet_id(id: &str, engine: &dyn CssEngine, styles_dir: &Path) -> Result<String> {
    if id == engine.entry_id() {
        return Ok(engine.entry_stylesheet());
    }
    if id.starts_with("http://") || id.starts_with("https://") {
        // Remote stylesheets are linked at the HTML layer, not compiled in.
        return Ok(String::new());
    }

    let mut candidates = vec![styles_dir.join(id), styles_dir.join(format!("{id}.css"))];
    if let Some(root) = engine.package_root() {
        candidates.push(root.join(id));
    }
    for candidate in &candidates {
        if let Ok(text) = std::fs::read_to_string(candidate) {
            return Ok(text);
        }
    }

    Err(PressError::StylesheetNotFound { id: id.to_string() })
}

// ---------------------------------------------------------------------------
// Built-in utility engine
// ---------------------------------------------------------------------------

/// Built-in CSS engine generating rules for the utility-class vocabulary
/// used by the bundled templates (display, flexbox, spacing scale,
/// typography, widths, and a small colour palette).
pub struct UtilityEngine;

impl CssEngine for UtilityEngine {
    fn entry_id(&self) -> &str {
        "tailwindcss"
    }

    fn entry_stylesheet(&self) -> String {
        PREFLIGHT.to_string()
    }

    fn package_root(&self) -> Option<PathBuf> {
        None
    }

    fn build(
        &mut self,
        resolved_base: &str,
        classes: &BTreeSet<String>,
    ) -> std::result::Result<String, String> {
        let mut css = String::from(resolved_base);
        if !css.is_empty() && !css.ends_with('\n') {
            css.push('\n');
        }
        for class in classes {
            if let Some(decls) = declarations_for_class(class) {
                let _ = writeln!(css, ".{} {{ {} }}", escape_selector(class), decls);
            }
        }
        Ok(css)
    }
}

const PREFLIGHT: &str = "*, ::before, ::after { box-sizing: border-box; margin: 0; padding: 0; }\n\
html { line-height: 1.4; font-family: Helvetica, Arial, sans-serif; }\n";

/// Escape characters that are valid in class tokens but not in selectors.
fn escape_selector(class: &str) -> String {
    class
        .chars()
        .map(|c| match c {
            '/' | '.' | ':' | '[' | ']' | '%' => format!("\\{c}"),
            _ => c.to_string(),
        })
        .collect()
}

/// CSS declarations for a single utility class, or `None` if unrecognised.
fn declarations_for_class(class: &str) -> Option<String> {
    let fixed = match class {
        // Display
        "flex" => "display: flex",
        "grid" => "display: grid",
        "block" => "display: block",
        "inline" => "display: inline",
        "inline-block" => "display: inline-block",
        "hidden" => "display: none",

        // Flex direction / wrap / grow
        "flex-row" => "flex-direction: row",
        "flex-col" => "flex-direction: column",
        "flex-wrap" => "flex-wrap: wrap",
        "flex-nowrap" => "flex-wrap: nowrap",
        "flex-grow" | "grow" => "flex-grow: 1",
        "flex-shrink" | "shrink" => "flex-shrink: 1",
        "flex-1" => "flex: 1 1 0%",

        // Justify / align
        "justify-start" => "justify-content: flex-start",
        "justify-end" => "justify-content: flex-end",
        "justify-center" => "justify-content: center",
        "justify-between" => "justify-content: space-between",
        "justify-around" => "justify-content: space-around",
        "justify-evenly" => "justify-content: space-evenly",
        "items-start" => "align-items: flex-start",
        "items-end" => "align-items: flex-end",
        "items-center" => "align-items: center",
        "items-stretch" => "align-items: stretch",

        // Typography
        "font-bold" => "font-weight: 700",
        "font-normal" => "font-weight: 400",
        "italic" => "font-style: italic",
        "not-italic" => "font-style: normal",
        "underline" => "text-decoration: underline",
        "no-underline" => "text-decoration: none",
        "text-left" => "text-align: left",
        "text-center" => "text-align: center",
        "text-right" => "text-align: right",
        "text-xs" => "font-size: 12px",
        "text-sm" => "font-size: 14px",
        "text-base" => "font-size: 16px",
        "text-lg" => "font-size: 18px",
        "text-xl" => "font-size: 20px",
        "text-2xl" => "font-size: 24px",
        "text-3xl" => "font-size: 30px",
        "text-4xl" => "font-size: 36px",

        // Width
        "w-full" => "width: 100%",
        "w-auto" => "width: auto",
        "w-1/2" => "width: 50%",
        "w-1/3" => "width: 33.333%",
        "w-2/3" => "width: 66.666%",
        "w-1/4" => "width: 25%",
        "w-3/4" => "width: 75%",

        // Page breaks (consumed by the pagination polyfill)
        "break-before" => "break-before: page",
        "break-after" | "page" | "page-break" => "break-after: page",
        "break-inside-avoid" => "break-inside: avoid",

        _ => "",
    };
    if !fixed.is_empty() {
        return Some(fixed.to_string());
    }

    spacing_declarations(class).or_else(|| color_declarations(class))
}

/// `p-{n}`, `px-{n}`, `mt-{n}`, `gap-{n}`, … with 1 unit = 4px.
fn spacing_declarations(class: &str) -> Option<String> {
    let (prefix, value_str) = class.rsplit_once('-')?;
    let value: f32 = value_str.parse().ok()?;
    let px = value * 4.0;
    let decls = match prefix {
        "p" => format!("padding: {px}px"),
        "px" => format!("padding-left: {px}px; padding-right: {px}px"),
        "py" => format!("padding-top: {px}px; padding-bottom: {px}px"),
        "pt" => format!("padding-top: {px}px"),
        "pr" => format!("padding-right: {px}px"),
        "pb" => format!("padding-bottom: {px}px"),
        "pl" => format!("padding-left: {px}px"),
        "m" => format!("margin: {px}px"),
        "mx" => format!("margin-left: {px}px; margin-right: {px}px"),
        "my" => format!("margin-top: {px}px; margin-bottom: {px}px"),
        "mt" => format!("margin-top: {px}px"),
        "mr" => format!("margin-right: {px}px"),
        "mb" => format!("margin-bottom: {px}px"),
        "ml" => format!("margin-left: {px}px"),
        "gap" => format!("gap: {px}px"),
        _ => return None,
    };
    Some(decls)
}

/// `text-{color}`, `bg-{color}`, `border-{color}` over a small palette.
fn color_declarations(class: &str) -> Option<String> {
    const PALETTE: &[(&str, &str)] = &[
        ("red-500", "#ef4444"),
        ("red-700", "#b91c1c"),
        ("blue-500", "#3b82f6"),
        ("blue-700", "#1d4ed8"),
        ("green-500", "#22c55e"),
        ("green-700", "#15803d"),
        ("gray-100", "#f3f4f6"),
        ("gray-200", "#e5e7eb"),
        ("gray-300", "#d4d6de"),
        ("gray-500", "#6b7280"),
        ("gray-700", "#374151"),
        ("gray-900", "#111827"),
        ("yellow-500", "#eab308"),
        ("white", "#ffffff"),
        ("black", "#000000"),
    ];

    for (name, hex) in PALETTE {
        if let Some(rest) = class.strip_prefix("text-") {
            if rest == *name {
                return Some(format!("color: {hex}"));
            }
        }
        if let Some(rest) = class.strip_prefix("bg-") {
            if rest == *name {
                return Some(format!("background-color: {hex}"));
            }
        }
        if let Some(rest) = class.strip_prefix("border-") {
            if rest == *name {
                return Some(format!("border-color: {hex}"));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn compile_emits_rules_for_known_utilities() {
        let mut compiler = CssCompiler::with_default_engine("styles");
        let css = compiler
            .compile(Some(FALLBACK_BASE_STYLESHEET), &classes(&["text-sm", "font-bold"]))
            .unwrap();
        assert!(!css.is_empty());
        assert!(css.contains(".text-sm"));
        assert!(css.contains("font-size: 14px"));
        assert!(css.contains(".font-bold"));
        assert!(css.contains("font-weight: 700"));
    }

    #[test]
    fn engine_entry_import_expands_to_preflight() {
        let mut compiler = CssCompiler::with_default_engine("styles");
        let css = compiler
            .compile(Some("@import \"tailwindcss\";"), &classes(&[]))
            .unwrap();
        assert!(css.contains("box-sizing: border-box"));
    }

    #[test]
    fn http_imports_resolve_to_empty_content() {
        let mut compiler = CssCompiler::with_default_engine("styles");
        let css = compiler
            .compile(
                Some("@import \"https://fonts.example/inter.css\";\nbody { color: red; }"),
                &classes(&[]),
            )
            .unwrap();
        assert!(!css.contains("https://fonts.example"));
        assert!(css.contains("body { color: red; }"));
    }

    #[test]
    fn unresolvable_import_is_a_descriptive_error() {
        let mut compiler = CssCompiler::with_default_engine("/nonexistent/styles");
        let err = compiler
            .compile(Some("@import \"missing-theme\";"), &classes(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("missing-theme"));
    }

    #[test]
    fn relative_import_resolves_against_styles_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("brand.css"), ".brand { color: blue; }").unwrap();
        let mut compiler = CssCompiler::with_default_engine(dir.path());
        // Resolves via the `.css`-suffix fallback.
        let css = compiler
            .compile(Some("@import \"brand\";"), &classes(&[]))
            .unwrap();
        assert!(css.contains(".brand { color: blue; }"));
    }

    #[test]
    fn edited_imports_are_picked_up_on_recompile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("brand.css"), ".brand { color: red; }").unwrap();
        let mut compiler = CssCompiler::with_default_engine(dir.path());

        let css = compiler
            .compile(Some("@import \"brand\";"), &classes(&[]))
            .unwrap();
        assert!(css.contains("color: red"));

        // Same base text, changed imported file: the next pass must see it.
        std::fs::write(dir.path().join("brand.css"), ".brand { color: blue; }").unwrap();
        let css = compiler
            .compile(Some("@import \"brand\";"), &classes(&[]))
            .unwrap();
        assert!(css.contains("color: blue"));
        assert!(!css.contains("color: red"));
    }

    #[test]
    fn engine_failures_surface_as_css_errors() {
        struct Failing;
        impl CssEngine for Failing {
            fn entry_id(&self) -> &str {
                "tailwindcss"
            }
            fn entry_stylesheet(&self) -> String {
                String::new()
            }
            fn package_root(&self) -> Option<PathBuf> {
                None
            }
            fn build(
                &mut self,
                _: &str,
                _: &BTreeSet<String>,
            ) -> std::result::Result<String, String> {
                Err("engine exploded".to_string())
            }
        }

        let mut compiler = CssCompiler::new(Box::new(Failing), "styles");
        let err = compiler.compile(Some(""), &classes(&[])).unwrap_err();
        assert!(matches!(err, PressError::Css(_)));
        assert!(err.to_string().contains("engine exploded"));
    }

    #[test]
    fn spacing_scale_and_selector_escaping() {
        assert_eq!(spacing_declarations("p-6").unwrap(), "padding: 24px");
        assert_eq!(spacing_declarations("mb-2").unwrap(), "margin-bottom: 8px");
        assert_eq!(escape_selector("w-1/2"), "w-1\\/2");
        assert!(spacing_declarations("p-abc").is_none());
    }

    #[test]
    fn unknown_classes_are_skipped_silently() {
        let mut compiler = CssCompiler::with_default_engine("styles");
        let css = compiler
            .compile(Some(""), &classes(&["definitely-not-a-utility"]))
            .unwrap();
        assert!(!css.contains("definitely-not-a-utility"));
    }
}
