//! Source transformer – the per-file rewrite pass invoked by the host build
//! tool (webpack loader, Vite plugin, Turbopack rule are thin adapters over
//! this one contract).
//!
//! Up to four independent rewrites apply to a file; all are idempotent, so
//! re-running the transformer on its own output is safe. The only side
//! channel is the dependency list returned for HMR invalidation.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD as BASE64_STD;
use base64::Engine as _;
use regex::{Captures, Regex};

use crate::config::ProjectConfig;
use crate::error::{PressError, Result};
use crate::exports;
use crate::manifest::VIRTUAL_CSS_MODULE;

/// Injected variable holding the pre-compiled CSS; doubles as the
/// idempotence sentinel for the Tailwind rewrite.
pub const CSS_SENTINEL: &str = "__pdfPressCss";

/// Result of a transform pass.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    /// Files the output now depends on; the host registers these for HMR.
    pub dependencies: Vec<PathBuf>,
}

fn tailwind_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"import\s+(?:\{[^}]*\bTailwind\b[^}]*\}|Tailwind)\s+from\s+['"]"#)
            .expect("valid regex")
    })
}

fn tailwind_bare_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<Tailwind\s*(/?)>").expect("valid regex"))
}

fn tailwind_attr_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<Tailwind\s+([^>]+?)\s*(/?)>").expect("valid regex"))
}

fn css_files_prop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"cssFiles=\{\s*\[([^\]]*)\]\s*\}").expect("valid regex"))
}

fn string_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]*)"|'([^']*)'"#).expect("valid regex"))
}

/// Applies the rewrite passes for one project.
pub struct Transformer {
    config: ProjectConfig,
}

impl Transformer {
    pub fn new(config: ProjectConfig) -> Self {
        Self { config }
    }

    /// Transform one source file. Returns `None` when no rewrite applies –
    /// the host passes the file through untouched.
    pub fn transform(&self, source: &str, path: &Path) -> Result<Option<TransformOutput>> {
        let mut code = source.to_string();
        let mut dependencies = Vec::new();
        let mut changed = false;

        changed |= inject_precompiled_css(&mut code);
        changed |= append_client_markers(&mut code, path);
        changed |= self.append_template_marker(&mut code, path);
        changed |= inline_css_file_props(&mut code, path, &mut dependencies)?;

        if changed {
            Ok(Some(TransformOutput { code, dependencies }))
        } else {
            Ok(None)
        }
    }

    /// Rewrite #3: tag the default export of a template file (a `.tsx`
    /// directly inside the templates root, not nested) with its own source
    /// path.
    fn append_template_marker(&self, code: &mut String, path: &Path) -> bool {
        if path.extension().and_then(|e| e.to_str()) != Some("tsx") {
            return false;
        }
        if path.parent() != Some(self.config.templates_dir.as_path()) {
            return false;
        }
        let Some(name) = exports::default_export_name(code) else {
            return false;
        };
        if code.contains(&format!("{name}.__pdfPressTemplate")) {
            return false;
        }
        let path_literal = js_string(&path.display().to_string());
        code.push_str(&format!(
            "\ntry {{ {name}.__pdfPressTemplate = {path_literal}; }} catch {{}}\n"
        ));
        true
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Rewrite #1: inject the pre-compiled CSS import and pass it to every
/// `<Tailwind>` usage that does not already carry a `css=` attribute.
fn inject_precompiled_css(code: &mut String) -> bool {
    if code.contains(CSS_SENTINEL) {
        // Already rewritten; never double-inject.
        return false;
    }
    if !tailwind_import_re().is_match(code) {
        return false;
    }
    if !tailwind_bare_tag_re().is_match(code) && !tailwind_attr_tag_re().is_match(code) {
        return false;
    }

    let rewritten = tailwind_bare_tag_re()
        .replace_all(code, format!("<Tailwind css={{{CSS_SENTINEL}}}$1>").as_str())
        .into_owned();
    let rewritten = tailwind_attr_tag_re()
        .replace_all(&rewritten, |caps: &Captures<'_>| {
            let attrs = &caps[1];
            if attrs.contains("css=") {
                return caps[0].to_string();
            }
            let slash = &caps[2];
            format!("<Tailwind css={{{CSS_SENTINEL}}} {attrs}{slash}>")
        })
        .into_owned();

    let import = format!("import {{ css as {CSS_SENTINEL} }} from \"{VIRTUAL_CSS_MODULE}\";\n");
    *code = if exports::has_client_directive(&rewritten) {
        // Directives must stay the first statement; insert after the line
        // holding the directive, which may sit behind leading whitespace.
        let directive_start = rewritten.len() - rewritten.trim_start().len();
        match rewritten[directive_start..].find('\n') {
            Some(pos) => {
                let (head, tail) = rewritten.split_at(directive_start + pos + 1);
                format!("{head}{import}{tail}")
            }
            None => format!("{rewritten}\n{import}"),
        }
    } else {
        format!("{import}{rewritten}")
    };
    true
}

/// Rewrite #2: append client-component markers for every named export of a
/// file carrying the client directive. Each marker sits in its own
/// try/catch so one failure cannot stop the others.
fn append_client_markers(code: &mut String, path: &Path) -> bool {
    if !exports::has_client_directive(code) {
        return false;
    }
    let names = exports::list_exports(code);
    if names.is_empty() {
        return false;
    }

    let path_literal = js_string(&path.display().to_string());
    let mut appended = false;
    for name in names {
        if code.contains(&format!("{name}.__pdfPressClient")) {
            continue;
        }
        code.push_str(&format!(
            "\ntry {{ {name}.__pdfPressClient = true; {name}.__pdfPressSource = {path_literal}; }} catch {{}}\n"
        ));
        appended = true;
    }
    appended
}

/// Rewrite #4: inline every CSS file referenced by a `cssFiles` prop as a
/// base64 self-decoding expression. Occurrences are processed in reverse
/// source order so earlier replacements cannot shift later match offsets.
fn inline_css_file_props(
    code: &mut String,
    path: &Path,
    dependencies: &mut Vec<PathBuf>,
) -> Result<bool> {
    let matches: Vec<(std::ops::Range<usize>, String)> = css_files_prop_re()
        .captures_iter(code)
        .map(|caps| {
            let whole = caps.get(0).expect("match 0 always present");
            (whole.range(), caps[1].to_string())
        })
        .collect();
    if matches.is_empty() {
        return Ok(false);
    }

    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    for (range, inner) in matches.into_iter().rev() {
        let mut items = Vec::new();
        for caps in string_literal_re().captures_iter(&inner) {
            let Some(reference) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            let resolved = base_dir.join(reference.as_str());
            let content = std::fs::read_to_string(&resolved).map_err(|_| {
                PressError::CssFileNotFound {
                    path: resolved.clone(),
                    template: path.to_path_buf(),
                }
            })?;
            items.push(format!("atob(\"{}\")", BASE64_STD.encode(content)));
            dependencies.push(resolved);
        }
        let replacement = format!("cssInline={{[{}]}}", items.join(", "));
        code.replace_range(range, &replacement);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer_for(templates_dir: &Path) -> Transformer {
        let root = templates_dir.parent().unwrap_or(templates_dir);
        Transformer::new(ProjectConfig::new(root).with_templates_dir(templates_dir))
    }

    const TAILWIND_SOURCE: &str = r#"import { Tailwind } from "pdf-press/components";

export default function Invoice() {
  return (
    <Tailwind>
      <div className="p-6">hello</div>
    </Tailwind>
  );
}
"#;

    #[test]
    fn tailwind_rewrite_injects_import_and_attribute() {
        let transformer = transformer_for(Path::new("/proj/templates"));
        let out = transformer
            .transform(TAILWIND_SOURCE, Path::new("/proj/src/invoice.jsx"))
            .unwrap()
            .unwrap();
        assert!(out.code.contains(&format!(
            "import {{ css as {CSS_SENTINEL} }} from \"{VIRTUAL_CSS_MODULE}\";"
        )));
        assert!(out.code.contains("<Tailwind css={__pdfPressCss}>"));
    }

    #[test]
    fn tailwind_rewrite_is_idempotent() {
        let transformer = transformer_for(Path::new("/proj/templates"));
        let path = Path::new("/proj/src/invoice.jsx");
        let once = transformer.transform(TAILWIND_SOURCE, path).unwrap().unwrap();
        // A second run must make no further changes.
        assert!(transformer.transform(&once.code, path).unwrap().is_none());
    }

    #[test]
    fn tailwind_with_attributes_and_explicit_css_attr() {
        let source = r#"import { Tailwind } from "pdf-press/components";
const a = <Tailwind config={cfg}>x</Tailwind>;
const b = <Tailwind css={custom}>y</Tailwind>;
"#;
        let transformer = transformer_for(Path::new("/proj/templates"));
        let out = transformer
            .transform(source, Path::new("/proj/src/page.jsx"))
            .unwrap()
            .unwrap();
        assert!(out.code.contains("<Tailwind css={__pdfPressCss} config={cfg}>"));
        // Explicit css= attribute is left alone.
        assert!(out.code.contains("<Tailwind css={custom}>"));
    }

    #[test]
    fn tailwind_import_goes_after_client_directive() {
        let source = format!("\"use client\";\n{TAILWIND_SOURCE}");
        let transformer = transformer_for(Path::new("/proj/templates"));
        let out = transformer
            .transform(&source, Path::new("/proj/src/invoice.jsx"))
            .unwrap()
            .unwrap();
        assert!(out.code.starts_with("\"use client\";\nimport { css as __pdfPressCss }"));
    }

    #[test]
    fn tailwind_import_respects_directive_behind_blank_lines() {
        let source = format!("\n  \"use client\";\n{TAILWIND_SOURCE}");
        let transformer = transformer_for(Path::new("/proj/templates"));
        let out = transformer
            .transform(&source, Path::new("/proj/src/invoice.jsx"))
            .unwrap()
            .unwrap();
        // The directive stays the first statement even with leading blanks.
        assert!(out.code.trim_start().starts_with("\"use client\";"));
        let directive = out.code.find("\"use client\"").unwrap();
        let import = out.code.find("import { css as __pdfPressCss }").unwrap();
        assert!(import > directive);
    }

    #[test]
    fn client_markers_appended_per_export() {
        let source = "\"use client\";\nexport function Chart() {}\nexport const Legend = () => null;\n";
        let transformer = transformer_for(Path::new("/proj/templates"));
        let out = transformer
            .transform(source, Path::new("/proj/src/charts.tsx"))
            .unwrap()
            .unwrap();
        assert!(out.code.contains("try { Chart.__pdfPressClient = true;"));
        assert!(out.code.contains("try { Legend.__pdfPressClient = true;"));
        assert!(out.code.contains("/proj/src/charts.tsx"));
        // Markers run after the declarations, not before.
        let decl = out.code.find("export function Chart").unwrap();
        let marker = out.code.find("Chart.__pdfPressClient").unwrap();
        assert!(marker > decl);
        // Idempotent.
        assert!(transformer
            .transform(&out.code, Path::new("/proj/src/charts.tsx"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn no_markers_without_directive() {
        let source = "export function Chart() {}\n";
        let transformer = transformer_for(Path::new("/proj/templates"));
        assert!(transformer
            .transform(source, Path::new("/proj/src/charts.tsx"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn template_marker_only_for_direct_children() {
        let source = "export default function Invoice() { return null; }\n";
        let transformer = transformer_for(Path::new("/proj/templates"));

        let direct = transformer
            .transform(source, Path::new("/proj/templates/invoice.tsx"))
            .unwrap()
            .unwrap();
        assert!(direct
            .code
            .contains("Invoice.__pdfPressTemplate = \"/proj/templates/invoice.tsx\""));

        // Same shape one directory deeper: no marker.
        assert!(transformer
            .transform(source, Path::new("/proj/templates/charts/invoice.tsx"))
            .unwrap()
            .is_none());
        // Wrong extension: no marker.
        assert!(transformer
            .transform(source, Path::new("/proj/templates/invoice.ts"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn template_marker_requires_nameable_default() {
        let source = "const Invoice = () => null;\nexport default Invoice;\n";
        let transformer = transformer_for(Path::new("/proj/templates"));
        assert!(transformer
            .transform(source, Path::new("/proj/templates/invoice.tsx"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn css_file_props_inlined_in_reverse_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.css"), ".a { color: red; }").unwrap();
        std::fs::write(dir.path().join("b.css"), ".b { color: blue; }").unwrap();
        let source = r#"<Doc cssFiles={["./a.css"]}/> and <Doc cssFiles={["./b.css"]}/>"#;

        let transformer = transformer_for(Path::new("/proj/templates"));
        let out = transformer
            .transform(source, &dir.path().join("page.jsx"))
            .unwrap()
            .unwrap();

        let a64 = BASE64_STD.encode(".a { color: red; }");
        let b64 = BASE64_STD.encode(".b { color: blue; }");
        assert!(out.code.contains(&format!("cssInline={{[atob(\"{a64}\")]}}")));
        assert!(out.code.contains(&format!("cssInline={{[atob(\"{b64}\")]}}")));
        assert!(!out.code.contains("cssFiles"));
        assert_eq!(out.dependencies.len(), 2);
    }

    #[test]
    fn missing_css_file_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = r#"<Doc cssFiles={["./missing.css"]}/>"#;
        let transformer = transformer_for(Path::new("/proj/templates"));
        let err = transformer
            .transform(source, &dir.path().join("page.jsx"))
            .unwrap_err();
        match err {
            PressError::CssFileNotFound { path, template } => {
                assert!(path.ends_with("missing.css"));
                assert!(template.ends_with("page.jsx"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn untouched_files_pass_through() {
        let transformer = transformer_for(Path::new("/proj/templates"));
        assert!(transformer
            .transform("export const x = 1;\n", Path::new("/proj/src/util.ts"))
            .unwrap()
            .is_none());
    }
}
