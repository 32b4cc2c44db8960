//! Class extractor – scans raw template source for statically-determinable
//! CSS utility class tokens.
//!
//! This is deliberately regex-based, not an AST walk: the goal is a cheap
//! best-effort pass that never fails. Dynamic class expressions (template
//! interpolations, computed values) are skipped rather than guessed at.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

/// `className="..."` / `class="..."` with double or single quotes.
fn literal_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:className|class)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex")
    })
}

/// `` className={`...`} `` template-literal form.
fn template_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:className|class)\s*=\s*\{`([^`]*)`\}").expect("valid regex"))
}

/// `${...}` interpolation spans inside a template literal.
fn interpolation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{[^}]*\}").expect("valid regex"))
}

/// Calls to the conventional class-combining helpers.
fn helper_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:cn|cx|clsx)\s*\(([^)]*)\)").expect("valid regex"))
}

/// Quoted string literals inside a helper-call argument list.
fn string_literal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]*)"|'([^']*)'"#).expect("valid regex"))
}

/// True if a whitespace-split token is a usable static class name.
///
/// Tokens containing `${` or starting with `{` are remnants of dynamic
/// expressions and must never reach the CSS engine.
fn is_static_token(token: &str) -> bool {
    !token.is_empty() && !token.contains("${") && !token.starts_with('{')
}

fn collect_tokens(value: &str, out: &mut BTreeSet<String>) {
    for token in value.split_whitespace() {
        if is_static_token(token) {
            out.insert(token.to_string());
        }
    }
}

/// Extract the set of statically-determinable CSS class tokens from template
/// source text.
///
/// Three independent passes are unioned: literal `className`/`class`
/// attributes, template-literal attributes (interpolations dropped), and
/// string-literal arguments to `cn`/`cx`/`clsx` helper calls. Malformed
/// input never errors; unmatched constructs simply contribute no tokens.
pub fn extract_classes(source: &str) -> BTreeSet<String> {
    let mut classes = BTreeSet::new();

    // Pass 1: literal attribute values.
    for caps in literal_attr_re().captures_iter(source) {
        if let Some(value) = caps.get(1).or_else(|| caps.get(2)) {
            collect_tokens(value.as_str(), &mut classes);
        }
    }

    // Pass 2: template-literal attribute values, interpolations stripped.
    for caps in template_attr_re().captures_iter(source) {
        if let Some(value) = caps.get(1) {
            let stripped = interpolation_re().replace_all(value.as_str(), " ");
            collect_tokens(&stripped, &mut classes);
        }
    }

    // Pass 3: string-literal arguments of class-combining helper calls.
    for caps in helper_call_re().captures_iter(source) {
        if let Some(args) = caps.get(1) {
            for lit in string_literal_re().captures_iter(args.as_str()) {
                if let Some(value) = lit.get(1).or_else(|| lit.get(2)) {
                    collect_tokens(value.as_str(), &mut classes);
                }
            }
        }
    }

    classes
}
