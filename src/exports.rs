//! Export analyzer – answers "what does this module export?" questions over
//! raw source text without a full parser.
//!
//! Known false negatives, by design: `export * from` re-exports are not
//! followed, and `export default Component` (an expression referring to an
//! identifier declared elsewhere) yields no default-export name.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

fn export_function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"export\s+(?:async\s+)?function\s+([A-Za-z_$][A-Za-z0-9_$]*)")
            .expect("valid regex")
    })
}

fn export_binding_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"export\s+(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*=")
            .expect("valid regex")
    })
}

fn export_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"export\s+class\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("valid regex"))
}

fn export_braces_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"export\s*\{([^}]*)\}").expect("valid regex"))
}

fn default_function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"export\s+default\s+(?:async\s+)?function\s+([A-Za-z_$][A-Za-z0-9_$]*)")
            .expect("valid regex")
    })
}

fn default_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"export\s+default\s+class\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("valid regex")
    })
}

fn default_any_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"export\s+default\b").expect("valid regex"))
}

/// List the externally visible names of all named exports.
///
/// Covers `export function N`, `export const|let|var N =`, `export class N`,
/// and `export { N [as Alias] }` (the alias is the visible name). Default
/// exports are excluded – they have no stable referenceable name.
pub fn list_exports(source: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    let mut push = |name: &str| {
        if !name.is_empty() && seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    };

    for re in [export_function_re(), export_binding_re(), export_class_re()] {
        for caps in re.captures_iter(source) {
            if let Some(name) = caps.get(1) {
                push(name.as_str());
            }
        }
    }

    for caps in export_braces_re().captures_iter(source) {
        let Some(list) = caps.get(1) else { continue };
        for item in list.as_str().split(',') {
            let item = item.trim();
            if item.is_empty() || item == "default" {
                continue;
            }
            // `Name as Alias` – keep the alias.
            let visible = match item.split_once(" as ") {
                Some((_, alias)) => alias.trim(),
                None => item,
            };
            push(visible);
        }
    }

    names
}

/// True if the module has a default export of any form.
pub fn has_default_export(source: &str) -> bool {
    default_any_re().is_match(source)
}

/// The identifier of a nameable default export (`export default function N`
/// or `export default class N`), or `None` for anonymous/expression forms.
pub fn default_export_name(source: &str) -> Option<String> {
    default_function_re()
        .captures(source)
        .or_else(|| default_class_re().captures(source))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// True iff the file opens with the client-rendering directive (`"use
/// client"` or `'use client'`) after leading whitespace.
pub fn has_client_directive(source: &str) -> bool {
    let trimmed = source.trim_start();
    trimmed.starts_with("\"use client\"") || trimmed.starts_with("'use client'")
}
