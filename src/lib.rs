//! # pdf-press – build-time compilation pipeline for React-style PDF templates
//!
//! Template authors write page layouts as JSX components styled with utility
//! classes. This crate performs the build-time half of the story so the same
//! templates work in serverless and edge deployments:
//!
//! 1. **Extract** – scan template source for static class tokens ([`extract`])
//! 2. **Analyze** – discover exports and client directives ([`exports`])
//! 3. **Compile** – drive the CSS engine to pre-compiled CSS ([`css`])
//! 4. **Bundle** – synthesize browser entries for client templates ([`bundle`])
//! 5. **Transform** – rewrite sources to reference pre-compiled assets ([`transform`])
//! 6. **Persist** – keep the template manifest consistent ([`manifest`])
//! 7. **Watch** – debounce file changes into recompilation cycles ([`watch`])

pub mod bundle;
pub mod config;
pub mod css;
pub mod error;
pub mod exports;
pub mod extract;
pub mod manifest;
pub mod pipeline;
pub mod transform;
pub mod watch;

// Re-exports for convenience
pub use config::ProjectConfig;
pub use error::{PressError, Result};
pub use pipeline::{CompileSummary, Pipeline};
pub use transform::{TransformOutput, Transformer};
