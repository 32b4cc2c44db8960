//! Error taxonomy for the compilation pipeline.
//!
//! Configuration, resolution, and compilation errors are fatal for the
//! enclosing build step and propagate up to the host build tool. Recoverable
//! conditions (missing manifest, zero templates, a single failed marker) are
//! absorbed locally with a `log::warn!` and never appear here.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PressError>;

/// Errors raised by the build-time pipeline.
#[derive(Debug, Error)]
pub enum PressError {
    /// Invalid or missing configuration (e.g. neither bundling entry mode
    /// supplied, or a second watcher started in the same process).
    #[error("configuration error: {0}")]
    Config(String),

    /// A stylesheet import id could not be resolved by any lookup strategy.
    #[error("stylesheet '{id}' could not be resolved")]
    StylesheetNotFound { id: String },

    /// A CSS file referenced by a template's `cssFiles` prop does not exist.
    #[error("css file '{}' referenced by '{}' does not exist", .path.display(), .template.display())]
    CssFileNotFound { path: PathBuf, template: PathBuf },

    /// The CSS engine failed to produce output.
    #[error("css compilation failed: {0}")]
    Css(String),

    /// The JS bundler failed; carries the attempted source path(s).
    #[error("bundling '{path}' failed: {message}")]
    Bundle { path: String, message: String },

    /// Filesystem failure, tagged with the offending path.
    #[error("i/o error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PressError {
    /// Wrap an `io::Error` with the path that triggered it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
