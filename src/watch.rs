//! Watcher – recompiles on template changes.
//!
//! Filesystem events from the templates tree are debounced with a short
//! window that resets on each new event, so a burst of saves collapses into
//! one recompilation cycle. Recompilation failures are logged and leave the
//! previous artifacts in place; stale-but-valid beats crashing the watcher.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};

use crate::error::{PressError, Result};
use crate::pipeline::{is_source_file, Pipeline};

/// Debounce window for coalescing filesystem events.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// At most one live watcher per process; released again when a start fails
/// or the watch loop ends.
static WATCHER_STARTED: AtomicBool = AtomicBool::new(false);

/// What a debounced batch of events requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Only stylesheets changed: recompile CSS.
    CssOnly,
    /// Template code changed: recompile CSS and rebundle templates.
    Templates,
}

impl ChangeKind {
    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::CssOnly, Self::CssOnly) => Self::CssOnly,
            _ => Self::Templates,
        }
    }
}

/// Classify one changed path by suffix; `None` for files the pipeline does
/// not care about.
pub fn classify(path: &Path) -> Option<ChangeKind> {
    if path.extension().and_then(|e| e.to_str()) == Some("css") {
        return Some(ChangeKind::CssOnly);
    }
    if is_source_file(path) {
        return Some(ChangeKind::Templates);
    }
    None
}

/// Drain a burst of change notifications into one batch. Blocks for the
/// first change, then keeps absorbing until the debounce window passes with
/// no further events (each event resets the window). Returns `None` when
/// the channel disconnects.
pub fn drain_changes(rx: &Receiver<ChangeKind>, debounce: Duration) -> Option<ChangeKind> {
    let mut batch = match rx.recv() {
        Ok(kind) => kind,
        Err(_) => return None,
    };
    loop {
        match rx.recv_timeout(debounce) {
            Ok(kind) => batch = batch.merge(kind),
            Err(RecvTimeoutError::Timeout) => return Some(batch),
            Err(RecvTimeoutError::Disconnected) => return Some(batch),
        }
    }
}

/// Watch the templates tree and recompile on change. Runs one initial full
/// pass, then blocks on the event loop until the watch channel closes.
///
/// The recursive watch covers the optional `styles/` subdirectory and the
/// conventional root stylesheet, both of which live inside the templates
/// root.
pub fn watch(mut pipeline: Pipeline) -> Result<()> {
    if WATCHER_STARTED.swap(true, Ordering::SeqCst) {
        return Err(PressError::Config(
            "a watcher is already running in this process".to_string(),
        ));
    }

    let templates_dir = pipeline.config().templates_dir.clone();
    let (tx, rx) = std::sync::mpsc::channel::<ChangeKind>();

    let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        match result {
            Ok(event) => {
                for path in &event.paths {
                    if let Some(kind) = classify(path) {
                        let _ = tx.send(kind);
                    }
                }
            }
            Err(e) => log::warn!("watch error: {e}"),
        }
    });
    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(e) => {
            WATCHER_STARTED.store(false, Ordering::SeqCst);
            return Err(PressError::Config(format!("failed to create watcher: {e}")));
        }
    };

    if let Err(e) = watcher.watch(&templates_dir, RecursiveMode::Recursive) {
        WATCHER_STARTED.store(false, Ordering::SeqCst);
        return Err(PressError::Config(format!(
            "failed to watch '{}': {e}",
            templates_dir.display()
        )));
    }

    log::info!("watching '{}'", templates_dir.display());
    if let Err(e) = pipeline.compile_all() {
        log::error!("initial compilation failed: {e}");
    }

    while let Some(kind) = drain_changes(&rx, DEBOUNCE) {
        run_cycle(&mut pipeline, kind);
    }
    WATCHER_STARTED.store(false, Ordering::SeqCst);
    Ok(())
}

/// One recompilation cycle. CSS always comes first; bundling only runs for
/// template changes. Failures keep the previous manifest and CSS module.
fn run_cycle(pipeline: &mut Pipeline, kind: ChangeKind) {
    let result = match kind {
        ChangeKind::CssOnly => pipeline.compile_css_only().map(|_| ()),
        ChangeKind::Templates => pipeline.compile_all().map(|_| ()),
    };
    if let Err(e) = result {
        log::error!("recompilation failed, keeping previous artifacts: {e}");
    }
}
