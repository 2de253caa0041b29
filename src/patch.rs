//! Server entry patching.
//!
//! The generated server entry declares its hook table as
//!
//! ```js
//! this.options.hooks = {
//!     handle: ...,
//!     handleError: ...,
//! ```
//!
//! and we splice a `handleWebsocket` key in front of `handle` so the Bun
//! runtime can upgrade connections through the app's own hook. This is a
//! textual match over generated code; everything that knows the upstream
//! shape lives in [`HookTableShape`] so a format change touches one place.
//! A source that does not match is left alone.

use regex::{Captures, Regex};
use std::{borrow::Cow, fs, io, path::Path, sync::LazyLock};

/// Expression used when the project does not configure one: the hooks
/// module export, or `null` when the app defines no websocket handler.
pub const DEFAULT_WEBSOCKET_HOOK: &str = "module.handleWebsocket || null";

/// Result of a patch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The hook key was inserted (count of hook tables touched).
    Patched(usize),
    Unchanged(Unchanged),
}

/// Why a source was left as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unchanged {
    /// The hook table already carries `handleWebsocket`.
    AlreadyPatched,
    /// No hook table declaration found; upstream output changed shape.
    MarkerMissing,
}

/// Knowledge of how the upstream server entry spells its hook table.
pub struct HookTableShape;

static HOOK_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)(this\.options\.hooks\s*=\s*\{)\s*(handle\s*:)").expect("literal hook pattern")
});

static PATCHED_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)this\.options\.hooks\s*=\s*\{\s*handleWebsocket\s*:")
        .expect("literal patched-hook pattern")
});

impl HookTableShape {
    /// Insert `handleWebsocket: <expr>` before every `handle:` opening a
    /// hook table.
    pub fn apply<'a>(source: &'a str, hook_expr: &str) -> (Cow<'a, str>, PatchOutcome) {
        let count = HOOK_TABLE.find_iter(source).count();
        if count == 0 {
            let reason = if PATCHED_TABLE.is_match(source) {
                Unchanged::AlreadyPatched
            } else {
                Unchanged::MarkerMissing
            };
            return (Cow::Borrowed(source), PatchOutcome::Unchanged(reason));
        }

        // Closure replacer: `hook_expr` is user text and may contain `$`.
        let patched = HOOK_TABLE.replace_all(source, |caps: &Captures| {
            format!(
                "{} \n\t\thandleWebsocket: {},\n\t\t{}",
                &caps[1], hook_expr, &caps[2]
            )
        });
        (patched, PatchOutcome::Patched(count))
    }
}

/// Patch an entry source held in memory.
pub fn patch_source<'a>(source: &'a str, hook_expr: Option<&str>) -> (Cow<'a, str>, PatchOutcome) {
    HookTableShape::apply(source, hook_expr.unwrap_or(DEFAULT_WEBSOCKET_HOOK))
}

/// Patch the entry file at `path` in place.
///
/// Only I/O failures are errors; a non-matching source is written back
/// unchanged and reported through the outcome.
pub fn patch_entry(path: &Path, hook_expr: Option<&str>) -> io::Result<PatchOutcome> {
    let source = fs::read_to_string(path)?;
    let (patched, outcome) = patch_source(&source, hook_expr);
    fs::write(path, patched.as_bytes())?;
    Ok(outcome)
}
