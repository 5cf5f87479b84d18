//! Cadence persistence adapters.
//!
//! - [`JsonStateStore`] implements [`pipeline::StateStore`] over a single
//!   pretty-printed JSON file, replaced atomically on every save.
//! - [`ScheduleWriter`] writes a planned [`pipeline::Schedule`] as
//!   `schedule.json` (machine-readable) and `schedule.md` (for review), and
//!   saves dry-run drafts for manual posting.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** File layout, serialisation, and atomic replacement live
//! here. Invariant checks on loaded state are delegated to
//! [`pipeline::RotationState::validate`].

use std::io::Write;
use std::path::Path;

mod schedule;
mod state;

pub use schedule::{
    render_markdown, ScheduleFiles, ScheduleWriteError, ScheduleWriter, SCHEDULE_JSON,
    SCHEDULE_MARKDOWN,
};
pub use state::JsonStateStore;

/// Writes `contents` to a temporary file next to `path`, flushes it to disk,
/// then renames it over `path`.
///
/// Readers observe either the old file or the new one. Blocking; call from
/// [`tokio::task::spawn_blocking`].
pub(crate) fn replace_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".cadence-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
