//! Cadence document sources.
//!
//! Implements [`pipeline::DocumentSource`] with two backends:
//!
//! - [`FileDocumentSource`] reads a UTF-8 text file; the document identifier
//!   is a path, resolved against an optional base directory.
//! - [`HttpDocumentSource`] downloads a plain-text export; the document
//!   identifier is substituted into a URL template such as
//!   `https://docs.google.com/document/d/{id}/export?format=txt`.
//!
//! | Scenario | Source | Notes |
//! |----------|--------|-------|
//! | Local drafts | `FileDocumentSource` | `document.kind = "file"` |
//! | Shared document | `HttpDocumentSource` | `document.kind = "http"`, link-shared export |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Both backends map their transport failures onto
//! [`pipeline::SourceFailure`]; the [`pipeline`] crate never sees paths or
//! status codes.

mod file;
mod http;

pub use file::FileDocumentSource;
pub use http::{HttpDocumentSource, HttpSourceSettings};

/// Drops a leading byte-order mark, which some exporters prepend.
pub(crate) fn strip_bom(text: String) -> String {
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}
