//! Progress line protocol for runner processes.
//!
//! A runner started with `--progress` reports its state on stdout using lines of
//! the form:
//!
//! ```text
//! CLAUDE_MD_PROGRESS:{"phase":"analyzing","message":"Scanning files","percent":40}
//! ```
//!
//! Every other stdout line is plain diagnostic text. Output arrives in arbitrary
//! chunks, so [`ProgressLineParser`] reassembles lines before matching the
//! marker.

mod parser;
mod types;

pub use parser::{ParsedLine, ProgressLineParser, decode_progress_line};
pub use types::{PROGRESS_PREFIX, ProgressDecodeError, ProgressEvent};
