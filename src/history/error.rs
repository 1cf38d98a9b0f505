// ABOUTME: History persistence errors with SNAFU context selectors.
// ABOUTME: Every variant names the file involved so corrupt logs can be found.

use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HistoryError {
    #[snafu(display("history I/O failed for {}: {source}", path.display()))]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to encode deployment record: {source}"))]
    Encode { source: serde_json::Error },

    #[snafu(display("corrupt history entry at {}:{line}: {source}", path.display()))]
    Decode {
        source: serde_json::Error,
        path: PathBuf,
        line: usize,
    },
}
