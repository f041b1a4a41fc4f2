//! Record sink.

use freqlog_common::config::OutputTarget;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use tracing::info;

/// Boxed writer records are emitted to.
pub type RecordSink = Box<dyn Write + Send>;

/// Open the configured sink.
///
/// Files are created if missing and always appended to; earlier runs are
/// never truncated.
///
/// # Errors
///
/// Returns the I/O error from opening the file.
pub fn open_sink(target: &OutputTarget) -> io::Result<RecordSink> {
    match target {
        OutputTarget::Stdout => {
            info!("Writing records to stdout");
            Ok(Box::new(io::stdout()))
        }
        OutputTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            info!(path = %path.display(), "Appending records to file");
            Ok(Box::new(BufWriter::new(file)))
        }
    }
}
