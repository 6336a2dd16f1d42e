use seqidx_format::{ErrorSink, IndexError};

/// Prints every reported error to stderr.
pub struct StderrErrorSink;

impl ErrorSink for StderrErrorSink {
    fn on_error(&self, error: IndexError) {
        eprintln!("ERR {}", error);
    }
}
