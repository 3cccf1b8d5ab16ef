//! Destination for terminal results.
//!
//! Every [`std::io::Write`] is a [`ResultSink`], so stdout, files and in-memory
//! buffers all work without adapters.

use std::io;

/// Writes one terminal result per call.
pub trait ResultSink {
    /// # Errors
    ///
    /// Returns an error if the result cannot be written
    fn write_result(&mut self, line: &str) -> io::Result<()>;
}

impl<W: io::Write> ResultSink for W {
    fn write_result(&mut self, line: &str) -> io::Result<()> {
        writeln!(self, "{line}")?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_appends_newline() {
        let mut buf = Vec::new();
        buf.write_result("created secret version 1").unwrap();
        buf.write_result("done").unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "created secret version 1\ndone\n");
    }
}
