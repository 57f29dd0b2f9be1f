//! Line framing for the child's stdout stream
//!
//! Design Decision: a standalone accumulator, not inline buffering in the reader loop
//!
//! Rationale: the framing rule ("append to stdoutBuffer, split on newline,
//! retain the trailing fragment, ignore empty lines") is pure and has no
//! async dependency of its own. Pulling it out of the reader task means the
//! partial-read and interleaved-chunk boundary behaviors can be asserted
//! directly in a unit test instead of only through a real child process.
//!
//! Trade-offs:
//! - A hand-rolled buffer vs. `AsyncBufReadExt::lines()`: `lines()` would
//!   also satisfy the partial-read requirement, but it hides the
//!   `stdoutBuffer` the data model names as connection state, and it can't
//!   be driven from a plain `&[u8]` in a test without a real `AsyncRead`.

/// Accumulates raw bytes from a child's stdout and yields complete lines.
///
/// Holds exactly the `stdoutBuffer` state described in the data model: a
/// string accumulator for the trailing, not-yet-terminated fragment.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes read from stdout. Returns zero or more complete
    /// lines (newline stripped, empty lines dropped). Non-UTF-8 bytes are
    /// replaced lossily rather than treated as a framing error - a child
    /// that writes non-UTF-8 garbage to stdout is the same practical failure
    /// as one that writes malformed JSON, and both are handled by the
    /// caller's per-line parse step, not here.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(idx) = self.buffer.find('\n') {
            let line = self.buffer[..idx].to_string();
            self.buffer.drain(..=idx);
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_mid_line_across_two_pushes_yields_one_line() {
        let mut framer = LineFramer::new();
        assert!(framer.push(br#"{"jsonrpc":"2.0","id":1,"re"#).is_empty());
        let lines = framer.push(br#"sult":{"ok":true}}"#.to_vec().as_slice());
        assert!(lines.is_empty(), "no newline yet, nothing should flush");
        let lines = framer.push(b"\n");
        assert_eq!(lines, vec![r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#]);
    }

    #[test]
    fn two_chunks_each_with_multiple_lines_preserve_order() {
        let mut framer = LineFramer::new();
        let first = framer.push(b"{\"id\":1}\n{\"id\":2}\n");
        assert_eq!(first, vec!["{\"id\":1}", "{\"id\":2}"]);
        let second = framer.push(b"{\"id\":3}\n{\"id\":4}\n");
        assert_eq!(second, vec!["{\"id\":3}", "{\"id\":4}"]);
    }

    #[test]
    fn empty_lines_are_dropped() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"\n\n{\"id\":1}\n\n");
        assert_eq!(lines, vec!["{\"id\":1}"]);
    }

    #[test]
    fn malformed_line_passes_through_framing_unaffected() {
        // Framing doesn't parse JSON; it just yields lines. The malformed
        // line still comes out - it's the dispatch layer's job to drop it.
        let mut framer = LineFramer::new();
        let lines = framer.push(b"{\"id\":1}\nnot json\n{\"id\":2}\n");
        assert_eq!(lines, vec!["{\"id\":1}", "not json", "{\"id\":2}"]);
    }

    #[test]
    fn trailing_fragment_without_newline_is_retained() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"{\"id\":1}\ntrailing-fragment-no-newline");
        assert_eq!(lines, vec!["{\"id\":1}"]);
        let flushed = framer.push(b"\n");
        assert_eq!(flushed, vec!["trailing-fragment-no-newline"]);
    }
}
