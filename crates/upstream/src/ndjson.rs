//! Incremental NDJSON framing for the streaming chat body.
//!
//! The daemon streams one JSON chunk per line. Network reads split lines
//! arbitrarily, so the buffer is drained in place: complete lines are
//! consumed and any trailing partial line remains for the next call.

/// Extract complete lines from the buffer, leaving a trailing partial line.
///
/// Blank lines are skipped.
pub(crate) fn drain_lines(buffer: &mut String) -> Vec<String> {
    let mut lines = Vec::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..pos).collect();
        buffer.drain(..1); // remove the newline
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_line() {
        let mut buf = String::from("{\"done\":false}\n");
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["{\"done\":false}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_multiple_lines() {
        let mut buf = String::from("first\nsecond\n");
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["first", "second"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_line_stays_in_buffer() {
        let mut buf = String::from("complete\npartial");
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["complete"]);
        assert_eq!(buf, "partial");
    }

    #[test]
    fn empty_buffer() {
        let mut buf = String::new();
        assert!(drain_lines(&mut buf).is_empty());
    }

    #[test]
    fn blank_lines_skipped() {
        let mut buf = String::from("\n\n{\"a\":1}\n\n");
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["{\"a\":1}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn incremental_buffering() {
        let mut buf = String::from("{\"chunk\":");
        assert!(drain_lines(&mut buf).is_empty());
        assert_eq!(buf, "{\"chunk\":");

        buf.push_str("1}\n{\"chunk\":2}\n");
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["{\"chunk\":1}", "{\"chunk\":2}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn crlf_trimmed() {
        let mut buf = String::from("{\"a\":1}\r\n");
        let lines = drain_lines(&mut buf);
        assert_eq!(lines, vec!["{\"a\":1}"]);
    }
}
