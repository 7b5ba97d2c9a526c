//! Chunk-tolerant parsing of runner stdout.
//!
//! Stdout is delivered in arbitrary byte chunks with no line alignment. The
//! parser keeps the unterminated tail of the previous chunk and only matches
//! the progress marker against complete lines, so the decoded event sequence
//! is identical however the stream was split.

use super::types::{PROGRESS_PREFIX, ProgressDecodeError, ProgressEvent, RawProgress};

/// One complete line of runner stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// A well-formed progress marker line.
    Progress(ProgressEvent),
    /// Any other line, including marker lines whose payload failed to decode.
    Diagnostic(String),
}

/// Decode a single stdout line.
///
/// Returns `None` when the line does not carry the progress marker. Decode
/// failures are returned, not raised, so callers decide how loud to be.
pub fn decode_progress_line(line: &str) -> Option<Result<ProgressEvent, ProgressDecodeError>> {
    let payload = line.trim_start().strip_prefix(PROGRESS_PREFIX)?.trim();
    if payload.is_empty() {
        return Some(Err(ProgressDecodeError::Empty));
    }
    Some(
        serde_json::from_str::<RawProgress>(payload)
            .map_err(|e| ProgressDecodeError::Json(e.to_string()))
            .and_then(ProgressEvent::try_from),
    )
}

/// Incremental line splitter + progress decoder for one runner invocation.
#[derive(Debug, Default)]
pub struct ProgressLineParser {
    /// Bytes after the last newline seen so far. Kept as bytes so a multi-byte
    /// character split across chunks is reassembled before decoding.
    pending: Vec<u8>,
}

impl ProgressLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of raw stdout and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ParsedLine> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(Self::classify(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush an unterminated final line. Call once the stream hits EOF.
    pub fn finish(&mut self) -> Vec<ParsedLine> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.pending);
        vec![Self::classify(&rest)]
    }

    /// Whether a partial line is still buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn classify(raw: &[u8]) -> ParsedLine {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        match decode_progress_line(&line) {
            Some(Ok(event)) => ParsedLine::Progress(event),
            Some(Err(e)) => {
                tracing::warn!(error = %e, line = %line, "Dropping malformed progress line");
                ParsedLine::Diagnostic(line.into_owned())
            }
            None => ParsedLine::Diagnostic(line.into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_only(lines: Vec<ParsedLine>) -> Vec<ProgressEvent> {
        lines
            .into_iter()
            .filter_map(|l| match l {
                ParsedLine::Progress(e) => Some(e),
                ParsedLine::Diagnostic(_) => None,
            })
            .collect()
    }

    fn parse_in_chunks(input: &[u8], chunk_sizes: &[usize]) -> Vec<ParsedLine> {
        let mut parser = ProgressLineParser::new();
        let mut out = Vec::new();
        let mut rest = input;
        let mut sizes = chunk_sizes.iter().cycle();
        while !rest.is_empty() {
            let n = (*sizes.next().unwrap()).max(1).min(rest.len());
            let (chunk, tail) = rest.split_at(n);
            out.extend(parser.push(chunk));
            rest = tail;
        }
        out.extend(parser.finish());
        out
    }

    const STREAM: &str = concat!(
        "Loading project...\n",
        "CLAUDE_MD_PROGRESS:{\"phase\":\"analyzing\",\"message\":\"Scanning files\",\"percent\":10}\n",
        "warning: large repo\r\n",
        "CLAUDE_MD_PROGRESS:{\"phase\":\"writing\",\"message\":\"Résumé ✓ drafting\",\"percent\":60}\n",
        "CLAUDE_MD_PROGRESS:{broken\n",
        "CLAUDE_MD_PROGRESS:{\"phase\":\"done\",\"message\":\"Finished\",\"percent\":100}",
    );

    #[test]
    fn test_decode_ignores_unmarked_lines() {
        assert!(decode_progress_line("plain output").is_none());
        assert!(decode_progress_line("progress: 50%").is_none());
    }

    #[test]
    fn test_decode_valid_payload() {
        let event = decode_progress_line(
            r#"CLAUDE_MD_PROGRESS:{"phase":"analyzing","message":"Scanning","percent":25}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event, ProgressEvent::new("analyzing", "Scanning", 25));
    }

    #[test]
    fn test_decode_malformed_payload_is_err_not_panic() {
        let result = decode_progress_line("CLAUDE_MD_PROGRESS:{not json").unwrap();
        assert!(matches!(result, Err(ProgressDecodeError::Json(_))));
    }

    #[test]
    fn test_decode_empty_payload() {
        let result = decode_progress_line("CLAUDE_MD_PROGRESS:   ").unwrap();
        assert_eq!(result, Err(ProgressDecodeError::Empty));
    }

    #[test]
    fn test_line_split_across_chunks_is_reassembled() {
        let mut parser = ProgressLineParser::new();
        let first = parser.push(b"CLAUDE_MD_PROGRESS:{\"phase\":\"ana");
        assert!(first.is_empty());
        assert!(parser.has_pending());

        let second = parser.push(b"lyzing\",\"message\":\"m\",\"percent\":5}\nnext");
        assert_eq!(
            second,
            vec![ParsedLine::Progress(ProgressEvent::new("analyzing", "m", 5))]
        );
        assert_eq!(parser.finish(), vec![ParsedLine::Diagnostic("next".into())]);
        assert!(!parser.has_pending());
    }

    #[test]
    fn test_crlf_line_endings_are_stripped() {
        let mut parser = ProgressLineParser::new();
        let lines = parser
            .push(b"CLAUDE_MD_PROGRESS:{\"phase\":\"p\",\"message\":\"m\",\"percent\":1}\r\n");
        assert_eq!(
            lines,
            vec![ParsedLine::Progress(ProgressEvent::new("p", "m", 1))]
        );
    }

    #[test]
    fn test_malformed_marker_line_becomes_diagnostic() {
        let mut parser = ProgressLineParser::new();
        let lines = parser.push(b"CLAUDE_MD_PROGRESS:{broken\n");
        assert_eq!(
            lines,
            vec![ParsedLine::Diagnostic("CLAUDE_MD_PROGRESS:{broken".into())]
        );
    }

    #[test]
    fn test_chunking_invariance() {
        let whole = parse_in_chunks(STREAM.as_bytes(), &[STREAM.len()]);
        let expected = progress_only(whole.clone());
        assert_eq!(expected.len(), 3);
        assert_eq!(expected[1].message, "Résumé ✓ drafting");

        for sizes in [
            vec![1],
            vec![2],
            vec![3, 7],
            vec![13],
            vec![64, 1, 5],
            vec![100],
        ] {
            let lines = parse_in_chunks(STREAM.as_bytes(), &sizes);
            assert_eq!(lines, whole, "line sequence differs for chunk sizes {:?}", sizes);
            assert_eq!(progress_only(lines), expected);
        }
    }

    #[test]
    fn test_finish_on_empty_buffer_is_empty() {
        let mut parser = ProgressLineParser::new();
        assert!(parser.push(b"complete line\n").len() == 1);
        assert!(parser.finish().is_empty());
    }
}
