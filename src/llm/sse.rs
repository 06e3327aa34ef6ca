//! Event-stream decoding shared by all backend codecs.
//!
//! Every backend frames its streamed output the same way: newline-delimited
//! lines, events prefixed with `data: `, and a `[DONE]` sentinel. What
//! differs is where the generated text sits inside each event's JSON
//! payload, so the codec hands the decoder an extractor instead of the
//! decoder knowing provider shapes.
//!
//! The decoder accumulates extracted fragments into a running total and
//! yields the running total at each step, so a consumer can always render
//! the latest full text without concatenating deltas itself. Decoding is
//! best-effort: lines that do not parse as the expected JSON are skipped,
//! which tolerates the keep-alive and comment lines some backends insert.

use futures_util::StreamExt;

use super::{AiError, OnDelta};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Pulls the text fragment out of one event payload, if it carries one.
pub type Extract = fn(&serde_json::Value) -> Option<String>;

/// What one fed line did to the decoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank, unprefixed, malformed, or an empty fragment. Skipped.
    Ignored,
    /// A fragment was appended to the running total.
    Delta,
    /// The completion sentinel. The sequence is finished.
    Done,
}

/// Incremental decoder for one response body.
///
/// The sequence is finite and non-restartable; feeding lines after `Done`
/// is not meaningful.
pub struct EventStreamDecoder {
    extract: Extract,
    text: String,
}

impl EventStreamDecoder {
    pub fn new(extract: Extract) -> Self {
        Self {
            extract,
            text: String::new(),
        }
    }

    /// The cumulative text decoded so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Feed one line of the response body.
    pub fn feed_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return LineOutcome::Ignored;
        }
        let data = match line.strip_prefix(DATA_PREFIX) {
            Some(d) => d,
            None => return LineOutcome::Ignored,
        };
        if data.trim() == DONE_SENTINEL {
            return LineOutcome::Done;
        }
        let payload: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => return LineOutcome::Ignored,
        };
        match (self.extract)(&payload) {
            Some(fragment) if !fragment.is_empty() => {
                self.text.push_str(&fragment);
                LineOutcome::Delta
            }
            _ => LineOutcome::Ignored,
        }
    }
}

/// Drive a live response body through the decoder, invoking `on_delta` with
/// the cumulative text after every fragment.
///
/// A read failure mid-flight surfaces as `AiError::Streaming`; text already
/// reported through `on_delta` is not retracted. A stream that ends without
/// the sentinel is treated as complete.
pub async fn read_stream(
    response: reqwest::Response,
    extract: Extract,
    on_delta: OnDelta<'_>,
) -> Result<String, AiError> {
    let mut decoder = EventStreamDecoder::new(extract);
    let mut byte_stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = byte_stream.next().await {
        let bytes = chunk.map_err(|e| AiError::Streaming(e.to_string()))?;
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        while let Some(newline_pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline_pos).collect();
            match decoder.feed_line(line.trim_end_matches('\n')) {
                LineOutcome::Done => return Ok(decoder.into_text()),
                LineOutcome::Delta => on_delta(decoder.text()),
                LineOutcome::Ignored => {}
            }
        }
    }

    Ok(decoder.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_delta_text(v: &serde_json::Value) -> Option<String> {
        v.get("delta")?.get("text")?.as_str().map(|s| s.to_string())
    }

    #[test]
    fn test_accumulates_valid_fragments_in_order() {
        let mut decoder = EventStreamDecoder::new(extract_delta_text);
        assert_eq!(
            decoder.feed_line(r#"data: {"delta": {"text": "Hel"}}"#),
            LineOutcome::Delta
        );
        assert_eq!(
            decoder.feed_line(r#"data: {"delta": {"text": "lo"}}"#),
            LineOutcome::Delta
        );
        assert_eq!(decoder.text(), "Hello");
    }

    #[test]
    fn test_skips_noise_and_malformed_lines() {
        let lines = [
            "",
            ": keep-alive",
            r#"data: {"delta": {"text": "one "}}"#,
            "data: {not json",
            "event: ping",
            r#"data: {"delta": {}}"#,
            r#"data: {"delta": {"text": "two"}}"#,
        ];
        let mut decoder = EventStreamDecoder::new(extract_delta_text);
        for line in lines {
            let outcome = decoder.feed_line(line);
            assert_ne!(outcome, LineOutcome::Done);
        }
        assert_eq!(decoder.text(), "one two");
    }

    #[test]
    fn test_done_sentinel_terminates_without_delta() {
        let mut decoder = EventStreamDecoder::new(extract_delta_text);
        decoder.feed_line(r#"data: {"delta": {"text": "partial"}}"#);
        assert_eq!(decoder.feed_line("data: [DONE]"), LineOutcome::Done);
        assert_eq!(decoder.into_text(), "partial");
    }

    #[test]
    fn test_crlf_lines_are_handled() {
        let mut decoder = EventStreamDecoder::new(extract_delta_text);
        assert_eq!(
            decoder.feed_line("data: {\"delta\": {\"text\": \"ok\"}}\r"),
            LineOutcome::Delta
        );
        assert_eq!(decoder.feed_line("data: [DONE]\r"), LineOutcome::Done);
        assert_eq!(decoder.text(), "ok");
    }

    #[test]
    fn test_cumulative_totals_reported_per_delta() {
        let mut decoder = EventStreamDecoder::new(extract_delta_text);
        let mut seen = Vec::new();
        for line in [
            r#"data: {"delta": {"text": "He"}}"#,
            r#"data: {"delta": {"text": "llo there"}}"#,
        ] {
            if decoder.feed_line(line) == LineOutcome::Delta {
                seen.push(decoder.text().to_string());
            }
        }
        assert_eq!(seen, vec!["He".to_string(), "Hello there".to_string()]);
    }
}
