//! Minimal server-sent-events framing for the generation stream.
//!
//! Only `data:` fields matter to us; `event:`, `id:` and comments are skipped. Multi-line data is
//! joined with `\n`. An event is dispatched on a blank line.

use crate::llm_client::LlmError;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feeds raw body bytes and returns every event completed by them, in order.
    /// Partial lines are kept until the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, LlmError> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8(line)
                .map_err(|e| LlmError::Stream(format!("invalid UTF-8 in event stream: {e}")))?;
            if let Some(event) = self.feed_line(&line) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flushes an event left open when the body ended without a trailing blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
            self.feed_line(rest.trim_end_matches('\r'));
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}
