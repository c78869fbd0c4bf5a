//! Incremental decoder for push-channel frames.
//!
//! Accepts `text/event-stream` framing (`data:` lines ended by a blank line)
//! as well as bare newline-delimited JSON. Comment lines and other SSE
//! fields are skipped.

use coursechat_common::ChatEvent;

use crate::error::Result;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the response body and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<ChatEvent>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            self.line(&line, &mut out);
        }

        out
    }

    fn line(&mut self, line: &str, out: &mut Vec<Result<ChatEvent>>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                let payload = self.data.join("\n");
                self.data.clear();
                out.push(decode(&payload));
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            return;
        }
        if self.data.is_empty() && line.trim_start().starts_with('{') {
            out.push(decode(line));
        }
        // event:, id:, retry: carry nothing the client uses.
    }
}

fn decode(payload: &str) -> Result<ChatEvent> {
    Ok(serde_json::from_str(payload)?)
}
