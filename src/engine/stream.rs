// Sloganforge Engine — Stream decoder
//
// Push parser turning the byte chunks of a streamed HTTP response body into
// decoded text fragments. One decoder instance serves exactly one request.
//
// Two framing modes, selected at construction (see `StreamMode`):
//   • RawChunks   — each chunk is UTF-8 text, emitted verbatim, except that a
//                   fragment consisting solely of a newline is suppressed when
//                   the text emitted so far already ends in one (collapses the
//                   duplicate blank lines produced by the proxy formatter).
//   • EventFramed — blank-line separated records carrying `data:` fields.
//                   `[DONE]` ends the stream; any other payload is JSON whose
//                   `choices[0].delta.content` is the fragment.
//
// Byte chunks may split a multi-byte UTF-8 sequence or an event record at any
// point; the decoder carries the undecoded tail between feeds.

use log::debug;
use serde_json::Value;

use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::config::StreamMode;

/// End-of-stream sentinel in event-framed mode.
const DONE_SENTINEL: &str = "[DONE]";

pub struct StreamDecoder {
    mode: StreamMode,
    /// Incomplete trailing multi-byte sequence from the previous chunk.
    utf8_carry: Vec<u8>,
    /// Not-yet-terminated line text (event-framed mode).
    line_buffer: String,
    /// `data:` field values of the record currently being assembled.
    data_lines: Vec<String>,
    /// Whether everything emitted so far ends with a newline (raw mode).
    tail_newline: bool,
    /// Set once the `[DONE]` sentinel has been seen.
    done: bool,
}

impl StreamDecoder {
    pub fn new(mode: StreamMode) -> Self {
        StreamDecoder {
            mode,
            utf8_carry: Vec::new(),
            line_buffer: String::new(),
            data_lines: Vec::new(),
            tail_newline: false,
            done: false,
        }
    }

    /// True once the upstream has signalled successful completion.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one byte chunk, returning the fragments it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> EngineResult<Vec<String>> {
        if self.done {
            return Ok(Vec::new());
        }
        let text = self.decode_utf8(chunk);
        match self.mode {
            StreamMode::RawChunks => Ok(self.emit_raw(text)),
            StreamMode::EventFramed => self.consume_lines(&text),
        }
    }

    /// Flush at end of input: decodes any carried bytes and, in event-framed
    /// mode, dispatches a final record that arrived without a trailing blank
    /// line.
    pub fn finish(&mut self) -> EngineResult<Vec<String>> {
        if self.done {
            return Ok(Vec::new());
        }
        let tail = if self.utf8_carry.is_empty() {
            String::new()
        } else {
            // Whatever is left cannot become valid by waiting for more bytes.
            let text = String::from_utf8_lossy(&self.utf8_carry).into_owned();
            self.utf8_carry.clear();
            text
        };
        match self.mode {
            StreamMode::RawChunks => Ok(self.emit_raw(tail)),
            StreamMode::EventFramed => {
                let mut fragments = self.consume_lines(&tail)?;
                if !self.line_buffer.is_empty() {
                    let line = std::mem::take(&mut self.line_buffer);
                    self.handle_line(line.trim_end_matches('\r'), &mut fragments)?;
                }
                if !self.done && !self.data_lines.is_empty() {
                    self.dispatch_record(&mut fragments)?;
                }
                Ok(fragments)
            }
        }
    }

    // ── UTF-8 boundary handling ────────────────────────────────────────

    /// Decode `chunk` prefixed by the carried bytes, retaining an incomplete
    /// trailing sequence for the next feed. Invalid complete sequences decode
    /// to U+FFFD instead of failing the stream.
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.utf8_carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::new();
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                        None => {
                            // Sequence split at the chunk boundary; wait for
                            // the remaining bytes.
                            self.utf8_carry = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    // ── Raw-chunk mode ─────────────────────────────────────────────────

    fn emit_raw(&mut self, text: String) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if text == "\n" && self.tail_newline {
            debug!("[decoder] suppressed duplicate blank line");
            return Vec::new();
        }
        self.tail_newline = text.ends_with('\n');
        vec![text]
    }

    // ── Event-framed mode ──────────────────────────────────────────────

    fn consume_lines(&mut self, text: &str) -> EngineResult<Vec<String>> {
        self.line_buffer.push_str(text);
        let mut fragments = Vec::new();
        while let Some(idx) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=idx).collect();
            self.handle_line(line.trim_end_matches(['\n', '\r']), &mut fragments)?;
            if self.done {
                break;
            }
        }
        Ok(fragments)
    }

    fn handle_line(&mut self, line: &str, fragments: &mut Vec<String>) -> EngineResult<()> {
        if line.is_empty() {
            // Blank line terminates the record.
            if !self.data_lines.is_empty() {
                self.dispatch_record(fragments)?;
            }
        } else if line.starts_with(':') {
            // Comment line, ignored.
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data_lines
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        // Other fields (event:, id:, retry:) carry nothing we consume.
        Ok(())
    }

    fn dispatch_record(&mut self, fragments: &mut Vec<String>) -> EngineResult<()> {
        let data = self.data_lines.join("\n");
        self.data_lines.clear();

        if data == DONE_SENTINEL {
            debug!("[decoder] stream complete");
            self.done = true;
            return Ok(());
        }

        let v: Value = serde_json::from_str(&data)
            .map_err(|e| EngineError::Decode(format!("malformed event payload: {e}")))?;
        let content = v["choices"][0]["delta"]["content"].as_str().unwrap_or("");
        if !content.is_empty() {
            fragments.push(content.to_string());
        }
        Ok(())
    }
}
