use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Chunks(ChunksError),
    InvalidPayload,
}

/// Reads the `data` payloads of server-sent events from a chunk stream.
///
/// Only what chat-completion endpoints emit is supported: `data` fields
/// (joined with `\n` when repeated within one event), comment lines
/// starting with `:` which some gateways use as keep-alives, and either
/// `\n` or `\r\n` line endings. Other fields such as `event` or `id` are
/// skipped.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
    exhausted: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
            exhausted: false,
        }
    }

    /// Returns the next event payload, or `None` at the end of the stream.
    ///
    /// A trailing event not terminated by a blank line is dropped.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(data) = self.take_event()? {
                return Ok(Some(data));
            }
            if self.exhausted {
                return Ok(None);
            }
            match self.chunks.next_chunk().await.map_err(Error::Chunks)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.exhausted = true,
            }
        }
    }

    /// Pops complete events off the buffer until one carries data.
    fn take_event(&mut self) -> Result<Option<String>, Error> {
        while let Some((end, sep_len)) = find_event_end(&self.buf) {
            let raw: Vec<u8> = self.buf.drain(..end + sep_len).collect();
            let Ok(raw) = std::str::from_utf8(&raw[..end]) else {
                return Err(Error::InvalidPayload);
            };

            let mut data: Option<String> = None;
            for line in raw.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (field, value) = match line.split_once(':') {
                    Some((field, value)) => {
                        (field, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                match field {
                    "data" => {
                        let data = data.get_or_insert_with(String::new);
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(value);
                    }
                    "event" | "id" | "retry" => {}
                    _ => return Err(Error::InvalidPayload),
                }
            }
            if data.is_some() {
                return Ok(data);
            }
        }
        Ok(None)
    }
}

/// Finds the blank line ending the first event, returning its offset and
/// the length of the separator.
fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
