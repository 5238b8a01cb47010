//! SMTP reply parsing and buffering.

use super::error::{ClientError, Result};

/// Largest amount of unterminated reply data kept before giving up.
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Represents a single line in an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// Represents a complete SMTP response, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
    raw: String,
}

impl Response {
    /// Creates a single-line response.
    #[must_use]
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let raw = if message.is_empty() {
            code.to_string()
        } else {
            format!("{code} {message}")
        };

        Self {
            code,
            lines: vec![message],
            raw,
        }
    }

    /// The reply exactly as received, without its final line terminator.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let bytes = line.as_bytes();
        if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
            return Err(ClientError::ParseError(format!(
                "Invalid status code: '{line}'"
            )));
        }

        let code = bytes[..3]
            .iter()
            .fold(0u16, |code, digit| code * 10 + u16::from(digit - b'0'));

        // A space (or nothing) marks the last line, a dash a continuation
        let is_last = match bytes.get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(*c)
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: line.get(4..).unwrap_or_default().to_string(),
        })
    }

    /// Parses a complete multi-line SMTP response from the front of a buffer.
    ///
    /// Returns the parsed `Response` and the number of bytes consumed, or
    /// `None` while the final line has not fully arrived.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the response is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut first_code = None;
        let mut lines = Vec::new();
        let mut raw = Vec::new();

        while let Some(pos) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + pos;
            let line = &buffer[consumed..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            consumed = end + 1;

            if line.is_empty() {
                continue;
            }

            let text = String::from_utf8_lossy(line);
            let parsed = Self::parse_line(&text)?;

            match first_code {
                Some(code) if code != parsed.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
                None => first_code = Some(parsed.code),
            }

            raw.push(text.into_owned());
            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(Some((
                    Self {
                        code: parsed.code,
                        lines,
                        raw: raw.join("\r\n"),
                    },
                    consumed,
                )));
            }
        }

        Ok(None)
    }
}

/// Bytes received from the server that have not yet formed a whole reply.
#[derive(Debug, Default)]
pub struct ReplyBuffer {
    pending: Vec<u8>,
}

impl ReplyBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Takes the next complete reply off the front of the buffer.
    ///
    /// # Errors
    ///
    /// Fails on malformed replies, or when more than 64 KiB arrive without
    /// completing one.
    pub fn next_reply(&mut self) -> Result<Option<Response>> {
        match Response::parse_response(&self.pending)? {
            Some((response, consumed)) => {
                self.pending.drain(..consumed);
                Ok(Some(response))
            }
            None if self.pending.len() > MAX_BUFFER_SIZE => Err(ClientError::ParseError(
                format!("Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"),
            )),
            None => Ok(None),
        }
    }

    /// Whether unconsumed bytes remain.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
