//! Handshake response parsing
//!
//! Servers in this family answer a SOURCE request in several ways:
//!
//! - `HTTP/1.0 200 OK` followed by headers (Icecast 2)
//! - `ICY 200 OK` or a bare `OK2` (Shoutcast, older Harbor inputs)
//! - `HTTP/1.0 401 ...`, `403`, `404` with a short body, then close
//! - nothing at all on success (some Harbor inputs)
//!
//! Only the status line decides the outcome. Bytes accumulate in a
//! [`ResponseBuffer`] until the first line is complete.

use bytes::BytesMut;

use super::constants::MAX_RESPONSE_SIZE;

/// Outcome of inspecting the buffered response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Status line not complete yet
    Incomplete,
    /// Server accepted the source
    Accepted,
    /// 404: mount not available
    MountUnavailable,
    /// 401/403 or an explicit bad-password reply
    AuthRejected,
    /// Complete status line we do not understand
    Unrecognized,
}

impl ResponseClass {
    /// Whether the server refused the request
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ResponseClass::MountUnavailable | ResponseClass::AuthRejected
        )
    }
}

/// Classify a single status line.
///
/// Rejections are checked before acceptance so `403 OK`-style oddities stay
/// rejections.
pub fn classify_status_line(line: &str) -> ResponseClass {
    if line.to_ascii_lowercase().contains("invalid password") {
        return ResponseClass::AuthRejected;
    }
    if line.contains("401") || line.contains("403") {
        return ResponseClass::AuthRejected;
    }
    if line.contains("404") {
        return ResponseClass::MountUnavailable;
    }
    if line.contains("ICY 200") || line.contains("200") || line.contains("OK") {
        return ResponseClass::Accepted;
    }
    ResponseClass::Unrecognized
}

/// Accumulates response bytes until a status line can be classified
#[derive(Debug)]
pub struct ResponseBuffer {
    data: BytesMut,
    limit: usize,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::with_limit(MAX_RESPONSE_SIZE)
    }

    /// Buffer that reports `Unrecognized` once `limit` bytes arrive without a line end
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(512),
            limit,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The complete first line, without its terminator
    pub fn status_line(&self) -> Option<String> {
        let end = self.data.iter().position(|b| *b == b'\n')?;
        let line = String::from_utf8_lossy(&self.data[..end]);
        Some(line.trim_end_matches('\r').trim().to_string())
    }

    /// Whatever has arrived of the first line, complete or not
    pub fn partial_line(&self) -> String {
        let end = self
            .data
            .iter()
            .position(|b| *b == b'\n')
            .unwrap_or(self.data.len());
        String::from_utf8_lossy(&self.data[..end]).trim().to_string()
    }

    /// Classify once the status line is complete
    pub fn classify(&self) -> ResponseClass {
        match self.status_line() {
            Some(line) => classify_status_line(&line),
            None if self.data.len() >= self.limit => ResponseClass::Unrecognized,
            None => ResponseClass::Incomplete,
        }
    }

    /// Rejection visible in the buffered bytes, even without a line end.
    ///
    /// Used when the acceptance timeout fires or the server closes the socket.
    pub fn rejection(&self) -> Option<ResponseClass> {
        let class = classify_status_line(&self.partial_line());
        class.is_rejection().then_some(class)
    }

    /// Case-insensitive header lookup in the buffered response
    pub fn header(&self, name: &str) -> Option<String> {
        let text = String::from_utf8_lossy(&self.data);
        text.split('\n').skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}
