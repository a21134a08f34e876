//! Incremental HTTP/1.1 response parser.
//!
//! A push parser that consumes bytes as they arrive off the wire (never
//! the whole response at once), invoking completion once a full status
//! line + headers + body has been seen. Header names/values are captured
//! into a single growable buffer, but only when a response hook is
//! registered — tracked here via [`ResponseParser::capturing`].

use super::version::Version;

/// Outcome of a completed response, handed to the connection once the body
/// has been fully consumed.
#[derive(Debug)]
pub struct Completion<'a> {
    /// Numeric response status code.
    pub status: u16,
    /// Whether this connection should remain open for another request.
    pub keep_alive: bool,
    /// `field\0value\0field\0value\0...`, present only if capture is enabled.
    pub headers: &'a [u8],
    /// Response body bytes, present only if capture is enabled.
    pub body: &'a [u8],
}

/// Errors surfaced while scanning a response. Any of these is treated by the
/// connection state machine as a read error.
#[derive(Debug)]
pub enum ParseError {
    /// Malformed or missing status line.
    StatusLine,
    /// Unsupported or malformed HTTP version.
    Version,
    /// Malformed header line.
    Header,
    /// Malformed chunked transfer-encoding framing.
    ChunkSize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ParseError::StatusLine => "invalid status line",
            ParseError::Version => "invalid or unsupported HTTP version",
            ParseError::Header => "invalid header line",
            ParseError::ChunkSize => "invalid chunk size",
        })
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy)]
enum ChunkState {
    Size,
    Data(u64),
    DataCrlf,
    Final,
}

#[derive(Debug, Clone, Copy)]
enum Body {
    ContentLength(u64),
    Chunked(ChunkState),
    UntilClose,
    Empty,
}

#[derive(Debug)]
enum Phase {
    StatusLine,
    Headers,
    Body(Body),
}

/// Incremental HTTP/1.1 response parser, reused across every response sent
/// over one connection (see [`ResponseParser::reset`]).
#[derive(Debug)]
pub struct ResponseParser {
    phase: Phase,
    scratch: Vec<u8>,
    status: u16,
    version: Version,
    content_length: Option<u64>,
    transfer_chunked: bool,
    explicit_keep_alive: Option<bool>,
    capture: bool,
    headers: Vec<u8>,
    body: Vec<u8>,
}

impl ResponseParser {
    /// Creates a parser. `capture` enables the header/body capture buffers;
    /// it should be enabled only when a response hook is registered, since
    /// most runs never read a byte of the body.
    pub fn new(capture: bool) -> Self {
        ResponseParser {
            phase: Phase::StatusLine,
            scratch: Vec::new(),
            status: 0,
            version: Version::Http11,
            content_length: None,
            transfer_chunked: false,
            explicit_keep_alive: None,
            capture,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Rearms the parser for the next response on the same connection.
    pub fn reset(&mut self) {
        self.phase = Phase::StatusLine;
        self.scratch.clear();
        self.status = 0;
        self.content_length = None;
        self.transfer_chunked = false;
        self.explicit_keep_alive = None;
        self.headers.clear();
        self.body.clear();
    }

    /// Whether header/body capture is active.
    pub fn capturing(&self) -> bool {
        self.capture
    }

    /// Feeds `data` into the parser, invoking `on_complete` once per fully
    /// parsed response (more than once if `data` spans several pipelined
    /// responses). Returns the number of bytes consumed; a return value
    /// less than `data.len()` only happens alongside an `Err` — callers
    /// should treat that as a read error.
    pub fn execute<F>(&mut self, mut data: &[u8], mut on_complete: F) -> ParseResult<usize>
    where
        F: FnMut(Completion<'_>),
    {
        let total = data.len();

        loop {
            match self.phase {
                Phase::StatusLine => match take_line(&mut self.scratch, data) {
                    Some((rest, line)) => {
                        data = rest;
                        self.parse_status_line(&line)?;
                        self.phase = Phase::Headers;
                    }
                    None => {
                        data = &[];
                        break;
                    }
                },
                Phase::Headers => match take_line(&mut self.scratch, data) {
                    Some((rest, line)) => {
                        data = rest;
                        if line.is_empty() {
                            self.phase = Phase::Body(self.determine_body());
                        } else {
                            self.parse_header_line(&line)?;
                        }
                    }
                    None => {
                        data = &[];
                        break;
                    }
                },
                Phase::Body(body) => {
                    let (consumed, done) = self.feed_body(body, data)?;
                    data = &data[consumed..];
                    if !done {
                        break;
                    }

                    on_complete(Completion {
                        status: self.status,
                        keep_alive: self.effective_keep_alive(),
                        headers: &self.headers,
                        body: &self.body,
                    });
                    self.reset();

                    if data.is_empty() {
                        break;
                    }
                }
            }
        }

        Ok(total - data.len())
    }

    /// Same as [`ResponseParser::execute`] but signals completion when the
    /// peer closes the connection mid-body (`Body::UntilClose`). Returns
    /// `true` if EOF completed a response.
    pub fn eof<F>(&mut self, mut on_complete: F) -> bool
    where
        F: FnMut(Completion<'_>),
    {
        if let Phase::Body(Body::UntilClose) = self.phase {
            on_complete(Completion {
                status: self.status,
                keep_alive: false,
                headers: &self.headers,
                body: &self.body,
            });
            self.reset();
            true
        } else {
            false
        }
    }

    fn parse_status_line(&mut self, line: &[u8]) -> ParseResult<()> {
        let mut parts = line.splitn(3, |&b| b == b' ');
        let version = parts.next().ok_or(ParseError::StatusLine)?;
        let status = parts.next().ok_or(ParseError::StatusLine)?;

        self.version = match version {
            b"HTTP/1.1" => Version::Http11,
            b"HTTP/1.0" => Version::Http10,
            _ => return Err(ParseError::Version),
        };

        self.status = std::str::from_utf8(status)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(ParseError::StatusLine)?;

        Ok(())
    }

    fn parse_header_line(&mut self, line: &[u8]) -> ParseResult<()> {
        let colon = line.iter().position(|&b| b == b':').ok_or(ParseError::Header)?;
        let name = trim_ows(&line[..colon]);
        let value = trim_ows(&line[colon + 1..]);

        if name.eq_ignore_ascii_case(b"content-length") {
            let n: u64 = std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(ParseError::Header)?;
            self.content_length = Some(n);
        } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
            self.transfer_chunked = value.eq_ignore_ascii_case(b"chunked");
        } else if name.eq_ignore_ascii_case(b"connection") {
            self.explicit_keep_alive = Some(value.eq_ignore_ascii_case(b"keep-alive"));
        }

        if self.capture {
            self.headers.extend_from_slice(name);
            self.headers.push(0);
            self.headers.extend_from_slice(value);
            self.headers.push(0);
        }

        Ok(())
    }

    fn determine_body(&mut self) -> Body {
        if matches!(self.status, 100..=199 | 204 | 304) {
            Body::Empty
        } else if self.transfer_chunked {
            Body::Chunked(ChunkState::Size)
        } else if let Some(n) = self.content_length {
            Body::ContentLength(n)
        } else if self.explicit_keep_alive == Some(false) || !self.version.keeps_alive_by_default() {
            Body::UntilClose
        } else {
            Body::Empty
        }
    }

    fn effective_keep_alive(&self) -> bool {
        self.explicit_keep_alive
            .unwrap_or_else(|| self.version.keeps_alive_by_default())
    }

    /// Returns `(bytes consumed, response body complete)`.
    fn feed_body(&mut self, body: Body, data: &[u8]) -> ParseResult<(usize, bool)> {
        match body {
            Body::Empty => Ok((0, true)),
            Body::ContentLength(remaining) => {
                let take = (remaining as usize).min(data.len());
                if self.capture {
                    self.body.extend_from_slice(&data[..take]);
                }
                let remaining = remaining - take as u64;
                if remaining == 0 {
                    Ok((take, true))
                } else {
                    self.phase = Phase::Body(Body::ContentLength(remaining));
                    Ok((take, false))
                }
            }
            Body::UntilClose => {
                if self.capture {
                    self.body.extend_from_slice(data);
                }
                self.phase = Phase::Body(Body::UntilClose);
                Ok((data.len(), false))
            }
            Body::Chunked(state) => self.feed_chunk(state, data),
        }
    }

    fn feed_chunk(&mut self, state: ChunkState, data: &[u8]) -> ParseResult<(usize, bool)> {
        let mut data = data;
        let mut consumed_total = 0usize;
        let mut state = state;

        loop {
            match state {
                ChunkState::Size => match take_line(&mut self.scratch, data) {
                    Some((rest, line)) => {
                        consumed_total += data.len() - rest.len();
                        data = rest;
                        let size_str = line
                            .split(|&b| b == b';')
                            .next()
                            .unwrap_or(&line);
                        let size = std::str::from_utf8(size_str)
                            .ok()
                            .and_then(|s| u64::from_str_radix(s.trim(), 16).ok())
                            .ok_or(ParseError::ChunkSize)?;

                        state = if size == 0 {
                            ChunkState::Final
                        } else {
                            ChunkState::Data(size)
                        };
                    }
                    None => {
                        self.phase = Phase::Body(Body::Chunked(ChunkState::Size));
                        return Ok((consumed_total, false));
                    }
                },
                ChunkState::Data(remaining) => {
                    let take = (remaining as usize).min(data.len());
                    if self.capture {
                        self.body.extend_from_slice(&data[..take]);
                    }
                    consumed_total += take;
                    data = &data[take..];
                    let remaining = remaining - take as u64;

                    if remaining > 0 {
                        self.phase = Phase::Body(Body::Chunked(ChunkState::Data(remaining)));
                        return Ok((consumed_total, false));
                    }
                    state = ChunkState::DataCrlf;
                }
                ChunkState::DataCrlf => match take_line(&mut self.scratch, data) {
                    Some((rest, _)) => {
                        consumed_total += data.len() - rest.len();
                        data = rest;
                        state = ChunkState::Size;
                    }
                    None => {
                        self.phase = Phase::Body(Body::Chunked(ChunkState::DataCrlf));
                        return Ok((consumed_total, false));
                    }
                },
                ChunkState::Final => match take_line(&mut self.scratch, data) {
                    Some((rest, line)) => {
                        consumed_total += data.len() - rest.len();
                        data = rest;
                        if line.is_empty() {
                            return Ok((consumed_total, true));
                        }
                        // trailer header; discarded.
                        state = ChunkState::Final;
                    }
                    None => {
                        self.phase = Phase::Body(Body::Chunked(ChunkState::Final));
                        return Ok((consumed_total, false));
                    }
                },
            }
        }
    }
}

/// Pulls one CRLF-terminated line out of `scratch ++ data`, returning the
/// remainder of `data` and the line (sans CRLF) if a full line was found.
/// Partial lines are appended to `scratch` and `None` is returned.
fn take_line<'a>(scratch: &mut Vec<u8>, data: &'a [u8]) -> Option<(&'a [u8], Vec<u8>)> {
    if let Some(pos) = data.iter().position(|&b| b == b'\n') {
        let mut line = if scratch.is_empty() {
            data[..pos].to_vec()
        } else {
            let mut combined = std::mem::take(scratch);
            combined.extend_from_slice(&data[..pos]);
            combined
        };
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some((&data[pos + 1..], line))
    } else {
        scratch.extend_from_slice(data);
        None
    }
}

fn trim_ows(mut s: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = s {
        s = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = s {
        s = rest;
    }
    s
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_simple_response_with_content_length() {
        let mut parser = ResponseParser::new(false);
        let mut completions = Vec::new();
        let consumed = parser
            .execute(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok", |c| {
                completions.push((c.status, c.keep_alive));
            })
            .unwrap();

        assert_eq!(41, consumed);
        assert_eq!(vec![(200, true)], completions);
    }

    #[test]
    fn handles_split_reads_across_header_boundary() {
        let mut parser = ResponseParser::new(false);
        let mut completions = Vec::new();
        let whole = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";

        for chunk in whole.chunks(3) {
            parser
                .execute(chunk, |c| completions.push(c.status))
                .unwrap();
        }

        assert_eq!(vec![404], completions);
    }

    #[test]
    fn captures_headers_and_body_when_enabled() {
        let mut parser = ResponseParser::new(true);
        let mut captured_headers = Vec::new();
        let mut captured_body = Vec::new();

        parser
            .execute(
                b"HTTP/1.1 200 OK\r\nX-Test: yes\r\nContent-Length: 2\r\n\r\nok",
                |c| {
                    captured_headers = c.headers.to_vec();
                    captured_body = c.body.to_vec();
                },
            )
            .unwrap();

        assert_eq!(b"ok", &captured_body[..]);
        assert!(captured_headers.windows(6).any(|w| w == b"X-Test"));
    }

    #[test]
    fn keep_alive_defaults_per_version() {
        let mut parser = ResponseParser::new(false);
        let mut keep_alive = None;
        parser
            .execute(b"HTTP/1.0 200 OK\r\nContent-Length: 0\r\n\r\n", |c| {
                keep_alive = Some(c.keep_alive);
            })
            .unwrap();
        assert_eq!(Some(false), keep_alive);
    }

    #[test]
    fn connection_close_overrides_http11_default() {
        let mut parser = ResponseParser::new(false);
        let mut keep_alive = None;
        parser
            .execute(
                b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                |c| keep_alive = Some(c.keep_alive),
            )
            .unwrap();
        assert_eq!(Some(false), keep_alive);
    }

    #[test]
    fn handles_pipelined_responses_in_one_execute_call() {
        let mut parser = ResponseParser::new(false);
        let mut statuses = Vec::new();
        let two = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n";

        let consumed = parser.execute(two, |c| statuses.push(c.status)).unwrap();

        assert_eq!(two.len(), consumed);
        assert_eq!(vec![200, 201], statuses);
    }

    #[test]
    fn decodes_chunked_body() {
        let mut parser = ResponseParser::new(true);
        let mut body = Vec::new();
        parser
            .execute(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
                |c| body = c.body.to_vec(),
            )
            .unwrap();

        assert_eq!(b"Wikipedia", &body[..]);
    }

    #[test]
    fn rejects_garbage_status_line() {
        let mut parser = ResponseParser::new(false);
        let err = parser.execute(b"not a response\r\n\r\n", |_| {});
        assert!(err.is_err());
    }
}
