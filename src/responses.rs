use alloc::vec::Vec;

/// Success terminator of AT commands
pub(crate) const OK_TERMINATOR: &[u8] = b"OK\r\n";

/// Error terminator of AT commands and data transmissions
pub(crate) const ERROR_TERMINATOR: &[u8] = b"ERROR\r\n";

/// Success terminator of TCP/TLS data transmissions
pub(crate) const SEND_OK_TERMINATOR: &[u8] = b"SEND OK\r\n";

/// Line terminator
pub(crate) const CRLF: &[u8] = b"\r\n";

/// Classified result of a single command attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Accumulated bytes end with the success terminator
    Success(Vec<u8>),

    /// Accumulated bytes end with the error terminator
    Failure(Vec<u8>),

    /// No terminator was seen before the deadline
    Timeout(Vec<u8>),
}

/// Raw response of a successful command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    data: Vec<u8>,
}

impl Response {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Raw response bytes including all line terminators
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Iterates over all lines. Line terminators are stripped, empty lines are kept.
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        Lines { remaining: &self.data }
    }

    /// Returns the remainder of the first line starting with the given prefix
    pub fn find_prefixed(&self, prefix: &[u8]) -> Option<&[u8]> {
        self.lines().find_map(|line| line.strip_prefix(prefix))
    }

    /// Returns true if the marker is contained anywhere in the response
    pub fn contains(&self, marker: &[u8]) -> bool {
        contains(&self.data, marker)
    }
}

/// Line iterator splitting on CRLF
struct Lines<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }

        match self.remaining.windows(CRLF.len()).position(|window| window == CRLF) {
            Some(end) => {
                let line = &self.remaining[..end];
                self.remaining = &self.remaining[end + CRLF.len()..];
                Some(line)
            }
            None => {
                let line = self.remaining;
                self.remaining = &[];
                Some(line)
            }
        }
    }
}

/// Returns true if the needle is contained in the haystack
pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }

    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Removes surrounding quotes, if any
pub(crate) fn unquote(value: &[u8]) -> &[u8] {
    match value {
        [b'"', inner @ .., b'"'] => inner,
        _ => value,
    }
}

/// Parses an unsigned decimal number. Leading/trailing whitespace is ignored.
pub(crate) fn parse_number(value: &[u8]) -> Option<u32> {
    core::str::from_utf8(value).ok()?.trim().parse().ok()
}
