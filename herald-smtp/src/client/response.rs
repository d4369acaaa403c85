//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// One line of a (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `false` when the code is followed by `-` (more lines follow)
    pub is_last: bool,
    pub message: String,
}

/// A complete SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All reply text, one line per reply line.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx, e.g. 354 after DATA or 334 during AUTH
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// EHLO keywords, i.e. every line after the greeting line, upper-cased.
    pub fn capabilities(&self) -> impl Iterator<Item = String> + '_ {
        self.lines.iter().skip(1).map(|line| line.to_ascii_uppercase())
    }

    /// Whether an EHLO reply advertises `keyword` (e.g. `STARTTLS`).
    #[must_use]
    pub fn has_capability(&self, keyword: &str) -> bool {
        self.capabilities().any(|capability| {
            capability
                .split_whitespace()
                .next()
                .is_some_and(|first| first.eq_ignore_ascii_case(keyword))
        })
    }

    /// Mechanisms listed on the `AUTH` line of an EHLO reply.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.capabilities()
            .filter_map(|capability| {
                let mut words = capability.split_whitespace();
                match words.next() {
                    Some("AUTH") => Some(words.map(str::to_string).collect::<Vec<_>>()),
                    // Some older servers still use the pre-standard `AUTH=` form
                    Some(word) if word.starts_with("AUTH=") => Some(
                        core::iter::once(word.trim_start_matches("AUTH=").to_string())
                            .chain(words.map(str::to_string))
                            .collect(),
                    ),
                    _ => None,
                }
            })
            .flatten()
            .collect()
    }

    /// Parses a single reply line (without its line terminator).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code_str = line.get(..3).ok_or_else(|| {
            ClientError::ParseError(format!("Response line too short: '{line}'"))
        })?;

        let code = code_str
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{code_str}'")))?;

        let (is_last, message) = match line[3..].chars().next() {
            None => (true, ""),
            Some(' ') => (true, &line[4..]),
            Some('-') => (false, &line[4..]),
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{c}'"
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: message.to_string(),
        })
    }

    /// Parses one complete reply from the front of `buffer`.
    ///
    /// Returns `None` when more data is needed, otherwise the reply and the
    /// number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the reply is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let text = std::str::from_utf8(raw)?.trim_end_matches('\r');
            if text.is_empty() {
                continue;
            }

            let line = Self::parse_line(text)?;
            match code {
                Some(expected) if expected != line.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
                None => code = Some(line.code),
            }

            lines.push(line.message);

            if line.is_last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}
