//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// A single line of an SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `true` for the final line (`250 ...`), `false` for continuations (`250-...`).
    pub is_last: bool,
    pub message: String,
}

/// A complete, possibly multi-line, SMTP reply.
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

    /// The reply text with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// `true` for 3xx intermediate replies (`354`, `334`).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.is_temporary_error() || self.is_permanent_error()
    }

    /// Converts error replies into [`ClientError::SmtpError`] and anything
    /// outside 2xx-5xx into [`ClientError::UnexpectedResponse`].
    ///
    /// # Errors
    ///
    /// Returns an error when the reply is not a 2xx or 3xx reply.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() || self.is_intermediate() {
            Ok(self)
        } else if self.is_error() {
            Err(ClientError::SmtpError {
                code: self.code,
                message: self.message(),
            })
        } else {
            Err(ClientError::UnexpectedResponse {
                code: self.code,
                message: self.message(),
            })
        }
    }

    /// Parses a single reply line without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let bytes = line.as_bytes();
        if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
            return Err(ClientError::ParseError(format!(
                "Invalid reply line: '{line}'"
            )));
        }

        let code = line[..3]
            .parse::<u16>()
            .map_err(|e| ClientError::ParseError(format!("Invalid status code: {e}")))?;

        let is_last = match bytes.get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(other) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(*other)
                )));
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Parses a complete reply from the front of `buffer`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, otherwise the reply
    /// and the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns an error if a line is malformed, not UTF-8, or if the lines
    /// of a multi-line reply disagree on the status code.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut lines = Vec::new();
        let mut first_code = None;

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = Self::parse_line(std::str::from_utf8(raw)?)?;

            match first_code {
                None => first_code = Some(line.code),
                Some(code) if code != line.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
            }

            lines.push(line.message);

            if line.is_last {
                return Ok(Some((Self::new(line.code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line() {
        let line = Response::parse_line("220 mail.example.com ESMTP").unwrap();
        assert_eq!(line.code, 220);
        assert!(line.is_last);
        assert_eq!(line.message, "mail.example.com ESMTP");
    }

    #[test]
    fn parses_bare_code() {
        let line = Response::parse_line("250").unwrap();
        assert_eq!(line.code, 250);
        assert!(line.is_last);
        assert!(line.message.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Response::parse_line("hello").is_err());
        assert!(Response::parse_line("25").is_err());
        assert!(Response::parse_line("250?what").is_err());
        assert!(Response::parse_line("ñ50 nope").is_err());
    }

    #[test]
    fn parses_multi_line_reply() {
        let data = b"250-mail.example.com\r\n250-AUTH PLAIN LOGIN\r\n250 HELP\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(
            response.lines,
            vec!["mail.example.com", "AUTH PLAIN LOGIN", "HELP"]
        );
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn leaves_following_reply_in_buffer() {
        let data = b"250 OK\r\n221 Bye\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(consumed, 8);
    }

    #[test]
    fn waits_for_more_data() {
        assert!(
            Response::parse_response(b"250-mail.example.com\r\n250-SIZE")
                .unwrap()
                .is_none()
        );
        assert!(Response::parse_response(b"").unwrap().is_none());
    }

    #[test]
    fn rejects_mismatched_codes() {
        assert!(Response::parse_response(b"250-first\r\n251 second\r\n").is_err());
    }

    #[test]
    fn into_result_classifies_codes() {
        assert!(Response::new(250, vec![]).into_result().is_ok());
        assert!(Response::new(354, vec![]).into_result().is_ok());

        match Response::new(451, vec!["try later".into()]).into_result() {
            Err(ClientError::SmtpError { code, message }) => {
                assert_eq!(code, 451);
                assert_eq!(message, "try later");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            Response::new(699, vec![]).into_result(),
            Err(ClientError::UnexpectedResponse { code: 699, .. })
        ));
    }
}
