//! MIME message assembly: headers, HTML body and base64 attachments.

use std::{fmt::Write, path::Path};

use base64::{Engine, engine::general_purpose::STANDARD};

use super::error::{ClientError, Result};

/// Line length for base64 bodies (RFC 2045).
const BASE64_LINE_LENGTH: usize = 76;

/// Upper bound for one RFC 2047 encoded-word, delimiters included.
const ENCODED_WORD_LENGTH: usize = 75;

/// `=?utf-8?B?` plus `?=`.
const ENCODED_WORD_OVERHEAD: usize = 12;

/// An email attachment with filename, content type, and data.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name announced in `Content-Disposition`
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    /// Read `path` into an attachment named after the file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error (e.g. `NotFound`) if the file cannot
    /// be read, or `BuilderError` if the path has no usable file name. A name
    /// containing control characters is not usable.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.contains(char::is_control))
            .ok_or_else(|| {
                ClientError::BuilderError(format!(
                    "Invalid attachment file name: {}",
                    path.display().to_string().escape_debug()
                ))
            })?
            .to_string();

        let data = tokio::fs::read(path).await?;

        Ok(Self {
            filename,
            content_type: guess_content_type(path),
            data,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BodyKind {
    #[default]
    Plain,
    Html,
}

impl BodyKind {
    const fn content_type(self) -> &'static str {
        match self {
            Self::Plain => "text/plain; charset=utf-8",
            Self::Html => "text/html; charset=utf-8",
        }
    }
}

/// Builder for constructing email messages with proper MIME formatting.
///
/// ```no_run
/// use herald_smtp::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .html_body("<b>Hi</b>")
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    subject: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<String>,
    body_kind: BodyKind,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the From header. Accepts a bare address or `"Name" <address>`.
    #[must_use]
    pub fn from(mut self, mailbox: impl Into<String>) -> Self {
        self.from = Some(mailbox.into());
        self
    }

    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to.push(email.into());
        self
    }

    /// Sets the Subject header. Non-ASCII subjects are RFC 2047 encoded.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds a custom header, emitted in insertion order.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a `text/plain` body.
    #[must_use]
    pub fn body(mut self, content: impl Into<String>) -> Self {
        self.body = Some(content.into());
        self.body_kind = BodyKind::Plain;
        self
    }

    /// Sets a `text/html` body.
    #[must_use]
    pub fn html_body(mut self, content: impl Into<String>) -> Self {
        self.body = Some(content.into());
        self.body_kind = BodyKind::Html;
        self
    }

    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Builds the final message.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no From or To header, or a header value
    /// or attachment file name contains a line break.
    pub fn build(self) -> Result<String> {
        if self.from.is_none() {
            return Err(ClientError::BuilderError("missing From header".to_string()));
        }
        if self.to.is_empty() {
            return Err(ClientError::BuilderError("missing To header".to_string()));
        }

        let mut message = String::with_capacity(2048);
        self.write_headers(&mut message)?;

        if self.attachments.is_empty() {
            write_line(&mut message, &format!("Content-Type: {}", self.body_kind.content_type()));
            write_line(&mut message, "Content-Transfer-Encoding: base64");
            write_line(&mut message, "");
            message.push_str(&encode_base64(
                self.body.as_deref().unwrap_or_default().as_bytes(),
            ));
        } else {
            let boundary = format!("=_herald_{}", ulid::Ulid::new());
            write_line(
                &mut message,
                &format!("Content-Type: multipart/mixed; boundary=\"{boundary}\""),
            );
            write_line(&mut message, "");

            write_line(&mut message, &format!("--{boundary}"));
            write_line(&mut message, &format!("Content-Type: {}", self.body_kind.content_type()));
            write_line(&mut message, "Content-Transfer-Encoding: base64");
            write_line(&mut message, "");
            message.push_str(&encode_base64(
                self.body.as_deref().unwrap_or_default().as_bytes(),
            ));

            for attachment in &self.attachments {
                if attachment.filename.contains(char::is_control) {
                    return Err(ClientError::BuilderError(format!(
                        "attachment file name {:?} contains a control character",
                        attachment.filename
                    )));
                }

                write_line(&mut message, &format!("--{boundary}"));
                write_line(
                    &mut message,
                    &format!(
                        "Content-Type: {}; {}",
                        attachment.content_type,
                        header_parameter("name", &attachment.filename)
                    ),
                );
                write_line(&mut message, "Content-Transfer-Encoding: base64");
                write_line(
                    &mut message,
                    &format!(
                        "Content-Disposition: attachment; {}",
                        header_parameter("filename", &attachment.filename)
                    ),
                );
                write_line(&mut message, "");
                message.push_str(&encode_base64(&attachment.data));
            }

            write_line(&mut message, &format!("--{boundary}--"));
        }

        Ok(message)
    }

    fn write_headers(&self, message: &mut String) -> Result<()> {
        fn single_line(name: &str, value: &str) -> Result<()> {
            if value.contains(['\r', '\n']) {
                return Err(ClientError::BuilderError(format!(
                    "header {name} contains a line break"
                )));
            }
            Ok(())
        }

        let mut header = |name: &str, value: &str| -> Result<()> {
            single_line(name, value)?;
            write_line(message, &format!("{name}: {value}"));
            Ok(())
        };

        if let Some(from) = &self.from {
            header("From", from)?;
        }
        header("To", &self.to.join(", "))?;
        if !self.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("Date")) {
            header("Date", &chrono::Utc::now().to_rfc2822())?;
        }
        for (name, value) in &self.headers {
            header(name, value)?;
        }
        header("MIME-Version", "1.0")?;

        // Encoded subjects may be folded across lines
        if let Some(subject) = &self.subject {
            single_line("Subject", subject)?;
            write_line(message, &format!("Subject: {}", encode_header_value(subject)));
        }

        Ok(())
    }
}

fn write_line(message: &mut String, line: &str) {
    // Writing to a String cannot fail
    let _ = write!(message, "{line}\r\n");
}

/// Base64 with CRLF line breaks every 76 characters.
fn encode_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2 + 2);

    for chunk in encoded.as_bytes().chunks(BASE64_LINE_LENGTH) {
        // base64 output is ASCII
        wrapped.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        wrapped.push_str("\r\n");
    }

    wrapped
}

/// RFC 2047 `B` encoding for header values that are not plain ASCII.
///
/// Long values become several encoded-words separated by folding white
/// space. Words are split on character boundaries.
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }

    // 3 input bytes per 4 base64 characters
    let max_bytes = (ENCODED_WORD_LENGTH - ENCODED_WORD_OVERHEAD) / 4 * 3;
    let mut words = Vec::new();
    let mut start = 0;

    for (index, ch) in value.char_indices() {
        if index + ch.len_utf8() - start > max_bytes {
            words.push(&value[start..index]);
            start = index;
        }
    }
    words.push(&value[start..]);

    words
        .into_iter()
        .map(|word| format!("=?utf-8?B?{}?=", STANDARD.encode(word)))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// A MIME parameter such as `filename="..."`. ASCII values are quoted with
/// `"` and `\` escaped; anything else uses the RFC 2231 extended form.
fn header_parameter(name: &str, value: &str) -> String {
    if value.is_ascii() {
        let quoted = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{name}=\"{quoted}\"")
    } else {
        format!("{name}*=utf-8''{}", percent_encode(value))
    }
}

/// RFC 2231 `attr-char` percent encoding.
fn percent_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len() * 3);

    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }

    encoded
}

/// Guesses the MIME content type based on file extension.
#[must_use]
pub fn guess_content_type(path: &Path) -> String {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "json" => "application/json",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
    .to_string()
}
