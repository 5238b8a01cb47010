//! The message handed to the client and its DATA rendering.

use core::fmt::Write;

use crate::error::DeliveryFailure;

/// One message for one recipient.
///
/// Addresses are used verbatim in the envelope and headers; their syntax is
/// the caller's responsibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub from: String,
    /// Display name for the `From:` header. The sender address is used when
    /// absent or blank.
    pub from_name: Option<String>,
    /// Send the body as `text/html` instead of `text/plain`.
    pub is_html: bool,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn html(mut self, is_html: bool) -> Self {
        self.is_html = is_html;
        self
    }

    /// Checks that both envelope addresses are present, and that nothing
    /// written into a command or header line contains a line break.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryFailure::InvalidMessage`] naming the offending field.
    pub fn validate(&self) -> Result<(), DeliveryFailure> {
        if self.to.trim().is_empty() {
            return Err(DeliveryFailure::InvalidMessage(
                "recipient address is empty",
            ));
        }
        if self.from.trim().is_empty() {
            return Err(DeliveryFailure::InvalidMessage("sender address is empty"));
        }

        let single_line = [
            (self.to.as_str(), "recipient address contains a line break"),
            (self.from.as_str(), "sender address contains a line break"),
            (self.subject.as_str(), "subject contains a line break"),
            (
                self.from_name.as_deref().unwrap_or_default(),
                "sender name contains a line break",
            ),
        ];
        if let Some((_, reason)) = single_line
            .into_iter()
            .find(|(value, _)| value.contains(['\r', '\n']))
        {
            return Err(DeliveryFailure::InvalidMessage(reason));
        }

        Ok(())
    }

    fn display_name(&self) -> &str {
        self.from_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.from)
    }

    const fn content_type(&self) -> &'static str {
        if self.is_html {
            "text/html"
        } else {
            "text/plain"
        }
    }

    /// Renders the headers, body and end-of-data marker sent after `354`.
    ///
    /// Body lines are re-terminated with CRLF and lines starting with `.` are
    /// dot-stuffed (RFC 5321 section 4.5.2).
    #[must_use]
    pub fn render(&self) -> String {
        let mut data = String::with_capacity(self.body.len() + 256);

        // Writing to a String cannot fail.
        let _ = write!(
            data,
            "From: {} <{}>\r\nTo: {}\r\nSubject: {}\r\nContent-Type: {}; charset=UTF-8\r\n\r\n",
            self.display_name(),
            self.from,
            self.to,
            self.subject,
            self.content_type(),
        );

        let body = self.body.strip_suffix('\n').unwrap_or(&self.body);
        let body = body.strip_suffix('\r').unwrap_or(body);
        if !body.is_empty() {
            for line in body.split('\n') {
                let line = line.strip_suffix('\r').unwrap_or(line);
                if line.starts_with('.') {
                    data.push('.');
                }
                data.push_str(line);
                data.push_str("\r\n");
            }
        }

        data.push_str(".\r\n");
        data
    }
}
