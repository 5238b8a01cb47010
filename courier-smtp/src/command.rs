//! Commands the client writes to the server.

use core::fmt::{self, Display, Formatter};

use base64::{Engine, engine::general_purpose::STANDARD};

/// A single client write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ehlo(String),
    StartTls,
    AuthLogin,
    /// A Base64 encoded AUTH LOGIN answer (username or password).
    Credential(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// The rendered message, already carrying its `.` terminator.
    Message(String),
    Quit,
}

impl Command {
    /// Builds the answer to a `334` prompt.
    #[must_use]
    pub fn credential(secret: &str) -> Self {
        Self::Credential(encode_credential(secret))
    }

    /// The bytes to put on the wire.
    #[must_use]
    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            Self::Message(data) => data.as_bytes().to_vec(),
            _ => format!("{self}\r\n").into_bytes(),
        }
    }

    /// How the command appears in logs. Credentials and message contents are
    /// left out.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Credential(_) => String::from("<credential>"),
            Self::Message(data) => format!("<message, {} bytes>", data.len()),
            _ => self.to_string(),
        }
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ehlo(name) => write!(fmt, "EHLO {name}"),
            Self::StartTls => fmt.write_str("STARTTLS"),
            Self::AuthLogin => fmt.write_str("AUTH LOGIN"),
            Self::Credential(encoded) => fmt.write_str(encoded),
            Self::MailFrom(sender) => write!(fmt, "MAIL FROM:<{sender}>"),
            Self::RcptTo(recipient) => write!(fmt, "RCPT TO:<{recipient}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Message(data) => fmt.write_str(data),
            Self::Quit => fmt.write_str("QUIT"),
        }
    }
}

/// Base64 of the UTF-8 bytes of `secret`, as AUTH LOGIN expects.
#[must_use]
pub fn encode_credential(secret: &str) -> String {
    STANDARD.encode(secret.as_bytes())
}
