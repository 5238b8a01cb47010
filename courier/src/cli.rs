use std::{fs, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use courier_smtp::OutboundMessage;
use thiserror::Error;

use crate::config::SenderConfig;

/// Send email through an SMTP submission server
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Send email through an SMTP submission server", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message to one recipient
    Send(SendArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SendArgs {
    /// Recipient address
    #[arg(long)]
    pub to: String,

    #[arg(long, short)]
    pub subject: String,

    /// Message body
    #[arg(long, conflicts_with = "body_file", required_unless_present = "body_file")]
    pub body: Option<String>,

    /// Read the message body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Sender address, overriding `[sender] address` from the configuration
    #[arg(long)]
    pub from: Option<String>,

    /// Sender display name, overriding `[sender] name` from the configuration
    #[arg(long)]
    pub from_name: Option<String>,

    /// Send the body as text/html
    #[arg(long)]
    pub html: bool,
}

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error("No sender address: pass --from or set [sender] address in the configuration")]
    NoSender,

    #[error("Failed to read message body from {}: {source}", path.display())]
    BodyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SendArgs {
    /// Builds the message, taking the sender from the configuration where
    /// the command line does not name one.
    ///
    /// # Errors
    ///
    /// If there is no sender address at all, or the body file can't be read.
    pub fn into_message(self, sender: Option<&SenderConfig>) -> Result<OutboundMessage, ArgsError> {
        let from = self
            .from
            .or_else(|| sender.map(|sender| sender.address.clone()))
            .ok_or(ArgsError::NoSender)?;

        let from_name = self
            .from_name
            .or_else(|| sender.and_then(|sender| sender.name.clone()));

        let body = match (self.body, self.body_file) {
            (Some(body), _) => body,
            (None, Some(path)) => {
                fs::read_to_string(&path).map_err(|source| ArgsError::BodyFile { path, source })?
            }
            (None, None) => String::new(),
        };

        let mut message = OutboundMessage::new(from, self.to)
            .subject(self.subject)
            .body(body)
            .html(self.html);
        if let Some(name) = from_name {
            message = message.from_name(name);
        }

        Ok(message)
    }
}
