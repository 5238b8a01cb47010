//! Command-line front end for [`courier_smtp`].

pub mod cli;
pub mod config;

use courier_common::internal;
use courier_smtp::{Completion, OutboundMessage, SendError, ServerConfig, SmtpClient};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Send(#[from] SendError),

    #[error("SMTP client stopped without reporting a result")]
    NoCompletion,
}

/// Sends `message` with a fresh client and waits for its completion.
///
/// # Errors
///
/// Only if the client refuses the message outright. Delivery failures are
/// reported in the returned [`Completion`].
pub async fn deliver(
    server: ServerConfig,
    message: OutboundMessage,
) -> Result<Completion, RunError> {
    internal!(
        level = DEBUG,
        "Sending to {} via {}",
        message.to,
        server.address()
    );

    let (client, mut completions) = SmtpClient::new(server);
    client.send_email(message)?;

    completions.recv().await.ok_or(RunError::NoCompletion)
}
