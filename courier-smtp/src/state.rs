//! The client side of the SMTP submission handshake.
//!
//! [`TransmissionState::advance`] is a pure function: it looks at one complete
//! server reply and decides what to write next. All I/O lives in the
//! transmission task in `client.rs`.

use crate::{
    command::Command, config::ServerConfig, error::DeliveryFailure, message::OutboundMessage,
    response::Response,
};

/// What the transition logic may read while deciding the next step.
#[derive(Debug, Clone, Copy)]
pub struct Session<'a> {
    pub config: &'a ServerConfig,
    pub message: &'a OutboundMessage,
}

impl<'a> Session<'a> {
    #[must_use]
    pub const fn new(config: &'a ServerConfig, message: &'a OutboundMessage) -> Self {
        Self { config, message }
    }

    fn ehlo(&self) -> Command {
        Command::Ehlo(self.config.helo_name.clone())
    }

    fn mail_from(&self) -> Command {
        Command::MailFrom(self.message.from.clone())
    }
}

/// Which reply the client is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionState {
    /// Connected, waiting for the `220` greeting.
    #[default]
    AwaitingGreeting,
    /// EHLO sent. `encrypted` records whether the session is already under TLS,
    /// either implicitly or after STARTTLS.
    AwaitingEhlo { encrypted: bool },
    AwaitingStartTls,
    /// AUTH LOGIN sent, waiting for the username prompt.
    AwaitingUsernamePrompt,
    AwaitingPasswordPrompt,
    AwaitingAuthResult,
    AwaitingMailFrom,
    AwaitingRcpt,
    AwaitingData,
    /// Message written, waiting for the server to accept it.
    AwaitingDataEnd,
    AwaitingQuitAck,
}

/// The outcome of feeding one reply to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Write `command` and wait in `next`.
    Send {
        next: TransmissionState,
        command: Command,
    },
    /// STARTTLS was accepted. Upgrade the transport, and only once that
    /// completes write `command` and wait in `next`.
    Upgrade {
        next: TransmissionState,
        command: Command,
    },
    /// The server took the message. QUIT follows.
    Accepted,
    /// QUIT acknowledged (or not); close the connection.
    Closed,
    /// Out of sequence. Abort without QUIT.
    Failed(DeliveryFailure),
}

impl TransmissionState {
    /// The state right after the transport connects.
    #[must_use]
    pub const fn connected() -> Self {
        Self::AwaitingGreeting
    }

    /// Decides the next step from one complete reply.
    #[must_use]
    pub fn advance(self, reply: &Response, session: &Session<'_>) -> Transition {
        match (self, reply.code) {
            (Self::AwaitingGreeting, 220) => Transition::Send {
                next: Self::AwaitingEhlo {
                    encrypted: session.config.use_ssl,
                },
                command: session.ehlo(),
            },
            (Self::AwaitingGreeting, _) => Transition::Failed(DeliveryFailure::Rejected {
                reply: reply.raw().to_string(),
            }),

            (Self::AwaitingEhlo { encrypted }, 250) => {
                if session.config.wants_starttls() && !encrypted {
                    Transition::Send {
                        next: Self::AwaitingStartTls,
                        command: Command::StartTls,
                    }
                } else if session.config.wants_auth() {
                    Transition::Send {
                        next: Self::AwaitingUsernamePrompt,
                        command: Command::AuthLogin,
                    }
                } else {
                    Transition::Send {
                        next: Self::AwaitingMailFrom,
                        command: session.mail_from(),
                    }
                }
            }

            (Self::AwaitingStartTls, 220) => Transition::Upgrade {
                next: Self::AwaitingEhlo { encrypted: true },
                command: session.ehlo(),
            },

            (Self::AwaitingUsernamePrompt, 334) => Transition::Send {
                next: Self::AwaitingPasswordPrompt,
                command: Command::credential(&session.config.username),
            },

            (Self::AwaitingPasswordPrompt, 334) => Transition::Send {
                next: Self::AwaitingAuthResult,
                command: Command::credential(&session.config.password),
            },
            (Self::AwaitingPasswordPrompt | Self::AwaitingAuthResult, 235) => Transition::Send {
                next: Self::AwaitingMailFrom,
                command: session.mail_from(),
            },

            (Self::AwaitingMailFrom, 250) => Transition::Send {
                next: Self::AwaitingRcpt,
                command: Command::RcptTo(session.message.to.clone()),
            },

            (Self::AwaitingRcpt, 250) => Transition::Send {
                next: Self::AwaitingData,
                command: Command::Data,
            },

            (Self::AwaitingData, 354) => Transition::Send {
                next: Self::AwaitingDataEnd,
                command: Command::Message(session.message.render()),
            },

            (Self::AwaitingDataEnd, 250) => Transition::Accepted,

            (Self::AwaitingQuitAck, _) => Transition::Closed,

            _ => Transition::Failed(DeliveryFailure::Refused(reply.raw().to_string())),
        }
    }
}
