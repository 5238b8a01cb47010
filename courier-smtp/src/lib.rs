//! Single-message SMTP submission.
//!
//! [`SmtpClient`] delivers one pre-composed message to one recipient per
//! call, over plain TCP, implicit TLS or STARTTLS, optionally authenticating
//! with AUTH LOGIN. Every accepted call ends with exactly one [`Completion`].
//!
//! ```no_run
//! use courier_smtp::{OutboundMessage, ServerConfig, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::new("smtp.example.com", 587)
//!     .with_credentials("orders@example.com", "app-password")
//!     .with_starttls(true);
//! let (client, mut completions) = SmtpClient::new(config);
//!
//! client.send_email(
//!     OutboundMessage::new("orders@example.com", "client@example.org")
//!         .from_name("Acme Orders")
//!         .subject("Your order #1042")
//!         .body("Your order has shipped."),
//! )?;
//!
//! if let Some(completion) = completions.recv().await {
//!     println!("{}", completion.message());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod response;
pub mod state;

pub use client::{Completion, Completions, SmtpClient};
pub use config::ServerConfig;
pub use connection::{Connection, Connector, TokioConnector};
pub use error::{ClientError, DeliveryFailure, SendError};
pub use message::OutboundMessage;
