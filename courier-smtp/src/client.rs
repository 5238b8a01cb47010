//! The caller-facing client and the task that performs one transmission.

use core::fmt::{self, Display, Formatter};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use courier_common::{incoming, internal, outgoing, tracing};
use parking_lot::RwLock;
use tokio::{
    runtime::Handle,
    sync::mpsc,
    time::{Instant, timeout_at},
};

use crate::{
    command::Command,
    config::ServerConfig,
    connection::{Connection, Connector, TokioConnector},
    error::{ClientError, DeliveryFailure, SendError},
    message::OutboundMessage,
    response::{ReplyBuffer, Response},
    state::{Session, Transition, TransmissionState},
};

/// Size of each read from the connection.
const READ_CHUNK_SIZE: usize = 8192;

/// The single result of one `send_email` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion(Result<(), DeliveryFailure>);

impl Completion {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.0.is_ok()
    }

    /// The human readable outcome.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    #[must_use]
    pub fn failure(&self) -> Option<&DeliveryFailure> {
        self.0.as_ref().err()
    }

    /// # Errors
    ///
    /// Returns the failure reason if the message was not delivered.
    pub fn into_result(self) -> Result<(), DeliveryFailure> {
        self.0
    }
}

impl From<Result<(), DeliveryFailure>> for Completion {
    fn from(outcome: Result<(), DeliveryFailure>) -> Self {
        Self(outcome)
    }
}

impl Display for Completion {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Ok(()) => fmt.write_str("Email sent successfully"),
            Err(failure) => Display::fmt(failure, fmt),
        }
    }
}

/// Receives one [`Completion`] per accepted `send_email` call.
pub type Completions = mpsc::UnboundedReceiver<Completion>;

/// A single-flight SMTP submission client.
///
/// Each accepted [`send_email`](Self::send_email) runs as its own tokio task
/// and ends with exactly one [`Completion`] on the channel returned by
/// [`new`](Self::new).
///
/// Transmissions run on the runtime the client was created in, so
/// `send_email` may be called from any thread afterwards.
pub struct SmtpClient {
    config: RwLock<ServerConfig>,
    connector: Arc<dyn Connector>,
    runtime: Handle,
    in_flight: Arc<AtomicBool>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl SmtpClient {
    /// Creates a client using the tokio/rustls transport.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime. Use
    /// [`with_handle`](Self::with_handle) from other threads.
    #[must_use]
    pub fn new(config: ServerConfig) -> (Self, Completions) {
        Self::with_connector(config, TokioConnector)
    }

    /// Creates a client over a custom transport.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[must_use]
    pub fn with_connector(config: ServerConfig, connector: impl Connector) -> (Self, Completions) {
        Self::with_handle(config, connector, Handle::current())
    }

    /// Creates a client whose transmissions are spawned on `runtime`.
    #[must_use]
    pub fn with_handle(
        config: ServerConfig,
        connector: impl Connector,
        runtime: Handle,
    ) -> (Self, Completions) {
        let (completions, receiver) = mpsc::unbounded_channel();

        (
            Self {
                config: RwLock::new(config),
                connector: Arc::new(connector),
                runtime,
                in_flight: Arc::new(AtomicBool::new(false)),
                completions,
            },
            receiver,
        )
    }

    /// Replaces the stored configuration. A transmission already in flight
    /// keeps the configuration it started with.
    pub fn configure(&self, config: ServerConfig) {
        internal!(level = DEBUG, "Configured for {}", config.address());
        *self.config.write() = config;
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> ServerConfig {
        self.config.read().clone()
    }

    /// Whether a transmission is in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Starts delivering `message`.
    ///
    /// Configuration problems and invalid messages are reported through the
    /// completion channel without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Busy`] when a transmission is already in flight.
    /// No completion is reported for a rejected call.
    pub fn send_email(&self, message: OutboundMessage) -> Result<(), SendError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SendError::Busy);
        }

        let reporter = Reporter {
            in_flight: Arc::clone(&self.in_flight),
            completions: self.completions.clone(),
            finished: false,
        };

        let config = self.config();
        if !config.is_configured() {
            reporter.finish(Err(DeliveryFailure::NotConfigured));
            return Ok(());
        }
        if let Err(failure) = message.validate() {
            reporter.finish(Err(failure));
            return Ok(());
        }

        let connector = Arc::clone(&self.connector);
        self.runtime.spawn(async move {
            let outcome = transmit(connector.as_ref(), &config, &message).await;
            reporter.finish(outcome);
        });

        Ok(())
    }
}

/// Delivers the one completion for a transmission and frees the client.
struct Reporter {
    in_flight: Arc<AtomicBool>,
    completions: mpsc::UnboundedSender<Completion>,
    finished: bool,
}

impl Reporter {
    fn finish(mut self, outcome: Result<(), DeliveryFailure>) {
        self.finished = true;
        // Cleared first so the receiver of the completion can send again
        self.in_flight.store(false, Ordering::Release);

        match &outcome {
            Ok(()) => tracing::info!("Email sent successfully"),
            Err(failure) => tracing::warn!(%failure, "Email was not sent"),
        }

        if self.completions.send(Completion(outcome)).is_err() {
            internal!(level = DEBUG, "Completion receiver dropped, outcome discarded");
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if !self.finished {
            self.in_flight.store(false, Ordering::Release);
        }
    }
}

/// Runs one transmission under the watchdog.
///
/// Dropping the exchange on expiry drops the connection, so nothing more is
/// written after a timeout.
#[tracing::instrument(level = "info", skip_all, fields(server = %config.address(), recipient = %message.to))]
async fn transmit(
    connector: &dyn Connector,
    config: &ServerConfig,
    message: &OutboundMessage,
) -> Result<(), DeliveryFailure> {
    // Bounded by `ServerConfig::watchdog`, so this cannot overflow
    let deadline = Instant::now() + config.watchdog();

    let exchange = async {
        let connection = connector.connect(config).await?;
        let mut transmission = Transmission::new(connection, Session::new(config, message));
        transmission.deliver().await?;
        Ok::<_, DeliveryFailure>(transmission)
    };

    match timeout_at(deadline, exchange).await {
        Ok(Ok(transmission)) => {
            transmission.quit(deadline).await;
            Ok(())
        }
        Ok(Err(failure)) => Err(failure),
        Err(_) => Err(DeliveryFailure::Timeout),
    }
}

/// The connection, reply buffer and protocol state of one transmission.
struct Transmission<'a> {
    connection: Option<Box<dyn Connection>>,
    replies: ReplyBuffer,
    read_buf: Vec<u8>,
    state: TransmissionState,
    session: Session<'a>,
}

impl<'a> Transmission<'a> {
    fn new(connection: Box<dyn Connection>, session: Session<'a>) -> Self {
        Self {
            connection: Some(connection),
            replies: ReplyBuffer::new(),
            read_buf: vec![0u8; READ_CHUNK_SIZE],
            state: TransmissionState::connected(),
            session,
        }
    }

    /// Drives the handshake until the server accepts the message.
    async fn deliver(&mut self) -> Result<(), DeliveryFailure> {
        loop {
            let reply = self.read_reply().await?;
            incoming!("{}", reply.raw());

            match self.state.advance(&reply, &self.session) {
                Transition::Send { next, command } => {
                    self.write(&command).await?;
                    self.state = next;
                }
                Transition::Upgrade { next, command } => {
                    self.upgrade().await?;
                    self.write(&command).await?;
                    self.state = next;
                }
                Transition::Accepted | Transition::Closed => return Ok(()),
                Transition::Failed(failure) => {
                    internal!(
                        level = DEBUG,
                        "Aborting in {:?} on reply {}",
                        self.state,
                        reply.code
                    );
                    return Err(failure);
                }
            }
        }
    }

    /// Sends QUIT after acceptance and closes. Nothing here changes the
    /// outcome.
    async fn quit(mut self, deadline: Instant) {
        self.state = TransmissionState::AwaitingQuitAck;

        let farewell = async {
            self.write(&Command::Quit).await?;
            self.read_reply().await
        };

        match timeout_at(deadline, farewell).await {
            Ok(Ok(reply)) => {
                incoming!("{}", reply.raw());
                debug_assert_eq!(
                    self.state.advance(&reply, &self.session),
                    Transition::Closed
                );
            }
            Ok(Err(err)) => tracing::warn!("QUIT failed after successful delivery: {err}"),
            Err(_) => tracing::warn!("QUIT timed out after successful delivery"),
        }

        if let Some(connection) = self.connection.as_mut() {
            connection.close().await;
        }
    }

    async fn read_reply(&mut self) -> Result<Response, ClientError> {
        loop {
            if let Some(reply) = self.replies.next_reply()? {
                return Ok(reply);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.read_buf).await?;
            self.replies.extend(&self.read_buf[..n]);
        }
    }

    async fn write(&mut self, command: &Command) -> Result<(), ClientError> {
        outgoing!("{}", command.redacted());

        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(&command.to_wire())
            .await
    }

    /// Swaps the connection for its TLS upgrade. Anything the server sent
    /// after its STARTTLS reply arrived in plaintext and is refused.
    async fn upgrade(&mut self) -> Result<(), DeliveryFailure> {
        if self.replies.has_pending() {
            return Err(DeliveryFailure::Refused(
                "Unexpected data received before TLS negotiation".to_string(),
            ));
        }

        let connection = self
            .connection
            .take()
            .ok_or(ClientError::ConnectionClosed)?;
        let connection = connection.upgrade(&self.session.config.host).await?;

        if !connection.is_encrypted() {
            return Err(ClientError::TlsError(
                "Transport did not report an encrypted connection".to_string(),
            )
            .into());
        }

        internal!(level = DEBUG, "STARTTLS negotiated");
        self.connection = Some(connection);
        Ok(())
    }
}
