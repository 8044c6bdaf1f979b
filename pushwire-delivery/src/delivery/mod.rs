//! The delivery loop.
//!
//! A [`Delivery`] pulls messages one at a time, writes each to a lazily opened
//! gateway connection and then briefly polls for an error response. Failed
//! writes are retried on a fresh connection up to the policy's exception
//! limit; a run of messages that all had to be given up on stops the loop.

mod callbacks;
mod state;

use std::time::Duration;

use pushwire_common::{
    incoming, outgoing,
    tracing::{debug, info},
};
use pushwire_proto::{ErrorResponse, Message};

pub use callbacks::Callbacks;
pub use state::DeliveryState;

use crate::{
    config::{DeliveryConfig, FailurePolicy},
    connection::{Connector, GatewayConnector, Transport},
    error::{ConnectionError, ConnectionResult, DeliveryError},
};

/// What the gateway had to say after a write.
enum Reply {
    /// Nothing arrived within the poll window.
    Silent,
    /// The gateway rejected a message.
    Rejected(ErrorResponse),
    /// The stream became readable but did not carry a complete error frame.
    HungUp,
}

/// One delivery run over a lazy, finite sequence of messages.
///
/// ```no_run
/// # use pushwire_delivery::{Callbacks, Delivery, DeliveryConfig};
/// # async fn run(config: DeliveryConfig, messages: Vec<pushwire_delivery::Message>) -> Result<(), pushwire_delivery::DeliveryError> {
/// let mut delivery = Delivery::new(messages, config)?
///     .with_callbacks(Callbacks::new().on_failure(|_, message| {
///         eprintln!("gave up on {}", message.message_id());
///     }));
///
/// delivery.process().await;
/// println!("{} delivered", delivery.state().success_count());
/// # Ok(())
/// # }
/// ```
pub struct Delivery<I, C = GatewayConnector>
where
    I: Iterator<Item = Message>,
    C: Connector,
{
    messages: I,
    current: Option<Message>,
    connector: C,
    connection: Option<C::Transport>,
    policy: FailurePolicy,
    callbacks: Callbacks,
    state: DeliveryState,
}

impl<I> Delivery<I, GatewayConnector>
where
    I: Iterator<Item = Message>,
{
    /// Builds a delivery over TLS to the configured gateway.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidConfig`] if the configuration is
    /// invalid or the client certificate cannot be loaded. No connection is
    /// opened.
    pub fn new<M>(messages: M, config: DeliveryConfig) -> Result<Self, DeliveryError>
    where
        M: IntoIterator<IntoIter = I>,
    {
        config.validate()?;
        let connector = GatewayConnector::new(&config.connection)
            .map_err(|e| DeliveryError::InvalidConfig(e.to_string()))?;

        Self::with_connector(messages, connector, config.policy)
    }
}

impl<I, C> Delivery<I, C>
where
    I: Iterator<Item = Message>,
    C: Connector,
{
    /// Builds a delivery over any [`Connector`].
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidConfig`] if the policy is invalid.
    pub fn with_connector<M>(
        messages: M,
        connector: C,
        policy: FailurePolicy,
    ) -> Result<Self, DeliveryError>
    where
        M: IntoIterator<IntoIter = I>,
    {
        policy.validate()?;

        Ok(Self {
            messages: messages.into_iter(),
            current: None,
            connector,
            connection: None,
            policy,
            callbacks: Callbacks::default(),
            state: DeliveryState::default(),
        })
    }

    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub const fn state(&self) -> &DeliveryState {
        &self.state
    }

    pub const fn policy(&self) -> &FailurePolicy {
        &self.policy
    }

    pub fn elapsed(&self) -> Duration {
        self.state.elapsed()
    }

    /// Runs until the messages are exhausted or too many messages in a row
    /// have been given up on. Transport errors never escape; they are
    /// reported through the callbacks and the counters.
    pub async fn process(&mut self) {
        self.state.start();
        debug!("Delivery started");

        while self
            .policy
            .should_continue(self.state.consecutive_failure_count())
            && self.has_current()
        {
            self.process_one().await;
        }

        if !self
            .policy
            .should_continue(self.state.consecutive_failure_count())
        {
            info!(
                consecutive_failures = self.state.consecutive_failure_count(),
                "Stopping delivery after too many consecutive failures"
            );
        }

        self.close_connection().await;
        self.state.finish();

        info!(
            success = self.state.success_count(),
            failure = self.state.failure_count(),
            elapsed_ms = self.state.elapsed().as_millis(),
            "Delivery finished"
        );
    }

    /// Pulls the next message if none is pending.
    fn has_current(&mut self) -> bool {
        if self.current.is_none() {
            self.current = self.messages.next();
        }
        self.current.is_some()
    }

    async fn process_one(&mut self) {
        match self.write_current().await {
            Ok(()) => self.check_for_error().await,
            Err(error) => self.handle_exception(error).await,
        }
    }

    async fn write_current(&mut self) -> Result<(), DeliveryError> {
        let Some(message) = self.current.as_ref() else {
            return Ok(());
        };
        let message_id = message.message_id();
        let bytes = message.to_wire_bytes()?;

        self.connection().await?.write(&bytes).await?;
        outgoing!(message_id, bytes = bytes.len(), "Wrote message");

        self.state.record_write();
        if let Some(message) = self.current.take() {
            self.callbacks.wrote(&self.state, &message);
        }
        self.state.advance();

        Ok(())
    }

    async fn handle_exception(&mut self, error: DeliveryError) {
        debug!(error = %error, "Failed to write message");
        self.callbacks.exception(&self.state, &error);

        let exception_count = self.state.record_exception();
        if self.policy.exception_limit_reached(exception_count) {
            self.give_up();
        }

        self.check_for_error().await;

        let pause = self.policy.sleep_on_exception();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        self.close_connection().await;
    }

    fn give_up(&mut self) {
        self.state.record_give_up();
        if let Some(message) = self.current.take() {
            debug!(
                message_id = message.message_id(),
                attempts = self.policy.exception_limit,
                "Giving up on message"
            );
            self.callbacks.failed(&self.state, &message);
        }
        self.state.advance();
    }

    /// Polls for an error response.
    ///
    /// A reported rejection is charged to the run's counters; the reported id
    /// is passed to `on_error` as-is and not matched against earlier messages.
    async fn check_for_error(&mut self) {
        let timeout = self.connector.poll_timeout();
        let Some(connection) = self.connection.as_mut() else {
            self.callbacks.nil_select(&self.state);
            return;
        };

        match read_reply(connection, timeout).await {
            Ok(Reply::Silent) => self.callbacks.nil_select(&self.state),
            Ok(Reply::Rejected(response)) => {
                incoming!(
                    level = DEBUG,
                    response.message_id,
                    status = %response.status,
                    "Gateway rejected message"
                );
                self.callbacks
                    .error(&self.state, response.message_id, response.status);
                self.state.record_rejection();
                self.close_connection().await;
            }
            Ok(Reply::HungUp) => {
                debug!("Gateway closed the connection without an error response");
                self.close_connection().await;
            }
            Err(error) => {
                debug!(error = %error, "Failed to read from gateway");
                self.callbacks.read_exception(&self.state, &error);
            }
        }
    }

    async fn connection(&mut self) -> ConnectionResult<&mut C::Transport> {
        if self.connection.is_none() {
            self.connection = Some(self.connector.connect().await?);
        }
        self.connection.as_mut().ok_or(ConnectionError::Closed)
    }

    async fn close_connection(&mut self) {
        if let Some(mut connection) = self.connection.take()
            && let Err(error) = connection.close().await
        {
            debug!(error = %error, "Failed to close gateway connection");
        }
    }
}

async fn read_reply<T: Transport>(connection: &mut T, timeout: Duration) -> ConnectionResult<Reply> {
    if !connection.poll_readable(timeout).await? {
        return Ok(Reply::Silent);
    }

    let reply = connection
        .read(ErrorResponse::LENGTH)
        .await?
        .as_deref()
        .and_then(ErrorResponse::decode)
        .map_or(Reply::HungUp, Reply::Rejected);

    Ok(reply)
}

impl<I, C> std::fmt::Debug for Delivery<I, C>
where
    I: Iterator<Item = Message>,
    C: Connector + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("connector", &self.connector)
            .field("connected", &self.connection.is_some())
            .field("policy", &self.policy)
            .field("callbacks", &self.callbacks)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
