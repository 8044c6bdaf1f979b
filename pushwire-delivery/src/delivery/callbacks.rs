use std::fmt;

use pushwire_proto::{Message, Status};

use super::DeliveryState;
use crate::error::{ConnectionError, DeliveryError};

type MessageHook = Box<dyn FnMut(&DeliveryState, &Message) + Send>;
type ExceptionHook = Box<dyn FnMut(&DeliveryState, &DeliveryError) + Send>;
type ReadExceptionHook = Box<dyn FnMut(&DeliveryState, &ConnectionError) + Send>;
type NilSelectHook = Box<dyn FnMut(&DeliveryState) + Send>;
type ErrorHook = Box<dyn FnMut(&DeliveryState, u32, Status) + Send>;

/// Observers for the events of a delivery run.
///
/// Every hook is optional and is invoked synchronously from the delivery loop
/// with the run's current [`DeliveryState`]. Hooks observe the run; they
/// cannot steer it.
///
/// ```
/// # use pushwire_delivery::Callbacks;
/// let callbacks = Callbacks::new()
///     .on_write(|state, message| println!("{} sent ({})", message.message_id(), state.success_count()))
///     .on_error(|_, message_id, status| eprintln!("{message_id} rejected: {status}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    write: Option<MessageHook>,
    exception: Option<ExceptionHook>,
    read_exception: Option<ReadExceptionHook>,
    nil_select: Option<NilSelectHook>,
    error: Option<ErrorHook>,
    failure: Option<MessageHook>,
}

impl Callbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A message was written to the gateway.
    #[must_use]
    pub fn on_write(mut self, hook: impl FnMut(&DeliveryState, &Message) + Send + 'static) -> Self {
        self.write = Some(Box::new(hook));
        self
    }

    /// Writing the current message failed.
    #[must_use]
    pub fn on_exception(
        mut self,
        hook: impl FnMut(&DeliveryState, &DeliveryError) + Send + 'static,
    ) -> Self {
        self.exception = Some(Box::new(hook));
        self
    }

    /// Polling or reading for an error response failed.
    #[must_use]
    pub fn on_read_exception(
        mut self,
        hook: impl FnMut(&DeliveryState, &ConnectionError) + Send + 'static,
    ) -> Self {
        self.read_exception = Some(Box::new(hook));
        self
    }

    /// The gateway had nothing to say within the poll window.
    #[must_use]
    pub fn on_nil_select(mut self, hook: impl FnMut(&DeliveryState) + Send + 'static) -> Self {
        self.nil_select = Some(Box::new(hook));
        self
    }

    /// The gateway rejected the message with the given id.
    #[must_use]
    pub fn on_error(mut self, hook: impl FnMut(&DeliveryState, u32, Status) + Send + 'static) -> Self {
        self.error = Some(Box::new(hook));
        self
    }

    /// The current message was given up on.
    #[must_use]
    pub fn on_failure(mut self, hook: impl FnMut(&DeliveryState, &Message) + Send + 'static) -> Self {
        self.failure = Some(Box::new(hook));
        self
    }

    pub(crate) fn wrote(&mut self, state: &DeliveryState, message: &Message) {
        if let Some(hook) = self.write.as_mut() {
            hook(state, message);
        }
    }

    pub(crate) fn exception(&mut self, state: &DeliveryState, error: &DeliveryError) {
        if let Some(hook) = self.exception.as_mut() {
            hook(state, error);
        }
    }

    pub(crate) fn read_exception(&mut self, state: &DeliveryState, error: &ConnectionError) {
        if let Some(hook) = self.read_exception.as_mut() {
            hook(state, error);
        }
    }

    pub(crate) fn nil_select(&mut self, state: &DeliveryState) {
        if let Some(hook) = self.nil_select.as_mut() {
            hook(state);
        }
    }

    pub(crate) fn error(&mut self, state: &DeliveryState, message_id: u32, status: Status) {
        if let Some(hook) = self.error.as_mut() {
            hook(state, message_id, status);
        }
    }

    pub(crate) fn failed(&mut self, state: &DeliveryState, message: &Message) {
        if let Some(hook) = self.failure.as_mut() {
            hook(state, message);
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_write", &self.write.is_some())
            .field("on_exception", &self.exception.is_some())
            .field("on_read_exception", &self.read_exception.is_some())
            .field("on_nil_select", &self.nil_select.is_some())
            .field("on_error", &self.error.is_some())
            .field("on_failure", &self.failure.is_some())
            .finish()
    }
}
