//! Receiving side of the bus.
//!
//! Listeners are invoked from the poll task. They should hand work off
//! quickly; a slow listener delays the next poll cycle.

use crate::errors::BusError;
use shared_types::Message;

/// Callback registered with [`crate::Bus::receive`].
pub trait MessageListener: Send + Sync {
    /// A complete message arrived for the registered scope and participant.
    fn receive(&self, message: Message);

    /// A poll cycle failed. The bus keeps polling.
    fn receive_error(&self, _error: &BusError) {}
}

impl<F> MessageListener for F
where
    F: Fn(Message) + Send + Sync,
{
    fn receive(&self, message: Message) {
        self(message);
    }
}
