// src/event.rs
use tokio::sync::mpsc;

use crate::store::{SessionId, VarHandle};

/// Everything the dispatcher can be woken up by.
///
/// Timer ticks, store notifications and report requests all arrive through
/// one channel and are handled strictly in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The periodic broadcast timer expired.
    TimerExpired,
    /// A variable with on-modify notification was written.
    VariableChanged(VarHandle),
    /// A report was requested from a variable with on-print notification.
    ReportRequested(SessionId),
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Creates the event channel shared by the timer, the store and the dispatcher.
///
/// The channel is unbounded: no event may be dropped, and the dispatcher
/// itself publishes into the store while it is the only consumer.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
