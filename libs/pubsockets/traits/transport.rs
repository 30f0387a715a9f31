use crate::traits::error::Result;
use tokio::sync::mpsc::UnboundedSender;

/// Lifecycle event emitted by a transport
///
/// Exactly one event is emitted per underlying stream event, in the order
/// the stream produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stream is established and frames may be sent
    Opened,
    /// A text frame arrived
    Text(String),
    /// The stream closed
    Closed { code: u16, reason: String, clean: bool },
    /// The stream failed
    Error(String),
}

/// Sink the transport pushes its events into
pub type TransportEventSender = UnboundedSender<TransportEvent>;

/// Trait for the duplex frame transport
///
/// The connection state machine drives this from a single task, so
/// implementations never see concurrent calls. Sending must not wait on
/// the network; queue the frame and return.
pub trait Transport: Send {
    /// Start opening the stream
    ///
    /// Events for this stream, starting with `Opened` or `Error`, must be
    /// delivered through `events`.
    fn open(&mut self, events: TransportEventSender) -> Result<()>;

    /// Queue a text frame for sending
    fn send(&mut self, frame: String) -> Result<()>;

    /// Close the stream
    ///
    /// After this returns, no further events from the closed stream are
    /// expected to matter to the caller.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, events: TransportEventSender) -> Result<()> {
        (**self).open(events)
    }

    fn send(&mut self, frame: String) -> Result<()> {
        (**self).send(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
