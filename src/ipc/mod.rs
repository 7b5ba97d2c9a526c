//! Relay between UI surfaces and the backend.
//!
//! UI -> backend traffic is either a request (answered with an [`Envelope`]) or
//! a notification (no answer). Backend -> UI traffic is a stream of
//! [`BackendEvent`]s. All of it flows through one [`Dispatcher`] loop; callers
//! hold a [`RelayClient`].

mod channels;
mod dispatcher;
mod envelope;
mod surface;

pub use channels::{BackendEvent, EventSink, IpcNotification, IpcRequest};
pub use dispatcher::{Dispatcher, Inbound, RelayClient, Services};
pub use envelope::Envelope;
pub use surface::{BroadcastSurface, ChannelSurface, UiSurface, forward_event};
