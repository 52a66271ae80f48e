//! Peer session engine for SendOver.
//!
//! A [`Session`] owns one ephemeral identity, at most one peer connection
//! and at most one file transfer. It is driven by a single task and
//! controlled through a cloneable [`SessionHandle`]; state is observed as
//! [`SessionSnapshot`]s.
//!
//! The signaling/data-channel stack is abstracted behind [`Transport`].
//! [`MemoryNetwork`] provides an in-process implementation.

mod dispatch;
pub mod error;
pub mod identity;
mod latency;
mod lifecycle;
pub mod memory;
pub mod notify;
mod receiver;
mod sender;
pub mod session;
pub mod transport;
pub mod types;

pub use error::{SessionError, TransportError};
pub use identity::{PeerIdentity, expand_target, generate_code};
pub use memory::{MemoryNetwork, MemoryTransport, WireRecord};
pub use notify::{Notice, NoticeKind};
pub use session::{Session, SessionHandle};
pub use transport::{ErrorClass, Transport, TransportErrorKind, TransportEvent};
pub use types::{SessionConfig, SessionSnapshot};
