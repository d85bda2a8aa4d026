//! Shoptalk Client Library
//!
//! Client side of the chat subsystem, shared by the customer widget and the
//! operator console: identity resolution with fail-closed semantics, the
//! session/connection state machine with bounded reconnect, the conversation
//! timeline with optimistic pending messages, and the operator directory
//! reducer.
//!
//! Nothing here renders UI; consumers observe session state and server
//! events and feed user intents back in.

pub mod error;
pub mod identity;
pub mod multiplexer;
pub mod session;
pub mod timeline;
pub mod transport;
pub mod typing;

pub use error::{ChatClientError, ChatClientResult};
pub use identity::{IdentityResolver, ResolvedIdentity};
pub use multiplexer::{ConversationSummary, OperatorDirectory};
pub use session::{SessionConfig, SessionHandle, SessionState};
pub use timeline::ConversationTimeline;
pub use transport::{ChannelTransport, Connector, Transport, WsConnector};
pub use typing::TypingDebouncer;
