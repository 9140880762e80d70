pub mod config;
pub mod convert;
pub mod error;
pub mod models;
pub mod remote;
pub mod session;

pub use crate::config::SessionLinkConfig;
pub use convert::{event_to_wire, session_to_wire, wire_to_event, wire_to_session, SessionView};
pub use error::{ConfigError, SessionLinkError, StoreError};
pub use models::{Content, Event, EventActions, Part, Session};
pub use remote::RemoteSessionClient;
pub use session::{BackendKind, InMemorySessionService, SessionBackend, SessionService};
