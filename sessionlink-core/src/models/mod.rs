pub mod event;
pub mod session;

pub use event::{new_event_id, now_seconds, Content, Event, EventActions, Part, USER_AUTHOR};
pub use session::Session;
