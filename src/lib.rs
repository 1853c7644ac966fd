pub use wabot_core::{creds, poll, presence, proto_helpers, reply, request, types, version};

pub mod config;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod media;
pub mod prompt;
pub mod retry;
pub mod session;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod typing;

#[doc(hidden)]
pub mod test_utils;

pub use dispatcher::{BatchReport, EventDispatcher};
pub use session::{Session, SessionFactory};
pub use supervisor::{ConnectionSupervisor, SupervisorState};
