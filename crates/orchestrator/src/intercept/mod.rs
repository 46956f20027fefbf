//! Operation interception: replaying, recording or passing through calls to
//! external collaborators, scoped per workflow instance.

pub mod interceptor;
pub mod key;
pub mod session;
pub mod value;

pub use interceptor::intercept;
pub use key::{generate_key, MockKey};
pub use session::{ExecutionLogEntry, InterceptMode, InterceptSession, SessionManager};
pub use value::{MockKind, MockPayload, MockValue};
