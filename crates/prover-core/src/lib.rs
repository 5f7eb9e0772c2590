mod task;
mod identity;
mod token;
mod clock;
mod error;

pub use task::{Task, Artifact, NodeType};
pub use identity::{Identity, Session, SESSION_PUBLIC_KEY_HEX_LEN};
pub use token::{AccessToken, EXPIRY_BUFFER_SECS};
pub use clock::{Clock, SystemClock, ManualClock};
pub use error::{CoreError, Result};

/// Number of credential characters folded into a token cache key.
pub const CACHE_KEY_PREFIX_LEN: usize = 20;
