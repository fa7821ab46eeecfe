pub mod connctx;
pub mod external;
pub mod registry;
pub mod session;

pub use registry::{RegistryStats, SessionRegistry, Subscription};
pub use session::{BroadcastMessage, Session};
