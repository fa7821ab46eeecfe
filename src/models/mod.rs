pub mod health;
pub mod diagnostics;
pub mod document;
pub mod messages;
pub mod error;

pub use health::*;
pub use diagnostics::*;
pub use document::*;
pub use messages::*;
pub use error::*;
