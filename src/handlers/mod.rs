pub mod health;
pub mod diagnostics;
pub mod document;

pub use health::*;
pub use diagnostics::*;
pub use document::*;
