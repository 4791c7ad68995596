pub mod diagnostics;
pub mod health;
pub mod rooms;

pub use diagnostics::*;
pub use health::*;
pub use rooms::*;
