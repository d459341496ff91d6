pub mod document;
pub mod event;
pub mod outcome;

pub use document::*;
pub use event::*;
pub use outcome::*;
