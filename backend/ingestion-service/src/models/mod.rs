pub mod datetime;
pub mod event;

pub use event::{Action, SyntheticEvent};
