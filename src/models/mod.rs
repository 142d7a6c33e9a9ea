pub mod aggregation;
pub mod event;
pub mod form;
pub mod notification;

pub use aggregation::*;
pub use event::*;
pub use form::*;
pub use notification::*;
