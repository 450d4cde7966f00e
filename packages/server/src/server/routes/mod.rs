// HTTP routes
pub mod approvals;
pub mod health;
pub mod webhook;

pub use approvals::*;
pub use health::*;
pub use webhook::*;
