// Shared helpers used across layers

pub mod errors;
pub mod phone;

pub use errors::ApprovalError;
