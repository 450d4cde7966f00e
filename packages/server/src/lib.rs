// Approval gateway core library
//
// Gates business decisions behind a WhatsApp-delivered OTP challenge and
// correlates stateless webhook events back to the in-flight approval.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::Config;
