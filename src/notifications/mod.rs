//! Outbound notifications sent to customers.

pub mod email;

pub use email::{EmailMessage, EmailSender, SystemEmailService};
