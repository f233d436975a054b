//! Post-download classification of attachments.

pub mod rule;
pub mod sweep;

pub use rule::VendorRule;
pub use sweep::{sweep, SweepReport};
