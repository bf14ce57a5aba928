//! marketbrief-common: shared types, errors and HTTP plumbing used across all MarketBrief crates.

pub mod dates;
pub mod error;
pub mod sandbox;

pub use dates::{parse_date, DateRange};
pub use error::ConfigError;
pub use sandbox::{SandboxClient, SandboxError};
