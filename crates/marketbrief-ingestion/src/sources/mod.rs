//! Report discovery sources.

pub mod etfcheck;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::DiscoveryError;
use crate::models::Report;

pub use etfcheck::{EtfCheckConfig, EtfCheckSource};

/// Lists the reports published on a date.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn list_reports(&self, date: NaiveDate) -> Result<Vec<Report>, DiscoveryError>;
}
