//! ETFCheck research-report feed client.
//!
//! Endpoint: https://www.etfcheck.co.kr/report/getReport?SHOW=2
//!
//! The feed returns the latest reports regardless of date, so results are
//! filtered on `REPORT_DATE`. The endpoint only answers requests that look
//! like they come from its own report page (`Referer`, `X-Requested-With`).

use async_trait::async_trait;
use chrono::NaiveDate;
use marketbrief_common::dates::DATE_FORMAT;
use marketbrief_common::SandboxClient as Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::ReportSource;
use crate::error::DiscoveryError;
use crate::models::Report;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtfCheckConfig {
    pub feed_url: String,
    pub referer: String,
    pub upload_base: String,
    pub user_agent: String,
}

impl Default for EtfCheckConfig {
    fn default() -> Self {
        Self {
            feed_url: "https://www.etfcheck.co.kr/report/getReport?SHOW=2".to_string(),
            referer: "https://www.etfcheck.co.kr/report/invest/main".to_string(),
            upload_base: "https://www.etfcheck.co.kr/upload/file".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

pub struct EtfCheckSource {
    client: Client,
    config: EtfCheckConfig,
}

impl EtfCheckSource {
    pub fn new(config: EtfCheckConfig, mut client: Client) -> Self {
        client.allow_url(&config.feed_url);
        client.allow_url(&config.upload_base);
        Self { client, config }
    }

    /// `{upload_base}/{FILE_NAME[..6]}/{FILE_NAME}`; the prefix is the
    /// upload month (`YYYYMM`).
    fn document_url(&self, file_name: &str) -> Option<String> {
        let month: String = file_name.chars().take(6).collect();
        if month.chars().count() < 6 {
            return None;
        }
        Some(format!(
            "{}/{}/{}",
            self.config.upload_base.trim_end_matches('/'),
            month,
            file_name
        ))
    }

    fn parse_item(&self, item: &serde_json::Value, wanted: &str) -> Option<Result<Report, String>> {
        let date_field = match item["REPORT_DATE"].as_str() {
            Some(d) => d,
            None => return Some(Err("missing REPORT_DATE".into())),
        };
        let day: String = date_field.chars().take(10).collect();
        if day != wanted {
            return None;
        }

        let field = |name: &str| {
            item[name]
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| format!("missing {name}"))
        };
        let parsed = (|| -> Result<Report, String> {
            let title = field("TITLE")?;
            let company = field("COMPANY_NAME")?;
            let file_name = field("FILE_NAME")?;
            let published = NaiveDate::parse_from_str(&day, DATE_FORMAT)
                .map_err(|_| format!("bad REPORT_DATE {date_field}"))?;
            let url = self
                .document_url(file_name)
                .ok_or_else(|| format!("FILE_NAME too short: {file_name}"))?;
            Ok(Report::new(company, title, published, url))
        })();
        Some(parsed)
    }
}

#[async_trait]
impl ReportSource for EtfCheckSource {
    #[instrument(skip(self), fields(date = %date))]
    async fn list_reports(&self, date: NaiveDate) -> Result<Vec<Report>, DiscoveryError> {
        let resp = self
            .client
            .get(&self.config.feed_url)?
            .header("Referer", &self.config.referer)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status { status: status.as_u16() });
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| DiscoveryError::Parse(e.to_string()))?;
        let items = body["results"]
            .as_array()
            .ok_or_else(|| DiscoveryError::Parse("no `results` array".into()))?;

        let wanted = date.format(DATE_FORMAT).to_string();
        let mut reports = Vec::new();
        for (i, item) in items.iter().enumerate() {
            match self.parse_item(item, &wanted) {
                Some(Ok(report)) => reports.push(report),
                Some(Err(reason)) => warn!(item = i, %reason, "skipping malformed feed item"),
                None => {}
            }
        }

        debug!(total = items.len(), matched = reports.len(), "report feed filtered");
        Ok(reports)
    }
}
