//! ETFCheck feed client against a mock server.

use chrono::NaiveDate;
use marketbrief_common::SandboxClient;
use marketbrief_ingestion::error::DiscoveryError;
use marketbrief_ingestion::sources::{EtfCheckConfig, EtfCheckSource, ReportSource};
use marketbrief_ingestion::Report;
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer) -> EtfCheckSource {
    let config = EtfCheckConfig {
        feed_url: format!("{}/report/getReport?SHOW=2", server.uri()),
        referer: format!("{}/report/invest/main", server.uri()),
        upload_base: format!("{}/upload/file", server.uri()),
        ..EtfCheckConfig::default()
    };
    EtfCheckSource::new(config, SandboxClient::new().unwrap())
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

#[tokio::test]
async fn test_lists_reports_for_the_date() {
    let server = MockServer::start().await;
    let feed = serde_json::json!({
        "results": [
            {
                "REPORT_DATE": "2024-03-01 08:30:00",
                "TITLE": "Q3 Outlook",
                "COMPANY_NAME": "AcmeCo",
                "FILE_NAME": "202403_acme_q3.pdf"
            },
            {
                "REPORT_DATE": "2024-02-29 17:00:00",
                "TITLE": "Yesterday",
                "COMPANY_NAME": "AcmeCo",
                "FILE_NAME": "202402_acme.pdf"
            },
            {
                "REPORT_DATE": "2024-03-01",
                "COMPANY_NAME": "NoTitle",
                "FILE_NAME": "202403_x.pdf"
            },
            {
                "REPORT_DATE": "2024-03-01",
                "TITLE": "반도체 전망",
                "COMPANY_NAME": "미래에셋",
                "FILE_NAME": "202403_semi.pdf"
            }
        ]
    });
    Mock::given(method("GET"))
        .and(path("/report/getReport"))
        .and(query_param("SHOW", "2"))
        .and(header("X-Requested-With", "XMLHttpRequest"))
        .and(header("Referer", format!("{}/report/invest/main", server.uri()).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed))
        .expect(1)
        .mount(&server)
        .await;

    let reports = source(&server).list_reports(date()).await.unwrap();
    assert_eq!(
        reports,
        vec![
            Report::new(
                "AcmeCo",
                "Q3 Outlook",
                date(),
                format!("{}/upload/file/202403/202403_acme_q3.pdf", server.uri()),
            ),
            Report::new(
                "미래에셋",
                "반도체 전망",
                date(),
                format!("{}/upload/file/202403/202403_semi.pdf", server.uri()),
            ),
        ]
    );
    assert_eq!(reports[1].document_id().as_str(), "미래에셋_반도체_전망");
}

#[tokio::test]
async fn test_empty_day() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
        .mount(&server)
        .await;

    assert!(source(&server).list_reports(date()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_http_error_and_bad_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let err = source(&server).list_reports(date()).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Status { status: 502 }));

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"rows": []})))
        .mount(&server)
        .await;
    let err = source(&server).list_reports(date()).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::Parse(_)));
}
