use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ExportRequest, ExportStatus, FileId, Scan, ScanPlatform};
use crate::config::NessusConfig;
use crate::error::ReportError;

/// REST client for a Nessus-compatible scanning platform.
pub struct NessusClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ScanList {
    #[serde(default)]
    scans: Option<Vec<Scan>>,
}

#[derive(Deserialize)]
struct ExportStatusBody {
    status: String,
}

impl NessusClient {
    pub fn new(config: &NessusConfig) -> Result<Self> {
        let mut api_keys = HeaderValue::from_str(&format!(
            "accessKey={}; secretKey={}",
            config.access_key, config.secret_key
        ))
        .context("API keys contain characters not allowed in an HTTP header")?;
        api_keys.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("X-ApiKeys", api_keys);

        if !config.verify_tls {
            warn!(url = %config.url, "TLS certificate validation disabled for scanning platform");
        }

        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build scanning platform HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, url: &str) -> Result<Response, ReportError> {
        debug!(%url, "GET");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReportError::transport(url, e))?;
        resp.error_for_status()
            .map_err(|e| ReportError::transport(url, e))
    }
}

#[async_trait::async_trait]
impl ScanPlatform for NessusClient {
    async fn list_scans(&self) -> Result<Vec<Scan>, ReportError> {
        let url = self.url("/scans");
        let body: ScanList = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| ReportError::transport(&url, e))?;
        Ok(body.scans.unwrap_or_default())
    }

    async fn request_export(
        &self,
        scan_id: i64,
        request: &ExportRequest,
    ) -> Result<FileId, ReportError> {
        let url = self.url(&format!("/scans/{scan_id}/export"));
        let rejected = |reason: String| ReportError::ExportRequest { scan_id, reason };

        debug!(%url, format = %request.format, chapters = %request.chapters, "POST");
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| rejected(e.to_string()))?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| rejected(format!("unreadable response: {e}")))?;

        parse_file_id(&body).ok_or_else(|| rejected(format!("response has no file id: {body}")))
    }

    async fn export_status(
        &self,
        scan_id: i64,
        file_id: &FileId,
    ) -> Result<ExportStatus, ReportError> {
        let url = self.url(&format!("/scans/{scan_id}/export/{file_id}/status"));
        let body: ExportStatusBody = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| ReportError::transport(&url, e))?;
        Ok(ExportStatus::from_raw(&body.status))
    }

    async fn download_export(
        &self,
        scan_id: i64,
        file_id: &FileId,
    ) -> Result<Vec<u8>, ReportError> {
        let url = self.url(&format!("/scans/{scan_id}/export/{file_id}/download"));
        let bytes = self
            .get(&url)
            .await?
            .bytes()
            .await
            .map_err(|e| ReportError::transport(&url, e))?;
        Ok(bytes.to_vec())
    }
}

/// The platform returns the job handle as `{"file": 123}`; some versions
/// send it as a string.
fn parse_file_id(body: &serde_json::Value) -> Option<FileId> {
    match body.get("file")? {
        serde_json::Value::Number(n) => Some(FileId(n.to_string())),
        serde_json::Value::String(s) if !s.is_empty() => Some(FileId(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_file_id_number_and_string() {
        assert_eq!(parse_file_id(&json!({"file": 1234})), Some(FileId("1234".into())));
        assert_eq!(parse_file_id(&json!({"file": "abc"})), Some(FileId("abc".into())));
    }

    #[test]
    fn test_parse_file_id_missing_or_bad() {
        assert_eq!(parse_file_id(&json!({})), None);
        assert_eq!(parse_file_id(&json!({"file": ""})), None);
        assert_eq!(parse_file_id(&json!({"file": null})), None);
        assert_eq!(parse_file_id(&json!({"token": "x"})), None);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = NessusConfig {
            url: "https://nessus:8834/".to_string(),
            access_key: "a".to_string(),
            secret_key: "s".to_string(),
            ..NessusConfig::default()
        };
        let client = NessusClient::new(&config).unwrap();
        assert_eq!(client.url("/scans"), "https://nessus:8834/scans");
    }

    #[test]
    fn test_rejects_header_breaking_keys() {
        let config = NessusConfig {
            url: "https://nessus".to_string(),
            access_key: "bad\nkey".to_string(),
            secret_key: "s".to_string(),
            ..NessusConfig::default()
        };
        assert!(NessusClient::new(&config).is_err());
    }
}
