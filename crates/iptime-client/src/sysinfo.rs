//! System information scraping.
//!
//! The expert-info page renders device facts as label/value table cells.
//! Only the model name and firmware version are scraped; the labels are the
//! Korean strings the firmware ships with.

use regex::Regex;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::session::RouterClient;

/// Expert-info CGI path. Served outside `sess-bin`, unlike the rest of the
/// admin pages.
const SYSINFO_PATH: &str = "timepro.cgi";

/// Device facts scraped from the expert-info page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl SystemInfo {
    /// True when nothing could be scraped off the page.
    pub fn is_empty(&self) -> bool {
        self.firmware_version.is_none() && self.model.is_none()
    }
}

impl RouterClient {
    /// Scrapes model and firmware version off the expert-info page.
    ///
    /// `None` when the page cannot be fetched; a page that fetches but
    /// matches neither label yields an empty [`SystemInfo`].
    pub async fn system_info(&self) -> Option<SystemInfo> {
        let query = [
            ("tmenu", "iframe".to_string()),
            ("smenu", "expertinfo".to_string()),
        ];
        let body = self.request(SYSINFO_PATH, &query, Method::GET).await?;
        if body.is_empty() {
            return None;
        }
        Some(parse_system_info(&body))
    }
}

/// The first table cell after each label wins. Values arrive with the
/// page's own padding and are trimmed.
fn parse_system_info(body: &str) -> SystemInfo {
    let field = |label: &str| {
        Regex::new(&format!(r"(?s){label}.*?<td[^>]*>([^<]+)</td>"))
            .expect("valid system info pattern")
            .captures(body)
            .map(|captures| captures[1].trim().to_string())
    };
    SystemInfo {
        firmware_version: field("펌웨어 버전"),
        model: field("모델명"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::testutil;

    use axum::extract::Query;
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;

    const EXPERTINFO_PAGE: &str = r#"<html><body><table>
<tr><td class="info_label">모델명</td><td class="info_value"> A3004NS-M </td></tr>
<tr><td class="info_label">펌웨어 버전</td><td class="info_value">
 10.04.6
</td></tr>
</table></body></html>"#;

    // ==================== Parsing Tests ====================

    #[test]
    fn parses_and_trims_labelled_cells() {
        let info = parse_system_info(EXPERTINFO_PAGE);
        assert_eq!(info.model.as_deref(), Some("A3004NS-M"));
        assert_eq!(info.firmware_version.as_deref(), Some("10.04.6"));
        assert!(!info.is_empty());
    }

    #[test]
    fn missing_labels_leave_fields_unset() {
        let info = parse_system_info("<html>nothing here</html>");
        assert!(info.model.is_none());
        assert!(info.firmware_version.is_none());
        assert!(info.is_empty());
    }

    #[test]
    fn serializes_without_missing_fields() {
        let info = SystemInfo {
            firmware_version: None,
            model: Some("A3004NS-M".to_string()),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json, serde_json::json!({"model": "A3004NS-M"}));
    }

    // ==================== Fetch Tests ====================

    #[tokio::test]
    async fn fetches_expert_info_page() {
        let app = Router::new().route(
            "/timepro.cgi",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                if query.get("smenu").map(String::as_str) == Some("expertinfo") {
                    EXPERTINFO_PAGE
                } else {
                    ""
                }
            }),
        );
        let base = testutil::serve(app).await;

        let client = RouterClient::new(RouterConfig::new(&base, "admin", "pw")).unwrap();
        let info = client.system_info().await.unwrap();
        assert_eq!(info.model.as_deref(), Some("A3004NS-M"));
    }

    #[tokio::test]
    async fn fetch_failure_yields_none() {
        let app = Router::new();
        let base = testutil::serve(app).await;

        let client = RouterClient::new(RouterConfig::new(&base, "admin", "pw")).unwrap();
        assert!(client.system_info().await.is_none());
    }
}
