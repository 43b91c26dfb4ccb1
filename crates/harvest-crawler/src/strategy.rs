use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Turns a raw page into structured data.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    async fn extract(&self, page: &str, location: &PageLocation) -> anyhow::Result<Value>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLocation {
    Url(String),
    Path(PathBuf),
}

impl fmt::Display for PageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Outcome of fetching and extracting a single URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub html: Option<String>,
    /// Serialized JSON produced by the extraction strategy
    pub extracted_content: Option<String>,
    pub error_message: Option<String>,
}

impl CrawlResult {
    pub fn success(
        url: impl Into<String>,
        status_code: u16,
        html: String,
        extracted: &Value,
    ) -> anyhow::Result<Self> {
        let extracted_content = match extracted {
            Value::Null => None,
            value => Some(serde_json::to_string(value)?),
        };
        Ok(Self {
            url: url.into(),
            success: true,
            status_code: Some(status_code),
            html: Some(html),
            extracted_content,
            error_message: None,
        })
    }

    pub fn failure(
        url: impl Into<String>,
        status_code: Option<u16>,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            url: url.into(),
            success: false,
            status_code,
            html: None,
            extracted_content: None,
            error_message: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_serializes_extracted_value() {
        let res =
            CrawlResult::success("https://a.edu", 200, "<p>x</p>".into(), &json!([{"t": "é"}]))
                .unwrap();
        assert!(res.success);
        assert_eq!(res.extracted_content.as_deref(), Some(r#"[{"t":"é"}]"#));
    }

    #[test]
    fn null_extraction_has_no_content() {
        let res = CrawlResult::success("https://a.edu", 200, String::new(), &Value::Null).unwrap();
        assert!(res.success);
        assert_eq!(res.extracted_content, None);
    }

    #[test]
    fn location_displays_url_or_path() {
        assert_eq!(
            PageLocation::Url("https://a.edu/news".into()).to_string(),
            "https://a.edu/news"
        );
        assert_eq!(
            PageLocation::Path(PathBuf::from("pages/news.html")).to_string(),
            "pages/news.html"
        );
    }

    #[test]
    fn failure_keeps_reason() {
        let res = CrawlResult::failure("https://a.edu", Some(404), "HTTP status 404 Not Found");
        assert!(!res.success);
        assert_eq!(res.status_code, Some(404));
        assert_eq!(
            res.error_message.as_deref(),
            Some("HTTP status 404 Not Found")
        );
    }
}
