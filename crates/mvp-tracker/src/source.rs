//! Listing sources: where each cycle's table cells come from.
//!
//! The ranking page is a plain HTML table. A source fetches it and flattens
//! every `<td>` into its trimmed text, in document order. The poll loop only
//! sees the [`CellSource`] trait, so it can be driven by a scripted source in
//! tests.
//!
//! Two concrete sources exist, dispatched through [`ListingSource`]:
//! - [`HttpListing`] fetches the page over HTTP(S) with `reqwest`.
//! - [`FileListing`] reads a saved copy of the page, selected with a
//!   `file://` URL. Useful for replaying a captured page offline.

use std::path::PathBuf;

use mvp_core::config::SourceConfig;
use scraper::{Html, Selector};

use crate::error::SourceError;

/// A provider of one cycle's listing cells.
pub trait CellSource {
    /// Fetch the listing and return its cells in document order.
    async fn fetch_cells(&self) -> Result<Vec<String>, SourceError>;
}

/// The configured listing source.
///
/// Enum dispatch keeps the poll loop's source a concrete type.
pub enum ListingSource {
    /// Live page over HTTP(S).
    Http(HttpListing),
    /// Saved page on disk.
    File(FileListing),
}

impl ListingSource {
    /// Build the source named by `config.url`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &SourceConfig) -> Result<Self, SourceError> {
        if let Some(path) = config.url.strip_prefix("file://") {
            return Ok(Self::File(FileListing::new(path)));
        }
        HttpListing::new(config).map(Self::Http)
    }

    /// Human-readable location for logging.
    pub fn location(&self) -> String {
        match self {
            Self::Http(source) => source.url.clone(),
            Self::File(source) => source.path.display().to_string(),
        }
    }
}

impl CellSource for ListingSource {
    async fn fetch_cells(&self) -> Result<Vec<String>, SourceError> {
        match self {
            Self::Http(source) => source.fetch_cells().await,
            Self::File(source) => source.fetch_cells().await,
        }
    }
}

/// Fetches the ranking page over HTTP(S).
pub struct HttpListing {
    client: reqwest::Client,
    url: String,
}

impl HttpListing {
    /// Create a source for `config.url` with the configured timeout and TLS
    /// policy.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Client`] if the TLS backend fails to initialize.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

impl CellSource for HttpListing {
    async fn fetch_cells(&self) -> Result<Vec<String>, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| SourceError::Request {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = response.text().await.map_err(|source| SourceError::Request {
            url: self.url.clone(),
            source,
        })?;
        extract_cells(&body)
    }
}

/// Reads a saved copy of the ranking page.
pub struct FileListing {
    path: PathBuf,
}

impl FileListing {
    /// Create a source reading `path` on every fetch.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CellSource for FileListing {
    async fn fetch_cells(&self) -> Result<Vec<String>, SourceError> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::File {
                path: self.path.display().to_string(),
                source,
            })?;
        extract_cells(&body)
    }
}

/// Flatten every `<td>` in `html` to its trimmed text.
///
/// A cell's text nodes are joined first and the result trimmed once, so
/// inline markup keeps its inner spacing: `<td>Orc <b>Hero</b></td>` yields
/// `"Orc Hero"`.
pub fn extract_cells(html: &str) -> Result<Vec<String>, SourceError> {
    let selector = Selector::parse("td").map_err(|e| SourceError::Selector(e.to_string()))?;
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector)
        .map(|cell| cell.text().collect::<String>().trim().to_owned())
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PAGE: &str = r"
        <html><body>
        <table>
          <tr><th>Time</th><th>MVP</th><th>Player</th></tr>
          <tr><td> 2024-01-01 10:00:00 </td><td><b>Eddga</b></td><td>Hero</td></tr>
          <tr><td>2024-01-01 09:00:00</td><td>
              Maya
          </td><td></td></tr>
        </table>
        </body></html>
    ";

    #[test]
    fn extracts_trimmed_cells_in_document_order() {
        let cells = extract_cells(PAGE).unwrap();
        assert_eq!(
            cells,
            [
                "2024-01-01 10:00:00",
                "Eddga",
                "Hero",
                "2024-01-01 09:00:00",
                "Maya",
                "",
            ]
        );
    }

    #[test]
    fn inline_markup_keeps_inner_spaces() {
        let html = "<table><tr><td>2024-01-01 <span>10:00:00</span></td><td> Orc <b>Hero</b> </td></tr></table>";
        let cells = extract_cells(html).unwrap();
        assert_eq!(cells, ["2024-01-01 10:00:00", "Orc Hero"]);
    }

    #[test]
    fn page_without_table_yields_no_cells() {
        assert!(extract_cells("<p>maintenance</p>").unwrap().is_empty());
    }

    #[test]
    fn file_url_selects_file_source() {
        let config = SourceConfig {
            url: "file:///tmp/ranking.html".to_owned(),
            ..SourceConfig::default()
        };
        let source = ListingSource::from_config(&config).unwrap();
        assert!(matches!(source, ListingSource::File(_)));
        assert_eq!(source.location(), "/tmp/ranking.html");
    }

    #[test]
    fn http_url_selects_http_source() {
        let source = ListingSource::from_config(&SourceConfig::default()).unwrap();
        assert!(matches!(source, ListingSource::Http(_)));
    }

    #[tokio::test]
    async fn file_source_reads_saved_page() {
        let path = std::env::temp_dir().join(format!("mvp-ranking-{}.html", std::process::id()));
        tokio::fs::write(&path, PAGE).await.unwrap();

        let cells = FileListing::new(&path).fetch_cells().await;
        tokio::fs::remove_file(&path).await.ok();
        assert_eq!(cells.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let source = FileListing::new("/nonexistent/mvp-ranking.html");
        assert!(matches!(
            source.fetch_cells().await,
            Err(SourceError::File { .. })
        ));
    }
}
