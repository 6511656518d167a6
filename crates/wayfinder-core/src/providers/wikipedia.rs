//! Wikipedia lookup via the MediaWiki action API.

use super::{Encyclopedia, EncyclopediaPage};
use crate::error::{GuideError, GuideResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_API: &str = "https://en.wikipedia.org/w/api.php";
const SEARCH_LIMIT: &str = "10";

#[derive(Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct PagesResponse {
    query: Option<PagesQuery>,
}

#[derive(Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<RawPage>,
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    pageprops: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Deserialize)]
struct ImageInfo {
    url: Option<String>,
}

pub struct WikipediaClient {
    api_url: String,
    client: reqwest::Client,
}

impl WikipediaClient {
    pub fn new() -> Self {
        Self::with_api_url(DEFAULT_API)
    }

    pub fn with_api_url(api_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("wayfinder/0.1 (place guide)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_url: api_url.to_string(),
            client,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, params: &[(&str, &str)]) -> GuideResult<T> {
        let res = self
            .client
            .get(&self.api_url)
            .query(params)
            .send()
            .await
            .map_err(|e| GuideError::Encyclopedia(e.to_string()))?;
        if !res.status().is_success() {
            return Err(GuideError::Encyclopedia(format!("status {}", res.status())));
        }
        res.json::<T>()
            .await
            .map_err(|e| GuideError::Encyclopedia(e.to_string()))
    }

    async fn image_urls(&self, title: &str) -> GuideResult<Vec<String>> {
        let resp: PagesResponse = self
            .get(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("generator", "images"),
                ("gimlimit", "50"),
                ("titles", title),
                ("prop", "imageinfo"),
                ("iiprop", "url"),
            ])
            .await?;
        Ok(resp
            .query
            .map(|q| q.pages)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|p| p.imageinfo.into_iter().filter_map(|i| i.url))
            .collect())
    }
}

impl Default for WikipediaClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Lead section of a plain-text extract: everything before the first heading.
fn lead_section(extract: &str) -> &str {
    match extract.find("\n==") {
        Some(idx) => extract[..idx].trim(),
        None => extract.trim(),
    }
}

#[async_trait]
impl Encyclopedia for WikipediaClient {
    async fn search(&self, query: &str) -> GuideResult<Vec<String>> {
        let resp: SearchResponse = self
            .get(&[
                ("action", "query"),
                ("format", "json"),
                ("list", "search"),
                ("srlimit", SEARCH_LIMIT),
                ("srsearch", query),
            ])
            .await?;
        Ok(resp
            .query
            .map(|q| q.search.into_iter().map(|h| h.title).collect())
            .unwrap_or_default())
    }

    async fn fetch_page(&self, title: &str) -> GuideResult<EncyclopediaPage> {
        let resp: PagesResponse = self
            .get(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("redirects", "1"),
                ("prop", "extracts|pageprops"),
                ("explaintext", "1"),
                ("titles", title),
            ])
            .await?;
        let page = resp
            .query
            .and_then(|q| q.pages.into_iter().next())
            .ok_or_else(|| GuideError::PageNotFound(title.to_string()))?;
        if page.missing {
            return Err(GuideError::PageNotFound(title.to_string()));
        }
        if page
            .pageprops
            .as_ref()
            .is_some_and(|p| p.contains_key("disambiguation"))
        {
            return Err(GuideError::Disambiguation(page.title));
        }

        let body = page.extract.unwrap_or_default();
        let summary = lead_section(&body).to_string();
        let page_title = if page.title.is_empty() {
            title.to_string()
        } else {
            page.title
        };
        let images = self.image_urls(&page_title).await.unwrap_or_default();
        Ok(EncyclopediaPage {
            title: page_title,
            summary,
            body,
            images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_section_stops_at_heading() {
        let text = "Marina Beach is a beach.\nIt is long.\n\n== History ==\nOld.";
        assert_eq!(lead_section(text), "Marina Beach is a beach.\nIt is long.");
        assert_eq!(lead_section("No headings"), "No headings");
    }

    #[test]
    fn disambiguation_page_props_parse() {
        let raw = r#"{"query":{"pages":[{"title":"Mercury","pageprops":{"disambiguation":""}}]}}"#;
        let parsed: PagesResponse = serde_json::from_str(raw).unwrap();
        let page = parsed.query.unwrap().pages.remove(0);
        assert!(page.pageprops.unwrap().contains_key("disambiguation"));
    }
}
