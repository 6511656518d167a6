//! Encyclopedia fallback: one synthesized result when local evidence is weak.

use super::{Provenance, RetrievalResult, EXTERNAL_SCORE};
use crate::error::{GuideError, GuideResult};
use crate::providers::{bounded, Encyclopedia, EncyclopediaPage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const BODY_EXCERPT_CHARS: usize = 2000;
const RESULT_EXCERPT_CHARS: usize = 1200;
const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];
const IMAGE_BLACKLIST: [&str; 3] = ["logo", "icon", "badge"];

pub struct EncyclopediaFallback {
    encyclopedia: Arc<dyn Encyclopedia>,
    timeout: Duration,
}

impl EncyclopediaFallback {
    pub fn new(encyclopedia: Arc<dyn Encyclopedia>, timeout: Duration) -> Self {
        Self {
            encyclopedia,
            timeout,
        }
    }

    /// Looks `query` up; every failure is logged and yields `None`.
    pub async fn lookup(&self, query: &str) -> Option<RetrievalResult> {
        match self.try_lookup(query).await {
            Ok(found) => found,
            Err(e) => {
                warn!(query, error = %e, "encyclopedia fallback failed");
                None
            }
        }
    }

    async fn try_lookup(&self, query: &str) -> GuideResult<Option<RetrievalResult>> {
        let titles = bounded("encyclopedia", self.timeout, self.encyclopedia.search(query)).await?;
        let Some(first) = titles.first() else {
            info!(query, "no encyclopedia results");
            return Ok(None);
        };

        let page = match self.fetch(first).await {
            Ok(page) => page,
            Err(GuideError::Disambiguation(title)) => match titles.get(1) {
                Some(second) => {
                    info!(ambiguous = %title, retry = %second, "disambiguation; trying next candidate");
                    self.fetch(second).await?
                }
                None => {
                    info!(ambiguous = %title, "disambiguation with no other candidate");
                    return Ok(None);
                }
            },
            Err(e) => return Err(e),
        };

        Ok(Some(external_result(page)))
    }

    async fn fetch(&self, title: &str) -> GuideResult<EncyclopediaPage> {
        bounded("encyclopedia", self.timeout, self.encyclopedia.fetch_page(title)).await
    }
}

fn excerpt(page: &EncyclopediaPage) -> String {
    let text: String = if page.summary.trim().is_empty() {
        page.body.chars().take(BODY_EXCERPT_CHARS).collect()
    } else {
        page.summary.trim().to_string()
    };
    text.chars().take(RESULT_EXCERPT_CHARS).collect()
}

/// First accepted-format image whose file name is not a logo, icon or badge;
/// otherwise the first image at all.
pub fn pick_image(images: &[String]) -> Option<String> {
    images
        .iter()
        .find(|url| {
            let lower = url.to_lowercase();
            let file = lower.rsplit('/').next().unwrap_or(lower.as_str());
            IMAGE_EXTENSIONS.iter().any(|ext| file.ends_with(ext))
                && !IMAGE_BLACKLIST.iter().any(|bad| file.contains(bad))
        })
        .or_else(|| images.first())
        .cloned()
}

fn external_result(page: EncyclopediaPage) -> RetrievalResult {
    RetrievalResult {
        id: format!("wiki::{}", page.title),
        name: page.title.clone(),
        excerpt: excerpt(&page),
        category: "Wikipedia".to_string(),
        location: None,
        image_url: pick_image(&page.images),
        score: EXTERNAL_SCORE,
        provenance: Provenance::External,
        images: page.images,
    }
}
