use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::models::{GameDetail, ListingPage, ListingParams, ListingRecord};
use super::Storefront;

const SHORT_DESCRIPTION_CHARS: usize = 160;
const DESCRIPTION_SELECTOR: &str = ".description";
/// Seconds to wait after successive 429s; `Retry-After` wins when larger.
const BACKOFF_SECS: [u64; 3] = [2, 5, 10];

pub(crate) fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// GOG storefront client: listing JSON, detail-page HTML and CDN images.
///
/// Endpoints:
/// - GET /games/ajax/filtered?mediaType=game&sort=..&page=.. - listing page
/// - GET /game/{slug} - HTML detail page
#[derive(Debug, Clone)]
pub struct GogClient {
    base_url: String,
    http: Client,
}

impl GogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("gog-populate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("building storefront http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn listing_url(&self) -> String {
        format!("{}/games/ajax/filtered", self.base_url)
    }

    pub fn detail_url(&self, slug: &str) -> String {
        format!("{}/game/{}", self.base_url, slug)
    }

    /// GET with a short 429 backoff ladder. Any other non-success status is an error.
    async fn get_with_backoff(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        let mut attempt = 0usize;
        loop {
            let mut req = self.http.get(url);
            if !query.is_empty() {
                req = req.query(query);
            }
            let resp = req
                .send()
                .await
                .with_context(|| format!("GET {url} failed"))?;
            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < BACKOFF_SECS.len() {
                let retry_after = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .unwrap_or(0);
                let sleep_secs = BACKOFF_SECS[attempt].max(retry_after);
                warn!(url, attempt, sleep_secs, "storefront rate limited; backing off");
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
                continue;
            }
            if !status.is_success() {
                let body = truncate_for_log(resp.text().await.unwrap_or_default(), 500);
                return Err(anyhow!("storefront GET failed: {status} url={url} body={body}"));
            }
            return Ok(resp);
        }
    }
}

#[async_trait]
impl Storefront for GogClient {
    async fn fetch_listing(&self, params: &ListingParams) -> Result<Vec<ListingRecord>> {
        let url = self.listing_url();
        let query: Vec<(&str, &str)> = params.pairs().collect();
        debug!(url = %url, ?query, "fetching listing page");
        let page: ListingPage = self
            .get_with_backoff(&url, &query)
            .await?
            .json()
            .await
            .context("decoding listing payload")?;
        Ok(page.products)
    }

    async fn fetch_game_detail(&self, slug: &str) -> Result<GameDetail> {
        let url = self.detail_url(slug);
        let html = self
            .get_with_backoff(&url, &[])
            .await?
            .text()
            .await
            .with_context(|| format!("reading detail page {url}"))?;
        parse_game_detail(&html).with_context(|| format!("parsing detail page {url}"))
    }

    async fn fetch_image(&self, url: &str) -> Result<Bytes> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("image download failed: {status} url={url}"));
        }
        Ok(resp.bytes().await?)
    }
}

/// Extract description fields from a detail page.
///
/// Fails when the description block is missing; the caller treats that as a
/// per-game error.
pub fn parse_game_detail(html: &str) -> Result<GameDetail> {
    let selector = Selector::parse(DESCRIPTION_SELECTOR)
        .map_err(|e| anyhow!("invalid selector {DESCRIPTION_SELECTOR}: {e:?}"))?;
    let doc = Html::parse_document(html);
    let node = doc
        .select(&selector)
        .next()
        .ok_or_else(|| anyhow!("missing {DESCRIPTION_SELECTOR} element"))?;

    let text: String = node.text().collect();
    let short_description = text.trim().chars().take(SHORT_DESCRIPTION_CHARS).collect();

    Ok(GameDetail {
        short_description,
        description: node.inner_html(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_description_text_and_markup() {
        let html = r#"<html><body>
            <div class="description">
              <b>Geralt</b> returns in an open world.
            </div>
            <div class="description">second block ignored</div>
        </body></html>"#;
        let detail = parse_game_detail(html).unwrap();
        assert_eq!(detail.short_description, "Geralt returns in an open world.");
        assert!(detail.description.contains("<b>Geralt</b>"));
    }

    #[test]
    fn short_description_is_capped_by_chars() {
        let body = "é".repeat(400);
        let html = format!(r#"<div class="description">{body}</div>"#);
        let detail = parse_game_detail(&html).unwrap();
        assert_eq!(detail.short_description.chars().count(), 160);
    }

    #[test]
    fn missing_description_is_an_error() {
        let err = parse_game_detail("<html><body><p>nothing</p></body></html>").unwrap_err();
        assert!(err.to_string().contains(".description"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = truncate_for_log("ééééé".to_string(), 3);
        assert_eq!(s, "é…");
    }

    #[test]
    fn urls_are_built_from_base() {
        let client = GogClient::new("https://www.gog.com/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.listing_url(), "https://www.gog.com/games/ajax/filtered");
        assert_eq!(client.detail_url("cyberpunk_2077"), "https://www.gog.com/game/cyberpunk_2077");
    }
}
