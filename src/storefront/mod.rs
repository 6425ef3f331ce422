//! Upstream storefront access: listing pages, detail pages and image assets.

pub mod client;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use client::GogClient;
pub use models::{GameDetail, ListingParams, ListingRecord};

#[async_trait]
pub trait Storefront: Send + Sync {
    /// Fetch one listing page. The batch driver owns paging.
    async fn fetch_listing(&self, params: &ListingParams) -> Result<Vec<ListingRecord>>;

    /// Scrape description fields from the game's detail page.
    async fn fetch_game_detail(&self, slug: &str) -> Result<GameDetail>;

    /// Download an absolute image URL.
    async fn fetch_image(&self, url: &str) -> Result<Bytes>;
}
