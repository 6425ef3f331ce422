//! Scriptable storefront shared by the pipeline tests.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

use crate::storefront::{GameDetail, ListingParams, ListingRecord, Storefront};

#[derive(Default)]
pub struct FakeStorefront {
    listing: Mutex<Vec<ListingRecord>>,
    listing_down: Mutex<bool>,
    broken_details: Mutex<HashSet<String>>,
    broken_images: Mutex<HashSet<String>>,
    listing_requests: Mutex<Vec<ListingParams>>,
    image_requests: Mutex<Vec<String>>,
}

impl FakeStorefront {
    pub fn with_listing(products: Vec<ListingRecord>) -> Self {
        let fake = Self::default();
        *fake.listing.lock().unwrap() = products;
        fake
    }

    pub fn take_listing_down(&self) {
        *self.listing_down.lock().unwrap() = true;
    }

    pub fn fail_detail(&self, slug: &str) {
        self.broken_details.lock().unwrap().insert(slug.to_string());
    }

    pub fn fail_image(&self, url: &str) {
        self.broken_images.lock().unwrap().insert(url.to_string());
    }

    pub fn heal_images(&self) {
        self.broken_images.lock().unwrap().clear();
    }

    pub fn listing_requests(&self) -> Vec<ListingParams> {
        self.listing_requests.lock().unwrap().clone()
    }

    pub fn image_requests(&self) -> Vec<String> {
        self.image_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storefront for FakeStorefront {
    async fn fetch_listing(&self, params: &ListingParams) -> Result<Vec<ListingRecord>> {
        self.listing_requests.lock().unwrap().push(params.clone());
        if *self.listing_down.lock().unwrap() {
            return Err(anyhow!("listing endpoint returned 503"));
        }
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn fetch_game_detail(&self, slug: &str) -> Result<GameDetail> {
        if self.broken_details.lock().unwrap().contains(slug) {
            return Err(anyhow!("missing .description element"));
        }
        Ok(GameDetail {
            short_description: format!("About {slug}"),
            description: format!("<p>About {slug}</p>"),
        })
    }

    async fn fetch_image(&self, url: &str) -> Result<Bytes> {
        self.image_requests.lock().unwrap().push(url.to_string());
        if self.broken_images.lock().unwrap().contains(url) {
            return Err(anyhow!("connection reset fetching {url}"));
        }
        Ok(Bytes::from(url.as_bytes().to_vec()))
    }
}

/// Listing record with every relation filled in.
pub fn product(title: &str, slug: &str) -> ListingRecord {
    serde_json::from_value(serde_json::json!({
        "title": title,
        "slug": slug,
        "price": { "amount": "9.99" },
        "globalReleaseDate": 1431993600,
        "genres": ["Role-playing", "Adventure"],
        "supportedOperatingSystems": ["windows", "linux"],
        "developer": "CD PROJEKT RED",
        "publisher": "CD PROJEKT",
        "image": format!("//img/{slug}"),
        "gallery": (0..7).map(|i| format!("//img/{slug}/g{i}")).collect::<Vec<_>>(),
    }))
    .unwrap()
}
