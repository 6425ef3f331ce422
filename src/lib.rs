//! Pulls game listings from the GOG storefront and mirrors them into a
//! Strapi-style CMS: games, their taxonomy relations, cover and gallery images.

pub mod api;
pub mod cms;
pub mod config;
pub mod normalization;
pub mod populate;
pub mod storefront;

pub mod util {
    pub mod env;
    pub mod logging;
    pub mod pacing;
}

pub use config::PopulateConfig;
pub use populate::{PopulateService, PopulateSummary};
