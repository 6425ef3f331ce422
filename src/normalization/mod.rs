pub mod listing;
pub mod slug;

pub use listing::{image_url, release_date_iso, GameDraft};
pub use slug::{game_slug, slugify};
