use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One product from the storefront's filtered listing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub price: ListingPrice,
    /// Unix seconds; the endpoint sends either a number or a numeric string.
    #[serde(default)]
    pub global_release_date: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub supported_operating_systems: Vec<String>,
    #[serde(default)]
    pub developer: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gallery: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingPrice {
    #[serde(default)]
    pub amount: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub products: Vec<ListingRecord>,
}

/// Description fields scraped from a game's detail page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GameDetail {
    /// Trimmed description text, first 160 characters.
    pub short_description: String,
    /// Inner HTML of the description block.
    pub description: String,
}

/// The endpoint sends `null` for empty arrays and missing prices.
fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// Query string for the listing endpoint. Insertion-ordered so the URL is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingParams(IndexMap<String, String>);

impl Default for ListingParams {
    fn default() -> Self {
        let mut params = IndexMap::new();
        params.insert("mediaType".to_string(), "game".to_string());
        params.insert("sort".to_string(), "popularity".to_string());
        params.insert("page".to_string(), "1".to_string());
        Self(params)
    }
}

impl ListingParams {
    /// Merge caller overrides over the defaults; later keys win.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in overrides {
            self.set(k, v);
        }
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
