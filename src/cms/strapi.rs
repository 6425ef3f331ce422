use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::debug;

use super::{CmsEntity, CmsError, CmsStore, EntityKind, MediaUpload};
use crate::storefront::client::truncate_for_log;

/// REST client for a Strapi-style CMS.
///
/// Endpoints:
/// - GET  /api/{plural}?filters[name][$eq]=..  - exact-name lookup
/// - POST /api/{plural}  `{ "data": {..} }`     - create
/// - POST /api/upload  multipart refId/ref/field/files
///
/// Accepts both the nested (`{id, attributes: {..}}`) and flat entry shapes.
#[derive(Debug, Clone)]
pub struct StrapiClient {
    base_url: String,
    http: Client,
    token: Option<String>,
}

impl StrapiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("building cms http client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/api/{}", self.base_url, kind.plural())
    }

    pub fn upload_url(&self) -> String {
        format!("{}/api/upload", self.base_url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token.as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn checked(resp: Response, url: &str) -> Result<Response, CmsError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = truncate_for_log(resp.text().await.unwrap_or_default(), 1000);
        Err(CmsError::Http {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        })
    }
}

/// Pull id/name/slug from one response entry.
pub fn parse_entry(entry: &Value) -> Result<CmsEntity, CmsError> {
    let id = entry
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| CmsError::Payload(format!("entry without numeric id: {entry}")))?;
    let attrs = entry.get("attributes").unwrap_or(entry);
    let name = attrs
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let slug = attrs.get("slug").and_then(Value::as_str).map(str::to_string);
    Ok(CmsEntity { id, name, slug })
}

#[async_trait]
impl CmsStore for StrapiClient {
    async fn find_by_name(&self, kind: EntityKind, name: &str) -> Result<Option<CmsEntity>, CmsError> {
        let url = self.collection_url(kind);
        let req = self.http.get(&url).query(&[
            ("filters[name][$eq]", name),
            ("pagination[pageSize]", "1"),
        ]);
        let resp = Self::checked(self.authed(req).send().await?, &url).await?;
        let body: Value = resp.json().await?;
        match body.get("data").and_then(Value::as_array).and_then(|a| a.first()) {
            Some(entry) => parse_entry(entry).map(Some),
            None => Ok(None),
        }
    }

    async fn create(&self, kind: EntityKind, data: Value) -> Result<CmsEntity, CmsError> {
        let url = self.collection_url(kind);
        let req = self.http.post(&url).json(&json!({ "data": data }));
        let resp = Self::checked(self.authed(req).send().await?, &url).await?;
        let body: Value = resp.json().await?;
        let entry = body
            .get("data")
            .ok_or_else(|| CmsError::Payload(format!("create {kind}: response without data")))?;
        let created = parse_entry(entry)?;
        debug!(%kind, id = created.id, name = %created.name, "cms entity created");
        Ok(created)
    }

    async fn upload(&self, upload: MediaUpload) -> Result<(), CmsError> {
        let url = self.upload_url();
        let file = Part::bytes(upload.bytes.to_vec())
            .file_name(upload.filename.clone())
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .text("refId", upload.ref_id.to_string())
            .text("ref", upload.kind.uid())
            .text("field", upload.field.as_str())
            .part("files", file);
        let req = self.http.post(&url).multipart(form);
        Self::checked(self.authed(req).send().await?, &url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_and_flat_entries() {
        let nested = json!({"id": 7, "attributes": {"name": "Indie", "slug": "indie"}});
        let flat = json!({"id": 8, "documentId": "abc", "name": "Linux", "slug": "linux"});
        assert_eq!(
            parse_entry(&nested).unwrap(),
            CmsEntity {
                id: 7,
                name: "Indie".into(),
                slug: Some("indie".into())
            }
        );
        assert_eq!(parse_entry(&flat).unwrap().name, "Linux");
    }

    #[test]
    fn entry_without_id_is_a_payload_error() {
        let err = parse_entry(&json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, CmsError::Payload(_)));
    }

    #[test]
    fn builds_collection_and_upload_urls() {
        let client = StrapiClient::new("http://localhost:1337/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.collection_url(EntityKind::Category),
            "http://localhost:1337/api/categories"
        );
        assert_eq!(client.upload_url(), "http://localhost:1337/api/upload");
    }
}
