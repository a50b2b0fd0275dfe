//! Product records that seed pipeline jobs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal product identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A product as read from the product store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,

    pub title: String,

    /// Hero image
    #[serde(default)]
    pub image_url: Option<String>,

    /// Ordered gallery images
    #[serde(default)]
    pub gallery_urls: Vec<String>,

    #[serde(default)]
    pub affiliate_url: Option<String>,

    /// Source platform tag (e.g. "tiktok-shop", "amazon")
    #[serde(default)]
    pub platform: Option<String>,

    /// Product id on the source platform
    #[serde(default)]
    pub external_id: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            image_url: None,
            gallery_urls: Vec::new(),
            affiliate_url: None,
            platform: None,
            external_id: None,
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_gallery(mut self, urls: Vec<String>) -> Self {
        self.gallery_urls = urls;
        self
    }

    pub fn with_affiliate_url(mut self, url: impl Into<String>) -> Self {
        self.affiliate_url = Some(url.into());
        self
    }

    /// Whether the product has at least one image to render.
    pub fn has_images(&self) -> bool {
        self.image_url.is_some() || !self.gallery_urls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use chrono::Utc;

    #[test]
    fn test_job_seeded_from_product() {
        let mut product = Product::new("p-9", "Standing Desk")
            .with_image("https://img/hero.jpg")
            .with_gallery(vec!["https://img/1.jpg".into(), "https://img/2.jpg".into()])
            .with_affiliate_url("https://aff/desk");
        product.external_id = Some("ext-123".into());

        let job = Job::from_product(&product, Utc::now());
        assert_eq!(job.product_id.as_str(), "p-9");
        assert_eq!(job.product_name, "Standing Desk");
        assert_eq!(job.external_product_id.as_deref(), Some("ext-123"));
        assert_eq!(job.affiliate_url.as_deref(), Some("https://aff/desk"));
        assert_eq!(job.images().len(), 2);
    }

    #[test]
    fn test_has_images() {
        assert!(!Product::new("p", "t").has_images());
        assert!(Product::new("p", "t").with_image("x").has_images());
    }
}
