use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub description: String,
    pub image: String,
}

/// Wire shape of a catalog document: `{ "products": [...] }`.
#[derive(Debug, Deserialize)]
struct CatalogDocument {
    products: Vec<Product>,
}

pub fn parse_catalog(raw: &str) -> Result<Vec<Product>, CatalogError> {
    let doc: CatalogDocument = serde_json::from_str(raw)?;
    Ok(doc.products)
}

pub fn filter_by_category<'a>(products: &'a [Product], category: &str) -> Vec<&'a Product> {
    products.iter().filter(|p| p.category == category).collect()
}

pub fn find_product(products: &[Product], id: i64) -> Option<&Product> {
    products.iter().find(|p| p.id == id)
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Product>, CatalogError>;
}

#[derive(Debug, Clone)]
pub struct JsonFileCatalog {
    pub path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for JsonFileCatalog {
    async fn load(&self) -> Result<Vec<Product>, CatalogError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        parse_catalog(&raw)
    }
}

#[derive(Debug, Clone)]
pub struct HttpCatalog {
    pub url: url::Url,
    client: reqwest::Client,
}

impl HttpCatalog {
    pub fn new(url: url::Url) -> Self {
        Self { url, client: reqwest::Client::new() }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn load(&self) -> Result<Vec<Product>, CatalogError> {
        let resp = self.client.get(self.url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(CatalogError::Transport(format!("catalog fetch failed: {}", resp.status())));
        }
        let raw = resp.text().await?;
        parse_catalog(&raw)
    }
}

/// Fixed in-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    pub products: Vec<Product>,
}

impl StaticCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn load(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.products.clone())
    }
}

#[cfg(test)]
pub(crate) fn sample_products() -> Vec<Product> {
    vec![
        Product {
            id: 1,
            name: "Hydrating Cleanser".into(),
            brand: "CeraVe".into(),
            category: "cleanser".into(),
            description: "Gentle cleanser for normal to dry skin.".into(),
            image: "https://example.com/img/1.png".into(),
        },
        Product {
            id: 2,
            name: "Revitalift Serum".into(),
            brand: "L'Oreal Paris".into(),
            category: "skincare".into(),
            description: "Pure hyaluronic acid serum.".into(),
            image: "https://example.com/img/2.png".into(),
        },
        Product {
            id: 3,
            name: "Daily Moisturizer".into(),
            brand: "La Roche-Posay".into(),
            category: "moisturizer".into(),
            description: "Oil-free daily moisturizer.".into(),
            image: "https://example.com/img/3.png".into(),
        },
        Product {
            id: 4,
            name: "Foaming Cleanser".into(),
            brand: "CeraVe".into(),
            category: "cleanser".into(),
            description: "Foaming cleanser for oily skin.".into(),
            image: "https://example.com/img/4.png".into(),
        },
    ]
}
