use crate::media::Placement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{NoneAsEmptyString, serde_as};

/// Display fields of one table row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineItem<'a> {
    pub id: &'a str,
    pub description: &'a str,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: f64,
}

/// A catalog record shape: where its image reference lives and how it renders.
pub trait CatalogRecord {
    fn image_ref(&self) -> Option<&str>;
    fn line(&self) -> LineItem<'_>;
}

/// Quotation shape, image under `image_product`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotationProduct {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub image_product: Option<String>,
    pub id_product: String,
    pub product_description: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: f64,
}

/// Catalog shape, image under `url_image`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogProduct {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub url_image: Option<String>,
    pub id_product: String,
    pub product_description: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: f64,
}

impl CatalogRecord for QuotationProduct {
    fn image_ref(&self) -> Option<&str> {
        self.image_product.as_deref()
    }

    fn line(&self) -> LineItem<'_> {
        LineItem {
            id: &self.id_product,
            description: &self.product_description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            subtotal: self.subtotal,
        }
    }
}

impl CatalogRecord for CatalogProduct {
    fn image_ref(&self) -> Option<&str> {
        self.url_image.as_deref()
    }

    fn line(&self) -> LineItem<'_> {
        LineItem {
            id: &self.id_product,
            description: &self.product_description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            subtotal: self.subtotal,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotationRequest<T> {
    pub items: Vec<T>,
    #[serde(rename = "Total", alias = "total")]
    pub total: f64,
    #[serde(default)]
    pub logo_url: Option<String>,
}

/// Which record shape the request body uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSchema {
    #[default]
    Quotation,
    Catalog,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub schema: ItemSchema,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FetchImagesRequest {
    pub references: Vec<Option<String>>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub include_data: bool,
}

#[derive(Debug, Serialize)]
pub struct FetchImagesResponse {
    pub profile: &'static str,
    pub results: Vec<ImageReport>,
}

#[derive(Debug, Serialize)]
pub struct ImageReport {
    pub index: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub png_base64: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quotation_body_parses_with_capitalized_total() {
        let body = json!({
            "items": [{
                "image_product": "https://cdn.test/a.png",
                "id_product": "KK-1",
                "product_description": "Wooden train",
                "quantity": 12,
                "unit_price": 3.5,
                "subtotal": 42.0
            }],
            "Total": 42.0
        });
        let request: QuotationRequest<QuotationProduct> =
            serde_json::from_value(body).expect("parse");
        assert_eq!(request.total, 42.0);
        assert_eq!(request.items[0].image_ref(), Some("https://cdn.test/a.png"));
        assert_eq!(request.items[0].line().id, "KK-1");
        assert!(request.logo_url.is_none());
    }

    #[test]
    fn empty_or_missing_image_fields_are_none() {
        let body = json!({
            "items": [
                {"url_image": "", "id_product": "C-1", "product_description": "d",
                 "quantity": 1, "unit_price": 1.0, "subtotal": 1.0},
                {"id_product": "C-2", "product_description": "d",
                 "quantity": 1, "unit_price": 1.0, "subtotal": 1.0}
            ],
            "total": 2.0
        });
        let request: QuotationRequest<CatalogProduct> =
            serde_json::from_value(body).expect("parse");
        assert!(request.items.iter().all(|item| item.image_ref().is_none()));
    }

    #[test]
    fn schema_selector_defaults_to_quotation() {
        let query: ExportQuery = serde_json::from_value(json!({})).expect("parse");
        assert_eq!(query.schema, ItemSchema::Quotation);
        let query: ExportQuery =
            serde_json::from_value(json!({"schema": "catalog"})).expect("parse");
        assert_eq!(query.schema, ItemSchema::Catalog);
    }
}
