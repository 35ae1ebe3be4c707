//! Typed catalog commands and the derived-field pipeline steps
//! (slug normalization, variant stock summation, SEO meta fallback).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Input for creating a product. Image URLs arrive pre-resolved; file
/// storage is a boundary concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    #[serde(default = "NewProduct::default_category")]
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "default_true")]
    pub track_inventory: bool,
    /// Scalar stock, authoritative only when the product has no variants.
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
}

impl NewProduct {
    fn default_category() -> String {
        "OTHER".to_string()
    }

    /// Meta title with fallback: a blank or absent value falls back to the
    /// product name.
    #[must_use]
    pub fn resolved_meta_title(&self) -> String {
        meta_or_fallback(self.meta_title.as_deref(), Some(&self.name))
            .unwrap_or_else(|| self.name.clone())
    }

    /// Meta description with fallback to the product description.
    #[must_use]
    pub fn resolved_meta_description(&self) -> Option<String> {
        meta_or_fallback(self.meta_description.as_deref(), self.description.as_deref())
    }
}

/// Input for one variant row on create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariant {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub price_override: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
}

/// A pre-resolved product image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewImage {
    pub url: String,
    #[serde(default)]
    pub alt: Option<String>,
}

/// Sparse product update.
///
/// `Option<Option<T>>` is intentional for nullable columns: outer `None` =
/// "not in request" (keep current), `Some(None)` = "explicitly cleared",
/// `Some(Some(v))` = "set to value" (PATCH semantics).
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub brand: Option<Option<String>>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub compare_at_price: Option<Option<Decimal>>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub track_inventory: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_featured: Option<bool>,
    #[serde(default)]
    pub meta_title: Option<Option<String>>,
    #[serde(default)]
    pub meta_description: Option<Option<String>>,
    /// Manual stock override; only applied when the update does not touch
    /// variants (variant reconciliation wins otherwise).
    #[serde(default)]
    pub stock: Option<i32>,
}

/// One entry in a variant reconciliation list.
///
/// Matched against existing rows by `id` first, then by `sku` within the
/// product; entries matching neither are inserted as new variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantPatch {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub price_override: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
}

/// Sum of variant stock values. Saturating so a pathological payload can
/// never wrap the aggregate.
#[must_use]
pub fn total_variant_stock(variants: &[NewVariant]) -> i32 {
    variants
        .iter()
        .fold(0_i32, |sum, v| sum.saturating_add(v.stock.max(0)))
}

/// Lower-case and trim a slug the way the products table expects it.
#[must_use]
pub fn normalize_slug(slug: &str) -> String {
    slug.trim().to_lowercase()
}

/// Explicit-or-fallback resolution for SEO meta fields: a present,
/// non-blank explicit value wins; otherwise the fallback is used.
#[must_use]
pub fn meta_or_fallback(explicit: Option<&str>, fallback: Option<&str>) -> Option<String> {
    match explicit {
        Some(value) if !value.trim().is_empty() => Some(value.to_string()),
        _ => fallback.map(ToString::to_string),
    }
}
