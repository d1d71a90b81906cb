//! Core data models used throughout the search engine.
//!
//! These types represent the filter criteria, outgoing requests, decoded
//! responses, and typed record hits that flow through the query pipeline.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::replica::SortKey;

/// A single filter criterion attached to a field name.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Exact string match: `field:"value"`.
    Exact(String),
    /// Numeric value. Under a `min*`/`max*` key this becomes a range bound.
    Number(f64),
    /// Boolean flag: `field:true`.
    Bool(bool),
    /// Set membership with OR semantics.
    AnyOf(Vec<String>),
    /// No constraint. Skipped by the compiler.
    Absent,
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Exact(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Exact(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Number(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Number(v as f64)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(v: Vec<String>) -> Self {
        FilterValue::AnyOf(v)
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FilterValue::Absent)
    }
}

/// Typed filter criteria for one search invocation.
///
/// Fields keep their insertion order, which fixes the textual order of the
/// compiled clauses (not their meaning).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    fields: Vec<(String, FilterValue)>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(field, value);
        self
    }

    /// Set a field. Re-setting an existing field replaces it in place.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        let field = field.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<FilterValue>> FromIterator<(K, V)> for FilterSpec {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut spec = FilterSpec::new();
        for (k, v) in iter {
            spec.insert(k, v);
        }
        spec
    }
}

/// Caller-side options for a single search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub filters: FilterSpec,
    pub page: u32,
    pub hits_per_page: u32,
    /// Attribute projection. `None` retrieves every attribute.
    pub attributes: Option<Vec<String>>,
    pub sort: Option<SortKey>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            filters: FilterSpec::new(),
            page: 0,
            hits_per_page: 20,
            attributes: None,
            sort: None,
        }
    }
}

/// A fully resolved request, built fresh for every call.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub logical_index: String,
    pub physical_index: String,
    pub term: String,
    /// Compiled filter expression; `None` means "no filter".
    pub filters: Option<String>,
    pub page: u32,
    pub hits_per_page: u32,
    pub attributes: Option<Vec<String>>,
    pub sort: Option<SortKey>,
}

impl QueryRequest {
    /// Encode the search parameters as the URL-encoded blob the service expects
    /// inside its JSON envelope.
    pub fn to_params(&self) -> String {
        let mut pairs: Vec<(&str, String)> = vec![
            ("query", self.term.clone()),
            ("page", self.page.to_string()),
            ("hitsPerPage", self.hits_per_page.to_string()),
        ];
        if let Some(ref filters) = self.filters {
            pairs.push(("filters", filters.clone()));
        }
        if let Some(ref attrs) = self.attributes {
            pairs.push(("attributesToRetrieve", attrs.join(",")));
        }

        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Which record shape a logical index holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Shop,
    Product,
    Order,
    Generic,
}

/// A shop (vendor storefront) record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopHit {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A product listing record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductHit {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub shop_id: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub in_stock: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An order ledger record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHit {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(default)]
    pub shop_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total: Option<f64>,
    /// Creation time in epoch milliseconds.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderHit {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

/// A record from an index with no dedicated shape.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GenericHit {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A search hit, validated against the record kind of its index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Hit {
    Shop(ShopHit),
    Product(ProductHit),
    Order(OrderHit),
    Generic(GenericHit),
}

impl Hit {
    /// Decode a raw hit object as the given record kind.
    pub fn decode(kind: RecordKind, raw: Value) -> Result<Hit, serde_json::Error> {
        Ok(match kind {
            RecordKind::Shop => Hit::Shop(serde_json::from_value(raw)?),
            RecordKind::Product => Hit::Product(serde_json::from_value(raw)?),
            RecordKind::Order => Hit::Order(serde_json::from_value(raw)?),
            RecordKind::Generic => Hit::Generic(serde_json::from_value(raw)?),
        })
    }

    pub fn object_id(&self) -> &str {
        match self {
            Hit::Shop(h) => &h.object_id,
            Hit::Product(h) => &h.object_id,
            Hit::Order(h) => &h.object_id,
            Hit::Generic(h) => &h.object_id,
        }
    }

    /// Human-readable label for listings.
    pub fn label(&self) -> String {
        match self {
            Hit::Shop(h) => h.name.clone().unwrap_or_else(|| "(unnamed shop)".into()),
            Hit::Product(h) => match (h.name.as_deref(), h.price) {
                (Some(name), Some(price)) => format!("{} ({:.2})", name, price),
                (Some(name), None) => name.to_string(),
                (None, _) => "(unnamed product)".into(),
            },
            Hit::Order(h) => format!(
                "order {} [{}]",
                h.object_id,
                h.status.as_deref().unwrap_or("unknown")
            ),
            Hit::Generic(h) => h
                .fields
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(&h.object_id)
                .to_string(),
        }
    }
}

/// Wire shape of the search service's response body.
#[derive(Debug, Deserialize)]
pub(crate) struct RawResponse {
    pub hits: Vec<Value>,
    #[serde(rename = "nbHits", default)]
    pub nb_hits: u64,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(rename = "nbPages", default)]
    pub nb_pages: u32,
    #[serde(rename = "hitsPerPage", default)]
    pub hits_per_page: Option<u32>,
    #[serde(rename = "processingTimeMS", default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub query: Option<String>,
}

/// A search result as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<Hit>,
    pub total_hits: u64,
    pub page: u32,
    pub total_pages: u32,
    pub hits_per_page: u32,
    pub query: String,
    pub processing_time_ms: u64,
}

impl SearchResponse {
    /// The degraded-empty result: zero hits, request parameters echoed back.
    pub fn empty(query: &str, page: u32, hits_per_page: u32) -> Self {
        Self {
            hits: Vec::new(),
            total_hits: 0,
            page,
            total_pages: 0,
            hits_per_page,
            query: query.to_string(),
            processing_time_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}
