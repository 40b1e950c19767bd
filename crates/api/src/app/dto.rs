use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use stockroom_core::{DomainError, DomainResult};
use stockroom_stock::{
    AuditReport, Category, Counters, DateRange, Product, Transaction, TransactionType, Unit,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMovementRequest {
    pub product_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub quantity: i64,
    pub created_by_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMovementRequest {
    pub id: String,
    pub quantity: i64,
    pub last_updated_by_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMovementRequest {
    pub id: String,
    pub last_updated_by_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListQuery {
    pub product_id: Option<String>,
    /// Comma-separated list of types.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub created_by_id: Option<String>,
    pub last_updated_by_id: Option<String>,
    pub search: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableQuery {
    pub product_id: String,
    pub class: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub category_id: String,
    pub unit_id: String,
    #[serde(default)]
    pub quantity_in_store: i64,
    #[serde(default)]
    pub quantity_in_market: i64,
    pub quantity_in_stock: Option<i64>,
    pub price: Option<i64>,
    pub wholesale_price: Option<i64>,
    pub pieces_no: Option<i32>,
    pub created_by_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub unit_id: Option<String>,
    pub quantity_in_store: Option<i64>,
    pub quantity_in_market: Option<i64>,
    pub quantity_in_stock: Option<i64>,
    pub price: Option<i64>,
    pub wholesale_price: Option<i64>,
    pub pieces_no: Option<i32>,
    pub last_updated_by_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    pub category_id: Option<String>,
    pub unit_id: Option<String>,
    pub created_by_id: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id<T>(raw: &str) -> DomainResult<T>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse()
}

pub fn parse_optional_id<T>(raw: Option<&str>) -> DomainResult<Option<T>>
where
    T: FromStr<Err = DomainError>,
{
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_id)
        .transpose()
}

/// `"storeIn,marketOut"` → types. Blank input means no type filter.
pub fn parse_types(raw: Option<&str>) -> DomainResult<Vec<TransactionType>> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(TransactionType::from_str)
        .collect()
}

/// RFC 3339 timestamp, or a `YYYY-MM-DD` date taken as the start (or end)
/// of that UTC day.
pub fn parse_date_bound(raw: &str, end_of_day: bool) -> DomainResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        DomainError::invalid_argument(format!(
            "invalid date '{raw}': expected RFC 3339 or YYYY-MM-DD"
        ))
    })?;
    let day = DateRange::day(date);
    let bound = if end_of_day { day.end } else { day.start };
    bound.ok_or_else(|| DomainError::invalid_argument(format!("invalid date '{raw}'")))
}

pub fn parse_range(start: Option<&str>, end: Option<&str>) -> DomainResult<DateRange> {
    let start = start
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_date_bound(s, false))
        .transpose()?;
    let end = end
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_date_bound(s, true))
        .transpose()?;
    DateRange::new(start, end)
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn product_to_json(p: &Product) -> serde_json::Value {
    json!({
        "id": p.id.to_string(),
        "name": p.name,
        "description": p.description,
        "categoryId": p.category_id.to_string(),
        "unitId": p.unit_id.to_string(),
        "quantityInStock": p.quantity_in_stock(),
        "quantityInStore": p.counters.store,
        "quantityInMarket": p.counters.market,
        "openingStore": p.opening.store,
        "openingMarket": p.opening.market,
        "price": p.pricing.price,
        "wholesalePrice": p.pricing.wholesale_price,
        "piecesNo": p.pricing.pieces_no,
        "createdById": p.created_by.to_string(),
        "lastUpdatedById": p.last_updated_by.to_string(),
        "createdAt": p.created_at.to_rfc3339(),
        "updatedAt": p.updated_at.to_rfc3339(),
        "version": p.version,
    })
}

pub fn transaction_to_json(t: &Transaction) -> serde_json::Value {
    json!({
        "id": t.id.to_string(),
        "sequence": t.sequence,
        "productId": t.product_id.to_string(),
        "type": t.kind.as_str(),
        "quantity": t.quantity.get(),
        "description": t.description,
        "createdById": t.created_by.to_string(),
        "lastUpdatedById": t.last_updated_by.to_string(),
        "createdAt": t.created_at.to_rfc3339(),
        "updatedAt": t.updated_at.to_rfc3339(),
    })
}

pub fn category_to_json(c: &Category) -> serde_json::Value {
    json!({
        "id": c.id.to_string(),
        "name": c.name,
        "createdAt": c.created_at.to_rfc3339(),
    })
}

pub fn unit_to_json(u: &Unit) -> serde_json::Value {
    json!({
        "id": u.id.to_string(),
        "name": u.name,
        "createdAt": u.created_at.to_rfc3339(),
    })
}

fn counters_to_json(c: Counters) -> serde_json::Value {
    json!({
        "quantityInStore": c.store,
        "quantityInMarket": c.market,
        "quantityInStock": c.stock(),
    })
}

pub fn audit_to_json(report: &AuditReport) -> serde_json::Value {
    json!({
        "productId": report.product_id.to_string(),
        "consistent": report.is_consistent(),
        "transactionCount": report.transaction_count,
        "persisted": counters_to_json(report.persisted),
        "replayed": report.replayed.map(counters_to_json),
        "failure": report.failure.as_ref().map(|f| json!({
            "index": f.index,
            "transactionId": f.transaction_id.to_string(),
            "type": f.kind.as_str(),
            "quantity": f.quantity.get(),
            "message": f.error.to_string(),
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use stockroom_core::ProductId;

    #[test]
    fn date_bounds_cover_whole_day() {
        let start = parse_date_bound("2024-03-05", false).unwrap();
        let end = parse_date_bound("2024-03-05", true).unwrap();
        assert_eq!((start.day(), start.hour(), start.minute()), (5, 0, 0));
        assert_eq!((end.day(), end.hour(), end.minute(), end.second()), (5, 23, 59, 59));

        let ts = parse_date_bound("2024-03-05T10:30:00+02:00", false).unwrap();
        assert_eq!(ts.hour(), 8);

        assert!(parse_date_bound("05/03/2024", false).is_err());
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        assert!(parse_range(Some("2024-03-06"), Some("2024-03-05")).is_err());
        let open = parse_range(None, Some("")).unwrap();
        assert_eq!(open, DateRange::default());
    }

    #[test]
    fn types_are_comma_separated() {
        let types = parse_types(Some("storeIn, marketOut")).unwrap();
        assert_eq!(types, vec![TransactionType::StoreIn, TransactionType::MarketOut]);
        assert!(parse_types(None).unwrap().is_empty());
        assert!(matches!(
            parse_types(Some("storeIn,bogus")),
            Err(DomainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn ids_parse_or_fail_as_invalid() {
        let id = ProductId::new();
        let parsed: ProductId = parse_id(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(parse_id::<ProductId>("nope").is_err());
        assert_eq!(parse_optional_id::<ProductId>(Some("  ")).unwrap(), None);
    }
}
