use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;

use stockroom_core::{ProductId, TransactionId, UserId};
use stockroom_infra::store::{Pagination, TransactionFilter};
use stockroom_infra::{DeleteMovement, RecordMovement, UpdateMovement};
use stockroom_stock::{DateRange, MovementClass};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            get(list_transactions)
                .post(record_transaction)
                .put(update_transaction)
                .delete(delete_transaction),
        )
        .route("/available", get(available_quantity))
        .route("/:id", get(get_transaction))
}

pub async fn record_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::RecordMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(v) => v,
        Err(e) => return errors::json_rejection(e),
    };
    let product_id: ProductId = match dto::parse_id(&body.product_id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let actor: UserId = match dto::parse_id(&body.created_by_id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let cmd = RecordMovement {
        product_id,
        kind: body.kind,
        quantity: body.quantity,
        actor,
        description: body.description,
    };

    match services.engine.record_movement(cmd).await {
        Ok(out) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Stock movement recorded successfully",
                "product": dto::product_to_json(&out.product),
                "transaction": dto::transaction_to_json(&out.transaction),
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn update_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::UpdateMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(v) => v,
        Err(e) => return errors::json_rejection(e),
    };
    let id: TransactionId = match dto::parse_id(&body.id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let actor: UserId = match dto::parse_id(&body.last_updated_by_id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let cmd = UpdateMovement {
        id,
        quantity: body.quantity,
        actor,
        description: body.description,
    };

    match services.engine.update_movement(cmd).await {
        Ok(out) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Stock movement updated successfully",
                "product": dto::product_to_json(&out.product),
                "transaction": dto::transaction_to_json(&out.transaction),
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::DeleteMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(v) => v,
        Err(e) => return errors::json_rejection(e),
    };
    let id: TransactionId = match dto::parse_id(&body.id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let actor: Option<UserId> = match dto::parse_optional_id(body.last_updated_by_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine.delete_movement(DeleteMovement { id, actor }).await {
        Ok(product) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": "Stock movement deleted successfully",
                "product": dto::product_to_json(&product),
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::TransactionListQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(q) = match query {
        Ok(v) => v,
        Err(e) => return errors::query_rejection(e),
    };
    let filter = match transaction_filter(&q) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let pagination = match Pagination::new(q.page, q.limit, services.default_page_size) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine.list_movements(&filter, pagination).await {
        Ok(page) => Json(serde_json::json!({
            "message": "Transactions retrieved successfully",
            "transactions": page.items.iter().map(dto::transaction_to_json).collect::<Vec<_>>(),
            "currentPage": page.pagination.page,
            "totalPages": page.total_pages(),
            "totalTransactions": page.total,
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

fn transaction_filter(
    q: &dto::TransactionListQuery,
) -> stockroom_core::DomainResult<TransactionFilter> {
    Ok(TransactionFilter {
        product_id: dto::parse_optional_id(q.product_id.as_deref())?,
        types: dto::parse_types(q.kind.as_deref())?,
        created_by: dto::parse_optional_id(q.created_by_id.as_deref())?,
        last_updated_by: dto::parse_optional_id(q.last_updated_by_id.as_deref())?,
        search: q.search.clone(),
        range: dto::parse_range(q.start_date.as_deref(), q.end_date.as_deref())?,
    })
}

pub async fn get_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TransactionId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine.get_movement(id).await {
        Ok(tx) => Json(dto::transaction_to_json(&tx)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Unreturned quantity for a movement class. Without dates the window is the
/// current UTC day.
pub async fn available_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::AvailableQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(q) = match query {
        Ok(v) => v,
        Err(e) => return errors::query_rejection(e),
    };
    let product_id: ProductId = match dto::parse_id(&q.product_id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let class: MovementClass = match q.class.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let range = if q.start_date.is_none() && q.end_date.is_none() {
        DateRange::day(Utc::now().date_naive())
    } else {
        match dto::parse_range(q.start_date.as_deref(), q.end_date.as_deref()) {
            Ok(v) => v,
            Err(e) => return errors::domain_error_to_response(e),
        }
    };

    match services.engine.available_quantity(product_id, class, range).await {
        Ok(quantity) => Json(serde_json::json!({
            "productId": product_id.to_string(),
            "class": class.as_str(),
            "availableQuantity": quantity,
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
