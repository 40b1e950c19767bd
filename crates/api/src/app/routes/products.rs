use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockroom_core::{DomainResult, ProductId};
use stockroom_infra::store::ProductFilter;
use stockroom_stock::{NewProduct, Pricing, ProductPatch};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/:id/audit", get(audit_product))
        .route("/:id/repair", post(repair_product))
}

fn new_product(body: dto::CreateProductRequest) -> DomainResult<NewProduct> {
    Ok(NewProduct {
        category_id: dto::parse_id(&body.category_id)?,
        unit_id: dto::parse_id(&body.unit_id)?,
        created_by: dto::parse_id(&body.created_by_id)?,
        name: body.name,
        description: body.description,
        quantity_in_store: body.quantity_in_store,
        quantity_in_market: body.quantity_in_market,
        quantity_in_stock: body.quantity_in_stock,
        pricing: Pricing {
            price: body.price,
            wholesale_price: body.wholesale_price,
            pieces_no: body.pieces_no,
        },
    })
}

fn product_patch(body: dto::UpdateProductRequest) -> DomainResult<ProductPatch> {
    Ok(ProductPatch {
        category_id: dto::parse_optional_id(body.category_id.as_deref())?,
        unit_id: dto::parse_optional_id(body.unit_id.as_deref())?,
        updated_by: dto::parse_id(&body.last_updated_by_id)?,
        name: body.name,
        description: body.description,
        quantity_in_store: body.quantity_in_store,
        quantity_in_market: body.quantity_in_market,
        quantity_in_stock: body.quantity_in_stock,
        price: body.price,
        wholesale_price: body.wholesale_price,
        pieces_no: body.pieces_no,
    })
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::CreateProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(v) => v,
        Err(e) => return errors::json_rejection(e),
    };
    let new = match new_product(body) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.create_product(new).await {
        Ok(product) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Product created successfully",
                "product": dto::product_to_json(&product),
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ProductListQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(q) = match query {
        Ok(v) => v,
        Err(e) => return errors::query_rejection(e),
    };
    let filter = match product_filter(q) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.list_products(&filter).await {
        Ok(products) => Json(serde_json::json!({
            "products": products.iter().map(dto::product_to_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

fn product_filter(q: dto::ProductListQuery) -> DomainResult<ProductFilter> {
    Ok(ProductFilter {
        category_id: dto::parse_optional_id(q.category_id.as_deref())?,
        unit_id: dto::parse_optional_id(q.unit_id.as_deref())?,
        created_by: dto::parse_optional_id(q.created_by_id.as_deref())?,
        search: q.search,
    })
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.get_product(id).await {
        Ok(product) => Json(dto::product_to_json(&product)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    payload: Result<Json<dto::UpdateProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(v) => v,
        Err(e) => return errors::json_rejection(e),
    };
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let patch = match product_patch(body) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.update_product(id, patch).await {
        Ok(product) => Json(serde_json::json!({
            "message": "Product updated successfully",
            "product": dto::product_to_json(&product),
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.delete_product(id).await {
        Ok(()) => Json(serde_json::json!({"message": "Product deleted successfully"})).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn audit_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine.audit_product(id).await {
        Ok(report) => Json(dto::audit_to_json(&report)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// Rewrite the product's counters from its ledger.
pub async fn repair_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine.repair_product(id).await {
        Ok(product) => Json(serde_json::json!({
            "message": "Product counters rebuilt from ledger",
            "product": dto::product_to_json(&product),
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
