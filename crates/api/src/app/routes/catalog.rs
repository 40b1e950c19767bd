//! Category and unit endpoints. Both are plain named lookups with the same
//! shape, so they share this file.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use stockroom_core::{CategoryId, UnitId};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn categories_router() -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", put(rename_category).get(get_category).delete(delete_category))
}

pub fn units_router() -> Router {
    Router::new()
        .route("/", get(list_units).post(create_unit))
        .route("/:id", put(rename_unit).get(get_unit).delete(delete_unit))
}

// ---- categories ----

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.catalog.list_categories().await {
        Ok(items) => Json(serde_json::json!({
            "categories": items.iter().map(dto::category_to_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CategoryId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.catalog.get_category(id).await {
        Ok(c) => Json(dto::category_to_json(&c)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::NameRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(v) => v,
        Err(e) => return errors::json_rejection(e),
    };
    match services.catalog.create_category(&body.name).await {
        Ok(c) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Category created successfully",
                "category": dto::category_to_json(&c),
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn rename_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    payload: Result<Json<dto::NameRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(v) => v,
        Err(e) => return errors::json_rejection(e),
    };
    let id: CategoryId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.catalog.rename_category(id, &body.name).await {
        Ok(c) => Json(serde_json::json!({
            "message": "Category updated successfully",
            "category": dto::category_to_json(&c),
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_category(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CategoryId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.catalog.delete_category(id).await {
        Ok(()) => Json(serde_json::json!({"message": "Category deleted successfully"})).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

// ---- units ----

pub async fn list_units(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.catalog.list_units().await {
        Ok(items) => Json(serde_json::json!({
            "units": items.iter().map(dto::unit_to_json).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UnitId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.catalog.get_unit(id).await {
        Ok(u) => Json(dto::unit_to_json(&u)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn create_unit(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::NameRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(v) => v,
        Err(e) => return errors::json_rejection(e),
    };
    match services.catalog.create_unit(&body.name).await {
        Ok(u) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "message": "Unit created successfully",
                "unit": dto::unit_to_json(&u),
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn rename_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    payload: Result<Json<dto::NameRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(v) => v,
        Err(e) => return errors::json_rejection(e),
    };
    let id: UnitId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.catalog.rename_unit(id, &body.name).await {
        Ok(u) => Json(serde_json::json!({
            "message": "Unit updated successfully",
            "unit": dto::unit_to_json(&u),
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn delete_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: UnitId = match dto::parse_id(&id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.catalog.delete_unit(id).await {
        Ok(()) => Json(serde_json::json!({"message": "Unit deleted successfully"})).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
