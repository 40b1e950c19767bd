use axum::Router;

pub mod catalog;
pub mod products;
pub mod system;
pub mod transactions;

/// Router for every stock and catalog endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/transactions", transactions::router())
        .nest("/products", products::router())
        .nest("/categories", catalog::categories_router())
        .nest("/units", catalog::units_router())
}
