use reqwest::StatusCode;
use serde_json::{json, Value};

use stockroom_api::app::{build_app, services::AppServices};
use stockroom_api::config::AppConfig;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory backend, ephemeral port.
        let app = build_app(AppServices::in_memory(&AppConfig::default()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let res = req.send().await.unwrap();
        let status = res.status();
        let body = res.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.url(path)).json(&body)).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.put(self.url(path)).json(&body)).await
    }

    async fn delete(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.delete(self.url(path)).json(&body)).await
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.client.get(self.url(path))).await
    }

    /// Category + unit + product with the given opening counters.
    async fn seed_product(&self, name: &str, store: i64, market: i64) -> String {
        let (status, category) = self.post("/categories", json!({"name": format!("{name}-cat")})).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, unit) = self.post("/units", json!({"name": format!("{name}-unit")})).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .post(
                "/products",
                json!({
                    "name": name,
                    "categoryId": category["category"]["id"],
                    "unitId": unit["unit"]["id"],
                    "quantityInStore": store,
                    "quantityInMarket": market,
                    "createdById": USER,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["product"]["id"].as_str().unwrap().to_string()
    }

    async fn record(&self, product_id: &str, kind: &str, quantity: i64) -> (StatusCode, Value) {
        self.post(
            "/transactions",
            json!({
                "productId": product_id,
                "type": kind,
                "quantity": quantity,
                "createdById": USER,
            }),
        )
        .await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

const USER: &str = "0190f5a4-7b1c-7c3e-9a51-3d2f1e0b9c11";

fn counters(product: &Value) -> (i64, i64, i64) {
    (
        product["quantityInStore"].as_i64().unwrap(),
        product["quantityInMarket"].as_i64().unwrap(),
        product["quantityInStock"].as_i64().unwrap(),
    )
}

#[tokio::test]
async fn health_reports_backend() {
    let server = TestServer::spawn().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend"], "in_memory");
}

#[tokio::test]
async fn movement_lifecycle_keeps_counters_in_step() {
    let server = TestServer::spawn().await;
    let product_id = server.seed_product("Rice", 10, 0).await;

    let (status, body) = server.record(&product_id, "storeToMarket", 4).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(counters(&body["product"]), (6, 4, 10));
    let t1 = body["transaction"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["transaction"]["type"], "storeToMarket");

    let (status, body) = server.record(&product_id, "marketOut", 6).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");

    let (status, body) = server.record(&product_id, "marketOut", 3).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counters(&body["product"]), (6, 1, 7));
    let t3 = body["transaction"]["id"].as_str().unwrap().to_string();

    // Shrinking T1 would leave the later marketOut overselling the market.
    let (status, body) = server
        .put("/transactions", json!({"id": t1, "quantity": 2, "lastUpdatedById": USER}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");
    assert!(body["message"].as_str().unwrap().contains(&t3), "{body}");

    let (_, product) = server.get(&format!("/products/{product_id}")).await;
    assert_eq!(counters(&product), (6, 1, 7));

    let (status, body) = server
        .put("/transactions", json!({"id": t1, "quantity": 5, "lastUpdatedById": USER}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(counters(&body["product"]), (5, 2, 7));
    assert_eq!(body["transaction"]["quantity"], 5);

    let (status, body) = server
        .delete("/transactions", json!({"id": t3}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(counters(&body["product"]), (5, 5, 10));

    let (status, audit) = server.get(&format!("/products/{product_id}/audit")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(audit["consistent"], true);
    assert_eq!(audit["transactionCount"], 1);
}

#[tokio::test]
async fn rejects_unknown_type_without_mutation() {
    let server = TestServer::spawn().await;
    let product_id = server.seed_product("Flour", 5, 5).await;

    let (status, body) = server.record(&product_id, "bogus", 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (status, body) = server.record(&product_id, "storeIn", 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (_, product) = server.get(&format!("/products/{product_id}")).await;
    assert_eq!(counters(&product), (5, 5, 10));
}

#[tokio::test]
async fn missing_transaction_is_not_found() {
    let server = TestServer::spawn().await;
    let (status, body) = server
        .put(
            "/transactions",
            json!({
                "id": "0190f5a4-0000-7000-8000-000000000000",
                "quantity": 1,
                "lastUpdatedById": USER,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = server
        .delete("/transactions", json!({"id": "not-a-uuid", "lastUpdatedById": USER}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_requests_use_error_body() {
    let server = TestServer::spawn().await;
    let product_id = server.seed_product("Rice", 5, 0).await;

    let (status, body) = server
        .post(
            "/transactions",
            json!({"productId": product_id, "quantity": 1, "createdById": USER}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "invalid_argument");
    assert!(body["message"].as_str().unwrap().contains("type"), "{body}");

    for quantity in [json!("3"), json!(1.5)] {
        let (status, body) = server
            .post(
                "/transactions",
                json!({
                    "productId": product_id,
                    "type": "storeOut",
                    "quantity": quantity,
                    "createdById": USER,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"], "invalid_argument");
    }

    let (status, body) = server.put("/transactions", json!({"quantity": 2})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (status, body) = server.get("/transactions?page=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (status, body) = server.post("/categories", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (_, product) = server.get(&format!("/products/{product_id}")).await;
    assert_eq!(counters(&product), (5, 0, 5));
}

#[tokio::test]
async fn delete_needs_only_the_transaction_id() {
    let server = TestServer::spawn().await;
    let product_id = server.seed_product("Beans", 0, 0).await;
    let (_, body) = server.record(&product_id, "storeIn", 4).await;
    let id = body["transaction"]["id"].as_str().unwrap().to_string();

    let (status, body) = server.delete("/transactions", json!({"id": id})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(counters(&body["product"]), (0, 0, 0));

    let (status, _) = server.get(&format!("/transactions/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server
        .delete("/transactions", json!({"id": id, "lastUpdatedById": "nope"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");
}

#[tokio::test]
async fn available_quantity_nets_returns_for_today() {
    let server = TestServer::spawn().await;
    let product_id = server.seed_product("Sugar", 0, 10).await;

    assert_eq!(server.record(&product_id, "marketOut", 4).await.0, StatusCode::OK);
    assert_eq!(server.record(&product_id, "marketReturn", 1).await.0, StatusCode::OK);

    let (status, body) = server
        .get(&format!("/transactions/available?productId={product_id}&class=salesReturn"))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["availableQuantity"], 3);
    assert_eq!(body["class"], "salesReturn");

    let (status, body) = server
        .get(&format!("/transactions/available?productId={product_id}&class=purchaseReturn"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["availableQuantity"], 0);

    let (status, _) = server
        .get(&format!("/transactions/available?productId={product_id}&class=refund"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_product_name_conflicts() {
    let server = TestServer::spawn().await;
    let _ = server.seed_product("Salt", 1, 1).await;

    let (_, categories) = server.get("/categories").await;
    let (_, units) = server.get("/units").await;
    let (status, body) = server
        .post(
            "/products",
            json!({
                "name": "Salt",
                "categoryId": categories["categories"][0]["id"],
                "unitId": units["units"][0]["id"],
                "createdById": USER,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Name already taken");
}

#[tokio::test]
async fn listing_paginates_and_filters_by_type() {
    let server = TestServer::spawn().await;
    let product_id = server.seed_product("Oil", 0, 0).await;

    for _ in 0..3 {
        assert_eq!(server.record(&product_id, "storeIn", 2).await.0, StatusCode::OK);
    }
    assert_eq!(server.record(&product_id, "storeToMarket", 1).await.0, StatusCode::OK);
    assert_eq!(server.record(&product_id, "marketOut", 1).await.0, StatusCode::OK);

    let (status, body) = server
        .get(&format!("/transactions?productId={product_id}&page=1&limit=2"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalTransactions"], 5);
    assert_eq!(body["totalPages"], 3);
    assert_eq!(body["currentPage"], 1);
    assert_eq!(body["transactions"].as_array().unwrap().len(), 2);
    // Newest first.
    assert_eq!(body["transactions"][0]["type"], "marketOut");

    let (status, body) = server
        .get(&format!("/transactions?productId={product_id}&type=storeToMarket,marketOut"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalTransactions"], 2);

    let (status, body) = server.get("/transactions?type=storeIn,nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (status, _) = server.get("/transactions?page=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn product_with_transactions_cannot_be_deleted() {
    let server = TestServer::spawn().await;
    let product_id = server.seed_product("Tea", 3, 0).await;
    assert_eq!(server.record(&product_id, "storeOut", 1).await.0, StatusCode::OK);

    let (status, body) = server.send(server.client.delete(server.url(&format!("/products/{product_id}")))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}
