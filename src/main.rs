//! Aura Storefront - storefront and admin backend

use anyhow::Result;
use aura_storefront::application::{InventoryUpdate, NewBundle, NewProduct, ProductUpdate};
use aura_storefront::config::{ShopConfig, EVENT_SUBJECT_PREFIX};
use aura_storefront::domain::aggregates::{CartLine, DeliveryInfo, PricingMode};
use aura_storefront::domain::value_objects::{LineKey, Money, RewardCode, MAX_PRICE};
use aura_storefront::infrastructure::{
    EventPublisher, InMemoryRepository, NatsPublisher, NoopPublisher, PgRepository, ShopRepository,
};
use aura_storefront::{Cart, CartSummary, CheckoutRequest, LoyaltyProgram, LoyaltyStatus, Order, Product, ResolvedLine, ShopError, ShopService};
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Clone)] pub struct AppState { pub shop: Arc<ShopService> }

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = ShopConfig::from_env();

    let repo: Arc<dyn ShopRepository> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(config.database_max_connections).connect(url).await?;
            let repo = PgRepository::new(pool);
            repo.migrate().await?;
            Arc::new(repo)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory repository");
            Arc::new(InMemoryRepository::new())
        }
    };
    let publisher: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client, EVENT_SUBJECT_PREFIX)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will not be published");
                Arc::new(NoopPublisher)
            }
        },
        None => Arc::new(NoopPublisher),
    };
    let shop = ShopService::load(repo, publisher, config.seed_program()?, config.service_settings()).await?;
    let app = router(AppState { shop: Arc::new(shop) });

    tracing::info!("🔥 Aura Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "aura-storefront"})) }))
        .route("/api/v1/catalog", get(list_catalog))
        .route("/api/v1/catalog/lines/:key", get(resolve_line))
        .route("/api/v1/products", post(add_product))
        .route("/api/v1/bundles", post(create_bundle))
        .route("/api/v1/products/:id", get(get_product).put(update_product).delete(delete_product))
        .route("/api/v1/products/:id/promotion", post(toggle_promotion))
        .route("/api/v1/inventory", post(apply_inventory))
        .route("/api/v1/cart/summary", post(cart_summary))
        .route("/api/v1/cart/add", post(cart_add))
        .route("/api/v1/cart/remove", post(cart_remove))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order).delete(delete_order))
        .route("/api/v1/orders/:id/toggle", post(toggle_order))
        .route("/api/v1/orders/:id/completion", put(set_completion))
        .route("/api/v1/loyalty/:owner", get(loyalty_status))
        .route("/api/v1/loyalty/:owner/tiers/:tier/claim", post(claim_tier))
        .route("/api/v1/loyalty/:owner/tiers/:tier/reject", post(reject_tier))
        .route("/api/v1/loyalty-program", get(get_program).put(replace_program))
        .route("/api/v1/loyalty-program/reload", post(reload_program))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn status_for(e: &ShopError) -> StatusCode {
    match e {
        ShopError::ProductNotFound(_) | ShopError::OrderNotFound(_) | ShopError::TierNotFound(_) => StatusCode::NOT_FOUND,
        ShopError::InsufficientStock { .. } | ShopError::AlreadyClaimed(_) | ShopError::InsufficientPoints { .. } | ShopError::ProductInBundle { .. } => StatusCode::CONFLICT,
        ShopError::EmptyCart | ShopError::InvalidQuantity | ShopError::InvalidProduct(_) | ShopError::InvalidProgram(_) | ShopError::AmountOverflow => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ShopError::ConcurrentModification(_) => StatusCode::SERVICE_UNAVAILABLE,
        ShopError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(e: ShopError) -> (StatusCode, String) {
    let status = status_for(&e);
    if status.is_server_error() { tracing::error!(error = %e, "Request failed"); }
    (status, e.to_string())
}

fn invalid(e: ValidationErrors) -> (StatusCode, String) { (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()) }

fn price_in_range(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() { return Err(ValidationError::new("negative_price")); }
    if *value > Decimal::from(MAX_PRICE) { return Err(ValidationError::new("price_too_high")); }
    Ok(())
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct LineBody {
    #[validate(length(min = 1, max = 128))] pub key: String,
    #[validate(range(min = 1, max = 999))] pub quantity: u32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CartBody { #[serde(default)] #[validate] pub lines: Vec<LineBody> }

impl CartBody {
    fn into_cart(self) -> Result<Cart, (StatusCode, String)> {
        self.validate().map_err(invalid)?;
        Cart::from_lines(self.lines.into_iter().map(|l| (LineKey::parse(&l.key), l.quantity)))
            .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CartEditBody {
    #[serde(default)] #[validate] pub lines: Vec<LineBody>,
    #[validate(length(min = 1, max = 128))] pub key: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutBody {
    #[validate(length(min = 1, max = 64))] pub owner_id: String,
    #[serde(default)] #[validate] pub lines: Vec<LineBody>,
    pub delivery: Option<DeliveryInfo>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductBody {
    #[validate(length(min = 1, max = 120))] pub name: String,
    pub description: Option<String>,
    pub pricing: PricingMode,
    pub display_order: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BundleBody {
    #[validate(length(min = 1, max = 120))] pub name: String,
    pub description: Option<String>,
    pub components: BTreeMap<String, u32>,
    #[validate(custom = "price_in_range")] pub price: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductUpdateBody {
    #[validate(length(min = 1, max = 120))] pub name: String,
    pub description: Option<String>,
    #[validate(custom = "price_in_range")] pub price: Option<Decimal>,
    pub stock: Option<u32>,
}

#[derive(Debug, Deserialize)] pub struct CompletionBody { pub completed: bool }
#[derive(Debug, Deserialize)] pub struct OrdersQuery { pub owner_id: Option<String> }
#[derive(Debug, Serialize)] pub struct CartResponse { pub lines: Vec<CartLine>, pub changed: bool, pub summary: CartSummary }
#[derive(Debug, Serialize)] pub struct ClaimResponse { pub tier: u32, pub code: RewardCode }
#[derive(Debug, Serialize)] pub struct UpdatedResponse { pub updated: usize }
#[derive(Debug, Serialize)] pub struct PromotionResponse { pub promotion: bool }

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

async fn list_catalog(State(s): State<AppState>) -> ApiResult<Vec<Product>> {
    Ok(Json(s.shop.list_catalog().await.map_err(reject)?))
}

async fn resolve_line(State(s): State<AppState>, Path(key): Path<String>) -> ApiResult<ResolvedLine> {
    Ok(Json(s.shop.resolve_cart_line(&key).await.map_err(reject)?))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Product> {
    Ok(Json(s.shop.get_product(&id).await.map_err(reject)?))
}

async fn add_product(State(s): State<AppState>, Json(body): Json<ProductBody>) -> Result<(StatusCode, Json<Product>), (StatusCode, String)> {
    body.validate().map_err(invalid)?;
    let new = NewProduct { name: body.name, description: body.description, pricing: body.pricing, display_order: body.display_order };
    Ok((StatusCode::CREATED, Json(s.shop.add_product(new).await.map_err(reject)?)))
}

async fn create_bundle(State(s): State<AppState>, Json(body): Json<BundleBody>) -> Result<(StatusCode, Json<Product>), (StatusCode, String)> {
    body.validate().map_err(invalid)?;
    let bundle = NewBundle { name: body.name, description: body.description, components: body.components, price: Money::new(body.price) };
    Ok((StatusCode::CREATED, Json(s.shop.create_bundle(bundle).await.map_err(reject)?)))
}

async fn update_product(State(s): State<AppState>, Path(id): Path<String>, Json(body): Json<ProductUpdateBody>) -> ApiResult<Product> {
    body.validate().map_err(invalid)?;
    let update = ProductUpdate { name: body.name, description: body.description, price: body.price.map(Money::new), stock: body.stock };
    Ok(Json(s.shop.update_product(&id, update).await.map_err(reject)?))
}

async fn delete_product(State(s): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, (StatusCode, String)> {
    s.shop.delete_product(&id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_promotion(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<PromotionResponse> {
    Ok(Json(PromotionResponse { promotion: s.shop.toggle_promotion(&id).await.map_err(reject)? }))
}

async fn apply_inventory(State(s): State<AppState>, Json(body): Json<InventoryUpdate>) -> ApiResult<UpdatedResponse> {
    Ok(Json(UpdatedResponse { updated: s.shop.apply_inventory_update(body).await.map_err(reject)? }))
}

// ---------------------------------------------------------------------------
// Cart and checkout
// ---------------------------------------------------------------------------

async fn cart_summary(State(s): State<AppState>, Json(body): Json<CartBody>) -> ApiResult<CartSummary> {
    let cart = body.into_cart()?;
    Ok(Json(s.shop.cart_summary(&cart).await.map_err(reject)?))
}

async fn cart_add(State(s): State<AppState>, Json(body): Json<CartEditBody>) -> ApiResult<CartResponse> {
    body.validate().map_err(invalid)?;
    let mut cart = CartBody { lines: body.lines }.into_cart()?;
    let changed = s.shop.add_to_cart(&mut cart, &body.key).await.map_err(reject)?;
    let summary = s.shop.cart_summary(&cart).await.map_err(reject)?;
    Ok(Json(CartResponse { lines: cart.items().to_vec(), changed, summary }))
}

async fn cart_remove(State(s): State<AppState>, Json(body): Json<CartEditBody>) -> ApiResult<CartResponse> {
    body.validate().map_err(invalid)?;
    let mut cart = CartBody { lines: body.lines }.into_cart()?;
    s.shop.remove_from_cart(&mut cart, &body.key).map_err(reject)?;
    let summary = s.shop.cart_summary(&cart).await.map_err(reject)?;
    Ok(Json(CartResponse { lines: cart.items().to_vec(), changed: true, summary }))
}

async fn checkout(State(s): State<AppState>, Json(body): Json<CheckoutBody>) -> Result<(StatusCode, Json<Order>), (StatusCode, String)> {
    body.validate().map_err(invalid)?;
    let cart = CartBody { lines: body.lines }.into_cart()?;
    let request = CheckoutRequest { owner_id: body.owner_id, cart, delivery: body.delivery };
    Ok((StatusCode::CREATED, Json(s.shop.checkout(request).await.map_err(reject)?)))
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

async fn list_orders(State(s): State<AppState>, Query(q): Query<OrdersQuery>) -> ApiResult<Vec<Order>> {
    Ok(Json(s.shop.list_orders(q.owner_id.as_deref()).await.map_err(reject)?))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Order> {
    Ok(Json(s.shop.get_order(&id).await.map_err(reject)?))
}

async fn delete_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Order> {
    Ok(Json(s.shop.delete_order(&id).await.map_err(reject)?))
}

async fn toggle_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Order> {
    Ok(Json(s.shop.toggle_order_completion(&id).await.map_err(reject)?))
}

async fn set_completion(State(s): State<AppState>, Path(id): Path<String>, Json(body): Json<CompletionBody>) -> ApiResult<Order> {
    Ok(Json(s.shop.set_order_completion(&id, body.completed).await.map_err(reject)?))
}

// ---------------------------------------------------------------------------
// Loyalty
// ---------------------------------------------------------------------------

async fn loyalty_status(State(s): State<AppState>, Path(owner): Path<String>) -> ApiResult<LoyaltyStatus> {
    Ok(Json(s.shop.loyalty_status(&owner).await.map_err(reject)?))
}

async fn claim_tier(State(s): State<AppState>, Path((owner, tier)): Path<(String, u32)>) -> ApiResult<ClaimResponse> {
    let code = s.shop.claim_tier(&owner, tier).await.map_err(reject)?;
    Ok(Json(ClaimResponse { tier, code }))
}

async fn reject_tier(State(s): State<AppState>, Path((owner, tier)): Path<(String, u32)>) -> ApiResult<LoyaltyStatus> {
    Ok(Json(s.shop.reject_tier(&owner, tier).await.map_err(reject)?))
}

async fn get_program(State(s): State<AppState>) -> ApiResult<LoyaltyProgram> {
    Ok(Json(s.shop.program().await.as_ref().clone()))
}

async fn replace_program(State(s): State<AppState>, Json(program): Json<LoyaltyProgram>) -> ApiResult<LoyaltyProgram> {
    s.shop.replace_program(program).await.map_err(reject)?;
    Ok(Json(s.shop.program().await.as_ref().clone()))
}

async fn reload_program(State(s): State<AppState>) -> ApiResult<LoyaltyProgram> {
    Ok(Json(s.shop.reload_program().await.map_err(reject)?.as_ref().clone()))
}
