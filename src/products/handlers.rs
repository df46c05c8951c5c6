use axum::{
    extract::{
        multipart::MultipartRejection, rejection::QueryRejection, DefaultBodyLimit, Multipart,
        Query, State,
    },
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tracing::{info, instrument};

use crate::{
    auth::extractors::{require_auth, AuthUser},
    error::AppError,
    images::services::{discard_image, read_single_image, store_image},
    payload::Payload,
    products::{
        dto::{CreateProductRequest, IdQuery, Pagination, UpdateProductRequest},
        repo_types::{Mutation, NewProduct, Product},
    },
    response::{ApiResponse, ApiResult},
    state::AppState,
};

const UNKNOWN_PRODUCT: &str = "Product ID Tidak Ditemukan";
const NOT_OWNER: &str = "Anda tidak memiliki akses ke product ini";

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/getAll", get(list_products))
        .route("/add", post(create_product))
        .route("/search", get(get_product))
        .route("/update", patch(update_product))
        .route("/delete", delete(delete_product))
        .route(
            "/updateProductImage",
            patch(update_product_image)
                .layer(DefaultBodyLimit::max(state.config.upload.max_bytes)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

fn query<T>(q: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    q.map(|Query(v)| v)
        .map_err(|e| AppError::Validation(e.body_text()))
}

/// Turns a write that matched nothing into the matching client error.
fn applied<T>(outcome: Mutation<T>) -> Result<T, AppError> {
    match outcome {
        Mutation::Applied(v) => Ok(v),
        Mutation::NotFound => Err(AppError::UnknownId(UNKNOWN_PRODUCT.into())),
        Mutation::NotOwner => Err(AppError::Forbidden(NOT_OWNER.into())),
    }
}

#[instrument(skip(state, identity, q), fields(user_id = identity.user_id))]
pub async fn list_products(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    q: Result<Query<Pagination>, QueryRejection>,
) -> ApiResult<Vec<Product>> {
    let page = query(q)?.resolve()?;
    let products = state.products.list(identity.user_id, page).await?;
    Ok(ApiResponse::ok("Success Get All Products", products))
}

#[instrument(skip(state, identity, payload), fields(user_id = identity.user_id))]
pub async fn create_product(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Payload(payload): Payload<CreateProductRequest>,
) -> ApiResult<Product> {
    let (name, qty, description) = payload.validate()?;

    let product = state
        .products
        .create(&NewProduct {
            user_id: identity.user_id,
            name,
            qty,
            description,
        })
        .await?;

    info!(product_id = product.id, "product created");
    Ok(ApiResponse::ok("Berhasil menambahkan product", product))
}

#[instrument(skip(state, identity, q), fields(user_id = identity.user_id))]
pub async fn get_product(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    q: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Product> {
    let id = query(q)?.require()?;
    let product = state
        .products
        .find(identity.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product tidak ditemukan".into()))?;
    Ok(ApiResponse::ok("Success Get Product", product))
}

#[instrument(skip(state, identity, q, payload), fields(user_id = identity.user_id))]
pub async fn update_product(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    q: Result<Query<IdQuery>, QueryRejection>,
    Payload(payload): Payload<UpdateProductRequest>,
) -> ApiResult<Product> {
    let id = query(q)?.require()?;
    let patch = payload.into_patch()?;

    let product = applied(state.products.update(identity.user_id, id, &patch).await?)?;

    if patch.is_empty() {
        return Ok(ApiResponse::ok("Tidak ada perubahan pada product", product));
    }
    info!(product_id = id, "product updated");
    Ok(ApiResponse::ok("Success Update Product", product))
}

#[instrument(skip(state, identity, q), fields(user_id = identity.user_id))]
pub async fn delete_product(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    q: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<()> {
    let id = query(q)?.require()?;
    let product = applied(state.products.delete(identity.user_id, id).await?)?;
    discard_image(&state, product.product_image.as_deref()).await;

    info!(product_id = id, "product deleted");
    Ok(ApiResponse::message("Delete Produk berhasil"))
}

#[instrument(skip(state, identity, q, mp), fields(user_id = identity.user_id))]
pub async fn update_product_image(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    q: Result<Query<IdQuery>, QueryRejection>,
    mp: Result<Multipart, MultipartRejection>,
) -> ApiResult<Product> {
    let id = query(q)?.require()?;
    let image = read_single_image(mp).await?;
    let file_name = store_image(&state, image).await?;

    let outcome = state
        .products
        .replace_image(identity.user_id, id, &file_name)
        .await;
    let swapped = match outcome.map_err(AppError::from).and_then(applied) {
        Ok(swapped) => swapped,
        Err(e) => {
            discard_image(&state, Some(&file_name)).await;
            return Err(e);
        }
    };

    if swapped.previous_image.as_deref() != Some(file_name.as_str()) {
        discard_image(&state, swapped.previous_image.as_deref()).await;
    }

    info!(product_id = id, file_name = %file_name, "product image updated");
    Ok(ApiResponse::ok("Update Product Image berhasil", swapped.product))
}
