//! Product catalog: categories, products, barcode lookup and the stock
//! adjustment used by the checkout flow.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{Category, Product};
use crate::AppState;

use super::auth::AuthUser;
use super::error::ApiError;
use super::validation;

#[derive(Debug, Default, Deserialize)]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    pub category_id: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category_id: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryRequest {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockAdjustment {
    pub code: Option<String>,
    /// Signed stock delta; sales send negative values.
    #[serde(default)]
    pub delta: i64,
}

fn can_modify(auth: &AuthUser, product: &Product) -> bool {
    auth.role.is_admin() || auth.user_id == product.user_id
}

/// GET /api/productos
pub async fn list_products(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products: Vec<Product> = sqlx::query_as("SELECT * FROM products ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(products))
}

/// GET /api/productos/:id
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE product_id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    product
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Producto no encontrado."))
}

/// GET /api/productos/buscar/:codigo
pub async fn get_product_by_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE code = ?")
        .bind(&code)
        .fetch_optional(&state.db)
        .await?;
    product
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Producto no encontrado."))
}

/// POST /api/productos
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let name = req.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ApiError::validation("El nombre del producto es obligatorio."));
    }
    validation::validate_price(req.price).map_err(ApiError::validation)?;
    validation::validate_stock(req.stock).map_err(ApiError::validation)?;

    let product_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO products (product_id, user_id, category_id, code, name, description, price, stock, image, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&product_id)
    .bind(&auth.user_id)
    .bind(&req.category_id)
    .bind(&req.code)
    .bind(&name)
    .bind(&req.description)
    .bind(req.price)
    .bind(req.stock)
    .bind(&req.image)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let product: Product = sqlx::query_as("SELECT * FROM products WHERE product_id = ?")
        .bind(&product_id)
        .fetch_one(&state.db)
        .await?;

    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/productos/:id
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE product_id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    let product = product.ok_or_else(|| ApiError::not_found("Producto no encontrado."))?;

    if !can_modify(&auth, &product) {
        return Err(ApiError::authorization(
            "No tienes permiso para modificar este producto.",
        ));
    }
    if let Some(price) = req.price {
        validation::validate_price(price).map_err(ApiError::validation)?;
    }
    if let Some(stock) = req.stock {
        validation::validate_stock(stock).map_err(ApiError::validation)?;
    }

    sqlx::query(
        "UPDATE products
         SET name = COALESCE(?, name),
             code = COALESCE(?, code),
             description = COALESCE(?, description),
             price = COALESCE(?, price),
             stock = COALESCE(?, stock),
             category_id = COALESCE(?, category_id),
             image = COALESCE(?, image),
             updated_at = ?
         WHERE product_id = ?",
    )
    .bind(&req.name)
    .bind(&req.code)
    .bind(&req.description)
    .bind(req.price)
    .bind(req.stock)
    .bind(&req.category_id)
    .bind(&req.image)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let product: Product = sqlx::query_as("SELECT * FROM products WHERE product_id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(product))
}

/// DELETE /api/productos/:id
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE product_id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?;
    let product = product.ok_or_else(|| ApiError::not_found("Producto no encontrado."))?;

    if !can_modify(&auth, &product) {
        return Err(ApiError::authorization(
            "No tienes permiso para eliminar este producto.",
        ));
    }

    sqlx::query("DELETE FROM products WHERE product_id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    Ok(Json(json!({ "message": "Producto eliminado exitosamente." })))
}

/// Stock adjustment by barcode, used by the checkout flow. Stock never
/// goes below zero.
///
/// PUT /api/productos/actualizar-stock
pub async fn update_stock(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StockAdjustment>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let code = req.code.unwrap_or_default();
    if code.is_empty() {
        return Err(ApiError::validation("El código del producto es obligatorio."));
    }

    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE code = ?")
        .bind(&code)
        .fetch_optional(&state.db)
        .await?;
    let product = product.ok_or_else(|| ApiError::not_found("Producto no encontrado."))?;

    let new_stock = (product.stock + req.delta).max(0);
    sqlx::query("UPDATE products SET stock = ?, updated_at = ? WHERE product_id = ?")
        .bind(new_stock)
        .bind(Utc::now().to_rfc3339())
        .bind(&product.product_id)
        .execute(&state.db)
        .await?;

    Ok(Json(
        json!({ "message": "Stock actualizado correctamente.", "stock": new_stock }),
    ))
}

/// GET /api/productos/categorias
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let categories: Vec<Category> = sqlx::query_as("SELECT * FROM categories ORDER BY name")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(categories))
}

/// POST /api/productos/categorias
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let name = req.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ApiError::validation("El nombre de la categoría es obligatorio."));
    }

    let category_id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO categories (category_id, name, created_at) VALUES (?, ?, ?)")
        .bind(&category_id)
        .bind(name.trim())
        .bind(Utc::now().to_rfc3339())
        .execute(&state.db)
        .await
        .map_err(|e| match ApiError::from(e) {
            err if err.code() == super::error::ErrorCode::Conflict => {
                ApiError::conflict("La categoría ya existe.")
            }
            err => err,
        })?;

    let category: Category = sqlx::query_as("SELECT * FROM categories WHERE category_id = ?")
        .bind(&category_id)
        .fetch_one(&state.db)
        .await?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/productos/categorias/:id
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    let name = req.name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ApiError::validation("El nombre de la categoría es obligatorio."));
    }

    let result = sqlx::query("UPDATE categories SET name = ? WHERE category_id = ?")
        .bind(name.trim())
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Categoría no encontrada."));
    }

    let category: Category = sqlx::query_as("SELECT * FROM categories WHERE category_id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(category))
}

/// DELETE /api/productos/categorias/:id
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = sqlx::query("DELETE FROM categories WHERE category_id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Categoría no encontrada."));
    }

    Ok(Json(json!({ "message": "Categoría eliminada exitosamente." })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorCode;
    use crate::api::testing;
    use crate::db::Role;

    async fn seed_product(state: &Arc<AppState>, owner: &AuthUser, code: &str, stock: i64) -> Product {
        let (_, product) = create_product(
            State(state.clone()),
            Extension(owner.clone()),
            Json(CreateProductRequest {
                name: Some("Café 500g".to_string()),
                code: Some(code.to_string()),
                price: 12.5,
                stock,
                ..Default::default()
            }),
        )
        .await
        .unwrap();
        product.0
    }

    #[tokio::test]
    async fn test_create_and_fetch_by_code() {
        let state = testing::state().await;
        let owner = testing::create_user(&state, "Ana", "a@x.com", Role::User).await;
        seed_product(&state, &owner, "7701234", 10).await;

        let found = get_product_by_code(State(state.clone()), Path("7701234".to_string()))
            .await
            .unwrap();
        assert_eq!(found.stock, 10);

        let err = get_product_by_code(State(state), Path("0000000".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_stock_never_goes_negative() {
        let state = testing::state().await;
        let owner = testing::create_user(&state, "Ana", "a@x.com", Role::User).await;
        seed_product(&state, &owner, "7701234", 3).await;

        let res = update_stock(
            State(state.clone()),
            Json(StockAdjustment {
                code: Some("7701234".to_string()),
                delta: -10,
            }),
        )
        .await
        .unwrap();
        assert_eq!(res.get("stock").and_then(|v| v.as_i64()), Some(0));
    }

    #[tokio::test]
    async fn test_only_owner_or_admin_modifies() {
        let state = testing::state().await;
        let owner = testing::create_user(&state, "Ana", "a@x.com", Role::User).await;
        let other = testing::create_user(&state, "Eva", "e@x.com", Role::User).await;
        let admin = testing::create_user(&state, "Root", "r@x.com", Role::Admin).await;
        let product = seed_product(&state, &owner, "7701234", 3).await;

        let err = delete_product(
            State(state.clone()),
            Extension(other),
            Path(product.product_id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Authorization);

        delete_product(
            State(state),
            Extension(admin),
            Path(product.product_id),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_category_conflicts() {
        let state = testing::state().await;
        let req = || CategoryRequest {
            name: Some("Bebidas".to_string()),
        };

        create_category(State(state.clone()), Json(req())).await.unwrap();
        let err = create_category(State(state), Json(req())).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.message(), "La categoría ya existe.");
    }

    #[tokio::test]
    async fn test_create_product_rejects_negative_price() {
        let state = testing::state().await;
        let owner = testing::create_user(&state, "Ana", "a@x.com", Role::User).await;

        let err = create_product(
            State(state),
            Extension(owner),
            Json(CreateProductRequest {
                name: Some("Café".to_string()),
                price: -1.0,
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
    }
}
