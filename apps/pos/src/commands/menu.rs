//! # Menu Commands
//!
//! Categories and products.
//!
//! ## Search Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  menu search "marg"                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  search_products(query, limit)     limit: default 20, max 100           │
//! │       │                                                                 │
//! │       ├── empty query ──► whole menu by name                            │
//! │       └── otherwise   ──► FTS5 prefix match on name and description     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Audit
//! Only price and name edits, additions and deletions of products are
//! audited. Marking a dish sold out is not. Category changes are never
//! audited.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use bistro_core::validation::{validate_name, validate_note, validate_price};
use bistro_core::{new_id, Category, Money, Permission, Product};

use crate::error::{ApiError, ApiResult};
use crate::state::{DbState, SessionState};

const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 100;

// =============================================================================
// DTOs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i64,
}

impl From<Category> for CategoryDto {
    fn from(c: Category) -> Self {
        CategoryDto {
            id: c.id,
            name: c.name,
            description: c.description,
            sort_order: c.sort_order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDto {
    pub id: String,
    pub category_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    /// `price_cents` formatted for display ("12.50").
    pub price: String,
    pub is_available: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductDto {
    fn from(p: Product) -> Self {
        ProductDto {
            price: Money::from_cents(p.price_cents).to_string(),
            id: p.id,
            category_id: p.category_id,
            name: p.name,
            description: p.description,
            price_cents: p.price_cents,
            is_available: p.is_available,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub category_id: Option<String>,
    pub description: Option<String>,
    pub price_cents: i64,
}

/// Fields left `None` are not changed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sort_order: Option<i64>,
}

// =============================================================================
// Categories
// =============================================================================

pub async fn list_categories(db: &DbState, session: &SessionState) -> ApiResult<Vec<CategoryDto>> {
    session.current().await?;
    let db = db.read().await;
    let categories = db.categories().list().await?;
    Ok(categories.into_iter().map(CategoryDto::from).collect())
}

pub async fn create_category(
    db: &DbState,
    session: &SessionState,
    name: &str,
    description: Option<&str>,
    sort_order: i64,
) -> ApiResult<CategoryDto> {
    let me = session.require(Permission::ManageMenu).await?;
    let name = validate_name("category name", name)?;
    let description = validate_note(description)?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let category = db
        .categories()
        .create(&mut uow, &name, description.as_deref(), sort_order)
        .await?;
    uow.commit().await?;

    info!(category = %category.name, "Category created");
    Ok(category.into())
}

pub async fn update_category(
    db: &DbState,
    session: &SessionState,
    id: &str,
    update: CategoryUpdate,
) -> ApiResult<CategoryDto> {
    let me = session.require(Permission::ManageMenu).await?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let mut category = db
        .categories()
        .load(&mut uow, id)
        .await?
        .filter(|c| !c.is_deleted)
        .ok_or_else(|| ApiError::not_found("Category", id))?;

    if let Some(name) = &update.name {
        category.name = validate_name("category name", name)?;
    }
    if let Some(description) = &update.description {
        category.description = validate_note(Some(description))?;
    }
    if let Some(sort_order) = update.sort_order {
        category.sort_order = sort_order;
    }

    let category = db.categories().update(&mut uow, &category).await?;
    uow.commit().await?;
    Ok(category.into())
}

/// Deletes an empty category. Products must be moved or deleted first.
pub async fn delete_category(db: &DbState, session: &SessionState, id: &str) -> ApiResult<()> {
    let me = session.require(Permission::ManageMenu).await?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let products = db.categories().count_products(&mut uow, id).await?;
    if products > 0 {
        return Err(ApiError::business(format!(
            "Category still holds {} product(s)",
            products
        )));
    }
    let category = db.categories().soft_delete(&mut uow, id).await?;
    uow.commit().await?;

    info!(category = %category.name, "Category deleted");
    Ok(())
}

// =============================================================================
// Products
// =============================================================================

/// Searches the menu by name or description prefix.
///
/// ## Arguments
/// * `query` - Search words; empty lists the whole menu
/// * `limit` - Maximum results (default: 20, max: 100)
pub async fn search_products(
    db: &DbState,
    session: &SessionState,
    query: &str,
    limit: Option<u32>,
) -> ApiResult<Vec<ProductDto>> {
    session.current().await?;
    let start = Instant::now();
    let query = query.trim();
    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);

    let db = db.read().await;
    let products = db.products().search(query, limit).await?;

    debug!(
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        count = products.len(),
        query = %query,
        "search_products complete"
    );
    Ok(products.into_iter().map(ProductDto::from).collect())
}

pub async fn list_products(
    db: &DbState,
    session: &SessionState,
    category_id: Option<&str>,
) -> ApiResult<Vec<ProductDto>> {
    session.current().await?;
    let db = db.read().await;
    let products = db.products().list(category_id).await?;
    Ok(products.into_iter().map(ProductDto::from).collect())
}

pub async fn get_product(db: &DbState, session: &SessionState, id: &str) -> ApiResult<ProductDto> {
    session.current().await?;
    let db = db.read().await;
    let product = db
        .products()
        .find(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", id))?;
    Ok(product.into())
}

pub async fn create_product(
    db: &DbState,
    session: &SessionState,
    input: NewProduct,
) -> ApiResult<ProductDto> {
    let me = session.require(Permission::ManageMenu).await?;
    let name = validate_name("product name", &input.name)?;
    let description = validate_note(input.description.as_deref())?;
    let price_cents = validate_price(input.price_cents)?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    if let Some(category_id) = &input.category_id {
        db.categories()
            .load(&mut uow, category_id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| ApiError::not_found("Category", category_id))?;
    }

    let now = Utc::now();
    let product = Product {
        id: new_id(),
        category_id: input.category_id,
        name,
        description,
        price_cents,
        is_available: true,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };
    let product = db.products().insert(&mut uow, &product).await?;
    uow.commit().await?;

    info!(product = %product.name, price = %product.price(), "Product created");
    Ok(product.into())
}

pub async fn update_product(
    db: &DbState,
    session: &SessionState,
    id: &str,
    update: ProductUpdate,
) -> ApiResult<ProductDto> {
    let me = session.require(Permission::ManageMenu).await?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let mut product = db
        .products()
        .load(&mut uow, id)
        .await?
        .filter(|p| !p.is_deleted)
        .ok_or_else(|| ApiError::not_found("Product", id))?;

    if let Some(name) = &update.name {
        product.name = validate_name("product name", name)?;
    }
    if let Some(description) = &update.description {
        product.description = validate_note(Some(description))?;
    }
    if let Some(price_cents) = update.price_cents {
        product.price_cents = validate_price(price_cents)?;
    }
    if let Some(available) = update.is_available {
        product.is_available = available;
    }
    if let Some(category_id) = update.category_id {
        db.categories()
            .load(&mut uow, &category_id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| ApiError::not_found("Category", &category_id))?;
        product.category_id = Some(category_id);
    }

    let product = db.products().update(&mut uow, &product).await?;
    uow.commit().await?;
    Ok(product.into())
}

/// Takes a product off the menu. Past orders keep showing it.
pub async fn delete_product(db: &DbState, session: &SessionState, id: &str) -> ApiResult<()> {
    let me = session.require(Permission::ManageMenu).await?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let product = db.products().soft_delete(&mut uow, id).await?;
    uow.commit().await?;

    info!(product = %product.name, "Product deleted");
    Ok(())
}

/// Removes the product row for good, deleted or not. Order lines keep
/// their name and price snapshot.
pub async fn purge_product(db: &DbState, session: &SessionState, id: &str) -> ApiResult<()> {
    let me = session.require(Permission::ManageMenu).await?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let product = db.products().hard_delete(&mut uow, id).await?;
    uow.commit().await?;

    info!(product = %product.name, by = %me.username, "Product purged");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{add_product, app, audit_actions, login_as};
    use crate::error::ErrorCode;
    use bistro_core::UserRole;

    fn pizza() -> NewProduct {
        NewProduct {
            name: "Margherita".to_string(),
            category_id: None,
            description: Some("tomato, mozzarella, basil".to_string()),
            price_cents: 1190,
        }
    }

    #[tokio::test]
    async fn test_create_and_search() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;

        let created = create_product(&app.db, &app.session, pizza()).await.unwrap();
        assert_eq!(created.price, "11.90");

        let found = search_products(&app.db, &app.session, "marg", None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, created.id);

        let by_description = search_products(&app.db, &app.session, "mozz", None).await.unwrap();
        assert_eq!(by_description.len(), 1);
    }

    #[tokio::test]
    async fn test_waiter_cannot_edit_menu() {
        let app = app().await;
        login_as(&app, "walt", UserRole::Waiter).await;

        let err = create_product(&app.db, &app.session, pizza()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        // Reading is fine.
        assert!(list_products(&app.db, &app.session, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_price_rejected() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;

        let mut input = pizza();
        input.price_cents = -5;
        let err = create_product(&app.db, &app.session, input).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_only_name_and_price_edits_are_audited() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;
        let soup = add_product(&app, "Soup", 650).await;

        let sold_out = ProductUpdate {
            is_available: Some(false),
            description: Some("of the day".to_string()),
            ..Default::default()
        };
        update_product(&app.db, &app.session, &soup.id, sold_out).await.unwrap();
        assert_eq!(audit_actions(&app, &soup.id).await, vec!["insert"]);

        let repriced = ProductUpdate {
            price_cents: Some(700),
            ..Default::default()
        };
        update_product(&app.db, &app.session, &soup.id, repriced).await.unwrap();
        assert_eq!(audit_actions(&app, &soup.id).await, vec!["insert", "update"]);

        delete_product(&app.db, &app.session, &soup.id).await.unwrap();
        purge_product(&app.db, &app.session, &soup.id).await.unwrap();
        assert_eq!(
            audit_actions(&app, &soup.id).await,
            vec!["insert", "update", "soft_delete", "hard_delete"]
        );
    }

    #[tokio::test]
    async fn test_deleted_product_is_hidden() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;
        let soup = add_product(&app, "Soup", 650).await;

        delete_product(&app.db, &app.session, &soup.id).await.unwrap();

        let err = get_product(&app.db, &app.session, &soup.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        let err = delete_product(&app.db, &app.session, &soup.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_category_delete_requires_empty() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;

        let mains = create_category(&app.db, &app.session, "Mains", None, 1).await.unwrap();
        let mut input = pizza();
        input.category_id = Some(mains.id.clone());
        let product = create_product(&app.db, &app.session, input).await.unwrap();

        let err = delete_category(&app.db, &app.session, &mains.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);

        delete_product(&app.db, &app.session, &product.id).await.unwrap();
        delete_category(&app.db, &app.session, &mains.id).await.unwrap();
        assert!(list_categories(&app.db, &app.session).await.unwrap().is_empty());

        // Category edits never reach the audit log.
        assert!(audit_actions(&app, &mains.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_category_name() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;

        create_category(&app.db, &app.session, "Drinks", None, 0).await.unwrap();
        let err = create_category(&app.db, &app.session, "Drinks", None, 1).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }
}
