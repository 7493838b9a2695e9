//! # Table Commands
//!
//! The floor plan. Table status only moves through
//! [`TableStatus::apply`]; opening, paying and cancelling orders drive it
//! from the order commands, and [`clear_table`] frees a paid table.

use serde::{Deserialize, Serialize};
use tracing::info;

use bistro_core::validation::{validate_name, validate_seats};
use bistro_core::{Permission, RestaurantTable, TableEvent, TableStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::{DbState, SessionState};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDto {
    pub id: String,
    pub name: String,
    pub seats: i64,
    pub status: TableStatus,
    /// Number of the open order on the table, if any.
    pub open_order: Option<String>,
}

impl TableDto {
    fn new(table: RestaurantTable, open_order: Option<String>) -> Self {
        TableDto {
            id: table.id,
            name: table.name,
            seats: table.seats,
            status: table.status,
            open_order,
        }
    }
}

/// Fields left `None` are not changed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableUpdate {
    pub name: Option<String>,
    pub seats: Option<i64>,
}

/// Looks a table up by id or, failing that, by name ("T3").
pub(crate) async fn resolve_table(
    db: &bistro_db::Database,
    id_or_name: &str,
) -> ApiResult<RestaurantTable> {
    if let Some(table) = db.tables().find(id_or_name).await? {
        return Ok(table);
    }
    db.tables()
        .find_by_name(id_or_name)
        .await?
        .ok_or_else(|| ApiError::not_found("Table", id_or_name))
}

pub async fn list_tables(db: &DbState, session: &SessionState) -> ApiResult<Vec<TableDto>> {
    session.current().await?;
    let db = db.read().await;

    let mut dtos = Vec::new();
    for table in db.tables().list().await? {
        let open_order = db
            .orders()
            .open_for_table(&table.id)
            .await?
            .map(|o| o.order_number);
        dtos.push(TableDto::new(table, open_order));
    }
    Ok(dtos)
}

pub async fn create_table(
    db: &DbState,
    session: &SessionState,
    name: &str,
    seats: i64,
) -> ApiResult<TableDto> {
    let me = session.require(Permission::ManageTables).await?;
    let name = validate_name("table name", name)?;
    let seats = validate_seats(seats)?;

    let db = db.read().await;
    let mut uow = db.begin(me.actor()).await?;
    let table = db.tables().create(&mut uow, &name, seats).await?;
    uow.commit().await?;

    info!(table = %table.name, seats = table.seats, "Table created");
    Ok(TableDto::new(table, None))
}

pub async fn update_table(
    db: &DbState,
    session: &SessionState,
    table: &str,
    update: TableUpdate,
) -> ApiResult<TableDto> {
    let me = session.require(Permission::ManageTables).await?;
    let db = db.read().await;
    let id = resolve_table(&db, table).await?.id;

    let mut uow = db.begin(me.actor()).await?;
    let mut table = db
        .tables()
        .load(&mut uow, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Table", &id))?;
    if let Some(name) = &update.name {
        table.name = validate_name("table name", name)?;
    }
    if let Some(seats) = update.seats {
        table.seats = validate_seats(seats)?;
    }
    let table = db.tables().update(&mut uow, &table).await?;
    uow.commit().await?;

    Ok(TableDto::new(table, None))
}

/// Removes a free table from the floor plan.
pub async fn delete_table(db: &DbState, session: &SessionState, table: &str) -> ApiResult<()> {
    let me = session.require(Permission::ManageTables).await?;
    let db = db.read().await;
    let id = resolve_table(&db, table).await?.id;

    let mut uow = db.begin(me.actor()).await?;
    let mut table = db
        .tables()
        .load(&mut uow, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Table", &id))?;
    if table.status != TableStatus::Free {
        return Err(ApiError::business(format!(
            "Table {} is {}, only free tables can be removed",
            table.name,
            table.status.label()
        )));
    }
    table.is_deleted = true;
    db.tables().update(&mut uow, &table).await?;
    uow.commit().await?;

    info!(table = %table.name, "Table removed");
    Ok(())
}

/// Marks a paid table as ready for the next guests.
pub async fn clear_table(db: &DbState, session: &SessionState, table: &str) -> ApiResult<TableDto> {
    let me = session.require(Permission::TakeOrders).await?;
    let db = db.read().await;
    let id = resolve_table(&db, table).await?.id;

    let mut uow = db.begin(me.actor()).await?;
    let mut table = db
        .tables()
        .load(&mut uow, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Table", &id))?;
    table.status = table.status.apply(TableEvent::Clear)?;
    let table = db.tables().update(&mut uow, &table).await?;
    uow.commit().await?;

    info!(table = %table.name, "Table cleared");
    Ok(TableDto::new(table, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{add_table, app, audit_actions, login_as};
    use crate::error::ErrorCode;
    use bistro_core::UserRole;

    #[tokio::test]
    async fn test_create_list_and_rename() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;

        let t1 = create_table(&app.db, &app.session, "T1", 4).await.unwrap();
        create_table(&app.db, &app.session, "T2", 2).await.unwrap();

        let update = TableUpdate {
            name: Some("Terrace 1".to_string()),
            seats: Some(6),
        };
        let renamed = update_table(&app.db, &app.session, "T1", update).await.unwrap();
        assert_eq!(renamed.id, t1.id);
        assert_eq!(renamed.seats, 6);

        let tables = list_tables(&app.db, &app.session).await.unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"Terrace 1"));
        assert!(tables.iter().all(|t| t.status == TableStatus::Free));

        // Tables are not audited entities.
        assert!(audit_actions(&app, &t1.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_seat_limits() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;
        let err = create_table(&app.db, &app.session, "T9", 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_clear_needs_paid_table() {
        let app = app().await;
        login_as(&app, "walt", UserRole::Waiter).await;
        add_table(&app, "T1").await;

        let err = clear_table(&app.db, &app.session, "T1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);
    }

    #[tokio::test]
    async fn test_waiter_cannot_delete_tables() {
        let app = app().await;
        login_as(&app, "walt", UserRole::Waiter).await;
        add_table(&app, "T1").await;

        let err = delete_table(&app.db, &app.session, "T1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_delete_free_table() {
        let app = app().await;
        login_as(&app, "mgr", UserRole::Manager).await;
        add_table(&app, "T1").await;

        delete_table(&app.db, &app.session, "T1").await.unwrap();
        assert!(list_tables(&app.db, &app.session).await.unwrap().is_empty());

        // The name is free again.
        create_table(&app.db, &app.session, "T1", 2).await.unwrap();
    }
}
