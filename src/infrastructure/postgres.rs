//! PostgreSQL repository. Aggregates are stored as JSONB documents next to the columns the
//! queries filter on, and every write is guarded by the row's `revision`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};

use super::repository::{conflict, Guarded, ShopRepository};
use crate::domain::aggregates::{LoyaltyAccount, Order, Product};
use crate::domain::services::{Catalog, LoyaltyProgram};
use crate::{Result, ShopError};

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(storage)
    }
}

fn storage(e: sqlx::Error) -> ShopError {
    ShopError::StorageError(e.to_string())
}

/// Unique violations mean a racing writer inserted the same key first.
fn write_error(kind: &str, id: &str, e: sqlx::Error) -> ShopError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => conflict(kind, id),
        _ => storage(e),
    }
}

fn revision(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

async fn put_product(tx: &mut Transaction<'static, Postgres>, product: &Guarded<'_, Product>) -> Result<()> {
    let p = product.record;
    let result = match product.expected_revision {
        None => sqlx::query(
            r#"
            INSERT INTO products (id, revision, display_order, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(p.id())
        .bind(revision(p.revision()))
        .bind(p.display_order())
        .bind(Json(p))
        .execute(&mut **tx)
        .await,
        Some(expected) => sqlx::query(
            "UPDATE products SET revision = $2, display_order = $3, body = $4 WHERE id = $1 AND revision = $5",
        )
        .bind(p.id())
        .bind(revision(p.revision()))
        .bind(p.display_order())
        .bind(Json(p))
        .bind(revision(expected))
        .execute(&mut **tx)
        .await,
    }
    .map_err(|e| write_error("product", p.id(), e))?;
    if result.rows_affected() == 0 {
        return Err(conflict("product", p.id()));
    }
    Ok(())
}

async fn put_account(tx: &mut Transaction<'static, Postgres>, account: &Guarded<'_, LoyaltyAccount>) -> Result<()> {
    let a = account.record;
    let result = match account.expected_revision {
        None => sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (owner_id, revision, points, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (owner_id) DO NOTHING
            "#,
        )
        .bind(a.owner_id())
        .bind(revision(a.revision()))
        .bind(a.points())
        .bind(Json(a))
        .execute(&mut **tx)
        .await,
        Some(expected) => sqlx::query(
            "UPDATE loyalty_accounts SET revision = $2, points = $3, body = $4 WHERE owner_id = $1 AND revision = $5",
        )
        .bind(a.owner_id())
        .bind(revision(a.revision()))
        .bind(a.points())
        .bind(Json(a))
        .bind(revision(expected))
        .execute(&mut **tx)
        .await,
    }
    .map_err(|e| write_error("account", a.owner_id(), e))?;
    if result.rows_affected() == 0 {
        return Err(conflict("account", a.owner_id()));
    }
    Ok(())
}

async fn guard_order(tx: &mut Transaction<'static, Postgres>, order: &Guarded<'_, Order>) -> Result<()> {
    let id = order.record.id().as_str();
    let row: Option<(i64,)> = sqlx::query_as("SELECT revision FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage)?;
    match row {
        None => Err(ShopError::OrderNotFound(id.to_string())),
        Some((stored,)) if Some(stored) != order.expected_revision.map(revision) => Err(conflict("order", id)),
        Some(_) => Ok(()),
    }
}

#[async_trait]
impl ShopRepository for PgRepository {
    async fn load_catalog(&self) -> Result<Catalog> {
        let rows: Vec<(Json<Product>,)> = sqlx::query_as("SELECT body FROM products")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        Ok(Catalog::new(rows.into_iter().map(|(Json(p),)| p)))
    }

    async fn save_products(&self, products: &[Guarded<'_, Product>]) -> Result<()> {
        let mut tx = self.begin().await?;
        for product in products {
            put_product(&mut tx, product).await?;
        }
        tx.commit().await.map_err(storage)
    }

    async fn delete_product(&self, product: Guarded<'_, Product>) -> Result<()> {
        let id = product.record.id();
        let Some(expected) = product.expected_revision else {
            return Err(conflict("product", id));
        };
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND revision = $2")
            .bind(id)
            .bind(revision(expected))
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(conflict("product", id));
        }
        Ok(())
    }

    async fn count_orders(&self) -> Result<u64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(u64::try_from(count.0).unwrap_or(0))
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT body FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|(Json(o),)| o))
    }

    async fn list_orders(&self, owner_id: Option<&str>) -> Result<Vec<Order>> {
        let rows: Vec<(Json<Order>,)> = sqlx::query_as(
            "SELECT body FROM orders WHERE ($1::text IS NULL OR owner_id = $1) ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.into_iter().map(|(Json(o),)| o).collect())
    }

    async fn commit_checkout(&self, products: &[Guarded<'_, Product>], order: &Order) -> Result<()> {
        let mut tx = self.begin().await?;
        for product in products {
            put_product(&mut tx, product).await?;
        }
        let created_at: DateTime<Utc> = order.created_at();
        sqlx::query(
            r#"
            INSERT INTO orders (id, owner_id, revision, completed, created_at, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id().as_str())
        .bind(order.owner_id())
        .bind(revision(order.revision()))
        .bind(order.is_completed())
        .bind(created_at)
        .bind(Json(order))
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error("order", order.id().as_str(), e))?;
        tx.commit().await.map_err(storage)
    }

    async fn commit_completion(&self, order: Guarded<'_, Order>, account: Guarded<'_, LoyaltyAccount>) -> Result<()> {
        let mut tx = self.begin().await?;
        guard_order(&mut tx, &order).await?;
        let o = order.record;
        sqlx::query("UPDATE orders SET revision = $2, completed = $3, body = $4 WHERE id = $1")
            .bind(o.id().as_str())
            .bind(revision(o.revision()))
            .bind(o.is_completed())
            .bind(Json(o))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        put_account(&mut tx, &account).await?;
        tx.commit().await.map_err(storage)
    }

    async fn remove_order(&self, order: Guarded<'_, Order>, account: Option<Guarded<'_, LoyaltyAccount>>) -> Result<()> {
        let mut tx = self.begin().await?;
        guard_order(&mut tx, &order).await?;
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order.record.id().as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        if let Some(account) = &account {
            put_account(&mut tx, account).await?;
        }
        tx.commit().await.map_err(storage)
    }

    async fn get_account(&self, owner_id: &str) -> Result<Option<LoyaltyAccount>> {
        let row: Option<(Json<LoyaltyAccount>,)> = sqlx::query_as("SELECT body FROM loyalty_accounts WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|(Json(a),)| a))
    }

    async fn save_account(&self, account: Guarded<'_, LoyaltyAccount>) -> Result<()> {
        let mut tx = self.begin().await?;
        put_account(&mut tx, &account).await?;
        tx.commit().await.map_err(storage)
    }

    async fn load_program(&self) -> Result<Option<LoyaltyProgram>> {
        let row: Option<(Json<LoyaltyProgram>,)> = sqlx::query_as("SELECT body FROM loyalty_program WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|(Json(p),)| p))
    }

    async fn save_program(&self, program: &LoyaltyProgram) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_program (id, body, updated_at)
            VALUES (1, $1, NOW())
            ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()
            "#,
        )
        .bind(Json(program))
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}
