//! PostgreSQL storage adapter for order status and balance updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::domain::{OrderState, OrderStatus};
use crate::error::Result;

/// Persistence boundary consumed by the reconciliation workers.
///
/// Re-applying the same terminal status must be a safe no-op; the SQL
/// below guards the order row with a status inequality for that reason.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageUpdater: Send + Sync {
    /// Persist the latest status/accrual for an order and credit the
    /// owner's balance when the accrual is final
    async fn update(&self, login: &str, status: &OrderStatus) -> Result<()>;
}

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Orders still awaiting a terminal status, as (login, order_number).
    ///
    /// Used by the startup recovery sweep: tasks abandoned by a previous
    /// shutdown are re-enqueued from here.
    pub async fn pending_orders(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT login, order_num, uploaded_at
            FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
            ORDER BY uploaded_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if let Some(first) = rows.first() {
            let oldest: DateTime<Utc> = first.get("uploaded_at");
            debug!(count = rows.len(), oldest = %oldest, "pending orders found");
        }

        Ok(rows
            .into_iter()
            .map(|r| (r.get("login"), r.get("order_num")))
            .collect())
    }
}

#[async_trait]
impl StorageUpdater for PostgresStore {
    async fn update(&self, login: &str, status: &OrderStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE orders SET status = $3, accrual = $4
            WHERE login = $1 AND order_num = $2 AND status != $3
            "#,
        )
        .bind(login)
        .bind(&status.order)
        .bind(status.status.as_str())
        .bind(status.accrual)
        .execute(&mut *tx)
        .await?;

        // Credit the balance only once the accrual is final; pending
        // statuses may repeat with the same positive accrual.
        if status.status == OrderState::Processed && status.accrual > Decimal::ZERO {
            sqlx::query(
                r#"
                UPDATE balance SET current_balance = current_balance + $2
                WHERE login = $1
                "#,
            )
            .bind(login)
            .bind(status.accrual)
            .execute(&mut *tx)
            .await?;

            debug!(
                login,
                order = %status.order,
                accrual = %status.accrual,
                "balance credited"
            );
        }

        tx.commit().await?;
        Ok(())
    }
}
