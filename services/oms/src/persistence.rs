//! PostgreSQL order repository
//!
//! Write-optimized persistence with textual enum codes and the same
//! version-guard contract as the in-memory store: updates apply only when
//! the stored version matches, and bump it atomically in the same
//! statement.

use crate::order::{Order, OrderStatus};
use crate::repository::{OrderRepository, Page};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use services_common::{
    Exchange, OrderType, Px, Qty, Side, Symbol, TimeInForce, TradeError, TradeResult,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

/// Order store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

fn storage_error(error: sqlx::Error) -> TradeError {
    TradeError::Storage {
        detail: error.to_string(),
    }
}

fn db_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl PgOrderRepository {
    /// Wrap an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run migrations
    pub async fn connect(database_url: &str) -> TradeResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(storage_error)?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn save(&self, order: &Order) -> TradeResult<Order> {
        sqlx::query(
            r"
            INSERT INTO orders (
                id, order_id, user_id, symbol, exchange, side, order_type,
                quantity, filled_quantity, limit_price, stop_price,
                average_price, time_in_force, expiry_date, status,
                broker_name, broker_order_id, rejection_reason,
                last_exec_sequence, created_at, updated_at, submitted_at,
                executed_at, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            ",
        )
        .bind(db_i64(order.id))
        .bind(&order.order_id)
        .bind(order.user_id)
        .bind(order.symbol.as_str())
        .bind(order.exchange.as_str())
        .bind(order.side.as_str())
        .bind(order.order_type.as_str())
        .bind(order.quantity.as_i64())
        .bind(order.filled_quantity.as_i64())
        .bind(order.limit_price.map(|p| p.as_i64()))
        .bind(order.stop_price.map(|p| p.as_i64()))
        .bind(order.average_price.as_i64())
        .bind(order.time_in_force.as_str())
        .bind(order.expiry_date)
        .bind(order.status.as_str())
        .bind(order.broker_name.as_deref())
        .bind(order.broker_order_id.as_deref())
        .bind(order.rejection_reason.as_deref())
        .bind(db_i64(order.last_exec_sequence))
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.submitted_at)
        .bind(order.executed_at)
        .bind(i32::try_from(order.version).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        debug!(order_id = %order.order_id, "order persisted");
        Ok(order.clone())
    }

    async fn find_by_order_id(&self, order_id: &str) -> TradeResult<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.map(|r| order_from_row(&r)).transpose()
    }

    async fn find_by_user(&self, user_id: i64, page: Page) -> TradeResult<Vec<Order>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id)
        .bind(i64::from(page.size))
        .bind(i64::from(page.number) * i64::from(page.size))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.iter().map(order_from_row).collect()
    }

    async fn find_by_status_in(&self, statuses: &[OrderStatus]) -> TradeResult<Vec<Order>> {
        let codes: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query("SELECT * FROM orders WHERE status = ANY($1) ORDER BY id")
            .bind(&codes)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(order_from_row).collect()
    }

    async fn update_if_version(&self, order: &Order, expected_version: u32) -> TradeResult<Order> {
        let expected = i32::try_from(expected_version).unwrap_or(i32::MAX);
        let result = sqlx::query(
            r"
            UPDATE orders SET
                quantity = $1,
                filled_quantity = $2,
                limit_price = $3,
                stop_price = $4,
                average_price = $5,
                time_in_force = $6,
                expiry_date = $7,
                status = $8,
                broker_name = $9,
                broker_order_id = $10,
                rejection_reason = $11,
                last_exec_sequence = $12,
                updated_at = $13,
                submitted_at = $14,
                executed_at = $15,
                version = version + 1
            WHERE order_id = $16 AND version = $17
            ",
        )
        .bind(order.quantity.as_i64())
        .bind(order.filled_quantity.as_i64())
        .bind(order.limit_price.map(|p| p.as_i64()))
        .bind(order.stop_price.map(|p| p.as_i64()))
        .bind(order.average_price.as_i64())
        .bind(order.time_in_force.as_str())
        .bind(order.expiry_date)
        .bind(order.status.as_str())
        .bind(order.broker_name.as_deref())
        .bind(order.broker_order_id.as_deref())
        .bind(order.rejection_reason.as_deref())
        .bind(db_i64(order.last_exec_sequence))
        .bind(order.updated_at)
        .bind(order.submitted_at)
        .bind(order.executed_at)
        .bind(&order.order_id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_id = $1)")
                    .bind(&order.order_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(storage_error)?;
            return Err(if exists {
                TradeError::Conflict {
                    order_id: order.order_id.clone(),
                }
            } else {
                TradeError::NotFound {
                    order_id: order.order_id.clone(),
                }
            });
        }

        let mut updated = order.clone();
        updated.version = expected_version + 1;
        Ok(updated)
    }

    async fn max_internal_id(&self) -> TradeResult<u64> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(max.map_or(0, |id| u64::try_from(id).unwrap_or(0)))
    }
}

fn order_from_row(row: &PgRow) -> TradeResult<Order> {
    fn parse<T: std::str::FromStr<Err = &'static str>>(
        value: &str,
        what: &str,
    ) -> TradeResult<T> {
        value.parse().map_err(|e: &'static str| TradeError::Storage {
            detail: format!("corrupt {what} '{value}': {e}"),
        })
    }

    let symbol_text: String = row.get("symbol");
    let symbol = Symbol::parse(&symbol_text).map_err(|e| TradeError::Storage {
        detail: format!("corrupt symbol '{symbol_text}': {e}"),
    })?;

    Ok(Order {
        id: u64::try_from(row.get::<i64, _>("id")).unwrap_or(0),
        order_id: row.get("order_id"),
        user_id: row.get("user_id"),
        symbol,
        exchange: parse::<Exchange>(&row.get::<String, _>("exchange"), "exchange")?,
        side: parse::<Side>(&row.get::<String, _>("side"), "side")?,
        order_type: parse::<OrderType>(&row.get::<String, _>("order_type"), "order type")?,
        quantity: Qty::from_i64(row.get("quantity")),
        filled_quantity: Qty::from_i64(row.get("filled_quantity")),
        limit_price: row.get::<Option<i64>, _>("limit_price").map(Px::from_i64),
        stop_price: row.get::<Option<i64>, _>("stop_price").map(Px::from_i64),
        average_price: Px::from_i64(row.get("average_price")),
        time_in_force: parse::<TimeInForce>(
            &row.get::<String, _>("time_in_force"),
            "time in force",
        )?,
        expiry_date: row.get::<Option<NaiveDate>, _>("expiry_date"),
        status: parse::<OrderStatus>(&row.get::<String, _>("status"), "status")?,
        broker_name: row.get("broker_name"),
        broker_order_id: row.get("broker_order_id"),
        rejection_reason: row.get("rejection_reason"),
        last_exec_sequence: u64::try_from(row.get::<i64, _>("last_exec_sequence")).unwrap_or(0),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        submitted_at: row.get::<Option<DateTime<Utc>>, _>("submitted_at"),
        executed_at: row.get::<Option<DateTime<Utc>>, _>("executed_at"),
        version: u32::try_from(row.get::<i32, _>("version")).unwrap_or(0),
    })
}

/// Create tables and indexes when they do not exist yet
pub async fn run_migrations(pool: &PgPool) -> TradeResult<()> {
    info!("running order store migrations");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS orders (
            id BIGINT NOT NULL,
            order_id TEXT PRIMARY KEY,
            user_id BIGINT NOT NULL,
            symbol TEXT NOT NULL,
            exchange TEXT NOT NULL,
            side TEXT NOT NULL,
            order_type TEXT NOT NULL,
            quantity BIGINT NOT NULL,
            filled_quantity BIGINT NOT NULL,
            limit_price BIGINT,
            stop_price BIGINT,
            average_price BIGINT NOT NULL,
            time_in_force TEXT NOT NULL,
            expiry_date DATE,
            status TEXT NOT NULL,
            broker_name TEXT,
            broker_order_id TEXT,
            rejection_reason TEXT,
            last_exec_sequence BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            submitted_at TIMESTAMPTZ,
            executed_at TIMESTAMPTZ,
            version INTEGER NOT NULL DEFAULT 1
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(storage_error)?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id, created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status)",
        "CREATE INDEX IF NOT EXISTS idx_orders_symbol ON orders (symbol)",
    ] {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(storage_error)?;
    }

    info!("order store migrations complete");
    Ok(())
}
