//! Order store contract and the in-memory implementation
//!
//! All mutation flows through `update_if_version`: the caller states the
//! version it read, the store applies the write only when that version is
//! still current and bumps it by one. Per-order linearizability falls out
//! of this guard; callers retry or surface `Conflict` per operation.

use crate::order::{Order, OrderStatus};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use services_common::{TradeError, TradeResult};

/// Page request for user-scoped scans
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based page number
    pub number: u32,
    /// Rows per page
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 0,
            size: 50,
        }
    }
}

/// Durable, transactional order store
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a new order; fails on a duplicate external id
    async fn save(&self, order: &Order) -> TradeResult<Order>;

    /// Look up by external id
    async fn find_by_order_id(&self, order_id: &str) -> TradeResult<Option<Order>>;

    /// Orders belonging to a user, newest first
    async fn find_by_user(&self, user_id: i64, page: Page) -> TradeResult<Vec<Order>>;

    /// Orders currently in any of `statuses`
    async fn find_by_status_in(&self, statuses: &[OrderStatus]) -> TradeResult<Vec<Order>>;

    /// Version-guarded update: applied only when the stored version equals
    /// `expected_version`; the stored (and returned) order carries
    /// `expected_version + 1`.
    async fn update_if_version(&self, order: &Order, expected_version: u32) -> TradeResult<Order>;

    /// Highest internal id ever stored; zero when empty. Recovery raises
    /// the id sequence above this.
    async fn max_internal_id(&self) -> TradeResult<u64>;
}

/// Lock-free in-memory store used by tests and database-less runs
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<String, Order>,
}

impl InMemoryOrderRepository {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// True when nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &Order) -> TradeResult<Order> {
        use dashmap::mapref::entry::Entry;
        match self.orders.entry(order.order_id.clone()) {
            Entry::Occupied(_) => Err(TradeError::Storage {
                detail: format!("duplicate order id {}", order.order_id),
            }),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(order.clone())
            }
        }
    }

    async fn find_by_order_id(&self, order_id: &str) -> TradeResult<Option<Order>> {
        Ok(self.orders.get(order_id).map(|entry| entry.clone()))
    }

    async fn find_by_user(&self, user_id: i64, page: Page) -> TradeResult<Vec<Order>> {
        let mut rows: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let start = page.number as usize * page.size as usize;
        Ok(rows
            .into_iter()
            .skip(start)
            .take(page.size as usize)
            .collect())
    }

    async fn find_by_status_in(&self, statuses: &[OrderStatus]) -> TradeResult<Vec<Order>> {
        let mut rows: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| statuses.contains(&entry.status))
            .map(|entry| entry.clone())
            .collect();
        rows.sort_by_key(|order| order.id);
        Ok(rows)
    }

    async fn update_if_version(&self, order: &Order, expected_version: u32) -> TradeResult<Order> {
        let Some(mut stored) = self.orders.get_mut(&order.order_id) else {
            return Err(TradeError::NotFound {
                order_id: order.order_id.clone(),
            });
        };
        if stored.version != expected_version {
            return Err(TradeError::Conflict {
                order_id: order.order_id.clone(),
            });
        }
        let mut updated = order.clone();
        updated.version = expected_version + 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn max_internal_id(&self) -> TradeResult<u64> {
        Ok(self
            .orders
            .iter()
            .map(|entry| entry.id)
            .max()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::ValidatedRequest;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use services_common::{Exchange, OrderType, Px, Qty, Side, Symbol, TimeInForce};

    fn order(id: u64, order_id: &str, user_id: i64) -> Order {
        let request = ValidatedRequest {
            symbol: Symbol::parse("TCS").unwrap(),
            exchange: Exchange::Nse,
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: Qty::from_units(10),
            limit_price: Some(Px::from_rupees(3500)),
            stop_price: None,
            time_in_force: TimeInForce::Day,
            expiry_date: None,
            effective_price: Some(Px::from_rupees(3500)),
        };
        let mut order = Order::create(id, order_id.to_string(), user_id, &request, Utc::now());
        order.status = OrderStatus::Pending;
        order
    }

    #[tokio::test]
    async fn save_rejects_duplicates() {
        let repo = InMemoryOrderRepository::new();
        repo.save(&order(1, "ORD-a", 1)).await.unwrap();
        let err = repo.save(&order(2, "ORD-a", 1)).await.unwrap_err();
        assert!(matches!(err, TradeError::Storage { .. }));
    }

    #[tokio::test]
    async fn version_guard_detects_conflicts() {
        let repo = InMemoryOrderRepository::new();
        let stored = repo.save(&order(1, "ORD-v", 1)).await.unwrap();
        assert_eq!(stored.version, 1);

        let mut change = stored.clone();
        change.status = OrderStatus::Acknowledged;
        let updated = repo.update_if_version(&change, 1).await.unwrap();
        assert_eq!(updated.version, 2);

        // A writer still holding version 1 must lose
        let mut stale = stored;
        stale.status = OrderStatus::CancelPending;
        let err = repo.update_if_version(&stale, 1).await.unwrap_err();
        assert!(matches!(err, TradeError::Conflict { .. }));

        // And the stored row kept the winner's write
        let current = repo.find_by_order_id("ORD-v").await.unwrap().unwrap();
        assert_eq!(current.status, OrderStatus::Acknowledged);
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn update_of_unknown_order_is_not_found() {
        let repo = InMemoryOrderRepository::new();
        let err = repo
            .update_if_version(&order(1, "ORD-missing", 1), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn user_scan_pages_newest_first() {
        let repo = InMemoryOrderRepository::new();
        for i in 0..5 {
            let mut o = order(i, &format!("ORD-{i}"), 42);
            o.created_at = Utc::now() + chrono::Duration::seconds(i64::try_from(i).unwrap());
            repo.save(&o).await.unwrap();
        }
        repo.save(&order(99, "ORD-other", 7)).await.unwrap();

        let first = repo
            .find_by_user(42, Page { number: 0, size: 2 })
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].order_id, "ORD-4");
        assert_eq!(first[1].order_id, "ORD-3");

        let last = repo
            .find_by_user(42, Page { number: 2, size: 2 })
            .await
            .unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].order_id, "ORD-0");
    }

    #[tokio::test]
    async fn status_scan_filters() {
        let repo = InMemoryOrderRepository::new();
        let mut a = order(1, "ORD-p", 1);
        a.status = OrderStatus::Pending;
        let mut b = order(2, "ORD-f", 1);
        b.status = OrderStatus::Filled;
        repo.save(&a).await.unwrap();
        repo.save(&b).await.unwrap();

        let active = repo
            .find_by_status_in(&OrderStatus::active_set())
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].order_id, "ORD-p");
    }
}
