//! Offline sale queue.
//!
//! Sales made while the server is unreachable are persisted locally and
//! replayed later in the order they were taken. The locally cached product
//! view is decremented optimistically when a sale is queued; a confirmed sale
//! replaces the cached product with the server's snapshot, a failed one gives
//! the unit back.

use super::{
    storage::{LocalStore, DASHBOARD_CACHE_KEY, PENDING_SALES_KEY},
    ClientError, SaleSubmitter,
};
use crate::{entities::product, services::products::DashboardStats};
use chrono::{DateTime, Utc};
use metrics::gauge;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PendingStatus {
    Pending,
    Syncing,
    Failed,
}

/// A sale taken offline and not yet confirmed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSale {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sale_price: Decimal,
    /// Epoch milliseconds at which the sale was taken
    pub timestamp: i64,
    pub status: PendingStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Whether this sale currently holds a unit in the cached product view
    #[serde(default)]
    pub optimistic: bool,
}

impl PendingSale {
    fn is_due(&self, now_ms: i64) -> bool {
        self.status == PendingStatus::Pending && self.next_attempt_at.map_or(true, |t| t <= now_ms)
    }
}

/// Last known dashboard state, kept for offline display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCache {
    pub products: Vec<product::Model>,
    #[serde(default)]
    pub stats: Option<DashboardStats>,
    pub last_updated: DateTime<Utc>,
}

impl DashboardCache {
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        Utc::now() - self.last_updated > max_age
    }

    fn product_mut(&mut self, id: Uuid) -> Option<&mut product::Model> {
        self.products.iter_mut().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempts before a retryable failure gives up
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on a single submission
    pub submit_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(300),
            submit_timeout: Duration::from_secs(super::DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl QueueConfig {
    /// Delay before the next attempt once `attempts` have failed.
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

/// Result of one drain pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Another drain was already running; nothing was attempted
    pub skipped: bool,
    pub synced: Vec<Uuid>,
    /// Records that failed retryably and were rescheduled
    pub rescheduled: Vec<Uuid>,
    /// Records that became `failed` during this pass
    pub failed: Vec<Uuid>,
    /// Records still waiting after the pass
    pub remaining: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    sales: Vec<PendingSale>,
    dashboard: Option<DashboardCache>,
}

impl QueueState {
    fn outstanding_for(&self, product_id: Uuid) -> i32 {
        self.sales
            .iter()
            .filter(|s| s.product_id == product_id && s.optimistic)
            .count() as i32
    }

    fn take_unit(&mut self, sale: &mut PendingSale) {
        if sale.optimistic {
            return;
        }
        if let Some(product) = self
            .dashboard
            .as_mut()
            .and_then(|d| d.product_mut(sale.product_id))
        {
            if product.stock_count > 0 {
                product.stock_count -= 1;
                product.is_sold = product.stock_count == 0;
                sale.optimistic = true;
            }
        }
    }

    fn give_back_unit(&mut self, sale: &mut PendingSale) {
        if !sale.optimistic {
            return;
        }
        sale.optimistic = false;
        if let Some(product) = self
            .dashboard
            .as_mut()
            .and_then(|d| d.product_mut(sale.product_id))
        {
            product.stock_count = (product.stock_count + 1).min(product.original_stock);
            product.is_sold = product.stock_count == 0;
        }
    }

    /// Replaces the cached product with the server's copy, keeping units still
    /// held by queued sales off the shelf.
    fn reconcile(&mut self, snapshot: product::Model) {
        let held = self.outstanding_for(snapshot.id);
        if let Some(dashboard) = self.dashboard.as_mut() {
            if let Some(cached) = dashboard.product_mut(snapshot.id) {
                let mut view = snapshot;
                view.stock_count = (view.stock_count - held).max(0);
                view.is_sold = view.stock_count == 0;
                *cached = view;
            }
        }
    }
}

/// Persistent FIFO of offline sales with single-flight draining.
pub struct OfflineQueue {
    store: Arc<dyn LocalStore>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    drain_lock: Mutex<()>,
}

impl OfflineQueue {
    /// Loads queued sales and the dashboard cache. Records left `syncing` by an
    /// interrupted drain go back to `pending`.
    pub async fn open(store: Arc<dyn LocalStore>, config: QueueConfig) -> Result<Self, ClientError> {
        let mut sales: Vec<PendingSale> = match store.load(PENDING_SALES_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| ClientError::Storage(format!("corrupt {PENDING_SALES_KEY}: {e}")))?,
            None => Vec::new(),
        };
        let dashboard: Option<DashboardCache> = match store.load(DASHBOARD_CACHE_KEY).await? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!(error = %e, "ignoring unreadable dashboard cache");
                    None
                }
            },
            None => None,
        };

        let mut recovered = 0;
        for sale in sales.iter_mut().filter(|s| s.status == PendingStatus::Syncing) {
            sale.status = PendingStatus::Pending;
            sale.next_attempt_at = None;
            recovered += 1;
        }

        let queue = Self {
            store,
            config,
            state: Mutex::new(QueueState { sales, dashboard }),
            drain_lock: Mutex::new(()),
        };
        if recovered > 0 {
            info!(recovered, "reset interrupted sales to pending");
            let state = queue.state.lock().await;
            queue.persist_sales(&state).await?;
        }
        Ok(queue)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn persist_sales(&self, state: &QueueState) -> Result<(), ClientError> {
        let raw = serde_json::to_string(&state.sales)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        self.store.save(PENDING_SALES_KEY, &raw).await?;
        gauge!(
            "shoetrack_offline_queue.pending",
            state
                .sales
                .iter()
                .filter(|s| s.status != PendingStatus::Failed)
                .count() as f64
        );
        Ok(())
    }

    async fn persist_dashboard(&self, state: &QueueState) -> Result<(), ClientError> {
        match &state.dashboard {
            Some(cache) => {
                let raw =
                    serde_json::to_string(cache).map_err(|e| ClientError::Storage(e.to_string()))?;
                self.store.save(DASHBOARD_CACHE_KEY, &raw).await
            }
            None => self.store.remove(DASHBOARD_CACHE_KEY).await,
        }
    }

    async fn persist_all(&self, state: &QueueState) -> Result<(), ClientError> {
        self.persist_sales(state).await?;
        self.persist_dashboard(state).await
    }

    /// Queues a sale and takes one unit off the cached product view.
    #[instrument(skip(self, product_name))]
    pub async fn enqueue(
        &self,
        product_id: Uuid,
        product_name: impl Into<String>,
        sale_price: Decimal,
    ) -> Result<PendingSale, ClientError> {
        let mut sale = PendingSale {
            id: Uuid::new_v4(),
            product_id,
            product_name: product_name.into(),
            sale_price,
            timestamp: Utc::now().timestamp_millis(),
            status: PendingStatus::Pending,
            attempts: 0,
            next_attempt_at: None,
            last_error: None,
            optimistic: false,
        };

        let mut state = self.state.lock().await;
        state.take_unit(&mut sale);
        state.sales.push(sale.clone());
        self.persist_all(&state).await?;
        info!(sale_id = %sale.id, queued = state.sales.len(), "sale queued for sync");
        Ok(sale)
    }

    /// Submits every due sale in enqueue order. Returns immediately with
    /// `skipped` set when another drain is in progress.
    pub async fn drain(&self, submitter: &dyn SaleSubmitter) -> Result<DrainReport, ClientError> {
        self.drain_at(submitter, Utc::now()).await
    }

    /// [`drain`](Self::drain) evaluated as of `now`.
    pub async fn drain_at(
        &self,
        submitter: &dyn SaleSubmitter,
        now: DateTime<Utc>,
    ) -> Result<DrainReport, ClientError> {
        let _guard = match self.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("drain already running");
                return Ok(DrainReport {
                    skipped: true,
                    ..DrainReport::default()
                });
            }
        };

        let now_ms = now.timestamp_millis();
        let due: Vec<Uuid> = {
            let state = self.state.lock().await;
            state
                .sales
                .iter()
                .filter(|s| s.is_due(now_ms))
                .map(|s| s.id)
                .collect()
        };

        let mut report = DrainReport::default();
        for id in due {
            let sale = {
                let mut state = self.state.lock().await;
                let Some(entry) = state.sales.iter_mut().find(|s| s.id == id) else {
                    continue;
                };
                if entry.status != PendingStatus::Pending {
                    continue;
                }
                entry.status = PendingStatus::Syncing;
                let sale = entry.clone();
                if let Err(err) = self.persist_sales(&state).await {
                    // Not submitted; leave it due for the next drain.
                    if let Some(entry) = state.sales.iter_mut().find(|s| s.id == id) {
                        entry.status = PendingStatus::Pending;
                    }
                    warn!(sale_id = %id, error = %err, "could not mark sale as syncing");
                    return Err(err);
                }
                sale
            };

            let result = match tokio::time::timeout(
                self.config.submit_timeout,
                submitter.submit_sale(sale.product_id, sale.sale_price),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            };

            let mut state = self.state.lock().await;
            match result {
                Ok(snapshot) => {
                    if let Some(pos) = state.sales.iter().position(|s| s.id == id) {
                        state.sales.remove(pos);
                    }
                    state.reconcile(snapshot);
                    info!(sale_id = %id, product_id = %sale.product_id, "queued sale confirmed");
                    report.synced.push(id);
                }
                Err(err) => {
                    let config = &self.config;
                    let mut failed = None;
                    if let Some(pos) = state.sales.iter().position(|s| s.id == id) {
                        let mut entry = state.sales[pos].clone();
                        entry.attempts += 1;
                        entry.last_error = Some(err.to_string());
                        if err.is_retryable() && entry.attempts < config.max_attempts {
                            let delay = chrono::Duration::from_std(config.backoff_for(entry.attempts))
                                .unwrap_or_else(|_| chrono::Duration::seconds(300));
                            entry.status = PendingStatus::Pending;
                            entry.next_attempt_at = Some((now + delay).timestamp_millis());
                            warn!(sale_id = %id, attempts = entry.attempts, error = %err, "sale sync failed; will retry");
                            report.rescheduled.push(id);
                        } else {
                            entry.status = PendingStatus::Failed;
                            entry.next_attempt_at = None;
                            state.give_back_unit(&mut entry);
                            warn!(sale_id = %id, attempts = entry.attempts, error = %err, "sale sync failed permanently");
                            failed = Some(id);
                        }
                        state.sales[pos] = entry;
                    }
                    if let Some(id) = failed {
                        report.failed.push(id);
                    }
                }
            }
            self.persist_all(&state).await?;
        }

        report.remaining = self.pending_count().await;
        Ok(report)
    }

    /// Moves every failed sale back to pending for another round.
    pub async fn retry_failed(&self) -> Result<usize, ClientError> {
        let mut state = self.state.lock().await;
        let mut sales = std::mem::take(&mut state.sales);
        let mut moved = 0;
        for sale in sales.iter_mut().filter(|s| s.status == PendingStatus::Failed) {
            sale.status = PendingStatus::Pending;
            sale.attempts = 0;
            sale.next_attempt_at = None;
            sale.last_error = None;
            state.take_unit(sale);
            moved += 1;
        }
        state.sales = sales;
        if moved > 0 {
            self.persist_all(&state).await?;
            info!(moved, "failed sales requeued");
        }
        Ok(moved)
    }

    /// Drops a queued sale without submitting it. Returns whether it existed.
    pub async fn discard(&self, id: Uuid) -> Result<bool, ClientError> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.sales.iter().position(|s| s.id == id) else {
            return Ok(false);
        };
        let mut sale = state.sales.remove(pos);
        state.give_back_unit(&mut sale);
        self.persist_all(&state).await?;
        info!(sale_id = %id, "queued sale discarded");
        Ok(true)
    }

    /// Sales still waiting to be confirmed, not counting failed ones.
    pub async fn pending_count(&self) -> usize {
        let state = self.state.lock().await;
        state
            .sales
            .iter()
            .filter(|s| s.status != PendingStatus::Failed)
            .count()
    }

    pub async fn failed_count(&self) -> usize {
        let state = self.state.lock().await;
        state
            .sales
            .iter()
            .filter(|s| s.status == PendingStatus::Failed)
            .count()
    }

    /// All queued sales in enqueue order.
    pub async fn list(&self) -> Vec<PendingSale> {
        self.state.lock().await.sales.clone()
    }

    /// Stores a fresh dashboard snapshot, re-applying units held by queued sales.
    pub async fn cache_dashboard(
        &self,
        products: Vec<product::Model>,
        stats: Option<DashboardStats>,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.dashboard = Some(DashboardCache {
            products,
            stats,
            last_updated: Utc::now(),
        });

        // The server has not seen queued sales yet.
        let mut sales = std::mem::take(&mut state.sales);
        for sale in sales.iter_mut() {
            sale.optimistic = false;
            if sale.status != PendingStatus::Failed {
                state.take_unit(sale);
            }
        }
        state.sales = sales;
        self.persist_all(&state).await
    }

    pub async fn cached_dashboard(&self) -> Option<DashboardCache> {
        self.state.lock().await.dashboard.clone()
    }

    /// Folds a product confirmed outside the queue into the cached view.
    pub async fn apply_snapshot(&self, snapshot: product::Model) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        if state.dashboard.is_none() {
            return Ok(());
        }
        state.reconcile(snapshot);
        self.persist_dashboard(&state).await
    }
}

/// How [`SalesClient::sell_or_queue`] disposed of a sale.
#[derive(Debug, Clone, PartialEq)]
pub enum SaleOutcome {
    /// The server recorded the sale
    Recorded(product::Model),
    /// The server was unreachable; the sale waits in the queue
    Queued(PendingSale),
}

/// Sells online when possible and falls back to the offline queue.
#[derive(Clone)]
pub struct SalesClient {
    submitter: Arc<dyn SaleSubmitter>,
    queue: Arc<OfflineQueue>,
}

impl SalesClient {
    pub fn new(submitter: Arc<dyn SaleSubmitter>, queue: Arc<OfflineQueue>) -> Self {
        Self { submitter, queue }
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    /// Permanent rejections (out of stock, unknown product, bad price) are
    /// returned as errors and nothing is queued.
    #[instrument(skip(self, product_name))]
    pub async fn sell_or_queue(
        &self,
        product_id: Uuid,
        product_name: &str,
        sale_price: Decimal,
    ) -> Result<SaleOutcome, ClientError> {
        let attempt = tokio::time::timeout(
            self.queue.config().submit_timeout,
            self.submitter.submit_sale(product_id, sale_price),
        )
        .await
        .unwrap_or(Err(ClientError::Timeout));

        match attempt {
            Ok(product) => {
                self.queue.apply_snapshot(product.clone()).await?;
                Ok(SaleOutcome::Recorded(product))
            }
            Err(err) if err.is_retryable() => {
                warn!(error = %err, "server unavailable; queueing sale");
                let pending = self.queue.enqueue(product_id, product_name, sale_price).await?;
                Ok(SaleOutcome::Queued(pending))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn sync(&self) -> Result<DrainReport, ClientError> {
        self.queue.drain(self.submitter.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn product(stock: i32) -> product::Model {
        let now = Utc::now();
        product::Model {
            id: Uuid::new_v4(),
            shoe_code: None,
            bundle_id: None,
            base_name: None,
            name: "Runner - Red".into(),
            description: "Red Runner".into(),
            color: Some("Red".into()),
            size: Some("40".into()),
            sizes: serde_json::json!([]),
            gender_category: product::GenderCategory::Neutral,
            age_group: product::AgeGroup::Adult,
            condition: product::Condition::New,
            location: None,
            image_file: "runner.jpg".into(),
            price: dec!(40),
            selling_price: dec!(80),
            expected_profit: dec!(40),
            stock_count: stock,
            original_stock: stock.max(1),
            is_sold: stock == 0,
            total_sales: 0,
            actual_profit: Decimal::ZERO,
            last_sale_date: None,
            last_sale_price: None,
            date_added: now,
            date_sold: None,
        }
    }

    /// Answers with a scripted sequence of results, then succeeds.
    struct Scripted {
        product: product::Model,
        failures: std::sync::Mutex<Vec<ClientError>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(product: product::Model, failures: Vec<ClientError>) -> Self {
            Self {
                product,
                failures: std::sync::Mutex::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SaleSubmitter for Scripted {
        async fn submit_sale(&self, _: Uuid, _: Decimal) -> Result<product::Model, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.failures.lock().unwrap().pop();
            match next {
                Some(err) => Err(err),
                None => {
                    let mut p = self.product.clone();
                    p.stock_count -= 1;
                    p.total_sales += 1;
                    p.is_sold = p.stock_count == 0;
                    Ok(p)
                }
            }
        }
    }

    async fn queue_with(store: Arc<dyn LocalStore>) -> OfflineQueue {
        OfflineQueue::open(store, QueueConfig::default()).await.unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff_for(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for(2), Duration::from_secs(4));
        assert_eq!(config.backoff_for(4), Duration::from_secs(16));
        assert_eq!(config.backoff_for(20), Duration::from_secs(300));
        assert_eq!(config.backoff_for(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn status_renders_like_its_stored_form() {
        for status in [PendingStatus::Pending, PendingStatus::Syncing, PendingStatus::Failed] {
            let stored = serde_json::to_string(&status).unwrap();
            assert_eq!(stored, format!("\"{status}\""));
        }
    }

    #[tokio::test]
    async fn enqueue_takes_a_unit_from_the_cached_view() {
        let queue = queue_with(Arc::new(MemoryStore::new())).await;
        let p = product(1);
        queue.cache_dashboard(vec![p.clone()], None).await.unwrap();

        let sale = queue.enqueue(p.id, &p.name, dec!(80)).await.unwrap();
        assert!(sale.optimistic);
        assert_eq!(sale.status, PendingStatus::Pending);

        let cached = queue.cached_dashboard().await.unwrap();
        assert_eq!(cached.products[0].stock_count, 0);
        assert!(cached.products[0].is_sold);
        assert_eq!(queue.pending_count().await, 1);
    }

    #[tokio::test]
    async fn drain_submits_in_enqueue_order_and_reconciles() {
        let queue = queue_with(Arc::new(MemoryStore::new())).await;
        let p = product(3);
        queue.cache_dashboard(vec![p.clone()], None).await.unwrap();
        let first = queue.enqueue(p.id, &p.name, dec!(70)).await.unwrap();
        let second = queue.enqueue(p.id, &p.name, dec!(75)).await.unwrap();

        let submitter = Scripted::new(p.clone(), vec![]);
        let report = queue.drain(&submitter).await.unwrap();

        assert_eq!(report.synced, vec![first.id, second.id]);
        assert_eq!(report.remaining, 0);
        // Server snapshot says 2 left after one sale; the view follows the last confirmation.
        let cached = queue.cached_dashboard().await.unwrap();
        assert_eq!(cached.products[0].stock_count, 2);
    }

    #[tokio::test]
    async fn retryable_failure_backs_off_then_gives_up() {
        let queue = OfflineQueue::open(
            Arc::new(MemoryStore::new()),
            QueueConfig {
                max_attempts: 2,
                ..QueueConfig::default()
            },
        )
        .await
        .unwrap();
        let p = product(1);
        queue.cache_dashboard(vec![p.clone()], None).await.unwrap();
        let sale = queue.enqueue(p.id, &p.name, dec!(80)).await.unwrap();

        let submitter = Scripted::new(
            p.clone(),
            vec![ClientError::Timeout, ClientError::Transport("reset".into())],
        );
        let t0 = Utc::now();
        let report = queue.drain_at(&submitter, t0).await.unwrap();
        assert_eq!(report.rescheduled, vec![sale.id]);
        let queued = queue.list().await;
        assert_eq!(queued[0].attempts, 1);
        assert_eq!(
            queued[0].next_attempt_at,
            Some((t0 + chrono::Duration::seconds(2)).timestamp_millis())
        );

        // Not yet due.
        let report = queue.drain_at(&submitter, t0).await.unwrap();
        assert!(report.synced.is_empty() && report.rescheduled.is_empty());
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 1);

        let report = queue
            .drain_at(&submitter, t0 + chrono::Duration::seconds(3))
            .await
            .unwrap();
        assert_eq!(report.failed, vec![sale.id]);
        assert_eq!(queue.failed_count().await, 1);
        assert_eq!(queue.pending_count().await, 0);

        // The optimistic unit is given back.
        let cached = queue.cached_dashboard().await.unwrap();
        assert_eq!(cached.products[0].stock_count, 1);
        assert!(!cached.products[0].is_sold);
    }

    #[tokio::test]
    async fn permanent_failure_fails_immediately() {
        let queue = queue_with(Arc::new(MemoryStore::new())).await;
        let p = product(1);
        let sale = queue.enqueue(p.id, &p.name, dec!(80)).await.unwrap();
        let submitter = Scripted::new(
            p,
            vec![ClientError::Api {
                status: 400,
                message: "Product is out of stock".into(),
            }],
        );

        let report = queue.drain(&submitter).await.unwrap();
        assert_eq!(report.failed, vec![sale.id]);
        let queued = queue.list().await;
        assert_eq!(queued[0].status, PendingStatus::Failed);
        assert_eq!(queued[0].last_error.as_deref(), Some("server returned 400: Product is out of stock"));

        assert_eq!(queue.retry_failed().await.unwrap(), 1);
        let report = queue.drain(&submitter).await.unwrap();
        assert_eq!(report.synced, vec![sale.id]);
    }

    #[tokio::test]
    async fn concurrent_drain_is_skipped() {
        let queue = queue_with(Arc::new(MemoryStore::new())).await;
        let _held = queue.drain_lock.lock().await;
        let submitter = Scripted::new(product(1), vec![]);
        let report = queue.drain(&submitter).await.unwrap();
        assert!(report.skipped);
    }

    #[tokio::test]
    async fn reopening_resets_interrupted_syncs() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let p = product(1);
        let mut stuck = PendingSale {
            id: Uuid::new_v4(),
            product_id: p.id,
            product_name: p.name.clone(),
            sale_price: dec!(80),
            timestamp: 0,
            status: PendingStatus::Syncing,
            attempts: 1,
            next_attempt_at: None,
            last_error: None,
            optimistic: false,
        };
        store
            .save(PENDING_SALES_KEY, &serde_json::to_string(&vec![stuck.clone()]).unwrap())
            .await
            .unwrap();

        let queue = queue_with(store.clone()).await;
        stuck.status = PendingStatus::Pending;
        assert_eq!(queue.list().await, vec![stuck]);

        let persisted = store.load(PENDING_SALES_KEY).await.unwrap().unwrap();
        assert!(persisted.contains("\"pending\""));
    }

    #[tokio::test]
    async fn discard_gives_the_unit_back() {
        let queue = queue_with(Arc::new(MemoryStore::new())).await;
        let p = product(2);
        queue.cache_dashboard(vec![p.clone()], None).await.unwrap();
        let sale = queue.enqueue(p.id, &p.name, dec!(80)).await.unwrap();

        assert!(queue.discard(sale.id).await.unwrap());
        assert!(!queue.discard(sale.id).await.unwrap());
        assert_eq!(queue.cached_dashboard().await.unwrap().products[0].stock_count, 2);
    }

    #[tokio::test]
    async fn sell_or_queue_queues_only_retryable_failures() {
        let queue = Arc::new(queue_with(Arc::new(MemoryStore::new())).await);
        let p = product(1);

        let offline = SalesClient::new(
            Arc::new(Scripted::new(p.clone(), vec![ClientError::Transport("down".into())])),
            queue.clone(),
        );
        let outcome = offline.sell_or_queue(p.id, &p.name, dec!(80)).await.unwrap();
        assert!(matches!(outcome, SaleOutcome::Queued(_)));

        let rejected = SalesClient::new(
            Arc::new(Scripted::new(
                p.clone(),
                vec![ClientError::Api {
                    status: 404,
                    message: "Product not found".into(),
                }],
            )),
            queue.clone(),
        );
        let err = rejected.sell_or_queue(p.id, &p.name, dec!(80)).await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 404, .. }));
        assert_eq!(queue.pending_count().await, 1);
    }

    /// Memory store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl LocalStore for FlakyStore {
        async fn load(&self, key: &str) -> Result<Option<String>, ClientError> {
            self.inner.load(key).await
        }

        async fn save(&self, key: &str, value: &str) -> Result<(), ClientError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(ClientError::Storage("disk full".into()));
            }
            self.inner.save(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), ClientError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn failed_write_leaves_sale_due_for_next_drain() {
        let store = Arc::new(FlakyStore::default());
        let queue = queue_with(store.clone()).await;
        let p = product(2);
        let sale = queue.enqueue(p.id, &p.name, dec!(80)).await.unwrap();
        let submitter = Scripted::new(p.clone(), Vec::new());

        store.failing.store(true, Ordering::SeqCst);
        let err = queue.drain(&submitter).await.unwrap_err();
        assert!(matches!(err, ClientError::Storage(_)));
        let entries = queue.list().await;
        assert_eq!(entries[0].status, PendingStatus::Pending);
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 0);

        store.failing.store(false, Ordering::SeqCst);
        let report = queue.drain(&submitter).await.unwrap();
        assert_eq!(report.synced, vec![sale.id]);
        assert!(queue.list().await.is_empty());
    }
}
