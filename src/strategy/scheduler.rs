//! Initial hedge placement followed by periodic rebalancing.
//!
//! Each cycle: fetch market data and account state concurrently, select the
//! best carry, size the target, diff it against current exposure, place
//! orders, notify. Cycles are serialized; a trigger that arrives while one is
//! running is skipped. A failed cycle is logged and notified and never stops
//! the loop.

use super::exposure::summarize;
use super::rebalancer::{ExecutionReport, PlanOutcome, RebalanceEngine, RebalancePlan};
use super::selector::{HedgeDirection, Strategy, StrategySelector};
use crate::config::{SelectionMode, StrategyConfig};
use crate::error::EngineError;
use crate::exchange::{
    extract_reference_price, select_quote_balance, Balance, ExchangeClient, OrderAck, PerpOrder,
    Position, SpotOrder, Trade,
};
use crate::market::{align_to_strategy_schedule, DataOrigin, MarketDataCache, MarketView};
use crate::notify::{build_failure_message, build_no_deploy_message, build_strategy_message, Notifier};
use crate::utils::decimal::decimal_from_f64;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Which kind of cycle is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleKind {
    /// Startup cycle that establishes the hedge
    Initial,
    /// Periodic cycle that moves the hedge back to target
    Rebalance,
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleKind::Initial => write!(f, "initial"),
            CycleKind::Rebalance => write!(f, "rebalance"),
        }
    }
}

/// Runtime settings of the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Instrument hedged in fixed mode and the auto-mode fallback
    pub symbol: String,
    pub leverage: Decimal,
    /// Quote to deploy; zero means all available capital
    pub quote_to_deploy: Decimal,
    pub interval: Duration,
    pub selection_mode: SelectionMode,
    pub notify_timeout: Duration,
    /// Upper bound on every exchange call made by a cycle
    pub request_timeout: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            symbol: config.normalized_symbol(),
            leverage: config.leverage,
            quote_to_deploy: config.quote_to_deploy,
            interval: config.rebalance_interval(),
            selection_mode: config.selection_mode,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

async fn bounded<T>(limit: Duration, call: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| anyhow!("{} timed out after {}s", call, limit.as_secs_f64()))?
}

/// Applies the request timeout to every call of the wrapped client. A timed
/// out call fails like any other upstream error.
struct TimeoutClient {
    inner: Arc<dyn ExchangeClient>,
    limit: Duration,
}

#[async_trait]
impl ExchangeClient for TimeoutClient {
    async fn get_balances(&self) -> Result<Vec<Balance>> {
        bounded(self.limit, "get_balances", self.inner.get_balances()).await
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        bounded(self.limit, "get_positions", self.inner.get_positions()).await
    }

    async fn get_recent_trades(&self, symbol: &str) -> Result<Vec<Trade>> {
        bounded(self.limit, "get_recent_trades", self.inner.get_recent_trades(symbol)).await
    }

    async fn place_spot_order(&self, order: &SpotOrder) -> Result<OrderAck> {
        bounded(self.limit, "place_spot_order", self.inner.place_spot_order(order)).await
    }

    async fn place_perp_order(&self, order: &PerpOrder) -> Result<OrderAck> {
        bounded(self.limit, "place_perp_order", self.inner.place_perp_order(order)).await
    }
}

/// Symbol and leverage a cycle hedges.
#[derive(Debug, Clone, PartialEq)]
struct HedgeInstrument {
    symbol: String,
    leverage: Decimal,
}

/// What a completed cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleAction {
    Executed {
        plan: RebalancePlan,
        report: ExecutionReport,
    },
    /// Zero budget, nothing placed
    NoDeploy,
}

/// Details of a completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub kind: CycleKind,
    pub symbol: String,
    /// Selector's pick for this evaluation
    pub selected: Option<Strategy>,
    /// Strategy schedule boundary this evaluation belongs to
    pub evaluated_for: DateTime<Utc>,
    pub market_origin: DataOrigin,
    pub action: CycleAction,
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was still running
    SkippedBusy,
}

/// Counters since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub partial_hedges: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    partial_hedges: AtomicU64,
}

/// Deployable budget: available quote plus the value of the current spot
/// holding, capped by `quote_to_deploy` when it is positive.
pub fn resolve_budget(
    quote_to_deploy: Decimal,
    available_quote: Decimal,
    current_spot: Decimal,
    price: Decimal,
) -> Decimal {
    let capital = (available_quote + current_spot * price).max(Decimal::ZERO);
    if quote_to_deploy > Decimal::ZERO {
        quote_to_deploy.min(capital)
    } else {
        capital
    }
}

/// Drives the carry engine on a fixed interval.
pub struct RebalanceScheduler {
    exchange: Arc<dyn ExchangeClient>,
    market: Arc<MarketDataCache>,
    notifier: Arc<dyn Notifier>,
    selector: StrategySelector,
    engine: RebalanceEngine,
    settings: SchedulerSettings,
    /// Auto mode: instrument chosen by the first cycle
    pinned: RwLock<Option<HedgeInstrument>>,
    cycle_lock: Mutex<()>,
    stats: StatsCounters,
}

impl RebalanceScheduler {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        market: Arc<MarketDataCache>,
        notifier: Arc<dyn Notifier>,
        selector: StrategySelector,
        settings: SchedulerSettings,
    ) -> Self {
        let exchange: Arc<dyn ExchangeClient> = Arc::new(TimeoutClient {
            inner: exchange,
            limit: settings.request_timeout,
        });

        Self {
            exchange,
            market,
            notifier,
            selector,
            engine: RebalanceEngine::new(),
            settings,
            pinned: RwLock::new(None),
            cycle_lock: Mutex::new(()),
            stats: StatsCounters::default(),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            partial_hedges: self.stats.partial_hedges.load(Ordering::Relaxed),
        }
    }

    /// Initial cycle, then one rebalance per interval until `shutdown` flips
    /// to `true` or its sender is dropped. An in-flight cycle always finishes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if *shutdown.borrow() {
            return Ok(());
        }

        info!(
            symbol = %self.settings.symbol,
            interval_secs = self.settings.interval.as_secs(),
            mode = ?self.settings.selection_mode,
            "[INIT] Establishing hedge"
        );
        self.run_logged(CycleKind::Initial).await;

        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_logged(CycleKind::Rebalance).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, stopping rebalance loop");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn run_logged(&self, kind: CycleKind) {
        match self.run_cycle(kind).await {
            Ok(CycleOutcome::Completed(report)) => {
                info!(
                    kind = %report.kind,
                    symbol = %report.symbol,
                    evaluated_for = %report.evaluated_for,
                    "[CYCLE] Completed"
                );
            }
            Ok(CycleOutcome::SkippedBusy) => {}
            Err(e) => {
                error!(kind = %kind, error = %format!("{:#}", e), "[CYCLE] Failed");
            }
        }
    }

    /// Run one cycle now, unless another one is in progress.
    ///
    /// Errors are counted and notified before being returned.
    pub async fn run_cycle(&self, kind: CycleKind) -> Result<CycleOutcome> {
        let _guard = match self.cycle_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(kind = %kind, "Previous cycle still running, skipping trigger");
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(CycleOutcome::SkippedBusy);
            }
        };

        match self.execute_cycle(kind).await {
            Ok(report) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                Ok(CycleOutcome::Completed(report))
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                if e.downcast_ref::<EngineError>().is_some_and(EngineError::is_partial) {
                    self.stats.partial_hedges.fetch_add(1, Ordering::Relaxed);
                }
                self.notify(build_failure_message(kind, &format!("{:#}", e))).await;
                Err(e)
            }
        }
    }

    async fn execute_cycle(&self, kind: CycleKind) -> Result<CycleReport> {
        info!(kind = %kind, "[CYCLE] Starting");

        let (view, account) = tokio::join!(self.market.snapshots(), async {
            tokio::try_join!(self.exchange.get_balances(), self.exchange.get_positions())
        });
        let (balances, positions) = account.context("Failed to fetch account state")?;

        let evaluated_for = align_to_strategy_schedule(Utc::now());
        // Sample rows are for display only, never a basis for a pick
        let selected = match view.origin {
            DataOrigin::Fallback => None,
            _ => self.selector.select(&view.rows),
        };
        match &selected {
            Some(strategy) => info!(
                pair = %strategy.pair,
                direction = %strategy.direction,
                apy = strategy.apy,
                score = strategy.score,
                leverage = strategy.leverage,
                evaluated_for = %evaluated_for,
                origin = ?view.origin,
                "Selected carry strategy"
            ),
            None => warn!(origin = ?view.origin, "No eligible carry strategy in market data"),
        }

        let instrument = self.resolve_instrument(selected.as_ref(), &view).await?;
        let symbol = instrument.symbol.as_str();

        let trades = self
            .exchange
            .get_recent_trades(symbol)
            .await
            .with_context(|| format!("Failed to fetch recent trades for {}", symbol))?;
        let price = extract_reference_price(symbol, &trades)?;

        let current = summarize(&positions, symbol);
        let available = select_quote_balance(&balances);
        let budget = resolve_budget(self.settings.quote_to_deploy, available, current.spot, price);

        info!(
            %symbol,
            %price,
            %available,
            %budget,
            current_spot = %current.spot,
            current_perp = %current.perp,
            "Resolved hedge budget"
        );

        let action = match self.engine.plan(symbol, budget, price, instrument.leverage, current)? {
            PlanOutcome::NoDeploy { .. } => {
                warn!(%symbol, "No capital to deploy, skipping order placement");
                self.notify(build_no_deploy_message(kind, symbol)).await;
                CycleAction::NoDeploy
            }
            PlanOutcome::Orders(plan) => {
                let report = self.engine.execute(self.exchange.as_ref(), &plan).await?;
                self.notify(build_strategy_message(kind, &plan, &report, selected.as_ref()))
                    .await;
                CycleAction::Executed { plan, report }
            }
        };

        Ok(CycleReport {
            kind,
            symbol: symbol.to_string(),
            selected,
            evaluated_for,
            market_origin: view.origin,
            action,
        })
    }

    /// Fixed mode: the configured instrument. Auto mode: the pinned one, or
    /// pin the selector's pick. Picks made from sample rows are refused.
    async fn resolve_instrument(
        &self,
        selected: Option<&Strategy>,
        view: &MarketView,
    ) -> Result<HedgeInstrument, EngineError> {
        let configured = HedgeInstrument {
            symbol: self.settings.symbol.clone(),
            leverage: self.settings.leverage,
        };

        if self.settings.selection_mode == SelectionMode::Fixed {
            return Ok(configured);
        }

        let mut pinned = self.pinned.write().await;
        if let Some(instrument) = pinned.as_ref() {
            return Ok(instrument.clone());
        }

        if view.origin == DataOrigin::Fallback {
            let reason = view
                .error
                .clone()
                .unwrap_or_else(|| "market fetch failed".to_string());
            warn!(error = %reason, "Refusing to pin an instrument from sample market rows");
            return Err(EngineError::MarketDataUnavailable { reason });
        }

        let instrument = match selected {
            Some(strategy) if strategy.direction == HedgeDirection::ShortPerpLongSpot => HedgeInstrument {
                symbol: strategy.base.clone(),
                leverage: decimal_from_f64(strategy.leverage).unwrap_or(self.settings.leverage),
            },
            Some(strategy) => {
                warn!(
                    base = %strategy.base,
                    direction = %strategy.direction,
                    fallback = %configured.symbol,
                    "Selected strategy cannot be executed, using configured symbol"
                );
                configured
            }
            None => {
                warn!(fallback = %configured.symbol, "No strategy selected, using configured symbol");
                configured
            }
        };

        info!(symbol = %instrument.symbol, leverage = %instrument.leverage, "Pinned hedge instrument");
        *pinned = Some(instrument.clone());
        Ok(instrument)
    }

    async fn notify(&self, message: String) {
        match tokio::time::timeout(self.settings.notify_timeout, self.notifier.send(&message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %format!("{:#}", e), "Notification failed"),
            Err(_) => warn!("Notification timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::mock::PaperHolding;
    use crate::exchange::{FailPoint, MarketDataSource, PaperExchange};
    use crate::market::{FundingInterval, MarketSnapshot, DEFAULT_CACHE_TTL};
    use crate::notify::{LogNotifier, MockNotifier};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Notify;

    struct StaticSource(Vec<MarketSnapshot>);

    /// Serves `market_rows()` unless switched off.
    struct SwitchableSource {
        up: AtomicBool,
    }

    #[async_trait]
    impl MarketDataSource for SwitchableSource {
        async fn fetch_snapshots(&self) -> Result<Vec<MarketSnapshot>> {
            if self.up.load(Ordering::SeqCst) {
                Ok(market_rows())
            } else {
                Err(anyhow!("metaAndAssetCtxs 503"))
            }
        }
    }

    /// Paper exchange whose next call through `stall` hangs.
    struct StallingExchange {
        inner: Arc<PaperExchange>,
        stall: std::sync::Mutex<Option<FailPoint>>,
    }

    impl StallingExchange {
        async fn maybe_stall(&self, point: FailPoint) {
            let hit = {
                let mut stall = self.stall.lock().unwrap();
                if *stall == Some(point) {
                    *stall = None;
                    true
                } else {
                    false
                }
            };
            if hit {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    #[async_trait]
    impl ExchangeClient for StallingExchange {
        async fn get_balances(&self) -> Result<Vec<Balance>> {
            self.maybe_stall(FailPoint::Balances).await;
            self.inner.get_balances().await
        }

        async fn get_positions(&self) -> Result<Vec<Position>> {
            self.maybe_stall(FailPoint::Positions).await;
            self.inner.get_positions().await
        }

        async fn get_recent_trades(&self, symbol: &str) -> Result<Vec<Trade>> {
            self.maybe_stall(FailPoint::Trades).await;
            self.inner.get_recent_trades(symbol).await
        }

        async fn place_spot_order(&self, order: &SpotOrder) -> Result<OrderAck> {
            self.maybe_stall(FailPoint::SpotOrder).await;
            self.inner.place_spot_order(order).await
        }

        async fn place_perp_order(&self, order: &PerpOrder) -> Result<OrderAck> {
            self.maybe_stall(FailPoint::PerpOrder).await;
            self.inner.place_perp_order(order).await
        }
    }

    #[async_trait]
    impl MarketDataSource for StaticSource {
        async fn fetch_snapshots(&self) -> Result<Vec<MarketSnapshot>> {
            Ok(self.0.clone())
        }
    }

    /// Blocks inside `send` until released.
    struct GateNotifier {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Notifier for GateNotifier {
        async fn send(&self, _message: &str) -> Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn market_rows() -> Vec<MarketSnapshot> {
        vec![
            MarketSnapshot::new("SOL", 0.0002, FundingInterval::Hourly)
                .with_prices(150.0, Some(150.0))
                .with_premium(0.0001)
                .with_liquidity(1e9, 5e8)
                .with_max_leverage(20.0),
            MarketSnapshot::new("ETH", 0.00001, FundingInterval::Hourly)
                .with_prices(2000.0, Some(2000.0))
                .with_liquidity(1e9, 5e8)
                .with_max_leverage(25.0),
        ]
    }

    fn market() -> Arc<MarketDataCache> {
        Arc::new(MarketDataCache::new(
            Arc::new(StaticSource(market_rows())),
            DEFAULT_CACHE_TTL,
        ))
    }

    fn settings(mode: SelectionMode) -> SchedulerSettings {
        SchedulerSettings {
            symbol: "ETH".to_string(),
            leverage: dec!(1),
            quote_to_deploy: Decimal::ZERO,
            interval: Duration::from_secs(3600),
            selection_mode: mode,
            notify_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
        }
    }

    async fn paper() -> Arc<PaperExchange> {
        let exchange = PaperExchange::new(dec!(10000)).with_fee_rate(Decimal::ZERO);
        exchange.set_price("ETH", dec!(2000)).await;
        exchange.set_price("SOL", dec!(125)).await;
        Arc::new(exchange)
    }

    fn scheduler(
        exchange: Arc<PaperExchange>,
        notifier: Arc<dyn Notifier>,
        mode: SelectionMode,
    ) -> Arc<RebalanceScheduler> {
        Arc::new(RebalanceScheduler::new(
            exchange,
            market(),
            notifier,
            StrategySelector::default(),
            settings(mode),
        ))
    }

    #[test]
    fn test_resolve_budget() {
        // Flat book: quote_to_deploy caps the balance
        assert_eq!(resolve_budget(dec!(500), dec!(1000), dec!(0), dec!(2000)), dec!(500));
        assert_eq!(resolve_budget(dec!(5000), dec!(1000), dec!(0), dec!(2000)), dec!(1000));
        assert_eq!(resolve_budget(dec!(0), dec!(1000), dec!(0), dec!(2000)), dec!(1000));
        // Deployed spot counts toward capital
        assert_eq!(resolve_budget(dec!(0), dec!(0), dec!(5), dec!(2000)), dec!(10000));
        assert_eq!(resolve_budget(dec!(0), dec!(-50), dec!(0), dec!(2000)), dec!(0));
    }

    #[tokio::test]
    async fn test_initial_cycle_establishes_hedge() {
        let exchange = paper().await;
        let sched = scheduler(exchange.clone(), Arc::new(LogNotifier), SelectionMode::Fixed);

        let outcome = sched.run_cycle(CycleKind::Initial).await.unwrap();
        let report = match outcome {
            CycleOutcome::Completed(report) => report,
            other => panic!("unexpected outcome {:?}", other),
        };

        assert_eq!(report.symbol, "ETH");
        assert_eq!(report.selected.as_ref().unwrap().base, "SOL");
        assert!(report.market_origin.is_live());
        assert_eq!(report.evaluated_for, align_to_strategy_schedule(report.evaluated_for));

        let holding = exchange.holding("ETH").await;
        assert_eq!(holding.spot, dec!(5));
        assert_eq!(holding.perp, dec!(-5));
    }

    #[tokio::test]
    async fn test_second_cycle_places_no_orders() {
        let exchange = paper().await;
        let sched = scheduler(exchange.clone(), Arc::new(LogNotifier), SelectionMode::Fixed);

        sched.run_cycle(CycleKind::Initial).await.unwrap();
        let outcome = sched.run_cycle(CycleKind::Rebalance).await.unwrap();

        match outcome {
            CycleOutcome::Completed(CycleReport {
                action: CycleAction::Executed { report, .. },
                ..
            }) => assert_eq!(report.orders_placed(), 0),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(exchange.get_state().await.order_count, 2);
    }

    #[tokio::test]
    async fn test_auto_mode_pins_selected_base() {
        let exchange = paper().await;
        let sched = scheduler(exchange.clone(), Arc::new(LogNotifier), SelectionMode::Auto);

        sched.run_cycle(CycleKind::Initial).await.unwrap();

        // SOL at 125 with capped leverage 2: spot 80, perp -160
        let holding = exchange.holding("SOL").await;
        assert_eq!(holding.spot, dec!(80));
        assert_eq!(holding.perp, dec!(-160));
        assert_eq!(exchange.holding("ETH").await, Default::default());

        let outcome = sched.run_cycle(CycleKind::Rebalance).await.unwrap();
        match outcome {
            CycleOutcome::Completed(report) => assert_eq!(report.symbol, "SOL"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_balance_is_no_deploy() {
        let exchange = Arc::new(PaperExchange::new(dec!(0)));
        exchange.set_price("ETH", dec!(2000)).await;
        let sched = scheduler(exchange.clone(), Arc::new(LogNotifier), SelectionMode::Fixed);

        let outcome = sched.run_cycle(CycleKind::Initial).await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Completed(CycleReport { action: CycleAction::NoDeploy, .. })
        ));
        assert_eq!(exchange.get_state().await.order_count, 0);
    }

    #[tokio::test]
    async fn test_failed_cycle_is_counted_and_notified() {
        let exchange = paper().await;
        exchange.fail_next(FailPoint::Trades).await;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|message: &str| message.starts_with("⚠️"))
            .times(1)
            .returning(|_| Ok(()));

        let sched = scheduler(exchange.clone(), Arc::new(notifier), SelectionMode::Fixed);
        let err = sched.run_cycle(CycleKind::Initial).await.unwrap_err();

        assert!(format!("{:#}", err).contains("Injected"));
        assert_eq!(sched.stats().failed, 1);
        assert_eq!(exchange.get_state().await.order_count, 0);
    }

    #[tokio::test]
    async fn test_partial_hedge_is_counted() {
        let exchange = paper().await;
        exchange.fail_next(FailPoint::PerpOrder).await;
        let sched = scheduler(exchange.clone(), Arc::new(LogNotifier), SelectionMode::Fixed);

        let err = sched.run_cycle(CycleKind::Initial).await.unwrap_err();
        assert!(err.downcast_ref::<EngineError>().unwrap().is_partial());
        assert_eq!(sched.stats().partial_hedges, 1);
        assert_eq!(exchange.holding("ETH").await.spot, dec!(5));
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let exchange = paper().await;
        let gate = Arc::new(GateNotifier {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let sched = scheduler(exchange, gate.clone(), SelectionMode::Fixed);

        let running = {
            let sched = sched.clone();
            tokio::spawn(async move { sched.run_cycle(CycleKind::Initial).await })
        };
        gate.entered.notified().await;

        let outcome = sched.run_cycle(CycleKind::Rebalance).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::SkippedBusy));

        gate.release.notify_one();
        let first = running.await.unwrap().unwrap();
        assert!(matches!(first, CycleOutcome::Completed(_)));

        let stats = sched.stats();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let exchange = paper().await;
        // Initial cycle fails, periodic cycles must still run
        exchange.fail_next(FailPoint::Balances).await;

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|message: &str| message.starts_with("⚠️"))
            .times(1)
            .returning(|_| Ok(()));
        // Delivery errors are swallowed
        notifier
            .expect_send()
            .withf(|message: &str| !message.starts_with("⚠️"))
            .times(2)
            .returning(|_| Err(anyhow!("telegram down")));

        let sched = scheduler(exchange.clone(), Arc::new(notifier), SelectionMode::Fixed);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = {
            let sched = sched.clone();
            tokio::spawn(async move { sched.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_secs(2 * 3600 + 1)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let stats = sched.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(exchange.holding("ETH").await.spot, dec!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_tick() {
        let exchange = paper().await;
        let sched = scheduler(exchange, Arc::new(LogNotifier), SelectionMode::Fixed);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = {
            let sched = sched.clone();
            tokio::spawn(async move { sched.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(shutdown_tx);
        handle.await.unwrap().unwrap();

        assert_eq!(sched.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_auto_mode_does_not_pin_from_sample_rows() {
        let exchange = paper().await;
        let source = Arc::new(SwitchableSource {
            up: AtomicBool::new(false),
        });
        let market = Arc::new(MarketDataCache::new(source.clone(), DEFAULT_CACHE_TTL));
        let sched = RebalanceScheduler::new(
            exchange.clone(),
            market,
            Arc::new(LogNotifier),
            StrategySelector::default(),
            settings(SelectionMode::Auto),
        );

        let err = sched.run_cycle(CycleKind::Initial).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::MarketDataUnavailable { .. })
        ));
        assert_eq!(exchange.get_state().await.order_count, 0);
        assert_eq!(exchange.holding("SOL").await, Default::default());

        // Live data returns: the pick is pinned from real rows
        source.up.store(true, Ordering::SeqCst);
        match sched.run_cycle(CycleKind::Rebalance).await.unwrap() {
            CycleOutcome::Completed(report) => {
                assert_eq!(report.symbol, "SOL");
                assert!(report.market_origin.is_live());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(exchange.holding("SOL").await.spot, dec!(80));
    }

    #[tokio::test]
    async fn test_pinned_instrument_survives_market_outage() {
        let exchange = paper().await;
        let source = Arc::new(SwitchableSource {
            up: AtomicBool::new(true),
        });
        let market = Arc::new(MarketDataCache::new(source.clone(), DEFAULT_CACHE_TTL));
        let sched = RebalanceScheduler::new(
            exchange.clone(),
            market,
            Arc::new(LogNotifier),
            StrategySelector::default(),
            settings(SelectionMode::Auto),
        );

        sched.run_cycle(CycleKind::Initial).await.unwrap();
        source.up.store(false, Ordering::SeqCst);

        match sched.run_cycle(CycleKind::Rebalance).await.unwrap() {
            CycleOutcome::Completed(report) => assert_eq!(report.symbol, "SOL"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fixed_mode_ignores_sample_rows() {
        let exchange = paper().await;
        let source = Arc::new(SwitchableSource {
            up: AtomicBool::new(false),
        });
        let sched = RebalanceScheduler::new(
            exchange.clone(),
            Arc::new(MarketDataCache::new(source, DEFAULT_CACHE_TTL)),
            Arc::new(LogNotifier),
            StrategySelector::default(),
            settings(SelectionMode::Fixed),
        );

        match sched.run_cycle(CycleKind::Initial).await.unwrap() {
            CycleOutcome::Completed(report) => {
                assert_eq!(report.market_origin, DataOrigin::Fallback);
                assert!(report.selected.is_none());
                assert_eq!(report.symbol, "ETH");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        // Priced from the exchange, not the sample rows
        assert_eq!(exchange.holding("ETH").await.spot, dec!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_request_fails_only_that_cycle() {
        let paper = paper().await;
        let exchange = Arc::new(StallingExchange {
            inner: paper.clone(),
            stall: std::sync::Mutex::new(Some(FailPoint::Trades)),
        });
        let sched = RebalanceScheduler::new(
            exchange,
            market(),
            Arc::new(LogNotifier),
            StrategySelector::default(),
            settings(SelectionMode::Fixed),
        );

        let err = sched.run_cycle(CycleKind::Initial).await.unwrap_err();
        assert!(format!("{:#}", err).contains("timed out"));
        assert_eq!(paper.get_state().await.order_count, 0);

        let outcome = sched.run_cycle(CycleKind::Rebalance).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Completed(_)));

        let stats = sched.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(paper.holding("ETH").await.spot, dec!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_perp_order_is_partial_hedge() {
        let paper = paper().await;
        let exchange = Arc::new(StallingExchange {
            inner: paper.clone(),
            stall: std::sync::Mutex::new(Some(FailPoint::PerpOrder)),
        });
        let sched = RebalanceScheduler::new(
            exchange,
            market(),
            Arc::new(LogNotifier),
            StrategySelector::default(),
            settings(SelectionMode::Fixed),
        );

        let err = sched.run_cycle(CycleKind::Initial).await.unwrap_err();
        let engine_err = err.downcast_ref::<EngineError>().unwrap();
        assert!(engine_err.is_partial());
        assert!(engine_err.to_string().contains("timed out"));
        assert_eq!(paper.holding("ETH").await, PaperHolding { spot: dec!(5), perp: dec!(0) });
    }
}
