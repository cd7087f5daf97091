//! Price polling loop: fetch, evaluate standing alerts against the previous
//! successful sample, notify on edge crossings, one-shot removal.

use crate::alerts::AlertRegistry;
use ethers::types::U256;
use perp_pilot_core::scale::{from_fixed_unsigned, PRICE_DECIMALS};
use perp_pilot_core::traits::{Notifier, PriceOracle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

pub struct PriceMonitor {
    oracle: Arc<dyn PriceOracle>,
    alerts: AlertRegistry,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    /// Last successfully sampled price. A failed fetch never touches this,
    /// so a gap in the feed cannot fire or clear an alert.
    previous: Option<U256>,
    should_stop: Arc<AtomicBool>,
}

impl PriceMonitor {
    #[must_use]
    pub fn new(
        oracle: Arc<dyn PriceOracle>,
        alerts: AlertRegistry,
        notifier: Arc<dyn Notifier>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            oracle,
            alerts,
            notifier,
            poll_interval,
            previous: None,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle to stop the polling loop.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.should_stop.clone()
    }

    /// Runs the polling loop until the stop handle is set. Ticks are
    /// serialized: evaluation happens inline in this task, so a slow fetch
    /// delays the next tick instead of overlapping it.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.poll_interval.as_millis() as u64, "Price monitor started");

        loop {
            interval.tick().await;
            if self.should_stop.load(Ordering::SeqCst) {
                info!("Price monitor stopping");
                return;
            }
            self.tick().await;
        }
    }

    /// One sample-evaluate-notify pass. Public mainly so tests can drive the
    /// state machine without the timer.
    pub async fn tick(&mut self) {
        let current = match self.oracle.latest_price().await {
            Ok(price) => price,
            Err(e) => {
                warn!("Price fetch failed, skipping tick: {e:#}");
                return;
            }
        };

        if let Some(previous) = self.previous {
            for (chat_user_id, target) in self.alerts.snapshot().await {
                if crossed(previous, current, target) {
                    self.fire(chat_user_id, target, current).await;
                }
            }
        }

        self.previous = Some(current);
    }

    async fn fire(&self, chat_user_id: perp_pilot_core::types::ChatUserId, target: U256, current: U256) {
        let target_usd = from_fixed_unsigned(target, PRICE_DECIMALS).unwrap_or_default();
        let current_usd = from_fixed_unsigned(current, PRICE_DECIMALS).unwrap_or_default();
        let text = format!(
            "Alert! ETH has reached your target price of {target_usd} USD. Current price: {current_usd} USD"
        );

        // One-shot: the alert is consumed even if delivery fails, so one
        // crossing yields at most one notification attempt.
        self.alerts.remove(chat_user_id).await;
        if let Err(e) = self.notifier.notify(chat_user_id, &text).await {
            warn!(user = %chat_user_id, "Alert notification delivery failed: {e:#}");
        }
    }
}

/// Edge-crossing detection: the price moved from one side of the target to
/// at-or-past it between consecutive samples. Sitting on the far side of the
/// target without having crossed it fires nothing.
fn crossed(previous: U256, current: U256, target: U256) -> bool {
    (previous < target && current >= target) || (previous > target && current <= target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use perp_pilot_core::types::ChatUserId;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn price8(usd: u64) -> U256 {
        U256::from(usd) * U256::exp10(8)
    }

    /// Oracle fed from a scripted queue of results.
    struct ScriptedOracle {
        samples: Mutex<VecDeque<Result<U256>>>,
    }

    impl ScriptedOracle {
        fn new(samples: Vec<Result<U256>>) -> Arc<Self> {
            Arc::new(Self {
                samples: Mutex::new(samples.into()),
            })
        }
    }

    #[async_trait]
    impl PriceOracle for ScriptedOracle {
        async fn latest_price(&self) -> Result<U256> {
            self.samples
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(ChatUserId, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, chat_id: ChatUserId, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    fn monitor_with(
        samples: Vec<Result<U256>>,
        alerts: &AlertRegistry,
    ) -> (PriceMonitor, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = PriceMonitor::new(
            ScriptedOracle::new(samples),
            alerts.clone(),
            notifier.clone(),
            Duration::from_millis(1),
        );
        (monitor, notifier)
    }

    #[test]
    fn crossing_requires_an_edge() {
        let t = price8(2950);
        assert!(crossed(price8(2900), price8(3000), t)); // upward through
        assert!(crossed(price8(3000), price8(2900), t)); // downward through
        assert!(crossed(price8(2900), t, t)); // at-or-above touch
        assert!(crossed(price8(3000), t, t)); // at-or-below touch
        assert!(!crossed(price8(3000), price8(3100), t)); // stays above
        assert!(!crossed(price8(2800), price8(2900), t)); // stays below
        assert!(!crossed(t, t, t)); // parked on target
    }

    #[tokio::test]
    async fn upward_crossing_fires_once_and_consumes_the_alert() {
        let alerts = AlertRegistry::new();
        alerts.set(ChatUserId(1), price8(2950)).await;

        let (mut monitor, notifier) = monitor_with(
            vec![Ok(price8(2900)), Ok(price8(3000)), Ok(price8(3100))],
            &alerts,
        );

        monitor.tick().await; // seeds previous = 2900
        monitor.tick().await; // 2900 -> 3000 crosses 2950
        monitor.tick().await; // no alert left, nothing to fire

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChatUserId(1));
        assert!(sent[0].1.contains("2950"));
        drop(sent);
        assert!(alerts.is_empty().await);
    }

    #[tokio::test]
    async fn downward_crossing_fires() {
        let alerts = AlertRegistry::new();
        alerts.set(ChatUserId(9), price8(2950)).await;

        let (mut monitor, notifier) =
            monitor_with(vec![Ok(price8(3000)), Ok(price8(2940))], &alerts);
        monitor.tick().await;
        monitor.tick().await;

        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert!(alerts.is_empty().await);
    }

    #[tokio::test]
    async fn failed_fetch_fires_nothing_and_keeps_previous() {
        let alerts = AlertRegistry::new();
        alerts.set(ChatUserId(1), price8(2950)).await;

        let (mut monitor, notifier) = monitor_with(
            vec![
                Ok(price8(2900)),
                Err(anyhow!("oracle unreachable")),
                Ok(price8(3000)),
            ],
            &alerts,
        );

        monitor.tick().await;
        monitor.tick().await; // failed fetch: previous stays 2900
        assert_eq!(monitor.previous, Some(price8(2900)));
        assert!(notifier.sent.lock().unwrap().is_empty());

        monitor.tick().await; // 2900 -> 3000 still detects the crossing
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn first_sample_only_seeds() {
        let alerts = AlertRegistry::new();
        alerts.set(ChatUserId(1), price8(2950)).await;

        // First ever sample is already past the target; without a previous
        // sample there is no edge, so nothing fires.
        let (mut monitor, notifier) = monitor_with(vec![Ok(price8(3000))], &alerts);
        monitor.tick().await;

        assert!(notifier.sent.lock().unwrap().is_empty());
        assert_eq!(alerts.len().await, 1);
        assert_eq!(monitor.previous, Some(price8(3000)));
    }

    #[tokio::test]
    async fn all_alerts_evaluated_against_the_same_sample() {
        let alerts = AlertRegistry::new();
        alerts.set(ChatUserId(1), price8(2950)).await;
        alerts.set(ChatUserId(2), price8(2990)).await;
        alerts.set(ChatUserId(3), price8(3500)).await;

        let (mut monitor, notifier) =
            monitor_with(vec![Ok(price8(2900)), Ok(price8(3000))], &alerts);
        monitor.tick().await;
        monitor.tick().await;

        let mut fired: Vec<i64> = notifier
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.0)
            .collect();
        fired.sort_unstable();
        assert_eq!(fired, vec![1, 2]);
        assert_eq!(alerts.len().await, 1); // 3500 target still standing
    }
}
