//! Standing price alerts, at most one per chat user. Targets are at the
//! 8-decimal price scale. Alerts are one-shot: the monitor removes them the
//! moment their crossing fires.

use ethers::types::U256;
use perp_pilot_core::types::ChatUserId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct AlertRegistry {
    alerts: Arc<RwLock<HashMap<ChatUserId, U256>>>,
}

impl AlertRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the alert for a user, returning the prior target if one existed.
    pub async fn set(&self, chat_user_id: ChatUserId, target_price: U256) -> Option<U256> {
        self.alerts.write().await.insert(chat_user_id, target_price)
    }

    pub async fn remove(&self, chat_user_id: ChatUserId) -> Option<U256> {
        self.alerts.write().await.remove(&chat_user_id)
    }

    /// Every standing alert. The monitor evaluates one snapshot per tick so
    /// all alerts see the same price sample.
    #[must_use]
    pub async fn snapshot(&self) -> Vec<(ChatUserId, U256)> {
        self.alerts
            .read()
            .await
            .iter()
            .map(|(id, target)| (*id, *target))
            .collect()
    }

    #[must_use]
    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.alerts.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_alert_per_user_new_overwrites_old() {
        let registry = AlertRegistry::new();
        assert_eq!(registry.set(ChatUserId(1), U256::from(2950)).await, None);
        assert_eq!(
            registry.set(ChatUserId(1), U256::from(3100)).await,
            Some(U256::from(2950))
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn remove_clears_the_alert() {
        let registry = AlertRegistry::new();
        registry.set(ChatUserId(1), U256::from(2950)).await;
        assert_eq!(registry.remove(ChatUserId(1)).await, Some(U256::from(2950)));
        assert!(registry.is_empty().await);
        assert_eq!(registry.remove(ChatUserId(1)).await, None);
    }
}
