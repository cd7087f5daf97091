//! Per-user session state: the deterministic signing wallet and the bound
//! trading account. Keyed by chat user id so concurrent users never share a
//! signer.

use ethers::signers::Signer;
use ethers::types::Address;
use perp_pilot_core::types::ChatUserId;
use perp_pilot_polynomial::wallet::derive_wallet;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The user has not run the session-binding command yet.
    #[error("no session for chat user {0}; send /start first")]
    NoSession(ChatUserId),

    /// The session already carries a different account id.
    #[error("chat user {0} is already bound to account {1}")]
    AccountAlreadyBound(ChatUserId, u128),

    /// Wallet derivation failed; without an identity nothing else can run.
    #[error("identity derivation failed: {0}")]
    Derivation(#[from] anyhow::Error),
}

#[derive(Clone, Debug)]
pub struct Session {
    pub chat_user_id: ChatUserId,
    pub wallet: ethers::signers::LocalWallet,
    pub address: Address,
    pub account_id: Option<u128>,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<ChatUserId, Session>>>,
    chain_id: u64,
}

impl SessionStore {
    #[must_use]
    pub fn new(chain_id: u64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            chain_id,
        }
    }

    /// Creates the session for a chat user, or returns the existing one.
    ///
    /// Derivation is deterministic, so rebinding after a restart reproduces
    /// the same address and the account can be rediscovered via lookup.
    ///
    /// # Errors
    /// Returns [`SessionError::Derivation`] if the wallet cannot be derived.
    pub async fn bind(&self, chat_user_id: ChatUserId) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&chat_user_id) {
            return Ok(existing.clone());
        }

        let wallet = derive_wallet(chat_user_id, self.chain_id)?;
        let session = Session {
            chat_user_id,
            address: wallet.address(),
            wallet,
            account_id: None,
        };
        info!(user = %chat_user_id, address = ?session.address, "Session bound");
        sessions.insert(chat_user_id, session.clone());
        Ok(session)
    }

    /// Returns the session, or the "no session yet" precondition error.
    ///
    /// # Errors
    /// Returns [`SessionError::NoSession`] when the user never bound one.
    pub async fn get(&self, chat_user_id: ChatUserId) -> Result<Session, SessionError> {
        self.sessions
            .read()
            .await
            .get(&chat_user_id)
            .cloned()
            .ok_or(SessionError::NoSession(chat_user_id))
    }

    /// Binds the trading account id. Set-once: rebinding the same id is a
    /// no-op, a different id is rejected.
    ///
    /// # Errors
    /// Returns [`SessionError::NoSession`] or
    /// [`SessionError::AccountAlreadyBound`].
    pub async fn set_account(
        &self,
        chat_user_id: ChatUserId,
        account_id: u128,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&chat_user_id)
            .ok_or(SessionError::NoSession(chat_user_id))?;

        match session.account_id {
            None => {
                session.account_id = Some(account_id);
                info!(user = %chat_user_id, account_id, "Account bound to session");
                Ok(())
            }
            Some(existing) if existing == account_id => Ok(()),
            Some(existing) => Err(SessionError::AccountAlreadyBound(chat_user_id, existing)),
        }
    }

    #[must_use]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[must_use]
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN_ID: u64 = 80_008;

    #[tokio::test]
    async fn bind_twice_yields_identical_identity() {
        let store = SessionStore::new(CHAIN_ID);
        let first = store.bind(ChatUserId(42)).await.unwrap();
        let second = store.bind(ChatUserId(42)).await.unwrap();
        assert_eq!(first.address, second.address);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn users_get_isolated_sessions() {
        let store = SessionStore::new(CHAIN_ID);
        let a = store.bind(ChatUserId(1)).await.unwrap();
        let b = store.bind(ChatUserId(2)).await.unwrap();
        assert_ne!(a.address, b.address);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn get_without_bind_is_a_precondition_error() {
        let store = SessionStore::new(CHAIN_ID);
        let err = store.get(ChatUserId(7)).await.unwrap_err();
        assert!(matches!(err, SessionError::NoSession(ChatUserId(7))));
    }

    #[tokio::test]
    async fn account_binding_is_set_once() {
        let store = SessionStore::new(CHAIN_ID);
        store.bind(ChatUserId(5)).await.unwrap();

        store.set_account(ChatUserId(5), 100).await.unwrap();
        // Same id again is fine.
        store.set_account(ChatUserId(5), 100).await.unwrap();
        // A different id is not.
        let err = store.set_account(ChatUserId(5), 101).await.unwrap_err();
        assert!(matches!(err, SessionError::AccountAlreadyBound(_, 100)));

        let session = store.get(ChatUserId(5)).await.unwrap();
        assert_eq!(session.account_id, Some(100));
    }
}
