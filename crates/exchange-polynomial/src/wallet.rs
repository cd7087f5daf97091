use anyhow::{Context, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use ethers::utils::keccak256;
use perp_pilot_core::types::ChatUserId;

/// Derives the signing wallet for a chat user.
///
/// The private key is keccak256 of the decimal chat user id, so the same user
/// always recovers the same on-venue identity with no stored secret beyond
/// the chat platform's own id.
///
/// # Errors
/// Returns an error if the hash falls outside the secp256k1 scalar field
/// (practically unreachable).
pub fn derive_wallet(chat_user_id: ChatUserId, chain_id: u64) -> Result<LocalWallet> {
    let seed = keccak256(chat_user_id.to_string().as_bytes());
    let wallet = LocalWallet::from_bytes(&seed)
        .context("Failed to derive wallet from chat user id")?;
    Ok(wallet.with_chain_id(chain_id))
}

/// Address the wallet for this chat user will have.
///
/// # Errors
/// Same failure mode as [`derive_wallet`].
pub fn derived_address(chat_user_id: ChatUserId, chain_id: u64) -> Result<Address> {
    Ok(derive_wallet(chat_user_id, chain_id)?.address())
}
