use ethers::types::{Address, Signature};
use std::str::FromStr;

use crate::crypto::hash::signature_fingerprint;
use crate::error::{AppError, Result};

/// A player intent as it arrives on a mutating endpoint.
#[derive(Debug, Clone)]
pub struct SignedAction<'a> {
    pub actor_address: &'a str,
    pub action_tag: &'static str,
    pub nonce: u64,
    pub signature: &'a str,
}

/// The exact text a wallet signs for an action: `TAG:nonce`.
pub fn action_message(action_tag: &str, nonce: u64) -> String {
    format!("{}:{}", action_tag, nonce)
}

/// EIP-191 personal-message signature checks
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Recovers the signer of `message` and requires it to be `claimed_address`.
    /// Returns the normalized actor address.
    pub fn verify(message: &str, claimed_address: &str, signature: &str) -> Result<String> {
        if claimed_address.trim().is_empty() || signature.trim().is_empty() {
            return Err(AppError::AuthError(
                "Address or signature cannot be empty".into(),
            ));
        }

        let claimed = Address::from_str(claimed_address.trim())
            .map_err(|_| AppError::AuthError(format!("Invalid address: {}", claimed_address)))?;
        let signature = Signature::from_str(signature.trim()).map_err(|_| AppError::InvalidSignature)?;
        let recovered = signature
            .recover(message)
            .map_err(|_| AppError::InvalidSignature)?;

        if recovered != claimed {
            tracing::debug!(
                "Signature mismatch: claimed={:#x} recovered={:#x}",
                claimed,
                recovered
            );
            return Err(AppError::InvalidSignature);
        }

        Ok(format!("{:#x}", claimed))
    }

    /// Verifies a nonce-bearing action. The nonce is the client's unix time in
    /// milliseconds and must be within `max_age_secs` of `now_ms` either way.
    pub fn verify_action(action: &SignedAction<'_>, max_age_secs: u64, now_ms: i64) -> Result<String> {
        let skew_ms = i64::try_from(action.nonce)
            .ok()
            .and_then(|nonce| now_ms.checked_sub(nonce))
            .map(i64::unsigned_abs)
            .unwrap_or(u64::MAX);
        if skew_ms > max_age_secs.saturating_mul(1_000) {
            tracing::info!(
                "Stale {} nonce from {} (skew {}ms, sig {})",
                action.action_tag,
                action.actor_address,
                skew_ms,
                signature_fingerprint(action.signature)
            );
            return Err(AppError::AuthError("Stale nonce".into()));
        }

        let message = action_message(action.action_tag, action.nonce);
        Self::verify(&message, action.actor_address, action.signature)
    }
}
