//! Settlement reconciler
//!
//! Consumes raw gateway callbacks — at-least-once, possibly duplicated,
//! possibly out of order — and applies each exactly once to its pending
//! transaction. Authenticity is checked before anything else; duplicate
//! deliveries short-circuit on the ledger's terminal-state check and are
//! reported back as success so the gateway stops retrying.

use crate::error::{Error, Result};
use crate::{callback, signature};
use ledger_core::{Ledger, SettlementOutcome, TransactionStatus};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Result of one callback delivery
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The callback settled its transaction
    Applied {
        /// Settled transaction ID
        transaction_id: Uuid,
        /// Terminal status the row moved to
        status: TransactionStatus,
    },
    /// The transaction was already terminal; nothing changed
    AlreadyProcessed {
        /// Matched transaction ID
        transaction_id: Uuid,
        /// Terminal status observed
        status: TransactionStatus,
    },
}

/// Applies gateway callbacks to the ledger
pub struct Reconciler {
    ledger: Arc<Ledger>,

    /// Shared secret; when set, unsigned or mis-signed callbacks are
    /// rejected before any lookup
    secret: Option<String>,
}

impl Reconciler {
    /// Create a reconciler
    pub fn new(ledger: Arc<Ledger>, secret: Option<String>) -> Self {
        Self { ledger, secret }
    }

    /// Apply one callback delivery
    pub async fn apply(
        &self,
        raw_body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<ReconcileOutcome> {
        if let Some(secret) = &self.secret {
            let sig = signature::extract_signature(headers).ok_or_else(|| {
                Error::Unauthenticated("Missing callback signature".to_string())
            })?;
            if !signature::verify(raw_body, &sig, secret) {
                return Err(Error::Unauthenticated(
                    "Invalid callback signature".to_string(),
                ));
            }
        }

        let event = callback::parse(raw_body)?;

        tracing::info!(
            reference = %event.reference,
            succeeded = event.succeeded,
            "Gateway callback received"
        );

        let outcome = self
            .ledger
            .settle(
                &event.reference,
                event.succeeded,
                event.description,
                Some(event.raw),
            )
            .await
            .map_err(|e| {
                tracing::warn!(reference = %event.reference, error = %e, "Callback not applied");
                e
            })?;

        match outcome {
            SettlementOutcome::Applied { transaction, .. } => Ok(ReconcileOutcome::Applied {
                transaction_id: transaction.id,
                status: transaction.status,
            }),
            SettlementOutcome::AlreadyProcessed {
                transaction_id,
                status,
            } => Ok(ReconcileOutcome::AlreadyProcessed {
                transaction_id,
                status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::{Config, PhoneNumber, UserId};
    use rust_decimal_macros::dec;

    async fn test_ledger() -> Arc<Ledger> {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        std::mem::forget(temp_dir);

        Arc::new(Ledger::open(config).await.unwrap())
    }

    async fn pending_deposit(ledger: &Ledger, reference: &str) -> UserId {
        let user = UserId::new("user-1");
        ledger.create_account(user.clone()).await.unwrap();

        let phone = PhoneNumber::parse("254712345678").unwrap();
        let tx = ledger
            .initiate_deposit(user.clone(), dec!(100.00), phone)
            .await
            .unwrap();
        ledger
            .attach_provider_reference(tx.id, reference.to_string())
            .await
            .unwrap();
        user
    }

    #[tokio::test]
    async fn test_apply_unsigned_when_no_secret() {
        let ledger = test_ledger().await;
        let user = pending_deposit(&ledger, "REF-1").await;

        let reconciler = Reconciler::new(ledger.clone(), None);
        let outcome = reconciler
            .apply(
                br#"{"reference":"REF-1","success":true}"#,
                &HashMap::new(),
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ReconcileOutcome::Applied {
                status: TransactionStatus::Success,
                ..
            }
        ));
        let view = ledger.get_balance(user).await.unwrap();
        assert_eq!(view.total, dec!(100.00));
    }

    #[tokio::test]
    async fn test_signature_checked_before_lookup() {
        let ledger = test_ledger().await;
        let reconciler = Reconciler::new(ledger, Some("secret".to_string()));

        // Unknown reference, but the signature failure wins
        let result = reconciler
            .apply(
                br#"{"reference":"REF-UNKNOWN","success":true}"#,
                &HashMap::new(),
            )
            .await;
        assert!(matches!(result, Err(Error::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn test_signed_callback_accepted() {
        let ledger = test_ledger().await;
        pending_deposit(&ledger, "REF-1").await;

        let secret = "shared-secret";
        let reconciler = Reconciler::new(ledger, Some(secret.to_string()));

        let body = br#"{"reference":"REF-1","success":true}"#;
        let mut headers = HashMap::new();
        headers.insert(
            "x-gateway-signature".to_string(),
            signature::sign(body, secret),
        );

        let outcome = reconciler.apply(body, &headers).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
    }

    #[tokio::test]
    async fn test_unknown_reference_surfaces_not_found() {
        let ledger = test_ledger().await;
        let reconciler = Reconciler::new(ledger, None);

        let result = reconciler
            .apply(
                br#"{"reference":"REF-GHOST","success":true}"#,
                &HashMap::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(Error::Ledger(ledger_core::Error::TransactionNotFound(_)))
        ));
    }
}
