//! Deposit and withdrawal orchestration
//!
//! Composes ledger operations with the payment initiator: create the
//! pending transaction, ask the gateway to move the money, and record the
//! provider reference the settlement callback will join on. A gateway
//! rejection marks the transaction failed — a caller-side failure never
//! leaves a row permanently pending.

use crate::error::{Error, Result};
use crate::gateway::PaymentInitiator;
use ledger_core::{Ledger, NetworkCode, PhoneNumber, UserId};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Receipt for an initiated deposit
#[derive(Debug, Clone)]
pub struct DepositReceipt {
    /// Pending ledger transaction
    pub transaction_id: Uuid,

    /// Gateway reference the callback will carry
    pub provider_reference: String,
}

/// Receipt for an initiated withdrawal
#[derive(Debug, Clone)]
pub struct WithdrawalReceipt {
    /// Pending ledger transaction
    pub transaction_id: Uuid,

    /// Gateway reference the callback will carry
    pub provider_reference: String,
}

/// Savings engine: gateway-backed money movement over the ledger
pub struct SavingsEngine {
    ledger: Arc<Ledger>,
    gateway: Arc<dyn PaymentInitiator>,
}

impl SavingsEngine {
    /// Create a new engine
    pub fn new(ledger: Arc<Ledger>, gateway: Arc<dyn PaymentInitiator>) -> Self {
        Self { ledger, gateway }
    }

    /// The underlying ledger (lock and read operations go straight to it)
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Start a deposit: pending transaction, then STK push
    ///
    /// The balance is credited only when the gateway callback settles the
    /// transaction.
    pub async fn deposit(
        &self,
        user: &UserId,
        amount: Decimal,
        phone: &str,
    ) -> Result<DepositReceipt> {
        let phone = PhoneNumber::parse(phone)?;

        let transaction = self
            .ledger
            .initiate_deposit(user.clone(), amount, phone.clone())
            .await?;

        match self
            .gateway
            .initiate_collection(&phone, amount, &transaction.id.to_string())
            .await
        {
            Ok(receipt) => {
                self.ledger
                    .attach_provider_reference(
                        transaction.id,
                        receipt.provider_reference.clone(),
                    )
                    .await?;

                tracing::info!(
                    transaction_id = %transaction.id,
                    provider_reference = %receipt.provider_reference,
                    amount = %amount,
                    "Deposit initiated"
                );

                Ok(DepositReceipt {
                    transaction_id: transaction.id,
                    provider_reference: receipt.provider_reference,
                })
            }
            Err(err) => {
                self.ledger
                    .mark_transaction_failed(transaction.id, err.to_string())
                    .await?;
                Err(Error::Gateway(format!("Deposit initiation failed: {}", err)))
            }
        }
    }

    /// Start a withdrawal: reserve against the available balance, then
    /// disburse
    ///
    /// The debit is deferred until the gateway confirms the payout.
    pub async fn withdraw(
        &self,
        user: &UserId,
        amount: Decimal,
        phone: &str,
        network_code: &str,
    ) -> Result<WithdrawalReceipt> {
        let phone = PhoneNumber::parse(phone)?;
        let network = NetworkCode::parse(network_code)?;

        let transaction = self
            .ledger
            .initiate_withdrawal(user.clone(), amount, phone.clone(), network)
            .await?;

        match self
            .gateway
            .initiate_disbursement(&phone, amount, network)
            .await
        {
            Ok(receipt) => {
                self.ledger
                    .attach_provider_reference(
                        transaction.id,
                        receipt.provider_reference.clone(),
                    )
                    .await?;

                tracing::info!(
                    transaction_id = %transaction.id,
                    provider_reference = %receipt.provider_reference,
                    amount = %amount,
                    network = %network,
                    "Withdrawal initiated"
                );

                Ok(WithdrawalReceipt {
                    transaction_id: transaction.id,
                    provider_reference: receipt.provider_reference,
                })
            }
            Err(err) => {
                self.ledger
                    .mark_transaction_failed(transaction.id, err.to_string())
                    .await?;
                Err(Error::Gateway(format!(
                    "Withdrawal initiation failed: {}",
                    err
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockGateway;
    use ledger_core::{Config, TransactionStatus};
    use rust_decimal_macros::dec;

    async fn test_engine(gateway: MockGateway) -> SavingsEngine {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        std::mem::forget(temp_dir);

        let ledger = Arc::new(Ledger::open(config).await.unwrap());
        SavingsEngine::new(ledger, Arc::new(gateway))
    }

    #[tokio::test]
    async fn test_deposit_creates_pending_with_reference() {
        let engine = test_engine(MockGateway::new()).await;
        let user = UserId::new("user-1");
        engine.ledger().create_account(user.clone()).await.unwrap();

        let receipt = engine
            .deposit(&user, dec!(100.00), "254712345678")
            .await
            .unwrap();

        let tx = engine
            .ledger()
            .get_transaction(user, receipt.transaction_id)
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(
            tx.provider_reference.as_deref(),
            Some(receipt.provider_reference.as_str())
        );
    }

    #[tokio::test]
    async fn test_deposit_rejects_bad_phone() {
        let engine = test_engine(MockGateway::new()).await;
        let user = UserId::new("user-1");
        engine.ledger().create_account(user.clone()).await.unwrap();

        let result = engine.deposit(&user, dec!(100.00), "0712345678").await;
        assert!(matches!(
            result,
            Err(Error::Ledger(ledger_core::Error::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_gateway_failure_marks_transaction_failed() {
        let engine = test_engine(MockGateway::failing()).await;
        let user = UserId::new("user-1");
        engine.ledger().create_account(user.clone()).await.unwrap();

        let result = engine.deposit(&user, dec!(100.00), "254712345678").await;
        assert!(matches!(result, Err(Error::Gateway(_))));

        // The pending row was flipped to Failed, not abandoned
        let log = engine
            .ledger()
            .list_transactions(user.clone(), None)
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, TransactionStatus::Failed);

        let view = engine.ledger().get_balance(user).await.unwrap();
        assert_eq!(view.total, dec!(0.00));
    }

    #[tokio::test]
    async fn test_withdraw_validates_network_code() {
        let engine = test_engine(MockGateway::new()).await;
        let user = UserId::new("user-1");
        engine.ledger().create_account(user.clone()).await.unwrap();

        let result = engine
            .withdraw(&user, dec!(50.00), "254712345678", "99999")
            .await;
        assert!(matches!(
            result,
            Err(Error::Ledger(ledger_core::Error::Validation(_)))
        ));
    }
}
