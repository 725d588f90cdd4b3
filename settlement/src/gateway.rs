//! Payment initiator abstraction
//!
//! The mobile-money gateway is consumed as a capability: initiate a
//! collection (deposit) or a disbursement (withdrawal), receive a provider
//! reference, and wait for the asynchronous callback. The concrete HTTP
//! client lives outside this crate; tests use [`MockGateway`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use ledger_core::{NetworkCode, PhoneNumber};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Successful initiation response from the gateway
#[derive(Debug, Clone)]
pub struct InitiationReceipt {
    /// Gateway-assigned reference, echoed back in the settlement callback
    pub provider_reference: String,

    /// Human-readable gateway message, when present
    pub message: Option<String>,
}

/// Capability to start mobile-money collections and disbursements
#[async_trait]
pub trait PaymentInitiator: Send + Sync {
    /// Ask the gateway to collect `amount` from `phone` (STK push)
    async fn initiate_collection(
        &self,
        phone: &PhoneNumber,
        amount: Decimal,
        reference: &str,
    ) -> Result<InitiationReceipt>;

    /// Ask the gateway to pay `amount` out to `phone` on `network`
    async fn initiate_disbursement(
        &self,
        phone: &PhoneNumber,
        amount: Decimal,
        network: NetworkCode,
    ) -> Result<InitiationReceipt>;
}

/// Request recorded by the mock gateway
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Target phone number
    pub phone: PhoneNumber,

    /// Requested amount
    pub amount: Decimal,

    /// Caller-supplied account reference (collections only)
    pub account_reference: Option<String>,

    /// Carrier network (disbursements only)
    pub network: Option<NetworkCode>,

    /// Reference the mock handed back
    pub provider_reference: String,
}

/// In-memory gateway for tests
///
/// Succeeds with a `MOCK-<uuid>` reference by default; construct with
/// [`MockGateway::failing`] to simulate the gateway rejecting initiations.
pub struct MockGateway {
    failing: bool,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
}

impl MockGateway {
    /// Gateway that accepts every initiation
    pub fn new() -> Self {
        Self {
            failing: false,
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Gateway that rejects every initiation
    pub fn failing() -> Self {
        Self {
            failing: true,
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Requests seen so far
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// Provider reference of the most recent request
    pub async fn last_reference(&self) -> Option<String> {
        self.requests
            .read()
            .await
            .last()
            .map(|r| r.provider_reference.clone())
    }

    async fn record(&self, request: RecordedRequest) {
        self.requests.write().await.push(request);
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentInitiator for MockGateway {
    async fn initiate_collection(
        &self,
        phone: &PhoneNumber,
        amount: Decimal,
        reference: &str,
    ) -> Result<InitiationReceipt> {
        if self.failing {
            return Err(Error::Gateway("Simulated gateway failure".to_string()));
        }

        let provider_reference = format!("MOCK-{}", Uuid::new_v4());
        self.record(RecordedRequest {
            phone: phone.clone(),
            amount,
            account_reference: Some(reference.to_string()),
            network: None,
            provider_reference: provider_reference.clone(),
        })
        .await;

        Ok(InitiationReceipt {
            provider_reference,
            message: Some("STK push initiated".to_string()),
        })
    }

    async fn initiate_disbursement(
        &self,
        phone: &PhoneNumber,
        amount: Decimal,
        network: NetworkCode,
    ) -> Result<InitiationReceipt> {
        if self.failing {
            return Err(Error::Gateway("Simulated gateway failure".to_string()));
        }

        let provider_reference = format!("MOCK-{}", Uuid::new_v4());
        self.record(RecordedRequest {
            phone: phone.clone(),
            amount,
            account_reference: None,
            network: Some(network),
            provider_reference: provider_reference.clone(),
        })
        .await;

        Ok(InitiationReceipt {
            provider_reference,
            message: Some("Disbursement initiated".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_collection_success() {
        let gateway = MockGateway::new();
        let phone = PhoneNumber::parse("254712345678").unwrap();

        let receipt = gateway
            .initiate_collection(&phone, dec!(100.00), "TX-1")
            .await
            .unwrap();
        assert!(receipt.provider_reference.starts_with("MOCK-"));

        let requests = gateway.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].account_reference.as_deref(), Some("TX-1"));
        assert_eq!(
            gateway.last_reference().await,
            Some(receipt.provider_reference)
        );
    }

    #[tokio::test]
    async fn test_mock_disbursement_records_network() {
        let gateway = MockGateway::new();
        let phone = PhoneNumber::parse("254712345678").unwrap();

        gateway
            .initiate_disbursement(&phone, dec!(50.00), NetworkCode::Airtel)
            .await
            .unwrap();

        let requests = gateway.requests().await;
        assert_eq!(requests[0].network, Some(NetworkCode::Airtel));
    }

    #[tokio::test]
    async fn test_mock_failing_gateway() {
        let gateway = MockGateway::failing();
        let phone = PhoneNumber::parse("254712345678").unwrap();

        let result = gateway
            .initiate_collection(&phone, dec!(100.00), "TX-1")
            .await;
        assert!(matches!(result, Err(Error::Gateway(_))));
        assert!(gateway.requests().await.is_empty());
    }
}
