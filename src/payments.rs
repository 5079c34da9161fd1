use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

const STRIPE_INTENTS_URL: &str = "https://api.stripe.com/v1/payment_intents";

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Transport failure talking to the processor
    #[error("payment processor unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The processor answered with a non-success status
    #[error("payment processor rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

// 1. PaymentService Contract
/// PaymentService
///
/// Abstracts the external payment processor so handlers can be exercised against
/// `MockPaymentService` without network access.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Creates a payment intent for `amount` minor units of `currency` and returns
    /// the client secret the browser uses to confirm it.
    async fn create_payment_intent(&self, amount: i64, currency: &str)
    -> Result<String, PaymentError>;
}

// 2. The Real Implementation (Stripe)
/// StripeClient
///
/// Talks to the Stripe REST API with the secret key as bearer credential.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
}

#[derive(Deserialize)]
struct IntentResponse {
    client_secret: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: String,
}

impl StripeClient {
    pub fn new(secret_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.to_string(),
        }
    }
}

#[async_trait]
impl PaymentService for StripeClient {
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> Result<String, PaymentError> {
        let amount = amount.to_string();
        let response = self
            .http
            .post(STRIPE_INTENTS_URL)
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("payment_method_types[]", "card"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let intent = response.json::<IntentResponse>().await?;
        Ok(intent.client_secret)
    }
}

// 3. The Mock Implementation (For Tests)
/// MockPaymentService
///
/// Returns a deterministic client secret, or a rejection when `should_fail` is set.
#[derive(Clone, Default)]
pub struct MockPaymentService {
    pub should_fail: bool,
}

impl MockPaymentService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl PaymentService for MockPaymentService {
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> Result<String, PaymentError> {
        if self.should_fail {
            return Err(PaymentError::Rejected {
                status: 402,
                message: "Mock processor: simulated decline".to_string(),
            });
        }
        Ok(format!("pi_mock_{amount}_{currency}_secret_fake"))
    }
}

/// PaymentState
///
/// The payment processor handle shared through the application state.
pub type PaymentState = Arc<dyn PaymentService>;
