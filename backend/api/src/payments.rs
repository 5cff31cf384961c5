//! Stripe PaymentIntent creation.
//!
//! The gateway only ever creates intents: amounts arrive in rupees, are
//! converted to paise, and are charged in `inr` by card. Stripe owns every
//! bit of state after that.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::VendorError;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
pub const CURRENCY: &str = "inr";
pub const PAYMENT_METHOD_TYPE: &str = "card";

/// Parameters of a new PaymentIntent, already in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentIntent {
    pub amount: i64,
    pub currency: &'static str,
    pub payment_method_types: Vec<&'static str>,
}

impl NewPaymentIntent {
    /// Fixed-currency card intent for `amount` minor units.
    pub fn inr(amount: i64) -> Self {
        Self {
            amount,
            currency: CURRENCY,
            payment_method_types: vec![PAYMENT_METHOD_TYPE],
        }
    }

    fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("amount", self.amount.to_string()),
            ("currency", self.currency.to_string()),
        ];
        for method in &self.payment_method_types {
            form.push(("payment_method_types[]", method.to_string()));
        }
        form
    }
}

/// The subset of Stripe's PaymentIntent object the gateway reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub client_secret: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
}

/// Convert a major-unit amount (rupees) to minor units (paise).
///
/// Returns `None` for missing, non-finite, non-positive or out-of-range input.
/// Positive amounts below half a paisa round to 0 and are left for Stripe to
/// reject.
pub fn to_minor_units(amount: Option<f64>) -> Option<i64> {
    let amount = amount.filter(|a| a.is_finite() && *a > 0.0)?;
    let minor = (amount * 100.0).round();
    if minor > i64::MAX as f64 {
        return None;
    }
    Some(minor as i64)
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        params: &NewPaymentIntent,
    ) -> Result<PaymentIntent, VendorError>;
}

/// Thin client over Stripe's REST API.
pub struct StripeClient {
    client: Client,
    secret_key: Option<String>,
    base_url: String,
}

impl StripeClient {
    pub fn new(client: Client, secret_key: Option<String>) -> Self {
        Self {
            client,
            secret_key,
            base_url: STRIPE_API_BASE.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_payment_intent(
        &self,
        params: &NewPaymentIntent,
    ) -> Result<PaymentIntent, VendorError> {
        let secret_key = self.secret_key.as_deref().ok_or_else(|| {
            VendorError::new("Stripe is not configured: STRIPE_SECRET_KEY is missing")
                .with_kind("authentication_error")
        })?;

        let resp = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .bearer_auth(secret_key)
            .form(&params.form())
            .send()
            .await
            .map_err(VendorError::connection)?;

        let status = resp.status();
        let body = resp.text().await.map_err(VendorError::connection)?;
        if !status.is_success() {
            return Err(decode_stripe_error(status.as_u16(), &body));
        }

        let intent: PaymentIntent = serde_json::from_str(&body).map_err(|e| {
            VendorError::new(format!("Unexpected Stripe response: {e}")).with_kind("api_error")
        })?;
        debug!("Created PaymentIntent {} for {} {}", intent.id, intent.amount, intent.currency);
        Ok(intent)
    }
}

fn decode_stripe_error(status: u16, body: &str) -> VendorError {
    match serde_json::from_str::<StripeErrorEnvelope>(body) {
        Ok(StripeErrorEnvelope { error }) => VendorError {
            message: error
                .message
                .unwrap_or_else(|| format!("Stripe returned HTTP {status}")),
            kind: error.kind,
            code: error.code,
        },
        Err(_) => VendorError::new(format!("Stripe returned HTTP {status}")).with_kind("api_error"),
    }
}
