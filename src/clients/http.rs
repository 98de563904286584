use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{AddressService, CartService, DiscountService, OrderService, PaymentSettlementService};
use crate::config::CheckoutConfig;
use crate::errors::ServiceError;
use crate::models::order::OrderResponse;
use crate::models::{
    CartSnapshot, CreateOrderRequest, CreatedOrder, CustomerId, DiscountLine, DiscountSummary,
    SavedAddress, SettlementReceipt, SettlementRequest,
};

const CUSTOMER_HEADER: &str = "X-Customer-Id";

/// `{ success, message?, data }` wrapper used by every storefront endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    message: Option<String>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self, resource: &str) -> Result<T, ServiceError> {
        if !self.success {
            return Err(ServiceError::Rejected(self.message.unwrap_or_else(|| {
                format!("{} request was not successful", resource)
            })));
        }
        self.data
            .ok_or_else(|| ServiceError::InvalidResponse(format!("{} payload missing", resource)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscountsPayload {
    #[serde(default)]
    discount_total: Decimal,
    shipping: Option<Decimal>,
    tax: Option<Decimal>,
    total: Option<Decimal>,
    #[serde(default)]
    applied_discounts: Vec<DiscountEntry>,
    #[serde(default)]
    automatic_discounts: Vec<DiscountEntry>,
}

#[derive(Debug, Deserialize)]
struct DiscountEntry {
    code: Option<String>,
    id: Option<String>,
    amount: Decimal,
}

impl DiscountEntry {
    fn label(self) -> String {
        self.code.or(self.id).unwrap_or_default()
    }
}

impl From<DiscountsPayload> for DiscountSummary {
    fn from(payload: DiscountsPayload) -> Self {
        DiscountSummary {
            discount_total: payload.discount_total,
            shipping: payload.shipping,
            tax: payload.tax,
            total: payload.total,
            manual: payload
                .applied_discounts
                .into_iter()
                .map(|entry| {
                    let amount = entry.amount;
                    DiscountLine::coupon(entry.label(), amount)
                })
                .collect(),
            automatic: payload
                .automatic_discounts
                .into_iter()
                .map(|entry| {
                    let amount = entry.amount;
                    DiscountLine::automatic(entry.label(), amount)
                })
                .collect(),
        }
    }
}

/// How a `success: false` envelope on an error status is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unsuccessful {
    Rejected,
    Declined,
}

impl Unsuccessful {
    fn error(self, message: String) -> ServiceError {
        match self {
            Unsuccessful::Rejected => ServiceError::Rejected(message),
            Unsuccessful::Declined => ServiceError::Declined(message),
        }
    }
}

/// Storefront backend client implementing every collaborator port over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStorefrontClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStorefrontClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &CheckoutConfig) -> Result<Self, ServiceError> {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        customer: &CustomerId,
    ) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(self.url(path))
            .header(CUSTOMER_HEADER, customer.to_string())
            .send()
            .await?;
        read_json(response, Unsuccessful::Rejected).await
    }

    async fn post<B, T>(
        &self,
        path: &str,
        customer: &CustomerId,
        body: &B,
        unsuccessful: Unsuccessful,
    ) -> Result<T, ServiceError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .header(CUSTOMER_HEADER, customer.to_string())
            .json(body)
            .send()
            .await?;
        read_json(response, unsuccessful).await
    }
}

/// Decodes a 2xx body. A 404 becomes `NotFound`; any other status becomes the
/// route's `unsuccessful` error when the body is a `success: false` envelope,
/// and `Rejected` otherwise.
async fn read_json<T: DeserializeOwned>(
    response: Response,
    unsuccessful: Unsuccessful,
) -> Result<T, ServiceError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return serde_json::from_str(&body)
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()));
    }

    let envelope = serde_json::from_str::<Envelope<serde_json::Value>>(&body).ok();
    let unsuccessful_envelope = envelope.as_ref().map_or(false, |e| !e.success);
    let message = envelope
        .and_then(|envelope| envelope.message)
        .unwrap_or_else(|| format!("HTTP {}", status));
    warn!(%status, %message, "Storefront request failed");

    if status == StatusCode::NOT_FOUND {
        Err(ServiceError::NotFound(message))
    } else if unsuccessful_envelope {
        Err(unsuccessful.error(message))
    } else {
        Err(ServiceError::Rejected(message))
    }
}

#[async_trait]
impl CartService for HttpStorefrontClient {
    #[instrument(skip(self))]
    async fn load_cart(&self, customer: &CustomerId) -> Result<CartSnapshot, ServiceError> {
        let envelope: Envelope<CartSnapshot> = self.get("/cart", customer).await?;
        let cart = envelope.into_data("Cart")?;
        debug!(items = cart.item_count(), "Cart loaded");
        Ok(cart)
    }
}

#[async_trait]
impl DiscountService for HttpStorefrontClient {
    #[instrument(skip(self))]
    async fn cart_discounts(
        &self,
        customer: &CustomerId,
    ) -> Result<DiscountSummary, ServiceError> {
        let envelope: Envelope<DiscountsPayload> = self.get("/cart/discounts", customer).await?;
        Ok(envelope.into_data("Discounts")?.into())
    }
}

#[async_trait]
impl AddressService for HttpStorefrontClient {
    #[instrument(skip(self))]
    async fn saved_addresses(
        &self,
        customer: &CustomerId,
    ) -> Result<Vec<SavedAddress>, ServiceError> {
        let envelope: Envelope<Vec<SavedAddress>> = self.get("/addresses", customer).await?;
        envelope.into_data("Addresses")
    }
}

#[async_trait]
impl OrderService for HttpStorefrontClient {
    #[instrument(skip(self, request))]
    async fn create_order(
        &self,
        customer: &CustomerId,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, ServiceError> {
        let response: OrderResponse = self
            .post("/orders", customer, &request, Unsuccessful::Rejected)
            .await?;
        response.into_created_order()
    }
}

#[async_trait]
impl PaymentSettlementService for HttpStorefrontClient {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn settle(
        &self,
        customer: &CustomerId,
        request: SettlementRequest,
    ) -> Result<SettlementReceipt, ServiceError> {
        let envelope: Envelope<SettlementReceipt> = self
            .post("/payments/settle", customer, &request, Unsuccessful::Declined)
            .await?;
        if !envelope.success {
            return Err(ServiceError::Declined(
                envelope
                    .message
                    .unwrap_or_else(|| "Payment was declined".to_string()),
            ));
        }
        envelope.into_data("Settlement")
    }
}
