#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_checkout::clients::{
    AddressService, CartService, DiscountService, OrderService, PaymentSettlementService,
};
use storefront_checkout::errors::ServiceError;
use storefront_checkout::events::{event_channel, CheckoutEvent};
use storefront_checkout::models::{
    AddressId, CartLine, CartSnapshot, CreateOrderRequest, CreatedOrder, CustomerId,
    DiscountSummary, InlineAddress, OrderId, OrderStatus, SavedAddress, SettlementReceipt,
    SettlementRequest, Totals, TotalsKind,
};
use storefront_checkout::services::{
    round_money, CheckoutCollaborators, CheckoutOrchestrator, PricingPolicy, ShippingPolicy,
};
use tokio::sync::mpsc;

pub const TAX_RATE: Decimal = dec!(0.16);

pub fn customer() -> CustomerId {
    CustomerId::from("cus_1001")
}

pub fn pricing() -> PricingPolicy {
    PricingPolicy {
        tax_rate: TAX_RATE,
        shipping: ShippingPolicy::Free,
        currency: "USD".into(),
    }
}

pub fn single_item_cart(price: Decimal) -> CartSnapshot {
    CartSnapshot::from_lines(vec![CartLine::new("sku-100", "Ceramic mug", price, 1)])
}

pub fn saved_address(id: u64, is_default: bool) -> SavedAddress {
    SavedAddress {
        id: AddressId::from(id),
        is_default,
        first_name: "Ana".into(),
        last_name: "Lopez".into(),
        company: None,
        street: "Av. Reforma 222".into(),
        city: "CDMX".into(),
        state: "CDMX".into(),
        zip_code: "06600".into(),
        country: "MX".into(),
        phone: Some("+52 55 1234 5678".into()),
        address_type: "shipping".into(),
    }
}

pub fn inline_address() -> InlineAddress {
    InlineAddress {
        first_name: "Luis".into(),
        last_name: "Perez".into(),
        street: "Calle 5 de Mayo 10".into(),
        city: "Puebla".into(),
        state: "PUE".into(),
        postal_code: "72000".into(),
        country: "MX".into(),
        phone: None,
    }
}

/// Storefront backend held in memory. Order creation prices the order the way
/// the real service does: tax on the discounted subtotal unless supplied.
#[derive(Default)]
pub struct FakeStorefront {
    pub cart: Mutex<CartSnapshot>,
    pub discounts: Mutex<DiscountSummary>,
    pub addresses: Mutex<Vec<SavedAddress>>,
    pub order_requests: Mutex<Vec<CreateOrderRequest>>,
    pub settlement_requests: Mutex<Vec<SettlementRequest>>,
    /// Outcomes returned by successive settlement calls; empty means success.
    pub settlement_script: Mutex<VecDeque<Result<(), ServiceError>>>,
    pub order_failures: Mutex<VecDeque<ServiceError>>,
    /// Ids handed out by successive successful order creations.
    pub order_ids: Mutex<VecDeque<u64>>,
    pub create_calls: AtomicUsize,
    pub settle_calls: AtomicUsize,
    /// Settlement calls never answer while set.
    pub stall_settlements: AtomicBool,
}

impl FakeStorefront {
    pub fn with_cart(cart: CartSnapshot) -> Self {
        Self {
            cart: Mutex::new(cart),
            ..Default::default()
        }
    }

    pub fn set_discounts(&self, discounts: DiscountSummary) {
        *self.discounts.lock().unwrap() = discounts;
    }

    pub fn set_addresses(&self, addresses: Vec<SavedAddress>) {
        *self.addresses.lock().unwrap() = addresses;
    }

    pub fn script_settlements(&self, outcomes: Vec<Result<(), ServiceError>>) {
        *self.settlement_script.lock().unwrap() = outcomes.into();
    }

    pub fn assign_order_ids(&self, ids: Vec<u64>) {
        *self.order_ids.lock().unwrap() = ids.into();
    }

    pub fn fail_next_order(&self, error: ServiceError) {
        self.order_failures.lock().unwrap().push_back(error);
    }

    pub fn stall_settlements(&self, stall: bool) {
        self.stall_settlements.store(stall, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn settle_calls(&self) -> usize {
        self.settle_calls.load(Ordering::SeqCst)
    }

    pub fn last_order_request(&self) -> Option<CreateOrderRequest> {
        self.order_requests.lock().unwrap().last().cloned()
    }

    pub fn settlement_requests(&self) -> Vec<SettlementRequest> {
        self.settlement_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CartService for FakeStorefront {
    async fn load_cart(&self, _customer: &CustomerId) -> Result<CartSnapshot, ServiceError> {
        Ok(self.cart.lock().unwrap().clone())
    }
}

#[async_trait]
impl DiscountService for FakeStorefront {
    async fn cart_discounts(
        &self,
        _customer: &CustomerId,
    ) -> Result<DiscountSummary, ServiceError> {
        Ok(self.discounts.lock().unwrap().clone())
    }
}

#[async_trait]
impl AddressService for FakeStorefront {
    async fn saved_addresses(
        &self,
        _customer: &CustomerId,
    ) -> Result<Vec<SavedAddress>, ServiceError> {
        Ok(self.addresses.lock().unwrap().clone())
    }
}

#[async_trait]
impl OrderService for FakeStorefront {
    async fn create_order(
        &self,
        _customer: &CustomerId,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, ServiceError> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.order_requests.lock().unwrap().push(request.clone());
        if let Some(error) = self.order_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let taxable = request.subtotal - request.discount;
        let tax = if request.tax.is_zero() {
            round_money(taxable * TAX_RATE)
        } else {
            request.tax
        };
        let total = taxable + request.shipping_cost + tax;
        let id = self
            .order_ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(900 + call as u64);

        Ok(CreatedOrder {
            id: OrderId::from(id),
            order_number: format!("ORD-{:04}", id),
            status: OrderStatus::Pending,
            totals: Totals {
                kind: TotalsKind::Authoritative,
                subtotal: request.subtotal,
                discount_total: request.discount,
                shipping: request.shipping_cost,
                tax,
                grand_total: total,
            },
            created_at: None,
            shipping_address: serde_json::to_value(&request.shipping)
                .unwrap_or(serde_json::Value::Null),
        })
    }
}

#[async_trait]
impl PaymentSettlementService for FakeStorefront {
    async fn settle(
        &self,
        _customer: &CustomerId,
        request: SettlementRequest,
    ) -> Result<SettlementReceipt, ServiceError> {
        let call = self.settle_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.settlement_requests.lock().unwrap().push(request);
        if self.stall_settlements.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match self.settlement_script.lock().unwrap().pop_front() {
            Some(Err(error)) => Err(error),
            _ => Ok(SettlementReceipt {
                reference: format!("stl_{}", call),
            }),
        }
    }
}

/// Orchestrator wired to a [`FakeStorefront`] with a captured event channel.
pub struct TestCheckout {
    pub storefront: Arc<FakeStorefront>,
    pub orchestrator: CheckoutOrchestrator,
    pub events: mpsc::Receiver<CheckoutEvent>,
}

impl TestCheckout {
    pub fn new(storefront: FakeStorefront) -> Self {
        let storefront = Arc::new(storefront);
        let (sender, events) = event_channel(64);
        let services = CheckoutCollaborators {
            carts: storefront.clone(),
            discounts: storefront.clone(),
            addresses: storefront.clone(),
            orders: storefront.clone(),
            payments: storefront.clone(),
        };
        Self {
            orchestrator: CheckoutOrchestrator::new(services, sender, pricing()),
            storefront,
            events,
        }
    }

    pub fn event_names(&mut self) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            names.push(event.name());
        }
        names
    }
}
