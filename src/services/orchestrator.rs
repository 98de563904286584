use rust_decimal::Decimal;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::checkout_session::{CheckoutPhase, CheckoutSession, PhaseChange};
use super::totals::{reconcile, round_money, PricingPolicy};
use crate::clients::{
    AddressService, CartService, DiscountService, HttpStorefrontClient, OrderService,
    PaymentSettlementService,
};
use crate::errors::CheckoutError;
use crate::events::{CheckoutEvent, EventItem, EventSender};
use crate::models::{
    CreateOrderRequest, CustomerId, SettlementReceipt, SettlementRequest, ShippingPayload,
};

/// External services the checkout talks to.
#[derive(Clone)]
pub struct CheckoutCollaborators {
    pub carts: Arc<dyn CartService>,
    pub discounts: Arc<dyn DiscountService>,
    pub addresses: Arc<dyn AddressService>,
    pub orders: Arc<dyn OrderService>,
    pub payments: Arc<dyn PaymentSettlementService>,
}

impl CheckoutCollaborators {
    /// Every port served by one storefront backend.
    pub fn from_client(client: Arc<HttpStorefrontClient>) -> Self {
        Self {
            carts: client.clone(),
            discounts: client.clone(),
            addresses: client.clone(),
            orders: client.clone(),
            payments: client,
        }
    }
}

/// Drives a [`CheckoutSession`] through the network-facing steps: loading the
/// checkout, creating the order once and settling payment against it.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    services: CheckoutCollaborators,
    event_sender: EventSender,
    pricing: PricingPolicy,
}

impl CheckoutOrchestrator {
    pub fn new(
        services: CheckoutCollaborators,
        event_sender: EventSender,
        pricing: PricingPolicy,
    ) -> Self {
        Self {
            services,
            event_sender,
            pricing,
        }
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    /// Loads cart, discounts and the address book for a signed-in customer and
    /// opens a session on the shipping step.
    #[instrument(skip(self))]
    pub async fn begin_checkout(
        &self,
        customer: Option<CustomerId>,
    ) -> Result<CheckoutSession, CheckoutError> {
        let customer = customer.ok_or(CheckoutError::Unauthenticated)?;

        let cart = self
            .services
            .carts
            .load_cart(&customer)
            .await
            .map_err(|e| CheckoutError::Upstream(e.reason()))?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let (discounts, addresses) = tokio::join!(
            self.services.discounts.cart_discounts(&customer),
            self.services.addresses.saved_addresses(&customer)
        );
        let discounts = discounts.map_err(|e| CheckoutError::Upstream(e.reason()))?;
        let addresses = addresses.map_err(|e| CheckoutError::Upstream(e.reason()))?;

        let session = CheckoutSession::start(Some(customer), cart, self.pricing.calculator())?
            .with_discounts(discounts)
            .with_saved_addresses(addresses);

        info!(
            session_id = %session.id(),
            items = session.cart().item_count(),
            "Checkout started"
        );
        Ok(session)
    }

    /// Re-reads the Discount Service after a coupon change.
    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    pub async fn refresh_discounts(
        &self,
        session: &mut CheckoutSession,
    ) -> Result<(), CheckoutError> {
        let customer = session
            .customer()
            .cloned()
            .ok_or(CheckoutError::Unauthenticated)?;
        let discounts = self
            .services
            .discounts
            .cart_discounts(&customer)
            .await
            .map_err(|e| CheckoutError::Upstream(e.reason()))?;
        session.apply_discounts(discounts)
    }

    /// Forward transition; the first entry into payment emits `begin_checkout`.
    #[instrument(skip(self, session), fields(session_id = %session.id(), phase = %session.phase()))]
    pub async fn advance(&self, session: &mut CheckoutSession) -> Result<PhaseChange, CheckoutError> {
        let change = session.advance()?;
        info!(from = %change.from, to = %change.to, "Checkout advanced");

        if change.to == CheckoutPhase::Payment && change.first_visit {
            let discounts = session.discounts();
            self.event_sender.emit(CheckoutEvent::BeginCheckout {
                session_id: session.id(),
                currency: self.pricing.currency.clone(),
                totals: session.preview_totals(),
                coupon: discounts.forwarded_coupon().map(str::to_string),
                items: session.cart().lines.iter().map(EventItem::from).collect(),
            });
        }
        Ok(change)
    }

    /// Places the order if it does not exist yet, then settles payment for it.
    /// A settlement failure keeps the order, so calling this again only retries
    /// the payment. Dropping the future mid-flight returns the session to review.
    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    pub async fn finalize(&self, session: &mut CheckoutSession) -> Result<CheckoutPhase, CheckoutError> {
        let customer = session.begin_finalize()?;
        let mut guard = FinalizeGuard { session };
        let session = &mut *guard;

        if session.order().is_none() {
            self.create_order(session, &customer).await?;
        } else {
            info!(order_id = ?session.order_id(), "Order already exists; retrying settlement only");
        }

        let receipt = self.settle(session, &customer).await?;
        info!(
            order_number = ?session.order_number(),
            reference = %receipt.reference,
            "Checkout confirmed"
        );
        Ok(session.phase())
    }

    async fn create_order(
        &self,
        session: &mut CheckoutSession,
        customer: &CustomerId,
    ) -> Result<(), CheckoutError> {
        let request = match build_order_request(session) {
            Ok(request) => request,
            Err(err) => {
                session.fail_order_creation(err.to_string());
                return Err(err);
            }
        };
        let preview = session.preview_totals();

        match self.services.orders.create_order(customer, request).await {
            Ok(order) => {
                let drift = reconcile(&preview, &order.totals);
                if drift.changes_charge() {
                    warn!(
                        order_id = %order.id,
                        preview = %preview.grand_total,
                        authoritative = %order.totals.grand_total,
                        "Order total differs from preview; charging the authoritative total"
                    );
                }
                info!(order_id = %order.id, order_number = %order.order_number, "Order created");

                let event = CheckoutEvent::OrderCreated {
                    session_id: session.id(),
                    order_id: order.id.clone(),
                    order_number: order.order_number.clone(),
                    currency: self.pricing.currency.clone(),
                    totals: order.totals,
                };
                session.record_order(order);
                self.event_sender.emit(event);
                Ok(())
            }
            Err(e) => {
                let reason = e.reason();
                error!(error = %e, "Order creation failed");
                session.fail_order_creation(reason.clone());
                Err(CheckoutError::OrderCreationFailed(reason))
            }
        }
    }

    async fn settle(
        &self,
        session: &mut CheckoutSession,
        customer: &CustomerId,
    ) -> Result<SettlementReceipt, CheckoutError> {
        let (order_id, amount) = match session.begin_settlement() {
            Some(target) => target,
            None => {
                let err = CheckoutError::invalid_transition(session.phase(), "settle payment");
                session.fail_order_creation(err.to_string());
                return Err(err);
            }
        };
        let payment_method = session
            .payment_method()
            .map(|method| method.tag().to_string())
            .unwrap_or_default();
        let items: Vec<EventItem> = session.cart().lines.iter().map(EventItem::from).collect();

        let request = SettlementRequest {
            order_id: order_id.clone(),
            amount,
            payment_method: payment_method.clone(),
        };

        match self.services.payments.settle(customer, request).await {
            Ok(receipt) => {
                session.complete_settlement(&receipt);
                self.event_sender.emit(CheckoutEvent::Purchase {
                    session_id: session.id(),
                    order_id,
                    order_number: session.order_number().unwrap_or_default().to_string(),
                    currency: self.pricing.currency.clone(),
                    totals: session.display_totals(),
                    payment_method,
                    settlement_reference: receipt.reference.clone(),
                    items,
                });
                Ok(receipt)
            }
            Err(e) => {
                let reason = e.reason();
                warn!(order_id = %order_id, error = %e, "Payment settlement failed");
                session.fail_settlement(reason.clone());
                Err(CheckoutError::SettlementFailed(reason))
            }
        }
    }
}

const FINALIZE_INTERRUPTED: &str = "Checkout was interrupted before payment completed";

/// Hands the session back to review when a `finalize` future is dropped while
/// the services are still being awaited.
struct FinalizeGuard<'a> {
    session: &'a mut CheckoutSession,
}

impl Deref for FinalizeGuard<'_> {
    type Target = CheckoutSession;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl DerefMut for FinalizeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        if self.session.is_processing() {
            warn!(
                session_id = %self.session.id(),
                order_id = ?self.session.order_id(),
                "Finalize cancelled mid-flight; returning to review"
            );
            self.session.interrupt_processing(FINALIZE_INTERRUPTED);
        }
    }
}

/// Order Service payload from the current session. Shipping and tax are only
/// sent when the Discount Service supplied them.
pub fn build_order_request(session: &CheckoutSession) -> Result<CreateOrderRequest, CheckoutError> {
    let selection = session.resolved_shipping()?;
    let preview = session.preview_totals();
    let discounts = session.discounts();

    Ok(CreateOrderRequest {
        shipping: ShippingPayload::from(&selection),
        subtotal: preview.subtotal,
        shipping_cost: discounts.shipping.map(round_money).unwrap_or(Decimal::ZERO),
        tax: discounts.tax.map(round_money).unwrap_or(Decimal::ZERO),
        coupon_code: discounts.forwarded_coupon().map(str::to_string),
        discount: preview.discount_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        MockAddressService, MockCartService, MockDiscountService, MockOrderService,
        MockPaymentSettlementService,
    };
    use crate::errors::ServiceError;
    use crate::events::event_channel;
    use crate::models::{
        AddressId, CartLine, CartSnapshot, CreatedOrder, DiscountLine, DiscountSummary,
        InlineAddress, OrderId, OrderStatus, PaymentMethod, SavedAddress, Totals, TotalsKind,
    };
    use crate::services::totals::ShippingPolicy;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn pricing() -> PricingPolicy {
        PricingPolicy {
            tax_rate: dec!(0.16),
            shipping: ShippingPolicy::Free,
            currency: "USD".into(),
        }
    }

    fn cart() -> CartSnapshot {
        CartSnapshot::from_lines(vec![CartLine::new("sku-1", "Mug", dec!(100.00), 1)])
    }

    fn saved_address(id: u64, is_default: bool) -> SavedAddress {
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
            phone: None,
            address_type: "shipping".into(),
        }
    }

    fn created_order() -> CreatedOrder {
        CreatedOrder {
            id: OrderId::from(42),
            order_number: "ORD-0042".into(),
            status: OrderStatus::Pending,
            totals: Totals {
                kind: TotalsKind::Authoritative,
                subtotal: dec!(100.00),
                discount_total: dec!(10.00),
                shipping: dec!(0),
                tax: dec!(14.40),
                grand_total: dec!(104.40),
            },
            created_at: None,
            shipping_address: serde_json::Value::Null,
        }
    }

    struct Mocks {
        carts: MockCartService,
        discounts: MockDiscountService,
        addresses: MockAddressService,
        orders: MockOrderService,
        payments: MockPaymentSettlementService,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                carts: MockCartService::new(),
                discounts: MockDiscountService::new(),
                addresses: MockAddressService::new(),
                orders: MockOrderService::new(),
                payments: MockPaymentSettlementService::new(),
            }
        }

        fn build(self) -> (CheckoutOrchestrator, mpsc::Receiver<CheckoutEvent>) {
            let (sender, rx) = event_channel(16);
            let services = CheckoutCollaborators {
                carts: Arc::new(self.carts),
                discounts: Arc::new(self.discounts),
                addresses: Arc::new(self.addresses),
                orders: Arc::new(self.orders),
                payments: Arc::new(self.payments),
            };
            (CheckoutOrchestrator::new(services, sender, pricing()), rx)
        }
    }

    fn session_at_review() -> CheckoutSession {
        let mut session = CheckoutSession::start(
            Some(CustomerId::from("cus_1")),
            cart(),
            pricing().calculator(),
        )
        .unwrap()
        .with_discounts(DiscountSummary {
            manual: vec![DiscountLine::coupon("SAVE10", dec!(10.00))],
            ..Default::default()
        })
        .with_saved_addresses(vec![saved_address(7, true)]);
        session.advance().unwrap();
        session.select_payment_method(PaymentMethod::Paypal).unwrap();
        session.advance().unwrap();
        session
    }

    fn drain(rx: &mut mpsc::Receiver<CheckoutEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[tokio::test]
    async fn begin_checkout_preselects_default_address() {
        let mut mocks = Mocks::new();
        mocks.carts.expect_load_cart().returning(|_| Ok(cart()));
        mocks
            .discounts
            .expect_cart_discounts()
            .returning(|_| Ok(DiscountSummary::default()));
        mocks
            .addresses
            .expect_saved_addresses()
            .returning(|_| Ok(vec![saved_address(1, false), saved_address(2, true)]));
        let (orchestrator, _rx) = mocks.build();

        let session = orchestrator
            .begin_checkout(Some(CustomerId::from("cus_1")))
            .await
            .unwrap();

        assert_eq!(session.phase(), CheckoutPhase::Shipping);
        assert_eq!(session.address().saved_address_id(), Some(&AddressId::from(2)));
    }

    #[tokio::test]
    async fn begin_checkout_requires_customer_and_items() {
        let mut mocks = Mocks::new();
        mocks
            .carts
            .expect_load_cart()
            .times(1)
            .returning(|_| Ok(CartSnapshot::default()));
        let (orchestrator, _rx) = mocks.build();

        assert_eq!(
            orchestrator.begin_checkout(None).await.unwrap_err(),
            CheckoutError::Unauthenticated
        );
        assert_eq!(
            orchestrator
                .begin_checkout(Some(CustomerId::from("cus_1")))
                .await
                .unwrap_err(),
            CheckoutError::EmptyCart
        );
    }

    #[tokio::test]
    async fn begin_checkout_reports_upstream_failures() {
        let mut mocks = Mocks::new();
        mocks
            .carts
            .expect_load_cart()
            .returning(|_| Err(ServiceError::Timeout("cart".into())));
        let (orchestrator, _rx) = mocks.build();

        assert_matches!(
            orchestrator.begin_checkout(Some(CustomerId::from("cus_1"))).await,
            Err(CheckoutError::Upstream(_))
        );
    }

    #[tokio::test]
    async fn begin_checkout_event_fires_once() {
        let (orchestrator, mut rx) = Mocks::new().build();
        let mut session = CheckoutSession::start(
            Some(CustomerId::from("cus_1")),
            cart(),
            pricing().calculator(),
        )
        .unwrap()
        .with_saved_addresses(vec![saved_address(7, true)]);

        orchestrator.advance(&mut session).await.unwrap();
        session.back().unwrap();
        orchestrator.advance(&mut session).await.unwrap();

        assert_eq!(drain(&mut rx), vec!["begin_checkout"]);
    }

    #[tokio::test]
    async fn successful_finalize_creates_order_and_settles_authoritative_total() {
        let mut mocks = Mocks::new();
        mocks
            .orders
            .expect_create_order()
            .times(1)
            .withf(|_, request| {
                request.coupon_code.as_deref() == Some("SAVE10")
                    && request.discount == dec!(10.00)
                    && request.shipping
                        == ShippingPayload::Saved {
                            address_id: AddressId::from(7),
                        }
            })
            .returning(|_, _| Ok(created_order()));
        mocks
            .payments
            .expect_settle()
            .times(1)
            .withf(|_, request| {
                request.order_id == OrderId::from(42) && request.amount == dec!(104.40)
            })
            .returning(|_, _| {
                Ok(SettlementReceipt {
                    reference: "stl_1".into(),
                })
            });
        let (orchestrator, mut rx) = mocks.build();
        let mut session = session_at_review();

        let phase = orchestrator.finalize(&mut session).await.unwrap();

        assert_eq!(phase, CheckoutPhase::Confirmation);
        assert!(session.cart().is_empty());
        assert!(!session.is_processing());
        assert_eq!(drain(&mut rx), vec!["order_created", "purchase"]);
    }

    #[tokio::test]
    async fn order_creation_failure_stays_on_review_without_order() {
        let mut mocks = Mocks::new();
        mocks
            .orders
            .expect_create_order()
            .times(1)
            .returning(|_, _| Err(ServiceError::Rejected("Out of stock".into())));
        mocks.payments.expect_settle().never();
        let (orchestrator, mut rx) = mocks.build();
        let mut session = session_at_review();

        let err = orchestrator.finalize(&mut session).await.unwrap_err();

        assert_eq!(err, CheckoutError::OrderCreationFailed("Out of stock".into()));
        assert!(err.is_retryable());
        assert_eq!(session.phase(), CheckoutPhase::Review);
        assert!(session.order_id().is_none());
        assert_eq!(session.last_error(), Some("Out of stock"));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn settlement_retry_reuses_existing_order() {
        let mut mocks = Mocks::new();
        mocks
            .orders
            .expect_create_order()
            .times(1)
            .returning(|_, _| Ok(created_order()));
        let mut attempts = 0;
        mocks
            .payments
            .expect_settle()
            .times(3)
            .withf(|_, request| request.order_id == OrderId::from(42))
            .returning(move |_, _| {
                attempts += 1;
                if attempts < 3 {
                    Err(ServiceError::Declined("card_declined".into()))
                } else {
                    Ok(SettlementReceipt {
                        reference: "stl_3".into(),
                    })
                }
            });
        let (orchestrator, mut rx) = mocks.build();
        let mut session = session_at_review();

        for _ in 0..2 {
            assert_eq!(
                orchestrator.finalize(&mut session).await,
                Err(CheckoutError::SettlementFailed("card_declined".into()))
            );
            assert_eq!(session.phase(), CheckoutPhase::Review);
            assert_eq!(session.order_id(), Some(&OrderId::from(42)));
        }
        let phase = orchestrator.finalize(&mut session).await.unwrap();

        assert_eq!(phase, CheckoutPhase::Confirmation);
        assert_eq!(session.payment_attempts().len(), 3);
        assert_eq!(drain(&mut rx), vec!["order_created", "purchase"]);
    }

    #[tokio::test]
    async fn finalize_outside_review_never_calls_services() {
        let mut mocks = Mocks::new();
        mocks.orders.expect_create_order().never();
        mocks.payments.expect_settle().never();
        let (orchestrator, _rx) = mocks.build();
        let mut session = session_at_review();
        session.back().unwrap();

        assert_matches!(
            orchestrator.finalize(&mut session).await,
            Err(CheckoutError::InvalidTransition {
                from: CheckoutPhase::Payment,
                ..
            })
        );
    }

    #[test]
    fn inline_address_payload_and_overrides() {
        let mut session = CheckoutSession::start(
            Some(CustomerId::from("cus_1")),
            cart(),
            pricing().calculator(),
        )
        .unwrap()
        .with_discounts(DiscountSummary {
            shipping: Some(dec!(5.00)),
            tax: Some(dec!(15.2)),
            manual: vec![
                DiscountLine::coupon("A", dec!(3)),
                DiscountLine::coupon("B", dec!(2)),
            ],
            ..Default::default()
        });
        session
            .set_inline_address(InlineAddress {
                first_name: "Luis".into(),
                last_name: "Perez".into(),
                street: "Calle 5 de Mayo 10".into(),
                city: "Puebla".into(),
                state: "PUE".into(),
                postal_code: "72000".into(),
                country: "MX".into(),
                phone: None,
            })
            .unwrap();

        let request = build_order_request(&session).unwrap();

        assert_matches!(request.shipping, ShippingPayload::Inline { .. });
        assert_eq!(request.shipping_cost, dec!(5.00));
        assert_eq!(request.tax, dec!(15.20));
        assert_eq!(request.coupon_code.as_deref(), Some("A"));
        assert_eq!(request.discount, dec!(5));
    }
}
