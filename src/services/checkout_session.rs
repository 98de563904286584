use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use super::address_resolver::AddressResolver;
use super::totals::{ShippingPolicy, TotalsCalculator};
use crate::errors::CheckoutError;
use crate::models::{
    AddressId, AttemptOutcome, CartSnapshot, CreatedOrder, CustomerId, DiscountSummary,
    InlineAddress, OrderId, PaymentAttempt, PaymentMethod, SavedAddress, SettlementReceipt,
    ShippingSelection, Totals,
};

/// Steps of a checkout attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    Shipping,
    Payment,
    Review,
    PaymentProcessing,
    Confirmation,
    Abandoned,
}

impl CheckoutPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutPhase::Confirmation | CheckoutPhase::Abandoned)
    }

    fn previous(&self) -> Option<CheckoutPhase> {
        match self {
            CheckoutPhase::Payment => Some(CheckoutPhase::Shipping),
            CheckoutPhase::Review => Some(CheckoutPhase::Payment),
            _ => None,
        }
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub from: CheckoutPhase,
    pub to: CheckoutPhase,
    /// First time this session reaches `to`.
    pub first_visit: bool,
}

/// Root aggregate for one checkout attempt, owned by the caller.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    id: Uuid,
    customer: Option<CustomerId>,
    phase: CheckoutPhase,
    cart: CartSnapshot,
    discounts: DiscountSummary,
    address: AddressResolver,
    payment_method: Option<PaymentMethod>,
    order: Option<CreatedOrder>,
    last_error: Option<String>,
    is_processing: bool,
    payment_visited: bool,
    attempts: Vec<PaymentAttempt>,
    calculator: TotalsCalculator,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CheckoutSession {
    /// Enters checkout on the shipping step. Requires a signed-in customer and
    /// a non-empty cart.
    pub fn start(
        customer: Option<CustomerId>,
        cart: CartSnapshot,
        calculator: TotalsCalculator,
    ) -> Result<Self, CheckoutError> {
        if customer.is_none() {
            return Err(CheckoutError::Unauthenticated);
        }
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            customer,
            phase: CheckoutPhase::Shipping,
            cart,
            discounts: DiscountSummary::default(),
            address: AddressResolver::default(),
            payment_method: None,
            order: None,
            last_error: None,
            is_processing: false,
            payment_visited: false,
            attempts: Vec::new(),
            calculator,
            started_at: now,
            updated_at: now,
        })
    }

    pub fn with_discounts(mut self, discounts: DiscountSummary) -> Self {
        self.discounts = discounts;
        self
    }

    /// Loads the address book and pre-selects its default entry.
    pub fn with_saved_addresses(mut self, addresses: Vec<SavedAddress>) -> Self {
        self.address = AddressResolver::new(addresses).with_default_selected();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> CheckoutPhase {
        self.phase
    }

    pub fn customer(&self) -> Option<&CustomerId> {
        self.customer.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.customer.is_some()
    }

    pub fn cart(&self) -> &CartSnapshot {
        &self.cart
    }

    pub fn discounts(&self) -> &DiscountSummary {
        &self.discounts
    }

    pub fn address(&self) -> &AddressResolver {
        &self.address
    }

    pub fn payment_method(&self) -> Option<&PaymentMethod> {
        self.payment_method.as_ref()
    }

    pub fn order(&self) -> Option<&CreatedOrder> {
        self.order.as_ref()
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.order.as_ref().map(|order| &order.id)
    }

    pub fn order_number(&self) -> Option<&str> {
        self.order.as_ref().map(|order| order.order_number.as_str())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    pub fn payment_attempts(&self) -> &[PaymentAttempt] {
        &self.attempts
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Client-side estimate from the current cart and discounts.
    pub fn preview_totals(&self) -> Totals {
        let calculator = match self.discounts.shipping {
            Some(amount) => self.calculator.with_shipping(ShippingPolicy::Override(amount)),
            None => self.calculator,
        };
        calculator
            .with_known_tax(self.discounts.tax)
            .preview(&self.cart.lines, self.discounts.lines())
    }

    /// Authoritative totals once the order exists, the preview before that.
    pub fn display_totals(&self) -> Totals {
        match &self.order {
            Some(order) => order.totals,
            None => self.preview_totals(),
        }
    }

    /// Amount to charge. Only defined once the Order Service has confirmed totals.
    pub fn settlement_amount(&self) -> Option<Decimal> {
        self.order.as_ref().map(|order| order.totals.grand_total)
    }

    pub fn set_customer(&mut self, customer: Option<CustomerId>) {
        self.customer = customer;
        self.touch();
    }

    pub fn select_saved_address(&mut self, id: AddressId) -> Result<(), CheckoutError> {
        self.ensure_address_editable()?;
        self.address.select_saved(id)?;
        self.touch();
        Ok(())
    }

    pub fn set_inline_address(&mut self, address: InlineAddress) -> Result<(), CheckoutError> {
        self.ensure_address_editable()?;
        self.address.set_inline(address);
        self.touch();
        Ok(())
    }

    pub fn select_payment_method(&mut self, method: PaymentMethod) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        self.payment_method = Some(method);
        self.touch();
        Ok(())
    }

    /// Replaces discount lines and the Discount Service's cart-level figures.
    pub fn apply_discounts(&mut self, discounts: DiscountSummary) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        self.discounts = discounts;
        self.touch();
        Ok(())
    }

    /// Applies a cart change made outside checkout. An emptied cart ends the
    /// session; nothing changes while a payment is in flight.
    pub fn replace_cart(&mut self, cart: CartSnapshot) -> Result<CheckoutPhase, CheckoutError> {
        self.ensure_editable()?;
        if cart.is_empty() {
            self.reset();
        } else {
            self.cart = cart;
            self.touch();
        }
        Ok(self.phase)
    }

    pub fn abandon(&mut self) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        self.reset();
        Ok(())
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Moves forward from shipping or payment. Review is left only through finalize.
    pub(crate) fn advance(&mut self) -> Result<PhaseChange, CheckoutError> {
        self.ensure_editable()?;

        let to = match self.phase {
            CheckoutPhase::Shipping => {
                if !self.is_authenticated() {
                    return Err(CheckoutError::Unauthenticated);
                }
                self.address.resolve()?;
                CheckoutPhase::Payment
            }
            CheckoutPhase::Payment => {
                let method = self
                    .payment_method
                    .as_ref()
                    .ok_or(CheckoutError::MissingPaymentMethod)?;
                method.validate()?;
                CheckoutPhase::Review
            }
            phase => return Err(CheckoutError::invalid_transition(phase, "continue")),
        };

        let first_visit = to == CheckoutPhase::Payment && !self.payment_visited;
        if to == CheckoutPhase::Payment {
            self.payment_visited = true;
        }
        Ok(self.transition(to, first_visit))
    }

    pub fn back(&mut self) -> Result<PhaseChange, CheckoutError> {
        if self.is_processing {
            return Err(CheckoutError::AlreadyProcessing);
        }
        let to = self
            .phase
            .previous()
            .ok_or_else(|| CheckoutError::invalid_transition(self.phase, "go back"))?;
        Ok(self.transition(to, false))
    }

    /// Review-step guards, checked without touching the network. Marks the
    /// session as processing when they pass and returns the customer to act for.
    pub(crate) fn begin_finalize(&mut self) -> Result<CustomerId, CheckoutError> {
        self.ensure_editable()?;
        if self.phase != CheckoutPhase::Review {
            return Err(CheckoutError::invalid_transition(self.phase, "place the order"));
        }
        let customer = self.customer.clone().ok_or(CheckoutError::Unauthenticated)?;
        if self.cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        if self.order.is_none() {
            self.address.resolve()?;
        }
        // The method may have been swapped on review after the payment step passed.
        self.payment_method
            .as_ref()
            .ok_or(CheckoutError::MissingPaymentMethod)?
            .validate()?;

        self.is_processing = true;
        self.touch();
        Ok(customer)
    }

    pub(crate) fn resolved_shipping(&self) -> Result<ShippingSelection, CheckoutError> {
        self.address.resolve()
    }

    pub(crate) fn record_order(&mut self, order: CreatedOrder) {
        debug_assert!(self.order.is_none(), "order is created once per session");
        self.order = Some(order);
        self.touch();
    }

    pub(crate) fn fail_order_creation(&mut self, reason: String) {
        self.is_processing = false;
        self.last_error = Some(reason);
        self.touch();
    }

    /// Enters payment processing against the existing order and records an
    /// in-flight attempt. Returns the order id and the authoritative amount.
    pub(crate) fn begin_settlement(&mut self) -> Option<(OrderId, Decimal)> {
        let order = self.order.as_ref()?;
        let order_id = order.id.clone();
        let amount = order.totals.grand_total;

        self.attempts.push(PaymentAttempt {
            order_id: order_id.clone(),
            outcome: AttemptOutcome::InFlight,
            started_at: Utc::now(),
        });
        self.transition(CheckoutPhase::PaymentProcessing, false);
        Some((order_id, amount))
    }

    pub(crate) fn complete_settlement(&mut self, receipt: &SettlementReceipt) -> PhaseChange {
        self.finish_attempt(AttemptOutcome::Succeeded(receipt.reference.clone()));
        self.cart.clear();
        self.is_processing = false;
        self.transition(CheckoutPhase::Confirmation, true)
    }

    pub(crate) fn fail_settlement(&mut self, reason: String) -> PhaseChange {
        self.finish_attempt(AttemptOutcome::Failed(reason.clone()));
        self.is_processing = false;
        let change = self.transition(CheckoutPhase::Review, false);
        self.last_error = Some(reason);
        change
    }

    /// Releases a finalize that was dropped before the services answered. Any
    /// recorded order is kept, so the next finalize only settles.
    pub(crate) fn interrupt_processing(&mut self, reason: &str) {
        if !self.is_processing {
            return;
        }
        self.finish_attempt(AttemptOutcome::Failed(reason.to_string()));
        self.is_processing = false;
        if self.phase == CheckoutPhase::PaymentProcessing {
            self.transition(CheckoutPhase::Review, false);
        }
        self.last_error = Some(reason.to_string());
        self.touch();
    }

    fn finish_attempt(&mut self, outcome: AttemptOutcome) {
        if let Some(attempt) = self
            .attempts
            .iter_mut()
            .rev()
            .find(|attempt| attempt.outcome == AttemptOutcome::InFlight)
        {
            attempt.outcome = outcome;
        }
    }

    fn transition(&mut self, to: CheckoutPhase, first_visit: bool) -> PhaseChange {
        let from = self.phase;
        self.phase = to;
        self.last_error = None;
        self.touch();
        PhaseChange {
            from,
            to,
            first_visit,
        }
    }

    fn reset(&mut self) {
        self.phase = CheckoutPhase::Abandoned;
        self.cart.clear();
        self.address.clear();
        self.payment_method = None;
        self.last_error = None;
        self.touch();
    }

    fn ensure_editable(&self) -> Result<(), CheckoutError> {
        if self.phase.is_terminal() {
            return Err(CheckoutError::SessionClosed);
        }
        if self.is_processing {
            return Err(CheckoutError::AlreadyProcessing);
        }
        Ok(())
    }

    fn ensure_address_editable(&self) -> Result<(), CheckoutError> {
        self.ensure_editable()?;
        if self.order.is_some() {
            return Err(CheckoutError::Validation(
                "Shipping address cannot change once the order is created".to_string(),
            ));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
