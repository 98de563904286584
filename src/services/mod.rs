// Checkout services
pub mod address_resolver;
pub mod checkout_session;
pub mod orchestrator;
pub mod totals;

pub use address_resolver::AddressResolver;
pub use checkout_session::{CheckoutPhase, CheckoutSession, PhaseChange};
pub use orchestrator::{build_order_request, CheckoutCollaborators, CheckoutOrchestrator};
pub use totals::{
    assemble, reconcile, round_money, PricingPolicy, ShippingPolicy, TotalsCalculator, TotalsDrift,
};
