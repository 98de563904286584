// Checkout domain models
pub mod address;
pub mod cart;
pub mod discount;
pub mod ids;
pub mod order;
pub mod payment;
pub mod totals;

pub use address::{InlineAddress, SavedAddress, ShippingSelection};
pub use cart::{CartLine, CartSnapshot};
pub use discount::{DiscountLine, DiscountSource, DiscountSummary};
pub use ids::{AddressId, CustomerId, ExternalId, OrderId};
pub use order::{CreateOrderRequest, CreatedOrder, OrderStatus, ShippingPayload};
pub use payment::{
    AttemptOutcome, CardDetails, PaymentAttempt, PaymentMethod, SettlementReceipt,
    SettlementRequest,
};
pub use totals::{Totals, TotalsKind};
