use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier issued by an external service. Upstream services hand out either
/// numeric or string ids; the original form is preserved on the way back out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Numeric(u64),
    Text(String),
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalId::Numeric(id) => write!(f, "{}", id),
            ExternalId::Text(id) => f.write_str(id),
        }
    }
}

macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub ExternalId);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(ExternalId::Numeric(id))
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(ExternalId::Text(id.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(ExternalId::Text(id))
            }
        }
    };
}

external_id!(
    /// Identifier of an order owned by the Order Service.
    OrderId
);
external_id!(
    /// Identifier of a saved address owned by the Address Service.
    AddressId
);
external_id!(
    /// Identifier of the signed-in customer.
    CustomerId
);
