use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::CheckoutError;
use crate::models::{AddressId, InlineAddress, SavedAddress, ShippingSelection};

/// Holds the shopper's shipping choice: a saved address or an inline draft,
/// never both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressResolver {
    selection: Option<ShippingSelection>,
    saved_addresses: Vec<SavedAddress>,
}

impl AddressResolver {
    pub fn new(saved_addresses: Vec<SavedAddress>) -> Self {
        Self {
            selection: None,
            saved_addresses,
        }
    }

    /// Pre-selects the address flagged as default, if the customer has one.
    pub fn with_default_selected(mut self) -> Self {
        if let Some(default) = self.saved_addresses.iter().find(|a| a.is_default) {
            self.selection = Some(ShippingSelection::SavedAddressRef {
                id: default.id.clone(),
            });
        }
        self
    }

    pub fn saved_addresses(&self) -> &[SavedAddress] {
        &self.saved_addresses
    }

    /// Selects a saved address and drops any inline draft. When the address
    /// book is loaded the id must belong to it.
    pub fn select_saved(&mut self, id: AddressId) -> Result<(), CheckoutError> {
        if !self.saved_addresses.is_empty() && !self.saved_addresses.iter().any(|a| a.id == id) {
            return Err(CheckoutError::Validation(format!(
                "Saved address {} does not belong to this account",
                id
            )));
        }
        self.selection = Some(ShippingSelection::SavedAddressRef { id });
        Ok(())
    }

    /// Stores an inline draft and drops any saved selection. Completeness is
    /// checked when the address is resolved.
    pub fn set_inline(&mut self, address: InlineAddress) {
        self.selection = Some(ShippingSelection::InlineAddress { address });
    }

    pub fn clear(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<&ShippingSelection> {
        self.selection.as_ref()
    }

    pub fn saved_address_id(&self) -> Option<&AddressId> {
        match &self.selection {
            Some(ShippingSelection::SavedAddressRef { id }) => Some(id),
            _ => None,
        }
    }

    pub fn inline_address(&self) -> Option<&InlineAddress> {
        match &self.selection {
            Some(ShippingSelection::InlineAddress { address }) => Some(address),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.resolve().is_ok()
    }

    /// The single shipping value handed to order creation.
    pub fn resolve(&self) -> Result<ShippingSelection, CheckoutError> {
        match &self.selection {
            None => Err(CheckoutError::MissingAddress),
            Some(ShippingSelection::InlineAddress { address }) => {
                address.validate()?;
                Ok(ShippingSelection::InlineAddress {
                    address: address.clone(),
                })
            }
            Some(selection) => Ok(selection.clone()),
        }
    }
}
