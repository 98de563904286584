//! Storefront Checkout Library
//!
//! Checkout orchestration for a storefront backend: the step-by-step checkout
//! state machine, totals preview, and the create-order-then-settle protocol
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod clients;
pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod services;

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::clients::HttpStorefrontClient;
use crate::config::CheckoutConfig;
use crate::errors::ServiceError;
use crate::events::{AnalyticsSink, CheckoutEvent};
use crate::services::{CheckoutCollaborators, CheckoutOrchestrator};

/// Wires an orchestrator against the configured storefront backend. The
/// returned receiver must be drained, usually with [`spawn_analytics`].
pub fn bootstrap(
    config: &CheckoutConfig,
) -> Result<(CheckoutOrchestrator, mpsc::Receiver<CheckoutEvent>), ServiceError> {
    let client = Arc::new(HttpStorefrontClient::from_config(config)?);
    let (event_sender, event_rx) = events::event_channel(config.event_channel_capacity);
    let orchestrator = CheckoutOrchestrator::new(
        CheckoutCollaborators::from_client(client),
        event_sender,
        config.pricing(),
    );

    info!(
        api_base_url = %config.api_base_url,
        environment = %config.environment,
        "Checkout orchestrator ready"
    );
    Ok((orchestrator, event_rx))
}

/// Runs the analytics loop on the current tokio runtime.
pub fn spawn_analytics(
    rx: mpsc::Receiver<CheckoutEvent>,
    sink: Arc<dyn AnalyticsSink>,
) -> JoinHandle<()> {
    tokio::spawn(events::process_events(rx, sink))
}

pub mod prelude {
    pub use crate::clients::*;
    pub use crate::config::{init_tracing, load_config, CheckoutConfig};
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::models::*;
    pub use crate::services::{
        AddressResolver, CheckoutCollaborators, CheckoutOrchestrator, CheckoutPhase,
        CheckoutSession, PhaseChange, PricingPolicy, ShippingPolicy, TotalsCalculator,
    };
    pub use crate::{bootstrap, spawn_analytics};
}
