// Kassa - shop payment gateway for the OP/Paytrail payment service
//
// This library turns shop orders into signed payment requests, applies the
// payment service's callbacks exactly once and drives refunds and stored
// cards. The shop provides storage through the traits in `kassa_gateway`.

// Re-export the gateway
pub use kassa_gateway::*;

// Re-export member crates
pub use kassa_config;
pub use kassa_gateway;
pub use kassa_log;
pub use kassa_psp;

#[cfg(feature = "testing")]
pub use kassa_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        CallbackDispatcher,
        CallbackResponse,
        CartSession,
        CheckoutSubmission,
        Gateway,
        GatewayError,
        GatewayResult,
        Order,
        OrderStatus,
        OrderStore,
        PaymentOrigin,
        PaymentOutcome,
        RouteRequest,
        RouteResponse,
        Router,
        TokenStore,
    };
    pub use kassa_config::{GatewaySettings, SettingsLoader};
    pub use kassa_psp::{CheckoutClient, CheckoutConfig, PspClient, Signer};
}
