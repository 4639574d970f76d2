//! Payment gateway orchestration for shops paying through OP/Paytrail
//!
//! The shop plugs its order, cart and card storage in through the
//! [`OrderStore`], [`CartSession`] and [`TokenStore`] traits. The gateway
//! turns orders into signed payment requests, applies callbacks exactly
//! once per order and drives refunds and stored cards.
//!
//! ## Overview
//!
//! ```text
//! checkout ──► PaymentOrchestrator ──► PspClient ──► PSP
//!                    │                                 │
//!               OrderStore ◄── CallbackDispatcher ◄────┘
//!                    │             │
//!               OrderLocks    RefundOrchestrator
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kassa_gateway::{CheckoutSubmission, Gateway, PaymentOrigin};
//!
//! let gateway = Gateway::connect(settings, orders, tokens)?;
//! let outcome = gateway
//!     .payments()
//!     .process_payment(order_id, &CheckoutSubmission::provider("nordea"), PaymentOrigin::Checkout, &session)
//!     .await?;
//! println!("redirect to {}", outcome.redirect_url());
//! ```

pub mod callback;
pub mod card;
pub mod catalog;
pub mod error;
pub mod gateway;
pub mod host;
pub mod lock;
pub mod mapper;
pub mod payment;
pub mod reference;
pub mod refund;
pub mod router;

pub use callback::{CallbackDispatcher, CallbackResponse};
pub use card::{CardContext, CardOrchestrator, CardOutcome, Notice, NoticeKind};
pub use catalog::{Catalog, ProviderCatalog, ProviderGroup};
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use host::*;
pub use lock::{OrderLock, OrderLocks};
pub use mapper::{RequestMapper, record_reference};
pub use payment::{
    CallbackStatus, CheckoutSubmission, FailureDisposition, HostedForm, PaymentCallback,
    PaymentFailure, PaymentOrchestrator, PaymentOrigin, PaymentOutcome,
};
pub use reference::{generate_reference, payment_stamp};
pub use refund::{RefundAck, RefundExecution, RefundOrchestrator, RefundOutcome, RefundTicket};
pub use router::{RouteRequest, RouteResponse, Router};
