//! Testing utilities for kassa gateways
//!
//! In-memory implementations of the host traits, a scripted payment
//! service and signed callback builders.
//!
//! ```rust,ignore
//! use kassa_testing::*;
//!
//! let t = TestGateway::new()?.with_order(OrderBuilder::new(1).build());
//! let session = InMemorySession::default();
//! let outcome = t
//!     .gateway
//!     .payments()
//!     .process_payment(1, &CheckoutSubmission::provider("nordea"), PaymentOrigin::Checkout, &session)
//!     .await;
//! assert!(t.psp.was_called("create_payment"));
//! ```

pub mod fixtures;
pub mod psp;
pub mod session;
pub mod stores;

pub use fixtures::*;
pub use psp::{MOCK_CARD_TOKEN, MockPsp, default_providers, default_token};
pub use session::InMemorySession;
pub use stores::{InMemoryOrderStore, InMemoryTokenStore};
