//! Payment service client for the kassa gateway
//!
//! Wire types, HMAC signing and a signed HTTP client for the OP/Paytrail
//! payment service API.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          kassa-psp                            │
//! │                                                               │
//! │   PaymentRequest / RefundRequest ──► CheckoutClient ──► PSP   │
//! │                                          │                    │
//! │                                   Signer (HMAC)               │
//! │                                          │                    │
//! │   callbacks / redirects ─────────► verify_query()             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kassa_psp::{CheckoutClient, CheckoutConfig, PspClient};
//!
//! let client = CheckoutClient::new(CheckoutConfig::new("375917", "SAIPPUAKAUPPIAS"))?;
//! let providers = client.get_providers(1525, &[]).await?;
//! ```

pub mod checkout;
pub mod client;
pub mod error;
pub mod money;
pub mod signature;
pub mod types;

pub use checkout::{CheckoutClient, CheckoutConfig, DEFAULT_BASE_URL};
pub use client::PspClient;
pub use error::*;
pub use money::*;
pub use signature::{Algorithm, Signer, signing_payload};
pub use types::*;
