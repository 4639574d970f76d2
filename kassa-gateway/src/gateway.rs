//! Gateway wiring: settings, PSP client and host stores

use crate::callback::CallbackDispatcher;
use crate::card::CardOrchestrator;
use crate::catalog::ProviderCatalog;
use crate::error::GatewayResult;
use crate::host::{OrderStore, TokenStore};
use crate::lock::OrderLocks;
use crate::payment::PaymentOrchestrator;
use crate::refund::RefundOrchestrator;
use crate::router::Router;
use kassa_config::GatewaySettings;
use kassa_psp::{CheckoutClient, CheckoutConfig, PspClient, Signer};
use std::sync::Arc;

/// Shared state of one configured gateway.
///
/// Cheap to clone; every orchestrator holds its own clone.
#[derive(Clone)]
pub struct Gateway {
    settings: Arc<GatewaySettings>,
    psp: Arc<dyn PspClient>,
    orders: Arc<dyn OrderStore>,
    tokens: Arc<dyn TokenStore>,
    signer: Signer,
    locks: OrderLocks,
}

impl Gateway {
    /// Wire a gateway from its parts
    pub fn new(
        settings: GatewaySettings,
        psp: Arc<dyn PspClient>,
        orders: Arc<dyn OrderStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        if settings.debug {
            kassa_log::set_debug(true);
        }
        let signer = Signer::new(settings.credentials().secret_key);
        let locks = OrderLocks::new(settings.lock_dir.clone());

        Self {
            settings: Arc::new(settings),
            psp,
            orders,
            tokens,
            signer,
            locks,
        }
    }

    /// Wire a gateway talking to the real payment service
    pub fn connect(
        settings: GatewaySettings,
        orders: Arc<dyn OrderStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> GatewayResult<Self> {
        let credentials = settings.credentials();
        let client = CheckoutClient::new(
            CheckoutConfig::new(credentials.merchant_id, credentials.secret_key)
                .base_url(settings.api_base_url.clone())
                .platform_name(settings.platform_name.clone())
                .request_timeout(settings.request_timeout())
                .metadata_timeout(settings.metadata_timeout()),
        )?;
        kassa_log::info!(
            "Payment gateway ready (test mode: {}, in-store provider selection: {})",
            settings.test_mode,
            settings.provider_selection_in_store
        );
        Ok(Self::new(settings, Arc::new(client), orders, tokens))
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn psp(&self) -> &dyn PspClient {
        self.psp.as_ref()
    }

    pub fn orders(&self) -> &dyn OrderStore {
        self.orders.as_ref()
    }

    pub fn tokens(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    /// Verifies callbacks with the merchant secret
    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn locks(&self) -> &OrderLocks {
        &self.locks
    }

    pub fn catalog(&self) -> ProviderCatalog {
        ProviderCatalog::new(self.psp.clone())
    }

    pub fn payments(&self) -> PaymentOrchestrator {
        PaymentOrchestrator::new(self.clone())
    }

    pub fn refunds(&self) -> RefundOrchestrator {
        RefundOrchestrator::new(self.clone())
    }

    pub fn cards(&self) -> CardOrchestrator {
        CardOrchestrator::new(self.clone())
    }

    pub fn callbacks(&self) -> CallbackDispatcher {
        CallbackDispatcher::new(self.clone())
    }

    pub fn router(&self) -> Router {
        Router::new(self.clone())
    }
}
