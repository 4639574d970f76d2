// In-memory buyer session

use crate::stores::lock;
use kassa_gateway::{CartSession, PaySelection};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Session of one buyer with a cart
pub struct InMemorySession {
    locale: String,
    subscription: bool,
    cart_emptied: AtomicUsize,
    selection: Mutex<Option<PaySelection>>,
}

impl InMemorySession {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            subscription: false,
            cart_emptied: AtomicUsize::new(0),
            selection: Mutex::new(None),
        }
    }

    /// Cart holding a subscription product
    pub fn with_subscription(mut self) -> Self {
        self.subscription = true;
        self
    }

    /// How many times the cart was emptied
    pub fn cart_emptied(&self) -> usize {
        self.cart_emptied.load(Ordering::SeqCst)
    }
}

impl Default for InMemorySession {
    fn default() -> Self {
        Self::new("fi_FI")
    }
}

impl CartSession for InMemorySession {
    fn empty_cart(&self) {
        self.cart_emptied.fetch_add(1, Ordering::SeqCst);
    }

    fn contains_subscription(&self) -> bool {
        self.subscription
    }

    fn locale(&self) -> String {
        self.locale.clone()
    }

    fn set_pay_selection(&self, selection: PaySelection) {
        *lock(&self.selection) = Some(selection);
    }

    fn pay_selection(&self) -> Option<PaySelection> {
        lock(&self.selection).clone()
    }
}
