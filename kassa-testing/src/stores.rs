// In-memory host stores

use async_trait::async_trait;
use kassa_gateway::{
    GatewayResult, Order, OrderId, OrderStatus, OrderStore, Refund, StoredCardToken, TokenStore,
    Transition, meta,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lock a mutex, ignoring poisoning from a panicked test thread
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct OrderState {
    orders: BTreeMap<OrderId, Order>,
    notes: BTreeMap<OrderId, Vec<String>>,
    refunds: BTreeMap<OrderId, Vec<Refund>>,
    next_refund_id: u64,
}

/// Order store keeping everything in memory.
///
/// Status updates happen under one mutex, so `mark_paid` and `transition`
/// are atomic the way a conditional database update is.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<OrderState>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with `order` already placed
    pub fn with_order(self, order: Order) -> Self {
        self.insert_order(order);
        self
    }

    pub fn insert_order(&self, order: Order) {
        lock(&self.state).orders.insert(order.id, order);
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        lock(&self.state).orders.get(&id).cloned()
    }

    /// Notes added to an order, oldest first
    pub fn notes(&self, id: OrderId) -> Vec<String> {
        lock(&self.state).notes.get(&id).cloned().unwrap_or_default()
    }

    pub fn refunds(&self, order_id: OrderId) -> Vec<Refund> {
        lock(&self.state)
            .refunds
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Create a refund record the way the host does after `process_refund`
    pub fn create_refund(&self, mut refund: Refund) -> Refund {
        let mut state = lock(&self.state);
        state.next_refund_id += 1;
        refund.id = state.next_refund_id;
        state
            .refunds
            .entry(refund.order_id)
            .or_default()
            .push(refund.clone());
        refund
    }

    /// Number of calls of a store method
    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|m| *m == method).count()
    }

    fn record_call(&self, method: &str) {
        lock(&self.calls).push(method.to_string());
    }

    fn update<F>(&self, id: OrderId, apply: F) -> GatewayResult<Transition>
    where
        F: FnOnce(&mut Order) -> Transition,
    {
        let mut state = lock(&self.state);
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| kassa_gateway::GatewayError::Store(format!("no order {}", id)))?;
        Ok(apply(order))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_order(&self, id: OrderId) -> GatewayResult<Option<Order>> {
        self.record_call("find_order");
        Ok(self.order(id))
    }

    async fn find_by_reference(&self, reference: &str) -> GatewayResult<Option<Order>> {
        self.record_call("find_by_reference");
        let marker = meta::reference_marker(reference);
        Ok(lock(&self.state)
            .orders
            .values()
            .find(|order| order.meta(&marker) == Some("1"))
            .cloned())
    }

    async fn set_meta(&self, id: OrderId, key: &str, value: &str) -> GatewayResult<()> {
        self.record_call("set_meta");
        self.update(id, |order| {
            order.meta.insert(key.to_string(), value.to_string());
            Transition::Applied
        })
        .map(|_| ())
    }

    async fn add_note(&self, id: OrderId, note: &str) -> GatewayResult<()> {
        self.record_call("add_note");
        lock(&self.state)
            .notes
            .entry(id)
            .or_default()
            .push(note.to_string());
        Ok(())
    }

    async fn mark_paid(
        &self,
        id: OrderId,
        transaction_id: Option<&str>,
    ) -> GatewayResult<Transition> {
        self.record_call("mark_paid");
        self.update(id, |order| {
            if order.status.is_paid() {
                return Transition::Unchanged;
            }
            order.status = OrderStatus::Processing;
            if let Some(tx) = transaction_id.filter(|tx| !tx.is_empty()) {
                order.transaction_id = Some(tx.to_string());
            }
            Transition::Applied
        })
    }

    async fn transition(&self, id: OrderId, status: OrderStatus) -> GatewayResult<Transition> {
        self.record_call("transition");
        self.update(id, |order| {
            if order.status.is_paid() || order.status == status {
                return Transition::Unchanged;
            }
            order.status = status;
            Transition::Applied
        })
    }

    async fn find_refund(
        &self,
        order_id: OrderId,
        unique_id: &str,
    ) -> GatewayResult<Option<Refund>> {
        self.record_call("find_refund");
        Ok(lock(&self.state).refunds.get(&order_id).and_then(|refunds| {
            refunds
                .iter()
                .find(|r| r.unique_id() == Some(unique_id))
                .cloned()
        }))
    }

    async fn save_refund(&self, refund: &Refund) -> GatewayResult<()> {
        self.record_call("save_refund");
        let mut state = lock(&self.state);
        let refunds = state.refunds.entry(refund.order_id).or_default();
        match refunds.iter_mut().find(|r| r.id == refund.id) {
            Some(existing) => *existing = refund.clone(),
            None => refunds.push(refund.clone()),
        }
        Ok(())
    }

    async fn delete_refund(&self, order_id: OrderId, refund_id: u64) -> GatewayResult<bool> {
        self.record_call("delete_refund");
        let mut state = lock(&self.state);
        let Some(refunds) = state.refunds.get_mut(&order_id) else {
            return Ok(false);
        };
        let before = refunds.len();
        refunds.retain(|r| r.id != refund_id);
        Ok(refunds.len() != before)
    }
}

#[derive(Default)]
struct TokenState {
    tokens: BTreeMap<u64, StoredCardToken>,
    order_cards: BTreeMap<OrderId, u64>,
    next_id: u64,
}

/// Card token store keeping everything in memory
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    state: Arc<Mutex<TokenState>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a card directly, returning it with its id
    pub fn insert(&self, mut token: StoredCardToken) -> StoredCardToken {
        let mut state = lock(&self.state);
        state.next_id += 1;
        token.id = state.next_id;
        state.tokens.insert(token.id, token.clone());
        token
    }

    /// Charge renewals of `order_id` to card `token_id`
    pub fn bind_order(&self, order_id: OrderId, token_id: u64) {
        lock(&self.state).order_cards.insert(order_id, token_id);
    }

    pub fn all(&self) -> Vec<StoredCardToken> {
        lock(&self.state).tokens.values().cloned().collect()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, token_id: u64) -> GatewayResult<Option<StoredCardToken>> {
        Ok(lock(&self.state).tokens.get(&token_id).cloned())
    }

    async fn for_customer(&self, customer_id: u64) -> GatewayResult<Vec<StoredCardToken>> {
        Ok(lock(&self.state)
            .tokens
            .values()
            .filter(|t| t.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn save(&self, token: StoredCardToken) -> GatewayResult<StoredCardToken> {
        Ok(self.insert(token))
    }

    async fn delete(&self, token_id: u64) -> GatewayResult<bool> {
        Ok(lock(&self.state).tokens.remove(&token_id).is_some())
    }

    async fn token_for_order(&self, order_id: OrderId) -> GatewayResult<Option<StoredCardToken>> {
        let state = lock(&self.state);
        Ok(state
            .order_cards
            .get(&order_id)
            .and_then(|id| state.tokens.get(id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::OrderBuilder;

    #[tokio::test]
    async fn test_mark_paid_applies_once() {
        let store = InMemoryOrderStore::new().with_order(OrderBuilder::new(1).build());

        assert_eq!(
            store.mark_paid(1, Some("tx-1")).await.unwrap(),
            Transition::Applied
        );
        assert_eq!(
            store.mark_paid(1, Some("tx-2")).await.unwrap(),
            Transition::Unchanged
        );
        assert_eq!(store.order(1).unwrap().transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(
            store.transition(1, OrderStatus::Failed).await.unwrap(),
            Transition::Unchanged
        );
    }

    #[tokio::test]
    async fn test_find_by_reference_marker() {
        let store = InMemoryOrderStore::new().with_order(OrderBuilder::new(4).build());
        store
            .set_meta(4, &meta::reference_marker("abc"), "1")
            .await
            .unwrap();

        assert_eq!(store.find_by_reference("abc").await.unwrap().unwrap().id, 4);
        assert!(store.find_by_reference("abd").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_store_assigns_ids() {
        let store = InMemoryTokenStore::new();
        let card = StoredCardToken {
            id: 0,
            customer_id: 9,
            token: "tok".into(),
            brand: "Visa".into(),
            last4: "0024".into(),
            expiry_month: 11,
            expiry_year: 2030,
            is_default: true,
        };
        let first = store.save(card.clone()).await.unwrap();
        let second = store.save(card).await.unwrap();
        assert_ne!(first.id, second.id);

        store.bind_order(3, second.id);
        assert_eq!(store.token_for_order(3).await.unwrap().unwrap().id, second.id);
        assert!(store.delete(first.id).await.unwrap());
        assert_eq!(store.for_customer(9).await.unwrap().len(), 1);
    }
}
