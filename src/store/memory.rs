//! In-process store with the same guarantees as [`PgStore`](super::PgStore).
//!
//! All state lives behind one mutex and every trait method runs to completion
//! while holding it, so each method is atomic in the same way a single SQL
//! transaction is. Used by the integration tests and for running the server
//! without a database (`STORE=memory`).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{CancelledOrder, IdentityDirectory, IssuedOrder, TicketStore};
use crate::models::transfer::TRANSFER_COMPLETED;
use crate::models::{
    NewOrder, NewTicket, Order, OrderStatus, PushToken, Ticket, TicketStats, TicketStatus,
    TicketTransfer, Transition, UserRole, UserSummary,
};
use crate::utils::AppError;

#[derive(Default)]
struct Inner {
    orders: BTreeMap<i64, Order>,
    tickets: BTreeMap<i64, Ticket>,
    codes: HashSet<Uuid>,
    transfers: Vec<TicketTransfer>,
    users: HashMap<Uuid, (String, UserRole)>,
    customers: HashMap<String, Uuid>,
    push_tokens: Vec<PushToken>,
    next_order_id: i64,
    next_ticket_id: i64,
    next_transfer_id: i64,
    unavailable: bool,
}

impl Inner {
    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| AppError::InternalServerError("store lock poisoned".to_string()))?;
        inner.check_available()?;
        Ok(inner)
    }

    fn lock_for_setup(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers a user in the identity mirror.
    pub fn add_user(&self, id: Uuid, email: &str, role: UserRole) {
        self.lock_for_setup()
            .users
            .insert(id, (email.to_string(), role));
    }

    /// Maps a payment customer id to a registered user.
    pub fn link_customer(&self, customer_id: &str, user_id: Uuid) {
        self.lock_for_setup()
            .customers
            .insert(customer_id.to_string(), user_id);
    }

    /// Makes every subsequent store call fail like an unreachable database.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock_for_setup().unavailable = unavailable;
    }

    /// Overwrites a ticket's status without going through a transition.
    /// Only for seeding rows written by older versions of the app.
    pub fn seed_status(&self, ticket_id: i64, status: TicketStatus) {
        if let Some(ticket) = self.lock_for_setup().tickets.get_mut(&ticket_id) {
            ticket.status = status;
        }
    }

    pub fn order_by_session(&self, checkout_session_id: &str) -> Option<Order> {
        self.lock_for_setup()
            .orders
            .values()
            .find(|o| o.checkout_session_id == checkout_session_id)
            .cloned()
    }

    pub fn order_count(&self) -> usize {
        self.lock_for_setup().orders.len()
    }

    pub fn ticket_count(&self) -> usize {
        self.lock_for_setup().tickets.len()
    }
}

#[async_trait]
impl TicketStore for InMemoryStore {
    async fn order_exists(&self, checkout_session_id: &str) -> Result<bool, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .orders
            .values()
            .any(|o| o.checkout_session_id == checkout_session_id))
    }

    async fn record_order(
        &self,
        order: NewOrder,
        tickets: Vec<NewTicket>,
    ) -> Result<Option<IssuedOrder>, AppError> {
        let mut inner = self.lock()?;

        if inner
            .orders
            .values()
            .any(|o| o.checkout_session_id == order.checkout_session_id)
        {
            return Ok(None);
        }
        if let Some(intent) = &order.payment_intent_id {
            if inner
                .orders
                .values()
                .any(|o| o.payment_intent_id.as_ref() == Some(intent))
            {
                return Ok(None);
            }
        }

        // Check the uniqueness constraints before writing anything.
        let mut batch_codes = HashSet::new();
        for ticket in &tickets {
            if inner.codes.contains(&ticket.qr_code_data) || !batch_codes.insert(ticket.qr_code_data)
            {
                return Err(AppError::InternalServerError(format!(
                    "duplicate qr_code_data {}",
                    ticket.qr_code_data
                )));
            }
        }

        let now = Utc::now();
        inner.next_order_id += 1;
        let recorded = Order {
            id: inner.next_order_id,
            checkout_session_id: order.checkout_session_id,
            payment_intent_id: order.payment_intent_id,
            customer_id: order.customer_id,
            user_id: order.user_id,
            amount_subtotal: order.amount_subtotal,
            amount_total: order.amount_total,
            currency: order.currency,
            payment_status: order.payment_status,
            status: OrderStatus::Completed,
            created_at: now,
        };
        inner.orders.insert(recorded.id, recorded.clone());

        let mut minted = Vec::with_capacity(tickets.len());
        for draft in tickets {
            inner.next_ticket_id += 1;
            let ticket = Ticket {
                id: inner.next_ticket_id,
                order_id: recorded.id,
                ticket_type: draft.ticket_type,
                ticket_number: draft.ticket_number,
                qr_code_data: draft.qr_code_data,
                owner_id: recorded.user_id,
                original_purchaser_id: recorded.user_id,
                status: TicketStatus::Active,
                validated_at: None,
                validated_by: None,
                background_color: draft.background_color,
                event_name: draft.event_name,
                event_date: draft.event_date,
                created_at: now,
                updated_at: now,
            };
            inner.codes.insert(ticket.qr_code_data);
            inner.tickets.insert(ticket.id, ticket.clone());
            minted.push(ticket);
        }

        Ok(Some(IssuedOrder {
            order: recorded,
            tickets: minted,
        }))
    }

    async fn ticket(&self, ticket_id: i64) -> Result<Option<Ticket>, AppError> {
        Ok(self.lock()?.tickets.get(&ticket_id).cloned())
    }

    async fn ticket_by_code(&self, qr_code_data: Uuid) -> Result<Option<Ticket>, AppError> {
        Ok(self
            .lock()?
            .tickets
            .values()
            .find(|t| t.qr_code_data == qr_code_data)
            .cloned())
    }

    async fn tickets_for_order(&self, order_id: i64) -> Result<Vec<Ticket>, AppError> {
        let mut tickets: Vec<Ticket> = self
            .lock()?
            .tickets
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.ticket_number);
        Ok(tickets)
    }

    async fn tickets_owned_by(&self, owner_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        Ok(self
            .lock()?
            .tickets
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn transfers_for_ticket(&self, ticket_id: i64) -> Result<Vec<TicketTransfer>, AppError> {
        Ok(self
            .lock()?
            .transfers
            .iter()
            .filter(|t| t.ticket_id == ticket_id)
            .cloned()
            .collect())
    }

    async fn transfer_ticket(
        &self,
        ticket_id: i64,
        from: Uuid,
        to: Uuid,
    ) -> Result<Option<(Ticket, TicketTransfer)>, AppError> {
        let mut inner = self.lock()?;
        let now = Utc::now();

        let next_status = match inner.tickets.get(&ticket_id) {
            Some(ticket) if ticket.owner_id == from => {
                match ticket.status.apply(Transition::Transfer) {
                    Ok(status) => status,
                    Err(_) => return Ok(None),
                }
            }
            _ => return Ok(None),
        };

        inner.next_transfer_id += 1;
        let audit = TicketTransfer {
            id: inner.next_transfer_id,
            ticket_id,
            from_user_id: from,
            to_user_id: to,
            transfer_status: TRANSFER_COMPLETED.to_string(),
            transferred_at: now,
        };
        inner.transfers.push(audit.clone());

        let ticket = match inner.tickets.get_mut(&ticket_id) {
            Some(ticket) => ticket,
            None => return Ok(None),
        };
        ticket.owner_id = to;
        ticket.status = next_status;
        ticket.updated_at = now;

        Ok(Some((ticket.clone(), audit)))
    }

    async fn validate_ticket(
        &self,
        ticket_id: i64,
        validated_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, AppError> {
        let mut inner = self.lock()?;
        let Some(ticket) = inner.tickets.get_mut(&ticket_id) else {
            return Ok(None);
        };
        let Ok(next_status) = ticket.status.apply(Transition::Validate) else {
            return Ok(None);
        };

        ticket.status = next_status;
        ticket.validated_at = Some(at);
        ticket.validated_by = Some(validated_by);
        ticket.updated_at = at;
        Ok(Some(ticket.clone()))
    }

    async fn cancel_order(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CancelledOrder>, AppError> {
        let mut inner = self.lock()?;
        let Some(order_id) = inner
            .orders
            .values()
            .find(|o| o.payment_intent_id.as_deref() == Some(payment_intent_id))
            .map(|o| o.id)
        else {
            return Ok(None);
        };

        let now = Utc::now();
        let mut cancelled = 0;
        for ticket in inner.tickets.values_mut().filter(|t| t.order_id == order_id) {
            if let Ok(next_status) = ticket.status.apply(Transition::Cancel) {
                ticket.status = next_status;
                ticket.updated_at = now;
                cancelled += 1;
            }
        }
        if let Some(order) = inner.orders.get_mut(&order_id) {
            order.status = OrderStatus::Canceled;
        }

        Ok(Some(CancelledOrder {
            order_id,
            cancelled_tickets: cancelled,
        }))
    }

    async fn expire_tickets(&self, event_name: Option<&str>) -> Result<u64, AppError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let mut expired = 0;
        for ticket in inner.tickets.values_mut() {
            if event_name.is_some() && ticket.event_name.as_deref() != event_name {
                continue;
            }
            if let Ok(next_status) = ticket.status.apply(Transition::Expire) {
                ticket.status = next_status;
                ticket.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn ticket_stats(&self) -> Result<TicketStats, AppError> {
        let inner = self.lock()?;
        let mut stats = TicketStats::default();
        for ticket in inner.tickets.values() {
            stats.record(ticket.status, 1);
        }
        Ok(stats)
    }

    async fn save_push_token(&self, token: PushToken) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        match inner
            .push_tokens
            .iter_mut()
            .find(|t| t.user_id == token.user_id && t.expo_push_token == token.expo_push_token)
        {
            Some(existing) => existing.device_id = token.device_id,
            None => inner.push_tokens.push(token),
        }
        Ok(())
    }

    async fn remove_push_token(
        &self,
        user_id: Uuid,
        expo_push_token: &str,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock()?;
        let before = inner.push_tokens.len();
        inner
            .push_tokens
            .retain(|t| !(t.user_id == user_id && t.expo_push_token == expo_push_token));
        Ok(inner.push_tokens.len() < before)
    }

    async fn push_tokens(&self, user_ids: Option<&[Uuid]>) -> Result<Vec<String>, AppError> {
        let inner = self.lock()?;
        let mut seen = HashSet::new();
        Ok(inner
            .push_tokens
            .iter()
            .filter(|t| user_ids.map_or(true, |ids| ids.contains(&t.user_id)))
            .filter(|t| seen.insert(t.expo_push_token.clone()))
            .map(|t| t.expo_push_token.clone())
            .collect())
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryStore {
    async fn user_for_customer(&self, customer_id: &str) -> Result<Option<Uuid>, AppError> {
        Ok(self.lock()?.customers.get(customer_id).copied())
    }

    async fn find_users_by_email(
        &self,
        email: &str,
        exclude: Uuid,
    ) -> Result<Vec<UserSummary>, AppError> {
        let wanted = email.trim().to_lowercase();
        let mut users: Vec<UserSummary> = self
            .lock()?
            .users
            .iter()
            .filter(|(id, (address, _))| **id != exclude && address.to_lowercase() == wanted)
            .map(|(id, (address, _))| UserSummary {
                id: *id,
                email: address.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn user_email(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(self
            .lock()?
            .users
            .get(&user_id)
            .map(|(email, _)| email.clone()))
    }

    async fn user_role(&self, user_id: Uuid) -> Result<UserRole, AppError> {
        Ok(self
            .lock()?
            .users
            .get(&user_id)
            .map(|(_, role)| *role)
            .unwrap_or(UserRole::User))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(number: i32) -> NewTicket {
        NewTicket {
            ticket_type: "General Admission".to_string(),
            ticket_number: number,
            qr_code_data: Uuid::new_v4(),
            background_color: "#4CAF50".to_string(),
            event_name: None,
            event_date: None,
        }
    }

    fn order(session: &str, user_id: Uuid) -> NewOrder {
        NewOrder {
            checkout_session_id: session.to_string(),
            payment_intent_id: Some(format!("pi_{session}")),
            customer_id: "cus_1".to_string(),
            user_id,
            amount_subtotal: 5000,
            amount_total: 5000,
            currency: "usd".to_string(),
            payment_status: "paid".to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_code_rejects_whole_batch() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let mut tickets = vec![draft(1), draft(2)];
        tickets[1].qr_code_data = tickets[0].qr_code_data;

        let result = store.record_order(order("cs_dup", user), tickets).await;

        assert!(result.is_err());
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.ticket_count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_guard_requires_current_owner() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let issued = store
            .record_order(order("cs_1", owner), vec![draft(1)])
            .await
            .unwrap()
            .unwrap();
        let ticket_id = issued.tickets[0].id;

        let stranger = Uuid::new_v4();
        let result = store
            .transfer_ticket(ticket_id, stranger, Uuid::new_v4())
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(store.transfers_for_ticket(ticket_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_with_database_error() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);

        let err = store.ticket(1).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
