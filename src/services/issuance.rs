//! Turns a paid checkout session into an order and its tickets.

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{NewOrder, NewTicket};
use crate::payments::{CheckoutSession, LineItem, PaymentGateway};
use crate::store::{IdentityDirectory, TicketStore};
use crate::utils::AppError;

pub const TICKET_COLORS: [&str; 8] = [
    "#4CAF50", "#2196F3", "#FF9800", "#9C27B0", "#F44336", "#00BCD4", "#8BC34A", "#FFC107",
];

const DEFAULT_TICKET_TYPE: &str = "General Admission";
const DEFAULT_CURRENCY: &str = "usd";

/// Largest order a single checkout may issue.
pub const MAX_TICKETS_PER_ORDER: u32 = 1_000;

/// A price that issues a fixed number of admission tickets, whatever
/// quantity was purchased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRule {
    pub price_id: String,
    pub tickets: u32,
    pub ticket_type: String,
}

impl BundleRule {
    /// Parses `price_id=tickets:Ticket Type` entries separated by
    /// commas. Blank entries are skipped.
    pub fn parse_table(table: &str) -> Result<Vec<BundleRule>, String> {
        table
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::parse_entry)
            .collect()
    }

    fn parse_entry(entry: &str) -> Result<BundleRule, String> {
        let (price_id, rest) = entry
            .split_once('=')
            .ok_or_else(|| format!("'{entry}' is missing '='"))?;
        let (count, ticket_type) = rest
            .split_once(':')
            .ok_or_else(|| format!("'{entry}' is missing ':'"))?;

        let price_id = price_id.trim();
        let ticket_type = ticket_type.trim();
        if price_id.is_empty() || ticket_type.is_empty() {
            return Err(format!("'{entry}' needs a price id and a ticket type"));
        }

        let tickets: u32 = count
            .trim()
            .parse()
            .map_err(|_| format!("'{entry}' has an invalid ticket count"))?;
        if tickets == 0 {
            return Err(format!("'{entry}' must issue at least one ticket"));
        }

        Ok(BundleRule {
            price_id: price_id.to_string(),
            tickets,
            ticket_type: ticket_type.to_string(),
        })
    }
}

/// How line items become tickets.
#[derive(Debug, Clone)]
pub struct IssuancePolicy {
    bundles: Vec<BundleRule>,
    pub default_ticket_type: String,
    pub event_name: Option<String>,
    pub event_date: Option<String>,
}

impl Default for IssuancePolicy {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl IssuancePolicy {
    pub fn new(bundles: Vec<BundleRule>) -> Self {
        Self {
            bundles,
            default_ticket_type: DEFAULT_TICKET_TYPE.to_string(),
            event_name: None,
            event_date: None,
        }
    }

    pub fn bundle_for(&self, price_id: &str) -> Option<&BundleRule> {
        self.bundles.iter().find(|rule| rule.price_id == price_id)
    }

    /// Number of tickets and their type for one line item.
    fn allotment(&self, item: &LineItem) -> (u32, String) {
        match item.price_id().and_then(|id| self.bundle_for(id)) {
            Some(rule) => (rule.tickets, rule.ticket_type.clone()),
            None => {
                // processor omits quantity for single units
                let quantity = item.quantity.filter(|q| *q > 0).unwrap_or(1);
                let ticket_type = item
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .unwrap_or(&self.default_ticket_type)
                    .to_string();
                (quantity, ticket_type)
            }
        }
    }

    /// Expands line items into the tickets of one order. Numbers run 1..N
    /// across every item; colours cycle through [`TICKET_COLORS`].
    pub fn plan(&self, items: &[LineItem]) -> Result<Vec<NewTicket>, AppError> {
        let allotments: Vec<(u32, String)> =
            items.iter().map(|item| self.allotment(item)).collect();

        let total = allotments
            .iter()
            .try_fold(0u32, |total, (count, _)| total.checked_add(*count))
            .filter(|total| *total <= MAX_TICKETS_PER_ORDER)
            .ok_or_else(|| {
                AppError::ValidationError(format!(
                    "Order exceeds {MAX_TICKETS_PER_ORDER} tickets"
                ))
            })?;

        let mut tickets = Vec::with_capacity(total as usize);
        for (count, ticket_type) in allotments {
            for _ in 0..count {
                let position = tickets.len();
                // bounded by MAX_TICKETS_PER_ORDER
                let ticket_number = position as i32 + 1;

                tickets.push(NewTicket {
                    ticket_type: ticket_type.clone(),
                    ticket_number,
                    qr_code_data: Uuid::new_v4(),
                    background_color: TICKET_COLORS[position % TICKET_COLORS.len()].to_string(),
                    event_name: self.event_name.clone(),
                    event_date: self.event_date.clone(),
                });
            }
        }

        Ok(tickets)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceOutcome {
    Issued { order_id: i64, ticket_count: usize },
    /// The session was already recorded; nothing was written.
    AlreadyProcessed,
    /// Subscription or unpaid session.
    NotIssuable,
    /// The session names no customer, or one with no known user. Logged as an
    /// integrity anomaly.
    UnknownCustomer,
    /// The session has no line items to issue.
    NoLineItems,
}

/// Records the order and mints its tickets in one transaction. Replays of the
/// same checkout session are no-ops.
pub async fn issue_tickets(
    store: &dyn TicketStore,
    directory: &dyn IdentityDirectory,
    gateway: &dyn PaymentGateway,
    policy: &IssuancePolicy,
    session: &CheckoutSession,
) -> Result<IssuanceOutcome, AppError> {
    if !session.is_paid_one_time() {
        info!(
            checkout_session_id = %session.id,
            mode = ?session.mode,
            payment_status = ?session.payment_status,
            "Checkout session does not issue tickets"
        );
        return Ok(IssuanceOutcome::NotIssuable);
    }

    if store.order_exists(&session.id).await? {
        info!(checkout_session_id = %session.id, "Checkout session already processed");
        return Ok(IssuanceOutcome::AlreadyProcessed);
    }

    let Some(customer_id) = session.customer.as_ref().map(|c| c.id().to_string()) else {
        error!(checkout_session_id = %session.id, "Paid checkout session has no customer");
        return Ok(IssuanceOutcome::UnknownCustomer);
    };
    let Some(user_id) = directory.user_for_customer(&customer_id).await? else {
        error!(
            checkout_session_id = %session.id,
            customer_id = %customer_id,
            "No user found for payment customer"
        );
        return Ok(IssuanceOutcome::UnknownCustomer);
    };

    let items = match &session.line_items {
        Some(list) if !list.data.is_empty() => list.data.clone(),
        _ => gateway.list_line_items(&session.id).await?,
    };
    let tickets = policy.plan(&items)?;
    if tickets.is_empty() {
        error!(checkout_session_id = %session.id, "Paid checkout session has no line items");
        return Ok(IssuanceOutcome::NoLineItems);
    }

    let order = NewOrder {
        checkout_session_id: session.id.clone(),
        payment_intent_id: session.payment_intent.as_ref().map(|pi| pi.id().to_string()),
        customer_id,
        user_id,
        amount_subtotal: session.amount_subtotal.unwrap_or_default(),
        amount_total: session.amount_total.unwrap_or_default(),
        currency: session
            .currency
            .clone()
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        payment_status: session.payment_status.clone().unwrap_or_default(),
    };

    match store.record_order(order, tickets).await? {
        Some(issued) => {
            info!(
                order_id = issued.order.id,
                checkout_session_id = %session.id,
                user_id = %user_id,
                ticket_count = issued.tickets.len(),
                "Issued tickets"
            );
            Ok(IssuanceOutcome::Issued {
                order_id: issued.order.id,
                ticket_count: issued.tickets.len(),
            })
        }
        None => {
            warn!(checkout_session_id = %session.id, "Concurrent delivery recorded the order first");
            Ok(IssuanceOutcome::AlreadyProcessed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::Expandable;
    use std::collections::HashSet;

    fn item(price: &str, quantity: Option<u32>, description: Option<&str>) -> LineItem {
        LineItem {
            price: Some(Expandable::Id(price.to_string())),
            quantity,
            description: description.map(str::to_string),
        }
    }

    fn vendor_policy() -> IssuancePolicy {
        IssuancePolicy::new(
            BundleRule::parse_table("price_vendor=2:Vendor Package - Admission").unwrap(),
        )
    }

    #[test]
    fn test_parse_table_entries() {
        let rules =
            BundleRule::parse_table(" price_a=2:Vendor Package - Admission , price_b=4:Crew ,")
                .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].price_id, "price_b");
        assert_eq!(rules[1].tickets, 4);
        assert_eq!(rules[1].ticket_type, "Crew");
    }

    #[test]
    fn test_parse_table_rejects_bad_entries() {
        assert!(BundleRule::parse_table("price_a:2").is_err());
        assert!(BundleRule::parse_table("price_a=two:Crew").is_err());
        assert!(BundleRule::parse_table("price_a=0:Crew").is_err());
        assert!(BundleRule::parse_table("=2:Crew").is_err());
        assert_eq!(BundleRule::parse_table("").unwrap(), Vec::new());
    }

    #[test]
    fn test_plan_numbers_and_codes() {
        let policy = IssuancePolicy::default();
        let tickets = policy
            .plan(&[item("price_ga", Some(3), Some("General Admission"))])
            .unwrap();

        let numbers: Vec<i32> = tickets.iter().map(|t| t.ticket_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let codes: HashSet<Uuid> = tickets.iter().map(|t| t.qr_code_data).collect();
        assert_eq!(codes.len(), 3);
        assert_eq!(tickets[0].background_color, "#4CAF50");
        assert_eq!(tickets[1].background_color, "#2196F3");
    }

    #[test]
    fn test_bundle_issues_fixed_count_regardless_of_quantity() {
        for quantity in [None, Some(1), Some(2), Some(5)] {
            let tickets = vendor_policy()
                .plan(&[item("price_vendor", quantity, Some("Vendor Package"))])
                .unwrap();
            assert_eq!(tickets.len(), 2, "quantity {quantity:?}");
        }

        let tickets = vendor_policy()
            .plan(&[item("price_vendor", Some(3), Some("Vendor Package"))])
            .unwrap();
        assert!(tickets
            .iter()
            .all(|t| t.ticket_type == "Vendor Package - Admission"));
    }

    #[test]
    fn test_numbering_spans_line_items_and_palette_wraps() {
        let tickets = vendor_policy()
            .plan(&[
                item("price_ga", Some(7), None),
                item("price_vendor", Some(1), None),
            ])
            .unwrap();

        assert_eq!(tickets.len(), 9);
        assert_eq!(tickets[0].ticket_type, "General Admission");
        assert_eq!(tickets[8].ticket_number, 9);
        assert_eq!(tickets[8].ticket_type, "Vendor Package - Admission");
        assert_eq!(tickets[8].background_color, TICKET_COLORS[0]);
    }

    #[test]
    fn test_oversized_order_is_rejected_before_planning() {
        let err = IssuancePolicy::default()
            .plan(&[item("price_ga", Some(u32::MAX), None)])
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = IssuancePolicy::default()
            .plan(&[
                item("price_ga", Some(MAX_TICKETS_PER_ORDER), None),
                item("price_ga", Some(1), None),
            ])
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let tickets = IssuancePolicy::default()
            .plan(&[item("price_ga", Some(MAX_TICKETS_PER_ORDER), None)])
            .unwrap();
        assert_eq!(tickets.len(), MAX_TICKETS_PER_ORDER as usize);
    }

    #[test]
    fn test_missing_quantity_issues_one() {
        let tickets = IssuancePolicy::default()
            .plan(&[item("price_ga", None, Some("  "))])
            .unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].ticket_type, "General Admission");
    }

    #[test]
    fn test_event_metadata_is_stamped() {
        let mut policy = IssuancePolicy::default();
        policy.event_name = Some("Fingerboard Con".to_string());
        policy.event_date = Some("2026-04-24".to_string());

        let tickets = policy.plan(&[item("price_ga", Some(1), None)]).unwrap();
        assert_eq!(tickets[0].event_name.as_deref(), Some("Fingerboard Con"));
        assert_eq!(tickets[0].event_date.as_deref(), Some("2026-04-24"));
    }
}
