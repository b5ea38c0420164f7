//! PostgreSQL implementation of [`TicketStore`] and [`IdentityDirectory`].
//!
//! Guarded transitions rely on PostgreSQL's row locking under `READ
//! COMMITTED`: when two transactions update the same ticket, the second one
//! waits for the first to commit and then re-evaluates its `WHERE` clause
//! against the new row version, so at most one of them matches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{CancelledOrder, IdentityDirectory, IssuedOrder, TicketStore};
use crate::models::order::OrderRow;
use crate::models::ticket::TicketRow;
use crate::models::transfer::TRANSFER_COMPLETED;
use crate::models::{
    NewOrder, NewTicket, Order, PushToken, Ticket, TicketStats, TicketStatus, TicketTransfer,
    Transition, UserRole, UserSummary,
};
use crate::utils::AppError;

const TICKET_COLUMNS: &str = "id, order_id, ticket_type, ticket_number, qr_code_data, owner_id, \
     original_purchaser_id, status, validated_at, validated_by, background_color, event_name, \
     event_date, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, checkout_session_id, payment_intent_id, customer_id, user_id, \
     amount_subtotal, amount_total, currency, payment_status, status, created_at";

const TRANSFER_COLUMNS: &str =
    "id, ticket_id, from_user_id, to_user_id, transfer_status, transferred_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Text values of the statuses a transition may start from, for `= ANY($n)`.
fn guard(transition: Transition) -> Vec<String> {
    TicketStatus::sources(transition)
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

fn into_ticket(row: TicketRow) -> Result<Ticket, AppError> {
    Ticket::try_from(row).map_err(|e| AppError::InternalServerError(e.to_string()))
}

fn into_tickets(rows: Vec<TicketRow>) -> Result<Vec<Ticket>, AppError> {
    rows.into_iter().map(into_ticket).collect()
}

#[async_trait]
impl TicketStore for PgStore {
    async fn order_exists(&self, checkout_session_id: &str) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM orders WHERE checkout_session_id = $1)",
        )
        .bind(checkout_session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn record_order(
        &self,
        order: NewOrder,
        tickets: Vec<NewTicket>,
    ) -> Result<Option<IssuedOrder>, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (checkout_session_id, payment_intent_id, customer_id, user_id, \
             amount_subtotal, amount_total, currency, payment_status, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'completed') \
             ON CONFLICT DO NOTHING \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&order.checkout_session_id)
        .bind(&order.payment_intent_id)
        .bind(&order.customer_id)
        .bind(order.user_id)
        .bind(order.amount_subtotal)
        .bind(order.amount_total)
        .bind(&order.currency)
        .bind(&order.payment_status)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            debug!(checkout_session_id = %order.checkout_session_id, "Order already recorded");
            tx.rollback().await?;
            return Ok(None);
        };
        let recorded = Order::from(row);

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO tickets (order_id, ticket_type, ticket_number, qr_code_data, owner_id, \
             original_purchaser_id, status, background_color, event_name, event_date) ",
        );
        builder.push_values(tickets, |mut row, ticket| {
            row.push_bind(recorded.id)
                .push_bind(ticket.ticket_type)
                .push_bind(ticket.ticket_number)
                .push_bind(ticket.qr_code_data)
                .push_bind(recorded.user_id)
                .push_bind(recorded.user_id)
                .push_bind(TicketStatus::Active.as_str())
                .push_bind(ticket.background_color)
                .push_bind(ticket.event_name)
                .push_bind(ticket.event_date);
        });
        builder.push(" RETURNING ");
        builder.push(TICKET_COLUMNS);

        let rows = builder
            .build_query_as::<TicketRow>()
            .fetch_all(&mut *tx)
            .await?;
        let mut minted = into_tickets(rows)?;
        minted.sort_by_key(|t| t.ticket_number);

        tx.commit().await?;

        Ok(Some(IssuedOrder {
            order: recorded,
            tickets: minted,
        }))
    }

    async fn ticket(&self, ticket_id: i64) -> Result<Option<Ticket>, AppError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?
        .map(into_ticket)
        .transpose()
    }

    async fn ticket_by_code(&self, qr_code_data: Uuid) -> Result<Option<Ticket>, AppError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE qr_code_data = $1"
        ))
        .bind(qr_code_data)
        .fetch_optional(&self.pool)
        .await?
        .map(into_ticket)
        .transpose()
    }

    async fn tickets_for_order(&self, order_id: i64) -> Result<Vec<Ticket>, AppError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE order_id = $1 ORDER BY ticket_number"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        into_tickets(rows)
    }

    async fn tickets_owned_by(&self, owner_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE owner_id = $1 \
             ORDER BY created_at DESC, ticket_number"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        into_tickets(rows)
    }

    async fn transfers_for_ticket(&self, ticket_id: i64) -> Result<Vec<TicketTransfer>, AppError> {
        let transfers = sqlx::query_as::<_, TicketTransfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM ticket_transfers WHERE ticket_id = $1 \
             ORDER BY transferred_at, id"
        ))
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(transfers)
    }

    async fn transfer_ticket(
        &self,
        ticket_id: i64,
        from: Uuid,
        to: Uuid,
    ) -> Result<Option<(Ticket, TicketTransfer)>, AppError> {
        let mut tx = self.pool.begin().await?;

        let audit = sqlx::query_as::<_, TicketTransfer>(&format!(
            "INSERT INTO ticket_transfers (ticket_id, from_user_id, to_user_id, transfer_status) \
             VALUES ($1, $2, $3, $4) RETURNING {TRANSFER_COLUMNS}"
        ))
        .bind(ticket_id)
        .bind(from)
        .bind(to)
        .bind(TRANSFER_COMPLETED)
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets SET owner_id = $3, status = $4, updated_at = now() \
             WHERE id = $1 AND owner_id = $2 AND status = ANY($5) \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket_id)
        .bind(from)
        .bind(to)
        .bind(TicketStatus::Active.as_str())
        .bind(guard(Transition::Transfer))
        .fetch_optional(&mut *tx)
        .await?;

        match updated {
            Some(row) => {
                let ticket = into_ticket(row)?;
                tx.commit().await?;
                Ok(Some((ticket, audit)))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    async fn validate_ticket(
        &self,
        ticket_id: i64,
        validated_by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, AppError> {
        sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets SET status = $2, validated_at = $3, validated_by = $4, updated_at = $3 \
             WHERE id = $1 AND status = ANY($5) \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket_id)
        .bind(TicketStatus::Validated.as_str())
        .bind(at)
        .bind(validated_by)
        .bind(guard(Transition::Validate))
        .fetch_optional(&self.pool)
        .await?
        .map(into_ticket)
        .transpose()
    }

    async fn cancel_order(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CancelledOrder>, AppError> {
        let mut tx = self.pool.begin().await?;

        let order_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM orders WHERE payment_intent_id = $1 FOR UPDATE",
        )
        .bind(payment_intent_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_id) = order_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        let cancelled = sqlx::query(
            "UPDATE tickets SET status = $2, updated_at = now() \
             WHERE order_id = $1 AND status = ANY($3)",
        )
        .bind(order_id)
        .bind(TicketStatus::Cancelled.as_str())
        .bind(guard(Transition::Cancel))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("UPDATE orders SET status = 'canceled' WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(CancelledOrder {
            order_id,
            cancelled_tickets: cancelled,
        }))
    }

    async fn expire_tickets(&self, event_name: Option<&str>) -> Result<u64, AppError> {
        let expired = sqlx::query(
            "UPDATE tickets SET status = $1, updated_at = now() \
             WHERE status = ANY($2) AND ($3::text IS NULL OR event_name = $3)",
        )
        .bind(TicketStatus::Expired.as_str())
        .bind(guard(Transition::Expire))
        .bind(event_name)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(expired)
    }

    async fn ticket_stats(&self) -> Result<TicketStats, AppError> {
        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tickets GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = TicketStats::default();
        for (status, count) in counts {
            let status = status
                .parse::<TicketStatus>()
                .map_err(|e| AppError::InternalServerError(e.to_string()))?;
            stats.record(status, count);
        }
        Ok(stats)
    }

    async fn save_push_token(&self, token: PushToken) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO push_tokens (user_id, expo_push_token, device_id, updated_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (user_id, expo_push_token) \
             DO UPDATE SET device_id = EXCLUDED.device_id, updated_at = now()",
        )
        .bind(token.user_id)
        .bind(&token.expo_push_token)
        .bind(&token.device_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_push_token(
        &self,
        user_id: Uuid,
        expo_push_token: &str,
    ) -> Result<bool, AppError> {
        let removed = sqlx::query(
            "DELETE FROM push_tokens WHERE user_id = $1 AND expo_push_token = $2",
        )
        .bind(user_id)
        .bind(expo_push_token)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(removed > 0)
    }

    async fn push_tokens(&self, user_ids: Option<&[Uuid]>) -> Result<Vec<String>, AppError> {
        let tokens: Vec<String> = match user_ids {
            Some(ids) => {
                sqlx::query_scalar(
                    "SELECT DISTINCT expo_push_token FROM push_tokens WHERE user_id = ANY($1)",
                )
                .bind(ids.to_vec())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT DISTINCT expo_push_token FROM push_tokens")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(tokens)
    }
}

#[async_trait]
impl IdentityDirectory for PgStore {
    async fn user_for_customer(&self, customer_id: &str) -> Result<Option<Uuid>, AppError> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM stripe_customers WHERE customer_id = $1 AND deleted_at IS NULL",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id)
    }

    async fn find_users_by_email(
        &self,
        email: &str,
        exclude: Uuid,
    ) -> Result<Vec<UserSummary>, AppError> {
        let users = sqlx::query_as::<_, UserSummary>(
            "SELECT id, email FROM profiles WHERE lower(email) = lower($1) AND id <> $2 \
             ORDER BY email LIMIT 10",
        )
        .bind(email.trim())
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn user_email(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let email: Option<String> = sqlx::query_scalar("SELECT email FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(email)
    }

    async fn user_role(&self, user_id: Uuid) -> Result<UserRole, AppError> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role.as_deref().map(UserRole::parse).unwrap_or(UserRole::User))
    }
}
