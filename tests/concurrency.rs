mod common;

use common::{line_item, paid_session, Harness};
use fbcon_server::models::{Ticket, TicketStatus, UserRole};
use fbcon_server::services::{self, issue_tickets, IssuanceOutcome, ScanOutcome};
use fbcon_server::store::TicketStore;
use fbcon_server::utils::{AppError, Rejection};

const CONTENDERS: usize = 8;

async fn one_ticket(h: &Harness, session_id: &str, customer_id: &str) -> Ticket {
    let session = paid_session(session_id, customer_id, vec![line_item("price_ga", 1, "GA")]);
    let outcome = issue_tickets(&h.store, &h.store, h.gateway.as_ref(), &h.policy, &session)
        .await
        .unwrap();
    let IssuanceOutcome::Issued { order_id, .. } = outcome else {
        panic!("expected issuance");
    };
    h.store.tickets_for_order(order_id).await.unwrap().remove(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_have_one_winner() {
    let h = Harness::new();
    let buyer = h.customer("buyer@example.com", "cus_a");
    let ticket = one_ticket(&h, "cs_race_transfer", "cus_a").await;

    let mut handles = Vec::new();
    for i in 0..CONTENDERS {
        let recipient = h.user(&format!("friend{i}@example.com"), UserRole::User);
        let store = h.store.clone();
        let (from, ticket_id) = (buyer.id, ticket.id);
        handles.push(tokio::spawn(async move {
            services::commit_transfer(&store, &store, from, ticket_id, recipient.id).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok((ticket, _)) => winners.push(ticket.owner_id),
            Err(AppError::Rejected(Rejection::TicketNoLongerActive))
            | Err(AppError::Rejected(Rejection::NotTicketOwner)) => {}
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }

    assert_eq!(winners.len(), 1);
    let current = h.store.ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(current.owner_id, winners[0]);
    assert_eq!(current.status, TicketStatus::Active);
    assert_eq!(h.store.transfers_for_ticket(ticket.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_transfer_loser_reason_depends_on_when_it_read() {
    let h = Harness::new();
    let buyer = h.customer("buyer@example.com", "cus_a");
    let winner = h.user("winner@example.com", UserRole::User);
    let loser = h.user("loser@example.com", UserRole::User);
    let ticket = one_ticket(&h, "cs_stale_read", "cus_a").await;

    services::commit_transfer(&h.store, &h.store, buyer.id, ticket.id, winner.id)
        .await
        .unwrap();

    // read before the winner committed: only the guarded update is left, and it refuses
    let stale = h.store.transfer_ticket(ticket.id, buyer.id, loser.id).await.unwrap();
    assert!(stale.is_none());

    // read after the winner committed: the ownership check answers first
    let err = services::commit_transfer(&h.store, &h.store, buyer.id, ticket.id, loser.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Rejected(Rejection::NotTicketOwner)));

    assert_eq!(h.store.transfers_for_ticket(ticket.id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scans_have_one_winner() {
    let h = Harness::new();
    h.customer("buyer@example.com", "cus_a");
    let ticket = one_ticket(&h, "cs_race_scan", "cus_a").await;
    let code = ticket.qr_code_data.to_string();

    let mut handles = Vec::new();
    for i in 0..CONTENDERS {
        let staff = h.user(&format!("door{i}@example.com"), UserRole::Staff);
        let store = h.store.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            services::validate_ticket(&store, &store, staff.id, &code).await
        }));
    }

    let mut admitted = 0;
    let mut refused_at = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ScanOutcome::Admitted { .. } => admitted += 1,
            ScanOutcome::Refused { rejection, .. } => match rejection {
                Rejection::AlreadyValidated(at) => refused_at.push(at),
                other => panic!("unexpected refusal: {other:?}"),
            },
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(refused_at.len(), CONTENDERS - 1);

    let current = h.store.ticket(ticket.id).await.unwrap().unwrap();
    let validated_at = current.validated_at.unwrap();
    assert!(refused_at.iter().all(|at| *at == validated_at));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refund_racing_scan_never_unvalidates() {
    let h = Harness::new();
    h.customer("buyer@example.com", "cus_a");
    let staff = h.user("door@example.com", UserRole::Staff);
    let ticket = one_ticket(&h, "cs_race_refund", "cus_a").await;

    let scan = {
        let store = h.store.clone();
        let code = ticket.qr_code_data.to_string();
        tokio::spawn(async move { services::validate_ticket(&store, &store, staff.id, &code).await })
    };
    let refund = {
        let store = h.store.clone();
        tokio::spawn(async move {
            services::reconcile_payment_intent(&store, "pi_cs_race_refund").await
        })
    };

    let scan = scan.await.unwrap().unwrap();
    refund.await.unwrap().unwrap();

    let current = h.store.ticket(ticket.id).await.unwrap().unwrap();
    match scan {
        ScanOutcome::Admitted { .. } => assert_eq!(current.status, TicketStatus::Validated),
        ScanOutcome::Refused { rejection, .. } => {
            assert_eq!(rejection, Rejection::TicketCancelled);
            assert_eq!(current.status, TicketStatus::Cancelled);
        }
    }
}
