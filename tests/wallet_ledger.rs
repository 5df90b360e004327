//! Wallet ledger against a live PostgreSQL database.

mod common;

use std::sync::Arc;

use bus_wallet_core::{
    db::DbPool,
    error::AppError,
    models::{
        booking::{CreateBookingRequest, PaymentChoice},
        notification::NotificationKind,
        wallet::{DepositRequest, SetPinRequest, TransactionType, TransferRequest},
    },
    services::{booking_service, ledger, notification_service::Notifier, wallet_service},
};
use common::*;
use uuid::Uuid;

fn transfer_to(serial: &str, amount_cents: i64, pin: &str) -> TransferRequest {
    TransferRequest {
        recipient_serial: serial.to_string(),
        amount_cents,
        pin: pin.to_string(),
    }
}

async fn ledger_matches_balance(pool: &DbPool, user_id: Uuid) {
    let wallet = ledger::wallet_for_user(pool, user_id)
        .await
        .unwrap()
        .expect("wallet should exist");
    assert_eq!(
        ledger::ledger_sum(pool, wallet.id).await.unwrap(),
        wallet.balance_cents
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_transfer_moves_money_and_notifies_recipient() {
    let pool = create_test_pool().await;
    let (recorder, notifier) = notifier();
    let sender = create_passenger_with_pin(&pool, "4821").await;
    let recipient = create_passenger(&pool).await;
    fund(&pool, sender.id, 10_000).await;

    // Serial lookup is case-insensitive
    let response = wallet_service::transfer(
        &pool,
        &notifier,
        sender.id,
        transfer_to(&recipient.serial.to_lowercase(), 3_000, "4821"),
    )
    .await
    .unwrap();

    assert_eq!(response.new_sender_balance_cents, 7_000);
    assert_eq!(balance(&pool, sender.id).await, 7_000);
    assert_eq!(balance(&pool, recipient.id).await, 3_000);
    ledger_matches_balance(&pool, sender.id).await;
    ledger_matches_balance(&pool, recipient.id).await;

    let history = wallet_service::list_transactions(&pool, recipient.id, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].transaction_type, TransactionType::TransferIn);
    assert_eq!(history[0].amount_cents, 3_000);

    settle().await;
    let sent = recorder.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event_type, NotificationKind::TransferReceived);
    assert_eq!(sent[0].user_id, recipient.id);
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_failed_transfers_change_nothing() {
    let pool = create_test_pool().await;
    let (recorder, notifier) = notifier();
    let sender = create_passenger_with_pin(&pool, "4821").await;
    let recipient = create_passenger(&pool).await;
    fund(&pool, sender.id, 5_000).await;

    let wrong_pin =
        wallet_service::transfer(&pool, &notifier, sender.id, transfer_to(&recipient.serial, 1_000, "0000"))
            .await;
    assert!(matches!(wrong_pin, Err(AppError::InvalidPin)));

    let too_much =
        wallet_service::transfer(&pool, &notifier, sender.id, transfer_to(&recipient.serial, 5_001, "4821"))
            .await;
    assert!(matches!(too_much, Err(AppError::InsufficientFunds)));

    let nobody =
        wallet_service::transfer(&pool, &notifier, sender.id, transfer_to("NO-SUCH-SERIAL", 1_000, "4821"))
            .await;
    assert!(matches!(nobody, Err(AppError::RecipientNotFound)));

    let to_self =
        wallet_service::transfer(&pool, &notifier, sender.id, transfer_to(&sender.serial, 1_000, "4821"))
            .await;
    assert!(matches!(to_self, Err(AppError::InvalidRequest(_))));

    let zero =
        wallet_service::transfer(&pool, &notifier, sender.id, transfer_to(&recipient.serial, 0, "4821"))
            .await;
    assert!(matches!(zero, Err(AppError::InvalidRequest(_))));

    assert_eq!(balance(&pool, sender.id).await, 5_000);
    assert_eq!(balance(&pool, recipient.id).await, 0);
    // The failed attempts must not leave a wallet row behind for the recipient
    assert!(
        ledger::wallet_for_user(&pool, recipient.id)
            .await
            .unwrap()
            .is_none()
    );
    ledger_matches_balance(&pool, sender.id).await;

    settle().await;
    assert!(recorder.sent().is_empty());
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_transfer_requires_a_pin() {
    let pool = create_test_pool().await;
    let (_, notifier) = notifier();
    let sender = create_passenger(&pool).await;
    let recipient = create_passenger(&pool).await;
    fund(&pool, sender.id, 5_000).await;

    let result =
        wallet_service::transfer(&pool, &notifier, sender.id, transfer_to(&recipient.serial, 1_000, "1234"))
            .await;

    assert!(matches!(result, Err(AppError::PinNotSet)));
    assert_eq!(balance(&pool, sender.id).await, 5_000);
}

/// Twenty concurrent 1 000 debits against a 10 000 balance: exactly ten succeed.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires PostgreSQL database"]
async fn test_concurrent_transfers_never_overdraw() {
    let pool = create_test_pool().await;
    let (_, notifier) = notifier();
    let sender = create_passenger_with_pin(&pool, "4821").await;
    let recipient = create_passenger(&pool).await;
    fund(&pool, sender.id, 10_000).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        let notifier = Arc::clone(&notifier);
        let request = transfer_to(&recipient.serial, 1_000, "4821");
        let sender_id = sender.id;
        handles.push(tokio::spawn(async move {
            wallet_service::transfer(&pool, &notifier, sender_id, request).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::InsufficientFunds) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }

    assert_eq!(successes, 10);
    assert_eq!(balance(&pool, sender.id).await, 0);
    assert_eq!(balance(&pool, recipient.id).await, 10_000);
    ledger_matches_balance(&pool, sender.id).await;
    ledger_matches_balance(&pool, recipient.id).await;
}

/// A pays B while B pays A, many times over. Ordered locking means no deadlock
/// aborts, and money is conserved.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires PostgreSQL database"]
async fn test_opposite_transfers_do_not_deadlock() {
    let pool = create_test_pool().await;
    let (_, notifier) = notifier();
    let alice = create_passenger_with_pin(&pool, "1111").await;
    let bob = create_passenger_with_pin(&pool, "2222").await;
    fund(&pool, alice.id, 50_000).await;
    fund(&pool, bob.id, 50_000).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let (from, to, pin) = if i % 2 == 0 {
            (alice.id, bob.serial.clone(), "1111")
        } else {
            (bob.id, alice.serial.clone(), "2222")
        };
        let pool = pool.clone();
        let notifier = Arc::clone(&notifier);
        handles.push(tokio::spawn(async move {
            wallet_service::transfer(&pool, &notifier, from, transfer_to(&to, 500, pin)).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().expect("transfer should succeed");
    }

    assert_eq!(balance(&pool, alice.id).await, 50_000);
    assert_eq!(balance(&pool, bob.id).await, 50_000);
    ledger_matches_balance(&pool, alice.id).await;
    ledger_matches_balance(&pool, bob.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_agent_deposit_credits_passenger_and_commission() {
    let pool = create_test_pool().await;
    let (recorder, notifier) = notifier();
    let agent = create_user(&pool, "agent", 250).await;
    let passenger = create_passenger(&pool).await;

    let response = wallet_service::deposit_for_passenger(
        &pool,
        &notifier,
        agent.id,
        DepositRequest {
            passenger_serial: passenger.serial.clone(),
            amount_cents: 100_000,
        },
    )
    .await
    .unwrap();

    assert_eq!(response.deposited_amount_cents, 100_000);
    assert_eq!(response.commission_cents, 2_500);
    assert_eq!(balance(&pool, passenger.id).await, 100_000);
    assert_eq!(balance(&pool, agent.id).await, 2_500);
    ledger_matches_balance(&pool, passenger.id).await;
    ledger_matches_balance(&pool, agent.id).await;

    let agent_history = wallet_service::list_transactions(&pool, agent.id, Some(10))
        .await
        .unwrap();
    assert_eq!(agent_history.len(), 1);
    assert_eq!(agent_history[0].transaction_type, TransactionType::Commission);

    settle().await;
    assert!(recorder.sent().iter().any(|n| {
        n.event_type == NotificationKind::DepositReceived && n.user_id == passenger.id
    }));
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_zero_rate_agent_gets_no_commission_row() {
    let pool = create_test_pool().await;
    let (_, notifier) = notifier();
    let agent = create_user(&pool, "agent", 0).await;
    let passenger = create_passenger(&pool).await;

    let response = wallet_service::deposit_for_passenger(
        &pool,
        &notifier,
        agent.id,
        DepositRequest {
            passenger_serial: passenger.serial.clone(),
            amount_cents: 10_000,
        },
    )
    .await
    .unwrap();

    assert_eq!(response.commission_cents, 0);
    assert_eq!(balance(&pool, passenger.id).await, 10_000);
    assert!(
        wallet_service::list_transactions(&pool, agent.id, None)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_only_agents_can_deposit() {
    let pool = create_test_pool().await;
    let (_, notifier) = notifier();
    let impostor = create_passenger(&pool).await;
    let passenger = create_passenger(&pool).await;

    let result = wallet_service::deposit_for_passenger(
        &pool,
        &notifier,
        impostor.id,
        DepositRequest {
            passenger_serial: passenger.serial.clone(),
            amount_cents: 10_000,
        },
    )
    .await;

    assert!(matches!(result, Err(AppError::Forbidden)));
    assert_eq!(balance(&pool, passenger.id).await, 0);
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_deposits_only_reach_passengers() {
    let pool = create_test_pool().await;
    let (_, notifier) = notifier();
    let agent = create_user(&pool, "agent", 250).await;
    let other_agent = create_user(&pool, "agent", 250).await;

    for serial in [&other_agent.serial, &agent.serial] {
        let result = wallet_service::deposit_for_passenger(
            &pool,
            &notifier,
            agent.id,
            DepositRequest {
                passenger_serial: serial.clone(),
                amount_cents: 40_000,
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::RecipientNotFound)));
    }

    // No deposit and no commission for either agent
    assert_eq!(balance(&pool, agent.id).await, 0);
    assert_eq!(balance(&pool, other_agent.id).await, 0);
    assert!(
        wallet_service::list_transactions(&pool, agent.id, None)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_notification_failure_does_not_undo_transfer() {
    let pool = create_test_pool().await;
    let notifier: Arc<dyn Notifier> = Arc::new(BrokenNotifier);
    let sender = create_passenger_with_pin(&pool, "4821").await;
    let recipient = create_passenger(&pool).await;
    fund(&pool, sender.id, 2_000).await;

    wallet_service::transfer(&pool, &notifier, sender.id, transfer_to(&recipient.serial, 2_000, "4821"))
        .await
        .unwrap();
    settle().await;

    assert_eq!(balance(&pool, sender.id).await, 0);
    assert_eq!(balance(&pool, recipient.id).await, 2_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires PostgreSQL database"]
async fn test_racing_first_pin_setups_keep_one_pin() {
    let pool = create_test_pool().await;
    let (_, notifier) = notifier();
    let user = create_passenger(&pool).await;
    let recipient = create_passenger(&pool).await;
    fund(&pool, user.id, 2_000).await;

    let mut handles = Vec::new();
    for pin in ["1111", "2222"] {
        let pool = pool.clone();
        let user_id = user.id;
        handles.push(tokio::spawn(async move {
            let result = wallet_service::set_pin(
                &pool,
                user_id,
                SetPinRequest {
                    new_pin: pin.to_string(),
                    current_pin: None,
                },
            )
            .await;
            (pin, result)
        }));
    }

    let mut winners = Vec::new();
    let mut losers = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            (pin, Ok(())) => winners.push(pin),
            // Lost at the update, or saw the winner's PIN already in place
            (pin, Err(AppError::InvalidPin | AppError::InvalidRequest(_))) => losers.push(pin),
            (_, Err(e)) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(losers.len(), 1);

    // The stored PIN is the one its caller was told was set
    let rejected = wallet_service::transfer(
        &pool,
        &notifier,
        user.id,
        transfer_to(&recipient.serial, 1_000, losers[0]),
    )
    .await;
    assert!(matches!(rejected, Err(AppError::InvalidPin)));
    wallet_service::transfer(
        &pool,
        &notifier,
        user.id,
        transfer_to(&recipient.serial, 1_000, winners[0]),
    )
    .await
    .unwrap();
    assert_eq!(balance(&pool, recipient.id).await, 1_000);
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_changing_pin_requires_current_pin() {
    let pool = create_test_pool().await;
    let user = create_passenger_with_pin(&pool, "4821").await;

    let missing = wallet_service::set_pin(
        &pool,
        user.id,
        SetPinRequest {
            new_pin: "1357".to_string(),
            current_pin: None,
        },
    )
    .await;
    assert!(matches!(missing, Err(AppError::InvalidRequest(_))));

    let wrong = wallet_service::set_pin(
        &pool,
        user.id,
        SetPinRequest {
            new_pin: "1357".to_string(),
            current_pin: Some("0000".to_string()),
        },
    )
    .await;
    assert!(matches!(wrong, Err(AppError::InvalidPin)));

    wallet_service::set_pin(
        &pool,
        user.id,
        SetPinRequest {
            new_pin: "1357".to_string(),
            current_pin: Some("4821".to_string()),
        },
    )
    .await
    .unwrap();

    // The new PIN authorises transfers, the old one no longer does
    let (_, notifier) = notifier();
    let recipient = create_passenger(&pool).await;
    fund(&pool, user.id, 1_000).await;
    let old = wallet_service::transfer(&pool, &notifier, user.id, transfer_to(&recipient.serial, 100, "4821"))
        .await;
    assert!(matches!(old, Err(AppError::InvalidPin)));
    wallet_service::transfer(&pool, &notifier, user.id, transfer_to(&recipient.serial, 100, "1357"))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL database"]
async fn test_ledger_sum_tracks_mixed_operations() {
    let pool = create_test_pool().await;
    let (_, notifier) = notifier();
    let agent = create_user(&pool, "agent", 100).await;
    let passenger = create_passenger_with_pin(&pool, "9999").await;
    let friend = create_passenger(&pool).await;
    let trip = create_trip(&pool, 2_500, &["3A", "3B"]).await;

    fund(&pool, passenger.id, 1_000).await;
    wallet_service::deposit_for_passenger(
        &pool,
        &notifier,
        agent.id,
        DepositRequest {
            passenger_serial: passenger.serial.clone(),
            amount_cents: 9_000,
        },
    )
    .await
    .unwrap();
    wallet_service::transfer(&pool, &notifier, passenger.id, transfer_to(&friend.serial, 1_500, "9999"))
        .await
        .unwrap();
    let booking = booking_service::create_booking(
        &pool,
        &notifier,
        passenger.id,
        CreateBookingRequest {
            trip_id: trip,
            seat_ids: vec!["3A".to_string()],
            payment: PaymentChoice::Wallet,
            total_price_cents: 2_500,
        },
    )
    .await
    .unwrap();
    booking_service::cancel_booking(
        &pool,
        &notifier,
        passenger.id,
        booking.id,
    )
    .await
    .unwrap();

    // 1 000 + 9 000 - 1 500 - 2 500 + 2 500
    assert_eq!(balance(&pool, passenger.id).await, 8_500);
    ledger_matches_balance(&pool, passenger.id).await;
    ledger_matches_balance(&pool, friend.id).await;
    ledger_matches_balance(&pool, agent.id).await;
    assert_eq!(balance(&pool, agent.id).await, 90);
}
