mod common;

use anyhow::Result;
use common::{fee_rejecting_harness, memory_harness, sqlite_harness};
use tourney::application::AppError;
use tourney::domain::{EntryKind, TournamentStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_free_joins_never_exceed_capacity() -> Result<()> {
    let harness = memory_harness();
    let cup = harness.tournament("Open Qualifier", 0, 500).await?;

    let mut accounts = Vec::new();
    for i in 0..1000 {
        accounts.push(harness.account(&format!("player{i:04}"), 0).await?);
    }

    let mut handles = Vec::new();
    for account in &accounts {
        let service = harness.service.clone();
        let (tournament_id, account_id) = (cup.id, account.id);
        handles.push(tokio::spawn(async move {
            service.join(tournament_id, account_id, None).await
        }));
    }

    let mut joined = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => joined += 1,
            Err(AppError::TournamentFull { .. }) => full += 1,
            Err(other) => panic!("unexpected join error: {other}"),
        }
    }

    assert_eq!(joined, 500);
    assert_eq!(full, 500);

    let roster = harness.queries.tournament_roster(cup.id).await?;
    assert_eq!(roster.participants.len(), 500);
    assert_eq!(roster.open_slots, 0);
    assert!(harness.service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_paid_slot_goes_to_exactly_one_account() -> Result<()> {
    let harness = memory_harness();
    let final_slot = harness.tournament("Last Chance", 50, 1).await?;
    let alice = harness.account("alice", 50).await?;
    let bob = harness.account("bob", 50).await?;

    let (tournament_id, alice_id, bob_id) = (final_slot.id, alice.id, bob.id);

    let a = {
        let service = harness.service.clone();
        tokio::spawn(async move { service.join(tournament_id, alice_id, None).await })
    };
    let b = {
        let service = harness.service.clone();
        tokio::spawn(async move { service.join(tournament_id, bob_id, None).await })
    };
    let results = [a.await?, b.await?];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::TournamentFull { .. }))));

    let winner = winners[0].participant.account_id;
    let loser = if winner == alice.id { bob.id } else { alice.id };
    assert_eq!(harness.ledger_balance(winner).await?, 0);
    assert_eq!(harness.ledger_balance(loser).await?, 50);
    assert!(harness.queries.transaction_history(loser).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_leaves_no_trace() -> Result<()> {
    let harness = memory_harness();
    let cup = harness.tournament("Friday Cup", 50, 16).await?;
    let carol = harness.account("carol", 30).await?;

    let err = harness.service.join(cup.id, carol.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientFunds {
            balance: 30,
            required: 50,
            ..
        }
    ));

    assert!(harness.queries.tournament_roster(cup.id).await?.participants.is_empty());
    assert!(harness.queries.transaction_history(carol.id).await?.is_empty());
    assert_eq!(harness.ledger_balance(carol.id).await?, 30);

    Ok(())
}

#[tokio::test]
async fn test_failed_fee_debit_rolls_back_registration() -> Result<()> {
    let harness = fee_rejecting_harness();
    let cup = harness.tournament("Rollback Cup", 50, 4).await?;
    let free = harness.tournament("Free Cup", 0, 4).await?;
    let omar = harness.account("omar", 100).await?;

    // Balance covers the fee, so only the debit itself can fail
    let err = harness.service.join(cup.id, omar.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientFunds {
            balance: 100,
            required: 50,
            ..
        }
    ));

    let roster = harness.queries.tournament_roster(cup.id).await?;
    assert!(roster.participants.is_empty());
    assert_eq!(roster.open_slots, 4);
    assert!(harness.queries.transaction_history(omar.id).await?.is_empty());
    assert!(harness.queries.user_joined_tournaments(omar.id).await?.is_empty());
    assert_eq!(harness.ledger_balance(omar.id).await?, 100);
    assert!(harness.service.check_integrity().await?.is_healthy());

    // Free joins never debit and still go through
    let receipt = harness.service.join(free.id, omar.id, None).await?;
    assert!(receipt.entry.is_none());
    assert_eq!(receipt.balance, 100);

    Ok(())
}

#[tokio::test]
async fn test_free_join_reports_current_balance() -> Result<()> {
    let harness = memory_harness();
    let free = harness.tournament("Open Lobby", 0, 8).await?;
    let pia = harness.account("pia", 0).await?;

    harness.service.deposit(pia.id, 70).await?;
    let receipt = harness.service.join(free.id, pia.id, None).await?;
    assert!(receipt.entry.is_none());
    assert_eq!(receipt.balance, 70);
    assert_eq!(receipt.balance, harness.ledger_balance(pia.id).await?);

    Ok(())
}

#[tokio::test]
async fn test_double_join_is_rejected_and_charged_once() -> Result<()> {
    let harness = memory_harness();
    let cup = harness.tournament("Friday Cup", 50, 16).await?;
    let dave = harness.account("dave", 200).await?;

    let receipt = harness.service.join(cup.id, dave.id, Some("red".into())).await?;
    assert_eq!(receipt.balance, 150);
    assert_eq!(receipt.participant.team_id.as_deref(), Some("red"));

    let err = harness.service.join(cup.id, dave.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyJoined { .. }));

    let fees: Vec<_> = harness
        .queries
        .transaction_history(dave.id)
        .await?
        .into_iter()
        .filter(|e| e.kind == EntryKind::EntryFee)
        .collect();
    assert_eq!(fees.len(), 1);
    assert_eq!(harness.ledger_balance(dave.id).await?, 150);

    Ok(())
}

#[tokio::test]
async fn test_join_rejected_once_tournament_is_live() -> Result<()> {
    let harness = memory_harness();
    let cup = harness.tournament("Friday Cup", 50, 16).await?;
    let erin = harness.account("erin", 100).await?;

    harness
        .service
        .update_status(cup.id, TournamentStatus::Live)
        .await?;

    let err = harness.service.join(cup.id, erin.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::TournamentClosed {
            status: TournamentStatus::Live,
            ..
        }
    ));
    assert_eq!(harness.ledger_balance(erin.id).await?, 100);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_paid_joins_cannot_overdraw() -> Result<()> {
    let harness = memory_harness();
    let frank = harness.account("frank", 50).await?;
    let account_id = frank.id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let cup = harness.tournament(&format!("Cup {i}"), 50, 4).await?;
        let service = harness.service.clone();
        handles.push(tokio::spawn(async move {
            service.join(cup.id, account_id, None).await
        }));
    }

    let mut joined = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => joined += 1,
            Err(AppError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected join error: {other}"),
        }
    }

    assert_eq!(joined, 1);
    assert_eq!(harness.ledger_balance(frank.id).await?, 0);
    assert_eq!(
        harness.queries.user_joined_tournaments(frank.id).await?.len(),
        1
    );
    assert!(harness.service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test]
async fn test_join_unknown_tournament_or_account() -> Result<()> {
    let harness = memory_harness();
    let cup = harness.tournament("Friday Cup", 0, 4).await?;
    let gina = harness.account("gina", 0).await?;

    let err = harness
        .service
        .join(uuid::Uuid::new_v4(), gina.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TournamentNotFound(_)));

    let err = harness
        .service
        .join(cup.id, uuid::Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(_)));
    assert!(harness.queries.tournament_roster(cup.id).await?.participants.is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_concurrent_joins_respect_capacity() -> Result<()> {
    let (harness, _temp) = sqlite_harness().await?;
    let cup = harness.tournament("Weekend Brawl", 10, 5).await?;

    let mut accounts = Vec::new();
    for i in 0..20 {
        accounts.push(harness.account(&format!("player{i:02}"), 10).await?);
    }

    let mut handles = Vec::new();
    for account in &accounts {
        let service = harness.service.clone();
        let (tournament_id, account_id) = (cup.id, account.id);
        handles.push(tokio::spawn(async move {
            service.join(tournament_id, account_id, None).await
        }));
    }

    let mut joined = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => joined += 1,
            Err(AppError::TournamentFull { .. }) => {}
            Err(other) => panic!("unexpected join error: {other}"),
        }
    }

    assert_eq!(joined, 5);
    let roster = harness.queries.tournament_roster(cup.id).await?;
    assert_eq!(roster.participants.len(), 5);

    let charged: i64 = {
        let mut total = 0;
        for account in &accounts {
            total += 10 - harness.ledger_balance(account.id).await?;
        }
        total
    };
    assert_eq!(charged, 50);
    assert!(harness.service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test]
async fn test_sqlite_rejections_match_memory() -> Result<()> {
    let (harness, _temp) = sqlite_harness().await?;
    let cup = harness.tournament("Friday Cup", 50, 1).await?;
    let poor = harness.account("poor", 30).await?;
    let rich = harness.account("rich", 500).await?;
    let late = harness.account("late", 500).await?;

    assert!(matches!(
        harness.service.join(cup.id, poor.id, None).await,
        Err(AppError::InsufficientFunds { .. })
    ));

    harness.service.join(cup.id, rich.id, None).await?;
    assert!(matches!(
        harness.service.join(cup.id, rich.id, None).await,
        Err(AppError::AlreadyJoined { .. })
    ));
    assert!(matches!(
        harness.service.join(cup.id, late.id, None).await,
        Err(AppError::TournamentFull { .. })
    ));

    harness
        .service
        .update_status(cup.id, TournamentStatus::Live)
        .await?;
    assert!(matches!(
        harness.service.join(cup.id, late.id, None).await,
        Err(AppError::TournamentClosed { .. })
    ));

    assert_eq!(harness.ledger_balance(rich.id).await?, 450);
    assert_eq!(harness.ledger_balance(late.id).await?, 500);
    assert_eq!(harness.ledger_balance(poor.id).await?, 30);

    Ok(())
}
