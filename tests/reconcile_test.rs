mod common;

use anyhow::Result;
use common::{memory_harness, sqlite_harness, Harness};
use tourney::domain::{EntryKind, IntegrityIssue, LedgerEntry, Participant};
use tourney::storage::{LedgerStore, TournamentCatalog};

/// Leaves one unpaid registration the account can afford, one it cannot,
/// and one fee with no registration behind it.
async fn seed_crash_leftovers<L, C>(
    harness: &Harness<L, C>,
) -> Result<(uuid::Uuid, uuid::Uuid, uuid::Uuid, uuid::Uuid)>
where
    L: LedgerStore,
    C: TournamentCatalog,
{
    let cup = harness.tournament("Crash Cup", 40, 8).await?;
    let paid_later = harness.account("solvent", 100).await?;
    let broke = harness.account("broke", 10).await?;
    let orphan = harness.account("orphan", 100).await?;

    harness
        .catalog
        .add_participant(Participant::new(cup.id, paid_later.id))
        .await?;
    harness
        .catalog
        .add_participant(Participant::new(cup.id, broke.id))
        .await?;
    harness
        .ledger
        .apply_entry(
            LedgerEntry::new(orphan.id, -40, EntryKind::EntryFee, "Crash Cup")
                .with_tournament(cup.id),
        )
        .await?;

    Ok((cup.id, paid_later.id, broke.id, orphan.id))
}

#[tokio::test]
async fn test_check_reports_registration_mismatches() -> Result<()> {
    let harness = memory_harness();
    let (cup, paid_later, broke, orphan) = seed_crash_leftovers(&harness).await?;

    let report = harness.service.check_integrity().await?;
    assert!(!report.is_healthy());
    assert_eq!(report.accounts_checked, 3);
    assert_eq!(report.tournaments_checked, 1);
    assert!(report.issues.contains(&IntegrityIssue::UnpaidRegistration {
        tournament_id: cup,
        account_id: paid_later,
    }));
    assert!(report.issues.contains(&IntegrityIssue::UnpaidRegistration {
        tournament_id: cup,
        account_id: broke,
    }));
    assert!(report.issues.contains(&IntegrityIssue::UnbackedFee {
        tournament_id: cup,
        account_id: orphan,
        paid: 1,
    }));

    Ok(())
}

#[tokio::test]
async fn test_reconcile_heals_memory_store() -> Result<()> {
    let harness = memory_harness();
    let (cup, paid_later, broke, orphan) = seed_crash_leftovers(&harness).await?;

    let report = harness.service.reconcile().await?;
    assert_eq!(report.charged.len(), 1);
    assert_eq!(report.charged[0].account_id, paid_later);
    assert_eq!(report.removed.len(), 1);
    assert_eq!(report.removed[0].account_id, broke);
    assert_eq!(report.refunded.len(), 1);
    assert_eq!(report.refunded[0].account_id, orphan);

    assert_eq!(harness.ledger_balance(paid_later).await?, 60);
    assert_eq!(harness.ledger_balance(broke).await?, 10);
    assert_eq!(harness.ledger_balance(orphan).await?, 100);

    let roster = harness.queries.tournament_roster(cup).await?;
    assert_eq!(roster.participants.len(), 1);
    assert_eq!(roster.participants[0].account_id, paid_later);

    assert!(harness.service.check_integrity().await?.is_healthy());
    assert!(harness.service.reconcile().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_reconcile_heals_sqlite_store() -> Result<()> {
    let (harness, _temp) = sqlite_harness().await?;
    let (cup, paid_later, broke, orphan) = seed_crash_leftovers(&harness).await?;

    let report = harness.service.reconcile().await?;
    assert_eq!(report.charged.len(), 1);
    assert_eq!(report.removed.len(), 1);
    assert_eq!(report.refunded.len(), 1);

    assert_eq!(harness.ledger_balance(paid_later).await?, 60);
    assert_eq!(harness.ledger_balance(broke).await?, 10);
    assert_eq!(harness.ledger_balance(orphan).await?, 100);
    assert_eq!(
        harness.queries.tournament_roster(cup).await?.participants.len(),
        1
    );
    assert!(harness.service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test]
async fn test_clean_state_needs_no_reconciliation() -> Result<()> {
    let harness = memory_harness();
    let cup = harness.tournament("Clean Cup", 25, 4).await?;
    let mia = harness.account("mia", 100).await?;
    let ned = harness.account("ned", 100).await?;

    harness.service.join(cup.id, mia.id, None).await?;
    harness.service.join(cup.id, ned.id, None).await?;
    harness.service.leave(cup.id, ned.id).await?;
    harness.service.join(cup.id, ned.id, None).await?;

    let report = harness.service.check_integrity().await?;
    assert!(report.is_healthy(), "{:?}", report.issues);
    assert_eq!(report.entries_checked, 4);
    assert!(harness.service.reconcile().await?.is_empty());

    Ok(())
}
