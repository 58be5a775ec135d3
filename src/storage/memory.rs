use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::domain::{
    Account, AccountId, Coins, EntryStatus, LedgerEntry, Participant, ParticipantId, Tournament,
    TournamentId, TournamentStatus,
};

use super::{LedgerStore, StoreError, StoreResult, TournamentCatalog};

/// One account's balance and entry log, guarded together so that the
/// balance check, the append and the adjustment happen as one step.
struct AccountBook {
    account: Account,
    entries: Vec<LedgerEntry>,
}

#[derive(Default)]
struct AccountIndex {
    books: HashMap<AccountId, Arc<Mutex<AccountBook>>>,
    usernames: HashMap<String, AccountId>,
}

/// In-memory ledger with a lock per account.
///
/// The index lock is held only long enough to look up an account's book;
/// debits on different accounts never contend.
#[derive(Default)]
pub struct MemoryLedger {
    index: RwLock<AccountIndex>,
    sequence: AtomicI64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, id: AccountId) -> StoreResult<Arc<Mutex<AccountBook>>> {
        self.index
            .read()
            .books
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))
    }
}

impl LedgerStore for MemoryLedger {
    async fn open_account(&self, account: Account) -> StoreResult<Account> {
        let mut index = self.index.write();
        if index.usernames.contains_key(&account.username) {
            return Err(StoreError::AccountExists(account.username));
        }

        index.usernames.insert(account.username.clone(), account.id);
        index.books.insert(
            account.id,
            Arc::new(Mutex::new(AccountBook {
                account: account.clone(),
                entries: Vec::new(),
            })),
        );
        Ok(account)
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Account> {
        Ok(self.book(id)?.lock().account.clone())
    }

    async fn get_account_by_username(&self, username: &str) -> StoreResult<Account> {
        let id = self
            .index
            .read()
            .usernames
            .get(username)
            .copied()
            .ok_or_else(|| StoreError::AccountNotFound(username.to_string()))?;
        self.get_account(id).await
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let books: Vec<_> = self.index.read().books.values().cloned().collect();
        let mut accounts: Vec<Account> = books.iter().map(|b| b.lock().account.clone()).collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(accounts)
    }

    async fn balance(&self, id: AccountId) -> StoreResult<Coins> {
        Ok(self.book(id)?.lock().account.balance)
    }

    async fn apply_entry(&self, mut entry: LedgerEntry) -> StoreResult<LedgerEntry> {
        let book = self.book(entry.account_id)?;
        let mut book = book.lock();

        let balance_after = book
            .account
            .balance
            .checked_add(entry.amount)
            .ok_or(StoreError::AmountOverflow {
                account_id: entry.account_id,
                balance: book.account.balance,
                amount: entry.amount,
            })?;
        if entry.is_debit() && balance_after < 0 {
            return Err(StoreError::InsufficientFunds {
                account_id: entry.account_id,
                balance: book.account.balance,
                required: -entry.amount,
            });
        }

        // Assigned under the account lock so per-account order matches sequence order
        entry.sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        entry.status = EntryStatus::Completed;
        entry.balance_after = balance_after;

        book.account.balance = balance_after;
        book.entries.push(entry.clone());
        Ok(entry)
    }

    async fn list_entries(&self, id: AccountId) -> StoreResult<Vec<LedgerEntry>> {
        let book = self.book(id)?;
        let mut entries = book.lock().entries.clone();
        entries.reverse();
        Ok(entries)
    }
}

/// One tournament's definition and roster, guarded together so that the
/// capacity check and the insert happen as one step.
struct TournamentSlot {
    tournament: Tournament,
    participants: Vec<Participant>,
}

/// In-memory tournament catalog with a lock per tournament.
#[derive(Default)]
pub struct MemoryCatalog {
    slots: RwLock<HashMap<TournamentId, Arc<Mutex<TournamentSlot>>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: TournamentId) -> StoreResult<Arc<Mutex<TournamentSlot>>> {
        self.slots
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::TournamentNotFound(id))
    }

    fn all_slots(&self) -> Vec<Arc<Mutex<TournamentSlot>>> {
        self.slots.read().values().cloned().collect()
    }
}

impl TournamentCatalog for MemoryCatalog {
    async fn create_tournament(&self, tournament: Tournament) -> StoreResult<Tournament> {
        self.slots.write().insert(
            tournament.id,
            Arc::new(Mutex::new(TournamentSlot {
                tournament: tournament.clone(),
                participants: Vec::new(),
            })),
        );
        Ok(tournament)
    }

    async fn get_tournament(&self, id: TournamentId) -> StoreResult<Tournament> {
        Ok(self.slot(id)?.lock().tournament.clone())
    }

    async fn list_tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let mut tournaments: Vec<Tournament> = self
            .all_slots()
            .iter()
            .map(|slot| slot.lock().tournament.clone())
            .collect();
        tournaments.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.title.cmp(&b.title)));
        Ok(tournaments)
    }

    async fn list_participants(&self, id: TournamentId) -> StoreResult<Vec<Participant>> {
        Ok(self.slot(id)?.lock().participants.clone())
    }

    async fn participations(&self, account_id: AccountId) -> StoreResult<Vec<Participant>> {
        let mut rows: Vec<Participant> = self
            .all_slots()
            .iter()
            .filter_map(|slot| {
                slot.lock()
                    .participants
                    .iter()
                    .find(|p| p.account_id == account_id)
                    .cloned()
            })
            .collect();
        rows.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        Ok(rows)
    }

    async fn add_participant(&self, participant: Participant) -> StoreResult<Participant> {
        let slot = self.slot(participant.tournament_id)?;
        let mut slot = slot.lock();
        let tournament = &slot.tournament;

        if !tournament.is_open() {
            return Err(StoreError::TournamentClosed {
                tournament_id: tournament.id,
                status: tournament.status,
            });
        }
        if slot
            .participants
            .iter()
            .any(|p| p.account_id == participant.account_id)
        {
            return Err(StoreError::AlreadyJoined {
                tournament_id: tournament.id,
                account_id: participant.account_id,
            });
        }
        if slot.participants.len() >= tournament.capacity as usize {
            return Err(StoreError::TournamentFull {
                tournament_id: tournament.id,
                capacity: tournament.capacity,
            });
        }

        slot.participants.push(participant.clone());
        Ok(participant)
    }

    async fn remove_participant(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> StoreResult<bool> {
        let slot = self.slot(tournament_id)?;
        let mut slot = slot.lock();
        let before = slot.participants.len();
        slot.participants.retain(|p| p.id != participant_id);
        Ok(slot.participants.len() != before)
    }

    async fn update_status(
        &self,
        id: TournamentId,
        status: TournamentStatus,
    ) -> StoreResult<Tournament> {
        let slot = self.slot(id)?;
        let mut slot = slot.lock();

        let current = slot.tournament.status;
        if !current.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                tournament_id: id,
                from: current,
                to: status,
            });
        }

        slot.tournament.status = status;
        Ok(slot.tournament.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::EntryKind;

    #[tokio::test]
    async fn test_apply_entry_assigns_sequence_and_running_balance() {
        let ledger = MemoryLedger::new();
        let alice = ledger.open_account(Account::new("alice", 100)).await.unwrap();

        let first = ledger
            .apply_entry(LedgerEntry::new(alice.id, 50, EntryKind::Deposit, "top-up"))
            .await
            .unwrap();
        let second = ledger
            .apply_entry(LedgerEntry::new(alice.id, -30, EntryKind::Withdrawal, "cash out"))
            .await
            .unwrap();

        assert!(second.sequence > first.sequence);
        assert_eq!(first.balance_after, 150);
        assert_eq!(second.balance_after, 120);
        assert_eq!(second.status, EntryStatus::Completed);
        assert_eq!(ledger.balance(alice.id).await.unwrap(), 120);

        let entries = ledger.list_entries(alice.id).await.unwrap();
        assert_eq!(entries[0].id, second.id, "newest entry comes first");
    }

    #[tokio::test]
    async fn test_overdraft_appends_nothing() {
        let ledger = MemoryLedger::new();
        let bob = ledger.open_account(Account::new("bob", 30)).await.unwrap();

        let result = ledger
            .apply_entry(LedgerEntry::new(bob.id, -50, EntryKind::EntryFee, "Cup"))
            .await;

        assert!(matches!(
            result,
            Err(StoreError::InsufficientFunds {
                balance: 30,
                required: 50,
                ..
            })
        ));
        assert_eq!(ledger.balance(bob.id).await.unwrap(), 30);
        assert!(ledger.list_entries(bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credit_overflow_appends_nothing() {
        let ledger = MemoryLedger::new();
        let whale = ledger.open_account(Account::new("whale", 1)).await.unwrap();

        let result = ledger
            .apply_entry(LedgerEntry::new(whale.id, i64::MAX, EntryKind::Deposit, "top-up"))
            .await;

        assert!(matches!(result, Err(StoreError::AmountOverflow { balance: 1, .. })));
        assert_eq!(ledger.balance(whale.id).await.unwrap(), 1);
        assert!(ledger.list_entries(whale.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let ledger = MemoryLedger::new();
        ledger.open_account(Account::new("alice", 0)).await.unwrap();
        let result = ledger.open_account(Account::new("alice", 10)).await;
        assert!(matches!(result, Err(StoreError::AccountExists(_))));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let ledger = MemoryLedger::new();
        let result = ledger.balance(uuid::Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_add_participant_gates() {
        let catalog = MemoryCatalog::new();
        let cup = catalog
            .create_tournament(Tournament::new("Cup", "Tekken", 0, 1, Utc::now()))
            .await
            .unwrap();
        let alice = uuid::Uuid::new_v4();
        let bob = uuid::Uuid::new_v4();

        catalog
            .add_participant(Participant::new(cup.id, alice))
            .await
            .unwrap();

        let again = catalog.add_participant(Participant::new(cup.id, alice)).await;
        assert!(matches!(again, Err(StoreError::AlreadyJoined { .. })));

        let full = catalog.add_participant(Participant::new(cup.id, bob)).await;
        assert!(matches!(full, Err(StoreError::TournamentFull { capacity: 1, .. })));
    }

    #[tokio::test]
    async fn test_remove_participant_is_idempotent() {
        let catalog = MemoryCatalog::new();
        let cup = catalog
            .create_tournament(Tournament::new("Cup", "Tekken", 0, 4, Utc::now()))
            .await
            .unwrap();
        let row = catalog
            .add_participant(Participant::new(cup.id, uuid::Uuid::new_v4()))
            .await
            .unwrap();

        assert!(catalog.remove_participant(cup.id, row.id).await.unwrap());
        assert!(!catalog.remove_participant(cup.id, row.id).await.unwrap());
        assert!(catalog.list_participants(cup.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_tournament_rejects_roster_insert() {
        let catalog = MemoryCatalog::new();
        let cup = catalog
            .create_tournament(Tournament::new("Cup", "Tekken", 0, 4, Utc::now()))
            .await
            .unwrap();
        catalog
            .update_status(cup.id, TournamentStatus::Live)
            .await
            .unwrap();

        let result = catalog
            .add_participant(Participant::new(cup.id, uuid::Uuid::new_v4()))
            .await;
        assert!(matches!(result, Err(StoreError::TournamentClosed { .. })));

        let reopen = catalog
            .update_status(cup.id, TournamentStatus::Upcoming)
            .await;
        assert!(matches!(reopen, Err(StoreError::InvalidTransition { .. })));
    }
}
