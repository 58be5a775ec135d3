// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tourney::application::{NewTournament, QueryFacade, RegistrationService};
use tourney::domain::{Account, AccountId, Coins, EntryKind, LedgerEntry, Tournament};
use tourney::storage::{
    LedgerStore, MemoryCatalog, MemoryLedger, Repository, StoreError, StoreResult,
    TournamentCatalog,
};

pub type MemoryRegistration = RegistrationService<MemoryLedger, MemoryCatalog>;
pub type SqliteRegistration = RegistrationService<Repository, Repository>;

/// Registration and query services sharing one pair of stores
pub struct Harness<L, C> {
    pub service: Arc<RegistrationService<L, C>>,
    pub queries: QueryFacade<L, C>,
    pub ledger: Arc<L>,
    pub catalog: Arc<C>,
}

impl<L, C> Harness<L, C>
where
    L: LedgerStore,
    C: TournamentCatalog,
{
    pub fn over(ledger: Arc<L>, catalog: Arc<C>) -> Self {
        Self {
            service: Arc::new(RegistrationService::new(ledger.clone(), catalog.clone())),
            queries: QueryFacade::new(ledger.clone(), catalog.clone()),
            ledger,
            catalog,
        }
    }

    pub async fn account(&self, username: &str, balance: Coins) -> Result<Account> {
        Ok(self.service.open_account(username, balance).await?)
    }

    pub async fn ledger_balance(&self, account_id: AccountId) -> Result<Coins> {
        Ok(self.ledger.balance(account_id).await?)
    }

    pub async fn tournament(&self, title: &str, fee: Coins, capacity: u32) -> Result<Tournament> {
        Ok(self
            .service
            .create_tournament(new_tournament(title, fee, capacity))
            .await?)
    }
}

/// Helper to create a harness over the in-memory stores
pub fn memory_harness() -> Harness<MemoryLedger, MemoryCatalog> {
    Harness::over(Arc::new(MemoryLedger::new()), Arc::new(MemoryCatalog::new()))
}

/// Helper to create a harness with a temporary database
pub async fn sqlite_harness() -> Result<(Harness<Repository, Repository>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let repo = Repository::init(&format!("sqlite:{}?mode=rwc", db_path.display())).await?;
    let repo = Arc::new(repo);
    Ok((Harness::over(repo.clone(), repo), temp_dir))
}

/// Ledger that refuses every entry fee debit, whatever the balance.
/// Everything else goes through to the wrapped store.
pub struct FeeRejectingLedger<L> {
    inner: L,
}

impl<L: LedgerStore> FeeRejectingLedger<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

impl<L: LedgerStore> LedgerStore for FeeRejectingLedger<L> {
    async fn open_account(&self, account: Account) -> StoreResult<Account> {
        self.inner.open_account(account).await
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Account> {
        self.inner.get_account(id).await
    }

    async fn get_account_by_username(&self, username: &str) -> StoreResult<Account> {
        self.inner.get_account_by_username(username).await
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        self.inner.list_accounts().await
    }

    async fn balance(&self, id: AccountId) -> StoreResult<Coins> {
        self.inner.balance(id).await
    }

    async fn apply_entry(&self, entry: LedgerEntry) -> StoreResult<LedgerEntry> {
        if entry.kind == EntryKind::EntryFee {
            return Err(StoreError::InsufficientFunds {
                account_id: entry.account_id,
                balance: self.inner.balance(entry.account_id).await?,
                required: -entry.amount,
            });
        }
        self.inner.apply_entry(entry).await
    }

    async fn list_entries(&self, id: AccountId) -> StoreResult<Vec<LedgerEntry>> {
        self.inner.list_entries(id).await
    }
}

/// Memory harness whose ledger fails every fee debit after the roster
/// insert has already gone through
pub fn fee_rejecting_harness() -> Harness<FeeRejectingLedger<MemoryLedger>, MemoryCatalog> {
    Harness::over(
        Arc::new(FeeRejectingLedger::new(MemoryLedger::new())),
        Arc::new(MemoryCatalog::new()),
    )
}

/// Tournament input starting a week from now
pub fn new_tournament(title: &str, fee: Coins, capacity: u32) -> NewTournament {
    NewTournament {
        title: title.to_string(),
        game: "Valorant".to_string(),
        description: None,
        entry_fee: fee,
        capacity,
        prize_pool: 0,
        start_time: Utc::now() + Duration::days(7),
    }
}
