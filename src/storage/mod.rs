//! Storage seams for the registration core.
//!
//! The ledger and the tournament catalog are separate components with
//! separate locks. Two backends implement both: an in-memory reference store
//! and a SQLite repository.

use std::future::Future;

use thiserror::Error;

use crate::domain::{
    Account, AccountId, Coins, LedgerEntry, Participant, ParticipantId, Tournament, TournamentId,
    TournamentStatus,
};

mod memory;
mod repository;

pub use memory::*;
pub use repository::*;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Tournament not found: {0}")]
    TournamentNotFound(TournamentId),

    #[error("Account {account_id} already joined tournament {tournament_id}")]
    AlreadyJoined {
        tournament_id: TournamentId,
        account_id: AccountId,
    },

    #[error("Tournament {tournament_id} is full ({capacity} participants)")]
    TournamentFull {
        tournament_id: TournamentId,
        capacity: u32,
    },

    #[error("Tournament {tournament_id} is {status} and not accepting registrations")]
    TournamentClosed {
        tournament_id: TournamentId,
        status: TournamentStatus,
    },

    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Coins,
        required: Coins,
    },

    #[error("Entry of {amount} would overflow balance {balance} of account {account_id}")]
    AmountOverflow {
        account_id: AccountId,
        balance: Coins,
        amount: Coins,
    },

    #[error("Invalid status transition for tournament {tournament_id}: {from} -> {to}")]
    InvalidTransition {
        tournament_id: TournamentId,
        from: TournamentStatus,
        to: TournamentStatus,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Balances and the append-only entry log. The only path by which a balance
/// changes is [`LedgerStore::apply_entry`].
pub trait LedgerStore: Send + Sync {
    /// Register a new account at its opening balance.
    fn open_account(&self, account: Account) -> impl Future<Output = StoreResult<Account>> + Send;

    fn get_account(&self, id: AccountId) -> impl Future<Output = StoreResult<Account>> + Send;

    fn get_account_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = StoreResult<Account>> + Send;

    fn list_accounts(&self) -> impl Future<Output = StoreResult<Vec<Account>>> + Send;

    fn balance(&self, id: AccountId) -> impl Future<Output = StoreResult<Coins>> + Send;

    /// Append a completed entry and move the balance by its amount, as one
    /// atomic step per account. Debits that would leave the balance negative
    /// fail with `InsufficientFunds` and append nothing.
    fn apply_entry(
        &self,
        entry: LedgerEntry,
    ) -> impl Future<Output = StoreResult<LedgerEntry>> + Send;

    /// Entries for an account, newest first.
    fn list_entries(
        &self,
        id: AccountId,
    ) -> impl Future<Output = StoreResult<Vec<LedgerEntry>>> + Send;
}

/// Tournament definitions and their rosters.
pub trait TournamentCatalog: Send + Sync {
    fn create_tournament(
        &self,
        tournament: Tournament,
    ) -> impl Future<Output = StoreResult<Tournament>> + Send;

    fn get_tournament(&self, id: TournamentId)
    -> impl Future<Output = StoreResult<Tournament>> + Send;

    /// All tournaments, ordered by start time.
    fn list_tournaments(&self) -> impl Future<Output = StoreResult<Vec<Tournament>>> + Send;

    /// Roster in join order.
    fn list_participants(
        &self,
        id: TournamentId,
    ) -> impl Future<Output = StoreResult<Vec<Participant>>> + Send;

    /// Every roster row an account holds, across tournaments.
    fn participations(
        &self,
        account_id: AccountId,
    ) -> impl Future<Output = StoreResult<Vec<Participant>>> + Send;

    /// Check capacity, uniqueness and open status, then insert, as a single
    /// atomic step per tournament.
    fn add_participant(
        &self,
        participant: Participant,
    ) -> impl Future<Output = StoreResult<Participant>> + Send;

    /// Remove a roster row. Returns `false` if it was already gone, so the
    /// call is safe to repeat.
    fn remove_participant(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Move a tournament forward in its lifecycle.
    fn update_status(
        &self,
        id: TournamentId,
        status: TournamentStatus,
    ) -> impl Future<Output = StoreResult<Tournament>> + Send;
}
