use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Coins, TournamentId};

pub type EntryId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    EntryFee,
    Deposit,
    Withdrawal,
    Prize,
    Refund,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::EntryFee => "entry_fee",
            EntryKind::Deposit => "deposit",
            EntryKind::Withdrawal => "withdrawal",
            EntryKind::Prize => "prize",
            EntryKind::Refund => "refund",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "entry_fee" => Some(EntryKind::EntryFee),
            "deposit" => Some(EntryKind::Deposit),
            "withdrawal" => Some(EntryKind::Withdrawal),
            "prize" => Some(EntryKind::Prize),
            "refund" => Some(EntryKind::Refund),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(EntryStatus::Pending),
            "completed" => Some(EntryStatus::Completed),
            "failed" => Some(EntryStatus::Failed),
            _ => None,
        }
    }
}

/// An immutable record of a single balance change.
/// Entries are appended by the ledger store and never edited afterwards;
/// corrections are new entries (refunds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Monotonically increasing sequence number for ordering
    pub sequence: i64,
    pub account_id: AccountId,
    /// Signed amount: negative for debits
    pub amount: Coins,
    pub kind: EntryKind,
    pub status: EntryStatus,
    /// Free-text reference, e.g. the tournament title
    pub reference: String,
    /// Tournament this entry settles, if any
    pub tournament_id: Option<TournamentId>,
    /// Account balance right after this entry was applied
    pub balance_after: Coins,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a pending entry. Sequence, status and running balance are
    /// assigned by the store when it is applied.
    pub fn new(
        account_id: AccountId,
        amount: Coins,
        kind: EntryKind,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            account_id,
            amount,
            kind,
            status: EntryStatus::Pending,
            reference: reference.into(),
            tournament_id: None,
            balance_after: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_tournament(mut self, tournament_id: TournamentId) -> Self {
        self.tournament_id = Some(tournament_id);
        self
    }

    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }

    pub fn is_completed(&self) -> bool {
        self.status == EntryStatus::Completed
    }
}

/// Replay an account's balance from its opening amount and its entries.
/// Only completed entries move money.
pub fn replay_balance(initial_balance: Coins, entries: &[LedgerEntry]) -> Coins {
    entries
        .iter()
        .filter(|entry| entry.is_completed())
        .fold(initial_balance, |balance, entry| balance + entry.amount)
}

/// Net number of registrations an account has paid for in a tournament:
/// completed entry fees minus completed refunds.
pub fn registrations_paid(tournament_id: TournamentId, entries: &[LedgerEntry]) -> i64 {
    entries
        .iter()
        .filter(|e| e.is_completed() && e.tournament_id == Some(tournament_id))
        .fold(0, |paid, entry| match entry.kind {
            EntryKind::EntryFee => paid + 1,
            EntryKind::Refund => paid - 1,
            _ => paid,
        })
}

/// Net registrations paid per tournament across an account's entries.
pub fn registrations_paid_by_tournament(entries: &[LedgerEntry]) -> HashMap<TournamentId, i64> {
    let mut paid: HashMap<TournamentId, i64> = HashMap::new();

    for entry in entries.iter().filter(|e| e.is_completed()) {
        let Some(tournament_id) = entry.tournament_id else {
            continue;
        };
        match entry.kind {
            EntryKind::EntryFee => *paid.entry(tournament_id).or_insert(0) += 1,
            EntryKind::Refund => *paid.entry(tournament_id).or_insert(0) -= 1,
            _ => {}
        }
    }

    paid
}

/// Total prize money won, from completed prize entries.
pub fn total_prizes(entries: &[LedgerEntry]) -> Coins {
    entries
        .iter()
        .filter(|e| e.is_completed() && e.kind == EntryKind::Prize)
        .map(|e| e.amount)
        .sum()
}
