use thiserror::Error;

use crate::domain::{AccountId, Coins, TournamentId, TournamentStatus};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Tournament not found: {0}")]
    TournamentNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

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

    #[error("Tournament {tournament_id} is {status}; prizes are paid after completion")]
    TournamentNotCompleted {
        tournament_id: TournamentId,
        status: TournamentStatus,
    },

    #[error("Account {account_id} is not registered for tournament {tournament_id}")]
    NotParticipant {
        tournament_id: TournamentId,
        account_id: AccountId,
    },

    #[error("Insufficient funds in account {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Coins,
        required: Coins,
    },

    #[error("Invalid status transition for tournament {tournament_id}: {from} -> {to}")]
    InvalidTransition {
        tournament_id: TournamentId,
        from: TournamentStatus,
        to: TournamentStatus,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::AccountNotFound(_) | AppError::TournamentNotFound(_) => "not_found",
            AppError::AccountAlreadyExists(_) => "already_exists",
            AppError::AlreadyJoined { .. } => "already_joined",
            AppError::TournamentFull { .. } => "tournament_full",
            AppError::TournamentClosed { .. } => "tournament_closed",
            AppError::TournamentNotCompleted { .. } => "tournament_not_completed",
            AppError::NotParticipant { .. } => "not_participant",
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::InvalidAmount(_) => "invalid_amount",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => AppError::AccountNotFound(id),
            StoreError::AccountExists(name) => AppError::AccountAlreadyExists(name),
            StoreError::TournamentNotFound(id) => AppError::TournamentNotFound(id.to_string()),
            StoreError::AlreadyJoined {
                tournament_id,
                account_id,
            } => AppError::AlreadyJoined {
                tournament_id,
                account_id,
            },
            StoreError::TournamentFull {
                tournament_id,
                capacity,
            } => AppError::TournamentFull {
                tournament_id,
                capacity,
            },
            StoreError::TournamentClosed {
                tournament_id,
                status,
            } => AppError::TournamentClosed {
                tournament_id,
                status,
            },
            StoreError::InsufficientFunds {
                account_id,
                balance,
                required,
            } => AppError::InsufficientFunds {
                account_id,
                balance,
                required,
            },
            overflow @ StoreError::AmountOverflow { .. } => {
                AppError::InvalidAmount(overflow.to_string())
            }
            StoreError::InvalidTransition {
                tournament_id,
                from,
                to,
            } => AppError::InvalidTransition {
                tournament_id,
                from,
                to,
            },
            StoreError::Unavailable(err) => AppError::StorageUnavailable(err),
        }
    }
}
