use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{
    total_prizes, Account, AccountId, Coins, LedgerEntry, Participant, Tournament, TournamentId,
    TournamentStatus,
};
use crate::storage::{LedgerStore, TournamentCatalog};

use super::AppError;

/// Read-only projections over the ledger and the catalog.
pub struct QueryFacade<L, C> {
    ledger: Arc<L>,
    catalog: Arc<C>,
}

/// A tournament together with the account's roster row in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedTournament {
    pub tournament: Tournament,
    pub participant: Participant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentRoster {
    pub tournament: Tournament,
    pub participants: Vec<Participant>,
    pub open_slots: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account: Account,
    pub tournaments_joined: usize,
    pub entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub account_id: AccountId,
    pub username: String,
    pub prize_total: Coins,
    pub tournaments_joined: usize,
}

impl<L, C> QueryFacade<L, C>
where
    L: LedgerStore,
    C: TournamentCatalog,
{
    pub fn new(ledger: Arc<L>, catalog: Arc<C>) -> Self {
        Self { ledger, catalog }
    }

    /// Tournaments an account is registered for, in join order.
    pub async fn user_joined_tournaments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<JoinedTournament>, AppError> {
        self.ledger.get_account(account_id).await?;

        let mut joined = Vec::new();
        for participant in self.catalog.participations(account_id).await? {
            let tournament = self.catalog.get_tournament(participant.tournament_id).await?;
            joined.push(JoinedTournament {
                tournament,
                participant,
            });
        }
        Ok(joined)
    }

    pub async fn tournament_roster(
        &self,
        tournament_id: TournamentId,
    ) -> Result<TournamentRoster, AppError> {
        let tournament = self.catalog.get_tournament(tournament_id).await?;
        let participants = self.catalog.list_participants(tournament_id).await?;
        let taken = u32::try_from(participants.len()).unwrap_or(u32::MAX);

        Ok(TournamentRoster {
            open_slots: tournament.capacity.saturating_sub(taken),
            tournament,
            participants,
        })
    }

    /// Ledger entries for an account, newest first.
    pub async fn transaction_history(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(self.ledger.list_entries(account_id).await?)
    }

    pub async fn account_summary(&self, account_id: AccountId) -> Result<AccountSummary, AppError> {
        let account = self.ledger.get_account(account_id).await?;
        let entries = self.ledger.list_entries(account_id).await?.len();
        let tournaments_joined = self.catalog.participations(account_id).await?.len();

        Ok(AccountSummary {
            account,
            tournaments_joined,
            entries,
        })
    }

    pub async fn find_account(&self, username: &str) -> Result<Account, AppError> {
        Ok(self.ledger.get_account_by_username(username).await?)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.ledger.list_accounts().await?)
    }

    /// Tournaments ordered by start time, optionally filtered by status.
    pub async fn list_tournaments(
        &self,
        status: Option<TournamentStatus>,
    ) -> Result<Vec<Tournament>, AppError> {
        let tournaments = self.catalog.list_tournaments().await?;
        Ok(match status {
            Some(status) => tournaments
                .into_iter()
                .filter(|t| t.status == status)
                .collect(),
            None => tournaments,
        })
    }

    pub async fn get_tournament(&self, tournament_id: TournamentId) -> Result<Tournament, AppError> {
        Ok(self.catalog.get_tournament(tournament_id).await?)
    }

    /// Resolve a tournament by id or, failing that, by exact title.
    pub async fn find_tournament(&self, key: &str) -> Result<Tournament, AppError> {
        if let Ok(id) = key.parse::<TournamentId>() {
            return self.get_tournament(id).await;
        }

        self.catalog
            .list_tournaments()
            .await?
            .into_iter()
            .find(|t| t.title == key)
            .ok_or_else(|| AppError::TournamentNotFound(key.to_string()))
    }

    /// Accounts ranked by prize coins won, then by tournaments joined.
    /// Accounts that have neither won nor joined anything are left out.
    pub async fn prize_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardRow>, AppError> {
        let mut rows = Vec::new();

        for account in self.ledger.list_accounts().await? {
            let entries = self.ledger.list_entries(account.id).await?;
            let tournaments_joined = self.catalog.participations(account.id).await?.len();
            let prize_total = total_prizes(&entries);

            if prize_total == 0 && tournaments_joined == 0 {
                continue;
            }

            rows.push(LeaderboardRow {
                rank: 0,
                account_id: account.id,
                username: account.username,
                prize_total,
                tournaments_joined,
            });
        }

        rows.sort_by(|a, b| {
            b.prize_total
                .cmp(&a.prize_total)
                .then(b.tournaments_joined.cmp(&a.tournaments_joined))
                .then(a.username.cmp(&b.username))
        });
        rows.truncate(limit);
        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = i + 1;
        }

        Ok(rows)
    }
}
