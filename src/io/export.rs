use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::QueryFacade;
use crate::domain::{Account, AccountId, LedgerEntry, Participant, Tournament};
use crate::storage::{LedgerStore, TournamentCatalog};

/// Point-in-time copy of every account, tournament, roster and entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
    pub tournaments: Vec<Tournament>,
    pub participants: Vec<Participant>,
    pub entries: Vec<LedgerEntry>,
}

/// Writes ledger data out as CSV or JSON
pub struct Exporter<'a, L, C> {
    queries: &'a QueryFacade<L, C>,
}

impl<'a, L, C> Exporter<'a, L, C>
where
    L: LedgerStore,
    C: TournamentCatalog,
{
    pub fn new(queries: &'a QueryFacade<L, C>) -> Self {
        Self { queries }
    }

    /// Export ledger entries to CSV, oldest first. Restricted to one account
    /// when `account` is given.
    pub async fn export_entries_csv<W: Write>(
        &self,
        writer: W,
        account: Option<AccountId>,
    ) -> Result<usize> {
        let accounts = match account {
            Some(id) => vec![self.queries.account_summary(id).await?.account],
            None => self.queries.list_accounts().await?,
        };

        let mut entries = Vec::new();
        for account in &accounts {
            for entry in self.queries.transaction_history(account.id).await? {
                entries.push((account.username.clone(), entry));
            }
        }
        entries.sort_by_key(|(_, entry)| entry.sequence);

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "id",
            "sequence",
            "created_at",
            "username",
            "kind",
            "amount",
            "balance_after",
            "status",
            "tournament_id",
            "reference",
        ])?;

        for (username, entry) in &entries {
            csv_writer.write_record(&[
                entry.id.to_string(),
                entry.sequence.to_string(),
                entry.created_at.to_rfc3339(),
                username.clone(),
                entry.kind.to_string(),
                entry.amount.to_string(),
                entry.balance_after.to_string(),
                entry.status.as_str().to_string(),
                entry
                    .tournament_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                entry.reference.clone(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    /// Export account balances to CSV
    pub async fn export_accounts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.queries.list_accounts().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "username", "balance", "initial_balance", "created_at"])?;
        for account in &accounts {
            csv_writer.write_record(&[
                account.id.to_string(),
                account.username.clone(),
                account.balance.to_string(),
                account.initial_balance.to_string(),
                account.created_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(accounts.len())
    }

    /// Export everything as a single JSON document
    pub async fn export_snapshot_json<W: Write>(&self, writer: W) -> Result<Snapshot> {
        let accounts = self.queries.list_accounts().await?;
        let tournaments = self.queries.list_tournaments(None).await?;

        let mut participants = Vec::new();
        for tournament in &tournaments {
            participants.extend(self.queries.tournament_roster(tournament.id).await?.participants);
        }

        let mut entries = Vec::new();
        for account in &accounts {
            entries.extend(self.queries.transaction_history(account.id).await?);
        }
        entries.sort_by_key(|entry| entry.sequence);

        let snapshot = Snapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            accounts,
            tournaments,
            participants,
            entries,
        };

        serde_json::to_writer_pretty(writer, &snapshot)?;
        Ok(snapshot)
    }
}
