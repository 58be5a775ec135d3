use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, Coins, EntryKind, EntryStatus, LedgerEntry, Participant, ParticipantId,
    ParticipantStatus, Tournament, TournamentId, TournamentStatus,
};

use super::{
    LedgerStore, StoreError, StoreResult, TournamentCatalog, MIGRATION_001_INITIAL,
};

const ACCOUNT_COLUMNS: &str = "id, username, balance, initial_balance, created_at";
const TOURNAMENT_COLUMNS: &str = "id, title, game, description, entry_fee, capacity, prize_pool, start_time, status, created_at";
const PARTICIPANT_COLUMNS: &str = "id, tournament_id, account_id, team_id, status, joined_at";
const ENTRY_COLUMNS: &str = "id, sequence, account_id, amount, kind, status, reference, tournament_id, balance_after, created_at";

/// SQLite-backed ledger and tournament catalog.
///
/// The pool holds a single connection, so every store operation runs as one
/// transaction with no other writer interleaved.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    async fn fetch_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn fetch_tournament(&self, id: TournamentId) -> Result<Option<Tournament>> {
        let row = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch tournament")?;

        row.as_ref().map(Self::row_to_tournament).transpose()
    }

    fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(value)
            .with_context(|| format!("Invalid {} timestamp", field))?
            .with_timezone(&Utc))
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            username: row.get("username"),
            balance: row.get("balance"),
            initial_balance: row.get("initial_balance"),
            created_at: Self::parse_timestamp(&created_at_str, "created_at")?,
        })
    }

    fn row_to_tournament(row: &SqliteRow) -> Result<Tournament> {
        let id_str: String = row.get("id");
        let status_str: String = row.get("status");
        let start_time_str: String = row.get("start_time");
        let created_at_str: String = row.get("created_at");
        let capacity: i64 = row.get("capacity");

        Ok(Tournament {
            id: Uuid::parse_str(&id_str).context("Invalid tournament ID")?,
            title: row.get("title"),
            game: row.get("game"),
            description: row.get("description"),
            entry_fee: row.get("entry_fee"),
            capacity: u32::try_from(capacity).context("Invalid capacity")?,
            prize_pool: row.get("prize_pool"),
            start_time: Self::parse_timestamp(&start_time_str, "start_time")?,
            status: TournamentStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid tournament status: {}", status_str))?,
            created_at: Self::parse_timestamp(&created_at_str, "created_at")?,
        })
    }

    fn row_to_participant(row: &SqliteRow) -> Result<Participant> {
        let id_str: String = row.get("id");
        let tournament_str: String = row.get("tournament_id");
        let account_str: String = row.get("account_id");
        let status_str: String = row.get("status");
        let joined_at_str: String = row.get("joined_at");

        Ok(Participant {
            id: Uuid::parse_str(&id_str).context("Invalid participant ID")?,
            tournament_id: Uuid::parse_str(&tournament_str).context("Invalid tournament ID")?,
            account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
            team_id: row.get("team_id"),
            status: ParticipantStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid participant status: {}", status_str))?,
            joined_at: Self::parse_timestamp(&joined_at_str, "joined_at")?,
        })
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
        let id_str: String = row.get("id");
        let account_str: String = row.get("account_id");
        let kind_str: String = row.get("kind");
        let status_str: String = row.get("status");
        let tournament_str: Option<String> = row.get("tournament_id");
        let created_at_str: String = row.get("created_at");

        Ok(LedgerEntry {
            id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
            sequence: row.get("sequence"),
            account_id: Uuid::parse_str(&account_str).context("Invalid account ID")?,
            amount: row.get("amount"),
            kind: EntryKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid entry kind: {}", kind_str))?,
            status: EntryStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid entry status: {}", status_str))?,
            reference: row.get("reference"),
            tournament_id: tournament_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid tournament ID")?,
            balance_after: row.get("balance_after"),
            created_at: Self::parse_timestamp(&created_at_str, "created_at")?,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl LedgerStore for Repository {
    async fn open_account(&self, account: Account) -> StoreResult<Account> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, username, balance, initial_balance, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.username)
        .bind(account.balance)
        .bind(account.initial_balance)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(account),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AccountExists(account.username)),
            Err(err) => Err(anyhow::Error::new(err).context("Failed to save account").into()),
        }
    }

    async fn get_account(&self, id: AccountId) -> StoreResult<Account> {
        self.fetch_account(id)
            .await?
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))
    }

    async fn get_account_by_username(&self, username: &str) -> StoreResult<Account> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by username")?;

        match row {
            Some(row) => Ok(Self::row_to_account(&row)?),
            None => Err(StoreError::AccountNotFound(username.to_string())),
        }
    }

    async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY username"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        Ok(rows.iter().map(Self::row_to_account).collect::<Result<_>>()?)
    }

    async fn balance(&self, id: AccountId) -> StoreResult<Coins> {
        Ok(self.get_account(id).await?.balance)
    }

    async fn apply_entry(&self, mut entry: LedgerEntry) -> StoreResult<LedgerEntry> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin ledger transaction")?;

        let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
            .bind(entry.account_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read balance")?;

        let Some(row) = row else {
            return Err(StoreError::AccountNotFound(entry.account_id.to_string()));
        };
        let balance: Coins = row.get("balance");

        let balance_after = balance
            .checked_add(entry.amount)
            .ok_or(StoreError::AmountOverflow {
                account_id: entry.account_id,
                balance,
                amount: entry.amount,
            })?;
        if entry.is_debit() && balance_after < 0 {
            return Err(StoreError::InsufficientFunds {
                account_id: entry.account_id,
                balance,
                required: -entry.amount,
            });
        }

        sqlx::query("UPDATE accounts SET balance = ? WHERE id = ?")
            .bind(balance_after)
            .bind(entry.account_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to update balance")?;

        let sequence: i64 = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'ledger_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to get next sequence number")?
        .get("value");

        entry.sequence = sequence;
        entry.status = EntryStatus::Completed;
        entry.balance_after = balance_after;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, sequence, account_id, amount, kind, status, reference, tournament_id, balance_after, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.sequence)
        .bind(entry.account_id.to_string())
        .bind(entry.amount)
        .bind(entry.kind.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.reference)
        .bind(entry.tournament_id.map(|id| id.to_string()))
        .bind(entry.balance_after)
        .bind(entry.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save ledger entry")?;

        tx.commit()
            .await
            .context("Failed to commit ledger transaction")?;

        Ok(entry)
    }

    async fn list_entries(&self, id: AccountId) -> StoreResult<Vec<LedgerEntry>> {
        if self.fetch_account(id).await?.is_none() {
            return Err(StoreError::AccountNotFound(id.to_string()));
        }

        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE account_id = ? ORDER BY sequence DESC"
        ))
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ledger entries")?;

        Ok(rows.iter().map(Self::row_to_entry).collect::<Result<_>>()?)
    }
}

impl TournamentCatalog for Repository {
    async fn create_tournament(&self, tournament: Tournament) -> StoreResult<Tournament> {
        sqlx::query(
            r#"
            INSERT INTO tournaments (id, title, game, description, entry_fee, capacity, prize_pool, start_time, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tournament.id.to_string())
        .bind(&tournament.title)
        .bind(&tournament.game)
        .bind(&tournament.description)
        .bind(tournament.entry_fee)
        .bind(i64::from(tournament.capacity))
        .bind(tournament.prize_pool)
        .bind(tournament.start_time.to_rfc3339())
        .bind(tournament.status.as_str())
        .bind(tournament.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save tournament")?;

        Ok(tournament)
    }

    async fn get_tournament(&self, id: TournamentId) -> StoreResult<Tournament> {
        self.fetch_tournament(id)
            .await?
            .ok_or(StoreError::TournamentNotFound(id))
    }

    async fn list_tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments ORDER BY start_time, title"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tournaments")?;

        Ok(rows
            .iter()
            .map(Self::row_to_tournament)
            .collect::<Result<_>>()?)
    }

    async fn list_participants(&self, id: TournamentId) -> StoreResult<Vec<Participant>> {
        if self.fetch_tournament(id).await?.is_none() {
            return Err(StoreError::TournamentNotFound(id));
        }

        let rows = sqlx::query(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE tournament_id = ? ORDER BY joined_at, rowid"
        ))
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list participants")?;

        Ok(rows
            .iter()
            .map(Self::row_to_participant)
            .collect::<Result<_>>()?)
    }

    async fn participations(&self, account_id: AccountId) -> StoreResult<Vec<Participant>> {
        let rows = sqlx::query(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE account_id = ? ORDER BY joined_at, rowid"
        ))
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list participations")?;

        Ok(rows
            .iter()
            .map(Self::row_to_participant)
            .collect::<Result<_>>()?)
    }

    async fn add_participant(&self, participant: Participant) -> StoreResult<Participant> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin roster transaction")?;

        let row = sqlx::query(
            r#"
            SELECT t.capacity, t.status,
                   (SELECT COUNT(*) FROM participants p WHERE p.tournament_id = t.id) AS taken,
                   (SELECT COUNT(*) FROM participants p WHERE p.tournament_id = t.id AND p.account_id = ?) AS mine
            FROM tournaments t
            WHERE t.id = ?
            "#,
        )
        .bind(participant.account_id.to_string())
        .bind(participant.tournament_id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read roster")?;

        let Some(row) = row else {
            return Err(StoreError::TournamentNotFound(participant.tournament_id));
        };

        let capacity: i64 = row.get("capacity");
        let status_str: String = row.get("status");
        let taken: i64 = row.get("taken");
        let mine: i64 = row.get("mine");

        let status = TournamentStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid tournament status: {}", status_str))?;
        if status != TournamentStatus::Upcoming {
            return Err(StoreError::TournamentClosed {
                tournament_id: participant.tournament_id,
                status,
            });
        }
        if mine > 0 {
            return Err(StoreError::AlreadyJoined {
                tournament_id: participant.tournament_id,
                account_id: participant.account_id,
            });
        }
        if taken >= capacity {
            return Err(StoreError::TournamentFull {
                tournament_id: participant.tournament_id,
                capacity: u32::try_from(capacity).context("Invalid capacity")?,
            });
        }

        let result = sqlx::query(
            r#"
            INSERT INTO participants (id, tournament_id, account_id, team_id, status, joined_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(participant.id.to_string())
        .bind(participant.tournament_id.to_string())
        .bind(participant.account_id.to_string())
        .bind(&participant.team_id)
        .bind(participant.status.as_str())
        .bind(participant.joined_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(StoreError::AlreadyJoined {
                    tournament_id: participant.tournament_id,
                    account_id: participant.account_id,
                });
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context("Failed to save participant")
                    .into());
            }
        }

        tx.commit()
            .await
            .context("Failed to commit roster transaction")?;

        Ok(participant)
    }

    async fn remove_participant(
        &self,
        tournament_id: TournamentId,
        participant_id: ParticipantId,
    ) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM participants WHERE id = ? AND tournament_id = ?")
            .bind(participant_id.to_string())
            .bind(tournament_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to remove participant")?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_status(
        &self,
        id: TournamentId,
        status: TournamentStatus,
    ) -> StoreResult<Tournament> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin status transaction")?;

        let row = sqlx::query("SELECT status FROM tournaments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read tournament status")?;

        let Some(row) = row else {
            return Err(StoreError::TournamentNotFound(id));
        };
        let current_str: String = row.get("status");
        let current = TournamentStatus::from_str(&current_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid tournament status: {}", current_str))?;

        if !current.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                tournament_id: id,
                from: current,
                to: status,
            });
        }

        sqlx::query("UPDATE tournaments SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to update tournament status")?;

        tx.commit()
            .await
            .context("Failed to commit status transaction")?;

        self.get_tournament(id).await
    }
}
