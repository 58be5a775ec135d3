use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::domain::{
    build_integrity_report, find_registration_mismatches, Account, AccountId, Coins, EntryKind,
    IntegrityReport, LedgerEntry, Participant, Tournament, TournamentId, TournamentStatus,
};
use crate::storage::{LedgerStore, StoreError, TournamentCatalog};

use super::AppError;

/// Registration service: the only write path into the ledger and the
/// tournament rosters.
///
/// Joins and leaves touch the catalog and the ledger in separate, independently
/// locked steps and never hold both at once. A failed debit after a roster
/// insert is undone by a compensating removal; anything a crash leaves behind
/// is healed by [`RegistrationService::reconcile`].
pub struct RegistrationService<L, C> {
    ledger: Arc<L>,
    catalog: Arc<C>,
    /// Shared by every write, exclusive for audits and reconciliation, so
    /// those see no operation half done.
    admission: RwLock<()>,
}

/// Input for creating a tournament
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTournament {
    pub title: String,
    pub game: String,
    pub description: Option<String>,
    pub entry_fee: Coins,
    pub capacity: u32,
    #[serde(default)]
    pub prize_pool: Coins,
    pub start_time: DateTime<Utc>,
}

/// Result of a successful join
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinReceipt {
    pub participant: Participant,
    /// The entry fee debit; absent for free tournaments
    pub entry: Option<LedgerEntry>,
    pub balance: Coins,
}

/// Result of leaving a tournament before it starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveReceipt {
    pub participant: Participant,
    /// The refund credit; absent for free tournaments or when the refund
    /// could not be applied and was left to reconciliation
    pub refund: Option<LedgerEntry>,
    pub balance: Coins,
}

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Fees charged for registrations that had no debit
    pub charged: Vec<LedgerEntry>,
    /// Registrations removed because their fee could not be charged
    pub removed: Vec<Participant>,
    /// Refunds for fees with no backing registration
    pub refunded: Vec<LedgerEntry>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.charged.is_empty() && self.removed.is_empty() && self.refunded.is_empty()
    }
}

impl<L, C> RegistrationService<L, C>
where
    L: LedgerStore,
    C: TournamentCatalog,
{
    /// Create a new registration service over the given stores.
    pub fn new(ledger: Arc<L>, catalog: Arc<C>) -> Self {
        Self {
            ledger,
            catalog,
            admission: RwLock::new(()),
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    // ========================
    // Accounts
    // ========================

    /// Open a new account with an opening balance.
    pub async fn open_account(
        &self,
        username: &str,
        initial_balance: Coins,
    ) -> Result<Account, AppError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::InvalidInput(
                "Username must not be empty".to_string(),
            ));
        }
        if initial_balance < 0 {
            return Err(AppError::InvalidAmount(
                "Opening balance cannot be negative".to_string(),
            ));
        }

        let account = self
            .ledger
            .open_account(Account::new(username, initial_balance))
            .await?;
        info!(account = %account.id, username = %account.username, balance = initial_balance, "account opened");
        Ok(account)
    }

    /// Credit coins to an account. Payment processing is simulated.
    pub async fn deposit(&self, account_id: AccountId, amount: Coins) -> Result<LedgerEntry, AppError> {
        Self::require_positive(amount)?;
        let _admission = self.admission.read().await;

        let entry = self
            .ledger
            .apply_entry(LedgerEntry::new(account_id, amount, EntryKind::Deposit, "deposit"))
            .await?;
        info!(account = %account_id, amount, balance = entry.balance_after, "deposit recorded");
        Ok(entry)
    }

    /// Debit coins from an account. Goes through the same per-account gate
    /// as entry fees, so it can never overdraw.
    pub async fn withdraw(&self, account_id: AccountId, amount: Coins) -> Result<LedgerEntry, AppError> {
        Self::require_positive(amount)?;
        let _admission = self.admission.read().await;

        let entry = self
            .ledger
            .apply_entry(LedgerEntry::new(
                account_id,
                -amount,
                EntryKind::Withdrawal,
                "withdrawal",
            ))
            .await?;
        info!(account = %account_id, amount, balance = entry.balance_after, "withdrawal recorded");
        Ok(entry)
    }

    // ========================
    // Tournaments
    // ========================

    /// Create a tournament in the Upcoming state.
    pub async fn create_tournament(&self, new: NewTournament) -> Result<Tournament, AppError> {
        if new.title.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Title must not be empty".to_string(),
            ));
        }
        if new.capacity == 0 {
            return Err(AppError::InvalidInput(
                "Capacity must be positive".to_string(),
            ));
        }
        if new.entry_fee < 0 {
            return Err(AppError::InvalidAmount(
                "Entry fee cannot be negative".to_string(),
            ));
        }
        if new.prize_pool < 0 {
            return Err(AppError::InvalidAmount(
                "Prize pool cannot be negative".to_string(),
            ));
        }

        let mut tournament = Tournament::new(
            new.title.trim(),
            new.game,
            new.entry_fee,
            new.capacity,
            new.start_time,
        )
        .with_prize_pool(new.prize_pool);
        if let Some(desc) = new.description {
            tournament = tournament.with_description(desc);
        }

        let tournament = self.catalog.create_tournament(tournament).await?;
        info!(
            tournament = %tournament.id,
            title = %tournament.title,
            fee = tournament.entry_fee,
            capacity = tournament.capacity,
            "tournament created"
        );
        Ok(tournament)
    }

    /// Move a tournament forward in its lifecycle.
    pub async fn update_status(
        &self,
        tournament_id: TournamentId,
        status: TournamentStatus,
    ) -> Result<Tournament, AppError> {
        let tournament = self.catalog.update_status(tournament_id, status).await?;
        info!(tournament = %tournament_id, status = %status, "tournament status changed");
        Ok(tournament)
    }

    // ========================
    // Registration
    // ========================

    /// Register an account for a tournament and settle its entry fee.
    ///
    /// Either both the roster row and the fee debit are committed, or
    /// neither is: a debit failure removes the roster row again before the
    /// error is returned.
    pub async fn join(
        &self,
        tournament_id: TournamentId,
        account_id: AccountId,
        team_id: Option<String>,
    ) -> Result<JoinReceipt, AppError> {
        let _admission = self.admission.read().await;

        let tournament = self.catalog.get_tournament(tournament_id).await?;
        if !tournament.is_open() {
            debug!(tournament = %tournament_id, account = %account_id, status = %tournament.status, "join rejected: closed");
            return Err(AppError::TournamentClosed {
                tournament_id,
                status: tournament.status,
            });
        }

        // Advisory: the debit below is the authoritative check
        let balance = self.ledger.balance(account_id).await?;
        if balance < tournament.entry_fee {
            debug!(tournament = %tournament_id, account = %account_id, balance, "join rejected: funds");
            return Err(AppError::InsufficientFunds {
                account_id,
                balance,
                required: tournament.entry_fee,
            });
        }

        let mut participant = Participant::new(tournament_id, account_id);
        if let Some(team) = team_id {
            participant = participant.with_team(team);
        }
        let participant = self.catalog.add_participant(participant).await?;

        if !tournament.has_fee() {
            info!(tournament = %tournament_id, account = %account_id, "joined free tournament");
            let balance = self.ledger.balance(account_id).await?;
            return Ok(JoinReceipt {
                participant,
                entry: None,
                balance,
            });
        }

        let fee = LedgerEntry::new(
            account_id,
            -tournament.entry_fee,
            EntryKind::EntryFee,
            tournament.title.clone(),
        )
        .with_tournament(tournament_id);

        match self.ledger.apply_entry(fee).await {
            Ok(entry) => {
                info!(
                    tournament = %tournament_id,
                    account = %account_id,
                    fee = tournament.entry_fee,
                    balance = entry.balance_after,
                    "joined tournament"
                );
                Ok(JoinReceipt {
                    participant,
                    balance: entry.balance_after,
                    entry: Some(entry),
                })
            }
            Err(err) => {
                warn!(tournament = %tournament_id, account = %account_id, error = %err, "fee debit failed, rolling back registration");
                self.rollback_registration(&participant).await;
                Err(err.into())
            }
        }
    }

    /// Compensating removal for a registration whose fee was not settled.
    /// Safe to repeat; a failure is logged and left for reconciliation.
    async fn rollback_registration(&self, participant: &Participant) {
        match self
            .catalog
            .remove_participant(participant.tournament_id, participant.id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(participant = %participant.id, "registration already removed during rollback")
            }
            Err(err) => error!(
                participant = %participant.id,
                tournament = %participant.tournament_id,
                error = %err,
                "rollback failed; registration left for reconciliation"
            ),
        }
    }

    /// Withdraw a registration before the tournament starts and refund the
    /// entry fee.
    pub async fn leave(
        &self,
        tournament_id: TournamentId,
        account_id: AccountId,
    ) -> Result<LeaveReceipt, AppError> {
        let _admission = self.admission.read().await;

        let tournament = self.catalog.get_tournament(tournament_id).await?;
        if !tournament.is_open() {
            return Err(AppError::TournamentClosed {
                tournament_id,
                status: tournament.status,
            });
        }

        let participant = self
            .catalog
            .list_participants(tournament_id)
            .await?
            .into_iter()
            .find(|p| p.account_id == account_id)
            .ok_or(AppError::NotParticipant {
                tournament_id,
                account_id,
            })?;

        if !self
            .catalog
            .remove_participant(tournament_id, participant.id)
            .await?
        {
            // Lost a race with another leave for the same registration
            return Err(AppError::NotParticipant {
                tournament_id,
                account_id,
            });
        }

        if !tournament.has_fee() {
            info!(tournament = %tournament_id, account = %account_id, "left free tournament");
            let balance = self.ledger.balance(account_id).await?;
            return Ok(LeaveReceipt {
                participant,
                refund: None,
                balance,
            });
        }

        let refund = LedgerEntry::new(
            account_id,
            tournament.entry_fee,
            EntryKind::Refund,
            format!("Refund: {}", tournament.title),
        )
        .with_tournament(tournament_id);

        match self.ledger.apply_entry(refund).await {
            Ok(entry) => {
                info!(tournament = %tournament_id, account = %account_id, refund = tournament.entry_fee, "left tournament");
                Ok(LeaveReceipt {
                    participant,
                    balance: entry.balance_after,
                    refund: Some(entry),
                })
            }
            Err(err) => {
                error!(
                    tournament = %tournament_id,
                    account = %account_id,
                    error = %err,
                    "refund failed; fee left for reconciliation"
                );
                Err(err.into())
            }
        }
    }

    /// Pay out prize coins to a participant of a completed tournament.
    pub async fn award_prize(
        &self,
        tournament_id: TournamentId,
        account_id: AccountId,
        amount: Coins,
    ) -> Result<LedgerEntry, AppError> {
        Self::require_positive(amount)?;
        let _admission = self.admission.read().await;

        let tournament = self.catalog.get_tournament(tournament_id).await?;
        if tournament.status != TournamentStatus::Completed {
            return Err(AppError::TournamentNotCompleted {
                tournament_id,
                status: tournament.status,
            });
        }

        let registered = self
            .catalog
            .list_participants(tournament_id)
            .await?
            .iter()
            .any(|p| p.account_id == account_id);
        if !registered {
            return Err(AppError::NotParticipant {
                tournament_id,
                account_id,
            });
        }

        let entry = self
            .ledger
            .apply_entry(
                LedgerEntry::new(
                    account_id,
                    amount,
                    EntryKind::Prize,
                    format!("Prize: {}", tournament.title),
                )
                .with_tournament(tournament_id),
            )
            .await?;
        info!(tournament = %tournament_id, account = %account_id, amount, "prize awarded");
        Ok(entry)
    }

    // ========================
    // Integrity
    // ========================

    /// Check ledger and roster integrity and return a report.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let _exclusive = self.admission.write().await;
        let ledgers = self.load_ledgers().await?;
        let rosters = self.load_rosters().await?;
        Ok(build_integrity_report(&ledgers, &rosters))
    }

    /// Heal registrations and fees that disagree, e.g. after a crash between
    /// a roster change and its ledger entry.
    ///
    /// Unpaid registrations are charged when the account can afford it and
    /// removed otherwise. Fees without a registration are refunded.
    pub async fn reconcile(&self) -> Result<ReconcileReport, AppError> {
        let _exclusive = self.admission.write().await;
        let ledgers = self.load_ledgers().await?;
        let rosters = self.load_rosters().await?;

        let tournaments: HashMap<TournamentId, &(Tournament, Vec<Participant>)> =
            rosters.iter().map(|r| (r.0.id, r)).collect();

        let mut report = ReconcileReport::default();

        for mismatch in find_registration_mismatches(&ledgers, &rosters) {
            let Some((tournament, participants)) = tournaments.get(&mismatch.tournament_id).copied()
            else {
                continue;
            };
            let outstanding = mismatch.outstanding();

            if outstanding > 0 {
                for _ in 0..outstanding {
                    let fee = LedgerEntry::new(
                        mismatch.account_id,
                        -tournament.entry_fee,
                        EntryKind::EntryFee,
                        tournament.title.clone(),
                    )
                    .with_tournament(tournament.id);

                    match self.ledger.apply_entry(fee).await {
                        Ok(entry) => {
                            info!(tournament = %tournament.id, account = %mismatch.account_id, "reconcile: charged unpaid registration");
                            report.charged.push(entry);
                        }
                        Err(StoreError::InsufficientFunds { .. } | StoreError::AccountNotFound(_)) => {
                            if let Some(participant) = participants
                                .iter()
                                .find(|p| p.account_id == mismatch.account_id)
                            {
                                self.catalog
                                    .remove_participant(tournament.id, participant.id)
                                    .await?;
                                info!(tournament = %tournament.id, account = %mismatch.account_id, "reconcile: removed unpaid registration");
                                report.removed.push(participant.clone());
                            }
                            break;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            } else {
                for _ in 0..-outstanding {
                    let refund = LedgerEntry::new(
                        mismatch.account_id,
                        tournament.entry_fee,
                        EntryKind::Refund,
                        format!("Refund: {}", tournament.title),
                    )
                    .with_tournament(tournament.id);

                    let entry = self.ledger.apply_entry(refund).await?;
                    info!(tournament = %tournament.id, account = %mismatch.account_id, "reconcile: refunded unbacked fee");
                    report.refunded.push(entry);
                }
            }
        }

        Ok(report)
    }

    async fn load_ledgers(&self) -> Result<Vec<(Account, Vec<LedgerEntry>)>, AppError> {
        let mut ledgers = Vec::new();
        for account in self.ledger.list_accounts().await? {
            let entries = self.ledger.list_entries(account.id).await?;
            ledgers.push((account, entries));
        }
        Ok(ledgers)
    }

    async fn load_rosters(&self) -> Result<Vec<(Tournament, Vec<Participant>)>, AppError> {
        let mut rosters = Vec::new();
        for tournament in self.catalog.list_tournaments().await? {
            let participants = self.catalog.list_participants(tournament.id).await?;
            rosters.push((tournament, participants));
        }
        Ok(rosters)
    }

    fn require_positive(amount: Coins) -> Result<(), AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
