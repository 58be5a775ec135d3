use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{
    registrations_paid_by_tournament, replay_balance, Account, AccountId, Coins, LedgerEntry,
    Participant, Tournament, TournamentId,
};

/// A disagreement between a tournament roster and the fees an account paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationMismatch {
    pub tournament_id: TournamentId,
    pub account_id: AccountId,
    pub registered: bool,
    /// Net registrations paid (entry fees minus refunds)
    pub paid: i64,
}

impl RegistrationMismatch {
    /// Fees still owed (positive) or owed back to the account (negative).
    pub fn outstanding(&self) -> i64 {
        i64::from(self.registered) - self.paid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IntegrityIssue {
    BalanceDrift {
        account_id: AccountId,
        stored: Coins,
        replayed: Coins,
    },
    NegativeBalance {
        account_id: AccountId,
        balance: Coins,
    },
    OverCapacity {
        tournament_id: TournamentId,
        capacity: u32,
        participants: usize,
    },
    DuplicateParticipant {
        tournament_id: TournamentId,
        account_id: AccountId,
    },
    UnpaidRegistration {
        tournament_id: TournamentId,
        account_id: AccountId,
    },
    UnbackedFee {
        tournament_id: TournamentId,
        account_id: AccountId,
        paid: i64,
    },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::BalanceDrift {
                account_id,
                stored,
                replayed,
            } => write!(
                f,
                "account {} stores balance {} but its ledger replays to {}",
                account_id, stored, replayed
            ),
            IntegrityIssue::NegativeBalance {
                account_id,
                balance,
            } => write!(f, "account {} has negative balance {}", account_id, balance),
            IntegrityIssue::OverCapacity {
                tournament_id,
                capacity,
                participants,
            } => write!(
                f,
                "tournament {} has {} participants for {} slots",
                tournament_id, participants, capacity
            ),
            IntegrityIssue::DuplicateParticipant {
                tournament_id,
                account_id,
            } => write!(
                f,
                "account {} is registered twice in tournament {}",
                account_id, tournament_id
            ),
            IntegrityIssue::UnpaidRegistration {
                tournament_id,
                account_id,
            } => write!(
                f,
                "account {} is registered in tournament {} without paying",
                account_id, tournament_id
            ),
            IntegrityIssue::UnbackedFee {
                tournament_id,
                account_id,
                paid,
            } => write!(
                f,
                "account {} paid {} fee(s) for tournament {} without a registration",
                account_id, paid, tournament_id
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub accounts_checked: usize,
    pub tournaments_checked: usize,
    pub entries_checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Compare every fee-bearing roster with the fees its accounts paid.
///
/// A registered account must have paid exactly once; an account that is not
/// on the roster must have a net of zero paid.
pub fn find_registration_mismatches(
    ledgers: &[(Account, Vec<LedgerEntry>)],
    rosters: &[(Tournament, Vec<Participant>)],
) -> Vec<RegistrationMismatch> {
    let paid_by_account: HashMap<AccountId, HashMap<TournamentId, i64>> = ledgers
        .iter()
        .map(|(account, entries)| (account.id, registrations_paid_by_tournament(entries)))
        .collect();

    let mut mismatches = Vec::new();

    for (tournament, participants) in rosters.iter().filter(|(t, _)| t.has_fee()) {
        let registered: HashSet<AccountId> = participants.iter().map(|p| p.account_id).collect();

        let mut candidates: Vec<AccountId> = paid_by_account.keys().copied().collect();
        candidates.extend(registered.iter().filter(|id| !paid_by_account.contains_key(id)));

        for account_id in &candidates {
            let paid = paid_by_account
                .get(account_id)
                .and_then(|paid| paid.get(&tournament.id))
                .copied()
                .unwrap_or(0);
            let is_registered = registered.contains(account_id);
            if paid != i64::from(is_registered) {
                mismatches.push(RegistrationMismatch {
                    tournament_id: tournament.id,
                    account_id: *account_id,
                    registered: is_registered,
                    paid,
                });
            }
        }
    }

    mismatches
}

pub fn build_integrity_report(
    ledgers: &[(Account, Vec<LedgerEntry>)],
    rosters: &[(Tournament, Vec<Participant>)],
) -> IntegrityReport {
    let mut issues = Vec::new();

    for (account, entries) in ledgers {
        let replayed = replay_balance(account.initial_balance, entries);
        if replayed != account.balance {
            issues.push(IntegrityIssue::BalanceDrift {
                account_id: account.id,
                stored: account.balance,
                replayed,
            });
        }
        if account.balance < 0 {
            issues.push(IntegrityIssue::NegativeBalance {
                account_id: account.id,
                balance: account.balance,
            });
        }
    }

    for (tournament, participants) in rosters {
        if participants.len() > tournament.capacity as usize {
            issues.push(IntegrityIssue::OverCapacity {
                tournament_id: tournament.id,
                capacity: tournament.capacity,
                participants: participants.len(),
            });
        }

        let mut seen = HashSet::new();
        for participant in participants {
            if !seen.insert(participant.account_id) {
                issues.push(IntegrityIssue::DuplicateParticipant {
                    tournament_id: tournament.id,
                    account_id: participant.account_id,
                });
            }
        }
    }

    for mismatch in find_registration_mismatches(ledgers, rosters) {
        issues.push(if mismatch.outstanding() > 0 {
            IntegrityIssue::UnpaidRegistration {
                tournament_id: mismatch.tournament_id,
                account_id: mismatch.account_id,
            }
        } else {
            IntegrityIssue::UnbackedFee {
                tournament_id: mismatch.tournament_id,
                account_id: mismatch.account_id,
                paid: mismatch.paid,
            }
        });
    }

    IntegrityReport {
        accounts_checked: ledgers.len(),
        tournaments_checked: rosters.len(),
        entries_checked: ledgers.iter().map(|(_, entries)| entries.len()).sum(),
        issues,
    }
}
