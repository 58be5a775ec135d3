use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Coins;

pub type AccountId = Uuid;

/// A player's coin account.
/// The balance only changes through ledger entries; `initial_balance` is the
/// opening amount the ledger replays from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub balance: Coins,
    pub initial_balance: Coins,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: impl Into<String>, initial_balance: Coins) -> Self {
        assert!(initial_balance >= 0, "Opening balance cannot be negative");
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            balance: initial_balance,
            initial_balance,
            created_at: Utc::now(),
        }
    }

    pub fn can_afford(&self, amount: Coins) -> bool {
        self.balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_starts_at_opening_balance() {
        let account = Account::new("alice", 100);
        assert_eq!(account.balance, 100);
        assert_eq!(account.initial_balance, 100);
    }

    #[test]
    fn test_can_afford() {
        let account = Account::new("bob", 30);
        assert!(account.can_afford(30));
        assert!(account.can_afford(0));
        assert!(!account.can_afford(50));
    }

    #[test]
    #[should_panic(expected = "Opening balance cannot be negative")]
    fn test_negative_opening_balance_panics() {
        let _ = Account::new("carol", -1);
    }
}
