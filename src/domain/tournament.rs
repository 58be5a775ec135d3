use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Coins};

pub type TournamentId = Uuid;
pub type ParticipantId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TournamentStatus {
    /// Accepting registrations
    Upcoming,
    /// Underway, roster frozen
    Live,
    /// Finished, prizes may be paid out
    Completed,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Upcoming => "upcoming",
            TournamentStatus::Live => "live",
            TournamentStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "upcoming" => Some(TournamentStatus::Upcoming),
            "live" => Some(TournamentStatus::Live),
            "completed" => Some(TournamentStatus::Completed),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TournamentStatus::Upcoming => 0,
            TournamentStatus::Live => 1,
            TournamentStatus::Completed => 2,
        }
    }

    /// Status only ever moves forward. Re-entering the current state is not a
    /// transition and is rejected as well.
    pub fn can_transition_to(&self, next: TournamentStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub title: String,
    pub game: String,
    pub description: Option<String>,
    /// Coins debited from each participant on registration
    pub entry_fee: Coins,
    /// Maximum roster size (always positive)
    pub capacity: u32,
    pub prize_pool: Coins,
    pub start_time: DateTime<Utc>,
    pub status: TournamentStatus,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    pub fn new(
        title: impl Into<String>,
        game: impl Into<String>,
        entry_fee: Coins,
        capacity: u32,
        start_time: DateTime<Utc>,
    ) -> Self {
        assert!(entry_fee >= 0, "Entry fee cannot be negative");
        assert!(capacity > 0, "Capacity must be positive");
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            game: game.into(),
            description: None,
            entry_fee,
            capacity,
            prize_pool: 0,
            start_time,
            status: TournamentStatus::Upcoming,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_prize_pool(mut self, prize_pool: Coins) -> Self {
        self.prize_pool = prize_pool;
        self
    }

    pub fn is_open(&self) -> bool {
        self.status == TournamentStatus::Upcoming
    }

    pub fn has_fee(&self) -> bool {
        self.entry_fee > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Registered,
    Completed,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantStatus::Registered => "registered",
            ParticipantStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "registered" => Some(ParticipantStatus::Registered),
            "completed" => Some(ParticipantStatus::Completed),
            _ => None,
        }
    }
}

/// A roster row: one account registered for one tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub tournament_id: TournamentId,
    pub account_id: AccountId,
    pub team_id: Option<String>,
    pub status: ParticipantStatus,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(tournament_id: TournamentId, account_id: AccountId) -> Self {
        Self {
            id: Uuid::new_v4(),
            tournament_id,
            account_id,
            team_id: None,
            status: ParticipantStatus::Registered,
            joined_at: Utc::now(),
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }
}
