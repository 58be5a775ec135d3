use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::application::{
    AccountSummary, AppError, JoinReceipt, JoinedTournament, LeaderboardRow, LeaveReceipt,
    NewTournament, ReconcileReport, TournamentRoster,
};
use crate::domain::{
    Account, AccountId, Coins, IntegrityReport, LedgerEntry, Tournament, TournamentId,
    TournamentStatus,
};
use crate::storage::{LedgerStore, TournamentCatalog};

use super::{ApiError, ApiState};

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinRequest {
    pub user_id: AccountId,
    #[serde(default)]
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaveRequest {
    pub user_id: AccountId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAccountRequest {
    pub username: String,
    #[serde(default)]
    pub balance: Coins,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmountRequest {
    pub amount: Coins,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusRequest {
    pub status: TournamentStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrizeRequest {
    pub user_id: AccountId,
    pub amount: Coins,
}

#[derive(Debug, Default, Deserialize)]
pub struct TournamentListParams {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<usize>,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /tournaments?status=upcoming
pub async fn list_tournaments<L, C>(
    State(state): State<ApiState<L, C>>,
    Query(params): Query<TournamentListParams>,
) -> Result<Json<Vec<Tournament>>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    let status = match params.status.as_deref() {
        Some(s) => Some(TournamentStatus::from_str(s).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Unknown status '{}'. Valid statuses: upcoming, live, completed",
                s
            ))
        })?),
        None => None,
    };

    Ok(Json(state.queries.list_tournaments(status).await?))
}

/// POST /tournaments/:id/join
pub async fn join_tournament<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(tournament_id): Path<TournamentId>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<JoinReceipt>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    let receipt = state
        .registration
        .join(tournament_id, request.user_id, request.team_id)
        .await?;
    Ok(Json(receipt))
}

/// POST /tournaments/:id/leave
pub async fn leave_tournament<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(tournament_id): Path<TournamentId>,
    Json(request): Json<LeaveRequest>,
) -> Result<Json<LeaveReceipt>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    let receipt = state
        .registration
        .leave(tournament_id, request.user_id)
        .await?;
    Ok(Json(receipt))
}

/// GET /tournaments/:id/participants
pub async fn tournament_participants<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(tournament_id): Path<TournamentId>,
) -> Result<Json<TournamentRoster>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(state.queries.tournament_roster(tournament_id).await?))
}

/// GET /users/:id
pub async fn user_summary<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<AccountSummary>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(state.queries.account_summary(account_id).await?))
}

/// GET /users/:id/transactions (newest first)
pub async fn user_transactions<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(state.queries.transaction_history(account_id).await?))
}

/// GET /users/:id/tournaments
pub async fn user_tournaments<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(account_id): Path<AccountId>,
) -> Result<Json<Vec<JoinedTournament>>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(state.queries.user_joined_tournaments(account_id).await?))
}

/// GET /leaderboard?limit=10
pub async fn leaderboard<L, C>(
    State(state): State<ApiState<L, C>>,
    Query(params): Query<LeaderboardParams>,
) -> Result<Json<Vec<LeaderboardRow>>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    let limit = params.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    Ok(Json(state.queries.prize_leaderboard(limit).await?))
}

/// POST /users
pub async fn open_account<L, C>(
    State(state): State<ApiState<L, C>>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    let account = state
        .registration
        .open_account(&request.username, request.balance)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// POST /users/:id/deposit
pub async fn deposit<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<LedgerEntry>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(
        state.registration.deposit(account_id, request.amount).await?,
    ))
}

/// POST /users/:id/withdraw
pub async fn withdraw<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<AmountRequest>,
) -> Result<Json<LedgerEntry>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(
        state.registration.withdraw(account_id, request.amount).await?,
    ))
}

/// POST /tournaments
pub async fn create_tournament<L, C>(
    State(state): State<ApiState<L, C>>,
    Json(request): Json<NewTournament>,
) -> Result<(StatusCode, Json<Tournament>), ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    let tournament = state.registration.create_tournament(request).await?;
    Ok((StatusCode::CREATED, Json(tournament)))
}

/// POST /tournaments/:id/status
pub async fn update_tournament_status<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(tournament_id): Path<TournamentId>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Tournament>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(
        state
            .registration
            .update_status(tournament_id, request.status)
            .await?,
    ))
}

/// POST /tournaments/:id/prizes
pub async fn award_prize<L, C>(
    State(state): State<ApiState<L, C>>,
    Path(tournament_id): Path<TournamentId>,
    Json(request): Json<PrizeRequest>,
) -> Result<Json<LedgerEntry>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(
        state
            .registration
            .award_prize(tournament_id, request.user_id, request.amount)
            .await?,
    ))
}

/// GET /admin/integrity
pub async fn integrity<L, C>(
    State(state): State<ApiState<L, C>>,
) -> Result<Json<IntegrityReport>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(state.registration.check_integrity().await?))
}

/// POST /admin/reconcile
pub async fn reconcile<L, C>(
    State(state): State<ApiState<L, C>>,
) -> Result<Json<ReconcileReport>, ApiError>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Ok(Json(state.registration.reconcile().await?))
}
