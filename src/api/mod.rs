//! HTTP boundary for the registration core.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::application::{QueryFacade, RegistrationService};
use crate::storage::{LedgerStore, TournamentCatalog};

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::*;

/// Shared handler state
pub struct ApiState<L, C> {
    pub registration: Arc<RegistrationService<L, C>>,
    pub queries: Arc<QueryFacade<L, C>>,
}

impl<L, C> ApiState<L, C>
where
    L: LedgerStore,
    C: TournamentCatalog,
{
    pub fn new(ledger: Arc<L>, catalog: Arc<C>) -> Self {
        Self {
            registration: Arc::new(RegistrationService::new(ledger.clone(), catalog.clone())),
            queries: Arc::new(QueryFacade::new(ledger, catalog)),
        }
    }
}

impl<L, C> Clone for ApiState<L, C> {
    fn clone(&self) -> Self {
        Self {
            registration: self.registration.clone(),
            queries: self.queries.clone(),
        }
    }
}

pub fn router<L, C>(state: ApiState<L, C>) -> Router
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route(
            "/tournaments",
            get(list_tournaments::<L, C>).post(create_tournament::<L, C>),
        )
        .route("/tournaments/:id/join", post(join_tournament::<L, C>))
        .route("/tournaments/:id/leave", post(leave_tournament::<L, C>))
        .route("/tournaments/:id/participants", get(tournament_participants::<L, C>))
        .route("/tournaments/:id/status", post(update_tournament_status::<L, C>))
        .route("/tournaments/:id/prizes", post(award_prize::<L, C>))
        .route("/users", post(open_account::<L, C>))
        .route("/users/:id", get(user_summary::<L, C>))
        .route("/users/:id/deposit", post(deposit::<L, C>))
        .route("/users/:id/withdraw", post(withdraw::<L, C>))
        .route("/users/:id/transactions", get(user_transactions::<L, C>))
        .route("/users/:id/tournaments", get(user_tournaments::<L, C>))
        .route("/leaderboard", get(leaderboard::<L, C>))
        .route("/admin/integrity", get(integrity::<L, C>))
        .route("/admin/reconcile", post(reconcile::<L, C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
