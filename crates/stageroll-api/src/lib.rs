//! stageroll-api — REST API for stageroll.
//!
//! Provides axum route handlers for schedule configuration, session
//! overrides, and environment stage registration.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/schedules` | List schedules |
//! | GET | `/api/v1/schedules/{schedule_id}` | Get a schedule |
//! | POST | `/api/v1/schedules/update/{env}/{stage}` | Create, update or delete a stage's schedule |
//! | POST | `/api/v1/schedules/override/{env}/{stage}` | Advance or finalize the current session |
//! | GET | `/api/v1/stages` | List stage bindings |
//! | GET | `/api/v1/stages/{env}/{stage}` | Get a stage binding |
//! | PUT | `/api/v1/stages/{env}/{stage}` | Register a stage |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use stageroll_schedule::{ScheduleManager, SessionStateMachine};
use stageroll_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub schedules: ScheduleManager<StateStore>,
    pub sessions: SessionStateMachine<StateStore>,
}

impl ApiState {
    /// Wire the schedule manager and session state machine onto `store`.
    pub fn new(store: StateStore) -> Self {
        Self {
            schedules: ScheduleManager::new(store.clone()),
            sessions: SessionStateMachine::new(store.clone()),
            store,
        }
    }
}

/// Build the complete API router.
pub fn build_router(store: StateStore) -> Router {
    router(ApiState::new(store))
}

/// Build the API router around preconfigured handler state.
pub fn router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/schedules", get(handlers::list_schedules))
        .route("/schedules/{schedule_id}", get(handlers::get_schedule))
        .route("/schedules/update/{env}/{stage}", post(handlers::update_schedule))
        .route("/schedules/override/{env}/{stage}", post(handlers::override_session))
        .route("/stages", get(handlers::list_stages))
        .route(
            "/stages/{env}/{stage}",
            get(handlers::get_stage).put(handlers::register_stage),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
