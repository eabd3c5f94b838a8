//! REST API handlers.
//!
//! Each handler delegates to the schedule manager, session state machine,
//! or state store and returns JSON responses.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use stageroll_core::StageRef;
use stageroll_schedule::{ConfigureOutcome, ScheduleError, ScheduleRequest};
use stageroll_state::{Schedule, ScheduleId, StageRepository};
use tracing::{error, info};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn schedule_error(err: &ScheduleError) -> Response {
    let status = match err {
        ScheduleError::NotFound(_) => StatusCode::NOT_FOUND,
        ScheduleError::Validation(_) => StatusCode::BAD_REQUEST,
        ScheduleError::Store(e) => {
            error!(error = %e, "state store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(&err.to_string(), status).into_response()
}

fn parse_stage(env: &str, stage: &str) -> Result<StageRef, Response> {
    StageRef::parse(env, stage).map_err(|e| schedule_error(&ScheduleError::from(e)))
}

// ── Schedules ──────────────────────────────────────────────────

/// Request body for `POST /schedules/update/{env}/{stage}`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScheduleBody {
    #[serde(default)]
    pub cooldown_times: String,
    #[serde(default)]
    pub host_numbers: String,
    pub total_sessions: Option<i32>,
}

/// Result of a configure call.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfigureResponse {
    /// `created`, `updated`, `deleted` or `unchanged`.
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<ScheduleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

impl From<ConfigureOutcome> for ConfigureResponse {
    fn from(outcome: ConfigureOutcome) -> Self {
        let (action, schedule_id, schedule) = match outcome {
            ConfigureOutcome::Created(s) => ("created", Some(s.id.clone()), Some(s)),
            ConfigureOutcome::Updated(s) => ("updated", Some(s.id.clone()), Some(s)),
            ConfigureOutcome::Deleted { schedule_id } => ("deleted", Some(schedule_id), None),
            ConfigureOutcome::Unchanged => ("unchanged", None, None),
        };
        Self {
            action: action.to_string(),
            schedule_id,
            schedule,
        }
    }
}

/// GET /api/v1/schedules
pub async fn list_schedules(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_schedules() {
        Ok(schedules) => ApiResponse::ok(schedules).into_response(),
        Err(e) => schedule_error(&ScheduleError::from(e)),
    }
}

/// GET /api/v1/schedules/{schedule_id}
pub async fn get_schedule(
    State(state): State<ApiState>,
    Path(schedule_id): Path<String>,
) -> impl IntoResponse {
    match state.schedules.get(&schedule_id) {
        Ok(schedule) => ApiResponse::ok(schedule).into_response(),
        Err(e) => schedule_error(&e),
    }
}

/// POST /api/v1/schedules/update/{env}/{stage}
pub async fn update_schedule(
    State(state): State<ApiState>,
    Path((env, stage)): Path<(String, String)>,
    Json(body): Json<ScheduleBody>,
) -> impl IntoResponse {
    let stage = match parse_stage(&env, &stage) {
        Ok(stage) => stage,
        Err(resp) => return resp,
    };
    let Some(total_sessions) = body.total_sessions else {
        return schedule_error(&ScheduleError::Validation(
            "total_sessions is required".to_string(),
        ));
    };
    let request = ScheduleRequest {
        cooldown_times: body.cooldown_times,
        host_numbers: body.host_numbers,
        total_sessions,
    };

    match state.schedules.configure(&stage, request) {
        Ok(outcome) => {
            let status = match outcome {
                ConfigureOutcome::Created(_) => StatusCode::CREATED,
                _ => StatusCode::OK,
            };
            (status, ApiResponse::ok(ConfigureResponse::from(outcome))).into_response()
        }
        Err(e) => schedule_error(&e),
    }
}

/// POST /api/v1/schedules/override/{env}/{stage}
pub async fn override_session(
    State(state): State<ApiState>,
    Path((env, stage)): Path<(String, String)>,
) -> impl IntoResponse {
    let stage = match parse_stage(&env, &stage) {
        Ok(stage) => stage,
        Err(resp) => return resp,
    };
    match state.sessions.advance_or_finalize(&stage) {
        Ok(schedule) => ApiResponse::ok(schedule).into_response(),
        Err(e) => schedule_error(&e),
    }
}

// ── Stages ─────────────────────────────────────────────────────

/// GET /api/v1/stages
pub async fn list_stages(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_bindings() {
        Ok(bindings) => ApiResponse::ok(bindings).into_response(),
        Err(e) => schedule_error(&ScheduleError::from(e)),
    }
}

/// GET /api/v1/stages/{env}/{stage}
pub async fn get_stage(
    State(state): State<ApiState>,
    Path((env, stage)): Path<(String, String)>,
) -> impl IntoResponse {
    let stage = match parse_stage(&env, &stage) {
        Ok(stage) => stage,
        Err(resp) => return resp,
    };
    match state.store.binding(&stage) {
        Ok(Some(binding)) => ApiResponse::ok(binding).into_response(),
        Ok(None) => error_response("stage not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => schedule_error(&ScheduleError::from(e)),
    }
}

/// PUT /api/v1/stages/{env}/{stage}
pub async fn register_stage(
    State(state): State<ApiState>,
    Path((env, stage)): Path<(String, String)>,
) -> impl IntoResponse {
    let stage = match parse_stage(&env, &stage) {
        Ok(stage) => stage,
        Err(resp) => return resp,
    };
    match state.store.register_stage(&stage) {
        Ok(binding) => {
            info!(%stage, "stage registered");
            ApiResponse::ok(binding).into_response()
        }
        Err(e) => schedule_error(&ScheduleError::from(e)),
    }
}

#[cfg(test)]
mod tests {
    use stageroll_state::{ScheduleState, StageBinding, StateStore};

    use super::*;

    fn test_state() -> ApiState {
        ApiState::new(StateStore::open_in_memory().unwrap())
    }

    fn stage_path(env: &str, stage: &str) -> Path<(String, String)> {
        Path((env.to_string(), stage.to_string()))
    }

    fn body(total_sessions: Option<i32>) -> Json<ScheduleBody> {
        Json(ScheduleBody {
            cooldown_times: "5m".to_string(),
            host_numbers: "10".to_string(),
            total_sessions,
        })
    }

    async fn registered_state() -> ApiState {
        let state = test_state();
        let resp = register_stage(State(state.clone()), stage_path("e", "s")).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
        state
    }

    fn bound(state: &ApiState) -> Option<ScheduleId> {
        let stage = StageRef::parse("e", "s").unwrap();
        let bindings: Vec<StageBinding> = state.store.list_bindings().unwrap();
        bindings
            .into_iter()
            .find(|b| b.stage() == stage)
            .and_then(|b| b.schedule_id)
    }

    #[tokio::test]
    async fn update_creates_schedule() {
        let state = registered_state().await;

        let resp = update_schedule(State(state.clone()), stage_path("e", "s"), body(Some(3))).await;
        assert_eq!(resp.into_response().status(), StatusCode::CREATED);

        let id = bound(&state).expect("schedule bound");
        let schedule = state.schedules.get(&id).unwrap();
        assert_eq!(schedule.total_sessions, 3);
    }

    #[tokio::test]
    async fn update_again_is_ok_not_created() {
        let state = registered_state().await;
        update_schedule(State(state.clone()), stage_path("e", "s"), body(Some(3))).await;

        let resp = update_schedule(State(state.clone()), stage_path("e", "s"), body(Some(5))).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn update_without_total_sessions_is_bad_request() {
        let state = registered_state().await;
        let resp = update_schedule(State(state.clone()), stage_path("e", "s"), body(None)).await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
        assert!(bound(&state).is_none());
    }

    #[tokio::test]
    async fn update_unknown_stage_is_not_found() {
        let state = test_state();
        let resp = update_schedule(State(state), stage_path("e", "s"), body(Some(3))).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_stage_name_is_bad_request() {
        let state = test_state();
        let resp = register_stage(State(state), stage_path("e", "has space")).await;
        assert_eq!(resp.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn override_advances_then_finalizes() {
        let state = registered_state().await;
        update_schedule(State(state.clone()), stage_path("e", "s"), body(Some(2))).await;

        for _ in 0..3 {
            let resp = override_session(State(state.clone()), stage_path("e", "s")).await;
            assert_eq!(resp.into_response().status(), StatusCode::OK);
        }

        let schedule = state.schedules.get(&bound(&state).unwrap()).unwrap();
        assert_eq!(schedule.current_session, 2);
        assert_eq!(schedule.state, ScheduleState::Final);
    }

    #[tokio::test]
    async fn override_without_schedule_is_not_found() {
        let state = registered_state().await;
        let resp = override_session(State(state), stage_path("e", "s")).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_schedules_shows_created() {
        let state = registered_state().await;
        update_schedule(State(state.clone()), stage_path("e", "s"), body(Some(4))).await;

        let resp = list_schedules(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"][0]["total_sessions"], 4);
    }

    #[tokio::test]
    async fn get_missing_schedule_is_not_found() {
        let state = test_state();
        let resp = get_schedule(State(state), Path("nope".to_string())).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_unregistered_stage_is_not_found() {
        let state = test_state();
        let resp = get_stage(State(state), stage_path("e", "s")).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn configure_response_labels() {
        let deleted = ConfigureResponse::from(ConfigureOutcome::Deleted {
            schedule_id: "sch-1".to_string(),
        });
        assert_eq!(deleted.action, "deleted");
        assert_eq!(deleted.schedule_id.as_deref(), Some("sch-1"));
        assert!(deleted.schedule.is_none());

        let unchanged = ConfigureResponse::from(ConfigureOutcome::Unchanged);
        assert_eq!(unchanged.action, "unchanged");
        assert!(unchanged.schedule_id.is_none());
    }
}
