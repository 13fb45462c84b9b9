use crate::auth::session::{clear_session_cookie, SessionUser};
use crate::core::error::{ApiError, StoreError};
use crate::core::state::AppState;
use crate::game::engine;
use crate::models::api::{
    BonusStatusResponse, ClickResponse, ProfileResponse, ResetResponse, UpgradeResponse,
};
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Json, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Current player state for the game screen
///
/// GET /game
pub async fn profile_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Ok(user_id) = state.sessions.user_id(&headers) else {
        return Redirect::to("/").into_response();
    };

    let user = match state.users.load(user_id) {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => {
            warn!(user_id, "Session refers to a missing user, clearing it");
            return (
                [(header::SET_COOKIE, clear_session_cookie())],
                Redirect::to("/"),
            )
                .into_response();
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    let bonus_active = state.bonus.is_active();

    Json(ProfileResponse {
        click_yield: engine::compute_click_yield(&user, bonus_active),
        upgrade_cost: engine::compute_upgrade_cost(user.equipment_level),
        can_reset: engine::can_reset(&user),
        bonus_active,
        username: user.username,
        coins: user.coins,
        equipment_level: user.equipment_level,
        resets: user.resets,
        reset_bonus_multiplier: user.reset_bonus_multiplier,
    })
    .into_response()
}

/// POST /click
pub async fn click_handler(
    State(state): State<Arc<AppState>>,
    SessionUser(user_id): SessionUser,
) -> Result<Json<ClickResponse>, ApiError> {
    let bonus_active = state.bonus.is_active();

    let (earned, user) = state
        .users
        .update(user_id, |user| Ok::<_, ApiError>(engine::apply_click(user, bonus_active)))?;

    debug!(user_id, earned, coins = user.coins, bonus_active, "Click");

    Ok(Json(ClickResponse {
        coins: user.coins,
        equipment_level: user.equipment_level,
        reset_bonus_multiplier: user.reset_bonus_multiplier,
    }))
}

/// POST /upgrade
pub async fn upgrade_handler(
    State(state): State<Arc<AppState>>,
    SessionUser(user_id): SessionUser,
) -> Result<Json<UpgradeResponse>, ApiError> {
    let (outcome, _) = state
        .users
        .update(user_id, |user| Ok::<_, ApiError>(engine::apply_upgrade(user)?))?;

    info!(
        user_id,
        cost = outcome.cost,
        equipment_level = outcome.equipment_level,
        "Equipment upgraded"
    );

    Ok(Json(UpgradeResponse {
        success: true,
        coins: outcome.coins,
        equipment_level: outcome.equipment_level,
    }))
}

/// POST /reset
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    SessionUser(user_id): SessionUser,
) -> Result<Json<ResetResponse>, ApiError> {
    let (outcome, _) = state
        .users
        .update(user_id, |user| Ok::<_, ApiError>(engine::apply_reset(user)?))?;

    info!(
        user_id,
        resets = outcome.resets,
        reset_bonus_multiplier = outcome.reset_bonus_multiplier,
        "Progress reset"
    );

    Ok(Json(ResetResponse {
        success: true,
        coins: outcome.coins,
        equipment_level: outcome.equipment_level,
        resets: outcome.resets,
        reset_bonus_multiplier: outcome.reset_bonus_multiplier,
    }))
}

/// GET /bonus_status
pub async fn bonus_status_handler(State(state): State<Arc<AppState>>) -> Json<BonusStatusResponse> {
    Json(BonusStatusResponse {
        bonus_active: state.bonus.is_active(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::test_support::create_test_state;
    use axum::http::{HeaderValue, StatusCode};
    use std::time::Duration;
    use tokio::time::Instant;

    fn session_headers(state: &AppState, user_id: u64) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let cookie = format!("session={}", state.sessions.issue(user_id));
        headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
        headers
    }

    fn start_bonus(state: &AppState) {
        state.bonus.activate(Instant::now(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_click() {
        let (_dir, state) = create_test_state();
        let user = state.users.create("alice", "hash".to_string()).unwrap();

        let Json(body) = click_handler(State(state.clone()), SessionUser(user.id)).await.unwrap();

        assert_eq!(body.coins, 1);
        assert_eq!(body.equipment_level, 1);
        assert_eq!(body.reset_bonus_multiplier, 1.0);
        assert_eq!(state.users.load(user.id).unwrap().coins, 1);
    }

    #[tokio::test]
    async fn test_click_during_bonus() {
        let (_dir, state) = create_test_state();
        let user = state.users.create("alice", "hash".to_string()).unwrap();
        start_bonus(&state);

        let Json(body) = click_handler(State(state.clone()), SessionUser(user.id)).await.unwrap();

        assert_eq!(body.coins, 2);
    }

    #[tokio::test]
    async fn test_click_stale_session() {
        let (_dir, state) = create_test_state();

        let result = click_handler(State(state), SessionUser(99)).await;

        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::SET_COOKIE).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clicks_never_lose_increments() {
        let (_dir, state) = create_test_state();
        let user_id = state.users.create("alice", "hash".to_string()).unwrap().id;

        let mut handles = vec![];
        for _ in 0..50 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                click_handler(State(state), SessionUser(user_id)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(state.users.load(user_id).unwrap().coins, 50);
    }

    #[tokio::test]
    async fn test_upgrade_success() {
        let (_dir, state) = create_test_state();
        let mut user = state.users.create("alice", "hash".to_string()).unwrap();
        user.coins = 250;
        state.users.save(&user).unwrap();

        let Json(body) = upgrade_handler(State(state.clone()), SessionUser(user.id)).await.unwrap();

        assert!(body.success);
        assert_eq!(body.coins, 150);
        assert_eq!(body.equipment_level, 2);
    }

    #[tokio::test]
    async fn test_upgrade_insufficient_funds() {
        let (_dir, state) = create_test_state();
        let user = state.users.create("alice", "hash".to_string()).unwrap();

        let result = upgrade_handler(State(state.clone()), SessionUser(user.id)).await;

        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.users.load(user.id).unwrap().equipment_level, 1);
    }

    #[tokio::test]
    async fn test_reset_threshold() {
        let (_dir, state) = create_test_state();
        let mut user = state.users.create("alice", "hash".to_string()).unwrap();
        user.coins = 999_999;
        user.equipment_level = 12;
        state.users.save(&user).unwrap();

        let result = reset_handler(State(state.clone()), SessionUser(user.id)).await;
        assert!(matches!(result, Err(ApiError::ThresholdNotMet)));

        user.coins = 1_000_000;
        state.users.save(&user).unwrap();

        let Json(body) = reset_handler(State(state.clone()), SessionUser(user.id)).await.unwrap();
        assert!(body.success);
        assert_eq!(body.coins, 0);
        assert_eq!(body.equipment_level, 1);
        assert_eq!(body.resets, 1);
        assert!((body.reset_bonus_multiplier - 1.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_bonus_status() {
        let (_dir, state) = create_test_state();

        let Json(body) = bonus_status_handler(State(state.clone())).await;
        assert!(!body.bonus_active);

        start_bonus(&state);
        let Json(body) = bonus_status_handler(State(state.clone())).await;
        assert!(body.bonus_active);
    }

    #[tokio::test]
    async fn test_profile() {
        let (_dir, state) = create_test_state();
        let mut user = state.users.create("alice", "hash".to_string()).unwrap();
        user.coins = 1_000_000;
        user.equipment_level = 2;
        state.users.save(&user).unwrap();

        let response = profile_handler(State(state.clone()), session_headers(&state, user.id)).await;
        assert_eq!(response.status(), StatusCode::OK);

        use http_body_util::BodyExt;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let profile: ProfileResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(profile.username, "alice");
        assert_eq!(profile.click_yield, 1);
        assert_eq!(profile.upgrade_cost, 110);
        assert!(profile.can_reset);
        assert!(!profile.bonus_active);
    }

    #[tokio::test]
    async fn test_profile_without_session_redirects() {
        let (_dir, state) = create_test_state();

        let response = profile_handler(State(state), HeaderMap::new()).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[tokio::test]
    async fn test_profile_stale_session_clears_cookie() {
        let (_dir, state) = create_test_state();
        let headers = session_headers(&state, 77);

        let response = profile_handler(State(state), headers).await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response.headers().get(header::SET_COOKIE).unwrap();
        assert!(cookie.to_str().unwrap().contains("Max-Age=0"));
    }
}
