// ============================
// identity-backend/src/routes.rs
// ============================
//! HTTP router and handlers.
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use identity_common::{
    AvailabilityResponse, BloomFilterData, RandomUsernameResponse, RegisterRequest,
    RegisterResponse, StrengthRequest, StrengthResponse, UsernameQuery,
};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::AppError;
use crate::validation::PasswordPolicy;
use crate::AppState;

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/usernames/check", get(check_username))
        .route("/usernames/random", get(random_username))
        .route("/usernames/bloom-filter", get(bloom_filter))
        .route("/passwords/strength", post(password_strength))
        .route("/users", post(register_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn check_username(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Json<AvailabilityResponse> {
    Json(state.availability.check_availability(&query.username).await)
}

async fn random_username(
    State(state): State<AppState>,
) -> Result<Json<RandomUsernameResponse>, AppError> {
    let username = state.availability.generate_random_username().await?;
    Ok(Json(RandomUsernameResponse { username }))
}

async fn bloom_filter(State(state): State<AppState>) -> Json<BloomFilterData> {
    Json(state.availability.filter().snapshot())
}

async fn password_strength(Json(request): Json<StrengthRequest>) -> Json<StrengthResponse> {
    let result = PasswordPolicy::validate(&request.password);
    Json(StrengthResponse {
        valid: result.valid,
        score: result.score,
        level: result.level,
        issues: result.issues,
        warnings: result.warnings,
    })
}

/// Validate both fields and confirm the name is free before paying for the
/// hash, which runs off the async runtime.
async fn register_user(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let RegisterRequest { username, mut password } = request;

    let strength = PasswordPolicy::validate(&password);
    if !strength.valid {
        return Err(AppError::InvalidInput(strength.issues));
    }
    state.availability.ensure_registrable(&username).await?;

    let hasher = state.hasher.clone();
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash_and_zeroize(&mut password))
        .await
        .map_err(|e| {
            error!(error = %e, "password hashing task failed");
            AppError::Internal(e.to_string())
        })??;

    let record = state
        .availability
        .register(&username, Some(password_hash))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            username: record.username,
            shard: record.shard,
            created_at: record.created_at,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Pepper, Settings};
    use crate::storage::{InMemoryUserStore, UserStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_state(names: &[&str]) -> (AppState, InMemoryUserStore) {
        let mut settings = Settings::default();
        settings.password.pepper = Pepper::new("router-test-pepper-0123");
        settings.password.cost = 4;

        let store = InMemoryUserStore::with_usernames(names.iter().copied()).unwrap();
        let shared: Arc<dyn UserStore> = Arc::new(store.clone());
        let state = AppState::new(shared, settings).unwrap();
        state.availability.rebuild_filter().await.unwrap();
        (state, store)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = test_state(&[]).await;
        let response = create_router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_check_taken_and_free() {
        let (state, _) = test_state(&["alice123"]).await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/usernames/check?username=alice123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: AvailabilityResponse = body_json(response).await;
        assert!(!body.available);
        assert!(!body.suggestions.is_empty());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/usernames/check?username=zz_brandnew9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: AvailabilityResponse = body_json(response).await;
        assert!(body.available);
        assert!(body.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_random_username() {
        let (state, _) = test_state(&[]).await;
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/usernames/random")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: RandomUsernameResponse = body_json(response).await;
        assert!(crate::validation::UsernamePolicy::is_valid(&body.username));
    }

    #[tokio::test]
    async fn test_bloom_filter_export() {
        let (state, _) = test_state(&["alice123", "bobby_tables"]).await;
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/usernames/bloom-filter")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: BloomFilterData = body_json(response).await;
        assert_eq!(body.size, 100_000);
        assert_eq!(body.hash_count, 7);
        assert_eq!(body.item_count, 2);
        assert!(!body.filter_data.is_empty());
    }

    #[tokio::test]
    async fn test_password_strength() {
        let (state, _) = test_state(&[]).await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(post_json(
                "/passwords/strength",
                serde_json::json!({ "password": "Tr0ub4dor&Horse!x" }),
            ))
            .await
            .unwrap();
        let body: StrengthResponse = body_json(response).await;
        assert!(body.valid);
        assert_eq!(body.score, 90);
        assert!(body.issues.is_empty());
        assert!(body.warnings.is_empty());

        // the pattern penalty is explained without failing validation
        let response = app
            .oneshot(post_json(
                "/passwords/strength",
                serde_json::json!({ "password": "Secure123!pass" }),
            ))
            .await
            .unwrap();
        let body: StrengthResponse = body_json(response).await;
        assert!(body.valid);
        assert_eq!(body.score, 70);
        assert!(body.issues.is_empty());
        assert_eq!(body.warnings, vec!["No sequential or repeated patterns"]);
    }

    #[tokio::test]
    async fn test_register_flow() {
        let (state, store) = test_state(&["alice123"]).await;
        let hasher = state.hasher.clone();
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(post_json(
                "/users",
                serde_json::json!({ "username": "Carol_Dev", "password": "Secure123!pass" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: RegisterResponse = body_json(response).await;
        assert_eq!(body.username, "carol_dev");
        assert_eq!(body.shard, 3);

        let stored = store.get("carol_dev").unwrap();
        let hash = stored.password_hash.unwrap();
        assert!(hasher.verify("Secure123!pass", &hash));

        let response = app
            .clone()
            .oneshot(post_json(
                "/users",
                serde_json::json!({ "username": "alice123", "password": "Secure123!pass" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(post_json(
                "/users",
                serde_json::json!({ "username": "dave_dev", "password": "short" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response).await;
        assert_eq!(body["error"]["code"], "VAL_001");
    }

    #[tokio::test]
    async fn test_rejected_registrations_skip_hashing() {
        let mut settings = Settings::default();
        settings.password.pepper = Pepper::new("router-test-pepper-0123");
        // over a minute per hash, so any hashing would trip the timeout below
        settings.password.cost = 20;
        let store: Arc<dyn UserStore> =
            Arc::new(InMemoryUserStore::with_usernames(["alice123"]).unwrap());
        let state = AppState::new(store, settings).unwrap();
        state.availability.rebuild_filter().await.unwrap();
        let app = create_router(state);

        for (username, status) in [
            ("alice123", StatusCode::CONFLICT),
            ("ALICE123", StatusCode::CONFLICT),
            ("9lives_x", StatusCode::BAD_REQUEST),
            ("ab", StatusCode::BAD_REQUEST),
        ] {
            let request = post_json(
                "/users",
                serde_json::json!({ "username": username, "password": "Secure123!pass" }),
            );
            let response = tokio::time::timeout(
                std::time::Duration::from_secs(10),
                app.clone().oneshot(request),
            )
            .await
            .expect("rejected registration must not wait for a hash")
            .unwrap();
            assert_eq!(response.status(), status, "{username}");
        }
    }
}
