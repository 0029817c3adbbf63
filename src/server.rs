//!
//! rollcall HTTP server
//! --------------------
//! This module defines the Axum-based HTTP API for rollcall.
//!
//! Responsibilities:
//! - Registration and login endpoints backed by the `security` and `store`
//!   modules; login issues a signed bearer token.
//! - Read-only dashboard endpoints (profile, user list, counts, courses)
//!   gated on a valid token.
//! - CORS for the browser frontend and per-request tracing.
//! - Startup wiring: config, database connection, best-effort schema
//!   reconciliation before the listener binds.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{extract::State, Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::db::SharedDb;
use crate::models::{normalize_email, LoginPayload, RegisterPayload, User};
use crate::security::{self, Claims};
use crate::store;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub config: Arc<Config>,
}

/// Convenience entry point reading configuration from the environment.
pub async fn run() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    run_with_config(cfg).await
}

/// Start the rollcall HTTP server: connect, reconcile the schema, mount
/// routes, serve. Schema reconciliation is best-effort and never blocks
/// startup; config and connection failures do.
pub async fn run_with_config(cfg: Config) -> anyhow::Result<()> {
    let db = crate::db::connect(&cfg.db_url)
        .await
        .with_context(|| "while connecting to the rollcall database")?;

    // Normalize the schema before accepting traffic. Failures are logged
    // inside and never propagate.
    crate::schema::ensure_schema(db.0.as_ref()).await;

    let cors = CorsLayer::new()
        .allow_origin(cfg.cors_origin.parse::<HeaderValue>().context("invalid CORS origin")?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let http_port = cfg.http_port;
    let state = AppState { db, config: Arc::new(cfg) };

    let app = Router::new()
        .route("/", get(|| async { "rollcall ok" }))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/dashboard/user-info", get(user_info))
        .route("/api/dashboard/all-users", get(all_users))
        .route("/api/dashboard/stats", get(stats))
        .route("/api/dashboard/courses", get(courses))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization").or_else(|| headers.get("Authorization"))?;
    let s = value.to_str().ok()?;
    let rest = s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer "))?;
    let token = rest.trim();
    if token.is_empty() { None } else { Some(token.to_string()) }
}

/// Resolve the caller's claims from the Authorization header. Expired and
/// malformed tokens both come back as None; the endpoints answer 401 either
/// way.
fn claims_from_headers(state: &AppState, headers: &HeaderMap) -> Option<Claims> {
    let token = bearer_token(headers)?;
    security::verify_token(&state.config.jwt_secret, &token).ok()
}

fn fmt_date(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d").to_string()
}

fn fmt_last_login(t: Option<DateTime<Utc>>) -> String {
    match t {
        Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        None => "Never".to_string(),
    }
}

fn internal_error() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "Internal server error"})))
}

async fn register(State(state): State<AppState>, Json(payload): Json<RegisterPayload>) -> impl IntoResponse {
    if let Err(e) = payload.validate() {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": e.message()})));
    }
    let email = normalize_email(&payload.email);

    match store::email_exists(&state.db, &email).await {
        Ok(true) => return (StatusCode::BAD_REQUEST, Json(json!({"message": "Email already exists"}))),
        Ok(false) => {}
        Err(e) => {
            error!("register: email lookup failed: {:#}", e);
            return internal_error();
        }
    }

    let hash = match security::hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            error!("register: password hashing failed: {:#}", e);
            return internal_error();
        }
    };

    match store::insert_user(&state.db, payload.name.trim(), &email, &hash, payload.phone.trim(), &payload.gender).await {
        Ok(_id) => (StatusCode::OK, Json(json!({"message": "Registration successful"}))),
        Err(e) => {
            error!("register: insert failed: {:#}", e);
            internal_error()
        }
    }
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> impl IntoResponse {
    if let Err(e) = payload.validate() {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": e.message()})));
    }
    let email = normalize_email(&payload.email);

    let user = match store::find_user_by_email(&state.db, &email).await {
        Ok(u) => u,
        Err(e) => {
            error!("login: lookup failed: {:#}", e);
            return internal_error();
        }
    };
    // Unknown email, inactive account and bad password share one answer.
    let Some(user) = user else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid email or password"})));
    };
    if !user.is_active || !security::verify_password(&user.password_hash, &payload.password) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid email or password"})));
    }

    if let Err(e) = store::touch_last_login(&state.db, user.id, Utc::now()).await {
        error!("login: last-login update failed: {:#}", e);
        return internal_error();
    }

    let token = match security::issue_token(
        &state.config.jwt_secret,
        state.config.jwt_ttl_secs,
        user.id,
        &user.email,
        &user.name,
    ) {
        Ok(t) => t,
        Err(e) => {
            error!("login: token issue failed: {:#}", e);
            return internal_error();
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "token": token,
            "user": {
                "id": user.id,
                "name": user.name,
                "email": user.email,
                "phone": user.phone,
                "gender": user.gender,
                "registrationDate": user.registration_date.to_rfc3339(),
            }
        })),
    )
}

async fn user_info(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(claims) = claims_from_headers(&state, &headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "unauthorized"})));
    };
    let Ok(user_id) = claims.sub.parse::<i32>() else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "unauthorized"})));
    };
    match store::find_user_by_id(&state.db, user_id).await {
        Ok(Some(u)) => (
            StatusCode::OK,
            Json(json!({
                "id": u.id,
                "name": u.name,
                "email": u.email,
                "phone": u.phone,
                "gender": u.gender,
                "registrationDate": fmt_date(u.registration_date),
                "lastLogin": fmt_last_login(u.last_login),
            })),
        ),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({"message": "User not found"}))),
        Err(e) => {
            error!("user-info: lookup failed: {:#}", e);
            internal_error()
        }
    }
}

async fn all_users(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(_claims) = claims_from_headers(&state, &headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "unauthorized"})));
    };
    match store::list_active_users(&state.db).await {
        Ok(users) => {
            let out: Vec<serde_json::Value> = users.iter().map(user_summary).collect();
            (StatusCode::OK, Json(json!(out)))
        }
        Err(e) => {
            error!("all-users: listing failed: {:#}", e);
            internal_error()
        }
    }
}

fn user_summary(u: &User) -> serde_json::Value {
    json!({
        "id": u.id,
        "name": u.name,
        "email": u.email,
        "phone": u.phone,
        "gender": u.gender,
        "registrationDate": fmt_date(u.registration_date),
    })
}

async fn stats(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(_claims) = claims_from_headers(&state, &headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "unauthorized"})));
    };
    match store::user_stats(&state.db).await {
        Ok((total, active)) => (StatusCode::OK, Json(json!({"totalUsers": total, "activeUsers": active}))),
        Err(e) => {
            error!("stats: query failed: {:#}", e);
            internal_error()
        }
    }
}

async fn courses(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(_claims) = claims_from_headers(&state, &headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "unauthorized"})));
    };
    match store::list_courses(&state.db).await {
        Ok(courses) => {
            let out: Vec<serde_json::Value> = courses
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "courseName": c.course_name,
                        "description": c.description,
                        "createdAt": fmt_date(c.created_at),
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!(out)))
        }
        Err(e) => {
            error!("courses: listing failed: {:#}", e);
            internal_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("authorization", HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn bearer_token_extraction() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def.ghi")).as_deref(), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers_with("bearer abc")).as_deref(), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Basic dXNlcg==")), None);
        assert_eq!(bearer_token(&headers_with("Bearer   ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn date_formatting_matches_dashboard_contract() {
        let t = DateTime::parse_from_rfc3339("2024-03-09T14:05:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(fmt_date(t), "2024-03-09");
        assert_eq!(fmt_last_login(Some(t)), "2024-03-09 14:05");
        assert_eq!(fmt_last_login(None), "Never");
    }
}
