// region:    --- Imports
use crate::bidding::ledger::OpenError;
use crate::bidding::model::RegisterAuction;
use crate::clock;
use crate::gateway::ConnectionGateway;
use crate::lifecycle::LifecycleAction;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Router

/// 엔진 라우터 구성
pub fn routes(gateway: Arc<ConnectionGateway>) -> Router {
    Router::new()
        .route("/ws", get(handle_ws))
        .route("/auctions", post(handle_register_auction))
        .route("/auctions/:id/manage-status", post(handle_manage_status))
        .route("/auctions/:id", get(handle_get_auction))
        .route("/auctions/:id/bids", get(handle_get_bid_history))
        .with_state(gateway)
}

// endregion: --- Router

// region:    --- WebSocket Handler

/// 웹소켓 업그레이드: 연결마다 게이트웨이 세션 태스크 하나
pub async fn handle_ws(
    State(gateway): State<Arc<ConnectionGateway>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| gateway.handle_socket(socket))
}

// endregion: --- WebSocket Handler

// region:    --- Command Handlers

/// 경매 등록 처리
/// 상품/리스팅 관리 마이크로 서비스가 경매를 엔진에 넘겨주는 경계
pub async fn handle_register_auction(
    State(gateway): State<Arc<ConnectionGateway>>,
    Json(request): Json<RegisterAuction>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 등록 요청: {:?}", "Command", request);

    match gateway.router().open(request) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "success": true })),
        )
            .into_response(),
        Err(e @ OpenError::Duplicate(_)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": e.to_string(),
                "code": "DUPLICATE_AUCTION"
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": e.to_string(),
                "code": "INVALID_AUCTION"
            })),
        )
            .into_response(),
    }
}

/// 상태 관리 요청 본문
#[derive(Debug, Deserialize)]
pub struct ManageStatusRequest {
    pub action: String,
    pub reason: Option<String>,
}

/// 경매 상태 관리 요청 처리 (관리자 경계)
pub async fn handle_manage_status(
    State(gateway): State<Arc<ConnectionGateway>>,
    Path(auction_id): Path<i64>,
    Json(request): Json<ManageStatusRequest>,
) -> impl IntoResponse {
    info!(
        "{:<12} --> 상태 관리 요청: auction={}, action={}",
        "Command", auction_id, request.action
    );

    let Some(action) = LifecycleAction::from_admin_action(&request.action) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "지원하지 않는 액션입니다",
                "code": "INVALID_ACTION",
                "action": request.action
            })),
        )
            .into_response();
    };

    let Some(handle) = gateway.router().handle(auction_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "경매를 찾을 수 없습니다",
                "code": "AUCTION_NOT_FOUND"
            })),
        )
            .into_response();
    };

    match handle.transition(action, "admin", request.reason).await {
        Ok(applied) => Json(serde_json::json!({
            "success": true,
            "new_status": applied.new_status,
            "updated_at": applied.updated_at
        }))
        .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": e.to_string(),
                "code": "INVALID_TRANSITION",
                "current_status": e.current,
                "requested_action": e.requested
            })),
        )
            .into_response(),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 경매 스냅샷 + 카운트다운 조회
pub async fn handle_get_auction(
    State(gateway): State<Arc<ConnectionGateway>>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 경매 상태 조회 id: {}", "HandlerQuery", auction_id);

    let snapshot = match gateway.router().handle(auction_id) {
        Some(handle) => handle.snapshot().await,
        None => None,
    };
    let Some(snapshot) = snapshot else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "경매를 찾을 수 없습니다",
                "code": "AUCTION_NOT_FOUND"
            })),
        )
            .into_response();
    };

    let countdown = clock::compute(
        snapshot.status,
        snapshot.start_time,
        snapshot.end_time,
        Utc::now(),
    );
    Json(serde_json::json!({
        "auction": snapshot,
        "countdown": countdown
    }))
    .into_response()
}

/// 입찰 이력 조회 (최신순)
pub async fn handle_get_bid_history(
    State(gateway): State<Arc<ConnectionGateway>>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> 입찰 이력 조회 id: {}", "HandlerQuery", auction_id);

    let history = match gateway.router().handle(auction_id) {
        Some(handle) => handle.bid_history().await,
        None => None,
    };
    match history {
        Some(bids) => Json(bids).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "경매를 찾을 수 없습니다",
                "code": "AUCTION_NOT_FOUND"
            })),
        )
            .into_response(),
    }
}

// endregion: --- Query Handlers
