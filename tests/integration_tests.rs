use bidding_service::bidding::commands::BidRejectReason;
use bidding_service::bidding::ledger::LedgerRouter;
use bidding_service::bidding::model::AuctionStatus;
use bidding_service::client::{AuctionClient, ClientError};
use bidding_service::gateway::auth::LocalTokenVerifier;
use bidding_service::gateway::ConnectionGateway;
use bidding_service::handlers;
use bidding_service::lifecycle::{AuditSink, LifecycleAction, MemoryAuditSink};
use bidding_service::scheduler::AuctionScheduler;
use bidding_service::topics::TopicHub;
use chrono::Utc;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

/// 브로드캐스트 전파 대기 시간
const PROPAGATION: Duration = Duration::from_millis(300);

/// 임시 포트에 엔진 서버 기동
async fn spawn_server() -> (SocketAddr, Arc<MemoryAuditSink>) {
    let hub = Arc::new(TopicHub::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let router = Arc::new(LedgerRouter::new(
        Arc::clone(&hub),
        Arc::clone(&audit) as Arc<dyn AuditSink>,
    ));

    let scheduler = AuctionScheduler::new(Arc::clone(&router));
    scheduler.start().await;

    let gateway = Arc::new(ConnectionGateway::new(
        router,
        hub,
        Arc::new(LocalTokenVerifier),
    ));
    let routes = handlers::routes(gateway);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("리스너 바인드 실패");
    let addr = listener.local_addr().expect("로컬 주소 조회 실패");
    tokio::spawn(async move {
        let _ = axum::serve(listener, routes.into_make_service()).await;
    });
    (addr, audit)
}

fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{}/ws", addr)
}

fn http_url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}", addr, path)
}

/// REST 로 테스트 경매 등록 (5분 전 시작, 2시간 뒤 종료, 시작가 10000, 증가분 1000)
async fn register_test_auction(addr: SocketAddr, id: i64) {
    let response = Client::new()
        .post(http_url(addr, "/auctions"))
        .json(&json!({
            "id": id,
            "starting_price": 10_000,
            "reserve_price": null,
            "min_increment": 1_000,
            "start_time": Utc::now() - chrono::Duration::minutes(5),
            "end_time": Utc::now() + chrono::Duration::hours(2),
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 201);
}

/// 인증과 참여를 마친 클라이언트 생성
async fn joined_client(addr: SocketAddr, user: i64, auction_id: i64) -> AuctionClient {
    let client = AuctionClient::connect(&ws_url(addr))
        .await
        .expect("접속 실패");
    client
        .authenticate(&format!("user-{}", user))
        .await
        .expect("인증 실패");
    client.join_auction(auction_id).await.expect("참여 실패");
    client
}

/// 인증 및 참여 스냅샷 테스트
#[tokio::test]
async fn test_authenticate_and_join_snapshot() {
    let (addr, _audit) = spawn_server().await;
    register_test_auction(addr, 1).await;

    let client = AuctionClient::connect(&ws_url(addr))
        .await
        .expect("접속 실패");

    // 잘못된 토큰: 실패 후에도 연결은 재시도 가능하다
    let err = client
        .authenticate("bogus")
        .await
        .expect_err("잘못된 토큰은 거절");
    assert!(matches!(err, ClientError::AuthFailed(_)));

    let user_id = client.authenticate("user-7").await.expect("인증 실패");
    assert_eq!(user_id, 7);

    // 참여 응답은 항상 전체 스냅샷이다
    let snapshot = client.join_auction(1).await.expect("참여 실패");
    assert_eq!(snapshot.status, AuctionStatus::Active);
    assert_eq!(snapshot.current_price, 10_000);
    assert_eq!(snapshot.total_bids, 0);
    assert_eq!(snapshot.participants_count, 1);

    // 없는 경매 참여는 거절된다
    let other = AuctionClient::connect(&ws_url(addr))
        .await
        .expect("접속 실패");
    other.authenticate("user-8").await.expect("인증 실패");
    let err = other
        .join_auction(99)
        .await
        .expect_err("없는 경매 참여는 거절");
    assert!(matches!(err, ClientError::Server(_)));
}

/// 인증/참여 전 입찰 거절 테스트: 큐잉 없이 즉시 거절된다
#[tokio::test]
async fn test_bid_requires_joined_session() {
    let (addr, _audit) = spawn_server().await;
    register_test_auction(addr, 1).await;

    let client = AuctionClient::connect(&ws_url(addr))
        .await
        .expect("접속 실패");

    // 인증 전 참여 시도
    let err = client
        .join_auction(1)
        .await
        .expect_err("인증 전 참여는 거절");
    assert!(matches!(err, ClientError::Server(_)));

    // 인증만 하고 참여하지 않은 채 입찰 시도
    client.authenticate("user-1").await.expect("인증 실패");
    let err = client
        .place_bid(1, 11_000)
        .await
        .expect_err("참여 전 입찰은 거절");
    assert!(matches!(err, ClientError::Server(_)));
}

/// 입찰과 브로드캐스트 테스트
#[tokio::test]
async fn test_place_bid_and_broadcast() {
    let (addr, _audit) = spawn_server().await;
    register_test_auction(addr, 1).await;

    let first = joined_client(addr, 1, 1).await;
    let second = joined_client(addr, 2, 1).await;

    let accepted = first.place_bid(1, 11_000).await.expect("입찰 실패");
    assert_eq!(accepted.sequence, 1);
    assert_eq!(accepted.current_price, 11_000);

    // 두 클라이언트 모두 권위 브로드캐스트로 같은 가격을 본다
    sleep(PROPAGATION).await;
    assert_eq!(first.view().current_price, 11_000);
    assert_eq!(second.view().current_price, 11_000);
    assert_eq!(second.view().total_bids, 1);

    // 증가분 미달 입찰은 열거형 코드로 거절된다
    let err = second
        .place_bid(1, 11_500)
        .await
        .expect_err("증가분 미달 입찰은 거절");
    assert!(matches!(
        err,
        ClientError::Rejected {
            reason: BidRejectReason::AmountTooLow
        }
    ));

    let accepted = second.place_bid(1, 12_000).await.expect("입찰 실패");
    assert_eq!(accepted.sequence, 2);

    sleep(PROPAGATION).await;
    assert_eq!(first.view().current_price, 12_000);
    assert_eq!(first.view().total_bids, 2);
}

/// 참여 스냅샷 테스트: 50건의 입찰 뒤에 참여해도 이벤트 재생이 필요 없다
#[tokio::test]
async fn test_join_snapshot_after_many_bids() {
    let (addr, _audit) = spawn_server().await;
    register_test_auction(addr, 1).await;

    let bidder = joined_client(addr, 1, 1).await;
    for i in 1..=50i64 {
        bidder
            .place_bid(1, 10_000 + i * 1_000)
            .await
            .expect("입찰 실패");
    }

    let late = joined_client(addr, 2, 1).await;
    sleep(PROPAGATION).await;
    let view = late.view();
    assert_eq!(view.total_bids, 50);
    assert_eq!(view.current_price, 60_000);

    // 입찰 이력은 최신순으로 조회된다
    let response = Client::new()
        .get(http_url(addr, "/auctions/1/bids"))
        .send()
        .await
        .expect("Failed to send request");
    let history: Vec<Value> = response.json().await.expect("응답 파싱 실패");
    assert_eq!(history.len(), 50);
    assert_eq!(history[0]["sequence"], 50);
    assert_eq!(history[49]["sequence"], 1);
}

/// 상태 관리 REST 테스트: 전이 테이블과 HTTP 코드
#[tokio::test]
async fn test_manage_status_endpoint() {
    let (addr, audit) = spawn_server().await;
    register_test_auction(addr, 1).await;
    let client = Client::new();

    // ACTIVE -> pause 허용
    let response = client
        .post(http_url(addr, "/auctions/1/manage-status"))
        .json(&json!({ "action": "pause", "reason": "점검" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.expect("응답 파싱 실패");
    assert_eq!(body["success"], true);
    assert_eq!(body["new_status"], "PAUSED");
    assert!(body["updated_at"].is_string());

    // PAUSED -> pause 거절: 현재 상태와 요청 액션이 그대로 내려간다
    let response = client
        .post(http_url(addr, "/auctions/1/manage-status"))
        .json(&json!({ "action": "pause" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.expect("응답 파싱 실패");
    assert_eq!(body["code"], "INVALID_TRANSITION");
    assert_eq!(body["current_status"], "PAUSED");
    assert_eq!(body["requested_action"], "pause");

    // PAUSED -> resume 허용
    let response = client
        .post(http_url(addr, "/auctions/1/manage-status"))
        .json(&json!({ "action": "resume" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 200);

    // 지원하지 않는 액션
    let response = client
        .post(http_url(addr, "/auctions/1/manage-status"))
        .json(&json!({ "action": "restart" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.expect("응답 파싱 실패");
    assert_eq!(body["code"], "INVALID_ACTION");

    // 없는 경매
    let response = client
        .post(http_url(addr, "/auctions/99/manage-status"))
        .json(&json!({ "action": "pause" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 404);

    // POST 전용 경로
    let response = client
        .get(http_url(addr, "/auctions/1/manage-status"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 405);

    // 적용된 전이 하나당 감사 기록 하나 (pause, resume)
    let entries = audit.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, LifecycleAction::Pause);
    assert_eq!(entries[0].reason.as_deref(), Some("점검"));
    assert_eq!(entries[1].action, LifecycleAction::Resume);
}

/// 경매 종료 브로드캐스트 테스트: 낙찰자와 최종 가격이 모든 구독자에게 전달된다
#[tokio::test]
async fn test_end_broadcasts_winner() {
    let (addr, _audit) = spawn_server().await;
    register_test_auction(addr, 1).await;

    let first = joined_client(addr, 1, 1).await;
    let second = joined_client(addr, 2, 1).await;

    first.place_bid(1, 11_000).await.expect("입찰 실패");
    second.place_bid(1, 12_000).await.expect("입찰 실패");

    let response = Client::new()
        .post(http_url(addr, "/auctions/1/manage-status"))
        .json(&json!({ "action": "end" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 200);

    sleep(PROPAGATION).await;
    for client in [&first, &second] {
        let view = client.view();
        assert_eq!(view.status, Some(AuctionStatus::Ended));
        assert_eq!(view.winner_id, Some(2));
        assert_eq!(view.final_price, Some(12_000));
    }

    // 종료된 경매의 카운트다운은 100% 로 고정된다
    let response = Client::new()
        .get(http_url(addr, "/auctions/1"))
        .send()
        .await
        .expect("Failed to send request");
    let body: Value = response.json().await.expect("응답 파싱 실패");
    assert_eq!(body["auction"]["status"], "ENDED");
    assert_eq!(body["countdown"]["progress_percent"], 100.0);
    assert_eq!(body["countdown"]["total_seconds"], 0);
}

/// 스케줄러 활성화 테스트: 시작 시각 도달 시 UPCOMING -> ACTIVE
#[tokio::test]
async fn test_scheduler_activates_upcoming_auction() {
    let (addr, _audit) = spawn_server().await;

    let response = Client::new()
        .post(http_url(addr, "/auctions"))
        .json(&json!({
            "id": 1,
            "starting_price": 10_000,
            "reserve_price": null,
            "min_increment": 1_000,
            "start_time": Utc::now() + chrono::Duration::seconds(2),
            "end_time": Utc::now() + chrono::Duration::hours(2),
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 201);

    let client = joined_client(addr, 1, 1).await;
    assert_eq!(client.view().status, Some(AuctionStatus::Upcoming));

    // 시작 전 입찰은 거절된다
    let err = client
        .place_bid(1, 11_000)
        .await
        .expect_err("시작 전 입찰은 거절");
    assert!(matches!(
        err,
        ClientError::Rejected {
            reason: BidRejectReason::AuctionNotActive
        }
    ));

    // 시작 시각이 지나면 스케줄러가 활성화한다
    sleep(Duration::from_secs(4)).await;
    assert_eq!(client.view().status, Some(AuctionStatus::Active));
    client.place_bid(1, 11_000).await.expect("입찰 실패");
}

/// 스케줄러 종료 테스트: 종료 시각 도달 시 낙찰 처리까지 동일 규칙을 따른다
#[tokio::test]
async fn test_scheduler_ends_expired_auction() {
    let (addr, audit) = spawn_server().await;

    let response = Client::new()
        .post(http_url(addr, "/auctions"))
        .json(&json!({
            "id": 1,
            "starting_price": 10_000,
            "reserve_price": null,
            "min_increment": 1_000,
            "start_time": Utc::now() - chrono::Duration::minutes(5),
            "end_time": Utc::now() + chrono::Duration::seconds(3),
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 201);

    let client = joined_client(addr, 5, 1).await;
    client.place_bid(1, 11_000).await.expect("입찰 실패");

    // 경매 종료 대기
    sleep(Duration::from_secs(5)).await;

    let view = client.view();
    assert_eq!(view.status, Some(AuctionStatus::Ended));
    assert_eq!(view.winner_id, Some(5));
    assert_eq!(view.final_price, Some(11_000));

    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor, "scheduler");
    assert_eq!(entries[0].action, LifecycleAction::End);
}

/// 참여자 수 테스트: 입장/퇴장/연결 종료가 남은 구독자에게 브로드캐스트된다
#[tokio::test]
async fn test_participant_counts() {
    let (addr, _audit) = spawn_server().await;
    register_test_auction(addr, 1).await;

    let first = joined_client(addr, 1, 1).await;
    sleep(PROPAGATION).await;
    assert_eq!(first.view().viewers_count, 1);

    let second = joined_client(addr, 2, 1).await;
    sleep(PROPAGATION).await;
    assert_eq!(first.view().viewers_count, 2);

    // 명시적 퇴장
    second.leave_auction(1).await.expect("퇴장 실패");
    sleep(PROPAGATION).await;
    assert_eq!(first.view().viewers_count, 1);

    // 연결 종료도 동일하게 정리된다
    let third = joined_client(addr, 3, 1).await;
    sleep(PROPAGATION).await;
    assert_eq!(first.view().viewers_count, 2);
    drop(third);
    sleep(PROPAGATION).await;
    assert_eq!(first.view().viewers_count, 1);
}

/// 응답 시간 초과와 단일 비행 입찰 테스트
/// 응답하지 않는 피어에 대해 제한 시간 내 정확히 한 건만 전송되고,
/// 시간 초과 후에는 재시도가 가능하다
#[tokio::test]
async fn test_reply_timeout_and_single_flight() {
    // 수신만 하고 절대 응답하지 않는 피어
    let silent = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("리스너 바인드 실패");
    let silent_addr = silent.local_addr().expect("로컬 주소 조회 실패");
    tokio::spawn(async move {
        while let Ok((stream, _)) = silent.accept().await {
            tokio::spawn(async move {
                if let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await {
                    while let Some(Ok(_)) = socket.next().await {}
                }
            });
        }
    });

    let mut client = AuctionClient::connect(&format!("ws://{}", silent_addr))
        .await
        .expect("접속 실패");
    client.set_reply_timeout(Duration::from_millis(300));
    let client = Arc::new(client);

    // 첫 입찰이 비행 중인 동안 두 번째 입찰은 서버 접촉 없이 즉시 거절된다
    let in_flight = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.place_bid(1, 11_000).await })
    };
    sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let err = client
        .place_bid(1, 12_000)
        .await
        .expect_err("비행 중 입찰은 즉시 거절");
    assert!(matches!(err, ClientError::AlreadyPlacing));
    assert!(started.elapsed() < Duration::from_millis(100));

    // 첫 입찰은 제한 시간 초과로 실패한다
    let err = in_flight
        .await
        .expect("태스크 실패")
        .expect_err("무응답 피어에 대한 입찰은 시간 초과");
    assert!(matches!(err, ClientError::Timeout));

    // 시간 초과 후에는 비행 슬롯이 비워져 재시도가 가능하다
    let err = client
        .place_bid(1, 13_000)
        .await
        .expect_err("재시도도 시간 초과");
    assert!(matches!(err, ClientError::Timeout));
}
