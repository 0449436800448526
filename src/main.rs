// region:    --- Imports
use bidding_service::bidding::ledger::LedgerRouter;
use bidding_service::gateway::auth::LocalTokenVerifier;
use bidding_service::gateway::ConnectionGateway;
use bidding_service::handlers;
use bidding_service::lifecycle::MemoryAuditSink;
use bidding_service::scheduler::AuctionScheduler;
use bidding_service::topics::TopicHub;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 토픽 허브와 감사 기록 저장소 생성
    let hub = Arc::new(TopicHub::new());
    let audit = Arc::new(MemoryAuditSink::new());

    // 경매별 원장 라우터 생성
    let router = Arc::new(LedgerRouter::new(Arc::clone(&hub), audit));
    info!("{:<12} --> 원장 라우터 초기화 성공", "Main");

    // 시간 기반 전이 스케줄러 시작
    let scheduler = AuctionScheduler::new(Arc::clone(&router));
    scheduler.start().await;
    info!("{:<12} --> 스케줄러 시작", "Main");

    // 게이트웨이 생성
    let gateway = Arc::new(ConnectionGateway::new(
        router,
        hub,
        Arc::new(LocalTokenVerifier),
    ));

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let routes_all = handlers::routes(gateway).layer(cors);

    // 리스너 생성
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
