/// 경매 상태 전이 스케줄러
/// 시작/종료 시각 도달에 따른 시간 기반 전이를 원장에 지시한다.
/// 관리자 명령과의 경합은 원장 액터의 커맨드 큐에서 직렬화되고,
/// 경합에서 진 쪽은 StateError 를 받고 재시도하지 않는다.
// region:    --- Imports
use crate::bidding::ledger::LedgerRouter;
use crate::bidding::model::AuctionStatus;
use crate::clock;
use crate::lifecycle::LifecycleAction;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::debug;

// endregion: --- Imports

// region:    --- Auction Scheduler

pub struct AuctionScheduler {
    router: Arc<LedgerRouter>,
}

impl AuctionScheduler {
    pub fn new(router: Arc<LedgerRouter>) -> Self {
        Self { router }
    }

    /// 스케줄러 시작 (1초 주기)
    pub async fn start(&self) {
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                Self::update_auction_statuses(&router).await;
            }
        });
    }

    /// 시각이 도달한 경매에 전이를 적용한다
    async fn update_auction_statuses(router: &LedgerRouter) {
        let now = Utc::now();
        for auction_id in router.auction_ids() {
            let Some(handle) = router.handle(auction_id) else {
                continue;
            };
            let Some(snapshot) = handle.snapshot().await else {
                continue;
            };

            let countdown = clock::compute(snapshot.status, snapshot.start_time, snapshot.end_time, now);
            // 타임스탬프가 없거나 잘못된 경매는 폴백 표시 지평으로만 돌고,
            // 시간 기반 전이 대상에서는 제외한다
            if countdown.degraded {
                continue;
            }

            // UPCOMING -> ACTIVE, ACTIVE -> ENDED
            let action = match snapshot.status {
                AuctionStatus::Upcoming if countdown.total_seconds == 0 => LifecycleAction::Activate,
                AuctionStatus::Active if countdown.total_seconds == 0 => LifecycleAction::End,
                _ => continue,
            };

            if let Err(e) = handle.transition(action, "scheduler", None).await {
                debug!(
                    "{:<12} --> 시간 기반 전이 경합 탈락: auction={}, {}",
                    "Scheduler", auction_id, e
                );
            }
        }
    }
}

// endregion: --- Auction Scheduler
