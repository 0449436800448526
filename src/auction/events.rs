use crate::bidding::model::{AuctionStatus, Bid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 경매 토픽으로 브로드캐스트되는 도메인 이벤트
/// 원장이 커밋한 순서 그대로 모든 구독자에게 전달된다
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum AuctionEvent {
    // 입찰 이벤트
    BidPlaced {
        auction_id: i64,
        bid: Bid,
        current_price: i64,
        total_bids: i64,
    },
    // 상태 전이 이벤트
    StatusChanged {
        auction_id: i64,
        previous: AuctionStatus,
        status: AuctionStatus,
        changed_at: DateTime<Utc>,
    },
    // 경매 종료 이벤트 (낙찰자 확정)
    AuctionEnded {
        auction_id: i64,
        winner_id: Option<i64>,
        final_price: Option<i64>,
    },
    // 참여자 입장 이벤트
    ParticipantJoined { auction_id: i64, count: i64 },
    // 참여자 퇴장 이벤트
    ParticipantLeft { auction_id: i64, count: i64 },
}
