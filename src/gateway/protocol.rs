/// 웹소켓 와이어 메시지
/// 모든 메시지는 type 필드로 태깅된 JSON 이다
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::bidding::commands::BidRejectReason;
use crate::bidding::model::{AuctionSnapshot, AuctionStatus, Bid};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Client -> Server

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Authenticate { token: String },
    JoinAuction { auction_id: i64 },
    PlaceBid { auction_id: i64, amount: i64 },
    LeaveAuction { auction_id: i64 },
}

// endregion: --- Client -> Server

// region:    --- Server -> Client

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Authenticated {
        user_id: i64,
    },
    AuthFailed {
        message: String,
    },
    /// 참여 응답은 항상 전체 스냅샷이다: 새 참여자는 이전 이벤트 없이도 올바른 상태를 가진다
    AuctionJoined {
        snapshot: AuctionSnapshot,
        viewers_count: i64,
    },
    /// 제출한 연결로 직접 돌아가는 수락 응답
    BidAccepted {
        sequence: i64,
        current_price: i64,
        total_bids: i64,
    },
    /// 모든 구독자에게 커밋 순서대로 팬아웃되는 입찰 브로드캐스트
    NewBid {
        bid: Bid,
        current_price: i64,
        total_bids: i64,
    },
    BidFailed {
        code: BidRejectReason,
        message: String,
    },
    ParticipantJoined {
        count: i64,
    },
    ParticipantLeft {
        count: i64,
    },
    ViewersCount {
        count: i64,
    },
    StatusChanged {
        previous: AuctionStatus,
        status: AuctionStatus,
    },
    AuctionEnded {
        winner_id: Option<i64>,
        final_price: Option<i64>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// 토픽 이벤트를 클라이언트 메시지로 변환
    pub fn from_event(event: AuctionEvent) -> Self {
        match event {
            AuctionEvent::BidPlaced {
                bid,
                current_price,
                total_bids,
                ..
            } => ServerMessage::NewBid {
                bid,
                current_price,
                total_bids,
            },
            AuctionEvent::StatusChanged {
                previous, status, ..
            } => ServerMessage::StatusChanged { previous, status },
            AuctionEvent::AuctionEnded {
                winner_id,
                final_price,
                ..
            } => ServerMessage::AuctionEnded {
                winner_id,
                final_price,
            },
            AuctionEvent::ParticipantJoined { count, .. } => {
                ServerMessage::ParticipantJoined { count }
            }
            AuctionEvent::ParticipantLeft { count, .. } => ServerMessage::ParticipantLeft { count },
        }
    }
}

// endregion: --- Server -> Client
