use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// 경매 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Upcoming,
    Active,
    Paused,
    Ended,
    Cancelled,
}

impl AuctionStatus {
    /// 종료/취소된 경매는 더 이상 변경할 수 없다
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuctionStatus::Ended | AuctionStatus::Cancelled)
    }
}

// 경매 모델
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: i64,
    pub status: AuctionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub starting_price: i64,
    pub reserve_price: Option<i64>,
    pub current_price: i64,
    pub min_increment: i64,
    pub total_bids: i64,
    pub winner_id: Option<i64>,
    pub final_price: Option<i64>,
}

// 입찰 모델
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub sequence: i64,
    pub accepted_at: DateTime<Utc>,
}

/// 경매 등록 요청
/// 상품/리스팅 관리 마이크로 서비스가 엔진에 경매를 넘겨줄 때 사용한다
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterAuction {
    pub id: i64,
    pub starting_price: i64,
    pub reserve_price: Option<i64>,
    pub min_increment: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl RegisterAuction {
    /// 등록 요청으로부터 경매 생성
    /// 시작 시간이 이미 지난 경매는 바로 ACTIVE 로 연다
    pub fn into_auction(self, now: DateTime<Utc>) -> Auction {
        let status = match self.start_time {
            Some(start) if start > now => AuctionStatus::Upcoming,
            _ => AuctionStatus::Active,
        };
        Auction {
            id: self.id,
            status,
            start_time: self.start_time,
            end_time: self.end_time,
            starting_price: self.starting_price,
            reserve_price: self.reserve_price,
            current_price: self.starting_price,
            min_increment: self.min_increment,
            total_bids: 0,
            winner_id: None,
            final_price: None,
        }
    }
}

/// 경매 전체 스냅샷
/// 새로 참여한 클라이언트가 이전 이벤트 없이도 올바른 상태를 갖도록
/// 항상 전체 뷰를 내려준다
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionSnapshot {
    pub auction_id: i64,
    pub status: AuctionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub starting_price: i64,
    pub reserve_price: Option<i64>,
    pub current_price: i64,
    pub min_increment: i64,
    pub total_bids: i64,
    pub participants_count: i64,
    pub winner_id: Option<i64>,
    pub final_price: Option<i64>,
}

impl AuctionSnapshot {
    pub fn from_auction(auction: &Auction, participants_count: i64) -> Self {
        Self {
            auction_id: auction.id,
            status: auction.status,
            start_time: auction.start_time,
            end_time: auction.end_time,
            starting_price: auction.starting_price,
            reserve_price: auction.reserve_price,
            current_price: auction.current_price,
            min_increment: auction.min_increment,
            total_bids: auction.total_bids,
            participants_count,
            winner_id: auction.winner_id,
            final_price: auction.final_price,
        }
    }
}
