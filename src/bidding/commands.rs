/// 입찰 커맨드와 사전 조건 검증
/// 커맨드는 경매별 원장 액터에서 하나씩 순서대로 처리된다
// region:    --- Imports
use crate::bidding::model::{Auction, AuctionStatus};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Commands

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
}

/// 입찰 수락 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidAccepted {
    pub sequence: i64,
    pub current_price: i64,
    pub total_bids: i64,
}

/// 입찰 거절 사유
/// 자유 서술이 아닌 열거형 코드로만 내려간다
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidRejectReason {
    #[error("경매를 찾을 수 없습니다")]
    AuctionNotFound,
    #[error("진행 중인 경매가 아닙니다")]
    AuctionNotActive,
    #[error("유효하지 않은 입찰 금액입니다")]
    MalformedAmount,
    #[error("입찰 금액이 최소 증가분에 미달합니다")]
    AmountTooLow,
}

/// 입찰 사전 조건 검증
/// 검증 순서: 경매 상태 -> 금액 형식 -> 최소 증가분
pub fn validate_bid(auction: &Auction, amount: i64) -> Result<(), BidRejectReason> {
    if auction.status != AuctionStatus::Active {
        return Err(BidRejectReason::AuctionNotActive);
    }
    if amount <= 0 {
        return Err(BidRejectReason::MalformedAmount);
    }
    if amount < auction.current_price + auction.min_increment {
        return Err(BidRejectReason::AmountTooLow);
    }
    Ok(())
}

// endregion: --- Commands
