/// 경매별 원장 액터
/// 경매 하나의 가격/시퀀스 상태는 전용 액터 태스크 하나만 변경한다.
/// 커맨드는 도착 순서대로 하나씩 처리되므로 단조 증가 가격과
/// 빈틈 없는 시퀀스 불변식이 락 없이 보장된다.
/// 서로 다른 경매의 원장은 완전히 독립적으로 병렬 동작한다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::bidding::commands::{validate_bid, BidAccepted, BidRejectReason, PlaceBidCommand};
use crate::bidding::model::{Auction, AuctionSnapshot, AuctionStatus, Bid, RegisterAuction};
use crate::lifecycle::{apply_transition, AuditEntry, AuditSink, LifecycleAction, StateError};
use crate::topics::TopicHub;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

// endregion: --- Imports

// region:    --- Ledger Commands

/// 적용된 전이 결과
#[derive(Debug, Clone, Serialize)]
pub struct TransitionApplied {
    pub previous_status: AuctionStatus,
    pub new_status: AuctionStatus,
    pub updated_at: DateTime<Utc>,
}

/// 원장 액터로 전달되는 커맨드
pub enum LedgerCommand {
    PlaceBid {
        bidder_id: i64,
        amount: i64,
        reply: oneshot::Sender<Result<BidAccepted, BidRejectReason>>,
    },
    Transition {
        action: LifecycleAction,
        actor: String,
        reason: Option<String>,
        reply: oneshot::Sender<Result<TransitionApplied, StateError>>,
    },
    Snapshot {
        reply: oneshot::Sender<AuctionSnapshot>,
    },
    BidHistory {
        reply: oneshot::Sender<Vec<Bid>>,
    },
}

// endregion: --- Ledger Commands

// region:    --- Ledger Handle

/// 원장 액터에 커맨드를 보내는 핸들
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerCommand>,
}

impl LedgerHandle {
    /// 입찰 제출
    /// 제출 하나당 정확히 하나의 수락/거절 응답이 돌아온다
    pub async fn place_bid(&self, bidder_id: i64, amount: i64) -> Result<BidAccepted, BidRejectReason> {
        let (reply, rx) = oneshot::channel();
        let command = LedgerCommand::PlaceBid {
            bidder_id,
            amount,
            reply,
        };
        if self.tx.send(command).await.is_err() {
            return Err(BidRejectReason::AuctionNotFound);
        }
        rx.await.unwrap_or(Err(BidRejectReason::AuctionNotFound))
    }

    /// 상태 전이 요청
    /// 시간 기반 전이와 관리자 전이가 같은 큐로 직렬화되어, 경합에서 진 쪽은
    /// 이미 종결된 상태를 보고 StateError 를 받는다
    pub async fn transition(
        &self,
        action: LifecycleAction,
        actor: &str,
        reason: Option<String>,
    ) -> Result<TransitionApplied, StateError> {
        let (reply, rx) = oneshot::channel();
        let command = LedgerCommand::Transition {
            action,
            actor: actor.to_string(),
            reason,
            reply,
        };
        // 액터가 사라진 경매는 종결 상태로 취급한다
        let closed = StateError {
            current: AuctionStatus::Cancelled,
            requested: action,
        };
        if self.tx.send(command).await.is_err() {
            return Err(closed);
        }
        rx.await.unwrap_or(Err(closed))
    }

    /// 현재 전체 스냅샷 조회
    pub async fn snapshot(&self) -> Option<AuctionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(LedgerCommand::Snapshot { reply }).await.ok()?;
        rx.await.ok()
    }

    /// 수락된 입찰 이력 조회 (최신순)
    pub async fn bid_history(&self) -> Option<Vec<Bid>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(LedgerCommand::BidHistory { reply }).await.ok()?;
        rx.await.ok()
    }
}

// endregion: --- Ledger Handle

// region:    --- Ledger Router

/// 경매 등록 오류
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("이미 등록된 경매입니다: {0}")]
    Duplicate(i64),
    #[error("최소 증가분은 0보다 커야 합니다")]
    InvalidIncrement,
    #[error("시작 가격은 0 이상이어야 합니다")]
    InvalidStartingPrice,
}

/// 경매 id -> 원장 핸들 라우터
/// 등록 시 경매당 액터 하나를 기동하고, 모르는 id 는 AUCTION_NOT_FOUND 로 답한다
pub struct LedgerRouter {
    ledgers: Mutex<HashMap<i64, LedgerHandle>>,
    hub: Arc<TopicHub>,
    audit: Arc<dyn AuditSink>,
    next_bid_id: Arc<AtomicI64>,
}

impl LedgerRouter {
    pub fn new(hub: Arc<TopicHub>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            ledgers: Mutex::new(HashMap::new()),
            hub,
            audit,
            next_bid_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// 경매 개설: 전용 원장 액터를 기동한다
    pub fn open(&self, request: RegisterAuction) -> Result<(), OpenError> {
        if request.min_increment <= 0 {
            return Err(OpenError::InvalidIncrement);
        }
        if request.starting_price < 0 {
            return Err(OpenError::InvalidStartingPrice);
        }

        let auction = request.into_auction(Utc::now());
        let mut ledgers = self.ledgers.lock().expect("ledger lock poisoned");
        if ledgers.contains_key(&auction.id) {
            return Err(OpenError::Duplicate(auction.id));
        }

        info!(
            "{:<12} --> 경매 개설: auction={}, 시작가={}, 상태={:?}",
            "Ledger", auction.id, auction.starting_price, auction.status
        );

        let auction_id = auction.id;
        let handle = spawn_ledger(
            auction,
            Arc::clone(&self.hub),
            Arc::clone(&self.audit),
            Arc::clone(&self.next_bid_id),
        );
        ledgers.insert(auction_id, handle);
        Ok(())
    }

    /// 경매의 원장 핸들 조회
    pub fn handle(&self, auction_id: i64) -> Option<LedgerHandle> {
        self.ledgers
            .lock()
            .expect("ledger lock poisoned")
            .get(&auction_id)
            .cloned()
    }

    /// 개설된 경매 id 목록
    pub fn auction_ids(&self) -> Vec<i64> {
        self.ledgers
            .lock()
            .expect("ledger lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// 입찰 제출 라우팅
    pub async fn place_bid(&self, command: PlaceBidCommand) -> Result<BidAccepted, BidRejectReason> {
        let handle = self
            .handle(command.auction_id)
            .ok_or(BidRejectReason::AuctionNotFound)?;
        handle.place_bid(command.bidder_id, command.amount).await
    }
}

// endregion: --- Ledger Router

// region:    --- Ledger Actor

fn spawn_ledger(
    auction: Auction,
    hub: Arc<TopicHub>,
    audit: Arc<dyn AuditSink>,
    bid_ids: Arc<AtomicI64>,
) -> LedgerHandle {
    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut ledger = Ledger {
            auction,
            bids: Vec::new(),
            halted: false,
            hub,
            audit,
            bid_ids,
        };
        while let Some(command) = rx.recv().await {
            ledger.handle_command(command).await;
        }
    });
    LedgerHandle { tx }
}

/// 경매 하나의 권위 있는 상태
struct Ledger {
    auction: Auction,
    bids: Vec<Bid>,
    /// 원장 손상이 감지되면 수동 복구 전까지 이 경매의 변경을 중단한다
    halted: bool,
    hub: Arc<TopicHub>,
    audit: Arc<dyn AuditSink>,
    bid_ids: Arc<AtomicI64>,
}

impl Ledger {
    async fn handle_command(&mut self, command: LedgerCommand) {
        match command {
            LedgerCommand::PlaceBid {
                bidder_id,
                amount,
                reply,
            } => {
                let result = self.place_bid(bidder_id, amount);
                // 제출자 연결이 사라졌어도 수락된 입찰은 이미 커밋/브로드캐스트되었다
                let _ = reply.send(result);
            }
            LedgerCommand::Transition {
                action,
                actor,
                reason,
                reply,
            } => {
                let result = self.transition(action, &actor, reason).await;
                let _ = reply.send(result);
            }
            LedgerCommand::Snapshot { reply } => {
                let count = self.hub.participants_count(self.auction.id);
                let _ = reply.send(AuctionSnapshot::from_auction(&self.auction, count));
            }
            LedgerCommand::BidHistory { reply } => {
                let mut bids = self.bids.clone();
                bids.reverse();
                let _ = reply.send(bids);
            }
        }
    }

    /// 입찰 처리: 검증 -> 커밋 -> 브로드캐스트
    fn place_bid(&mut self, bidder_id: i64, amount: i64) -> Result<BidAccepted, BidRejectReason> {
        if self.halted {
            return Err(BidRejectReason::AuctionNotActive);
        }
        validate_bid(&self.auction, amount)?;

        let sequence = self.auction.total_bids + 1;

        // 단일 소유자 규칙이 지켜지는 한 도달할 수 없는 손상 검사
        if let Some(last) = self.bids.last() {
            if sequence <= last.sequence || amount <= last.amount {
                self.halted = true;
                error!(
                    "{:<12} --> 원장 손상 감지, 경매 {} 변경 중단: seq {} -> {}, price {} -> {}",
                    "Ledger", self.auction.id, last.sequence, sequence, last.amount, amount
                );
                return Err(BidRejectReason::AuctionNotActive);
            }
        }

        let bid = Bid {
            id: self.bid_ids.fetch_add(1, Ordering::Relaxed),
            auction_id: self.auction.id,
            bidder_id,
            amount,
            sequence,
            accepted_at: Utc::now(),
        };

        self.auction.total_bids = sequence;
        self.auction.current_price = amount;
        self.bids.push(bid.clone());

        info!(
            "{:<12} --> 입찰 수락: auction={}, seq={}, price={}",
            "Ledger", self.auction.id, sequence, amount
        );

        self.hub.publish(
            self.auction.id,
            AuctionEvent::BidPlaced {
                auction_id: self.auction.id,
                bid,
                current_price: self.auction.current_price,
                total_bids: self.auction.total_bids,
            },
        );

        Ok(BidAccepted {
            sequence,
            current_price: self.auction.current_price,
            total_bids: self.auction.total_bids,
        })
    }

    /// 상태 전이 적용
    /// end 에서는 최고 시퀀스 입찰이 낙찰된다 (원장 불변식에 의해 최고가이기도 하다)
    async fn transition(
        &mut self,
        action: LifecycleAction,
        actor: &str,
        reason: Option<String>,
    ) -> Result<TransitionApplied, StateError> {
        if self.halted {
            return Err(StateError {
                current: self.auction.status,
                requested: action,
            });
        }

        let previous = self.auction.status;
        let next = apply_transition(previous, action)?;
        let now = Utc::now();
        self.auction.status = next;

        if next == AuctionStatus::Ended {
            if let Some(winner) = self.bids.last() {
                self.auction.winner_id = Some(winner.bidder_id);
                self.auction.final_price = Some(winner.amount);
            }
        }

        let entry = AuditEntry {
            auction_id: self.auction.id,
            action,
            previous_status: previous,
            new_status: next,
            reason,
            actor: actor.to_string(),
            timestamp: now,
        };
        if let Err(e) = self.audit.append(entry).await {
            error!("{:<12} --> 감사 기록 실패: {}", "Ledger", e);
        }

        info!(
            "{:<12} --> 상태 전이: auction={}, {:?} -> {:?} ({})",
            "Ledger", self.auction.id, previous, next, actor
        );

        self.hub.publish(
            self.auction.id,
            AuctionEvent::StatusChanged {
                auction_id: self.auction.id,
                previous,
                status: next,
                changed_at: now,
            },
        );
        if next == AuctionStatus::Ended {
            self.hub.publish(
                self.auction.id,
                AuctionEvent::AuctionEnded {
                    auction_id: self.auction.id,
                    winner_id: self.auction.winner_id,
                    final_price: self.auction.final_price,
                },
            );
        }

        Ok(TransitionApplied {
            previous_status: previous,
            new_status: next,
            updated_at: now,
        })
    }
}

// endregion: --- Ledger Actor
