/// 경매 생애주기 전이 규칙과 감사 기록
/// 전이는 경매별 원장 액터 안에서 직렬화되어 적용된다
// region:    --- Imports
use crate::bidding::model::AuctionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

// endregion: --- Imports

// region:    --- Lifecycle Action

/// 상태 전이 액션
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Activate,
    Pause,
    Resume,
    End,
    Cancel,
}

impl LifecycleAction {
    /// 관리자 요청 문자열 파싱
    /// activate 는 시간 기반 내부 전이 전용이라 관리자 표면에서는 받지 않는다
    pub fn from_admin_action(action: &str) -> Option<Self> {
        match action {
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "end" => Some(Self::End),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

// endregion: --- Lifecycle Action

// region:    --- Transition Table

/// 허용되지 않는 전이 오류
/// 현재 상태와 요청된 액션을 그대로 담아 돌려준다
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("현재 {current:?} 상태에서 {requested:?} 전이는 허용되지 않습니다")]
pub struct StateError {
    pub current: AuctionStatus,
    pub requested: LifecycleAction,
}

/// 전이 테이블 적용
/// 허용되지 않는 전이는 어떤 상태 변경도 없이 StateError 로 거절된다
pub fn apply_transition(
    current: AuctionStatus,
    action: LifecycleAction,
) -> Result<AuctionStatus, StateError> {
    use AuctionStatus::*;
    use LifecycleAction::*;

    let next = match (current, action) {
        (Upcoming, Activate) => Active,
        (Upcoming, Cancel) => Cancelled,
        (Active, Pause) => Paused,
        (Active, End) => Ended,
        (Active, Cancel) => Cancelled,
        (Paused, Resume) => Active,
        (Paused, End) => Ended,
        (Paused, Cancel) => Cancelled,
        // 종결 상태(ENDED/CANCELLED)에서는 어떤 액션도 허용되지 않는다
        _ => {
            return Err(StateError {
                current,
                requested: action,
            })
        }
    };
    Ok(next)
}

// endregion: --- Transition Table

// region:    --- Audit

/// 적용된 전이 하나당 하나씩 남는 불변 감사 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub auction_id: i64,
    pub action: LifecycleAction,
    pub previous_status: AuctionStatus,
    pub new_status: AuctionStatus,
    pub reason: Option<String>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

/// 감사 기록 저장소 트레이트
/// 내구성 있는 저장은 별도 저장소 마이크로서비스가 담당한다 가정
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), String>;
}

/// 인메모리 감사 기록 저장소 (개발/테스트용)
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기록된 감사 항목 전체
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<(), String> {
        info!(
            "{:<12} --> 감사 기록: auction={}, {:?} -> {:?} ({})",
            "Audit", entry.auction_id, entry.previous_status, entry.new_status, entry.actor
        );
        self.entries.lock().map_err(|e| e.to_string())?.push(entry);
        Ok(())
    }
}

// endregion: --- Audit
