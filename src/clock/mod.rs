/// 경매 카운트다운/진행률 계산
/// 순수 함수: 동일한 입력이면 항상 동일한 결과를 내고 공유 상태가 없다
// region:    --- Imports
use crate::bidding::model::AuctionStatus;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

// endregion: --- Imports

// region:    --- Constants

/// ACTIVE 경매에서 종료 시각이 없거나 잘못된 경우의 폴백 지평(분)
const ACTIVE_FALLBACK_MINUTES: i64 = 120;
/// UPCOMING 경매에서 시작 시각이 없는 경우의 폴백 지평(분)
const UPCOMING_FALLBACK_MINUTES: i64 = 30;
/// 마감 임박 기준(초)
const URGENT_THRESHOLD_SECS: i64 = 300;
/// 진행 중인 경매는 0% 나 100% 를 보고하지 않는다
const ACTIVE_PROGRESS_FLOOR: f64 = 10.0;
const ACTIVE_PROGRESS_CEILING: f64 = 95.0;

// endregion: --- Constants

// region:    --- Countdown State

/// 카운트다운 상태
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CountdownState {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub total_seconds: i64,
    pub progress_percent: f64,
    pub is_urgent: bool,
    /// 타임스탬프가 없거나 잘못되어 폴백 지평으로 계산된 경우
    pub degraded: bool,
}

// endregion: --- Countdown State

// region:    --- Compute

/// 경매 상태와 시각으로부터 카운트다운 상태를 계산한다
pub fn compute(
    status: AuctionStatus,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CountdownState {
    match status {
        AuctionStatus::Ended | AuctionStatus::Cancelled => terminal_state(),
        AuctionStatus::Upcoming => upcoming_state(start_time, now),
        AuctionStatus::Active => running_state(start_time, end_time, now, true),
        // 일시정지 중에도 시간은 종료 시각을 향해 흐르지만 임박 표시는 하지 않는다
        AuctionStatus::Paused => running_state(start_time, end_time, now, false),
    }
}

/// 종결 상태: 잔여 시간 0, 진행률 100
fn terminal_state() -> CountdownState {
    CountdownState {
        hours: 0,
        minutes: 0,
        seconds: 0,
        total_seconds: 0,
        progress_percent: 100.0,
        is_urgent: false,
        degraded: false,
    }
}

/// UPCOMING: 시작 시각까지 카운트다운
/// 시작이 가까워질수록 0 에서 상한을 향해 차오르는 역램프.
/// 전이가 실제로 일어나기 전에는 100 에 도달하지 않는다.
fn upcoming_state(start_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CountdownState {
    let horizon = Duration::minutes(UPCOMING_FALLBACK_MINUTES);
    let (target, degraded) = match start_time {
        Some(start) => (start, false),
        None => (now + horizon, true),
    };

    let total_seconds = (target - now).num_seconds().max(0);
    let ramp = 1.0 - total_seconds as f64 / horizon.num_seconds() as f64;
    let progress_percent = (ramp * 100.0).clamp(0.0, ACTIVE_PROGRESS_CEILING);

    let (hours, minutes, seconds) = split_hms(total_seconds);
    CountdownState {
        hours,
        minutes,
        seconds,
        total_seconds,
        progress_percent,
        is_urgent: false,
        degraded,
    }
}

/// ACTIVE/PAUSED: 종료 시각까지 카운트다운, 진행률은 경과/전체
fn running_state(
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    urgency: bool,
) -> CountdownState {
    let fallback = Duration::minutes(ACTIVE_FALLBACK_MINUTES);
    let (target, degraded) = match (start_time, end_time) {
        // 종료가 시작보다 앞서는 입력은 잘못된 것으로 보고 폴백한다
        (Some(start), Some(end)) if end <= start => (now + fallback, true),
        (_, Some(end)) => (end, false),
        (_, None) => (now + fallback, true),
    };

    let total_seconds = (target - now).num_seconds().max(0);
    let total_duration = match start_time {
        Some(start) if !degraded => (target - start).num_seconds().max(1),
        _ => fallback.num_seconds(),
    };
    let elapsed = (total_duration - total_seconds).max(0);
    let progress_percent = (elapsed as f64 / total_duration as f64 * 100.0)
        .clamp(ACTIVE_PROGRESS_FLOOR, ACTIVE_PROGRESS_CEILING);

    let (hours, minutes, seconds) = split_hms(total_seconds);
    CountdownState {
        hours,
        minutes,
        seconds,
        total_seconds,
        progress_percent,
        is_urgent: urgency && total_seconds <= URGENT_THRESHOLD_SECS,
        degraded,
    }
}

fn split_hms(total_seconds: i64) -> (i64, i64, i64) {
    (
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60,
    )
}

// endregion: --- Compute
