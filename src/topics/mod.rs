/// 경매별 브로드캐스트 토픽 허브
/// 외부 브로커 대신 프로세스 내 broadcast 채널로 팬아웃한다.
/// 발행은 베스트 에포트라 느리거나 죽은 구독자가 다른 구독자의 전달을 막지 못한다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

// endregion: --- Imports

// region:    --- Topic Hub

/// 토픽 채널 버퍼 크기: 이 수를 넘게 밀린 구독자는 이벤트를 놓친다
const TOPIC_CAPACITY: usize = 256;

struct Topic {
    sender: broadcast::Sender<AuctionEvent>,
    participants: i64,
}

/// 경매 id 별 토픽과 참여자 수를 관리한다
/// 참여자 수는 join/leave/disconnect 에서만 변한다
#[derive(Default)]
pub struct TopicHub {
    topics: Mutex<HashMap<i64, Topic>>,
}

impl TopicHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 경매 토픽 구독
    /// 반환된 가드가 드롭되면 구독 해제와 참여자 수 감소, 퇴장 브로드캐스트가 자동으로 일어난다
    pub fn subscribe(
        self: Arc<Self>,
        auction_id: i64,
    ) -> (TopicGuard, broadcast::Receiver<AuctionEvent>) {
        let (receiver, count) = {
            let mut topics = self.topics.lock().expect("topic lock poisoned");
            let topic = topics.entry(auction_id).or_insert_with(|| {
                let (sender, _) = broadcast::channel(TOPIC_CAPACITY);
                Topic {
                    sender,
                    participants: 0,
                }
            });
            topic.participants += 1;
            (topic.sender.subscribe(), topic.participants)
        };

        self.publish(auction_id, AuctionEvent::ParticipantJoined { auction_id, count });

        let guard = TopicGuard {
            hub: self,
            auction_id,
        };
        (guard, receiver)
    }

    /// 토픽으로 이벤트 발행
    pub fn publish(&self, auction_id: i64, event: AuctionEvent) {
        let topics = self.topics.lock().expect("topic lock poisoned");
        if let Some(topic) = topics.get(&auction_id) {
            // 구독자가 없으면 send 가 실패하지만 발행자는 신경 쓰지 않는다
            let _ = topic.sender.send(event);
        }
    }

    /// 현재 참여자 수
    pub fn participants_count(&self, auction_id: i64) -> i64 {
        self.topics
            .lock()
            .expect("topic lock poisoned")
            .get(&auction_id)
            .map(|topic| topic.participants)
            .unwrap_or(0)
    }

    fn unsubscribe(&self, auction_id: i64) -> i64 {
        let mut topics = self.topics.lock().expect("topic lock poisoned");
        match topics.get_mut(&auction_id) {
            Some(topic) => {
                topic.participants = (topic.participants - 1).max(0);
                topic.participants
            }
            None => 0,
        }
    }
}

// endregion: --- Topic Hub

// region:    --- Topic Guard

/// RAII 구독 가드
/// 소유한 연결/세션이 끝나면 드롭만으로 리스너가 정리되어 재접속 시 리스너 누수가 없다
pub struct TopicGuard {
    hub: Arc<TopicHub>,
    auction_id: i64,
}

impl TopicGuard {
    pub fn auction_id(&self) -> i64 {
        self.auction_id
    }
}

impl Drop for TopicGuard {
    fn drop(&mut self) {
        let count = self.hub.unsubscribe(self.auction_id);
        self.hub.publish(
            self.auction_id,
            AuctionEvent::ParticipantLeft {
                auction_id: self.auction_id,
                count,
            },
        );
        debug!(
            "{:<12} --> 구독 해제: auction={}, 남은 참여자={}",
            "TopicHub", self.auction_id, count
        );
    }
}

// endregion: --- Topic Guard
