/// 커넥션 게이트웨이
/// 연결마다 전용 태스크가 세션 상태 기계를 돌리고,
/// 입찰은 경매별 원장 액터로 넘겨 직렬화하고,
/// 토픽 이벤트는 연결별 전달 태스크로 팬아웃한다
// region:    --- Imports
use crate::bidding::commands::PlaceBidCommand;
use crate::bidding::ledger::LedgerRouter;
use crate::gateway::auth::IdentityVerifier;
use crate::gateway::protocol::{ClientMessage, ServerMessage};
use crate::topics::{TopicGuard, TopicHub};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod auth;
pub mod protocol;

// endregion: --- Imports

// region:    --- Session State

/// 연결 세션 상태 기계
/// Connected -> Authenticated -> Joined 순서로만 진행한다
enum SessionState {
    Connected,
    Authenticated {
        user_id: i64,
    },
    Joined {
        user_id: i64,
        auction_id: i64,
        /// 드롭되면 구독 해제와 참여자 수 감소가 자동으로 일어난다
        guard: TopicGuard,
        forward: JoinHandle<()>,
    },
}

// endregion: --- Session State

// region:    --- Connection Gateway

/// 연결별 발신 큐 크기
const OUTBOUND_CAPACITY: usize = 64;

pub struct ConnectionGateway {
    router: Arc<LedgerRouter>,
    hub: Arc<TopicHub>,
    verifier: Arc<dyn IdentityVerifier>,
    connection_ids: AtomicU64,
}

impl ConnectionGateway {
    pub fn new(
        router: Arc<LedgerRouter>,
        hub: Arc<TopicHub>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            router,
            hub,
            verifier,
            connection_ids: AtomicU64::new(1),
        }
    }

    pub fn router(&self) -> &Arc<LedgerRouter> {
        &self.router
    }

    /// 웹소켓 연결 하나를 전담 태스크로 처리한다
    pub async fn handle_socket(self: Arc<Self>, socket: WebSocket) {
        let connection_id = self.connection_ids.fetch_add(1, Ordering::Relaxed);
        info!("{:<12} --> 연결 시작: connection={}", "Gateway", connection_id);

        let (mut ws_tx, mut ws_rx) = socket.split();

        // 발신 큐: 읽기 루프와 브로드캐스트 전달 태스크가 같은 소켓 싱크를 공유한다
        let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);
        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let Ok(json) = serde_json::to_string(&message) else {
                    continue;
                };
                if ws_tx.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        });

        let mut session = SessionState::Connected;

        while let Some(Ok(message)) = ws_rx.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let client_message = match serde_json::from_str::<ClientMessage>(&text) {
                Ok(m) => m,
                Err(_) => {
                    let _ = out_tx
                        .send(ServerMessage::Error {
                            message: "잘못된 메시지 형식입니다".to_string(),
                        })
                        .await;
                    continue;
                }
            };

            session = self
                .dispatch(connection_id, session, client_message, &out_tx)
                .await;
        }

        // 연결 종료: Joined 상태였다면 가드 드롭이 구독 해제와 퇴장 브로드캐스트를 처리한다
        if let SessionState::Joined { forward, .. } = session {
            forward.abort();
        }
        drop(out_tx);
        let _ = writer.await;
        info!("{:<12} --> 연결 종료: connection={}", "Gateway", connection_id);
    }

    /// 세션 상태에 따라 클라이언트 메시지를 처리하고 다음 상태를 돌려준다
    async fn dispatch(
        &self,
        connection_id: u64,
        session: SessionState,
        message: ClientMessage,
        out_tx: &mpsc::Sender<ServerMessage>,
    ) -> SessionState {
        match message {
            ClientMessage::Authenticate { token } => match session {
                SessionState::Connected => match self.verifier.verify(&token).await {
                    Ok(user_id) => {
                        info!(
                            "{:<12} --> 인증 성공: connection={}, user={}",
                            "Gateway", connection_id, user_id
                        );
                        let _ = out_tx.send(ServerMessage::Authenticated { user_id }).await;
                        SessionState::Authenticated { user_id }
                    }
                    Err(e) => {
                        // 인증 실패 후에도 연결은 재시도 가능한 상태로 남는다
                        let _ = out_tx
                            .send(ServerMessage::AuthFailed {
                                message: e.to_string(),
                            })
                            .await;
                        SessionState::Connected
                    }
                },
                other => {
                    let _ = out_tx
                        .send(ServerMessage::Error {
                            message: "이미 인증된 연결입니다".to_string(),
                        })
                        .await;
                    other
                }
            },
            ClientMessage::JoinAuction { auction_id } => {
                self.join_auction(connection_id, session, auction_id, out_tx)
                    .await
            }
            ClientMessage::PlaceBid { auction_id, amount } => {
                match &session {
                    // 참여 중인 경매에 대해서만 입찰을 원장으로 넘긴다
                    SessionState::Joined {
                        user_id,
                        auction_id: joined,
                        ..
                    } if *joined == auction_id => {
                        let command = PlaceBidCommand {
                            auction_id,
                            bidder_id: *user_id,
                            amount,
                        };
                        match self.router.place_bid(command).await {
                            Ok(accepted) => {
                                let _ = out_tx
                                    .send(ServerMessage::BidAccepted {
                                        sequence: accepted.sequence,
                                        current_price: accepted.current_price,
                                        total_bids: accepted.total_bids,
                                    })
                                    .await;
                            }
                            Err(reason) => {
                                let _ = out_tx
                                    .send(ServerMessage::BidFailed {
                                        code: reason,
                                        message: reason.to_string(),
                                    })
                                    .await;
                            }
                        }
                    }
                    // 큐잉하지 않고 즉시 거절한다
                    _ => {
                        let _ = out_tx
                            .send(ServerMessage::Error {
                                message: "참여 중인 경매가 아닙니다".to_string(),
                            })
                            .await;
                    }
                }
                session
            }
            ClientMessage::LeaveAuction { auction_id } => match session {
                SessionState::Joined {
                    user_id,
                    auction_id: joined,
                    guard,
                    forward,
                } if joined == auction_id => {
                    forward.abort();
                    // 가드 드롭: 구독 해제 + 참여자 수 감소 + 퇴장 브로드캐스트
                    drop(guard);
                    SessionState::Authenticated { user_id }
                }
                other => {
                    let _ = out_tx
                        .send(ServerMessage::Error {
                            message: "참여 중인 경매가 아닙니다".to_string(),
                        })
                        .await;
                    other
                }
            },
        }
    }

    /// 경매 참여: 토픽 구독을 시작하고 전체 스냅샷으로 응답한다
    async fn join_auction(
        &self,
        connection_id: u64,
        session: SessionState,
        auction_id: i64,
        out_tx: &mpsc::Sender<ServerMessage>,
    ) -> SessionState {
        let user_id = match session {
            SessionState::Authenticated { user_id } => user_id,
            SessionState::Connected => {
                let _ = out_tx
                    .send(ServerMessage::Error {
                        message: "인증이 필요합니다".to_string(),
                    })
                    .await;
                return SessionState::Connected;
            }
            joined @ SessionState::Joined { .. } => {
                let _ = out_tx
                    .send(ServerMessage::Error {
                        message: "이미 경매에 참여 중입니다".to_string(),
                    })
                    .await;
                return joined;
            }
        };

        let Some(handle) = self.router.handle(auction_id) else {
            let _ = out_tx
                .send(ServerMessage::Error {
                    message: "경매를 찾을 수 없습니다".to_string(),
                })
                .await;
            return SessionState::Authenticated { user_id };
        };

        // 구독을 먼저 열어 스냅샷 이후에 커밋되는 이벤트를 놓치지 않는다
        let (guard, receiver) = Arc::clone(&self.hub).subscribe(auction_id);

        let Some(snapshot) = handle.snapshot().await else {
            let _ = out_tx
                .send(ServerMessage::Error {
                    message: "경매를 찾을 수 없습니다".to_string(),
                })
                .await;
            return SessionState::Authenticated { user_id };
        };

        info!(
            "{:<12} --> 경매 참여: connection={}, user={}, auction={}",
            "Gateway", connection_id, user_id, auction_id
        );

        let viewers_count = snapshot.participants_count;
        let _ = out_tx
            .send(ServerMessage::AuctionJoined {
                snapshot,
                viewers_count,
            })
            .await;
        let _ = out_tx
            .send(ServerMessage::ViewersCount {
                count: viewers_count,
            })
            .await;

        // 브로드캐스트 전달 태스크
        // 느린 연결은 자기 수신 버퍼가 밀려 이벤트를 놓칠 뿐, 다른 구독자의 전달을 막지 않는다
        let forward_tx = out_tx.clone();
        let forward = tokio::spawn(async move {
            let mut receiver = receiver;
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if forward_tx
                            .send(ServerMessage::from_event(event))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "{:<12} --> 구독자 지연으로 이벤트 {}개 유실: connection={}",
                            "Gateway", skipped, connection_id
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        SessionState::Joined {
            user_id,
            auction_id,
            guard,
            forward,
        }
    }
}

// endregion: --- Connection Gateway
