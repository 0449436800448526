/// 경매 클라이언트 (낙관적 업데이트 추적기)
/// 로컬 뷰는 서버의 권위 이벤트로만 덮어쓰고 절대 병합하지 않는다.
/// 입찰은 연결당 한 번에 하나만 진행되며, Idle -> Pending -> Resolved/TimedOut
/// 비행 상태는 대기 슬롯의 점유 여부 그 자체로 표현된다.
// region:    --- Imports
use crate::bidding::commands::{BidAccepted, BidRejectReason};
use crate::bidding::model::{AuctionSnapshot, AuctionStatus};
use crate::gateway::protocol::{ClientMessage, ServerMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

// endregion: --- Imports

// region:    --- Client Error

/// 기본 응답 제한 시간
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("이미 입찰이 진행 중입니다")]
    AlreadyPlacing,
    #[error("응답 제한 시간을 초과했습니다")]
    Timeout,
    #[error("입찰 거절: {reason}")]
    Rejected { reason: BidRejectReason },
    #[error("인증 실패: {0}")]
    AuthFailed(String),
    #[error("서버 오류: {0}")]
    Server(String),
    #[error("연결 오류: {0}")]
    Connection(String),
    #[error("연결이 종료되었습니다")]
    Closed,
}

// endregion: --- Client Error

// region:    --- Local View

/// 서버 브로드캐스트로만 갱신되는 로컬 뷰
#[derive(Debug, Clone, Default)]
pub struct LocalView {
    pub status: Option<AuctionStatus>,
    pub current_price: i64,
    pub total_bids: i64,
    pub viewers_count: i64,
    pub winner_id: Option<i64>,
    pub final_price: Option<i64>,
}

// endregion: --- Local View

// region:    --- Auction Client

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// 권위 응답을 기다리는 대기 슬롯
/// bid 슬롯이 차 있는 동안은 새 입찰이 서버에 닿지 않고 즉시 거절된다
#[derive(Default)]
struct Pending {
    auth: Option<oneshot::Sender<Result<i64, ClientError>>>,
    join: Option<oneshot::Sender<Result<AuctionSnapshot, ClientError>>>,
    bid: Option<oneshot::Sender<Result<BidAccepted, ClientError>>>,
}

pub struct AuctionClient {
    sink: tokio::sync::Mutex<WsSink>,
    view: Arc<Mutex<LocalView>>,
    pending: Arc<Mutex<Pending>>,
    reader: JoinHandle<()>,
    reply_timeout: Duration,
}

impl AuctionClient {
    /// 서버 접속 및 수신 태스크 기동
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let (sink, mut source) = stream.split();

        let view = Arc::new(Mutex::new(LocalView::default()));
        let pending = Arc::new(Mutex::new(Pending::default()));

        let reader_view = Arc::clone(&view);
        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(Ok(message)) = source.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(server_message) => {
                        apply_server_message(&reader_view, &reader_pending, server_message)
                    }
                    Err(e) => warn!("{:<12} --> 서버 메시지 해석 실패: {}", "Client", e),
                }
            }
        });

        Ok(Self {
            sink: tokio::sync::Mutex::new(sink),
            view,
            pending,
            reader,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    /// 응답 제한 시간 조정 (테스트용)
    pub fn set_reply_timeout(&mut self, reply_timeout: Duration) {
        self.reply_timeout = reply_timeout;
    }

    /// 현재 로컬 뷰
    pub fn view(&self) -> LocalView {
        self.view.lock().expect("view lock poisoned").clone()
    }

    async fn send(&self, message: &ClientMessage) -> Result<(), ClientError> {
        let json =
            serde_json::to_string(message).map_err(|e| ClientError::Connection(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(json))
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))
    }

    /// 인증 요청, 서버 응답 대기
    pub async fn authenticate(&self, token: &str) -> Result<i64, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.pending.lock().expect("pending lock poisoned").auth = Some(reply);

        self.send(&ClientMessage::Authenticate {
            token: token.to_string(),
        })
        .await?;

        match timeout(self.reply_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                self.pending.lock().expect("pending lock poisoned").auth = None;
                Err(ClientError::Timeout)
            }
        }
    }

    /// 경매 참여, 전체 스냅샷 수신
    pub async fn join_auction(&self, auction_id: i64) -> Result<AuctionSnapshot, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.pending.lock().expect("pending lock poisoned").join = Some(reply);

        self.send(&ClientMessage::JoinAuction { auction_id }).await?;

        match timeout(self.reply_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                self.pending.lock().expect("pending lock poisoned").join = None;
                Err(ClientError::Timeout)
            }
        }
    }

    /// 입찰 제출
    /// 이미 입찰이 진행 중이면 서버에 접촉하지 않고 즉시 실패한다
    pub async fn place_bid(&self, auction_id: i64, amount: i64) -> Result<BidAccepted, ClientError> {
        let (reply, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().expect("pending lock poisoned");
            if pending.bid.is_some() {
                return Err(ClientError::AlreadyPlacing);
            }
            pending.bid = Some(reply);
        }

        if let Err(e) = self.send(&ClientMessage::PlaceBid { auction_id, amount }).await {
            self.pending.lock().expect("pending lock poisoned").bid = None;
            return Err(e);
        }

        match timeout(self.reply_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.lock().expect("pending lock poisoned").bid = None;
                Err(ClientError::Closed)
            }
            Err(_) => {
                // 시간 초과: 비행 슬롯을 비워 재시도를 허용한다.
                // 서버까지 도달한 제출은 그대로 완료되어 이후 new_bid 브로드캐스트로 반영된다.
                self.pending.lock().expect("pending lock poisoned").bid = None;
                Err(ClientError::Timeout)
            }
        }
    }

    /// 경매 떠나기
    pub async fn leave_auction(&self, auction_id: i64) -> Result<(), ClientError> {
        self.send(&ClientMessage::LeaveAuction { auction_id }).await
    }
}

impl Drop for AuctionClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// endregion: --- Auction Client

// region:    --- Reconciliation

/// 권위 이벤트를 로컬 뷰에 덮어쓰고 대기 중인 호출을 해소한다
fn apply_server_message(
    view: &Arc<Mutex<LocalView>>,
    pending: &Arc<Mutex<Pending>>,
    message: ServerMessage,
) {
    match message {
        ServerMessage::Authenticated { user_id } => {
            if let Some(reply) = pending.lock().expect("pending lock poisoned").auth.take() {
                let _ = reply.send(Ok(user_id));
            }
        }
        ServerMessage::AuthFailed { message } => {
            if let Some(reply) = pending.lock().expect("pending lock poisoned").auth.take() {
                let _ = reply.send(Err(ClientError::AuthFailed(message)));
            }
        }
        ServerMessage::AuctionJoined {
            snapshot,
            viewers_count,
        } => {
            {
                let mut view = view.lock().expect("view lock poisoned");
                view.status = Some(snapshot.status);
                view.current_price = snapshot.current_price;
                view.total_bids = snapshot.total_bids;
                view.viewers_count = viewers_count;
                view.winner_id = snapshot.winner_id;
                view.final_price = snapshot.final_price;
            }
            if let Some(reply) = pending.lock().expect("pending lock poisoned").join.take() {
                let _ = reply.send(Ok(snapshot));
            }
        }
        ServerMessage::BidAccepted {
            sequence,
            current_price,
            total_bids,
        } => {
            if let Some(reply) = pending.lock().expect("pending lock poisoned").bid.take() {
                let _ = reply.send(Ok(BidAccepted {
                    sequence,
                    current_price,
                    total_bids,
                }));
            }
        }
        ServerMessage::BidFailed { code, .. } => {
            if let Some(reply) = pending.lock().expect("pending lock poisoned").bid.take() {
                let _ = reply.send(Err(ClientError::Rejected { reason: code }));
            }
        }
        // 누가 올린 입찰이든 브로드캐스트가 항상 진실이다
        ServerMessage::NewBid {
            current_price,
            total_bids,
            ..
        } => {
            let mut view = view.lock().expect("view lock poisoned");
            view.current_price = current_price;
            view.total_bids = total_bids;
        }
        ServerMessage::ParticipantJoined { count }
        | ServerMessage::ParticipantLeft { count }
        | ServerMessage::ViewersCount { count } => {
            view.lock().expect("view lock poisoned").viewers_count = count;
        }
        ServerMessage::StatusChanged { status, .. } => {
            view.lock().expect("view lock poisoned").status = Some(status);
        }
        ServerMessage::AuctionEnded {
            winner_id,
            final_price,
        } => {
            let mut view = view.lock().expect("view lock poisoned");
            view.status = Some(AuctionStatus::Ended);
            view.winner_id = winner_id;
            view.final_price = final_price;
        }
        ServerMessage::Error { message } => {
            // 대기 중인 요청이 있으면 그쪽으로 전달한다
            let mut pending = pending.lock().expect("pending lock poisoned");
            if let Some(reply) = pending.join.take() {
                let _ = reply.send(Err(ClientError::Server(message)));
            } else if let Some(reply) = pending.bid.take() {
                let _ = reply.send(Err(ClientError::Server(message)));
            } else {
                debug!("{:<12} --> 서버 오류 수신: {}", "Client", message);
            }
        }
    }
}

// endregion: --- Reconciliation
