//! 클라이언트 연결 관리
//!
//! 소켓별 상태를 담당합니다: 송신 대기열과 재시도 카운터, 생존 확인
//! 타임스탬프, 단일 콜백 슬롯, 연결별 인코딩.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use crate::encoding::TextEncoding;
use crate::handler::CallbackFuture;
use crate::tool::{ServerError, ServerResult};

/// 읽기 가능 여부를 살피는 논블로킹 탐침의 대기 한도
const PROBE_WINDOW: Duration = Duration::from_millis(1);

/// 수신 버퍼 초기 크기
const READ_CHUNK: usize = 4096;

/// 송신 대기열
///
/// FIFO 순서의 바이트 페이로드 목록과, 항상 선두 메시지에만 적용되는
/// 재시도 카운터를 함께 관리합니다. 선두가 제거되면(전송 성공이든
/// 시도 횟수 소진이든) 카운터는 0으로 돌아갑니다.
#[derive(Debug, Default)]
pub struct OutgoingQueue {
    messages: VecDeque<Vec<u8>>,
    attempts: u32,
    dropped: u64,
}

impl OutgoingQueue {
    /// 빈 대기열 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 페이로드를 대기열 끝에 추가
    pub fn push(&mut self, payload: Vec<u8>) {
        self.messages.push_back(payload);
    }

    /// 선두 페이로드 복사본
    pub fn front_cloned(&self) -> Option<Vec<u8>> {
        self.messages.front().cloned()
    }

    /// 전송 성공한 선두를 제거하고 카운터를 초기화
    pub fn pop_delivered(&mut self) {
        self.messages.pop_front();
        self.attempts = 0;
    }

    /// 일시적 전송 실패를 기록합니다.
    ///
    /// 시도 횟수가 `max_attempts`에 도달하면 선두를 그대로 버리고
    /// 카운터를 초기화합니다. 메시지가 버려졌으면 true를 반환합니다.
    pub fn record_failure(&mut self, max_attempts: u32) -> bool {
        self.attempts += 1;
        if self.attempts >= max_attempts {
            self.messages.pop_front();
            self.attempts = 0;
            self.dropped += 1;
            return true;
        }
        false
    }

    /// 대기열 비우기 (연결 해제 시 미전송분 폐기)
    pub fn clear(&mut self) {
        self.messages.clear();
        self.attempts = 0;
    }

    /// 대기 중인 메시지 수
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// 대기열이 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 현재 선두에 기록된 시도 횟수
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// 시도 횟수 소진으로 버려진 메시지 누계
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// 개별 클라이언트 연결
///
/// 수락 루프가 생성하고, 디스패치 루프가 연결 해제를 관찰하거나
/// 서버가 닫힐 때까지 레지스트리에 머무릅니다. 콜백에는
/// `Arc<ClientConnection>`으로 노출되며, 호스트는 송신 enqueue와
/// 수신 가능 바이트 읽기만 수행해야 합니다.
#[derive(Debug)]
pub struct ClientConnection {
    client_id: u64,
    addr: SocketAddr,
    stream: Mutex<Option<TcpStream>>,
    outgoing: Mutex<OutgoingQueue>,
    last_verify: Mutex<Instant>,
    encoding: Mutex<TextEncoding>,
    callback_task: Mutex<Option<JoinHandle<()>>>,
    connected: AtomicBool,
    connected_at: Instant,
}

impl ClientConnection {
    /// 수락된 소켓으로 새 연결 생성
    pub fn new(client_id: u64, stream: TcpStream, addr: SocketAddr, encoding: TextEncoding) -> Self {
        Self {
            client_id,
            addr,
            stream: Mutex::new(Some(stream)),
            outgoing: Mutex::new(OutgoingQueue::new()),
            last_verify: Mutex::new(Instant::now()),
            encoding: Mutex::new(encoding),
            callback_task: Mutex::new(None),
            connected: AtomicBool::new(true),
            connected_at: Instant::now(),
        }
    }

    /// 클라이언트 식별자
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// 상대 주소
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 연결 유지 시간 (초)
    pub fn uptime_seconds(&self) -> u64 {
        self.connected_at.elapsed().as_secs()
    }

    /// 연결별 인코딩
    pub async fn encoding(&self) -> TextEncoding {
        *self.encoding.lock().await
    }

    /// 연결별 인코딩 재지정
    pub async fn set_encoding(&self, encoding: TextEncoding) {
        *self.encoding.lock().await = encoding;
    }

    /// 소켓이 살아 있다고 보고하는지 (빠른 경로)
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 텍스트를 연결별 인코딩으로 변환해 송신 대기열에 추가
    pub async fn send_text(&self, text: &str) {
        let payload = self.encoding.lock().await.encode(text);
        self.send_bytes(payload).await;
    }

    /// 바이트 페이로드를 송신 대기열에 추가
    pub async fn send_bytes(&self, payload: Vec<u8>) {
        self.outgoing.lock().await.push(payload);
    }

    /// 대기 중인 송신 메시지 수
    pub async fn pending_outgoing(&self) -> usize {
        self.outgoing.lock().await.len()
    }

    /// 시도 횟수 소진으로 버려진 메시지 누계
    pub async fn dropped_messages(&self) -> u64 {
        self.outgoing.lock().await.dropped()
    }

    /// 송신 대기열 처리
    ///
    /// 선두 메시지 하나를 전송 시도하고, 대기열에 작업이 남아 있는지
    /// 반환합니다. 소켓이 끊겼으면 대기열 전체를 폐기합니다.
    pub async fn process_outgoing(&self, max_attempts: u32) -> bool {
        let mut stream_guard = self.stream.lock().await;
        let stream = match stream_guard.as_mut() {
            Some(stream) if self.is_connected() => stream,
            _ => {
                self.outgoing.lock().await.clear();
                return false;
            }
        };

        let head = match self.outgoing.lock().await.front_cloned() {
            Some(head) => head,
            None => return false,
        };

        match stream.write_all(&head).await {
            Ok(()) => {
                self.outgoing.lock().await.pop_delivered();
            }
            Err(e) if is_fatal_stream_error(&e) => {
                debug!("스트림 종료로 소켓 폐기: client_id={} ({})", self.client_id, e);
                self.connected.store(false, Ordering::SeqCst);
                *stream_guard = None;
                return false;
            }
            Err(e) => {
                let mut outgoing = self.outgoing.lock().await;
                debug!(
                    "전송 실패 (시도 {}/{}): client_id={} ({})",
                    outgoing.attempts() + 1,
                    max_attempts,
                    self.client_id,
                    e
                );
                if outgoing.record_failure(max_attempts) {
                    warn!(
                        "재시도 한도 초과, 메시지 폐기: client_id={} (누계 {})",
                        self.client_id,
                        outgoing.dropped()
                    );
                }
            }
        }

        !self.outgoing.lock().await.is_empty()
    }

    /// 마지막 생존 확인이 검증 간격 이내인지 여부
    pub async fn verified_recently(&self, verify_interval: Duration) -> bool {
        self.last_verify.lock().await.elapsed() < verify_interval
    }

    /// 능동 생존 확인
    ///
    /// 읽을 바이트가 이미 있으면 살아 있는 것이고, 없으면 읽기 가능
    /// 조건을 탐침합니다. 탐침에 걸리지 않으면 상대가 반쯤 닫지 않은
    /// 것이므로 살아 있다고 판단하고, 걸렸으면 탐침과 해석 사이의
    /// 경합을 막기 위해 수신 바이트를 한 번 더 확인한 뒤에야 끊겼다고
    /// 결론 냅니다. 결과와 무관하게 확인 시각을 갱신합니다.
    pub async fn verify_connected(&self) -> bool {
        let connected = self.pending_input().await
            || !self.poll_readable().await
            || self.pending_input().await;
        *self.last_verify.lock().await = Instant::now();
        connected
    }

    /// 마지막 생존 확인 시각
    pub async fn last_verify(&self) -> Instant {
        *self.last_verify.lock().await
    }

    /// 소켓에 읽지 않은 수신 바이트가 있는지 논블로킹으로 확인
    pub async fn pending_input(&self) -> bool {
        let guard = self.stream.lock().await;
        let Some(stream) = guard.as_ref() else {
            return false;
        };

        let mut probe = [0u8; 1];
        match timeout(PROBE_WINDOW, stream.peek(&mut probe)).await {
            Ok(Ok(n)) => n > 0,
            Ok(Err(_)) => false,
            Err(_) => false,
        }
    }

    /// 읽기 가능(데이터 또는 EOF) 조건이 관찰되는지 탐침
    async fn poll_readable(&self) -> bool {
        let guard = self.stream.lock().await;
        let Some(stream) = guard.as_ref() else {
            return true;
        };

        match timeout(PROBE_WINDOW, stream.ready(Interest::READABLE)).await {
            Ok(Ok(ready)) => ready.is_readable() || ready.is_read_closed(),
            Ok(Err(_)) => true,
            Err(_) => false,
        }
    }

    /// 현재 수신 버퍼에 쌓인 바이트를 논블로킹으로 모두 읽어 반환
    ///
    /// data-available 통지를 받은 호스트가 호출합니다. 엔진은 수신
    /// 바이트를 따로 버퍼링하지 않습니다.
    pub async fn read_available(&self) -> Vec<u8> {
        let guard = self.stream.lock().await;
        let Some(stream) = guard.as_ref() else {
            return Vec::new();
        };

        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        loop {
            match stream.try_read_buf(&mut buf) {
                Ok(0) => {
                    self.connected.store(false, Ordering::SeqCst);
                    break;
                }
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => {
                    self.connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
        buf.to_vec()
    }

    /// 수신 바이트를 연결별 인코딩으로 복원해 반환
    pub async fn read_available_text(&self) -> String {
        let bytes = self.read_available().await;
        self.encoding.lock().await.decode(&bytes)
    }

    /// 통지 콜백을 이 연결의 슬롯에서 실행
    ///
    /// 이전 콜백이 아직 실행 중이면 계약 위반으로 실패하며, 퓨처는
    /// 실행되지 않습니다.
    pub async fn dispatch_callback(&self, callback: CallbackFuture) -> ServerResult<()> {
        let mut slot = self.callback_task.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                return Err(ServerError::CallbackSlotBusy {
                    client_id: self.client_id,
                });
            }
        }
        *slot = Some(tokio::spawn(callback));
        Ok(())
    }

    /// 완료된 콜백 슬롯을 회수합니다. 회수했으면 true를 반환합니다.
    pub async fn try_reclaim_callback(&self) -> bool {
        let mut slot = self.callback_task.lock().await;
        match slot.as_ref() {
            Some(handle) if handle.is_finished() => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// 콜백이 아직 실행 중인지 여부
    pub async fn callback_in_flight(&self) -> bool {
        matches!(self.callback_task.lock().await.as_ref(), Some(handle) if !handle.is_finished())
    }

    /// 이 연결에 처리할 작업이 남아 있는지 (송신 대기분 또는
    /// 콜백 슬롯이 빈 상태에서의 수신 대기 바이트)
    pub async fn has_more_work(&self) -> bool {
        if !self.outgoing.lock().await.is_empty() {
            return true;
        }
        !self.callback_in_flight().await && self.pending_input().await
    }

    /// 강제 연결 해제: 소켓을 닫고 송신 대기열을 폐기합니다.
    pub async fn force_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        {
            let mut stream = self.stream.lock().await;
            *stream = None;
        }
        self.outgoing.lock().await.clear();
    }
}

/// 복구 불가능한 스트림 에러인지 분류
///
/// 이 계열은 재시도 대상이 아니라 소켓 폐기 대상입니다.
fn is_fatal_stream_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}
