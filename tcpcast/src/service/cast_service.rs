//! TCP 서버 엔진 메인 서비스
//!
//! 서버의 생명주기(open/close), 브로드캐스트 송신, 런타임 설정 변경,
//! 통지 콜백 등록 표면을 담당합니다.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::encoding::TextEncoding;
use crate::handler::{CallbackBudget, CallbackFuture, ConnectionCallback, ErrorCallback, EventCallbacks};
use crate::service::accept_service::AcceptService;
use crate::service::connection::ClientConnection;
use crate::service::dispatch_service::{DispatchService, WakeSignal};
use crate::service::registry::ConnectionRegistry;
use crate::tool::{ServerError, ServerResult};

/// 멀티 클라이언트 TCP 브로드캐스트 서버 엔진
///
/// 호스트 애플리케이션이 설정과 콜백만 공급해 구동하는 임베더블
/// 엔진입니다. `open()`이 수락 루프와 디스패치 루프를 띄우고,
/// `send()`는 등록된 모든 연결에 브로드캐스트를 큐잉하며,
/// connect/data/error 통지는 비동기로 전달됩니다.
pub struct TcpCastServer {
    config: Arc<RwLock<ServerConfig>>,
    is_open: Arc<Mutex<bool>>,
    registry: Arc<ConnectionRegistry>,
    callbacks: Arc<EventCallbacks>,
    budget: Arc<CallbackBudget>,
    wake: Arc<WakeSignal>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    dispatch_handle: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    started_at: Mutex<Option<(Instant, i64)>>,
}

impl TcpCastServer {
    /// 설정으로 새 서버 생성
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            is_open: Arc::new(Mutex::new(false)),
            registry: Arc::new(ConnectionRegistry::new()),
            callbacks: Arc::new(EventCallbacks::new()),
            budget: Arc::new(CallbackBudget::new()),
            wake: Arc::new(WakeSignal::new()),
            accept_handle: Mutex::new(None),
            dispatch_handle: Mutex::new(None),
            local_addr: Mutex::new(None),
            started_at: Mutex::new(None),
        }
    }

    /// 기본 설정으로 서버 생성 (포트 미설정 상태)
    pub fn with_default_config() -> Self {
        Self::new(ServerConfig::default())
    }

    /// 서버 열기
    ///
    /// 이미 열려 있으면 경고만 남기고 성공을 반환합니다. 포트가
    /// 설정되지 않았으면 설정 에러를 반환하며 상태는 바뀌지 않습니다.
    /// 리스너 바인드는 실패 시 한 번 재시도합니다.
    pub async fn open(&self) -> ServerResult<()> {
        let mut is_open = self.is_open.lock().await;
        if *is_open {
            warn!("서버가 이미 열려 있습니다");
            return Ok(());
        }

        let port = self
            .config
            .read()
            .await
            .port
            .ok_or(ServerError::PortNotConfigured)?;
        let listener = Self::bind_listener(port).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::internal("listener", &e.to_string()))?;

        *is_open = true;
        *self.local_addr.lock().await = Some(local_addr);
        *self.started_at.lock().await = Some((Instant::now(), chrono::Utc::now().timestamp()));

        info!("✅ TCP 서버가 {}에서 수신 대기 중입니다", local_addr);

        let accept = AcceptService::new(
            self.is_open.clone(),
            self.config.clone(),
            self.registry.clone(),
            self.callbacks.clone(),
            self.budget.clone(),
        );
        *self.accept_handle.lock().await = Some(tokio::spawn(accept.run(listener)));

        let dispatch = DispatchService::new(
            self.is_open.clone(),
            self.config.clone(),
            self.registry.clone(),
            self.callbacks.clone(),
            self.budget.clone(),
            self.wake.clone(),
        );
        *self.dispatch_handle.lock().await = Some(tokio::spawn(dispatch.run()));

        Ok(())
    }

    /// 서버 닫기
    ///
    /// 두 루프에 협조적 종료를 요청하고, 유예 시간 안에 끝나지 않은
    /// 루프는 대기 지점에서 강제로 풀어냅니다. 등록된 모든 연결을
    /// 강제 해제하고 레지스트리를 비웁니다. 실행 중인 통지 콜백은
    /// 기다리지 않으므로 종료 직후에도 통지가 도착할 수 있습니다.
    pub async fn close(&self) {
        {
            let mut is_open = self.is_open.lock().await;
            if !*is_open {
                return;
            }
            *is_open = false;
        }

        info!("🛑 서버 종료 중...");
        self.wake.rouse();

        let grace = self.config.read().await.shutdown_grace();
        let accept_handle = self.accept_handle.lock().await.take();
        let dispatch_handle = self.dispatch_handle.lock().await.take();
        Self::join_loop(accept_handle, grace).await;
        Self::join_loop(dispatch_handle, grace).await;

        for connection in self.registry.clear().await {
            connection.force_disconnect().await;
        }
        self.budget.reset().await;
        *self.local_addr.lock().await = None;

        info!("✅ 서버가 종료되었습니다");
    }

    /// 서버가 열려 있는지 여부
    pub async fn is_open(&self) -> bool {
        *self.is_open.lock().await
    }

    /// 텍스트를 등록된 모든 연결에 브로드캐스트
    ///
    /// 각 연결은 자신의 인코딩으로 텍스트를 변환해 큐잉합니다. 연결이
    /// 하나도 없으면 에러 통지만 발행하고 정상 반환합니다. 유휴 대기
    /// 중인 디스패치 루프가 있으면 즉시 깨웁니다.
    pub async fn send(&self, text: &str) {
        let connections = self.registry.snapshot().await;
        if connections.is_empty() {
            self.callbacks.emit_error(ServerError::NoConnections).await;
        }

        for connection in &connections {
            connection.send_text(text).await;
        }
        self.wake.rouse();
    }

    /// 바이트 페이로드를 등록된 모든 연결에 브로드캐스트
    pub async fn send_bytes(&self, payload: &[u8]) {
        let connections = self.registry.snapshot().await;
        if connections.is_empty() {
            self.callbacks.emit_error(ServerError::NoConnections).await;
        }

        for connection in &connections {
            connection.send_bytes(payload.to_vec()).await;
        }
        self.wake.rouse();
    }

    /// connect 통지 콜백 등록
    pub async fn on_connect<F, Fut>(&self, callback: F)
    where
        F: Fn(Arc<ClientConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ConnectionCallback =
            Arc::new(move |connection| -> CallbackFuture { Box::pin(callback(connection)) });
        self.callbacks.set_connect(callback).await;
    }

    /// data-available 통지 콜백 등록
    ///
    /// 통지를 받은 호스트는 `ClientConnection::read_available()`로
    /// 현재 쌓인 수신 바이트를 직접 비워야 합니다.
    pub async fn on_data_available<F, Fut>(&self, callback: F)
    where
        F: Fn(Arc<ClientConnection>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ConnectionCallback =
            Arc::new(move |connection| -> CallbackFuture { Box::pin(callback(connection)) });
        self.callbacks.set_data_available(callback).await;
    }

    /// 에러 통지 콜백 등록
    pub async fn on_error<F, Fut>(&self, callback: F)
    where
        F: Fn(ServerError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ErrorCallback =
            Arc::new(move |err| -> CallbackFuture { Box::pin(callback(err)) });
        self.callbacks.set_error(callback).await;
    }

    /// 수신 대기 포트 변경
    ///
    /// 서버가 열려 있는 동안에는 설정 에러가 반환되고 기존 포트로
    /// 계속 동작합니다.
    pub async fn set_port(&self, port: u16) -> ServerResult<()> {
        if *self.is_open.lock().await {
            return Err(ServerError::PortChangeWhileOpen);
        }
        self.config.write().await.port = Some(port);
        Ok(())
    }

    /// 유휴 간격 변경 (다음 루프 주기부터 적용)
    pub async fn set_idle_time_ms(&self, idle_time_ms: u64) {
        self.config.write().await.idle_time_ms = idle_time_ms;
    }

    /// 메시지당 최대 전송 시도 횟수 변경
    pub async fn set_max_send_attempts(&self, max_send_attempts: u32) {
        self.config.write().await.max_send_attempts = max_send_attempts;
    }

    /// 동시 데이터 콜백 권고 상한 변경
    pub async fn set_max_callback_tasks(&self, max_callback_tasks: usize) {
        self.config.write().await.max_callback_tasks = max_callback_tasks;
    }

    /// 생존 재검증 간격 변경
    pub async fn set_verify_interval_ms(&self, verify_interval_ms: u64) {
        self.config.write().await.verify_interval_ms = verify_interval_ms;
    }

    /// 기본 인코딩 변경
    ///
    /// 인코딩이 이전 기본값과 같은 모든 살아 있는 연결도 함께
    /// 새 인코딩으로 갱신됩니다.
    pub async fn set_encoding(&self, encoding: TextEncoding) {
        let previous = {
            let mut config = self.config.write().await;
            let previous = config.encoding;
            config.encoding = encoding;
            previous
        };

        for connection in self.registry.snapshot().await {
            if connection.encoding().await == previous {
                connection.set_encoding(encoding).await;
            }
        }
    }

    /// 기본 인코딩 변경 후 모든 살아 있는 연결을 일괄 갱신
    ///
    /// 연결별로 재지정된 인코딩도 덮어씁니다.
    pub async fn set_encoding_all(&self, encoding: TextEncoding) {
        self.config.write().await.encoding = encoding;
        for connection in self.registry.snapshot().await {
            connection.set_encoding(encoding).await;
        }
    }

    /// 현재 기본 인코딩
    pub async fn encoding(&self) -> TextEncoding {
        self.config.read().await.encoding
    }

    /// 설정된 포트
    pub async fn port(&self) -> Option<u16> {
        self.config.read().await.port
    }

    /// 현재 설정 스냅샷
    pub async fn config(&self) -> ServerConfig {
        self.config.read().await.clone()
    }

    /// 바인드된 로컬 주소 (열려 있는 동안에만 존재)
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// 현재 연결 수
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// 현재 연결들의 스냅샷
    pub async fn connections(&self) -> Vec<Arc<ClientConnection>> {
        self.registry.snapshot().await
    }

    /// 서버 통계 조회
    pub async fn server_stats(&self) -> ServerStats {
        let registry_stats = self.registry.stats().await;
        let started_at = *self.started_at.lock().await;

        ServerStats {
            is_open: self.is_open().await,
            port: self.port().await,
            connection_count: self.registry.len().await,
            active_callbacks: self.budget.active_count().await,
            total_connections: registry_stats.total_connections,
            peak_connections: registry_stats.peak_connections,
            evicted_connections: registry_stats.evicted_connections,
            uptime_seconds: started_at.map(|(instant, _)| instant.elapsed().as_secs()),
            started_at_timestamp: started_at.map(|(_, timestamp)| timestamp),
        }
    }

    /// 리스너 바인드. 실패하면 리스너를 새로 만들어 한 번 더 시도합니다.
    async fn bind_listener(port: u16) -> ServerResult<TcpListener> {
        let addr = format!("0.0.0.0:{}", port);
        match TcpListener::bind(addr.as_str()).await {
            Ok(listener) => Ok(listener),
            Err(first) => {
                warn!("리스너 바인드 실패, 한 번 재시도: {}", first);
                TcpListener::bind(addr.as_str()).await.map_err(|e| ServerError::Bind {
                    port,
                    message: e.to_string(),
                })
            }
        }
    }

    /// 루프 태스크 합류. 유예 시간을 넘기면 대기 지점에서 중단시킵니다.
    async fn join_loop(handle: Option<JoinHandle<()>>, grace: Duration) {
        let Some(mut handle) = handle else {
            return;
        };
        if timeout(grace, &mut handle).await.is_err() {
            warn!("루프가 유예 시간 안에 끝나지 않아 강제로 풀어냅니다");
            handle.abort();
            let _ = handle.await;
        }
    }
}

/// 서버 통계 정보
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServerStats {
    pub is_open: bool,
    pub port: Option<u16>,
    pub connection_count: usize,
    pub active_callbacks: usize,
    pub total_connections: u64,
    pub peak_connections: usize,
    pub evicted_connections: u64,
    pub uptime_seconds: Option<u64>,
    pub started_at_timestamp: Option<i64>,
}
