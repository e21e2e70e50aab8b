//! 연결 수락 루프
//!
//! 수신 소켓을 감시하며 새 연결을 구성하고, connect 통지를 발행한 뒤
//! 레지스트리에 등록합니다. 느린 상대 때문에 수락 경로가 막히지 않도록
//! 통지는 항상 비동기로 디스패치합니다.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::handler::{CallbackBudget, EventCallbacks};
use crate::service::connection::ClientConnection;
use crate::service::registry::ConnectionRegistry;
use crate::tool::ServerError;

/// 수락 루프 서비스
pub struct AcceptService {
    is_open: Arc<Mutex<bool>>,
    config: Arc<RwLock<ServerConfig>>,
    registry: Arc<ConnectionRegistry>,
    callbacks: Arc<EventCallbacks>,
    budget: Arc<CallbackBudget>,
}

impl AcceptService {
    /// 새 수락 서비스 생성
    pub fn new(
        is_open: Arc<Mutex<bool>>,
        config: Arc<RwLock<ServerConfig>>,
        registry: Arc<ConnectionRegistry>,
        callbacks: Arc<EventCallbacks>,
        budget: Arc<CallbackBudget>,
    ) -> Self {
        Self {
            is_open,
            config,
            registry,
            callbacks,
            budget,
        }
    }

    /// 수락 루프 본체
    ///
    /// 유휴 간격을 한도로 수신 연결을 기다리고, 루프 경계마다 열림
    /// 플래그를 확인합니다. 종료 시 태스크 중단은 조용히 처리됩니다.
    pub async fn run(self, listener: TcpListener) {
        info!("수락 루프 시작");

        while *self.is_open.lock().await {
            let idle = self.config.read().await.idle_time();

            match timeout(idle, listener.accept()).await {
                Err(_) => continue,
                Ok(Ok((stream, addr))) => {
                    self.handle_accept(stream, addr).await;
                }
                Ok(Err(e)) => {
                    if *self.is_open.lock().await {
                        self.callbacks
                            .emit_error(ServerError::accept(&e.to_string()))
                            .await;
                    }
                    tokio::time::sleep(idle).await;
                }
            }
        }

        info!("수락 루프 종료");
    }

    /// 수락된 소켓 처리: 연결 구성 → connect 통지 → 레지스트리 등록
    ///
    /// 레지스트리 등록이 통지 발행 뒤에 오므로, 같은 연결의 connect
    /// 통지는 어떤 data-available 통지보다도 먼저 발행됩니다.
    async fn handle_accept(&self, stream: tokio::net::TcpStream, addr: std::net::SocketAddr) {
        let encoding = self.config.read().await.encoding;
        let client_id = self.registry.next_client_id();
        let connection = Arc::new(ClientConnection::new(client_id, stream, addr, encoding));
        info!("새 클라이언트 연결: client_id={} ({})", client_id, addr);

        // connect 통지는 콜백 예산 상한을 적용받지 않는다
        if let Some(callback) = self.callbacks.connect().await {
            self.budget.acquire().await;
            if let Err(e) = connection.dispatch_callback(callback(connection.clone())).await {
                self.budget.release().await;
                self.callbacks.emit_error(e).await;
            }
        } else {
            debug!("connect 콜백 미등록: client_id={}", client_id);
        }

        self.registry.insert(connection).await;
    }
}
