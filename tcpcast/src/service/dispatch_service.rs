//! 디스패치 루프
//!
//! 주기마다 레지스트리 스냅샷을 순회하며 완료된 콜백 슬롯을 회수하고,
//! 연결 생존을 검증하고, 송신 대기열을 소진하고, data-available 통지를
//! 발행하고, 끊긴 연결을 퇴출합니다. 할 일이 없으면 깨움 신호 위에서
//! 유휴 간격만큼 대기합니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::handler::{CallbackBudget, EventCallbacks};
use crate::service::connection::ClientConnection;
use crate::service::registry::ConnectionRegistry;
use crate::tool::ServerResult;

/// 깨움 신호
///
/// `send()`가 유휴 대기 중인 디스패치 루프를 즉시 깨울 수 있게 하는
/// 경량 신호입니다. 대기 중임을 기록하는 플래그와 함께 동작하며,
/// 신호가 대기보다 먼저 도착해도 허가가 보존됩니다.
#[derive(Default)]
pub struct WakeSignal {
    notify: Notify,
    waiting: AtomicBool,
}

impl WakeSignal {
    /// 새 깨움 신호 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 신호가 오거나 한도 시간이 지날 때까지 대기
    pub async fn park(&self, limit: Duration) {
        self.waiting.store(true, Ordering::SeqCst);
        let _ = timeout(limit, self.notify.notified()).await;
        self.waiting.store(false, Ordering::SeqCst);
    }

    /// 대기 중인 루프가 있으면 논블로킹으로 깨움
    pub fn rouse(&self) {
        if self.waiting.swap(false, Ordering::SeqCst) {
            self.notify.notify_one();
        }
    }

    /// 루프가 유휴 대기 중인지 여부
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }
}

/// 디스패치 루프 서비스
pub struct DispatchService {
    is_open: Arc<Mutex<bool>>,
    config: Arc<RwLock<ServerConfig>>,
    registry: Arc<ConnectionRegistry>,
    callbacks: Arc<EventCallbacks>,
    budget: Arc<CallbackBudget>,
    wake: Arc<WakeSignal>,
}

impl DispatchService {
    /// 새 디스패치 서비스 생성
    pub fn new(
        is_open: Arc<Mutex<bool>>,
        config: Arc<RwLock<ServerConfig>>,
        registry: Arc<ConnectionRegistry>,
        callbacks: Arc<EventCallbacks>,
        budget: Arc<CallbackBudget>,
        wake: Arc<WakeSignal>,
    ) -> Self {
        Self {
            is_open,
            config,
            registry,
            callbacks,
            budget,
            wake,
        }
    }

    /// 디스패치 루프 본체
    ///
    /// 주기 중 발생한 에러는 에러 통지 채널로 보내고 루프는 계속됩니다.
    pub async fn run(self) {
        info!("디스패치 루프 시작");

        while *self.is_open.lock().await {
            if let Err(e) = self.pass().await {
                if *self.is_open.lock().await {
                    self.callbacks.emit_error(e).await;
                }
            }
        }

        info!("디스패치 루프 종료");
    }

    /// 레지스트리 한 바퀴 순회
    async fn pass(&self) -> ServerResult<()> {
        let (max_attempts, verify_interval, max_callback_tasks) = {
            let config = self.config.read().await;
            (
                config.max_send_attempts,
                config.verify_interval(),
                config.max_callback_tasks,
            )
        };

        let mut more_work = false;
        for connection in self.registry.snapshot().await {
            // 1. 완료된 콜백 슬롯 회수, 실행 중이면 이번 주기는 건너뜀
            if connection.try_reclaim_callback().await {
                self.budget.release().await;
            }
            if connection.callback_in_flight().await {
                continue;
            }

            // 2. 생존한 연결은 처리, 아니면 3. 퇴출
            if connection.is_connected()
                && (connection.verified_recently(verify_interval).await
                    || connection.verify_connected().await)
            {
                if self
                    .process_connection(&connection, max_attempts, max_callback_tasks)
                    .await?
                {
                    more_work = true;
                }
            } else {
                self.registry.remove(connection.client_id()).await;
                connection.force_disconnect().await;
                debug!("끊긴 연결 퇴출: client_id={}", connection.client_id());
            }
        }

        // 4. 한 일이 없으면, send와의 경합을 한 번 더 확인한 뒤 유휴 대기
        if !more_work && !self.any_pending_work().await {
            let idle = self.config.read().await.idle_time();
            self.wake.park(idle).await;
        }

        Ok(())
    }

    /// 연결 하나 처리: 송신 대기열 소진 + data-available 통지 발행
    async fn process_connection(
        &self,
        connection: &Arc<ClientConnection>,
        max_attempts: u32,
        max_callback_tasks: usize,
    ) -> ServerResult<bool> {
        let more_work = connection.process_outgoing(max_attempts).await;

        if let Some(callback) = self.callbacks.data_available().await {
            // 예산 확인과 증가는 별개의 락 구간이므로 이 상한은 권고치다
            if self.budget.has_capacity(max_callback_tasks).await
                && connection.pending_input().await
            {
                self.budget.acquire().await;
                if let Err(e) = connection
                    .dispatch_callback(callback(connection.clone()))
                    .await
                {
                    self.budget.release().await;
                    return Err(e);
                }
            }
        }

        Ok(more_work)
    }

    /// 레지스트리 전체에 남은 작업이 있는지 마지막 확인
    async fn any_pending_work(&self) -> bool {
        for connection in self.registry.snapshot().await {
            if connection.has_more_work().await {
                return true;
            }
        }
        false
    }
}
