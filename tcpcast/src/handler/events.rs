//! 이벤트 콜백 등록과 예산 관리
//!
//! 호스트가 등록한 connect/data/error 통지 콜백을 보관하고,
//! 동시에 실행 중인 통지 콜백 수를 추적합니다.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::error;

use crate::service::connection::ClientConnection;
use crate::tool::ServerError;

/// 통지 콜백이 반환하는 퓨처
pub type CallbackFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// 연결 대상 통지 콜백 (connect / data-available)
pub type ConnectionCallback = Arc<dyn Fn(Arc<ClientConnection>) -> CallbackFuture + Send + Sync>;

/// 에러 통지 콜백
pub type ErrorCallback = Arc<dyn Fn(ServerError) -> CallbackFuture + Send + Sync>;

/// 호스트가 등록한 통지 콜백 보관소
///
/// 각 콜백은 독립적으로 등록되며, 등록되지 않은 통지는 발생하지 않습니다.
#[derive(Default)]
pub struct EventCallbacks {
    on_connect: Mutex<Option<ConnectionCallback>>,
    on_data_available: Mutex<Option<ConnectionCallback>>,
    on_error: Mutex<Option<ErrorCallback>>,
}

impl EventCallbacks {
    /// 빈 콜백 보관소 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// connect 통지 콜백 등록
    pub async fn set_connect(&self, callback: ConnectionCallback) {
        *self.on_connect.lock().await = Some(callback);
    }

    /// data-available 통지 콜백 등록
    pub async fn set_data_available(&self, callback: ConnectionCallback) {
        *self.on_data_available.lock().await = Some(callback);
    }

    /// 에러 통지 콜백 등록
    pub async fn set_error(&self, callback: ErrorCallback) {
        *self.on_error.lock().await = Some(callback);
    }

    /// 등록된 connect 콜백
    pub async fn connect(&self) -> Option<ConnectionCallback> {
        self.on_connect.lock().await.clone()
    }

    /// 등록된 data-available 콜백
    pub async fn data_available(&self) -> Option<ConnectionCallback> {
        self.on_data_available.lock().await.clone()
    }

    /// 에러를 에러 통지 채널로 전달합니다.
    ///
    /// 핸들러가 등록되지 않았으면 로그로만 남깁니다.
    pub async fn emit_error(&self, err: ServerError) {
        let callback = self.on_error.lock().await.clone();
        match callback {
            Some(callback) => callback(err).await,
            None => error!("처리되지 않은 서버 에러: {}", err),
        }
    }
}

/// 콜백 예산 카운터
///
/// 동시에 실행 중인 통지 콜백 수를 추적합니다. 상한 검사와 증가가
/// 하나의 원자적 트랜잭션이 아니므로 이 상한은 권고치이며, 수락과
/// 디스패치가 겹치는 순간에는 일시적으로 초과될 수 있습니다.
#[derive(Default)]
pub struct CallbackBudget {
    active: Mutex<usize>,
}

impl CallbackBudget {
    /// 새 예산 카운터 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 실행 중 콜백 수가 상한 미만인지 확인
    pub async fn has_capacity(&self, max_callback_tasks: usize) -> bool {
        *self.active.lock().await < max_callback_tasks
    }

    /// 카운터 증가. connect 통지는 상한 검사 없이 이 경로만 사용합니다.
    pub async fn acquire(&self) {
        *self.active.lock().await += 1;
    }

    /// 완료된 콜백 슬롯 회수 시 카운터 감소
    pub async fn release(&self) {
        let mut active = self.active.lock().await;
        *active = active.saturating_sub(1);
    }

    /// 현재 실행 중인 콜백 수
    pub async fn active_count(&self) -> usize {
        *self.active.lock().await
    }

    /// 카운터 초기화 (서버 종료 경로)
    pub async fn reset(&self) {
        *self.active.lock().await = 0;
    }
}
