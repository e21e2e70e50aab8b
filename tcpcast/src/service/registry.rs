//! 연결 레지스트리
//!
//! 서버가 소유하는 살아 있는 연결들의 권위 있는 집합입니다.
//! 레지스트리는 자체 락 아래에서만 변경됩니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::service::connection::ClientConnection;

/// 레지스트리 누적 통계
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RegistryStats {
    /// 수락된 연결 누계
    pub total_connections: u64,
    /// 동시 연결 최고치
    pub peak_connections: usize,
    /// 디스패치 루프가 제거한 연결 누계
    pub evicted_connections: u64,
}

/// 연결 레지스트리
///
/// 연결은 수락 루프가 삽입하고, 디스패치 루프가 끊긴 연결을
/// 제거하며, 서버가 닫힐 때 일괄 비워집니다.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<u64, Arc<ClientConnection>>>,
    next_client_id: AtomicU64,
    stats: Mutex<RegistryStats>,
}

impl ConnectionRegistry {
    /// 빈 레지스트리 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 다음 클라이언트 식별자 발급
    pub fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 연결 등록
    pub async fn insert(&self, connection: Arc<ClientConnection>) {
        let count = {
            let mut connections = self.connections.lock().await;
            connections.insert(connection.client_id(), connection);
            connections.len()
        };

        let mut stats = self.stats.lock().await;
        stats.total_connections += 1;
        stats.peak_connections = stats.peak_connections.max(count);
    }

    /// 연결 제거 (디스패치 루프의 퇴출 경로)
    pub async fn remove(&self, client_id: u64) -> Option<Arc<ClientConnection>> {
        let removed = self.connections.lock().await.remove(&client_id);
        if removed.is_some() {
            self.stats.lock().await.evicted_connections += 1;
            debug!("레지스트리에서 연결 제거: client_id={}", client_id);
        }
        removed
    }

    /// 현재 연결들의 스냅샷
    pub async fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.lock().await.values().cloned().collect()
    }

    /// 현재 연결 수
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// 레지스트리가 비어 있는지 여부
    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// 모든 연결을 비우고 제거된 연결들을 반환 (서버 종료 경로)
    pub async fn clear(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.lock().await.drain().map(|(_, c)| c).collect()
    }

    /// 누적 통계 조회
    pub async fn stats(&self) -> RegistryStats {
        self.stats.lock().await.clone()
    }
}
