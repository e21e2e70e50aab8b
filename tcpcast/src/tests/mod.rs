//! 서버 엔진 테스트 모듈
//!
//! 각 기능별로 분리된 테스트 파일들을 관리합니다.

pub mod test_connection;
pub mod test_service;

// 테스트 유틸리티
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, Instant};

use crate::config::ServerConfig;
use crate::encoding::TextEncoding;
use crate::service::connection::ClientConnection;
use crate::service::TcpCastServer;

/// 테스트용 소켓 쌍 생성 (서버 측, 클라이언트 측)
pub async fn create_socket_pair() -> std::io::Result<(TcpStream, TcpStream)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let client = TcpStream::connect(addr).await?;
    let (server, _) = listener.accept().await?;
    Ok((server, client))
}

/// 테스트용 연결 생성 (클라이언트 측 스트림도 함께 반환)
pub async fn create_test_connection(client_id: u64) -> std::io::Result<(Arc<ClientConnection>, TcpStream)> {
    let (server, client) = create_socket_pair().await?;
    let addr = server.peer_addr()?;
    let connection = Arc::new(ClientConnection::new(
        client_id,
        server,
        addr,
        TextEncoding::Utf8,
    ));
    Ok((connection, client))
}

/// 빠른 주기의 테스트용 서버 설정 (임시 포트)
pub fn test_config() -> ServerConfig {
    ServerConfig {
        port: Some(0),
        idle_time_ms: 10,
        verify_interval_ms: 50,
        ..ServerConfig::default()
    }
}

/// 테스트용 서버 생성
pub fn create_test_server() -> Arc<TcpCastServer> {
    Arc::new(TcpCastServer::new(test_config()))
}

/// 조건이 참이 될 때까지 대기. 한도 내에 충족되면 true를 반환합니다.
pub async fn wait_until<F, Fut>(mut condition: F, limit: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + limit;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}
