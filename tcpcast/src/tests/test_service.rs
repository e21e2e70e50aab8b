//! 서버 생명주기 테스트

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::tests::{create_test_server, wait_until};
use crate::tool::ServerError;

/// open은 멱등해야 함
#[tokio::test]
async fn test_open_is_idempotent() {
    let server = create_test_server();

    server.open().await.expect("첫 open 실패");
    let bound = server.local_addr().await.expect("바인드 주소가 있어야 함");

    // 두 번째 open은 아무 일도 하지 않고 성공한다
    server.open().await.expect("중복 open은 성공해야 함");
    assert_eq!(server.local_addr().await, Some(bound), "리스너는 하나만 존재해야 함");
    assert!(server.is_open().await);

    // 루프가 중복으로 뜨지 않았다면 단일 클라이언트는 정확히 한 번 등록된다
    let _client = TcpStream::connect(bound).await.expect("클라이언트 접속 실패");
    let registered = wait_until(
        || async { server.connection_count().await == 1 },
        Duration::from_secs(2),
    )
    .await;
    assert!(registered);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connection_count().await, 1);

    server.close().await;
}

/// 열려 있는 동안의 포트 변경은 설정 에러
#[tokio::test]
async fn test_set_port_while_open_fails() {
    let server = create_test_server();
    server.open().await.expect("open 실패");
    let bound = server.local_addr().await;

    let result = server.set_port(9999).await;
    assert!(matches!(result, Err(ServerError::PortChangeWhileOpen)));

    // 서버는 기존 포트에서 계속 열려 있어야 한다
    assert!(server.is_open().await);
    assert_eq!(server.local_addr().await, bound);
    assert_eq!(server.port().await, Some(0), "설정된 포트 값도 바뀌지 않아야 함");

    server.close().await;
}

/// 닫힌 상태에서는 포트 변경 가능
#[tokio::test]
async fn test_set_port_while_closed() {
    let server = create_test_server();
    server.set_port(0).await.expect("닫힌 상태의 포트 변경은 성공해야 함");
    assert_eq!(server.port().await, Some(0));
}

/// 연결이 없을 때의 send는 에러 통지 한 번으로 끝남
#[tokio::test]
async fn test_send_without_connections_reports_error() {
    let server = create_test_server();

    let error_count = Arc::new(AtomicUsize::new(0));
    let counter = error_count.clone();
    server
        .on_error(move |err| {
            let counter = counter.clone();
            async move {
                if matches!(err, ServerError::NoConnections) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
        .await;

    server.send("hi").await;

    assert_eq!(error_count.load(Ordering::SeqCst), 1, "에러 통지는 정확히 한 번이어야 함");
}

/// close는 연결을 모두 제거하고 루프를 멈춤
#[tokio::test]
async fn test_close_clears_registry() {
    let server = create_test_server();
    server.open().await.expect("open 실패");
    let bound = server.local_addr().await.expect("바인드 주소가 있어야 함");

    let _first = TcpStream::connect(bound).await.expect("클라이언트 접속 실패");
    let _second = TcpStream::connect(bound).await.expect("클라이언트 접속 실패");
    let registered = wait_until(
        || async { server.connection_count().await == 2 },
        Duration::from_secs(2),
    )
    .await;
    assert!(registered);

    server.close().await;

    assert!(!server.is_open().await);
    assert_eq!(server.connection_count().await, 0, "close 후 레지스트리는 비어야 함");
    assert_eq!(server.local_addr().await, None);
}

/// close 후 다시 열 수 있음
#[tokio::test]
async fn test_reopen_after_close() {
    let server = create_test_server();

    server.open().await.expect("첫 open 실패");
    server.close().await;
    server.open().await.expect("재개방 실패");
    let bound = server.local_addr().await.expect("재개방 후 바인드 주소가 있어야 함");

    let _client = TcpStream::connect(bound).await.expect("재개방 후 접속 실패");
    let registered = wait_until(
        || async { server.connection_count().await == 1 },
        Duration::from_secs(2),
    )
    .await;
    assert!(registered, "재개방한 서버도 연결을 수락해야 함");

    server.close().await;
}

/// 기본 인코딩 변경은 기본값을 쓰던 연결에 전파됨
#[tokio::test]
async fn test_set_encoding_updates_matching_connections() {
    use crate::encoding::TextEncoding;

    let server = create_test_server();
    server.open().await.expect("open 실패");
    let bound = server.local_addr().await.expect("바인드 주소가 있어야 함");

    let _first = TcpStream::connect(bound).await.expect("클라이언트 접속 실패");
    let _second = TcpStream::connect(bound).await.expect("클라이언트 접속 실패");
    let registered = wait_until(
        || async { server.connection_count().await == 2 },
        Duration::from_secs(2),
    )
    .await;
    assert!(registered);

    // 한 연결은 명시적으로 다른 인코딩을 사용한다
    let connections = server.connections().await;
    let pinned = connections[0].clone();
    let following = connections[1].clone();
    pinned.set_encoding(TextEncoding::Latin1).await;

    server.set_encoding(TextEncoding::Utf16Le).await;
    assert_eq!(server.encoding().await, TextEncoding::Utf16Le);
    assert_eq!(
        pinned.encoding().await,
        TextEncoding::Latin1,
        "기본값에서 벗어난 연결은 그대로여야 함"
    );
    assert_eq!(
        following.encoding().await,
        TextEncoding::Utf16Le,
        "기본값을 쓰던 연결은 새 기본값으로 갱신되어야 함"
    );

    server.close().await;
}
