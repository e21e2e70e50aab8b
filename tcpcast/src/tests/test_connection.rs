//! 클라이언트 연결 테스트
//!
//! 실제 루프백 소켓 쌍으로 송신 대기열, 수신 읽기, 생존 확인,
//! 콜백 슬롯 계약을 검증합니다.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use crate::tests::{create_test_connection, wait_until};
use crate::tool::ServerError;

/// FIFO 순서 전송 테스트
#[tokio::test]
async fn test_process_outgoing_delivers_in_order() {
    let (connection, mut client) = create_test_connection(1).await.expect("소켓 쌍 생성 실패");

    connection.send_text("a").await;
    connection.send_text("b").await;
    connection.send_text("c").await;
    assert_eq!(connection.pending_outgoing().await, 3);

    // 대기열이 빌 때까지 디스패치 루프처럼 반복 처리
    while connection.process_outgoing(3).await {}
    assert_eq!(connection.pending_outgoing().await, 0);

    let mut received = [0u8; 3];
    tokio::io::AsyncReadExt::read_exact(&mut client, &mut received)
        .await
        .expect("수신 실패");
    assert_eq!(&received, b"abc", "enqueue 순서 그대로 도착해야 함");
}

/// 빈 대기열 처리 테스트
#[tokio::test]
async fn test_process_outgoing_empty_queue() {
    let (connection, _client) = create_test_connection(2).await.expect("소켓 쌍 생성 실패");
    assert!(!connection.process_outgoing(3).await, "빈 대기열은 추가 작업이 없어야 함");
}

/// 수신 가능 바이트 읽기 테스트
#[tokio::test]
async fn test_read_available() {
    let (connection, mut client) = create_test_connection(3).await.expect("소켓 쌍 생성 실패");

    client.write_all(b"ping").await.expect("클라이언트 송신 실패");
    client.flush().await.expect("플러시 실패");

    let arrived = wait_until(
        || async { connection.pending_input().await },
        Duration::from_secs(2),
    )
    .await;
    assert!(arrived, "수신 바이트가 관찰되어야 함");

    assert_eq!(connection.read_available().await, b"ping".to_vec());
    assert!(!connection.pending_input().await, "읽은 뒤에는 남은 바이트가 없어야 함");
}

/// 살아 있는 상대에 대한 생존 확인 테스트
#[tokio::test]
async fn test_verify_connected_alive_peer() {
    let (connection, _client) = create_test_connection(4).await.expect("소켓 쌍 생성 실패");

    assert!(connection.is_connected());
    assert!(connection.verify_connected().await, "접속 중인 상대는 살아 있다고 판정되어야 함");
}

/// 상대가 끊은 뒤의 생존 확인 테스트
#[tokio::test]
async fn test_verify_connected_after_peer_disconnect() {
    let (connection, client) = create_test_connection(5).await.expect("소켓 쌍 생성 실패");
    drop(client);

    let detected = wait_until(
        || async { !connection.verify_connected().await },
        Duration::from_secs(2),
    )
    .await;
    assert!(detected, "상대가 끊으면 생존 확인이 실패해야 함");
}

/// 생존 확인 시각 갱신과 스로틀 테스트
#[tokio::test]
async fn test_verify_updates_timestamp() {
    let (connection, _client) = create_test_connection(6).await.expect("소켓 쌍 생성 실패");

    connection.verify_connected().await;
    assert!(
        connection.verified_recently(Duration::from_millis(500)).await,
        "방금 확인한 연결은 검증 간격 이내여야 함"
    );

    sleep(Duration::from_millis(60)).await;
    assert!(
        !connection.verified_recently(Duration::from_millis(50)).await,
        "간격이 지나면 재검증 대상이어야 함"
    );
}

/// 콜백 슬롯 단일 점유 계약 테스트
#[tokio::test]
async fn test_callback_slot_contract() {
    let (connection, _client) = create_test_connection(7).await.expect("소켓 쌍 생성 실패");

    connection
        .dispatch_callback(Box::pin(async {
            sleep(Duration::from_millis(200)).await;
        }))
        .await
        .expect("빈 슬롯 디스패치는 성공해야 함");
    assert!(connection.callback_in_flight().await);

    // 실행 중 재할당은 계약 위반
    let result = connection.dispatch_callback(Box::pin(async {})).await;
    assert!(matches!(result, Err(ServerError::CallbackSlotBusy { client_id: 7 })));

    // 완료 후에는 회수하고 다시 디스패치할 수 있다
    let reclaimed = wait_until(
        || async { connection.try_reclaim_callback().await },
        Duration::from_secs(2),
    )
    .await;
    assert!(reclaimed, "완료된 슬롯은 회수되어야 함");
    assert!(!connection.callback_in_flight().await);
    assert!(connection.dispatch_callback(Box::pin(async {})).await.is_ok());
}

/// 강제 해제 시 대기열 폐기 테스트
#[tokio::test]
async fn test_force_disconnect_discards_queue() {
    let (connection, _client) = create_test_connection(8).await.expect("소켓 쌍 생성 실패");

    connection.send_text("버려질 메시지").await;
    connection.force_disconnect().await;

    assert!(!connection.is_connected());
    assert_eq!(connection.pending_outgoing().await, 0, "강제 해제는 대기열을 폐기해야 함");
    assert!(!connection.process_outgoing(3).await);
    assert!(connection.read_available().await.is_empty());
}

/// 끊긴 소켓 전송 시 연결 정리 테스트
#[tokio::test]
async fn test_process_outgoing_tears_down_dead_stream() {
    let (connection, client) = create_test_connection(9).await.expect("소켓 쌍 생성 실패");
    drop(client);
    sleep(Duration::from_millis(50)).await;

    // 상대가 사라진 소켓에 반복 전송하면 결국 치명적 에러로 폐기된다
    let torn_down = wait_until(
        || async {
            connection.send_text("유실될 페이로드").await;
            connection.process_outgoing(1).await;
            !connection.is_connected()
        },
        Duration::from_secs(3),
    )
    .await;
    assert!(torn_down, "죽은 스트림은 전송 경로에서 폐기되어야 함");

    // 폐기된 소켓에 대한 다음 처리에서 대기열이 통째로 버려진다
    assert!(!connection.process_outgoing(1).await);
    assert_eq!(connection.pending_outgoing().await, 0);
}

/// 작업 잔량 판정 테스트
#[tokio::test]
async fn test_has_more_work() {
    let (connection, mut client) = create_test_connection(10).await.expect("소켓 쌍 생성 실패");
    assert!(!connection.has_more_work().await, "초기 상태에는 작업이 없어야 함");

    connection.send_text("x").await;
    assert!(connection.has_more_work().await, "송신 대기분은 작업으로 집계되어야 함");
    while connection.process_outgoing(3).await {}

    client.write_all(b"y").await.expect("클라이언트 송신 실패");
    let pending = wait_until(
        || async { connection.has_more_work().await },
        Duration::from_secs(2),
    )
    .await;
    assert!(pending, "수신 대기 바이트도 작업으로 집계되어야 함");
}
