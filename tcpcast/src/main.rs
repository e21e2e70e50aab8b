//! 브로드캐스트 콘솔 호스트
//!
//! 엔진을 구동하는 최소 호스트 애플리케이션입니다. 클라이언트가
//! 보낸 텍스트를 접속 중인 모든 클라이언트에 다시 브로드캐스트합니다.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use tcpcast::{validate_config, ServerConfig, TcpCastServer};

/// 브로드캐스트 호스트 메인 진입점
///
/// 환경변수:
/// - cast_port: 수신 대기 포트 (기본값: 4444)
/// - cast_idle_time_ms: 루프 유휴 간격 ms (기본값: 50)
/// - cast_max_send_attempts: 메시지당 최대 전송 시도 (기본값: 3)
/// - cast_max_callback_tasks: 동시 데이터 콜백 상한 (기본값: 100)
/// - cast_verify_interval_ms: 생존 재검증 간격 ms (기본값: 100)
/// - cast_encoding: 텍스트 인코딩 (기본값: utf8)
#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 환경 설정 로드
    let config = ServerConfig::from_env().context("환경 설정 로드 실패")?;

    // 설정 검증
    validate_config(&config).context("설정 검증 실패")?;

    info!("=== 브로드캐스트 서버 설정 ===");
    info!("포트: {:?}", config.port);
    info!("유휴 간격: {}ms", config.idle_time_ms);
    info!("인코딩: {}", config.encoding);
    info!("==============================");

    let server = Arc::new(TcpCastServer::new(config));

    server
        .on_connect(|conn| async move {
            info!("클라이언트 접속: client_id={} ({})", conn.client_id(), conn.addr());
            conn.send_text("Welcome!\n").await;
        })
        .await;

    let broadcaster = server.clone();
    server
        .on_data_available(move |conn| {
            let broadcaster = broadcaster.clone();
            async move {
                let text = conn.read_available_text().await;
                if text.is_empty() {
                    return;
                }
                info!("수신 [client_id={}]: {}", conn.client_id(), text.trim_end());
                broadcaster.send(&text).await;
            }
        })
        .await;

    server
        .on_error(|err| async move {
            warn!("서버 에러 통지: {}", err);
        })
        .await;

    server.open().await.context("서버 열기 실패")?;

    // 종료 시그널 대기
    tokio::signal::ctrl_c().await?;
    info!("종료 시그널 수신, 서버를 중지합니다...");

    let stats = server.server_stats().await;
    info!("서버 통계: {}", serde_json::to_string(&stats)?);

    server.close().await;

    Ok(())
}
