//! 멀티 클라이언트 TCP 브로드캐스트 서버 엔진
//!
//! 호스트 애플리케이션이 설정과 콜백 핸들러만 공급해 구동하는
//! 임베더블 TCP 서버 엔진입니다. 프로토콜 프레이밍 없이 불투명한
//! 바이트 페이로드만 다룹니다.
//!
//! # 주요 기능
//!
//! - **연결 레지스트리**: 수락된 연결들의 실시간 집합 관리
//! - **송신 대기열**: 연결별 FIFO 큐와 전송 재시도 후 폐기
//! - **생존 검증**: 검증 간격으로 스로틀되는 논블로킹 생존 확인
//! - **통지 디스패치**: connect/data/error 콜백의 비동기 발행과
//!   연결당 단일 슬롯, 전역 동시 실행 권고 상한
//! - **깨움 신호**: `send()`가 유휴 대기 중인 디스패치 루프를 즉시 깨움
//!
//! # 아키텍처
//!
//! ```text
//! TcpCastServer
//! ├── Service Layer (핵심 동작)
//! │   ├── AcceptService (수락 루프)
//! │   ├── DispatchService (디스패치 루프)
//! │   ├── ClientConnection (소켓별 상태)
//! │   └── ConnectionRegistry (연결 집합)
//! ├── Handler Layer (통지 플러밍)
//! │   ├── EventCallbacks (콜백 보관소)
//! │   └── CallbackBudget (동시 실행 카운터)
//! ├── Tool Layer (유틸리티)
//! │   └── Error (에러 처리)
//! ├── Config (환경 설정)
//! └── Encoding (텍스트-바이트 변환)
//! ```
//!
//! # 사용 예시
//!
//! ```no_run
//! use tcpcast::{ServerConfig, TcpCastServer};
//!
//! # async fn run() -> tcpcast::ServerResult<()> {
//! let server = TcpCastServer::new(ServerConfig::default());
//! server.set_port(4444).await?;
//!
//! server.on_connect(|conn| async move {
//!     conn.send_text("Welcome!\n").await;
//! }).await;
//!
//! server.on_data_available(|conn| async move {
//!     let bytes = conn.read_available().await;
//!     println!("수신 {}바이트", bytes.len());
//! }).await;
//!
//! server.open().await?;
//! server.send("모두에게 브로드캐스트").await;
//! server.close().await;
//! # Ok(())
//! # }
//! ```

/// 환경 설정 관리
///
/// 서버 실행에 필요한 환경변수 및 설정을 관리합니다.
pub mod config;

/// 텍스트 인코딩 정의
///
/// `send()` 텍스트를 바이트 페이로드로 변환하는 규칙을 정의합니다.
pub mod encoding;

/// 핵심 서비스 레이어
///
/// 연결 관리, 수락/디스패치 루프, 서버 생명주기를 포함합니다.
pub mod service;

/// 통지 핸들러 레이어
///
/// 호스트가 등록하는 콜백과 그 실행 예산을 포함합니다.
pub mod handler;

/// 공통 유틸리티 도구들
///
/// 에러 처리 등 공용 도구들을 포함합니다.
pub mod tool;

/// 통합 테스트 모듈
///
/// 엔진의 각 구성 요소를 검증하는 테스트들을 포함합니다.
pub mod tests;

// 주요 타입들 재출장

/// 서버 엔진과 통계
pub use service::{ServerStats, TcpCastServer};

/// 연결 단위 타입들
pub use service::{ClientConnection, ConnectionRegistry, RegistryStats};

/// 환경 설정 타입들
pub use config::{validate_config, ServerConfig};

/// 텍스트 인코딩
pub use encoding::TextEncoding;

/// 에러 타입들
pub use tool::{ServerError, ServerResult};
