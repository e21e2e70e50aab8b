//! 서버 엔진 환경 설정 모듈
//!
//! 환경변수에서 엔진 설정을 로드하고 검증합니다.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::encoding::TextEncoding;
use crate::tool::{ServerError, ServerResult};

/// 서버 엔진 설정 구조체
///
/// 포트는 명시적으로 설정하기 전까지 비어 있으며, 포트 없이
/// `open()`을 호출하면 설정 에러가 반환됩니다.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 수신 대기 포트 (0은 임시 포트 할당)
    pub port: Option<u16>,
    /// 두 루프가 대기할 유휴 간격 (ms)
    pub idle_time_ms: u64,
    /// 큐 선두 메시지당 최대 전송 시도 횟수
    pub max_send_attempts: u32,
    /// 동시에 실행할 수 있는 데이터 콜백 수 (권고 상한)
    pub max_callback_tasks: usize,
    /// 연결 생존 재검증 최소 간격 (ms)
    pub verify_interval_ms: u64,
    /// 기본 텍스트 인코딩
    pub encoding: TextEncoding,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: None,
            idle_time_ms: 50,
            max_send_attempts: 3,
            max_callback_tasks: 100,
            verify_interval_ms: 100,
            encoding: TextEncoding::Utf8,
        }
    }
}

impl ServerConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. 현재 디렉토리 또는 상위 디렉토리의 .env 파일
    /// 2. 시스템 환경변수
    /// 3. 기본값
    pub fn from_env() -> ServerResult<Self> {
        Self::load_env_file();

        let defaults = Self::default();
        let config = Self {
            port: Some(read_env_or("cast_port", 4444)),
            idle_time_ms: read_env_or("cast_idle_time_ms", defaults.idle_time_ms),
            max_send_attempts: read_env_or("cast_max_send_attempts", defaults.max_send_attempts),
            max_callback_tasks: read_env_or("cast_max_callback_tasks", defaults.max_callback_tasks),
            verify_interval_ms: read_env_or("cast_verify_interval_ms", defaults.verify_interval_ms),
            encoding: match std::env::var("cast_encoding") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.encoding,
            },
        };

        info!("서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 유휴 간격
    pub fn idle_time(&self) -> Duration {
        Duration::from_millis(self.idle_time_ms)
    }

    /// 생존 재검증 간격
    pub fn verify_interval(&self) -> Duration {
        Duration::from_millis(self.verify_interval_ms)
    }

    /// 종료 시 루프 합류를 기다리는 유예 시간 (유휴 간격의 작은 배수)
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.idle_time_ms.saturating_mul(4).max(100))
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = ["./.env", "../.env"];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
        }
    }
}

/// 환경변수를 파싱하고, 없거나 잘못된 값이면 기본값을 사용합니다.
fn read_env_or<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// 설정 검증 유틸리티
pub fn validate_config(config: &ServerConfig) -> ServerResult<()> {
    if config.idle_time_ms == 0 {
        return Err(ServerError::configuration(
            "idle_time_ms",
            "유휴 간격은 0보다 커야 합니다",
        ));
    }

    if config.max_send_attempts == 0 {
        return Err(ServerError::configuration(
            "max_send_attempts",
            "최대 전송 시도 횟수는 0보다 커야 합니다",
        ));
    }

    if config.max_callback_tasks == 0 {
        return Err(ServerError::configuration(
            "max_callback_tasks",
            "동시 콜백 상한은 0보다 커야 합니다",
        ));
    }

    Ok(())
}
