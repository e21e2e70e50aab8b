//! 공통 에러 처리 시스템
//!
//! 서버 엔진에서 발생하는 모든 에러를 체계적으로 분류합니다.
//! 설정 에러는 호출자에게 동기적으로 반환되고, 루프 내부 에러는
//! 에러 통지 채널로 전달됩니다.

use thiserror::Error;

/// TCP 서버 엔진 에러 타입
#[derive(Error, Debug, Clone)]
pub enum ServerError {
    // 설정 관련 에러
    #[error("포트가 설정되지 않았습니다")]
    PortNotConfigured,

    #[error("서버가 열려 있는 동안에는 포트를 변경할 수 없습니다. 먼저 close() 하세요")]
    PortChangeWhileOpen,

    #[error("설정 에러 [키: {key}]: {message}")]
    Configuration { key: String, message: String },

    // 리스너 관련 에러
    #[error("리스너 바인드 실패 [포트 {port}]: {message}")]
    Bind { port: u16, message: String },

    #[error("연결 수락 실패: {message}")]
    Accept { message: String },

    // 송신/통지 관련 에러
    #[error("수립된 연결이 없습니다")]
    NoConnections,

    #[error("콜백 슬롯 충돌 [클라이언트 {client_id}]: 이전 콜백이 아직 실행 중입니다")]
    CallbackSlotBusy { client_id: u64 },

    // 내부 시스템 에러
    #[error("내부 에러 [컴포넌트: {component}]: {message}")]
    Internal { component: String, message: String },
}

/// 에러 생성 헬퍼 함수들
impl ServerError {
    /// 설정 에러 생성
    pub fn configuration(key: &str, message: &str) -> Self {
        Self::Configuration {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// 연결 수락 에러 생성
    pub fn accept(message: &str) -> Self {
        Self::Accept {
            message: message.to_string(),
        }
    }

    /// 내부 에러 생성
    pub fn internal(component: &str, message: &str) -> Self {
        Self::Internal {
            component: component.to_string(),
            message: message.to_string(),
        }
    }

    /// 호출자에게 동기적으로 반환되는 설정 계열 에러인지 여부
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::PortNotConfigured | Self::PortChangeWhileOpen | Self::Configuration { .. }
        )
    }
}

/// 결과 타입 별칭
pub type ServerResult<T> = Result<T, ServerError>;

mod tests {

    /// 에러 표시 테스트
    #[test]
    fn test_error_display() {
        use super::ServerError;

        let error = ServerError::CallbackSlotBusy { client_id: 7 };
        let display_str = error.to_string();
        assert!(display_str.contains("콜백 슬롯 충돌"));
        assert!(display_str.contains('7'));

        let error = ServerError::Bind {
            port: 4444,
            message: "주소가 이미 사용 중".to_string(),
        };
        assert!(error.to_string().contains("4444"));
    }

    /// 설정 에러 분류 테스트
    #[test]
    fn test_configuration_classification() {
        use super::ServerError;

        assert!(ServerError::PortNotConfigured.is_configuration());
        assert!(ServerError::PortChangeWhileOpen.is_configuration());
        assert!(ServerError::configuration("idle_time_ms", "0은 허용되지 않음").is_configuration());
        assert!(!ServerError::NoConnections.is_configuration());
        assert!(!ServerError::accept("연결 재설정").is_configuration());
    }
}
