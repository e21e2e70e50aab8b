//! 통지 핸들러 레이어
//!
//! 호스트 애플리케이션이 등록하는 이벤트 콜백과 그 실행 예산을 관리합니다.

/// 이벤트 콜백 등록 및 예산 관리
///
/// connect/data/error 콜백 보관소와 동시 실행 카운터를 제공합니다.
pub mod events;

pub use events::{CallbackBudget, CallbackFuture, ConnectionCallback, ErrorCallback, EventCallbacks};
