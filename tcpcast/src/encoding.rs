//! 텍스트 인코딩 정의
//!
//! `send()`로 전달된 텍스트를 바이트 페이로드로 변환하는 규칙을 정의합니다.
//! 서버 기본 인코딩과 별개로 연결별 인코딩을 재지정할 수 있습니다.

use std::fmt;
use std::str::FromStr;

use crate::tool::{ServerError, ServerResult};

/// 텍스트-바이트 변환 인코딩
///
/// 인코딩 불가능한 문자는 `?`로 대체됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// UTF-8 (기본값)
    #[default]
    Utf8,
    /// 7비트 ASCII
    Ascii,
    /// ISO-8859-1
    Latin1,
    /// UTF-16 리틀 엔디언
    Utf16Le,
    /// UTF-16 빅 엔디언
    Utf16Be,
}

impl TextEncoding {
    /// 문자열을 바이트 페이로드로 변환합니다.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    let code = c as u32;
                    if code <= 0xFF {
                        code as u8
                    } else {
                        b'?'
                    }
                })
                .collect(),
            TextEncoding::Utf16Le => text
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect(),
            TextEncoding::Utf16Be => text
                .encode_utf16()
                .flat_map(|unit| unit.to_be_bytes())
                .collect(),
        }
    }

    /// 바이트를 문자열로 복원합니다. 잘못된 시퀀스는 대체 문자로 바뀝니다.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Ascii | TextEncoding::Latin1 => {
                bytes.iter().map(|&b| b as char).collect()
            }
            TextEncoding::Utf16Le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            TextEncoding::Utf16Be => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
        }
    }

    /// 환경변수 표기 이름
    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Latin1 => "latin1",
            TextEncoding::Utf16Le => "utf16le",
            TextEncoding::Utf16Be => "utf16be",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = ServerError;

    fn from_str(s: &str) -> ServerResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "ascii" => Ok(TextEncoding::Ascii),
            "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            "utf16le" | "utf-16le" => Ok(TextEncoding::Utf16Le),
            "utf16be" | "utf-16be" => Ok(TextEncoding::Utf16Be),
            other => Err(ServerError::configuration(
                "encoding",
                &format!("지원하지 않는 인코딩: {}", other),
            )),
        }
    }
}
