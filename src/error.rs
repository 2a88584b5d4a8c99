//! Модуль обработки ошибок библиотеки tts-mixdown
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть на каждом уровне
//! конвейера: фрагмент текста → субтитр → весь прогон синтеза.

use thiserror::Error;

/// Ошибки библиотеки tts-mixdown
#[derive(Debug, Error)]
pub enum TtsMixdownError {
    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка WAV-кодирования
    #[error("WAV encoding error: {0}")]
    WavEncoding(#[from] hound::Error),

    /// Нет сети и нет записи в кэше
    #[error("No internet connection and audio chunk not found in cache")]
    Offline,

    /// Все эндпоинты временно заблокированы
    #[error("All endpoints (default & custom) are currently unavailable/banned. Wait a few minutes or add custom proxies")]
    NoEndpointsAvailable,

    /// Отдельный запрос к эндпоинту завершился неудачей
    #[error("Endpoint [{endpoint}] failed: {reason}. URL: [{url}]")]
    EndpointRequestFailed {
        /// Имя эндпоинта
        endpoint: String,
        /// URL, по которому выполнялся запрос
        url: String,
        /// Причина отказа
        reason: String,
        /// HTTP-статус, если сервер ответил
        status: Option<u16>,
    },

    /// Перебраны все кандидаты, последний отказ сохранен
    #[error("All {attempts} endpoint attempts failed. Last error: {last_error}")]
    AllEndpointsExhausted {
        /// Количество выполненных попыток
        attempts: usize,
        /// Последняя конкретная ошибка
        last_error: Box<TtsMixdownError>,
    },

    /// Субтитр не удалось озвучить даже после повторной попытки
    #[error("Cue {cue_id} synthesis failed: {message}")]
    CueSynthesisFailed {
        /// Идентификатор субтитра
        cue_id: u32,
        /// Исходное сообщение об ошибке
        message: String,
        /// Ошибка указывает на ограничение со стороны провайдера
        rate_limited: bool,
    },

    /// Ошибка парсинга субтитров
    #[error("Subtitle parsing error: {0}")]
    SubtitleParsing(String),

    /// Некорректный субтитр
    #[error("Invalid cue: {0}")]
    InvalidCue(String),

    /// Ошибка декодирования аудио
    #[error("Audio decoding error: {0}")]
    AudioDecoding(String),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl TtsMixdownError {
    /// HTTP-статус, на котором споткнулся запрос (если есть)
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::EndpointRequestFailed { status, .. } => *status,
            Self::AllEndpointsExhausted { last_error, .. } => last_error.status_code(),
            _ => None,
        }
    }

    /// Похоже ли на ограничение частоты запросов со стороны провайдера
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::CueSynthesisFailed { rate_limited, .. } => *rate_limited,
            _ => matches!(self.status_code(), Some(403) | Some(429)),
        }
    }

    /// Ошибка инфраструктуры, при которой продолжать прогон бессмысленно
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::NoEndpointsAvailable)
    }
}

impl From<&str> for TtsMixdownError {
    fn from(s: &str) -> Self {
        TtsMixdownError::Other(s.to_string())
    }
}

impl From<String> for TtsMixdownError {
    fn from(s: String) -> Self {
        TtsMixdownError::Other(s)
    }
}

/// Тип Result для библиотеки tts-mixdown
pub type Result<T> = std::result::Result<T, TtsMixdownError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn request_failed(status: Option<u16>) -> TtsMixdownError {
        TtsMixdownError::EndpointRequestFailed {
            endpoint: "AllOrigins + GTX".to_string(),
            url: "https://example.test/tts".to_string(),
            reason: "HTTP Status [429]".to_string(),
            status,
        }
    }

    #[test]
    fn test_exhausted_keeps_url_and_status() {
        let error = TtsMixdownError::AllEndpointsExhausted {
            attempts: 3,
            last_error: Box::new(request_failed(Some(429))),
        };

        let message = error.to_string();
        assert!(message.contains("https://example.test/tts"));
        assert!(message.contains("AllOrigins + GTX"));
        assert_eq!(error.status_code(), Some(429));
        assert!(error.is_rate_limited());
    }

    #[test]
    fn test_connectivity_failure_is_not_rate_limited() {
        assert!(!request_failed(None).is_rate_limited());
        assert!(!request_failed(Some(500)).is_rate_limited());
        assert!(request_failed(Some(403)).is_rate_limited());
    }

    #[test]
    fn test_only_endpoint_exhaustion_is_infrastructure() {
        assert!(TtsMixdownError::NoEndpointsAvailable.is_infrastructure());
        assert!(!TtsMixdownError::Offline.is_infrastructure());
    }
}
