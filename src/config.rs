//! Модуль конфигурации библиотеки tts-mixdown
//!
//! Этот модуль содержит структуры для настройки сети, кэша, синтеза и микшера.

use std::path::{Path, PathBuf};

use path_clean::PathClean;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsMixdownError};

/// Единая частота дискретизации всего конвейера (Гц)
pub const SAMPLE_RATE: u32 = 24_000;

/// Настройки микшера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// Громкость синтезированной речи
    pub speech_gain: f32,
    /// Громкость фоновой музыки
    pub music_gain: f32,
    /// Громкость записанного закадрового голоса
    pub voice_over_gain: f32,
    /// Плавное нарастание музыки
    pub fade_in: bool,
    /// Плавное затухание музыки
    pub fade_out: bool,
    /// Выбранный фоновый трек
    pub selected_track_id: Option<u32>,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            speech_gain: 1.0,
            music_gain: 0.3,
            voice_over_gain: 1.0,
            fade_in: true,
            fade_out: true,
            selected_track_id: None,
        }
    }
}

/// Настройки кэша фрагментов
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Использовать кэширование
    pub enabled: bool,
    /// Директория для кэша (если не задана, кэш живет в памяти)
    pub dir: Option<PathBuf>,
    /// Порог количества записей, после которого кэш очищается целиком
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_entries: 2000,
        }
    }
}

/// Политика ранжирования и блокировки эндпоинтов
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Длительная блокировка при 403/429 (секунды)
    pub hard_ban_secs: u64,
    /// Короткая блокировка при повторных сбоях (секунды)
    pub soft_ban_secs: u64,
    /// Сколько накопленных сбоев включают короткую блокировку
    pub soft_ban_failures: u32,
    /// Максимум кандидатов на один фрагмент
    pub max_attempts: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            hard_ban_secs: 5 * 60,
            soft_ban_secs: 60,
            soft_ban_failures: 3,
            max_attempts: 10,
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixdownConfig {
    /// Таймаут одного HTTP-запроса (мс)
    pub request_timeout_ms: u64,
    /// Глобальный множитель скорости речи
    pub speed_multiplier: f32,
    /// Количество одновременно работающих воркеров
    pub concurrency_limit: usize,
    /// Пользовательские прокси (абсолютные http(s) URL)
    pub custom_proxies: Vec<String>,
    /// Язык синтеза (параметр `tl`)
    pub language: String,
    /// Максимальная длина фрагмента текста для одного запроса
    pub max_chunk_length: usize,
    /// Кэш
    pub cache: CacheConfig,
    /// Маршрутизатор эндпоинтов
    pub router: RouterConfig,
    /// Пауза перед повторной попыткой озвучить субтитр (мс)
    pub retry_delay_ms: u64,
    /// Дополнительная пауза после ответа 429 (мс)
    pub rate_limit_pause_ms: u64,
    /// Нижняя граница случайной паузы между кандидатами (мс)
    pub jitter_min_ms: u64,
    /// Верхняя граница случайной паузы между кандидатами (мс)
    pub jitter_max_ms: u64,
    /// Порог тишины для обрезки краев (по шкале ±32768)
    pub silence_threshold: i16,
    /// Пересчитывать ETA каждые N завершенных субтитров
    pub progress_every: usize,
    /// Задержка перед пересведением после смены настроек микшера (мс)
    pub remix_debounce_ms: u64,
    /// Настройки микшера
    pub mixer: MixerSettings,
}

impl Default for MixdownConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 8000,
            speed_multiplier: 1.0,
            concurrency_limit: 30,
            custom_proxies: Vec::new(),
            language: "vi".to_string(),
            max_chunk_length: 180,
            cache: CacheConfig::default(),
            router: RouterConfig::default(),
            retry_delay_ms: 500,
            rate_limit_pause_ms: 2000,
            jitter_min_ms: 100,
            jitter_max_ms: 300,
            silence_threshold: 500,
            progress_every: 5,
            remix_debounce_ms: 500,
            mixer: MixerSettings::default(),
        }
    }
}

impl MixdownConfig {
    /// Загрузить конфигурацию из JSON-файла и проверить ее
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: MixdownConfig = serde_json::from_str(&content)?;
        config.cache.dir = config.cache.dir.map(|dir| dir.clean());
        config.validate()?;
        Ok(config)
    }

    /// Проверить значения конфигурации
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(TtsMixdownError::Configuration(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(TtsMixdownError::Configuration(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if !(self.speed_multiplier > 0.0 && self.speed_multiplier <= 4.0) {
            return Err(TtsMixdownError::Configuration(format!(
                "speed_multiplier must be in (0, 4], got {}",
                self.speed_multiplier
            )));
        }
        if self.max_chunk_length == 0 {
            return Err(TtsMixdownError::Configuration(
                "max_chunk_length must be greater than zero".to_string(),
            ));
        }
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err(TtsMixdownError::Configuration(
                "jitter_min_ms must not exceed jitter_max_ms".to_string(),
            ));
        }
        for proxy in &self.custom_proxies {
            if !is_valid_proxy_url(proxy) {
                return Err(TtsMixdownError::Configuration(format!(
                    "Invalid proxy URL (must start with http:// or https://): {}",
                    proxy
                )));
            }
        }
        let mixer = &self.mixer;
        if mixer.speech_gain < 0.0 || mixer.music_gain < 0.0 || mixer.voice_over_gain < 0.0 {
            return Err(TtsMixdownError::Configuration(
                "mixer gains must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Проверить, что строка является абсолютным http(s) URL
pub fn is_valid_proxy_url(url: &str) -> bool {
    let trimmed = url.trim();
    match reqwest::Url::parse(trimmed) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_pipeline_design() {
        let config = MixdownConfig::default();
        assert_eq!(config.request_timeout_ms, 8000);
        assert_eq!(config.concurrency_limit, 30);
        assert_eq!(config.cache.max_entries, 2000);
        assert_eq!(config.router.hard_ban_secs, 300);
        assert_eq!(config.router.soft_ban_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_relative_proxy() {
        let config = MixdownConfig {
            custom_proxies: vec!["corsproxy.local/?".to_string()],
            ..MixdownConfig::default()
        };
        assert!(matches!(config.validate(), Err(TtsMixdownError::Configuration(_))));
    }

    #[test]
    fn test_rejects_zero_speed() {
        let config = MixdownConfig {
            speed_multiplier: 0.0,
            ..MixdownConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"speed_multiplier": 1.5, "custom_proxies": ["https://proxy.example/?url="], "cache": {{"dir": "/tmp/a/../b"}}}}"#
        )
        .unwrap();

        let config = MixdownConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.speed_multiplier, 1.5);
        assert_eq!(config.concurrency_limit, 30);
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/b")));
        assert_eq!(config.mixer, MixerSettings::default());
    }
}
