//! Модуль устойчивой загрузки фрагментов речи
//!
//! Порядок: кэш → проверка сети → кандидаты роутера → перебор кандидатов
//! с проверкой ответа. Принятый ответ сохраняется в кэш в фоне.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use rand::Rng;

use crate::config::MixdownConfig;
use crate::error::{Result, TtsMixdownError};
use crate::media::decode;
use crate::tts::cache::ChunkCache;
use crate::tts::endpoint::Endpoint;
use crate::tts::router::EndpointRouter;

/// Минимальный правдоподобный размер аудио-ответа
const MIN_AUDIO_BYTES: usize = 150;
/// Сколько байт короткого ответа проверять как текст
const SNIFF_BYTES: usize = 50;

/// Ответ транспорта
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

/// HTTP-транспорт для запросов к конечным точкам
#[async_trait]
pub trait AudioTransport: Send + Sync {
    /// GET-запрос с ограничением по времени
    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse>;
}

/// Транспорт на reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl AudioTransport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<TransportResponse> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(TransportResponse { status, body })
    }
}

/// Источник сведений о наличии сети
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Считает сеть всегда доступной; сетевые ошибки обрабатываются по кандидатам
pub struct AssumeOnline;

impl Connectivity for AssumeOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Параметры загрузки
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub request_timeout: Duration,
    pub language: String,
    pub rate_limit_pause: Duration,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl From<&MixdownConfig> for FetchSettings {
    fn from(config: &MixdownConfig) -> Self {
        Self {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            language: config.language.clone(),
            rate_limit_pause: Duration::from_millis(config.rate_limit_pause_ms),
            jitter_min_ms: config.jitter_min_ms,
            jitter_max_ms: config.jitter_max_ms,
        }
    }
}

/// Транспорт не смог установить соединение
fn is_unreachable(err: &TtsMixdownError) -> bool {
    match err {
        TtsMixdownError::Offline => true,
        TtsMixdownError::Http(e) => e.is_connect(),
        _ => false,
    }
}

/// Отказ одного кандидата
struct AttemptFailure {
    error: TtsMixdownError,
    /// Запрос не дошел до сервера
    unreachable: bool,
}

impl From<TtsMixdownError> for AttemptFailure {
    fn from(error: TtsMixdownError) -> Self {
        Self {
            error,
            unreachable: false,
        }
    }
}

/// Похож ли короткий ответ на текст ошибки или JSON
fn looks_like_error_text(body: &[u8]) -> bool {
    if body.len() >= MIN_AUDIO_BYTES {
        return false;
    }
    let head = String::from_utf8_lossy(&body[..body.len().min(SNIFF_BYTES)]);
    head.contains("Error") || head.contains("Exception") || head.trim().starts_with('{')
}

/// Клиент загрузки фрагментов
pub struct FetchClient {
    router: Arc<EndpointRouter>,
    cache: Arc<dyn ChunkCache>,
    transport: Arc<dyn AudioTransport>,
    connectivity: Arc<dyn Connectivity>,
    settings: FetchSettings,
}

impl FetchClient {
    pub fn new(
        router: Arc<EndpointRouter>,
        cache: Arc<dyn ChunkCache>,
        transport: Arc<dyn AudioTransport>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            router,
            cache,
            transport,
            connectivity: Arc::new(AssumeOnline),
            settings,
        }
    }

    /// Заменить источник сведений о сети
    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn router(&self) -> &Arc<EndpointRouter> {
        &self.router
    }

    pub fn cache(&self) -> &Arc<dyn ChunkCache> {
        &self.cache
    }

    /// Получить закодированное аудио для фрагмента текста
    pub async fn fetch_chunk(&self, text: &str) -> Result<Bytes> {
        if let Some(cached) = self.cache.get(text).await {
            debug!("Cache hit for chunk ({} bytes)", cached.len());
            return Ok(cached);
        }

        if !self.connectivity.is_online() {
            return Err(TtsMixdownError::Offline);
        }

        let candidates = self.router.select_candidates()?;
        let limit = self.router.attempt_limit(candidates.len());
        let mut last_error = None;
        let mut attempts = 0;
        let mut all_unreachable = true;

        for endpoint in candidates.iter().take(limit) {
            attempts += 1;
            let url = endpoint.url_for(text, &self.settings.language);

            match self.try_endpoint(endpoint, &url).await {
                Ok(body) => {
                    self.router.record_outcome(&endpoint.id, true, None);
                    self.spawn_cache_write(text, body.clone());
                    return Ok(body);
                }
                Err(AttemptFailure { error: err, unreachable }) => {
                    all_unreachable &= unreachable;
                    let status = err.status_code();
                    self.router.record_outcome(&endpoint.id, false, status);
                    warn!("{}", err);

                    if status == Some(429) {
                        warn!("Hit 429 on {}, backing off for {:?}", endpoint.id, self.settings.rate_limit_pause);
                        tokio::time::sleep(self.settings.rate_limit_pause).await;
                    }

                    last_error = Some(err);
                    tokio::time::sleep(self.jitter()).await;
                }
            }
        }

        // ни один кандидат не ответил: похоже на отсутствие сети
        if attempts > 0 && all_unreachable {
            warn!("No endpoint reachable after {} attempts, treating as offline", attempts);
            return Err(TtsMixdownError::Offline);
        }

        Err(TtsMixdownError::AllEndpointsExhausted {
            attempts,
            last_error: Box::new(last_error.unwrap_or(TtsMixdownError::NoEndpointsAvailable)),
        })
    }

    async fn try_endpoint(&self, endpoint: &Endpoint, url: &str) -> std::result::Result<Bytes, AttemptFailure> {
        let failed = |reason: String, status: Option<u16>| TtsMixdownError::EndpointRequestFailed {
            endpoint: endpoint.name.clone(),
            url: url.to_string(),
            reason,
            status,
        };

        let response = match self.transport.get(url, self.settings.request_timeout).await {
            Ok(response) => response,
            Err(e) => {
                return Err(AttemptFailure {
                    unreachable: is_unreachable(&e),
                    error: failed(e.to_string(), None),
                })
            }
        };

        if !(200..300).contains(&response.status) {
            return Err(failed(format!("HTTP Status [{}]", response.status), Some(response.status)).into());
        }

        let body = response.body;
        if body.is_empty() {
            return Err(failed("Empty response body".to_string(), None).into());
        }

        if looks_like_error_text(&body) {
            return Err(failed("Invalid audio content (error message received)".to_string(), Some(500)).into());
        }

        // декодер получает свою копию, исходные байты остаются для кэша
        let probe = body.clone();
        let decoded = tokio::task::spawn_blocking(move || decode::validate_audio(&probe))
            .await
            .map_err(|e| failed(format!("Validation task failed: {}", e), None))?;
        if let Err(e) = decoded {
            return Err(failed(format!("Invalid audio data ({})", e), None).into());
        }

        Ok(body)
    }

    fn spawn_cache_write(&self, text: &str, data: Bytes) {
        let cache = self.cache.clone();
        let key = text.to_string();
        let copy = Bytes::copy_from_slice(&data);
        tokio::spawn(async move {
            if let Err(e) = cache.put(&key, copy).await {
                warn!("Background cache save failed: {}", e);
            }
        });
    }

    fn jitter(&self) -> Duration {
        let (min, max) = (self.settings.jitter_min_ms, self.settings.jitter_max_ms);
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
