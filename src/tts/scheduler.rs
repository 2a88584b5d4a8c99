//! Модуль планирования синтеза
//!
//! Общая очередь субтитров разбирается фиксированным числом задач Tokio.
//! Извлечение из очереди - единственная точка строгой взаимоисключающей
//! блокировки. Прогон завершается только когда все задачи остановились.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{Result, TtsMixdownError};
use crate::media::pcm::Pcm;
use crate::progress::{ProgressTracker, RunCounters};
use crate::subtitle::{Cue, CueStatus, CueSynthesis};
use crate::tts::synthesizer::CueSynthesizer;

/// Отказ по одному субтитру
#[derive(Debug, Clone, PartialEq)]
pub struct CueFailure {
    pub cue_id: u32,
    pub message: String,
    /// Код ответа указывает на ограничение со стороны провайдера
    pub rate_limited: bool,
}

/// Итог прогона синтеза
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Звук субтитров в исходном порядке; `None` для неудачных
    pub audio: Vec<Option<Pcm>>,
    /// Состояние каждого субтитра в исходном порядке
    pub outcomes: Vec<CueSynthesis>,
    /// Идентификаторы неудачных субтитров в порядке завершения
    pub failed_ids: Vec<u32>,
    pub failures: Vec<CueFailure>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == CueStatus::Success).count()
    }

    pub fn failed(&self) -> usize {
        self.failed_ids.len()
    }

    /// Есть ли отказы, похожие на ограничение частоты запросов
    pub fn has_rate_limited_failures(&self) -> bool {
        self.failures.iter().any(|f| f.rate_limited)
    }

    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at).to_std().unwrap_or_default()
    }

    /// Краткая сводка для пользователя
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Run {}: {}/{} cues synthesized, {} failed in {:.1}s",
            self.run_id,
            self.succeeded(),
            self.total(),
            self.failed(),
            self.elapsed().as_secs_f64()
        );
        if self.has_rate_limited_failures() {
            summary.push_str(". Some failures look like provider throttling (HTTP 403/429): add custom proxies or wait a few minutes");
        }
        summary
    }
}

struct RunState {
    completed: usize,
    failed_ids: Vec<u32>,
    failures: Vec<CueFailure>,
    audio: Vec<Option<Pcm>>,
    outcomes: Vec<CueSynthesis>,
    any_success: bool,
}

/// Планировщик синтеза
pub struct SynthesisScheduler {
    synthesizer: Arc<CueSynthesizer>,
    progress_every: usize,
    tracker: Option<Arc<ProgressTracker>>,
    latest: Arc<Mutex<RunCounters>>,
}

impl SynthesisScheduler {
    pub fn new(synthesizer: Arc<CueSynthesizer>, progress_every: usize) -> Self {
        Self {
            synthesizer,
            progress_every: progress_every.max(1),
            tracker: None,
            latest: Arc::new(Mutex::new(RunCounters::default())),
        }
    }

    /// Подключить трекер прогресса
    pub fn with_tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Последние опубликованные счетчики
    pub fn progress(&self) -> RunCounters {
        *self.latest.lock()
    }

    /// Озвучить все субтитры не более чем `limit` задачами одновременно.
    ///
    /// Ошибки отдельных субтитров не прерывают прогон. Прогон прерывается
    /// с `NoEndpointsAvailable`, если все точки оказались в бане до первого
    /// успешного субтитра.
    pub async fn run(&self, cues: &[Cue], limit: usize) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let total = cues.len();
        let workers = limit.max(1).min(total);

        info!("Run {}: synthesizing {} cues with {} workers", run_id, total, workers);

        let queue: Arc<Mutex<VecDeque<(usize, Cue)>>> =
            Arc::new(Mutex::new(cues.iter().cloned().enumerate().collect()));
        let state = Arc::new(Mutex::new(RunState {
            completed: 0,
            failed_ids: Vec::new(),
            failures: Vec::new(),
            audio: vec![None; total],
            outcomes: vec![CueSynthesis::default(); total],
            any_success: false,
        }));
        let aborted = Arc::new(AtomicBool::new(false));
        *self.latest.lock() = RunCounters {
            total,
            ..RunCounters::default()
        };

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let queue = queue.clone();
            let state = state.clone();
            let aborted = aborted.clone();
            let synthesizer = self.synthesizer.clone();
            let tracker = self.tracker.clone();
            let latest = self.latest.clone();
            let progress_every = self.progress_every;

            handles.push(tokio::spawn(async move {
                loop {
                    if aborted.load(Ordering::SeqCst) {
                        break;
                    }
                    let Some((index, cue)) = queue.lock().pop_front() else {
                        break;
                    };
                    debug!("Worker {} took cue {}", worker, cue.id);

                    let result = synthesizer.synthesize_with_retry(&cue).await;

                    let counters = {
                        let mut state = state.lock();
                        state.completed += 1;
                        match result {
                            Ok(voice) => {
                                state.any_success = true;
                                state.outcomes[index] =
                                    CueSynthesis::success(voice.speed_factor, voice.generated_duration);
                                state.audio[index] = Some(voice.pcm);
                            }
                            Err(err) => {
                                if err.is_infrastructure() && !state.any_success {
                                    aborted.store(true, Ordering::SeqCst);
                                }
                                warn!("Cue {} failed: {}", cue.id, err);
                                state.failed_ids.push(cue.id);
                                state.failures.push(failure_of(cue.id, &err));
                                state.outcomes[index] = CueSynthesis::failure(failure_message(&err));
                            }
                        }

                        let completed = state.completed;
                        let report = completed % progress_every == 0 || completed == total;
                        report.then(|| {
                            let elapsed = clock.elapsed().as_secs_f64();
                            let average = elapsed / completed as f64;
                            RunCounters {
                                completed,
                                total,
                                failed: state.failed_ids.len(),
                                eta_seconds: Some(average * (total - completed) as f64),
                            }
                        })
                    };

                    if let Some(counters) = counters {
                        *latest.lock() = counters;
                        info!(
                            "Progress: {}/{} cues, {} failed, ETA {:.0}s",
                            counters.completed,
                            counters.total,
                            counters.failed,
                            counters.eta_seconds.unwrap_or_default()
                        );
                        if let Some(tracker) = &tracker {
                            tracker.update_run_progress(counters, None);
                        }
                    }
                }
            }));
        }

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!("Synthesis worker crashed: {}", e);
            }
        }

        if aborted.load(Ordering::SeqCst) {
            error!("Run {} aborted: no endpoints available", run_id);
            return Err(TtsMixdownError::NoEndpointsAvailable);
        }

        let mut state = state.lock();
        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            audio: std::mem::take(&mut state.audio),
            outcomes: std::mem::take(&mut state.outcomes),
            failed_ids: std::mem::take(&mut state.failed_ids),
            failures: std::mem::take(&mut state.failures),
        };
        info!("{}", report.summary());
        Ok(report)
    }
}

/// Сообщение об ошибке без обертки уровня субтитра
fn failure_message(err: &TtsMixdownError) -> String {
    match err {
        TtsMixdownError::CueSynthesisFailed { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn failure_of(cue_id: u32, err: &TtsMixdownError) -> CueFailure {
    CueFailure {
        cue_id,
        message: failure_message(err),
        rate_limited: err.is_rate_limited(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::media::decode::tests::wav_bytes;
    use crate::notification::MemoryProgressObserver;
    use crate::tts::cache::MemoryChunkCache;
    use crate::tts::fetch::tests::{quick_settings, test_endpoints, ScriptedTransport};
    use crate::tts::fetch::{FetchClient, TransportResponse};
    use crate::tts::router::EndpointRouter;
    use crate::tts::synthesizer::SynthesisSettings;
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Отвечает аудио на любой запрос, кроме текста со словом "broken"
    struct SelectiveTransport {
        audio: Bytes,
    }

    #[async_trait]
    impl crate::tts::fetch::AudioTransport for SelectiveTransport {
        async fn get(&self, url: &str, _timeout: Duration) -> Result<TransportResponse> {
            tokio::time::sleep(Duration::from_millis(2)).await;
            if url.contains("broken") {
                return Ok(TransportResponse {
                    status: 503,
                    body: Bytes::from_static(b"unavailable"),
                });
            }
            Ok(TransportResponse {
                status: 200,
                body: self.audio.clone(),
            })
        }
    }

    fn scheduler(transport: Arc<dyn crate::tts::fetch::AudioTransport>, endpoints: usize) -> SynthesisScheduler {
        // мягкий бан отключен, иначе неудачные субтитры выбивают общие точки
        let config = RouterConfig {
            soft_ban_failures: u32::MAX,
            ..RouterConfig::default()
        };
        let router = Arc::new(EndpointRouter::with_endpoints(config, test_endpoints(endpoints)));
        let fetcher = Arc::new(FetchClient::new(
            router,
            Arc::new(MemoryChunkCache::new(100)),
            transport,
            quick_settings(),
        ));
        let synthesizer = Arc::new(CueSynthesizer::new(
            fetcher,
            SynthesisSettings {
                speed_multiplier: 1.0,
                max_chunk_length: 180,
                silence_threshold: 500,
                retry_delay: Duration::from_millis(1),
            },
        ));
        SynthesisScheduler::new(synthesizer, 5)
    }

    #[tokio::test]
    async fn test_run_keeps_order_and_failures() {
        let transport = Arc::new(SelectiveTransport {
            audio: Bytes::from(wav_bytes(0.2, 24_000, 1)),
        });
        let scheduler = scheduler(transport, 3);
        let cues: Vec<Cue> = (0..12)
            .map(|i| {
                let text = if i == 4 || i == 9 { format!("broken {}", i) } else { format!("cue {}", i) };
                Cue::new(i + 1, i as f64, i as f64 + 1.0, text)
            })
            .collect();

        let report = scheduler.run(&cues, 4).await.unwrap();
        assert_eq!(report.total(), 12);
        assert_eq!(report.succeeded(), 10);

        let mut failed = report.failed_ids.clone();
        failed.sort_unstable();
        assert_eq!(failed, vec![5, 10]);
        assert!(report.audio[4].is_none());
        assert_eq!(report.audio[0].as_ref().unwrap().len(), 24_000);
        assert_eq!(report.outcomes[9].status, CueStatus::Error);
        assert!(report.failures.iter().all(|f| f.message.contains("HTTP Status [503]")));

        let progress = scheduler.progress();
        assert_eq!(progress.completed, 12);
        assert_eq!(progress.failed, 2);
        assert_eq!(progress.eta_seconds, Some(0.0));
    }

    #[tokio::test]
    async fn test_progress_reported_every_fifth_and_final() {
        let transport = Arc::new(SelectiveTransport {
            audio: Bytes::from(wav_bytes(0.1, 24_000, 1)),
        });
        let tracker = Arc::new(ProgressTracker::new());
        let observer = MemoryProgressObserver::new();
        tracker.add_observer(Box::new(observer.clone()));
        let scheduler = scheduler(transport, 2).with_tracker(tracker);

        let cues: Vec<Cue> = (0..12).map(|i| Cue::new(i, i as f64, i as f64 + 0.5, "x")).collect();
        scheduler.run(&cues, 30).await.unwrap();

        let completed: Vec<usize> = observer
            .history()
            .iter()
            .filter_map(|p| p.counters.map(|c| c.completed))
            .collect();
        assert_eq!(completed, vec![5, 10, 12]);
    }

    #[tokio::test]
    async fn test_all_banned_aborts_run() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let scheduler = scheduler(transport.clone(), 2);
        let router = scheduler.synthesizer.fetcher().router().clone();
        router.record_outcome("ep0", false, Some(429));
        router.record_outcome("ep1", false, Some(403));

        let cues = vec![Cue::new(1, 0.0, 1.0, "a"), Cue::new(2, 1.0, 2.0, "b")];
        let err = scheduler.run(&cues, 1).await.unwrap_err();
        assert!(matches!(err, TtsMixdownError::NoEndpointsAvailable));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_run() {
        let scheduler = scheduler(Arc::new(ScriptedTransport::new(vec![])), 1);
        let report = scheduler.run(&[], 30).await.unwrap();
        assert_eq!(report.total(), 0);
        assert!(report.summary().contains("0/0"));
    }
}
