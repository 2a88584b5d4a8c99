//! Основной файл библиотеки tts-mixdown с поддержкой системы прогресса и уведомлений
//!
//! Библиотека превращает размеченные по времени субтитры в одну моно дорожку:
//! синтезированная речь раскладывается по слотам субтитров и при желании
//! сводится с фоновой музыкой и записанным закадровым голосом.

pub mod config;
pub mod error;
pub mod media;
pub mod notification;
pub mod progress;
pub mod subtitle;
pub mod tts;
pub mod utils;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{MixdownConfig, MixerSettings};
use crate::error::{Result, TtsMixdownError};
use crate::media::pcm::Pcm;
use crate::media::sources::{self, MusicTrack};
use crate::media::{encode, mixer, timeline, Remixer};
use crate::progress::{ProcessStep, ProgressObserver, ProgressReporter, ProgressTracker};
use crate::subtitle::Cue;
use crate::tts::cache::{self, ChunkCache};
use crate::tts::fetch::{AudioTransport, FetchClient, FetchSettings, ReqwestTransport};
use crate::tts::router::EndpointRouter;
use crate::tts::scheduler::{RunReport, SynthesisScheduler};
use crate::tts::synthesizer::{CueSynthesizer, SynthesisSettings};

pub use crate::config::SAMPLE_RATE;
pub use crate::error::TtsMixdownError as Error;

/// Результат полного прогона
#[derive(Debug, Clone)]
pub struct MixdownOutput {
    /// Собранная речевая дорожка
    pub speech: Pcm,
    /// Итоговое сведение
    pub mixed: Pcm,
    /// Отчет о синтезе
    pub report: RunReport,
}

/// Основная структура для работы с библиотекой
pub struct TtsMixdown {
    config: MixdownConfig,
    router: Arc<EndpointRouter>,
    cache: Arc<dyn ChunkCache>,
    scheduler: SynthesisScheduler,
    progress_tracker: Arc<ProgressTracker>,
    http: reqwest::Client,
    catalog: Vec<MusicTrack>,
}

impl TtsMixdown {
    /// Создать новый экземпляр с указанной конфигурацией
    pub fn new(config: MixdownConfig) -> Result<Self> {
        let http = reqwest::Client::new();
        let transport = Arc::new(ReqwestTransport::new(http.clone()));
        Self::build(config, transport, http)
    }

    /// Создать экземпляр с собственным HTTP-транспортом
    pub fn with_transport(config: MixdownConfig, transport: Arc<dyn AudioTransport>) -> Result<Self> {
        Self::build(config, transport, reqwest::Client::new())
    }

    /// Создать экземпляр с репортером прогресса
    pub fn with_progress_reporter(config: MixdownConfig, reporter: Box<dyn ProgressReporter>) -> Result<Self> {
        let mixdown = Self::new(config)?;
        mixdown.set_progress_reporter(reporter);
        Ok(mixdown)
    }

    fn build(config: MixdownConfig, transport: Arc<dyn AudioTransport>, http: reqwest::Client) -> Result<Self> {
        config.validate()?;

        let router = Arc::new(EndpointRouter::new(config.router.clone(), &config.custom_proxies));
        let cache: Arc<dyn ChunkCache> = Arc::from(cache::from_config(&config.cache)?);
        let fetcher = Arc::new(FetchClient::new(
            router.clone(),
            cache.clone(),
            transport,
            FetchSettings::from(&config),
        ));
        let synthesizer = Arc::new(CueSynthesizer::new(fetcher, SynthesisSettings::from(&config)));
        let progress_tracker = Arc::new(ProgressTracker::new());
        let scheduler =
            SynthesisScheduler::new(synthesizer, config.progress_every).with_tracker(progress_tracker.clone());

        Ok(Self {
            config,
            router,
            cache,
            scheduler,
            progress_tracker,
            http,
            catalog: sources::default_catalog(),
        })
    }

    /// Текущая конфигурация
    pub fn config(&self) -> &MixdownConfig {
        &self.config
    }

    /// Роутер конечных точек (для диагностики)
    pub fn router(&self) -> &Arc<EndpointRouter> {
        &self.router
    }

    /// Каталог фоновых треков
    pub fn catalog(&self) -> &[MusicTrack] {
        &self.catalog
    }

    /// Установить репортер прогресса
    pub fn set_progress_reporter(&self, reporter: Box<dyn ProgressReporter>) {
        self.progress_tracker.set_reporter(reporter);
    }

    /// Добавить наблюдателя прогресса
    pub fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize {
        self.progress_tracker.add_observer(observer)
    }

    /// Заменить пользовательские прокси; адреса без http(s) отклоняются
    pub fn set_custom_proxies(&mut self, urls: Vec<String>) -> Result<usize> {
        if let Some(bad) = urls
            .iter()
            .map(|u| u.trim())
            .find(|u| !u.is_empty() && !config::is_valid_proxy_url(u))
        {
            return Err(TtsMixdownError::Configuration(format!("Invalid proxy URL: {}", bad)));
        }
        let count = self.router.set_custom_proxies(&urls);
        self.config.custom_proxies = urls;
        Ok(count)
    }

    /// Заменить настройки сведения
    pub fn set_mixer_settings(&mut self, settings: MixerSettings) {
        self.config.mixer = settings;
    }

    /// Очистить кэш фрагментов, вернуть количество удаленных записей
    pub async fn clear_cache(&self) -> Result<usize> {
        self.cache.clear().await
    }

    /// Озвучить все субтитры
    pub async fn synthesize(&self, cues: &[Cue]) -> Result<RunReport> {
        subtitle::validate_cue_list(cues)?;

        let tracker = &self.progress_tracker;
        tracker.set_step(ProcessStep::Synthesis);
        tracker.update_step_progress(0.0, Some(format!("Синтез {} субтитров", cues.len())));

        self.scheduler.run(cues, self.config.concurrency_limit).await.map_err(|e| {
            log::error!("Synthesis run failed: {}", e);
            e
        })
    }

    /// Собрать речевую дорожку из отчета о синтезе
    pub fn assemble(&self, cues: &[Cue], report: &RunReport) -> Pcm {
        let tracker = &self.progress_tracker;
        tracker.set_step(ProcessStep::Assembly);
        let speech = timeline::assemble(cues, &report.audio);
        tracker.update_step_progress(100.0, Some("Временная шкала собрана".to_string()));
        speech
    }

    /// Загрузить выбранный в настройках фоновый трек
    pub async fn load_music(&self) -> Option<Pcm> {
        sources::load_selected_music(
            &self.http,
            &self.catalog,
            &self.config.mixer,
            Duration::from_millis(self.config.request_timeout_ms.max(30_000)),
        )
        .await
    }

    /// Свести речь с музыкой и голосом по текущим настройкам
    pub fn mix(&self, speech: &[i16], music: Option<&[i16]>, voice_over: Option<&[i16]>) -> Pcm {
        let tracker = &self.progress_tracker;
        tracker.set_step(ProcessStep::Mixing);
        let mixed = mixer::render_mix(speech, music, voice_over, &self.config.mixer);
        tracker.update_step_progress(100.0, Some("Сведение завершено".to_string()));
        mixed
    }

    /// Полный прогон: синтез, сборка, сведение.
    ///
    /// `music` передается без затуханий, они применяются по настройкам.
    pub async fn render(&self, cues: &[Cue], music: Option<&[i16]>, voice_over: Option<&[i16]>) -> Result<MixdownOutput> {
        log::info!("Starting mixdown of {} cues", cues.len());

        let report = self.synthesize(cues).await?;
        let speech = self.assemble(cues, &report);
        let mixed = self.mix(&speech, music, voice_over);

        log::info!("Mixdown finished: {}", report.summary());
        Ok(MixdownOutput { speech, mixed, report })
    }

    /// Пересводчик для повторного сведения без нового синтеза
    pub fn remixer(&self, speech: Pcm, music: Option<Pcm>, voice_over: Option<Pcm>) -> Remixer {
        let remixer = Remixer::new(Duration::from_millis(self.config.remix_debounce_ms));
        remixer.set_speech(speech);
        remixer.set_music(music);
        remixer.set_voice_over(voice_over);
        remixer
    }

    /// Записать сведение в WAV
    pub fn write_wav<P: AsRef<Path>>(&self, pcm: &[i16], path: P) -> Result<()> {
        let tracker = &self.progress_tracker;
        tracker.set_step(ProcessStep::Encoding);
        encode::write_wav_file(pcm, path)?;
        tracker.complete();
        Ok(())
    }
}

/// Публичный API для удобного использования: SRT-файл → WAV-файл
pub async fn mixdown_srt_file<P: AsRef<Path>, Q: AsRef<Path>>(
    srt_path: P,
    output_wav: Q,
    config: MixdownConfig,
) -> Result<MixdownOutput> {
    let cues = subtitle::parser::parse_srt_file(srt_path)?;
    let mixdown = TtsMixdown::new(config)?;

    let music = mixdown.load_music().await;
    let output = mixdown.render(&cues, music.as_deref(), None).await?;
    mixdown.write_wav(&output.mixed, output_wav)?;
    Ok(output)
}

/// Публичный API с поддержкой отслеживания прогресса
pub async fn mixdown_srt_file_with_progress<P: AsRef<Path>, Q: AsRef<Path>>(
    srt_path: P,
    output_wav: Q,
    config: MixdownConfig,
    reporter: Box<dyn ProgressReporter>,
) -> Result<MixdownOutput> {
    let cues = subtitle::parser::parse_srt_file(srt_path)?;
    let mixdown = TtsMixdown::with_progress_reporter(config, reporter)?;

    let music = mixdown.load_music().await;
    let output = mixdown.render(&cues, music.as_deref(), None).await?;
    mixdown.write_wav(&output.mixed, output_wav)?;
    Ok(output)
}
