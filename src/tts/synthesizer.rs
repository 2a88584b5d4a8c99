//! Модуль озвучивания одного субтитра
//!
//! Текст субтитра режется на фрагменты, каждый фрагмент загружается и
//! декодируется, результат склеивается, очищается от тишины по краям,
//! подгоняется под глобальную скорость и дополняется тишиной до слота.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::MixdownConfig;
use crate::error::{Result, TtsMixdownError};
use crate::media::pcm::{self, Pcm};
use crate::media::{decode, stretch};
use crate::subtitle::Cue;
use crate::tts::chunker;
use crate::tts::fetch::FetchClient;

/// Результат озвучивания субтитра
#[derive(Debug, Clone)]
pub struct SynthesizedCue {
    pub pcm: Pcm,
    /// Фактический множитель скорости
    pub speed_factor: f32,
    /// Длительность результата в секундах
    pub generated_duration: f64,
}

/// Параметры синтеза
#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub speed_multiplier: f32,
    pub max_chunk_length: usize,
    pub silence_threshold: i16,
    pub retry_delay: Duration,
}

impl From<&MixdownConfig> for SynthesisSettings {
    fn from(config: &MixdownConfig) -> Self {
        Self {
            speed_multiplier: config.speed_multiplier,
            max_chunk_length: config.max_chunk_length,
            silence_threshold: config.silence_threshold,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

/// Синтезатор субтитров
pub struct CueSynthesizer {
    fetcher: Arc<FetchClient>,
    settings: SynthesisSettings,
}

impl CueSynthesizer {
    pub fn new(fetcher: Arc<FetchClient>, settings: SynthesisSettings) -> Self {
        Self { fetcher, settings }
    }

    pub fn fetcher(&self) -> &Arc<FetchClient> {
        &self.fetcher
    }

    pub fn settings(&self) -> &SynthesisSettings {
        &self.settings
    }

    /// Озвучить субтитр одной попыткой
    pub async fn synthesize(&self, cue: &Cue) -> Result<SynthesizedCue> {
        let mut chunks = Vec::new();
        for piece in chunker::split_text(&cue.text, self.settings.max_chunk_length) {
            let bytes = self.fetcher.fetch_chunk(&piece).await?;
            let decoded = tokio::task::spawn_blocking(move || decode::decode_to_pcm(&bytes))
                .await
                .map_err(|e| TtsMixdownError::AudioDecoding(format!("Decode task failed: {}", e)))??;
            chunks.push(decoded);
        }

        let merged = pcm::merge_buffers(&chunks);
        let threshold = self.settings.silence_threshold;
        let speed = self.settings.speed_multiplier;
        let slot = cue.slot_duration();

        let voice = tokio::task::spawn_blocking(move || shape_voice(&merged, threshold, speed, slot))
            .await
            .map_err(|e| TtsMixdownError::AudioProcessing(format!("Processing task failed: {}", e)))??;

        let generated_duration = pcm::duration_seconds(voice.len());
        debug!(
            "Cue {}: {} chunks, {:.3}s in a {:.3}s slot",
            cue.id,
            chunks.len(),
            generated_duration,
            slot
        );

        Ok(SynthesizedCue {
            pcm: voice,
            speed_factor: speed,
            generated_duration,
        })
    }

    /// Озвучить субтитр с одной повторной попыткой.
    ///
    /// Итоговая ошибка превращается в `CueSynthesisFailed` с исходным
    /// сообщением без изменений.
    pub async fn synthesize_with_retry(&self, cue: &Cue) -> Result<SynthesizedCue> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.synthesize(cue).await {
                Ok(result) => return Ok(result),
                Err(err) if attempt < 2 => {
                    warn!("Cue {} failed, retrying: {}", cue.id, err);
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                // все точки в бане: отдаем как есть, решение за планировщиком
                Err(err) if err.is_infrastructure() => return Err(err),
                Err(err) => {
                    info!("Cue {} failed after retry", cue.id);
                    return Err(TtsMixdownError::CueSynthesisFailed {
                        cue_id: cue.id,
                        rate_limited: err.is_rate_limited(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

/// Обрезка тишины, подгонка скорости и дополнение до слота.
///
/// Звук длиннее слота не обрезается.
pub fn shape_voice(merged: &[i16], silence_threshold: i16, speed_multiplier: f32, slot_seconds: f64) -> Result<Pcm> {
    let trimmed = pcm::trim_silence(merged, silence_threshold);
    let mut voice = stretch::apply_speed(&trimmed, speed_multiplier)?;

    let slot_samples = pcm::samples_for(slot_seconds);
    if voice.len() < slot_samples {
        voice.resize(slot_samples, 0);
    }
    Ok(voice)
}
