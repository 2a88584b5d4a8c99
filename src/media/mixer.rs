//! Модуль сведения дорожек
//!
//! Речь, фоновая музыка и закадровый голос суммируются посемплово с
//! жестким ограничением до диапазона i16. Музыка зацикливается и никогда
//! не удлиняет результат.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use rayon::prelude::*;
use tokio::sync::watch;

use crate::config::{MixerSettings, SAMPLE_RATE};
use crate::media::pcm::{self, Pcm};

/// Длительность нарастания и затухания музыки (секунды)
pub const FADE_SECONDS: u32 = 2;

/// Линейное нарастание в начале и/или затухание в конце трека
pub fn apply_fade(music: &[i16], fade_in: bool, fade_out: bool) -> Pcm {
    let mut out = music.to_vec();
    let len = out.len();
    let fade_samples = (FADE_SECONDS * SAMPLE_RATE) as usize;

    if fade_in {
        for (i, sample) in out.iter_mut().enumerate().take(fade_samples.min(len)) {
            let gain = i as f32 / fade_samples as f32;
            *sample = (*sample as f32 * gain) as i16;
        }
    }

    if fade_out {
        // короткий трек затухает с полной громкости, но не доходит до нуля
        let start = len.saturating_sub(fade_samples);
        for (offset, sample) in out[start..].iter_mut().enumerate() {
            let gain = 1.0 - offset as f32 / fade_samples as f32;
            *sample = (*sample as f32 * gain) as i16;
        }
    }

    out
}

/// Свести дорожки в одну.
///
/// Длина результата равна максимуму из длин речи и закадрового голоса.
/// Музыка участвует только при ненулевом усилении и зацикливается.
pub fn mix(
    speech: &[i16],
    music: Option<&[i16]>,
    voice_over: Option<&[i16]>,
    settings: &MixerSettings,
) -> Pcm {
    let voice_len = voice_over.map_or(0, |v| v.len());
    let len = speech.len().max(voice_len);

    let music = music.filter(|m| !m.is_empty() && settings.music_gain > 0.0);

    (0..len)
        .into_par_iter()
        .map(|i| {
            let mut sum = 0.0f32;
            if let Some(&s) = speech.get(i) {
                sum += s as f32 * settings.speech_gain;
            }
            if let Some(&v) = voice_over.and_then(|v| v.get(i)) {
                sum += v as f32 * settings.voice_over_gain;
            }
            if let Some(m) = music {
                sum += m[i % m.len()] as f32 * settings.music_gain;
            }
            pcm::clip_to_i16(sum)
        })
        .collect()
}

/// Затухания по настройкам и сведение в одном вызове
pub fn render_mix(
    speech: &[i16],
    music: Option<&[i16]>,
    voice_over: Option<&[i16]>,
    settings: &MixerSettings,
) -> Pcm {
    let faded = music.map(|m| apply_fade(m, settings.fade_in, settings.fade_out));
    let mixed = mix(speech, faded.as_deref(), voice_over, settings);
    debug!(
        "Mixed {} samples (music: {}, voice-over: {})",
        mixed.len(),
        music.is_some(),
        voice_over.is_some()
    );
    mixed
}

#[derive(Default)]
struct RemixSources {
    speech: Arc<Pcm>,
    music: Option<Arc<Pcm>>,
    voice_over: Option<Arc<Pcm>>,
}

/// Пересведение с подавлением дребезга.
///
/// Каждый запрос получает номер поколения; запрос, который перекрыт более
/// новым в пределах окна ожидания, отбрасывается. Результат публикуется
/// через `watch`-канал, подписчики видят только последнее сведение.
pub struct Remixer {
    sources: Arc<Mutex<RemixSources>>,
    generation: Arc<AtomicU64>,
    debounce: Duration,
    sender: Arc<watch::Sender<Option<Arc<Pcm>>>>,
}

impl Remixer {
    /// Создать пересводчик с заданным окном ожидания
    pub fn new(debounce: Duration) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sources: Arc::new(Mutex::new(RemixSources::default())),
            generation: Arc::new(AtomicU64::new(0)),
            debounce,
            sender: Arc::new(sender),
        }
    }

    /// Заменить собранную речевую дорожку (новый прогон синтеза)
    pub fn set_speech(&self, speech: Pcm) {
        self.sources.lock().speech = Arc::new(speech);
    }

    /// Заменить фоновую музыку (без затуханий, они берутся из настроек)
    pub fn set_music(&self, music: Option<Pcm>) {
        self.sources.lock().music = music.map(Arc::new);
    }

    /// Заменить закадровый голос
    pub fn set_voice_over(&self, voice_over: Option<Pcm>) {
        self.sources.lock().voice_over = voice_over.map(Arc::new);
    }

    /// Подписаться на результаты сведения
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Pcm>>> {
        self.sender.subscribe()
    }

    /// Последний опубликованный результат
    pub fn latest(&self) -> Option<Arc<Pcm>> {
        self.sender.borrow().clone()
    }

    /// Свести немедленно, без ожидания
    pub fn remix_now(&self, settings: &MixerSettings) -> Arc<Pcm> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mixed = Arc::new(Self::render(&self.sources, settings));
        self.sender.send_replace(Some(mixed.clone()));
        mixed
    }

    /// Запросить пересведение с последними настройками.
    ///
    /// Должен вызываться внутри tokio runtime.
    pub fn request(&self, settings: MixerSettings) {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        let sources = self.sources.clone();
        let sender = self.sender.clone();
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if generation.load(Ordering::SeqCst) != my_generation {
                debug!("Remix request {} superseded", my_generation);
                return;
            }

            let render_sources = sources.clone();
            let mixed = match tokio::task::spawn_blocking(move || Self::render(&render_sources, &settings)).await {
                Ok(mixed) => mixed,
                Err(e) => {
                    log::error!("Remix task failed: {}", e);
                    return;
                }
            };

            if generation.load(Ordering::SeqCst) == my_generation {
                info!("Remix {} published ({} samples)", my_generation, mixed.len());
                sender.send_replace(Some(Arc::new(mixed)));
            }
        });
    }

    fn render(sources: &Mutex<RemixSources>, settings: &MixerSettings) -> Pcm {
        let (speech, music, voice_over) = {
            let guard = sources.lock();
            (guard.speech.clone(), guard.music.clone(), guard.voice_over.clone())
        };
        render_mix(&speech, music.as_deref().map(|m| m.as_slice()), voice_over.as_deref().map(|v| v.as_slice()), settings)
    }
}
