//! Внешние источники звука: фоновая музыка и закадровый голос

use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::MixerSettings;
use crate::error::{Result, TtsMixdownError};
use crate::media::decode;
use crate::media::pcm::Pcm;

/// Трек фоновой музыки из каталога
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicTrack {
    pub id: u32,
    pub title: String,
    pub genre: String,
    pub url: String,
}

impl MusicTrack {
    fn new(id: u32, title: &str, genre: &str, url: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            genre: genre.to_string(),
            url: url.to_string(),
        }
    }
}

/// Встроенный каталог фоновых треков
pub fn default_catalog() -> Vec<MusicTrack> {
    const BASE: &str = "https://www.soundhelix.com/examples/mp3";
    [
        (1, "Dramatic Tension Builder", "Tension", 1),
        (2, "Funny Sneaky Snitch", "Comedy", 2),
        (3, "Sad Emotional Piano", "Emotional", 3),
        (4, "Horror Dark Ambience", "Horror", 8),
        (5, "Epic Action Trailer", "Epic", 10),
        (6, "Cyberpunk Sci-Fi Beat", "Electronic", 12),
        (7, "Detective Mystery", "Mystery", 14),
        (8, "Romantic Date Night", "Romance", 15),
    ]
    .iter()
    .map(|&(id, title, genre, song)| {
        MusicTrack::new(id, title, genre, &format!("{}/SoundHelix-Song-{}.mp3", BASE, song))
    })
    .collect()
}

/// Найти трек каталога по идентификатору
pub fn find_track(catalog: &[MusicTrack], id: u32) -> Option<&MusicTrack> {
    catalog.iter().find(|t| t.id == id)
}

/// Скачать закодированный трек
pub async fn fetch_track_bytes(
    client: &reqwest::Client,
    track: &MusicTrack,
    timeout: Duration,
) -> Result<Vec<u8>> {
    info!("Downloading background track {} ({})", track.id, track.title);
    let response = client.get(&track.url).timeout(timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TtsMixdownError::Other(format!(
            "Background track {} returned HTTP {}",
            track.id,
            status.as_u16()
        )));
    }
    Ok(response.bytes().await?.to_vec())
}

/// Декодировать музыку в PCM конвейера.
///
/// Затухания не применяются: их накладывает [`render_mix`](crate::media::mixer::render_mix).
pub fn prepare_music(bytes: &[u8]) -> Result<Pcm> {
    decode::decode_to_pcm(bytes)
}

/// Декодировать записанный закадровый голос
pub fn prepare_voice_over(bytes: &[u8]) -> Result<Pcm> {
    decode::decode_to_pcm(bytes)
}

/// Загрузить выбранный в настройках трек.
///
/// Ошибки загрузки не фатальны: сведение продолжается без музыки.
pub async fn load_selected_music(
    client: &reqwest::Client,
    catalog: &[MusicTrack],
    settings: &MixerSettings,
    timeout: Duration,
) -> Option<Pcm> {
    let id = settings.selected_track_id?;
    let Some(track) = find_track(catalog, id) else {
        warn!("Background track {} is not in the catalog", id);
        return None;
    };

    let loaded = match fetch_track_bytes(client, track, timeout).await {
        Ok(bytes) => prepare_music(&bytes),
        Err(e) => Err(e),
    };

    match loaded {
        Ok(pcm) => Some(pcm),
        Err(e) => {
            warn!("Failed to load background music: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SAMPLE_RATE;
    use crate::media::decode::tests::wav_bytes;
    use crate::media::{encode, mixer};
    use std::io::Cursor;

    #[test]
    fn test_catalog_ids_and_urls() {
        let catalog = default_catalog();
        assert_eq!(catalog.len(), 8);
        let ids: Vec<u32> = catalog.iter().map(|t| t.id).collect();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
        assert!(find_track(&catalog, 4).unwrap().url.ends_with("SoundHelix-Song-8.mp3"));
        assert!(find_track(&catalog, 42).is_none());
    }

    #[test]
    fn test_prepare_voice_over_resamples() {
        let pcm = prepare_voice_over(&wav_bytes(0.5, 16_000, 1)).unwrap();
        assert_eq!(pcm.len(), 12_000);
    }

    #[test]
    fn test_prepared_music_is_faded_once_by_mixer() {
        let music = vec![10_000i16; 6 * SAMPLE_RATE as usize];
        let mut wav = Cursor::new(Vec::new());
        encode::encode_wav(&music, &mut wav).unwrap();

        let prepared = prepare_music(wav.get_ref()).unwrap();
        assert_eq!(prepared.len(), music.len());
        let at_one_second = SAMPLE_RATE as usize;
        assert!(prepared[at_one_second] > 9_990);

        let settings = MixerSettings {
            music_gain: 1.0,
            fade_in: true,
            fade_out: false,
            ..MixerSettings::default()
        };
        let speech = vec![0i16; music.len()];
        let mixed = mixer::render_mix(&speech, Some(&prepared), None, &settings);
        let expected = prepared[at_one_second] / 2;
        assert!((mixed[at_one_second] - expected).abs() <= 2, "got {}", mixed[at_one_second]);

        assert!(prepare_music(b"not audio").is_err());
    }

    #[tokio::test]
    async fn test_no_selection_loads_nothing() {
        let client = reqwest::Client::new();
        let settings = MixerSettings::default();
        let loaded =
            load_selected_music(&client, &default_catalog(), &settings, Duration::from_millis(10)).await;
        assert!(loaded.is_none());
    }
}
