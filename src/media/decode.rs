//! Модуль декодирования аудио
//!
//! Преобразует закодированные байты (MP3, WAV, AAC) в моно PCM на частоте
//! конвейера. Декодер работает с собственной копией входных данных, поэтому
//! исходный буфер остается нетронутым и пригодным для кэша.

use std::io::Cursor;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::SAMPLE_RATE;
use crate::error::{Result, TtsMixdownError};
use crate::media::pcm::{self, Pcm};
use crate::media::stretch;

/// Декодированный моно сигнал
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Семплы f32 в диапазоне [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Исходная частота дискретизации
    pub sample_rate: u32,
}

/// Декодирует аудиоданные в моно f32.
///
/// Многоканальный сигнал сводится в моно усреднением каналов.
/// Ошибка возвращается, если формат не распознан, нет аудио-трека или
/// не удалось получить ни одного семпла.
pub fn decode_audio(data: &[u8]) -> Result<DecodedAudio> {
    if data.is_empty() {
        return Err(TtsMixdownError::AudioDecoding("Empty audio buffer".to_string()));
    }

    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let format_opts = FormatOptions {
        enable_gapless: false,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&Hint::new(), mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| TtsMixdownError::AudioDecoding(format!("Unrecognized audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| TtsMixdownError::AudioDecoding("No audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions { verify: false })
        .map_err(|e| TtsMixdownError::AudioDecoding(format!("Unsupported codec: {}", e)))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut mono = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                warn!("Stopping decode on container error: {}", e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if sample_rate == 0 {
                    sample_rate = spec.rate;
                }
                let channels = spec.channels.count().max(1);

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_planar_ref(decoded);
                let samples = sample_buf.samples();

                if channels > 1 {
                    let frames = samples.len() / channels;
                    for frame in 0..frames {
                        let sum: f32 = (0..channels).map(|ch| samples[ch * frames + frame]).sum();
                        mono.push(sum / channels as f32);
                    }
                } else {
                    mono.extend_from_slice(samples);
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => {
                return Err(TtsMixdownError::AudioDecoding(format!("Decoder failed: {}", e)));
            }
        }
    }

    if mono.is_empty() || sample_rate == 0 {
        return Err(TtsMixdownError::AudioDecoding(
            "Audio stream contained no decodable samples".to_string(),
        ));
    }

    debug!("Decoded {} samples at {} Hz", mono.len(), sample_rate);
    Ok(DecodedAudio {
        samples: mono,
        sample_rate,
    })
}

/// Декодирует данные и приводит их к PCM на частоте конвейера
pub fn decode_to_pcm(data: &[u8]) -> Result<Pcm> {
    let decoded = decode_audio(data)?;
    let samples = stretch::resample_rate(&decoded.samples, decoded.sample_rate, SAMPLE_RATE)?;
    Ok(pcm::float_to_pcm(&samples))
}

/// Структурная проверка: удается ли вообще декодировать данные
pub fn validate_audio(data: &[u8]) -> Result<()> {
    decode_audio(data).map(|_| ())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// WAV-файл с синусом, пригодный для декодера
    pub(crate) fn wav_bytes(seconds: f32, rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (seconds * rate as f32) as usize;
            for i in 0..frames {
                let t = i as f32 / rate as f32;
                let value = (0.5 * (2.0 * std::f32::consts::PI * 330.0 * t).sin() * 32767.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_mono() {
        let decoded = decode_audio(&wav_bytes(0.5, SAMPLE_RATE, 1)).unwrap();
        assert_eq!(decoded.sample_rate, SAMPLE_RATE);
        assert_eq!(decoded.samples.len(), 12_000);
    }

    #[test]
    fn test_decode_stereo_downmixes() {
        let decoded = decode_audio(&wav_bytes(0.25, SAMPLE_RATE, 2)).unwrap();
        assert_eq!(decoded.samples.len(), 6_000);
    }

    #[test]
    fn test_decode_to_pcm_resamples() {
        let pcm = decode_to_pcm(&wav_bytes(1.0, 48_000, 1)).unwrap();
        assert_eq!(pcm.len(), 24_000);
    }

    #[test]
    fn test_html_is_rejected() {
        let html = b"<!DOCTYPE html><html><body>Too many requests</body></html>".repeat(10);
        assert!(validate_audio(&html).is_err());
        assert!(validate_audio(&[]).is_err());
    }
}
