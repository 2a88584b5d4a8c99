//! Модуль ресемплинга и изменения длительности
//!
//! Изменение длительности выполняется как изменение скорости воспроизведения:
//! буфер пересчитывается Rubato в новую длину и проигрывается на той же
//! частоте, поэтому вместе с темпом смещается и высота тона.

use std::cmp;

use log::{debug, info};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::{Result, TtsMixdownError};
use crate::media::pcm::{self, Pcm};

/// Допуск, при котором длительность не корректируется (секунды)
pub const DURATION_TOLERANCE: f64 = 0.05;

const SINC_LEN: usize = 128;
const CHUNK_SIZE: usize = 1024;

/// Пересчитать буфер f32 в буфер ровно `target_len` семплов.
///
/// Задержка sinc-фильтра компенсируется, хвост дополняется нулями или
/// обрезается до точной длины.
pub fn resample_to_length(input: &[f32], target_len: usize) -> Result<Vec<f32>> {
    if input.is_empty() || target_len == 0 {
        return Ok(vec![0.0; target_len]);
    }
    if target_len == input.len() {
        return Ok(input.to_vec());
    }

    let ratio = target_len as f64 / input.len() as f64;

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_SIZE, 1)
        .map_err(|e| TtsMixdownError::AudioProcessing(format!("Rubato init failed: {}", e)))?;

    let delay = (SINC_LEN as f64 / 2.0 * ratio).round() as usize;
    let wanted = target_len + delay;
    let mut output: Vec<f32> = Vec::with_capacity(wanted + CHUNK_SIZE);

    // Блоки фиксированного размера; последний и "промывочные" блоки заполняются нулями
    let mut idx = 0;
    while output.len() < wanted {
        let frames = resampler.input_frames_next();
        let mut block = vec![0.0f32; frames];
        if idx < input.len() {
            let take = cmp::min(frames, input.len() - idx);
            block[..take].copy_from_slice(&input[idx..idx + take]);
            idx += take;
        }

        let processed = resampler
            .process(&[block], None)
            .map_err(|e| TtsMixdownError::AudioProcessing(format!("Rubato processing failed: {}", e)))?;
        output.extend_from_slice(&processed[0]);
    }

    let mut result: Vec<f32> = output.into_iter().skip(delay).take(target_len).collect();
    result.resize(target_len, 0.0);
    Ok(result)
}

/// Пересчитать буфер из одной частоты дискретизации в другую
pub fn resample_rate(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == 0 || to_rate == 0 {
        return Err(TtsMixdownError::AudioProcessing(format!(
            "Invalid sample rates: {} -> {}",
            from_rate, to_rate
        )));
    }
    if from_rate == to_rate {
        return Ok(input.to_vec());
    }
    let target_len = (input.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    debug!("Resampling {} samples {} Hz -> {} Hz", input.len(), from_rate, to_rate);
    resample_to_length(input, target_len)
}

/// Подогнать PCM к целевой длительности изменением скорости воспроизведения
///
/// Если текущая длительность отличается от целевой меньше чем на
/// [`DURATION_TOLERANCE`], буфер возвращается без изменений.
pub fn stretch_to_duration(pcm: &[i16], target_seconds: f64) -> Result<Pcm> {
    let current = pcm::duration_seconds(pcm.len());
    if pcm.is_empty() || (current - target_seconds).abs() < DURATION_TOLERANCE {
        return Ok(pcm.to_vec());
    }

    let target_len = (pcm.len() as f64 * target_seconds / current).floor() as usize;
    info!(
        "Stretching {:.3}s -> {:.3}s (playback rate {:.3})",
        current,
        target_seconds,
        current / target_seconds
    );

    let stretched = resample_to_length(&pcm::pcm_to_float(pcm), target_len)?;
    Ok(pcm::float_to_pcm(&stretched))
}

/// Подогнать PCM к глобальному множителю скорости
pub fn apply_speed(pcm: &[i16], speed_multiplier: f32) -> Result<Pcm> {
    if (speed_multiplier - 1.0).abs() < f32::EPSILON {
        return Ok(pcm.to_vec());
    }
    let desired = pcm::duration_seconds(pcm.len()) / speed_multiplier as f64;
    stretch_to_duration(pcm, desired)
}
