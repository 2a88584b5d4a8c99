//! Модуль с базовыми операциями над PCM
//!
//! Весь конвейер работает с моно 16-битными семплами на частоте
//! [`SAMPLE_RATE`]. Переход к f32 выполняется только на границах
//! декодирования и ресемплинга.

use crate::config::SAMPLE_RATE;

/// Моно PCM буфер (i16)
pub type Pcm = Vec<i16>;

/// Длительность буфера в секундах
pub fn duration_seconds(sample_count: usize) -> f64 {
    sample_count as f64 / SAMPLE_RATE as f64
}

/// Количество семплов для заданной длительности (с округлением вниз)
pub fn samples_for(seconds: f64) -> usize {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }
    (seconds * SAMPLE_RATE as f64).floor() as usize
}

/// Тишина заданной длительности
pub fn silence(seconds: f64) -> Pcm {
    silence_samples(samples_for(seconds))
}

/// Тишина заданной длины в семплах
pub fn silence_samples(count: usize) -> Pcm {
    vec![0; count]
}

/// Обрезка тишины в начале и конце буфера
///
/// Семпл считается тишиной, если его модуль меньше `threshold`.
/// Полностью тихий буфер превращается в пустой.
pub fn trim_silence(pcm: &[i16], threshold: i16) -> Pcm {
    let threshold = threshold as i32;
    let is_loud = |s: &i16| (*s as i32).abs() >= threshold;

    let Some(start) = pcm.iter().position(is_loud) else {
        return Vec::new();
    };
    let end = pcm.iter().rposition(is_loud).unwrap_or(start);
    pcm[start..=end].to_vec()
}

/// Склейка буферов в один
pub fn merge_buffers<B: AsRef<[i16]>>(buffers: &[B]) -> Pcm {
    let total: usize = buffers.iter().map(|b| b.as_ref().len()).sum();
    let mut merged = Vec::with_capacity(total);
    for buffer in buffers {
        merged.extend_from_slice(buffer.as_ref());
    }
    merged
}

/// Преобразование f32 семпла в i16 с ограничением диапазона
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Преобразование i16 семпла в f32
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Преобразование буфера f32 в PCM
pub fn float_to_pcm(samples: &[f32]) -> Pcm {
    samples.iter().map(|&s| f32_to_i16(s)).collect()
}

/// Преобразование PCM в буфер f32
pub fn pcm_to_float(pcm: &[i16]) -> Vec<f32> {
    pcm.iter().map(|&s| i16_to_f32(s)).collect()
}

/// Ограничение суммы до диапазона i16
pub fn clip_to_i16(value: f32) -> i16 {
    value.clamp(-32768.0, 32767.0) as i16
}
