//! Модуль с моделью субтитра
//!
//! Субтитр (cue) - единица озвучивания со слотом на временной шкале.
//! Результаты синтеза хранятся рядом с ним и не меняют его идентичность.

use serde::{Deserialize, Serialize};

use crate::config::SAMPLE_RATE;
use crate::error::{Result, TtsMixdownError};

/// Субтитр с временным слотом
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Стабильный идентификатор
    pub id: u32,
    /// Начало слота в секундах
    pub start_seconds: f64,
    /// Конец слота в секундах
    pub end_seconds: f64,
    /// Текст для озвучивания
    pub text: String,
}

impl Cue {
    /// Создать новый экземпляр Cue
    pub fn new(id: u32, start_seconds: f64, end_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            id,
            start_seconds,
            end_seconds,
            text: text.into(),
        }
    }

    /// Длительность слота в секундах
    pub fn slot_duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Семпл, с которого субтитр должен начинаться на шкале
    pub fn start_sample(&self) -> usize {
        (self.start_seconds * SAMPLE_RATE as f64).floor().max(0.0) as usize
    }

    /// Проверить корректность слота
    pub fn validate(&self) -> Result<()> {
        if !self.start_seconds.is_finite() || !self.end_seconds.is_finite() {
            return Err(TtsMixdownError::InvalidCue(format!(
                "cue {} has non-finite timing",
                self.id
            )));
        }
        if self.start_seconds < 0.0 || self.start_seconds >= self.end_seconds {
            return Err(TtsMixdownError::InvalidCue(format!(
                "cue {} must satisfy 0 <= start < end (got {:.3} -> {:.3})",
                self.id, self.start_seconds, self.end_seconds
            )));
        }
        Ok(())
    }
}

/// Проверить список субтитров перед прогоном
pub fn validate_cue_list(cues: &[Cue]) -> Result<()> {
    let mut previous_start = 0.0;
    for cue in cues {
        cue.validate()?;
        if cue.start_seconds < previous_start {
            return Err(TtsMixdownError::InvalidCue(format!(
                "cue {} starts at {:.3}, before the previous cue ({:.3})",
                cue.id, cue.start_seconds, previous_start
            )));
        }
        previous_start = cue.start_seconds;
    }
    Ok(())
}

/// Состояние озвучивания субтитра
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CueStatus {
    /// Ожидает обработки
    #[default]
    Pending,
    /// Озвучен
    Success,
    /// Не удалось озвучить
    Error,
}

/// Метаданные синтеза для одного субтитра
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CueSynthesis {
    /// Состояние
    pub status: CueStatus,
    /// Фактический коэффициент скорости
    pub speed_factor: Option<f32>,
    /// Длительность полученного аудио в секундах
    pub generated_duration: Option<f64>,
    /// Сообщение об ошибке (вместе с URL эндпоинта)
    pub error_message: Option<String>,
}

impl CueSynthesis {
    /// Метаданные успешного синтеза
    pub fn success(speed_factor: f32, generated_duration: f64) -> Self {
        Self {
            status: CueStatus::Success,
            speed_factor: Some(speed_factor),
            generated_duration: Some(generated_duration),
            error_message: None,
        }
    }

    /// Метаданные неудачного синтеза
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: CueStatus::Error,
            speed_factor: None,
            generated_duration: None,
            error_message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_sample_floors() {
        let cue = Cue::new(1, 1.00004, 2.0, "text");
        assert_eq!(cue.start_sample(), 24_000);
        assert!((cue.slot_duration() - 0.99996).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_inverted_slot() {
        assert!(Cue::new(1, 2.0, 2.0, "x").validate().is_err());
        assert!(Cue::new(1, 3.0, 2.0, "x").validate().is_err());
        assert!(Cue::new(1, 0.0, 0.5, "x").validate().is_ok());
    }

    #[test]
    fn test_validate_cue_list_requires_ordered_starts() {
        let ordered = vec![Cue::new(1, 0.0, 1.0, "a"), Cue::new(2, 1.0, 2.0, "b")];
        assert!(validate_cue_list(&ordered).is_ok());

        let unordered = vec![Cue::new(1, 1.0, 2.0, "a"), Cue::new(2, 0.5, 3.0, "b")];
        assert!(validate_cue_list(&unordered).is_err());
    }
}
