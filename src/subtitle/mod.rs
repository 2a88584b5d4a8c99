//! Модуль для работы с субтитрами
//!
//! Модель субтитра и чтение входных данных (SRT, простой текст).

pub mod cue;
pub mod parser;

pub use cue::{validate_cue_list, Cue, CueStatus, CueSynthesis};
