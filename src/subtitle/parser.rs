//! Модуль для парсинга субтитров
//!
//! Этот модуль содержит функции для чтения SRT файлов и превращения
//! простого текста в список субтитров с оценочными слотами.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Result, TtsMixdownError};
use crate::subtitle::cue::Cue;

lazy_static! {
    static ref TIMING_RE: Regex =
        Regex::new(r"(\d{2}):(\d{2}):(\d{2}),(\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2}),(\d{3})").unwrap();
    static ref HTML_TAG_RE: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref SENTENCE_RE: Regex = Regex::new(r"[.!?]\s+|\n+").unwrap();
}

/// Символов в секунду при оценке длительности простого текста
const CHARS_PER_SECOND: f64 = 12.0;
/// Минимальная длительность оценочного слота
const MIN_ESTIMATED_DURATION: f64 = 2.0;

/// Парсинг SRT файла
pub fn parse_srt_file<P: AsRef<Path>>(srt_file_path: P) -> Result<Vec<Cue>> {
    let content = std::fs::read_to_string(&srt_file_path).map_err(|e| {
        TtsMixdownError::SubtitleParsing(format!(
            "Failed to open SRT file {}: {}",
            srt_file_path.as_ref().display(),
            e
        ))
    })?;
    parse_srt(&content)
}

/// Парсинг содержимого SRT
///
/// Блоки без распознанной строки времени или с пустым текстом пропускаются.
pub fn parse_srt(data: &str) -> Result<Vec<Cue>> {
    let normalized = data.replace("\r\n", "\n").replace('\r', "\n");
    let mut cues = Vec::new();

    for block in normalized.trim().split("\n\n") {
        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 3 {
            continue;
        }

        let Some(caps) = TIMING_RE.captures(lines[1]) else {
            continue;
        };
        let field = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
        let start = timestamp_to_seconds(field(1), field(2), field(3), field(4));
        let end = timestamp_to_seconds(field(5), field(6), field(7), field(8));

        let joined = lines[2..].join(" ");
        let text = HTML_TAG_RE.replace_all(&joined, "");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        let id = lines[0]
            .trim()
            .parse::<u32>()
            .unwrap_or(cues.len() as u32 + 1);
        cues.push(Cue::new(id, start, end, text));
    }

    if cues.is_empty() && !normalized.trim().is_empty() {
        return Err(TtsMixdownError::SubtitleParsing(
            "No valid SRT blocks found".to_string(),
        ));
    }

    log::info!("Parsed {} cues from SRT", cues.len());
    Ok(cues)
}

fn timestamp_to_seconds(hours: u64, minutes: u64, seconds: u64, millis: u64) -> f64 {
    (hours * 3600 + minutes * 60 + seconds) as f64 + millis as f64 / 1000.0
}

/// Построение субтитров из простого (например, переведенного) текста
///
/// Текст режется по концам предложений и переводам строк, слоты идут
/// встык, длительность оценивается по количеству символов.
pub fn cues_from_plain_text(text: &str) -> Vec<Cue> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for m in SENTENCE_RE.find_iter(text) {
        // знак препинания остается в предложении
        let keep = m.as_str().trim_end().len();
        pieces.push(&text[last..m.start() + keep]);
        last = m.end();
    }
    pieces.push(&text[last..]);

    let mut cues = Vec::new();
    let mut current = 0.0;
    for piece in pieces.into_iter().map(str::trim).filter(|p| !p.is_empty()) {
        let duration = (piece.chars().count() as f64 / CHARS_PER_SECOND).max(MIN_ESTIMATED_DURATION);
        let id = cues.len() as u32 + 1;
        cues.push(Cue::new(id, current, current + duration, piece));
        current += duration;
    }
    cues
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\r\n00:00:01,500 --> 00:00:04,000\r\nXin chào\r\n<i>các bạn</i>\r\n\r\n\
x\n00:00:05,000 --> 00:00:06,250\nThứ hai\n\n\
3\n00:00:07,000 --> 00:00:08,000\n   \n";

    #[test]
    fn test_parse_srt_blocks() {
        let cues = parse_srt(SAMPLE).unwrap();
        assert_eq!(cues.len(), 2);

        assert_eq!(cues[0].id, 1);
        assert!((cues[0].start_seconds - 1.5).abs() < 1e-9);
        assert!((cues[0].end_seconds - 4.0).abs() < 1e-9);
        assert_eq!(cues[0].text, "Xin chào các bạn");

        // нечисловой номер заменяется позицией
        assert_eq!(cues[1].id, 2);
        assert!((cues[1].end_seconds - 6.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_srt_garbage_is_error() {
        assert!(parse_srt("not a subtitle file\nat all").is_err());
        assert!(parse_srt("").unwrap().is_empty());
    }

    #[test]
    fn test_cues_from_plain_text() {
        let cues = cues_from_plain_text("Short one. This second sentence is quite a bit longer than two seconds!\nLast");
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].text, "Short one.");
        assert!((cues[0].slot_duration() - 2.0).abs() < 1e-9);
        assert!(cues[1].text.ends_with('!'));
        assert!(cues[1].slot_duration() > 2.0);
        assert!((cues[1].start_seconds - cues[0].end_seconds).abs() < 1e-9);
        assert_eq!(cues[2].id, 3);
    }
}
