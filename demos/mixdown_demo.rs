//! Пример сведения субтитров в WAV с выводом прогресса
//!
//! Запуск:
//!
//! ```text
//! cargo run --example mixdown_demo -- subtitles.srt out.wav [config.json]
//! ```
//!
//! Без аргументов озвучивается короткий встроенный текст.

use std::env;

use anyhow::{Context, Result};
use tts_mixdown::{
    config::MixdownConfig,
    notification::{CompositeProgressObserver, ConsoleProgressObserver, FileProgressObserver},
    subtitle::parser,
    utils::init_logger,
    TtsMixdown,
};

const SAMPLE_TEXT: &str = "Xin chào. Đây là bản lồng tiếng thử nghiệm, được ghép theo thời gian của phụ đề.";

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let args: Vec<String> = env::args().skip(1).collect();
    let output_path = args.get(1).cloned().unwrap_or_else(|| "mixdown.wav".to_string());

    let config = match args.get(2) {
        Some(path) => MixdownConfig::from_json_file(path).with_context(|| format!("reading config {}", path))?,
        None => MixdownConfig::default(),
    };

    let cues = match args.first() {
        Some(path) => parser::parse_srt_file(path).with_context(|| format!("parsing {}", path))?,
        None => parser::cues_from_plain_text(SAMPLE_TEXT),
    };
    println!("Субтитров к озвучке: {}", cues.len());

    let mixdown = TtsMixdown::new(config)?;

    let mut observer = CompositeProgressObserver::new();
    observer.add_observer(Box::new(ConsoleProgressObserver::new()));
    observer.add_observer(Box::new(FileProgressObserver::new("mixdown-progress.log")));
    mixdown.add_observer(Box::new(observer));

    let music = mixdown.load_music().await;
    if music.is_none() {
        println!("Фоновая музыка не выбрана или недоступна");
    }

    let output = mixdown.render(&cues, music.as_deref(), None).await?;
    mixdown.write_wav(&output.mixed, &output_path)?;

    println!("{}", output.report.summary());
    for failure in &output.report.failures {
        println!("  #{}: {}", failure.cue_id, failure.message);
    }
    println!("Готово: {}", output_path);

    Ok(())
}
