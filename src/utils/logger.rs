use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Фильтр по умолчанию, переопределяется через RUST_LOG
pub const DEFAULT_FILTER: &str = "warn,tts_mixdown=info,reqwest=warn";

/// Инициализировать env_logger.
///
/// Повторный вызов ничего не делает. Возвращает `false`, если логгер уже
/// был установлен.
pub fn init_logger() -> bool {
    let env = Env::default().filter_or("RUST_LOG", DEFAULT_FILTER);

    let mut builder = Builder::from_env(env);

    // Явно подавляем шумные модули HTTP-стека
    builder
        .filter_module("hyper", LevelFilter::Error)
        .filter_module("mio", LevelFilter::Error)
        .filter_module("symphonia", LevelFilter::Warn)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logger();
        assert!(!init_logger());
        log::info!("logger ready");
    }
}
