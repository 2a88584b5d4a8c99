//! Модуль для реализации системы уведомлений
//!
//! Этот модуль предоставляет конкретные реализации наблюдателей для
//! системы прогресса библиотеки tts-mixdown.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::progress::{ProgressInfo, ProgressObserver};

/// Строка с деталями и счетчиками синтеза
fn format_details(progress: &ProgressInfo) -> String {
    let mut out = String::new();
    if let Some(counters) = &progress.counters {
        out.push_str(&format!(
            ", Субтитры: {}/{} (ошибок: {})",
            counters.completed, counters.total, counters.failed
        ));
        if let Some(eta) = counters.eta_seconds {
            out.push_str(&format!(", Осталось: ~{:.0}с", eta));
        }
    }
    if let Some(details) = progress.details.as_deref().filter(|d| !d.is_empty()) {
        out.push_str(&format!(", Детали: {}", details));
    }
    out
}

/// Наблюдатель, выводящий информацию о прогрессе в консоль
pub struct ConsoleProgressObserver {
    /// Префикс для вывода (опционально)
    prefix: Option<String>,
}

impl ConsoleProgressObserver {
    /// Создать новый экземпляр ConsoleProgressObserver
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Создать новый экземпляр ConsoleProgressObserver с префиксом
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl Default for ConsoleProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let prefix = self.prefix.as_deref().unwrap_or("");
        println!(
            "{}[Прогресс] Шаг: {}, Прогресс шага: {:.1}%, Общий прогресс: {:.1}%{}",
            prefix,
            progress.step,
            progress.step_progress,
            progress.total_progress,
            format_details(&progress)
        );
    }
}

/// Наблюдатель, пишущий прогресс в лог
pub struct LogProgressObserver;

impl ProgressObserver for LogProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        log::info!(
            "{}: {:.1}% (total {:.1}%){}",
            progress.step,
            progress.step_progress,
            progress.total_progress,
            format_details(&progress)
        );
    }
}

/// Наблюдатель, сохраняющий информацию о прогрессе в памяти
#[derive(Clone, Default)]
pub struct MemoryProgressObserver {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl MemoryProgressObserver {
    /// Создать новый экземпляр MemoryProgressObserver
    pub fn new() -> Self {
        Self::default()
    }

    /// Получить историю обновлений прогресса
    pub fn history(&self) -> Vec<ProgressInfo> {
        self.history.lock().clone()
    }

    /// Последнее обновление
    pub fn last(&self) -> Option<ProgressInfo> {
        self.history.lock().last().cloned()
    }

    /// Очистить историю обновлений прогресса
    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl ProgressObserver for MemoryProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        self.history.lock().push(progress);
    }
}

/// Наблюдатель, записывающий информацию о прогрессе в файл
pub struct FileProgressObserver {
    file_path: PathBuf,
}

impl FileProgressObserver {
    /// Создать новый экземпляр FileProgressObserver
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }
}

impl ProgressObserver for FileProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let log_entry = format!(
            "[{}] Шаг: {}, Прогресс шага: {:.1}%, Общий прогресс: {:.1}%{}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            progress.step,
            progress.step_progress,
            progress.total_progress,
            format_details(&progress)
        );

        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .and_then(|mut file| file.write_all(log_entry.as_bytes()));
        if let Err(e) = written {
            log::warn!("Failed to write progress to {}: {}", self.file_path.display(), e);
        }
    }
}

/// Наблюдатель, вызывающий функцию обратного вызова при обновлении прогресса
pub struct CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    /// Создать новый экземпляр CallbackProgressObserver
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressObserver for CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    fn on_progress_update(&self, progress: ProgressInfo) {
        (self.callback)(progress);
    }
}

/// Комбинированный наблюдатель, объединяющий несколько наблюдателей
#[derive(Default)]
pub struct CompositeProgressObserver {
    observers: Vec<Box<dyn ProgressObserver>>,
}

impl CompositeProgressObserver {
    /// Создать новый экземпляр CompositeProgressObserver
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить наблюдателя
    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) {
        self.observers.push(observer);
    }

    /// Удалить всех наблюдателей
    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

impl ProgressObserver for CompositeProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        for observer in &self.observers {
            observer.on_progress_update(progress.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RunCounters;
    use std::fs;

    #[test]
    fn test_console_observer() {
        let observer = ConsoleProgressObserver::with_prefix("[Test] ");
        let progress = ProgressInfo::new("Test Step", 50.0, 25.0, Some("Testing".to_string()));

        // Этот тест просто проверяет, что метод не вызывает панику
        observer.on_progress_update(progress);
        LogProgressObserver.on_progress_update(ProgressInfo::new("Log", 1.0, 1.0, None));
    }

    #[test]
    fn test_memory_observer() {
        let observer = MemoryProgressObserver::new();

        observer.on_progress_update(ProgressInfo::new("Step 1", 50.0, 25.0, None));
        observer.on_progress_update(ProgressInfo::new("Step 1", 100.0, 50.0, None));
        observer.on_progress_update(ProgressInfo::new("Step 2", 50.0, 75.0, None));

        let history = observer.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].step, "Step 1");
        assert_eq!(history[1].step_progress, 100.0);
        assert_eq!(observer.last().unwrap().total_progress, 75.0);

        observer.clear_history();
        assert_eq!(observer.history().len(), 0);
    }

    #[test]
    fn test_file_observer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.log");

        let observer = FileProgressObserver::new(&path);
        let progress = ProgressInfo::new("Test Step", 50.0, 25.0, Some("Testing".to_string())).with_counters(
            RunCounters {
                completed: 3,
                total: 10,
                failed: 1,
                eta_seconds: Some(42.0),
            },
        );
        observer.on_progress_update(progress);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Test Step"));
        assert!(content.contains("50.0%"));
        assert!(content.contains("3/10"));
        assert!(content.contains("~42с"));
        assert!(content.contains("Testing"));
    }

    #[test]
    fn test_composite_observer() {
        let memory_observer = MemoryProgressObserver::new();
        let counter = Arc::new(Mutex::new(0));
        let counter_clone = counter.clone();

        let callback_observer = CallbackProgressObserver::new(move |_| {
            *counter_clone.lock() += 1;
        });

        let mut composite = CompositeProgressObserver::new();
        composite.add_observer(Box::new(memory_observer.clone()));
        composite.add_observer(Box::new(callback_observer));

        composite.on_progress_update(ProgressInfo::new("Step 1", 50.0, 25.0, None));
        composite.on_progress_update(ProgressInfo::new("Step 2", 0.0, 50.0, None));

        assert_eq!(memory_observer.history().len(), 2);
        assert_eq!(*counter.lock(), 2);

        composite.clear();
        composite.on_progress_update(ProgressInfo::new("Step 3", 0.0, 60.0, None));
        assert_eq!(memory_observer.history().len(), 2);
    }
}
