//! Модуль для отслеживания прогресса выполнения операций
//!
//! Этот модуль предоставляет реализацию паттерна Observer для отслеживания
//! прогресса длительных операций библиотеки tts-mixdown: синтеза, сборки,
//! сведения и записи результата.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Счетчики прогона синтеза
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Завершено субтитров (успешно или с ошибкой)
    pub completed: usize,
    /// Всего субтитров
    pub total: usize,
    /// Из них с ошибкой
    pub failed: usize,
    /// Оценка оставшегося времени
    pub eta_seconds: Option<f64>,
}

/// Информация о прогрессе выполнения операции
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Текущий этап операции
    pub step: String,
    /// Процент выполнения текущего этапа (0.0 - 100.0)
    pub step_progress: f32,
    /// Общий процент выполнения всей операции (0.0 - 100.0)
    pub total_progress: f32,
    /// Дополнительная информация о текущем этапе
    pub details: Option<String>,
    /// Счетчики синтеза, если этап их сообщает
    pub counters: Option<RunCounters>,
}

impl ProgressInfo {
    /// Создает новый экземпляр ProgressInfo
    pub fn new(step: impl Into<String>, step_progress: f32, total_progress: f32, details: Option<String>) -> Self {
        Self {
            step: step.into(),
            step_progress: step_progress.clamp(0.0, 100.0),
            total_progress: total_progress.clamp(0.0, 100.0),
            details,
            counters: None,
        }
    }

    /// Добавить счетчики синтеза
    pub fn with_counters(mut self, counters: RunCounters) -> Self {
        self.counters = Some(counters);
        self
    }
}

/// Трейт для наблюдателя, получающего уведомления о прогрессе
pub trait ProgressObserver: Send + Sync {
    /// Метод, вызываемый при обновлении прогресса
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Трейт для объекта, отправляющего уведомления о прогрессе
pub trait ProgressReporter: Send + Sync {
    /// Добавить наблюдателя
    ///
    /// Возвращает уникальный идентификатор наблюдателя, который можно использовать
    /// для его удаления в будущем.
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize;

    /// Удалить наблюдателя по идентификатору
    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>>;

    /// Уведомить всех наблюдателей о прогрессе
    fn notify_progress(&self, progress: ProgressInfo);
}

/// Реализация ProgressReporter для отслеживания прогресса
pub struct DefaultProgressReporter {
    observers: RwLock<HashMap<usize, Box<dyn ProgressObserver>>>,
    next_id: AtomicUsize,
}

impl DefaultProgressReporter {
    /// Создать новый экземпляр DefaultProgressReporter
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl Default for DefaultProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for DefaultProgressReporter {
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.observers.write().remove(&id)
    }

    fn notify_progress(&self, progress: ProgressInfo) {
        for observer in self.observers.read().values() {
            observer.on_progress_update(progress.clone());
        }
    }
}

/// Репортер, который кроме наблюдателей рассылает прогресс в канал Tokio
pub struct BroadcastProgressReporter {
    tx: broadcast::Sender<ProgressInfo>,
    inner: DefaultProgressReporter,
}

impl BroadcastProgressReporter {
    /// Создать репортер и первого подписчика
    pub fn new() -> (Self, broadcast::Receiver<ProgressInfo>) {
        let (tx, rx) = broadcast::channel(100);
        (
            Self {
                tx,
                inner: DefaultProgressReporter::new(),
            },
            rx,
        )
    }

    /// Новый подписчик
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressInfo> {
        self.tx.subscribe()
    }
}

impl ProgressReporter for BroadcastProgressReporter {
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        self.inner.add_observer(observer)
    }

    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.inner.remove_observer(id)
    }

    fn notify_progress(&self, progress: ProgressInfo) {
        self.inner.notify_progress(progress.clone());
        // без подписчиков send возвращает ошибку, это не сбой
        if self.tx.send(progress).is_err() {
            log::trace!("No progress subscribers");
        }
    }
}

/// Этапы конвейера
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStep {
    /// Синтез речи по субтитрам
    Synthesis,
    /// Сборка временной шкалы
    Assembly,
    /// Сведение дорожек
    Mixing,
    /// Запись результата
    Encoding,
}

impl ProcessStep {
    /// Получить название этапа в виде строки
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synthesis => "Синтез речи",
            Self::Assembly => "Сборка временной шкалы",
            Self::Mixing => "Сведение дорожек",
            Self::Encoding => "Запись результата",
        }
    }

    /// Получить весовой коэффициент этапа (в процентах от общего процесса)
    pub fn weight(&self) -> f32 {
        match self {
            Self::Synthesis => 80.0,
            Self::Assembly => 5.0,
            Self::Mixing => 10.0,
            Self::Encoding => 5.0,
        }
    }
}

struct TrackerState {
    current_step: ProcessStep,
    step_progress: f32,
    total_progress: f32,
    completed_steps: HashMap<ProcessStep, f32>,
}

/// Трекер прогресса для отслеживания выполнения процесса.
///
/// Все методы принимают `&self`, трекер разделяется между задачами через `Arc`.
pub struct ProgressTracker {
    reporter: RwLock<Option<Box<dyn ProgressReporter>>>,
    state: RwLock<TrackerState>,
}

impl ProgressTracker {
    /// Создать новый экземпляр ProgressTracker
    pub fn new() -> Self {
        Self {
            reporter: RwLock::new(None),
            state: RwLock::new(TrackerState {
                current_step: ProcessStep::Synthesis,
                step_progress: 0.0,
                total_progress: 0.0,
                completed_steps: HashMap::new(),
            }),
        }
    }

    /// Создать новый экземпляр ProgressTracker с репортером
    pub fn with_reporter(reporter: Box<dyn ProgressReporter>) -> Self {
        let tracker = Self::new();
        tracker.set_reporter(reporter);
        tracker
    }

    /// Установить репортер прогресса
    pub fn set_reporter(&self, reporter: Box<dyn ProgressReporter>) {
        *self.reporter.write() = Some(reporter);
    }

    /// Добавить наблюдателя; без репортера создается репортер по умолчанию
    pub fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize {
        let mut reporter = self.reporter.write();
        reporter
            .get_or_insert_with(|| Box::new(DefaultProgressReporter::new()))
            .add_observer(observer)
    }

    /// Текущий этап
    pub fn current_step(&self) -> ProcessStep {
        self.state.read().current_step
    }

    /// Общий прогресс
    pub fn total_progress(&self) -> f32 {
        self.state.read().total_progress
    }

    /// Установить текущий этап
    pub fn set_step(&self, step: ProcessStep) {
        {
            let mut state = self.state.write();
            if state.current_step == step {
                return;
            }
            // предыдущий этап считается завершенным
            let previous = state.current_step;
            state.completed_steps.insert(previous, 100.0);
            state.current_step = step;
            state.step_progress = 0.0;
            Self::update_total_progress(&mut state);
        }
        self.report_progress(None, None);
    }

    /// Обновить прогресс текущего этапа
    pub fn update_step_progress(&self, progress: f32, details: Option<String>) {
        {
            let mut state = self.state.write();
            state.step_progress = progress.clamp(0.0, 100.0);
            Self::update_total_progress(&mut state);
        }
        self.report_progress(details, None);
    }

    /// Обновить прогресс синтеза по счетчикам прогона
    pub fn update_run_progress(&self, counters: RunCounters, details: Option<String>) {
        {
            let mut state = self.state.write();
            state.step_progress = if counters.total == 0 {
                100.0
            } else {
                counters.completed as f32 / counters.total as f32 * 100.0
            };
            Self::update_total_progress(&mut state);
        }
        self.report_progress(details, Some(counters));
    }

    fn update_total_progress(state: &mut TrackerState) {
        let mut total = 0.0;
        let mut total_weight = 0.0;

        for (step, progress) in state.completed_steps.iter() {
            if *step == state.current_step {
                continue;
            }
            total += step.weight() * progress / 100.0;
            total_weight += step.weight();
        }

        total += state.current_step.weight() * state.step_progress / 100.0;
        total_weight += state.current_step.weight();

        state.total_progress = (total / total_weight * 100.0).clamp(0.0, 100.0);
    }

    fn report_progress(&self, details: Option<String>, counters: Option<RunCounters>) {
        let reporter = self.reporter.read();
        let Some(reporter) = reporter.as_ref() else {
            return;
        };

        let mut progress = {
            let state = self.state.read();
            ProgressInfo::new(
                state.current_step.as_str(),
                state.step_progress,
                state.total_progress,
                details,
            )
        };
        progress.counters = counters;
        reporter.notify_progress(progress);
    }

    /// Отметить завершение всего процесса
    pub fn complete(&self) {
        {
            let mut state = self.state.write();
            let current = state.current_step;
            state.completed_steps.insert(current, 100.0);
            state.step_progress = 100.0;
            state.total_progress = 100.0;
        }
        self.report_progress(Some("Процесс завершен".to_string()), None);
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct TestObserver {
        updates: Arc<Mutex<Vec<ProgressInfo>>>,
    }

    impl TestObserver {
        fn new() -> (Self, Arc<Mutex<Vec<ProgressInfo>>>) {
            let updates = Arc::new(Mutex::new(Vec::new()));
            (Self { updates: updates.clone() }, updates)
        }
    }

    impl ProgressObserver for TestObserver {
        fn on_progress_update(&self, progress: ProgressInfo) {
            self.updates.lock().unwrap().push(progress);
        }
    }

    #[test]
    fn test_progress_tracker() {
        let tracker = ProgressTracker::new();
        let mut reporter = DefaultProgressReporter::new();

        let (observer, updates) = TestObserver::new();
        reporter.add_observer(Box::new(observer));

        tracker.set_reporter(Box::new(reporter));

        // Тестируем обновление прогресса
        tracker.update_step_progress(50.0, None);

        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates.len(), 1);
            assert_eq!(updates[0].step, ProcessStep::Synthesis.as_str());
            assert_eq!(updates[0].step_progress, 50.0);
            assert!(updates[0].total_progress > 0.0);
        }

        // Тестируем смену этапа
        tracker.set_step(ProcessStep::Assembly);

        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates.len(), 2);
            assert_eq!(updates[1].step, ProcessStep::Assembly.as_str());
            assert_eq!(updates[1].step_progress, 0.0);
        }

        // Тестируем завершение процесса
        tracker.complete();

        {
            let updates = updates.lock().unwrap();
            assert_eq!(updates.len(), 3);
            assert_eq!(updates[2].total_progress, 100.0);
            assert_eq!(updates[2].details, Some("Процесс завершен".to_string()));
        }
    }

    #[test]
    fn test_run_counters_drive_step_progress() {
        let tracker = ProgressTracker::new();
        let (observer, updates) = TestObserver::new();
        tracker.add_observer(Box::new(observer));

        let counters = RunCounters {
            completed: 5,
            total: 20,
            failed: 1,
            eta_seconds: Some(12.5),
        };
        tracker.update_run_progress(counters, Some("5/20".to_string()));

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].step_progress, 25.0);
        assert_eq!(updates[0].counters, Some(counters));
    }

    #[tokio::test]
    async fn test_broadcast_reporter() {
        let (reporter, mut rx) = BroadcastProgressReporter::new();
        let tracker = ProgressTracker::with_reporter(Box::new(reporter));
        tracker.update_step_progress(10.0, Some("hello".to_string()));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.details.as_deref(), Some("hello"));
        assert_eq!(received.step_progress, 10.0);
    }
}
