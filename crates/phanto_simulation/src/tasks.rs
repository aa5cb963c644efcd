//! Кооперативные задачи (multi-tick операции)
//!
//! Долгие операции (scene validation, поиск пути агента) не блокируют тик:
//! делают ограниченную порцию работы и возвращают `TaskPoll::Pending`.
//! Бюджет — wall-clock (несколько миллисекунд), минимум одна единица работы
//! за тик, чтобы задача всегда продвигалась.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Результат одного шага кооперативной задачи
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPoll {
    /// Работа осталась, продолжим на следующем тике
    Pending,
    /// Задача завершена (completion signal можно отправлять)
    Complete,
    /// Задача отменена через CancellationToken
    Cancelled,
}

/// Wall-clock бюджет одного тика
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started: Instant,
    budget: Duration,
    units_done: usize,
}

impl TimeBudget {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
            units_done: 0,
        }
    }

    pub fn from_millis(millis: f32) -> Self {
        Self::start(Duration::from_secs_f32(millis.max(0.0) / 1000.0))
    }

    /// Отмечаем выполненную единицу работы
    pub fn spend(&mut self) {
        self.units_done += 1;
    }

    pub fn units_done(&self) -> usize {
        self.units_done
    }

    /// Бюджет исчерпан (но первая единица работы всегда разрешена)
    pub fn exhausted(&self) -> bool {
        self.units_done > 0 && self.started.elapsed() >= self.budget
    }
}

/// Токен отмены (клон разделяет один флаг)
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
