//! NavAgent — движение наземного врага по navmesh
//!
//! Путь считается кооперативной задачей (`PathTask`). Смена destination
//! отменяет старую задачу (CancellationToken) и поднимает generation:
//! поздние ответы на старые recovery link запросы игнорируются.
//!
//! PathPartial — не ошибка: агент просит recovery link у floor генератора
//! и пересчитывает путь, когда link готов.

use crate::logger;
use crate::nav::backend::{NavMeshProvider, PathStatus};
use crate::nav::AreaMask;
use crate::tasks::CancellationToken;
use bevy::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum AgentStatus {
    Idle,
    /// Есть задача пути, ещё не посчитана
    Computing,
    /// Путь partial, ждём RecoveryLinkResolved
    AwaitingLink,
    Moving,
    Arrived,
}

/// Задача пути к destination
#[derive(Debug, Clone)]
pub struct PathTask {
    pub to: Vec3,
    pub generation: u32,
    pub token: CancellationToken,
    /// Recovery link уже запрашивали (второй partial принимаем как есть)
    pub link_requested: bool,
}

/// Результат шага задачи пути
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathPoll {
    /// Нет задачи
    Idle,
    /// Ждём link
    Pending,
    /// Путь принят, агент едет
    Ready(PathStatus),
    /// Нужен recovery link from → to
    NeedsLink { from: Vec3, to: Vec3 },
    Cancelled,
}

#[derive(Component, Debug, Clone)]
pub struct NavAgent {
    /// m/s
    pub speed: f32,
    pub arrive_distance: f32,
    pub mask: AreaMask,
    destination: Option<Vec3>,
    generation: u32,
    task: Option<PathTask>,
    corners: Vec<Vec3>,
    next_corner: usize,
    status: AgentStatus,
}

impl NavAgent {
    pub fn new(speed: f32, arrive_distance: f32, mask: AreaMask) -> Self {
        Self {
            speed,
            arrive_distance,
            mask,
            destination: None,
            generation: 0,
            task: None,
            corners: Vec::new(),
            next_corner: 0,
            status: AgentStatus::Idle,
        }
    }

    /// Новая цель движения. Старая задача пути отменяется.
    pub fn set_destination(&mut self, point: Vec3) -> u32 {
        self.cancel_task();
        self.generation = self.generation.wrapping_add(1);
        self.task = Some(PathTask {
            to: point,
            generation: self.generation,
            token: CancellationToken::new(),
            link_requested: false,
        });
        self.destination = Some(point);
        self.corners.clear();
        self.next_corner = 0;
        self.status = AgentStatus::Computing;
        self.generation
    }

    pub fn stop(&mut self) {
        self.cancel_task();
        self.destination = None;
        self.corners.clear();
        self.next_corner = 0;
        self.status = AgentStatus::Idle;
    }

    fn cancel_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.token.cancel();
        }
    }

    pub fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn has_arrived(&self) -> bool {
        self.status == AgentStatus::Arrived
    }

    /// Едем или вот-вот поедем
    pub fn is_busy(&self) -> bool {
        matches!(
            self.status,
            AgentStatus::Computing | AgentStatus::AwaitingLink | AgentStatus::Moving
        )
    }

    pub fn corners(&self) -> &[Vec3] {
        &self.corners
    }

    pub fn task_token(&self) -> Option<CancellationToken> {
        self.task.as_ref().map(|t| t.token.clone())
    }

    /// Один шаг задачи пути
    pub fn poll_path(&mut self, position: Vec3, mesh: &dyn NavMeshProvider) -> PathPoll {
        let Some(task) = self.task.as_mut() else {
            return PathPoll::Idle;
        };
        if task.token.is_cancelled() {
            self.task = None;
            return PathPoll::Cancelled;
        }
        if self.status == AgentStatus::AwaitingLink {
            return PathPoll::Pending;
        }

        let to = task.to;
        let path = mesh.calculate_path(position, to, self.mask);
        match path.status {
            PathStatus::Complete => {
                self.accept(path.corners);
                PathPoll::Ready(PathStatus::Complete)
            }
            PathStatus::Partial if !task.link_requested => {
                task.link_requested = true;
                self.status = AgentStatus::AwaitingLink;
                PathPoll::NeedsLink { from: position, to }
            }
            PathStatus::Partial => {
                logger::log_warning(&format!(
                    "⚠️ NavAgent: path to {:?} still partial after recovery link, following partial path",
                    to
                ));
                self.accept(path.corners);
                PathPoll::Ready(PathStatus::Partial)
            }
            PathStatus::Invalid => {
                logger::log_error(&format!(
                    "NavAgent: no path {:?} → {:?}, using mesh raycast point",
                    position, to
                ));
                let hit = mesh.raycast(position, to, self.mask);
                self.accept(vec![position, hit.position]);
                PathPoll::Ready(PathStatus::Invalid)
            }
        }
    }

    fn accept(&mut self, corners: Vec<Vec3>) {
        self.task = None;
        self.corners = corners;
        self.next_corner = 1.min(self.corners.len());
        self.status = AgentStatus::Moving;
    }

    /// RecoveryLinkResolved: пересчитать путь, если ответ на текущую задачу
    pub fn on_link_resolved(&mut self, generation: u32) -> bool {
        let current = self.task.as_ref().is_some_and(|t| t.generation == generation);
        if !current || self.status != AgentStatus::AwaitingLink {
            return false;
        }
        self.status = AgentStatus::Computing;
        true
    }

    /// Продвинуться по углам пути; возвращает новую позицию
    pub fn advance(&mut self, position: Vec3, delta: f32) -> Vec3 {
        if self.status != AgentStatus::Moving {
            return position;
        }

        let mut position = position;
        let mut budget = self.speed * delta;
        while let Some(corner) = self.corners.get(self.next_corner).copied() {
            let to_corner = corner - position;
            let distance = to_corner.length();
            if distance <= budget {
                position = corner;
                budget -= distance;
                self.next_corner += 1;
            } else {
                position += to_corner / distance * budget;
                break;
            }
        }

        let at_end = self.next_corner >= self.corners.len();
        let last = self.corners.last().copied().unwrap_or(position);
        if at_end || position.distance(last) <= self.arrive_distance {
            self.status = AgentStatus::Arrived;
        }
        position
    }
}
