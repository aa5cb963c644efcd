//! Scene validation — кооперативная проверка open флагов
//!
//! `VerifyOpen` по всем треугольникам всех owner'ов размазывается по тикам:
//! каждый тик — порция под wall-clock бюджетом, потом yield.
//! По завершении пишется `SceneValidated` (подписчики: furniture генераторы).
//! Новый запрос отменяет незавершённую задачу.

use crate::config::{NavConfig, SimConfig};
use crate::logger;
use crate::nav::bookkeeper::NavMeshBookKeeper;
use crate::nav::physics::{ScenePhysics, SpatialQuery};
use crate::nav::TriangleId;
use crate::tasks::{CancellationToken, TaskPoll, TimeBudget};
use bevy::prelude::*;

/// Запрос на (пере)валидацию сцены
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ValidateSceneRequest {
    pub ceiling_y: f32,
}

/// Completion signal: open флаги актуальны
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneValidated {
    pub triangles_checked: usize,
    pub open_count: usize,
}

/// Multi-tick задача VerifyOpen
#[derive(Debug, Clone)]
pub struct ValidationTask {
    queue: Vec<TriangleId>,
    cursor: usize,
    ceiling_y: f32,
    open_count: usize,
    token: CancellationToken,
}

impl ValidationTask {
    pub fn new(queue: Vec<TriangleId>, ceiling_y: f32) -> Self {
        Self {
            queue,
            cursor: 0,
            ceiling_y,
            open_count: 0,
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    pub fn checked(&self) -> usize {
        self.cursor
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    /// Одна порция работы под бюджетом
    pub fn poll(
        &mut self,
        bookkeeper: &mut NavMeshBookKeeper,
        physics: &dyn SpatialQuery,
        config: &NavConfig,
        budget: &mut TimeBudget,
    ) -> TaskPoll {
        while self.cursor < self.queue.len() {
            if self.token.is_cancelled() {
                return TaskPoll::Cancelled;
            }
            if budget.exhausted() {
                return TaskPoll::Pending;
            }

            let id = self.queue[self.cursor];
            // Треугольник мог исчезнуть после rebuild'а — просто пропускаем
            if let Some(true) = bookkeeper.verify_triangle(id, self.ceiling_y, physics, config) {
                self.open_count += 1;
            }
            self.cursor += 1;
            budget.spend();
        }
        TaskPoll::Complete
    }
}

/// Resource: текущая задача validation (максимум одна)
#[derive(Resource, Debug, Default)]
pub struct SceneValidation {
    pub task: Option<ValidationTask>,
}

impl SceneValidation {
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Заменить задачу (предыдущая отменяется)
    pub fn start(&mut self, task: ValidationTask) {
        if let Some(previous) = self.task.take() {
            previous.token().cancel();
            logger::log("🔁 SceneValidation: restarted, previous pass cancelled");
        }
        self.task = Some(task);
    }
}

/// System: ValidateSceneRequest → новая ValidationTask
pub fn start_scene_validation(
    mut requests: EventReader<ValidateSceneRequest>,
    bookkeeper: Res<NavMeshBookKeeper>,
    mut validation: ResMut<SceneValidation>,
) {
    // Несколько запросов за тик — актуален последний
    let Some(request) = requests.read().last().copied() else {
        return;
    };
    let task = bookkeeper.validate_scene(request.ceiling_y);
    logger::log(&format!(
        "🔍 SceneValidation: {} triangles queued",
        task.remaining()
    ));
    validation.start(task);
}

/// System: продвигает ValidationTask под бюджетом, пишет SceneValidated
pub fn drive_scene_validation(
    mut validation: ResMut<SceneValidation>,
    mut bookkeeper: ResMut<NavMeshBookKeeper>,
    physics: Res<ScenePhysics>,
    config: Res<SimConfig>,
    mut validated: EventWriter<SceneValidated>,
) {
    let Some(task) = validation.task.as_mut() else {
        return;
    };

    let mut budget = TimeBudget::from_millis(config.nav.validation_budget_ms);
    match task.poll(&mut bookkeeper, physics.query(), &config.nav, &mut budget) {
        TaskPoll::Pending => {}
        TaskPoll::Complete => {
            let event = SceneValidated {
                triangles_checked: task.checked(),
                open_count: task.open_count(),
            };
            logger::log(&format!(
                "✅ SceneValidation: {} / {} triangles open",
                event.open_count, event.triangles_checked
            ));
            validation.task = None;
            validated.write(event);
        }
        TaskPoll::Cancelled => {
            validation.task = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::backend::{GridNavMesh, NavSource, NavVolume, SurfaceBuildRequest};
    use crate::nav::physics::{layers, BoxScene, SceneBox};
    use crate::nav::{NavArea, OwnerId};
    use std::time::Duration;

    fn setup() -> (NavMeshBookKeeper, BoxScene) {
        let mut mesh = GridNavMesh::new(0.5, 0.5);
        let mut keeper = NavMeshBookKeeper::default();
        keeper.generate_nav_mesh_triangles(
            OwnerId::FLOOR,
            &SurfaceBuildRequest {
                volume: NavVolume::axis_aligned(Vec3::new(-1.0, -0.1, -1.0), Vec3::new(1.0, 0.2, 1.0)),
                area: NavArea::WALKABLE,
                sources: vec![NavSource::walkable(
                    Vec3::new(-1.0, -0.1, -1.0),
                    Vec3::new(1.0, 0.0, 1.0),
                )],
            },
            &mut mesh,
        );

        let mut scene = BoxScene::default();
        scene.add_box(SceneBox::new(
            Vec3::new(-1.0, -0.1, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
            layers::SCENE_MESH | layers::FLOOR,
        ));
        // Полка над половиной пола (x > 0)
        scene.add_box(SceneBox::new(
            Vec3::new(0.0, 1.0, -1.0),
            Vec3::new(1.0, 1.05, 1.0),
            layers::SCENE_MESH | layers::FURNITURE,
        ));
        (keeper, scene)
    }

    #[test]
    fn test_zero_budget_yields_every_unit() {
        let (mut keeper, scene) = setup();
        let config = NavConfig::default();
        let mut task = keeper.validate_scene(2.5);

        let mut ticks = 0;
        loop {
            ticks += 1;
            let mut budget = TimeBudget::start(Duration::ZERO);
            match task.poll(&mut keeper, &scene, &config, &mut budget) {
                TaskPoll::Pending => continue,
                TaskPoll::Complete => break,
                TaskPoll::Cancelled => panic!("not cancelled"),
            }
        }
        // Одна единица за тик + финальный Complete
        assert_eq!(ticks, 32);
        assert_eq!(task.open_count(), 16);
        let open = keeper.triangles().filter(|t| t.is_open).count();
        assert_eq!(open, 16);
        assert!(keeper.triangles().filter(|t| t.is_open).all(|t| t.centroid.x < 0.0));
    }

    #[test]
    fn test_generous_budget_completes_in_one_poll() {
        let (mut keeper, scene) = setup();
        let mut task = keeper.validate_scene(2.5);
        let mut budget = TimeBudget::start(Duration::from_secs(60));
        assert_eq!(
            task.poll(&mut keeper, &scene, &NavConfig::default(), &mut budget),
            TaskPoll::Complete
        );
        assert_eq!(task.remaining(), 0);
    }

    #[test]
    fn test_restart_cancels_previous_task() {
        let (mut keeper, scene) = setup();
        let mut validation = SceneValidation::default();
        let first = keeper.validate_scene(2.5);
        let mut first_handle = first.clone();
        validation.start(first);
        validation.start(keeper.validate_scene(2.5));

        let mut budget = TimeBudget::start(Duration::from_secs(60));
        assert_eq!(
            first_handle.poll(&mut keeper, &scene, &NavConfig::default(), &mut budget),
            TaskPoll::Cancelled
        );
        assert!(validation.is_running());
    }
}
