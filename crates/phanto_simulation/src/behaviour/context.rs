//! BehaviourContext — всё, что state hooks видят о мире
//!
//! Мир — read-only (`WorldView`): конфиг, цели, navmesh, генератор пола.
//! Изменения мира state'ы не делают напрямую: атаки, feedback, смерти
//! копятся в `BehaviourOutbox` и пишутся событиями в конце тика.

use crate::behaviour::agent::NavAgent;
use crate::behaviour::events::{EnemyAttack, EnemyDied, EnemyFeedback, FeedbackKind, GooSpit};
use crate::behaviour::targets::{TargetId, TargetRegistry, TargetsInRange};
use crate::config::SimConfig;
use crate::nav::backend::NavMeshProvider;
use crate::nav::bookkeeper::NavMeshBookKeeper;
use crate::nav::generator::NavMeshGenerator;
use crate::nav::physics::SpatialQuery;
use crate::nav::scene_query::SceneQuery;
use bevy::prelude::*;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

#[derive(Clone, Copy)]
pub struct WorldView<'a> {
    pub config: &'a SimConfig,
    pub targets: &'a TargetRegistry,
    pub bookkeeper: &'a NavMeshBookKeeper,
    pub mesh: &'a dyn NavMeshProvider,
    pub generator: &'a NavMeshGenerator,
    pub scene: &'a SceneQuery,
    pub physics: &'a dyn SpatialQuery,
}

/// Resource: исходящие события behaviour слоя за тик
#[derive(Resource, Debug, Default)]
pub struct BehaviourOutbox {
    pub feedback: Vec<EnemyFeedback>,
    pub attacks: Vec<EnemyAttack>,
    pub deaths: Vec<EnemyDied>,
    pub goo: Vec<GooSpit>,
}

impl BehaviourOutbox {
    pub fn is_empty(&self) -> bool {
        self.feedback.is_empty() && self.attacks.is_empty() && self.deaths.is_empty() && self.goo.is_empty()
    }
}

pub struct BehaviourContext<'a> {
    pub entity: Entity,
    /// Fixed timestep (секунды)
    pub delta: f32,
    pub elapsed: f32,
    pub transform: &'a mut Transform,
    pub sensed: &'a mut TargetsInRange,
    /// Только у наземных врагов
    pub agent: Option<&'a mut NavAgent>,
    pub world: WorldView<'a>,
    pub rng: &'a mut ChaCha8Rng,
    pub outbox: &'a mut BehaviourOutbox,
}

impl BehaviourContext<'_> {
    pub fn position(&self) -> Vec3 {
        self.transform.translation
    }

    pub fn config(&self) -> &SimConfig {
        self.world.config
    }

    /// Множитель шанса реакций текущей волны
    pub fn wave_scale(&self) -> f32 {
        self.world.config.wave.chance_scale()
    }

    /// Случайное число в [0, 1)
    pub fn roll(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }

    pub fn feedback(&mut self, kind: FeedbackKind) {
        self.outbox.feedback.push(EnemyFeedback {
            enemy: self.entity,
            kind,
        });
    }

    pub fn attack(&mut self, target: TargetId, damage: f32) {
        self.outbox.attacks.push(EnemyAttack {
            enemy: self.entity,
            target,
            damage,
        });
    }

    /// Плевок goo в точку (куда он лёг — решает `land_goo`)
    pub fn spit_goo(&mut self, point: Vec3) {
        self.outbox.goo.push(GooSpit {
            enemy: self.entity,
            point,
        });
    }

    pub fn died(&mut self) {
        self.outbox.deaths.push(EnemyDied { enemy: self.entity });
    }

    /// Ближайшая валидная цель в sense sphere (с учётом flee override)
    pub fn select_target(&mut self) -> Option<TargetId> {
        let from = self.transform.translation;
        self.sensed.select_target(self.world.targets, from)
    }

    pub fn target_position(&self, id: TargetId) -> Option<Vec3> {
        self.world.targets.get(id).filter(|t| t.valid).map(|t| t.position)
    }

    /// false — у врага нет NavAgent
    pub fn set_destination(&mut self, point: Vec3) -> bool {
        match self.agent.as_deref_mut() {
            Some(agent) => {
                agent.set_destination(point);
                true
            }
            None => false,
        }
    }

    pub fn stop_agent(&mut self) {
        if let Some(agent) = self.agent.as_deref_mut() {
            agent.stop();
        }
    }

    pub fn agent_arrived(&self) -> bool {
        self.agent.as_deref().is_some_and(|a| a.has_arrived())
    }

    pub fn agent_idle(&self) -> bool {
        self.agent.as_deref().is_none_or(|a| !a.is_busy())
    }
}
