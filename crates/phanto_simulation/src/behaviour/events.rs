//! Behaviour events — proximity/collision routing, урон, feedback
//!
//! Rapier `CollisionEvent` переводится в `ProximityEvent` (sensor врага ↔ цель)
//! и `CollisionContact` (тело врага ↔ что угодно). Оба маршрутизируются
//! в текущее состояние врага сразу, без буферизации.

use crate::behaviour::targets::TargetId;
use crate::nav::scene_query::SurfaceHit;
use bevy::prelude::*;

/// Цель вошла/вышла из sense sphere врага
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityEvent {
    pub enemy: Entity,
    pub target: TargetId,
    pub entered: bool,
}

/// Физический контакт тела врага
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionContact {
    pub enemy: Entity,
    pub other: Entity,
    /// Цель, если `other` зарегистрирован в TargetRegistry
    pub target: Option<TargetId>,
    pub started: bool,
}

/// Урон по врагу (источник — внешний: оружие игрока, ловушки)
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct EnemyDamaged {
    pub enemy: Entity,
    pub amount: f32,
    /// Откуда прилетело (для направления реакции)
    pub source: Option<Vec3>,
}

/// Атака врага по цели (обработка урона — внешний модуль)
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct EnemyAttack {
    pub enemy: Entity,
    pub target: TargetId,
    pub damage: f32,
}

/// Враг умер (despawn — ответственность внешнего wave менеджера)
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnemyDied {
    pub enemy: Entity,
}

/// Плевок Phanto: точка попадания
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct GooSpit {
    pub enemy: Entity,
    pub point: Vec3,
}

/// Goo лёг на поверхность комнаты (`surface = None` — комната пустая)
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct GooLanded {
    pub enemy: Entity,
    pub point: Vec3,
    pub surface: Option<SurfaceHit>,
}

/// Fire-and-forget триггеры для анимации/звука/хаптики
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedbackKind {
    AnimationTrigger(&'static str),
    VoiceLine(&'static str),
    Haptics { intensity: f32, duration: f32 },
}

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct EnemyFeedback {
    pub enemy: Entity,
    pub kind: FeedbackKind,
}

/// Probabilistic реакция на урон (pain, dodge)
///
/// `damage ≥ threshold AND roll ≤ chance × wave_scale`, roll ∈ [0, 1).
pub fn should_react(damage: f32, threshold: f32, chance: f32, wave_scale: f32, roll: f32) -> bool {
    damage >= threshold && roll <= chance * wave_scale
}
