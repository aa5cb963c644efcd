//! Targets — то, за чем враги гонятся или от чего бегут
//!
//! `TargetRegistry` — арена целей со стабильными `TargetId` + side table
//! collider entity → TargetId (collision события резолвятся обратно в цель).
//! `TargetsInRange` — per-enemy список целей в sense sphere.

use bevy::prelude::*;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect)]
pub struct TargetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum TargetKind {
    /// Обычная цель погони
    Chase,
    /// Маячок, от которого враги убегают
    FleeBeacon,
    /// Мебель (точка на верхней поверхности)
    Furniture,
    /// Кристалл, который враги атакуют
    Crystal,
    Player,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub kind: TargetKind,
    pub position: Vec3,
    pub valid: bool,
    /// Враг в радиусе должен убегать, а не преследовать
    pub fleeable: bool,
}

impl Target {
    pub fn new(kind: TargetKind, position: Vec3) -> Self {
        Self {
            kind,
            position,
            valid: true,
            fleeable: kind == TargetKind::FleeBeacon,
        }
    }

    /// Точка подхода к цели на дистанции в [min, max] от неё
    ///
    /// Направление — горизонтально от цели к `from`. Если уже в диапазоне,
    /// дистанция сохраняется (не дёргаем агента зря).
    pub fn resolve_destination(&self, from: Vec3, min_distance: f32, max_distance: f32) -> Vec3 {
        let offset = (from - self.position).with_y(0.0);
        let distance = offset.length();
        let direction = if distance > 1.0e-4 {
            offset / distance
        } else {
            Vec3::X
        };
        let approach = distance.clamp(min_distance, max_distance.max(min_distance));
        self.position + direction * approach
    }
}

/// Resource: все цели + collider side table
#[derive(Resource, Debug, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<TargetId, Target>,
    colliders: HashMap<Entity, TargetId>,
    next_id: u32,
}

impl TargetRegistry {
    pub fn register(&mut self, target: Target) -> TargetId {
        let id = TargetId(self.next_id);
        self.next_id += 1;
        self.targets.insert(id, target);
        id
    }

    /// Привязать collider entity к цели (один collider — одна цель)
    pub fn attach_collider(&mut self, id: TargetId, collider: Entity) -> bool {
        if !self.targets.contains_key(&id) {
            return false;
        }
        self.colliders.insert(collider, id);
        true
    }

    /// Удалить цель вместе со всеми её colliders
    pub fn unregister(&mut self, id: TargetId) -> Option<Target> {
        let target = self.targets.remove(&id)?;
        self.colliders.retain(|_, target_id| *target_id != id);
        Some(target)
    }

    pub fn detach_collider(&mut self, collider: Entity) -> Option<TargetId> {
        self.colliders.remove(&collider)
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(&id)
    }

    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.targets.get_mut(&id)
    }

    pub fn by_collider(&self, collider: Entity) -> Option<TargetId> {
        self.colliders.get(&collider).copied()
    }

    pub fn is_valid(&self, id: TargetId) -> bool {
        self.targets.get(&id).is_some_and(|t| t.valid)
    }

    pub fn set_position(&mut self, id: TargetId, position: Vec3) -> bool {
        match self.targets.get_mut(&id) {
            Some(target) => {
                target.position = position;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (TargetId, &Target)> {
        self.targets.iter().map(|(id, t)| (*id, t))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Component на collider entity цели (sync позиции + отписка при despawn)
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCollider(pub TargetId);

/// Component: цели в sense sphere врага + flee override
///
/// Поддерживается proximity enter/exit событиями.
#[derive(Component, Debug, Clone, Default, PartialEq)]
pub struct TargetsInRange {
    in_range: Vec<TargetId>,
    current: Option<TargetId>,
    flee: Option<TargetId>,
    /// Цель до начала бегства (возобновляем после)
    previous: Option<TargetId>,
}

impl TargetsInRange {
    /// Возвращает true, если цель новая
    pub fn on_enter(&mut self, id: TargetId) -> bool {
        if self.in_range.contains(&id) {
            return false;
        }
        self.in_range.push(id);
        true
    }

    pub fn on_exit(&mut self, id: TargetId) -> bool {
        let before = self.in_range.len();
        self.in_range.retain(|t| *t != id);
        if self.current == Some(id) {
            self.current = None;
        }
        before != self.in_range.len()
    }

    pub fn contains(&self, id: TargetId) -> bool {
        self.in_range.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.in_range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_range.is_empty()
    }

    pub fn current(&self) -> Option<TargetId> {
        self.current
    }

    pub fn flee_target(&self) -> Option<TargetId> {
        self.flee
    }

    pub fn previous(&self) -> Option<TargetId> {
        self.previous
    }

    /// Ближайшая валидная цель (flee target перекрывает всё)
    pub fn select_target(&mut self, registry: &TargetRegistry, from: Vec3) -> Option<TargetId> {
        if let Some(flee) = self.flee {
            if registry.is_valid(flee) {
                return Some(flee);
            }
            self.end_flee(registry);
        }

        self.in_range.retain(|id| registry.get(*id).is_some());
        self.current = self
            .in_range
            .iter()
            .filter_map(|id| registry.get(*id).map(|t| (*id, t)))
            .filter(|(_, t)| t.valid && !t.fleeable)
            .min_by(|(_, a), (_, b)| {
                a.position
                    .distance_squared(from)
                    .total_cmp(&b.position.distance_squared(from))
            })
            .map(|(id, _)| id);
        self.current
    }

    /// Ближайший валидный маячок среди сенсорных целей (без смены current)
    pub fn closest_fleeable(&self, registry: &TargetRegistry, from: Vec3) -> Option<TargetId> {
        self.in_range
            .iter()
            .filter_map(|id| registry.get(*id).map(|t| (*id, t)))
            .filter(|(_, t)| t.valid && t.fleeable)
            .min_by(|(_, a), (_, b)| {
                a.position
                    .distance_squared(from)
                    .total_cmp(&b.position.distance_squared(from))
            })
            .map(|(id, _)| id)
    }

    /// Начать бегство: запоминаем текущую цель
    pub fn begin_flee(&mut self, id: TargetId) {
        if self.flee.is_none() {
            self.previous = self.current.take();
        }
        self.flee = Some(id);
    }

    /// Закончить бегство: возвращаем прежнюю цель, если она ещё валидна
    pub fn end_flee(&mut self, registry: &TargetRegistry) -> Option<TargetId> {
        self.flee = None;
        self.current = self.previous.take().filter(|id| registry.is_valid(*id));
        self.current
    }
}
