//! Scene physics queries (raycast / sphere cast / overlap)
//!
//! Navigation слой НЕ зависит от конкретного physics движка: все запросы
//! идут через трейт `SpatialQuery`. `BoxScene` — reference реализация
//! поверх AABB (комната = пол, стены, потолок, мебель как коробки).
//!
//! ## Layers (битовая маска):
//! - `SCENE_MESH`: всё, что отсканировано (global mesh комнаты)
//! - `FURNITURE`: volumes мебели
//! - `WALLS`: стены, потолок
//! - `FLOOR`: пол

use bevy::prelude::*;

pub mod layers {
    //! Physics layer маски scene геометрии

    /// Global scene mesh (всё отсканированное)
    pub const SCENE_MESH: u32 = 0b1; // 1

    /// Мебель (volumes)
    pub const FURNITURE: u32 = 0b10; // 2

    /// Стены и потолок
    pub const WALLS: u32 = 0b100; // 4

    /// Пол
    pub const FLOOR: u32 = 0b1000; // 8

    /// Все scene слои
    pub const ALL: u32 = SCENE_MESH | FURNITURE | WALLS | FLOOR;
}

/// Результат physics запроса
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneHit {
    /// Точка контакта (на поверхности коллайдера)
    pub point: Vec3,
    pub normal: Vec3,
    /// Дистанция вдоль луча до центра sphere/луча в момент контакта
    pub distance: f32,
    pub entity: Option<Entity>,
    pub layer: u32,
}

/// Physics коллаборатор navigation слоя
pub trait SpatialQuery: Send + Sync {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: u32) -> Option<SceneHit>;

    fn sphere_cast(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: u32,
    ) -> Option<SceneHit>;

    /// Все коллайдеры, пересекающие сферу (ближайшая точка каждого в `point`)
    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: u32) -> Vec<SceneHit>;
}

/// Axis-aligned коробка сцены
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneBox {
    pub min: Vec3,
    pub max: Vec3,
    pub layer: u32,
    pub entity: Option<Entity>,
}

impl SceneBox {
    pub fn new(min: Vec3, max: Vec3, layer: u32) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
            layer,
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }
}

/// Slab test: (t_enter, t_exit, нормаль входной грани)
fn ray_aabb(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3) -> Option<(f32, f32, Vec3)> {
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() < 1.0e-8 {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }

        let inv = 1.0 / d;
        let mut t0 = (min[axis] - o) * inv;
        let mut t1 = (max[axis] - o) * inv;
        let mut face = Vec3::ZERO;
        face[axis] = -d.signum();
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > t_enter {
            t_enter = t0;
            normal = face;
        }
        t_exit = t_exit.min(t1);
        if t_enter > t_exit {
            return None;
        }
    }

    Some((t_enter, t_exit, normal))
}

/// Reference SpatialQuery поверх AABB
#[derive(Debug, Clone, Default)]
pub struct BoxScene {
    boxes: Vec<SceneBox>,
}

impl BoxScene {
    pub fn add_box(&mut self, scene_box: SceneBox) {
        self.boxes.push(scene_box);
    }

    pub fn boxes(&self) -> &[SceneBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    fn cast(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: u32,
    ) -> Option<SceneHit> {
        let direction = direction.try_normalize()?;
        let mut best: Option<SceneHit> = None;

        for scene_box in self.boxes.iter().filter(|b| b.layer & mask != 0) {
            // Minkowski sum: sphere против AABB ≈ луч против расширенного AABB
            let min = scene_box.min - Vec3::splat(radius);
            let max = scene_box.max + Vec3::splat(radius);
            let Some((t_enter, _t_exit, normal)) = ray_aabb(origin, direction, min, max) else {
                continue;
            };
            // Старт внутри коллайдера — игнорируем (как initial overlap в physics движках)
            if t_enter < 0.0 || t_enter > max_distance {
                continue;
            }
            if best.is_some_and(|hit| hit.distance <= t_enter) {
                continue;
            }

            let center_at_hit = origin + direction * t_enter;
            best = Some(SceneHit {
                point: scene_box.closest_point(center_at_hit),
                normal,
                distance: t_enter,
                entity: scene_box.entity,
                layer: scene_box.layer,
            });
        }

        best
    }
}

impl SpatialQuery for BoxScene {
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: u32) -> Option<SceneHit> {
        self.cast(origin, 0.0, direction, max_distance, mask)
    }

    fn sphere_cast(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: u32,
    ) -> Option<SceneHit> {
        self.cast(origin, radius.max(0.0), direction, max_distance, mask)
    }

    fn overlap_sphere(&self, center: Vec3, radius: f32, mask: u32) -> Vec<SceneHit> {
        self.boxes
            .iter()
            .filter(|b| b.layer & mask != 0)
            .filter_map(|b| {
                let point = b.closest_point(center);
                let distance = point.distance(center);
                (distance <= radius).then(|| SceneHit {
                    point,
                    normal: (center - point).try_normalize().unwrap_or(Vec3::Y),
                    distance,
                    entity: b.entity,
                    layer: b.layer,
                })
            })
            .collect()
    }
}

/// Resource: активный physics коллаборатор
#[derive(Resource)]
pub struct ScenePhysics(pub Box<dyn SpatialQuery>);

impl Default for ScenePhysics {
    fn default() -> Self {
        Self(Box::new(BoxScene::default()))
    }
}

impl ScenePhysics {
    pub fn query(&self) -> &dyn SpatialQuery {
        self.0.as_ref()
    }

    pub fn replace(&mut self, query: impl SpatialQuery + 'static) {
        self.0 = Box::new(query);
    }
}
