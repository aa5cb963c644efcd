//! Scene room — данные скана комнаты (anchors, planes, volumes)
//!
//! ## Anchor conventions:
//! - **Plane**: локальная Z — нормаль плоскости, прямоугольник `plane` (w, h) в локальных X/Y
//! - **Volume** (мебель): "forward is actual up" — локальная Z смотрит вверх,
//!   anchor стоит в центре ВЕРХНЕЙ грани, volume (w, d, h) уходит вниз по -Z
//!
//! Комната приходит от caller'а (scan / тестовая фабрика), core её не парсит.

use crate::nav::backend::NavSource;
use crate::nav::physics::{layers, BoxScene, SceneBox};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Стабильный id anchor'а внутри комнаты
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Reflect)]
pub struct AnchorId(pub u32);

/// Семантическая классификация anchor'а
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
pub enum SemanticLabel {
    Floor,
    Ceiling,
    WallFace,
    Table,
    Couch,
    Bed,
    Storage,
    Screen,
    Lamp,
    Plant,
    WallArt,
    WindowFrame,
    DoorFrame,
    Other,
}

impl SemanticLabel {
    /// Структурные элементы комнаты (не мебель)
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            SemanticLabel::Floor | SemanticLabel::Ceiling | SemanticLabel::WallFace
        )
    }
}

/// Один anchor скана
#[derive(Debug, Clone, PartialEq)]
pub struct SceneAnchor {
    pub id: AnchorId,
    pub labels: Vec<SemanticLabel>,
    pub transform: Transform,
    /// Прямоугольник плоскости (ширина, высота) в локальных X/Y
    pub plane: Option<Vec2>,
    /// Volume (ширина X, глубина Y, высота по -Z)
    pub volume: Option<Vec3>,
}

impl SceneAnchor {
    pub fn has_label(&self, label: SemanticLabel) -> bool {
        self.labels.contains(&label)
    }

    pub fn primary_label(&self) -> SemanticLabel {
        self.labels.first().copied().unwrap_or(SemanticLabel::Other)
    }

    pub fn is_furniture(&self) -> bool {
        self.volume.is_some() && !self.labels.iter().any(|l| l.is_structural())
    }

    /// "forward is actual up"
    pub fn up(&self) -> Vec3 {
        self.transform.rotation * Vec3::Z
    }

    pub fn top_center(&self) -> Vec3 {
        self.transform.translation
    }

    /// Площадь для разрешения "почти равных" кандидатов SceneQuery
    pub fn bounding_area(&self) -> f32 {
        match (self.plane, self.volume) {
            (Some(plane), _) => plane.x * plane.y,
            (None, Some(volume)) => volume.x * volume.y,
            (None, None) => 0.0,
        }
    }

    fn to_local(&self, point: Vec3) -> Vec3 {
        self.transform.rotation.inverse() * (point - self.transform.translation)
    }

    fn local_box(&self) -> Option<(Vec3, Vec3)> {
        self.volume.map(|v| {
            (
                Vec3::new(-v.x * 0.5, -v.y * 0.5, -v.z),
                Vec3::new(v.x * 0.5, v.y * 0.5, 0.0),
            )
        })
    }

    /// Расстояние от точки до геометрии anchor'а (0 внутри volume)
    pub fn distance_to(&self, point: Vec3) -> Option<f32> {
        let local = self.to_local(point);
        let plane_distance = self.plane.map(|size| {
            let half = size * 0.5;
            let clamped = Vec3::new(
                local.x.clamp(-half.x, half.x),
                local.y.clamp(-half.y, half.y),
                0.0,
            );
            local.distance(clamped)
        });
        let volume_distance = self
            .local_box()
            .map(|(min, max)| local.distance(local.clamp(min, max)));

        match (plane_distance, volume_distance) {
            (Some(p), Some(v)) => Some(p.min(v)),
            (p, v) => p.or(v),
        }
    }

    /// World AABB volume (по 8 углам)
    pub fn volume_aabb(&self) -> Option<(Vec3, Vec3)> {
        let (min, max) = self.local_box()?;
        let mut world_min = Vec3::splat(f32::INFINITY);
        let mut world_max = Vec3::splat(f32::NEG_INFINITY);
        for corner in 0..8 {
            let local = Vec3::new(
                if corner & 1 == 0 { min.x } else { max.x },
                if corner & 2 == 0 { min.y } else { max.y },
                if corner & 4 == 0 { min.z } else { max.z },
            );
            let world = self.transform.transform_point(local);
            world_min = world_min.min(world);
            world_max = world_max.max(world);
        }
        Some((world_min, world_max))
    }

    /// World AABB плоскости
    pub fn plane_aabb(&self) -> Option<(Vec3, Vec3)> {
        let half = self.plane? * 0.5;
        let mut world_min = Vec3::splat(f32::INFINITY);
        let mut world_max = Vec3::splat(f32::NEG_INFINITY);
        for (x, y) in [(-half.x, -half.y), (half.x, -half.y), (half.x, half.y), (-half.x, half.y)] {
            let world = self.transform.transform_point(Vec3::new(x, y, 0.0));
            world_min = world_min.min(world);
            world_max = world_max.max(world);
        }
        Some((world_min, world_max))
    }
}

/// Resource: текущая отсканированная комната
///
/// Замена ресурса (или мутация) запускает rebuild навигации.
#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct SceneRoom {
    pub anchors: Vec<SceneAnchor>,
    pub floor_y: f32,
    pub ceiling_y: f32,
    /// Bounds global scene mesh
    pub mesh_min: Vec3,
    pub mesh_max: Vec3,
    next_anchor: u32,
}

impl SceneRoom {
    /// Пустая прямоугольная комната: пол, потолок, 4 стены, центр пола в начале координат
    pub fn empty_box(width: f32, depth: f32, height: f32) -> Self {
        let mut room = Self {
            floor_y: 0.0,
            ceiling_y: height,
            mesh_min: Vec3::new(-width * 0.5, 0.0, -depth * 0.5),
            mesh_max: Vec3::new(width * 0.5, height, depth * 0.5),
            ..default()
        };

        room.add_plane(
            vec![SemanticLabel::Floor],
            Transform::from_rotation(Quat::from_rotation_x(-FRAC_PI_2)),
            Vec2::new(width, depth),
        );
        room.add_plane(
            vec![SemanticLabel::Ceiling],
            Transform::from_xyz(0.0, height, 0.0).with_rotation(Quat::from_rotation_x(FRAC_PI_2)),
            Vec2::new(width, depth),
        );

        // Стены смотрят внутрь комнаты, локальная Y остаётся вверх
        let walls = [
            (Vec3::new(width * 0.5, height * 0.5, 0.0), -FRAC_PI_2, depth),
            (Vec3::new(-width * 0.5, height * 0.5, 0.0), FRAC_PI_2, depth),
            (Vec3::new(0.0, height * 0.5, depth * 0.5), PI, width),
            (Vec3::new(0.0, height * 0.5, -depth * 0.5), 0.0, width),
        ];
        for (position, yaw, length) in walls {
            room.add_plane(
                vec![SemanticLabel::WallFace],
                Transform::from_translation(position).with_rotation(Quat::from_rotation_y(yaw)),
                Vec2::new(length, height),
            );
        }

        room
    }

    fn next_id(&mut self) -> AnchorId {
        let id = AnchorId(self.next_anchor);
        self.next_anchor += 1;
        id
    }

    pub fn add_plane(&mut self, labels: Vec<SemanticLabel>, transform: Transform, size: Vec2) -> AnchorId {
        let id = self.next_id();
        self.anchors.push(SceneAnchor {
            id,
            labels,
            transform,
            plane: Some(size),
            volume: None,
        });
        id
    }

    /// Мебель стоящая на полу: `position` — центр основания по XZ, `size` — (w, d, h)
    pub fn add_furniture(&mut self, label: SemanticLabel, position: Vec2, yaw: f32, size: Vec3) -> AnchorId {
        let id = self.next_id();
        let top = Vec3::new(position.x, self.floor_y + size.z, position.y);
        let rotation = Quat::from_rotation_y(yaw) * Quat::from_rotation_x(-FRAC_PI_2);
        self.anchors.push(SceneAnchor {
            id,
            labels: vec![label],
            transform: Transform::from_translation(top).with_rotation(rotation),
            plane: None,
            volume: Some(size),
        });
        id
    }

    /// Декор на стене (картина, окно) — копланарен стене
    pub fn add_wall_decor(&mut self, label: SemanticLabel, wall: AnchorId, offset: Vec2, size: Vec2) -> Option<AnchorId> {
        let transform = self.anchor(wall)?.transform;
        let position = transform.transform_point(Vec3::new(offset.x, offset.y, 0.0));
        Some(self.add_plane(
            vec![label],
            Transform::from_translation(position).with_rotation(transform.rotation),
            size,
        ))
    }

    pub fn remove_anchor(&mut self, id: AnchorId) -> bool {
        let before = self.anchors.len();
        self.anchors.retain(|a| a.id != id);
        before != self.anchors.len()
    }

    pub fn anchor(&self, id: AnchorId) -> Option<&SceneAnchor> {
        self.anchors.iter().find(|a| a.id == id)
    }

    pub fn furniture(&self) -> impl Iterator<Item = &SceneAnchor> {
        self.anchors.iter().filter(|a| a.is_furniture())
    }

    pub fn has_furniture(&self) -> bool {
        self.furniture().next().is_some()
    }

    pub fn with_label(&self, label: SemanticLabel) -> impl Iterator<Item = &SceneAnchor> {
        self.anchors.iter().filter(move |a| a.has_label(label))
    }

    pub fn height(&self) -> f32 {
        (self.ceiling_y - self.floor_y).max(0.0)
    }

    /// XZ bounds пола (floor plane ∪ scene mesh)
    pub fn floor_bounds(&self) -> (Vec2, Vec2) {
        let mut min = self.mesh_min.xz();
        let mut max = self.mesh_max.xz();
        for floor in self.with_label(SemanticLabel::Floor) {
            if let Some((plane_min, plane_max)) = floor.plane_aabb() {
                min = min.min(plane_min.xz());
                max = max.max(plane_max.xz());
            }
        }
        (min, max)
    }

    /// Геометрия для navmesh build: пол + верх мебели walkable, тела мебели — obstacles
    pub fn nav_sources(&self) -> Vec<NavSource> {
        let (min, max) = self.floor_bounds();
        let mut sources = vec![NavSource::walkable(
            Vec3::new(min.x, self.floor_y - 0.1, min.y),
            Vec3::new(max.x, self.floor_y, max.y),
        )];
        for anchor in self.furniture() {
            if let Some((box_min, box_max)) = anchor.volume_aabb() {
                sources.push(NavSource::walkable(Vec3::new(box_min.x, box_max.y - 0.01, box_min.z), box_max));
                sources.push(NavSource::obstacle(box_min, box_max));
            }
        }
        sources
    }

    /// Physics представление комнаты для reference SpatialQuery
    pub fn to_box_scene(&self) -> BoxScene {
        const THICKNESS: f32 = 0.1;
        let (min, max) = self.floor_bounds();
        let structural = layers::SCENE_MESH | layers::WALLS;
        let mut scene = BoxScene::default();

        scene.add_box(SceneBox::new(
            Vec3::new(min.x, self.floor_y - THICKNESS, min.y),
            Vec3::new(max.x, self.floor_y, max.y),
            layers::SCENE_MESH | layers::FLOOR,
        ));
        scene.add_box(SceneBox::new(
            Vec3::new(min.x, self.ceiling_y, min.y),
            Vec3::new(max.x, self.ceiling_y + THICKNESS, max.y),
            structural,
        ));
        scene.add_box(SceneBox::new(
            Vec3::new(max.x, self.floor_y, min.y),
            Vec3::new(max.x + THICKNESS, self.ceiling_y, max.y),
            structural,
        ));
        scene.add_box(SceneBox::new(
            Vec3::new(min.x - THICKNESS, self.floor_y, min.y),
            Vec3::new(min.x, self.ceiling_y, max.y),
            structural,
        ));
        scene.add_box(SceneBox::new(
            Vec3::new(min.x, self.floor_y, max.y),
            Vec3::new(max.x, self.ceiling_y, max.y + THICKNESS),
            structural,
        ));
        scene.add_box(SceneBox::new(
            Vec3::new(min.x, self.floor_y, min.y - THICKNESS),
            Vec3::new(max.x, self.ceiling_y, min.y),
            structural,
        ));

        for anchor in self.furniture() {
            if let Some((box_min, box_max)) = anchor.volume_aabb() {
                scene.add_box(SceneBox::new(box_min, box_max, layers::SCENE_MESH | layers::FURNITURE));
            }
        }
        scene
    }
}
