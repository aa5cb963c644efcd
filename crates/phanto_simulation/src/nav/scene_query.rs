//! SceneQuery — "что находится в этой точке комнаты?"
//!
//! Два пути:
//! - fast path: кеш прошлых ответов по грубой ячейке (spatial hash)
//! - brute force: расстояние до каждой plane/volume; среди кандидатов в пределах
//!   tie threshold (2см) от лучшего выигрывает наименьшая площадь
//!   (картина копланарна стене — по расстоянию их не различить)
//!
//! Плюс случайные точки на мебели/полу и "длина" пути для ранжирования spawn точек.

use crate::config::NavConfig;
use crate::nav::backend::{NavMeshProvider, PathStatus};
use crate::nav::bookkeeper::NavMeshBookKeeper;
use crate::nav::room::{AnchorId, SceneAnchor, SceneRoom, SemanticLabel};
use crate::nav::{AreaMask, OwnerId};
use bevy::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// Ответ классификации
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHit {
    pub anchor: AnchorId,
    pub label: SemanticLabel,
}

#[derive(Resource, Debug)]
pub struct SceneQuery {
    surfaces: Vec<SceneAnchor>,
    cache: HashMap<IVec3, Option<SurfaceHit>>,
    cell_size: f32,
    tie_threshold: f32,
    cache_hits: usize,
}

impl Default for SceneQuery {
    fn default() -> Self {
        Self::new(&NavConfig::default())
    }
}

impl SceneQuery {
    pub fn new(config: &NavConfig) -> Self {
        Self {
            surfaces: Vec::new(),
            cache: HashMap::new(),
            cell_size: config.scene_query_cell_size.max(1.0e-3),
            tie_threshold: config.scene_query_tie_threshold,
            cache_hits: 0,
        }
    }

    /// Зарегистрировать все planes/volumes комнаты (старые удаляются, кеш сбрасывается)
    pub fn register_room(&mut self, room: &SceneRoom) {
        self.surfaces = room
            .anchors
            .iter()
            .filter(|a| a.plane.is_some() || a.volume.is_some())
            .cloned()
            .collect();
        self.invalidate_cache();
    }

    pub fn invalidate_cache(&mut self) {
        self.cache.clear();
        self.cache_hits = 0;
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    fn cell(&self, point: Vec3) -> IVec3 {
        (point / self.cell_size).floor().as_ivec3()
    }

    /// Классификация с кешем по ячейке
    pub fn classify(&mut self, point: Vec3) -> Option<SurfaceHit> {
        let cell = self.cell(point);
        if let Some(cached) = self.cache.get(&cell) {
            self.cache_hits += 1;
            return *cached;
        }
        let hit = self.classify_uncached(point);
        self.cache.insert(cell, hit);
        hit
    }

    /// Brute force по всем поверхностям
    pub fn classify_uncached(&self, point: Vec3) -> Option<SurfaceHit> {
        let distances: Vec<(&SceneAnchor, f32)> = self
            .surfaces
            .iter()
            .filter_map(|s| s.distance_to(point).map(|d| (s, d)))
            .collect();

        let best = distances.iter().map(|(_, d)| *d).min_by(f32::total_cmp)?;

        distances
            .iter()
            .filter(|(_, d)| *d <= best + self.tie_threshold)
            .min_by(|(a, da), (b, db)| {
                a.bounding_area()
                    .total_cmp(&b.bounding_area())
                    .then(da.total_cmp(db))
            })
            .map(|(anchor, _)| SurfaceHit {
                anchor: anchor.id,
                label: anchor.primary_label(),
            })
    }

    /// Ближайшая поверхность с заданным label (anchor + расстояние)
    pub fn closest_surface_with_label(&self, point: Vec3, label: SemanticLabel) -> Option<(AnchorId, f32)> {
        self.surfaces
            .iter()
            .filter(|s| s.has_label(label))
            .filter_map(|s| s.distance_to(point).map(|d| (s.id, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn random_point_on_owner<R: Rng + ?Sized>(
        owner: OwnerId,
        rng: &mut R,
        bookkeeper: &NavMeshBookKeeper,
        mesh: &dyn NavMeshProvider,
        config: &NavConfig,
    ) -> Option<Vec3> {
        let triangles = bookkeeper.open_triangles(owner);
        let triangle = triangles.choose(rng)?;
        Some(triangle.random_point(rng, mesh, config.sample_max_distance))
    }

    /// Случайная точка на верхе случайной мебели
    pub fn random_point_on_furniture<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        bookkeeper: &NavMeshBookKeeper,
        mesh: &dyn NavMeshProvider,
        config: &NavConfig,
    ) -> Option<Vec3> {
        let mut owners: Vec<OwnerId> = self
            .surfaces
            .iter()
            .filter(|s| s.is_furniture())
            .map(|s| OwnerId::furniture(s.id))
            .filter(|owner| !bookkeeper.owner_triangles(*owner).is_empty())
            .collect();
        owners.shuffle(rng);
        let owner = owners.first().copied()?;
        Self::random_point_on_owner(owner, rng, bookkeeper, mesh, config)
    }

    pub fn random_point_on_floor<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        bookkeeper: &NavMeshBookKeeper,
        mesh: &dyn NavMeshProvider,
        config: &NavConfig,
    ) -> Option<Vec3> {
        Self::random_point_on_owner(OwnerId::FLOOR, rng, bookkeeper, mesh, config)
    }

    /// Сумма КВАДРАТОВ длин сегментов пути (только для сравнения кандидатов)
    ///
    /// Invalid путь — `f32::INFINITY`.
    pub fn path_length(from: Vec3, to: Vec3, mesh: &dyn NavMeshProvider, mask: AreaMask) -> f32 {
        let path = mesh.calculate_path(from, to, mask);
        if path.status == PathStatus::Invalid {
            return f32::INFINITY;
        }
        path.corners
            .windows(2)
            .map(|pair| pair[0].distance_squared(pair[1]))
            .sum()
    }
}
