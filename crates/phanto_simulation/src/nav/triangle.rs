//! NavTriangle — один проходимый треугольник navmesh'а
//!
//! Геометрия неизменяема после создания. Производные флаги:
//! - `is_border`: выставляется двухпроходным `increment_edge_counts` / `determine_edges`
//!   (border-ность — свойство ВСЕЙ триангуляции, не одного треугольника)
//! - `is_open`: выставляется `verify_open` (sphere cast от потолка вниз)
//!
//! Флаги НЕ участвуют в равенстве.

use crate::config::NavConfig;
use crate::nav::backend::NavMeshProvider;
use crate::nav::edges::{Edge, EdgeCounts};
use crate::nav::physics::{layers, SpatialQuery};
use crate::nav::NavArea;
use bevy::math::Vec3;
use rand::Rng;
use std::sync::OnceLock;

/// Допуск совпадения вершин (метры). Тем же шагом квантуются рёбра и reuse ключи.
pub const VERTEX_EPSILON: f32 = 1.0e-4;
pub const VERTEX_EPSILON_SQ: f32 = VERTEX_EPSILON * VERTEX_EPSILON;

pub fn approx_eq(a: Vec3, b: Vec3) -> bool {
    a.distance_squared(b) < VERTEX_EPSILON_SQ
}

#[derive(Debug, Clone)]
pub struct NavTriangle {
    pub v1: Vec3,
    pub v2: Vec3,
    pub v3: Vec3,
    pub area_id: NavArea,
    pub centroid: Vec3,
    /// Heron, считается при первом обращении
    surface_area: OnceLock<f32>,
    pub is_open: bool,
    pub is_border: bool,
}

impl PartialEq for NavTriangle {
    /// Вершины сравниваются попарно В ТОМ ЖЕ порядке (поворот v1→v2→v3 не равен)
    fn eq(&self, other: &Self) -> bool {
        self.area_id == other.area_id
            && approx_eq(self.v1, other.v1)
            && approx_eq(self.v2, other.v2)
            && approx_eq(self.v3, other.v3)
    }
}

impl NavTriangle {
    pub fn new(v1: Vec3, v2: Vec3, v3: Vec3, area_id: NavArea) -> Self {
        Self {
            v1,
            v2,
            v3,
            area_id,
            centroid: (v1 + v2 + v3) / 3.0,
            surface_area: OnceLock::new(),
            is_open: false,
            is_border: false,
        }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v1, self.v2, self.v3]
    }

    pub fn edges(&self) -> [Edge; 3] {
        [
            Edge::new(self.v1, self.v2),
            Edge::new(self.v2, self.v3),
            Edge::new(self.v3, self.v1),
        ]
    }

    /// Площадь по формуле Герона (кешируется)
    pub fn area(&self) -> f32 {
        *self.surface_area.get_or_init(|| {
            let a = self.v1.distance(self.v2);
            let b = self.v2.distance(self.v3);
            let c = self.v3.distance(self.v1);
            let s = (a + b + c) * 0.5;
            // Вырожденный треугольник может дать чуть отрицательное произведение
            (s * (s - a) * (s - b) * (s - c)).max(0.0).sqrt()
        })
    }

    /// Точка по барицентрике равномерного распределения по площади
    ///
    /// `a = sqrt(u1)`, `b = u2`, `p = (1-a)v1 + a(1-b)v2 + ab·v3`
    pub fn sample_uniform(&self, u1: f32, u2: f32) -> Vec3 {
        let a = u1.clamp(0.0, 1.0).sqrt();
        let b = u2.clamp(0.0, 1.0);
        self.v1 * (1.0 - a) + self.v2 * (a * (1.0 - b)) + self.v3 * (a * b)
    }

    /// Случайная точка, прижатая к реальной поверхности navmesh этой area
    pub fn random_point<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        mesh: &dyn NavMeshProvider,
        max_snap_distance: f32,
    ) -> Vec3 {
        let sample = self.sample_uniform(rng.gen::<f32>(), rng.gen::<f32>());
        mesh.nearest_point(sample, max_snap_distance, self.area_id.mask())
            .unwrap_or(sample)
    }

    /// Проверка headroom: sphere cast от проекции центроида на потолок вниз
    ///
    /// Open ⇔ hit есть И hit point в пределах factor × radius от центроида
    /// (значит над этим местом ничего не висит).
    pub fn verify_open(
        &mut self,
        ceiling_y: f32,
        physics: &dyn SpatialQuery,
        config: &NavConfig,
    ) -> bool {
        let radius = config.open_check_radius;
        let origin = Vec3::new(self.centroid.x, ceiling_y, self.centroid.z);
        let max_distance = (ceiling_y - self.centroid.y).abs() + radius * 4.0;

        self.is_open = match physics.sphere_cast(
            origin,
            radius,
            Vec3::NEG_Y,
            max_distance,
            layers::SCENE_MESH,
        ) {
            Some(hit) => {
                hit.point.distance(self.centroid) <= radius * config.open_check_tolerance_factor
            }
            None => false,
        };

        self.is_open
    }

    /// Pass 1: учесть рёбра этого треугольника в глобальных счётчиках
    pub fn increment_edge_counts(&self, counts: &mut EdgeCounts) {
        for edge in self.edges() {
            counts.increment(edge);
        }
    }

    /// Pass 2: border ⇔ хотя бы одно ребро встречается ровно один раз
    pub fn determine_edges(&mut self, counts: &EdgeCounts) -> bool {
        self.is_border = self.edges().iter().any(|edge| counts.count(edge) == 1);
        self.is_border
    }

    pub fn furthest_vert(&self, point: Vec3) -> Vec3 {
        let mut best = self.v1;
        for v in [self.v2, self.v3] {
            if v.distance_squared(point) > best.distance_squared(point) {
                best = v;
            }
        }
        best
    }

    pub fn closest_vert(&self, point: Vec3) -> Vec3 {
        let mut best = self.v1;
        for v in [self.v2, self.v3] {
            if v.distance_squared(point) < best.distance_squared(point) {
                best = v;
            }
        }
        best
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        closest_point_on_triangle(point, self.v1, self.v2, self.v3)
    }

    /// Точка внутри проекции треугольника на XZ
    pub fn contains_xz(&self, point: Vec3) -> bool {
        contains_xz(point, self.v1, self.v2, self.v3)
    }
}

/// Ближайшая точка треугольника (Ericson, Real-Time Collision Detection 5.1.5)
pub fn closest_point_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

pub fn contains_xz(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> bool {
    let sign = |p1: Vec3, p2: Vec3, p3: Vec3| {
        (p1.x - p3.x) * (p2.z - p3.z) - (p2.x - p3.x) * (p1.z - p3.z)
    };
    let d1 = sign(p, a, b);
    let d2 = sign(p, b, c);
    let d3 = sign(p, c, a);
    let has_neg = d1 < -1.0e-7 || d2 < -1.0e-7 || d3 < -1.0e-7;
    let has_pos = d1 > 1.0e-7 || d2 > 1.0e-7 || d3 > 1.0e-7;
    !(has_neg && has_pos)
}

#[cfg(test)]
#[path = "triangle_tests.rs"]
mod triangle_tests;
