//! Рёбра треугольников для подсчёта смежности
//!
//! Edge — неупорядоченная пара концов (A→B == B→A), используется только как
//! ключ HashMap. Концы квантуются (0.1мм), чтобы float-шум триангуляции
//! не разваливал общие рёбра.

use crate::nav::triangle::VERTEX_EPSILON;
use bevy::math::{IVec3, Vec3};
use std::collections::HashMap;

/// Шаг квантования концов ребра (метры) = допуск равенства вершин
pub const EDGE_QUANTUM: f32 = VERTEX_EPSILON;

pub(crate) fn quantize(point: Vec3) -> IVec3 {
    (point / EDGE_QUANTUM).round().as_ivec3()
}

/// Неупорядоченное ребро
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    a: IVec3,
    b: IVec3,
}

impl Edge {
    pub fn new(p: Vec3, q: Vec3) -> Self {
        let (a, b) = (quantize(p), quantize(q));
        // Канонический порядок — направление не важно
        if a.to_array() <= b.to_array() {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }
}

/// Сколько треугольников полной триангуляции содержат каждое ребро
#[derive(Debug, Clone, Default)]
pub struct EdgeCounts {
    counts: HashMap<Edge, u32>,
}

impl EdgeCounts {
    pub fn increment(&mut self, edge: Edge) {
        *self.counts.entry(edge).or_insert(0) += 1;
    }

    pub fn count(&self, edge: &Edge) -> u32 {
        self.counts.get(edge).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_is_direction_independent() {
        let p = Vec3::new(0.0, 0.0, 0.0);
        let q = Vec3::new(1.0, 0.0, 0.5);
        assert_eq!(Edge::new(p, q), Edge::new(q, p));
    }

    #[test]
    fn test_edge_tolerates_float_noise() {
        let p = Vec3::new(0.25, 0.0, 0.75);
        let noisy = p + Vec3::splat(1.0e-6);
        let q = Vec3::new(1.0, 0.0, 1.0);
        assert_eq!(Edge::new(p, q), Edge::new(noisy, q));
    }

    #[test]
    fn test_counts_accumulate() {
        let mut counts = EdgeCounts::default();
        let edge = Edge::new(Vec3::ZERO, Vec3::X);
        counts.increment(edge);
        counts.increment(Edge::new(Vec3::X, Vec3::ZERO));

        assert_eq!(counts.count(&edge), 2);
        assert_eq!(counts.count(&Edge::new(Vec3::ZERO, Vec3::Z)), 0);
        assert_eq!(counts.len(), 1);
    }
}
