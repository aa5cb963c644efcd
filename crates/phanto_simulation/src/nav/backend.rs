//! NavMesh provider — трейт pathfinding коллаборатора + reference реализация
//!
//! Core не строит navmesh сам: surface генераторы отдают провайдеру
//! `SurfaceBuildRequest` (volume + геометрия комнаты), провайдер хранит
//! поверхности, отдаёт полную триангуляцию, считает пути и nearest-point.
//!
//! `GridNavMesh` — headless реализация:
//! - walkable прямоугольники режутся на клетки `cell_size`, 2 треугольника на клетку
//! - клетка попадает в surface если её центр внутри (oriented) volume и над ней
//!   нет obstacle ниже `agent_height`
//! - граф смежности = общие рёбра + off-mesh links, поиск — A* (min-heap)

use crate::config::NavConfig;
use crate::logger;
use crate::nav::edges::Edge;
use crate::nav::links::NavLink;
use crate::nav::triangle::{closest_point_on_triangle, contains_xz};
use crate::nav::{AreaMask, LinkId, NavArea, OwnerId};
use bevy::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

/// Верхняя граница клеток одного source (защита от мусорных сканов)
const MAX_CELLS_PER_SOURCE: usize = 250_000;

/// Насколько далеко от link endpoint ищем треугольник для его привязки к графу
const LINK_ATTACH_DISTANCE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    Complete,
    Partial,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavPath {
    pub corners: Vec<Vec3>,
    pub status: PathStatus,
}

impl NavPath {
    pub fn invalid() -> Self {
        Self {
            corners: Vec::new(),
            status: PathStatus::Invalid,
        }
    }

    pub fn last_corner(&self) -> Option<Vec3> {
        self.corners.last().copied()
    }
}

/// Результат mesh raycast (`hit == true` ⇔ луч упёрся в границу mesh)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshRaycastHit {
    pub hit: bool,
    /// Дальняя достижимая точка вдоль луча
    pub position: Vec3,
}

/// Треугольник триангуляции в "сыром" виде (как отдаёт провайдер)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawTriangle {
    pub vertices: [Vec3; 3],
    pub area: NavArea,
}

impl RawTriangle {
    pub fn centroid(&self) -> Vec3 {
        (self.vertices[0] + self.vertices[1] + self.vertices[2]) / 3.0
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let [a, b, c] = self.vertices;
        closest_point_on_triangle(point, a, b, c)
    }
}

/// Oriented box, внутри которого строится surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavVolume {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub rotation: Quat,
}

impl NavVolume {
    pub fn axis_aligned(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            half_extents: (max - min).abs() * 0.5,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn size(&self) -> Vec3 {
        self.half_extents * 2.0
    }

    pub fn contains(&self, point: Vec3) -> bool {
        let local = self.rotation.inverse() * (point - self.center);
        local.abs().cmple(self.half_extents + Vec3::splat(1.0e-4)).all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavSourceKind {
    /// Верхняя грань — проходимая поверхность
    Walkable,
    /// Вырезает проходимость под собой
    Obstacle,
}

/// Геометрия комнаты для navmesh build (AABB)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavSource {
    pub min: Vec3,
    pub max: Vec3,
    pub kind: NavSourceKind,
}

impl NavSource {
    pub fn walkable(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
            kind: NavSourceKind::Walkable,
        }
    }

    pub fn obstacle(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
            kind: NavSourceKind::Obstacle,
        }
    }

    fn covers_xz(&self, point: Vec3) -> bool {
        point.x > self.min.x && point.x < self.max.x && point.z > self.min.z && point.z < self.max.z
    }
}

/// Запрос на (пере)сборку одной surface
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceBuildRequest {
    pub volume: NavVolume,
    pub area: NavArea,
    pub sources: Vec<NavSource>,
}

/// Pathfinding коллаборатор
pub trait NavMeshProvider: Send + Sync {
    /// (Пере)собрать surface owner'а. Возвращает число треугольников surface.
    fn build_surface(&mut self, owner: OwnerId, request: &SurfaceBuildRequest) -> usize;

    /// Удалить surface. `false` если её не было.
    fn remove_surface(&mut self, owner: OwnerId) -> bool;

    fn has_surface(&self, owner: OwnerId) -> bool;

    /// Полная триангуляция всех surfaces (детерминированный порядок)
    fn triangulation(&self) -> Vec<RawTriangle>;

    fn calculate_path(&self, from: Vec3, to: Vec3, mask: AreaMask) -> NavPath;

    fn raycast(&self, from: Vec3, to: Vec3, mask: AreaMask) -> MeshRaycastHit;

    fn nearest_point(&self, point: Vec3, max_distance: f32, mask: AreaMask) -> Option<Vec3>;

    fn add_link(&mut self, link: &NavLink);

    fn remove_link(&mut self, id: LinkId) -> bool;
}

/// Resource: активный navmesh провайдер
#[derive(Resource)]
pub struct NavMeshHandle(pub Box<dyn NavMeshProvider>);

impl Default for NavMeshHandle {
    fn default() -> Self {
        Self(Box::new(GridNavMesh::default()))
    }
}

impl NavMeshHandle {
    pub fn provider(&self) -> &dyn NavMeshProvider {
        self.0.as_ref()
    }

    pub fn provider_mut(&mut self) -> &mut dyn NavMeshProvider {
        self.0.as_mut()
    }
}

// ============================================================================
// GridNavMesh
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Portal {
    /// Общее ребро (середина)
    Shared(Vec3),
    /// Off-mesh link
    Link { start: Vec3, end: Vec3, area: NavArea },
}

#[derive(Debug, Clone, Copy)]
struct GraphEdge {
    to: usize,
    portal: Portal,
    cost: f32,
}

#[derive(Debug, Clone)]
struct GraphNode {
    triangle: RawTriangle,
    centroid: Vec3,
}

/// Entry в open set A* (min-heap через reversed ordering)
struct OpenEntry {
    node: usize,
    f_score: f32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f_score.total_cmp(&other.f_score) == Ordering::Equal && self.node == other.node
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: наименьший f_score — "наибольший"
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Reference navmesh (grid triangulation + A*)
#[derive(Debug, Clone)]
pub struct GridNavMesh {
    cell_size: f32,
    agent_height: f32,
    surfaces: BTreeMap<OwnerId, Vec<RawTriangle>>,
    links: BTreeMap<LinkId, NavLink>,
    nodes: Vec<GraphNode>,
    adjacency: Vec<Vec<GraphEdge>>,
}

impl Default for GridNavMesh {
    fn default() -> Self {
        Self::from_config(&NavConfig::default())
    }
}

impl GridNavMesh {
    pub fn new(cell_size: f32, agent_height: f32) -> Self {
        Self {
            cell_size: cell_size.max(0.01),
            agent_height,
            surfaces: BTreeMap::new(),
            links: BTreeMap::new(),
            nodes: Vec::new(),
            adjacency: Vec::new(),
        }
    }

    pub fn from_config(config: &NavConfig) -> Self {
        Self::new(config.grid_cell_size, config.agent_height)
    }

    pub fn surface(&self, owner: OwnerId) -> Option<&[RawTriangle]> {
        self.surfaces.get(&owner).map(|tris| tris.as_slice())
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn triangulate(&self, request: &SurfaceBuildRequest) -> Vec<RawTriangle> {
        let obstacles: Vec<&NavSource> = request
            .sources
            .iter()
            .filter(|s| s.kind == NavSourceKind::Obstacle)
            .collect();

        let mut triangles = Vec::new();
        for source in request.sources.iter().filter(|s| s.kind == NavSourceKind::Walkable) {
            let size = source.max - source.min;
            let nx = (size.x / self.cell_size).ceil().max(1.0) as usize;
            let nz = (size.z / self.cell_size).ceil().max(1.0) as usize;
            if nx.saturating_mul(nz) > MAX_CELLS_PER_SOURCE {
                logger::log_warning(&format!(
                    "⚠️ GridNavMesh: walkable source {:?}..{:?} too large ({}x{} cells), skipped",
                    source.min, source.max, nx, nz
                ));
                continue;
            }

            let top = source.max.y;
            for ix in 0..nx {
                let x0 = source.min.x + ix as f32 * self.cell_size;
                let x1 = (x0 + self.cell_size).min(source.max.x);
                for iz in 0..nz {
                    let z0 = source.min.z + iz as f32 * self.cell_size;
                    let z1 = (z0 + self.cell_size).min(source.max.z);
                    let center = Vec3::new((x0 + x1) * 0.5, top, (z0 + z1) * 0.5);

                    if !request.volume.contains(center) {
                        continue;
                    }
                    let carved = obstacles.iter().any(|o| {
                        o.covers_xz(center)
                            && o.max.y > top + 1.0e-3
                            && o.min.y < top + self.agent_height
                    });
                    if carved {
                        continue;
                    }

                    let a = Vec3::new(x0, top, z0);
                    let b = Vec3::new(x0, top, z1);
                    let c = Vec3::new(x1, top, z1);
                    let d = Vec3::new(x1, top, z0);
                    triangles.push(RawTriangle {
                        vertices: [a, b, c],
                        area: request.area,
                    });
                    triangles.push(RawTriangle {
                        vertices: [a, c, d],
                        area: request.area,
                    });
                }
            }
        }
        triangles
    }

    /// Пересобрать граф смежности (после любой мутации surfaces/links)
    fn rebuild_graph(&mut self) {
        self.nodes = self
            .surfaces
            .values()
            .flatten()
            .map(|t| GraphNode {
                triangle: *t,
                centroid: t.centroid(),
            })
            .collect();
        self.adjacency = vec![Vec::new(); self.nodes.len()];

        let mut by_edge: HashMap<Edge, Vec<usize>> = HashMap::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let [a, b, c] = node.triangle.vertices;
            for (p, q) in [(a, b), (b, c), (c, a)] {
                by_edge.entry(Edge::new(p, q)).or_default().push(index);
            }
        }

        // Порядок рёбер в HashMap недетерминирован — сортируем соседей после
        let shared: Vec<(Vec<usize>, Vec3)> = by_edge
            .into_values()
            .filter(|nodes| nodes.len() >= 2)
            .map(|nodes| {
                let midpoint = self.shared_midpoint(nodes[0], nodes[1]);
                (nodes, midpoint)
            })
            .collect();

        for (edge_nodes, midpoint) in shared {
            for &i in &edge_nodes {
                for &j in &edge_nodes {
                    if i != j {
                        let cost = self.nodes[i].centroid.distance(midpoint)
                            + midpoint.distance(self.nodes[j].centroid);
                        self.adjacency[i].push(GraphEdge {
                            to: j,
                            portal: Portal::Shared(midpoint),
                            cost,
                        });
                    }
                }
            }
        }

        let links: Vec<NavLink> = self.links.values().cloned().collect();
        for link in &links {
            let start = self.locate(link.start, LINK_ATTACH_DISTANCE, AreaMask::ALL);
            let end = self.locate(link.end, LINK_ATTACH_DISTANCE, AreaMask::ALL);
            let (Some((from, _)), Some((to, _))) = (start, end) else {
                logger::log_warning(&format!(
                    "NavLink {:?}: endpoints {:?} -> {:?} not on mesh, link ignored",
                    link.id, link.start, link.end
                ));
                continue;
            };
            let cost = self.nodes[from].centroid.distance(link.start)
                + link.start.distance(link.end)
                + link.end.distance(self.nodes[to].centroid);
            self.adjacency[from].push(GraphEdge {
                to,
                portal: Portal::Link {
                    start: link.start,
                    end: link.end,
                    area: link.area,
                },
                cost,
            });
            if link.bidirectional {
                self.adjacency[to].push(GraphEdge {
                    to: from,
                    portal: Portal::Link {
                        start: link.end,
                        end: link.start,
                        area: link.area,
                    },
                    cost,
                });
            }
        }

        for edges in &mut self.adjacency {
            edges.sort_by(|a, b| a.to.cmp(&b.to).then(a.cost.total_cmp(&b.cost)));
        }
    }

    fn shared_midpoint(&self, i: usize, j: usize) -> Vec3 {
        let a = self.nodes[i].triangle.vertices;
        let b = self.nodes[j].triangle.vertices;
        let shared: Vec<Vec3> = a
            .iter()
            .filter(|v| b.iter().any(|w| v.distance_squared(*w) < 1.0e-8))
            .copied()
            .collect();
        match shared.as_slice() {
            [p, q, ..] => (*p + *q) * 0.5,
            _ => (self.nodes[i].centroid + self.nodes[j].centroid) * 0.5,
        }
    }

    /// Ближайший треугольник (index + точка на нём) в пределах `max_distance`
    fn locate(&self, point: Vec3, max_distance: f32, mask: AreaMask) -> Option<(usize, Vec3)> {
        let mut best: Option<(usize, Vec3, f32)> = None;
        for (index, node) in self.nodes.iter().enumerate() {
            if !mask.contains(node.triangle.area) {
                continue;
            }
            let closest = node.triangle.closest_point(point);
            let distance = closest.distance_squared(point);
            if distance > max_distance * max_distance {
                continue;
            }
            if best.is_none_or(|(_, _, d)| distance < d) {
                best = Some((index, closest, distance));
            }
        }
        best.map(|(index, closest, _)| (index, closest))
    }

    fn edge_allowed(edge: &GraphEdge, mask: AreaMask) -> bool {
        match edge.portal {
            Portal::Shared(_) => true,
            Portal::Link { area, .. } => mask.contains(area),
        }
    }

    fn reconstruct(
        &self,
        came_from: &[Option<(usize, Portal)>],
        start_point: Vec3,
        start: usize,
        last: usize,
        end_point: Vec3,
    ) -> Vec<Vec3> {
        let mut portals = Vec::new();
        let mut current = last;
        while current != start {
            let Some((previous, portal)) = came_from[current] else {
                break;
            };
            portals.push(portal);
            current = previous;
        }
        portals.reverse();

        let mut corners = vec![start_point];
        for portal in portals {
            match portal {
                Portal::Shared(midpoint) => corners.push(midpoint),
                Portal::Link { start, end, .. } => {
                    corners.push(start);
                    corners.push(end);
                }
            }
        }
        corners.push(end_point);
        corners.dedup_by(|a, b| a.distance_squared(*b) < 1.0e-10);
        corners
    }
}

impl NavMeshProvider for GridNavMesh {
    fn build_surface(&mut self, owner: OwnerId, request: &SurfaceBuildRequest) -> usize {
        let triangles = self.triangulate(request);
        let count = triangles.len();
        self.surfaces.insert(owner, triangles);
        self.rebuild_graph();
        count
    }

    fn remove_surface(&mut self, owner: OwnerId) -> bool {
        let existed = self.surfaces.remove(&owner).is_some();
        if existed {
            self.rebuild_graph();
        }
        existed
    }

    fn has_surface(&self, owner: OwnerId) -> bool {
        self.surfaces.contains_key(&owner)
    }

    fn triangulation(&self) -> Vec<RawTriangle> {
        self.nodes.iter().map(|n| n.triangle).collect()
    }

    fn calculate_path(&self, from: Vec3, to: Vec3, mask: AreaMask) -> NavPath {
        let search_radius = self.cell_size * 2.0;
        let Some((start, start_point)) = self.locate(from, search_radius, mask) else {
            return NavPath::invalid();
        };
        let goal = self.locate(to, search_radius, mask);

        if let Some((goal_index, goal_point)) = goal {
            if goal_index == start {
                return NavPath {
                    corners: vec![start_point, goal_point],
                    status: PathStatus::Complete,
                };
            }
        }

        let n = self.nodes.len();
        let mut g_score = vec![f32::INFINITY; n];
        let mut came_from: Vec<Option<(usize, Portal)>> = vec![None; n];
        let mut closed = vec![false; n];
        g_score[start] = 0.0;

        let mut open = BinaryHeap::new();
        open.push(OpenEntry {
            node: start,
            f_score: self.nodes[start].centroid.distance(to),
        });

        while let Some(current) = open.pop() {
            let ci = current.node;
            if let Some((goal_index, goal_point)) = goal {
                if ci == goal_index {
                    return NavPath {
                        corners: self.reconstruct(&came_from, start_point, start, ci, goal_point),
                        status: PathStatus::Complete,
                    };
                }
            }
            if closed[ci] {
                continue;
            }
            closed[ci] = true;

            for edge in &self.adjacency[ci] {
                let ni = edge.to;
                if closed[ni]
                    || !mask.contains(self.nodes[ni].triangle.area)
                    || !Self::edge_allowed(edge, mask)
                {
                    continue;
                }
                let tentative = g_score[ci] + edge.cost;
                if tentative < g_score[ni] {
                    g_score[ni] = tentative;
                    came_from[ni] = Some((ci, edge.portal));
                    open.push(OpenEntry {
                        node: ni,
                        f_score: tentative + self.nodes[ni].centroid.distance(to),
                    });
                }
            }
        }

        // Цель недостижима — путь до ближайшей к ней достижимой точки
        let mut best: Option<(usize, Vec3, f32)> = None;
        for (index, node) in self.nodes.iter().enumerate() {
            if !closed[index] {
                continue;
            }
            let closest = node.triangle.closest_point(to);
            let distance = closest.distance_squared(to);
            if best.is_none_or(|(_, _, d)| distance < d) {
                best = Some((index, closest, distance));
            }
        }

        match best {
            Some((index, closest, _)) => NavPath {
                corners: self.reconstruct(&came_from, start_point, start, index, closest),
                status: PathStatus::Partial,
            },
            None => NavPath::invalid(),
        }
    }

    fn raycast(&self, from: Vec3, to: Vec3, mask: AreaMask) -> MeshRaycastHit {
        let probe = self.cell_size;
        let Some((_, start_point)) = self.locate(from, probe, mask) else {
            return MeshRaycastHit {
                hit: true,
                position: from,
            };
        };

        let target = Vec3::new(to.x, start_point.y, to.z);
        let length = start_point.distance(target);
        let steps = ((length / (self.cell_size * 0.25)).ceil() as usize).max(1);
        let mut last_on_mesh = start_point;

        for step in 1..=steps {
            let sample = start_point.lerp(target, step as f32 / steps as f32);
            let on_mesh = self.nodes.iter().any(|node| {
                let [a, b, c] = node.triangle.vertices;
                mask.contains(node.triangle.area)
                    && contains_xz(sample, a, b, c)
                    && (node.centroid.y - sample.y).abs() <= probe
            });
            if !on_mesh {
                return MeshRaycastHit {
                    hit: true,
                    position: last_on_mesh,
                };
            }
            last_on_mesh = sample;
        }

        MeshRaycastHit {
            hit: false,
            position: last_on_mesh,
        }
    }

    fn nearest_point(&self, point: Vec3, max_distance: f32, mask: AreaMask) -> Option<Vec3> {
        self.locate(point, max_distance, mask).map(|(_, p)| p)
    }

    fn add_link(&mut self, link: &NavLink) {
        self.links.insert(link.id, link.clone());
        self.rebuild_graph();
    }

    fn remove_link(&mut self, id: LinkId) -> bool {
        let existed = self.links.remove(&id).is_some();
        if existed {
            self.rebuild_graph();
        }
        existed
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod backend_tests;
