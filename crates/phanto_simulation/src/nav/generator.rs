//! NavMeshGenerator — floor surface
//!
//! Volume пола = bounds floor plane ∪ scene mesh по XZ. По высоте:
//! - есть мебель → тонкий slab над полом (не пересекаемся с volumes мебели)
//! - мебели нет → половина высоты комнаты (ловим неразмеченные поверхности)

use crate::config::NavConfig;
use crate::error::NavError;
use crate::logger;
use crate::nav::backend::{NavMeshProvider, NavVolume, SurfaceBuildRequest};
use crate::nav::bookkeeper::NavMeshBookKeeper;
use crate::nav::links::{connect_points, find_link_endpoints, NavMeshLinkController};
use crate::nav::room::SceneRoom;
use crate::nav::triangle::NavTriangle;
use crate::nav::{AreaMask, LinkId, NavArea, OwnerId};
use bevy::prelude::*;
use rand::Rng;

/// Запас вниз под полом (float шум скана)
const FLOOR_MARGIN: f32 = 0.05;

#[derive(Resource, Debug, Default, Clone)]
pub struct NavMeshGenerator {
    volume: Option<NavVolume>,
}

impl NavMeshGenerator {
    pub const OWNER: OwnerId = OwnerId::FLOOR;

    pub fn compute_volume(room: &SceneRoom, config: &NavConfig) -> NavVolume {
        let (min, max) = room.floor_bounds();
        let height = if room.has_furniture() {
            config.floor_slab_height
        } else {
            room.height() * 0.5
        };
        NavVolume::axis_aligned(
            Vec3::new(min.x, room.floor_y - FLOOR_MARGIN, min.y),
            Vec3::new(max.x, room.floor_y + height, max.y),
        )
    }

    /// Построить floor surface. Возвращает новые треугольники пола.
    pub fn initialize(
        &mut self,
        room: &SceneRoom,
        bookkeeper: &mut NavMeshBookKeeper,
        mesh: &mut dyn NavMeshProvider,
        config: &NavConfig,
    ) -> Vec<NavTriangle> {
        let volume = Self::compute_volume(room, config);
        self.volume = Some(volume);

        let request = SurfaceBuildRequest {
            volume,
            area: NavArea::WALKABLE,
            sources: room.nav_sources(),
        };
        let triangles = bookkeeper.generate_nav_mesh_triangles(Self::OWNER, &request, mesh);
        if triangles.is_empty() {
            logger::log_warning(&format!("⚠️ NavMeshGenerator: {}", NavError::NoTriangles(Self::OWNER)));
        }
        triangles
    }

    pub fn volume(&self) -> Option<NavVolume> {
        self.volume
    }

    pub fn is_initialized(&self) -> bool {
        self.volume.is_some()
    }

    /// Случайная точка пола не ближе `min_distance` (по горизонтали) от `from`
    ///
    /// ≤ `random_point_attempts` попыток. Не нашли — самая дальняя вершина
    /// треугольников пола + warning. Пол не построен — `NoTriangles`.
    #[allow(clippy::too_many_arguments)]
    pub fn random_point_on_floor<R: Rng + ?Sized>(
        &self,
        from: Vec3,
        min_distance: f32,
        require_open: bool,
        bookkeeper: &NavMeshBookKeeper,
        mesh: &dyn NavMeshProvider,
        rng: &mut R,
        config: &NavConfig,
    ) -> Result<Vec3, NavError> {
        let triangles = if require_open {
            bookkeeper.open_triangles(Self::OWNER)
        } else {
            bookkeeper.owner_triangles(Self::OWNER)
        };
        if triangles.is_empty() {
            return Err(NavError::NoTriangles(Self::OWNER));
        }

        let far_enough = |p: Vec3| p.xz().distance(from.xz()) >= min_distance;
        for _ in 0..config.random_point_attempts {
            let triangle = triangles[rng.gen_range(0..triangles.len())];
            let point = triangle.random_point(rng, mesh, config.sample_max_distance);
            if far_enough(point) {
                return Ok(point);
            }
        }

        let furthest = triangles
            .iter()
            .map(|t| t.furthest_vert(from))
            .max_by(|a, b| {
                a.xz()
                    .distance_squared(from.xz())
                    .total_cmp(&b.xz().distance_squared(from.xz()))
            })
            .unwrap_or(from);
        logger::log_warning(&format!(
            "⚠️ RandomPointOnFloor: no point ≥ {:.2}m from {:?} in {} attempts, using furthest vertex {:?}",
            min_distance, from, config.random_point_attempts, furthest
        ));
        Ok(furthest)
    }

    /// Runtime recovery link для partial пути агента
    ///
    /// `Ok(None)` — путь уже полный (link не нужен).
    pub fn create_nav_mesh_link(
        &self,
        from: Vec3,
        to: Vec3,
        mask: AreaMask,
        mesh: &mut dyn NavMeshProvider,
        controller: &mut NavMeshLinkController,
        config: &NavConfig,
    ) -> Result<Option<LinkId>, NavError> {
        let Some((midpoint, end)) = find_link_endpoints(from, to, mask, mesh, config) else {
            return Ok(None);
        };
        let id = connect_points(Self::OWNER, midpoint, end, NavArea::WALKABLE, mask, mesh, controller, config)?;
        logger::log(&format!("🔗 Recovery link {:?}: {:?} → {:?}", id, midpoint, end));
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::backend::{GridNavMesh, PathStatus};
    use crate::nav::room::SemanticLabel;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_volume_half_height_without_furniture() {
        let room = SceneRoom::empty_box(4.0, 3.0, 2.6);
        let volume = NavMeshGenerator::compute_volume(&room, &NavConfig::default());
        let size = volume.size();
        assert!((size.x - 4.0).abs() < 1e-5);
        assert!((size.z - 3.0).abs() < 1e-5);
        assert!((size.y - (1.3 + FLOOR_MARGIN)).abs() < 1e-5);
    }

    #[test]
    fn test_volume_thin_slab_with_furniture() {
        let mut room = SceneRoom::empty_box(4.0, 3.0, 2.6);
        room.add_furniture(SemanticLabel::Table, Vec2::ZERO, 0.0, Vec3::new(1.0, 1.0, 0.7));
        let config = NavConfig::default();
        let volume = NavMeshGenerator::compute_volume(&room, &config);
        assert!((volume.size().y - (config.floor_slab_height + FLOOR_MARGIN)).abs() < 1e-5);
    }

    #[test]
    fn test_random_point_requires_floor() {
        let generator = NavMeshGenerator::default();
        let keeper = NavMeshBookKeeper::default();
        let mesh = GridNavMesh::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = generator.random_point_on_floor(
            Vec3::ZERO,
            1.0,
            false,
            &keeper,
            &mesh,
            &mut rng,
            &NavConfig::default(),
        );
        assert_eq!(result, Err(NavError::NoTriangles(OwnerId::FLOOR)));
    }

    #[test]
    fn test_unreachable_distance_falls_back_to_furthest_vertex() {
        let room = SceneRoom::empty_box(2.0, 2.0, 2.5);
        let config = NavConfig::default();
        let mut generator = NavMeshGenerator::default();
        let mut keeper = NavMeshBookKeeper::default();
        let mut mesh = GridNavMesh::from_config(&config);
        generator.initialize(&room, &mut keeper, &mut mesh, &config);
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let point = generator
            .random_point_on_floor(Vec3::ZERO, 50.0, false, &keeper, &mesh, &mut rng, &config)
            .expect("floor exists");
        // Угол комнаты — дальше всего от центра
        assert!((point.xz().length() - 2.0_f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_recovery_link_connects_split_floor() {
        let mut room = SceneRoom::empty_box(4.0, 2.0, 2.5);
        // Диван во всю глубину комнаты делит пол на два острова
        room.add_furniture(SemanticLabel::Couch, Vec2::ZERO, 0.0, Vec3::new(0.5, 2.0, 0.4));
        let config = NavConfig::default();
        let mut generator = NavMeshGenerator::default();
        let mut keeper = NavMeshBookKeeper::default();
        let mut mesh = GridNavMesh::from_config(&config);
        let mut controller = NavMeshLinkController::default();
        generator.initialize(&room, &mut keeper, &mut mesh, &config);

        let from = Vec3::new(-1.5, 0.0, 0.0);
        let to = Vec3::new(1.5, 0.0, 0.0);
        let mask = NavArea::WALKABLE.mask();
        assert_eq!(mesh.calculate_path(from, to, mask).status, PathStatus::Partial);

        let link = generator
            .create_nav_mesh_link(from, to, mask, &mut mesh, &mut controller, &config)
            .expect("link endpoints snap");
        assert!(link.is_some());
        assert_eq!(mesh.calculate_path(from, to, mask).status, PathStatus::Complete);

        // Второй запрос — путь уже полный
        let again = generator
            .create_nav_mesh_link(from, to, mask, &mut mesh, &mut controller, &config)
            .expect("no error");
        assert_eq!(again, None);
    }
}
