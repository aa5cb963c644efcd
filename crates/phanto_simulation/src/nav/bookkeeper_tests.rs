//! Tests for NavMeshBookKeeper.

use super::*;
use crate::nav::backend::{GridNavMesh, NavSource, NavVolume};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn floor_request() -> SurfaceBuildRequest {
    SurfaceBuildRequest {
        volume: NavVolume::axis_aligned(Vec3::new(-1.0, -0.1, -1.0), Vec3::new(1.0, 0.2, 1.0)),
        area: NavArea::WALKABLE,
        sources: vec![NavSource::walkable(
            Vec3::new(-1.0, -0.1, -1.0),
            Vec3::new(1.0, 0.0, 1.0),
        )],
    }
}

fn table_request() -> SurfaceBuildRequest {
    SurfaceBuildRequest {
        volume: NavVolume::axis_aligned(Vec3::new(2.0, 0.5, 2.0), Vec3::new(3.0, 0.8, 3.0)),
        area: NavArea::FURNITURE,
        sources: vec![NavSource::walkable(
            Vec3::new(2.0, 0.7, 2.0),
            Vec3::new(3.0, 0.75, 3.0),
        )],
    }
}

#[test]
fn test_first_build_returns_all_triangles() {
    let mut mesh = GridNavMesh::new(0.5, 0.5);
    let mut keeper = NavMeshBookKeeper::default();

    let new = keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);
    assert_eq!(new.len(), 32);
    assert_eq!(keeper.snapshot_len(), 32);
    assert_eq!(keeper.owner_triangles(OwnerId::FLOOR).len(), 32);
}

#[test]
fn test_noop_rebuild_returns_nothing_and_empties_owner_list() {
    let mut mesh = GridNavMesh::new(0.5, 0.5);
    let mut keeper = NavMeshBookKeeper::default();
    keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);

    let second = keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);
    assert!(second.is_empty());
    // Owner остаётся зарегистрированным, но с пустым списком
    assert!(keeper.has_owner(OwnerId::FLOOR));
    assert!(keeper.owner_triangles(OwnerId::FLOOR).is_empty());
    assert_eq!(keeper.snapshot_len(), 32);
}

#[test]
fn test_second_owner_gets_only_its_triangles() {
    let mut mesh = GridNavMesh::new(0.5, 0.5);
    let mut keeper = NavMeshBookKeeper::default();
    keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);

    let table = OwnerId(5);
    let new = keeper.generate_nav_mesh_triangles(table, &table_request(), &mut mesh);
    assert_eq!(new.len(), 8);
    assert!(new.iter().all(|t| t.area_id == NavArea::FURNITURE));
    assert_eq!(keeper.snapshot_len(), 40);
    assert_eq!(keeper.owner_triangles(OwnerId::FLOOR).len(), 32);
}

#[test]
fn test_open_flags_survive_unrelated_rebuild() {
    let mut mesh = GridNavMesh::new(0.5, 0.5);
    let mut keeper = NavMeshBookKeeper::default();
    keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);

    let ids: Vec<TriangleId> = keeper.owners.get(&OwnerId::FLOOR).cloned().unwrap_or_default();
    for id in &ids {
        if let Some(t) = keeper.arena.get_mut(id) {
            t.is_open = true;
        }
    }

    keeper.generate_nav_mesh_triangles(OwnerId(3), &table_request(), &mut mesh);
    assert!(keeper.owner_triangles(OwnerId::FLOOR).iter().all(|t| t.is_open));
}

#[test]
fn test_clear_reports_existence() {
    let mut mesh = GridNavMesh::new(0.5, 0.5);
    let mut keeper = NavMeshBookKeeper::default();
    keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);

    assert!(keeper.clear_nav_mesh_triangles(OwnerId::FLOOR, &mut mesh));
    assert_eq!(keeper.snapshot_len(), 0);
    assert!(!keeper.clear_nav_mesh_triangles(OwnerId::FLOOR, &mut mesh));
    assert!(!keeper.clear_nav_mesh_triangles(OwnerId(77), &mut mesh));
}

#[test]
fn test_border_flags_cover_full_triangulation() {
    let mut mesh = GridNavMesh::new(0.5, 0.5);
    let mut keeper = NavMeshBookKeeper::default();
    keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);

    // 4x4 клеток по диагонали: у каждой половины клетки два внешних ребра,
    // внутренняя половина ⇔ оба этих ребра общие с соседними клетками (3x3 на половину)
    let border = keeper.triangles().filter(|t| t.is_border).count();
    let interior = keeper.triangles().filter(|t| !t.is_border).count();
    assert_eq!(border + interior, 32);
    assert_eq!(interior, 3 * 3 * 2);
}

#[test]
fn test_open_triangles_fall_back_to_unfiltered() {
    let mut mesh = GridNavMesh::new(0.5, 0.5);
    let mut keeper = NavMeshBookKeeper::default();
    keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);

    // Validation ещё не прогонялась — ни одного open
    assert_eq!(keeper.open_triangles(OwnerId::FLOOR).len(), 32);
    assert!(keeper.open_triangles(OwnerId(99)).is_empty());
}

#[test]
fn test_closest_triangle_on_circle_prefers_ring() {
    let near_center = NavTriangle::new(
        Vec3::new(-0.1, 0.0, -0.1),
        Vec3::new(0.1, 0.0, -0.1),
        Vec3::new(0.0, 0.0, 0.2),
        NavArea::WALKABLE,
    );
    let on_ring = NavTriangle::new(
        Vec3::new(0.9, 0.0, -0.1),
        Vec3::new(1.1, 0.0, -0.1),
        Vec3::new(1.0, 0.0, 0.2),
        NavArea::WALKABLE,
    );
    let far = NavTriangle::new(
        Vec3::new(2.9, 0.0, -0.1),
        Vec3::new(3.1, 0.0, -0.1),
        Vec3::new(3.0, 0.0, 0.2),
        NavArea::WALKABLE,
    );
    let triangles = [near_center, on_ring.clone(), far];

    // Центр поднят — проекция на горизонтальную плоскость центра
    let best = NavMeshBookKeeper::try_get_closest_triangle_on_circle(
        Vec3::new(0.0, 1.5, 0.0),
        1.0,
        triangles.iter(),
    );
    assert_eq!(best, Some(&on_ring));
    assert!(NavMeshBookKeeper::try_get_closest_triangle_on_circle(Vec3::ZERO, 1.0, []).is_none());
}

#[test]
fn test_interior_point_scored_as_radius_minus_distance() {
    // Внутри на 0.3 от кольца против снаружи на 0.4 — выигрывает внутренний
    let inside = NavTriangle::new(
        Vec3::new(0.6, 0.0, 0.0),
        Vec3::new(0.8, 0.0, 0.0),
        Vec3::new(0.7, 0.0, 0.0),
        NavArea::WALKABLE,
    );
    let outside = NavTriangle::new(
        Vec3::new(1.3, 0.0, 0.0),
        Vec3::new(1.5, 0.0, 0.0),
        Vec3::new(1.4, 0.0, 0.0),
        NavArea::WALKABLE,
    );
    let triangles = [outside, inside.clone()];
    let best = NavMeshBookKeeper::try_get_closest_triangle_on_circle(Vec3::ZERO, 1.0, triangles.iter());
    assert_eq!(best, Some(&inside));
}

#[test]
fn test_find_matching_point() {
    let mut mesh = GridNavMesh::new(0.5, 0.5);
    let mut keeper = NavMeshBookKeeper::default();
    keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    let triangles = keeper.owner_triangles(OwnerId::FLOOR);
    let point = NavMeshBookKeeper::find_matching_point(
        triangles.iter().copied(),
        &mut rng,
        &mesh,
        0.5,
        |p| p.x > 0.5,
    )
    .expect("some triangle lies at x > 0.5");
    assert!(point.x > 0.5);

    let none = NavMeshBookKeeper::find_matching_point(
        triangles.iter().copied(),
        &mut rng,
        &mesh,
        0.5,
        |p| p.y > 10.0,
    );
    assert_eq!(none, Err(NavError::NoMatchingPoint { attempts: 32 }));
}

#[test]
fn test_validate_scene_covers_every_owned_triangle() {
    let mut mesh = GridNavMesh::new(0.5, 0.5);
    let mut keeper = NavMeshBookKeeper::default();
    keeper.generate_nav_mesh_triangles(OwnerId::FLOOR, &floor_request(), &mut mesh);
    keeper.generate_nav_mesh_triangles(OwnerId(2), &table_request(), &mut mesh);

    let task = keeper.validate_scene(2.5);
    assert_eq!(task.remaining(), 40);
}

#[test]
fn test_reuse_finds_equal_triangle_across_quantization_cells() {
    let old = NavTriangle::new(Vec3::new(1.4e-4, 0.0, 0.0), Vec3::X, Vec3::Z, NavArea::WALKABLE);
    let rebuilt = NavTriangle::new(Vec3::new(1.6e-4, 0.0, 0.0), Vec3::X, Vec3::Z, NavArea::WALKABLE);
    // Равны в пределах допуска, но v1 округляется в разные ячейки
    assert_eq!(old, rebuilt);
    assert_ne!(quantize(old.v1), quantize(rebuilt.v1));

    let id = TriangleId(3);
    let arena = BTreeMap::from([(id, old.clone())]);
    let mut index = ReuseIndex::default();
    index.insert(id, &old);

    let other_area = NavTriangle::new(rebuilt.v1, rebuilt.v2, rebuilt.v3, NavArea::FURNITURE);
    assert_eq!(index.take(&other_area, &arena), None);
    assert_eq!(index.take(&rebuilt, &arena), Some(id));
    // id отдаётся один раз
    assert_eq!(index.take(&rebuilt, &arena), None);
}
