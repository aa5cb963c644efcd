//! Navigation domain — runtime navmesh bookkeeping, links, surface generators.
//!
//! # Architecture
//!
//! Room scan → surface generators (floor + каждая мебель) строят navmesh
//! через `NavMeshProvider` → `NavMeshBookKeeper` раскладывает новые треугольники
//! по owner'ам и классифицирует (border/open) → link synthesizer сшивает острова
//! → `SceneQuery` отвечает на вопросы behaviour слоя.
//!
//! Физика и pathfinding — внешние коллабораторы за трейтами
//! (`SpatialQuery`, `NavMeshProvider`). Для headless прогонов есть reference
//! реализации `BoxScene` и `GridNavMesh`.
//!
//! # Submodules
//!
//! - `triangle`, `edges`: модель треугольника и подсчёт смежности рёбер
//! - `bookkeeper`: глобальный snapshot + owner → delta треугольники
//! - `backend`, `physics`: трейты коллабораторов + reference реализации
//! - `links`: синтез links между островами
//! - `generator`, `furniture`: floor / furniture генераторы
//! - `validation`: кооперативная scene validation (open flags)
//! - `scene_query`: семантика точек, случайные точки, длина пути
//! - `room`: данные скана комнаты (anchors, planes, volumes)
//! - `systems`: ECS системы (room setup, recovery links, furniture lifecycle)

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

pub mod backend;
pub mod bookkeeper;
pub mod edges;
pub mod furniture;
pub mod generator;
pub mod links;
pub mod physics;
pub mod room;
pub mod scene_query;
pub mod systems;
pub mod triangle;
pub mod validation;

pub use backend::{
    GridNavMesh, MeshRaycastHit, NavMeshHandle, NavMeshProvider, NavPath, NavSource, NavSourceKind,
    NavVolume, PathStatus, RawTriangle, SurfaceBuildRequest,
};
pub use bookkeeper::NavMeshBookKeeper;
pub use edges::{Edge, EdgeCounts};
pub use furniture::{FurnitureNavMeshGenerator, ValidationSubscribers};
pub use generator::NavMeshGenerator;
pub use links::{generate_links, NavLink, NavMeshLinkController};
pub use physics::{layers, BoxScene, SceneBox, SceneHit, ScenePhysics, SpatialQuery};
pub use room::{AnchorId, SceneAnchor, SceneRoom, SemanticLabel};
pub use scene_query::SceneQuery;
pub use triangle::NavTriangle;
pub use validation::{SceneValidated, SceneValidation, ValidateSceneRequest, ValidationTask};

/// Handle navmesh поверхности (floor или одна мебель)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Reflect)]
pub struct OwnerId(pub u32);

impl OwnerId {
    /// Floor всегда первый owner
    pub const FLOOR: OwnerId = OwnerId(0);

    /// Owner мебели выводится из anchor id (стабилен между rebuild'ами)
    pub fn furniture(anchor: AnchorId) -> Self {
        OwnerId(anchor.0 + 1)
    }
}

/// Стабильный id треугольника в арене bookkeeper'а
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect)]
pub struct TriangleId(pub u32);

/// Стабильный id navmesh link'а
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Reflect)]
pub struct LinkId(pub u32);

/// Navmesh area (классификация проходимой поверхности)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Reflect)]
pub struct NavArea(pub u8);

impl NavArea {
    pub const WALKABLE: NavArea = NavArea(0);
    pub const NOT_WALKABLE: NavArea = NavArea(1);
    pub const JUMP: NavArea = NavArea(2);
    pub const FURNITURE: NavArea = NavArea(3);

    pub fn mask(self) -> AreaMask {
        AreaMask(1 << (self.0 as u32 & 31))
    }
}

/// Битовая маска areas для path/nearest-point запросов
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Reflect)]
pub struct AreaMask(pub u32);

impl AreaMask {
    pub const ALL: AreaMask = AreaMask(u32::MAX);

    pub fn contains(self, area: NavArea) -> bool {
        self.0 & area.mask().0 != 0
    }

    pub fn with(self, area: NavArea) -> Self {
        AreaMask(self.0 | area.mask().0)
    }
}

/// Navigation Plugin
///
/// Регистрирует navmesh ресурсы и системы в FixedUpdate.
/// Порядок выполнения:
/// 1. setup_room_navigation — rebuild floor/furniture при смене SceneRoom
/// 2. initialize_furniture_generators — build новых furniture surfaces + hop links
/// 3. teardown_furniture_generators — отписка + очистка удалённой мебели
/// 4. start_scene_validation / drive_scene_validation — open flags (multi-tick)
/// 5. regenerate_furniture_links — internal links после SceneValidated
/// 6. resolve_recovery_links — links по PathPartial запросам агентов
pub struct NavigationPlugin;

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<NavMeshBookKeeper>()
            .init_resource::<NavMeshLinkController>()
            .init_resource::<NavMeshGenerator>()
            .init_resource::<SceneValidation>()
            .init_resource::<ValidationSubscribers>()
            .init_resource::<NavMeshHandle>()
            .init_resource::<ScenePhysics>()
            .init_resource::<SceneQuery>()
            .add_event::<ValidateSceneRequest>()
            .add_event::<SceneValidated>()
            .add_event::<systems::RecoveryLinkRequest>()
            .add_event::<systems::RecoveryLinkResolved>();

        app.add_systems(
            FixedUpdate,
            (
                systems::setup_room_navigation,
                systems::initialize_furniture_generators,
                systems::teardown_furniture_generators,
                validation::start_scene_validation,
                validation::drive_scene_validation,
                systems::regenerate_furniture_links,
                systems::resolve_recovery_links,
            )
                .chain(), // Последовательное выполнение для детерминизма
        );
    }
}
