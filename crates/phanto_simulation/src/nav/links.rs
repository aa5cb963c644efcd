//! Navmesh links — synthesis и registry
//!
//! Link соединяет две точки, недостижимые обычным pathing'ом
//! (прыжок с мебели на пол, два острова одной surface).
//!
//! Синтез "с двух сторон": путь от prime треугольника упирается в край острова
//! (midpoint), затем путь от другого треугольника обратно к midpoint даёт end point.
//! Navmesh raycast/path асимметричны у границ, поэтому одного направления мало.

use crate::config::NavConfig;
use crate::error::NavError;
use crate::logger;
use crate::nav::backend::{NavMeshProvider, PathStatus};
use crate::nav::triangle::NavTriangle;
use crate::nav::{AreaMask, LinkId, NavArea, OwnerId};
use bevy::prelude::*;
use std::collections::BTreeMap;

/// Off-mesh link
#[derive(Debug, Clone, PartialEq)]
pub struct NavLink {
    pub id: LinkId,
    /// Surface, вместе с которой link уничтожается
    pub owner: OwnerId,
    pub start: Vec3,
    pub end: Vec3,
    pub area: NavArea,
    pub bidirectional: bool,
    pub width: f32,
}

/// Resource: все живые links (по owner'ам)
#[derive(Resource, Debug, Default)]
pub struct NavMeshLinkController {
    links: BTreeMap<LinkId, NavLink>,
    next_id: u32,
}

impl NavMeshLinkController {
    /// Зарегистрировать link и добавить его в navmesh
    pub fn create_link(
        &mut self,
        owner: OwnerId,
        start: Vec3,
        end: Vec3,
        area: NavArea,
        width: f32,
        mesh: &mut dyn NavMeshProvider,
    ) -> LinkId {
        self.next_id += 1;
        let link = NavLink {
            id: LinkId(self.next_id),
            owner,
            start,
            end,
            area,
            bidirectional: true,
            width,
        };
        mesh.add_link(&link);
        let id = link.id;
        self.links.insert(id, link);
        id
    }

    pub fn remove_link(&mut self, id: LinkId, mesh: &mut dyn NavMeshProvider) -> Result<NavLink, NavError> {
        let link = self.links.remove(&id).ok_or(NavError::UnknownLink(id))?;
        mesh.remove_link(id);
        Ok(link)
    }

    /// Уничтожить все links owner'а (вместе с его surface). Возвращает сколько удалено.
    pub fn remove_owner_links(&mut self, owner: OwnerId, mesh: &mut dyn NavMeshProvider) -> usize {
        let ids: Vec<LinkId> = self
            .links
            .values()
            .filter(|link| link.owner == owner)
            .map(|link| link.id)
            .collect();
        for id in &ids {
            self.links.remove(id);
            mesh.remove_link(*id);
        }
        ids.len()
    }

    pub fn clear(&mut self, mesh: &mut dyn NavMeshProvider) {
        for id in self.links.keys() {
            mesh.remove_link(*id);
        }
        self.links.clear();
    }

    pub fn links_of(&self, owner: OwnerId) -> impl Iterator<Item = &NavLink> {
        self.links.values().filter(move |link| link.owner == owner)
    }

    pub fn link(&self, id: LinkId) -> Option<&NavLink> {
        self.links.get(&id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Двухфазный поиск пары точек для link между `from` и `to`
///
/// `None` — точки уже связаны полным путём (link не нужен).
pub(crate) fn find_link_endpoints(
    from: Vec3,
    to: Vec3,
    mask: AreaMask,
    mesh: &dyn NavMeshProvider,
    config: &NavConfig,
) -> Option<(Vec3, Vec3)> {
    let outbound = mesh.calculate_path(from, to, mask);

    let midpoint = match outbound.status {
        PathStatus::Complete => return None,
        PathStatus::Partial => match outbound.corners.as_slice() {
            [.., second_last, last] => second_last.lerp(*last, config.partial_corner_blend),
            [only] => *only,
            [] => from,
        },
        PathStatus::Invalid => {
            logger::log_error(&format!(
                "NavLink: outbound path {:?} → {:?} invalid, linking from the start point",
                from, to
            ));
            from
        }
    };

    let inbound = mesh.calculate_path(to, midpoint, mask);
    let end = match (inbound.status, inbound.last_corner()) {
        (PathStatus::Invalid, _) | (_, None) => {
            logger::log_error(&format!(
                "NavLink: no path from {:?} back to {:?}, using mesh raycast point",
                to, midpoint
            ));
            mesh.raycast(to, midpoint, mask).position
        }
        (_, Some(last)) => last,
    };

    Some((midpoint, end))
}

/// Snap обоих концов на mesh + регистрация link
#[allow(clippy::too_many_arguments)]
pub(crate) fn connect_points(
    owner: OwnerId,
    midpoint: Vec3,
    end: Vec3,
    area: NavArea,
    mask: AreaMask,
    mesh: &mut dyn NavMeshProvider,
    controller: &mut NavMeshLinkController,
    config: &NavConfig,
) -> Result<LinkId, NavError> {
    let start = mesh
        .nearest_point(midpoint, config.sample_max_distance, mask)
        .ok_or(NavError::OffMesh(midpoint))?;
    let end = mesh
        .nearest_point(end, config.sample_max_distance, mask)
        .ok_or(NavError::OffMesh(end))?;

    if start.distance_squared(end) < 1.0e-8 {
        return Err(NavError::PathInvalid { from: start, to: end });
    }

    Ok(controller.create_link(owner, start, end, area, config.link_width, mesh))
}

/// Сшить острова surface owner'а links от prime треугольника
///
/// Prime = открытый border треугольник с наибольшей площадью. Для каждого
/// другого открытого border треугольника: полный путь → пропуск, иначе link.
/// Возвращает созданные links.
pub fn generate_links(
    owner: OwnerId,
    triangles: &[NavTriangle],
    mesh: &mut dyn NavMeshProvider,
    controller: &mut NavMeshLinkController,
    config: &NavConfig,
) -> Vec<LinkId> {
    let candidates: Vec<&NavTriangle> = triangles
        .iter()
        .filter(|t| t.is_open && t.is_border)
        .collect();

    let Some(prime) = candidates
        .iter()
        .copied()
        .max_by(|a, b| a.area().total_cmp(&b.area()))
    else {
        return Vec::new();
    };

    let mask = prime.area_id.mask();
    let mut created = Vec::new();
    for other in candidates.iter().copied() {
        if other == prime {
            continue;
        }

        let Some((midpoint, end)) =
            find_link_endpoints(prime.centroid, other.centroid, mask, mesh, config)
        else {
            continue;
        };

        match connect_points(owner, midpoint, end, prime.area_id, mask, mesh, controller, config) {
            Ok(id) => created.push(id),
            Err(err) => {
                logger::log_warning(&format!("NavLink skipped for {:?}: {}", owner, err));
            }
        }
    }

    if !created.is_empty() {
        logger::log(&format!("🔗 {:?}: {} links generated", owner, created.len()));
    }
    created
}
