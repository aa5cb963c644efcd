//! Ошибки навигации и FSM
//!
//! Все ошибки локальные и recoverable: вызывающий код логирует и деградирует
//! (fallback на неотфильтрованные треугольники, raycast точку и т.п.).

use crate::nav::{LinkId, OwnerId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavError {
    #[error("no navmesh triangles for surface {0:?}")]
    NoTriangles(OwnerId),

    #[error("no open triangle found, using unfiltered triangles")]
    NoOpenTriangle,

    #[error("link {0:?} is not registered")]
    UnknownLink(LinkId),

    #[error("no path between {from:?} and {to:?}")]
    PathInvalid { from: bevy::math::Vec3, to: bevy::math::Vec3 },

    #[error("point {0:?} could not be snapped onto the navmesh")]
    OffMesh(bevy::math::Vec3),

    #[error("no point satisfied the predicate after {attempts} attempts")]
    NoMatchingPoint { attempts: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BehaviourError {
    #[error("switch to {requested} rejected: state {current} is exiting")]
    SwitchDuringExit { current: String, requested: String },

    #[error("state {0} is not registered in this machine")]
    UnknownState(String),

    #[error("transition chain exceeded {0} switches in one tick")]
    TransitionLoop(usize),
}
