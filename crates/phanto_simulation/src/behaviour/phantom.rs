//! Phantom — наземный враг на navmesh
//!
//! Состояния: Roam → Chase → Attack, Pain/Flee — прерывания, Dead — финал.
//! Движение через `NavAgent` (PathPartial → recovery link, см. agent.rs).

use crate::behaviour::context::BehaviourContext;
use crate::behaviour::events::{should_react, CollisionContact, EnemyDamaged, FeedbackKind, ProximityEvent};
use crate::behaviour::machine::{BehaviourHost, EnemyBehaviour, EnemyState, StateMachine};
use crate::behaviour::targets::TargetId;
use crate::config::PhantomConfig;
use crate::logger;
use crate::nav::bookkeeper::NavMeshBookKeeper;
use crate::nav::scene_query::SceneQuery;
use crate::nav::AreaMask;
use bevy::prelude::*;

/// Если агент застрял, новая roam точка через столько секунд
const ROAM_RETARGET_SECS: f32 = 6.0;
/// Цель дальше range × factor — возвращаемся в Chase
const ATTACK_BREAK_FACTOR: f32 = 1.5;
/// Кольцо подхода к цели: доля attack_range
const APPROACH_RING_FACTOR: f32 = 0.6;
const APPROACH_ATTEMPTS: usize = 8;
/// Треугольники выше/ниже цели больше чем на это — не для подхода
const APPROACH_MAX_RISE: f32 = 0.3;
/// Сколько точек пола сравниваем при бегстве
const FLEE_CANDIDATES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum PhantomState {
    Roam,
    Chase,
    Attack,
    Pain,
    Flee,
    Dead,
}

#[derive(Debug, Clone)]
pub struct PhantomCore {
    machine: StateMachine<PhantomState>,
    pub health: f32,
    pub config: PhantomConfig,
    /// Секунды до следующей атаки
    pub attack_cooldown: f32,
    pub last_hit_from: Option<Vec3>,
}

impl PhantomCore {
    pub fn new(config: PhantomConfig) -> Self {
        Self {
            machine: StateMachine::default(),
            health: config.max_health,
            config,
            attack_cooldown: 0.0,
            last_hit_from: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

impl BehaviourHost for PhantomCore {
    type StateId = PhantomState;

    fn machine(&self) -> &StateMachine<PhantomState> {
        &self.machine
    }

    fn machine_mut(&mut self) -> &mut StateMachine<PhantomState> {
        &mut self.machine
    }

    fn on_damaged(&mut self, damage: &EnemyDamaged, ctx: &mut BehaviourContext) {
        if !self.is_alive() {
            return;
        }
        self.health -= damage.amount;
        self.last_hit_from = damage.source;

        if !self.is_alive() {
            let _ = self.switch_state(PhantomState::Dead);
            return;
        }

        let roll = ctx.roll();
        if should_react(
            damage.amount,
            self.config.pain_damage_threshold,
            self.config.pain_chance,
            ctx.wave_scale(),
            roll,
        ) {
            let _ = self.switch_state(PhantomState::Pain);
        }
    }
}

/// Phantom со всеми состояниями, старт в Roam
pub fn phantom_behaviour(config: &PhantomConfig) -> EnemyBehaviour<PhantomCore> {
    EnemyBehaviour::new(
        PhantomCore::new(config.clone()),
        vec![
            Box::new(RoamState::default()),
            Box::new(ChaseState::default()),
            Box::new(AttackState::default()),
            Box::new(PainState::default()),
            Box::new(FleeState::default()),
            Box::new(DeadState),
        ],
        PhantomState::Roam,
    )
}

/// Маячок в радиусе → бегство (запоминаем прежнюю цель)
fn react_to_beacon(host: &mut PhantomCore, ctx: &mut BehaviourContext, event: &ProximityEvent) -> bool {
    if !event.entered {
        return false;
    }
    let fleeable = ctx
        .world
        .targets
        .get(event.target)
        .is_some_and(|t| t.valid && t.fleeable);
    if !fleeable {
        return false;
    }
    ctx.sensed.begin_flee(event.target);
    let _ = host.switch_state(PhantomState::Flee);
    true
}

/// После Pain/Flee: есть цель — Chase, иначе Roam
fn resume(host: &mut PhantomCore, ctx: &mut BehaviourContext) {
    let next = if ctx.select_target().is_some() {
        PhantomState::Chase
    } else {
        PhantomState::Roam
    };
    let _ = host.switch_state(next);
}

/// После Pain: маячок всё ещё рядом — снова Flee, иначе resume
fn flee_or_resume(host: &mut PhantomCore, ctx: &mut BehaviourContext) {
    let position = ctx.position();
    if let Some(beacon) = ctx.sensed.closest_fleeable(ctx.world.targets, position) {
        ctx.sensed.begin_flee(beacon);
        let _ = host.switch_state(PhantomState::Flee);
        return;
    }
    resume(host, ctx);
}

/// Точка подхода к `goal` на snapshot треугольниках со стороны врага
///
/// Берём треугольник ближайший к кольцу `range × 0.6` вокруг цели и сэмплим
/// его, пока точка не окажется в пределах `range × 0.9`.
fn approach_point(ctx: &mut BehaviourContext, goal: Vec3, range: f32) -> Option<Vec3> {
    let world = ctx.world;
    let toward = (ctx.position() - goal).with_y(0.0);
    let candidates: Vec<_> = world
        .bookkeeper
        .triangles()
        .filter(|t| (t.centroid.y - goal.y).abs() <= APPROACH_MAX_RISE)
        .filter(|t| (t.centroid - goal).with_y(0.0).dot(toward) >= 0.0)
        .collect();
    let ring = world
        .bookkeeper
        .closest_triangle_on_circle(goal, range * APPROACH_RING_FACTOR, candidates)
        .ok()?;
    let reach = range * 0.9;
    NavMeshBookKeeper::find_matching_point(
        std::iter::repeat(ring).take(APPROACH_ATTEMPTS),
        &mut *ctx.rng,
        world.mesh,
        world.config.nav.sample_max_distance,
        |point| point.xz().distance(goal.xz()) <= reach,
    )
    .ok()
}

/// Самая "далёкая по пути" от маячка точка пола среди нескольких случайных
fn flee_point(ctx: &mut BehaviourContext, beacon: Vec3) -> Option<Vec3> {
    let world = ctx.world;
    let mask = ctx.agent.as_deref().map_or(AreaMask::ALL, |a| a.mask);
    let rng = &mut *ctx.rng;
    (0..FLEE_CANDIDATES)
        .filter_map(|_| {
            world
                .scene
                .random_point_on_floor(&mut *rng, world.bookkeeper, world.mesh, &world.config.nav)
        })
        .map(|point| (point, SceneQuery::path_length(beacon, point, world.mesh, mask)))
        .filter(|(_, length)| length.is_finite())
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(point, _)| point)
}

/// Случайная точка пола не ближе `min_distance` от `from`
fn wander_to(ctx: &mut BehaviourContext, from: Vec3, min_distance: f32) -> bool {
    let world = ctx.world;
    match world.generator.random_point_on_floor(
        from,
        min_distance,
        true,
        world.bookkeeper,
        world.mesh,
        &mut *ctx.rng,
        &world.config.nav,
    ) {
        Ok(point) => ctx.set_destination(point),
        Err(err) => {
            logger::log_warning(&format!("⚠️ Phantom {:?}: no roam point ({})", ctx.entity, err));
            false
        }
    }
}

#[derive(Debug, Default)]
struct RoamState {
    timer: f32,
}

impl EnemyState<PhantomCore> for RoamState {
    fn id(&self) -> PhantomState {
        PhantomState::Roam
    }

    fn enter(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        let from = ctx.position();
        wander_to(ctx, from, host.config.roam_min_distance);
    }

    fn update(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        if ctx.select_target().is_some() {
            let _ = host.switch_state(PhantomState::Chase);
            return;
        }

        self.timer += ctx.delta;
        if ctx.agent_arrived() || ctx.agent_idle() || self.timer >= ROAM_RETARGET_SECS {
            let from = ctx.position();
            wander_to(ctx, from, host.config.roam_min_distance);
            self.timer = 0.0;
        }
    }

    fn exit(&mut self, _host: &mut PhantomCore, _ctx: &mut BehaviourContext) {
        self.timer = 0.0;
    }

    fn on_proximity(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext, event: &ProximityEvent) {
        react_to_beacon(host, ctx, event);
    }
}

#[derive(Debug, Default)]
struct ChaseState {
    repath_timer: f32,
    target: Option<TargetId>,
}

impl EnemyState<PhantomCore> for ChaseState {
    fn id(&self) -> PhantomState {
        PhantomState::Chase
    }

    fn enter(&mut self, _host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        self.repath_timer = 0.0;
        ctx.feedback(FeedbackKind::VoiceLine("phantom_chase"));
    }

    fn update(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        let Some(target) = ctx.select_target() else {
            let _ = host.switch_state(PhantomState::Roam);
            return;
        };
        let world = ctx.world;
        let Some(goal) = world.targets.get(target) else {
            let _ = host.switch_state(PhantomState::Roam);
            return;
        };

        if self.target != Some(target) {
            self.target = Some(target);
            self.repath_timer = 0.0;
        }

        let position = ctx.position();
        let range = host.config.attack_range;
        if position.xz().distance(goal.position.xz()) <= range {
            let _ = host.switch_state(PhantomState::Attack);
            return;
        }

        self.repath_timer -= ctx.delta;
        if self.repath_timer <= 0.0 {
            let goal_position = goal.position;
            let destination = approach_point(ctx, goal_position, range)
                .unwrap_or_else(|| goal.resolve_destination(position, range * 0.5, range * 0.9));
            ctx.set_destination(destination);
            self.repath_timer = host.config.repath_interval;
        }
    }

    fn exit(&mut self, _host: &mut PhantomCore, _ctx: &mut BehaviourContext) {
        self.repath_timer = 0.0;
        self.target = None;
    }

    fn on_proximity(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext, event: &ProximityEvent) {
        react_to_beacon(host, ctx, event);
    }

    /// Врезались в свою цель раньше, чем дошли до точки подхода
    fn on_collision(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext, contact: &CollisionContact) {
        if !contact.started {
            return;
        }
        let Some(target) = contact.target else {
            return;
        };
        if self.target == Some(target) || ctx.sensed.current() == Some(target) {
            let _ = host.switch_state(PhantomState::Attack);
        }
    }
}

#[derive(Debug, Default)]
struct AttackState {
    target: Option<TargetId>,
}

impl EnemyState<PhantomCore> for AttackState {
    fn id(&self) -> PhantomState {
        PhantomState::Attack
    }

    fn enter(&mut self, _host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        ctx.stop_agent();
        self.target = ctx.sensed.current();
        ctx.feedback(FeedbackKind::AnimationTrigger("attack_ready"));
    }

    fn update(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        host.attack_cooldown = (host.attack_cooldown - ctx.delta).max(0.0);

        let target = match self.target.filter(|id| ctx.world.targets.is_valid(*id)) {
            Some(id) => Some(id),
            None => ctx.select_target(),
        };
        let Some(target) = target else {
            let _ = host.switch_state(PhantomState::Roam);
            return;
        };
        self.target = Some(target);
        let Some(goal) = ctx.target_position(target) else {
            let _ = host.switch_state(PhantomState::Roam);
            return;
        };

        let position = ctx.position();
        if position.xz().distance(goal.xz()) > host.config.attack_range * ATTACK_BREAK_FACTOR {
            let _ = host.switch_state(PhantomState::Chase);
            return;
        }

        let facing = (goal - position).with_y(0.0);
        if facing.length_squared() > 1.0e-6 {
            ctx.transform.look_to(facing, Vec3::Y);
        }

        if host.attack_cooldown <= 0.0 {
            ctx.attack(target, host.config.attack_damage);
            ctx.feedback(FeedbackKind::AnimationTrigger("attack"));
            ctx.feedback(FeedbackKind::VoiceLine("phantom_attack"));
            host.attack_cooldown = host.config.attack_cooldown;
        }
    }

    fn exit(&mut self, _host: &mut PhantomCore, _ctx: &mut BehaviourContext) {
        self.target = None;
    }

    fn on_proximity(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext, event: &ProximityEvent) {
        react_to_beacon(host, ctx, event);
    }
}

#[derive(Debug, Default)]
struct PainState {
    timer: f32,
}

impl EnemyState<PhantomCore> for PainState {
    fn id(&self) -> PhantomState {
        PhantomState::Pain
    }

    fn enter(&mut self, _host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        ctx.stop_agent();
        ctx.feedback(FeedbackKind::AnimationTrigger("pain"));
        ctx.feedback(FeedbackKind::VoiceLine("phantom_pain"));
    }

    fn update(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        self.timer += ctx.delta;
        if self.timer >= host.config.pain_duration {
            flee_or_resume(host, ctx);
        }
    }

    fn exit(&mut self, _host: &mut PhantomCore, _ctx: &mut BehaviourContext) {
        self.timer = 0.0;
    }
}

#[derive(Debug, Default)]
struct FleeState {
    timer: f32,
}

impl EnemyState<PhantomCore> for FleeState {
    fn id(&self) -> PhantomState {
        PhantomState::Flee
    }

    fn enter(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        let beacon = ctx
            .sensed
            .flee_target()
            .and_then(|id| ctx.target_position(id))
            .unwrap_or(ctx.position());
        match flee_point(ctx, beacon) {
            Some(point) => {
                ctx.set_destination(point);
            }
            None => {
                wander_to(ctx, beacon, host.config.roam_min_distance * 2.0);
            }
        }
        ctx.feedback(FeedbackKind::VoiceLine("phantom_flee"));
    }

    fn update(&mut self, host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        self.timer += ctx.delta;
        if self.timer >= host.config.flee_duration {
            ctx.sensed.end_flee(ctx.world.targets);
            resume(host, ctx);
        }
    }

    fn exit(&mut self, _host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        self.timer = 0.0;
        // Прервали (Pain/Dead) — не оставляем flee override висеть
        if ctx.sensed.flee_target().is_some() {
            ctx.sensed.end_flee(ctx.world.targets);
        }
    }
}

#[derive(Debug, Default)]
struct DeadState;

impl EnemyState<PhantomCore> for DeadState {
    fn id(&self) -> PhantomState {
        PhantomState::Dead
    }

    fn enter(&mut self, _host: &mut PhantomCore, ctx: &mut BehaviourContext) {
        ctx.stop_agent();
        ctx.feedback(FeedbackKind::AnimationTrigger("death"));
        ctx.feedback(FeedbackKind::VoiceLine("phantom_death"));
        ctx.died();
        logger::log(&format!("💀 Phantom {:?} died", ctx.entity));
    }
}
