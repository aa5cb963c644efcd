//! Phanto — летающий босс
//!
//! Без navmesh: все перемещения через steering primitives (hover, circle
//! strafe, barrel roll, aim). Урон может вызвать Pain (сильный удар) или
//! Dodge (средний удар, бочка вбок).

use crate::behaviour::context::BehaviourContext;
use crate::behaviour::events::{should_react, EnemyDamaged, FeedbackKind};
use crate::behaviour::machine::{BehaviourHost, EnemyBehaviour, EnemyState, StateMachine};
use crate::behaviour::steering::{
    aim_towards, circle_strafe_goal, hover_goal, steer_towards, strafe_angle_of, BarrelRoll,
    SteeringLimits,
};
use crate::behaviour::targets::TargetId;
use crate::config::PhantoConfig;
use crate::logger;
use crate::nav::physics::layers;
use bevy::prelude::*;
use rand::Rng;

/// Новая точка блуждания каждые N секунд
const WANDER_INTERVAL_SECS: f32 = 4.0;
/// Радиус блуждания вокруг home (метры)
const WANDER_RADIUS: f32 = 1.0;
/// Шанс выбрать точку над мебелью вместо home
const FURNITURE_WANDER_CHANCE: f32 = 0.5;
/// Запас к дистанции бочки при проверке стены сбоку
const DODGE_CLEARANCE: f32 = 0.3;
const ATTACK_BREAK_FACTOR: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Reflect)]
pub enum PhantoState {
    Roam,
    Chase,
    Attack,
    Pain,
    Dodge,
    Dead,
}

#[derive(Debug, Clone)]
pub struct PhantoCore {
    machine: StateMachine<PhantoState>,
    pub health: f32,
    pub config: PhantoConfig,
    pub velocity: Vec3,
    /// Центр блуждания (обычно центр комнаты)
    pub home: Vec3,
    pub attack_cooldown: f32,
    pub last_hit_from: Option<Vec3>,
}

impl PhantoCore {
    pub fn new(config: PhantoConfig, home: Vec3) -> Self {
        Self {
            machine: StateMachine::default(),
            health: config.max_health,
            config,
            velocity: Vec3::ZERO,
            home,
            attack_cooldown: 0.0,
            last_hit_from: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    fn limits(&self) -> SteeringLimits {
        SteeringLimits::from_config(&self.config)
    }

    fn fly(&mut self, ctx: &mut BehaviourContext, goal: Vec3) {
        let limits = self.limits();
        let mut position = ctx.transform.translation;
        steer_towards(&mut position, &mut self.velocity, goal, &limits, ctx.delta);
        ctx.transform.translation = position;
    }

    fn aim(&self, ctx: &mut BehaviourContext, target: Vec3) {
        let position = ctx.transform.translation;
        ctx.transform.rotation = aim_towards(
            ctx.transform.rotation,
            position,
            target,
            self.config.aim_turn_rate,
            ctx.delta,
        );
    }
}

impl BehaviourHost for PhantoCore {
    type StateId = PhantoState;

    fn machine(&self) -> &StateMachine<PhantoState> {
        &self.machine
    }

    fn machine_mut(&mut self) -> &mut StateMachine<PhantoState> {
        &mut self.machine
    }

    fn on_damaged(&mut self, damage: &EnemyDamaged, ctx: &mut BehaviourContext) {
        if !self.is_alive() {
            return;
        }
        self.health -= damage.amount;
        self.last_hit_from = damage.source;

        if !self.is_alive() {
            let _ = self.switch_state(PhantoState::Dead);
            return;
        }

        let scale = ctx.wave_scale();
        let pain_roll = ctx.roll();
        let dodge_roll = ctx.roll();
        let config = &self.config;
        if should_react(damage.amount, config.pain_damage_threshold, config.pain_chance, scale, pain_roll) {
            let _ = self.switch_state(PhantoState::Pain);
        } else if should_react(damage.amount, config.dodge_damage_threshold, config.dodge_chance, scale, dodge_roll) {
            let _ = self.switch_state(PhantoState::Dodge);
        }
    }
}

/// Phanto со всеми состояниями, старт в Roam
pub fn phanto_behaviour(config: &PhantoConfig, home: Vec3) -> EnemyBehaviour<PhantoCore> {
    EnemyBehaviour::new(
        PhantoCore::new(config.clone(), home),
        vec![
            Box::new(RoamState::default()),
            Box::new(ChaseState),
            Box::new(AttackState::default()),
            Box::new(PainState::default()),
            Box::new(DodgeState::default()),
            Box::new(DeadState),
        ],
        PhantoState::Roam,
    )
}

fn resume(host: &mut PhantoCore, ctx: &mut BehaviourContext) {
    let next = if ctx.select_target().is_some() {
        PhantoState::Chase
    } else {
        PhantoState::Roam
    };
    let _ = host.switch_state(next);
}

#[derive(Debug, Default)]
struct RoamState {
    wander: Vec3,
    timer: f32,
}

impl RoamState {
    /// Над случайной мебелью (если есть) или рядом с home
    fn pick_wander(&mut self, host: &PhantoCore, ctx: &mut BehaviourContext) {
        self.timer = 0.0;
        let world = ctx.world;
        if ctx.roll() < FURNITURE_WANDER_CHANCE {
            let furniture = world.scene.random_point_on_furniture(
                &mut *ctx.rng,
                world.bookkeeper,
                world.mesh,
                &world.config.nav,
            );
            if let Some(point) = furniture {
                self.wander = point.with_y(host.home.y);
                return;
            }
        }
        let offset = Vec3::new(
            ctx.rng.gen_range(-WANDER_RADIUS..WANDER_RADIUS),
            0.0,
            ctx.rng.gen_range(-WANDER_RADIUS..WANDER_RADIUS),
        );
        self.wander = host.home + offset;
    }
}

impl EnemyState<PhantoCore> for RoamState {
    fn id(&self) -> PhantoState {
        PhantoState::Roam
    }

    fn enter(&mut self, host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        self.pick_wander(host, ctx);
    }

    fn update(&mut self, host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        if ctx.select_target().is_some() {
            let _ = host.switch_state(PhantoState::Chase);
            return;
        }

        self.timer += ctx.delta;
        if self.timer >= WANDER_INTERVAL_SECS {
            self.pick_wander(host, ctx);
        }
        let goal = hover_goal(
            self.wander,
            host.config.hover_height,
            ctx.elapsed,
            host.config.hover_bob_amplitude,
        );
        host.fly(ctx, goal);
        let ahead = ctx.position() + host.velocity.with_y(0.0);
        host.aim(ctx, ahead);
    }

    fn exit(&mut self, _host: &mut PhantoCore, _ctx: &mut BehaviourContext) {
        self.timer = 0.0;
    }
}

#[derive(Debug, Default)]
struct ChaseState;

impl EnemyState<PhantoCore> for ChaseState {
    fn id(&self) -> PhantoState {
        PhantoState::Chase
    }

    fn enter(&mut self, _host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        ctx.feedback(FeedbackKind::VoiceLine("phanto_chase"));
    }

    fn update(&mut self, host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        let Some(target) = ctx.select_target() else {
            let _ = host.switch_state(PhantoState::Roam);
            return;
        };
        let world = ctx.world;
        let Some(goal) = world.targets.get(target) else {
            let _ = host.switch_state(PhantoState::Roam);
            return;
        };

        let position = ctx.position();
        if position.xz().distance(goal.position.xz()) <= host.config.attack_range {
            let _ = host.switch_state(PhantoState::Attack);
            return;
        }

        let radius = host.config.circle_strafe_radius;
        let approach = goal
            .resolve_destination(position, radius, radius)
            .with_y(host.config.hover_height);
        host.fly(ctx, approach);
        host.aim(ctx, goal.position);
    }
}

#[derive(Debug, Default)]
struct AttackState {
    target: Option<TargetId>,
    angle: f32,
}

impl EnemyState<PhantoCore> for AttackState {
    fn id(&self) -> PhantoState {
        PhantoState::Attack
    }

    fn enter(&mut self, _host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        self.target = ctx.sensed.current();
        if let Some(center) = self.target.and_then(|id| ctx.target_position(id)) {
            self.angle = strafe_angle_of(center, ctx.position());
        }
        ctx.feedback(FeedbackKind::AnimationTrigger("attack_ready"));
    }

    fn update(&mut self, host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        host.attack_cooldown = (host.attack_cooldown - ctx.delta).max(0.0);

        let target = match self.target.filter(|id| ctx.world.targets.is_valid(*id)) {
            Some(id) => Some(id),
            None => ctx.select_target(),
        };
        let Some((target, center)) = target.and_then(|id| ctx.target_position(id).map(|p| (id, p))) else {
            let _ = host.switch_state(PhantoState::Roam);
            return;
        };
        self.target = Some(target);

        let position = ctx.position();
        if position.xz().distance(center.xz()) > host.config.attack_range * ATTACK_BREAK_FACTOR {
            let _ = host.switch_state(PhantoState::Chase);
            return;
        }

        self.angle += host.config.circle_strafe_speed * ctx.delta;
        let goal = circle_strafe_goal(
            center,
            host.config.circle_strafe_radius,
            self.angle,
            host.config.hover_height,
        );
        host.fly(ctx, goal);
        host.aim(ctx, center);

        if host.attack_cooldown <= 0.0 {
            ctx.attack(target, host.config.attack_damage);
            ctx.spit_goo(center);
            ctx.feedback(FeedbackKind::AnimationTrigger("spit_goo"));
            host.attack_cooldown = host.config.attack_cooldown;
        }
    }

    fn exit(&mut self, _host: &mut PhantoCore, _ctx: &mut BehaviourContext) {
        self.target = None;
        self.angle = 0.0;
    }
}

#[derive(Debug, Default)]
struct PainState {
    timer: f32,
}

impl EnemyState<PhantoCore> for PainState {
    fn id(&self) -> PhantoState {
        PhantoState::Pain
    }

    fn enter(&mut self, _host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        ctx.feedback(FeedbackKind::AnimationTrigger("pain"));
        ctx.feedback(FeedbackKind::VoiceLine("phanto_pain"));
        ctx.feedback(FeedbackKind::Haptics {
            intensity: 0.6,
            duration: 0.2,
        });
    }

    fn update(&mut self, host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        // Тормозим на месте
        let hold = ctx.position();
        host.fly(ctx, hold);

        self.timer += ctx.delta;
        if self.timer >= host.config.pain_duration {
            resume(host, ctx);
        }
    }

    fn exit(&mut self, _host: &mut PhantoCore, _ctx: &mut BehaviourContext) {
        self.timer = 0.0;
    }
}

#[derive(Debug, Default)]
struct DodgeState {
    roll: Option<BarrelRoll>,
}

impl EnemyState<PhantoCore> for DodgeState {
    fn id(&self) -> PhantoState {
        PhantoState::Dodge
    }

    fn enter(&mut self, host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        let position = ctx.position();
        let incoming = host
            .last_hit_from
            .map(|source| (position - source).with_y(0.0))
            .filter(|d| d.length_squared() > 1.0e-6)
            .unwrap_or(ctx.transform.forward().as_vec3());
        let side = if ctx.roll() < 0.5 { 1.0 } else { -1.0 };
        let mut lateral = Vec3::Y.cross(incoming).normalize_or(Vec3::X) * side;

        // Стена/мебель на пути бочки — крутимся в другую сторону
        let reach = host.config.barrel_roll_distance + DODGE_CLEARANCE;
        let physics = ctx.world.physics;
        let blocked = |direction: Vec3| {
            physics
                .raycast(position, direction, reach, layers::WALLS | layers::FURNITURE)
                .is_some()
        };
        if blocked(lateral) && !blocked(-lateral) {
            lateral = -lateral;
        }

        self.roll = Some(BarrelRoll::new(
            position,
            lateral,
            host.config.barrel_roll_distance,
            host.config.barrel_roll_duration,
        ));
        ctx.feedback(FeedbackKind::AnimationTrigger("barrel_roll"));
    }

    fn update(&mut self, host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        let Some(roll) = self.roll.as_mut() else {
            resume(host, ctx);
            return;
        };
        roll.tick(ctx.delta);
        let goal = roll.goal();
        let finished = roll.is_finished();
        host.fly(ctx, goal);

        if finished {
            resume(host, ctx);
        }
    }

    fn exit(&mut self, _host: &mut PhantoCore, _ctx: &mut BehaviourContext) {
        self.roll = None;
    }
}

#[derive(Debug, Default)]
struct DeadState;

impl EnemyState<PhantoCore> for DeadState {
    fn id(&self) -> PhantoState {
        PhantoState::Dead
    }

    fn enter(&mut self, host: &mut PhantoCore, ctx: &mut BehaviourContext) {
        host.velocity = Vec3::ZERO;
        ctx.feedback(FeedbackKind::AnimationTrigger("death"));
        ctx.feedback(FeedbackKind::VoiceLine("phanto_death"));
        ctx.feedback(FeedbackKind::Haptics {
            intensity: 1.0,
            duration: 0.5,
        });
        ctx.died();
        logger::log(&format!("💀 Phanto {:?} defeated", ctx.entity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::context::fixture::ContextFixture;
    use crate::behaviour::targets::{Target, TargetKind};
    use crate::nav::room::{SceneRoom, SemanticLabel};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn hit(amount: f32) -> EnemyDamaged {
        EnemyDamaged {
            enemy: Entity::from_raw(1),
            amount,
            source: Some(Vec3::new(0.0, 1.4, 3.0)),
        }
    }

    fn started(fixture: &mut ContextFixture) -> EnemyBehaviour<PhantoCore> {
        fixture.transform.translation = Vec3::new(0.0, 1.4, 0.0);
        let mut behaviour = phanto_behaviour(&fixture.config.phanto, Vec3::ZERO);
        behaviour.start(&mut fixture.context()).expect("start");
        behaviour
    }

    fn tick(behaviour: &mut EnemyBehaviour<PhantoCore>, fixture: &mut ContextFixture, n: usize) {
        for _ in 0..n {
            behaviour.update(&mut fixture.context()).expect("update");
            fixture.elapsed += fixture.delta;
        }
    }

    #[test]
    fn test_roam_hovers_near_home() {
        let mut fixture = ContextFixture::new();
        let mut behaviour = started(&mut fixture);
        tick(&mut behaviour, &mut fixture, 600);

        let position = fixture.transform.translation;
        let height = fixture.config.phanto.hover_height;
        assert_eq!(behaviour.current_state(), Some(PhantoState::Roam));
        assert!((position.y - height).abs() < 0.2);
        assert!(position.xz().length() < WANDER_RADIUS * 1.5 + 0.2);
    }

    #[test]
    fn test_small_hit_never_reacts() {
        let mut fixture = ContextFixture::new();
        fixture.config.phanto.dodge_chance = 1.0;
        fixture.config.phanto.pain_chance = 1.0;
        let mut behaviour = started(&mut fixture);

        let amount = fixture.config.phanto.dodge_damage_threshold * 0.5;
        for _ in 0..20 {
            behaviour
                .apply_damage(&hit(amount), &mut fixture.context())
                .expect("damage");
            assert_eq!(behaviour.current_state(), Some(PhantoState::Roam));
        }
    }

    #[test]
    fn test_medium_hit_dodges_sideways() {
        let mut fixture = ContextFixture::new();
        fixture.config.phanto.dodge_chance = 1.0;
        fixture.config.phanto.pain_chance = 0.0;
        let mut behaviour = started(&mut fixture);
        let origin = fixture.transform.translation;

        behaviour
            .apply_damage(&hit(0.5), &mut fixture.context())
            .expect("damage");
        assert_eq!(behaviour.current_state(), Some(PhantoState::Dodge));

        let ticks = (fixture.config.phanto.barrel_roll_duration / fixture.delta).ceil() as usize + 2;
        tick(&mut behaviour, &mut fixture, ticks);
        assert_eq!(behaviour.current_state(), Some(PhantoState::Roam));

        // Удар пришёл по +Z — уклонение вдоль X
        let moved = fixture.transform.translation - origin;
        assert!(moved.x.abs() > moved.z.abs());
    }

    #[test]
    fn test_heavy_hit_causes_pain() {
        let mut fixture = ContextFixture::new();
        fixture.config.phanto.pain_chance = 1.0;
        let mut behaviour = started(&mut fixture);

        behaviour
            .apply_damage(&hit(fixture.config.phanto.pain_damage_threshold), &mut fixture.context())
            .expect("damage");
        assert_eq!(behaviour.current_state(), Some(PhantoState::Pain));
        assert!(fixture
            .outbox
            .feedback
            .iter()
            .any(|f| matches!(f.kind, FeedbackKind::Haptics { .. })));
    }

    #[test]
    fn test_strafes_and_attacks_target() {
        let mut fixture = ContextFixture::new();
        let target = fixture
            .targets
            .register(Target::new(TargetKind::Crystal, Vec3::new(2.0, 0.0, 0.0)));
        fixture.sensed.on_enter(target);
        let mut behaviour = started(&mut fixture);

        tick(&mut behaviour, &mut fixture, 2);
        assert_eq!(behaviour.current_state(), Some(PhantoState::Attack));

        let cooldown = fixture.config.phanto.attack_cooldown;
        let ticks = (cooldown * 2.0 / fixture.delta) as usize + 2;
        tick(&mut behaviour, &mut fixture, ticks);
        assert!(fixture.outbox.attacks.len() >= 2);
        assert!(fixture.outbox.attacks.iter().all(|a| a.target == target));
    }

    #[test]
    fn test_death_is_final() {
        let mut fixture = ContextFixture::new();
        let mut behaviour = started(&mut fixture);
        behaviour
            .apply_damage(&hit(100.0), &mut fixture.context())
            .expect("damage");
        tick(&mut behaviour, &mut fixture, 10);

        assert_eq!(behaviour.current_state(), Some(PhantoState::Dead));
        assert_eq!(fixture.outbox.deaths.len(), 1);
    }

    #[test]
    fn test_dodge_rolls_away_from_wall() {
        for seed in 0..8 {
            let mut fixture = ContextFixture::with_floor();
            fixture.rng = ChaCha8Rng::seed_from_u64(seed);
            fixture.config.phanto.dodge_chance = 1.0;
            fixture.config.phanto.pain_chance = 0.0;
            let mut behaviour = started(&mut fixture);
            // Стена комнаты 4×4 в x = 2, удар по +Z → бочка вдоль X
            fixture.transform.translation = Vec3::new(1.6, 1.4, 0.0);
            let origin = fixture.transform.translation;
            let from_front = EnemyDamaged {
                source: Some(origin + Vec3::new(0.0, 0.0, 3.0)),
                ..hit(0.5)
            };

            behaviour
                .apply_damage(&from_front, &mut fixture.context())
                .expect("damage");
            assert_eq!(behaviour.current_state(), Some(PhantoState::Dodge));
            tick(&mut behaviour, &mut fixture, 5);

            let moved = fixture.transform.translation - origin;
            assert!(moved.x < 0.0, "seed {seed}: rolled into the wall ({moved:?})");
        }
    }

    #[test]
    fn test_wander_points_over_furniture_or_home() {
        let mut room = SceneRoom::empty_box(4.0, 4.0, 2.5);
        room.add_furniture(SemanticLabel::Table, Vec2::new(1.2, -1.0), 0.0, Vec3::new(0.6, 0.6, 0.7));
        let mut fixture = ContextFixture::with_room(room);
        let core = PhantoCore::new(fixture.config.phanto.clone(), Vec3::ZERO);
        let mut roam = RoamState::default();

        let mut over_table = 0;
        for _ in 0..40 {
            roam.pick_wander(&core, &mut fixture.context());
            let wander = roam.wander;
            let on_table = (wander.x - 1.2).abs() <= 0.35 && (wander.z + 1.0).abs() <= 0.35;
            let near_home = wander.x.abs() <= WANDER_RADIUS && wander.z.abs() <= WANDER_RADIUS;
            assert!(on_table || near_home, "wander {wander:?}");
            assert_eq!(wander.y, 0.0);
            if on_table && !near_home {
                over_table += 1;
            }
        }
        assert!(over_table > 0);
    }

    #[test]
    fn test_attack_spits_goo_at_target() {
        let mut fixture = ContextFixture::new();
        let center = Vec3::new(2.0, 0.0, 0.0);
        let target = fixture.targets.register(Target::new(TargetKind::Crystal, center));
        fixture.sensed.on_enter(target);
        let mut behaviour = started(&mut fixture);

        tick(&mut behaviour, &mut fixture, 3);
        assert_eq!(behaviour.current_state(), Some(PhantoState::Attack));
        assert!(!fixture.outbox.goo.is_empty());
        assert_eq!(fixture.outbox.goo.len(), fixture.outbox.attacks.len());
        assert!(fixture.outbox.goo.iter().all(|g| g.point == center));
    }
}
