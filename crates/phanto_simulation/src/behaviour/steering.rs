//! Steering primitives для летающих врагов
//!
//! Всё строится на spring-damper: ускорение к goal точке с clamp'ом
//! ускорения и скорости. Поведения (hover, circle strafe, barrel roll)
//! только выбирают goal.

use crate::config::PhantoConfig;
use bevy::prelude::*;
use std::f32::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringLimits {
    pub max_speed: f32,
    pub max_acceleration: f32,
    pub stiffness: f32,
    pub damping: f32,
}

impl SteeringLimits {
    pub fn from_config(config: &PhantoConfig) -> Self {
        Self {
            max_speed: config.max_speed,
            max_acceleration: config.max_acceleration,
            stiffness: config.spring_stiffness,
            damping: config.spring_damping,
        }
    }
}

/// a = k·(goal - x) - c·v, |a| ≤ max_acceleration
pub fn spring_acceleration(position: Vec3, velocity: Vec3, goal: Vec3, limits: &SteeringLimits) -> Vec3 {
    let acceleration = (goal - position) * limits.stiffness - velocity * limits.damping;
    acceleration.clamp_length_max(limits.max_acceleration)
}

/// Semi-implicit Euler с clamp'ом скорости
pub fn integrate(position: &mut Vec3, velocity: &mut Vec3, acceleration: Vec3, limits: &SteeringLimits, delta: f32) {
    *velocity = (*velocity + acceleration * delta).clamp_length_max(limits.max_speed);
    *position += *velocity * delta;
}

/// Шаг к goal: spring + integrate
pub fn steer_towards(position: &mut Vec3, velocity: &mut Vec3, goal: Vec3, limits: &SteeringLimits, delta: f32) {
    let acceleration = spring_acceleration(*position, *velocity, goal, limits);
    integrate(position, velocity, acceleration, limits, delta);
}

/// Точка зависания над `anchor` с лёгким покачиванием
pub fn hover_goal(anchor: Vec3, height: f32, elapsed: f32, bob_amplitude: f32) -> Vec3 {
    anchor.with_y(height + bob_amplitude * (elapsed * 2.0).sin())
}

/// Точка на окружности вокруг центра на высоте `height`
pub fn circle_strafe_goal(center: Vec3, radius: f32, angle: f32, height: f32) -> Vec3 {
    Vec3::new(
        center.x + radius * angle.cos(),
        height,
        center.z + radius * angle.sin(),
    )
}

/// Угол позиции относительно центра (для старта strafe с текущей точки)
pub fn strafe_angle_of(center: Vec3, position: Vec3) -> f32 {
    let offset = position - center;
    offset.z.atan2(offset.x)
}

/// Поворот к цели с ограниченной угловой скоростью
pub fn aim_towards(rotation: Quat, from: Vec3, target: Vec3, turn_rate: f32, delta: f32) -> Quat {
    let direction = target - from;
    if direction.length_squared() < 1.0e-6 {
        return rotation;
    }
    let direction = direction.normalize();
    // looking_to вырождается при взгляде строго вверх/вниз
    if direction.dot(Vec3::Y).abs() > 0.999 {
        return rotation;
    }
    let desired = Transform::IDENTITY.looking_to(direction, Vec3::Y).rotation;
    let angle = rotation.angle_between(desired);
    let max_step = turn_rate * delta;
    if angle <= max_step {
        desired
    } else {
        rotation.slerp(desired, max_step / angle)
    }
}

/// Уклонение бочкой: боковой рывок на `distance` за `duration`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarrelRoll {
    pub origin: Vec3,
    /// Единичный боковой вектор
    pub direction: Vec3,
    pub distance: f32,
    pub duration: f32,
    elapsed: f32,
}

impl BarrelRoll {
    pub fn new(origin: Vec3, direction: Vec3, distance: f32, duration: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or(Vec3::X),
            distance,
            duration: duration.max(1.0e-3),
            elapsed: 0.0,
        }
    }

    pub fn progress(&self) -> f32 {
        (self.elapsed / self.duration).clamp(0.0, 1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    pub fn tick(&mut self, delta: f32) {
        self.elapsed += delta;
    }

    /// Goal точка (smoothstep по боковому смещению)
    pub fn goal(&self) -> Vec3 {
        let t = self.progress();
        let eased = t * t * (3.0 - 2.0 * t);
        self.origin + self.direction * self.distance * eased
    }

    /// Крен вокруг направления полёта (полный оборот за roll)
    pub fn roll_angle(&self) -> f32 {
        self.progress() * TAU
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SteeringLimits {
        SteeringLimits::from_config(&PhantoConfig::default())
    }

    #[test]
    fn test_acceleration_is_clamped() {
        let limits = limits();
        let a = spring_acceleration(Vec3::ZERO, Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0), &limits);
        assert!((a.length() - limits.max_acceleration).abs() < 1e-4);
    }

    #[test]
    fn test_velocity_is_clamped() {
        let limits = limits();
        let mut position = Vec3::ZERO;
        let mut velocity = Vec3::new(10.0, 0.0, 0.0);
        integrate(&mut position, &mut velocity, Vec3::X * 5.0, &limits, 0.1);
        assert!(velocity.length() <= limits.max_speed + 1e-5);
    }

    #[test]
    fn test_spring_settles_at_goal() {
        let limits = limits();
        let goal = Vec3::new(1.0, 1.4, -0.5);
        let mut position = Vec3::ZERO;
        let mut velocity = Vec3::ZERO;
        for _ in 0..600 {
            steer_towards(&mut position, &mut velocity, goal, &limits, 1.0 / 60.0);
        }
        assert!(position.distance(goal) < 0.01);
        assert!(velocity.length() < 0.05);
    }

    #[test]
    fn test_circle_strafe_goal_on_radius() {
        let center = Vec3::new(1.0, 0.0, 2.0);
        for i in 0..8 {
            let goal = circle_strafe_goal(center, 1.5, i as f32 * 0.8, 1.4);
            assert!((goal.xz().distance(center.xz()) - 1.5).abs() < 1e-5);
            assert_eq!(goal.y, 1.4);
        }
        let angle = strafe_angle_of(center, circle_strafe_goal(center, 1.5, 0.7, 1.4));
        assert!((angle - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_aim_turns_at_limited_rate() {
        let from = Vec3::ZERO;
        let target = Vec3::new(5.0, 0.0, 0.0);
        let step = aim_towards(Quat::IDENTITY, from, target, 1.0, 0.1);
        assert!((Quat::IDENTITY.angle_between(step) - 0.1).abs() < 1e-3);

        let mut rotation = Quat::IDENTITY;
        for _ in 0..100 {
            rotation = aim_towards(rotation, from, target, 3.0, 1.0 / 60.0);
        }
        let forward = rotation * Vec3::NEG_Z;
        assert!(forward.dot(Vec3::X) > 0.999);
    }

    #[test]
    fn test_barrel_roll_completes() {
        let mut roll = BarrelRoll::new(Vec3::ZERO, Vec3::Z, 0.8, 0.6);
        assert_eq!(roll.goal(), Vec3::ZERO);
        for _ in 0..40 {
            roll.tick(1.0 / 60.0);
        }
        assert!(roll.is_finished());
        assert!((roll.goal() - Vec3::new(0.0, 0.0, 0.8)).length() < 1e-5);
        assert!((roll.roll_angle() - TAU).abs() < 1e-5);
    }

    #[test]
    fn test_hover_bobs_around_height() {
        let goal = hover_goal(Vec3::new(1.0, 0.0, 1.0), 1.4, 0.0, 0.05);
        assert_eq!(goal, Vec3::new(1.0, 1.4, 1.0));
        let bobbed = hover_goal(Vec3::ZERO, 1.4, 0.785, 0.05);
        assert!((bobbed.y - 1.45).abs() < 1e-3);
    }
}
