//! Конфигурация симуляции (data-driven tuning)
//!
//! Все константы навигации и поведения врагов живут здесь, а не в коде систем.
//! `SimConfig` грузится из JSON (`#[serde(default)]` — частичный JSON ок)
//! и ставится как Resource.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Корневой конфиг симуляции
#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub nav: NavConfig,
    pub phantom: PhantomConfig,
    pub phanto: PhantoConfig,
    pub wave: WaveTuning,
}

impl SimConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Параметры navmesh bookkeeping, генераторов и SceneQuery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Радиус sphere cast для проверки открытости (теннисный мяч, метры)
    pub open_check_radius: f32,
    /// Hit засчитывается если ближе чем factor × radius к центроиду
    pub open_check_tolerance_factor: f32,
    /// Бюджет scene validation на один тик (миллисекунды)
    pub validation_budget_ms: f32,
    /// Смещение последнего угла partial пути к предпоследнему (0..1)
    pub partial_corner_blend: f32,
    /// Доля высоты мебели, которую покрывает её navmesh volume
    pub furniture_height_clip: f32,
    /// Толщина floor volume над полом, если в комнате есть мебель (метры)
    pub floor_slab_height: f32,
    /// Максимум попыток reject-sampling для RandomPointOnFloor
    pub random_point_attempts: usize,
    /// Максимальное расстояние snap'а точки на navmesh
    pub sample_max_distance: f32,
    /// Шаг за край мебели перед sphere cast вниз для hop link
    pub hop_link_step_out: f32,
    /// Радиус sphere cast'а hop link'а
    pub hop_link_sphere_radius: f32,
    /// Ширина синтезированных links
    pub link_width: f32,
    /// Порог "почти равных" кандидатов в SceneQuery (метры)
    pub scene_query_tie_threshold: f32,
    /// Размер ячейки spatial hash в SceneQuery (метры)
    pub scene_query_cell_size: f32,
    /// Размер ячейки триангуляции reference navmesh (метры)
    pub grid_cell_size: f32,
    /// Высота агента: препятствие ниже этой высоты над поверхностью вырезает ячейку
    pub agent_height: f32,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            open_check_radius: 0.0325,
            open_check_tolerance_factor: 2.0,
            validation_budget_ms: 3.0,
            partial_corner_blend: 0.9,
            furniture_height_clip: 0.75,
            floor_slab_height: 0.25,
            random_point_attempts: 10,
            sample_max_distance: 0.5,
            hop_link_step_out: 0.1,
            hop_link_sphere_radius: 0.05,
            link_width: 0.2,
            scene_query_tie_threshold: 0.02,
            scene_query_cell_size: 0.1,
            grid_cell_size: 0.25,
            agent_height: 0.5,
        }
    }
}

/// Phantom — наземный враг на navmesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhantomConfig {
    pub max_health: f32,
    /// Скорость движения по пути (m/s)
    pub move_speed: f32,
    /// Дистанция атаки (метры)
    pub attack_range: f32,
    /// Cooldown между атаками (секунды)
    pub attack_cooldown: f32,
    pub attack_damage: f32,
    /// Урон, начиная с которого возможен Pain
    pub pain_damage_threshold: f32,
    /// Базовый шанс Pain (масштабируется волной)
    pub pain_chance: f32,
    pub pain_duration: f32,
    pub flee_duration: f32,
    /// Минимальная дистанция новой roam точки от текущей позиции
    pub roam_min_distance: f32,
    /// Интервал пересчёта пути в Chase (секунды)
    pub repath_interval: f32,
    /// Дистанция, при которой точка пути считается достигнутой
    pub arrive_distance: f32,
    /// Радиус proximity sensor'а (для TargetsInRange)
    pub sense_radius: f32,
}

impl Default for PhantomConfig {
    fn default() -> Self {
        Self {
            max_health: 1.0,
            move_speed: 0.8,
            attack_range: 0.35,
            attack_cooldown: 1.2,
            attack_damage: 0.1,
            pain_damage_threshold: 0.25,
            pain_chance: 0.6,
            pain_duration: 0.5,
            flee_duration: 3.0,
            roam_min_distance: 1.0,
            repath_interval: 0.5,
            arrive_distance: 0.1,
            sense_radius: 3.0,
        }
    }
}

/// Phanto — летающий босс (steering без navmesh)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhantoConfig {
    pub max_health: f32,
    /// Высота зависания над полом (метры)
    pub hover_height: f32,
    pub max_speed: f32,
    pub max_acceleration: f32,
    /// Жёсткость пружины steering (1/s²)
    pub spring_stiffness: f32,
    /// Демпфирование пружины (1/s)
    pub spring_damping: f32,
    /// Скорость поворота к цели (рад/с)
    pub aim_turn_rate: f32,
    pub circle_strafe_radius: f32,
    /// Угловая скорость circle strafe (рад/с)
    pub circle_strafe_speed: f32,
    pub barrel_roll_duration: f32,
    pub barrel_roll_distance: f32,
    pub attack_cooldown: f32,
    pub attack_range: f32,
    /// Урон плевка goo
    pub attack_damage: f32,
    pub pain_damage_threshold: f32,
    pub pain_chance: f32,
    pub pain_duration: f32,
    /// Урон, начиная с которого возможен Dodge (ниже pain порога)
    pub dodge_damage_threshold: f32,
    pub dodge_chance: f32,
    /// Амплитуда покачивания при hover (метры)
    pub hover_bob_amplitude: f32,
    pub sense_radius: f32,
}

impl Default for PhantoConfig {
    fn default() -> Self {
        Self {
            max_health: 10.0,
            hover_height: 1.4,
            max_speed: 1.5,
            max_acceleration: 3.0,
            spring_stiffness: 8.0,
            spring_damping: 4.0,
            aim_turn_rate: 3.0,
            circle_strafe_radius: 1.5,
            circle_strafe_speed: 0.8,
            barrel_roll_duration: 0.6,
            barrel_roll_distance: 0.8,
            attack_cooldown: 2.5,
            attack_range: 4.0,
            attack_damage: 0.25,
            pain_damage_threshold: 1.0,
            pain_chance: 0.5,
            pain_duration: 1.0,
            dodge_damage_threshold: 0.2,
            dodge_chance: 0.3,
            hover_bob_amplitude: 0.05,
            sense_radius: 6.0,
        }
    }
}

/// Параметры текущей волны (сама волна — внешний модуль)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveTuning {
    /// Номер волны (0 = первая)
    pub wave_index: u32,
    /// Прирост шанса реакций за волну
    pub chance_scale_per_wave: f32,
    /// Потолок множителя шанса
    pub max_chance_scale: f32,
}

impl Default for WaveTuning {
    fn default() -> Self {
        Self {
            wave_index: 0,
            chance_scale_per_wave: 0.1,
            max_chance_scale: 2.0,
        }
    }
}

impl WaveTuning {
    /// Множитель шанса pain/dodge для текущей волны
    pub fn chance_scale(&self) -> f32 {
        (1.0 + self.wave_index as f32 * self.chance_scale_per_wave).min(self.max_chance_scale)
    }
}
