//! Headless симуляция Phanto
//!
//! Комната со столом и диваном, два Phantom и Phanto, цель-кристалл.
//! Прогоняет N тиков и печатает навигацию/состояния врагов.

use bevy::prelude::*;
use phanto_simulation::behaviour::{
    spawn_phanto, spawn_phantom, spawn_target, EnemyBehaviour, EnemyDamaged, PhantoCore, PhantomCore,
    ProximityEvent, Target, TargetKind, TargetRegistry,
};
use phanto_simulation::nav::{NavMeshBookKeeper, NavMeshLinkController, OwnerId, SceneRoom, SemanticLabel};
use phanto_simulation::{create_headless_app, log_info, step_fixed, SimConfig, SimulationPlugin};

const TICKS: usize = 1200;

fn demo_room() -> SceneRoom {
    let mut room = SceneRoom::empty_box(5.0, 4.0, 2.6);
    room.add_furniture(SemanticLabel::Table, Vec2::new(1.0, 0.5), 0.0, Vec3::new(1.2, 0.75, 0.8));
    room.add_furniture(SemanticLabel::Couch, Vec2::new(-1.5, -1.0), 0.3, Vec3::new(1.8, 0.45, 0.9));
    room
}

fn main() {
    let seed = 42;
    println!("Starting Phanto headless simulation (seed: {})", seed);

    let mut app = create_headless_app(seed);
    app.add_plugins(SimulationPlugin);
    app.insert_resource(demo_room());

    let config = SimConfig::default();
    let world = app.world_mut();
    let mut registry = world.remove_resource::<TargetRegistry>().unwrap_or_default();
    let (phantoms, phanto, crystal) = {
        let mut commands = world.commands();
        let phantoms = [
            spawn_phantom(&mut commands, &config, Vec3::new(-1.0, 0.0, 1.0)),
            spawn_phantom(&mut commands, &config, Vec3::new(1.5, 0.0, -1.0)),
        ];
        let phanto = spawn_phanto(&mut commands, &config, Vec3::new(0.0, 1.4, 0.0), Vec3::ZERO);
        let (_, crystal) = spawn_target(
            &mut commands,
            &mut registry,
            Target::new(TargetKind::Crystal, Vec3::new(0.0, 0.0, 1.5)),
        );
        (phantoms, phanto, crystal)
    };
    world.insert_resource(registry);
    world.flush();

    for tick in 0..TICKS {
        // Без Rapier sensor'ов: кристалл "виден" всем с 2-й секунды
        if tick == 120 {
            for enemy in phantoms.iter().copied().chain([phanto]) {
                app.world_mut().send_event(ProximityEvent {
                    enemy,
                    target: crystal,
                    entered: true,
                });
            }
        }
        if tick == 600 {
            app.world_mut().send_event(EnemyDamaged {
                enemy: phanto,
                amount: 0.5,
                source: Some(Vec3::new(0.0, 1.4, 2.0)),
            });
        }

        step_fixed(&mut app);

        if tick % 200 == 0 {
            let world = app.world();
            let bookkeeper = world.resource::<NavMeshBookKeeper>();
            let links = world.resource::<NavMeshLinkController>();
            let floor = bookkeeper.owner_triangles(OwnerId::FLOOR).len();
            let phantom_states: Vec<_> = phantoms
                .iter()
                .filter_map(|e| world.get::<EnemyBehaviour<PhantomCore>>(*e))
                .map(|b| b.current_state())
                .collect();
            let phanto_state = world
                .get::<EnemyBehaviour<PhantoCore>>(phanto)
                .and_then(|b| b.current_state());
            log_info(&format!(
                "Tick {}: floor {} triangles, {} links, phantoms {:?}, phanto {:?}",
                tick,
                floor,
                links.len(),
                phantom_states,
                phanto_state
            ));
        }
    }

    println!("Simulation complete!");
}
