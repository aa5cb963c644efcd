//! Tests for the generic enemy state machine.

use super::*;
use crate::behaviour::context::fixture::ContextFixture;
use crate::behaviour::targets::TargetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestState {
    Idle,
    Walk,
    Run,
    Missing,
}

#[derive(Default)]
struct TestHost {
    machine: StateMachine<TestState>,
    journal: Vec<String>,
    /// Запрос из exit (должен быть отклонён)
    exit_request: Option<TestState>,
    /// Запрос из update (применяется после hook'а)
    update_request: Option<TestState>,
    /// Walk.enter → Run, Run.enter → Walk
    bounce: bool,
    rejected: Vec<BehaviourError>,
}

impl BehaviourHost for TestHost {
    type StateId = TestState;

    fn machine(&self) -> &StateMachine<TestState> {
        &self.machine
    }

    fn machine_mut(&mut self) -> &mut StateMachine<TestState> {
        &mut self.machine
    }
}

struct Recording {
    id: TestState,
}

impl EnemyState<TestHost> for Recording {
    fn id(&self) -> TestState {
        self.id
    }

    fn enter(&mut self, host: &mut TestHost, _ctx: &mut BehaviourContext) {
        host.journal.push(format!("enter {:?}", self.id));
        if host.bounce {
            let next = match self.id {
                TestState::Walk => TestState::Run,
                _ => TestState::Walk,
            };
            let _ = host.switch_state(next);
        }
    }

    fn update(&mut self, host: &mut TestHost, _ctx: &mut BehaviourContext) {
        host.journal.push(format!("update {:?}", self.id));
        if let Some(next) = host.update_request.take() {
            let _ = host.switch_state(next);
        }
    }

    fn exit(&mut self, host: &mut TestHost, _ctx: &mut BehaviourContext) {
        host.journal.push(format!("exit {:?}", self.id));
        if let Some(next) = host.exit_request.take() {
            if let Err(err) = host.switch_state(next) {
                host.rejected.push(err);
            }
        }
    }

    fn on_proximity(&mut self, host: &mut TestHost, _ctx: &mut BehaviourContext, event: &ProximityEvent) {
        host.journal.push(format!("proximity {:?} {:?}", self.id, event.target));
    }

    fn on_collision(&mut self, host: &mut TestHost, _ctx: &mut BehaviourContext, contact: &CollisionContact) {
        host.journal.push(format!("contact {:?} {:?} {}", self.id, contact.target, contact.started));
        if contact.started && self.id == TestState::Walk {
            let _ = host.switch_state(TestState::Run);
        }
    }
}

fn behaviour() -> EnemyBehaviour<TestHost> {
    EnemyBehaviour::new(
        TestHost::default(),
        vec![
            Box::new(Recording { id: TestState::Idle }),
            Box::new(Recording { id: TestState::Walk }),
            Box::new(Recording { id: TestState::Run }),
        ],
        TestState::Idle,
    )
}

#[test]
fn test_first_update_enters_initial_state() {
    let mut fixture = ContextFixture::new();
    let mut machine = behaviour();
    assert!(!machine.is_started());

    machine.update(&mut fixture.context()).expect("update");
    assert_eq!(machine.current_state(), Some(TestState::Idle));
    assert_eq!(machine.host.journal, vec!["enter Idle", "update Idle"]);
}

#[test]
fn test_switch_to_current_state_is_noop() {
    let mut fixture = ContextFixture::new();
    let mut machine = behaviour();
    machine.start(&mut fixture.context()).expect("start");
    machine.host.journal.clear();

    machine
        .switch_state(TestState::Idle, &mut fixture.context())
        .expect("no-op switch");
    assert!(machine.host.journal.is_empty());
    assert_eq!(machine.host.machine().transitions(), 1);
}

#[test]
fn test_switch_runs_exit_then_enter() {
    let mut fixture = ContextFixture::new();
    let mut machine = behaviour();
    machine.start(&mut fixture.context()).expect("start");
    machine.host.journal.clear();

    machine
        .switch_state(TestState::Walk, &mut fixture.context())
        .expect("switch");
    assert_eq!(machine.host.journal, vec!["exit Idle", "enter Walk"]);
    assert_eq!(machine.current_state(), Some(TestState::Walk));
}

#[test]
fn test_switch_during_exit_is_rejected() {
    let mut fixture = ContextFixture::new();
    let mut machine = behaviour();
    machine.start(&mut fixture.context()).expect("start");
    machine.host.exit_request = Some(TestState::Run);

    machine
        .switch_state(TestState::Walk, &mut fixture.context())
        .expect("outer switch completes");

    // Внешний переход прошёл, запрос из exit отброшен
    assert_eq!(machine.current_state(), Some(TestState::Walk));
    assert!(!machine.host.journal.iter().any(|line| line == "enter Run"));
    assert!(matches!(
        machine.host.rejected.as_slice(),
        [BehaviourError::SwitchDuringExit { .. }]
    ));
    assert!(!machine.host.machine().is_exiting());
    assert_eq!(machine.host.machine().pending(), None);
}

#[test]
fn test_exit_guard_is_per_instance() {
    let mut fixture = ContextFixture::new();
    let mut first = behaviour();
    let mut second = behaviour();
    first.start(&mut fixture.context()).expect("start");
    second.start(&mut fixture.context()).expect("start");

    first.host.machine_mut().exiting = true;
    assert!(second.host.switch_state(TestState::Walk).is_ok());
    assert!(first.host.switch_state(TestState::Walk).is_err());
}

#[test]
fn test_request_from_update_applies_after_hook() {
    let mut fixture = ContextFixture::new();
    let mut machine = behaviour();
    machine.start(&mut fixture.context()).expect("start");
    machine.host.journal.clear();
    machine.host.update_request = Some(TestState::Run);

    machine.update(&mut fixture.context()).expect("update");
    assert_eq!(
        machine.host.journal,
        vec!["update Idle", "exit Idle", "enter Run"]
    );
}

#[test]
fn test_transition_chain_is_bounded() {
    let mut fixture = ContextFixture::new();
    let mut machine = behaviour();
    machine.start(&mut fixture.context()).expect("start");
    machine.host.bounce = true;

    let result = machine.switch_state(TestState::Walk, &mut fixture.context());
    assert_eq!(result, Err(BehaviourError::TransitionLoop(MAX_TRANSITION_CHAIN)));
    assert_eq!(machine.host.machine().pending(), None);
}

#[test]
fn test_unknown_state_is_an_error() {
    let mut fixture = ContextFixture::new();
    let mut machine = behaviour();
    machine.start(&mut fixture.context()).expect("start");

    let result = machine.switch_state(TestState::Missing, &mut fixture.context());
    assert!(matches!(result, Err(BehaviourError::UnknownState(_))));
    assert_eq!(machine.current_state(), Some(TestState::Idle));
}

#[test]
fn test_proximity_routed_to_current_state_only() {
    let mut fixture = ContextFixture::new();
    let mut machine = behaviour();
    machine.start(&mut fixture.context()).expect("start");
    machine
        .switch_state(TestState::Walk, &mut fixture.context())
        .expect("switch");
    machine.host.journal.clear();

    let event = ProximityEvent {
        enemy: Entity::from_raw(1),
        target: TargetId(3),
        entered: true,
    };
    machine
        .route_proximity(&event, &mut fixture.context())
        .expect("routed");
    assert_eq!(machine.host.journal, vec!["proximity Walk TargetId(3)"]);
}

#[test]
fn test_contact_routed_to_current_state_and_may_switch() {
    let mut fixture = ContextFixture::new();
    let mut machine = behaviour();
    machine.start(&mut fixture.context()).expect("start");
    machine
        .switch_state(TestState::Walk, &mut fixture.context())
        .expect("switch");
    machine.host.journal.clear();

    let contact = CollisionContact {
        enemy: Entity::from_raw(1),
        other: Entity::from_raw(2),
        target: Some(TargetId(4)),
        started: true,
    };
    machine
        .route_collision(&contact, &mut fixture.context())
        .expect("routed");
    // Только Walk видит контакт, его запрос применяется сразу после hook'а
    assert_eq!(
        machine.host.journal,
        vec!["contact Walk Some(TargetId(4)) true", "exit Walk", "enter Run"]
    );
    assert_eq!(machine.current_state(), Some(TestState::Run));

    machine.host.journal.clear();
    let ended = CollisionContact { started: false, ..contact };
    machine
        .route_collision(&ended, &mut fixture.context())
        .expect("routed");
    assert_eq!(machine.host.journal, vec!["contact Run Some(TargetId(4)) false"]);
}
