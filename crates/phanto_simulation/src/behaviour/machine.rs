//! Generic enemy state machine
//!
//! `EnemyBehaviour<H>` = host core (данные врага + `StateMachine`) + таблица
//! состояний. State hooks получают `&mut H` и могут вызвать
//! `host.switch_state(id)`: запрос откладывается и применяется сразу после
//! возврата hook'а (цепочка ограничена `MAX_TRANSITION_CHAIN`).
//!
//! Запрос перехода из `exit` отклоняется (error log + `SwitchDuringExit`).
//! Guard per-instance: выход одного врага не блокирует переходы других.

use crate::behaviour::context::BehaviourContext;
use crate::behaviour::events::{CollisionContact, EnemyDamaged, ProximityEvent};
use crate::error::BehaviourError;
use crate::logger;
use bevy::prelude::*;
use std::fmt::Debug;

/// Максимум отложенных переходов подряд после одного hook'а
pub const MAX_TRANSITION_CHAIN: usize = 8;

/// Идентификатор состояния (обычно fieldless enum)
pub trait StateKey: Copy + Eq + Debug + Send + Sync + 'static {}

impl<T: Copy + Eq + Debug + Send + Sync + 'static> StateKey for T {}

/// Текущее состояние + отложенный переход + exit guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine<S: StateKey> {
    current: Option<S>,
    pending: Option<S>,
    exiting: bool,
    transitions: u64,
}

impl<S: StateKey> Default for StateMachine<S> {
    fn default() -> Self {
        Self {
            current: None,
            pending: None,
            exiting: false,
            transitions: 0,
        }
    }
}

impl<S: StateKey> StateMachine<S> {
    pub fn current(&self) -> Option<S> {
        self.current
    }

    pub fn pending(&self) -> Option<S> {
        self.pending
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    /// Сколько переходов выполнено (enter'ов, включая стартовый)
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Запросить переход (применится после текущего hook'а)
    pub fn request(&mut self, id: S) -> Result<(), BehaviourError> {
        if self.exiting {
            let error = BehaviourError::SwitchDuringExit {
                current: format!("{:?}", self.current),
                requested: format!("{:?}", id),
            };
            logger::log_error(&format!("❌ SwitchState rejected: {}", error));
            return Err(error);
        }
        self.pending = Some(id);
        Ok(())
    }
}

/// Capability set хоста для состояний
pub trait BehaviourHost: Send + Sync + Sized + 'static {
    type StateId: StateKey;

    fn machine(&self) -> &StateMachine<Self::StateId>;

    fn machine_mut(&mut self) -> &mut StateMachine<Self::StateId>;

    fn switch_state(&mut self, id: Self::StateId) -> Result<(), BehaviourError> {
        self.machine_mut().request(id)
    }

    fn current_state(&self) -> Option<Self::StateId> {
        self.machine().current()
    }

    /// Урон: хост сам решает, нужен ли переход (через `switch_state`)
    fn on_damaged(&mut self, _damage: &EnemyDamaged, _ctx: &mut BehaviourContext) {}
}

/// Одно состояние врага. Инстанс переиспользуется между активациями:
/// `exit` обязан сбросить per-activation поля.
pub trait EnemyState<H: BehaviourHost>: Send + Sync {
    fn id(&self) -> H::StateId;

    fn enter(&mut self, _host: &mut H, _ctx: &mut BehaviourContext) {}

    fn update(&mut self, _host: &mut H, _ctx: &mut BehaviourContext) {}

    fn exit(&mut self, _host: &mut H, _ctx: &mut BehaviourContext) {}

    fn on_collision(&mut self, _host: &mut H, _ctx: &mut BehaviourContext, _contact: &CollisionContact) {}

    fn on_proximity(&mut self, _host: &mut H, _ctx: &mut BehaviourContext, _event: &ProximityEvent) {}
}

/// Component: host core + состояния
#[derive(Component)]
pub struct EnemyBehaviour<H: BehaviourHost> {
    pub host: H,
    states: Vec<Box<dyn EnemyState<H>>>,
    initial: H::StateId,
}

impl<H: BehaviourHost> EnemyBehaviour<H> {
    pub fn new(host: H, states: Vec<Box<dyn EnemyState<H>>>, initial: H::StateId) -> Self {
        Self {
            host,
            states,
            initial,
        }
    }

    pub fn current_state(&self) -> Option<H::StateId> {
        self.host.current_state()
    }

    pub fn is_started(&self) -> bool {
        self.host.current_state().is_some()
    }

    pub fn state_ids(&self) -> impl Iterator<Item = H::StateId> + '_ {
        self.states.iter().map(|s| s.id())
    }

    fn index_of(&self, id: H::StateId) -> Result<usize, BehaviourError> {
        self.states
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| BehaviourError::UnknownState(format!("{:?}", id)))
    }

    /// Войти в начальное состояние (повторный вызов — no-op)
    pub fn start(&mut self, ctx: &mut BehaviourContext) -> Result<(), BehaviourError> {
        if self.is_started() {
            return Ok(());
        }
        self.transition(self.initial, ctx)?;
        self.drain_pending(ctx)
    }

    /// Немедленный переход извне (системы, тесты)
    ///
    /// Переход в текущее состояние — no-op (ни exit, ни enter).
    pub fn switch_state(&mut self, id: H::StateId, ctx: &mut BehaviourContext) -> Result<(), BehaviourError> {
        if self.host.machine().is_exiting() {
            return self.host.switch_state(id);
        }
        self.transition(id, ctx)?;
        self.drain_pending(ctx)
    }

    /// exit(current) → enter(next). Возвращает false для no-op.
    fn transition(&mut self, id: H::StateId, ctx: &mut BehaviourContext) -> Result<bool, BehaviourError> {
        if self.host.current_state() == Some(id) {
            return Ok(false);
        }
        let next = self.index_of(id)?;

        if let Some(current) = self.host.current_state() {
            let index = self.index_of(current)?;
            self.host.machine_mut().exiting = true;
            self.states[index].exit(&mut self.host, ctx);
            self.host.machine_mut().exiting = false;
        }

        let machine = self.host.machine_mut();
        machine.current = Some(id);
        machine.transitions += 1;
        self.states[next].enter(&mut self.host, ctx);
        Ok(true)
    }

    fn drain_pending(&mut self, ctx: &mut BehaviourContext) -> Result<(), BehaviourError> {
        for _ in 0..MAX_TRANSITION_CHAIN {
            let Some(id) = self.host.machine_mut().pending.take() else {
                return Ok(());
            };
            self.transition(id, ctx)?;
        }

        match self.host.machine_mut().pending.take() {
            Some(dropped) => {
                logger::log_error(&format!(
                    "❌ {:?}: transition chain exceeded {} switches, dropping {:?}",
                    ctx.entity, MAX_TRANSITION_CHAIN, dropped
                ));
                Err(BehaviourError::TransitionLoop(MAX_TRANSITION_CHAIN))
            }
            None => Ok(()),
        }
    }

    fn current_index(&self) -> Option<usize> {
        let current = self.host.current_state()?;
        self.index_of(current).ok()
    }

    /// Один fixed step: update текущего состояния (первый вызов — start)
    pub fn update(&mut self, ctx: &mut BehaviourContext) -> Result<(), BehaviourError> {
        self.start(ctx)?;
        let Some(index) = self.current_index() else {
            return Ok(());
        };
        self.states[index].update(&mut self.host, ctx);
        self.drain_pending(ctx)
    }

    pub fn route_collision(&mut self, contact: &CollisionContact, ctx: &mut BehaviourContext) -> Result<(), BehaviourError> {
        let Some(index) = self.current_index() else {
            return Ok(());
        };
        self.states[index].on_collision(&mut self.host, ctx, contact);
        self.drain_pending(ctx)
    }

    pub fn route_proximity(&mut self, event: &ProximityEvent, ctx: &mut BehaviourContext) -> Result<(), BehaviourError> {
        let Some(index) = self.current_index() else {
            return Ok(());
        };
        self.states[index].on_proximity(&mut self.host, ctx, event);
        self.drain_pending(ctx)
    }

    pub fn apply_damage(&mut self, damage: &EnemyDamaged, ctx: &mut BehaviourContext) -> Result<(), BehaviourError> {
        self.host.on_damaged(damage, ctx);
        self.drain_pending(ctx)
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
