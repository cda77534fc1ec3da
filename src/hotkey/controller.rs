//! Event tap lifecycle and supervision
//!
//! The controller is the only owner of the event tap. It creates the tap
//! when the Accessibility permission allows it, tears it down when the
//! permission disappears, and rebuilds it when the system silently
//! disables it (after sleep/wake or secure input, for example).

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::events::MonitorEvent;
use crate::permission::PermissionProbe;

use super::router::KeyRouter;

/// How often the supervisor re-checks permission and tap health
pub const SUPERVISE_INTERVAL: Duration = Duration::from_secs(2);

/// Errors raised while installing the event tap
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("the system refused to create the event tap")]
    Create,

    #[error("failed to create a run loop source for the event tap")]
    RunLoopSource,
}

/// Platform facility that installs the keyboard event tap
///
/// `install` creates the tap for key-down, key-up and flags-changed
/// events, registers it with the current thread's run loop and enables
/// it. `remove` undoes all of that.
pub trait HookBackend {
    type Hook;

    fn install(&mut self, router: Rc<RefCell<KeyRouter>>) -> Result<Self::Hook, HookError>;

    fn is_enabled(&self, hook: &Self::Hook) -> bool;

    fn remove(&mut self, hook: Self::Hook);
}

/// Monitoring state, re-evaluated on every supervisory tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringHealth {
    /// An enabled event tap is installed
    pub is_active: bool,
    /// Permission state seen by the last check
    pub last_permission_granted: bool,
}

/// Owner of the event tap
pub struct EventTapController<P: PermissionProbe, B: HookBackend> {
    permission: P,
    backend: B,
    router: Rc<RefCell<KeyRouter>>,
    hook: Option<B::Hook>,
    health: MonitoringHealth,
    event_tx: broadcast::Sender<MonitorEvent>,
}

impl<P: PermissionProbe, B: HookBackend> EventTapController<P, B> {
    pub fn new(
        permission: P,
        backend: B,
        router: KeyRouter,
        event_tx: broadcast::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            permission,
            backend,
            router: Rc::new(RefCell::new(router)),
            hook: None,
            health: MonitoringHealth::default(),
            event_tx,
        }
    }

    pub fn health(&self) -> MonitoringHealth {
        self.health
    }

    pub fn router(&self) -> &Rc<RefCell<KeyRouter>> {
        &self.router
    }

    /// Install the tap if permission allows; returns whether it is active
    pub fn start(&mut self) -> bool {
        if self.hook.is_some() {
            info!("removing existing event tap before reinstalling");
            self.stop();
        }

        let granted = self.permission.is_granted();
        self.record_permission(granted);
        if !granted {
            warn!("accessibility permission not granted, event tap not installed");
            self.health.is_active = false;
            return false;
        }

        match self.backend.install(Rc::clone(&self.router)) {
            Ok(hook) => {
                self.hook = Some(hook);
                self.health.is_active = true;
                info!("event tap installed and enabled");
                let _ = self.event_tx.send(MonitorEvent::MonitoringStarted);
                true
            }
            Err(e) => {
                error!(error = %e, "failed to install event tap, will retry");
                self.health.is_active = false;
                let _ = self.event_tx.send(MonitorEvent::HookCreationFailed {
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    /// Remove the tap; safe to call when already stopped
    pub fn stop(&mut self) {
        let was_active = self.health.is_active;
        if let Some(hook) = self.hook.take() {
            self.backend.remove(hook);
        }
        self.health.is_active = false;

        if was_active {
            info!("event tap removed");
            let _ = self.event_tx.send(MonitorEvent::MonitoringStopped);
        }
    }

    /// Reconcile the tap with the current permission and tap state
    pub fn supervise(&mut self) {
        let granted = self.permission.is_granted();
        self.record_permission(granted);

        match (granted, self.health.is_active) {
            (true, false) => {
                info!("accessibility permission available, installing event tap");
                self.start();
            }
            (false, true) => {
                warn!("accessibility permission revoked, removing event tap");
                self.stop();
            }
            (true, true) => {
                let enabled = self
                    .hook
                    .as_ref()
                    .is_some_and(|hook| self.backend.is_enabled(hook));
                if !enabled {
                    warn!("event tap was disabled by the system, rebuilding");
                    let _ = self.event_tx.send(MonitorEvent::HookInvalidated);
                    self.start();
                }
            }
            (false, false) => {}
        }
    }

    /// Re-read permission without touching the tap
    pub fn refresh_permission(&mut self) {
        let granted = self.permission.is_granted();
        self.record_permission(granted);
    }

    /// Operator-triggered rebuild
    pub fn reinitialize(&mut self) -> bool {
        info!("reinitializing event tap");
        self.stop();
        self.start()
    }

    /// Check permission, optionally showing the system prompt
    pub fn check_permission(&mut self, prompt: bool) -> bool {
        let granted = if prompt {
            self.permission.request()
        } else {
            self.permission.is_granted()
        };
        self.record_permission(granted);
        info!(granted, "accessibility permission checked");
        granted
    }

    fn record_permission(&mut self, granted: bool) {
        if granted != self.health.last_permission_granted {
            self.health.last_permission_granted = granted;
            let _ = self.event_tx.send(MonitorEvent::PermissionChanged { granted });
        }
    }
}

impl<P: PermissionProbe, B: HookBackend> Drop for EventTapController<P, B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::cell::Cell;

    use super::*;

    /// Permission switch shared with the test body
    #[derive(Clone, Default)]
    pub struct FakePermission {
        pub granted: Rc<Cell<bool>>,
        pub prompts: Rc<Cell<u32>>,
    }

    impl PermissionProbe for FakePermission {
        fn is_granted(&self) -> bool {
            self.granted.get()
        }

        fn request(&self) -> bool {
            self.prompts.set(self.prompts.get() + 1);
            self.granted.get()
        }
    }

    pub struct FakeHook {
        pub enabled: Rc<Cell<bool>>,
    }

    /// Records installs and removals; `fail` makes installs fail
    #[derive(Clone, Default)]
    pub struct FakeBackend {
        pub installs: Rc<Cell<u32>>,
        pub removals: Rc<Cell<u32>>,
        pub fail: Rc<Cell<bool>>,
        /// Enabled flag of the most recently installed hook
        pub last_enabled: Rc<RefCell<Option<Rc<Cell<bool>>>>>,
    }

    impl HookBackend for FakeBackend {
        type Hook = FakeHook;

        fn install(&mut self, _router: Rc<RefCell<KeyRouter>>) -> Result<FakeHook, HookError> {
            if self.fail.get() {
                return Err(HookError::Create);
            }
            self.installs.set(self.installs.get() + 1);
            let enabled = Rc::new(Cell::new(true));
            *self.last_enabled.borrow_mut() = Some(Rc::clone(&enabled));
            Ok(FakeHook { enabled })
        }

        fn is_enabled(&self, hook: &FakeHook) -> bool {
            hook.enabled.get()
        }

        fn remove(&mut self, hook: FakeHook) {
            hook.enabled.set(false);
            self.removals.set(self.removals.get() + 1);
        }
    }

    impl FakeBackend {
        /// Simulate the system disabling the live tap
        pub fn invalidate(&self) {
            if let Some(enabled) = self.last_enabled.borrow().as_ref() {
                enabled.set(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::fakes::{FakeBackend, FakePermission};
    use super::*;

    type TestController = EventTapController<FakePermission, FakeBackend>;

    fn controller(
        granted: bool,
    ) -> (TestController, FakePermission, FakeBackend, broadcast::Receiver<MonitorEvent>) {
        let permission = FakePermission::default();
        permission.granted.set(granted);
        let backend = FakeBackend::default();
        let (tap_tx, _tap_rx) = mpsc::channel(4);
        let (event_tx, event_rx) = broadcast::channel(32);
        let router = KeyRouter::new(tap_tx, event_tx.clone());
        let controller =
            EventTapController::new(permission.clone(), backend.clone(), router, event_tx);
        (controller, permission, backend, event_rx)
    }

    fn drain(rx: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_start_without_permission_is_not_an_error() {
        let (mut controller, _, backend, _) = controller(false);
        assert!(!controller.start());
        assert_eq!(controller.health(), MonitoringHealth::default());
        assert_eq!(backend.installs.get(), 0);
    }

    #[test]
    fn test_start_with_permission() {
        let (mut controller, _, backend, mut events) = controller(true);
        assert!(controller.start());
        assert!(controller.health().is_active);
        assert!(controller.health().last_permission_granted);
        assert_eq!(backend.installs.get(), 1);
        assert_eq!(
            drain(&mut events),
            vec![
                MonitorEvent::PermissionChanged { granted: true },
                MonitorEvent::MonitoringStarted
            ]
        );
    }

    #[test]
    fn test_start_replaces_existing_hook() {
        let (mut controller, _, backend, _) = controller(true);
        controller.start();
        controller.start();
        assert_eq!(backend.installs.get(), 2);
        assert_eq!(backend.removals.get(), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut controller, _, backend, _) = controller(true);
        controller.start();
        controller.stop();
        controller.stop();
        assert!(!controller.health().is_active);
        assert_eq!(backend.removals.get(), 1);
    }

    #[test]
    fn test_supervise_activates_after_grant() {
        let (mut controller, permission, backend, _) = controller(false);
        controller.start();
        controller.supervise();
        assert!(!controller.health().is_active);

        permission.granted.set(true);
        controller.supervise();
        assert!(controller.health().is_active);
        assert_eq!(backend.installs.get(), 1);
    }

    #[test]
    fn test_supervise_stops_after_revocation() {
        let (mut controller, permission, backend, mut events) = controller(true);
        controller.start();
        drain(&mut events);

        permission.granted.set(false);
        controller.supervise();
        assert!(!controller.health().is_active);
        assert!(!controller.health().last_permission_granted);
        assert_eq!(backend.removals.get(), 1);
        assert_eq!(
            drain(&mut events),
            vec![
                MonitorEvent::PermissionChanged { granted: false },
                MonitorEvent::MonitoringStopped
            ]
        );
    }

    #[test]
    fn test_supervise_rebuilds_invalidated_hook() {
        let (mut controller, _, backend, mut events) = controller(true);
        controller.start();
        drain(&mut events);

        controller.supervise();
        assert_eq!(backend.installs.get(), 1);

        backend.invalidate();
        controller.supervise();
        assert!(controller.health().is_active);
        assert_eq!(backend.installs.get(), 2);
        assert_eq!(drain(&mut events)[0], MonitorEvent::HookInvalidated);
    }

    #[test]
    fn test_creation_failure_retried_on_tick() {
        let (mut controller, _, backend, mut events) = controller(true);
        backend.fail.set(true);
        assert!(!controller.start());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, MonitorEvent::HookCreationFailed { .. })));

        controller.supervise();
        assert!(!controller.health().is_active);

        backend.fail.set(false);
        controller.supervise();
        assert!(controller.health().is_active);
    }

    #[test]
    fn test_refresh_permission_leaves_tap_alone() {
        let (mut controller, permission, backend, mut events) = controller(false);
        controller.start();
        drain(&mut events);

        permission.granted.set(true);
        controller.refresh_permission();
        assert_eq!(
            controller.health(),
            MonitoringHealth { is_active: false, last_permission_granted: true }
        );
        assert_eq!(backend.installs.get(), 0);
        assert_eq!(drain(&mut events), vec![MonitorEvent::PermissionChanged { granted: true }]);
    }

    #[test]
    fn test_reinitialize() {
        let (mut controller, _, backend, _) = controller(true);
        controller.start();
        assert!(controller.reinitialize());
        assert_eq!(backend.installs.get(), 2);
        assert_eq!(backend.removals.get(), 1);
    }

    #[test]
    fn test_check_permission_prompt() {
        let (mut controller, permission, _, _) = controller(false);
        assert!(!controller.check_permission(true));
        assert_eq!(permission.prompts.get(), 1);
        assert!(!controller.check_permission(false));
        assert_eq!(permission.prompts.get(), 1);
    }

    #[test]
    fn test_drop_removes_hook() {
        let (mut controller, _, backend, _) = controller(true);
        controller.start();
        drop(controller);
        assert_eq!(backend.removals.get(), 1);
    }
}
