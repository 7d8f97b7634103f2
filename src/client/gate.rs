//! Operation gate.
//!
//! Admits at most one outstanding read or subscription change per client and
//! owns the continuations registered for them. Every stored continuation is
//! handed back exactly once: by the matching completion, by a submission
//! rollback, or by [`Gate::reset`].

use tracing::trace;

use super::{CurrentTimeCallback, LocalTimeCallback, NotifyCallback, SubscriptionCallback};
use crate::error::{Error, Result};

/// Characteristic targeted by a pending read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadTarget {
    /// Current Time characteristic.
    CurrentTime,
    /// Local Time Information characteristic.
    LocalTime,
}

/// Direction of a pending CCCD write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionChange {
    /// Enabling notifications.
    Enable,
    /// Disabling notifications.
    Disable,
}

/// Request/response state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperationState {
    /// Nothing outstanding.
    #[default]
    Idle,
    /// A characteristic read is outstanding.
    ReadPending(ReadTarget),
    /// A CCCD write is outstanding.
    SubscribeTransitionPending(SubscriptionChange),
}

impl OperationState {
    /// Check if no operation is outstanding.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::ReadPending(target) => write!(f, "ReadPending({:?})", target),
            Self::SubscribeTransitionPending(change) => {
                write!(f, "SubscribeTransitionPending({:?})", change)
            }
        }
    }
}

/// Continuation of an outstanding read.
pub(crate) enum PendingRead {
    CurrentTime(CurrentTimeCallback),
    LocalTime(LocalTimeCallback),
}

impl PendingRead {
    pub(crate) fn target(&self) -> ReadTarget {
        match self {
            Self::CurrentTime(_) => ReadTarget::CurrentTime,
            Self::LocalTime(_) => ReadTarget::LocalTime,
        }
    }
}

/// Continuations of an outstanding subscription change.
pub(crate) struct PendingTransition {
    pub(crate) change: SubscriptionChange,
    /// Notification callback armed when an enable succeeds.
    pub(crate) notify: Option<NotifyCallback>,
    pub(crate) confirm: Option<SubscriptionCallback>,
}

/// Continuations released by [`Gate::reset`].
#[derive(Default)]
pub(crate) struct Drained {
    pub(crate) read: Option<PendingRead>,
    pub(crate) transition: Option<PendingTransition>,
}

pub(crate) struct Gate {
    state: OperationState,
    notifications_active: bool,
    /// Identifier of the outstanding operation; completions carrying any other id are stale.
    current_op: u64,
    next_op: u64,
    read: Option<PendingRead>,
    transition: Option<PendingTransition>,
    notify: Option<NotifyCallback>,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            state: OperationState::Idle,
            notifications_active: false,
            current_op: 0,
            next_op: 1,
            read: None,
            transition: None,
            notify: None,
        }
    }

    pub(crate) fn state(&self) -> OperationState {
        self.state
    }

    pub(crate) fn notifications_active(&self) -> bool {
        self.notifications_active
    }

    fn admit(&mut self, next: OperationState) -> Result<u64> {
        if !self.state.is_idle() {
            trace!("Rejecting {} while {}", next, self.state);
            return Err(Error::Busy);
        }

        let op = self.next_op;
        self.next_op = self.next_op.wrapping_add(1);
        self.current_op = op;
        self.state = next;
        Ok(op)
    }

    fn settle(&mut self) {
        self.state = OperationState::Idle;
        self.current_op = 0;
    }

    /// Admit a read, storing its continuation.
    pub(crate) fn begin_read(&mut self, pending: PendingRead) -> Result<u64> {
        let op = self.admit(OperationState::ReadPending(pending.target()))?;
        self.read = Some(pending);
        Ok(op)
    }

    /// Take the continuation of read `op`, returning the gate to idle.
    ///
    /// Returns `None` if `op` is no longer outstanding.
    pub(crate) fn finish_read(&mut self, op: u64) -> Option<PendingRead> {
        if op != self.current_op || !matches!(self.state, OperationState::ReadPending(_)) {
            return None;
        }
        self.settle();
        self.read.take()
    }

    /// Admit a subscription change, storing its continuations.
    pub(crate) fn begin_transition(&mut self, pending: PendingTransition) -> Result<u64> {
        if !self.state.is_idle() {
            return Err(Error::Busy);
        }

        match (pending.change, self.notifications_active) {
            (SubscriptionChange::Enable, true) => return Err(Error::AlreadySubscribed),
            (SubscriptionChange::Disable, false) => return Err(Error::NotSubscribed),
            _ => {}
        }

        let op = self.admit(OperationState::SubscribeTransitionPending(pending.change))?;
        self.transition = Some(pending);
        Ok(op)
    }

    /// Complete subscription change `op`.
    ///
    /// On success the notification flag follows the requested direction and
    /// the notification callback is armed or released; on failure both are
    /// left untouched.
    pub(crate) fn finish_transition(&mut self, op: u64, success: bool) -> Option<PendingTransition> {
        if op != self.current_op
            || !matches!(self.state, OperationState::SubscribeTransitionPending(_))
        {
            return None;
        }
        self.settle();

        let mut pending = self.transition.take()?;
        if success {
            match pending.change {
                SubscriptionChange::Enable => {
                    self.notifications_active = true;
                    self.notify = pending.notify.take();
                }
                SubscriptionChange::Disable => {
                    self.notifications_active = false;
                    self.notify = None;
                }
            }
        }
        Some(pending)
    }

    /// Callback to deliver a notification to, if notifications may be delivered now.
    ///
    /// Nothing is delivered while notifications are inactive or being disabled.
    pub(crate) fn notification_target(&self) -> Option<NotifyCallback> {
        if !self.notifications_active
            || self.state
                == OperationState::SubscribeTransitionPending(SubscriptionChange::Disable)
        {
            return None;
        }
        self.notify.clone()
    }

    /// Force the gate back to its initial state, releasing every stored continuation.
    pub(crate) fn reset(&mut self) -> Drained {
        self.settle();
        self.notifications_active = false;
        self.notify = None;

        Drained {
            read: self.read.take(),
            transition: self.transition.take(),
        }
    }
}
