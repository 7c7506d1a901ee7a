//! Component-related data types.
//!
//! This module defines the component lifecycle state machine and the
//! metadata record kept for each deployed component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::ComponentId;

/// Component state in the lifecycle.
///
/// A component moves strictly forward through these states. `Stopped` is
/// terminal; a stopped component is never restarted, it is undeployed and
/// a new component is deployed in its place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentState {
    /// Deployed but not yet started; instance creation blocks.
    NotStarted,

    /// Started; instance creation proceeds.
    Started,

    /// Stop has been requested; instance creation fails fast, in-flight
    /// instances are still being destroyed.
    Stopping,

    /// All instances are destroyed; terminal state.
    Stopped,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "NotStarted"),
            Self::Started => write!(f, "Started"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

impl ComponentState {
    /// Check if the component is available for new instances right now.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Started)
    }

    /// Check if an instance-creation request may still succeed, possibly
    /// after waiting on the start gate.
    pub fn accepts_instances(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Started)
    }

    /// Check if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Get the valid next states from this state.
    pub fn valid_next_states(&self) -> Vec<ComponentState> {
        match self {
            Self::NotStarted => vec![Self::Started, Self::Stopping, Self::Stopped],
            Self::Started => vec![Self::Stopping, Self::Stopped],
            Self::Stopping => vec![Self::Stopped],
            Self::Stopped => vec![],
        }
    }

    /// Check if a transition to the given state is valid.
    pub fn can_transition_to(&self, next: ComponentState) -> bool {
        self.valid_next_states().contains(&next)
    }
}

/// Metadata kept for a deployed component.
///
/// This record is owned by the registry; the runtime's own state machine
/// is authoritative and the `state` here follows it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentMetadata {
    /// Component ID.
    pub id: ComponentId,

    /// Deployment-unique component name.
    pub name: String,

    /// Description of the component.
    pub description: String,

    /// Current lifecycle state.
    pub state: ComponentState,

    /// Declared operation names.
    pub operations: Vec<String>,

    /// Declared view names.
    pub views: Vec<String>,

    /// When the component was deployed.
    pub created_at: DateTime<Utc>,

    /// When the component was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ComponentMetadata {
    /// Create new component metadata with a unique ID and initial state.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ComponentId::new(),
            name: name.into(),
            description: description.into(),
            state: ComponentState::NotStarted,
            operations: Vec::new(),
            views: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the component state.
    ///
    /// Returns `true` if the state was updated, `false` if the transition
    /// is invalid (the state is left unchanged).
    pub fn update_state(&mut self, state: ComponentState) -> bool {
        if self.state == state {
            return true;
        }
        if self.state.can_transition_to(state) {
            self.state = state;
            self.updated_at = Utc::now();
            true
        } else {
            false
        }
    }

    /// Set the list of declared operation names.
    pub fn set_operations(&mut self, operations: Vec<String>) {
        self.operations = operations;
        self.updated_at = Utc::now();
    }

    /// Set the list of declared view names.
    pub fn set_views(&mut self, views: Vec<String>) {
        self.views = views;
        self.updated_at = Utc::now();
    }
}
