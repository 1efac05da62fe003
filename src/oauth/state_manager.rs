//! OAuth state management for CSRF protection.
//!
//! Each authorization URL carries a fresh state token; the callback must
//! present it back, for the same integration, before it expires. Tokens are
//! single use.

use crate::integration::Integration;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Issued state (tracks the integration the authorization was started for)
#[derive(Clone, Debug)]
pub struct StateEntry {
    pub integration: Integration,
    pub created_at: DateTime<Utc>,
}

/// In-memory state store with expiration
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<HashMap<String, StateEntry>>>,
    expiry_duration: Duration,
}

impl StateManager {
    /// Create a new state manager
    ///
    /// # Arguments
    /// * `expiry_seconds` - How long states remain valid (default: 600 = 10 minutes),
    ///   clamped to between one second and one day
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            expiry_duration: Duration::seconds(expiry_seconds.clamp(1, 86_400)),
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, StateEntry>> {
        // The map holds no invariants a panicking holder could break
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Generate a new state token (UUID v4) for `integration` and store it.
    ///
    /// Expired entries are pruned on the way in.
    pub fn create_state(&self, integration: Integration) -> String {
        let now = Utc::now();
        let state = Uuid::new_v4().to_string();

        let mut states = self.states();
        states.retain(|_, entry| now - entry.created_at <= self.expiry_duration);
        states.insert(
            state.clone(),
            StateEntry {
                integration,
                created_at: now,
            },
        );

        state
    }

    /// Validate and consume a state token
    ///
    /// Returns the entry if it exists and has not expired. The state is
    /// removed either way.
    pub fn validate_and_consume(&self, state: &str) -> Option<StateEntry> {
        self.validate_and_consume_at(state, Utc::now())
    }

    fn validate_and_consume_at(&self, state: &str, now: DateTime<Utc>) -> Option<StateEntry> {
        let entry = self.states().remove(state)?;

        if now - entry.created_at > self.expiry_duration {
            return None;
        }

        Some(entry)
    }

    /// Whether an unexpired state is outstanding for `integration`.
    pub fn has_pending(&self, integration: Integration) -> bool {
        let now = Utc::now();
        self.states().values().any(|entry| {
            entry.integration == integration && now - entry.created_at <= self.expiry_duration
        })
    }

    /// Number of stored states, expired or not
    pub fn count(&self) -> usize {
        self.states().len()
    }
}
