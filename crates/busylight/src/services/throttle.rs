use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

struct Gate {
    cooldown: Duration,
    last_trigger: Option<Instant>,
}

/// Per-kind cooldown gate: lets a notification kind through at most once
/// per cooldown. Kinds without a configured cooldown always pass.
pub struct Throttle<K> {
    gates: Mutex<HashMap<K, Gate>>,
}

impl<K> Throttle<K>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new(cooldowns: impl IntoIterator<Item = (K, Duration)>) -> Self {
        let gates = cooldowns
            .into_iter()
            .map(|(kind, cooldown)| {
                (
                    kind,
                    Gate {
                        cooldown,
                        last_trigger: None,
                    },
                )
            })
            .collect();

        Self {
            gates: Mutex::new(gates),
        }
    }

    /// Check and record in one step. Returns true if `kind` never fired or
    /// its cooldown has elapsed since it last did.
    pub fn allow(&self, kind: K) -> bool {
        let mut gates = self.lock();
        let Some(gate) = gates.get_mut(&kind) else {
            return true;
        };

        let now = Instant::now();
        match gate.last_trigger {
            Some(last) if now.duration_since(last) < gate.cooldown => {
                tracing::trace!("{:?} throttled", kind);
                false
            }
            _ => {
                gate.last_trigger = Some(now);
                true
            }
        }
    }

    /// Forget the last trigger so the next `allow` passes immediately.
    pub fn reset(&self, kind: K) {
        if let Some(gate) = self.lock().get_mut(&kind) {
            gate.last_trigger = None;
        }
    }

    pub fn reset_all(&self) {
        for gate in self.lock().values_mut() {
            gate.last_trigger = None;
        }
    }

    /// Time until `kind` would be allowed again.
    pub fn remaining(&self, kind: K) -> Duration {
        let gates = self.lock();
        match gates.get(&kind) {
            Some(Gate {
                cooldown,
                last_trigger: Some(last),
            }) => cooldown.saturating_sub(last.elapsed()),
            _ => Duration::ZERO,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Gate>> {
        self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
