use flowbal_types::HostAddress;
use serde::Serialize;

/// Consecutive capped cycles after which the capped host sits a cycle out.
pub const DEFAULT_COOLDOWN_THRESHOLD: u32 = 3;

/// Hysteresis on repeated capping of the same host.
///
/// Each cycle that caps the same host extends its streak. Once the streak
/// exceeds the threshold the host is left out of the next candidate set and
/// the streak drops by one, so the release is gradual: the host comes back
/// the cycle after, and is excluded again only if it is capped again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CooldownTracker {
    last_capped: Option<HostAddress>,
    streak: u32,
    threshold: u32,
}

impl CooldownTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            last_capped: None,
            streak: 0,
            threshold,
        }
    }

    pub fn last_capped(&self) -> Option<&HostAddress> {
        self.last_capped.as_ref()
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Host to leave out of this cycle, if its streak is past the threshold.
    ///
    /// Consumes one step of the streak when it returns a host.
    pub fn take_exclusion(&mut self) -> Option<HostAddress> {
        let host = self.last_capped.as_ref()?;
        if self.streak > self.threshold {
            self.streak -= 1;
            Some(host.clone())
        } else {
            None
        }
    }

    /// Forget the streak when the last capped host fell out of the top set on its own.
    pub fn observe_selection<'a>(
        &mut self,
        selected: impl IntoIterator<Item = &'a HostAddress>,
        excluded: Option<&HostAddress>,
    ) {
        let Some(host) = self.last_capped.as_ref() else {
            return;
        };
        if excluded == Some(host) {
            return;
        }
        if !selected.into_iter().any(|h| h == host) {
            tracing::debug!(host = %host, streak = self.streak, "capped host left the top set, cooldown reset");
            self.reset();
        }
    }

    /// Record the host capped this cycle, if any.
    pub fn record_cap(&mut self, capped: Option<&HostAddress>) {
        let Some(host) = capped else {
            return;
        };
        match &self.last_capped {
            Some(prev) if prev == host => self.streak += 1,
            _ => {
                self.last_capped = Some(host.clone());
                self.streak = 1;
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_capped = None;
        self.streak = 0;
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_THRESHOLD)
    }
}
