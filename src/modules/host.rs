use log::{info, warn};

/// # Notifier
/// user facing messages, `alert` is for failures the user must act on
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
    fn alert(&self, message: &str);
}

/// # SystemVerification
/// integrity attestation required by qualifier events
pub trait SystemVerification: Send + Sync {
    fn integrity_check(&self) -> bool;
    /// named checks that must all pass before qualifier data is imported or pushed
    fn system_status(&self) -> Vec<(String, bool)>;
    /// hand the results of a qualifier race to the attestation service
    fn capture_race_results(&self, race_id: &str) -> bool;
}

/// notifier that only writes to the log, used by the binaries
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!(target: "notifier:notify", "{}", message);
    }

    fn alert(&self, message: &str) {
        warn!(target: "notifier:alert", "{}", message);
    }
}

/// verification for hosts without an attestation service. qualifier
/// events are refused on such hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnverifiedSystem;

impl SystemVerification for UnverifiedSystem {
    fn integrity_check(&self) -> bool {
        false
    }

    fn system_status(&self) -> Vec<(String, bool)> {
        vec![("Attestation service unavailable".to_string(), false)]
    }

    fn capture_race_results(&self, _race_id: &str) -> bool {
        false
    }
}

/// # failed status check
/// the name of the first system status check that did not pass
pub fn failed_status_check(verification: &dyn SystemVerification) -> Option<String> {
    verification
        .system_status()
        .into_iter()
        .find(|(_, passed)| !passed)
        .map(|(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unverified_system_fails_its_status_check() {
        assert_eq!(
            failed_status_check(&UnverifiedSystem),
            Some("Attestation service unavailable".to_string())
        );
        assert!(!UnverifiedSystem.integrity_check());
    }
}
