//! Side channel for failures of one-way calls.
//!
//! A one-way request is acknowledged with `202 Accepted` before its method
//! runs, so nothing it raises can reach the caller. Those faults go to an
//! [`ErrorTrap`] instead.
use std::{sync::Arc, thread};

use tracing::{error, info_span};

use crate::{fault::SoapException, version::SoapVersion};

/// A fault raised while serving a one-way call.
#[derive(Debug, Clone, PartialEq)]
pub struct TrappedFault {
    pub method: String,
    pub fault: SoapException,
}

pub trait ErrorTrap: Send + Sync {
    fn trap(&self, fault: TrappedFault);
}

/// Default trap: logs the fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorTrap;

impl ErrorTrap for LogErrorTrap {
    fn trap(&self, fault: TrappedFault) {
        error!(
            method = %fault.method,
            code = %fault.fault.code,
            message = %fault.fault.message,
            "One-way call failed after it was accepted"
        );
    }
}

impl ErrorTrap for crossbeam_channel::Sender<TrappedFault> {
    fn trap(&self, fault: TrappedFault) {
        if let Err(err) = self.send(fault) {
            // Nobody listens anymore; keep the fault visible in the log.
            LogErrorTrap.trap(err.into_inner());
        }
    }
}

/// Runs `work` on its own thread; a fault it returns goes to `trap`.
pub(crate) fn dispatch<F>(method: String, version: SoapVersion, trap: Arc<dyn ErrorTrap>, work: F)
where
    F: FnOnce() -> Result<(), SoapException> + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("one-way {method}"))
        .spawn({
            let method = method.clone();
            let trap = Arc::clone(&trap);
            move || {
                let _span = info_span!("one_way", method = %method).entered();
                if let Err(fault) = work() {
                    trap.trap(TrappedFault { method, fault });
                }
            }
        });

    if let Err(err) = spawned {
        let fault = SoapException::server(version, format!("could not start the one-way call: {err}"));
        trap.trap(TrappedFault { method, fault });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_dispatch_traps_the_fault() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        dispatch("Notify".to_owned(), SoapVersion::Soap11, Arc::new(sender), || {
            Err(SoapException::server(SoapVersion::Soap11, "boom"))
        });

        let trapped = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(trapped.method, "Notify");
        assert_eq!(trapped.fault.message, "boom");
    }

    #[test]
    fn test_successful_work_traps_nothing() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        dispatch("Notify".to_owned(), SoapVersion::Soap11, Arc::new(sender), || Ok(()));
        assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
