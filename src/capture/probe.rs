//! Startup backend selection.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use super::backend::{BackendKind, BackendProber, BackendSelection};
use super::freenect::{self, NativeDriverProber, SystemLibraryProber};
use super::v4l2::GenericCameraProber;
use crate::config::Config;
use crate::error::CaptureError;

/// What this machine can offer, determined once when the probe is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub native_binding_available: bool,
    pub system_library_path: Option<PathBuf>,
}

impl Capabilities {
    pub fn detect(config: &Config) -> Self {
        Self {
            native_binding_available: freenect::NATIVE_BINDING_AVAILABLE,
            system_library_path: freenect::discover_library(&config.kinect.library_paths),
        }
    }
}

/// Outcome of a single probe attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeAttempt {
    pub backend: BackendKind,
    pub outcome: Result<String, String>,
}

/// Tries backends in priority order and keeps the first that opens.
pub struct DeviceProbe {
    probers: Vec<Box<dyn BackendProber>>,
    capabilities: Capabilities,
    attempts: Vec<ProbeAttempt>,
}

impl DeviceProbe {
    /// The standard backend list, filtered by the Kinect/fallback switches.
    pub fn new(config: &Config) -> Self {
        let mut probers: Vec<Box<dyn BackendProber>> = Vec::new();
        if config.kinect.enabled {
            probers.push(Box::new(NativeDriverProber));
            probers.push(Box::new(SystemLibraryProber));
        }
        if config.kinect.fallback_to_generic {
            probers.push(Box::new(GenericCameraProber));
        }
        Self::with_probers(probers, Capabilities::detect(config))
    }

    /// Probe with an explicit backend list, tried in the given order.
    pub fn with_probers(probers: Vec<Box<dyn BackendProber>>, capabilities: Capabilities) -> Self {
        Self {
            probers,
            capabilities,
            attempts: Vec::new(),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Every attempt made by the last `probe` call, in order.
    pub fn attempts(&self) -> &[ProbeAttempt] {
        &self.attempts
    }

    /// Select the first backend that initialises. Failures are logged and
    /// turn into "try the next one"; if none opens the selection is `None`
    /// carrying the last diagnostic.
    pub fn probe(&mut self, config: &Config) -> BackendSelection {
        info!("Detecting camera devices...");
        self.attempts.clear();
        let mut last_error: Option<CaptureError> = None;

        for prober in &self.probers {
            let kind = prober.kind();
            match prober.open(config) {
                Ok(backend) => {
                    let detail = backend.describe();
                    info!("Camera detected using {}: {}", kind, detail);
                    self.attempts.push(ProbeAttempt {
                        backend: kind,
                        outcome: Ok(detail.clone()),
                    });
                    return BackendSelection::Active { backend, detail };
                }
                Err(e) => {
                    warn!("{} backend unavailable: {}", kind, e);
                    self.attempts.push(ProbeAttempt {
                        backend: kind,
                        outcome: Err(e.to_string()),
                    });
                    last_error = Some(e);
                }
            }
        }

        let diagnostic = match last_error {
            Some(e) => CaptureError::DeviceNotFound(e.to_string()).to_string(),
            None => CaptureError::DeviceNotFound("all capture backends disabled".into()).to_string(),
        };
        warn!("No camera device detected - serving status frames ({})", diagnostic);
        BackendSelection::None { diagnostic }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::backend::CaptureBackend;
    use crate::capture::frame::FramePair;
    use crate::error::Result;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct NullBackend(BackendKind);

    impl CaptureBackend for NullBackend {
        fn kind(&self) -> BackendKind {
            self.0
        }

        fn describe(&self) -> String {
            "null device".into()
        }

        fn pull_frame(&mut self, _budget: Duration) -> Result<FramePair> {
            Ok(FramePair::default())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct FakeProber {
        kind: BackendKind,
        succeeds: bool,
        log: Arc<Mutex<Vec<BackendKind>>>,
    }

    impl BackendProber for FakeProber {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn open(&self, _config: &Config) -> Result<Box<dyn CaptureBackend>> {
            self.log.lock().unwrap().push(self.kind);
            if self.succeeds {
                Ok(Box::new(NullBackend(self.kind)))
            } else {
                Err(CaptureError::init(self.kind, "stubbed failure"))
            }
        }
    }

    fn probe_with(successes: [bool; 3]) -> (DeviceProbe, Arc<Mutex<Vec<BackendKind>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let probers = BackendKind::PRIORITY
            .iter()
            .zip(successes)
            .map(|(kind, succeeds)| {
                Box::new(FakeProber {
                    kind: *kind,
                    succeeds,
                    log: log.clone(),
                }) as Box<dyn BackendProber>
            })
            .collect();
        let caps = Capabilities {
            native_binding_available: false,
            system_library_path: None,
        };
        (DeviceProbe::with_probers(probers, caps), log)
    }

    #[test]
    fn first_success_wins_and_stops() {
        let (mut probe, log) = probe_with([false, true, true]);
        let selection = probe.probe(&Config::default());
        assert_eq!(selection.kind(), Some(BackendKind::SystemLibrary));
        assert_eq!(
            *log.lock().unwrap(),
            vec![BackendKind::NativeDriver, BackendKind::SystemLibrary]
        );
    }

    #[test]
    fn all_failures_degrade_with_diagnostic() {
        let (mut probe, log) = probe_with([false, false, false]);
        let selection = probe.probe(&Config::default());
        assert!(!selection.is_active());
        assert!(selection.diagnostic().contains("stubbed failure"));
        assert_eq!(log.lock().unwrap().len(), 3);
        assert!(probe.attempts().iter().all(|a| a.outcome.is_err()));
    }

    #[test]
    fn disabled_backends_are_not_probed() {
        let mut config = Config::default();
        config.kinect.enabled = false;
        config.kinect.fallback_to_generic = false;
        let mut probe = DeviceProbe::new(&config);
        let selection = probe.probe(&config);
        assert!(probe.attempts().is_empty());
        assert!(selection.diagnostic().contains("disabled"));
    }
}
