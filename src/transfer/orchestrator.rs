//! Transfer orchestrator
//!
//! Runs a [`TransferDescriptor`] through
//! `Idle -> ModeDispatch -> {LocalPath | NetworkPath | RemotePath} -> Done | Failed`
//! and reports a single [`TransferOutcome`]. Remote transfers resolve their
//! protocol first, then try it and, on any failure, the other protocol once.

use crate::config::{RemoteProtocol, TransferDescriptor, TransferMode};
use crate::error::{Result, TransferError};
use crate::fs::LocalCopier;
use crate::network::{
    LanSender, ProtocolDetector, ProtocolProber, RemoteClient, RemoteTransferClient,
    UploadRequest,
};
use std::fmt;
use std::path::{Path, PathBuf};

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Nothing started
    Idle,
    /// Descriptor validated, choosing the path
    ModeDispatch,
    /// Same-machine copy running
    LocalPath,
    /// LAN send running
    NetworkPath,
    /// Remote upload running
    RemotePath,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

/// One remote upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Protocol tried
    pub protocol: RemoteProtocol,
    /// Failure message, `None` if the attempt succeeded
    pub error: Option<String>,
}

/// Result of [`TransferOrchestrator::execute`]
#[derive(Debug)]
pub struct TransferOutcome {
    /// Whether the file arrived
    pub succeeded: bool,
    /// Where it arrived (local path, `peer:port`, remote path or UNC path)
    pub resolved_path: String,
    /// Remote protocol that delivered the file
    pub protocol_used: Option<RemoteProtocol>,
    /// Failure cause
    pub error: Option<TransferError>,
    /// Remote attempts in order (empty for local and network modes)
    pub attempts: Vec<Attempt>,
}

impl TransferOutcome {
    fn done(
        resolved_path: String,
        protocol_used: Option<RemoteProtocol>,
        attempts: Vec<Attempt>,
    ) -> Self {
        Self {
            succeeded: true,
            resolved_path,
            protocol_used,
            error: None,
            attempts,
        }
    }

    fn failed(error: TransferError, attempts: Vec<Attempt>) -> Self {
        Self {
            succeeded: false,
            resolved_path: String::new(),
            protocol_used: None,
            error: Some(error),
            attempts,
        }
    }

    /// Terminal state of the run
    pub fn state(&self) -> TransferState {
        if self.succeeded {
            TransferState::Done
        } else {
            TransferState::Failed
        }
    }

    /// True if the file was delivered by the fallback protocol
    pub fn used_fallback(&self) -> bool {
        self.succeeded && self.attempts.len() > 1
    }

    /// Convert into a `Result` carrying the resolved path
    pub fn into_result(self) -> Result<String> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.resolved_path),
        }
    }
}

/// Picks a protocol when detection gives up
type ProtocolChooser = Box<dyn Fn(&str) -> Option<RemoteProtocol> + Send + Sync>;

/// Executes transfer descriptors
pub struct TransferOrchestrator<C = RemoteTransferClient, D = ProtocolProber> {
    local: LocalCopier,
    lan: LanSender,
    remote: C,
    detector: D,
    chooser: Option<ProtocolChooser>,
}

impl Default for TransferOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferOrchestrator {
    /// Orchestrator with the production collaborators
    pub fn new() -> Self {
        Self {
            local: LocalCopier::default(),
            lan: LanSender::new(),
            remote: RemoteTransferClient::new(),
            detector: ProtocolProber::default(),
            chooser: None,
        }
    }
}

impl<C: RemoteClient, D: ProtocolDetector> TransferOrchestrator<C, D> {
    /// Replace the remote client
    pub fn with_remote_client<C2: RemoteClient>(self, remote: C2) -> TransferOrchestrator<C2, D> {
        TransferOrchestrator {
            local: self.local,
            lan: self.lan,
            remote,
            detector: self.detector,
            chooser: self.chooser,
        }
    }

    /// Replace the protocol detector
    pub fn with_detector<D2: ProtocolDetector>(self, detector: D2) -> TransferOrchestrator<C, D2> {
        TransferOrchestrator {
            local: self.local,
            lan: self.lan,
            remote: self.remote,
            detector,
            chooser: self.chooser,
        }
    }

    /// Replace the local copier
    pub fn with_local_copier(mut self, local: LocalCopier) -> Self {
        self.local = local;
        self
    }

    /// Replace the LAN sender
    pub fn with_lan_sender(mut self, lan: LanSender) -> Self {
        self.lan = lan;
        self
    }

    /// Send LAN transfers to `port`
    pub fn with_lan_port(mut self, port: u16) -> Self {
        self.lan = self.lan.with_port(port);
        self
    }

    /// Use `protocol` when detection is undetermined
    pub fn with_manual_protocol(self, protocol: RemoteProtocol) -> Self {
        self.with_protocol_chooser(move |_| Some(protocol))
    }

    /// Ask `chooser` for a protocol when detection is undetermined
    pub fn with_protocol_chooser<F>(mut self, chooser: F) -> Self
    where
        F: Fn(&str) -> Option<RemoteProtocol> + Send + Sync + 'static,
    {
        self.chooser = Some(Box::new(chooser));
        self
    }

    /// Run one transfer
    pub fn execute(&self, descriptor: &TransferDescriptor) -> TransferOutcome {
        let mut run = Run::default();
        run.advance(TransferState::ModeDispatch);

        if let Err(e) = self.check_source(descriptor) {
            return run.fail(e);
        }

        match descriptor.mode() {
            TransferMode::Local => {
                run.advance(TransferState::LocalPath);
                match self.run_local(descriptor) {
                    Ok(path) => run.finish(path, None),
                    Err(e) => run.fail(e),
                }
            }
            TransferMode::Network => {
                run.advance(TransferState::NetworkPath);
                match self.run_network(descriptor) {
                    Ok(path) => run.finish(path, None),
                    Err(e) => run.fail(e),
                }
            }
            TransferMode::Remote => {
                let protocol = match self.resolve_protocol(descriptor) {
                    Ok(p) => p,
                    Err(e) => return run.fail(e),
                };
                run.advance(TransferState::RemotePath);
                self.run_remote(descriptor, protocol, run)
            }
        }
    }

    fn check_source(&self, descriptor: &TransferDescriptor) -> Result<()> {
        descriptor.validate()?;
        let source = descriptor.source();
        if !source.exists() {
            return Err(TransferError::SourceNotFound(source.to_path_buf()));
        }
        Ok(())
    }

    fn run_local(&self, descriptor: &TransferDescriptor) -> Result<String> {
        let destination = required(descriptor.destination(), "destination")?;
        let report = self.local.copy(descriptor.source(), Path::new(destination))?;
        Ok(report.destination.display().to_string())
    }

    fn run_network(&self, descriptor: &TransferDescriptor) -> Result<String> {
        let peer = required(descriptor.peer(), "peer")?;
        self.lan.send(descriptor.source(), peer)?;
        Ok(format!("{}:{}", peer, self.lan.port()))
    }

    /// Hint, then detection, then the manual chooser
    fn resolve_protocol(&self, descriptor: &TransferDescriptor) -> Result<RemoteProtocol> {
        if let Some(hint) = descriptor.protocol() {
            tracing::debug!("Using configured protocol {}", hint);
            return Ok(hint);
        }

        let peer = required(descriptor.peer(), "peer")?;
        if let Some(detected) = self.detector.detect(peer).protocol() {
            tracing::info!("Detected {} on {}", detected, peer);
            return Ok(detected);
        }

        match self.chooser.as_ref().and_then(|choose| choose(peer)) {
            Some(chosen) => {
                tracing::info!("Protocol for {} chosen manually: {}", peer, chosen);
                Ok(chosen)
            }
            None => Err(TransferError::ProtocolUndetermined(peer.to_string())),
        }
    }

    fn run_remote(
        &self,
        descriptor: &TransferDescriptor,
        primary: RemoteProtocol,
        mut run: Run,
    ) -> TransferOutcome {
        let request = match remote_request(descriptor) {
            Ok(r) => r,
            Err(e) => return run.fail(e),
        };

        let first = match self.attempt(&mut run, primary, &request) {
            Ok(path) => return run.finish(path, Some(primary)),
            Err(e) => e,
        };

        let fallback = primary.alternate();
        tracing::warn!(
            "Transfer via {} failed: {}; trying fallback protocol {}",
            primary,
            first,
            fallback
        );

        match self.attempt(&mut run, fallback, &request) {
            Ok(path) => run.finish(path, Some(fallback)),
            Err(second) => run.fail(TransferError::FailoverExhausted {
                primary: (primary, Box::new(first)),
                fallback: (fallback, Box::new(second)),
            }),
        }
    }

    fn attempt(
        &self,
        run: &mut Run,
        protocol: RemoteProtocol,
        request: &UploadRequest<'_>,
    ) -> Result<String> {
        let result = self.remote.upload(protocol, request);
        run.attempts.push(Attempt {
            protocol,
            error: result.as_ref().err().map(ToString::to_string),
        });
        result
    }
}

impl<C, D> fmt::Debug for TransferOrchestrator<C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferOrchestrator")
            .field("local", &self.local)
            .field("lan", &self.lan)
            .field("manual_chooser", &self.chooser.is_some())
            .finish_non_exhaustive()
    }
}

/// State and attempt log of one `execute` call
#[derive(Debug)]
struct Run {
    state: TransferState,
    attempts: Vec<Attempt>,
}

impl Default for Run {
    fn default() -> Self {
        Self {
            state: TransferState::Idle,
            attempts: Vec::new(),
        }
    }
}

impl Run {
    fn advance(&mut self, next: TransferState) {
        tracing::debug!("Transfer state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn finish(mut self, path: String, protocol: Option<RemoteProtocol>) -> TransferOutcome {
        self.advance(TransferState::Done);
        TransferOutcome::done(path, protocol, self.attempts)
    }

    fn fail(mut self, error: TransferError) -> TransferOutcome {
        self.advance(TransferState::Failed);
        tracing::debug!("Transfer failed: {}", error);
        TransferOutcome::failed(error, self.attempts)
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value.ok_or_else(|| TransferError::InvalidDescriptor(format!("{} is required", field)))
}

fn remote_request(descriptor: &TransferDescriptor) -> Result<UploadRequest<'_>> {
    Ok(UploadRequest {
        source: descriptor.source(),
        destination: required(descriptor.destination(), "destination")?,
        host: required(descriptor.peer(), "peer")?,
        credentials: descriptor.credentials().ok_or_else(|| {
            TransferError::InvalidDescriptor("credentials are required".to_string())
        })?,
    })
}

/// Execute `descriptor` with the production collaborators
pub fn execute_transfer(descriptor: &TransferDescriptor) -> TransferOutcome {
    TransferOrchestrator::new().execute(descriptor)
}

/// Run a one-shot LAN receiver on `port`, saving into `save_dir`
pub fn start_receiver(save_dir: &Path, port: u16) -> Result<PathBuf> {
    crate::network::receive_file(save_dir, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::network::{
        LanReceiver, MountedShares, ProbeConfig, ProbeOutcome, SmbBackend,
    };
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Remote client that fails or succeeds per protocol and records calls
    struct FakeClient {
        failing: Vec<RemoteProtocol>,
        calls: Mutex<Vec<RemoteProtocol>>,
    }

    impl FakeClient {
        fn failing(failing: &[RemoteProtocol]) -> Self {
            Self {
                failing: failing.to_vec(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<RemoteProtocol> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RemoteClient for &FakeClient {
        fn upload(&self, protocol: RemoteProtocol, request: &UploadRequest<'_>) -> Result<String> {
            self.calls.lock().unwrap().push(protocol);
            if self.failing.contains(&protocol) {
                Err(TransferError::remote_io(protocol, "connection reset"))
            } else {
                Ok(format!("{}/a.txt", request.destination))
            }
        }
    }

    struct FixedDetector(ProbeOutcome);

    impl ProtocolDetector for FixedDetector {
        fn detect(&self, _peer: &str) -> ProbeOutcome {
            self.0
        }
    }

    fn source_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hi").unwrap();
        path
    }

    fn remote_descriptor(source: &Path) -> TransferDescriptor {
        TransferDescriptor::remote(source, "share/inbox", "nas", Credentials::new("bob", "pw"))
    }

    fn closed_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_fallback_after_primary_failure() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir);
        let client = FakeClient::failing(&[RemoteProtocol::Sftp]);

        let orchestrator = TransferOrchestrator::new()
            .with_remote_client(&client)
            .with_detector(FixedDetector(ProbeOutcome::Undetermined));
        let descriptor = remote_descriptor(&source).with_protocol(RemoteProtocol::Sftp);

        let outcome = orchestrator.execute(&descriptor);
        assert!(outcome.succeeded);
        assert!(outcome.used_fallback());
        assert_eq!(outcome.protocol_used, Some(RemoteProtocol::Smb));
        assert_eq!(outcome.resolved_path, "share/inbox/a.txt");
        assert_eq!(client.calls(), vec![RemoteProtocol::Sftp, RemoteProtocol::Smb]);
        assert_eq!(outcome.attempts.len(), 2);
        assert!(outcome.attempts[0].error.is_some());
        assert!(outcome.attempts[1].error.is_none());
    }

    #[test]
    fn test_first_attempt_success_skips_fallback() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir);
        let client = FakeClient::failing(&[]);

        let orchestrator = TransferOrchestrator::new()
            .with_remote_client(&client)
            .with_detector(FixedDetector(ProbeOutcome::Detected(RemoteProtocol::Smb)));

        let outcome = orchestrator.execute(&remote_descriptor(&source));
        assert!(outcome.succeeded);
        assert_eq!(outcome.state(), TransferState::Done);
        assert_eq!(outcome.protocol_used, Some(RemoteProtocol::Smb));
        assert_eq!(client.calls(), vec![RemoteProtocol::Smb]);
        assert!(!outcome.used_fallback());
    }

    #[test]
    fn test_both_protocols_fail() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir);
        let client = FakeClient::failing(&[RemoteProtocol::Sftp, RemoteProtocol::Smb]);

        let orchestrator = TransferOrchestrator::new()
            .with_remote_client(&client)
            .with_detector(FixedDetector(ProbeOutcome::Detected(RemoteProtocol::Smb)));

        let outcome = orchestrator.execute(&remote_descriptor(&source));
        assert!(!outcome.succeeded);
        assert_eq!(outcome.state(), TransferState::Failed);
        assert_eq!(client.calls(), vec![RemoteProtocol::Smb, RemoteProtocol::Sftp]);

        let error = outcome.error.as_ref().unwrap();
        let causes = error.failover_causes().unwrap();
        assert_eq!(causes[0].0, RemoteProtocol::Smb);
        assert_eq!(causes[1].0, RemoteProtocol::Sftp);
        assert!(matches!(causes[0].1, TransferError::RemoteIoError { .. }));
        assert!(matches!(causes[1].1, TransferError::RemoteIoError { .. }));
    }

    #[test]
    fn test_undetermined_without_manual_choice() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir);
        let client = FakeClient::failing(&[]);

        let orchestrator = TransferOrchestrator::new()
            .with_remote_client(&client)
            .with_detector(FixedDetector(ProbeOutcome::Undetermined));

        let outcome = orchestrator.execute(&remote_descriptor(&source));
        assert!(matches!(
            outcome.error,
            Some(TransferError::ProtocolUndetermined(ref host)) if host == "nas"
        ));
        assert!(client.calls().is_empty());
        assert!(outcome.attempts.is_empty());
    }

    #[test]
    fn test_undetermined_uses_manual_choice() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir);
        let client = FakeClient::failing(&[]);

        let orchestrator = TransferOrchestrator::new()
            .with_remote_client(&client)
            .with_detector(FixedDetector(ProbeOutcome::Undetermined))
            .with_manual_protocol(RemoteProtocol::Smb);

        let outcome = orchestrator.execute(&remote_descriptor(&source));
        assert!(outcome.succeeded);
        assert_eq!(outcome.protocol_used, Some(RemoteProtocol::Smb));
    }

    #[test]
    fn test_hint_skips_detection() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir);
        let client = FakeClient::failing(&[]);

        let orchestrator = TransferOrchestrator::new()
            .with_remote_client(&client)
            .with_detector(FixedDetector(ProbeOutcome::Detected(RemoteProtocol::Smb)));
        let descriptor = remote_descriptor(&source).with_protocol(RemoteProtocol::Sftp);

        let outcome = orchestrator.execute(&descriptor);
        assert_eq!(outcome.protocol_used, Some(RemoteProtocol::Sftp));
    }

    #[test]
    fn test_missing_source_fails_before_dispatch() {
        let dir = TempDir::new().unwrap();
        let client = FakeClient::failing(&[]);

        let orchestrator = TransferOrchestrator::new()
            .with_remote_client(&client)
            .with_detector(FixedDetector(ProbeOutcome::Detected(RemoteProtocol::Sftp)));

        let outcome = orchestrator.execute(&remote_descriptor(&dir.path().join("missing.txt")));
        assert!(matches!(outcome.error, Some(TransferError::SourceNotFound(_))));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_local_mode() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let source = source_file(&src);

        let outcome = TransferOrchestrator::new().execute(&TransferDescriptor::local(&source, dst.path()));
        assert!(outcome.succeeded);
        assert_eq!(outcome.protocol_used, None);
        assert!(outcome.attempts.is_empty());
        assert_eq!(std::fs::read(dst.path().join("a.txt")).unwrap(), b"hi");
    }

    #[test]
    fn test_network_mode_end_to_end() {
        let src = TempDir::new().unwrap();
        let save_dir = TempDir::new().unwrap();
        let source = source_file(&src);

        let receiver = LanReceiver::bind("127.0.0.1:0").unwrap();
        let port = receiver.local_addr().unwrap().port();
        let save_path = save_dir.path().to_path_buf();
        let handle = std::thread::spawn(move || receiver.receive(&save_path));

        let outcome = TransferOrchestrator::new()
            .with_lan_port(port)
            .execute(&TransferDescriptor::network(&source, "127.0.0.1"));
        assert!(outcome.succeeded, "{:?}", outcome.error);
        assert_eq!(outcome.resolved_path, format!("127.0.0.1:{}", port));

        let received = handle.join().unwrap().unwrap();
        assert!(received.is_complete());
        assert_eq!(received.path, save_dir.path().join("a.txt"));
        assert_eq!(std::fs::read(&received.path).unwrap(), b"hi");
    }

    #[test]
    fn test_local_mode_refuses_copy_onto_source() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir);

        let outcome = execute_transfer(&TransferDescriptor::local(&source, dir.path()));
        assert!(!outcome.succeeded);
        assert!(matches!(
            outcome.error,
            Some(TransferError::SameSourceAndDestination(_))
        ));
        assert_eq!(std::fs::read(&source).unwrap(), b"hi");

        let outcome = execute_transfer(&TransferDescriptor::local(dir.path(), dir.path().join("nested")));
        assert!(matches!(
            outcome.error,
            Some(TransferError::SameSourceAndDestination(_))
        ));
        assert!(!dir.path().join("nested").exists());
    }

    #[test]
    fn test_start_receiver_and_execute_transfer_on_default_port() {
        let port = LanSender::new().port();
        // Both helpers use the fixed default port; skip when it is taken
        if TcpListener::bind(("0.0.0.0", port)).is_err() {
            eprintln!("port {} busy, skipping", port);
            return;
        }

        let src = TempDir::new().unwrap();
        let save_dir = TempDir::new().unwrap();
        let source = source_file(&src);

        let save_path = save_dir.path().to_path_buf();
        let handle = std::thread::spawn(move || start_receiver(&save_path, port));

        let descriptor = TransferDescriptor::network(&source, "127.0.0.1");
        let mut outcome = execute_transfer(&descriptor);
        for _ in 0..50 {
            if outcome.succeeded {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
            outcome = execute_transfer(&descriptor);
        }
        assert!(outcome.succeeded, "{:?}", outcome.error);
        assert_eq!(outcome.resolved_path, format!("127.0.0.1:{}", port));

        let saved = handle.join().unwrap().unwrap();
        assert_eq!(saved, save_dir.path().join("a.txt"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"hi");
    }

    #[test]
    fn test_network_mode_without_receiver() {
        let src = TempDir::new().unwrap();
        let source = source_file(&src);

        let outcome = TransferOrchestrator::new()
            .with_lan_port(closed_port())
            .execute(&TransferDescriptor::network(&source, "127.0.0.1"));
        assert!(matches!(outcome.error, Some(TransferError::ConnectivityError { .. })));
    }

    #[test]
    fn test_remote_mode_detects_smb_end_to_end() {
        let src = TempDir::new().unwrap();
        let mount = TempDir::new().unwrap();
        let source = source_file(&src);

        let smb_listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let prober = ProtocolProber::new(ProbeConfig {
            sftp_port: closed_port(),
            smb_port: smb_listener.local_addr().unwrap().port(),
            timeout: Duration::from_millis(500),
        });

        let client = RemoteTransferClient::new()
            .with_smb(SmbBackend::new(MountedShares::new(mount.path())));
        let orchestrator = TransferOrchestrator::new()
            .with_remote_client(client)
            .with_detector(prober);

        let descriptor = TransferDescriptor::remote(
            &source,
            "public",
            "127.0.0.1",
            Credentials::new("alice", "pw"),
        );

        let outcome = orchestrator.execute(&descriptor);
        assert!(outcome.succeeded, "{:?}", outcome.error);
        assert_eq!(outcome.protocol_used, Some(RemoteProtocol::Smb));
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.resolved_path, r"\\127.0.0.1\public\a.txt");
        assert_eq!(
            std::fs::read(mount.path().join("127.0.0.1/public/a.txt")).unwrap(),
            b"hi"
        );
    }

    #[test]
    fn test_invalid_descriptor() {
        let dir = TempDir::new().unwrap();
        let source = source_file(&dir);
        let descriptor = TransferDescriptor::remote(&source, "share", "nas", Credentials::new("", "pw"));

        let outcome = TransferOrchestrator::new().execute(&descriptor);
        assert!(matches!(outcome.error, Some(TransferError::InvalidDescriptor(_))));
        assert!(outcome.into_result().is_err());
    }
}
