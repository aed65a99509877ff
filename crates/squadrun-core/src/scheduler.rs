//! Pass scheduler.
//!
//! A pass re-reads the session file, processes every non-blank line in file
//! order, then waits out the cooldown before the next pass. Edits to the
//! file take effect at the next pass. The loop ends only when the shutdown
//! flag is set or an optional pass limit is reached.

use squadrun_proto::Transport;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::SquadConfig;
use crate::countdown::{Countdown, CountdownOutcome};
use crate::processor::{SessionOutcome, SessionProcessor};
use crate::rewards::SquadApi;
use crate::session::SessionSource;
use crate::sweep::SweepOptions;

/// The lines one pass will visit, snapshotted when the pass starts.
///
/// Indices are raw line numbers (zero-based) of non-blank lines, so a blank
/// line in the middle of the file never shifts or hides a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassContext {
    indices: Vec<usize>,
    cursor: usize,
}

impl PassContext {
    pub fn load(source: &SessionSource) -> io::Result<Self> {
        Ok(Self::from_indices(source.session_indices()?))
    }

    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices, cursor: 0 }
    }

    /// Sessions in this pass.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Sessions handed out so far.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl Iterator for PassContext {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = *self.indices.get(self.cursor)?;
        self.cursor += 1;
        Some(index)
    }
}

/// Tally of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Non-blank lines found at the start of the pass.
    pub sessions: usize,
    pub completed: usize,
    pub auth_failed: usize,
    pub skipped: usize,
    /// Shutdown was requested before every session ran.
    pub interrupted: bool,
}

/// Why [`Scheduler::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    PassLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub passes: u32,
    pub reason: StopReason,
}

/// Runs passes over the session file forever, or until told to stop.
pub struct Scheduler<T> {
    api: SquadApi<T>,
    source: SessionSource,
    sweep: SweepOptions,
    max_boost_rounds: u32,
    cooldown: Duration,
    shutdown: Arc<AtomicBool>,
    max_passes: Option<u32>,
    show_countdown: bool,
}

impl<T: Transport> Scheduler<T> {
    pub fn new(api: SquadApi<T>, config: &SquadConfig) -> Self {
        Self {
            api,
            source: SessionSource::new(&config.scheduler.sessions_file),
            sweep: SweepOptions::from(&config.scheduler),
            max_boost_rounds: config.scheduler.max_boost_rounds,
            cooldown: config.scheduler.cooldown(),
            shutdown: Arc::new(AtomicBool::new(false)),
            max_passes: None,
            show_countdown: true,
        }
    }

    /// Stops after `passes` passes instead of running forever.
    #[must_use]
    pub fn with_max_passes(mut self, passes: u32) -> Self {
        self.max_passes = Some(passes);
        self
    }

    #[must_use]
    pub fn with_countdown_display(mut self, show: bool) -> Self {
        self.show_countdown = show;
        self
    }

    /// Uses an externally owned shutdown flag, e.g. one set by a signal handler.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn source(&self) -> &SessionSource {
        &self.source
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Processes every session in the file once.
    ///
    /// An unreadable file yields an empty pass; the next pass tries again.
    pub async fn run_pass(&self) -> PassReport {
        let mut pass = match PassContext::load(&self.source) {
            Ok(pass) => pass,
            Err(e) => {
                error!(
                    path = %self.source.path().display(),
                    error = %e,
                    "Failed to read session file"
                );
                return PassReport::default();
            }
        };

        let mut report = PassReport {
            sessions: pass.len(),
            ..PassReport::default()
        };
        info!(sessions = report.sessions, "Starting pass");
        let processor = SessionProcessor::new(&self.api, self.sweep, self.max_boost_rounds);

        while let Some(index) = pass.next() {
            if self.is_shutdown() {
                report.interrupted = true;
                break;
            }
            let line = index + 1;
            info!(
                "Processing session {}/{} (line {line})",
                pass.position(),
                report.sessions
            );

            let outcome = match self.source.session_at(index) {
                Some(session) => processor.process(&session).await,
                None => SessionOutcome::Skipped,
            };
            match outcome {
                SessionOutcome::Completed(_) => {
                    report.completed += 1;
                    info!(line, "Session done");
                }
                SessionOutcome::AuthFailed => {
                    report.auth_failed += 1;
                    error!(line, "Authentication failed, skipping session");
                }
                SessionOutcome::Skipped => {
                    report.skipped += 1;
                    error!(line, "Failed to load session data, skipping");
                }
            }
        }

        report
    }

    /// Runs passes separated by the cooldown until shutdown or the pass limit.
    pub async fn run(&self) -> RunSummary {
        let mut passes = 0;

        loop {
            if self.is_shutdown() {
                return RunSummary {
                    passes,
                    reason: StopReason::Shutdown,
                };
            }

            let report = self.run_pass().await;
            passes += 1;
            info!(
                pass = passes,
                completed = report.completed,
                auth_failed = report.auth_failed,
                skipped = report.skipped,
                "All sessions processed"
            );
            if report.sessions == 0 {
                warn!(path = %self.source.path().display(), "No sessions to process");
            }

            if self.max_passes.is_some_and(|max| passes >= max) {
                return RunSummary {
                    passes,
                    reason: StopReason::PassLimit,
                };
            }

            info!(
                cooldown_secs = self.cooldown.as_secs(),
                "Waiting before next pass"
            );
            let mut countdown = Countdown::new(self.cooldown);
            if !self.show_countdown {
                countdown = countdown.hidden();
            }
            if countdown.run(&self.shutdown).await == CountdownOutcome::Cancelled {
                return RunSummary {
                    passes,
                    reason: StopReason::Shutdown,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiClient;
    use crate::config::SquadSettings;
    use crate::testing::{FakeSquadServer, FakeUser, fake_api, instant_config, session_line};
    use async_trait::async_trait;
    use serde_json::Value;
    use squadrun_proto::{ApiRequest, ApiResult};
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tracing_subscriber::fmt::MakeWriter;

    fn write_sessions(path: &Path, lines: &[String]) {
        fs::write(path, lines.join("\n")).unwrap();
    }

    fn scheduler(
        server: &Arc<FakeSquadServer>,
        sessions: &Path,
    ) -> Scheduler<Arc<FakeSquadServer>> {
        let mut config = instant_config();
        config.scheduler.sessions_file = sessions.to_path_buf();
        Scheduler::new(fake_api(server), &config).with_countdown_display(false)
    }

    #[test]
    fn test_pass_context_yields_indices_in_order() {
        let mut pass = PassContext::from_indices(vec![0, 2, 5]);
        assert_eq!(pass.len(), 3);
        assert_eq!(pass.next(), Some(0));
        assert_eq!(pass.position(), 1);
        assert_eq!(pass.by_ref().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(pass.next(), None);
    }

    #[test]
    fn test_valid_line_plus_trailing_empty_counts_one() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("query.txt");
        fs::write(&path, format!("{}\n\n", session_line(1, "one"))).unwrap();

        let pass = PassContext::load(&SessionSource::new(&path)).unwrap();
        assert_eq!(pass.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_line_does_not_hide_a_session() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("query.txt");
        write_sessions(
            &path,
            &[session_line(1, "one"), String::new(), session_line(3, "three")],
        );
        let server = Arc::new(FakeSquadServer::new());

        let report = scheduler(&server, &path).run_pass().await;
        assert_eq!(report.sessions, 2);
        assert_eq!(report.completed, 2);
        assert_eq!(server.count("auth/telegram"), 2);
        assert!(server.user(1).is_some());
        assert!(server.user(3).is_some());
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("query.txt");
        write_sessions(
            &path,
            &[
                session_line(1, "one"),
                "user=not-json&auth_date=1&hash=x".to_string(),
                session_line(3, "three"),
            ],
        );
        let server = Arc::new(FakeSquadServer::new());
        server.reject_login(1);

        let report = scheduler(&server, &path).run_pass().await;
        assert_eq!(report.sessions, 3);
        assert_eq!(report.auth_failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(server.user(3).unwrap().daily_claims, 1);
    }

    #[tokio::test]
    async fn test_file_is_reread_between_passes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("query.txt");
        write_sessions(&path, &[session_line(1, "one")]);
        let server = Arc::new(FakeSquadServer::new());
        let scheduler = scheduler(&server, &path);

        assert_eq!(scheduler.run_pass().await.sessions, 1);

        write_sessions(&path, &[session_line(1, "one"), session_line(2, "two")]);
        let second = scheduler.run_pass().await;
        assert_eq!(second.sessions, 2);
        assert_eq!(second.completed, 2);
        assert_eq!(server.user(1).unwrap().daily_claims, 2);
        assert_eq!(server.user(2).unwrap().daily_claims, 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_empty_pass() {
        let dir = TempDir::new().unwrap();
        let server = Arc::new(FakeSquadServer::new());

        let report = scheduler(&server, &dir.path().join("missing.txt"))
            .run_pass()
            .await;
        assert_eq!(report, PassReport::default());
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_at_pass_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("query.txt");
        write_sessions(&path, &[session_line(1, "one"), session_line(2, "two")]);
        let server = Arc::new(FakeSquadServer::new());
        server.add_user(FakeUser::new(2, "two").fuel(3));

        let summary = scheduler(&server, &path).with_max_passes(2).run().await;
        assert_eq!(summary.passes, 2);
        assert_eq!(summary.reason, StopReason::PassLimit);
        assert_eq!(server.count("auth/telegram"), 4);
        assert_eq!(server.user(2).unwrap().boosts, 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_run_does_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("query.txt");
        write_sessions(&path, &[session_line(1, "one")]);
        let server = Arc::new(FakeSquadServer::new());
        let scheduler = scheduler(&server, &path);
        scheduler.shutdown_flag().store(true, Ordering::Relaxed);

        let summary = scheduler.run().await;
        assert_eq!(summary.passes, 0);
        assert_eq!(summary.reason, StopReason::Shutdown);
        assert!(server.requests().is_empty());
    }

    /// Sets the shutdown flag once the wrapped server has answered a daily
    /// claim, i.e. right after the first session's last step.
    struct StopAfterDaily {
        server: Arc<FakeSquadServer>,
        shutdown: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for StopAfterDaily {
        async fn send(&self, request: &ApiRequest) -> ApiResult<Value> {
            let reply = self.server.send(request).await;
            if request.endpoint() == "squad/claim/daily" {
                self.shutdown.store(true, Ordering::Relaxed);
            }
            reply
        }
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_pass_between_sessions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("query.txt");
        write_sessions(
            &path,
            &[session_line(1, "one"), session_line(2, "two"), session_line(3, "three")],
        );
        let server = Arc::new(FakeSquadServer::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let transport = StopAfterDaily {
            server: Arc::clone(&server),
            shutdown: Arc::clone(&shutdown),
        };

        let mut config = instant_config();
        config.scheduler.sessions_file = path.clone();
        let api = SquadApi::new(
            ApiClient::new(transport, Duration::ZERO),
            SquadSettings::default(),
        );
        let scheduler = Scheduler::new(api, &config)
            .with_countdown_display(false)
            .with_shutdown(Arc::clone(&shutdown));

        let report = scheduler.run_pass().await;
        assert!(report.interrupted);
        assert_eq!(report.sessions, 3);
        assert_eq!(report.completed, 1);
        assert_eq!(server.count("auth/telegram"), 1);
        assert!(server.user(2).is_none());
    }

    #[derive(Clone)]
    struct SharedBufferWriter {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl io::Write for SharedBufferWriter {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for SharedBufferWriter {
        type Writer = SharedBufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_cooldown_is_announced_between_passes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("query.txt");
        write_sessions(&path, &[session_line(1, "one")]);
        let server = Arc::new(FakeSquadServer::new());

        let log_buf = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_writer(SharedBufferWriter {
                buf: Arc::clone(&log_buf),
            })
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let summary = scheduler(&server, &path).with_max_passes(2).run().await;
        assert_eq!(summary.passes, 2);

        let logs = String::from_utf8(log_buf.lock().unwrap().clone()).unwrap();
        // Announced after the first pass only; the pass limit ends the run
        // before a second wait.
        assert_eq!(logs.matches("Waiting before next pass").count(), 1, "{logs}");
        assert!(logs.contains("cooldown_secs=0"), "{logs}");
    }
}
