//! Long-running monitoring loop.
//!
//! One task owns the [`DetectionPipeline`] and reacts to four sources: handle commands,
//! directory notifications, recorder start outcomes and the poll tick. Recorder and store
//! calls run on the [`RecorderWorker`] thread so a slow capture setup never stalls line
//! processing.

use std::path::Path;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use notify::RecommendedWatcher;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::combat_log::{is_relevant_notification, watch_directory, LogPoll, LogWatcher};
use crate::error::MonitorError;
use crate::pipeline::DetectionPipeline;
use crate::recording::{Recorder, RecorderCommand, RecorderOutcome, RecorderWorker};
use crate::session::ControllerAction;
use crate::settings::MonitorSettings;
use crate::status::{StatusEvent, StatusReporter};
use crate::store::Store;

const OUTCOME_MONITORING_STOPPED: &str = "Monitoring stopped";
const OUTCOME_GAME_CLOSED: &str = "Game closed";

/// Reports whether the game process is running. Polled on every tick.
pub trait AppPresence: Send + Sync {
    fn is_running(&self) -> bool;
}

impl<F> AppPresence for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_running(&self) -> bool {
        self()
    }
}

/// External collaborators driven by the monitor.
pub struct MonitorCollaborators {
    pub recorder: Arc<dyn Recorder>,
    pub store: Arc<dyn Store>,
    pub app_presence: Option<Arc<dyn AppPresence>>,
    /// Subscribe to this before starting to observe `monitoring-started`.
    pub status: StatusReporter,
}

impl MonitorCollaborators {
    pub fn new(recorder: Arc<dyn Recorder>, store: Arc<dyn Store>) -> Self {
        Self {
            recorder,
            store,
            app_presence: None,
            status: StatusReporter::new(),
        }
    }

    pub fn with_app_presence(mut self, app_presence: Arc<dyn AppPresence>) -> Self {
        self.app_presence = Some(app_presence);
        self
    }
}

enum MonitorCommand {
    StartClip(String),
    StopClip,
    Stop,
}

pub struct MonitorHandle {
    command_tx: mpsc::UnboundedSender<MonitorCommand>,
    status: StatusReporter,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    pub fn start_clip(&self, label: impl Into<String>) -> Result<(), MonitorError> {
        self.send(MonitorCommand::StartClip(label.into()))
    }

    pub fn stop_clip(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::StopClip)
    }

    /// Stops monitoring. Any live session is ended and saved before this returns.
    pub async fn stop(self) -> Result<(), MonitorError> {
        let Self {
            command_tx, task, ..
        } = self;

        if command_tx.send(MonitorCommand::Stop).is_err() {
            tracing::debug!("Monitor loop already finished before stop");
        }
        drop(command_tx);

        task.await.map_err(|error| {
            tracing::error!("Monitor loop ended abnormally: {error}");
            MonitorError::NotRunning
        })
    }

    fn send(&self, command: MonitorCommand) -> Result<(), MonitorError> {
        self.command_tx
            .send(command)
            .map_err(|_| MonitorError::NotRunning)
    }
}

/// Starts monitoring `settings.log_directory`. Must be called inside a Tokio runtime.
///
/// A missing or empty log directory is fine and is rescanned on every tick. Only a directory
/// that exists but cannot be read fails here.
pub fn start_monitoring(
    settings: MonitorSettings,
    collaborators: MonitorCollaborators,
) -> Result<MonitorHandle, MonitorError> {
    settings.validate()?;

    let MonitorCollaborators {
        recorder,
        store,
        app_presence,
        status,
    } = collaborators;

    let mut watcher = LogWatcher::new(&settings.log_directory, settings.replay_existing_log);
    let initial_poll = watcher.poll()?;

    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let directory_watcher = match watch_directory(&settings.log_directory, notify_tx) {
        Ok(directory_watcher) => Some(directory_watcher),
        Err(error) => {
            tracing::warn!(
                log_directory = %settings.log_directory.display(),
                "Directory notifications unavailable, relying on polling: {error}"
            );
            None
        }
    };

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let worker = RecorderWorker::spawn(recorder, store, status.clone(), outcome_tx);
    let pipeline = DetectionPipeline::from_settings(&settings, status.clone());

    tracing::info!(
        log_directory = %settings.log_directory.display(),
        log_path = ?watcher.current_log(),
        mode = ?settings.classification_mode,
        "Combat log monitoring started"
    );
    status.emit(StatusEvent::MonitoringStarted {
        log_path: watcher.current_log().map(Path::to_path_buf),
    });

    let app_was_running = app_presence
        .as_ref()
        .map(|app_presence| app_presence.is_running());

    let monitor_loop = MonitorLoop {
        watcher,
        directory_watcher,
        pipeline,
        worker,
        status: status.clone(),
        app_presence,
        app_was_running,
        last_watcher_error: None,
    };

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let poll_interval = settings.poll_interval();
    let task = tokio::spawn(monitor_loop.run(
        initial_poll,
        poll_interval,
        command_rx,
        notify_rx,
        outcome_rx,
    ));

    Ok(MonitorHandle {
        command_tx,
        status,
        task,
    })
}

struct MonitorLoop {
    watcher: LogWatcher,
    directory_watcher: Option<RecommendedWatcher>,
    pipeline: DetectionPipeline,
    worker: RecorderWorker,
    status: StatusReporter,
    app_presence: Option<Arc<dyn AppPresence>>,
    app_was_running: Option<bool>,
    last_watcher_error: Option<String>,
}

impl MonitorLoop {
    async fn run(
        mut self,
        initial_poll: LogPoll,
        poll_interval: std::time::Duration,
        mut command_rx: mpsc::UnboundedReceiver<MonitorCommand>,
        mut notify_rx: mpsc::UnboundedReceiver<Result<notify::Event, notify::Error>>,
        mut outcome_rx: mpsc::UnboundedReceiver<RecorderOutcome>,
    ) {
        self.apply_poll(initial_poll);

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(MonitorCommand::StartClip(label)) => {
                        let action = self.pipeline.start_clip(label, now());
                        self.execute(action);
                    }
                    Some(MonitorCommand::StopClip) => {
                        let action = self.pipeline.stop_clip(now());
                        self.execute(action);
                    }
                    Some(MonitorCommand::Stop) | None => break,
                },
                Some(outcome) = outcome_rx.recv() => self.handle_outcome(outcome),
                Some(notification) = notify_rx.recv() => match notification {
                    Ok(event) if is_relevant_notification(&event) => self.poll_log(),
                    Ok(_) => {}
                    Err(error) => self.report_watcher_error(error.to_string()),
                },
                _ = ticker.tick() => {
                    self.check_app_presence();
                    self.poll_log();
                }
            }
        }

        self.shutdown(outcome_rx).await;
    }

    fn poll_log(&mut self) {
        match self.watcher.poll() {
            Ok(poll) => {
                self.last_watcher_error = None;
                self.apply_poll(poll);
            }
            Err(error) => self.report_watcher_error(error.to_string()),
        }
    }

    fn apply_poll(&mut self, poll: LogPoll) {
        if let Some(log_path) = poll.rotated_to {
            self.pipeline.handle_rotation(&log_path);
            self.status.emit(StatusEvent::LogFileChanged { log_path });
        }

        for action in self.pipeline.process_lines(&poll.lines) {
            self.execute(Some(action));
        }
    }

    fn check_app_presence(&mut self) {
        let Some(app_presence) = self.app_presence.as_ref() else {
            return;
        };

        let running = app_presence.is_running();
        let was_running = self.app_was_running.replace(running);
        if was_running == Some(true) && !running {
            tracing::info!("Game process exited");
            let action = self.pipeline.force_end(now(), OUTCOME_GAME_CLOSED);
            self.execute(action);
        }
    }

    fn handle_outcome(&mut self, outcome: RecorderOutcome) {
        let action = self.pipeline.recording_started(outcome);
        self.execute(action);
    }

    fn execute(&mut self, action: Option<ControllerAction>) {
        let Some(action) = action else {
            return;
        };

        match action {
            ControllerAction::StartRecording(request) => {
                if let Err(error) = self.worker.submit(RecorderCommand::Start(request)) {
                    let follow_up = self.pipeline.recording_started(Err(error));
                    self.execute(follow_up);
                }
            }
            ControllerAction::FinishSession(finished) => {
                let kind = finished.kind;
                let label = finished.label.clone();
                if let Err(error) = self.worker.submit(RecorderCommand::Finish(finished)) {
                    tracing::error!(kind = %kind, label = %label, "Failed to finish session: {error}");
                    self.status.emit(StatusEvent::SessionStopFailed {
                        kind,
                        label,
                        reason: error.to_string(),
                    });
                }
            }
        }
    }

    /// Repeated identical failures are reported once until the watcher recovers.
    fn report_watcher_error(&mut self, reason: String) {
        if self.last_watcher_error.as_deref() == Some(reason.as_str()) {
            return;
        }

        tracing::warn!("Combat log watcher error: {reason}");
        self.status.emit(StatusEvent::WatcherError {
            reason: reason.clone(),
        });
        self.last_watcher_error = Some(reason);
    }

    async fn shutdown(mut self, mut outcome_rx: mpsc::UnboundedReceiver<RecorderOutcome>) {
        drop(self.directory_watcher.take());

        let action = self.pipeline.force_end(now(), OUTCOME_MONITORING_STOPPED);
        self.execute(action);

        while self.pipeline.controller().has_pending_start() {
            match outcome_rx.recv().await {
                Some(outcome) => self.handle_outcome(outcome),
                None => break,
            }
        }

        let MonitorLoop { worker, status, .. } = self;
        worker.shutdown().await;

        tracing::info!("Combat log monitoring stopped");
        status.emit(StatusEvent::MonitoringStopped);
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
