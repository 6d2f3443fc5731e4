use crate::coordinator::{RefreshCoordinator, RefreshTimer, Request, Settled, Trigger};
use crate::gateway::{self, DatasourceGateway};
use crate::state::{AppAction, AppState, AppStore, UserAction, UserState, UserStore};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

const COMMAND_BUFFER: usize = 64;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch(UserAction),
    Refresh,
    ClearError,
}

/// Client side of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    pub commands: mpsc::Sender<Command>,
    pub user: watch::Receiver<UserState>,
    pub app: watch::Receiver<AppState>,
}

/// Owns both state slices and the refresh timer. All decisions run on the
/// session task; only gateway calls run elsewhere.
pub struct Session {
    user: UserStore,
    app: AppStore,
    coordinator: RefreshCoordinator,
    timer: RefreshTimer,
    gateway: Arc<dyn DatasourceGateway>,
    timeout: Option<Duration>,
    clock: Clock,
    settled_tx: mpsc::UnboundedSender<Settled>,
    settled_rx: mpsc::UnboundedReceiver<Settled>,
    user_tx: watch::Sender<UserState>,
    app_tx: watch::Sender<AppState>,
}

impl Session {
    pub fn new(
        user: UserState,
        coordinator: RefreshCoordinator,
        gateway: Arc<dyn DatasourceGateway>,
    ) -> Self {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let (user_tx, _) = watch::channel(user.clone());
        let (app_tx, _) = watch::channel(AppState::default());

        Self {
            user: UserStore::new(user),
            app: AppStore::new(),
            coordinator,
            timer: RefreshTimer::new(),
            gateway,
            timeout: None,
            clock: Arc::new(Utc::now),
            settled_tx,
            settled_rx,
            user_tx,
            app_tx,
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;

        self
    }

    #[cfg(test)]
    #[inline]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;

        self
    }

    pub fn spawn(self, cancellation_token: CancellationToken) -> (SessionHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SessionHandle {
            commands,
            user: self.user_tx.subscribe(),
            app: self.app_tx.subscribe(),
        };

        (handle, tokio::spawn(self.run(rx, cancellation_token)))
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancellation_token: CancellationToken) {
        let sql = self.coordinator.compile(self.user.state());
        self.app.dispatch(AppAction::SetSql(sql));
        self.timer.arm(&self.user.state().refresh_interval);
        self.refresh(Trigger::StateChange);
        self.publish();

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                command = commands.recv() => match command {
                    Some(c) => self.handle(c),
                    None => break,
                },
                Some(settled) = self.settled_rx.recv() => {
                    if self.coordinator.settle(settled, &mut self.app) {
                        self.summarize();
                    } else {
                        debug!("{} queries still in flight", self.coordinator.in_flight());
                    }
                }
                _ = self.timer.tick() => self.refresh(Trigger::Timer),
            }
            self.publish();
        }

        self.timer.disarm();
        info!("Session stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Dispatch(action) => self.dispatch(action),
            Command::Refresh => self.refresh(Trigger::Manual),
            Command::ClearError => self.app.dispatch(AppAction::ClearError),
        }
    }

    fn dispatch(&mut self, action: UserAction) {
        let prev = self.user.dispatch(action);
        let reaction = self.coordinator.on_user_state_changed(
            &prev,
            self.user.state(),
            &mut self.app,
            (self.clock)(),
        );

        if reaction.rearm_timer {
            self.timer.arm(&self.user.state().refresh_interval);
        }
        if reaction.refresh {
            self.refresh(Trigger::StateChange);
        }
    }

    fn refresh(&mut self, trigger: Trigger) {
        let now = (self.clock)();
        if let Some(requests) = self
            .coordinator
            .plan(trigger, self.user.state(), &mut self.app, now)
        {
            for request in requests {
                self.issue(request);
            }
        }
    }

    fn issue(&self, request: Request) {
        let datasources = self.gateway.clone();
        let settled_tx = self.settled_tx.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let call = datasources.execute(&request.datasource, &request.sql, &request.window);
            let result = match timeout {
                Some(limit) => match time::timeout(limit, call).await {
                    Ok(r) => r,
                    Err(_) => Err(gateway::Error::Timeout(limit.as_secs())),
                },
                None => call.await,
            };

            let settled = Settled {
                cycle: request.cycle,
                target: request.target,
                result: result.map_err(|e| e.to_string()),
            };
            if settled_tx.send(settled).is_err() {
                warn!("Session closed before cycle {} settled", request.cycle);
            }
        });
    }

    fn summarize(&self) {
        let state = self.app.state();
        match &state.error {
            Some(e) => info!(
                "Refresh settled: {} rows, {} buckets, error: {}",
                state.log_fields.row_count(),
                state.level_fields.row_count(),
                e
            ),
            None => info!(
                "Refresh settled: {} rows, {} buckets",
                state.log_fields.row_count(),
                state.level_fields.row_count()
            ),
        }
    }

    fn publish(&self) {
        publish(&self.user_tx, self.user.state());
        publish(&self.app_tx, self.app.state());
    }
}

fn publish<T: Clone + PartialEq>(tx: &watch::Sender<T>, value: &T) {
    tx.send_if_modified(|current| {
        if current == value {
            return false;
        }
        *current = value.clone();
        true
    });
}
