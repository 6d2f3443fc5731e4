use log::debug;

pub mod app;
pub mod user;

pub use app::{AppAction, AppState};
pub use user::{UserAction, UserState};

/// Owner of the user-intent slice.
#[derive(Debug)]
pub struct UserStore {
    state: UserState,
}

impl UserStore {
    pub fn new(state: UserState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &UserState {
        &self.state
    }

    /// Applies `action` and returns the state it replaced.
    pub fn dispatch(&mut self, action: UserAction) -> UserState {
        debug!("User action: {:?}", action);
        let next = user::reduce(&self.state, action);
        std::mem::replace(&mut self.state, next)
    }
}

/// Owner of the derived slice: compiled SQL, fetched fields, loading, error.
#[derive(Debug, Default)]
pub struct AppStore {
    state: AppState,
}

impl AppStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn dispatch(&mut self, action: AppAction) {
        self.state = app::reduce(&self.state, action);
    }
}
