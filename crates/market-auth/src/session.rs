//! Session state container with FSM-checked transitions.
//!
//! [`SessionStore`] owns the in-memory [`AuthSnapshot`], runs the identity
//! and profile operations, and persists the non-secret slice of the
//! snapshot after every change. Tokens never enter the snapshot; they stay in
//! the [`CredentialStore`].

use crate::client::ApiClient;
use crate::identity::IdentityClient;
use crate::models::{Actor, ConsumerProfile, RegisterRequest, Role, RoleProfile, VendorProfile};
use crate::navigation::{resolve_route, Route};
use crate::phase_fsm::{derive_phase, AuthPhase, PhaseMachine};
use crate::profile::ProfileLoader;
use crate::{AuthError, AuthResult};
use market_config::Config;
use market_storage::{CredentialStore, KeyValueStore, SnapshotStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Everything the UI layer observes about the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSnapshot {
    pub user: Option<Actor>,
    pub consumer: Option<ConsumerProfile>,
    pub vendor: Option<VendorProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AuthSnapshot {
    /// Current phase, derived from the fields.
    pub fn phase(&self) -> AuthPhase {
        derive_phase(
            self.is_authenticated,
            self.user.is_some(),
            self.has_profile(),
            self.is_loading,
            self.error.is_some(),
        )
    }

    /// Role of the current actor, if any.
    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().and_then(|user| user.role)
    }

    pub fn is_consumer(&self) -> bool {
        self.role() == Some(Role::Consumer)
    }

    pub fn is_vendor(&self) -> bool {
        self.role() == Some(Role::Vendor)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }

    /// Whether the profile matching the actor's role is loaded.
    pub fn has_profile(&self) -> bool {
        match self.role() {
            Some(Role::Consumer) => self.consumer.is_some(),
            Some(Role::Vendor) => self.vendor.is_some(),
            Some(Role::Admin) | None => false,
        }
    }

    /// The loaded profile matching the actor's role.
    pub fn role_profile(&self) -> Option<RoleProfile> {
        match self.role() {
            Some(Role::Consumer) => self.consumer.clone().map(RoleProfile::Consumer),
            Some(Role::Vendor) => self.vendor.clone().map(RoleProfile::Vendor),
            Some(Role::Admin) | None => None,
        }
    }

    /// Route the UI should show for this snapshot.
    pub fn route(&self) -> Route {
        resolve_route(self)
    }

    fn set_profile(&mut self, profile: Option<RoleProfile>) {
        match profile {
            Some(RoleProfile::Consumer(consumer)) => {
                self.consumer = Some(consumer);
                self.vendor = None;
            }
            Some(RoleProfile::Vendor(vendor)) => {
                self.vendor = Some(vendor);
                self.consumer = None;
            }
            None => {
                self.consumer = None;
                self.vendor = None;
            }
        }
    }
}

/// The durable slice of the snapshot. Loading and error flags are never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(default)]
    pub user: Option<Actor>,
    #[serde(default)]
    pub consumer: Option<ConsumerProfile>,
    #[serde(default)]
    pub vendor: Option<VendorProfile>,
    #[serde(default)]
    pub is_authenticated: bool,
}

impl PersistedSession {
    /// The signed-out slice, stored as an absent key.
    pub fn is_anonymous(&self) -> bool {
        *self == Self::default()
    }
}

impl From<&AuthSnapshot> for PersistedSession {
    fn from(snapshot: &AuthSnapshot) -> Self {
        Self {
            user: snapshot.user.clone(),
            consumer: snapshot.consumer.clone(),
            vendor: snapshot.vendor.clone(),
            is_authenticated: snapshot.is_authenticated,
        }
    }
}

/// Handle returned by [`SessionStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked with the new snapshot after every change.
pub type SessionListener = Arc<dyn Fn(&AuthSnapshot) + Send + Sync>;

struct SessionState {
    snapshot: AuthSnapshot,
    machine: PhaseMachine,
    /// Bumped on every sign-out; actions started under an older value may
    /// no longer change the snapshot.
    generation: u64,
}

/// Observable session state container.
pub struct SessionStore {
    identity: IdentityClient,
    profiles: ProfileLoader,
    credentials: CredentialStore,
    persisted: SnapshotStore<PersistedSession>,
    state: Mutex<SessionState>,
    listeners: Mutex<Vec<(SubscriptionId, SessionListener)>>,
    next_subscription: AtomicU64,
}

impl SessionStore {
    /// Create a store over an API client and a snapshot slot. Starts
    /// anonymous; call [`hydrate`](Self::hydrate) or
    /// [`restore`](Self::restore) to pick up a persisted session.
    pub fn new(api: Arc<ApiClient>, persisted: SnapshotStore<PersistedSession>) -> Self {
        Self {
            identity: IdentityClient::new(api.clone()),
            profiles: ProfileLoader::new(api.clone()),
            credentials: api.credentials().clone(),
            persisted,
            state: Mutex::new(SessionState {
                snapshot: AuthSnapshot::default(),
                machine: PhaseMachine::new(),
                generation: 0,
            }),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Wire the whole stack from configuration. Tokens go to `secrets`, the
    /// non-secret snapshot to `storage`; both may be the same backend.
    pub fn from_config(
        config: &Config,
        secrets: Arc<dyn KeyValueStore>,
        storage: Arc<dyn KeyValueStore>,
    ) -> AuthResult<Self> {
        let credentials = CredentialStore::with_key(secrets, config.credentials_key.clone());
        let persisted = SnapshotStore::with_key(storage, config.session_key.clone());
        let api = ApiClient::from_config(config, credentials)?;
        Ok(Self::new(Arc::new(api), persisted))
    }

    /// Identity client used by the actions.
    pub fn identity(&self) -> &IdentityClient {
        &self.identity
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.lock_state().snapshot.clone()
    }

    /// Current phase, read from the state machine.
    pub fn phase(&self) -> AuthPhase {
        AuthPhase::from(self.lock_state().machine.state())
    }

    pub fn role(&self) -> Option<Role> {
        self.snapshot().role()
    }

    pub fn is_consumer(&self) -> bool {
        self.snapshot().is_consumer()
    }

    pub fn is_vendor(&self) -> bool {
        self.snapshot().is_vendor()
    }

    pub fn is_admin(&self) -> bool {
        self.snapshot().is_admin()
    }

    pub fn has_profile(&self) -> bool {
        self.snapshot().has_profile()
    }

    pub fn route(&self) -> Route {
        self.snapshot().route()
    }

    /// Whether a credential pair is stored.
    pub fn has_credentials(&self) -> AuthResult<bool> {
        Ok(self.credentials.has_credentials()?)
    }

    /// Register a listener for snapshot changes.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&AuthSnapshot) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Sign in, then load the role profile.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Actor> {
        let generation = self.begin()?;
        let outcome = self.identity.login(email, password).await;
        self.finish_sign_in(generation, outcome).await
    }

    /// Create an account, then load the role profile.
    pub async fn register(&self, form: &RegisterRequest) -> AuthResult<Actor> {
        let generation = self.begin()?;
        let outcome = self.identity.register(form).await;
        self.finish_sign_in(generation, outcome).await
    }

    /// End the session. Always ends anonymous.
    ///
    /// Actions still in flight are cut off: whatever they return, they can no
    /// longer change the snapshot.
    pub async fn logout(&self) {
        self.lock_state().generation += 1;
        self.identity.logout().await;
        self.sign_out(None);
        info!("Session ended");
    }

    /// Re-fetch the actor from the server, then its profile.
    ///
    /// A transient failure keeps the current actor and records the error; an
    /// expired session signs out.
    pub async fn load_user(&self) -> AuthResult<Actor> {
        let generation = self.begin()?;

        let has_credentials = match self.credentials.has_credentials() {
            Ok(has) => has,
            Err(e) => return Err(self.fail(generation, e.into())),
        };
        if !has_credentials {
            return Err(self.fail(generation, AuthError::SessionExpired));
        }

        match self.identity.get_current_user().await {
            Ok(actor) => self.complete_sign_in(generation, actor).await,
            Err(e) => Err(self.fail(generation, e)),
        }
    }

    /// Re-run the profile loader for the current actor.
    ///
    /// A failed load keeps whatever profile is already held.
    pub async fn load_profile(&self) -> AuthResult<Option<RoleProfile>> {
        let actor = match self.snapshot().user {
            Some(actor) => actor,
            None => return Ok(None),
        };

        let generation = self.begin()?;
        let committed = match self.profiles.load(&actor).await {
            Ok(profile) => self.commit_at(generation, |s| {
                s.set_profile(profile);
                s.is_loading = false;
            }),
            Err(AuthError::SessionExpired) => {
                return Err(self.fail(generation, AuthError::SessionExpired))
            }
            Err(e) => {
                warn!(user_id = %actor.id, error = %e, "Profile reload failed, keeping current profile");
                self.commit_at(generation, |s| s.is_loading = false)
            }
        };

        match committed {
            Ok(snapshot) => Ok(snapshot.role_profile()),
            Err(e) => Err(self.fail(generation, e)),
        }
    }

    /// Load the persisted snapshot. An authenticated snapshot is trusted only
    /// when a credential pair is stored; otherwise it is discarded.
    pub async fn hydrate(&self) -> AuthResult<AuthPhase> {
        let generation = self.begin()?;
        match self.reconcile_persisted(generation) {
            Ok(snapshot) => {
                if let Some(user) = &snapshot.user {
                    info!(user_id = %user.id, role = ?user.role, "Session hydrated");
                }
                Ok(snapshot.phase())
            }
            Err(e) => Err(self.fail(generation, e)),
        }
    }

    /// Hydrate, then re-validate a trusted session with the server.
    pub async fn restore(&self) -> AuthResult<AuthPhase> {
        let phase = self.hydrate().await?;
        if phase.is_authenticated() {
            self.load_user().await?;
        }
        Ok(self.phase())
    }

    /// Replace the actor wholesale. A profile that no longer matches the
    /// actor's role is dropped.
    pub fn set_actor(&self, actor: Actor) -> AuthResult<()> {
        self.commit(|s| {
            match actor.role {
                Some(Role::Consumer) => s.vendor = None,
                Some(Role::Vendor) => s.consumer = None,
                Some(Role::Admin) | None => {
                    s.consumer = None;
                    s.vendor = None;
                }
            }
            s.user = Some(actor);
        })?;
        Ok(())
    }

    pub fn set_consumer_profile(&self, profile: Option<ConsumerProfile>) -> AuthResult<()> {
        self.commit(|s| s.consumer = profile)?;
        Ok(())
    }

    pub fn set_vendor_profile(&self, profile: Option<VendorProfile>) -> AuthResult<()> {
        self.commit(|s| s.vendor = profile)?;
        Ok(())
    }

    pub fn clear_error(&self) -> AuthResult<()> {
        self.commit(|s| s.error = None)?;
        Ok(())
    }

    fn reconcile_persisted(&self, generation: u64) -> AuthResult<AuthSnapshot> {
        let stored = match self.persisted.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session snapshot");
                self.persisted.clear()?;
                None
            }
        };
        let has_credentials = self.credentials.has_credentials()?;

        match stored {
            Some(slice) if slice.is_authenticated && slice.user.is_some() && has_credentials => {
                debug!("Restoring persisted session");
                self.commit_at(generation, |s| {
                    s.user = slice.user;
                    s.consumer = slice.consumer;
                    s.vendor = slice.vendor;
                    s.is_authenticated = true;
                    s.is_loading = false;
                })
            }
            Some(slice) => {
                if slice.is_authenticated {
                    info!("Persisted session has no credentials, discarding");
                }
                self.persisted.clear()?;
                self.commit_at(generation, |s| *s = AuthSnapshot::default())
            }
            None => self.commit_at(generation, |s| *s = AuthSnapshot::default()),
        }
    }

    /// Settle a login or registration. A sign-in that does not end
    /// authenticated leaves no credential pair behind.
    async fn finish_sign_in(&self, generation: u64, outcome: AuthResult<Actor>) -> AuthResult<Actor> {
        let result = match outcome {
            Ok(actor) => self.complete_sign_in(generation, actor).await,
            Err(e) => Err(self.fail(generation, e)),
        };

        match result {
            Err(error @ AuthError::Storage(_)) => {
                // Nothing durable may claim a session the store could not record.
                warn!(error = %error, "Sign-in aborted");
                self.drop_credentials();
                self.sign_out(Some(error.to_string()));
                Err(error)
            }
            Err(e) => {
                self.drop_orphaned_credentials();
                Err(e)
            }
            Ok(actor) => Ok(actor),
        }
    }

    /// Store the actor, load its profile, and clear the loading flag in one
    /// final update.
    async fn complete_sign_in(&self, generation: u64, actor: Actor) -> AuthResult<Actor> {
        let previous_id = self.snapshot().user.map(|user| user.id);
        let same_actor = previous_id.as_deref() == Some(actor.id.as_str());

        let stored = actor.clone();
        if let Err(e) = self.commit_at(generation, |s| {
            if !same_actor || s.role() != stored.role {
                s.set_profile(None);
            }
            s.user = Some(stored);
            s.is_authenticated = true;
        }) {
            return Err(self.fail(generation, e));
        }

        // `None` keeps whatever profile is held; a fresh actor has none.
        let resolved = match self.profiles.load(&actor).await {
            Ok(profile) => Some(profile),
            Err(AuthError::SessionExpired) => {
                return Err(self.fail(generation, AuthError::SessionExpired))
            }
            Err(e) => {
                warn!(user_id = %actor.id, error = %e, "Profile load failed, continuing without profile");
                None
            }
        };

        let snapshot = match self.commit_at(generation, |s| {
            if let Some(profile) = resolved {
                s.set_profile(profile);
            }
            s.is_loading = false;
        }) {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.fail(generation, e)),
        };

        info!(
            user_id = %actor.id,
            role = ?actor.role,
            phase = snapshot.phase().as_str(),
            "Signed in"
        );
        Ok(actor)
    }

    /// Enter `Authenticating` and return the generation the action runs under.
    fn begin(&self) -> AuthResult<u64> {
        let generation = self.lock_state().generation;
        self.commit_at(generation, |s| {
            s.is_loading = true;
            s.error = None;
        })?;
        Ok(generation)
    }

    /// Record a failed action and hand the error back. An expired session
    /// also signs out.
    fn fail(&self, generation: u64, error: AuthError) -> AuthError {
        if error.is_terminal() {
            self.drop_credentials();
            self.sign_out(Some(error.to_string()));
            return error;
        }

        let message = error.to_string();
        match self.commit_at(generation, |s| {
            s.is_loading = false;
            s.error = Some(message);
        }) {
            Ok(_) => {}
            Err(AuthError::Superseded) => debug!(error = %error, "Dropping error of a superseded action"),
            Err(e) => warn!(error = %e, "Failed to record action error"),
        }
        error
    }

    fn drop_credentials(&self) {
        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear credentials");
        }
    }

    /// Clear a pair written by a sign-in that lost its session, unless another
    /// sign-in now owns the store.
    fn drop_orphaned_credentials(&self) {
        let state = self.lock_state();
        if state.snapshot.is_authenticated || state.snapshot.is_loading {
            return;
        }
        match self.credentials.clear() {
            Ok(()) => debug!("Cleared credentials left by an unfinished sign-in"),
            Err(e) => warn!(error = %e, "Failed to clear credentials after failed sign-in"),
        }
    }

    /// Reset to the anonymous snapshot, carrying `error` when the machine
    /// allows it. Always succeeds in memory; a failure to remove the
    /// persisted slice is logged.
    fn sign_out(&self, error: Option<String>) {
        let (snapshot, changed) = {
            let mut state = self.lock_state();
            state.generation += 1;

            let mut next = AuthSnapshot {
                error,
                ..AuthSnapshot::default()
            };
            let from = AuthPhase::from(state.machine.state());
            let to = next.phase();
            if from != to && state.machine.consume(&to.input()).is_err() {
                next.error = None;
                state.machine = PhaseMachine::new();
            }

            if let Err(e) = self.persisted.clear() {
                warn!(error = %e, "Failed to remove persisted session");
            }

            let changed = next != state.snapshot;
            state.snapshot = next.clone();
            (next, changed)
        };

        if changed {
            self.notify(&snapshot);
        }
    }

    fn commit<F>(&self, update: F) -> AuthResult<AuthSnapshot>
    where
        F: FnOnce(&mut AuthSnapshot),
    {
        self.apply(None, update)
    }

    /// Like [`commit`](Self::commit), but refuses with
    /// [`AuthError::Superseded`] once the session that started the action
    /// has been signed out.
    fn commit_at<F>(&self, generation: u64, update: F) -> AuthResult<AuthSnapshot>
    where
        F: FnOnce(&mut AuthSnapshot),
    {
        self.apply(Some(generation), update)
    }

    /// Apply `update` to a copy of the snapshot, check the phase change
    /// against the machine, persist, then notify listeners. Nothing changes
    /// when the transition is illegal or the slice cannot be persisted.
    fn apply<F>(&self, generation: Option<u64>, update: F) -> AuthResult<AuthSnapshot>
    where
        F: FnOnce(&mut AuthSnapshot),
    {
        let snapshot = {
            let mut state = self.lock_state();
            if generation.is_some_and(|expected| expected != state.generation) {
                return Err(AuthError::Superseded);
            }

            let mut next = state.snapshot.clone();
            update(&mut next);
            if next == state.snapshot {
                return Ok(next);
            }

            let from = AuthPhase::from(state.machine.state());
            let to = next.phase();
            let mut machine = PhaseMachine::from_state(state.machine.state().clone());
            if from != to {
                machine.consume(&to.input()).map_err(|_| {
                    AuthError::InvalidStateTransition(format!(
                        "cannot move from {:?} to {:?}",
                        from, to
                    ))
                })?;
            }

            let before = PersistedSession::from(&state.snapshot);
            let after = PersistedSession::from(&next);
            if before != after {
                self.persist(&after)?;
            }

            if from != to {
                debug!(from = from.as_str(), to = to.as_str(), "Auth phase transition");
            }
            state.machine = machine;
            state.snapshot = next.clone();
            next
        };

        self.notify(&snapshot);
        Ok(snapshot)
    }

    fn persist(&self, slice: &PersistedSession) -> AuthResult<()> {
        if slice.is_anonymous() {
            self.persisted.clear()?;
        } else {
            self.persisted.save(slice)?;
        }
        Ok(())
    }

    fn notify(&self, snapshot: &AuthSnapshot) {
        let listeners: Vec<SessionListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
