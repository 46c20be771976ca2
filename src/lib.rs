pub mod api;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod language;
pub mod locator;
pub mod query;
pub mod reference;
pub mod store;

use std::cell::{Cell, RefCell};

use tracing::{debug, info, info_span, warn};

use crate::api::{ApiClient, ApiHttp};
use crate::cache::ConfigCache;
use crate::config::{LauncherSettings, Platform, RepoConfig};
use crate::query::{LaunchOptions, LaunchTarget};
use crate::reference::ReferenceError;
use crate::store::KeyValueStore;

/// Repository offered before the user types anything.
pub const DEFAULT_REPOSITORY: &str = "https://github.com/hyy215/deepwiki-open.git";

/// Why a submit did not produce a launch. Display strings are user-facing.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(
        "Invalid repository format. Use \"owner/repo\", GitHub/GitLab/BitBucket URL, or a local folder path like \"/path/to/folder\" or \"C:\\path\\to\\folder\"."
    )]
    InvalidReference(#[source] ReferenceError),
    #[error("Failed to validate the authorization code")]
    AuthRejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Leave for the wiki page; the session stays marked as submitting.
    Navigate(LaunchTarget),
    /// A submit was already in flight.
    Ignored,
}

/// Session-scoped controller for one repository form.
///
/// Created by [`LaunchSession::start`] and torn down by
/// [`LaunchSession::dispose`] once navigation happens. Sessions are
/// single-threaded; the submit guard is a plain `Cell`.
pub struct LaunchSession<H, S> {
    api: ApiClient<H>,
    cache: ConfigCache<S>,
    repository_input: String,
    options: RepoConfig,
    language: String,
    access_token: String,
    auth_code: String,
    auth_required: bool,
    last_error: RefCell<Option<String>>,
    in_flight: Cell<bool>,
}

impl<H: ApiHttp, S: KeyValueStore> LaunchSession<H, S> {
    /// Open a session: query the auth requirement once, pick the starting
    /// language, and load any cached options for the default repository.
    pub fn start(
        api: ApiClient<H>,
        store: S,
        settings: &LauncherSettings,
        env_locale: Option<&str>,
    ) -> Self {
        let auth_required = auth::fetch_auth_required(&api);
        let language = language::initial_language(&store, env_locale, &settings.default_language);
        let mut options = RepoConfig::with_language(language.clone());
        options.selected_platform = settings.default_platform;

        let mut session = Self {
            api,
            cache: ConfigCache::new(store),
            repository_input: String::new(),
            options,
            language,
            access_token: String::new(),
            auth_code: String::new(),
            auth_required,
            last_error: RefCell::new(None),
            in_flight: Cell::new(false),
        };
        session.set_repository_input(DEFAULT_REPOSITORY);
        info!(
            auth_required = session.auth_required,
            language = %session.language,
            "launch session started"
        );
        session
    }

    pub fn api(&self) -> &ApiClient<H> {
        &self.api
    }

    pub fn cache(&self) -> &ConfigCache<S> {
        &self.cache
    }

    pub fn repository_input(&self) -> &str {
        &self.repository_input
    }

    /// Record new input and, when it is not blank, restore the options cached for it.
    pub fn set_repository_input(&mut self, input: &str) {
        self.repository_input = input.to_string();
        if input.trim().is_empty() {
            return;
        }
        if let Some(record) = self.cache.load(input) {
            debug!(input = input.trim(), "restoring cached repository options");
            self.apply_record(record);
        }
    }

    fn apply_record(&mut self, record: RepoConfig) {
        let language = if record.selected_language.is_empty() {
            self.language.clone()
        } else {
            record.selected_language.clone()
        };
        self.options = record;
        self.set_language(&language);
    }

    pub fn options(&self) -> &RepoConfig {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut RepoConfig {
        &mut self.options
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Switch the wiki language; unsupported codes become English. The choice is remembered.
    pub fn set_language(&mut self, code: &str) {
        let code = language::remember_language(self.cache.backing_store(), code);
        self.options.selected_language = code.clone();
        self.language = code;
    }

    pub fn set_comprehensive(&mut self, comprehensive: bool) {
        self.options.is_comprehensive_view = comprehensive;
    }

    pub fn set_provider(&mut self, provider: &str) {
        self.options.provider = provider.to_string();
    }

    pub fn set_model(&mut self, model: &str) {
        self.options.model = model.to_string();
    }

    /// Enable a free-form model name, or disable it with `None`.
    pub fn set_custom_model(&mut self, custom_model: Option<&str>) {
        match custom_model {
            Some(name) => {
                self.options.is_custom_model = true;
                self.options.custom_model = name.to_string();
            }
            None => self.options.is_custom_model = false,
        }
    }

    pub fn set_platform(&mut self, platform: Platform) {
        self.options.selected_platform = platform;
    }

    pub fn set_access_token(&mut self, token: &str) {
        self.access_token = token.to_string();
    }

    pub fn set_auth_code(&mut self, code: &str) {
        self.auth_code = code.to_string();
    }

    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.get()
    }

    /// User-facing message from the most recent failed submit.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    fn set_error(&self, message: Option<String>) {
        self.last_error.replace(message);
    }

    /// Validate, persist and turn the current form into a navigation target.
    ///
    /// Failures clear the in-flight flag so the user can retry; success
    /// leaves it set until the session is disposed.
    pub fn submit(&self) -> Result<SubmitOutcome, SubmitError> {
        if self.in_flight.replace(true) {
            info!("submission already in progress, ignoring duplicate submit");
            return Ok(SubmitOutcome::Ignored);
        }

        let span = info_span!("session.submit", input = %self.repository_input.trim());
        let _span_guard = span.enter();

        let reference = match reference::parse(&self.repository_input) {
            Ok(reference) => reference,
            Err(err) => return Err(self.abort(SubmitError::InvalidReference(err))),
        };

        if !auth::check(&self.api, self.auth_required, &self.auth_code) {
            return Err(self.abort(SubmitError::AuthRejected));
        }

        let mut record = self.options.clone();
        if record.selected_language.is_empty() {
            record.selected_language = self.language.clone();
        }
        if let Err(err) = self.cache.store(&self.repository_input, &record) {
            warn!(error = %err, "failed to cache repository options");
        }

        let target = query::build(
            &reference,
            &LaunchOptions {
                config: &record,
                access_token: &self.access_token,
                raw_input: &self.repository_input,
            },
        );
        self.set_error(None);
        info!(
            path = %target.path,
            kind = %reference.kind,
            "prepared wiki launch"
        );
        Ok(SubmitOutcome::Navigate(target))
    }

    fn abort(&self, err: SubmitError) -> SubmitError {
        warn!(error = %err, "launch aborted");
        self.set_error(Some(err.to_string()));
        self.in_flight.set(false);
        err
    }

    /// Navigation teardown.
    pub fn dispose(self) {
        debug!(submitting = self.is_submitting(), "launch session disposed");
    }
}
