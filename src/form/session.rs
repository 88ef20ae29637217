use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::rules::{self, FieldRule};
use super::validate::{FieldErrors, Validators};
use super::{FieldValue, FormValues, Trigger, ValidationPolicy};
use crate::api::{ApiError, ApiResult};

/// Called with a snapshot of the values when a valid form is submitted.
/// The token is cancelled when the owning form is disposed.
pub type SubmitHandler = Box<dyn FnMut(FormValues, CancellationToken) -> PendingSubmit + Send>;

/// Completion side of a [`PendingSubmit`].
#[derive(Debug)]
pub struct SubmitResolver {
    tx: Sender<ApiResult<()>>,
}

impl SubmitResolver {
    pub fn resolve(self, result: ApiResult<()>) {
        if self.tx.send(result).is_err() {
            trace!("submit result discarded: form already gone");
        }
    }
}

/// An in-flight submission, polled by the event loop.
#[derive(Debug)]
pub struct PendingSubmit {
    rx: Receiver<ApiResult<()>>,
}

impl PendingSubmit {
    pub fn channel() -> (SubmitResolver, Self) {
        let (tx, rx) = mpsc::channel();
        (SubmitResolver { tx }, Self { rx })
    }

    /// Already resolved with `result`.
    pub fn ready(result: ApiResult<()>) -> Self {
        let (resolver, pending) = Self::channel();
        resolver.resolve(result);
        pending
    }

    /// Run `job` on a worker thread. The job is skipped, and its result
    /// dropped, once `token` is cancelled.
    pub fn spawn(token: CancellationToken, job: impl FnOnce() -> ApiResult<()> + Send + 'static) -> Self {
        let (resolver, pending) = Self::channel();
        let spawned = std::thread::Builder::new().name("wgadm-submit".into()).spawn(move || {
            if token.is_cancelled() {
                trace!("submit cancelled before start");
                return;
            }
            let result = job();
            if token.is_cancelled() {
                trace!("submit finished after cancellation; result dropped");
                return;
            }
            resolver.resolve(result);
        });
        match spawned {
            Ok(_) => pending,
            Err(e) => Self::ready(Err(ApiError::Transport(format!("cannot start request: {e}")))),
        }
    }

    fn try_take(&self) -> Option<ApiResult<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(ApiError::Transport("request ended without a response".into())))
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubmitAttempt {
    /// A submission is already in flight, or the form was disposed.
    Busy,
    /// Client validation failed; nothing was sent.
    Invalid,
    Dispatched,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Succeeded,
    /// The server rejected the value of `field`; its error is now visible.
    Rejected { field: &'static str },
    /// Not attributable to a field. The message is also kept as
    /// [`FormSession::failure`].
    Failed(String),
}

/// State of one open form: values, interaction flags, errors and the
/// submission in flight.
pub struct FormSession {
    values: FormValues,
    policy: ValidationPolicy,
    validators: Validators,
    rules: Vec<Box<dyn FieldRule>>,
    on_submit: SubmitHandler,
    touched: BTreeSet<&'static str>,
    dirty: BTreeSet<&'static str>,
    errors: FieldErrors,
    server_errors: FieldErrors,
    failure: Option<String>,
    submit_count: u32,
    pending: Option<PendingSubmit>,
    token: CancellationToken,
    disposed: bool,
    last_writes: Vec<&'static str>,
}

impl std::fmt::Debug for FormSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSession")
            .field("values", &self.values)
            .field("errors", &self.errors)
            .field("server_errors", &self.server_errors)
            .field("submit_count", &self.submit_count)
            .field("submitting", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}

impl FormSession {
    pub fn new(
        defaults: FormValues,
        policy: ValidationPolicy,
        validators: Validators,
        on_submit: SubmitHandler,
    ) -> Self {
        let errors = validators.change_errors(&defaults, false);
        Self {
            values: defaults,
            policy,
            validators,
            rules: Vec::new(),
            on_submit,
            touched: BTreeSet::new(),
            dirty: BTreeSet::new(),
            errors,
            server_errors: FieldErrors::new(),
            failure: None,
            submit_count: 0,
            pending: None,
            token: CancellationToken::new(),
            disposed: false,
            last_writes: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: impl FieldRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    fn key(&self, field: &str) -> Option<&'static str> {
        self.values.keys().copied().find(|k| *k == field)
    }

    fn revalidate(&mut self) {
        self.errors = self.validators.change_errors(&self.values, self.submit_count > 0);
    }

    /// A user edit of `field`. Cross-field rules run once for it.
    pub fn input(&mut self, field: &str, value: FieldValue) {
        let Some(key) = self.key(field) else {
            warn!(field, "input for unknown field ignored");
            return;
        };
        if self.disposed {
            return;
        }
        self.values.insert(key, value);
        self.dirty.insert(key);
        let (next, writes) = rules::reconcile(&self.rules, key, &self.values);
        self.values = next;
        self.server_errors.remove(key);
        for w in &writes {
            self.server_errors.remove(w);
        }
        if !writes.is_empty() {
            debug!(field = key, ?writes, "rules updated dependent fields");
        }
        self.last_writes = std::iter::once(key).chain(writes).collect();
        self.failure = None;
        if self.policy.runs_on(Trigger::OnChange, self.submit_count > 0) {
            self.revalidate();
        }
    }

    /// Programmatic write. Does not mark the field dirty or run rules.
    pub fn set_value(&mut self, field: &str, value: FieldValue) {
        let Some(key) = self.key(field) else {
            warn!(field, "set_value for unknown field ignored");
            return;
        };
        self.values.insert(key, value);
        self.server_errors.remove(key);
        if self.policy.runs_on(Trigger::OnChange, self.submit_count > 0) {
            self.revalidate();
        }
    }

    pub fn blur(&mut self, field: &str) {
        let Some(key) = self.key(field) else { return };
        self.touched.insert(key);
        if self.policy.runs_on(Trigger::OnBlur, self.submit_count > 0) {
            self.revalidate();
        }
    }

    /// Error to display for `field`, if any. Client errors stay hidden until
    /// the field was touched or edited, or a submit was attempted.
    pub fn visible_error(&self, field: &str) -> Option<&str> {
        if let Some(msg) = self.server_errors.get(field) {
            return Some(msg);
        }
        let msg = self.errors.get(field)?;
        let shown = self.submit_count > 0 || self.touched.contains(field) || self.dirty.contains(field);
        shown.then_some(msg.as_str())
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.server_errors.is_empty()
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn is_dirty(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    pub fn is_submitting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn submit_count(&self) -> u32 {
        self.submit_count
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Fields written by the most recent [`input`](Self::input), edited field first.
    pub fn last_writes(&self) -> &[&'static str] {
        &self.last_writes
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn handle_submit(&mut self) -> SubmitAttempt {
        if self.disposed || self.pending.is_some() {
            debug!("submit ignored: already submitting");
            return SubmitAttempt::Busy;
        }
        self.submit_count += 1;
        self.server_errors.clear();
        self.failure = None;
        self.errors = self.validators.submit_errors(&self.values);
        if !self.errors.is_empty() {
            debug!(errors = self.errors.len(), "submit blocked by validation");
            return SubmitAttempt::Invalid;
        }
        let pending = (self.on_submit)(self.values.clone(), self.token.clone());
        self.pending = Some(pending);
        SubmitAttempt::Dispatched
    }

    /// Collect the result of the submission in flight, if it has resolved.
    pub fn poll_submit(&mut self) -> Option<SubmitOutcome> {
        let result = self.pending.as_ref()?.try_take()?;
        self.pending = None;
        let outcome = match result {
            Ok(()) => SubmitOutcome::Succeeded,
            Err(ApiError::Problem(problem)) => {
                match problem.field.as_deref().and_then(|f| self.key(f)) {
                    Some(field) => {
                        self.server_errors.insert(field, problem.message().to_string());
                        SubmitOutcome::Rejected { field }
                    }
                    None => {
                        self.failure = Some(problem.message().to_string());
                        SubmitOutcome::Failed(problem.message().to_string())
                    }
                }
            }
            Err(err @ ApiError::Transport(_)) => {
                self.failure = Some(err.to_string());
                SubmitOutcome::Failed(err.to_string())
            }
        };
        debug!(?outcome, "submit resolved");
        Some(outcome)
    }

    /// Cancel any submission in flight. The session ignores it from now on.
    pub fn dispose(&mut self) {
        self.token.cancel();
        self.pending = None;
        self.disposed = true;
    }
}

impl Drop for FormSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProblemDetails;
    use crate::form::{Check, MutuallyExclusive, Schema};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn text_values(fields: &[&'static str]) -> FormValues {
        fields.iter().map(|f| (*f, FieldValue::text(""))).collect()
    }

    fn ok_submit() -> SubmitHandler {
        Box::new(|_, _| PendingSubmit::ready(Ok(())))
    }

    fn user_form() -> FormSession {
        let schema = Schema::new()
            .field("username", [Check::Required])
            .field("email", [Check::Required, Check::Email]);
        FormSession::new(
            text_values(&["username", "email"]),
            ValidationPolicy::standard(),
            Validators::on_submit(schema),
            ok_submit(),
        )
    }

    #[test]
    fn errors_hidden_until_interaction() {
        let mut form = user_form();
        assert!(!form.is_valid());
        assert_eq!(form.visible_error("username"), None);

        form.input("email", FieldValue::text("nope"));
        assert_eq!(form.visible_error("email"), Some("Enter a valid email address"));
        assert_eq!(form.visible_error("username"), None);

        form.blur("username");
        assert_eq!(form.visible_error("username"), Some("This field is required"));
    }

    #[test]
    fn submit_reveals_all_errors_and_change_clears_them() {
        let mut form = user_form();
        assert_eq!(form.handle_submit(), SubmitAttempt::Invalid);
        assert_eq!(form.submit_count(), 1);
        assert!(form.visible_error("username").is_some());
        assert!(form.visible_error("email").is_some());

        form.input("username", FieldValue::text("alice"));
        assert_eq!(form.visible_error("username"), None);
        form.input("email", FieldValue::text("alice@example.com"));
        assert_eq!(form.visible_error("email"), None);
        assert!(form.is_valid());
    }

    #[test]
    fn second_submit_is_blocked_while_pending() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let mut form = FormSession::new(
            text_values(&["name"]),
            ValidationPolicy::standard(),
            Validators::default(),
            Box::new(move |_, _| {
                let (resolver, pending) = PendingSubmit::channel();
                sink.lock().push(resolver);
                pending
            }),
        );

        assert_eq!(form.handle_submit(), SubmitAttempt::Dispatched);
        assert!(form.is_submitting());
        assert_eq!(form.handle_submit(), SubmitAttempt::Busy);
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(form.poll_submit(), None);

        if let Some(resolver) = calls.lock().pop() {
            resolver.resolve(Ok(()));
        }
        assert_eq!(form.poll_submit(), Some(SubmitOutcome::Succeeded));
        assert!(!form.is_submitting());
        assert_eq!(form.handle_submit(), SubmitAttempt::Dispatched);
    }

    #[test]
    fn server_error_maps_to_field_until_edited() {
        let mut form = FormSession::new(
            text_values(&["name"]),
            ValidationPolicy::standard(),
            Validators::default(),
            Box::new(|_, _| PendingSubmit::ready(Err(ApiError::conflict("name", "name already taken")))),
        );
        assert_eq!(form.handle_submit(), SubmitAttempt::Dispatched);
        assert_eq!(form.poll_submit(), Some(SubmitOutcome::Rejected { field: "name" }));
        assert_eq!(form.visible_error("name"), Some("name already taken"));
        assert!(!form.is_valid());

        form.input("name", FieldValue::text("other"));
        assert_eq!(form.visible_error("name"), None);
    }

    #[test]
    fn unmapped_error_becomes_failure() {
        let mut form = FormSession::new(
            text_values(&["name"]),
            ValidationPolicy::standard(),
            Validators::default(),
            Box::new(|_, _| {
                PendingSubmit::ready(Err(ApiError::Problem(ProblemDetails::new(500, "Internal error"))))
            }),
        );
        form.handle_submit();
        assert_eq!(form.poll_submit(), Some(SubmitOutcome::Failed("Internal error".into())));
        assert_eq!(form.failure(), Some("Internal error"));
    }

    #[test]
    fn dispose_cancels_and_ignores_late_result() {
        let tokens = Arc::new(Mutex::new(Vec::new()));
        let resolvers = Arc::new(Mutex::new(Vec::new()));
        let (t, r) = (Arc::clone(&tokens), Arc::clone(&resolvers));
        let mut form = FormSession::new(
            text_values(&["name"]),
            ValidationPolicy::standard(),
            Validators::default(),
            Box::new(move |_, token| {
                t.lock().push(token);
                let (resolver, pending) = PendingSubmit::channel();
                r.lock().push(resolver);
                pending
            }),
        );
        form.handle_submit();
        form.dispose();
        assert!(tokens.lock()[0].is_cancelled());
        for resolver in resolvers.lock().drain(..) {
            resolver.resolve(Ok(()));
        }
        assert_eq!(form.poll_submit(), None);
        assert_eq!(form.handle_submit(), SubmitAttempt::Busy);
    }

    #[test]
    fn rule_writes_are_reported_in_one_update() {
        let mut values = FormValues::new();
        values.insert("location_mfa_mode", FieldValue::choice("internal"));
        values.insert("service_location_mode", FieldValue::choice("disabled"));
        let mut form = FormSession::new(values, ValidationPolicy::standard(), Validators::default(), ok_submit())
            .with_rule(MutuallyExclusive::new(
                "location_mfa_mode",
                FieldValue::choice("disabled"),
                "service_location_mode",
                FieldValue::choice("disabled"),
            ));

        form.input("service_location_mode", FieldValue::choice("prelogon"));

        assert_eq!(form.value("location_mfa_mode"), Some(&FieldValue::choice("disabled")));
        assert_eq!(form.value("service_location_mode"), Some(&FieldValue::choice("prelogon")));
        assert_eq!(form.last_writes(), ["service_location_mode", "location_mfa_mode"]);
        assert!(form.is_dirty("service_location_mode"));
        assert!(!form.is_dirty("location_mfa_mode"));
    }
}
