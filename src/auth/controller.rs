//! The per-request state machine.
//!
//! Every request is classified into a [`FlowState`] from the decoded cookie,
//! combined with what the request is asking for, and handed to the active
//! [`AuthFlow`]. The controller owns everything the schemes have in common:
//! expiry stamping, keepalive, tenant carry-over, IdP timeouts and deciding
//! whether the cookie has to be rewritten.

use serde_json::Value;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, warn};

use super::{
    error::FlowError,
    flow::{AuthFlow, Challenge, FlowRequest, LogoutPolicy, Step},
    redirect::RedirectPolicy,
};
use crate::{
    config::SecurityConfig,
    session::{AuthSession, AuthType, SecuritySessionCookie, SessionRecord, is_valid},
};

/// Where a session stands before the request is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Unauthenticated,
    PendingCallback,
    Authenticated,
}

impl FlowState {
    /// `valid` is the validator's verdict on the cookie the record came from.
    /// A completed session only counts when it was established by `active`.
    #[must_use]
    pub fn classify(record: &SessionRecord, valid: bool, active: AuthType) -> Self {
        match &record.auth {
            Some(session) if session.is_pending() => Self::PendingCallback,
            Some(session) if valid && session.auth_type() == active => Self::Authenticated,
            _ => Self::Unauthenticated,
        }
    }
}

/// Why a request was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    InvalidCredentials,
    CorrelationMismatch,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Session is live, serve the request.
    PassThrough,
    /// The browser has more to do.
    Continue(Challenge),
    /// A session was just established.
    Authenticated { next_url: Option<String> },
    Rejected(Rejection),
    /// The identity provider or backend could not be used.
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CookieAction {
    Keep,
    Save { max_age: Option<Duration> },
    Clear,
}

/// Result of handling one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub record: SessionRecord,
    pub outcome: Outcome,
    pub cookie: CookieAction,
}

/// Result of a logout.
#[derive(Clone, Debug, PartialEq)]
pub struct Logout {
    pub record: SessionRecord,
    pub cookie: CookieAction,
    pub redirect: Option<String>,
}

pub struct FlowController {
    flow: Arc<dyn AuthFlow>,
    redirects: RedirectPolicy,
    session_ttl: Duration,
    keepalive: bool,
    cookie_ttl: Option<Duration>,
    handshake_ttl: Duration,
    idp_timeout: Duration,
    logout_url: Option<String>,
}

impl FlowController {
    #[must_use]
    pub fn new(flow: Arc<dyn AuthFlow>, redirects: RedirectPolicy, config: &SecurityConfig) -> Self {
        Self {
            flow,
            redirects,
            session_ttl: config.session.ttl,
            keepalive: config.session.keepalive,
            cookie_ttl: config.cookie.ttl,
            handshake_ttl: config.cookie.handshake_ttl,
            idp_timeout: config.auth.idp_timeout,
            logout_url: config.auth.logout_url.clone(),
        }
    }

    #[must_use]
    pub fn flow(&self) -> &dyn AuthFlow {
        self.flow.as_ref()
    }

    #[must_use]
    pub fn redirects(&self) -> &RedirectPolicy {
        &self.redirects
    }

    /// Advance the session for one request.
    pub async fn handle(
        &self,
        cookie: Option<SecuritySessionCookie>,
        request: FlowRequest,
        now: i64,
    ) -> Transition {
        let valid = is_valid(cookie.as_ref(), now);
        let original = decode(cookie);
        let active = self.flow.auth_type();
        let state = FlowState::classify(&original, valid, active);

        let current = if state == FlowState::Unauthenticated {
            match (&original.auth, original.username()) {
                (Some(session), Some(username)) if session.auth_type() != active => {
                    debug!(
                        "Restarting login for {username}: {} session under {active}",
                        session.auth_type()
                    );
                }
                (_, Some(username)) => debug!("Session of {username} expired"),
                _ => {}
            }
            original.without_auth()
        } else {
            original.clone()
        };

        let result = match (state, &request) {
            (FlowState::Authenticated, FlowRequest::Access(access)) => {
                let overridden = current
                    .identity()
                    .is_some_and(|identity| self.flow.overrides_session(identity, access));
                if !overridden {
                    return self.pass_through(original, now);
                }
                debug!("Request credentials replace the {} session", self.flow.auth_type());
                self.bounded(self.flow.authenticate(&request, now)).await
            }
            (FlowState::Authenticated, FlowRequest::StartLogin { next_url }) => {
                let next_url = self.redirects.sanitize(next_url.as_deref());
                return self.write(
                    &original,
                    original.clone(),
                    Outcome::Authenticated {
                        next_url: Some(next_url),
                    },
                );
            }
            (
                FlowState::Authenticated,
                FlowRequest::OidcCallback { .. } | FlowRequest::SamlCallback { .. },
            ) => {
                warn!("Callback received without a pending handshake");
                return self.write(
                    &original,
                    original.clone(),
                    Outcome::Rejected(Rejection::CorrelationMismatch),
                );
            }
            (
                FlowState::PendingCallback,
                FlowRequest::OidcCallback { .. } | FlowRequest::SamlCallback { .. },
            ) => match &current.auth {
                Some(pending) => self.bounded(self.flow.resume(pending, &request, now)).await,
                None => Err(FlowError::CorrelationMismatch),
            },
            (
                FlowState::Unauthenticated,
                FlowRequest::OidcCallback { .. } | FlowRequest::SamlCallback { .. },
            ) => Err(FlowError::CorrelationMismatch),
            (FlowState::Authenticated, FlowRequest::PasswordLogin { .. })
            | (
                FlowState::PendingCallback | FlowState::Unauthenticated,
                FlowRequest::Access(_)
                | FlowRequest::PasswordLogin { .. }
                | FlowRequest::StartLogin { .. },
            ) => self.bounded(self.flow.authenticate(&request, now)).await,
        };

        self.apply(&original, current, result, now)
    }

    /// End the session according to the scheme's logout policy.
    pub async fn logout(&self, cookie: Option<SecuritySessionCookie>) -> Logout {
        let original = decode(cookie);

        let redirect = match tokio::time::timeout(
            self.idp_timeout,
            self.flow.logout_redirect(original.identity()),
        )
        .await
        {
            Ok(redirect) => redirect,
            Err(_) => {
                warn!("Timed out resolving the logout redirect");
                None
            }
        }
        .or_else(|| self.logout_url.clone());

        let record = match self.flow.logout_policy() {
            LogoutPolicy::ClearAll => SessionRecord::default(),
            LogoutPolicy::PreserveTenant => original.without_auth(),
        };
        let cookie = self.cookie_action(&original, &record);

        Logout {
            record,
            cookie,
            redirect,
        }
    }

    /// Store `tenant` on an established session.
    ///
    /// Returns `None` when the record has no identity.
    #[must_use]
    pub fn select_tenant(&self, record: &SessionRecord, tenant: Value) -> Option<SessionRecord> {
        record.identity()?;
        Some(SessionRecord {
            auth: record.auth.clone(),
            tenant: Some(tenant),
        })
    }

    /// `Max-Age` for a record about to be written.
    #[must_use]
    pub fn max_age(&self, record: &SessionRecord) -> Option<Duration> {
        match &record.auth {
            Some(session) if session.is_pending() => Some(self.handshake_ttl),
            _ => self.cookie_ttl,
        }
    }

    fn pass_through(&self, original: SessionRecord, now: i64) -> Transition {
        if !self.keepalive {
            return Transition {
                record: original,
                outcome: Outcome::PassThrough,
                cookie: CookieAction::Keep,
            };
        }

        let mut record = original.clone();
        if let Some(identity) = record.auth.as_mut().and_then(AuthSession::identity_mut) {
            identity.expiry_time = Some(self.expiry(now));
        }
        self.write(&original, record, Outcome::PassThrough)
    }

    async fn bounded<F>(&self, step: F) -> Result<Step, FlowError>
    where
        F: Future<Output = Result<Step, FlowError>>,
    {
        tokio::time::timeout(self.idp_timeout, step)
            .await
            .unwrap_or_else(|_| {
                Err(FlowError::IdentityProvider(format!(
                    "no answer within {}s",
                    self.idp_timeout.as_secs()
                )))
            })
    }

    fn apply(
        &self,
        original: &SessionRecord,
        current: SessionRecord,
        result: Result<Step, FlowError>,
        now: i64,
    ) -> Transition {
        match result {
            Ok(Step::Challenge(challenge)) => {
                self.write(original, current, Outcome::Continue(challenge))
            }
            Ok(Step::Handshake { pending, redirect }) => {
                debug!("Parking {} handshake", pending.auth_type());
                let record = SessionRecord {
                    auth: Some(pending),
                    tenant: current.tenant,
                };
                self.write(original, record, Outcome::Continue(Challenge::Redirect(redirect)))
            }
            Ok(Step::Established {
                mut session,
                next_url,
            }) => {
                let username = session.identity_mut().map(|identity| {
                    identity.expiry_time = Some(self.expiry(now));
                    identity.username.clone()
                });
                let tenant = match (original.username(), username.as_deref()) {
                    (Some(previous), Some(next)) if previous != next => None,
                    _ => current.tenant,
                };
                let record = SessionRecord {
                    auth: Some(session),
                    tenant,
                };
                self.write(original, record, Outcome::Authenticated { next_url })
            }
            Err(err) => {
                let outcome = match &err {
                    FlowError::CorrelationMismatch => {
                        warn!("Rejected {} callback: {err}", self.flow.auth_type());
                        Outcome::Rejected(Rejection::CorrelationMismatch)
                    }
                    FlowError::CredentialRejected => {
                        debug!("Authentication failed: {err}");
                        Outcome::Rejected(Rejection::InvalidCredentials)
                    }
                    FlowError::Unsupported(_) => {
                        debug!("{err}");
                        Outcome::Rejected(Rejection::Unsupported)
                    }
                    FlowError::IdentityProvider(_) => {
                        error!("Authentication could not complete: {err}");
                        Outcome::Failed
                    }
                };
                self.write(original, current.without_auth(), outcome)
            }
        }
    }

    fn write(&self, original: &SessionRecord, record: SessionRecord, outcome: Outcome) -> Transition {
        let cookie = self.cookie_action(original, &record);
        Transition {
            record,
            outcome,
            cookie,
        }
    }

    fn cookie_action(&self, original: &SessionRecord, record: &SessionRecord) -> CookieAction {
        if record == original {
            CookieAction::Keep
        } else if record.auth.is_none() && record.tenant.is_none() {
            CookieAction::Clear
        } else {
            CookieAction::Save {
                max_age: self.max_age(record),
            }
        }
    }

    fn expiry(&self, now: i64) -> i64 {
        let ttl = i64::try_from(self.session_ttl.as_millis()).unwrap_or(i64::MAX);
        now.saturating_add(ttl)
    }
}

fn decode(cookie: Option<SecuritySessionCookie>) -> SessionRecord {
    let Some(cookie) = cookie else {
        return SessionRecord::default();
    };
    SessionRecord::from_cookie(cookie).unwrap_or_else(|err| {
        debug!("Ignoring session cookie: {err}");
        SessionRecord::default()
    })
}
