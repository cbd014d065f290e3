//! Session entity and issuance -- the access context's lifecycle for
//! logged-in clients.
//!
//! A session is inactive for up to three overlapping reasons: it was
//! replaced by a newer one, it expired, or it was cancelled. Replacement
//! forms a chain: the superseded session records the id of its leader.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::effect::Effect;
use crate::entity::{Entity, EventLog, domain_events, entity_id, impl_entity};

use super::account::AccountId;

/// Validity window granted on issue and on every extension.
const VALIDITY_DAYS: i64 = 60;

fn validity_window() -> Duration {
    Duration::days(VALIDITY_DAYS)
}

entity_id! {
    /// Identifier of a [`Session`].
    pub struct SessionId;
}

/// The validity window of a session. Extension replaces the end with
/// `current_time + 60 days`; the start never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLifetime {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SessionLifetime {
    fn starting_at(current_time: DateTime<Utc>) -> Self {
        Self {
            start: current_time,
            end: current_time + validity_window(),
        }
    }

    fn extended_at(self, current_time: DateTime<Utc>) -> Self {
        Self {
            start: self.start,
            end: current_time + validity_window(),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether the window lies behind the given moment.
    pub fn expired_at(&self, current_time: DateTime<Utc>) -> bool {
        current_time > self.end
    }
}

domain_events! {
    /// Domain events produced by a [`Session`].
    pub enum SessionEvent, kind SessionEventKind {
        /// The session was issued.
        Created => Creation,
        /// The validity window was extended.
        Extended { new_lifetime: SessionLifetime } => Mutation,
        /// The session was cancelled.
        Cancelled => Mutation,
        /// A newer session took this one's place.
        Replaced { new_leader_session_id: SessionId } => Mutation,
        /// This session took an older one's place.
        BecameLeader { previous_session_id: SessionId } => Mutation,
    }
}

/// Why a session is not active. Reported in fixed priority order:
/// replacement first, then expiry, then cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InactivityReason {
    Replaced,
    Expired,
    Cancelled,
}

/// One logged-in client of an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    account_id: AccountId,
    lifetime: SessionLifetime,
    is_cancelled: bool,
    leader_session_id: Option<SessionId>,
    #[serde(skip)]
    log: EventLog<SessionEvent>,
}

impl_entity!(Session: SessionId, SessionEvent, "session");

impl Session {
    /// Issue a session valid for the next 60 days and register it with
    /// the effect.
    pub fn issue(
        id: SessionId,
        account_id: AccountId,
        current_time: DateTime<Utc>,
        effect: &mut Effect,
    ) -> Session {
        let mut session = Session {
            id,
            account_id,
            lifetime: SessionLifetime::starting_at(current_time),
            is_cancelled: false,
            leader_session_id: None,
            log: EventLog::new(),
        };
        session.log.record(SessionEvent::Created);
        effect.consider(&session);
        session
    }

    /// Reset the validity window to end 60 days from now. The start is
    /// untouched.
    pub fn extend(&mut self, current_time: DateTime<Utc>, effect: &mut Effect) {
        let new_lifetime = self.lifetime.extended_at(current_time);
        if new_lifetime == self.lifetime {
            return;
        }
        self.lifetime = new_lifetime;
        self.log.record(SessionEvent::Extended { new_lifetime });
        effect.consider(self);
    }

    /// Cancel the session. One-way: cancelling an already-cancelled
    /// session is a no-op and appends no duplicate event.
    /// `leader_session_id` is never cleared.
    pub fn cancel(&mut self, effect: &mut Effect) {
        if self.is_cancelled {
            return;
        }
        self.is_cancelled = true;
        self.log.record(SessionEvent::Cancelled);
        effect.consider(self);
    }

    /// Every reason this session is inactive at the given moment, in
    /// priority order. Empty means active.
    pub fn inactivity_reasons(&self, current_time: DateTime<Utc>) -> Vec<InactivityReason> {
        let mut reasons = Vec::new();
        if self.leader_session_id.is_some() {
            reasons.push(InactivityReason::Replaced);
        }
        if self.lifetime.expired_at(current_time) {
            reasons.push(InactivityReason::Expired);
        }
        if self.is_cancelled {
            reasons.push(InactivityReason::Cancelled);
        }
        reasons
    }

    /// Whether the session has no inactivity reasons at the given moment.
    pub fn is_active(&self, current_time: DateTime<Utc>) -> bool {
        self.inactivity_reasons(current_time).is_empty()
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn lifetime(&self) -> SessionLifetime {
        self.lifetime
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled
    }

    pub fn leader_session_id(&self) -> Option<SessionId> {
        self.leader_session_id
    }

    fn replaced_by(&mut self, new_leader_session_id: SessionId, effect: &mut Effect) {
        self.leader_session_id = Some(new_leader_session_id);
        self.log
            .record(SessionEvent::Replaced { new_leader_session_id });
        effect.consider(self);
    }

    fn became_leader_of(&mut self, previous_session_id: SessionId, effect: &mut Effect) {
        self.log
            .record(SessionEvent::BecameLeader { previous_session_id });
        effect.consider(self);
    }
}

/// Output of [`issue_session`]: the session the client should use from
/// now on, and the session it superseded, if any.
#[derive(Debug, Clone)]
pub struct SessionIssuance {
    pub session: Session,
    pub replaced: Option<Session>,
}

/// Issue a session for an account, given whatever session the client
/// currently holds. A current session of the same account that is still
/// active is extended with its identity preserved; a foreign or inactive
/// one counts as absent for extension purposes but is still chained: the
/// brand-new session becomes its leader.
pub fn issue_session(
    account_id: AccountId,
    current_time: DateTime<Utc>,
    current_session: Option<Session>,
    effect: &mut Effect,
) -> SessionIssuance {
    match current_session {
        Some(mut session)
            if session.account_id() == account_id && session.is_active(current_time) =>
        {
            session.extend(current_time, effect);
            SessionIssuance {
                session,
                replaced: None,
            }
        }
        Some(mut stale) => {
            let mut session = Session::issue(SessionId::random(), account_id, current_time, effect);
            stale.replaced_by(session.id(), effect);
            session.became_leader_of(stale.id(), effect);
            tracing::debug!(
                replaced = %stale.id(),
                leader = %session.id(),
                "session replaced"
            );
            SessionIssuance {
                session,
                replaced: Some(stale),
            }
        }
        None => SessionIssuance {
            session: Session::issue(SessionId::random(), account_id, current_time, effect),
            replaced: None,
        },
    }
}
