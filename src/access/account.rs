//! Account aggregate root and its name history.
//!
//! The root owns its sessions and names by value. Exactly one name is
//! current; renaming back to a previous name reactivates it instead of
//! minting a new one. Password hashing is external -- the root only
//! stores and compares the opaque hash it is handed.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::effect::Effect;
use crate::entity::{Entity, EventLog, domain_events, entity_id, impl_entity};

use super::session::{InactivityReason, Session, SessionId, issue_session};

entity_id! {
    /// Identifier of an [`Account`].
    pub struct AccountId;
}

entity_id! {
    /// Identifier of an [`AccountName`].
    pub struct AccountNameId;
}

/// An externally computed password hash. Opaque to the core; compared
/// only for equality.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }
}

// Hashes stay out of debug output and logs.
impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(***)")
    }
}

domain_events! {
    /// Domain events produced by an [`AccountName`].
    pub enum AccountNameEvent, kind AccountNameEventKind {
        /// The name was taken for the first time.
        Created => Creation,
        /// A previous name became current again.
        BecameCurrent { new_taking_time: DateTime<Utc> } => Mutation,
        /// The name stopped being current.
        BecamePrevious => Mutation,
    }
}

/// Why a name could not be created.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameCreationError {
    #[error("an account name must not be empty")]
    EmptyName,
    #[error("the name is already taken")]
    TakenName,
}

/// One name an account holds or held, with every time it was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountName {
    id: AccountNameId,
    account_id: AccountId,
    text: String,
    taking_times: BTreeSet<DateTime<Utc>>,
    is_current: bool,
    #[serde(skip)]
    log: EventLog<AccountNameEvent>,
}

impl_entity!(AccountName: AccountNameId, AccountNameEvent, "account_name");

impl AccountName {
    /// Take a brand-new name for an account. The `is_name_taken`
    /// predicate is supplied by the caller (the uniqueness lookup lives
    /// in storage, not here) and is queried once per attempt.
    ///
    /// # Errors
    ///
    /// [`NameCreationError`]; the effect is left untouched.
    pub fn create(
        id: AccountNameId,
        account_id: AccountId,
        text: &str,
        current_time: DateTime<Utc>,
        effect: &mut Effect,
        is_name_taken: impl FnOnce(&str) -> bool,
    ) -> Result<AccountName, NameCreationError> {
        if text.trim().is_empty() {
            return Err(NameCreationError::EmptyName);
        }
        if is_name_taken(text) {
            return Err(NameCreationError::TakenName);
        }
        let mut name = AccountName {
            id,
            account_id,
            text: text.to_string(),
            taking_times: BTreeSet::from([current_time]),
            is_current: true,
            log: EventLog::new(),
        };
        name.log.record(AccountNameEvent::Created);
        effect.consider(&name);
        Ok(name)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn taking_times(&self) -> &BTreeSet<DateTime<Utc>> {
        &self.taking_times
    }

    pub fn is_current(&self) -> bool {
        self.is_current
    }

    fn become_current(&mut self, current_time: DateTime<Utc>, effect: &mut Effect) {
        self.is_current = true;
        self.taking_times.insert(current_time);
        self.log.record(AccountNameEvent::BecameCurrent {
            new_taking_time: current_time,
        });
        effect.consider(self);
    }

    fn become_previous(&mut self, effect: &mut Effect) {
        self.is_current = false;
        self.log.record(AccountNameEvent::BecamePrevious);
        effect.consider(self);
    }
}

domain_events! {
    /// Domain events produced by an [`Account`].
    pub enum AccountEvent, kind AccountEventKind {
        /// The account was registered.
        Created => Creation,
        /// The password hash was replaced.
        PasswordChanged => Mutation,
    }
}

/// Raised when the supplied password hash does not match the account's.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("the password does not match the account's password")]
pub struct IncorrectPasswordError;

/// Why a second-factor (session) authentication failed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SecondaryAuthenticationError {
    #[error("no session with this id belongs to the account")]
    NoSession,
    #[error("the session was replaced by a newer session")]
    ReplacedSession,
    #[error("the session has expired")]
    ExpiredSession,
    #[error("the session was cancelled")]
    CancelledSession,
}

/// Why a password change was refused.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasswordChangeError {
    #[error("no session with this id belongs to the account")]
    NoSession,
}

/// Output of [`Account::register`].
#[derive(Debug)]
pub struct Registration {
    pub account: Account,
    pub session_id: SessionId,
}

/// One person's account in the access context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    current_name: AccountName,
    previous_names: Vec<AccountName>,
    sessions: Vec<Session>,
    password_hash: PasswordHash,
    #[serde(skip)]
    log: EventLog<AccountEvent>,
}

impl_entity!(Account: AccountId, AccountEvent, "account");

impl Account {
    /// Register an account: its first name, its password hash, and its
    /// first session.
    ///
    /// # Errors
    ///
    /// [`NameCreationError`] when the name is empty or taken; the effect
    /// is left untouched.
    pub fn register(
        id: AccountId,
        name_text: &str,
        password_hash: PasswordHash,
        current_time: DateTime<Utc>,
        effect: &mut Effect,
        is_name_taken: impl FnOnce(&str) -> bool,
    ) -> Result<Registration, NameCreationError> {
        let current_name = AccountName::create(
            AccountNameId::random(),
            id,
            name_text,
            current_time,
            effect,
            is_name_taken,
        )?;
        let mut account = Account {
            id,
            current_name,
            previous_names: Vec::new(),
            sessions: Vec::new(),
            password_hash,
            log: EventLog::new(),
        };
        account.log.record(AccountEvent::Created);
        effect.consider(&account);

        let issuance = issue_session(id, current_time, None, effect);
        let session_id = issuance.session.id();
        account.sessions.push(issuance.session);
        Ok(Registration {
            account,
            session_id,
        })
    }

    /// First-factor login: check the password, then issue a session. A
    /// held session that is one of this account's own is extended on the
    /// stored copy; a replaced session of another account lives on only
    /// in the effect -- its own root persists the change.
    ///
    /// # Errors
    ///
    /// [`IncorrectPasswordError`] on a hash mismatch, raised before any
    /// mutation.
    pub fn primarily_authenticate(
        &mut self,
        password_hash: &PasswordHash,
        current_time: DateTime<Utc>,
        current_session: Option<Session>,
        effect: &mut Effect,
    ) -> Result<SessionId, IncorrectPasswordError> {
        if *password_hash != self.password_hash {
            return Err(IncorrectPasswordError);
        }

        let current = match current_session {
            Some(session) if session.account_id() == self.id => {
                Some(self.take_session(session.id()).unwrap_or(session))
            }
            other => other,
        };

        let issuance = issue_session(self.id, current_time, current, effect);
        if let Some(replaced) = issuance.replaced {
            if replaced.account_id() == self.id {
                self.absorb_session(replaced);
            }
        }
        let session_id = issuance.session.id();
        self.absorb_session(issuance.session);
        Ok(session_id)
    }

    /// Second-factor login: validate the session and extend it.
    ///
    /// # Errors
    ///
    /// `NoSession` for an unknown id; otherwise the session's first
    /// inactivity reason in the fixed replaced > expired > cancelled
    /// order.
    pub fn secondarily_authenticate(
        &mut self,
        session_id: SessionId,
        current_time: DateTime<Utc>,
        effect: &mut Effect,
    ) -> Result<&Session, SecondaryAuthenticationError> {
        let index = self
            .sessions
            .iter()
            .position(|session| session.id() == session_id)
            .ok_or(SecondaryAuthenticationError::NoSession)?;

        if let Some(reason) = self.sessions[index].inactivity_reasons(current_time).first() {
            return Err(match reason {
                InactivityReason::Replaced => SecondaryAuthenticationError::ReplacedSession,
                InactivityReason::Expired => SecondaryAuthenticationError::ExpiredSession,
                InactivityReason::Cancelled => SecondaryAuthenticationError::CancelledSession,
            });
        }

        self.sessions[index].extend(current_time, effect);
        Ok(&self.sessions[index])
    }

    /// Replace the password hash and cancel every other session. An
    /// identical hash is a complete no-op: no event, no cancellations.
    ///
    /// # Errors
    ///
    /// [`PasswordChangeError::NoSession`] when the acting session does
    /// not belong to the account; raised before any mutation.
    pub fn change_password(
        &mut self,
        new_password_hash: PasswordHash,
        current_session_id: SessionId,
        effect: &mut Effect,
    ) -> Result<(), PasswordChangeError> {
        if !self
            .sessions
            .iter()
            .any(|session| session.id() == current_session_id)
        {
            return Err(PasswordChangeError::NoSession);
        }
        if new_password_hash == self.password_hash {
            return Ok(());
        }

        self.password_hash = new_password_hash;
        self.log.record(AccountEvent::PasswordChanged);
        effect.consider(self);

        for session in &mut self.sessions {
            if session.id() == current_session_id {
                continue;
            }
            session.cancel(effect);
        }
        Ok(())
    }

    /// Rename the account. An identical text is a complete no-op; a
    /// previous name of this same account is reactivated without a
    /// uniqueness check; any other text mints a new [`AccountName`],
    /// consulting `is_name_taken` once.
    ///
    /// # Errors
    ///
    /// [`NameCreationError`] when a new name is empty or taken; the
    /// effect and the name history are left untouched.
    pub fn change_name(
        &mut self,
        new_name_text: &str,
        current_time: DateTime<Utc>,
        effect: &mut Effect,
        is_name_taken: impl FnOnce(&str) -> bool,
    ) -> Result<(), NameCreationError> {
        if new_name_text == self.current_name.text() {
            return Ok(());
        }

        if let Some(index) = self
            .previous_names
            .iter()
            .position(|name| name.text() == new_name_text)
        {
            let mut reactivated = self.previous_names.swap_remove(index);
            reactivated.become_current(current_time, effect);
            self.current_name.become_previous(effect);
            let demoted = std::mem::replace(&mut self.current_name, reactivated);
            self.previous_names.push(demoted);
            return Ok(());
        }

        let new_name = AccountName::create(
            AccountNameId::random(),
            self.id,
            new_name_text,
            current_time,
            effect,
            is_name_taken,
        )?;
        tracing::debug!(
            account_id = %self.id,
            name_id = %new_name.id(),
            "account renamed"
        );
        self.current_name.become_previous(effect);
        let demoted = std::mem::replace(&mut self.current_name, new_name);
        self.previous_names.push(demoted);
        Ok(())
    }

    /// The account's session with the given id, if any.
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id() == id)
    }

    pub fn current_name(&self) -> &AccountName {
        &self.current_name
    }

    pub fn previous_names(&self) -> &[AccountName] {
        &self.previous_names
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn password_hash(&self) -> &PasswordHash {
        &self.password_hash
    }

    fn take_session(&mut self, id: SessionId) -> Option<Session> {
        self.sessions
            .iter()
            .position(|session| session.id() == id)
            .map(|index| self.sessions.remove(index))
    }

    fn absorb_session(&mut self, session: Session) {
        match self
            .sessions
            .iter_mut()
            .find(|stored| stored.id() == session.id())
        {
            Some(stored) => *stored = session,
            None => self.sessions.push(session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::session::SessionEventKind;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        "2024-03-01T12:00:00Z".parse().expect("valid timestamp")
    }

    fn days(n: i64) -> Duration {
        Duration::days(n)
    }

    fn hash(text: &str) -> PasswordHash {
        PasswordHash::new(text)
    }

    fn registered(effect: &mut Effect) -> Registration {
        Account::register(
            AccountId::random(),
            "alice",
            hash("h-1"),
            t0(),
            effect,
            |_| false,
        )
        .expect("registration should succeed")
    }

    /// Round-trip the account through serde, the way a mapper rehydrates
    /// it between operations: same state, empty event logs.
    fn reloaded(account: &Account) -> Account {
        let json = serde_json::to_value(account).expect("serialize account");
        serde_json::from_value(json).expect("deserialize account")
    }

    #[test]
    fn registration_creates_account_name_and_session() {
        let mut effect = Effect::new();
        let registration = registered(&mut effect);
        let account = &registration.account;

        assert!(account.is_new());
        assert_eq!(account.current_name().text(), "alice");
        assert!(account.current_name().is_current());
        assert_eq!(account.sessions().len(), 1);
        assert!(account.session(registration.session_id).is_some());

        assert_eq!(effect.new_entities::<Account>().len(), 1);
        assert_eq!(effect.new_entities::<AccountName>().len(), 1);
        assert_eq!(effect.new_entities::<Session>().len(), 1);
    }

    #[test]
    fn registration_with_a_taken_name_touches_nothing() {
        let mut effect = Effect::new();
        let err = Account::register(
            AccountId::random(),
            "alice",
            hash("h-1"),
            t0(),
            &mut effect,
            |_| true,
        )
        .expect_err("taken name must fail");

        assert_eq!(err, NameCreationError::TakenName);
        assert!(effect.is_empty());
    }

    #[test]
    fn registration_rejects_blank_names() {
        let mut effect = Effect::new();
        let err = Account::register(
            AccountId::random(),
            "   ",
            hash("h-1"),
            t0(),
            &mut effect,
            |_| false,
        )
        .expect_err("blank name must fail");

        assert_eq!(err, NameCreationError::EmptyName);
        assert!(effect.is_empty());
    }

    #[test]
    fn login_with_a_wrong_password_touches_nothing() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);

        let mut effect = Effect::new();
        let err = registration
            .account
            .primarily_authenticate(&hash("wrong"), t0() + days(1), None, &mut effect)
            .expect_err("wrong password must fail");

        assert_eq!(err, IncorrectPasswordError);
        assert!(effect.is_empty());
        assert_eq!(registration.account.sessions().len(), 1);
    }

    #[test]
    fn login_with_an_own_active_session_extends_it() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);
        let original_id = registration.session_id;
        let held = registration
            .account
            .session(original_id)
            .expect("own session")
            .clone();

        let mut effect = Effect::new();
        let session_id = registration
            .account
            .primarily_authenticate(&hash("h-1"), t0() + days(10), Some(held), &mut effect)
            .expect("login should succeed");

        assert_eq!(session_id, original_id, "identity preserved");
        assert_eq!(registration.account.sessions().len(), 1);
        let stored = registration
            .account
            .session(session_id)
            .expect("session stored");
        assert_eq!(stored.lifetime().end(), t0() + days(10) + days(60));
    }

    #[test]
    fn login_with_a_foreign_session_replaces_it() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);
        let foreign = Session::issue(
            SessionId::random(),
            AccountId::random(),
            t0(),
            &mut effect,
        );
        let foreign_id = foreign.id();

        let mut effect = Effect::new();
        let session_id = registration
            .account
            .primarily_authenticate(&hash("h-1"), t0() + days(1), Some(foreign), &mut effect)
            .expect("login should succeed");

        assert_ne!(session_id, foreign_id);
        assert_eq!(
            registration.account.sessions().len(),
            2,
            "the new session joins the account; the foreign one does not"
        );
        let replaced = effect
            .entities_that::<Session>()
            .get(foreign_id)
            .expect("the replaced session is tracked")
            .clone();
        assert_eq!(replaced.leader_session_id(), Some(session_id));
    }

    #[test]
    fn second_factor_extends_an_active_session() {
        let mut effect = Effect::new();
        let registration = registered(&mut effect);
        let mut account = reloaded(&registration.account);

        let mut effect = Effect::new();
        let session = account
            .secondarily_authenticate(registration.session_id, t0() + days(45), &mut effect)
            .expect("second factor should succeed");

        assert_eq!(session.lifetime().end(), t0() + days(45) + days(60));
        assert!(
            effect
                .dirty_entities::<Session>()
                .contains(registration.session_id)
        );
    }

    #[test]
    fn second_factor_rejects_unknown_expired_and_cancelled_sessions() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);
        let session_id = registration.session_id;

        assert_eq!(
            registration
                .account
                .secondarily_authenticate(SessionId::random(), t0(), &mut effect)
                .expect_err("unknown session"),
            SecondaryAuthenticationError::NoSession
        );

        assert_eq!(
            registration
                .account
                .secondarily_authenticate(session_id, t0() + days(65), &mut effect)
                .expect_err("expired session"),
            SecondaryAuthenticationError::ExpiredSession
        );

        // Cancel via a password change from a second session.
        let other_id = registration
            .account
            .primarily_authenticate(&hash("h-1"), t0(), None, &mut effect)
            .expect("second login");
        registration
            .account
            .change_password(hash("h-2"), session_id, &mut effect)
            .expect("password change");
        assert_eq!(
            registration
                .account
                .secondarily_authenticate(other_id, t0(), &mut effect)
                .expect_err("cancelled session"),
            SecondaryAuthenticationError::CancelledSession
        );
    }

    #[test]
    fn replacement_outranks_expiry_as_the_reported_reason() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);
        let old_id = registration.session_id;
        let held = registration
            .account
            .session(old_id)
            .expect("own session")
            .clone();

        // Logging in past the window replaces the expired session, which
        // the account absorbs with its leader recorded.
        let new_id = registration
            .account
            .primarily_authenticate(&hash("h-1"), t0() + days(65), Some(held), &mut effect)
            .expect("login past the window");
        assert_ne!(new_id, old_id);
        let old = registration.account.session(old_id).expect("old session");
        assert_eq!(old.leader_session_id(), Some(new_id));

        // The old session is both replaced and expired; replacement wins.
        assert_eq!(
            registration
                .account
                .secondarily_authenticate(old_id, t0() + days(65), &mut effect)
                .expect_err("replaced session"),
            SecondaryAuthenticationError::ReplacedSession
        );
    }

    #[test]
    fn password_change_cancels_every_other_session() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);
        let acting = registration.session_id;
        let other = registration
            .account
            .primarily_authenticate(&hash("h-1"), t0(), None, &mut effect)
            .expect("second login");
        let mut account = reloaded(&registration.account);

        let mut effect = Effect::new();
        account
            .change_password(hash("h-2"), acting, &mut effect)
            .expect("password change");

        assert_eq!(account.password_hash(), &hash("h-2"));
        assert!(account.log().has(AccountEventKind::PasswordChanged));
        assert!(effect.dirty_entities::<Account>().contains(account.id()));

        let acting_session = account.session(acting).expect("acting session");
        assert!(!acting_session.is_cancelled(), "the acting session survives");
        let other_session = account.session(other).expect("other session");
        assert!(other_session.is_cancelled());
        assert!(effect.dirty_entities::<Session>().contains(other));
    }

    #[test]
    fn repeated_password_changes_do_not_duplicate_cancellations() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);
        let acting = registration.session_id;
        let other = registration
            .account
            .primarily_authenticate(&hash("h-1"), t0(), None, &mut effect)
            .expect("second login");

        registration
            .account
            .change_password(hash("h-2"), acting, &mut effect)
            .expect("first change");
        registration
            .account
            .change_password(hash("h-3"), acting, &mut effect)
            .expect("second change");

        let other_session = registration.account.session(other).expect("other session");
        assert_eq!(
            other_session
                .log()
                .of_kind(SessionEventKind::Cancelled)
                .count(),
            1,
            "an already-cancelled session gets no second event"
        );
    }

    #[test]
    fn unchanged_password_is_a_complete_no_op() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);
        let other = registration
            .account
            .primarily_authenticate(&hash("h-1"), t0(), None, &mut effect)
            .expect("second login");

        let mut effect = Effect::new();
        registration
            .account
            .change_password(hash("h-1"), registration.session_id, &mut effect)
            .expect("no-op change");

        assert!(effect.is_empty());
        assert!(
            !registration
                .account
                .session(other)
                .expect("other session")
                .is_cancelled()
        );
    }

    #[test]
    fn password_change_requires_an_owned_session() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);

        let mut effect = Effect::new();
        let err = registration
            .account
            .change_password(hash("h-2"), SessionId::random(), &mut effect)
            .expect_err("foreign session must fail");

        assert_eq!(err, PasswordChangeError::NoSession);
        assert!(effect.is_empty());
    }

    #[test]
    fn renaming_demotes_the_old_name() {
        let mut effect = Effect::new();
        let registration = registered(&mut effect);
        let mut account = reloaded(&registration.account);

        let mut effect = Effect::new();
        account
            .change_name("bob", t0() + days(1), &mut effect, |_| false)
            .expect("rename");

        assert_eq!(account.current_name().text(), "bob");
        assert_eq!(account.previous_names().len(), 1);
        let demoted = &account.previous_names()[0];
        assert_eq!(demoted.text(), "alice");
        assert!(!demoted.is_current());
        assert!(demoted.log().has(AccountNameEventKind::BecamePrevious));

        assert_eq!(effect.new_entities::<AccountName>().len(), 1);
        assert_eq!(effect.dirty_entities::<AccountName>().len(), 1);
    }

    #[test]
    fn renaming_to_the_same_name_is_a_no_op() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);

        let mut effect = Effect::new();
        registration
            .account
            .change_name("alice", t0(), &mut effect, |_| false)
            .expect("no-op rename");

        assert!(effect.is_empty());
        assert!(registration.account.previous_names().is_empty());
    }

    #[test]
    fn renaming_to_a_taken_name_touches_nothing() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);

        let mut effect = Effect::new();
        let err = registration
            .account
            .change_name("bob", t0(), &mut effect, |_| true)
            .expect_err("taken name");

        assert_eq!(err, NameCreationError::TakenName);
        assert!(effect.is_empty());
        assert_eq!(registration.account.current_name().text(), "alice");
    }

    #[test]
    fn renaming_back_reactivates_the_previous_name() {
        let mut effect = Effect::new();
        let mut registration = registered(&mut effect);
        registration
            .account
            .change_name("bob", t0() + days(1), &mut effect, |_| false)
            .expect("first rename");

        // The predicate reports every name as taken; reactivation must
        // not consult it because the name already belongs to the account.
        let mut effect = Effect::new();
        registration
            .account
            .change_name("alice", t0() + days(2), &mut effect, |_| true)
            .expect("renaming back succeeds without a uniqueness check");

        let account = &registration.account;
        assert_eq!(account.current_name().text(), "alice");
        assert!(
            account
                .current_name()
                .taking_times()
                .contains(&(t0() + days(2))),
            "reactivation records a fresh taking time"
        );
        assert!(
            account
                .current_name()
                .log()
                .has(AccountNameEventKind::BecameCurrent)
        );
        assert_eq!(account.previous_names().len(), 1);
        assert_eq!(account.previous_names()[0].text(), "bob");
    }

    #[test]
    fn password_hash_debug_is_redacted() {
        let output = format!("{:?}", hash("secret"));
        assert_eq!(output, "PasswordHash(***)");
        assert!(!output.contains("secret"));
    }
}
