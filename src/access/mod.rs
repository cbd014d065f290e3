//! Account/session bounded context.
//!
//! The `Account` aggregate root owns its `Session` and `AccountName`
//! entities and enforces the authentication and session-lifecycle rules.

pub mod account;
pub mod session;

pub use account::{
    Account, AccountEvent, AccountEventKind, AccountId, AccountName, AccountNameEvent,
    AccountNameEventKind, AccountNameId, IncorrectPasswordError, NameCreationError,
    PasswordChangeError, PasswordHash, Registration, SecondaryAuthenticationError,
};
pub use session::{
    InactivityReason, Session, SessionEvent, SessionEventKind, SessionId, SessionIssuance,
    SessionLifetime, issue_session,
};
