//! Session credentials, token refresh and session events

pub mod refresh;
pub mod session;
pub mod store;

pub use refresh::{
    RefreshCoordinator, RefreshError, RefreshErrorKind, RefreshLeader, RefreshOutcome,
    RefreshTicket, RefreshWaiter, TokenRefresher,
};
pub use session::{SessionEvents, SessionState, SignOutReason};
pub use store::{
    CredentialPair, CredentialStore, FileStorage, MemoryStorage, SessionIdentity,
    SessionStorage, StorageError,
};
