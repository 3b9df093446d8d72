//! Current-user session shared between the auth client and the review controller.

use std::sync::Arc;
use tokio::sync::watch;

use crate::model::UserId;

/// Source of the signed-in user plus change notifications.
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;

    /// Receiver that observes every sign-in and sign-out. Dropping it unsubscribes.
    fn subscribe(&self) -> watch::Receiver<Option<UserId>>;
}

/// Session state backed by a watch channel. Cloning shares the same session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: Arc<watch::Sender<Option<UserId>>>,
}

impl SessionHandle {
    pub fn signed_out() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn signed_in(user: UserId) -> Self {
        let session = Self::signed_out();
        session.set_user(Some(user));
        session
    }

    pub fn set_user(&self, user: Option<UserId>) {
        self.tx.send_replace(user);
    }

    pub fn sign_out(&self) {
        self.set_user(None);
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl SessionProvider for SessionHandle {
    fn current_user(&self) -> Option<UserId> {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.tx.subscribe()
    }
}
