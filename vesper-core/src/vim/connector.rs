//! Scoped session ownership.

use std::ops::Deref;
use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::vim::session::VimSession;

/// Holds a session for the duration of one logical request and guarantees
/// logout on every exit path. The normal path calls `close()`; if the guard
/// is dropped without it (error return, panic unwind), logout is spawned
/// best-effort in the background.
pub struct SessionGuard {
    session: Option<Arc<dyn VimSession>>,
}

impl SessionGuard {
    pub fn new(session: Arc<dyn VimSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session(&self) -> &Arc<dyn VimSession> {
        self.session
            .as_ref()
            .expect("session present until close() consumes the guard")
    }

    /// Log out and consume the guard.
    pub async fn close(mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.logout().await?;
        }
        Ok(())
    }
}

impl Deref for SessionGuard {
    type Target = dyn VimSession;

    fn deref(&self) -> &Self::Target {
        self.session().as_ref()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = session.logout().await {
                            warn!("background logout failed: {}", e);
                        }
                    });
                }
                Err(_) => warn!("session dropped outside a runtime; logout skipped"),
            }
        }
    }
}
