//! Conversation identifiers generated once per controller.

use canvas_types::{SessionId, ThreadId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    thread_id: ThreadId,
    session_id: SessionId,
}

impl SessionIdentity {
    #[must_use]
    pub fn generate() -> Self {
        Self {
            thread_id: ThreadId::generate(),
            session_id: SessionId::generate(),
        }
    }

    #[must_use]
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::SessionIdentity;

    #[test]
    fn identities_are_distinct() {
        let a = SessionIdentity::generate();
        let b = SessionIdentity::generate();
        assert_ne!(a.thread_id(), b.thread_id());
        assert_ne!(a.session_id(), b.session_id());
        assert!(a.thread_id().as_str().starts_with("thread_"));
        assert!(a.session_id().as_str().starts_with("session_"));
    }
}
