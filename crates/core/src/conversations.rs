use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::flows::Conversation;
use crate::transport::UserId;

type Slot = Arc<AsyncMutex<Option<Conversation>>>;

/// Per-user conversation slots. Locking a user's slot serializes that user's
/// events; different users never contend beyond the brief map lookup.
#[derive(Default)]
pub struct ConversationStore {
    slots: Mutex<HashMap<UserId, Slot>>,
}

pub struct ConversationGuard {
    user: UserId,
    slot: OwnedMutexGuard<Option<Conversation>>,
}

impl ConversationGuard {
    pub fn current(&self) -> Option<&Conversation> {
        self.slot.as_ref()
    }

    pub fn replace(&mut self, next: Option<Conversation>) {
        *self.slot = next;
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user: UserId) -> ConversationGuard {
        let slot = {
            let mut slots = match self.slots.lock() {
                Ok(slots) => slots,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(slots.entry(user).or_default())
        };
        ConversationGuard { user, slot: slot.lock_owned().await }
    }

    /// Drops the user's slot once it is empty and nobody else is waiting on it.
    pub fn release(&self, guard: ConversationGuard) {
        let ConversationGuard { user, slot } = guard;
        let finished = slot.is_none();
        drop(slot);
        if !finished {
            return;
        }

        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        let idle = slots.get(&user).is_some_and(|slot| {
            Arc::strong_count(slot) == 1
                && slot.try_lock().map(|current| current.is_none()).unwrap_or(false)
        });
        if idle {
            slots.remove(&user);
        }
    }

    pub async fn current(&self, user: UserId) -> Option<Conversation> {
        let slot = {
            let slots = match self.slots.lock() {
                Ok(slots) => slots,
                Err(poisoned) => poisoned.into_inner(),
            };
            slots.get(&user).cloned()
        }?;
        let current = slot.lock().await.clone();
        current
    }

    pub fn active_count(&self) -> usize {
        let slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::ConversationStore;
    use crate::flows::{Conversation, Submitter};
    use crate::transport::UserId;

    fn conversation(user: i64) -> Conversation {
        Conversation::start(Submitter::new(UserId(user), "Tester", None))
    }

    #[tokio::test]
    async fn stored_conversation_survives_release() {
        let store = ConversationStore::new();
        let mut guard = store.lock(UserId(1)).await;
        guard.replace(Some(conversation(1)));
        store.release(guard);

        assert_eq!(store.current(UserId(1)).await, Some(conversation(1)));
        assert_eq!(store.active_count(), 1);
    }

    #[tokio::test]
    async fn terminal_release_evicts_slot() {
        let store = ConversationStore::new();
        let mut guard = store.lock(UserId(1)).await;
        guard.replace(Some(conversation(1)));
        store.release(guard);

        let mut guard = store.lock(UserId(1)).await;
        guard.replace(None);
        store.release(guard);

        assert_eq!(store.current(UserId(1)).await, None);
        assert_eq!(store.active_count(), 0);
    }

    #[tokio::test]
    async fn users_do_not_share_slots() {
        let store = ConversationStore::new();
        let mut first = store.lock(UserId(1)).await;
        // a second user is not blocked by the first user's held slot
        let second = tokio::time::timeout(Duration::from_secs(1), store.lock(UserId(2)))
            .await
            .expect("independent users must not contend");

        first.replace(Some(conversation(1)));
        assert!(second.current().is_none());
        store.release(first);
        store.release(second);

        assert!(store.current(UserId(2)).await.is_none());
        assert!(store.current(UserId(1)).await.is_some());
    }

    #[tokio::test]
    async fn same_user_events_are_serialized() {
        let store = Arc::new(ConversationStore::new());
        let guard = store.lock(UserId(9)).await;

        let contender = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let guard = store.lock(UserId(9)).await;
                let seen = guard.current().cloned();
                store.release(guard);
                seen
            })
        };

        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        let mut guard = guard;
        guard.replace(Some(conversation(9)));
        store.release(guard);

        let seen = contender.await.expect("contender task");
        assert_eq!(seen, Some(conversation(9)));
    }
}
