pub mod models;

use models::{Conversation, Message};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct StoreState {
    /// Newest first.
    conversations: Vec<Conversation>,
    active_conversation_id: Option<String>,
}

impl StoreState {
    fn find_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    fn contains(&self, id: &str) -> bool {
        self.conversations.iter().any(|c| c.id == id)
    }

    fn create(&mut self) -> String {
        let conv = Conversation::new();
        let id = conv.id.clone();
        self.conversations.insert(0, conv);
        self.active_conversation_id = Some(id.clone());
        id
    }
}

/// In-memory conversation log shared between the chat controller and
/// whatever renders it.
///
/// Every mutation happens under one lock, so readers never observe a
/// conversation whose cached fields disagree with its message log.
#[derive(Debug, Default)]
pub struct ConversationStore {
    state: Mutex<StoreState>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Conversations ──

    pub fn create_conversation(&self) -> String {
        let id = self.lock().create();
        debug!(conversation_id = %id, "conversation created");
        id
    }

    /// Return the active conversation id, creating a conversation if none is active.
    pub fn ensure_active(&self) -> String {
        let mut state = self.lock();
        match state.active_conversation_id.clone() {
            Some(id) => id,
            None => state.create(),
        }
    }

    /// Returns false (and leaves the selection alone) for unknown ids.
    pub fn select_conversation(&self, id: &str) -> bool {
        let mut state = self.lock();
        if !state.contains(id) {
            return false;
        }
        state.active_conversation_id = Some(id.to_string());
        true
    }

    /// Remove a conversation. Deleting the active one re-targets to the
    /// most recently created survivor, or to none.
    pub fn delete_conversation(&self, id: &str) -> bool {
        let mut state = self.lock();
        let before = state.conversations.len();
        state.conversations.retain(|c| c.id != id);
        if state.conversations.len() == before {
            return false;
        }
        if state.active_conversation_id.as_deref() == Some(id) {
            state.active_conversation_id = state.conversations.first().map(|c| c.id.clone());
        }
        debug!(conversation_id = %id, "conversation deleted");
        true
    }

    pub fn active_conversation_id(&self) -> Option<String> {
        self.lock().active_conversation_id.clone()
    }

    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.lock().conversations.iter().find(|c| c.id == id).cloned()
    }

    /// All conversations, most recently created first.
    pub fn list(&self) -> Vec<Conversation> {
        self.lock().conversations.clone()
    }

    /// Case-insensitive match on title or last message, newest activity first.
    pub fn search(&self, query: &str) -> Vec<Conversation> {
        let query = query.trim().to_lowercase();
        let mut found: Vec<Conversation> = self
            .lock()
            .conversations
            .iter()
            .filter(|c| {
                query.is_empty()
                    || c.title.to_lowercase().contains(&query)
                    || c.last_message.to_lowercase().contains(&query)
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found
    }

    // ── Messages ──

    /// Push a message onto a conversation. A conversation deleted while a
    /// reply was in flight is silently skipped.
    pub fn append_message(&self, conversation_id: &str, message: Message) -> bool {
        match self.lock().find_mut(conversation_id) {
            Some(conv) => {
                conv.push(message);
                true
            }
            None => false,
        }
    }

    /// Replace the content of the trailing message if it is an assistant message.
    pub fn mutate_last_message(&self, conversation_id: &str, content: String) -> bool {
        self.lock()
            .find_mut(conversation_id)
            .is_some_and(|conv| conv.rewrite_last_assistant(content))
    }

    /// Append to the content of the trailing assistant message.
    pub fn append_to_last_message(&self, conversation_id: &str, delta: &str) -> bool {
        let mut state = self.lock();
        let Some(conv) = state.find_mut(conversation_id) else {
            return false;
        };
        let Some(current) = conv.messages.last().map(|m| m.content.clone()) else {
            return false;
        };
        conv.rewrite_last_assistant(current + delta)
    }

    pub fn clear(&self, conversation_id: &str) -> bool {
        match self.lock().find_mut(conversation_id) {
            Some(conv) => {
                conv.clear();
                true
            }
            None => false,
        }
    }

    /// Conversations and the active id, read under a single lock.
    pub fn snapshot(&self) -> (Vec<Conversation>, Option<String>) {
        let state = self.lock();
        (
            state.conversations.clone(),
            state.active_conversation_id.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::models::{Role, DEFAULT_TITLE};
    use super::*;

    fn assert_caches_consistent(store: &ConversationStore) {
        for conv in store.list() {
            assert_eq!(conv.message_count, conv.messages.len());
            if let Some(last) = conv.messages.last() {
                assert_eq!(conv.last_message, last.content);
            }
        }
    }

    #[test]
    fn test_create_conversation_becomes_active() {
        let store = ConversationStore::new();
        let id = store.create_conversation();
        assert_eq!(store.active_conversation_id(), Some(id.clone()));
        let conv = store.get(&id).unwrap();
        assert_eq!(conv.title, DEFAULT_TITLE);
        assert!(conv.messages.is_empty());
    }

    #[test]
    fn test_list_is_newest_first() {
        let store = ConversationStore::new();
        let a = store.create_conversation();
        let b = store.create_conversation();
        let ids: Vec<String> = store.list().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn test_ensure_active_reuses_existing() {
        let store = ConversationStore::new();
        let first = store.ensure_active();
        let second = store.ensure_active();
        assert_eq!(first, second);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_select_unknown_id_is_ignored() {
        let store = ConversationStore::new();
        let id = store.create_conversation();
        assert!(!store.select_conversation("missing"));
        assert_eq!(store.active_conversation_id(), Some(id));
    }

    #[test]
    fn test_delete_active_retargets_to_newest_survivor() {
        let store = ConversationStore::new();
        let a = store.create_conversation();
        let b = store.create_conversation();
        let c = store.create_conversation();
        store.select_conversation(&b);
        assert!(store.delete_conversation(&b));
        assert_eq!(store.active_conversation_id(), Some(c.clone()));
        assert!(store.delete_conversation(&c));
        assert_eq!(store.active_conversation_id(), Some(a.clone()));
        assert!(store.delete_conversation(&a));
        assert_eq!(store.active_conversation_id(), None);
    }

    #[test]
    fn test_delete_inactive_keeps_active() {
        let store = ConversationStore::new();
        let a = store.create_conversation();
        let b = store.create_conversation();
        assert!(store.delete_conversation(&a));
        assert_eq!(store.active_conversation_id(), Some(b));
        assert!(!store.delete_conversation(&a));
    }

    #[test]
    fn test_active_id_never_dangles() {
        let store = ConversationStore::new();
        let ids: Vec<String> = (0..5).map(|_| store.create_conversation()).collect();
        for id in ids.iter().rev().step_by(2) {
            store.delete_conversation(id);
            if let Some(active) = store.active_conversation_id() {
                assert!(store.get(&active).is_some());
            }
        }
    }

    #[test]
    fn test_append_to_deleted_conversation_is_noop() {
        let store = ConversationStore::new();
        let id = store.create_conversation();
        store.delete_conversation(&id);
        assert!(!store.append_message(&id, Message::user("hello")));
        assert!(!store.mutate_last_message(&id, "x".into()));
        assert!(!store.append_to_last_message(&id, "x"));
    }

    #[test]
    fn test_mutate_last_message_requires_assistant_tail() {
        let store = ConversationStore::new();
        let id = store.create_conversation();
        store.append_message(&id, Message::user("hi"));
        assert!(!store.mutate_last_message(&id, "changed".into()));
        store.append_message(&id, Message::assistant(""));
        assert!(store.mutate_last_message(&id, "Cloudy".into()));
        let conv = store.get(&id).unwrap();
        assert_eq!(conv.messages[1].role, Role::Assistant);
        assert_eq!(conv.messages[1].content, "Cloudy");
        assert_caches_consistent(&store);
    }

    #[test]
    fn test_append_to_last_message_accumulates() {
        let store = ConversationStore::new();
        let id = store.create_conversation();
        store.append_message(&id, Message::user("hi"));
        store.append_message(&id, Message::assistant(""));
        store.append_to_last_message(&id, "Rain ");
        store.append_to_last_message(&id, "today");
        assert_eq!(store.get(&id).unwrap().last_message, "Rain today");
        assert_caches_consistent(&store);
    }

    #[test]
    fn test_clear_empties_log() {
        let store = ConversationStore::new();
        let id = store.create_conversation();
        store.append_message(&id, Message::user("hi there"));
        store.append_message(&id, Message::assistant("hello"));
        assert!(store.clear(&id));
        let conv = store.get(&id).unwrap();
        assert_eq!(conv.message_count, 0);
        assert!(conv.last_message.is_empty());
        assert_eq!(conv.title, "hi there");
        assert_caches_consistent(&store);
    }

    #[test]
    fn test_search_matches_title_or_last_message() {
        let store = ConversationStore::new();
        let paris = store.create_conversation();
        store.append_message(&paris, Message::user("Weather in Paris"));
        let oslo = store.create_conversation();
        store.append_message(&oslo, Message::user("Oslo forecast"));
        store.append_message(&oslo, Message::assistant("Expect SNOW tonight"));

        let hits: Vec<String> = store.search("paris").into_iter().map(|c| c.id).collect();
        assert_eq!(hits, vec![paris.clone()]);
        let hits: Vec<String> = store.search("snow").into_iter().map(|c| c.id).collect();
        assert_eq!(hits, vec![oslo.clone()]);
        assert_eq!(store.search("   ").len(), 2);
        assert!(store.search("tokyo").is_empty());
    }

    #[test]
    fn test_search_orders_by_latest_activity() {
        let store = ConversationStore::new();
        let older = store.create_conversation();
        let newer = store.create_conversation();
        store.append_message(&newer, Message::user("rain"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.append_message(&older, Message::user("rain again"));
        let hits: Vec<String> = store.search("rain").into_iter().map(|c| c.id).collect();
        assert_eq!(hits, vec![older, newer]);
    }
}
