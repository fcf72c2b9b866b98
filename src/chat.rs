//! Conversations shown by the UI, keyed by who they are with.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::ids::SubjectId;

/// Reserved counterpart id of the room-wide conversation. Can't collide with a
/// [`SubjectId`], which always contains a `:`.
pub const GROUP_ID: &str = "#group";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Counterpart {
    Group,
    Subject(SubjectId),
}

impl From<Counterpart> for String {
    fn from(counterpart: Counterpart) -> String {
        counterpart.to_string()
    }
}

impl TryFrom<String> for Counterpart {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if raw == GROUP_ID {
            return Ok(Counterpart::Group);
        }
        SubjectId::parse(&raw)
            .map(Counterpart::Subject)
            .ok_or_else(|| format!("{raw:?} is neither a subject nor the group"))
    }
}

impl fmt::Display for Counterpart {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Counterpart::Group => f.write_str(GROUP_ID),
            Counterpart::Subject(subject) => subject.fmt(f),
        }
    }
}

/// `LOCAL` for our own messages, `USER` for the other side of a private chat,
/// the sender's subject id inside the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Author {
    Local,
    User,
    Subject(SubjectId),
}

impl From<Author> for String {
    fn from(author: Author) -> String {
        match author {
            Author::Local => "LOCAL".to_owned(),
            Author::User => "USER".to_owned(),
            Author::Subject(subject) => subject.to_string(),
        }
    }
}

impl TryFrom<String> for Author {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.as_str() {
            "LOCAL" => Ok(Author::Local),
            "USER" => Ok(Author::User),
            _ => SubjectId::parse(&raw)
                .map(Author::Subject)
                .ok_or_else(|| format!("{raw:?} is not a message author")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
    pub content: String,
    pub author: Author,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub from: Counterpart,
    pub message: Message,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    pub unread: u32,
    pub last_message_at: i64,
    pub messages: Vec<Message>,
}

pub type ChatView = HashMap<Counterpart, Conversation>;

fn fresh_view() -> ChatView {
    HashMap::from([(Counterpart::Group, Conversation::default())])
}

pub struct Chats {
    tx: watch::Sender<ChatView>,
}

impl Default for Chats {
    fn default() -> Self {
        Self::new()
    }
}

impl Chats {
    pub fn new() -> Self {
        Self { tx: watch::channel(fresh_view()).0 }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.tx.subscribe()
    }

    pub fn view(&self) -> watch::Ref<'_, ChatView> {
        self.tx.borrow()
    }

    pub fn conversation(&self, id: &Counterpart) -> Option<Conversation> {
        self.tx.borrow().get(id).cloned()
    }

    pub fn add_chat(&self, id: Counterpart) {
        self.tx.send_if_modified(|chats| {
            if chats.contains_key(&id) {
                return false;
            }
            chats.insert(id, Conversation::default());
            true
        });
    }

    /// Appends to the conversation with `id`, opening it first if this is the first message.
    pub fn add_message(&self, id: Counterpart, message: Message) {
        self.tx.send_modify(|chats| {
            let conversation = chats.entry(id).or_default();
            if message.author != Author::Local {
                conversation.unread += 1;
            }
            conversation.last_message_at = message.timestamp;
            conversation.messages.push(message);
        });
    }

    pub fn read_chat(&self, id: &Counterpart) {
        self.tx.send_if_modified(|chats| match chats.get_mut(id) {
            Some(conversation) if conversation.unread > 0 => {
                conversation.unread = 0;
                true
            }
            _ => false,
        });
    }

    pub fn reset(&self) {
        self.tx.send_replace(fresh_view());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(author: Author, timestamp: i64) -> Message {
        Message {
            timestamp,
            content: "hi".to_owned(),
            author,
        }
    }

    #[test]
    fn group_conversation_exists_from_the_start() {
        let chats = Chats::new();
        assert_eq!(chats.conversation(&Counterpart::Group), Some(Conversation::default()));
    }

    #[test]
    fn first_message_opens_the_conversation() {
        let chats = Chats::new();
        let bob = Counterpart::Subject(SubjectId::new("github", 2));
        assert_eq!(chats.conversation(&bob), None);

        chats.add_message(bob.clone(), message(Author::User, 10));
        let conversation = chats.conversation(&bob).unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.unread, 1);
        assert_eq!(conversation.last_message_at, 10);
    }

    #[test]
    fn own_messages_are_not_unread() {
        let chats = Chats::new();
        chats.add_message(Counterpart::Group, message(Author::Local, 5));
        chats.add_message(Counterpart::Group, message(Author::Subject(SubjectId::new("google", 1)), 6));

        let group = chats.conversation(&Counterpart::Group).unwrap();
        assert_eq!(group.unread, 1);

        chats.read_chat(&Counterpart::Group);
        assert_eq!(chats.conversation(&Counterpart::Group).unwrap().unread, 0);
    }

    #[test]
    fn add_chat_keeps_existing_history() {
        let chats = Chats::new();
        let bob = Counterpart::Subject(SubjectId::new("github", 2));
        chats.add_message(bob.clone(), message(Author::User, 1));
        chats.add_chat(bob.clone());
        assert_eq!(chats.conversation(&bob).unwrap().messages.len(), 1);
    }

    #[test]
    fn authors_use_the_wire_names() {
        let json = serde_json::to_value(Author::Local).unwrap();
        assert_eq!(json, "LOCAL");
        let author: Author = serde_json::from_value("github:2".into()).unwrap();
        assert_eq!(author, Author::Subject(SubjectId::new("github", 2)));
        assert!(serde_json::from_value::<Author>("nobody".into()).is_err());

        let group: Counterpart = serde_json::from_value(GROUP_ID.into()).unwrap();
        assert_eq!(group, Counterpart::Group);
    }
}
