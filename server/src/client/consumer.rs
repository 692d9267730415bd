//! Headless chat view state fed by server events.
//!
//! Every delivered message lands in exactly one place: appended to the open
//! conversation, counted on a sender's unread badge, or dropped. Ids already
//! shown in the open conversation or already counted on a badge are dropped,
//! so the same message arriving over the socket and in the send response is
//! only shown once. Those ids are forgotten when the conversation closes or
//! the badge clears.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::chat::model::{Message, UserId};

/// A decoded server push.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Presence(BTreeSet<UserId>),
    MessageDelivered(Message),
}

/// What [`ChatConsumer::apply`] did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    PresenceReplaced,
    Appended,
    Duplicate,
    BadgeIncremented { sender: UserId, count: u64 },
    Ignored,
}

#[derive(Debug, Clone)]
struct OpenConversation {
    counterpart: UserId,
    messages: Vec<Message>,
    ids: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct ChatConsumer {
    me: UserId,
    online: BTreeSet<UserId>,
    open: Option<OpenConversation>,
    unread: BTreeMap<UserId, u64>,
    /// Ids counted on each sender's badge since it was last cleared.
    badged: HashMap<UserId, HashSet<String>>,
    /// `None` until the sidebar loads; then events from strangers are dropped.
    contacts: Option<BTreeSet<UserId>>,
}

impl ChatConsumer {
    pub fn new(me: impl Into<UserId>) -> Self {
        Self {
            me: me.into(),
            online: BTreeSet::new(),
            open: None,
            unread: BTreeMap::new(),
            badged: HashMap::new(),
            contacts: None,
        }
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn apply(&mut self, event: ServerEvent) -> Outcome {
        match event {
            ServerEvent::Presence(online) => {
                self.online = online;
                Outcome::PresenceReplaced
            }
            ServerEvent::MessageDelivered(message) => self.accept(message),
        }
    }

    /// Feed back the server's response to our own send.
    pub fn record_sent(&mut self, message: Message) -> Outcome {
        self.accept(message)
    }

    fn accept(&mut self, message: Message) -> Outcome {
        if !message.involves(&self.me) {
            return Outcome::Ignored;
        }
        let other = if message.sender_id == self.me {
            &message.receiver_id
        } else {
            &message.sender_id
        };
        if let Some(contacts) = &self.contacts {
            if *other != self.me && !contacts.contains(other) {
                return Outcome::Ignored;
            }
        }

        if let Some(open) = &mut self.open {
            if *other == open.counterpart {
                if !open.ids.insert(message.id.clone()) {
                    return Outcome::Duplicate;
                }
                open.messages.push(message);
                return Outcome::Appended;
            }
        }

        if message.receiver_id == self.me && message.sender_id != self.me && !message.is_read {
            let counted = self.badged.entry(message.sender_id.clone()).or_default();
            if !counted.insert(message.id.clone()) {
                return Outcome::Duplicate;
            }
            let count = self.unread.entry(message.sender_id.clone()).or_insert(0);
            *count += 1;
            return Outcome::BadgeIncremented {
                sender: message.sender_id,
                count: *count,
            };
        }

        Outcome::Ignored
    }

    /// Show the conversation with `counterpart`, replacing any open one.
    /// Clears that sender's badge; the server marks the rows read when it
    /// serves the history.
    pub fn open_conversation(&mut self, counterpart: impl Into<UserId>, history: Vec<Message>) {
        let counterpart = counterpart.into();
        let mut messages = Vec::with_capacity(history.len());
        let mut ids = HashSet::with_capacity(history.len());
        for message in history {
            if ids.insert(message.id.clone()) {
                messages.push(message);
            }
        }
        self.unread.remove(&counterpart);
        self.badged.remove(&counterpart);
        self.open = Some(OpenConversation {
            counterpart,
            messages,
            ids,
        });
    }

    /// Also forgets the ids shown in it.
    pub fn close_conversation(&mut self) {
        self.open = None;
    }

    /// Replace badges with the server's aggregate.
    pub fn set_unread(&mut self, aggregate: BTreeMap<UserId, u64>) {
        self.unread = aggregate.into_iter().filter(|(_, n)| *n > 0).collect();
        if let Some(open) = &self.open {
            self.unread.remove(&open.counterpart);
        }
        let unread = &self.unread;
        self.badged.retain(|sender, _| unread.contains_key(sender));
    }

    pub fn set_contacts<I>(&mut self, users: I)
    where
        I: IntoIterator<Item = UserId>,
    {
        self.contacts = Some(users.into_iter().collect());
    }

    pub fn online(&self) -> &BTreeSet<UserId> {
        &self.online
    }

    pub fn is_online(&self, user: &str) -> bool {
        self.online.contains(user)
    }

    pub fn unread(&self) -> &BTreeMap<UserId, u64> {
        &self.unread
    }

    pub fn unread_for(&self, user: &str) -> u64 {
        self.unread.get(user).copied().unwrap_or(0)
    }

    pub fn counterpart(&self) -> Option<&str> {
        self.open.as_ref().map(|o| o.counterpart.as_str())
    }

    /// Messages of the open conversation, in arrival order.
    pub fn messages(&self) -> &[Message] {
        self.open.as_ref().map(|o| o.messages.as_slice()).unwrap_or(&[])
    }
}
