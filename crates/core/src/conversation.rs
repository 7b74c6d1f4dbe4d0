//! Conversation-related types.

use pier_model::ModelMessage;

/// The messages of one thread, oldest first.
///
/// The system prompt is not part of the conversation; the agent prepends
/// it to every request.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    pub(crate) items: Vec<Item>,
}

impl Conversation {
    /// Returns the items of this conversation.
    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Returns the number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing has been said yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub(crate) fn push(&mut self, msg: ModelMessage, transcript: String) {
        self.items.push(Item { msg, transcript });
    }

    pub(crate) fn messages(&self) -> impl Iterator<Item = &ModelMessage> {
        self.items.iter().map(|item| &item.msg)
    }
}

/// An item in the conversation.
#[derive(Clone, Debug)]
pub struct Item {
    pub(crate) msg: ModelMessage,
    pub(crate) transcript: String,
}

impl Item {
    /// Returns the message sent to the model for this item.
    #[inline]
    pub fn message(&self) -> &ModelMessage {
        &self.msg
    }

    /// Returns the transcript of this item.
    ///
    /// The transcript is the human readable text of the item. For an
    /// assistant turn that only called tools it is empty.
    #[inline]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}
