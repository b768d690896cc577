//! Conversation aggregation
//!
//! The backend exposes a flat message list; the conversation view is
//! derived client-side. One conversation per counterpart, carrying the
//! latest message and the count of unread incoming messages, ordered
//! most-recently-active first.

use gigline_protocol::DirectMessage;

/// A per-counterpart rollup of the flat message list.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub counterpart_id: String,
    pub last_message: DirectMessage,
    pub unread_count: usize,
}

fn counterpart_of<'a>(message: &'a DirectMessage, self_id: &str) -> &'a str {
    if message.sender_id == self_id {
        &message.receiver_id
    } else {
        &message.sender_id
    }
}

fn is_unread_incoming(message: &DirectMessage, self_id: &str) -> bool {
    message.receiver_id == self_id && !message.read
}

/// Roll the flat message list up into conversations.
///
/// RFC 3339 timestamps compare lexicographically, so "latest" is a plain
/// string max; equal timestamps resolve to the later list entry.
pub fn aggregate(messages: &[DirectMessage], self_id: &str) -> Vec<Conversation> {
    let mut conversations: Vec<Conversation> = Vec::new();

    for message in messages {
        let counterpart = counterpart_of(message, self_id);
        let unread = usize::from(is_unread_incoming(message, self_id));

        match conversations
            .iter_mut()
            .find(|c| c.counterpart_id == counterpart)
        {
            Some(conv) => {
                conv.unread_count += unread;
                if message.created_at >= conv.last_message.created_at {
                    conv.last_message = message.clone();
                }
            }
            None => conversations.push(Conversation {
                counterpart_id: counterpart.to_string(),
                last_message: message.clone(),
                unread_count: unread,
            }),
        }
    }

    conversations.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
    conversations
}

/// Reconcile a live push into an existing rollup: the counterpart's
/// conversation moves to the front with the new message as latest.
pub fn apply_incoming(
    conversations: &mut Vec<Conversation>,
    message: DirectMessage,
    self_id: &str,
) {
    let counterpart = counterpart_of(&message, self_id).to_string();
    let unread = usize::from(is_unread_incoming(&message, self_id));

    match conversations
        .iter()
        .position(|c| c.counterpart_id == counterpart)
    {
        Some(index) => {
            let mut conv = conversations.remove(index);
            conv.unread_count += unread;
            conv.last_message = message;
            conversations.insert(0, conv);
        }
        None => conversations.insert(
            0,
            Conversation {
                counterpart_id: counterpart,
                last_message: message,
                unread_count: unread,
            },
        ),
    }
}
