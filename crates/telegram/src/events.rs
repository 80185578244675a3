use procurebot_core::{EventKind, InboundEvent, Selection, Submitter, UserId};
use tracing::{debug, warn};

use crate::api::{CallbackQuery, Message, Update, User};

/// An update reduced to what the desk understands. Callback queries keep
/// their id so the runner can answer them even when the payload is unusable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedUpdate {
    pub update_id: i64,
    pub callback_id: Option<String>,
    pub event: Option<InboundEvent>,
}

#[derive(Clone, Debug, Default)]
pub struct UpdateClassifier {
    bot_username: Option<String>,
}

impl UpdateClassifier {
    /// `bot_username` is used to drop commands addressed to other bots in
    /// group chats (`/order@other_bot`). Without it every suffix is accepted.
    pub fn new(bot_username: Option<String>) -> Self {
        Self { bot_username }
    }

    pub fn classify(&self, update: &Update) -> Option<ClassifiedUpdate> {
        if let Some(callback) = &update.callback_query {
            return Some(ClassifiedUpdate {
                update_id: update.update_id,
                callback_id: Some(callback.id.clone()),
                event: self.classify_callback(update.update_id, callback),
            });
        }

        let message = update.message.as_ref()?;
        let event = self.classify_message(update.update_id, message)?;
        Some(ClassifiedUpdate { update_id: update.update_id, callback_id: None, event: Some(event) })
    }

    fn classify_message(&self, update_id: i64, message: &Message) -> Option<InboundEvent> {
        let from = message.from.as_ref().filter(|user| !user.is_bot)?;
        let text = message.text.as_deref().map(str::trim).filter(|text| !text.is_empty())?;

        let kind = match text.strip_prefix('/') {
            Some(command) => self.parse_command(command)?,
            None => EventKind::Text(text.to_owned()),
        };
        Some(inbound(update_id, from, message.chat.id, kind))
    }

    fn parse_command(&self, command: &str) -> Option<EventKind> {
        let (head, args) = match command.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (command, ""),
        };
        let (name, addressee) = match head.split_once('@') {
            Some((name, addressee)) => (name, Some(addressee)),
            None => (head, None),
        };

        if let (Some(addressee), Some(bot)) = (addressee, self.bot_username.as_deref()) {
            if !addressee.eq_ignore_ascii_case(bot) {
                debug!(
                    event_name = "telegram.command_for_other_bot",
                    addressee,
                    "ignoring command addressed to another bot"
                );
                return None;
            }
        }
        if name.is_empty() {
            return None;
        }

        Some(EventKind::Command { name: name.to_ascii_lowercase(), args: args.to_owned() })
    }

    fn classify_callback(&self, update_id: i64, callback: &CallbackQuery) -> Option<InboundEvent> {
        if callback.from.is_bot {
            return None;
        }
        let data = callback.data.as_deref()?;
        let selection = match data.parse::<Selection>() {
            Ok(selection) => selection,
            Err(error) => {
                warn!(
                    event_name = "telegram.callback_rejected",
                    update_id,
                    user_id = callback.from.id,
                    error = %error,
                    "dropping callback with an unusable payload"
                );
                return None;
            }
        };
        let chat =
            callback.message.as_ref().map(|message| message.chat.id).unwrap_or(callback.from.id);
        Some(inbound(update_id, &callback.from, chat, EventKind::Selection(selection)))
    }
}

fn inbound(update_id: i64, from: &User, chat: i64, kind: EventKind) -> InboundEvent {
    InboundEvent {
        sender: Submitter::new(UserId(from.id), from.full_name(), from.username.clone()),
        reply_to: UserId(chat),
        correlation_id: format!("update-{update_id}"),
        kind,
    }
}
