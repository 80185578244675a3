use procurebot_core::{OutboundMessage, TextFormat, UserId};

use crate::api::{InlineKeyboardButton, InlineKeyboardMarkup, SendMessageRequest};

pub fn send_message_request(chat: UserId, message: &OutboundMessage) -> SendMessageRequest {
    let parse_mode = match message.format {
        TextFormat::Plain => None,
        TextFormat::Html => Some("HTML"),
    };
    let reply_markup = message.has_choices().then(|| InlineKeyboardMarkup {
        inline_keyboard: message
            .choices
            .iter()
            .map(|row| {
                row.iter()
                    .map(|choice| InlineKeyboardButton {
                        text: choice.label.clone(),
                        callback_data: choice.payload.clone(),
                    })
                    .collect()
            })
            .collect(),
    });

    SendMessageRequest { chat_id: chat.0, text: message.text.clone(), parse_mode, reply_markup }
}
