//! Everything the bot says. Prompts carry their button rows; the admin
//! notification is rendered as Telegram HTML so user text is escaped.

use chrono::{DateTime, Utc};

use crate::catalog::{Catalog, CatalogEntry};
use crate::flows::{CompletedOrder, Selection, Submitter};
use crate::transport::{Choice, OutboundMessage};

pub const ORDER_TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M UTC";

pub const START_ALLOWED: &str =
    "Hello! I collect purchase requests and forward them to the procurement team.\nSend /order to create a request or /help to see all commands.";
pub const START_NOT_ALLOWED: &str =
    "Hello! You do not have access to this bot. Ask an administrator to add your account.";
pub const HELP: &str = "Available commands:\n/order - create a purchase request\n/cancel - cancel the request in progress\n/help - show this message\n/reload_users - reload the user list (administrators only)";
pub const ACCESS_DENIED: &str = "Access denied. Ask an administrator to add your account.";
pub const ALREADY_IN_PROGRESS: &str =
    "A request is already in progress. Finish it or send /cancel to start over.";
pub const NOTHING_TO_CANCEL: &str = "There is no request in progress to cancel.";
pub const ORDER_CANCELLED: &str = "The request has been cancelled.";
pub const SELECT_DEPARTMENT: &str = "Select the department:";
pub const ENTER_PRODUCT: &str = "Describe the product (name, model, link):";
pub const ENTER_QUANTITY: &str = "Enter the quantity:";
pub const SELECT_PRIORITY: &str = "Select the priority:";
pub const RELOAD_NOT_ADMIN: &str = "Only administrators can reload the user list.";
pub const RELOAD_FAILED: &str =
    "Could not reload the user list. The previous list stays active; check the server log.";
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again later.";

pub fn reload_succeeded(admins: usize, allowed: usize) -> OutboundMessage {
    OutboundMessage::plain(format!(
        "User list reloaded: {admins} administrator(s), {allowed} user(s) with access."
    ))
}

pub fn department_prompt(catalog: &Catalog) -> OutboundMessage {
    with_choice_rows(OutboundMessage::plain(SELECT_DEPARTMENT), &catalog.departments, |entry| {
        Selection::Department(entry.id.clone())
    })
}

pub fn product_prompt(department: &CatalogEntry) -> OutboundMessage {
    OutboundMessage::plain(format!("Department: {}\n\n{ENTER_PRODUCT}", department.label))
}

pub fn quantity_prompt() -> OutboundMessage {
    OutboundMessage::plain(ENTER_QUANTITY)
}

pub fn priority_prompt(catalog: &Catalog) -> OutboundMessage {
    with_choice_rows(OutboundMessage::plain(SELECT_PRIORITY), &catalog.priorities, |entry| {
        Selection::Priority(entry.id.clone())
    })
}

pub fn confirmation_prompt(order: &CompletedOrder) -> OutboundMessage {
    OutboundMessage::html(format!("<b>Please check your request</b>\n\n{}", order_lines(order)))
        .choice_row(vec![
            Choice::new("Send", Selection::Confirm.payload()),
            Choice::new("Cancel", Selection::Reject.payload()),
        ])
}

pub fn submitted(order: &CompletedOrder) -> OutboundMessage {
    OutboundMessage::html(format!(
        "Your request has been sent to the administrators.\n\n{}",
        order_lines(order)
    ))
}

/// The notification every administrator receives for a confirmed order.
pub fn order_notification(order: &CompletedOrder, submitted_at: DateTime<Utc>) -> OutboundMessage {
    OutboundMessage::html(format!(
        "<b>New purchase request</b>\n\nFrom: {}\nUsername: {}\nUser ID: {}\n\n{}\n\nDate: {}",
        escape_html(&order.submitter.full_name),
        username_label(&order.submitter),
        order.submitter.id,
        order_lines(order),
        submitted_at.format(ORDER_TIMESTAMP_FORMAT),
    ))
}

fn order_lines(order: &CompletedOrder) -> String {
    format!(
        "Department: {}\nProduct: {}\nQuantity: {}\nPriority: {}",
        escape_html(&order.department.label),
        escape_html(&order.product),
        escape_html(&order.quantity),
        escape_html(&order.priority.label),
    )
}

fn username_label(submitter: &Submitter) -> String {
    match submitter.username.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => format!("@{}", escape_html(name)),
        None => "not specified".to_owned(),
    }
}

fn with_choice_rows<F>(
    message: OutboundMessage,
    entries: &[CatalogEntry],
    select: F,
) -> OutboundMessage
where
    F: Fn(&CatalogEntry) -> Selection,
{
    entries.iter().fold(message, |message, entry| {
        message.choice_row(vec![Choice::new(entry.label.clone(), select(entry).payload())])
    })
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}
