use thiserror::Error;
use tracing::warn;

use crate::helpers::gateway::GatewayError;
use crate::helpers::store::StoreError;
use crate::structs::ticket::TicketKind;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("{0} tickets are not configured")]
    NotConfigured(TicketKind),
    #[error("{0} tickets are disabled")]
    Disabled(TicketKind),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("actor is not allowed to do this")]
    Forbidden,
    #[error("ticket is already claimed by {0}")]
    AlreadyClaimed(u64),
    #[error("ticket is not claimed")]
    NotClaimed,
    #[error("license key does not exist")]
    KeyInvalid,
    #[error("license key was already redeemed")]
    KeyAlreadyUsed,
    #[error("guild has no active premium")]
    NotPremium,
    #[error("changes kept in memory, storage write failed: {0}")]
    PersistenceDegraded(#[from] StoreError),
    #[error("channel is not a ticket")]
    NotATicket,
    #[error("ticket was already rated by this user")]
    AlreadyRated,
    #[error("chat platform call failed: {0}")]
    Platform(#[from] GatewayError),
}

impl DeskError {
    /// Text shown to the person who triggered the action.
    pub fn user_message(&self) -> String {
        match self {
            DeskError::NotConfigured(kind) => format!(
                "{} tickets are not set up yet. An admin can pick a category with `/setup {}`.",
                capitalize(kind.as_str()),
                kind
            ),
            DeskError::Disabled(kind) => format!("{} tickets are currently disabled on this server.", capitalize(kind.as_str())),
            DeskError::Invalid(reason) => format!("That didn't work: {}", reason),
            DeskError::Forbidden => "You don't have permission to do that.".to_string(),
            DeskError::AlreadyClaimed(staff) => format!("This ticket is already claimed by <@{}>.", staff),
            DeskError::NotClaimed => "This ticket isn't claimed.".to_string(),
            DeskError::KeyInvalid => "That license key doesn't exist.".to_string(),
            DeskError::KeyAlreadyUsed => "That license key has already been redeemed.".to_string(),
            DeskError::NotPremium => "This is a premium feature. Redeem a key with `/premium redeem`.".to_string(),
            DeskError::PersistenceDegraded(_) => {
                "Saved for now, but storage is having trouble. Changes will be written once it recovers.".to_string()
            }
            DeskError::NotATicket => "This channel isn't a ticket.".to_string(),
            DeskError::AlreadyRated => "You already rated this ticket.".to_string(),
            DeskError::Platform(_) => {
                "Discord rejected the request. Check that I have Manage Channels and Manage Roles, then try again.".to_string()
            }
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Storage failures never reach the caller; they are logged and the
/// in-memory state carries on.
pub fn log_soft_failure(result: Result<(), StoreError>, doc: &str) {
    if let Err(e) = result {
        let error = DeskError::from(e);
        warn!(doc, error = %error, "persistence degraded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_messages_name_the_ticket_type() {
        let message = DeskError::NotConfigured(TicketKind::Trade).user_message();
        assert!(message.starts_with("Trade tickets are not set up"));
        assert!(message.contains("/setup trade"));
    }
}
