//! Mail Module
//!
//! Delivery of change-request links. Transport is somebody else's problem;
//! the state layer only needs to know whether a send failed.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use url::Url;

// == Mail Error ==
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    #[error("recipient address rejected: {0}")]
    Rejected(String),

    #[error("mail transport failure: {0}")]
    Transport(String),
}

// == Change Link Email ==
/// Everything a template needs to render a change-link email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLinkEmail {
    pub recipient: String,
    pub full_name: String,
    pub link: Url,
    pub lang: String,
}

// == Mailer ==
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_change_password_email(&self, mail: &ChangeLinkEmail) -> Result<(), MailError>;

    async fn send_confirm_account_email(&self, mail: &ChangeLinkEmail) -> Result<(), MailError>;
}

// == Log Mailer ==
/// Writes the link to the log instead of sending anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_change_password_email(&self, mail: &ChangeLinkEmail) -> Result<(), MailError> {
        info!(
            recipient = %mail.recipient,
            lang = %mail.lang,
            link = %mail.link,
            "change password email"
        );
        Ok(())
    }

    async fn send_confirm_account_email(&self, mail: &ChangeLinkEmail) -> Result<(), MailError> {
        info!(
            recipient = %mail.recipient,
            lang = %mail.lang,
            link = %mail.link,
            "confirm account email"
        );
        Ok(())
    }
}
