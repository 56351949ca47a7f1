//! Sign-in, sign-up and password actions
//!
//! Each action validates its inputs locally before any request. Gateway
//! failures come back as errors whose `user_message()` is the service's own
//! text.

use crate::context::ClientContext;
use crate::error::{ClientError, ClientResult};
use gateway_client::{
    to_row, AuthGateway, AuthUser, Collection, DataGateway, Row, Session, UserUpdate,
};
use serde_json::{json, Value};
use tracing::{info, warn};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const CONFIRM_EMAIL_MESSAGE: &str =
    "Please confirm your email address. We just sent you a verification link.";
pub const MAGIC_LINK_SENT_MESSAGE: &str = "Magic link sent! Check your inbox.";
pub const RESET_SENT_MESSAGE: &str = "Password reset instructions are on their way to your inbox.";
pub const PASSWORD_UPDATED_MESSAGE: &str =
    "Password updated! You can now sign in with your new password.";

#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// The account is live and signed in
    SignedIn(Session),
    /// The account exists but email confirmation is pending
    ConfirmEmail,
}

impl SignUpOutcome {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            SignUpOutcome::SignedIn(_) => None,
            SignUpOutcome::ConfirmEmail => Some(CONFIRM_EMAIL_MESSAGE),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub username: String,
    pub full_name: String,
}

pub struct AccountService {
    ctx: ClientContext,
}

impl AccountService {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ClientResult<Session> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ClientError::validation(
                "Please provide your email and password.",
            ));
        }
        let session = self
            .ctx
            .gateway()
            .sign_in_with_password(email, password)
            .await?;
        self.ctx.cache().clear();
        info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    pub async fn send_magic_link(&self, email: &str) -> ClientResult<&'static str> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ClientError::validation(
                "Enter your email to receive a magic link.",
            ));
        }
        self.ctx.gateway().sign_in_with_otp(email).await?;
        Ok(MAGIC_LINK_SENT_MESSAGE)
    }

    /// Create the account and its profile row
    pub async fn sign_up(&self, form: &SignUpForm) -> ClientResult<SignUpOutcome> {
        let email = form.email.trim();
        let username = form.username.trim();
        if email.is_empty() || username.is_empty() || form.password.is_empty() {
            return Err(ClientError::validation(
                "Email, username, and password are required.",
            ));
        }
        let full_name = form.full_name.trim();

        let mut metadata = Row::new();
        metadata.insert("username".to_string(), Value::String(username.to_string()));
        if !full_name.is_empty() {
            metadata.insert("full_name".to_string(), Value::String(full_name.to_string()));
        }

        let gateway = self.ctx.gateway();
        let response = gateway.sign_up(email, &form.password, metadata).await?;

        if let Some(user) = response.user.as_ref() {
            self.create_profile(user, username, full_name).await?;
        }

        match response.session {
            Some(session) => {
                self.ctx.cache().clear();
                info!(user_id = %session.user.id, "Signed up");
                Ok(SignUpOutcome::SignedIn(session))
            }
            None => Ok(SignUpOutcome::ConfirmEmail),
        }
    }

    async fn create_profile(
        &self,
        user: &AuthUser,
        username: &str,
        full_name: &str,
    ) -> ClientResult<()> {
        let display_name = if full_name.is_empty() { username } else { full_name };
        let row = to_row(&json!({
            "id": user.id,
            "username": username,
            "full_name": display_name,
        }))?;
        if let Err(e) = self
            .ctx
            .gateway()
            .upsert(Collection::Profiles, vec![row], &["id"])
            .await
        {
            warn!(user_id = %user.id, error = %e, "Profile row creation failed");
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> ClientResult<&'static str> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ClientError::validation(
                "Please enter the email associated with your account.",
            ));
        }
        self.ctx
            .gateway()
            .reset_password_for_email(email, redirect_to)
            .await?;
        Ok(RESET_SENT_MESSAGE)
    }

    pub async fn update_password(
        &self,
        password: &str,
        confirmation: &str,
    ) -> ClientResult<&'static str> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ClientError::validation(
                "Password must be at least 8 characters long.",
            ));
        }
        if password != confirmation {
            return Err(ClientError::validation("Passwords do not match."));
        }
        self.ctx
            .gateway()
            .update_user(UserUpdate {
                password: Some(password.to_string()),
                ..Default::default()
            })
            .await?;
        info!("Password updated");
        Ok(PASSWORD_UPDATED_MESSAGE)
    }

    pub async fn sign_out(&self) -> ClientResult<()> {
        self.ctx.sign_out().await
    }
}
