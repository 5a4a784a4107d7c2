pub mod logout;
pub mod pipes;
pub mod watch;
pub mod whoami;

use hf_client::bootstrap::BootstrapOutcome;
use hf_client::{ApiError, ClientContext};
use hf_core::config::CredentialProvider;
use tracing::debug;

/// Sign-in credentials taken from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            email: CredentialProvider::email()?,
            password: CredentialProvider::password()?,
        })
    }
}

/// Bootstrap the session and fall back to an explicit sign-in.
pub async fn ensure_session(
    ctx: &ClientContext,
    credentials: Option<&Credentials>,
) -> anyhow::Result<()> {
    match ctx.bootstrapper().run().await {
        BootstrapOutcome::Authenticated(user) => {
            debug!(user_id = %user.id, "session restored");
            return Ok(());
        }
        outcome => debug!(?outcome, "no session to restore"),
    }

    let Some(creds) = credentials else {
        anyhow::bail!(
            "Not signed in. Set {} and {} to sign in.",
            CredentialProvider::EMAIL_VAR,
            CredentialProvider::PASSWORD_VAR
        );
    };
    ctx.auth()
        .sign_in(&creds.email, &creds.password)
        .await
        .map_err(|e| friendly_error(ctx, e))?;
    Ok(())
}

/// Map client errors to user-friendly messages.
pub fn friendly_error(ctx: &ClientContext, err: ApiError) -> anyhow::Error {
    match err {
        ApiError::Network(_) => anyhow::anyhow!(
            "Could not connect to the hookfilter backend at {}. Is it running?\n  \
             (hint: check api.base_url or HOOKFILTER_API_URL)",
            ctx.transport().base_url()
        ),
        ApiError::Timeout => anyhow::anyhow!("Request timed out. The backend may be overloaded."),
        ApiError::SessionExpired => anyhow::anyhow!("Session expired, sign in again."),
        ApiError::Http { status: 401, .. } => {
            anyhow::anyhow!("Sign-in rejected. Check your email and password.")
        }
        other => anyhow::anyhow!("API request failed: {other}"),
    }
}
