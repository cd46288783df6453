//! Session token CLI commands: issue, revoke.

use anyhow::{bail, Result};
use chrono::Duration;
use console::style;

use stacks_types::error::RepositoryError;
use stacks_types::identity::UserId;

use crate::state::AppState;

/// Issue a session token. Only its hash is stored, so it is shown once.
pub async fn issue_session(
    state: &AppState,
    user_id: UserId,
    ttl_hours: i64,
    json: bool,
) -> Result<()> {
    if ttl_hours <= 0 {
        bail!("--ttl-hours must be positive");
    }

    let token = match state
        .identity
        .issue_session(user_id, Duration::hours(ttl_hours))
        .await
    {
        Ok(token) => token,
        Err(RepositoryError::NotFound) => bail!("no user with id {user_id}"),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!(
            "{}",
            serde_json::json!({"user_id": user_id, "token": token, "ttl_hours": ttl_hours})
        );
    } else {
        println!();
        println!(
            "  {} Session token (save this -- it won't be shown again):",
            style("🔑").bold()
        );
        println!();
        println!("  {}", style(&token).yellow().bold());
        println!();
    }

    Ok(())
}

/// Revoke a session token.
pub async fn revoke_session(state: &AppState, token: &str, json: bool) -> Result<()> {
    let revoked = state.identity.revoke_session(token).await?;

    if json {
        println!("{}", serde_json::json!({"revoked": revoked}));
    } else if revoked {
        println!("  {} Session revoked", style("✓").green().bold());
    } else {
        println!("  {} No such session", style("i").blue().bold());
    }

    Ok(())
}
