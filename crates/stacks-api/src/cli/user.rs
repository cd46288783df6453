//! User management CLI commands.

use anyhow::{bail, Result};
use console::style;

use stacks_types::identity::Role;

use crate::state::AppState;

/// Create a user account.
///
/// ```bash
/// stacks user add --name "Lee" --role librarian
/// ```
pub async fn add_user(state: &AppState, name: &str, role: Role, json: bool) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("user name must not be empty");
    }

    let identity = state.identity.create_user(name, role).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&identity)?);
    } else {
        println!(
            "  {} Created {} '{}' with id {}",
            style("✓").green().bold(),
            identity.role,
            style(&identity.display_name).bold(),
            style(identity.user_id).cyan()
        );
        println!(
            "  Issue a token with: {}",
            style(format!("stacks session issue --user {}", identity.user_id)).yellow()
        );
    }

    Ok(())
}
