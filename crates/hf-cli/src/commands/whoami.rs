use hf_api_types::Identity;
use hf_client::ClientContext;

use super::friendly_error;

/// Run the `whoami` subcommand: fetch and print the signed-in identity.
pub async fn run(ctx: &ClientContext, json: bool) -> anyhow::Result<()> {
    let user = ctx
        .auth()
        .fetch_identity()
        .await
        .map_err(|e| friendly_error(ctx, e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        print!("{}", render(&user));
    }
    Ok(())
}

fn render(user: &Identity) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} <{}>\n", user.username, user.email));
    out.push_str(&format!("id:       {}\n", user.id));
    out.push_str(&format!("joined:   {}\n", user.created_at.format("%Y-%m-%d")));
    if let Some(avatar) = &user.avatar_url {
        out.push_str(&format!("avatar:   {avatar}\n"));
    }
    out
}
