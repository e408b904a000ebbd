//! Subcommand handlers.

use market_auth::{Actor, AuthResult, AuthSnapshot, RegisterRequest, SessionStore};
use serde_json::json;
use tracing::info;

pub async fn login(session: &SessionStore, email: &str, password: &str) -> AuthResult<()> {
    let actor = session.login(email, password).await?;
    println!("Signed in as {}", describe(&actor));
    print_status(&session.snapshot(), session.has_credentials()?);
    Ok(())
}

pub async fn register(session: &SessionStore, form: &RegisterRequest) -> AuthResult<()> {
    let actor = session.register(form).await?;
    println!("Account created for {}", describe(&actor));
    print_status(&session.snapshot(), session.has_credentials()?);
    Ok(())
}

pub async fn logout(session: &SessionStore) {
    session.logout().await;
    println!("Signed out");
}

pub fn status(session: &SessionStore) -> AuthResult<()> {
    print_status(&session.snapshot(), session.has_credentials()?);
    Ok(())
}

pub async fn whoami(session: &SessionStore) -> AuthResult<()> {
    let actor = session.load_user().await?;
    let output = json!({
        "actor": actor,
        "phase": session.phase(),
        "route": session.route(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub async fn refresh(session: &SessionStore) -> AuthResult<()> {
    session.identity().refresh().await?;
    info!("Credentials renewed from command line");
    println!("Credentials renewed");
    Ok(())
}

fn describe(actor: &Actor) -> String {
    match actor.role {
        Some(role) => format!("{} [{}]", actor.display_name(), role.as_str()),
        None => actor.display_name(),
    }
}

fn print_status(snapshot: &AuthSnapshot, has_credentials: bool) {
    println!("phase:       {}", snapshot.phase().as_str());
    println!("route:       {}", snapshot.route());
    println!(
        "actor:       {}",
        snapshot
            .user
            .as_ref()
            .map(describe)
            .unwrap_or_else(|| "-".to_string())
    );
    println!("profile:     {}", if snapshot.has_profile() { "yes" } else { "no" });
    println!("credentials: {}", if has_credentials { "stored" } else { "none" });
    if let Some(error) = &snapshot.error {
        println!("error:       {error}");
    }
}
