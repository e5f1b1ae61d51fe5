// ABOUTME: bridgekit subcommands and shared argument parsing
// ABOUTME: Secrets are given as repeatable NAME=VALUE arguments

pub mod call;
pub mod up;

use bridgekit_core::Secret;

/// Parse a `NAME=VALUE` secret argument
pub fn parse_secret(raw: &str) -> Result<Secret, String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{}`", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("secret name is empty".to_string());
    }
    if !Secret::is_valid_name(name) {
        return Err(format!(
            "invalid secret name {:?}: use letters, digits and underscores, not starting with a digit",
            name
        ));
    }
    Ok(Secret::new(name, value))
}
