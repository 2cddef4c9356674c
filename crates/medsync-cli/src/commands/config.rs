use std::env;

use medsync_core::models::OwnerId;
use medsync_core::util::is_http_url;

use crate::cli::ConfigCommands;
use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            remote_url,
            auth_token,
            owner_id,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileValues {
                remote_url,
                auth_token,
                owner_id,
            },
            no_activate,
        ),
        ConfigCommands::Show { json } => run_config_show(global_profile, json),
    }
}

/// Values passed on the command line for `config init`.
#[derive(Default)]
pub struct ProfileValues {
    pub remote_url: Option<String>,
    pub auth_token: Option<String>,
    pub owner_id: Option<String>,
}

pub fn run_config_init(
    profile_name: Option<&str>,
    values: ProfileValues,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = init_profile(&mut config, profile_name, values, no_activate)?;

    let path = config.save().map_err(CliError::Config)?;
    println!("Profile '{profile_name}' initialized at {}", path.display());

    let profile = config
        .profile(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    let missing_fields = missing_profile_fields(profile);
    if missing_fields.is_empty() {
        println!("Sync profile '{profile_name}' is ready. Run `medsync sync` to push local changes.");
    } else {
        println!(
            "Profile '{profile_name}' is missing: {}",
            missing_fields.join(", ")
        );
    }
    Ok(())
}

/// Merge explicit values, then environment, then what the profile already had.
pub fn init_profile(
    config: &mut CliProfilesConfig,
    profile_name: Option<&str>,
    values: ProfileValues,
    no_activate: bool,
) -> Result<String, CliError> {
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let remote_url = normalize_text_option(values.remote_url)
        .or_else(|| normalize_text_option(env::var("MEDSYNC_REMOTE_URL").ok()))
        .or_else(|| existing.remote_url());
    let auth_token = normalize_text_option(values.auth_token)
        .or_else(|| normalize_text_option(env::var("MEDSYNC_AUTH_TOKEN").ok()))
        .or_else(|| existing.auth_token());
    let owner_id = normalize_text_option(values.owner_id)
        .or_else(|| normalize_text_option(env::var("MEDSYNC_OWNER_ID").ok()))
        .or_else(|| existing.owner_id());

    if let Some(url) = &remote_url {
        if !is_http_url(url) {
            return Err(CliError::Config(
                "remote_url must include http:// or https://".to_string(),
            ));
        }
    }
    if let Some(owner) = &owner_id {
        OwnerId::new(owner.as_str())?;
    }

    let profile = config.profile_mut_or_default(&profile_name);
    profile.remote_url = remote_url;
    profile.auth_token = auth_token;
    profile.owner_id = owner_id;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }
    Ok(profile_name)
}

pub fn missing_profile_fields(profile: &CliProfile) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if profile.remote_url().is_none() {
        missing.push("remote_url");
    }
    if profile.owner_id().is_none() {
        missing.push("owner_id");
    }
    missing
}

fn run_config_show(profile_name: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let name = config.resolve_profile_name(profile_name);
    let mut profile = config.profile(&name).cloned().unwrap_or_default();
    if profile.auth_token.is_some() {
        profile.auth_token = Some("[REDACTED]".to_string());
    }

    if as_json {
        let value = serde_json::json!({ "profile": name, "settings": profile });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("profile:    {name}");
    println!(
        "remote_url: {}",
        profile.remote_url().unwrap_or_else(|| "-".to_string())
    );
    println!(
        "owner_id:   {}",
        profile.owner_id().unwrap_or_else(|| "-".to_string())
    );
    println!(
        "auth_token: {}",
        profile.auth_token.as_deref().unwrap_or("-")
    );
    Ok(())
}
