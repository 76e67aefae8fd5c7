use crate::{api, config::SecurityConfig};
use anyhow::Result;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub config: SecurityConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the HTTP clients cannot be built or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);
    api::new(args.port, args.config).await
}

fn log_startup_args(args: &Args) {
    let config = &args.config;
    let or_none = |value: &Option<String>| value.clone().unwrap_or_else(|| "none".to_string());
    let mut entries = vec![
        ("listen", format!("tcp:{}", args.port)),
        ("auth_type", config.auth.auth_type.to_string()),
        ("backend_url", redact_url(&config.backend.url)),
        ("cookie_name", config.cookie.name.clone()),
        ("cookie_secure", config.cookie.secure.to_string()),
        (
            "cookie_ttl",
            config
                .cookie
                .ttl
                .map_or_else(|| "browser-session".to_string(), |ttl| format!("{}s", ttl.as_secs())),
        ),
        ("session_ttl", format!("{}s", config.session.ttl.as_secs())),
        ("session_keepalive", config.session.keepalive.to_string()),
        ("idp_timeout", format!("{}s", config.auth.idp_timeout.as_secs())),
        ("multitenancy", config.multitenancy.enabled.to_string()),
    ];
    if config.auth.auth_type == crate::session::AuthType::OpenId {
        entries.push(("openid_connect_url", or_none(&config.openid.connect_url)));
        entries.push(("openid_client_id", or_none(&config.openid.client_id)));
    }
    log_entries("Startup configuration", &entries);
}

fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-url".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn banner() -> String {
    format!(
        "C U S T O D I A - {} - {}",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    )
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
