//! Resolve the permissions of one user against a live backend and print every
//! page decision.
//!
//! ```text
//! permission-probe [config.json] [--user NAME] [--base-url URL]
//! ```
//!
//! `--base-url` (or `PAGEGATE_BASE_URL`) overrides the backend origin from
//! the configuration.

use anyhow::Result;
use clap::Parser;
use pagegate_core::CookieJar;
use pagegate_rbac::prelude::*;
use serde_json::json;
use tracing::{Level, info};

const PAGES: [&str; 5] = [
    Pages::USER_MANAGEMENT,
    Pages::USER_ROLE_MANAGEMENT,
    Pages::TEST_CASE_SET_MANAGEMENT,
    Pages::SOFTWARE_PACKAGE_MANAGEMENT,
    Pages::OPERATION_LOG_MANAGEMENT,
];

const OPERATIONS: [&str; 6] = [
    Operations::CREATE,
    Operations::EDIT,
    Operations::DELETE,
    Operations::VIEW,
    Operations::UPLOAD,
    Operations::DOWNLOAD,
];

#[derive(Parser)]
#[command(
    name = "permission-probe",
    about = "Print every page decision for one user"
)]
struct Args {
    /// Gate configuration file (default: development settings).
    config: Option<String>,

    /// Username to resolve instead of the configured default.
    #[arg(long)]
    user: Option<String>,

    /// Backend origin, overriding the configuration.
    #[arg(long, env = "PAGEGATE_BASE_URL")]
    base_url: Option<String>,
}

async fn report(evaluator: &PermissionEvaluator) -> Result<()> {
    let snapshot = evaluator.snapshot().await;

    let mut pages = serde_json::Map::new();
    for page in PAGES {
        let mut allowed = Vec::new();
        for operation in OPERATIONS {
            if evaluator.has_page_permission(page, Some(operation)).await {
                allowed.push(operation);
            }
        }
        pages.insert(
            page.to_string(),
            json!({
                "access": evaluator.has_page_permission(page, None).await,
                "operations": allowed,
            }),
        );
    }

    let stats = evaluator.cache().stats();
    let report = json!({
        "username": snapshot.identity,
        "roles": snapshot.roles,
        "fetchedAt": snapshot.fetched_at,
        "stale": evaluator.cache().is_stale(),
        "pages": pages,
        "cache": {
            "hits": stats.hits,
            "misses": stats.misses,
            "fetches": stats.fetches,
            "staleServed": stats.stale_served,
            "denyAllServed": stats.deny_all_served,
        },
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GateConfig::from_file(path)?,
        None => GateConfig::development(),
    };
    if let Some(base_url) = args.base_url {
        config.endpoint.base_url = Some(base_url);
    }

    let jar = CookieJar::new();
    if let Some(user) = &args.user {
        jar.set(&config.identity.cookie_name, user, None);
    }

    let gate = PermissionGate::builder()
        .with_config(config)
        .with_cookie_jar(jar)
        .build()?;

    info!(
        backend = ?gate.config().endpoint.base_url,
        identity = %gate.evaluator().username(),
        "Probing permissions"
    );
    report(gate.evaluator()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_config_user_and_base_url() {
        let args = Args::try_parse_from([
            "permission-probe",
            "gate.json",
            "--user",
            "alice",
            "--base-url",
            "http://localhost:9000",
        ])
        .unwrap();

        assert_eq!(args.config.as_deref(), Some("gate.json"));
        assert_eq!(args.user.as_deref(), Some("alice"));
        assert_eq!(args.base_url.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn test_user_requires_a_value() {
        assert!(Args::try_parse_from(["permission-probe", "--user"]).is_err());
    }
}
