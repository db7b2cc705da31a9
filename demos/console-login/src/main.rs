//! Drives a complete login from a terminal.
//!
//! Configuration comes from the environment:
//!
//! | variable                | field                |
//! |-------------------------|----------------------|
//! | `PASSAGE_PROVIDER_URL`  | `provider_login_url` |
//! | `PASSAGE_APP_TOKEN`     | `app_token`          |
//! | `PASSAGE_SECRET_KEY`    | `secret_key`         |
//! | `PASSAGE_API_URL`       | `api_base_url`       |
//! | `PASSAGE_API_KEY`       | `api_key`            |
//! | `PASSAGE_TIMEOUT_SECS`  | `request_timeout`    |
//! | `PASSAGE_STORE`         | path of the JSON store (default `.passage/auth.json`) |
//!
//! Open the printed URL, sign in, then paste the URL the provider sent you
//! back to. Logging is controlled by `RUST_LOG` (default `info`).

use std::io::{self, BufRead, Write};
use std::time::Duration;

use passage::prelude::*;
use tracing_subscriber::EnvFilter;

fn config_from_env() -> Result<AuthConfig, AuthError> {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    let mut config = AuthConfig::default()
        .with_app_token(var("PASSAGE_APP_TOKEN").unwrap_or_default())
        .with_secret_key(var("PASSAGE_SECRET_KEY").unwrap_or_default())
        .with_api(
            var("PASSAGE_API_URL").unwrap_or_default(),
            var("PASSAGE_API_KEY").unwrap_or_default(),
        );
    if let Some(url) = var("PASSAGE_PROVIDER_URL") {
        config = config.with_provider_login_url(url);
    }
    if let Some(secs) = var("PASSAGE_TIMEOUT_SECS") {
        let secs = secs.parse::<u64>().map_err(|e| {
            AuthError::Configuration(format!("PASSAGE_TIMEOUT_SECS: {e}"))
        })?;
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config_from_env()?;
    let store_path =
        std::env::var("PASSAGE_STORE").unwrap_or_else(|_| ".passage/auth.json".to_string());

    let api = config.http_api()?;
    let auth = AuthController::builder(config).build(FileStorage::open(&store_path)?, api)?;

    match auth.initialize().await {
        AuthState::Authenticated(user) => {
            println!("restored login for {} <{}>", user.name, user.email);
            match auth.validate_session().await {
                Ok(true) => println!("session is still valid"),
                Ok(false) => println!("session expired; run again to log in"),
                Err(e) => println!("could not reach the backend ({e}); showing cached profile"),
            }
            return Ok(());
        }
        state => tracing::debug!(%state, "no usable login"),
    }

    let url = auth.pre_login().await?;
    println!("sign in at:\n\n  {url}\n");

    let returned = prompt("paste the return URL: ")?;
    let returned = Url::parse(&returned)?;

    match auth.handle_return_url(&returned).await {
        Ok(user) => {
            println!("logged in as {} <{}>", user.name, user.email);
            if let Some(phone) = &user.phone {
                println!("phone: {phone}");
            }
        }
        Err(e) => {
            println!("login failed: {e}");
            println!("state: {}", auth.state());
        }
    }
    Ok(())
}
