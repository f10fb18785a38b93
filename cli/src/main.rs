mod store;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use reqwest::header::HeaderMap;
use serde_json::Value;
use session::{
    Account, Outcome, SIGN_IN_PATH, SessionConfig, SessionState, SignInRequest, SignInResponse, Token, TokenStore,
};
use tracing_subscriber::EnvFilter;

use crate::store::FileStore;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("no state directory; pass --state-dir or set SNAPGRAM_STATE_DIR")]
    MissingStateDir,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage failed: {0}")]
    Store(#[from] session::StoreError),
    #[error("sign-in response rejected: {0}")]
    SignIn(#[from] session::SignInError),
    #[error("not signed in ({reason}); run `snapgram signin` (client route {route})")]
    SignedOut { route: String, reason: String },
    #[error("server returned HTTP {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "snapgram", about = "Snapgram session and API CLI")]
struct Cli {
    /// Backend base URL. Falls back to `SessionConfig` defaults.
    #[arg(long, env = "SNAPGRAM_API_URL")]
    api_url: Option<String>,

    /// Directory holding the stored token and account record.
    #[arg(long, env = "SNAPGRAM_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[arg(long, env = "SNAPGRAM_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

struct CliContext {
    config: SessionConfig,
    store: FileStore,
    http: reqwest::Client,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the issued token.
    Signin(SigninArgs),
    /// Print the identity recovered from the stored token.
    Whoami,
    /// Remove the stored token.
    Logout,
    /// Issue an authorized GET against the backend.
    Get { path: String },
    Token(TokenCommand),
    Account(AccountCommand),
}

#[derive(Args, Debug)]
struct SigninArgs {
    /// Username, email or phone number.
    #[arg(long)]
    credential: String,

    #[arg(long, env = "SNAPGRAM_PASSWORD", hide_env_values = true)]
    password: String,

    /// Also store the account so it can be switched back to later.
    #[arg(long, default_value_t = false)]
    remember: bool,
}

#[derive(Args, Debug)]
struct TokenCommand {
    #[command(subcommand)]
    command: TokenSubcommand,
}

#[derive(Subcommand, Debug)]
enum TokenSubcommand {
    /// Store a token issued elsewhere, verbatim.
    Set { raw: String },
    /// Print the decoded claims of the stored token.
    Claims,
}

#[derive(Args, Debug)]
struct AccountCommand {
    #[command(subcommand)]
    command: AccountSubcommand,
}

#[derive(Subcommand, Debug)]
enum AccountSubcommand {
    Show,
    /// Make the remembered account's token the active one again.
    Switch,
    Forget,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = build_context(&cli)?;

    match cli.command {
        Command::Signin(args) => run_signin(&ctx, args).await,
        Command::Whoami => run_whoami(&ctx),
        Command::Logout => {
            let mut state = SessionState::new();
            session::logout(&ctx.store, &ctx.config, &mut state);
            println!("signed out");
            Ok(())
        }
        Command::Get { path } => run_get(&ctx, &path).await,
        Command::Token(token) => run_token(&ctx, token),
        Command::Account(account) => run_account(&ctx, account),
    }
}

fn build_context(cli: &Cli) -> Result<CliContext, CliError> {
    let mut config = SessionConfig::from_env();
    if let Some(url) = cli.api_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        config.api_base_url = url.trim_end_matches('/').to_owned();
    }

    let state_dir = match &cli.state_dir {
        Some(dir) => dir.clone(),
        None => dirs::config_dir().ok_or(CliError::MissingStateDir)?.join("snapgram"),
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()?;

    tracing::debug!(api = %config.api_base_url, state_dir = %state_dir.display(), "cli context ready");
    Ok(CliContext { config, store: FileStore::new(state_dir), http })
}

async fn run_signin(ctx: &CliContext, args: SigninArgs) -> Result<(), CliError> {
    let request = SignInRequest { credential: args.credential, password: args.password };
    let response = ctx.http.post(ctx.config.endpoint(SIGN_IN_PATH)).json(&request).send().await?;
    let status = response.status();
    let parsed: SignInResponse = response.json().await?;

    let body = match parsed.body {
        Some(body) if status.is_success() => body,
        _ => {
            return Err(CliError::ServerError {
                status: status.as_u16(),
                message: parsed.message.unwrap_or_else(|| "Invalid credentials".to_owned()),
            });
        }
    };

    let mut state = SessionState::new();
    let user = session::establish(&ctx.store, &ctx.config, &mut state, &body)?;
    if args.remember {
        session::switch_account(&ctx.store, &ctx.config, &Account::from_sign_in(&body))?;
    }

    print_json(&serde_json::to_value(&user)?)
}

fn run_whoami(ctx: &CliContext) -> Result<(), CliError> {
    let mut state = SessionState::new();
    let user = require_session(ctx, &mut state)?;
    print_json(&serde_json::to_value(user)?)
}

async fn run_get(ctx: &CliContext, path: &str) -> Result<(), CliError> {
    let mut state = SessionState::new();
    require_session(ctx, &mut state)?;

    let mut headers = HeaderMap::new();
    session::attach_credential(&ctx.store, &ctx.config, &mut headers);

    let response = ctx.http.get(ctx.config.endpoint(path)).headers(headers).send().await?;
    let status = response.status();
    let value = response.json::<Value>().await.unwrap_or(Value::Null);

    if let Some(outcome) = session::handle_status(&ctx.store, &ctx.config, &mut state, status) {
        return Err(signed_out(&outcome, "backend rejected the stored token"));
    }
    if !status.is_success() {
        return Err(CliError::ServerError { status: status.as_u16(), message: value.to_string() });
    }

    print_json(&value)
}

fn run_token(ctx: &CliContext, token: TokenCommand) -> Result<(), CliError> {
    match token.command {
        TokenSubcommand::Set { raw } => {
            ctx.store.set(&ctx.config.token_key, raw.trim())?;
            println!("token stored");
            Ok(())
        }
        TokenSubcommand::Claims => {
            let Some(token) = session::load_token(&ctx.store, &ctx.config) else {
                return Err(CliError::SignedOut {
                    route: ctx.config.sign_in_route.clone(),
                    reason: session::SessionError::NoTokenFound.to_string(),
                });
            };
            print_claims(&token)
        }
    }
}

fn run_account(ctx: &CliContext, account: AccountCommand) -> Result<(), CliError> {
    match account.command {
        AccountSubcommand::Show => match session::current_account(&ctx.store, &ctx.config)? {
            Some(account) => {
                let mut value = serde_json::to_value(&account)?;
                // Never echo the credential itself.
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("token");
                }
                print_json(&value)
            }
            None => {
                println!("no remembered account");
                Ok(())
            }
        },
        AccountSubcommand::Switch => match session::current_account(&ctx.store, &ctx.config)? {
            Some(account) => {
                session::switch_account(&ctx.store, &ctx.config, &account)?;
                println!("switched to {}", account.username);
                Ok(())
            }
            None => {
                println!("no remembered account");
                Ok(())
            }
        },
        AccountSubcommand::Forget => {
            session::forget_account(&ctx.store, &ctx.config)?;
            println!("account forgotten");
            Ok(())
        }
    }
}

/// Run the page-mount check and turn a redirect into a CLI error.
fn require_session<'a>(ctx: &CliContext, state: &'a mut SessionState) -> Result<&'a session::UserIdentity, CliError> {
    match session::bootstrap(&ctx.store, &ctx.config, state) {
        Outcome::Authenticated(_) => state.user().ok_or_else(|| CliError::SignedOut {
            route: ctx.config.sign_in_route.clone(),
            reason: "session state empty".to_owned(),
        }),
        outcome @ Outcome::Redirect(_) => Err(signed_out(&outcome, "stored token unusable")),
    }
}

fn signed_out(outcome: &Outcome, fallback: &str) -> CliError {
    match outcome {
        Outcome::Redirect(redirect) => CliError::SignedOut {
            route: redirect.to.clone(),
            reason: redirect.reason.as_ref().map_or_else(|| fallback.to_owned(), ToString::to_string),
        },
        Outcome::Authenticated(_) => CliError::SignedOut { route: String::new(), reason: fallback.to_owned() },
    }
}

fn print_claims(token: &Token) -> Result<(), CliError> {
    match session::decode(token) {
        Ok(claims) => print_json(&Value::Object(claims.to_map())),
        Err(e) => {
            println!("token does not decode: {e}");
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;
