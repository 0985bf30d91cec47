use crate::session::{AuthScheme, Credentials, RegisterPolicy, Registration, Route};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;
use std::{path::PathBuf, time::Duration};

pub const NAME: &str = "session";
pub const ARG_BACKEND_URL: &str = "backend-url";
pub const ARG_TOKEN_FILE: &str = "token-file";
pub const ARG_AUTH_SCHEME: &str = "auth-scheme";
pub const ARG_REGISTER_POLICY: &str = "register-policy";
pub const ARG_TIMEOUT_SECONDS: &str = "timeout-seconds";
pub const ARG_USERNAME: &str = "username";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_FIELD: &str = "field";
pub const ARG_REDIRECT: &str = "redirect";

#[must_use]
pub fn command() -> Command {
    let command = Command::new(NAME)
        .about("Drive a client session against a credential exchange")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("login")
                .about("Exchange credentials for a token and store it")
                .args(credential_args())
                .arg(
                    Arg::new(ARG_REDIRECT)
                        .long(ARG_REDIRECT)
                        .help("Route to navigate to after login")
                        .value_parser(["profile", "landing"])
                        .default_value("profile"),
                ),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account, then follow the register policy")
                .args(credential_args())
                .arg(
                    Arg::new(ARG_FIELD)
                        .short('f')
                        .long(ARG_FIELD)
                        .help("Extra profile field, may be repeated")
                        .value_name("KEY=VALUE")
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(Command::new("logout").about("Forget the stored token"))
        .subcommand(
            Command::new("status").about("Check the stored token and print the current identity"),
        );

    with_client_args(command)
}

fn with_client_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BACKEND_URL)
                .long(ARG_BACKEND_URL)
                .help("Base URL of the credential exchange")
                .env("PASSAGE_BACKEND_URL")
                .default_value("http://localhost:3000")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_FILE)
                .long(ARG_TOKEN_FILE)
                .help("Where the session token is kept (default: <config dir>/passage/token)")
                .env("PASSAGE_TOKEN_FILE")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new(ARG_AUTH_SCHEME)
                .long(ARG_AUTH_SCHEME)
                .help("How the token is sent: `Bearer <token>` or the raw token")
                .env("PASSAGE_AUTH_SCHEME")
                .value_parser(["bearer", "raw"])
                .default_value("bearer")
                .global(true),
        )
        .arg(
            Arg::new(ARG_REGISTER_POLICY)
                .long(ARG_REGISTER_POLICY)
                .help("After registering: go to the landing page, or log in automatically")
                .env("PASSAGE_REGISTER_POLICY")
                .value_parser(["landing", "auto-login"])
                .default_value("landing")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TIMEOUT_SECONDS)
                .long(ARG_TIMEOUT_SECONDS)
                .help("Timeout for each request to the credential exchange")
                .env("PASSAGE_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..))
                .global(true),
        )
}

fn credential_args() -> [Arg; 2] {
    [
        Arg::new(ARG_USERNAME)
            .short('u')
            .long(ARG_USERNAME)
            .help("Account username")
            .env("PASSAGE_USERNAME")
            .required(true),
        Arg::new(ARG_PASSWORD)
            .long(ARG_PASSWORD)
            .help("Account password")
            .env("PASSAGE_PASSWORD")
            .hide_env_values(true)
            .required(true),
    ]
}

#[derive(Debug)]
pub enum Operation {
    Login {
        credentials: Credentials,
        redirect: Route,
    },
    Register(Registration),
    Logout,
    Status,
}

#[derive(Debug)]
pub struct Options {
    pub backend_url: String,
    pub token_file: Option<PathBuf>,
    pub auth_scheme: AuthScheme,
    pub register_policy: RegisterPolicy,
    pub timeout: Duration,
    pub operation: Operation,
}

impl Options {
    /// Parse client arguments from the `session` subcommand matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing or malformed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let (name, sub) = matches
            .subcommand()
            .context("missing session subcommand")?;

        let backend_url = sub
            .get_one::<String>(ARG_BACKEND_URL)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .with_context(|| format!("missing required argument: --{ARG_BACKEND_URL}"))?;

        let auth_scheme = sub
            .get_one::<String>(ARG_AUTH_SCHEME)
            .map_or(Ok(AuthScheme::default()), |value| value.parse())
            .map_err(|err| anyhow!(err))?;

        let register_policy = sub
            .get_one::<String>(ARG_REGISTER_POLICY)
            .map_or(Ok(RegisterPolicy::default()), |value| value.parse())
            .map_err(|err| anyhow!(err))?;

        let timeout = Duration::from_secs(
            sub.get_one::<u64>(ARG_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(10),
        );

        let operation = match name {
            "login" => Operation::Login {
                credentials: credentials(sub)?,
                redirect: sub
                    .get_one::<String>(ARG_REDIRECT)
                    .map_or(Ok(Route::Profile), |value| value.parse())
                    .map_err(|err| anyhow!(err))?,
            },
            "register" => {
                let mut registration = Registration::new(credentials(sub)?);
                for field in sub.get_many::<String>(ARG_FIELD).into_iter().flatten() {
                    let (key, value) = parse_field(field)?;
                    registration = registration.with_field(key, Value::String(value.to_string()));
                }
                Operation::Register(registration)
            }
            "logout" => Operation::Logout,
            "status" => Operation::Status,
            other => bail!("unknown session subcommand: {other}"),
        };

        Ok(Self {
            backend_url,
            token_file: sub.get_one::<PathBuf>(ARG_TOKEN_FILE).cloned(),
            auth_scheme,
            register_policy,
            timeout,
            operation,
        })
    }
}

fn credentials(matches: &ArgMatches) -> Result<Credentials> {
    let read_required = |id: &str| -> Result<String> {
        matches
            .get_one::<String>(id)
            .cloned()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("missing required argument: --{id}"))
    };

    Ok(Credentials::new(
        read_required(ARG_USERNAME)?,
        read_required(ARG_PASSWORD)?,
    ))
}

fn parse_field(field: &str) -> Result<(&str, &str)> {
    match field.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => bail!("invalid --{ARG_FIELD} '{field}', expected KEY=VALUE"),
    }
}
