//! Maps validated CLI matches to the action to execute.

use crate::cli::actions::{Action, server, session};
use crate::cli::commands::{server as server_command, session as session_command};
use anyhow::{Result, bail};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((server_command::NAME, sub)) => {
            let options = server_command::Options::parse(sub)?;
            Ok(Action::Server(server::Args {
                port: options.port,
                frontend_url: options.frontend_url,
            }))
        }
        Some((session_command::NAME, sub)) => {
            let options = session_command::Options::parse(sub)?;
            Ok(Action::Session(session::Args {
                backend_url: options.backend_url,
                token_file: options.token_file,
                auth_scheme: options.auth_scheme,
                register_policy: options.register_policy,
                timeout: options.timeout,
                operation: options.operation,
            }))
        }
        Some((other, _)) => bail!("unknown command: {other}"),
        None => bail!("missing command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthScheme;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn server_action() {
        temp_env::with_vars([("PASSAGE_FRONTEND_URL", None::<&str>)], || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "passage", "server", "--port", "8081",
            ]);
            match handler(&matches).unwrap() {
                Action::Server(args) => {
                    assert_eq!(args.port, 8081);
                    assert_eq!(args.frontend_url, "http://localhost:5173");
                }
                other => panic!("unexpected action: {other:?}"),
            }
        });
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn session_action() {
        temp_env::with_vars([("PASSAGE_AUTH_SCHEME", Some("raw"))], || {
            let matches =
                crate::cli::commands::new().get_matches_from(vec!["passage", "session", "status"]);
            match handler(&matches).unwrap() {
                Action::Session(args) => {
                    assert_eq!(args.auth_scheme, AuthScheme::Raw);
                    assert!(matches!(args.operation, session::Operation::Status));
                }
                other => panic!("unexpected action: {other:?}"),
            }
        });
    }

    #[test]
    fn invalid_frontend_url_fails_dispatch() {
        let matches = crate::cli::commands::new().get_matches_from(vec![
            "passage",
            "server",
            "--frontend-url",
            "localhost",
        ]);
        assert!(handler(&matches).is_err());
    }
}
