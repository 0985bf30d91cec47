use crate::api::origin::DEFAULT_FRONTEND_ORIGIN;
use anyhow::{Context, Result, bail};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const NAME: &str = "server";
pub const ARG_PORT: &str = "port";
pub const ARG_FRONTEND_URL: &str = "frontend-url";

#[must_use]
pub fn command() -> Command {
    Command::new(NAME)
        .about("Serve the reference credential exchange behind the origin guard")
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("3000")
                .env("PASSAGE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_URL)
                .long(ARG_FRONTEND_URL)
                .help("Frontend origin allowed to call the API")
                .long_help(
                    "Frontend origin allowed to call the API. Local development origins on ports 5173 and 4173 are always allowed as well.",
                )
                .env("PASSAGE_FRONTEND_URL")
                .default_value(DEFAULT_FRONTEND_ORIGIN),
        )
}

#[derive(Debug)]
pub struct Options {
    pub port: u16,
    pub frontend_url: String,
}

impl Options {
    /// Parse server arguments from the `server` subcommand matches.
    ///
    /// # Errors
    /// Returns an error if the frontend URL is empty or has no host.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(3000);

        let frontend_url = matches
            .get_one::<String>(ARG_FRONTEND_URL)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .with_context(|| format!("missing required argument: --{ARG_FRONTEND_URL}"))?;

        let parsed = Url::parse(&frontend_url)
            .with_context(|| format!("Invalid frontend URL: {frontend_url}"))?;
        if parsed.host_str().is_none() {
            bail!("Frontend URL must include a valid host: {frontend_url}");
        }

        Ok(Self { port, frontend_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn defaults() {
        temp_env::with_vars(
            [
                ("PASSAGE_PORT", None::<&str>),
                ("PASSAGE_FRONTEND_URL", None::<&str>),
            ],
            || {
                let matches = command().get_matches_from(vec![NAME]);
                let options = Options::parse(&matches).unwrap();
                assert_eq!(options.port, 3000);
                assert_eq!(options.frontend_url, DEFAULT_FRONTEND_ORIGIN);
            },
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn env_overrides() {
        temp_env::with_vars(
            [
                ("PASSAGE_PORT", Some("8443")),
                ("PASSAGE_FRONTEND_URL", Some("https://app.example.com/")),
            ],
            || {
                let matches = command().get_matches_from(vec![NAME]);
                let options = Options::parse(&matches).unwrap();
                assert_eq!(options.port, 8443);
                assert_eq!(options.frontend_url, "https://app.example.com/");
            },
        );
    }

    #[test]
    fn frontend_url_without_host_is_rejected() {
        let matches = command().get_matches_from(vec![NAME, "--frontend-url", "not a url"]);
        assert!(Options::parse(&matches).is_err());
    }
}
