use std::{fmt, str::FromStr, sync::Arc};
use tracing::info;

/// Navigation targets the session produces as side effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Landing,
    Profile,
}

impl Route {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Profile => "/profile",
        }
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "landing" | "/" => Ok(Self::Landing),
            "profile" | "/profile" => Ok(Self::Profile),
            other => Err(format!("unknown route: {other}")),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Receives navigation requests from the reconciler. Rendering is up to the
/// implementor.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

impl<T: Navigator + ?Sized> Navigator for Arc<T> {
    fn navigate(&self, route: Route) {
        (**self).navigate(route);
    }
}

/// Logs navigation; used by the CLI where there is nothing to render.
#[derive(Clone, Debug, Default)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, route: Route) {
        info!("navigate to {route}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_paths() {
        assert_eq!(Route::Landing.path(), "/");
        assert_eq!(Route::Profile.to_string(), "/profile");
    }

    #[test]
    fn route_from_name_or_path() {
        assert_eq!("landing".parse::<Route>(), Ok(Route::Landing));
        assert_eq!("/profile".parse::<Route>(), Ok(Route::Profile));
        assert!("/admin".parse::<Route>().is_err());
    }
}
