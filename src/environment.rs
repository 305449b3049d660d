//! Hosting environment detection
//!
//! Managed hosting platforms give the service an ephemeral or read-only
//! working directory. There the workbook is not attempted at all and the
//! remaining files live in a scratch directory.

use serde::Serialize;
use std::path::Path;

/// Variables set by known hosting platforms, with the name reported for each
const PLATFORM_MARKERS: [(&str, &str); 8] = [
    ("RENDER", "render"),
    ("VERCEL", "vercel"),
    ("RAILWAY_ENVIRONMENT", "railway"),
    ("DYNO", "heroku"),
    ("NETLIFY", "netlify"),
    ("FLY_APP_NAME", "fly"),
    ("K_SERVICE", "cloud-run"),
    ("AWS_LAMBDA_FUNCTION_NAME", "aws-lambda"),
];

/// Variables that mark an explicit production deployment
const PRODUCTION_FLAGS: [&str; 2] = ["APP_ENV", "NODE_ENV"];

/// Result of classifying the process environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// True when the filesystem should be treated as ephemeral
    pub hosting: bool,
    /// Detected platform name, or `local`
    pub platform: String,
}

impl Environment {
    /// Classify from an arbitrary variable lookup
    ///
    /// `marker_exists` reports whether the project marker file is present;
    /// its absence alone is enough to count as hosted.
    ///
    /// # Examples
    /// ```
    /// use feedback_ledger::environment::Environment;
    ///
    /// let env = Environment::classify(|key| (key == "DYNO").then(|| "web.1".to_string()), true);
    /// assert!(env.hosting);
    /// assert_eq!(env.platform, "heroku");
    /// ```
    pub fn classify<F>(lookup: F, marker_exists: bool) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_set = |key: &str| lookup(key).is_some_and(|v| !v.trim().is_empty());

        if let Some((_, platform)) = PLATFORM_MARKERS.iter().find(|(key, _)| is_set(*key)) {
            return Environment {
                hosting: true,
                platform: platform.to_string(),
            };
        }

        let production = PRODUCTION_FLAGS.iter().any(|key| {
            lookup(*key).is_some_and(|v| v.trim().eq_ignore_ascii_case("production"))
        });
        if production {
            return Environment {
                hosting: true,
                platform: "production".to_string(),
            };
        }

        if !marker_exists {
            return Environment {
                hosting: true,
                platform: "unknown-host".to_string(),
            };
        }

        Environment::local()
    }

    /// Classify the current process
    pub fn detect(marker_file: &Path) -> Self {
        Self::classify(|key| std::env::var(key).ok(), marker_file.exists())
    }

    /// A writable, persistent local environment
    pub fn local() -> Self {
        Environment {
            hosting: false,
            platform: "local".to_string(),
        }
    }

    /// A hosted environment on the given platform
    pub fn hosted(platform: &str) -> Self {
        Environment {
            hosting: true,
            platform: platform.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn plain_checkout_is_local() {
        let env = Environment::classify(lookup(&[]), true);
        assert_eq!(env, Environment::local());
    }

    #[test]
    fn platform_variables_mark_hosting() {
        let env = Environment::classify(lookup(&[("RENDER", "true")]), true);
        assert_eq!(env, Environment::hosted("render"));

        let env = Environment::classify(lookup(&[("K_SERVICE", "feedback")]), true);
        assert_eq!(env.platform, "cloud-run");
    }

    #[test]
    fn empty_platform_variable_is_ignored() {
        let env = Environment::classify(lookup(&[("VERCEL", " ")]), true);
        assert!(!env.hosting);
    }

    #[test]
    fn production_flag_marks_hosting() {
        let env = Environment::classify(lookup(&[("APP_ENV", "Production")]), true);
        assert_eq!(env, Environment::hosted("production"));

        let env = Environment::classify(lookup(&[("NODE_ENV", "development")]), true);
        assert!(!env.hosting);
    }

    #[test]
    fn missing_marker_file_marks_hosting() {
        let env = Environment::classify(lookup(&[]), false);
        assert_eq!(env, Environment::hosted("unknown-host"));
    }
}
