use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

pub const COLLECTION_KEY: &str = "LUNCHPOLL_COLLECTION";
pub const VOTE_KEY_KEY: &str = "LUNCHPOLL_VOTE_KEY";
pub const CONNECT_TIMEOUT_KEY: &str = "LUNCHPOLL_CONNECT_TIMEOUT_SECS";
pub const ERROR_DISPLAY_KEY: &str = "LUNCHPOLL_ERROR_DISPLAY_SECS";
pub const STATE_FILE_KEY: &str = "LUNCHPOLL_STATE_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Collection the places live in.
    pub collection: String,
    /// Local persistence key holding this client's vote.
    pub vote_key: String,
    /// Ceiling for the first snapshot after subscribing.
    pub connect_timeout: Duration,
    /// How long transient messages stay visible.
    pub error_display: Duration,
    pub state_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            collection: "lunchPlaces".to_owned(),
            vote_key: "lunchVoteChoice".to_owned(),
            connect_timeout: Duration::from_secs(10),
            error_display: Duration::from_secs(8),
            state_file: PathBuf::from(".lunchpoll_state.json"),
        }
    }
}

impl Config {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn load() -> Config {
        if let Err(e) = dotenv::dotenv() {
            debug!("No .env file loaded: {}", e);
        }
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset or unparsable
    /// keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        Config {
            collection: try_load(&lookup, COLLECTION_KEY, defaults.collection),
            vote_key: try_load(&lookup, VOTE_KEY_KEY, defaults.vote_key),
            connect_timeout: nonzero_secs(
                CONNECT_TIMEOUT_KEY,
                try_load(&lookup, CONNECT_TIMEOUT_KEY, defaults.connect_timeout.as_secs()),
                defaults.connect_timeout,
            ),
            error_display: Duration::from_secs(try_load(
                &lookup,
                ERROR_DISPLAY_KEY,
                defaults.error_display.as_secs(),
            )),
            state_file: PathBuf::from(try_load(
                &lookup,
                STATE_FILE_KEY,
                defaults.state_file.display().to_string(),
            )),
        }
    }
}

fn nonzero_secs(key: &str, secs: u64, default: Duration) -> Duration {
    if secs == 0 {
        warn!("{} must be at least 1 second, using default: {}", key, default.as_secs());
        return default;
    }
    Duration::from_secs(secs)
}

fn try_load<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    let raw = match lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()) {
        Some(raw) => raw,
        None => {
            debug!("{} not set, using default: {}", key, default);
            return default;
        }
    };
    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {} value {:?}: {}, using default: {}", key, raw, e, default);
        default
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            (COLLECTION_KEY, "dinnerPlaces"),
            (CONNECT_TIMEOUT_KEY, "15"),
            (STATE_FILE_KEY, "/tmp/vote.json"),
        ]));
        assert_eq!(config.collection, "dinnerPlaces");
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.state_file, PathBuf::from("/tmp/vote.json"));
        assert_eq!(config.vote_key, "lunchVoteChoice");
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let config = Config::from_lookup(lookup_from(&[(ERROR_DISPLAY_KEY, "soon")]));
        assert_eq!(config.error_display, Duration::from_secs(8));
    }

    #[test]
    fn zero_connect_timeout_falls_back() {
        let config = Config::from_lookup(lookup_from(&[(CONNECT_TIMEOUT_KEY, "0")]));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }
}
