use log::warn;

/// Amount accrued per day when nothing valid is stored
pub const DEFAULT_DAILY_AMOUNT: u64 = 45;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:smokefree.db";

const DATABASE_URL_VAR: &str = "SMOKEFREE_DATABASE_URL";
const DEFAULT_DAILY_AMOUNT_VAR: &str = "SMOKEFREE_DEFAULT_DAILY_AMOUNT";

/// Process-wide settings for the counter backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterConfig {
    pub database_url: String,
    pub default_daily_amount: u64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            default_daily_amount: DEFAULT_DAILY_AMOUNT,
        }
    }
}

impl CounterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let default_daily_amount = match lookup(DEFAULT_DAILY_AMOUNT_VAR) {
            Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!(
                    "Invalid {} '{}', using {}",
                    DEFAULT_DAILY_AMOUNT_VAR, raw, DEFAULT_DAILY_AMOUNT
                );
                DEFAULT_DAILY_AMOUNT
            }),
            None => DEFAULT_DAILY_AMOUNT,
        };

        Self {
            database_url,
            default_daily_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = CounterConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, CounterConfig::default());
        assert_eq!(config.default_daily_amount, 45);
        assert_eq!(config.database_url, "sqlite:smokefree.db");
    }

    #[test]
    fn test_values_from_environment() {
        let config = CounterConfig::from_lookup(lookup_from(&[
            ("SMOKEFREE_DATABASE_URL", "sqlite:/tmp/counter.db"),
            ("SMOKEFREE_DEFAULT_DAILY_AMOUNT", " 60 "),
        ]));

        assert_eq!(config.database_url, "sqlite:/tmp/counter.db");
        assert_eq!(config.default_daily_amount, 60);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = CounterConfig::from_lookup(lookup_from(&[
            ("SMOKEFREE_DATABASE_URL", "   "),
            ("SMOKEFREE_DEFAULT_DAILY_AMOUNT", "-5"),
        ]));

        assert_eq!(config, CounterConfig::default());
    }
}
