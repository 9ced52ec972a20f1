//! Configuration read from the environment at startup.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{self, ConfigError};
use crate::funnel::link::{DEFAULT_TEMPLATE, LinkConfig, digits_only};
use crate::funnel::{Script, TypingDelays};
use crate::integrations::{PixelConfig, WasellerConfig};

/// Default WhatsApp number that receives qualified leads.
pub const DEFAULT_WHATSAPP_NUMBER: &str = "5511913670303";

/// Everything the binary needs to run one funnel.
#[derive(Debug, Clone)]
pub struct FunnelConfig {
    pub link: LinkConfig,
    pub delays: TypingDelays,
    pub waseller: WasellerConfig,
    pub pixel: PixelConfig,
    /// JSON script to use instead of the built-in one.
    pub script_path: Option<PathBuf>,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::new(DEFAULT_WHATSAPP_NUMBER),
            delays: TypingDelays::default(),
            waseller: WasellerConfig::default(),
            pixel: PixelConfig::default(),
            script_path: None,
        }
    }
}

impl FunnelConfig {
    /// Read configuration and the script it points to.
    pub fn load_from_env() -> error::Result<(Self, Script)> {
        let config = Self::from_env()?;
        let script = config.load_script()?;
        Ok((config, script))
    }

    /// Read configuration from `FUNNEL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value. Unset and empty values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let destination_number =
            get("FUNNEL_WHATSAPP_NUMBER").unwrap_or_else(|| DEFAULT_WHATSAPP_NUMBER.to_string());
        if digits_only(&destination_number).is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "FUNNEL_WHATSAPP_NUMBER".to_string(),
                message: format!("{destination_number:?} contains no digits"),
            });
        }
        let link = LinkConfig {
            destination_number,
            template: get("FUNNEL_LINK_TEMPLATE").unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        };

        let millis = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            match get(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: e.to_string(),
                    }),
            }
        };
        let delays = TypingDelays {
            warm_up: millis("FUNNEL_WARMUP_MS", defaults.delays.warm_up)?,
            min: millis("FUNNEL_TYPING_MIN_MS", defaults.delays.min)?,
            max: millis("FUNNEL_TYPING_MAX_MS", defaults.delays.max)?,
        };
        if delays.min > delays.max {
            return Err(ConfigError::InvalidValue {
                key: "FUNNEL_TYPING_MIN_MS".to_string(),
                message: format!(
                    "minimum {}ms exceeds maximum {}ms",
                    delays.min.as_millis(),
                    delays.max.as_millis()
                ),
            });
        }

        let waseller = WasellerConfig {
            base_url: get("FUNNEL_CRM_BASE_URL").unwrap_or(defaults.waseller.base_url),
            token: SecretString::from(get("FUNNEL_CRM_TOKEN").unwrap_or_default()),
            origin: get("FUNNEL_LEAD_ORIGIN").unwrap_or(defaults.waseller.origin),
        };

        let pixel = PixelConfig {
            pixel_id: get("FUNNEL_PIXEL_ID").unwrap_or_default(),
            access_token: get("FUNNEL_PIXEL_ACCESS_TOKEN").map(SecretString::from),
            base_url: get("FUNNEL_PIXEL_BASE_URL").unwrap_or(defaults.pixel.base_url),
        };

        Ok(Self {
            link,
            delays,
            waseller,
            pixel,
            script_path: get("FUNNEL_SCRIPT_PATH").map(PathBuf::from),
        })
    }

    /// The configured script, or the built-in one.
    pub fn load_script(&self) -> Result<Script, ConfigError> {
        match &self.script_path {
            Some(path) => Script::from_json_file(path),
            None => Ok(Script::reference()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = FunnelConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.link.destination_number, DEFAULT_WHATSAPP_NUMBER);
        assert_eq!(config.link.template, DEFAULT_TEMPLATE);
        assert_eq!(config.delays, TypingDelays::default());
        assert_eq!(config.waseller.origin, "Chat_Funnel_Site");
        assert!(config.waseller.token.expose_secret().is_empty());
        assert!(!config.pixel.is_enabled());
        assert!(config.script_path.is_none());
        assert_eq!(config.load_script().unwrap().len(), 6);
    }

    #[test]
    fn reads_overrides() {
        let config = FunnelConfig::from_lookup(lookup(&[
            ("FUNNEL_WHATSAPP_NUMBER", "+55 (11) 9999-0000"),
            ("FUNNEL_WARMUP_MS", "0"),
            ("FUNNEL_TYPING_MIN_MS", "10"),
            ("FUNNEL_TYPING_MAX_MS", "20"),
            ("FUNNEL_CRM_TOKEN", "secret"),
            ("FUNNEL_PIXEL_ID", "1357041429488419"),
            ("FUNNEL_PIXEL_ACCESS_TOKEN", "pixel-secret"),
            ("FUNNEL_SCRIPT_PATH", "/tmp/script.json"),
        ]))
        .unwrap();
        assert_eq!(config.link.destination_number, "+55 (11) 9999-0000");
        assert_eq!(config.delays.warm_up, Duration::ZERO);
        assert_eq!(config.delays.min, Duration::from_millis(10));
        assert_eq!(config.delays.max, Duration::from_millis(20));
        assert_eq!(config.waseller.token.expose_secret(), "secret");
        assert!(config.pixel.is_enabled());
        assert_eq!(
            config.pixel.access_token.as_ref().unwrap().expose_secret(),
            "pixel-secret"
        );
        assert_eq!(config.script_path, Some(PathBuf::from("/tmp/script.json")));
    }

    #[test]
    fn rejects_non_numeric_delay() {
        let err = FunnelConfig::from_lookup(lookup(&[("FUNNEL_WARMUP_MS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FUNNEL_WARMUP_MS"));
    }

    #[test]
    fn rejects_inverted_delay_range() {
        let err = FunnelConfig::from_lookup(lookup(&[
            ("FUNNEL_TYPING_MIN_MS", "3000"),
            ("FUNNEL_TYPING_MAX_MS", "1000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_number_without_digits() {
        let err =
            FunnelConfig::from_lookup(lookup(&[("FUNNEL_WHATSAPP_NUMBER", "call me")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = FunnelConfig::from_lookup(lookup(&[
            ("FUNNEL_WHATSAPP_NUMBER", "  "),
            ("FUNNEL_LEAD_ORIGIN", ""),
        ]))
        .unwrap();
        assert_eq!(config.link.destination_number, DEFAULT_WHATSAPP_NUMBER);
        assert_eq!(config.waseller.origin, "Chat_Funnel_Site");
    }
}
