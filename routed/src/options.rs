//! Typed access to the untyped option maps carried by plugin requests.
//!
//! Docker sends driver options as a JSON object whose values may be strings,
//! numbers, or nested maps; operator-supplied options usually arrive nested
//! under the `com.docker.network.generic` submap. Lookups here check the top
//! level first, then the generic submap, and fail when a recognized key is
//! present with the wrong shape.

use plugin_proto::{GENERIC_OPTIONS, MTU_OPTION, Options};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum OptionError {
    #[error("option {key} has unexpected shape: {value}")]
    BadShape { key: String, value: Value },
    #[error("option {key} is not a valid integer: {value}")]
    BadInteger { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, OptionError>;

/// Look up `key` at the top level, falling back to the
/// `com.docker.network.generic` submap.
fn lookup<'a>(options: &'a Options, key: &str) -> Option<&'a Value> {
    if let Some(value) = options.get(key) {
        return Some(value);
    }
    options
        .get(GENERIC_OPTIONS)
        .and_then(Value::as_object)
        .and_then(|generic| generic.get(key))
}

/// Fetch a string-valued option. Absent → `Ok(None)`; present with a
/// non-string value → `BadShape`.
pub fn get_string(options: &Options, key: &str) -> Result<Option<String>> {
    match lookup(options, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(OptionError::BadShape {
            key: key.to_string(),
            value: other.clone(),
        }),
    }
}

/// Fetch the MTU option, a stringly-typed integer.
pub fn get_mtu(options: &Options) -> Result<Option<u32>> {
    let Some(raw) = get_string(options, MTU_OPTION)? else {
        return Ok(None);
    };
    let mtu = raw.parse().map_err(|_| OptionError::BadInteger {
        key: MTU_OPTION.to_string(),
        value: raw,
    })?;
    Ok(Some(mtu))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_proto::{INGRESS_ALLOWED_OPTION, IP_ALIASES_OPTION};
    use serde_json::json;
    use std::collections::HashMap;

    fn options(value: Value) -> Options {
        serde_json::from_value::<HashMap<String, Value>>(value).unwrap()
    }

    #[test]
    fn get_string_top_level() {
        let opts = options(json!({IP_ALIASES_OPTION: "192.168.0.0/24"}));
        assert_eq!(
            get_string(&opts, IP_ALIASES_OPTION).unwrap().as_deref(),
            Some("192.168.0.0/24")
        );
    }

    #[test]
    fn get_string_descends_into_generic_submap() {
        let opts = options(json!({
            GENERIC_OPTIONS: {INGRESS_ALLOWED_OPTION: "10.0.0.0/8"}
        }));
        assert_eq!(
            get_string(&opts, INGRESS_ALLOWED_OPTION).unwrap().as_deref(),
            Some("10.0.0.0/8")
        );
    }

    #[test]
    fn top_level_wins_over_generic() {
        let opts = options(json!({
            MTU_OPTION: "9000",
            GENERIC_OPTIONS: {MTU_OPTION: "1400"}
        }));
        assert_eq!(get_mtu(&opts).unwrap(), Some(9000));
    }

    #[test]
    fn get_string_absent_is_none() {
        let opts = options(json!({}));
        assert!(get_string(&opts, IP_ALIASES_OPTION).unwrap().is_none());
    }

    #[test]
    fn get_string_rejects_non_string() {
        let opts = options(json!({MTU_OPTION: 1500}));
        assert!(matches!(
            get_string(&opts, MTU_OPTION),
            Err(OptionError::BadShape { .. })
        ));
    }

    #[test]
    fn get_mtu_parses_integer_string() {
        let opts = options(json!({MTU_OPTION: "1500"}));
        assert_eq!(get_mtu(&opts).unwrap(), Some(1500));
    }

    #[test]
    fn get_mtu_rejects_garbage() {
        let opts = options(json!({MTU_OPTION: "jumbo"}));
        assert!(matches!(
            get_mtu(&opts),
            Err(OptionError::BadInteger { .. })
        ));
    }
}
