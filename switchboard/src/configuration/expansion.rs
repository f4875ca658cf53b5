//! Environment variable expansion in the configuration file

use std::collections::HashMap;
use std::env;
use std::env::VarError;
use std::fs;

use serde_json::Map;
use serde_json::Value;

use super::ConfigurationError;

#[derive(buildstructor::Builder, Clone)]
pub(crate) struct Expansion {
    prefix: Option<String>,
    supported_modes: Vec<String>,
    override_configs: Vec<Override>,
    #[cfg(test)]
    mocked_env_vars: HashMap<String, String>,
}

#[derive(buildstructor::Builder, Clone)]
pub(crate) struct Override {
    /// The dotted path to the config value to override.
    config_path: String,
    /// Env variables take precedence over any override values.
    env_name: Option<String>,
    /// Override value
    value: Option<Value>,
    #[cfg(test)]
    mocked_env_vars: HashMap<String, String>,
}

impl Override {
    fn value(&self) -> Option<Value> {
        // Order of precedence is:
        // 1. In tests only, if the mocked env variable is set, use that
        // 2. If the env variable is set, use that
        // 3. If the override is set, use that
        // 4. Don't change the config
        let env_value = self.env_name.as_ref().and_then(|name| {
            #[cfg(test)]
            if let Some(value) = self.mocked_env_vars.get(name) {
                return Some(value.clone());
            }
            std::env::var(name).ok()
        });
        match (env_value, self.value.clone()) {
            (Some(value), _) => Some(Value::String(value)),
            (_, Some(value)) => Some(value),
            _ => None,
        }
    }
}

#[buildstructor::buildstructor]
impl Expansion {
    pub(crate) fn default() -> Result<Self, ConfigurationError> {
        Self::default_builder().build()
    }

    #[builder]
    pub(crate) fn default_new(
        #[cfg_attr(not(test), allow(unused))] mocked_env_vars: HashMap<String, String>,
    ) -> Result<Self, ConfigurationError> {
        let prefix = Expansion::prefix_from_env()?;

        let supported_expansion_modes = match env::var("SWITCHBOARD_CONFIG_SUPPORTED_MODES") {
            Ok(v) => v,
            Err(VarError::NotPresent) => "env,file".to_string(),
            Err(VarError::NotUnicode(_)) => Err(ConfigurationError::InvalidExpansionModeConfig)?,
        };
        let supported_modes = supported_expansion_modes
            .split(',')
            .map(|mode| mode.trim().to_string())
            .collect::<Vec<String>>();

        let builder = Expansion::builder();
        #[cfg(test)]
        let builder = builder.mocked_env_vars(mocked_env_vars.clone());

        // Listen address override: env > CLI > config
        let listen = *crate::executable::SWITCHBOARD_LISTEN_ADDRESS.lock();
        let listen_override = Override::builder()
            .config_path("server.listen")
            .env_name("SWITCHBOARD_LISTEN")
            .and_value(listen.map(|listen| Value::String(listen.to_string())));
        #[cfg(test)]
        let listen_override = listen_override.mocked_env_vars(mocked_env_vars);

        Ok(builder
            .and_prefix(prefix)
            .supported_modes(supported_modes)
            .override_config(listen_override.build())
            .build())
    }

    fn prefix_from_env() -> Result<Option<String>, ConfigurationError> {
        match env::var("SWITCHBOARD_CONFIG_ENV_PREFIX") {
            Ok(v) => Ok(Some(v)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(ConfigurationError::InvalidExpansionModeConfig),
        }
    }
}

impl Expansion {
    fn context_fn(&self) -> impl Fn(&str) -> Result<Option<String>, ConfigurationError> + '_ {
        move |key: &str| {
            if !self
                .supported_modes
                .iter()
                .any(|prefix| key.starts_with(prefix.as_str()))
            {
                return Err(ConfigurationError::UnknownExpansionMode {
                    key: key.to_string(),
                    supported_modes: self.supported_modes.join("|"),
                });
            }

            if let Some(key) = key.strip_prefix("env.") {
                return self.expand_env(key);
            }
            if let Some(key) = key.strip_prefix("file.") {
                if !std::path::Path::new(key).exists() {
                    return Ok(None);
                }

                return fs::read_to_string(key).map(Some).map_err(|cause| {
                    ConfigurationError::CannotExpandVariable {
                        key: key.to_string(),
                        cause: format!("{cause}"),
                    }
                });
            }
            Err(ConfigurationError::InvalidExpansionModeConfig)
        }
    }

    pub(crate) fn expand_env(&self, key: &str) -> Result<Option<String>, ConfigurationError> {
        match self.prefix.as_ref() {
            None => self.get_env(key),
            Some(prefix) => self.get_env(&format!("{prefix}_{key}")),
        }
        .map(Some)
        .map_err(|cause| ConfigurationError::CannotExpandVariable {
            key: key.to_string(),
            cause: format!("{cause}"),
        })
    }

    fn get_env(&self, name: &str) -> Result<String, std::env::VarError> {
        #[cfg(test)]
        if let Some(value) = self.mocked_env_vars.get(name) {
            return Ok(value.clone());
        }
        env::var(name)
    }

    pub(crate) fn expand(
        &self,
        configuration: &serde_json::Value,
    ) -> Result<serde_json::Value, ConfigurationError> {
        let mut configuration = configuration.clone();
        self.defaults(&mut configuration)?;
        self.visit(&mut configuration)?;
        Ok(configuration)
    }

    fn defaults(&self, config: &mut Value) -> Result<(), ConfigurationError> {
        // Anything that needs expanding via env variable should be placed here. Don't pollute the codebase with calls to std::env.
        for override_config in &self.override_configs {
            if let Some(value) = override_config.value() {
                set_path(config, &override_config.config_path, value)?;
            }
        }
        Ok(())
    }

    fn visit(&self, value: &mut Value) -> Result<(), ConfigurationError> {
        let mut expanded: Option<String> = None;
        match value {
            Value::String(value) => {
                let new_value = shellexpand::env_with_context(value, self.context_fn())?;
                if &new_value != value {
                    expanded = Some(new_value.to_string());
                }
            }
            Value::Array(a) => {
                for v in a {
                    self.visit(v)?
                }
            }
            Value::Object(o) => {
                for v in o.values_mut() {
                    self.visit(v)?
                }
            }
            _ => {}
        }
        // The expansion may have resulted in a primitive, reparse and replace
        if let Some(expanded) = expanded {
            *value = coerce(&expanded)
        }
        Ok(())
    }
}

fn set_path(config: &mut Value, path: &str, value: Value) -> Result<(), ConfigurationError> {
    let invalid_structure = |segment: &str| ConfigurationError::InvalidConfiguration {
        message: "could not set configuration defaults as the source configuration had an invalid structure",
        error: format!("'{segment}' of '{path}' is not an object"),
    };

    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return Ok(());
    };
    let mut current = config;
    for segment in parents {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(object) => object.entry(segment.to_string()).or_insert(Value::Null),
            _ => return Err(invalid_structure(segment)),
        };
    }
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(object) => {
            object.insert(last.to_string(), value);
            Ok(())
        }
        _ => Err(invalid_structure(last)),
    }
}

pub(crate) fn coerce(expanded: &str) -> Value {
    match serde_yaml::from_str(expanded) {
        Ok(Value::Bool(b)) => Value::Bool(b),
        Ok(Value::Number(n)) => Value::Number(n),
        Ok(Value::Null) => Value::Null,
        _ => Value::String(expanded.to_string()),
    }
}
