// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use config::{Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::ResultExt;

use crate::error::{LoadLayeredConfigSnafu, Result, SerdeJsonSnafu, TomlFormatSnafu};

/// Separator for environment variables. For example, `SEGMENT_REBUILD__STORE__TABLE`.
pub const ENV_VAR_SEP: &str = "__";

/// Separator for list values in environment variables. For example, `1,100000,5000000`.
pub const ENV_LIST_SEP: &str = ",";

/// Configuration trait defines the common interface for configuration that can be loaded from multiple sources and serialized to TOML.
pub trait Configurable: Serialize + DeserializeOwned + Default + Sized {
    /// Load the configuration from multiple sources and merge them.
    /// The precedence order is: config file > environment variables > default values.
    /// `env_prefix` is the prefix of environment variables, e.g. "SEGMENT_REBUILD__xxx".
    /// The function will use dunder(double underscore) `__` as the separator for environment variables, for example:
    /// `SEGMENT_REBUILD__STORE__COLUMN_FAMILY` will be mapped to `RebuildOptions.store.column_family` field in the configuration.
    /// Keys returned by [Configurable::env_list_keys] are parsed as comma separated lists.
    fn load_layered_options(config_file: Option<&str>, env_prefix: &str) -> Result<Self> {
        let default_opts = Self::default();

        let env_source = {
            let mut env = Environment::default();

            if !env_prefix.is_empty() {
                env = env.prefix(env_prefix);
            }

            if let Some(list_keys) = Self::env_list_keys() {
                env = env.list_separator(ENV_LIST_SEP);
                for key in list_keys {
                    env = env.with_list_parse_key(key);
                }
            }

            env.try_parsing(true)
                .separator(ENV_VAR_SEP)
                .ignore_empty(true)
        };

        // Workaround: Replacement for `Config::try_from(&default_opts)` due to
        // `ConfigSerializer` cannot handle the case of an empty struct contained
        // within an iterative structure.
        // See: https://github.com/mehcode/config-rs/issues/461
        let json_str = serde_json::to_string(&default_opts).context(SerdeJsonSnafu)?;
        let default_config = File::from_str(&json_str, FileFormat::Json);

        // Add default values and environment variables as the sources of the configuration.
        let mut layered_config = config::Config::builder()
            .add_source(default_config)
            .add_source(env_source);

        // Add config file as the source of the configuration if it is specified.
        if let Some(config_file) = config_file {
            layered_config = layered_config.add_source(File::new(config_file, FileFormat::Toml));
        }

        let mut opts: Self = layered_config
            .build()
            .and_then(|x| x.try_deserialize())
            .context(LoadLayeredConfigSnafu)?;

        opts.validate_sanitize()?;

        Ok(opts)
    }

    /// Validate(and possibly sanitize) the configuration.
    fn validate_sanitize(&mut self) -> Result<()> {
        Ok(())
    }

    /// List of toml keys that should be parsed as a list.
    fn env_list_keys() -> Option<&'static [&'static str]> {
        None
    }

    /// Serialize the configuration to a TOML string.
    fn to_toml(&self) -> Result<String> {
        toml::to_string(&self).context(TomlFormatSnafu)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use common_test_util::temp_dir::create_named_temp_file;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct TestStoreConfig {
        table: String,
        column_family: String,
        split_keys: Vec<String>,
    }

    impl Default for TestStoreConfig {
        fn default() -> Self {
            Self {
                table: "hulk:segment_index".to_string(),
                column_family: "cf".to_string(),
                split_keys: vec![],
            }
        }
    }

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    #[serde(default)]
    struct TestJobConfig {
        bucket: String,
        sample_ids: Vec<u32>,
        store: TestStoreConfig,
    }

    impl Configurable for TestJobConfig {
        fn env_list_keys() -> Option<&'static [&'static str]> {
            Some(&["sample_ids", "store.split_keys"])
        }
    }

    #[test]
    fn test_load_default_options() {
        let opts = TestJobConfig::load_layered_options(None, "CONFIG_UT_DEFAULT").unwrap();
        assert_eq!(TestJobConfig::default(), opts);
    }

    #[test]
    fn test_load_layered_options() {
        let mut file = create_named_temp_file();
        let toml_str = r#"
            bucket = "from-file"

            [store]
            column_family = "segments"
        "#;
        write!(file, "{}", toml_str).unwrap();

        let env_prefix = "CONFIG_UT";
        temp_env::with_vars(
            [
                (
                    // bucket = from-env, overridden by the config file.
                    [env_prefix.to_string(), "bucket".to_uppercase()].join(ENV_VAR_SEP),
                    Some("from-env"),
                ),
                (
                    // store.table = ns:rebuilt
                    [
                        env_prefix.to_string(),
                        "store".to_uppercase(),
                        "table".to_uppercase(),
                    ]
                    .join(ENV_VAR_SEP),
                    Some("ns:rebuilt"),
                ),
                (
                    // sample_ids = 1,5000000,55000000
                    [env_prefix.to_string(), "sample_ids".to_uppercase()].join(ENV_VAR_SEP),
                    Some("1,5000000,55000000"),
                ),
            ],
            || {
                let opts = TestJobConfig::load_layered_options(
                    Some(file.path().to_str().unwrap()),
                    env_prefix,
                )
                .unwrap();

                assert_eq!("from-file", opts.bucket);
                assert_eq!("ns:rebuilt", opts.store.table);
                assert_eq!("segments", opts.store.column_family);
                assert_eq!(vec![1, 5_000_000, 55_000_000], opts.sample_ids);
            },
        );
    }

    #[test]
    fn test_to_toml() {
        let toml = TestJobConfig::default().to_toml().unwrap();
        assert!(toml.contains("[store]"));
        assert!(toml.contains("column_family = \"cf\""));
    }
}
