// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Structures handling command line options and YAML deserialization for the access log

use clap::Parser;
use log::trace;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::AccessLogError;

/// Command line options of the access log
#[derive(Debug, Default, Parser)]
pub struct AccessLogOpt {
    /// Access log file path
    ///
    /// Special values are an empty string (disable logging) and - (write to standard output).
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Log format, either a preset name (default, combined, json) or a pattern like
    /// '%a - - [%t] "%r" %s %b'
    #[clap(long)]
    pub log_format: Option<String>,

    /// Rotate the log file at local midnight
    #[clap(long, conflicts_with = "rotation_pattern")]
    pub daily_rotation: bool,

    /// Rotate the log file whenever this time format (e.g. %Y%m%d%H) produces a new value
    #[clap(long)]
    pub rotation_pattern: Option<String>,
}

/// When the log file is rotated
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationConf {
    /// Never, external tools can rotate the file and signal the process to reopen it
    #[default]
    None,
    /// At local midnight, `daily` in config file
    Daily,
    /// Whenever the formatted current time changes, `{pattern: "%Y%m%d%H"}` in config file
    Pattern(String),
}

/// Configuration settings of the access log
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessLogConf {
    /// Access log file path
    ///
    /// Special values are an empty string (disable logging) and - (write to standard output).
    pub log_file: PathBuf,
    /// Preset name (`default`, `combined` or `json`) or a pattern
    pub log_format: String,
    /// Rotation of the log file, ignored when writing to standard output
    pub rotation: RotationConf,
    /// Number of idle records and line buffers kept for reuse
    pub pool_size: Option<usize>,
}

impl Default for AccessLogConf {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("-"),
            log_format: "default".to_owned(),
            rotation: RotationConf::None,
            pool_size: None,
        }
    }
}

fn read_yaml(path: &Path) -> Result<Value, AccessLogError> {
    let config_error = |source: Box<dyn std::error::Error + Send + Sync>| AccessLogError::Config {
        path: path.to_owned(),
        source,
    };

    let file = File::open(path).map_err(|err| config_error(err.into()))?;
    let value: Value =
        serde_yaml::from_reader(BufReader::new(file)).map_err(|err| config_error(err.into()))?;

    // Catch errors here where the file name is still known
    serde_yaml::from_value::<AccessLogConf>(value.clone())
        .map_err(|err| config_error(err.into()))?;
    Ok(value)
}

impl AccessLogConf {
    /// Parses configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let conf: Self = serde_yaml::from_str(yaml)?;
        trace!("Loaded configuration: {conf:#?}");
        Ok(conf)
    }

    /// Loads configuration from a YAML file.
    pub fn load_from_yaml(path: impl AsRef<Path>) -> Result<Self, AccessLogError> {
        Self::load_from_files(&[path])
    }

    /// Loads configuration from multiple YAML files, settings in later files take precedence.
    ///
    /// Returns the default configuration if the list is empty.
    pub fn load_from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, AccessLogError> {
        let mut merged = Mapping::new();
        let mut last_path = None;
        for path in paths {
            let path = path.as_ref();
            if let Value::Mapping(mapping) = read_yaml(path)? {
                for (key, value) in mapping {
                    merged.insert(key, value);
                }
            }
            last_path = Some(path);
        }

        let conf: Self = serde_yaml::from_value(Value::Mapping(merged)).map_err(|err| {
            AccessLogError::Config {
                path: last_path.map(Path::to_owned).unwrap_or_default(),
                source: err.into(),
            }
        })?;
        trace!("Loaded configuration files: {conf:#?}");
        Ok(conf)
    }

    /// Merges the command line options into the current configuration. Any command line options
    /// present overwrite existing settings.
    pub fn merge_with_opt(&mut self, opt: AccessLogOpt) {
        if let Some(log_file) = opt.log_file {
            self.log_file = log_file;
        }

        if let Some(log_format) = opt.log_format {
            self.log_format = log_format;
        }

        if let Some(pattern) = opt.rotation_pattern {
            self.rotation = RotationConf::Pattern(pattern);
        } else if opt.daily_rotation {
            self.rotation = RotationConf::Daily;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_log::test;

    fn yaml_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults() {
        assert_eq!(AccessLogConf::from_yaml("{}").unwrap(), AccessLogConf::default());
        assert_eq!(
            AccessLogConf::load_from_files::<&Path>(&[]).unwrap(),
            AccessLogConf::default()
        );
    }

    #[test]
    fn parsing() {
        let conf = AccessLogConf::from_yaml(
            r#"
                log_file: logs/access.log
                log_format: combined
                rotation: daily
                pool_size: 16
            "#,
        )
        .unwrap();
        assert_eq!(
            conf,
            AccessLogConf {
                log_file: PathBuf::from("logs/access.log"),
                log_format: "combined".to_owned(),
                rotation: RotationConf::Daily,
                pool_size: Some(16),
            }
        );

        let conf = AccessLogConf::from_yaml("rotation: {pattern: '%Y%m%d%H'}").unwrap();
        assert_eq!(conf.rotation, RotationConf::Pattern("%Y%m%d%H".to_owned()));

        let conf = AccessLogConf::from_yaml("rotation: none\nlog_file: ''").unwrap();
        assert_eq!(conf.rotation, RotationConf::None);
        assert_eq!(conf.log_file, PathBuf::new());

        assert!(AccessLogConf::from_yaml("log_fiel: access.log").is_err());
        assert!(AccessLogConf::from_yaml("rotation: hourly").is_err());
    }

    #[test]
    fn multiple_files() {
        let first = yaml_file("log_file: access.log\nlog_format: json\n");
        let second = yaml_file("log_format: '%s %b'\nrotation: daily\n");

        let conf = AccessLogConf::load_from_files(&[first.path(), second.path()]).unwrap();
        assert_eq!(conf.log_file, PathBuf::from("access.log"));
        assert_eq!(conf.log_format, "%s %b");
        assert_eq!(conf.rotation, RotationConf::Daily);

        let conf = AccessLogConf::load_from_yaml(first.path()).unwrap();
        assert_eq!(conf.log_format, "json");
    }

    #[test]
    fn file_errors() {
        let invalid = yaml_file("pool_size: many\n");
        match AccessLogConf::load_from_yaml(invalid.path()) {
            Err(AccessLogError::Config { path, .. }) => assert_eq!(path, invalid.path()),
            result => panic!("unexpected result {result:?}"),
        }

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        match AccessLogConf::load_from_yaml(&missing) {
            Err(AccessLogError::Config { path, .. }) => assert_eq!(path, missing),
            result => panic!("unexpected result {result:?}"),
        }
    }

    #[test]
    fn command_line() {
        let opt = AccessLogOpt::try_parse_from([
            "test",
            "--log-file",
            "/var/log/access.log",
            "--log-format",
            "combined",
            "--daily-rotation",
        ])
        .unwrap();

        let mut conf = AccessLogConf::from_yaml("log_format: json\npool_size: 3").unwrap();
        conf.merge_with_opt(opt);
        assert_eq!(
            conf,
            AccessLogConf {
                log_file: PathBuf::from("/var/log/access.log"),
                log_format: "combined".to_owned(),
                rotation: RotationConf::Daily,
                pool_size: Some(3),
            }
        );

        let opt =
            AccessLogOpt::try_parse_from(["test", "--rotation-pattern", "%Y%m%d%H"]).unwrap();
        conf.merge_with_opt(opt);
        assert_eq!(conf.rotation, RotationConf::Pattern("%Y%m%d%H".to_owned()));
        assert_eq!(conf.log_format, "combined");

        conf.merge_with_opt(AccessLogOpt::default());
        assert_eq!(conf.rotation, RotationConf::Pattern("%Y%m%d%H".to_owned()));

        assert!(AccessLogOpt::try_parse_from([
            "test",
            "--daily-rotation",
            "--rotation-pattern",
            "%Y"
        ])
        .is_err());
    }
}
