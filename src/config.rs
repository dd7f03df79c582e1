//! Configuration handling for the analyzer driver

use crate::core::options::{matches_pattern, CompilationOptions};
use crate::core::types::ReportDiagnostic;
use crate::engine::driver::DriverOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = ".analyzerdriver.json";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// How the driver schedules analyzers
    #[serde(default)]
    pub driver: DriverSettings,

    /// Which diagnostics are reported, and how
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Driver scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSettings {
    #[serde(default = "default_true")]
    pub concurrent_analysis: bool,

    /// Number of event workers (0 = one per CPU)
    #[serde(default)]
    pub worker_count: usize,

    #[serde(default)]
    pub log_analyzer_execution_time: bool,

    /// Analyzers (by name) whose callbacks must never overlap
    #[serde(default)]
    pub non_thread_safe_analyzers: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            concurrent_analysis: true,
            worker_count: 0,
            log_analyzer_execution_time: false,
            non_thread_safe_analyzers: Vec::new(),
        }
    }
}

/// Diagnostic reporting configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    /// Applied to diagnostics without a specific severity
    #[serde(default)]
    pub general_option: ReportDiagnostic,

    /// Per-id overrides
    #[serde(default)]
    pub severity: HashMap<String, ReportDiagnostic>,

    /// Ids to disable (supports wildcards like "CA*")
    #[serde(default)]
    pub disable: Vec<String>,

    #[serde(default)]
    pub report_suppressed_diagnostics: bool,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    /// Find and load configuration from `start_dir` or its parents
    pub fn find_and_load(start_dir: &Path) -> Option<Self> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(err) => {
                        log::warn!("{}", err);
                        None
                    }
                };
            }

            if !current.pop() {
                break;
            }
        }

        None
    }

    /// Check if a diagnostic id is disabled
    pub fn is_diagnostic_disabled(&self, id: &str) -> bool {
        if self.diagnostics.severity.get(id) == Some(&ReportDiagnostic::Suppress) {
            return true;
        }
        self.diagnostics
            .disable
            .iter()
            .any(|pattern| matches_pattern(id, pattern))
    }

    /// The diagnostics section as compilation options
    pub fn compilation_options(&self) -> CompilationOptions {
        let diagnostics = &self.diagnostics;
        let mut options = CompilationOptions::new()
            .with_general_option(diagnostics.general_option)
            .with_report_suppressed_diagnostics(diagnostics.report_suppressed_diagnostics);
        for (id, option) in &diagnostics.severity {
            options = options.with_specific_option(id.clone(), *option);
        }
        for pattern in &diagnostics.disable {
            options = options.with_disabled_pattern(pattern.clone());
        }
        options
    }

    /// The driver section as driver options
    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            worker_count: self.driver.worker_count,
            concurrent_analysis: self.driver.concurrent_analysis,
            log_analyzer_execution_time: self.driver.log_analyzer_execution_time,
            non_thread_safe_analyzers: self.driver.non_thread_safe_analyzers.clone(),
        }
    }
}

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {reason}", path = .0.display(), reason = .1)]
    Read(PathBuf, String),

    #[error("Failed to parse config file '{path}': {reason}", path = .0.display(), reason = .1)]
    Parse(PathBuf, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.driver.concurrent_analysis);
        assert_eq!(config.driver.worker_count, 0);
        assert!(!config.diagnostics.report_suppressed_diagnostics);
        assert_eq!(config.diagnostics.general_option, ReportDiagnostic::Default);
    }

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "driver": {
                "workerCount": 2,
                "nonThreadSafeAnalyzers": ["LegacyAnalyzer"]
            },
            "diagnostics": {
                "generalOption": "error",
                "severity": { "CA1000": "suppress", "CA2000": "info" },
                "disable": ["IDE*"]
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.driver.concurrent_analysis);
        assert_eq!(config.driver.worker_count, 2);
        assert_eq!(config.driver.non_thread_safe_analyzers, vec!["LegacyAnalyzer"]);
        assert_eq!(config.diagnostics.general_option, ReportDiagnostic::Error);
        assert_eq!(
            config.diagnostics.severity.get("CA2000"),
            Some(&ReportDiagnostic::Info)
        );
    }

    #[test]
    fn test_diagnostic_disabled() {
        let mut config = Config::default();
        config.diagnostics.disable.push("IDE*".to_string());
        config
            .diagnostics
            .severity
            .insert("CA1000".to_string(), ReportDiagnostic::Suppress);
        config
            .diagnostics
            .severity
            .insert("CA2000".to_string(), ReportDiagnostic::Error);

        assert!(config.is_diagnostic_disabled("IDE0001"));
        assert!(config.is_diagnostic_disabled("CA1000"));
        assert!(!config.is_diagnostic_disabled("CA2000"));
        assert!(!config.is_diagnostic_disabled("CS0168"));
    }

    #[test]
    fn test_compilation_options_projection() {
        let mut config = Config::default();
        config.diagnostics.general_option = ReportDiagnostic::Error;
        config.diagnostics.report_suppressed_diagnostics = true;
        config.diagnostics.disable.push("IDE*".to_string());
        config
            .diagnostics
            .severity
            .insert("CA2000".to_string(), ReportDiagnostic::Info);

        let options = config.compilation_options();
        assert_eq!(options.general_diagnostic_option, ReportDiagnostic::Error);
        assert!(options.report_suppressed_diagnostics);
        assert_eq!(options.specific_option("CA2000"), Some(ReportDiagnostic::Info));
        assert_eq!(options.specific_option("IDE0005"), Some(ReportDiagnostic::Suppress));
        assert_eq!(options.specific_option("CS0168"), None);
    }

    #[test]
    fn test_driver_options_projection() {
        let mut config = Config::default();
        config.driver.concurrent_analysis = false;
        config.driver.worker_count = 4;
        config.driver.log_analyzer_execution_time = true;

        let options = config.driver_options();
        assert!(!options.concurrent_analysis);
        assert!(options.log_analyzer_execution_time);
        assert_eq!(options.worker_count, 4);
        assert_eq!(options.effective_worker_count(), 1);
    }

    #[test]
    fn test_config_error_display() {
        let read_err = ConfigError::Read(PathBuf::from("test.json"), "not found".to_string());
        assert!(read_err.to_string().contains("Failed to read"));
        assert!(read_err.to_string().contains("test.json"));

        let parse_err = ConfigError::Parse(PathBuf::from("bad.json"), "invalid".to_string());
        assert!(parse_err.to_string().contains("Failed to parse"));
        assert!(parse_err.to_string().contains("bad.json"));
        assert_eq!(
            parse_err.to_string(),
            "Failed to parse config file 'bad.json': invalid"
        );
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(ConfigError::Read(..))));
    }

    #[test]
    fn test_load_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "{ not json").unwrap();

        assert!(matches!(Config::load(&config_path), Err(ConfigError::Parse(..))));
        assert!(Config::find_and_load(temp_dir.path()).is_none());
    }

    #[test]
    fn test_find_and_load_found() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        {
            let mut f = File::create(&config_path).unwrap();
            writeln!(f, r#"{{ "driver": {{ "concurrentAnalysis": false }} }}"#).unwrap();
        }

        let config = Config::find_and_load(temp_dir.path()).unwrap();
        assert!(!config.driver.concurrent_analysis);
    }

    #[test]
    fn test_find_and_load_not_found() {
        let temp_dir = TempDir::new().unwrap();
        // No config file in this directory
        assert!(Config::find_and_load(temp_dir.path()).is_none());
    }

    #[test]
    fn test_find_and_load_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(CONFIG_FILE_NAME);
        {
            let mut f = File::create(&config_path).unwrap();
            writeln!(f, r#"{{ "diagnostics": {{ "disable": ["CA*"] }} }}"#).unwrap();
        }

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        // Search from subdirectory should find parent's config
        let config = Config::find_and_load(&sub_dir).unwrap();
        assert!(config.is_diagnostic_disabled("CA1822"));
    }
}
