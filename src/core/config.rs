//! Caller options, the JSON settings file, and resolution into a run [`Config`].

use std::fmt;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::core::Reporter;
use crate::processing::InputPattern;
use crate::transform::{NameTransformer, OutputTransformer};
use crate::utils::{ConfigError, ConverterError};

/// Input pattern used when none is given
pub const DEFAULT_GLOB: &str = "input/*.{gif,jpg,png,svg}";
/// Output directory used when none is given
pub const DEFAULT_OUTPUT_DIR: &str = "output/";

pub type SuccessHook = Box<dyn FnOnce(&Path) + Send>;
pub type ErrorHook = Box<dyn FnOnce(&ConverterError) + Send>;

/// Output transformer as supplied by the caller.
#[derive(Debug, Clone)]
pub enum TransformerChoice {
    /// `default`, `verbose` or `dictionary`
    Named(String),
    Transformer(OutputTransformer),
}

/// Name transformer as supplied by the caller.
#[derive(Debug, Clone)]
pub enum NameChoice {
    /// Regular expression whose capture groups form the name
    Pattern(String),
    Transformer(NameTransformer),
}

/// Options for one conversion run. Everything is optional.
#[derive(Default)]
pub struct ConverterOptions {
    pub glob: Option<String>,
    pub output: Option<PathBuf>,
    pub output_transformer: Option<TransformerChoice>,
    pub name_transformer: Option<NameChoice>,
    /// Suppress per-file progress logging
    pub silent: bool,
    /// Read files verbatim instead of recompressing them
    pub skip_optimization: bool,
    /// Progress capability; overrides `silent` when set
    pub reporter: Option<Reporter>,
    pub on_success: Option<SuccessHook>,
    pub on_error: Option<ErrorHook>,
}

impl ConverterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn glob(mut self, glob: impl Into<String>) -> Self {
        self.glob = Some(glob.into());
        self
    }

    pub fn output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output = Some(dir.into());
        self
    }

    /// Selects a built-in output shape by name; checked when the run starts.
    pub fn output_transformer_name(mut self, name: impl Into<String>) -> Self {
        self.output_transformer = Some(TransformerChoice::Named(name.into()));
        self
    }

    pub fn output_transformer(mut self, transformer: OutputTransformer) -> Self {
        self.output_transformer = Some(TransformerChoice::Transformer(transformer));
        self
    }

    pub fn name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_transformer = Some(NameChoice::Pattern(pattern.into()));
        self
    }

    pub fn name_transformer(mut self, transformer: NameTransformer) -> Self {
        self.name_transformer = Some(NameChoice::Transformer(transformer));
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn skip_optimization(mut self, skip: bool) -> Self {
        self.skip_optimization = skip;
        self
    }

    pub fn reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn on_success(mut self, hook: impl FnOnce(&Path) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl FnOnce(&ConverterError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Merges the options with defaults and validates them.
    ///
    /// Performs no I/O: unknown transformer names, bad patterns and bad globs
    /// are all reported here.
    pub fn resolve(&self) -> Result<Config, ConfigError> {
        let glob = self.glob.clone().unwrap_or_else(|| DEFAULT_GLOB.to_string());
        InputPattern::new(&glob)?;

        let output_transformer = match &self.output_transformer {
            None => OutputTransformer::default(),
            Some(TransformerChoice::Named(name)) => name.parse()?,
            Some(TransformerChoice::Transformer(transformer)) => transformer.clone(),
        };

        let name_transformer = match &self.name_transformer {
            None => NameTransformer::Identity,
            Some(NameChoice::Pattern(pattern)) => NameTransformer::pattern(pattern)?,
            Some(NameChoice::Transformer(transformer)) => transformer.clone(),
        };

        let reporter = self
            .reporter
            .clone()
            .unwrap_or_else(|| Reporter::for_silent(self.silent));

        Ok(Config {
            glob,
            output_directory: self
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            name_transformer,
            output_transformer,
            reporter,
            optimize: !self.skip_optimization,
        })
    }
}

impl fmt::Debug for ConverterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterOptions")
            .field("glob", &self.glob)
            .field("output", &self.output)
            .field("output_transformer", &self.output_transformer)
            .field("name_transformer", &self.name_transformer)
            .field("silent", &self.silent)
            .field("skip_optimization", &self.skip_optimization)
            .finish_non_exhaustive()
    }
}

/// Resolved, immutable configuration of one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub glob: String,
    pub output_directory: PathBuf,
    pub name_transformer: NameTransformer,
    pub output_transformer: OutputTransformer,
    pub reporter: Reporter,
    pub optimize: bool,
}

/// Persisted settings, as read from a JSON settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Settings {
    pub glob: Option<String>,
    pub output: Option<PathBuf>,
    /// Transformer name: `default`, `verbose` or `dictionary`
    pub output_transformer: Option<String>,
    /// Name pattern with capture groups
    pub name_transformer: Option<String>,
    pub silent: Option<bool>,
    pub optimize: Option<bool>,
}

impl Settings {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::settings_file(path, e))?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::settings_file(path, e))
    }

    /// Values set in `overrides` win.
    pub fn merge(self, overrides: Settings) -> Settings {
        Settings {
            glob: overrides.glob.or(self.glob),
            output: overrides.output.or(self.output),
            output_transformer: overrides.output_transformer.or(self.output_transformer),
            name_transformer: overrides.name_transformer.or(self.name_transformer),
            silent: overrides.silent.or(self.silent),
            optimize: overrides.optimize.or(self.optimize),
        }
    }

    pub fn into_options(self) -> ConverterOptions {
        ConverterOptions {
            glob: self.glob,
            output: self.output,
            output_transformer: self.output_transformer.map(TransformerChoice::Named),
            name_transformer: self.name_transformer.map(NameChoice::Pattern),
            silent: self.silent.unwrap_or(false),
            skip_optimization: !self.optimize.unwrap_or(true),
            ..ConverterOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let config = ConverterOptions::new().resolve().unwrap();
        assert_eq!(config.glob, DEFAULT_GLOB);
        assert_eq!(config.output_directory, PathBuf::from("output/"));
        assert!(matches!(config.output_transformer, OutputTransformer::List));
        assert!(matches!(config.name_transformer, NameTransformer::Identity));
        assert!(config.optimize);
    }

    #[test]
    fn unknown_transformer_fails_resolution() {
        let err = ConverterOptions::new()
            .output_transformer_name("bogus")
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTransformer(ref name) if name == "bogus"));
    }

    #[test]
    fn bad_pattern_and_glob_fail_resolution() {
        let err = ConverterOptions::new().name_pattern("(").resolve().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));

        let err = ConverterOptions::new().glob("input/{a,b").resolve().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGlob { .. }));
    }

    #[test]
    fn explicit_choices_are_kept() {
        let config = ConverterOptions::new()
            .glob("src/*.png")
            .output("dest")
            .output_transformer(OutputTransformer::Keyed)
            .name_transformer(NameTransformer::custom(|_| Ok("x".into())))
            .skip_optimization(true)
            .resolve()
            .unwrap();
        assert_eq!(config.glob, "src/*.png");
        assert_eq!(config.output_directory, PathBuf::from("dest"));
        assert!(matches!(config.output_transformer, OutputTransformer::Keyed));
        assert_eq!(config.name_transformer.apply("a.png").unwrap(), "x");
        assert!(!config.optimize);
    }

    #[tokio::test]
    async fn settings_file_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexer.json");
        std::fs::write(
            &path,
            r#"{ "glob": "assets/*.svg", "outputTransformer": "dictionary", "nameTransformer": "(.*)\\.svg", "optimize": false }"#,
        )
        .unwrap();

        let settings = Settings::load(&path).await.unwrap();
        assert_eq!(settings.output_transformer.as_deref(), Some("dictionary"));
        let config = settings.into_options().resolve().unwrap();
        assert!(matches!(config.output_transformer, OutputTransformer::Keyed));
        assert_eq!(config.name_transformer.apply("logo.svg").unwrap(), "logo");
        assert!(!config.optimize);
    }

    #[tokio::test]
    async fn settings_reject_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexer.json");
        std::fs::write(&path, r#"{ "transformer": "dictionary" }"#).unwrap();
        assert!(matches!(Settings::load(&path).await, Err(ConfigError::SettingsFile { .. })));
        assert!(Settings::load(dir.path().join("missing.json")).await.is_err());
    }

    #[test]
    fn overrides_win_when_merging() {
        let file = Settings {
            glob: Some("a/*.png".into()),
            silent: Some(true),
            ..Settings::default()
        };
        let flags = Settings {
            glob: Some("b/*.png".into()),
            ..Settings::default()
        };
        let merged = file.merge(flags);
        assert_eq!(merged.glob.as_deref(), Some("b/*.png"));
        assert_eq!(merged.silent, Some(true));
    }
}
