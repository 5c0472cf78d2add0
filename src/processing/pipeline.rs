//! Run orchestration: options → optimizer → encoder → JSON file.

use std::path::PathBuf;
use tracing::{debug, info, warn};
use crate::core::{Config, ConverterOptions, OptimizedFile, PipelineState, RunState};
use crate::processing::{BatchEncoder, Optimizer};
use crate::transform::AggregateBuffer;
use crate::utils::{ConverterResult, output_file_path, write_json};

/// One conversion run.
///
/// Created from caller options, consumed by [`Converter::run`]. A failed run
/// cannot be resumed; build a new converter instead.
pub struct Converter {
    options: ConverterOptions,
    state: RunState,
}

impl Converter {
    pub fn new(options: ConverterOptions) -> Self {
        Self {
            options,
            state: RunState::new(),
        }
    }

    /// Runs the whole pipeline and returns the path of the written document.
    ///
    /// The error, if any, is handed to the `on_error` hook and returned as well.
    pub async fn run<O: Optimizer>(mut self, optimizer: &O) -> ConverterResult<PathBuf> {
        let on_success = self.options.on_success.take();
        let on_error = self.options.on_error.take();

        match self.execute(optimizer).await {
            Ok(path) => {
                info!("Wrote {}", path.display());
                if let Some(hook) = on_success {
                    hook(&path);
                }
                Ok(path)
            }
            Err(e) => {
                self.state.fail();
                if e.is_preflight() {
                    warn!("Invalid options: {}", e);
                } else {
                    warn!("Conversion failed: {}", e);
                }
                if let Some(hook) = on_error {
                    hook(&e);
                }
                Err(e)
            }
        }
    }

    async fn execute<O: Optimizer>(&mut self, optimizer: &O) -> ConverterResult<PathBuf> {
        self.state.advance(PipelineState::ResolvingConfig);
        let config = self.options.resolve()?;
        debug!(
            "Resolved config - glob: {}, output: {}, transformer: {:?}, names: {:?}",
            config.glob,
            config.output_directory.display(),
            config.output_transformer,
            config.name_transformer
        );

        self.state.advance(PipelineState::Optimizing);
        let files = if config.optimize {
            optimizer.optimize(&config.glob).await?
        } else {
            debug!("Optimization disabled, reading files as they are");
            optimizer.passthrough(&config.glob).await?
        };

        self.state.advance(PipelineState::Encoding);
        let buffer = encode(&config, &files)?;

        self.state.advance(PipelineState::Serializing);
        let path = output_file_path(&config.output_directory);
        write_json(&path, &buffer).await?;

        self.state.advance(PipelineState::Done);
        Ok(path)
    }
}

fn encode(config: &Config, files: &[OptimizedFile]) -> ConverterResult<AggregateBuffer> {
    BatchEncoder::new(&config.name_transformer, &config.output_transformer, &config.reporter).encode(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::utils::{ConfigError, ConverterError};

    /// Serves a fixed batch and counts calls.
    struct FixedBatch {
        files: Vec<OptimizedFile>,
        calls: AtomicUsize,
    }

    impl FixedBatch {
        fn new(files: Vec<OptimizedFile>) -> Self {
            Self {
                files,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Optimizer for FixedBatch {
        async fn optimize(&self, _glob: &str) -> ConverterResult<Vec<OptimizedFile>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.files.clone())
        }
    }

    struct Failing;

    impl Optimizer for Failing {
        async fn optimize(&self, glob: &str) -> ConverterResult<Vec<OptimizedFile>> {
            Err(ConverterError::optimization(format!("cannot read {glob}")))
        }
    }

    fn files() -> Vec<OptimizedFile> {
        vec![
            OptimizedFile::unchanged("in/a.png", vec![1]),
            OptimizedFile::unchanged("in/b.png", vec![2]),
        ]
    }

    #[tokio::test]
    async fn unknown_transformer_never_reaches_the_optimizer() {
        let optimizer = FixedBatch::new(files());
        let err = Converter::new(ConverterOptions::new().output_transformer_name("bogus").silent(true))
            .run(&optimizer)
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::Config(ConfigError::UnknownTransformer(_))));
        assert_eq!(optimizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn writes_document_and_calls_success_hook() {
        let dir = tempfile::tempdir().unwrap();
        let optimizer = FixedBatch::new(files());
        let reported = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&reported);

        let path = Converter::new(
            ConverterOptions::new()
                .output(dir.path())
                .silent(true)
                .on_success(move |path| *sink.lock().unwrap() = Some(path.to_path_buf())),
        )
        .run(&optimizer)
        .await
        .unwrap();

        assert_eq!(reported.lock().unwrap().as_deref(), Some(path.as_path()));
        assert_eq!(optimizer.calls.load(Ordering::SeqCst), 1);
        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[1]["name"], "b.png");
    }

    #[tokio::test]
    async fn optimization_failure_goes_to_error_hook() {
        let dir = tempfile::tempdir().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        let err = Converter::new(
            ConverterOptions::new()
                .output(dir.path())
                .silent(true)
                .on_error(move |e| {
                    assert!(matches!(e, ConverterError::Optimization(_)));
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .run(&Failing)
        .await
        .unwrap_err();

        assert!(matches!(err, ConverterError::Optimization(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn name_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let optimizer = FixedBatch::new(files());
        let err = Converter::new(
            ConverterOptions::new()
                .output(dir.path())
                .name_pattern(r"^(a)\.png$")
                .silent(true),
        )
        .run(&optimizer)
        .await
        .unwrap_err();

        assert!(matches!(err, ConverterError::NameTransform(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_output_directory_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let optimizer = FixedBatch::new(files());
        let err = Converter::new(
            ConverterOptions::new()
                .output(dir.path().join("nope"))
                .silent(true),
        )
        .run(&optimizer)
        .await
        .unwrap_err();
        assert!(matches!(err, ConverterError::Serialization(_)));
    }

    #[tokio::test]
    async fn skipping_optimization_bypasses_the_optimizer() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("raw.png"), b"untouched bytes").unwrap();
        let optimizer = FixedBatch::new(files());

        let path = Converter::new(
            ConverterOptions::new()
                .glob(format!("{}/*.png", input.path().display()))
                .output(output.path())
                .skip_optimization(true)
                .silent(true),
        )
        .run(&optimizer)
        .await
        .unwrap();

        assert_eq!(optimizer.calls.load(Ordering::SeqCst), 0);
        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "raw.png");
        assert_eq!(entries[0]["data"], "data:image/png;base64,dW50b3VjaGVkIGJ5dGVz");
    }
}
