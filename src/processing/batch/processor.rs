use crate::core::{OptimizedFile, Progress, ProgressType, Reporter};
use crate::transform::{AggregateBuffer, NameTransformer, OutputTransformer};
use crate::utils::{ConverterResult, extract_filename};
use tracing::debug;

/// Folds a batch of optimized files into one aggregate buffer.
///
/// Files are processed strictly in order; the first failure discards the
/// partially built buffer.
pub struct BatchEncoder<'a> {
    names: &'a NameTransformer,
    output: &'a OutputTransformer,
    reporter: &'a Reporter,
}

impl<'a> BatchEncoder<'a> {
    pub fn new(names: &'a NameTransformer, output: &'a OutputTransformer, reporter: &'a Reporter) -> Self {
        Self {
            names,
            output,
            reporter,
        }
    }

    /// Encodes every file and returns the fully built buffer
    pub fn encode(&self, files: &[OptimizedFile]) -> ConverterResult<AggregateBuffer> {
        let total = files.len();
        debug!("Encoding {} files with the {:?} transformer", total, self.output);
        self.reporter.report(Progress::new(ProgressType::Start, 0, total));

        let mut buffer = self.output.create_buffer();
        for (idx, file) in files.iter().enumerate() {
            let entry = self.output.transform(self.names, file)?;
            self.output.update_buffer(&mut buffer, entry);

            self.reporter.report(
                Progress::new(ProgressType::Progress, idx + 1, total).with_file(extract_filename(&file.path)),
            );
        }

        self.reporter.report(Progress::new(ProgressType::Complete, total, total));
        Ok(buffer)
    }
}
