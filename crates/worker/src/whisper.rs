//! Whisper backend built on whisper.cpp
//!
//! One `WhisperContext` is loaded at startup and shared for the life of the
//! process. Every request decodes in its own `WhisperState`, so nothing
//! carries over between requests.

use crate::audio;
use crate::runtime::{Runtime, Task, TranscribeOptions, Transcriber, Transcription};
use scribeloop_common::{Result, ScribeLoopError};
use std::os::raw::c_int;
use std::path::Path;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

/// Whisper runtime handle used during startup
#[derive(Debug, Default)]
pub struct WhisperRuntime {
    threads: Option<c_int>,
}

impl WhisperRuntime {
    pub fn new() -> Result<Self> {
        Ok(Self::default())
    }
}

impl Runtime for WhisperRuntime {
    type Model = WhisperModel;

    fn set_num_threads(&mut self, threads: usize) -> Result<()> {
        let threads = c_int::try_from(threads)
            .map_err(|_| ScribeLoopError::invalid_input(format!("thread count {} out of range", threads)))?;
        self.threads = Some(threads);
        Ok(())
    }

    fn load_model(&self, name: &str, path: &Path) -> Result<WhisperModel> {
        if !path.is_file() {
            return Err(ScribeLoopError::model(format!(
                "weights for '{}' not found at {}",
                name,
                path.display()
            )));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| ScribeLoopError::model(format!("non UTF-8 model path: {}", path.display())))?;

        info!("Loading whisper model '{}' from {}", name, path.display());

        // Full precision on CPU.
        let mut params = WhisperContextParameters::default();
        params.use_gpu(false);

        let context = WhisperContext::new_with_params(path_str, params)
            .map_err(|e| ScribeLoopError::model(format!("{:?}", e)))?;

        Ok(WhisperModel {
            context,
            threads: self.threads,
        })
    }
}

/// A loaded Whisper model
pub struct WhisperModel {
    context: WhisperContext,
    threads: Option<c_int>,
}

impl Transcriber for WhisperModel {
    fn transcribe(&self, audio_path: &Path, options: &TranscribeOptions) -> Result<Transcription> {
        let samples = audio::load_wav(audio_path)?;

        let mut state = self
            .context
            .create_state()
            .map_err(|e| ScribeLoopError::inference(format!("failed to create decoder state: {:?}", e)))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_translate(options.task == Task::Translate);
        params.set_language(options.language.as_deref());
        params.set_temperature(options.temperature);
        params.set_temperature_inc(0.0);
        params.set_no_context(!options.condition_on_previous_text);
        if let Some(threads) = self.threads {
            params.set_n_threads(threads);
        }
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_print_special(false);

        state
            .full(params, &samples)
            .map_err(|e| ScribeLoopError::inference(format!("{:?}", e)))?;

        let segments = state
            .full_n_segments()
            .map_err(|e| ScribeLoopError::inference(format!("{:?}", e)))?;

        let mut text = String::new();
        for i in 0..segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| ScribeLoopError::inference(format!("segment {}: {:?}", i, e)))?;
            text.push_str(&segment);
        }

        debug!(
            "Decoded {} segment(s) from {} ({})",
            segments,
            audio_path.display(),
            options.task
        );

        Ok(Transcription { text: Some(text) })
    }
}
