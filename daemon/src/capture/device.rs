//! Default microphone backend using cpal
//!
//! The cpal stream lives on a dedicated thread for the whole session. Samples
//! are down-mixed to mono i16 while recording; on stop the stream is dropped
//! (releasing the device) and the clip is delivered as one WAV chunk.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{WavSpec, WavWriter};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{AudioInput, CaptureError, Encoding, InputHandle};

/// How often the capture thread checks for a stop request
const STOP_POLL: Duration = Duration::from_millis(20);

type SampleBuffer = Arc<Mutex<Vec<i16>>>;

/// Records from the host's default input device
#[derive(Debug, Default)]
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioInput for CpalInput {
    fn supports(&self, encoding: Encoding) -> bool {
        encoding == Encoding::Wav
    }

    async fn open(&self, encoding: Encoding) -> Result<InputHandle, CaptureError> {
        if !self.supports(encoding) {
            return Err(CaptureError::UnsupportedEncoding(encoding.mime_type()));
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let stop_thread = stop.clone();

        thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_capture(ready_tx, chunk_tx, stop_thread))
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        ready_rx
            .await
            .map_err(|_| CaptureError::Stream("capture thread exited before starting".to_string()))??;

        Ok(InputHandle::new(chunk_rx, stop))
    }
}

/// Body of the capture thread
fn run_capture(
    ready: oneshot::Sender<Result<(), CaptureError>>,
    chunk_tx: mpsc::UnboundedSender<Bytes>,
    stop: CancellationToken,
) {
    let samples: SampleBuffer = Arc::default();

    let (stream, sample_rate) = match start_stream(Arc::clone(&samples)) {
        Ok(started) => started,
        Err(e) => {
            warn!(error = %e, "failed to start microphone stream");
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        // Opener went away before the stream came up
        return;
    }

    info!(sample_rate, "microphone stream started");

    while !stop.is_cancelled() {
        thread::sleep(STOP_POLL);
    }

    drop(stream);
    debug!("microphone stream released");

    let samples = match samples.lock() {
        Ok(mut buf) => std::mem::take(&mut *buf),
        Err(_) => {
            error!("sample buffer poisoned, dropping clip");
            return;
        }
    };

    if samples.is_empty() {
        return;
    }

    match encode_wav(&samples, sample_rate) {
        Ok(clip) => {
            let _ = chunk_tx.send(clip);
        }
        Err(e) => error!(error = %e, "failed to encode WAV clip"),
    }
}

/// Open the default input device and start recording into `samples`
fn start_stream(samples: SampleBuffer) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;

    let supported = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => CaptureError::NoDevice,
        other => CaptureError::Stream(other.to_string()),
    })?;

    let sample_rate = supported.sample_rate().0;
    let channels = usize::from(supported.channels()).max(1);
    let config: cpal::StreamConfig = supported.config();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, samples),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, samples),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, samples),
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, channels, samples),
        other => {
            return Err(CaptureError::Stream(format!(
                "unsupported sample format {other:?}"
            )))
        }
    }
    .map_err(classify_build_error)?;

    stream
        .play()
        .map_err(|e| CaptureError::Stream(e.to_string()))?;

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    samples: SampleBuffer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let Ok(mut buf) = samples.lock() else {
                return;
            };
            for frame in data.chunks(channels) {
                let sum: f32 = frame
                    .iter()
                    .map(|&sample| {
                        let value: f32 = cpal::Sample::from_sample(sample);
                        value
                    })
                    .sum();
                let mono = (sum / frame.len() as f32).clamp(-1.0, 1.0);
                buf.push((mono * i16::MAX as f32) as i16);
            }
        },
        |err| warn!(error = %err, "input stream error"),
        None,
    )
}

/// Map stream-build failures onto the capture taxonomy
fn classify_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::NoDevice,
        cpal::BuildStreamError::BackendSpecific { err } => {
            let description = err.description.to_lowercase();
            if description.contains("permission") || description.contains("denied") {
                CaptureError::PermissionDenied
            } else {
                CaptureError::Stream(err.description)
            }
        }
        other => CaptureError::Stream(other.to_string()),
    }
}

/// Encode mono 16-bit samples as an in-memory WAV file
fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Bytes, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(Bytes::from(cursor.into_inner()))
}
