//! Audio output devices

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig, SupportedStreamConfigRange};

use crate::{Error, Result};

/// Seconds of audio the ring buffer may hold before writers wait
const MAX_BUFFERED_SECONDS: u32 = 2;

/// How long a full queue may go without draining
const STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Interleaved `f32` output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
        }
    }
}

impl OutputFormat {
    #[must_use]
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Interleaved samples per second
    #[must_use]
    pub fn samples_per_second(self) -> usize {
        self.sample_rate as usize * usize::from(self.channels.max(1))
    }
}

/// Where decoded samples end up
pub trait AudioSink {
    /// Format the sink expects
    fn format(&self) -> OutputFormat;

    /// Queue interleaved samples, blocking while the sink is full
    ///
    /// # Errors
    ///
    /// Returns error if the device failed
    fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Block until everything written has been played
    ///
    /// # Errors
    ///
    /// Returns error if the device failed
    fn finish(&mut self) -> Result<()>;
}

/// Opens sinks
pub trait OutputDevice: Send + Sync {
    /// Open a sink
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output is available
    fn open(&self) -> Result<Box<dyn AudioSink>>;
}

/// The system's default output device via `cpal`
#[derive(Debug, Clone, Copy)]
pub struct DefaultOutputDevice {
    requested: OutputFormat,
}

impl DefaultOutputDevice {
    #[must_use]
    pub const fn new(requested: OutputFormat) -> Self {
        Self { requested }
    }
}

fn supports(range: &SupportedStreamConfigRange, channels: u16, rate: u32) -> bool {
    range.channels() == channels
        && range.min_sample_rate() <= SampleRate(rate)
        && range.max_sample_rate() >= SampleRate(rate)
}

impl OutputDevice for DefaultOutputDevice {
    fn open(&self) -> Result<Box<dyn AudioSink>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let rate = self.requested.sample_rate;
        let wanted = self.requested.channels.max(1);
        let other = if wanted == 1 { 2 } else { 1 };

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, wanted, rate))
            .or_else(|| {
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, other, rate))
            })
            .ok_or_else(|| Error::Audio(format!("no output config at {rate} Hz")))?;

        let config = supported.with_sample_rate(SampleRate(rate)).config();
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = rate,
            channels = config.channels,
            "audio output opened"
        );

        CpalSink::start(&device, config).map(|sink| Box::new(sink) as Box<dyn AudioSink>)
    }
}

struct CpalSink {
    format: OutputFormat,
    queue: Arc<Mutex<VecDeque<f32>>>,
    failed: Arc<AtomicBool>,
    capacity: usize,
    stream: Option<cpal::Stream>,
}

impl CpalSink {
    fn start(device: &cpal::Device, config: StreamConfig) -> Result<Self> {
        let format = OutputFormat::new(config.sample_rate.0, config.channels);
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let failed = Arc::new(AtomicBool::new(false));

        let reader = Arc::clone(&queue);
        let error_flag = Arc::clone(&failed);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut queue) = reader.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for out in data.iter_mut() {
                        *out = queue.pop_front().unwrap_or(0.0);
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio output error");
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        Ok(Self {
            format,
            queue,
            failed,
            capacity: format.samples_per_second() * MAX_BUFFERED_SECONDS as usize,
            stream: Some(stream),
        })
    }

    fn queued(&self) -> Result<usize> {
        self.queue
            .lock()
            .map(|q| q.len())
            .map_err(|_| Error::Audio("output queue poisoned".to_string()))
    }

    fn check(&self) -> Result<()> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(Error::Audio("output stream failed".to_string()));
        }
        Ok(())
    }
}

impl AudioSink for CpalSink {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        for part in samples.chunks(self.capacity.max(1)) {
            let started = Instant::now();
            while self.queued()? + part.len() > self.capacity {
                self.check()?;
                if started.elapsed() > STALL_TIMEOUT {
                    return Err(Error::Audio("output device stopped consuming".to_string()));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            self.queue
                .lock()
                .map_err(|_| Error::Audio("output queue poisoned".to_string()))?
                .extend(part.iter().copied());
        }
        self.check()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn finish(&mut self) -> Result<()> {
        let pending = self.queued()?;
        let expected_ms = (pending * 1000 / self.format.samples_per_second().max(1)) as u64;
        let deadline = Instant::now() + Duration::from_millis(expected_ms + 500);

        while self.queued()? > 0 && Instant::now() < deadline {
            self.check()?;
            std::thread::sleep(Duration::from_millis(20));
        }

        // Let the device play out its own buffer
        std::thread::sleep(Duration::from_millis(100));
        self.stream.take();
        self.check()
    }
}

/// Captures samples in memory instead of playing them
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    format: OutputFormat,
    captured: Arc<Mutex<Vec<f32>>>,
    writes: Arc<Mutex<Vec<usize>>>,
}

impl MemoryDevice {
    #[must_use]
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Every sample written so far
    #[must_use]
    pub fn samples(&self) -> Vec<f32> {
        self.captured.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Length of each individual write
    #[must_use]
    pub fn write_sizes(&self) -> Vec<usize> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl OutputDevice for MemoryDevice {
    fn open(&self) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(self.clone()))
    }
}

impl AudioSink for MemoryDevice {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn write(&mut self, samples: &[f32]) -> Result<()> {
        self.captured
            .lock()
            .map_err(|_| Error::Audio("capture poisoned".to_string()))?
            .extend_from_slice(samples);
        self.writes
            .lock()
            .map_err(|_| Error::Audio("capture poisoned".to_string()))?
            .push(samples.len());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Write samples in fixed-size frames, zero-padding the last one
///
/// Sleeps briefly every `pause_every` frames to let the device drain.
///
/// # Errors
///
/// Returns the sink's write error
pub(crate) fn write_frames(
    sink: &mut dyn AudioSink,
    samples: &[f32],
    frame_len: usize,
    pause_every: usize,
) -> Result<usize> {
    let mut frames = 0;
    for chunk in samples.chunks(frame_len.max(1)) {
        if chunk.len() < frame_len {
            let mut padded = chunk.to_vec();
            padded.resize(frame_len, 0.0);
            sink.write(&padded)?;
        } else {
            sink.write(chunk)?;
        }
        if pause_every > 0 && frames % pause_every == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        frames += 1;
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_device_captures() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let mut sink = device.open().unwrap();
        sink.write(&[0.1, 0.2]).unwrap();
        sink.write(&[0.3]).unwrap();
        sink.finish().unwrap();

        assert_eq!(device.samples(), vec![0.1, 0.2, 0.3]);
        assert_eq!(device.write_sizes(), vec![2, 1]);
        assert_eq!(sink.format().sample_rate, 16000);
    }

    #[test]
    fn test_write_frames_pads_last() {
        let device = MemoryDevice::new(OutputFormat::new(16000, 1));
        let mut sink = device.open().unwrap();
        let frames = write_frames(sink.as_mut(), &[0.5; 10], 4, 10).unwrap();

        assert_eq!(frames, 3);
        assert_eq!(device.write_sizes(), vec![4, 4, 4]);
        let samples = device.samples();
        assert_eq!(&samples[10..], &[0.0, 0.0]);
    }

    #[test]
    fn test_samples_per_second() {
        assert_eq!(OutputFormat::new(44100, 2).samples_per_second(), 88200);
        assert_eq!(OutputFormat::new(16000, 0).samples_per_second(), 16000);
    }
}
