// Audio output using cpal
// The stream lives on its own thread; sources feed it through a ring buffer

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::buffer::DecodedTrack;
use super::context::{AudioContext, GainStage, SourceNode};
use super::resampler::prepare_for_output;

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz
const WRITE_CHUNK: usize = 1024;

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

enum StreamCommand {
    Play,
    Pause,
    Shutdown,
}

/// State shared between the context, the feeder thread and the audio callback
struct Shared {
    frames_rendered: AtomicU64,
    suspended: AtomicBool,
    gain: Mutex<GainStage>,
}

/// Context backed by the default output device
pub struct CpalContext {
    producer: Arc<Mutex<RingProducer>>,
    consumer: Arc<Mutex<RingConsumer>>,
    shared: Arc<Shared>,
    sample_rate: u32,
    channels: u16,
    commands: mpsc::Sender<StreamCommand>,
    stream_thread: Option<JoinHandle<()>>,
}

impl CpalContext {
    /// Open the default output device and start its stream
    pub fn new() -> Result<Self, String> {
        let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = rb.split();
        let consumer = Arc::new(Mutex::new(consumer));

        let shared = Arc::new(Shared {
            frames_rendered: AtomicU64::new(0),
            suspended: AtomicBool::new(false),
            gain: Mutex::new(GainStage::default()),
        });

        let (commands, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_shared = shared.clone();
        let thread_consumer = consumer.clone();

        let stream_thread = std::thread::Builder::new()
            .name("podsloth-output".to_string())
            .spawn(move || Self::run_stream(thread_consumer, thread_shared, command_rx, ready_tx))
            .map_err(|e| format!("Failed to spawn output thread: {}", e))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| "Output thread exited before reporting".to_string())??;

        info!("Audio output ready: {} Hz, {} channels", sample_rate, channels);

        Ok(Self {
            producer: Arc::new(Mutex::new(producer)),
            consumer,
            shared,
            sample_rate,
            channels,
            commands,
            stream_thread: Some(stream_thread),
        })
    }

    /// Owns the stream for its whole life; cpal streams cannot move between threads
    fn run_stream(
        consumer: Arc<Mutex<RingConsumer>>,
        shared: Arc<Shared>,
        commands: mpsc::Receiver<StreamCommand>,
        ready: mpsc::Sender<Result<(u32, u16), String>>,
    ) {
        let stream = match Self::open_stream(consumer, shared) {
            Ok((stream, rate, channels)) => {
                let _ = ready.send(Ok((rate, channels)));
                stream
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        while let Ok(command) = commands.recv() {
            let result = match command {
                StreamCommand::Play => stream.play().map_err(|e| e.to_string()),
                StreamCommand::Pause => stream.pause().map_err(|e| e.to_string()),
                StreamCommand::Shutdown => break,
            };
            if let Err(e) = result {
                // Some backends cannot pause; the suspended flag still silences output
                warn!("Output stream command failed: {}", e);
            }
        }
        debug!("Output stream thread exiting");
    }

    fn open_stream(
        consumer: Arc<Mutex<RingConsumer>>,
        shared: Arc<Shared>,
    ) -> Result<(Stream, u32, u16), String> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or("No output device available")?;

        let config = device
            .default_output_config()
            .map_err(|e| format!("Failed to get default output config: {}", e))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), consumer, shared)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), consumer, shared)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), consumer, shared)?
            }
            format => return Err(format!("Unsupported sample format: {:?}", format)),
        };

        stream
            .play()
            .map_err(|e| format!("Failed to start stream: {}", e))?;

        Ok((stream, sample_rate, channels))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        shared: Arc<Shared>,
    ) -> Result<Stream, String> {
        let channels = config.channels.max(1) as usize;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if shared.suspended.load(Ordering::SeqCst) {
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                        return;
                    }

                    let mut consumer = consumer.lock();
                    let vol = shared.gain.lock().get();
                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0) * vol;
                        *sample = T::from_sample(value);
                    }

                    shared
                        .frames_rendered
                        .fetch_add((data.len() / channels) as u64, Ordering::SeqCst);
                },
                move |err| {
                    error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| format!("Failed to build output stream: {}", e))?;

        Ok(stream)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Push samples until everything is written or `stop` is raised
    fn feed(producer: &Mutex<RingProducer>, samples: &[f32], stop: &AtomicBool) {
        for chunk in samples.chunks(WRITE_CHUNK) {
            let mut remaining = chunk;
            while !remaining.is_empty() {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                let written = {
                    let mut producer = producer.lock();
                    // Checked under the producer lock so nothing lands after stop_feeder returns
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    producer.push_slice(remaining)
                };
                if written > 0 {
                    remaining = &remaining[written..];
                } else {
                    // Buffer full, wait a bit
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    /// Wait for the callback to play out whatever is still buffered
    fn drain(producer: &Mutex<RingProducer>, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) && producer.lock().occupied_len() > 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl AudioContext for CpalContext {
    fn current_time(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::SeqCst) as f64 / self.sample_rate as f64
    }

    fn suspend(&self) {
        self.shared.suspended.store(true, Ordering::SeqCst);
        let _ = self.commands.send(StreamCommand::Pause);
    }

    fn resume(&self) {
        self.shared.suspended.store(false, Ordering::SeqCst);
        let _ = self.commands.send(StreamCommand::Play);
    }

    fn is_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::SeqCst)
    }

    fn prepare(&self, track: DecodedTrack) -> Result<DecodedTrack, String> {
        prepare_for_output(track, self.sample_rate, self.channels as usize)
    }

    fn start_source(
        &self,
        track: Arc<DecodedTrack>,
        offset: f64,
        gain: GainStage,
    ) -> Result<SourceNode, String> {
        *self.shared.gain.lock() = gain;

        let (tx, rx) = watch::channel(false);
        let stop = Arc::new(AtomicBool::new(false));
        let start = track.frame_at(offset) * track.channels();

        let feeder_stop = stop.clone();
        Self::spawn_feeder(self.producer.clone(), track, start, feeder_stop, tx)?;

        let producer = self.producer.clone();
        let consumer = self.consumer.clone();
        Ok(SourceNode::new(rx, move || {
            Self::stop_feeder(&producer, &consumer, &stop);
        }))
    }
}

impl CpalContext {
    /// Feed `track` from sample `start` on a detached thread, reporting natural completion on `done`
    fn spawn_feeder(
        producer: Arc<Mutex<RingProducer>>,
        track: Arc<DecodedTrack>,
        start: usize,
        stop: Arc<AtomicBool>,
        done: watch::Sender<bool>,
    ) -> Result<(), String> {
        std::thread::Builder::new()
            .name("podsloth-feeder".to_string())
            .spawn(move || {
                let samples = &track.samples()[start.min(track.samples().len())..];
                Self::feed(&producer, samples, &stop);
                Self::drain(&producer, &stop);
                if !stop.load(Ordering::SeqCst) {
                    let _ = done.send(true);
                }
            })
            .map_err(|e| format!("Failed to spawn feeder thread: {}", e))?;
        Ok(())
    }

    /// Stop a feeder without waiting for its thread and discard what it buffered
    ///
    /// The flag is raised under the producer lock, and the feeder only pushes
    /// under that lock after checking the flag, so the ring is final once this
    /// returns. The detached thread exits within one drain sleep.
    fn stop_feeder(
        producer: &Mutex<RingProducer>,
        consumer: &Mutex<RingConsumer>,
        stop: &AtomicBool,
    ) {
        {
            let _producer = producer.lock();
            stop.store(true, Ordering::SeqCst);
        }
        let mut consumer = consumer.lock();
        let discarded = consumer.pop_iter().count();
        if discarded > 0 {
            debug!("Discarded {} buffered samples", discarded);
        }
    }
}

impl Drop for CpalContext {
    fn drop(&mut self) {
        let _ = self.commands.send(StreamCommand::Shutdown);
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}
