// Audio decoder using Symphonia
// Decodes a fetched episode held in memory to raw PCM samples

use std::io::Cursor;
use symphonia::core::audio::{AudioBufferRef, AudioPlanes, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::{debug, warn};

use super::buffer::DecodedTrack;

pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
}

impl AudioDecoder {
    /// Probe an in-memory byte buffer and prepare for decoding
    pub fn from_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self, String> {
        if bytes.is_empty() {
            return Err("Empty response body".to_string());
        }

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| format!("Failed to probe audio format: {}", e))?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| "No audio track found".to_string())?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| format!("Failed to create decoder: {}", e))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Decode next packet, returns interleaved f32 samples
    /// Returns None when end of stream is reached
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>, String> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(format!("Failed to read packet: {}", e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    // Some codecs only learn the real layout from the first frame
                    let spec = decoded.spec();
                    self.sample_rate = spec.rate;
                    self.channels = spec.channels.count().max(1);
                    return Ok(Some(Self::audio_buf_to_f32(&decoded)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error (skipping packet): {}", e);
                    continue;
                }
                Err(e) => return Err(format!("Decode failed: {}", e)),
            }
        }
    }

    /// Decode the whole stream into memory
    pub fn decode_all(mut self) -> Result<DecodedTrack, String> {
        let mut samples = Vec::new();
        while let Some(chunk) = self.decode_next()? {
            samples.extend_from_slice(&chunk);
        }

        let track = DecodedTrack::new(samples, self.sample_rate, self.channels);
        if track.is_empty() {
            return Err("Stream contained no audio frames".to_string());
        }

        debug!(
            "Decoded {} frames at {} Hz, {} channel(s)",
            track.frames(),
            track.sample_rate(),
            track.channels()
        );
        Ok(track)
    }

    /// Convert any AudioBufferRef to interleaved f32 samples
    fn audio_buf_to_f32(buf: &AudioBufferRef) -> Vec<f32> {
        match buf {
            AudioBufferRef::F32(b) => Self::interleave(b.planes(), b.frames(), |s: f32| s),
            AudioBufferRef::F64(b) => Self::interleave(b.planes(), b.frames(), |s: f64| s as f32),
            AudioBufferRef::S8(b) => {
                let scale = 1.0 / 128.0;
                Self::interleave(b.planes(), b.frames(), |s: i8| s as f32 * scale)
            }
            AudioBufferRef::S16(b) => {
                let scale = 1.0 / 32768.0;
                Self::interleave(b.planes(), b.frames(), |s: i16| s as f32 * scale)
            }
            AudioBufferRef::S24(b) => {
                let scale = 1.0 / 8388608.0;
                Self::interleave(b.planes(), b.frames(), |s| s.inner() as f32 * scale)
            }
            AudioBufferRef::S32(b) => {
                let scale = 1.0 / 2147483648.0;
                Self::interleave(b.planes(), b.frames(), |s: i32| s as f32 * scale)
            }
            AudioBufferRef::U8(b) => {
                Self::interleave(b.planes(), b.frames(), |s: u8| (s as f32 - 128.0) / 128.0)
            }
            AudioBufferRef::U16(b) => {
                Self::interleave(b.planes(), b.frames(), |s: u16| (s as f32 - 32768.0) / 32768.0)
            }
            AudioBufferRef::U24(b) => Self::interleave(b.planes(), b.frames(), |s| {
                (s.inner() as f32 - 8388608.0) / 8388608.0
            }),
            AudioBufferRef::U32(b) => Self::interleave(b.planes(), b.frames(), |s: u32| {
                (s as f64 - 2147483648.0) as f32 / 2147483648.0
            }),
        }
    }

    fn interleave<T: Sample + Copy, F: Fn(T) -> f32>(
        planes: AudioPlanes<T>,
        frames: usize,
        convert: F,
    ) -> Vec<f32> {
        let planes = planes.planes();
        let num_channels = planes.len();
        if num_channels == 0 || frames == 0 {
            return vec![];
        }

        let mut interleaved = Vec::with_capacity(frames * num_channels);
        for frame in 0..frames {
            for plane in planes.iter() {
                interleaved.push(convert(plane[frame]));
            }
        }
        interleaved
    }
}

/// File extension of a URL or path, used as a probe hint
pub fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
