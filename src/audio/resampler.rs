// Conversion of decoded tracks to the output device format
// Sample rate conversion uses rubato, channel layout is remapped by hand

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use super::buffer::DecodedTrack;

const CHUNK_FRAMES: usize = 1024;

/// Convert a track to the given rate and channel count
/// Returns the track untouched when it already matches
pub fn prepare_for_output(
    track: DecodedTrack,
    output_rate: u32,
    output_channels: usize,
) -> Result<DecodedTrack, String> {
    let output_channels = output_channels.max(1);
    let remapped = remap_channels(track, output_channels);

    if remapped.sample_rate() == output_rate {
        return Ok(remapped);
    }

    debug!(
        "Resampling from {}Hz to {}Hz ({} channels)",
        remapped.sample_rate(),
        output_rate,
        output_channels
    );
    resample(&remapped, output_rate)
}

/// Duplicate, average or zero-fill channels so the layout matches the output
pub fn remap_channels(track: DecodedTrack, output_channels: usize) -> DecodedTrack {
    let input_channels = track.channels();
    if input_channels == output_channels {
        return track;
    }

    let frames = track.frames();
    let samples = track.samples();
    let mut out = Vec::with_capacity(frames * output_channels);

    for frame in samples.chunks_exact(input_channels) {
        if input_channels == 1 {
            out.extend(std::iter::repeat(frame[0]).take(output_channels));
        } else if output_channels == 1 {
            let sum: f32 = frame.iter().sum();
            out.push(sum / input_channels as f32);
        } else {
            for ch in 0..output_channels {
                out.push(frame.get(ch).copied().unwrap_or(0.0));
            }
        }
    }

    DecodedTrack::new(out, track.sample_rate(), output_channels)
}

fn resample(track: &DecodedTrack, output_rate: u32) -> Result<DecodedTrack, String> {
    let channels = track.channels();
    let planar = deinterleave(track.samples(), channels);
    let input_frames = track.frames();

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / track.sample_rate() as f64,
        1.0,
        PolynomialDegree::Septic,
        CHUNK_FRAMES,
        channels,
    )
    .map_err(|e| format!("Failed to create resampler: {}", e))?;

    let mut planar_out: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let mut pos = 0;

    while pos + CHUNK_FRAMES <= input_frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..pos + CHUNK_FRAMES]).collect();
        let processed = resampler
            .process(&chunk, None)
            .map_err(|e| format!("Resampling failed: {}", e))?;
        for (out, part) in planar_out.iter_mut().zip(processed) {
            out.extend(part);
        }
        pos += CHUNK_FRAMES;
    }

    if pos < input_frames {
        let tail: Vec<&[f32]> = planar.iter().map(|c| &c[pos..]).collect();
        let processed = resampler
            .process_partial(Some(tail.as_slice()), None)
            .map_err(|e| format!("Resampling failed: {}", e))?;
        for (out, part) in planar_out.iter_mut().zip(processed) {
            out.extend(part);
        }
    }

    // Flush the frames still held back by the filter delay
    let flushed = resampler
        .process_partial::<&[f32]>(None, None)
        .map_err(|e| format!("Resampling failed: {}", e))?;
    for (out, part) in planar_out.iter_mut().zip(flushed) {
        out.extend(part);
    }

    // Output starts late by the filter delay and ends with the zero padding of the last chunks
    let delay = resampler.output_delay();
    let expected = expected_frames(input_frames, track.sample_rate(), output_rate);
    for out in planar_out.iter_mut() {
        out.drain(..delay.min(out.len()));
        out.truncate(expected);
    }

    let resampled = DecodedTrack::new(interleave(&planar_out), output_rate, channels);
    debug!(
        "Resampled {} input frames to {} output frames",
        input_frames,
        resampled.frames()
    );
    Ok(resampled)
}

/// Frame count of `input_frames` at `input_rate` once converted to `output_rate`
fn expected_frames(input_frames: usize, input_rate: u32, output_rate: u32) -> usize {
    (input_frames as f64 * output_rate as f64 / input_rate as f64).round() as usize
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &s) in planar.iter_mut().zip(frame) {
            plane.push(s);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let frames = planar.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for plane in planar {
            out.push(plane[frame]);
        }
    }
    out
}
