//! WAV decoding and PCM16 encoding through `hound`.

use std::io::{Cursor, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::buffer::PcmBuffer;

/// Decode a WAV file from disk.
pub fn read_wav(path: &Path) -> Result<PcmBuffer, hound::Error> {
    let reader = WavReader::open(path)?;
    decode(reader)
}

/// Decode WAV bytes held in memory.
pub fn read_wav_bytes(bytes: &[u8]) -> Result<PcmBuffer, hound::Error> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    decode(reader)
}

fn decode<R: Read>(reader: WavReader<R>) -> Result<PcmBuffer, hound::Error> {
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    Ok(PcmBuffer::new(samples, spec.sample_rate, spec.channels))
}

/// Encode `buffer` as 16-bit PCM WAV.  Samples are clamped to `[-1, 1]`
/// and non-finite samples written as silence.
pub fn encode_wav_pcm16(buffer: &PcmBuffer) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: buffer.channels.max(1),
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &s in &buffer.samples {
            let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
            writer.write_sample((s * i16::MAX as f32).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Encode and write `buffer` to `path` as 16-bit PCM WAV.
pub fn write_wav_pcm16(path: &Path, buffer: &PcmBuffer) -> Result<(), hound::Error> {
    let bytes = encode_wav_pcm16(buffer)?;
    std::fs::write(path, bytes)?;
    Ok(())
}
