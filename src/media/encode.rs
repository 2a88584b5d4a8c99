//! Модуль записи результата в WAV
//!
//! Единственный контейнер, который пишет библиотека. MP3 и прочие
//! форматы остаются за внешними кодировщиками.

use std::io::{Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;

use crate::config::SAMPLE_RATE;
use crate::error::Result;

fn wav_spec() -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Записать PCM в произвольный поток как WAV
pub fn encode_wav<W: Write + Seek>(pcm: &[i16], writer: W) -> Result<()> {
    let mut wav = WavWriter::new(writer, wav_spec())?;
    for &sample in pcm {
        wav.write_sample(sample)?;
    }
    wav.finalize()?;
    Ok(())
}

/// Записать PCM в WAV-файл
pub fn write_wav_file<P: AsRef<Path>>(pcm: &[i16], path: P) -> Result<()> {
    let mut wav = WavWriter::create(path.as_ref(), wav_spec())?;
    for &sample in pcm {
        wav.write_sample(sample)?;
    }
    wav.finalize()?;
    info!("Wrote {} samples to {}", pcm.len(), path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_wav_header_and_length() {
        let pcm = vec![0i16, 1000, -1000, 32767];
        let mut cursor = Cursor::new(Vec::new());
        encode_wav(&pcm, &mut cursor).unwrap();

        let bytes = cursor.into_inner();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + pcm.len() * 2);

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
    }
}
