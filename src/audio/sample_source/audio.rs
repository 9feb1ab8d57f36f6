// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::io::Cursor;
use std::time::Duration;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::warn;

use super::error::SampleSourceError;
use super::traits::SampleSource;

#[cfg(test)]
use super::traits::SampleSourceTestExt;

/// A sample source that decodes in-memory audio (MP3, WAV, FLAC, OGG, etc.) with symphonia
/// and yields scaled f32 samples.
pub struct AudioSampleSource {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    is_finished: bool,
    // Interleaved samples decoded from the last packet that have not been handed out yet.
    pending: Vec<f32>,
    pending_position: usize,
    channels: u16,
    sample_rate: u32,
    duration: Option<Duration>,
}

impl SampleSource for AudioSampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        let channels = self.channels as usize;
        if output.len() != channels {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "Output has {} channels, expected {}",
                output.len(),
                channels
            )));
        }

        for ch in output.iter_mut() {
            ch.clear();
        }

        let mut written = 0;
        while written < max_frames {
            if self.pending_position >= self.pending.len() {
                if self.is_finished || !self.refill()? {
                    self.is_finished = true;
                    break;
                }
            }

            let available = (self.pending.len() - self.pending_position) / channels;
            let to_take = available.min(max_frames - written);
            for frame in 0..to_take {
                let base = self.pending_position + frame * channels;
                for (ch, out_ch) in output.iter_mut().enumerate() {
                    out_ch.push(self.pending[base + ch]);
                }
            }
            self.pending_position += to_take * channels;
            written += to_take;
        }

        Ok(written)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

impl AudioSampleSource {
    /// Creates a new audio sample source over raw encoded bytes. The extension hint is
    /// optional and only a hint for format detection; the container contents decide.
    pub fn from_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self, SampleSourceError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| SampleSourceError::UnsupportedFormat(e.to_string()))?;

        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(SampleSourceError::NoAudioTrack)?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = match params.sample_rate {
            Some(0) => {
                return Err(SampleSourceError::UnsupportedFormat(
                    "Sample rate is 0 Hz".to_string(),
                ))
            }
            Some(sample_rate) => sample_rate,
            None => {
                return Err(SampleSourceError::SampleConversionFailed(
                    "Sample rate not specified".to_string(),
                ))
            }
        };

        let duration = params
            .n_frames
            .map(|n_frames| Duration::from_secs_f64(n_frames as f64 / sample_rate as f64));

        let decoder_opts: DecoderOptions = Default::default();
        let mut decoder = get_codecs()
            .make(&params, &decoder_opts)
            .map_err(|e| SampleSourceError::UnsupportedFormat(e.to_string()))?;

        // Prefer container/codec metadata for the channel count. When it's missing, decode
        // the first packet and take the count from the decoded buffer; those samples become
        // the first pending samples.
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
        let (channels, pending) = if channels > 0 {
            (channels, Vec::new())
        } else {
            match Self::read_and_decode_next_packet_for_track(
                format_reader.as_mut(),
                decoder.as_mut(),
                track_id,
            )? {
                Some((samples, channels)) => (channels as u16, samples),
                None => {
                    return Err(SampleSourceError::SampleConversionFailed(
                        "Channels not specified".to_string(),
                    ))
                }
            }
        };

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            is_finished: false,
            pending,
            pending_position: 0,
            channels,
            sample_rate,
            duration,
        })
    }

    /// Decodes the next packet into the pending buffer. Returns false at end of stream.
    fn refill(&mut self) -> Result<bool, SampleSourceError> {
        match Self::read_and_decode_next_packet_for_track(
            self.format_reader.as_mut(),
            self.decoder.as_mut(),
            self.track_id,
        )? {
            Some((samples, channels)) => {
                if channels != self.channels as usize {
                    return Err(SampleSourceError::SampleConversionFailed(format!(
                        "channel count changed mid-stream from {} to {}",
                        self.channels, channels
                    )));
                }
                self.pending = samples;
                self.pending_position = 0;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reads the next packet with common error handling.
    /// Returns `Ok(None)` at EOF (UnexpectedEof or DecodeError). ResetRequired is propagated
    /// so callers can reset the decoder.
    fn read_next_packet(
        format_reader: &mut dyn FormatReader,
    ) -> Result<Option<Packet>, SampleSourceError> {
        match format_reader.next_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            // Some readers report a truncated final frame as DecodeError rather than EOF.
            Err(SymphoniaError::DecodeError(_)) => Ok(None),
            Err(e) => Err(SampleSourceError::AudioError(e)),
        }
    }

    /// Reads and decodes the next packet for the given track, resetting the decoder when
    /// asked to. Packets that decode to no frames (e.g. Vorbis headers) and corrupt packets
    /// are skipped.
    fn read_and_decode_next_packet_for_track(
        format_reader: &mut dyn FormatReader,
        decoder: &mut dyn Decoder,
        track_id: u32,
    ) -> Result<Option<(Vec<f32>, usize)>, SampleSourceError> {
        loop {
            let packet = match Self::read_next_packet(format_reader) {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(None),
                Err(SampleSourceError::AudioError(SymphoniaError::ResetRequired)) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => return Err(e),
            };
            if packet.track_id() != track_id {
                continue;
            }
            let result = match decoder.decode(&packet) {
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    decoder.decode(&packet)
                }
                result => result,
            };
            let decoded = match result {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    warn!(err, ts = packet.ts(), "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(SampleSourceError::AudioError(e)),
            };
            let (samples, channels) = Self::decode_buffer_to_f32(decoded);
            if channels > 0 && !samples.is_empty() {
                return Ok(Some((samples, channels)));
            }
        }
    }

    /// Converts a decoded AudioBufferRef to interleaved f32 samples and returns the
    /// channel count observed in the decoded buffer.
    fn decode_buffer_to_f32(decoded: AudioBufferRef) -> (Vec<f32>, usize) {
        match decoded {
            AudioBufferRef::F32(buf) => Self::interleave_planar_samples(&buf, |sample| sample),
            AudioBufferRef::F64(buf) => {
                Self::interleave_planar_samples(&buf, |sample| sample as f32)
            }
            AudioBufferRef::S8(buf) => Self::interleave_planar_samples(&buf, Self::scale_s8),
            AudioBufferRef::S16(buf) => Self::interleave_planar_samples(&buf, Self::scale_s16),
            AudioBufferRef::S24(buf) => {
                Self::interleave_planar_samples(&buf, |sample| Self::scale_s24(sample.inner()))
            }
            AudioBufferRef::S32(buf) => Self::interleave_planar_samples(&buf, Self::scale_s32),
            AudioBufferRef::U8(buf) => Self::interleave_planar_samples(&buf, Self::scale_u8),
            AudioBufferRef::U16(buf) => Self::interleave_planar_samples(&buf, Self::scale_u16),
            AudioBufferRef::U24(buf) => {
                Self::interleave_planar_samples(&buf, |sample| Self::scale_u24(sample.inner()))
            }
            AudioBufferRef::U32(buf) => Self::interleave_planar_samples(&buf, Self::scale_u32),
        }
    }

    /// Interleaves the planes of a decoded buffer.
    fn interleave_planar_samples<T, F>(buf: &AudioBuffer<T>, convert: F) -> (Vec<f32>, usize)
    where
        T: symphonia::core::sample::Sample,
        F: Fn(T) -> f32,
    {
        let frames = buf.frames();
        let channels = buf.spec().channels.count();
        let planes = buf.planes();
        let mut samples = Vec::with_capacity(frames * channels);
        for frame_idx in 0..frames {
            for plane in planes.planes() {
                samples.push(convert(plane[frame_idx]));
            }
        }
        (samples, channels)
    }

    #[inline]
    pub(crate) fn scale_s8(sample: i8) -> f32 {
        sample as f32 / (1i64 << 7) as f32
    }

    #[inline]
    pub(crate) fn scale_s16(sample: i16) -> f32 {
        sample as f32 / (1i64 << 15) as f32
    }

    #[inline]
    pub(crate) fn scale_s24(sample: i32) -> f32 {
        sample as f32 / (1i64 << 23) as f32
    }

    #[inline]
    pub(crate) fn scale_s32(sample: i32) -> f32 {
        sample as f32 / (1i64 << 31) as f32
    }

    #[inline]
    pub(crate) fn scale_u8(sample: u8) -> f32 {
        (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
    }

    #[inline]
    pub(crate) fn scale_u16(sample: u16) -> f32 {
        (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
    }

    #[inline]
    pub(crate) fn scale_u24(sample: u32) -> f32 {
        let max = (1u32 << 24) - 1;
        (sample as f32 / max as f32) * 2.0 - 1.0
    }

    #[inline]
    pub(crate) fn scale_u32(sample: u32) -> f32 {
        (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

#[cfg(test)]
impl SampleSourceTestExt for AudioSampleSource {
    fn is_finished(&self) -> bool {
        self.is_finished
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use symphonia::core::audio::{AsAudioBufferRef, Channels, SignalSpec};
    use symphonia::core::codecs::{CodecDescriptor, CodecParameters, FinalizeResult};
    use symphonia::core::errors::Result as SymphoniaResult;
    use symphonia::core::formats::{Cue, SeekMode, SeekTo, SeekedTo, Track};
    use symphonia::core::meta::{Metadata, MetadataLog};

    use super::*;
    use crate::testutil::wav_bytes;

    /// A format reader that hands out a fixed list of packets and errors, then reports EOF.
    struct ScriptedReader {
        tracks: Vec<Track>,
        packets: VecDeque<SymphoniaResult<Packet>>,
        metadata: MetadataLog,
    }

    impl FormatReader for ScriptedReader {
        fn try_new(_source: MediaSourceStream, _options: &FormatOptions) -> SymphoniaResult<Self> {
            Err(SymphoniaError::Unsupported("scripted reader"))
        }

        fn cues(&self) -> &[Cue] {
            &[]
        }

        fn metadata(&mut self) -> Metadata<'_> {
            self.metadata.metadata()
        }

        fn seek(&mut self, _mode: SeekMode, _to: SeekTo) -> SymphoniaResult<SeekedTo> {
            Err(SymphoniaError::Unsupported("seek"))
        }

        fn tracks(&self) -> &[Track] {
            &self.tracks
        }

        fn next_packet(&mut self) -> SymphoniaResult<Packet> {
            self.packets.pop_front().unwrap_or_else(|| {
                Err(SymphoniaError::IoError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "end of stream",
                )))
            })
        }

        fn into_inner(self: Box<Self>) -> MediaSourceStream {
            MediaSourceStream::new(Box::new(Cursor::new(Vec::new())), Default::default())
        }
    }

    /// A mono decoder that turns each packet byte into one sample (byte / 100). A packet
    /// starting with 0xff is corrupt.
    struct ScriptedDecoder {
        params: CodecParameters,
        buf: AudioBuffer<f32>,
    }

    impl ScriptedDecoder {
        fn new(params: CodecParameters) -> Self {
            let spec = SignalSpec::new(params.sample_rate.unwrap_or(8000), Channels::FRONT_LEFT);
            Self {
                params,
                buf: AudioBuffer::new(64, spec),
            }
        }
    }

    impl Decoder for ScriptedDecoder {
        fn try_new(params: &CodecParameters, _options: &DecoderOptions) -> SymphoniaResult<Self> {
            Ok(Self::new(params.clone()))
        }

        fn supported_codecs() -> &'static [CodecDescriptor] {
            &[]
        }

        fn reset(&mut self) {}

        fn codec_params(&self) -> &CodecParameters {
            &self.params
        }

        fn decode(&mut self, packet: &Packet) -> SymphoniaResult<AudioBufferRef<'_>> {
            let data = packet.buf();
            if data.first() == Some(&0xff) {
                return Err(SymphoniaError::DecodeError("corrupt frame"));
            }
            self.buf.clear();
            self.buf.render_reserved(Some(data.len()));
            for (out, byte) in self.buf.chan_mut(0).iter_mut().zip(data) {
                *out = *byte as f32 / 100.0;
            }
            Ok(self.buf.as_audio_buffer_ref())
        }

        fn finalize(&mut self) -> FinalizeResult {
            Default::default()
        }

        fn last_decoded(&self) -> AudioBufferRef<'_> {
            self.buf.as_audio_buffer_ref()
        }
    }

    fn scripted_source(packets: Vec<SymphoniaResult<Packet>>) -> AudioSampleSource {
        let mut params = CodecParameters::new();
        params
            .with_sample_rate(8000)
            .with_channels(Channels::FRONT_LEFT);
        AudioSampleSource {
            format_reader: Box::new(ScriptedReader {
                tracks: vec![Track::new(0, params.clone())],
                packets: packets.into(),
                metadata: MetadataLog::default(),
            }),
            decoder: Box::new(ScriptedDecoder::new(params)),
            track_id: 0,
            is_finished: false,
            pending: Vec::new(),
            pending_position: 0,
            channels: 1,
            sample_rate: 8000,
            duration: None,
        }
    }

    fn read_all(source: &mut AudioSampleSource) -> Result<Vec<f32>, SampleSourceError> {
        let mut decoded = Vec::new();
        let mut chunk = vec![Vec::new()];
        loop {
            let frames = source.next_chunk(&mut chunk, 4)?;
            if frames == 0 {
                return Ok(decoded);
            }
            decoded.extend_from_slice(&chunk[0]);
        }
    }

    fn scaled(bytes: &[u8]) -> Vec<f32> {
        bytes.iter().map(|b| *b as f32 / 100.0).collect()
    }

    #[test]
    fn test_integer_scaling_signed_ranges() {
        assert_eq!(AudioSampleSource::scale_s8(i8::MIN), -1.0);
        assert_eq!(AudioSampleSource::scale_s16(i16::MIN), -1.0);
        assert_eq!(AudioSampleSource::scale_s16(0), 0.0);
        assert_eq!(AudioSampleSource::scale_s24(-(1 << 23)), -1.0);
        assert_eq!(AudioSampleSource::scale_s32(i32::MIN), -1.0);
    }

    #[test]
    fn test_integer_scaling_unsigned_ranges() {
        assert_eq!(AudioSampleSource::scale_u8(0), -1.0);
        assert_eq!(AudioSampleSource::scale_u8(u8::MAX), 1.0);
        assert_eq!(AudioSampleSource::scale_u16(u16::MAX), 1.0);
        assert_eq!(AudioSampleSource::scale_u24((1 << 24) - 1), 1.0);
    }

    #[test]
    fn test_decode_wav_bytes() {
        let left: Vec<f32> = (0..1000).map(|i| i as f32 / 1000.0).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        let bytes = wav_bytes(&[left.clone(), right.clone()], 22050);

        let mut source = AudioSampleSource::from_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(source.channel_count(), 2);
        assert_eq!(source.sample_rate(), 22050);

        let mut decoded = vec![Vec::new(), Vec::new()];
        let mut chunk = vec![Vec::new(), Vec::new()];
        loop {
            let frames = source.next_chunk(&mut chunk, 128).unwrap();
            if frames == 0 {
                break;
            }
            decoded[0].extend_from_slice(&chunk[0]);
            decoded[1].extend_from_slice(&chunk[1]);
        }

        assert!(source.is_finished());
        assert_eq!(decoded[0], left);
        assert_eq!(decoded[1], right);
    }

    #[test]
    fn test_decode_without_hint() {
        let bytes = wav_bytes(&[vec![0.25; 64]], 44100);
        let source = AudioSampleSource::from_bytes(bytes, None).unwrap();
        assert_eq!(source.channel_count(), 1);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let bytes = b"definitely not an audio file".repeat(16);
        assert!(AudioSampleSource::from_bytes(bytes, Some("mp3")).is_err());
    }

    #[test]
    fn test_empty_is_rejected() {
        assert!(AudioSampleSource::from_bytes(Vec::new(), None).is_err());
    }

    #[test]
    fn test_corrupt_packet_is_skipped() {
        let mut source = scripted_source(vec![
            Ok(Packet::new_from_slice(0, 0, 2, &[10, 20])),
            Ok(Packet::new_from_slice(0, 2, 2, &[0xff, 1])),
            Ok(Packet::new_from_slice(0, 4, 3, &[30, 40, 50])),
        ]);

        assert_eq!(read_all(&mut source).unwrap(), scaled(&[10, 20, 30, 40, 50]));
        assert!(source.is_finished());
    }

    #[test]
    fn test_trailing_decode_error_ends_stream() {
        let mut source = scripted_source(vec![
            Ok(Packet::new_from_slice(0, 0, 3, &[1, 2, 3])),
            Ok(Packet::new_from_slice(0, 3, 1, &[0xff])),
            Err(SymphoniaError::DecodeError("truncated frame")),
            Ok(Packet::new_from_slice(0, 4, 1, &[99])),
        ]);

        assert_eq!(read_all(&mut source).unwrap(), scaled(&[1, 2, 3]));
        assert!(source.is_finished());
    }

    #[test]
    fn test_other_reader_errors_fail() {
        let mut source = scripted_source(vec![
            Ok(Packet::new_from_slice(0, 0, 1, &[5])),
            Err(SymphoniaError::Unsupported("feature")),
        ]);

        assert!(matches!(
            read_all(&mut source),
            Err(SampleSourceError::AudioError(SymphoniaError::Unsupported(_)))
        ));
    }
}
