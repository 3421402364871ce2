//! Variable-length waveform event record.
//!
//! Header (14 bytes, little-endian): `timestamp:u64 channel:u8
//! samples_number:u32 gates_number:u8`. Payload: `samples_number` u16
//! samples, then `gates_number * samples_number` u8 trace bytes. Total size
//! is `14 + 2*samples + gates*samples` (I2).

use super::error::{DecodeError, DecodeResult};

pub const WAVEFORM_HEADER_SIZE: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformEvent {
    pub timestamp: u64,
    pub channel: u8,
    pub gates_number: u8,
    pub samples: Vec<u16>,
    /// Flattened `gates_number * samples.len()` trace bytes, gate-major.
    pub gates: Vec<u8>,
}

impl WaveformEvent {
    pub fn new(timestamp: u64, channel: u8, samples: Vec<u16>, gates: Vec<Vec<u8>>) -> Self {
        let gates_number = gates.len() as u8;
        let flattened = gates.into_iter().flatten().collect();
        Self {
            timestamp,
            channel,
            gates_number,
            samples,
            gates: flattened,
        }
    }

    pub fn samples_number(&self) -> u32 {
        self.samples.len() as u32
    }

    pub fn encoded_size(&self) -> usize {
        WAVEFORM_HEADER_SIZE + 2 * self.samples.len() + self.gates.len()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.push(self.channel);
        out.extend_from_slice(&self.samples_number().to_le_bytes());
        out.push(self.gates_number);
        for sample in &self.samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out.extend_from_slice(&self.gates);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut out);
        out
    }
}

/// Encodes a single waveform from its component parts, per the C1 contract
/// `encode_waveform(header, samples, gates) -> bytes`.
pub fn encode_waveform(timestamp: u64, channel: u8, samples: &[u16], gates: &[Vec<u8>]) -> Vec<u8> {
    let event = WaveformEvent::new(timestamp, channel, samples.to_vec(), gates.to_vec());
    event.encode()
}

/// A zero-copy view onto one waveform record inside a received buffer.
#[derive(Debug, Clone, Copy)]
pub struct WaveformEventView<'a> {
    bytes: &'a [u8],
    samples_number: u32,
    gates_number: u8,
}

impl<'a> WaveformEventView<'a> {
    pub fn timestamp(&self) -> u64 {
        u64::from_le_bytes(self.bytes[0..8].try_into().unwrap())
    }

    pub fn channel(&self) -> u8 {
        self.bytes[8]
    }

    pub fn samples_number(&self) -> u32 {
        self.samples_number
    }

    pub fn gates_number(&self) -> u8 {
        self.gates_number
    }

    pub fn sample(&self, index: usize) -> u16 {
        let start = WAVEFORM_HEADER_SIZE + index * 2;
        u16::from_le_bytes(self.bytes[start..start + 2].try_into().unwrap())
    }

    pub fn samples(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.samples_number as usize).map(move |i| self.sample(i))
    }

    /// Byte `index` within flattened gate-major trace storage.
    pub fn gate_byte(&self, index: usize) -> u8 {
        let start = WAVEFORM_HEADER_SIZE + 2 * self.samples_number as usize + index;
        self.bytes[start]
    }

    pub fn gates_flat(&self) -> &'a [u8] {
        let start = WAVEFORM_HEADER_SIZE + 2 * self.samples_number as usize;
        &self.bytes[start..self.bytes.len()]
    }

    pub fn raw(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_owned(&self) -> WaveformEvent {
        WaveformEvent {
            timestamp: self.timestamp(),
            channel: self.channel(),
            gates_number: self.gates_number,
            samples: self.samples().collect(),
            gates: self.gates_flat().to_vec(),
        }
    }
}

/// Validates I2 and returns a lazy iterator of zero-copy waveform views.
/// Like `decode_events`, this never returns a partial prefix: any
/// truncated or overrunning record fails the whole buffer.
pub fn decode_waveforms(bytes: &[u8]) -> DecodeResult<WaveformEventIter<'_>> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        if offset + WAVEFORM_HEADER_SIZE > bytes.len() {
            return Err(DecodeError::truncated(
                "waveform header does not fit in remaining buffer",
            ));
        }
        let header = &bytes[offset..offset + WAVEFORM_HEADER_SIZE];
        let samples_number = u32::from_le_bytes(header[9..13].try_into().unwrap());
        let gates_number = header[13];
        let record_size = WAVEFORM_HEADER_SIZE
            + 2 * samples_number as usize
            + gates_number as usize * samples_number as usize;
        if offset + record_size > bytes.len() {
            return Err(DecodeError::truncated(
                "waveform payload does not fit in remaining buffer",
            ));
        }
        offset += record_size;
    }
    if offset != bytes.len() {
        return Err(DecodeError::misaligned(
            "waveform stream did not sum to the declared buffer size",
        ));
    }
    Ok(WaveformEventIter { bytes, offset: 0 })
}

#[derive(Debug)]
pub struct WaveformEventIter<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for WaveformEventIter<'a> {
    type Item = WaveformEventView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        let header = &self.bytes[self.offset..self.offset + WAVEFORM_HEADER_SIZE];
        let samples_number = u32::from_le_bytes(header[9..13].try_into().unwrap());
        let gates_number = header[13];
        let record_size = WAVEFORM_HEADER_SIZE
            + 2 * samples_number as usize
            + gates_number as usize * samples_number as usize;
        let view = WaveformEventView {
            bytes: &self.bytes[self.offset..self.offset + record_size],
            samples_number,
            gates_number,
        };
        self.offset += record_size;
        Some(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_single_waveform() {
        let samples = vec![10u16, 20, 30];
        let gates = vec![vec![1u8, 0, 1]];
        let event = WaveformEvent::new(500, 7, samples.clone(), gates.clone());
        let bytes = event.encode();
        assert_eq!(bytes.len(), 14 + 2 * 3 + 1 * 3);

        let decoded: Vec<_> = decode_waveforms(&bytes).unwrap().map(|v| v.to_owned()).collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], event);
    }

    #[test]
    fn concatenated_stream_decodes_in_order() {
        let e1 = WaveformEvent::new(1, 0, vec![1, 2], vec![]);
        let e2 = WaveformEvent::new(2, 1, vec![3, 4, 5], vec![vec![9, 9, 9]]);
        let mut bytes = e1.encode();
        bytes.extend(e2.encode());

        let decoded: Vec<_> = decode_waveforms(&bytes).unwrap().map(|v| v.to_owned()).collect();
        assert_eq!(decoded, vec![e1, e2]);
    }

    #[test]
    fn truncated_header_is_rejected_whole() {
        let e1 = WaveformEvent::new(1, 0, vec![1, 2], vec![]);
        let mut bytes = e1.encode();
        bytes.push(0); // trailing garbage, not a full header
        let err = decode_waveforms(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn overrunning_payload_is_rejected() {
        let mut bytes = WaveformEvent::new(1, 0, vec![1, 2, 3], vec![]).encode();
        bytes.truncate(bytes.len() - 1);
        let err = decode_waveforms(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }
}
