//! 32-bit integer arithmetic coder for the residual set.
//!
//! Classic low/high interval coder with pending-bit carry handling. All
//! interval math runs in `u64`, so no step can overflow for totals up to
//! [`MAX_TOTAL`].

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};
use fsmc_core::{CodecError, Result};
use std::io;

const STATE_BITS: u32 = 32;
const MASK: u64 = (1 << STATE_BITS) - 1;
const HALF: u64 = 1 << (STATE_BITS - 1);
const QUARTER: u64 = 1 << (STATE_BITS - 2);
const THREE_QUARTERS: u64 = 3 * QUARTER;

/// Largest frequency total the coder accepts. A total at or above a quarter
/// of the state range could map a symbol to an empty interval.
pub const MAX_TOTAL: u64 = QUARTER - 1;

/// Zero bits the decoder may consume past the end of its input. The encoder
/// flushes two bits, so a well-formed stream never needs more than a state
/// width of padding.
const MAX_OVERRUN_BITS: u32 = 2 * STATE_BITS;

pub struct ArithEncoder {
    low: u64,
    high: u64,
    pending: u64,
    writer: BitWriter<Vec<u8>, BigEndian>,
    encoded: u64,
}

impl Default for ArithEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArithEncoder {
    pub fn new() -> Self {
        Self {
            low: 0,
            high: MASK,
            pending: 0,
            writer: BitWriter::endian(Vec::new(), BigEndian),
            encoded: 0,
        }
    }

    pub fn encoded(&self) -> u64 {
        self.encoded
    }

    fn emit(&mut self, bit: bool) -> io::Result<()> {
        self.writer.write_bit(bit)?;
        while self.pending > 0 {
            self.writer.write_bit(!bit)?;
            self.pending -= 1;
        }
        Ok(())
    }

    /// Narrows the interval to `[cum, cum + freq)` out of `total`.
    pub fn encode(&mut self, cum: u64, freq: u64, total: u64) -> Result<()> {
        check_interval(cum, freq, total)?;
        let range = self.high - self.low + 1;
        self.high = self.low + range * (cum + freq) / total - 1;
        self.low += range * cum / total;

        loop {
            if self.high < HALF {
                self.emit(false)?;
            } else if self.low >= HALF {
                self.emit(true)?;
                self.low -= HALF;
                self.high -= HALF;
            } else if self.low >= QUARTER && self.high < THREE_QUARTERS {
                self.pending += 1;
                self.low -= QUARTER;
                self.high -= QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
        }
        self.encoded += 1;
        Ok(())
    }

    /// Flushes the final interval. An encoder that never coded a symbol
    /// yields an empty buffer.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.encoded > 0 {
            self.pending += 1;
            let bit = self.low >= QUARTER;
            self.emit(bit)?;
        }
        self.writer.byte_align()?;
        Ok(self.writer.into_writer())
    }
}

pub struct ArithDecoder<'a> {
    low: u64,
    high: u64,
    value: u64,
    reader: BitReader<&'a [u8], BigEndian>,
    overrun: u32,
}

impl<'a> ArithDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut decoder = Self {
            low: 0,
            high: MASK,
            value: 0,
            reader: BitReader::endian(data, BigEndian),
            overrun: 0,
        };
        for _ in 0..STATE_BITS {
            decoder.value = (decoder.value << 1) | decoder.next_bit()?;
        }
        Ok(decoder)
    }

    fn next_bit(&mut self) -> Result<u64> {
        match self.reader.read_bit() {
            Ok(bit) => Ok(bit as u64),
            Err(_) => {
                self.overrun += 1;
                if self.overrun > MAX_OVERRUN_BITS {
                    return Err(CodecError::Desync("arithmetic stream exhausted".into()));
                }
                Ok(0)
            }
        }
    }

    /// Cumulative frequency the current value falls on, in `0..total`.
    pub fn target(&self, total: u64) -> Result<u64> {
        if total == 0 || total > MAX_TOTAL {
            return Err(CodecError::Desync(format!("invalid frequency total {}", total)));
        }
        let range = self.high - self.low + 1;
        let offset = self.value.wrapping_sub(self.low);
        if self.value < self.low || offset >= range {
            return Err(CodecError::Desync("arithmetic state out of range".into()));
        }
        let target = ((offset + 1) * total - 1) / range;
        if target >= total {
            return Err(CodecError::Desync("arithmetic target out of range".into()));
        }
        Ok(target)
    }

    /// Mirrors [`ArithEncoder::encode`] for the interval just decoded.
    pub fn consume(&mut self, cum: u64, freq: u64, total: u64) -> Result<()> {
        check_interval(cum, freq, total).map_err(|e| CodecError::Desync(e.to_string()))?;
        let range = self.high - self.low + 1;
        self.high = self.low + range * (cum + freq) / total - 1;
        self.low += range * cum / total;

        loop {
            if self.high < HALF {
                // nothing to subtract
            } else if self.low >= HALF {
                self.low -= HALF;
                self.high -= HALF;
                self.value -= HALF;
            } else if self.low >= QUARTER && self.high < THREE_QUARTERS {
                self.low -= QUARTER;
                self.high -= QUARTER;
                self.value -= QUARTER;
            } else {
                break;
            }
            self.low <<= 1;
            self.high = (self.high << 1) | 1;
            self.value = (self.value << 1) | self.next_bit()?;
        }
        Ok(())
    }
}

fn check_interval(cum: u64, freq: u64, total: u64) -> Result<()> {
    if total == 0 || total > MAX_TOTAL {
        return Err(CodecError::CapacityExceeded(format!(
            "frequency total {} outside 1..={}",
            total, MAX_TOTAL
        )));
    }
    if freq == 0 || cum + freq > total {
        return Err(CodecError::CapacityExceeded(format!(
            "interval [{}, {}) outside total {}",
            cum,
            cum + freq,
            total
        )));
    }
    Ok(())
}
