//! Sinks receiving completed ADC channels.

use std::cell::RefCell;
use std::rc::Rc;

/// One fully accumulated ADC channel readout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digit {
    /// Event number the channel belongs to.
    pub event: u32,
    /// Detector number.
    pub det: u16,
    /// Readout board.
    pub rob: u8,
    /// MCM number on the readout board.
    pub mcm: u8,
    /// ADC channel number.
    pub channel: u8,
    /// One sample per timebin.
    pub samples: Vec<u16>,
}

/// Receiver for completed ADC channels.
///
/// The parser calls [`store_digits`](Self::store_digits) synchronously
/// when the last timebin triple of a channel has been parsed. The
/// sample slice is only valid for the duration of the call; the parser
/// reuses the buffer for the next channel.
pub trait DigitSink {
    /// Deliver one completed channel.
    fn store_digits(&mut self, event: u32, det: u16, rob: u8, mcm: u8, channel: u8, samples: &[u16]);
}

/// Sink that throws all digits away.
pub struct NullSink;

impl DigitSink for NullSink {
    fn store_digits(&mut self, _: u32, _: u16, _: u8, _: u8, _: u8, _: &[u16]) {}
}

/// Sink collecting digits into a shared vector.
///
/// This sink is really only useful for unit tests: keep a handle from
/// [`digits`](Self::digits) and inspect it after parsing.
#[derive(Default)]
pub struct VectorSink {
    digits: Rc<RefCell<Vec<Digit>>>,
}

impl VectorSink {
    /// Create a new VectorSink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the collected digits.
    pub fn digits(&self) -> Rc<RefCell<Vec<Digit>>> {
        Rc::clone(&self.digits)
    }
}

impl DigitSink for VectorSink {
    fn store_digits(&mut self, event: u32, det: u16, rob: u8, mcm: u8, channel: u8, samples: &[u16]) {
        self.digits.borrow_mut().push(Digit {
            event,
            det,
            rob,
            mcm,
            channel,
            samples: samples.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_sink_collects() {
        let mut sink = VectorSink::new();
        let digits = sink.digits();
        sink.store_digits(1, 33, 1, 2, 7, &[10, 20, 30]);
        assert_eq!(
            digits.borrow()[0],
            Digit {
                event: 1,
                det: 33,
                rob: 1,
                mcm: 2,
                channel: 7,
                samples: vec![10, 20, 30],
            }
        );
    }
}
