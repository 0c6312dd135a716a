/*! Half-CRU page header and the framing that feeds links to the FEE parser.

Each page starts with a fixed 64-byte header carrying per-link error
flags and byte budgets for the 15 optical links, followed by the links'
byte ranges back to back, followed by up to 32 bytes of `0xEE` padding.
A link may spill over into the next page; the framing state needed to
resume it lives in the [`CruParser`] instance.
 */
use std::io::{Read, Seek};
use std::sync::LazyLock;

use itertools::Itertools;
use log::{debug, warn};

use crate::fee::FeeParser;
use crate::pattern::WordPattern;
use crate::sink::DigitSink;
use crate::{Error, Result};

/// Byte value the CRU fills page tails with.
pub const PADDING_BYTE: u8 = 0xEE;

/// Number of optical links carried per half-CRU.
pub const NUM_LINKS: usize = 15;

// Layout of the first header word.
static HW0: LazyLock<WordPattern> =
    LazyLock::new(|| WordPattern::compile("tttt : eeee : ssss : cccc : cccc : cccc : vvvv : vvvv"));

/// The fixed header in front of each half-CRU page payload.
///
/// Multi-byte fields are big-endian on the wire, unlike the FEE data
/// words that follow them.
#[derive(Debug, Clone)]
pub struct HalfCruHeader {
    /// Event type, from the header word.
    pub evtype: u8,
    /// CRU endpoint, from the header word.
    pub endpoint: u8,
    /// Stop bit, from the header word.
    pub stopbit: u8,
    /// Bunch crossing, from the header word.
    pub bc: u16,
    /// Header version, from the header word.
    pub version: u8,
    /// Per-link error flags. Surfaced in diagnostics only.
    pub errflags: [u8; NUM_LINKS],
    /// Per-link data sizes in bytes.
    pub datasize: [u16; NUM_LINKS],
}

impl HalfCruHeader {
    /// Size of the header on the wire.
    pub const SIZE: usize = 64;

    /// Parse the 64-byte header record.
    pub fn parse(data: &[u8; Self::SIZE]) -> Self {
        let hw0 = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let f = HW0.extract(hw0);
        let mut errflags = [0u8; NUM_LINKS];
        errflags.copy_from_slice(&data[8..23]);
        let mut datasize = [0u16; NUM_LINKS];
        for (i, b) in data[32..62].chunks_exact(2).enumerate() {
            datasize[i] = u16::from_be_bytes([b[0], b[1]]);
        }
        Self {
            evtype: f.field('t') as u8,
            endpoint: f.field('e') as u8,
            stopbit: f.field('s') as u8,
            bc: f.field('c') as u16,
            version: f.field('v') as u8,
            errflags,
            datasize,
        }
    }

    /// One human-readable line for the i-th 32-bit word of the header,
    /// for dump views of a raw page.
    pub fn describe_dword(&self, i: usize) -> String {
        let dwi = format!("HCRU[{}.{}]  ", i / 2, i % 2);
        match i {
            0 => format!(
                "{dwi}evtype={} endpoint={} stopbit={} bc={} version={}",
                self.evtype, self.endpoint, self.stopbit, self.bc, self.version
            ),
            // errflags occupy bytes 8..23, i.e. words 2..6.
            2..=5 => {
                let lo = i * 4 - 8;
                let hi = (i * 4 + 4 - 8).min(NUM_LINKS);
                dwi + &(lo..hi)
                    .map(|j| format!("{j:x}:{:x}", self.errflags[j]))
                    .join(" ")
            }
            // datasize occupies bytes 32..62, i.e. words 8..16.
            8..=15 => {
                let lo = (i * 4 - 32) / 2;
                let hi = ((i * 4 + 4 - 32) / 2).min(NUM_LINKS);
                dwi + &(lo..hi)
                    .map(|j| format!("{j:x}:{:04X}({:x})", self.datasize[j], self.errflags[j]))
                    .join(" ")
            }
            _ => dwi,
        }
    }
}

/// Feeds half-CRU pages to a FEE parser, one link byte range at a time.
///
/// The header, the current link, and the link's unread byte count are
/// instance state, so a link whose budget spans two pages resumes where
/// it stopped once the next page is offered to [`read`](Self::read).
pub struct CruParser {
    fee: FeeParser,
    header: Option<HalfCruHeader>,
    link: usize,
    unread: Option<u64>,
}

impl Default for CruParser {
    fn default() -> Self {
        Self::new()
    }
}

impl CruParser {
    /// Create a parser that discards digits.
    pub fn new() -> Self {
        Self::with_sink(Box::new(crate::sink::NullSink))
    }

    /// Create a parser delivering completed ADC channels to `sink`.
    pub fn with_sink(sink: Box<dyn DigitSink>) -> Self {
        Self {
            fee: FeeParser::with_sink(sink),
            header: None,
            link: 0,
            unread: None,
        }
    }

    /// Advance the event counter of the underlying FEE parser.
    pub fn next_event(&mut self) {
        self.fee.next_event();
    }

    /// The FEE parser fed by this framing layer, for inspection.
    pub fn fee(&self) -> &FeeParser {
        &self.fee
    }

    /// Consume one page of `size` bytes from `stream`.
    pub fn read<R: Read + Seek>(&mut self, stream: &mut R, size: u64) -> Result<()> {
        let maxpos = stream.stream_position()? + size;
        loop {
            let pos = stream.stream_position()?;
            if pos >= maxpos {
                break;
            }
            let avail = maxpos - pos;

            if avail == 32 {
                // Trailing padding region.
                let mut padding = [0u8; 32];
                stream.read_exact(&mut padding)?;
                if padding != [PADDING_BYTE; 32] {
                    warn!("page padding is not {PADDING_BYTE:#04x} x 32: {padding:02x?}");
                }
                continue;
            }

            if self.header.is_none() {
                if avail < HalfCruHeader::SIZE as u64 {
                    return Err(Error::TruncatedPageHeader { avail });
                }
                let mut buf = [0u8; HalfCruHeader::SIZE];
                stream.read_exact(&mut buf)?;
                let header = HalfCruHeader::parse(&buf);
                debug!(
                    "read half-CRU header, link sizes {}",
                    header.datasize.iter().map(|s| format!("{s:04x}")).join(" ")
                );
                self.header = Some(header);
                self.link = 0;
                self.unread = None;
            }

            let datasize = self.header.as_ref().expect("header read above").datasize;
            let unread = *self
                .unread
                .get_or_insert(u64::from(datasize[self.link]));

            if unread > 0 {
                let readsize = unread.min(maxpos - stream.stream_position()?);
                self.fee.read(stream, readsize)?;
                self.unread = Some(unread - readsize);
            }

            // Step over finished links; after the last one the page is
            // complete and the header is released.
            while self.unread == Some(0) {
                if self.link + 1 < NUM_LINKS {
                    self.link += 1;
                    self.unread = Some(u64::from(datasize[self.link]));
                } else {
                    self.header = None;
                    self.link = 0;
                    self.unread = None;
                }
            }
        }
        Ok(())
    }
}
