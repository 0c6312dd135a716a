#![warn(missing_docs)]
/*! This crate parses the raw readout stream of a TRD detector.

The front-end electronics (FEE) emit a hierarchical stream of 32-bit
little-endian data words per optical link: tracklets, half-chamber
headers, MCM headers, ADC channel masks and ADC samples, terminated by
marker words. Links are delivered in fixed-layout half-CRU pages.

# Architecture overview

Data flows through the crate like this:

```text
      [ positioned byte source ]
                 ↓
   [ CruParser: page framing,    ]
   [ per-link byte budgets       ]
                 ↓
   [ FeeParser: predictive word  ]
   [ parser with resync          ]
                 ↓
  [ word parsers: context updates, ]
  [ digit sink calls, log lines    ]
```

Each word parser is driven by a declarative bit pattern in the notation
of the TRAP User Manual, e.g. `"xmmm : mmmm : nnnn : nnnq : qqss : sssp
: ppcc : ci01"`: letters are fields, `0`/`1` are validation bits. The
[`FeeParser`](fee::FeeParser) keeps a stack of alternative parsers to
try against the next word; a word that matches no alternative triggers
resynchronization on the known markers.

# Example

```
use trdraw::fee::FeeParser;

let mut parser = FeeParser::new();
parser.next_event();
parser.process(&[trdraw::EOT_MARKER]);
assert_eq!(parser.context().event, 1);
```

Completed ADC channels are delivered to a [`sink::DigitSink`] installed
at construction time. Diagnostics go to the [`log`] facade; install any
logger you like.
 */
pub mod context;
pub mod fee;
pub mod halfcru;
pub mod pattern;
pub mod sink;
pub mod words;

/// Word marking the end of the tracklet block on a link.
pub const EOT_MARKER: u32 = 0x1000_1000;

/// Word marking the end of the raw data block on a link.
pub const EOD_MARKER: u32 = 0x0000_0000;

/// Start-of-configuration magic word. Shared with the data producer but
/// not consumed by the parsers in this crate.
pub const MAGIC_MARKER: u32 = 0x900D_DEED;

/// Errors surfaced by the framing layer.
///
/// Everything recoverable (pattern mismatches, corrupt words, bad
/// padding) is handled by logging and resynchronization instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying byte source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A page did not hold enough bytes for a half-CRU header.
    #[error("insufficient data for half-CRU header: {avail} bytes left in page")]
    TruncatedPageHeader {
        /// Bytes remaining in the page.
        avail: u64,
    },
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
