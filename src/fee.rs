/*! Predictive word parser for the data stream of one optical link.

The driver keeps a stack of *alternative sets*: each set is the ordered
list of word parsers that may legally describe the next incoming word.
The first parser in the head set whose bit pattern matches wins, runs
its side effects on the parsing context, and pushes the alternative
sets it expects next. A word matching no alternative puts the driver
into resynchronization on the known markers.
 */
use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};

use itertools::Itertools;
use log::{error, trace};

use crate::Result;
use crate::context::ParsingContext;
use crate::sink::{DigitSink, NullSink};
use crate::words::{AlternativeSet, Outcome, WordParser};

/// Which alternatives to fall back to when no parser matches a word.
#[derive(Clone, Copy)]
enum Resync {
    /// Word-list processing: wait out the rest of the link until the
    /// end-of-data marker.
    Legacy,
    /// Positioned-stream processing: pick parsing back up at the next
    /// EOD marker or MCM header.
    Streaming,
}

impl Resync {
    fn alternatives(self) -> AlternativeSet {
        match self {
            Resync::Legacy => vec![WordParser::Eod, WordParser::SkipUntilEod],
            Resync::Streaming => vec![WordParser::FindEodOrMcmHdr],
        }
    }
}

/// Predictive parser for one FEE link.
///
/// Create one instance per stream; instances share nothing. Completed
/// ADC channels are delivered to the sink installed at construction.
pub struct FeeParser {
    ctx: ParsingContext,
    /// Pending alternative sets, head first. `None` until the first
    /// [`read`](Self::read) or [`process`](Self::process) call.
    readlist: Option<VecDeque<AlternativeSet>>,
    sink: Box<dyn DigitSink>,
}

impl Default for FeeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FeeParser {
    /// Create a parser that discards digits.
    pub fn new() -> Self {
        Self::with_sink(Box::new(NullSink))
    }

    /// Create a parser delivering completed ADC channels to `sink`.
    pub fn with_sink(sink: Box<dyn DigitSink>) -> Self {
        Self {
            ctx: ParsingContext::default(),
            readlist: None,
            sink,
        }
    }

    /// Advance the event counter. Nothing else ever changes the event
    /// number, and the expected-word stack is left alone.
    pub fn next_event(&mut self) {
        self.ctx.event += 1;
    }

    /// The parsing context, for inspection.
    pub fn context(&self) -> &ParsingContext {
        &self.ctx
    }

    fn initial_readlist() -> VecDeque<AlternativeSet> {
        VecDeque::from([vec![WordParser::Tracklet, WordParser::Eot]])
    }

    /// Parse one link given as a word list, resetting the expected-word
    /// stack first. Word positions are reported as list indices.
    pub fn process(&mut self, words: &[u32]) {
        self.readlist = Some(Self::initial_readlist());
        for (i, &word) in words.iter().enumerate() {
            self.ctx.current_linkpos = i as u64;
            self.ctx.current_dword = word;
            if !self.step(word, Resync::Legacy) {
                break;
            }
        }
    }

    /// Decode and parse `size` bytes of little-endian words from
    /// `stream`.
    ///
    /// The expected-word stack persists across calls, so a link split
    /// across page boundaries resumes exactly where it left off. When
    /// data arrives past the end of the read list, the remainder of the
    /// byte range is discarded.
    pub fn read<R: Read + Seek>(&mut self, stream: &mut R, size: u64) -> Result<()> {
        if self.readlist.is_none() {
            self.readlist = Some(Self::initial_readlist());
        }
        let mut pos = stream.stream_position()?;
        let maxpos = pos + size;
        let mut buf = [0u8; 4];
        while pos < maxpos {
            stream.read_exact(&mut buf)?;
            let word = u32::from_le_bytes(buf);
            self.ctx.current_linkpos = pos;
            self.ctx.current_dword = word;
            pos += 4;
            if !self.step(word, Resync::Streaming) {
                stream.seek(SeekFrom::Start(maxpos))?;
                break;
            }
        }
        Ok(())
    }

    /// Run one word through the head alternative set. Returns false
    /// when the link is done for, i.e. data keeps coming after the read
    /// list has been fully consumed.
    fn step(&mut self, word: u32, resync: Resync) -> bool {
        let readlist = self
            .readlist
            .as_mut()
            .expect("readlist initialized by process/read");
        let Some(expected) = readlist.pop_front() else {
            error!(
                "{}  extra data after end of readlist",
                self.ctx.where_prefix()
            );
            return false;
        };

        for parser in &expected {
            match parser.parse(&mut self.ctx, self.sink.as_mut(), word) {
                Outcome::Reject => continue,
                Outcome::Accept => return true,
                Outcome::AcceptWith(follow) => {
                    let readlist = self.readlist.as_mut().expect("still initialized");
                    for set in follow.into_iter().rev() {
                        readlist.push_front(set);
                    }
                    return true;
                }
            }
        }

        error!(
            "{}  NO MATCH - expected {} found {:X}",
            self.ctx.where_prefix(),
            expected.iter().map(WordParser::name).join(" | "),
            word
        );
        // The failed set is already popped; pushing the resync set
        // keeps the stack from growing on corrupt input.
        self.readlist
            .as_mut()
            .expect("still initialized")
            .push_front(resync.alternatives());
        true
    }

    /// Dump the pending alternative sets at trace level.
    pub fn dump_readlist(&self) {
        let Some(readlist) = &self.readlist else {
            trace!("readlist: uninitialized");
            return;
        };
        for (i, set) in readlist.iter().enumerate() {
            trace!(
                "readlist[{i}]: {}",
                set.iter().map(WordParser::name).join(" | ")
            );
        }
    }
}
