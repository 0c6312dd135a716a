/*! The individual parsers for the FEE data words.

One parser exists per logical word kind: tracklets, the end-of-tracklet
and end-of-data markers, the four half-chamber header words, the MCM
header, the ADC channel mask, ADC sample triples, and two resync
parsers used after corruption. Each parser checks its word against a
compiled bit pattern, mutates the parsing context, and tells the driver
which alternative sets to expect next.
 */
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use log::{debug, error, warn};

use crate::context::ParsingContext;
use crate::pattern::WordPattern;
use crate::sink::DigitSink;
use crate::{EOD_MARKER, EOT_MARKER};

// Word layouts as printed in the TRAP User Manual.
static HC0: LazyLock<WordPattern> =
    LazyLock::new(|| WordPattern::compile("xmmm : mmmm : nnnn : nnnq : qqss : sssp : ppcc : ci01"));
static HC1: LazyLock<WordPattern> =
    LazyLock::new(|| WordPattern::compile("tttt : ttbb : bbbb : bbbb : bbbb : bbpp : pphh : hh01"));
static HC2: LazyLock<WordPattern> =
    LazyLock::new(|| WordPattern::compile("pgtc : nbaa : aaaa : xxxx : xxxx : xxxx : xx11 : 0001"));
static HC3: LazyLock<WordPattern> =
    LazyLock::new(|| WordPattern::compile("ssss : ssss : ssss : saaa : aaaa : aaaa : aa11 : 0101"));
static MCMHDR: LazyLock<WordPattern> =
    LazyLock::new(|| WordPattern::compile("1rrr : mmmm : eeee : eeee : eeee : eeee : eeee : 1100"));
static ADCMASK: LazyLock<WordPattern> =
    LazyLock::new(|| WordPattern::compile("nncc : cccm : mmmm : mmmm : mmmm : mmmm : mmmm : 1100"));

/// Number of ADC channels per MCM.
pub const NUM_CHANNELS: u8 = 21;

/// An ordered list of parsers to try against one incoming word.
pub(crate) type AlternativeSet = Vec<WordParser>;

/// What a parser told the driver about one word.
pub(crate) enum Outcome {
    /// The word does not carry this parser's pattern; try the next
    /// alternative.
    Reject,
    /// Word consumed, nothing new to expect.
    Accept,
    /// Word consumed; these alternative sets apply to the words that
    /// follow, first entry first.
    AcceptWith(Vec<AlternativeSet>),
}

/// One parser for a logical kind of data word.
#[derive(Debug, Clone)]
pub(crate) enum WordParser {
    /// Any word of the tracklet block (everything except the EOT marker).
    Tracklet,
    /// The end-of-tracklet marker.
    Eot,
    /// The end-of-data marker.
    Eod,
    /// Half-chamber header word 0: versions, word count, chamber identity.
    Hc0,
    /// Half-chamber header word 1: timebins, bunch crossing, pretrigger.
    Hc1,
    /// Half-chamber header word 2: filter settings.
    Hc2,
    /// Half-chamber header word 3: firmware repository version.
    Hc3,
    /// MCM header: readout board and MCM number.
    McmHdr,
    /// ADC channel mask selecting the channels that follow.
    AdcMask,
    /// Three samples of `channel` starting at `timebin`. All triples of
    /// one MCM payload share the same sample buffer.
    AdcData {
        channel: u8,
        timebin: usize,
        samples: Rc<RefCell<Vec<u16>>>,
    },
    /// Resync: discard words until the EOD marker shows up.
    SkipUntilEod,
    /// Resync: discard words until the EOD marker or something shaped
    /// like an MCM header shows up.
    FindEodOrMcmHdr,
}

impl WordParser {
    /// Parser name for "NO MATCH" diagnostics.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            WordParser::Tracklet => "tracklet",
            WordParser::Eot => "eot",
            WordParser::Eod => "eod",
            WordParser::Hc0 => "hc0",
            WordParser::Hc1 => "hc1",
            WordParser::Hc2 => "hc2",
            WordParser::Hc3 => "hc3",
            WordParser::McmHdr => "mcmhdr",
            WordParser::AdcMask => "adcmask",
            WordParser::AdcData { .. } => "adcdata",
            WordParser::SkipUntilEod => "skip_until_eod",
            WordParser::FindEodOrMcmHdr => "find_eod_or_mcmhdr",
        }
    }

    /// Try this parser on `word`.
    pub(crate) fn parse(
        &self,
        ctx: &mut ParsingContext,
        sink: &mut dyn DigitSink,
        word: u32,
    ) -> Outcome {
        match self {
            WordParser::Tracklet => parse_tracklet(ctx, word),
            WordParser::Eot => parse_eot(ctx, word),
            WordParser::Eod => parse_eod(ctx, word),
            WordParser::Hc0 => parse_hc0(ctx, word),
            WordParser::Hc1 => parse_hc1(ctx, word),
            WordParser::Hc2 => parse_hc2(ctx, word),
            WordParser::Hc3 => parse_hc3(ctx, word),
            WordParser::McmHdr => parse_mcmhdr(ctx, word),
            WordParser::AdcMask => parse_adcmask(ctx, word),
            WordParser::AdcData {
                channel,
                timebin,
                samples,
            } => parse_adcdata(ctx, sink, word, *channel, *timebin, samples),
            WordParser::SkipUntilEod => skip_until_eod(ctx, word),
            WordParser::FindEodOrMcmHdr => find_eod_or_mcmhdr(ctx, word),
        }
    }
}

fn parse_tracklet(ctx: &mut ParsingContext, word: u32) -> Outcome {
    if word == EOT_MARKER {
        return Outcome::Reject;
    }
    debug!("{}  TRK tracklet", ctx.where_prefix());
    Outcome::AcceptWith(vec![vec![WordParser::Tracklet, WordParser::Eot]])
}

fn parse_eot(ctx: &mut ParsingContext, word: u32) -> Outcome {
    if word != EOT_MARKER {
        return Outcome::Reject;
    }
    debug!("{}  EOT", ctx.where_prefix());
    Outcome::AcceptWith(vec![vec![WordParser::Eot, WordParser::Hc0]])
}

fn parse_eod(ctx: &mut ParsingContext, word: u32) -> Outcome {
    if word != EOD_MARKER {
        return Outcome::Reject;
    }
    debug!("{}  EOD", ctx.where_prefix());
    Outcome::AcceptWith(vec![vec![WordParser::Eod]])
}

fn parse_hc0(ctx: &mut ParsingContext, word: u32) -> Outcome {
    let Some(f) = HC0.decode(word) else {
        return Outcome::Reject;
    };
    ctx.major = f.field('m') as u8;
    ctx.minor = f.field('n') as u8;
    ctx.nhw = f.field('q') as u8;
    ctx.sm = f.field('s') as u8;
    ctx.layer = f.field('p') as u8;
    ctx.stack = f.field('c') as u8;
    ctx.side = f.field('i') as u8;
    ctx.det = 18 * ctx.sm as u16 + 6 * ctx.stack as u16 + ctx.layer as u16;

    // Data corruption seen with configs around svn r5930: no version
    // info at all. Assume zero suppression and two more header words so
    // the rest of the link stays parseable.
    if ctx.major == 0 && ctx.minor == 0 && ctx.nhw == 0 {
        warn!(
            "{}  HC0 carries no version info, assuming ZS",
            ctx.where_prefix()
        );
        ctx.major = 0x20; // ZS
        ctx.minor = 0;
        ctx.nhw = 2;
    }

    let side = if ctx.side == 0 { 'A' } else { 'B' };
    ctx.hc = format!("{:02}_{}_{}{}", ctx.sm, ctx.stack, ctx.layer, side);
    debug!(
        "{}  HC0 {} ver=0x{:X}.{:X} nw={}",
        ctx.where_prefix(),
        ctx.hc,
        ctx.major,
        ctx.minor,
        ctx.nhw
    );

    // Check additional HC header words with HC1 last: HC2 and HC3 look
    // like an HC1 carrying an invalid phase >= 12.
    let mut readlist: Vec<AlternativeSet> = (0..ctx.nhw)
        .map(|_| vec![WordParser::Hc3, WordParser::Hc2, WordParser::Hc1])
        .collect();
    readlist.push(vec![WordParser::McmHdr]);
    Outcome::AcceptWith(readlist)
}

fn parse_hc1(ctx: &mut ParsingContext, word: u32) -> Outcome {
    let Some(f) = HC1.decode(word) else {
        return Outcome::Reject;
    };
    ctx.ntb = f.field('t') as usize;
    ctx.bc_counter = f.field('b') as u16;
    ctx.pre_counter = f.field('p') as u8;
    ctx.pre_phase = f.field('h') as u8;
    debug!(
        "{}  HC1 tb={} bc={} ptrg={} phase={}",
        ctx.where_prefix(),
        ctx.ntb,
        ctx.bc_counter,
        ctx.pre_counter,
        ctx.pre_phase
    );
    Outcome::Accept
}

fn parse_hc2(ctx: &mut ParsingContext, word: u32) -> Outcome {
    if HC2.decode(word).is_none() {
        return Outcome::Reject;
    }
    debug!("{}  HC2 - filter settings", ctx.where_prefix());
    Outcome::Accept
}

fn parse_hc3(ctx: &mut ParsingContext, word: u32) -> Outcome {
    let Some(f) = HC3.decode(word) else {
        return Outcome::Reject;
    };
    debug!(
        "{}  HC3 - svn version {} {}",
        ctx.where_prefix(),
        f.field('s'),
        f.field('a')
    );
    Outcome::Accept
}

fn parse_mcmhdr(ctx: &mut ParsingContext, word: u32) -> Outcome {
    let Some(f) = MCMHDR.decode(word) else {
        return Outcome::Reject;
    };
    ctx.rob = f.field('r') as u8;
    ctx.mcm = f.field('m') as u8;
    debug!(
        "{}  MCM {}:{:02} event {}",
        ctx.where_prefix(),
        ctx.rob,
        ctx.mcm,
        f.field('e')
    );

    if ctx.major & 0x20 != 0 {
        // Zero suppression: the ADC mask decides which channels follow.
        return Outcome::AcceptWith(vec![vec![WordParser::AdcMask]]);
    }

    // No ZS: all channels follow, then the next MCM header or EOD.
    let samples = Rc::new(RefCell::new(vec![0u16; ctx.ntb]));
    let mut readlist: Vec<AlternativeSet> = Vec::new();
    for channel in 0..NUM_CHANNELS {
        for timebin in (0..ctx.ntb).step_by(3) {
            readlist.push(vec![WordParser::AdcData {
                channel,
                timebin,
                samples: Rc::clone(&samples),
            }]);
        }
    }
    readlist.push(vec![WordParser::McmHdr, WordParser::Eod]);
    Outcome::AcceptWith(readlist)
}

fn parse_adcmask(ctx: &mut ParsingContext, word: u32) -> Outcome {
    let Some(f) = ADCMASK.decode(word) else {
        return Outcome::Reject;
    };
    let mask = f.field('m');
    let nch = !f.field('c') & 0x1F;

    let samples = Rc::new(RefCell::new(vec![0u16; ctx.ntb]));
    let mut map = String::new();
    let mut count = 0;
    let mut readlist: Vec<AlternativeSet> = Vec::new();
    for channel in 0..NUM_CHANNELS {
        if channel == 9 || channel == 19 {
            map.push(' ');
        }
        if mask & (1 << channel) != 0 {
            count += 1;
            map.push((b'0' + channel % 10) as char);
            for timebin in (0..ctx.ntb).step_by(3) {
                readlist.push(vec![WordParser::AdcData {
                    channel,
                    timebin,
                    samples: Rc::clone(&samples),
                }]);
            }
        } else {
            map.push('.');
        }
    }
    readlist.push(vec![WordParser::McmHdr, WordParser::Eod]);

    debug!("{}  MSK {}  ({} channels)", ctx.where_prefix(), map, nch);
    if count != nch {
        // Diagnosed but not fatal: keep the readlist so parsing goes on.
        error!(
            "{}  ADC mask has {} active channels, complement count says {}",
            ctx.where_prefix(),
            count,
            nch
        );
    }
    Outcome::AcceptWith(readlist)
}

fn parse_adcdata(
    ctx: &mut ParsingContext,
    sink: &mut dyn DigitSink,
    word: u32,
    channel: u8,
    timebin: usize,
    samples: &Rc<RefCell<Vec<u16>>>,
) -> Outcome {
    // No validation bits; every word is three 10-bit samples and a flag.
    let x = (word >> 22) & 0x3FF;
    let y = (word >> 12) & 0x3FF;
    let z = (word >> 2) & 0x3FF;
    let f = word & 0x3;

    let mark = ['#', '#', '|', ':'][(word & 0x3) as usize];
    let ch = if timebin == 0 {
        format!("ch {channel:2}")
    } else {
        "     ".into()
    };
    debug!(
        "{}  ADC {} {} tb {:2} (f={})   {:4}  {:4}  {:4}",
        ctx.where_prefix(),
        mark,
        ch,
        timebin,
        f,
        x,
        y,
        z
    );

    let mut buf = samples.borrow_mut();
    for (i, adc) in [x, y, z].into_iter().enumerate() {
        if timebin + i < buf.len() {
            buf[timebin + i] = adc as u16;
        }
    }

    // Last triple of the channel: hand the accumulated samples over.
    if timebin + 3 >= buf.len() {
        sink.store_digits(ctx.event, ctx.det, ctx.rob, ctx.mcm, channel, &buf);
    }
    Outcome::Accept
}

fn skip_until_eod(ctx: &mut ParsingContext, word: u32) -> Outcome {
    if word == EOD_MARKER {
        return Outcome::Reject;
    }
    debug!("{}  SKP ... skip parsing ...", ctx.where_prefix());
    Outcome::AcceptWith(vec![vec![WordParser::Eod, WordParser::SkipUntilEod]])
}

fn find_eod_or_mcmhdr(ctx: &mut ParsingContext, word: u32) -> Outcome {
    if word == EOD_MARKER {
        return parse_eod(ctx, word);
    }
    if MCMHDR.matches(word) {
        return parse_mcmhdr(ctx, word);
    }
    debug!(
        "{}  SKP ... trying to find: eod | mcmhdr",
        ctx.where_prefix()
    );
    Outcome::AcceptWith(vec![vec![WordParser::FindEodOrMcmHdr]])
}

/// Names of every fixed-pattern word kind whose validation bits accept
/// `word`. A debugging aid for staring at corrupt streams; ambiguous
/// words report more than one name.
pub fn classify_word(word: u32) -> Vec<&'static str> {
    let table: [(&'static str, &WordPattern); 6] = [
        ("hc0", &*HC0),
        ("hc1", &*HC1),
        ("hc2", &*HC2),
        ("hc3", &*HC3),
        ("mcmhdr", &*MCMHDR),
        ("adcmask", &*ADCMASK),
    ];
    let mut names: Vec<&'static str> = table
        .iter()
        .filter(|(_, p)| p.matches(word))
        .map(|(n, _)| *n)
        .collect();
    if word == EOT_MARKER {
        names.push("eot");
    }
    if word == EOD_MARKER {
        names.push("eod");
    }
    names
}
