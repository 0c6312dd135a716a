//! End-to-end decoding of synthesized half-CRU pages from a file.

use std::fs::File;

use anyhow::Result;

use trdraw::halfcru::{CruParser, HalfCruHeader, PADDING_BYTE};
use trdraw::sink::VectorSink;
use trdraw::{EOD_MARKER, EOT_MARKER};

fn hc0_word(major: u32, minor: u32, nhw: u32, sm: u32, layer: u32, stack: u32, side: u32) -> u32 {
    major << 24 | minor << 17 | nhw << 14 | sm << 9 | layer << 6 | stack << 3 | side << 2 | 0b01
}

fn hc1_word(ntb: u32) -> u32 {
    ntb << 26 | 0b01
}

fn mcmhdr_word(rob: u32, mcm: u32, event: u32) -> u32 {
    0x8000_0000 | rob << 28 | mcm << 24 | event << 4 | 0xC
}

fn adcmask_word(mask: u32, nch: u32) -> u32 {
    (!nch & 0x1F) << 25 | mask << 4 | 0xC
}

fn adcdata_word(x: u32, y: u32, z: u32, f: u32) -> u32 {
    x << 22 | y << 12 | z << 2 | f
}

/// A page: header with the given link budgets, the links back to back,
/// then the 32-byte padding tail.
fn page(datasize: &[u16; 15], links: &[Vec<u32>]) -> Vec<u8> {
    let mut bytes = vec![0u8; HalfCruHeader::SIZE];
    bytes[0..4].copy_from_slice(&(2u32 << 28 | 1).to_be_bytes());
    for (i, &size) in datasize.iter().enumerate() {
        bytes[32 + 2 * i..34 + 2 * i].copy_from_slice(&size.to_be_bytes());
    }
    for link in links {
        bytes.extend(link.iter().flat_map(|w| w.to_le_bytes()));
    }
    bytes.extend([PADDING_BYTE; 32]);
    bytes
}

#[test]
fn decode_two_events_from_file() -> Result<()> {
    // Event 0: zero suppressed, channels 0 and 2, five timebins. The
    // second sample triple of each channel runs past ntb; the excess
    // value must be dropped.
    let zs_link = vec![
        EOT_MARKER,
        hc0_word(0x20, 0, 1, 1, 3, 2, 0),
        hc1_word(5),
        mcmhdr_word(1, 2, 0),
        adcmask_word(0x5, 2),
        adcdata_word(1, 2, 3, 3),
        adcdata_word(4, 5, 999, 3),
        adcdata_word(11, 12, 13, 3),
        adcdata_word(14, 15, 999, 3),
        EOD_MARKER,
    ];
    let mut zs_sizes = [0u16; 15];
    zs_sizes[0] = zs_link.len() as u16 * 4;

    // Event 1: no zero suppression, all 21 channels with three timebins.
    let mut raw_link = vec![
        EOT_MARKER,
        hc0_word(0x00, 1, 1, 0, 1, 0, 1),
        hc1_word(3),
        mcmhdr_word(0, 7, 1),
    ];
    for channel in 0..21u32 {
        let f = if channel % 2 == 1 { 2 } else { 3 };
        raw_link.push(adcdata_word(channel, channel + 100, channel + 200, f));
    }
    raw_link.push(EOD_MARKER);
    let mut raw_sizes = [0u16; 15];
    raw_sizes[0] = raw_link.len() as u16 * 4;

    let page_a = page(&zs_sizes, &[zs_link]);
    let page_b = page(&raw_sizes, &[raw_link]);

    let tmpd = tempfile::tempdir()?;
    let path = tmpd.path().join("pages.raw");
    let mut contents = page_a.clone();
    contents.extend(&page_b);
    std::fs::write(&path, &contents)?;

    let sink = VectorSink::new();
    let digits = sink.digits();
    let mut parser = CruParser::with_sink(Box::new(sink));

    let mut stream = File::open(&path)?;
    parser.read(&mut stream, page_a.len() as u64)?;
    parser.next_event();
    parser.read(&mut stream, page_b.len() as u64)?;

    let digits = digits.borrow();
    assert_eq!(digits.len(), 2 + 21);

    assert_eq!(digits[0].event, 0);
    assert_eq!(digits[0].det, 33);
    assert_eq!(digits[0].rob, 1);
    assert_eq!(digits[0].mcm, 2);
    assert_eq!(digits[0].channel, 0);
    assert_eq!(digits[0].samples, vec![1, 2, 3, 4, 5]);
    assert_eq!(digits[1].channel, 2);
    assert_eq!(digits[1].samples, vec![11, 12, 13, 14, 15]);

    for (i, digit) in digits[2..].iter().enumerate() {
        let channel = i as u16;
        assert_eq!(digit.event, 1);
        assert_eq!(digit.det, 1);
        assert_eq!(digit.rob, 0);
        assert_eq!(digit.mcm, 7);
        assert_eq!(digit.channel, channel as u8);
        assert_eq!(digit.samples, vec![channel, channel + 100, channel + 200]);
    }
    Ok(())
}

#[test]
fn link_budget_spanning_pages() -> Result<()> {
    // One link of 128 bytes, but the container delivers it as two
    // pages: the header plus 64 bytes, then the rest plus padding.
    let mut link = vec![
        EOT_MARKER,
        hc0_word(0x20, 0, 1, 0, 0, 0, 0),
        hc1_word(3),
        mcmhdr_word(3, 14, 0),
        adcmask_word(1 << 20, 1),
        adcdata_word(500, 600, 700, 3),
    ];
    link.resize(32, EOD_MARKER);
    let mut sizes = [0u16; 15];
    sizes[0] = 128;
    let whole = page(&sizes, &[link]);

    let tmpd = tempfile::tempdir()?;
    let path = tmpd.path().join("split.raw");
    std::fs::write(&path, &whole)?;

    let sink = VectorSink::new();
    let digits = sink.digits();
    let mut parser = CruParser::with_sink(Box::new(sink));

    let mut stream = File::open(&path)?;
    parser.read(&mut stream, 64 + 64)?;
    parser.read(&mut stream, 64 + 32)?;

    let digits = digits.borrow();
    assert_eq!(digits.len(), 1);
    assert_eq!(digits[0].rob, 3);
    assert_eq!(digits[0].mcm, 14);
    assert_eq!(digits[0].channel, 20);
    assert_eq!(digits[0].samples, vec![500, 600, 700]);
    Ok(())
}
