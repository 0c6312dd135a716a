//! Mutable state accumulated while parsing one link's word stream.

/// State shared by the word parsers of one FEE parser instance.
///
/// Every [`FeeParser`](crate::fee::FeeParser) owns exactly one context;
/// nothing in here is shared between parser instances. Most fields are
/// filled in by the half-chamber and MCM header parsers and consumed by
/// the parsers further down the stream, so they stay meaningless until
/// the corresponding header has been seen.
#[derive(Debug, Default)]
pub struct ParsingContext {
    /// Firmware major version, from HC0. Bit 5 set means zero suppression.
    pub major: u8,
    /// Firmware minor version, from HC0.
    pub minor: u8,
    /// Number of additional half-chamber header words, from HC0.
    pub nhw: u8,
    /// Supermodule number, from HC0.
    pub sm: u8,
    /// Stack within the supermodule, from HC0.
    pub stack: u8,
    /// Layer within the stack, from HC0.
    pub layer: u8,
    /// Chamber side, from HC0. 0 is side A, 1 is side B.
    pub side: u8,
    /// Number of timebins each channel is sampled for, from HC1.
    pub ntb: usize,
    /// Bunch crossing counter, from HC1.
    pub bc_counter: u16,
    /// Pretrigger counter, from HC1.
    pub pre_counter: u8,
    /// Pretrigger phase, from HC1.
    pub pre_phase: u8,
    /// Half-chamber label `"ss_c_pA"`/`"ss_c_pB"`, derived from HC0.
    pub hc: String,
    /// Detector number `18*sm + 6*stack + layer`, derived from HC0.
    pub det: u16,
    /// Readout board, from the MCM header.
    pub rob: u8,
    /// MCM number on the readout board, from the MCM header.
    pub mcm: u8,
    /// Event number. Advanced only by
    /// [`FeeParser::next_event`](crate::fee::FeeParser::next_event).
    pub event: u32,
    /// Offset of the word currently being parsed, for diagnostics.
    pub current_linkpos: u64,
    /// The word currently being parsed, for diagnostics.
    pub current_dword: u32,
}

impl ParsingContext {
    /// Log-line prefix locating the current word in the stream.
    pub fn where_prefix(&self) -> String {
        format!("{:06x} {:08x}", self.current_linkpos, self.current_dword)
    }
}
