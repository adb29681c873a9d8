use num_enum::TryFromPrimitive;

/// JPEG marker codes (second byte after 0xFF) handled by the parser.
///
/// SOF variants the crate rejects (lossless, differential, arithmetic)
/// are still named here so the parser can report them precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum MarkerCode {
    /// SOF0: baseline sequential DCT, Huffman coding.
    StartOfFrameBaseline = 0xC0,
    /// SOF1: extended sequential DCT, Huffman coding.
    StartOfFrameExtended = 0xC1,
    /// SOF2: progressive DCT, Huffman coding.
    StartOfFrameProgressive = 0xC2,
    /// SOF3: lossless sequential (rejected).
    StartOfFrameLossless = 0xC3,

    DefineHuffmanTable = 0xC4,

    /// SOF5..SOF7: differential variants (rejected).
    StartOfFrameDifferentialSequential = 0xC5,
    StartOfFrameDifferentialProgressive = 0xC6,
    StartOfFrameDifferentialLossless = 0xC7,

    /// SOF9..SOF11, SOF13..SOF15: arithmetic-coded variants (rejected).
    StartOfFrameArithmetic = 0xC9,
    StartOfFrameArithmeticProgressive = 0xCA,
    StartOfFrameArithmeticLossless = 0xCB,
    DefineArithmeticConditioning = 0xCC,
    StartOfFrameDifferentialArithmetic = 0xCD,
    StartOfFrameDifferentialArithmeticProgressive = 0xCE,
    StartOfFrameDifferentialArithmeticLossless = 0xCF,

    Restart0 = 0xD0,
    Restart1 = 0xD1,
    Restart2 = 0xD2,
    Restart3 = 0xD3,
    Restart4 = 0xD4,
    Restart5 = 0xD5,
    Restart6 = 0xD6,
    Restart7 = 0xD7,

    StartOfImage = 0xD8,
    EndOfImage = 0xD9,
    StartOfScan = 0xDA,
    DefineQuantizationTable = 0xDB,
    DefineNumberOfLines = 0xDC,
    DefineRestartInterval = 0xDD,

    ApplicationData0 = 0xE0,
    ApplicationData1 = 0xE1,
    ApplicationData2 = 0xE2,
    ApplicationData3 = 0xE3,
    ApplicationData4 = 0xE4,
    ApplicationData5 = 0xE5,
    ApplicationData6 = 0xE6,
    ApplicationData7 = 0xE7,
    ApplicationData8 = 0xE8,
    ApplicationData9 = 0xE9,
    ApplicationData10 = 0xEA,
    ApplicationData11 = 0xEB,
    ApplicationData12 = 0xEC,
    ApplicationData13 = 0xED,
    ApplicationData14 = 0xEE,
    ApplicationData15 = 0xEF,

    Comment = 0xFE,
}

impl MarkerCode {
    pub fn is_restart(self) -> bool {
        (Self::Restart0 as u8..=Self::Restart7 as u8).contains(&(self as u8))
    }

    pub fn is_application_data(self) -> bool {
        (Self::ApplicationData0 as u8..=Self::ApplicationData15 as u8).contains(&(self as u8))
    }

    /// SOF variants that carry a frame header this crate can decode.
    pub fn is_supported_frame(self) -> bool {
        matches!(
            self,
            Self::StartOfFrameBaseline
                | Self::StartOfFrameExtended
                | Self::StartOfFrameProgressive
        )
    }

    /// Any SOFn, supported or not.
    pub fn is_frame(self) -> bool {
        matches!(
            self as u8,
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF
        )
    }
}

pub const MARKER_PREFIX: u8 = 0xFF;
pub const RESTART_BASE: u8 = 0xD0;
pub const RESTART_MODULO: u8 = 8;
