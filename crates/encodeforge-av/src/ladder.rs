//! Bitrate ladder derivation.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Share of the source bitrate, in percent, given to each rendition.
const RATIO_1080: u64 = 45;
const RATIO_720: u64 = 29;
const RATIO_480: u64 = 10;
const RATIO_360: u64 = 8;

/// Target bitrates in kbps for the four output renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitrateLadder {
    pub bitrate_360: u64,
    pub bitrate_480: u64,
    pub bitrate_720: u64,
    pub bitrate_1080: u64,
}

impl BitrateLadder {
    /// Derive the ladder from a source bitrate in bits per second.
    ///
    /// The source is truncated to whole kbps first, then each rendition gets
    /// `floor(kbps * ratio)`. Integer arithmetic keeps the truncation exact.
    ///
    /// ```
    /// use encodeforge_av::BitrateLadder;
    ///
    /// let ladder = BitrateLadder::from_source_bitrate(5_000_999)?;
    /// assert_eq!(
    ///     (ladder.bitrate_360, ladder.bitrate_480, ladder.bitrate_720, ladder.bitrate_1080),
    ///     (400, 500, 1450, 2250)
    /// );
    /// # Ok::<(), encodeforge_av::Error>(())
    /// ```
    pub fn from_source_bitrate(bits_per_second: i64) -> Result<Self> {
        if bits_per_second <= 0 {
            return Err(Error::InvalidBitrate(bits_per_second));
        }
        let kbps = bits_per_second as u64 / 1000;
        Ok(Self {
            bitrate_360: kbps * RATIO_360 / 100,
            bitrate_480: kbps * RATIO_480 / 100,
            bitrate_720: kbps * RATIO_720 / 100,
            bitrate_1080: kbps * RATIO_1080 / 100,
        })
    }

    /// The four bitrates in the transcoder's positional order: 360, 480, 720, 1080.
    pub fn positional_args(&self) -> [String; 4] {
        [
            self.bitrate_360.to_string(),
            self.bitrate_480.to_string(),
            self.bitrate_720.to_string(),
            self.bitrate_1080.to_string(),
        ]
    }

    pub fn total(&self) -> u64 {
        self.bitrate_360 + self.bitrate_480 + self.bitrate_720 + self.bitrate_1080
    }
}
