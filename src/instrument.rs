// src/instrument.rs
//
// Instrument source resolution.
//
// A channel's instrument is resolved once, when it is assigned — never
// per note. The result is a tagged source the audio backend can
// dispatch on directly. Sample fetch failure is not fatal: the channel
// degrades to a synthetic oscillator and playback continues.

use log::warn;

/// Oscillator waveform for synthetic channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

/// Opaque handle to a loaded sample bank in the audio backend.
pub type SampleBankId = u32;

/// Resolved instrument source for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentSource {
    /// Synthetic tone generator.
    Oscillator(Waveform),

    /// Sampled instrument loaded into the backend.
    Sampled(SampleBankId),
}

/// Sample/instrument storage provided by the host.
///
/// Loads happen before playback starts; they may fail (network,
/// missing file) and the engine degrades rather than aborting.
pub trait SampleLibrary {
    /// Fetch the sample bank for an instrument id.
    fn load(&mut self, instrument_id: u32) -> ResourceResult<SampleBankId>;
}

/// Resolve an instrument assignment for a channel.
///
/// On fetch failure, logs and falls back to `fallback` — the caller
/// always gets a usable source.
pub fn resolve_instrument(
    library: &mut dyn SampleLibrary,
    channel: u8,
    instrument_id: u32,
    fallback: Waveform,
) -> InstrumentSource {
    match library.load(instrument_id) {
        Ok(bank) => InstrumentSource::Sampled(bank),
        Err(err) => {
            warn!(
                "instrument {} for channel {} unavailable ({}), using {:?} oscillator",
                instrument_id, channel, err, fallback
            );
            InstrumentSource::Oscillator(fallback)
        }
    }
}

/// Error fetching an instrument's samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLoadError {
    /// The library has no such instrument.
    UnknownInstrument { instrument_id: u32 },

    /// The fetch itself failed (I/O, network).
    FetchFailed { instrument_id: u32, reason: String },
}

impl std::fmt::Display for ResourceLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceLoadError::UnknownInstrument { instrument_id } => {
                write!(f, "Unknown instrument {}", instrument_id)
            }
            ResourceLoadError::FetchFailed {
                instrument_id,
                reason,
            } => {
                write!(f, "Fetching instrument {} failed: {}", instrument_id, reason)
            }
        }
    }
}

impl std::error::Error for ResourceLoadError {}

/// Result of a resource fetch.
pub type ResourceResult<T> = Result<T, ResourceLoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLibrary {
        available: Vec<u32>,
    }

    impl SampleLibrary for FixedLibrary {
        fn load(&mut self, instrument_id: u32) -> ResourceResult<SampleBankId> {
            if self.available.contains(&instrument_id) {
                Ok(instrument_id + 100)
            } else {
                Err(ResourceLoadError::UnknownInstrument { instrument_id })
            }
        }
    }

    #[test]
    fn test_resolves_to_sampled() {
        let mut lib = FixedLibrary { available: vec![7] };
        let source = resolve_instrument(&mut lib, 0, 7, Waveform::Sine);
        assert_eq!(source, InstrumentSource::Sampled(107));
    }

    #[test]
    fn test_falls_back_to_oscillator() {
        let mut lib = FixedLibrary { available: vec![] };
        let source = resolve_instrument(&mut lib, 3, 42, Waveform::Triangle);
        assert_eq!(source, InstrumentSource::Oscillator(Waveform::Triangle));
    }
}
