//! Adaptive bitrate engine: estimation and selection
//!
//! Two layers: [`BandwidthEstimator`] turns download samples into one
//! scalar bits-per-second estimate, and the chooser turns that estimate
//! plus ceilings, device state and buffer health into a per-track
//! representation selection.

mod bandwidth;
mod chooser;
mod ewma;

pub use bandwidth::{BandwidthEstimator, EstimatorConfig};
pub use chooser::{
    select_representation, ChooserInputs, ChooserStreams, TrackChooser, STALL_DOWNSHIFT_AFTER,
};
pub use ewma::Ewma;
