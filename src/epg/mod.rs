//! EPG matching: resolving catalog channels to EPG channels through an
//! ordered pipeline of match strategies, including the FCC facility lookup
//! for US over-the-air stations.

pub mod callsign;
pub mod fcc;
pub mod matcher;
pub mod name_mapping;
pub mod ppv;

pub use fcc::FccResolver;
pub use matcher::EpgMatcher;
