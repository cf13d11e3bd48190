//! Upstream data ingestion: the Xtream Codes client, the XMLTV parser and
//! the FCC facility.dat parser.

pub mod fcc_data;
pub mod xmltv;
pub mod xtream;

pub use xtream::XtreamClient;
