//! Client-facing outputs: M3U playlists, XMLTV guides and the byte-relay
//! stream proxy.

pub mod epg_generator;
pub mod generator;
pub mod stream;

pub use epg_generator::EpgGenerator;
pub use generator::PlaylistGenerator;
pub use stream::ProxyStream;
