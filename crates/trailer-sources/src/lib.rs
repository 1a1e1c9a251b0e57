//! Per-source trailer resolution strategies.
//!
//! Each module implements one of the heterogeneous upstream sources the
//! orchestrator (C10, in `trailer-resolver`) races against each other:
//! iTunes Search (C6), the yt-dlp/proxy-pool extractor (C7), Internet
//! Archive search (C8), and the URL validator (C9) used for pre-expiry
//! cache revalidation.

pub mod archive;
pub mod error;
pub mod fuzzy;
pub mod itunes;
pub mod validator;
pub mod youtube;

pub use archive::{ArchiveCandidate, ArchiveClient, ArchiveInput};
pub use error::{SourceError, SourceResult};
pub use fuzzy::{fuzzy_match, normalize};
pub use itunes::{ItunesCandidate, ItunesClient};
pub use validator::HttpUrlValidator;
pub use youtube::{ProxyPool, YtDlpExtractor};
