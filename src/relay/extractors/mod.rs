// Extractors - incremental discovery over Bilibili listings
//
// Each listing shape is one `ExtractorKind` variant with a static descriptor
// (URL pattern, API template, pacing). The `Crawler` drives them all through
// the same fetch/parse/stop loop. `glob` is the local, network-free shape.

mod bilibili;
mod crawler;
mod diagnostics;
mod local;
mod traits;

pub use bilibili::{bvid_of, parse_page, scan_page, video_locator, PageScan};
pub use crawler::Crawler;
pub use diagnostics::{decode_ok_payload, decode_payload, ApiStatus};
pub use local::{expand, expand_items};
pub use traits::{ExtractorDescriptor, ExtractorKind, ListingShape, Pacing};
