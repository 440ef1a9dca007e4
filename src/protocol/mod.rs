pub mod http;
pub mod manifest;

pub use http::{HttpError, ResponseHead, build_get_request, parse_response_head};
pub use manifest::{FirmwareVersion, ManifestError, parse_manifest};
