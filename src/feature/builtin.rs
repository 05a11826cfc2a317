//! Built-in features
//!
//! Host-provided passes that head every catalog. Their order is part of the
//! contract: headings are normalized before the TOC reads their anchors, and
//! blocks are annotated before the smart passes look for the markers.

use super::smart_convert::{convert_ascii_tables, convert_sip_signaling, convert_topology};
use super::standard::{annotate_blocks, build_toc, normalize_headings, sanitize_attr_tokens};
use super::types::{Feature, FeatureState};

pub const STD_NORMALIZE: &str = "STD_NORMALIZE";
pub const STD_SANITIZE_ATTR: &str = "STD_SANITIZE_ATTR";
pub const STD_TOC: &str = "STD_TOC";
pub const STD_ANNOTATE: &str = "STD_ANNOTATE";
pub const SMART_TABLES: &str = "SMART_TABLES";
pub const SMART_SIP: &str = "SMART_SIP";
pub const SMART_TOPOLOGY: &str = "SMART_TOPOLOGY";

/// The built-in features, in catalog order
pub fn builtin_features() -> Vec<Feature> {
    vec![
        Feature::infallible(STD_NORMALIZE, FeatureState::Standard, normalize_headings),
        Feature::infallible(STD_SANITIZE_ATTR, FeatureState::Standard, sanitize_attr_tokens),
        Feature::infallible(STD_TOC, FeatureState::Standard, build_toc),
        Feature::infallible(STD_ANNOTATE, FeatureState::Standard, annotate_blocks),
        Feature::infallible(SMART_TABLES, FeatureState::Experimental, convert_ascii_tables),
        Feature::infallible(SMART_SIP, FeatureState::Experimental, convert_sip_signaling),
        Feature::infallible(SMART_TOPOLOGY, FeatureState::Experimental, convert_topology),
    ]
}
