pub mod artifacts;
pub mod compositor;
pub mod error;
pub mod graph;
pub mod probe;

pub use artifacts::{remove_if_present, render_concat_list, ArtifactSet};
pub use compositor::{BrandedArtifact, BrandingAssets, BrandingCompositor, BrandingStage};
pub use error::{BrandingError, BrandingResult};
pub use graph::{
    FfmpegInvocation, Filter, FilterChain, FilterGraph, MediaInput, StreamKind, StreamLabel,
};
pub use probe::{parse_dimensions, Dimensions, MediaProbe};
