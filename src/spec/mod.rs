//! Provider specification handling: external document sources and the
//! Endpoint Normalizer that turns raw documents into canonical snapshots.

pub mod normalize;
pub mod source;

pub use normalize::{build_snapshot, normalize_document};
pub use source::{
    ChangelogSource, DirSpecSource, HttpSpecSource, NpmPackageSource, PackageVersionSource,
    SpecFetch, SpecSource, StaticPackageVersions, UNKNOWN_VERSION,
};
