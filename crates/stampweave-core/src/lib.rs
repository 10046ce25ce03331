//! Stampweave Core - post-build timestamp weaving
//!
//! Rewrites a compiled data-model module so that every property flagged
//! with the serialization marker persists as a string column:
//! - Scans types for flagged timestamp-with-offset properties
//! - Adds a string shadow property carrying the persistence column
//! - Routes the original accessors through invariant parse and format
//! - Patches constructors so initializers reach the shadow
//! - Backs up the artifact, then replaces it atomically
//!
//! # Example
//!
//! ```rust,ignore
//! use stampweave_core::{Weaver, WeaverConfig};
//!
//! let weaver = Weaver::new(WeaverConfig::new())?;
//! let report = weaver.run(Path::new("bin/Models.cmod"))?;
//! for property in &report.properties {
//!     println!("{} -> {} ({})", property.property, property.shadow, property.column);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod capability;
pub mod config;
pub mod ctor;
pub mod driver;
pub mod error;
pub mod extract;
pub mod logging;
pub mod rewrite;
pub mod scan;
pub mod synth;
pub mod writer;

pub use capability::{
    DirectoryResolver, ImportContext, LibraryResolver, MemoryResolver, PersistenceMetadata,
    TimestampConversion,
};
pub use config::{WeaveNames, WeaverConfig};
pub use ctor::ConstructorPatcher;
pub use driver::{WeaveReport, Weaver, WovenProperty};
pub use error::{ErrorCategory, Result, WeaveError};
pub use extract::{extract_options, SerializeOptions};
pub use rewrite::AccessorRewriter;
pub use scan::{FlaggedProperty, PropertyScanner};
pub use synth::{MemberSynthesizer, ShadowMembers};
pub use writer::{backup_path, ArtifactWriter, WriteOutcome};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running the weaver
    pub use crate::{
        ErrorCategory, FlaggedProperty, LibraryResolver, WeaveError, WeaveReport, Weaver,
        WeaverConfig,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use stampweave_test_utils::{test_models, Workspace};

    #[test]
    fn weave_then_inspect_shows_nothing_left() {
        let ws = Workspace::new(&test_models());
        let weaver = Weaver::new(WeaverConfig::new()).unwrap();

        assert_eq!(weaver.inspect(ws.artifact()).unwrap().len(), 4);
        assert!(weaver.execute(ws.artifact()));
        assert!(weaver.inspect(ws.artifact()).unwrap().is_empty());
    }
}
