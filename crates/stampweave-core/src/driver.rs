//! Orchestration of one weaving run
//!
//! A run is all-or-nothing. Every type is scanned before anything is
//! changed, capabilities are resolved only when something is flagged, and
//! the artifact is written only when at least one property was rewritten.

use crate::capability::{DirectoryResolver, ImportContext, LibraryResolver};
use crate::config::{WeaveNames, WeaverConfig};
use crate::ctor::ConstructorPatcher;
use crate::error::{Result, WeaveError};
use crate::rewrite::AccessorRewriter;
use crate::scan::{FlaggedProperty, PropertyScanner};
use crate::synth::MemberSynthesizer;
use crate::writer::ArtifactWriter;
use serde::Serialize;
use stampweave_ir::{read_module, ContentHash, FullName, LoadedModule, Module, ReadOptions};
use std::path::{Path, PathBuf};

/// One rewritten property
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WovenProperty {
    pub type_name: FullName,
    pub property: String,
    pub shadow: String,
    pub column: String,
    pub format: String,
    pub keep_original: bool,
    pub constructors_patched: usize,
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeaveReport {
    pub path: PathBuf,
    /// Whether the artifact was rewritten
    pub changed: bool,
    pub properties: Vec<WovenProperty>,
    pub backup: Option<PathBuf>,
    pub input_hash: ContentHash,
    pub output_hash: Option<ContentHash>,
}

/// The weaving engine
#[derive(Debug, Clone)]
pub struct Weaver {
    config: WeaverConfig,
    names: WeaveNames,
}

impl Weaver {
    /// Create an engine from validated configuration
    ///
    /// # Errors
    /// Returns [`WeaveError::Config`] if the configuration is invalid
    pub fn new(config: WeaverConfig) -> Result<Self> {
        let names = config.names()?;
        Ok(Self { config, names })
    }

    #[must_use]
    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// Run against `path`, resolving libraries beside it and in the search dirs
    ///
    /// # Errors
    /// The first failure of any stage; see [`WeaveError::category`]
    pub fn run(&self, path: &Path) -> Result<WeaveReport> {
        let resolver = DirectoryResolver::for_artifact(path, &self.config.search_dirs);
        self.run_with(path, &resolver)
    }

    /// Run against `path` with an explicit library resolver
    ///
    /// # Errors
    /// The first failure of any stage; see [`WeaveError::category`]
    pub fn run_with(&self, path: &Path, resolver: &dyn LibraryResolver) -> Result<WeaveReport> {
        let span = tracing::info_span!("weave", artifact = %path.display());
        let _enter = span.enter();

        let LoadedModule {
            mut module,
            hash,
            has_symbols,
            ..
        } = self.load(path)?;
        tracing::info!(hash = %hash.short(), types = module.types.len(), "loaded artifact");

        let properties = self.weave_module(&mut module, resolver)?;
        if properties.is_empty() {
            tracing::info!("no flagged properties, artifact left unchanged");
            return Ok(WeaveReport {
                path: path.to_path_buf(),
                changed: false,
                properties,
                backup: None,
                input_hash: hash,
                output_hash: None,
            });
        }

        let outcome = ArtifactWriter::new(has_symbols).write(path, &module)?;
        Ok(WeaveReport {
            path: path.to_path_buf(),
            changed: true,
            properties,
            backup: Some(outcome.backup),
            input_hash: hash,
            output_hash: Some(outcome.hash),
        })
    }

    /// Rewrite every flagged property of `module` in place
    ///
    /// Returns the rewritten properties in type declaration order, then scan
    /// order. An empty result means `module` was not touched.
    ///
    /// # Errors
    /// A type mismatch or unresolvable dependency leaves `module` untouched
    pub fn weave_module(
        &self,
        module: &mut Module,
        resolver: &dyn LibraryResolver,
    ) -> Result<Vec<WovenProperty>> {
        let flagged = self.scan_module(module)?;
        if flagged.is_empty() {
            return Ok(Vec::new());
        }

        let imports = ImportContext::resolve(module, &self.names, resolver)?;
        let synthesizer = MemberSynthesizer::new(&self.names, &imports);
        let rewriter = AccessorRewriter::new(&imports);
        let patcher = ConstructorPatcher::new(&imports);

        let mut woven = Vec::with_capacity(flagged.len());
        for property in &flagged {
            let ty = module.find_type_mut(&property.type_name).ok_or_else(|| {
                WeaveError::unresolvable(property.type_name.to_string(), "type vanished during rewrite")
            })?;
            let shadow = synthesizer.synthesize(ty, property)?;
            rewriter.rewrite(ty, property, &shadow);
            let constructors_patched = patcher.patch(ty, property, &shadow)?;

            tracing::info!(
                type_name = %property.type_name,
                property = %property.property,
                shadow = %shadow.property,
                column = %shadow.column,
                format = %property.options.format,
                keep_original = property.options.keep_original,
                "rewrote property"
            );
            woven.push(WovenProperty {
                type_name: property.type_name.clone(),
                property: property.property.clone(),
                shadow: shadow.property,
                column: shadow.column,
                format: property.options.format.clone(),
                keep_original: property.options.keep_original,
                constructors_patched,
            });
        }
        Ok(woven)
    }

    /// Flagged properties of every type, without changing anything
    ///
    /// # Errors
    /// Load failures and type mismatches
    pub fn inspect(&self, path: &Path) -> Result<Vec<FlaggedProperty>> {
        let loaded = self.load(path)?;
        self.scan_module(&loaded.module)
    }

    /// Run and report a single boolean, logging the categorized failure
    #[must_use]
    pub fn execute(&self, path: &Path) -> bool {
        match self.run(path) {
            Ok(report) => {
                tracing::info!(
                    changed = report.changed,
                    properties = report.properties.len(),
                    "weaving finished"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    category = %e.category(),
                    untouched = e.artifact_untouched(),
                    error = %e,
                    "weaving failed"
                );
                false
            }
        }
    }

    fn load(&self, path: &Path) -> Result<LoadedModule> {
        let options = ReadOptions {
            read_symbols: self.config.read_symbols,
        };
        read_module(path, &options).map_err(|source| WeaveError::Load {
            path: path.to_path_buf(),
            source,
        })
    }

    fn scan_module(&self, module: &Module) -> Result<Vec<FlaggedProperty>> {
        let scanner = PropertyScanner::new(&self.names);
        let mut flagged = Vec::new();
        for ty in &module.types {
            flagged.extend(scanner.scan(ty)?);
        }
        Ok(flagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MemoryResolver;
    use crate::error::ErrorCategory;
    use pretty_assertions::assert_eq;
    use stampweave_ir::TypeSig;
    use stampweave_test_utils::{
        marker, marker_library, models_module, persistence_library, runtime_library, test_item,
        test_models, ModelBuilder,
    };

    fn weaver() -> Weaver {
        Weaver::new(WeaverConfig::new()).unwrap()
    }

    fn libraries() -> MemoryResolver {
        MemoryResolver::new()
            .with_library(runtime_library())
            .with_library(persistence_library())
            .with_library(marker_library())
    }

    #[test]
    fn weaves_every_flagged_property_in_order() {
        let mut module = test_models();
        let woven = weaver().weave_module(&mut module, &libraries()).unwrap();
        let shadows: Vec<(&str, &str)> = woven
            .iter()
            .map(|w| (w.shadow.as_str(), w.column.as_str()))
            .collect();
        assert_eq!(
            shadows,
            [
                ("Test_Serialized", "Test"),
                ("Test_KeepOriginal_CustomFormat_Serialized", "Test_KeepOriginal_CustomFormat_Serialized"),
                ("Test_Columnname_Serialized", "Specialname1"),
                ("Test_KeepOriginal_Columnname_Serialized", "Specialname2_Serialized"),
            ]
        );
        assert!(woven.iter().all(|w| w.constructors_patched == 1));
        assert!(module.validate().is_ok());
    }

    #[test]
    fn second_pass_finds_nothing() {
        let mut module = test_models();
        weaver().weave_module(&mut module, &libraries()).unwrap();
        let snapshot = module.clone();
        assert!(weaver().weave_module(&mut module, &libraries()).unwrap().is_empty());
        assert_eq!(module, snapshot);
    }

    #[test]
    fn mismatch_in_later_type_leaves_module_untouched() {
        let bad = ModelBuilder::new("SQLite.Net.DateTimeOffset.Test.Models.Bad")
            .property("Count", TypeSig::Int32, vec![marker(&[])])
            .build();
        let mut module = models_module(vec![test_item(), bad]);
        let snapshot = module.clone();
        let err = weaver().weave_module(&mut module, &libraries()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TypeMismatch);
        assert_eq!(module, snapshot);
    }

    #[test]
    fn nothing_flagged_skips_resolution() {
        let plain = ModelBuilder::new("Models.Plain")
            .property("Name", TypeSig::String, vec![])
            .build();
        let mut module = models_module(vec![plain]);
        // no libraries available at all
        let woven = weaver().weave_module(&mut module, &MemoryResolver::new()).unwrap();
        assert!(woven.is_empty());
        assert!(module.member_refs.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Weaver::new(WeaverConfig::new().with_default_format("")).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Config);
    }
}
