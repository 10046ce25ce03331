//! External members the rewrite depends on
//!
//! The woven code calls into two library surfaces: the runtime's timestamp
//! conversion and the persistence library's attributes. Both are resolved
//! once per run from the module's referenced libraries and recorded in its
//! member-reference table. Anything missing or ambiguous fails the run.

use crate::config::WeaveNames;
use crate::error::{Result, WeaveError};
use stampweave_ir::{
    read_module, AttrArg, CustomAttribute, FullName, MethodDef, MethodRef, Module, ReadOptions,
    TypeSig, MODULE_EXTENSION,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Conversion between the timestamp type and its string form
pub trait TimestampConversion {
    /// `static T ParseExact(string, string, IFormatProvider)`
    fn parse_exact(&self) -> &MethodRef;

    /// `string T::ToString(string)`
    fn format(&self) -> &MethodRef;

    /// Getter of the culture-insensitive formatting context
    fn invariant_culture(&self) -> &MethodRef;
}

/// Persistence attributes attached by the rewrite
pub trait PersistenceMetadata {
    /// Parameterless constructor of the exclusion attribute
    fn exclusion_ctor(&self) -> &MethodRef;

    /// Single-string constructor of the column attribute
    fn column_ctor(&self) -> &MethodRef;

    /// New exclusion attribute
    fn exclusion(&self) -> CustomAttribute {
        CustomAttribute::new(self.exclusion_ctor().clone())
    }

    /// New column attribute naming `column`
    fn column(&self, column: &str) -> CustomAttribute {
        CustomAttribute::new(self.column_ctor().clone()).with_arg(AttrArg::String(column.to_string()))
    }
}

/// Loads referenced libraries by name
pub trait LibraryResolver {
    /// Load the library called `library`
    ///
    /// # Errors
    /// Returns [`WeaveError::Unresolvable`] if it cannot be found or read
    fn resolve(&self, library: &str) -> Result<Module>;
}

/// Looks for `<library>.cmod` in an ordered list of directories
#[derive(Debug, Clone, Default)]
pub struct DirectoryResolver {
    dirs: Vec<PathBuf>,
}

impl DirectoryResolver {
    #[must_use]
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dirs: dirs.into_iter().collect(),
        }
    }

    /// Artifact directory first, then `search_dirs`
    #[must_use]
    pub fn for_artifact(artifact: &Path, search_dirs: &[PathBuf]) -> Self {
        let own = artifact
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::new(std::iter::once(own).chain(search_dirs.iter().cloned()))
    }

    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

impl LibraryResolver for DirectoryResolver {
    fn resolve(&self, library: &str) -> Result<Module> {
        let file = format!("{library}.{MODULE_EXTENSION}");
        for dir in &self.dirs {
            let path = dir.join(&file);
            if !path.is_file() {
                continue;
            }
            tracing::debug!(library, path = %path.display(), "loading referenced library");
            let options = ReadOptions {
                read_symbols: false,
            };
            return read_module(&path, &options)
                .map(|loaded| loaded.module)
                .map_err(|e| WeaveError::unresolvable(library, e.to_string()));
        }
        Err(WeaveError::unresolvable(
            library,
            format!("{file} not found in {} search directories", self.dirs.len()),
        ))
    }
}

/// Libraries held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    libraries: BTreeMap<String, Module>,
}

impl MemoryResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_library(mut self, library: Module) -> Self {
        self.libraries.insert(library.name.clone(), library);
        self
    }
}

impl LibraryResolver for MemoryResolver {
    fn resolve(&self, library: &str) -> Result<Module> {
        self.libraries
            .get(library)
            .cloned()
            .ok_or_else(|| WeaveError::unresolvable(library, "library not registered"))
    }
}

/// The module's referenced libraries, as far as they could be loaded
struct LibrarySet {
    loaded: Vec<(String, Module)>,
    failures: Vec<String>,
}

impl LibrarySet {
    fn load(module: &Module, resolver: &dyn LibraryResolver) -> Self {
        let mut set = Self {
            loaded: Vec::new(),
            failures: Vec::new(),
        };
        for library in module.references.iter().filter(|r| **r != module.name) {
            match resolver.resolve(library) {
                Ok(lib) => set.loaded.push((library.clone(), lib)),
                Err(e) => {
                    tracing::debug!(library = %library, error = %e, "referenced library unavailable");
                    set.failures.push(e.to_string());
                }
            }
        }
        set
    }

    /// Every method of `declaring` accepted by `accept`, across libraries
    fn candidates(
        &self,
        declaring: &FullName,
        accept: impl Fn(&stampweave_ir::TypeDef, &MethodDef) -> bool,
    ) -> Vec<MethodRef> {
        let mut found = Vec::new();
        for (library, module) in &self.loaded {
            let Some(ty) = module.find_type(declaring) else {
                continue;
            };
            found.extend(
                ty.methods
                    .iter()
                    .filter(|m| accept(ty, m))
                    .map(|m| m.reference(declaring).with_scope(library.clone())),
            );
        }
        found
    }

    fn single(&self, what: String, mut found: Vec<MethodRef>) -> Result<MethodRef> {
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => {
                let mut reason = format!("no match in {} loaded libraries", self.loaded.len());
                if !self.failures.is_empty() {
                    reason.push_str(&format!("; unavailable: {}", self.failures.join("; ")));
                }
                Err(WeaveError::unresolvable(what, reason))
            }
            n => Err(WeaveError::unresolvable(what, format!("{n} candidates match"))),
        }
    }
}

fn params_are(method: &MethodDef, expected: &[&FullName]) -> bool {
    method.params.len() == expected.len()
        && method
            .params
            .iter()
            .zip(expected)
            .all(|(p, name)| p.param_type.is(name))
}

/// Resolved, imported capability references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportContext {
    parse_exact: MethodRef,
    format: MethodRef,
    invariant_culture: MethodRef,
    exclusion_ctor: MethodRef,
    column_ctor: MethodRef,
}

impl ImportContext {
    /// Resolve every capability and import it into `module`
    ///
    /// # Errors
    /// Returns [`WeaveError::Unresolvable`] for the first member that is
    /// missing or ambiguous
    pub fn resolve(
        module: &mut Module,
        names: &WeaveNames,
        resolver: &dyn LibraryResolver,
    ) -> Result<Self> {
        let libraries = LibrarySet::load(module, resolver);
        let string = TypeSig::String.full_name();

        let parse_exact = libraries.single(
            format!("{}::ParseExact(String,String,{})", names.timestamp, names.format_provider),
            libraries.candidates(&names.timestamp, |_, m| {
                m.name == "ParseExact"
                    && m.flags.is_static
                    && params_are(m, &[&string, &string, &names.format_provider])
            }),
        )?;
        let format = libraries.single(
            format!("{}::ToString(String)", names.timestamp),
            libraries.candidates(&names.timestamp, |_, m| {
                m.name == "ToString" && !m.flags.is_static && params_are(m, &[&string])
            }),
        )?;
        let invariant_culture = libraries.single(
            format!("{}::{}", names.culture, names.culture_property),
            libraries.candidates(&names.culture, |ty, m| {
                ty.property(&names.culture_property)
                    .and_then(|p| p.getter.as_deref())
                    .is_some_and(|getter| m.name == getter && m.params.is_empty())
            }),
        )?;
        let exclusion_ctor = libraries.single(
            format!("{}::.ctor()", names.exclusion),
            libraries.candidates(&names.exclusion, |_, m| m.is_constructor() && m.params.is_empty()),
        )?;
        let column_ctor = libraries.single(
            format!("{}::.ctor(String)", names.column),
            libraries.candidates(&names.column, |_, m| {
                m.is_constructor() && params_are(m, &[&string])
            }),
        )?;

        let context = Self {
            parse_exact: module.import(parse_exact),
            format: module.import(format),
            invariant_culture: module.import(invariant_culture),
            exclusion_ctor: module.import(exclusion_ctor),
            column_ctor: module.import(column_ctor),
        };
        tracing::debug!(
            parse_exact = %context.parse_exact,
            format = %context.format,
            culture = %context.invariant_culture,
            "resolved conversion and persistence members"
        );
        Ok(context)
    }
}

impl TimestampConversion for ImportContext {
    fn parse_exact(&self) -> &MethodRef {
        &self.parse_exact
    }

    fn format(&self) -> &MethodRef {
        &self.format
    }

    fn invariant_culture(&self) -> &MethodRef {
        &self.invariant_culture
    }
}

impl PersistenceMetadata for ImportContext {
    fn exclusion_ctor(&self) -> &MethodRef {
        &self.exclusion_ctor
    }

    fn column_ctor(&self) -> &MethodRef {
        &self.column_ctor
    }
}
